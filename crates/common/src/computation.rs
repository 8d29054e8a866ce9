use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::Error;

/// The fixed set of remote queries tracked by the pipeline.
///
/// Each variant owns its remote query id, display name and target table. The
/// column mapping used for merging lives with the storage layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Computation {
    Collateral,
    Borrow,
    DexVolume,
    Earn,
    PriceHistory,
}

impl Computation {
    /// Submission order used by the daily processes.
    pub const ALL: [Computation; 5] = [
        Computation::Collateral,
        Computation::Borrow,
        Computation::DexVolume,
        Computation::Earn,
        Computation::PriceHistory,
    ];

    pub fn query_id(self) -> i64 {
        match self {
            Computation::Collateral => 5963629,
            Computation::Borrow => 5963670,
            Computation::DexVolume => 5963703,
            Computation::Earn => 5963349,
            Computation::PriceHistory => 5982584,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Computation::Collateral => "World Morpho Collateral History",
            Computation::Borrow => "World Morpho Borrow History",
            Computation::DexVolume => "World DEX Volume History",
            Computation::Earn => "World Morpho Earn History",
            Computation::PriceHistory => "WLD Daily Price History",
        }
    }

    pub fn table_name(self) -> &'static str {
        match self {
            Computation::Collateral => "morpho_collateral_history",
            Computation::Borrow => "morpho_borrow_history",
            Computation::DexVolume => "dex_volume_history",
            Computation::Earn => "morpho_earn_history",
            Computation::PriceHistory => "wld_price_history",
        }
    }

    /// Short identifier used on the command line and in reports.
    pub fn slug(self) -> &'static str {
        match self {
            Computation::Collateral => "collateral",
            Computation::Borrow => "borrow",
            Computation::DexVolume => "dex-volume",
            Computation::Earn => "earn",
            Computation::PriceHistory => "price-history",
        }
    }

    pub fn from_query_id(query_id: i64) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.query_id() == query_id)
    }
}

impl fmt::Display for Computation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.slug())
    }
}

impl FromStr for Computation {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase().replace('_', "-");
        if let Ok(id) = wanted.parse::<i64>() {
            return Self::from_query_id(id)
                .ok_or_else(|| Error::InvalidData(format!("unknown query id: {id}")));
        }
        Self::ALL
            .into_iter()
            .find(|c| c.slug() == wanted)
            .ok_or_else(|| Error::InvalidData(format!("unknown computation: {s}")))
    }
}
