//! Common crate
//!
//! Shared types and error handling for the analyst pipeline crates.
//!
//! # Example
//! ```rust
//! use analyst_common::{Computation, Error};
//! let err = Error::remote(Some(503), "HTTP 503: Service Unavailable");
//! assert!(matches!(err, Error::Remote { .. }));
//! assert_eq!(Computation::from_query_id(5963629), Some(Computation::Collateral));
//! ```

pub mod clock;
pub mod computation;
pub mod error;
pub mod model;

pub use clock::{Clock, ManualClock, SystemClock};
pub use computation::Computation;
pub use error::{Error, Result};
pub use model::{ExecutionRecord, ExecutionStatus};
