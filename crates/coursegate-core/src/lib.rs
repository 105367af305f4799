//! Coursegate Core: domain models, error taxonomy, clock abstraction and
//! repository traits shared by every Coursegate crate.

pub mod clock;
pub mod error;
pub mod models;
pub mod repository;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{GateError, GateResult};
