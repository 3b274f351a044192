//! Core domain model: shared types, errors and the ports the embedding
//! application provides.

pub mod error;
pub mod traits;
pub mod types;

pub use error::{StakingError, StakingResult};
pub use traits::{ChainClient, NotificationSink};
