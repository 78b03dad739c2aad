pub mod collaborators;
pub mod config;
pub mod constants;
pub mod entities;
pub mod error;
pub mod types;

pub use collaborators::*;
pub use config::RuntimeConfig;
pub use constants::*;
pub use entities::*;
pub use error::{GatekeeperError, Result, TokenInvalidReason};
pub use types::*;
