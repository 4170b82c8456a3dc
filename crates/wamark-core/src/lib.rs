//! # Wamark Core
//! Shared foundation for the wamark bot: error taxonomy, configuration,
//! domain types, and the messaging-gateway contract the engine depends on.

pub mod config;
pub mod error;
pub mod traits;
pub mod types;

pub use config::WamarkConfig;
pub use error::{Result, WamarkError};
pub use traits::{Gateway, NullGateway};
pub use types::{
    ClientEntry, ConversationInfo, Envelope, MessageKey, ReactSettings, ReactionMode,
};
