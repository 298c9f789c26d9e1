//! Configuration
//!
//! Environment-variable configuration for the relay.

mod settings;

pub use settings::{
    BrokerSettings, ConfigError, FeedEndpoints, FeedToggles, RelayConfig, ServerSettings,
    StreamSettings,
};
