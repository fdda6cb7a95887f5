//! Process-wide configuration: environment-variable defaults (spec §6) and
//! the `Settings` record built once at startup.

pub mod constants;
pub mod error;
pub mod settings;

pub use error::ConfigError;
pub use settings::{load_settings, SipSettings, Settings, VadSettings};
