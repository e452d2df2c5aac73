//! Session configuration

pub mod builder;
mod getters;
pub mod types;

pub use builder::CloneConfigBuilder;
pub use types::{BrowserOptions, CacheOptions, CloneConfig, RateOptions, TimeoutOptions};
