// src/config/mod.rs

//! TOML deployment configuration.
//!
//! Loading is two-staged: [`loader::load_from_path`] deserializes a
//! [`model::RawConfigFile`], and `ConfigFile::try_from` (in [`validate`])
//! checks it. Use [`loader::load_and_validate`] for both.

pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{default_config_path, load_and_validate, load_from_path, parse_and_validate};
pub use model::{
    ConfigFile, RawConfigFile, SensorConfig, SettingsSection, WorkflowConfig, WorkflowSpec,
};
