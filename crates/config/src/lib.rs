//! Configuration loading, env substitution and validation for courier.
//!
//! Config files: `courier.toml`, `courier.yaml`, `courier.yml` or
//! `courier.json`, searched in `./` then the user config directory.
//!
//! `${ENV_VAR}` and `${ENV_VAR:-fallback}` are substituted before parsing.

pub mod env_subst;
pub mod error;
pub mod loader;
pub mod schema;
pub mod validate;

pub use {
    error::{Error, Result},
    loader::{config_dir, discover_and_load, find_config_file, load_config},
    schema::{
        CommandConfig, CourierConfig, DispatchConfig, MetricsConfig, PollingConfig, WebhookConfig,
    },
    validate::{Diagnostic, Severity, ValidationResult, validate},
};

impl CourierConfig {
    /// Run [`validate()`] and fail on errors; warnings are returned.
    pub fn validated(self) -> Result<(Self, Vec<Diagnostic>)> {
        let result = validate(&self);
        if result.has_errors() {
            return Err(Error::Invalid(result.errors().cloned().collect()));
        }
        Ok((self, result.diagnostics))
    }
}
