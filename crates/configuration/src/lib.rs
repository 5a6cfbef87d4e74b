use crate::error::ConfigError;

// Declare the modules that make up this crate.
pub mod error;
pub mod settings;
pub mod telemetry;

// Re-export the core types to provide a clean public API.
pub use settings::{
    ApiConfig, ApiKeys, Config, LedgerConfig, Mode, SimulationConfig, StreamingConfig,
    SubscriptionConfig,
};

/// Loads the application configuration from the `config.toml` file.
///
/// This function is the primary entry point for this crate. It reads the configuration file,
/// deserializes it into our strongly-typed `Config` struct, and returns it.
pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from(Some("config.toml"))
}

/// Loads configuration from an explicit file, falling back to defaults plus
/// `HELIOS_`-prefixed environment variables when no file is given.
pub fn load_config_from(path: Option<&str>) -> Result<Config, ConfigError> {
    let mut builder = config::Config::builder();
    if let Some(path) = path {
        builder = builder.add_source(config::File::with_name(path).required(false));
    }
    let settings = builder
        .add_source(config::Environment::with_prefix("HELIOS").separator("__"))
        .build()?;

    // Attempt to deserialize the entire configuration into our `Config` struct
    let config = settings.try_deserialize::<Config>()?;
    config.validate()?;

    Ok(config)
}
