use crate::error::AppError;
use config::{Config as Cfg, Environment, File};
use serde::de::DeserializeOwned;

/// Loads a settings tree from the layered sources shared by every component:
/// an optional base file (extension resolved by `config`), then `APP__*`
/// environment variables. `.env` is honoured when present.
pub fn load_from<T: DeserializeOwned>(base_file: &str) -> Result<T, AppError> {
    dotenvy::dotenv().ok();

    let config = Cfg::builder()
        .add_source(File::with_name(base_file).required(false))
        .add_source(
            Environment::with_prefix("APP")
                .prefix_separator("__")
                .separator("__"),
        )
        .build()?;

    Ok(config.try_deserialize()?)
}
