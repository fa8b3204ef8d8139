//! Configuration loading and validation

mod schema;

pub use schema::*;

use anyhow::{Context, Result};
use std::path::Path;

/// Load configuration from a YAML file
///
/// Relative instrument and tuning paths are resolved against the
/// directory holding the configuration file.
pub fn load_config(path: &Path) -> Result<SfzkitConfig> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config: {:?}", path))?;
    let mut config: SfzkitConfig = serde_yaml::from_str(&contents)?;
    config.validate()?;

    if let Some(base) = path.parent() {
        for file in [&mut config.instrument, &mut config.tuning].into_iter().flatten() {
            if file.is_relative() {
                *file = base.join(&*file);
            }
        }
    }
    Ok(config)
}
