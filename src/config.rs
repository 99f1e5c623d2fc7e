//! Configuration file loading.
//!
//! Files ending in `.toml` are read as TOML, everything else as YAML. Both
//! map onto the same [`Config`] model and are validated before use.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};

use logforward_types::{Config, Settings};

/// Read, parse and validate a configuration file
pub fn load(path: &Path) -> Result<Settings> {
    let contents = fs::read_to_string(path).context("reading config file")?;
    let config = parse(&contents, path)?;
    let settings = config.validate().context("invalid configuration")?;
    Ok(settings)
}

fn parse(contents: &str, path: &Path) -> Result<Config> {
    let is_toml = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));

    if is_toml {
        toml::from_str(contents).context("parsing TOML config")
    } else {
        serde_yaml::from_str(contents).context("parsing YAML config")
    }
}
