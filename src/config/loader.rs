// src/config/loader.rs

use std::fs;
use std::path::Path;

use crate::config::model::{ConfigFile, RawConfigFile};
use crate::errors::{EvalflowError, Result};

/// File name looked up inside a model workdir.
pub const CONFIG_FILE_NAME: &str = "evalflow.toml";

/// Load a configuration file from a given path and return the raw
/// `RawConfigFile`.
///
/// This only performs TOML deserialization; semantic validation (method
/// names, step graph) happens in [`load_and_validate`].
pub fn load_from_path(path: impl AsRef<Path>) -> Result<RawConfigFile> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path)?;

    let config: RawConfigFile = toml::from_str(&contents)?;

    Ok(config)
}

/// Load a configuration file from path and validate it.
///
/// Definition errors (duplicate steps, unknown `needs`, cycles) surface here,
/// before any job is created.
pub fn load_and_validate(path: impl AsRef<Path>) -> Result<ConfigFile> {
    let raw_config = load_from_path(&path)?;
    let config = ConfigFile::try_from(raw_config)?;
    Ok(config)
}

/// Load `evalflow.toml` from a model workdir.
pub fn load_from_workdir(workdir: impl AsRef<Path>) -> Result<ConfigFile> {
    let workdir = workdir.as_ref();
    if !workdir.is_dir() {
        return Err(EvalflowError::InvalidInput(format!(
            "model workdir {} does not exist or is not a directory",
            workdir.display()
        )));
    }

    let path = workdir.join(CONFIG_FILE_NAME);
    if !path.is_file() {
        return Err(EvalflowError::InvalidInput(format!(
            "model workdir {} has no {}",
            workdir.display(),
            CONFIG_FILE_NAME
        )));
    }

    load_and_validate(path)
}
