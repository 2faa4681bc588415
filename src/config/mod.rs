// src/config/mod.rs

//! Configuration loading and validation for evalflow.
//!
//! A model workdir carries an `evalflow.toml` describing which handler to
//! load, engine tunables, and the step graph.
//!
//! - `model.rs`: the TOML-backed data model (raw and validated forms).
//! - `loader.rs`: reading the file from a workdir.
//! - `validate.rs`: turning a raw config into a validated [`ConfigFile`].

pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{CONFIG_FILE_NAME, load_and_validate, load_from_path, load_from_workdir};
pub use model::{ConfigFile, ConfigSection, RawConfigFile, RunSection, StepConfig};
pub use validate::parse_duration;
