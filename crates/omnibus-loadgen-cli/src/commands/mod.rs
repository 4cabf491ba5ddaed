//! CLI command implementations.

use std::path::Path;

use anyhow::Result;
use omnibus_loadgen_config::{ConfigLoader, LoadgenConfig};

pub mod config;
pub mod run;
pub mod verify_replay;
pub mod version;

/// Loads the layered configuration, rooted at `project_dir` when given.
pub fn load_config(project_dir: Option<&Path>) -> Result<LoadgenConfig> {
    let mut loader = ConfigLoader::new();
    if let Some(dir) = project_dir {
        loader = loader.with_project_dir(dir);
    }
    loader.load()
}
