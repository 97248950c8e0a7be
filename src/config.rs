//! Experiment configuration read from TOML.
//!
//! Every field has a default, so a file only lists what it changes:
//!
//! ```toml
//! [graph]
//! k = 10
//! metric = "euclidean"
//! laplacian = "normalized"
//!
//! [dictionary]
//! atoms = 64
//! lg = 100.0
//! ```
use std::fs;
use std::path::Path;

use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::dictionary::DictionaryParams;
use crate::error::{Error, Result};
use crate::graph::GraphParams;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ExperimentConfig {
    pub graph: GraphParams,
    pub dictionary: DictionaryParams,
    /// power iterations for the lmax estimate; 0 disables it
    pub lmax_iterations: usize,
}

impl Default for ExperimentConfig {
    fn default() -> Self {
        Self {
            graph: GraphParams::default(),
            dictionary: DictionaryParams::default(),
            lmax_iterations: 100,
        }
    }
}

impl ExperimentConfig {
    pub fn from_toml(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text)?;
        config.dictionary.validate()?;
        if config.graph.k == 0 {
            return Err(Error::invalid("graph.k must be at least 1"));
        }
        debug!("Parsed config: {:?}", config);
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        info!("Reading config from {}", path.display());
        let text = fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
        Self::from_toml(&text)
    }

    /// Load `path` if given, defaults otherwise.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(p) => Self::load(p),
            None => {
                debug!("No config file, using defaults");
                Ok(Self::default())
            }
        }
    }
}
