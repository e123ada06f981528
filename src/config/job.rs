//! Transfer job definitions
//!
//! A job names the manager, input and output plugins together with their
//! parameter strings. Jobs can be stored as YAML:
//!
//! ```yaml
//! manager:
//!   name: DEFAULT_TRANSFER_MANAGER
//!   parameters: stopOnItemError=false
//! input:
//!   name: CSV_INPUT_PLUGIN
//!   parameters: filepath=people.csv|separator=,|hasheader=true|mapping=Name:name
//! output:
//!   name: SQLITE_OUTPUT_PLUGIN
//!   parameters: connectionstring=people.db|table=people|mapping=name:name
//! ```

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

pub const ENV_MANAGER: &str = "TRANSFER_MANAGER";
pub const ENV_MANAGER_PARAMETERS: &str = "TRANSFER_MANAGER_PARAMETERS";
pub const ENV_INPUT: &str = "TRANSFER_INPUT";
pub const ENV_INPUT_PARAMETERS: &str = "TRANSFER_INPUT_PARAMETERS";
pub const ENV_OUTPUT: &str = "TRANSFER_OUTPUT";
pub const ENV_OUTPUT_PARAMETERS: &str = "TRANSFER_OUTPUT_PARAMETERS";

/// A plugin name plus its raw parameter string
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PluginSelection {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub parameters: String,
}

impl PluginSelection {
    pub fn new(name: impl Into<String>, parameters: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            parameters: parameters.into(),
        }
    }

    /// Fill blank fields from `other`
    ///
    /// Parameters are only inherited when they belong to the same plugin:
    /// a layer that names a different plugin keeps its own (blank) parameters.
    fn fill_from(&mut self, other: PluginSelection) {
        let name = self.name.trim();
        let same_plugin =
            name.is_empty() || other.name.trim().is_empty() || name == other.name.trim();
        if self.parameters.trim().is_empty() && same_plugin {
            self.parameters = other.parameters;
        }
        if name.is_empty() {
            self.name = other.name;
        }
    }
}

/// The three selections that make up one transfer
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TransferJob {
    #[serde(default)]
    pub manager: PluginSelection,
    #[serde(default)]
    pub input: PluginSelection,
    #[serde(default)]
    pub output: PluginSelection,
}

impl TransferJob {
    pub fn new(manager: PluginSelection, input: PluginSelection, output: PluginSelection) -> Self {
        Self {
            manager,
            input,
            output,
        }
    }

    /// Read a job from a YAML file
    pub fn read(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read job file: {}", path.display()))?;
        serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse job file: {}", path.display()))
    }

    /// Write the job as YAML
    pub fn write(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let yaml = serde_yaml::to_string(self)?;
        std::fs::write(path, yaml)
            .with_context(|| format!("Failed to write job file: {}", path.display()))
    }

    /// Build a job from the `TRANSFER_*` environment variables
    pub fn from_env() -> Self {
        let var = |name: &str| std::env::var(name).unwrap_or_default();
        Self {
            manager: PluginSelection::new(var(ENV_MANAGER), var(ENV_MANAGER_PARAMETERS)),
            input: PluginSelection::new(var(ENV_INPUT), var(ENV_INPUT_PARAMETERS)),
            output: PluginSelection::new(var(ENV_OUTPUT), var(ENV_OUTPUT_PARAMETERS)),
        }
    }

    /// Fill every blank field of this job from a lower-precedence job
    pub fn or(mut self, fallback: TransferJob) -> Self {
        self.manager.fill_from(fallback.manager);
        self.input.fill_from(fallback.input);
        self.output.fill_from(fallback.output);
        self
    }

    /// Names of the selections that are still blank
    pub fn blank_selections(&self) -> Vec<&'static str> {
        [
            ("transfer manager", &self.manager),
            ("input plugin", &self.input),
            ("output plugin", &self.output),
        ]
        .into_iter()
        .filter(|(_, s)| s.name.trim().is_empty())
        .map(|(label, _)| label)
        .collect()
    }
}
