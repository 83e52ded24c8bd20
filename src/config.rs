//! Bridge configuration.
//!
//! The Kotlin side can hand over a JSON document before the first launch;
//! any field left out falls back to the values the activity has always used
//! (`node --trace-warnings <project>/main.js`).

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::args::NulPolicy;
use crate::error::LaunchError;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BridgeConfig {
    /// Value passed as `argv[0]`
    #[serde(default = "default_program")]
    pub program: String,
    /// Runtime options placed between the program name and the entry script
    #[serde(default = "default_node_options")]
    pub node_options: Vec<String>,
    /// Entry script, relative to the project directory
    #[serde(default = "default_entry_script")]
    pub entry_script: String,
    #[serde(default)]
    pub nul_policy: NulPolicy,
    /// Ceiling for the contiguous argument buffer (None = bounded by memory only)
    #[serde(default)]
    pub max_argument_bytes: Option<usize>,
    /// Refuse a second launch in the same process. Node cannot be restarted.
    #[serde(default = "default_true")]
    pub single_start: bool,
    /// Heap limit applied to QuickJS runtimes
    #[serde(default)]
    pub quickjs_memory_limit: Option<usize>,
}

fn default_program() -> String {
    "node".to_string()
}

fn default_node_options() -> Vec<String> {
    vec!["--trace-warnings".to_string()]
}

fn default_entry_script() -> String {
    "main.js".to_string()
}

fn default_true() -> bool {
    true
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            program: default_program(),
            node_options: default_node_options(),
            entry_script: default_entry_script(),
            nul_policy: NulPolicy::default(),
            max_argument_bytes: None,
            single_start: true,
            quickjs_memory_limit: None,
        }
    }
}

impl BridgeConfig {
    pub fn from_json(json: &str) -> Result<Self, LaunchError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Path of the entry script inside a project directory.
    pub fn entry_script_path(&self, project_dir: &Path) -> PathBuf {
        project_dir.join(&self.entry_script)
    }

    /// Full argument list for running a project: program, options, entry script.
    pub fn argv_for_project(&self, project_dir: &Path) -> Vec<String> {
        let mut argv = Vec::with_capacity(self.node_options.len() + 2);
        argv.push(self.program.clone());
        argv.extend(self.node_options.iter().cloned());
        argv.push(self.entry_script_path(project_dir).to_string_lossy().into_owned());
        argv
    }
}
