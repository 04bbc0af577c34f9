//! Configuration types for Reforge.
//!
//! `ReforgeConfig` represents the `reforge.toml` file that locates the plan,
//! the baseline source tree and the pipeline, and configures the engine and
//! the capability providers.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Top-level configuration, loaded from `reforge.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReforgeConfig {
    pub paths: PathsConfig,
    #[serde(default)]
    pub engine: EngineSettings,
    #[serde(default)]
    pub snapshot: SnapshotSettings,
    /// Command tool providers, keyed by capability name.
    #[serde(default)]
    pub tools: BTreeMap<String, ToolConfig>,
    /// Reasoning providers, keyed by capability name.
    #[serde(default)]
    pub reasoning: BTreeMap<String, ReasoningConfig>,
}

/// Filesystem locations. Relative paths resolve against the config file's directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    /// The JSON plan document.
    pub plan_file: PathBuf,
    /// The initial source tree.
    pub baseline: PathBuf,
    /// Directory that receives one working copy per step.
    pub workspace_dir: PathBuf,
    /// YAML pipeline declaring each step's task graph.
    pub pipeline_file: PathBuf,
    /// Where the run record is written.
    #[serde(default = "default_state_file")]
    pub state_file: PathBuf,
}

fn default_state_file() -> PathBuf {
    PathBuf::from(".reforge/state.json")
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineSettings {
    /// Attempts allowed per step before it is marked `failed`. Unset = unbounded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_attempts_per_step: Option<u32>,
    /// Continue from the baseline of the last run record, when it still exists.
    #[serde(default = "default_resume")]
    pub resume: bool,
    /// Bounds the wait for a human decision. Unset = wait forever.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub human_gate_timeout_secs: Option<u64>,
}

fn default_resume() -> bool {
    true
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            max_attempts_per_step: None,
            resume: default_resume(),
            human_gate_timeout_secs: None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SnapshotSettings {
    /// File or directory names skipped when copying the baseline.
    #[serde(default)]
    pub exclude: Vec<String>,
}

/// A deterministic tool: a set of named operations, each an external program.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolConfig {
    /// stdout/stderr are each truncated to their last `max_output_bytes`.
    #[serde(default = "default_max_output_bytes")]
    pub max_output_bytes: usize,
    #[serde(default)]
    pub operations: BTreeMap<String, ToolOperation>,
}

pub const DEFAULT_MAX_OUTPUT_BYTES: usize = 2000;
pub const DEFAULT_TOOL_TIMEOUT_SECS: u64 = 600;

fn default_max_output_bytes() -> usize {
    DEFAULT_MAX_OUTPUT_BYTES
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolOperation {
    pub program: String,
    /// Arguments; may reference `{{ args.<key> }}` and `{{ working_dir }}`.
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default = "default_tool_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_tool_timeout_secs() -> u64 {
    DEFAULT_TOOL_TIMEOUT_SECS
}

/// An OpenAI-compatible chat completion endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReasoningConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    pub model: String,
    /// Name of the environment variable holding the API key.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
}

fn default_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
[paths]
plan_file = "plan.json"
baseline = "src"
workspace_dir = "work"
pipeline_file = "pipeline.yaml"
"#;

    #[test]
    fn test_minimal_config_defaults() {
        let config: ReforgeConfig = toml::from_str(MINIMAL).unwrap();
        assert_eq!(config.paths.state_file, PathBuf::from(".reforge/state.json"));
        assert!(config.engine.resume);
        assert!(config.engine.max_attempts_per_step.is_none());
        assert!(config.engine.human_gate_timeout_secs.is_none());
        assert!(config.snapshot.exclude.is_empty());
        assert!(config.tools.is_empty());
        assert!(config.reasoning.is_empty());
    }

    #[test]
    fn test_full_config_parses() {
        let toml_str = format!(
            r#"{MINIMAL}
[engine]
max_attempts_per_step = 3
resume = false
human_gate_timeout_secs = 120

[snapshot]
exclude = [".git", "target"]

[tools.compiler]
max_output_bytes = 500

[tools.compiler.operations.build]
program = "cargo"
args = ["build", "--manifest-path", "{{{{ working_dir }}}}/Cargo.toml"]

[reasoning.architect]
model = "gpt-4o"
temperature = 0.2
"#
        );
        let config: ReforgeConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(config.engine.max_attempts_per_step, Some(3));
        assert!(!config.engine.resume);
        assert_eq!(config.snapshot.exclude, vec![".git", "target"]);

        let compiler = &config.tools["compiler"];
        assert_eq!(compiler.max_output_bytes, 500);
        let build = &compiler.operations["build"];
        assert_eq!(build.program, "cargo");
        assert_eq!(build.timeout_secs, DEFAULT_TOOL_TIMEOUT_SECS);
        assert_eq!(build.args[2], "{{ working_dir }}/Cargo.toml");

        let architect = &config.reasoning["architect"];
        assert_eq!(architect.base_url, "https://api.openai.com/v1");
        assert_eq!(architect.api_key_env, "OPENAI_API_KEY");
        assert_eq!(architect.temperature, Some(0.2));
    }

    #[test]
    fn test_missing_paths_section_fails() {
        assert!(toml::from_str::<ReforgeConfig>("[engine]\nresume = true\n").is_err());
    }
}
