//! Configuration loader for Reforge.
//!
//! Reads `reforge.toml` into [`ReforgeConfig`]. Unlike the plan document, a
//! missing or malformed config file is fatal: nothing can run without it.
//! Relative paths in `[paths]` resolve against the directory holding the file.

use std::path::{Path, PathBuf};

use reforge_types::config::ReforgeConfig;
use reforge_types::error::ConfigError;
use reforge_types::task::DEFAULT_HUMAN_CAPABILITY;

/// Default config file name looked up in the current directory.
pub const DEFAULT_CONFIG_FILE: &str = "reforge.toml";

/// Load and parse `path`, resolving relative paths against its directory.
pub async fn load_config(path: &Path) -> Result<ReforgeConfig, ConfigError> {
    let content = match tokio::fs::read_to_string(path).await {
        Ok(content) => content,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            return Err(ConfigError::Missing {
                what: "config file",
                path: path.to_path_buf(),
            });
        }
        Err(source) => {
            return Err(ConfigError::Read {
                path: path.to_path_buf(),
                source,
            });
        }
    };

    let mut config = parse_config(&content)
        .map_err(|e| ConfigError::Invalid(format!("{}: {e}", path.display())))?;

    let base = path.parent().unwrap_or_else(|| Path::new(""));
    resolve_paths(&mut config, base);
    tracing::debug!("Loaded configuration from {}", path.display());
    Ok(config)
}

/// Parse config TOML without touching the filesystem.
pub fn parse_config(content: &str) -> Result<ReforgeConfig, toml::de::Error> {
    toml::from_str(content)
}

fn resolve_paths(config: &mut ReforgeConfig, base: &Path) {
    let paths = &mut config.paths;
    for path in [
        &mut paths.plan_file,
        &mut paths.baseline,
        &mut paths.workspace_dir,
        &mut paths.pipeline_file,
        &mut paths.state_file,
    ] {
        *path = resolve(base, path);
    }
}

fn resolve(base: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}

/// Startup checks run before any step: settings are coherent and the
/// required paths exist.
pub async fn validate_config(config: &ReforgeConfig) -> Result<(), ConfigError> {
    if config.engine.max_attempts_per_step == Some(0) {
        return Err(ConfigError::Invalid(
            "engine.max_attempts_per_step must be at least 1".to_string(),
        ));
    }

    for name in config.tools.keys() {
        if config.reasoning.contains_key(name) {
            return Err(ConfigError::Invalid(format!(
                "capability '{name}' is configured both as a tool and as a reasoning provider"
            )));
        }
    }
    for name in config.tools.keys().chain(config.reasoning.keys()) {
        if name == DEFAULT_HUMAN_CAPABILITY {
            return Err(ConfigError::Invalid(format!(
                "capability name '{DEFAULT_HUMAN_CAPABILITY}' is reserved for the human gate"
            )));
        }
    }
    for (tool, cfg) in &config.tools {
        for (operation, op) in &cfg.operations {
            if op.program.trim().is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "tools.{tool}.operations.{operation} has an empty program"
                )));
            }
        }
    }

    let paths = &config.paths;
    if !is_dir(&paths.baseline).await {
        return Err(ConfigError::Missing {
            what: "baseline directory",
            path: paths.baseline.clone(),
        });
    }
    if !is_file(&paths.plan_file).await {
        return Err(ConfigError::Missing {
            what: "plan file",
            path: paths.plan_file.clone(),
        });
    }
    if !is_file(&paths.pipeline_file).await {
        return Err(ConfigError::Missing {
            what: "pipeline file",
            path: paths.pipeline_file.clone(),
        });
    }
    Ok(())
}

async fn is_dir(path: &Path) -> bool {
    tokio::fs::metadata(path)
        .await
        .map(|m| m.is_dir())
        .unwrap_or(false)
}

async fn is_file(path: &Path) -> bool {
    tokio::fs::metadata(path)
        .await
        .map(|m| m.is_file())
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const CONFIG: &str = r#"
[paths]
plan_file = "plan.json"
baseline = "src-tree"
workspace_dir = "work"
pipeline_file = "pipeline.yaml"

[engine]
max_attempts_per_step = 3

[tools.build]
operations.check = { program = "cargo", args = ["check"] }
"#;

    async fn project(config: &str) -> (TempDir, PathBuf) {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path();
        tokio::fs::create_dir_all(root.join("src-tree")).await.unwrap();
        tokio::fs::write(root.join("plan.json"), "[]").await.unwrap();
        tokio::fs::write(root.join("pipeline.yaml"), "tasks: []").await.unwrap();
        let path = root.join(DEFAULT_CONFIG_FILE);
        tokio::fs::write(&path, config).await.unwrap();
        (tmp, path)
    }

    #[tokio::test]
    async fn test_relative_paths_resolve_against_config_dir() {
        let (tmp, path) = project(CONFIG).await;

        let config = load_config(&path).await.unwrap();

        assert_eq!(config.paths.plan_file, tmp.path().join("plan.json"));
        assert_eq!(config.paths.baseline, tmp.path().join("src-tree"));
        assert_eq!(config.paths.state_file, tmp.path().join(".reforge/state.json"));
        assert!(config.engine.resume);
        validate_config(&config).await.unwrap();
    }

    #[tokio::test]
    async fn test_absolute_paths_are_kept() {
        let cfg = CONFIG.replace("\"work\"", "\"/var/reforge/work\"");
        let (_tmp, path) = project(&cfg).await;

        let config = load_config(&path).await.unwrap();

        assert_eq!(config.paths.workspace_dir, PathBuf::from("/var/reforge/work"));
    }

    #[tokio::test]
    async fn test_missing_config_file_is_reported() {
        let tmp = TempDir::new().unwrap();
        let err = load_config(&tmp.path().join("reforge.toml")).await.unwrap_err();
        assert!(matches!(err, ConfigError::Missing { what: "config file", .. }));
    }

    #[tokio::test]
    async fn test_malformed_config_is_invalid() {
        let (_tmp, path) = project("[paths\nplan_file = 1").await;
        let err = load_config(&path).await.unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[tokio::test]
    async fn test_validation_requires_baseline_directory() {
        let (tmp, path) = project(CONFIG).await;
        tokio::fs::remove_dir_all(tmp.path().join("src-tree")).await.unwrap();

        let config = load_config(&path).await.unwrap();
        let err = validate_config(&config).await.unwrap_err();

        assert!(matches!(err, ConfigError::Missing { what: "baseline directory", .. }));
    }

    #[tokio::test]
    async fn test_validation_requires_pipeline_file() {
        let (tmp, path) = project(CONFIG).await;
        tokio::fs::remove_file(tmp.path().join("pipeline.yaml")).await.unwrap();

        let config = load_config(&path).await.unwrap();
        let err = validate_config(&config).await.unwrap_err();

        assert!(matches!(err, ConfigError::Missing { what: "pipeline file", .. }));
    }

    #[tokio::test]
    async fn test_validation_rejects_zero_attempts() {
        let cfg = CONFIG.replace("max_attempts_per_step = 3", "max_attempts_per_step = 0");
        let (_tmp, path) = project(&cfg).await;

        let config = load_config(&path).await.unwrap();

        assert!(matches!(
            validate_config(&config).await.unwrap_err(),
            ConfigError::Invalid(msg) if msg.contains("max_attempts_per_step")
        ));
    }

    #[tokio::test]
    async fn test_validation_rejects_reserved_and_clashing_names() {
        let clash = format!("{CONFIG}\n[reasoning.build]\nmodel = \"gpt-4o\"\n");
        let (_tmp, path) = project(&clash).await;
        let config = load_config(&path).await.unwrap();
        assert!(validate_config(&config).await.is_err());

        let reserved = format!("{CONFIG}\n[reasoning.human]\nmodel = \"gpt-4o\"\n");
        let (_tmp, path) = project(&reserved).await;
        let config = load_config(&path).await.unwrap();
        assert!(matches!(
            validate_config(&config).await.unwrap_err(),
            ConfigError::Invalid(msg) if msg.contains("reserved")
        ));
    }

    #[test]
    fn test_demo_config_parses() {
        let config = parse_config(include_str!("../../../demos/shell-only/reforge.toml")).unwrap();
        assert_eq!(config.engine.max_attempts_per_step, Some(3));
        assert_eq!(config.tools["shell"].operations["check"].timeout_secs, 10);
        assert_eq!(config.tools["shell"].operations["rename"].timeout_secs, 600);
    }
}
