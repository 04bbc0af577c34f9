//! Application state: the loaded configuration and the wiring of the
//! concrete infra adapters into the engine.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;

use reforge_core::capability::{BoxCapabilityProvider, CapabilityRegistry};
use reforge_core::engine::{EngineOptions, MigrationEngine};
use reforge_core::graph::Coordinator;
use reforge_infra::config::load_config;
use reforge_infra::pipeline::{PipelineDefinition, PipelineGraphFactory, load_pipeline};
use reforge_infra::plan::JsonPlanStore;
use reforge_infra::reasoning::OpenAiReasoningProvider;
use reforge_infra::record::JsonRunRecordStore;
use reforge_infra::snapshot::LocalSnapshotManager;
use reforge_infra::tool::CommandToolProvider;
use reforge_types::config::ReforgeConfig;
use reforge_types::task::DEFAULT_HUMAN_CAPABILITY;

use crate::human::TerminalHumanInput;

/// The engine pinned to the filesystem adapters.
pub type ConcreteEngine = MigrationEngine<JsonPlanStore, LocalSnapshotManager, JsonRunRecordStore>;

pub struct AppState {
    pub config: ReforgeConfig,
    pub config_path: PathBuf,
}

impl AppState {
    pub async fn load(config_path: &Path) -> anyhow::Result<Self> {
        let config = load_config(config_path)
            .await
            .with_context(|| format!("failed to load {}", config_path.display()))?;
        Ok(Self {
            config,
            config_path: config_path.to_path_buf(),
        })
    }

    pub fn plan_store(&self) -> JsonPlanStore {
        JsonPlanStore::new(&self.config.paths.plan_file)
    }

    pub async fn pipeline(&self) -> anyhow::Result<PipelineDefinition> {
        Ok(load_pipeline(&self.config.paths.pipeline_file).await?)
    }

    /// Capability names the configuration provides, the human gate included.
    pub fn capability_names(&self) -> BTreeSet<String> {
        self.config
            .tools
            .keys()
            .chain(self.config.reasoning.keys())
            .cloned()
            .chain(std::iter::once(DEFAULT_HUMAN_CAPABILITY.to_string()))
            .collect()
    }

    /// Instantiate every configured provider. Reasoning providers read their
    /// API keys here.
    pub fn build_registry(&self) -> anyhow::Result<CapabilityRegistry> {
        let mut registry = CapabilityRegistry::new();
        for (name, tool) in &self.config.tools {
            registry.register(BoxCapabilityProvider::new(CommandToolProvider::new(
                name,
                tool.clone(),
            )));
        }
        for (name, reasoning) in &self.config.reasoning {
            registry.register(BoxCapabilityProvider::new(OpenAiReasoningProvider::from_config(
                name, reasoning,
            )?));
        }

        let mut human = TerminalHumanInput::new(DEFAULT_HUMAN_CAPABILITY);
        if let Some(secs) = self.config.engine.human_gate_timeout_secs {
            human = human.with_timeout(Duration::from_secs(secs));
        }
        registry.register(BoxCapabilityProvider::new(human));

        tracing::debug!(providers = ?registry.list_names(), "capability registry ready");
        Ok(registry)
    }

    pub async fn build_engine(&self) -> anyhow::Result<ConcreteEngine> {
        let pipeline = self.pipeline().await?;
        pipeline.validate()?;
        let registry = self.build_registry()?;

        let paths = &self.config.paths;
        let options = EngineOptions {
            initial_baseline: paths.baseline.clone(),
            max_attempts_per_step: self.config.engine.max_attempts_per_step,
            resume: self.config.engine.resume,
        };
        let snapshots = LocalSnapshotManager::new(&paths.workspace_dir)
            .with_exclude(self.config.snapshot.exclude.iter().cloned());

        Ok(MigrationEngine::new(
            self.plan_store(),
            snapshots,
            JsonRunRecordStore::new(&paths.state_file),
            PipelineGraphFactory::new(pipeline),
            Coordinator::new(Arc::new(registry)),
            options,
        ))
    }
}
