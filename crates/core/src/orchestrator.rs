//! High-level orchestration interface
//!
//! This module provides the [`Orchestrator`], the primary entry point for the
//! CLI. It resolves configuration once, builds the target registry (from a
//! manifest or the built-in recipe) and exposes planning, running, listing and
//! graph inspection.
//!
//! ## Example
//!
//! ```rust,no_run
//! use kiln_core::orchestrator::{Orchestrator, OrchestratorConfig};
//! use std::path::PathBuf;
//!
//! # fn example() -> kiln_core::types::KilnResult<()> {
//! let orchestrator = Orchestrator::new(OrchestratorConfig {
//!     invocation_dir: PathBuf::from("."),
//!     manifest_path: None,
//!     overrides: Default::default(),
//! })?;
//!
//! // What would run for the default targets
//! let plan = orchestrator.plan(&[])?;
//!
//! // Provision everything
//! orchestrator.run(&[])?;
//! # Ok(())
//! # }
//! ```

use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::configs::manifest::{load_manifest, register_manifest_targets, MANIFEST_FILE};
use crate::configs::settings::{Settings, SettingsConfig};
use crate::execution::command::{CommandRunner, ProcessCommandRunner};
use crate::execution::runner::Executor;
use crate::markers::{FileMarkerStore, MarkerStore};
use crate::registry::TargetRegistry;
use crate::resolver::resolve;
use crate::results::{
    DependencyGraphResult, PlanResult, RunEvent, RunReport, TargetInfo, TargetListResult,
};
use crate::toolchain::register_recipe;
use crate::types::{KilnError, KilnResult};
use crate::variants::{ProbeSelector, VariantSelector};

/// Configuration for initializing an orchestrator
#[derive(Debug, Clone, Default)]
pub struct OrchestratorConfig {
    /// Directory kiln was invoked from; relative paths and markers are anchored here.
    pub invocation_dir: PathBuf,
    /// Explicit manifest. When `None`, `kiln.yml` in the invocation directory
    /// is used if present, otherwise the built-in recipe.
    pub manifest_path: Option<PathBuf>,
    /// Settings from the command line and environment.
    pub overrides: SettingsConfig,
}

/// Where the registered targets came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetSource {
    Manifest(PathBuf),
    BuiltIn,
}

pub struct Orchestrator {
    pub settings: Settings,
    pub registry: TargetRegistry,
    pub source: TargetSource,
    runner: Box<dyn CommandRunner>,
    selector: Box<dyn VariantSelector>,
    markers: Box<dyn MarkerStore>,
}

impl Orchestrator {
    pub fn new(config: OrchestratorConfig) -> KilnResult<Self> {
        let manifest_path = Self::locate_manifest(&config)?;
        let manifest = manifest_path.as_deref().map(load_manifest).transpose()?;

        let file_settings = manifest
            .as_ref()
            .and_then(|m| m.settings.clone())
            .unwrap_or_default();
        let runner = ProcessCommandRunner::new();
        let settings = Settings::resolve(
            config.overrides.merge(file_settings),
            &config.invocation_dir,
            &runner,
        );
        debug!(?settings, "resolved settings");

        let mut registry = TargetRegistry::new();
        let source = match (&manifest, manifest_path) {
            (Some(manifest), Some(path)) => {
                register_manifest_targets(&mut registry, manifest, &settings)?;
                TargetSource::Manifest(path)
            }
            _ => {
                register_recipe(&mut registry, &settings)?;
                TargetSource::BuiltIn
            }
        };
        registry.validate()?;

        let markers = FileMarkerStore::new(&settings.marker_dir);
        Ok(Self::from_parts(
            settings,
            registry,
            source,
            Box::new(runner),
            Box::new(ProbeSelector),
            Box::new(markers),
        ))
    }

    /// Assemble an orchestrator from already-built parts
    pub fn from_parts(
        settings: Settings,
        registry: TargetRegistry,
        source: TargetSource,
        runner: Box<dyn CommandRunner>,
        selector: Box<dyn VariantSelector>,
        markers: Box<dyn MarkerStore>,
    ) -> Self {
        Self {
            settings,
            registry,
            source,
            runner,
            selector,
            markers,
        }
    }

    /// Execution order for `targets`, or for the default targets when empty
    pub fn resolve(&self, targets: &[String]) -> KilnResult<Vec<String>> {
        resolve(&self.registry, targets)
    }

    pub fn plan(&self, targets: &[String]) -> KilnResult<PlanResult> {
        let order = self.resolve(targets)?;
        self.executor().plan(&self.registry, &order)
    }

    pub fn run(&self, targets: &[String]) -> KilnResult<RunReport> {
        self.run_with(targets, &mut |_| {})
    }

    /// Run `targets`, reporting each step to `on_event` as it happens
    pub fn run_with(
        &self,
        targets: &[String],
        on_event: &mut dyn FnMut(RunEvent<'_>),
    ) -> KilnResult<RunReport> {
        let order = self.resolve(targets)?;
        info!(
            workspace = %self.settings.workspace_path.display(),
            markers = %self.settings.marker_dir.display(),
            "resolved {} target(s)",
            order.len()
        );
        self.executor()
            .execute_with(&self.registry, &order, on_event)
    }

    pub fn list(&self) -> KilnResult<TargetListResult> {
        let executor = self.executor();
        let targets = self
            .registry
            .targets()
            .map(|target| {
                Ok(TargetInfo {
                    name: target.name.clone(),
                    description: target.description.clone(),
                    dependencies: target.dependencies.clone(),
                    status: executor.status(&self.registry, &target.name)?,
                })
            })
            .collect::<KilnResult<Vec<_>>>()?;

        Ok(TargetListResult {
            targets,
            default_targets: self.registry.default_targets(),
        })
    }

    pub fn dependency_graph(&self) -> DependencyGraphResult {
        DependencyGraphResult {
            graph: self.registry.dependency_graph(),
            cycles: self.registry.cycles(),
        }
    }

    fn executor(&self) -> Executor<'_> {
        Executor::new(
            &self.settings,
            self.runner.as_ref(),
            self.selector.as_ref(),
            self.markers.as_ref(),
        )
    }

    fn locate_manifest(config: &OrchestratorConfig) -> KilnResult<Option<PathBuf>> {
        match &config.manifest_path {
            Some(path) => {
                let path = anchor(&config.invocation_dir, path);
                if path.is_file() {
                    Ok(Some(path))
                } else {
                    Err(KilnError::Config(format!(
                        "Manifest {} does not exist",
                        path.display()
                    )))
                }
            }
            None => {
                let default = config.invocation_dir.join(MANIFEST_FILE);
                Ok(default.is_file().then_some(default))
            }
        }
    }
}

fn anchor(base: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution::command::RecordingRunner;
    use crate::markers::InMemoryMarkerStore;
    use crate::results::TargetStatus;
    use crate::variants::{FixedSelector, ToolchainVariant};

    const MANIFEST: &str = r#"
settings:
  frameworkVersion: "1.4.0"
  cxx: kiln-missing-compiler
default: [all]
targets:
  - name: a
    commands: "mkdir -p {workspace}/a"
  - name: b
    dependencies: [a]
    commands: ["touch {workspace}/a/b"]
  - name: all
    description: Everything
    dependencies: [a, b]
"#;

    fn names(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_manifest_in_invocation_dir_is_picked_up() {
        let temp_dir = tempfile::tempdir().unwrap();
        std::fs::write(temp_dir.path().join("kiln.yml"), MANIFEST).unwrap();

        let orchestrator = Orchestrator::new(OrchestratorConfig {
            invocation_dir: temp_dir.path().to_path_buf(),
            manifest_path: None,
            overrides: SettingsConfig {
                workspace_path: Some(PathBuf::from("tools")),
                ..Default::default()
            },
        })
        .unwrap();

        assert_eq!(
            orchestrator.source,
            TargetSource::Manifest(temp_dir.path().join("kiln.yml"))
        );
        assert_eq!(orchestrator.settings.framework_version, "1.4.0");
        assert_eq!(
            orchestrator.settings.workspace_path,
            temp_dir.path().join("tools")
        );
        assert!(orchestrator.settings.toolchain_version_probe.is_none());

        let plan = orchestrator.plan(&[]).unwrap();
        assert_eq!(plan.pending(), vec!["a", "b"]);

        let report = orchestrator.run(&[]).unwrap();
        assert_eq!(report.executed, names(&["a", "b"]));
        assert!(temp_dir.path().join("tools/a/b").is_file());
        assert!(temp_dir.path().join("a.done").is_file());
        assert!(temp_dir.path().join("b.done").is_file());

        let report = orchestrator.run(&[]).unwrap();
        assert!(report.is_noop());

        let listing = orchestrator.list().unwrap();
        assert_eq!(listing.default_targets, names(&["all"]));
        assert_eq!(listing.targets[0].status, TargetStatus::Done);
        assert_eq!(listing.targets[2].status, TargetStatus::Aggregate);
        assert_eq!(listing.targets[2].description.as_deref(), Some("Everything"));
    }

    #[test]
    fn test_overrides_beat_manifest_settings() {
        let temp_dir = tempfile::tempdir().unwrap();
        std::fs::write(temp_dir.path().join("kiln.yml"), MANIFEST).unwrap();

        let orchestrator = Orchestrator::new(OrchestratorConfig {
            invocation_dir: temp_dir.path().to_path_buf(),
            manifest_path: None,
            overrides: SettingsConfig {
                framework_version: Some("2.1.0".to_string()),
                ..Default::default()
            },
        })
        .unwrap();

        assert_eq!(orchestrator.settings.framework_version, "2.1.0");
    }

    #[test]
    fn test_missing_explicit_manifest_is_an_error() {
        let temp_dir = tempfile::tempdir().unwrap();
        let result = Orchestrator::new(OrchestratorConfig {
            invocation_dir: temp_dir.path().to_path_buf(),
            manifest_path: Some(PathBuf::from("missing.yml")),
            overrides: SettingsConfig::default(),
        });

        let err = result.err().unwrap();
        assert!(err.to_string().contains("missing.yml"));
    }

    #[test]
    fn test_builtin_recipe_without_manifest() {
        let temp_dir = tempfile::tempdir().unwrap();
        let orchestrator = Orchestrator::new(OrchestratorConfig {
            invocation_dir: temp_dir.path().to_path_buf(),
            manifest_path: None,
            overrides: SettingsConfig {
                cxx: Some("kiln-missing-compiler".to_string()),
                ..Default::default()
            },
        })
        .unwrap();

        assert_eq!(orchestrator.source, TargetSource::BuiltIn);
        assert!(orchestrator.registry.contains("warp-transducer"));
        assert!(orchestrator.dependency_graph().cycles.is_empty());
    }

    #[test]
    fn test_unknown_target_fails_before_any_action() {
        let temp_dir = tempfile::tempdir().unwrap();
        let settings = Settings::from_config(SettingsConfig::default(), temp_dir.path());
        let mut registry = TargetRegistry::new();
        register_recipe(&mut registry, &settings).unwrap();

        let orchestrator = Orchestrator::from_parts(
            settings,
            registry,
            TargetSource::BuiltIn,
            Box::new(RecordingRunner::new()),
            Box::new(FixedSelector(ToolchainVariant::Legacy {
                framework: "0.4.1".to_string(),
            })),
            Box::new(InMemoryMarkerStore::new()),
        );

        let err = orchestrator
            .run(&names(&["moses", "espnet"]))
            .unwrap_err();
        assert!(matches!(err, KilnError::UnknownTarget { ref name, .. } if name == "espnet"));
        assert!(orchestrator.list().unwrap().targets.iter().all(|t| t.status != TargetStatus::Done));
    }

    #[test]
    fn test_cyclic_manifest_is_rejected_before_any_action() {
        let temp_dir = tempfile::tempdir().unwrap();
        std::fs::write(
            temp_dir.path().join("kiln.yml"),
            "settings:\n  cxx: kiln-missing-compiler\ntargets:\n  - name: a\n    dependencies: [b]\n    commands: \"touch {workspace}/ran\"\n  - name: b\n    dependencies: [a]\n    commands: \"touch {workspace}/ran\"\n",
        )
        .unwrap();

        let orchestrator = Orchestrator::new(OrchestratorConfig {
            invocation_dir: temp_dir.path().to_path_buf(),
            manifest_path: Some(PathBuf::from("kiln.yml")),
            overrides: SettingsConfig::default(),
        })
        .unwrap();

        assert_eq!(orchestrator.dependency_graph().cycles.len(), 1);
        let err = orchestrator.run(&[]).unwrap_err();
        assert!(matches!(err, KilnError::CyclicDependency { .. }));
        assert!(!temp_dir.path().join("ran").exists());
    }
}
