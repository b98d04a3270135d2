use std::path::Path;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::configs::settings::{Settings, SettingsConfig};
use crate::registry::{Action, Target, TargetRegistry};
use crate::types::{KilnError, KilnResult};

pub const MANIFEST_FILE: &str = "kiln.yml";

/// One shell command or a list of them
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(untagged)]
pub enum Commands {
    Single(String),
    Multiple(Vec<String>),
}

impl Commands {
    pub fn to_vec(&self) -> Vec<String> {
        match self {
            Commands::Single(cmd) => vec![cmd.clone()],
            Commands::Multiple(cmds) => cmds.clone(),
        }
    }
}

/// Two command bodies for one target, picked by whether a setting is set
#[derive(Deserialize, Serialize, JsonSchema, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct VariantConfig {
    /// Setting name as used in `{placeholders}`, e.g. `preexistingToolkitPath`.
    pub setting: String,
    pub when_set: Commands,
    pub when_unset: Commands,
}

#[derive(Deserialize, Serialize, JsonSchema, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct TargetConfig {
    pub name: String,
    pub description: Option<String>,
    pub dependencies: Option<Vec<String>>,
    /// Shell commands run in the workspace. Targets without commands or a
    /// variant only group their dependencies.
    pub commands: Option<Commands>,
    pub variant: Option<VariantConfig>,
}

#[derive(Deserialize, Serialize, JsonSchema, Clone, Debug, Default, PartialEq)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ManifestConfig {
    pub settings: Option<SettingsConfig>,
    /// Targets run when none are named on the command line.
    pub default: Option<Vec<String>>,
    #[serde(default)]
    pub targets: Vec<TargetConfig>,
}

pub fn parse_manifest(yaml_str: &str) -> KilnResult<ManifestConfig> {
    let config: ManifestConfig = serde_yaml::from_str(yaml_str)?;
    Ok(config)
}

pub fn load_manifest(path: &Path) -> KilnResult<ManifestConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        KilnError::Config(format!("Failed to read manifest {}: {}", path.display(), e))
    })?;
    parse_manifest(&content).map_err(|e| {
        KilnError::Config(format!("Failed to parse manifest {}: {}", path.display(), e))
    })
}

/// JSON schema of the manifest format
pub fn manifest_schema() -> serde_json::Value {
    serde_json::to_value(schemars::schema_for!(ManifestConfig)).unwrap_or_default()
}

/// Register every manifest target, resolving variants against `settings`
pub fn register_manifest_targets(
    registry: &mut TargetRegistry,
    manifest: &ManifestConfig,
    settings: &Settings,
) -> KilnResult<()> {
    for config in &manifest.targets {
        let dependencies = config.dependencies.clone().unwrap_or_default();

        match (&config.commands, &config.variant) {
            (Some(_), Some(_)) => {
                return Err(KilnError::Config(format!(
                    "Target '{}' has both commands and a variant",
                    config.name
                )));
            }
            (None, Some(variant)) => {
                let condition = settings
                    .is_set(&variant.setting)
                    .map_err(|e| KilnError::Config(format!("Target '{}': {}", config.name, e)))?;
                registry.register_variant(
                    &config.name,
                    dependencies,
                    config.description.as_deref(),
                    condition,
                    || Action::shell(variant.when_set.to_vec()),
                    || Action::shell(variant.when_unset.to_vec()),
                )?;
            }
            (Some(commands), None) => {
                let mut target = Target::new(&config.name, dependencies, Action::shell(commands.to_vec()));
                target.description = config.description.clone();
                registry.register(target)?;
            }
            (None, None) => {
                let mut target = Target::aggregate(&config.name, dependencies);
                target.description = config.description.clone();
                registry.register(target)?;
            }
        }
    }

    if let Some(default) = &manifest.default {
        registry.set_default_targets(default.clone());
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution::command::RecordingRunner;
    use crate::execution::runner::Executor;
    use crate::markers::InMemoryMarkerStore;
    use crate::resolver::resolve;
    use crate::variants::{FixedSelector, ToolchainVariant};
    use std::path::PathBuf;

    const MANIFEST: &str = r#"
settings:
  runtimeVersion: "3.8"
default: [all]
targets:
  - name: fetch
    description: Clone sources
    commands: "git clone https://example.com/src.git {workspace}/src"
  - name: kaldi
    variant:
      setting: preexistingToolkitPath
      whenSet: "ln -s {preexistingToolkitPath} {workspace}/kaldi"
      whenUnset:
        - "git clone https://example.com/kaldi.git {workspace}/kaldi"
        - "make -C {workspace}/kaldi/tools"
  - name: all
    dependencies: [fetch, kaldi]
"#;

    fn settings(config: SettingsConfig) -> Settings {
        Settings::from_config(config, Path::new("/work"))
    }

    #[test]
    fn test_parse_manifest() {
        let manifest = parse_manifest(MANIFEST).unwrap();
        assert_eq!(
            manifest.settings.as_ref().unwrap().runtime_version.as_deref(),
            Some("3.8")
        );
        assert_eq!(manifest.default, Some(vec!["all".to_string()]));
        assert_eq!(manifest.targets.len(), 3);
        assert_eq!(
            manifest.targets[0].commands,
            Some(Commands::Single(
                "git clone https://example.com/src.git {workspace}/src".to_string()
            ))
        );
        assert!(manifest.targets[2].commands.is_none());
    }

    #[test]
    fn test_unknown_fields_are_rejected() {
        let err = parse_manifest("targets:\n  - name: a\n    comands: echo\n").unwrap_err();
        assert!(err.to_string().contains("comands"));
    }

    #[test]
    fn test_variant_follows_setting() {
        let temp_dir = tempfile::tempdir().unwrap();
        let manifest = parse_manifest(MANIFEST).unwrap();
        let selector = FixedSelector(ToolchainVariant::Legacy {
            framework: "0.4.1".to_string(),
        });

        // Build from source
        let from_source = Settings::from_config(SettingsConfig::default(), temp_dir.path());
        let mut registry = TargetRegistry::new();
        register_manifest_targets(&mut registry, &manifest, &from_source).unwrap();
        let runner = RecordingRunner::new();
        let markers = InMemoryMarkerStore::new();
        Executor::new(&from_source, &runner, &selector, &markers)
            .execute(&registry, &["kaldi".to_string()])
            .unwrap();
        let commands = runner.commands();
        assert_eq!(commands.len(), 2);
        assert!(commands[0].contains("git clone https://example.com/kaldi.git"));
        assert!(commands[1].contains("make -C"));

        // Link a pre-existing checkout
        let linked = Settings::from_config(
            SettingsConfig {
                preexisting_toolkit_path: Some(PathBuf::from("/opt/kaldi")),
                ..Default::default()
            },
            temp_dir.path(),
        );
        let mut registry = TargetRegistry::new();
        register_manifest_targets(&mut registry, &manifest, &linked).unwrap();
        let runner = RecordingRunner::new();
        let markers = InMemoryMarkerStore::new();
        Executor::new(&linked, &runner, &selector, &markers)
            .execute(&registry, &["kaldi".to_string()])
            .unwrap();
        assert_eq!(
            runner.commands(),
            vec![format!(
                "sh -c 'ln -s /opt/kaldi {}/kaldi'",
                temp_dir.path().display()
            )]
        );
    }

    #[test]
    fn test_defaults_and_aggregates() {
        let manifest = parse_manifest(MANIFEST).unwrap();
        let mut registry = TargetRegistry::new();
        register_manifest_targets(&mut registry, &manifest, &settings(SettingsConfig::default()))
            .unwrap();

        assert!(registry.lookup("all").unwrap().is_aggregate());
        assert_eq!(
            registry.lookup("fetch").unwrap().description.as_deref(),
            Some("Clone sources")
        );
        assert_eq!(
            resolve(&registry, &[]).unwrap(),
            vec!["fetch", "kaldi", "all"]
        );
    }

    #[test]
    fn test_commands_and_variant_conflict() {
        let manifest = parse_manifest(
            "targets:\n  - name: a\n    commands: echo\n    variant:\n      setting: cudaHome\n      whenSet: x\n      whenUnset: y\n",
        )
        .unwrap();
        let mut registry = TargetRegistry::new();
        let err = register_manifest_targets(
            &mut registry,
            &manifest,
            &settings(SettingsConfig::default()),
        )
        .unwrap_err();
        assert!(err.to_string().contains("both commands and a variant"));
    }

    #[test]
    fn test_variant_on_unknown_setting() {
        let manifest = parse_manifest(
            "targets:\n  - name: a\n    variant:\n      setting: nope\n      whenSet: x\n      whenUnset: y\n",
        )
        .unwrap();
        let mut registry = TargetRegistry::new();
        let err = register_manifest_targets(
            &mut registry,
            &manifest,
            &settings(SettingsConfig::default()),
        )
        .unwrap_err();
        assert!(err.to_string().contains("unknown setting 'nope'"));
    }

    #[test]
    fn test_duplicate_manifest_targets() {
        let manifest =
            parse_manifest("targets:\n  - name: a\n  - name: a\n    commands: echo\n").unwrap();
        let mut registry = TargetRegistry::new();
        let err = register_manifest_targets(
            &mut registry,
            &manifest,
            &settings(SettingsConfig::default()),
        )
        .unwrap_err();
        assert!(matches!(err, KilnError::DuplicateTarget { .. }));
    }

    #[test]
    fn test_schema_mentions_targets() {
        let schema = manifest_schema();
        let rendered = schema.to_string();
        assert!(rendered.contains("targets"));
        assert!(rendered.contains("whenUnset"));
    }
}
