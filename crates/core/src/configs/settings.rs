use std::path::{Path, PathBuf};

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::execution::command::{CommandRunner, Invocation};
use crate::types::ActionError;

pub const DEFAULT_RUNTIME_VERSION: &str = "3.7";
pub const DEFAULT_FRAMEWORK_VERSION: &str = "1.0.0";
pub const DEFAULT_CXX: &str = "g++";

/// One layer of configuration values. Layers come from the command line, the
/// environment and the manifest's `settings:` section, and are merged before
/// being resolved into [`Settings`].
#[derive(Debug, Default, Deserialize, Serialize, JsonSchema, Clone, PartialEq)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SettingsConfig {
    /// Existing Python interpreter to build a virtualenv from instead of installing Miniconda.
    pub interpreter_override: Option<PathBuf>,
    /// Python version installed into the provisioned environment.
    pub runtime_version: Option<String>,
    /// PyTorch version installed into the provisioned environment.
    pub framework_version: Option<String>,
    /// Existing Kaldi checkout to link instead of building from source.
    pub preexisting_toolkit_path: Option<PathBuf>,
    /// Root directory for all provisioned artifacts.
    pub workspace_path: Option<PathBuf>,
    /// Directory holding the `<target>.done` markers.
    pub marker_dir: Option<PathBuf>,
    /// C++ compiler whose version is probed at startup.
    pub cxx: Option<String>,
    /// CUDA installation forwarded to extension builds.
    pub cuda_home: Option<PathBuf>,
    /// Source tree installed into the environment in editable mode.
    pub source_path: Option<PathBuf>,
}

impl SettingsConfig {
    /// Fill every unset value of `self` from `lower`
    pub fn merge(self, lower: SettingsConfig) -> SettingsConfig {
        SettingsConfig {
            interpreter_override: self.interpreter_override.or(lower.interpreter_override),
            runtime_version: self.runtime_version.or(lower.runtime_version),
            framework_version: self.framework_version.or(lower.framework_version),
            preexisting_toolkit_path: self
                .preexisting_toolkit_path
                .or(lower.preexisting_toolkit_path),
            workspace_path: self.workspace_path.or(lower.workspace_path),
            marker_dir: self.marker_dir.or(lower.marker_dir),
            cxx: self.cxx.or(lower.cxx),
            cuda_home: self.cuda_home.or(lower.cuda_home),
            source_path: self.source_path.or(lower.source_path),
        }
    }
}

/// Configuration resolved once at startup and read-only afterwards
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    pub interpreter_override: Option<PathBuf>,
    pub runtime_version: String,
    pub framework_version: String,
    pub preexisting_toolkit_path: Option<PathBuf>,
    pub workspace_path: PathBuf,
    pub marker_dir: PathBuf,
    pub cxx: String,
    pub cuda_home: Option<PathBuf>,
    pub source_path: Option<PathBuf>,
    pub toolchain_version_probe: Option<String>,
}

/// Names accepted by [`Settings::lookup`], in the order they are documented
pub const SETTING_KEYS: &[&str] = &[
    "workspace",
    "markerDir",
    "python",
    "interpreterOverride",
    "runtimeVersion",
    "frameworkVersion",
    "preexistingToolkitPath",
    "toolchainVersion",
    "cxx",
    "cudaHome",
    "sourcePath",
];

impl Settings {
    /// Apply defaults to a merged configuration without probing the compiler.
    /// Relative paths are anchored at `invocation_dir`.
    pub fn from_config(config: SettingsConfig, invocation_dir: &Path) -> Settings {
        let absolute = |path: PathBuf| {
            if path.is_absolute() {
                path
            } else {
                invocation_dir.join(path)
            }
        };

        Settings {
            interpreter_override: config.interpreter_override,
            runtime_version: config
                .runtime_version
                .unwrap_or_else(|| DEFAULT_RUNTIME_VERSION.to_string()),
            framework_version: config
                .framework_version
                .unwrap_or_else(|| DEFAULT_FRAMEWORK_VERSION.to_string()),
            preexisting_toolkit_path: config.preexisting_toolkit_path.map(absolute),
            workspace_path: config
                .workspace_path
                .map(absolute)
                .unwrap_or_else(|| invocation_dir.to_path_buf()),
            marker_dir: config
                .marker_dir
                .map(absolute)
                .unwrap_or_else(|| invocation_dir.to_path_buf()),
            cxx: config.cxx.unwrap_or_else(|| DEFAULT_CXX.to_string()),
            cuda_home: config.cuda_home.map(absolute),
            source_path: config.source_path.map(absolute),
            toolchain_version_probe: None,
        }
    }

    /// Resolve a merged configuration and probe the compiler version
    pub fn resolve(
        config: SettingsConfig,
        invocation_dir: &Path,
        runner: &dyn CommandRunner,
    ) -> Settings {
        let mut settings = Self::from_config(config, invocation_dir);
        settings.toolchain_version_probe = probe_compiler_version(&settings.cxx, runner);
        settings
    }

    /// Python interpreter of the provisioned environment
    pub fn provisioned_python(&self) -> PathBuf {
        if self.interpreter_override.is_some() {
            self.workspace_path.join("venv").join("bin").join("python")
        } else {
            self.workspace_path.join("miniconda").join("bin").join("python")
        }
    }

    /// Look up a setting by its template name. `None` means the setting is
    /// known but unset; unknown names are an error.
    pub fn lookup(&self, key: &str) -> Result<Option<String>, ActionError> {
        let display = |path: &Path| path.display().to_string();
        let value = match key {
            "workspace" => Some(display(&self.workspace_path)),
            "markerDir" => Some(display(&self.marker_dir)),
            "python" => Some(display(&self.provisioned_python())),
            "interpreterOverride" => self.interpreter_override.as_deref().map(display),
            "runtimeVersion" => Some(self.runtime_version.clone()),
            "frameworkVersion" => Some(self.framework_version.clone()),
            "preexistingToolkitPath" => self.preexisting_toolkit_path.as_deref().map(display),
            "toolchainVersion" => self.toolchain_version_probe.clone(),
            "cxx" => Some(self.cxx.clone()),
            "cudaHome" => self.cuda_home.as_deref().map(display),
            "sourcePath" => self.source_path.as_deref().map(display),
            _ => {
                return Err(ActionError::Template(format!(
                    "unknown setting '{}' (known: {})",
                    key,
                    SETTING_KEYS.join(", ")
                )))
            }
        };
        Ok(value)
    }

    pub fn is_set(&self, key: &str) -> Result<bool, ActionError> {
        Ok(self.lookup(key)?.is_some())
    }

    /// Replace `{name}` placeholders with setting values. `{{` and `}}` are
    /// literal braces.
    pub fn interpolate(&self, template: &str) -> Result<String, ActionError> {
        let mut result = String::with_capacity(template.len());
        let mut chars = template.chars().peekable();

        while let Some(c) = chars.next() {
            match c {
                '{' if chars.peek() == Some(&'{') => {
                    chars.next();
                    result.push('{');
                }
                '}' if chars.peek() == Some(&'}') => {
                    chars.next();
                    result.push('}');
                }
                '{' => {
                    let mut key = String::new();
                    let mut closed = false;
                    for k in chars.by_ref() {
                        if k == '}' {
                            closed = true;
                            break;
                        }
                        key.push(k);
                    }
                    if !closed {
                        return Err(ActionError::Template(format!(
                            "unterminated placeholder in '{}'",
                            template
                        )));
                    }
                    let value = self.lookup(key.trim())?.ok_or_else(|| {
                        ActionError::Template(format!(
                            "setting '{}' is not set but is used in '{}'",
                            key.trim(),
                            template
                        ))
                    })?;
                    result.push_str(&value);
                }
                other => result.push(other),
            }
        }

        Ok(result)
    }
}

fn probe_compiler_version(cxx: &str, runner: &dyn CommandRunner) -> Option<String> {
    let invocation = Invocation::new(cxx).arg("-dumpversion");
    match runner.run(&invocation) {
        Ok(output) if output.success => {
            let version = output.stdout.trim().to_string();
            debug!(compiler = cxx, version = %version, "probed compiler version");
            if version.is_empty() {
                None
            } else {
                Some(version)
            }
        }
        Ok(output) => {
            warn!(
                compiler = cxx,
                "could not determine compiler version: {}",
                output.tail(5)
            );
            None
        }
        Err(e) => {
            warn!(compiler = cxx, "could not determine compiler version: {}", e);
            None
        }
    }
}
