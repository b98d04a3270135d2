//! Execution-time variant selection
//!
//! Extension builds behave differently depending on which framework is
//! installed and which compiler is available. Actions ask a
//! [`VariantSelector`] once and branch on the returned [`ToolchainVariant`],
//! which keeps the decision testable without a real toolchain.

use std::cmp::Ordering;

use crate::configs::settings::Settings;
use crate::execution::command::{CommandRunner, Invocation};

/// Frameworks at or above this major version need a modern C++ ABI
pub const MODERN_FRAMEWORK_MAJOR: u64 = 1;
/// Oldest compiler able to build extensions for a modern framework
pub const MIN_MODERN_COMPILER: &str = "5.0";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolchainVariant {
    /// Framework predates the ABI change; any compiler will do.
    Legacy { framework: String },
    /// Modern framework and a compiler new enough to build against it.
    Modern { framework: String, compiler: String },
    /// Modern framework but the compiler is too old or could not be probed.
    Unsupported {
        framework: String,
        compiler: Option<String>,
        required: String,
    },
}

impl ToolchainVariant {
    /// Pick a variant from a framework version and an optional compiler version
    pub fn classify(framework: &str, compiler: Option<&str>) -> ToolchainVariant {
        let major = LooseVersion::parse(framework).major().unwrap_or(0);
        if major < MODERN_FRAMEWORK_MAJOR {
            return ToolchainVariant::Legacy {
                framework: framework.to_string(),
            };
        }

        match compiler {
            Some(found) if LooseVersion::parse(found) >= LooseVersion::parse(MIN_MODERN_COMPILER) => {
                ToolchainVariant::Modern {
                    framework: framework.to_string(),
                    compiler: found.to_string(),
                }
            }
            _ => ToolchainVariant::Unsupported {
                framework: framework.to_string(),
                compiler: compiler.map(str::to_string),
                required: MIN_MODERN_COMPILER.to_string(),
            },
        }
    }
}

/// Capability queried by actions that need to branch on the toolchain
pub trait VariantSelector {
    fn select(&self, settings: &Settings, runner: &dyn CommandRunner) -> ToolchainVariant;
}

/// Asks the provisioned interpreter which framework version is installed,
/// falling back to the configured version, and combines it with the compiler
/// version probed at startup.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProbeSelector;

impl VariantSelector for ProbeSelector {
    fn select(&self, settings: &Settings, runner: &dyn CommandRunner) -> ToolchainVariant {
        let python = settings.provisioned_python();
        let invocation = Invocation::new(python.display().to_string())
            .arg("-c")
            .arg("import torch; print(torch.__version__)");

        let installed = runner
            .run(&invocation)
            .ok()
            .filter(|output| output.success)
            .map(|output| output.stdout.trim().to_string())
            .filter(|version| !version.is_empty());

        let framework = installed.unwrap_or_else(|| settings.framework_version.clone());
        ToolchainVariant::classify(&framework, settings.toolchain_version_probe.as_deref())
    }
}

/// Always answers with the same variant
#[derive(Debug, Clone)]
pub struct FixedSelector(pub ToolchainVariant);

impl VariantSelector for FixedSelector {
    fn select(&self, _settings: &Settings, _runner: &dyn CommandRunner) -> ToolchainVariant {
        self.0.clone()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Component {
    Number(u64),
    Text(String),
}

impl PartialOrd for Component {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Component {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Component::Number(a), Component::Number(b)) => a.cmp(b),
            (Component::Text(a), Component::Text(b)) => a.cmp(b),
            (Component::Number(_), Component::Text(_)) => Ordering::Greater,
            (Component::Text(_), Component::Number(_)) => Ordering::Less,
        }
    }
}

/// Version string compared component by component: runs of digits compare
/// numerically, runs of letters lexically, everything else separates.
/// `"1.10.0" > "1.9"` and `"7.5.0" > "5.0"`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct LooseVersion(Vec<Component>);

impl LooseVersion {
    pub fn parse(version: &str) -> LooseVersion {
        let mut components = Vec::new();
        let mut chars = version.trim().chars().peekable();

        while let Some(&c) = chars.peek() {
            if c.is_ascii_digit() {
                let mut digits = String::new();
                while let Some(&d) = chars.peek() {
                    if !d.is_ascii_digit() {
                        break;
                    }
                    digits.push(d);
                    chars.next();
                }
                components.push(Component::Number(digits.parse().unwrap_or(u64::MAX)));
            } else if c.is_ascii_alphabetic() {
                let mut text = String::new();
                while let Some(&d) = chars.peek() {
                    if !d.is_ascii_alphabetic() {
                        break;
                    }
                    text.push(d);
                    chars.next();
                }
                components.push(Component::Text(text));
            } else {
                chars.next();
            }
        }

        LooseVersion(components)
    }

    pub fn major(&self) -> Option<u64> {
        match self.0.first() {
            Some(Component::Number(n)) => Some(*n),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::configs::settings::SettingsConfig;
    use crate::execution::command::{CommandOutput, RecordingRunner};
    use std::path::Path;

    #[test]
    fn test_loose_version_ordering() {
        assert!(LooseVersion::parse("1.10.0") > LooseVersion::parse("1.9"));
        assert!(LooseVersion::parse("7.5.0") > LooseVersion::parse("5.0"));
        assert!(LooseVersion::parse("5") < LooseVersion::parse("5.0"));
        assert!(LooseVersion::parse("4.8.5") < LooseVersion::parse("5.0"));
        assert!(LooseVersion::parse("1.0.0rc1") < LooseVersion::parse("1.0.1"));
        assert_eq!(LooseVersion::parse("2.1.0+cu118").major(), Some(2));
        assert_eq!(LooseVersion::parse("").major(), None);
    }

    #[test]
    fn test_classify() {
        assert_eq!(
            ToolchainVariant::classify("0.4.1", None),
            ToolchainVariant::Legacy {
                framework: "0.4.1".to_string()
            }
        );
        assert_eq!(
            ToolchainVariant::classify("1.0.0", Some("7.5.0")),
            ToolchainVariant::Modern {
                framework: "1.0.0".to_string(),
                compiler: "7.5.0".to_string()
            }
        );
        assert!(matches!(
            ToolchainVariant::classify("1.0.0", Some("4.8.5")),
            ToolchainVariant::Unsupported { .. }
        ));
        assert!(matches!(
            ToolchainVariant::classify("2.1.0", None),
            ToolchainVariant::Unsupported { compiler: None, .. }
        ));
    }

    #[test]
    fn test_probe_selector_prefers_installed_framework() {
        let mut settings = Settings::from_config(SettingsConfig::default(), Path::new("/work"));
        settings.toolchain_version_probe = Some("4.8.5".to_string());

        let runner = RecordingRunner::new()
            .respond("torch.__version__", CommandOutput::succeeded("0.4.1\n"));
        let variant = ProbeSelector.select(&settings, &runner);

        assert_eq!(
            variant,
            ToolchainVariant::Legacy {
                framework: "0.4.1".to_string()
            }
        );
        assert!(runner.commands()[0].starts_with("/work/miniconda/bin/python -c"));
    }

    #[test]
    fn test_probe_selector_falls_back_to_configured_framework() {
        let mut settings = Settings::from_config(SettingsConfig::default(), Path::new("/work"));
        settings.toolchain_version_probe = Some("9.3.0".to_string());

        let runner = RecordingRunner::new().respond(
            "torch.__version__",
            CommandOutput::failed(1, "ModuleNotFoundError: No module named 'torch'"),
        );
        let variant = ProbeSelector.select(&settings, &runner);

        assert_eq!(
            variant,
            ToolchainVariant::Modern {
                framework: "1.0.0".to_string(),
                compiler: "9.3.0".to_string()
            }
        );
    }
}
