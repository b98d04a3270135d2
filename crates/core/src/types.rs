use thiserror::Error;

/// The main error type for kiln operations
#[derive(Debug, Error)]
pub enum KilnError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error(
        "Unknown target '{name}'{}",
        .required_by.as_ref().map(|d| format!(" (required by '{}')", d)).unwrap_or_default()
    )]
    UnknownTarget {
        name: String,
        /// Target that declared the missing name as a dependency
        required_by: Option<String>,
    },

    #[error("Target '{name}' is registered more than once")]
    DuplicateTarget { name: String },

    #[error("Circular dependency detected: {}", cycle.join(" -> "))]
    CyclicDependency { cycle: Vec<String> },

    #[error("Target '{name}' failed: {source}")]
    TargetFailed {
        name: String,
        #[source]
        source: ActionError,
    },
}

/// Failure reported by a target's action
#[derive(Debug, Error)]
pub enum ActionError {
    #[error("failed to start `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("`{command}` exited with {}\n{output}", code.map_or_else(|| "a signal".to_string(), |c| format!("code {}", c)))]
    CommandFailed {
        command: String,
        code: Option<i32>,
        output: String,
    },

    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("template error: {0}")]
    Template(String),

    #[error("{0}")]
    Unsupported(String),
}

impl ActionError {
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }
}

/// Result type alias for kiln operations
pub type KilnResult<T> = Result<T, KilnError>;
