//! Error types for trace-visualiser.

use thiserror::Error;

/// Result type alias using trace-visualiser's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while loading levels or replaying traces.
#[derive(Error, Debug)]
pub enum Error {
    /// A level names a module the catalog cannot construct
    #[error("Module {name} not found in module catalog")]
    UnknownModule { name: String },

    /// Registry lookup for an id that was never registered
    #[error("Module {id} not found")]
    ModuleNotFound { id: String },

    /// Registry lookup succeeded but the module is not of the requested type
    #[error("Module {id} is not a {expected}")]
    ModuleTypeMismatch { id: String, expected: &'static str },

    /// The module is locked by an in-progress call, typically because a bus
    /// listener tried to read the module that is publishing
    #[error("Module {id} is busy handling another call")]
    ModuleBusy { id: String },

    /// A module depends on a module the level does not load
    #[error("Module {module} depends on {dependency}, which is not loaded by this level")]
    MissingDependency { module: String, dependency: String },

    /// Module dependencies form a cycle
    #[error("Module dependency cycle involving: {}", modules.join(", "))]
    DependencyCycle { modules: Vec<String> },

    /// Level descriptor is malformed
    #[error("Invalid level {level}: {reason}")]
    InvalidLevel { level: String, reason: String },

    /// The interpreter collaborator failed to produce a trace
    #[error("Interpreter error: {message}")]
    Interpreter {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Timeout during operation
    #[error("Operation timed out after {duration_ms}ms")]
    Timeout { duration_ms: u64 },

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Create an unknown module error.
    pub fn unknown_module(name: impl Into<String>) -> Self {
        Self::UnknownModule { name: name.into() }
    }

    /// Create a module not found error.
    pub fn module_not_found(id: impl Into<String>) -> Self {
        Self::ModuleNotFound { id: id.into() }
    }

    /// Create a module busy error.
    pub fn module_busy(id: impl Into<String>) -> Self {
        Self::ModuleBusy { id: id.into() }
    }

    /// Create an invalid level error.
    pub fn invalid_level(level: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidLevel {
            level: level.into(),
            reason: reason.into(),
        }
    }

    /// Create an interpreter error.
    pub fn interpreter(message: impl Into<String>) -> Self {
        Self::Interpreter {
            message: message.into(),
            source: None,
        }
    }

    /// Create an interpreter error with source.
    pub fn interpreter_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Interpreter {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a timeout error.
    pub fn timeout(duration_ms: u64) -> Self {
        Self::Timeout { duration_ms }
    }

    /// Whether this error indicates a wiring or content bug rather than a
    /// runtime failure.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::UnknownModule { .. }
                | Self::ModuleNotFound { .. }
                | Self::ModuleTypeMismatch { .. }
                | Self::ModuleBusy { .. }
                | Self::MissingDependency { .. }
                | Self::DependencyCycle { .. }
                | Self::InvalidLevel { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        assert_eq!(
            Error::unknown_module("scopes").to_string(),
            "Module scopes not found in module catalog"
        );
        assert_eq!(
            Error::module_not_found("variables").to_string(),
            "Module variables not found"
        );
        let cycle = Error::DependencyCycle {
            modules: vec!["a".into(), "b".into()],
        };
        assert_eq!(cycle.to_string(), "Module dependency cycle involving: a, b");
    }

    #[test]
    fn test_configuration_classification() {
        assert!(Error::unknown_module("x").is_configuration());
        assert!(Error::module_not_found("x").is_configuration());
        assert!(Error::module_busy("variables").is_configuration());
        assert!(!Error::interpreter("boom").is_configuration());
        assert!(!Error::timeout(10).is_configuration());
    }
}
