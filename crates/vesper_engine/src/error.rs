//! Error types for the engine collaborators.

use std::path::PathBuf;

/// Errors from reading, elaborating, or transforming a design.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// A source file could not be read.
    #[error("cannot read {path}: {source}")]
    Io {
        /// The file that failed to read.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// The source text did not parse.
    #[error("{file}:{line}: {message}")]
    Parse {
        /// The source file (or pseudo-path for in-memory text).
        file: String,
        /// 1-based line of the failure.
        line: u32,
        /// Description of the parse failure.
        message: String,
    },

    /// A cell instantiates a module that is not in the design.
    #[error("module {module} not found (instantiated by {instantiated_by})")]
    MissingModule {
        /// The missing module name.
        module: String,
        /// The module containing the unresolved instance.
        instantiated_by: String,
    },

    /// The requested top module does not exist.
    #[error("top module {0} not found in design")]
    MissingTop(String),

    /// A transform pass failed on a specific module.
    #[error("{pass} failed on module {module}: {reason}")]
    Transform {
        /// The pass name (`proc`, `opt`, `techmap`).
        pass: &'static str,
        /// The module being transformed.
        module: String,
        /// Description of the failure.
        reason: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_error_display() {
        let err = EngineError::Parse {
            file: "top.v".to_string(),
            line: 3,
            message: "expected ';'".to_string(),
        };
        assert_eq!(err.to_string(), "top.v:3: expected ';'");
    }

    #[test]
    fn missing_module_display() {
        let err = EngineError::MissingModule {
            module: "sub".to_string(),
            instantiated_by: "top".to_string(),
        };
        assert!(err.to_string().contains("sub"));
        assert!(err.to_string().contains("top"));
    }
}
