//! # cwitness core
//!
//! Source-to-source instrumentation of C programs. The instrumented program,
//! once compiled and run, writes one JSON observation per executed statement
//! or branch decision to `stderr`, including the live values of the variables
//! the statement touched. A witness builder replays that trace afterwards.
//!
//! The crate provides:
//! - a position/patch model and a text reconstructor that only ever inserts
//! - a lexical pre/post-transform that hides GNU extensions from the parser
//! - a tree-sitter backed syntax interface and a composable traversal
//! - the instrumentation pass together with its variable access analysis
//! - a file-level driver
//!
//! ```no_run
//! use cwitness_core::{instrument_source, InstrumentConfig};
//!
//! let source = "int main() { int x = 0; x = x + 1; return x; }\n";
//! let instrumented = instrument_source(source, &InstrumentConfig::default()).unwrap();
//! assert!(instrumented.code.starts_with("#include <stdio.h>\n"));
//! ```

#![warn(clippy::all)]

pub mod errors;
pub mod position;
pub mod pretransform;
pub mod syntax;
pub mod tracer;
pub mod visitor;

use serde::{Deserialize, Serialize};

// Re-export commonly used types
pub use errors::{InstrumentError, Result};
pub use position::{Coordinate, Patch};
pub use pretransform::{MaskedSource, RestorePolicy};
pub use syntax::{CParser, SyntaxNode};
pub use tracer::{
    instrument_source, instrument_tree, instrumented_path, Diagnostic, FileTracer,
    Instrumented, InstrumentationSummary,
};

/// Crate version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Functions whose call site marks a property violation in SV-COMP style programs.
pub const DEFAULT_ERROR_FUNCTIONS: &[&str] = &["reach_error", "__VERIFIER_error"];

/// Initialize tracing for the instrumentation components
pub fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("cwitness_core=info"));

    // A subscriber may already be installed by an embedding application.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

/// Instrumentation configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InstrumentConfig {
    /// Functions whose call denotes a verification failure. Their own
    /// definitions are never instrumented.
    pub error_functions: Vec<String>,
    /// Text prepended to every instrumented file
    pub header: String,
    /// Run the lexical pre/post-transform around parsing
    pub mask_extensions: bool,
    /// What to do when a masked construct cannot be restored
    pub restore_policy: RestorePolicy,
}

impl Default for InstrumentConfig {
    fn default() -> Self {
        Self {
            error_functions: DEFAULT_ERROR_FUNCTIONS
                .iter()
                .map(|name| name.to_string())
                .collect(),
            header: "#include <stdio.h>\n".to_string(),
            mask_extensions: true,
            restore_policy: RestorePolicy::default(),
        }
    }
}

impl InstrumentConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_error_function(mut self, name: impl Into<String>) -> Self {
        let name = name.into();
        if !self.error_functions.contains(&name) {
            self.error_functions.push(name);
        }
        self
    }

    pub fn with_restore_policy(mut self, policy: RestorePolicy) -> Self {
        self.restore_policy = policy;
        self
    }

    pub fn is_error_function(&self, name: &str) -> bool {
        self.error_functions.iter().any(|f| f == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = InstrumentConfig::default();
        assert!(config.is_error_function("reach_error"));
        assert!(config.is_error_function("__VERIFIER_error"));
        assert!(!config.is_error_function("main"));
        assert_eq!(config.header, "#include <stdio.h>\n");
        assert_eq!(config.restore_policy, RestorePolicy::LeaveMasked);
    }

    #[test]
    fn test_config_from_partial_json() {
        let config: InstrumentConfig =
            serde_json::from_str(r#"{"error_functions": ["abort_here"], "restore_policy": "abort"}"#)
                .unwrap();
        assert!(config.is_error_function("abort_here"));
        assert!(!config.is_error_function("reach_error"));
        assert_eq!(config.restore_policy, RestorePolicy::Abort);
        assert!(config.mask_extensions);
    }

    #[test]
    fn test_with_error_function_deduplicates() {
        let config = InstrumentConfig::new()
            .with_error_function("reach_error")
            .with_error_function("fail");
        assert_eq!(config.error_functions.len(), 3);
    }
}
