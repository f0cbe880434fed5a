use thiserror::Error;

use crate::codegen::CodegenError;

/// Failures surfaced by [`TieredEngine::execute`](crate::runtime::TieredEngine::execute)
/// and the interpreter. None of them are fatal to the engine.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum EngineError {
    #[error("unknown function `{0}`")]
    UnknownFunction(String),
    #[error("cannot interpret {kind} in `{function}`")]
    UnsupportedExpression {
        function: String,
        kind: &'static str,
    },
    #[error("failed to compile `{function}`")]
    CodeGenerationFailure {
        function: String,
        #[source]
        source: CodegenError,
    },
    #[error("compiled code for `{function}` has no symbol `{symbol}`")]
    SymbolResolutionFailure { function: String, symbol: String },
}

impl EngineError {
    /// Classifies a backend error raised while promoting `function`.
    pub fn from_codegen(function: &str, error: CodegenError) -> Self {
        match error {
            CodegenError::SymbolLookup(symbol) => Self::SymbolResolutionFailure {
                function: function.to_string(),
                symbol,
            },
            source => Self::CodeGenerationFailure {
                function: function.to_string(),
                source,
            },
        }
    }

    pub fn function(&self) -> &str {
        match self {
            Self::UnknownFunction(function)
            | Self::UnsupportedExpression { function, .. }
            | Self::CodeGenerationFailure { function, .. }
            | Self::SymbolResolutionFailure { function, .. } => function,
        }
    }
}
