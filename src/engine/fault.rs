//! Evaluation faults and their classification.

use rhai::EvalAltResult;
use std::fmt;
use thiserror::Error;

/// Closed set of fault categories, decided once when a fault is wrapped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FaultKind {
    /// The engine itself gave up: cancellation, resource limits, module loading.
    Engine,
    /// An I/O failure raised while the script was running.
    Io,
    /// A fault in the script: syntax, unknown names, type errors, `throw`.
    Script,
    Unknown,
}

impl FaultKind {
    pub fn classify(error: &EvalAltResult) -> FaultKind {
        match error {
            EvalAltResult::ErrorInFunctionCall(_, _, inner, _)
            | EvalAltResult::ErrorInModule(_, inner, _) => FaultKind::classify(inner),

            EvalAltResult::ErrorSystem(_, source) => {
                if source.downcast_ref::<std::io::Error>().is_some() {
                    FaultKind::Io
                } else {
                    FaultKind::Unknown
                }
            }

            EvalAltResult::ErrorTerminated(..)
            | EvalAltResult::ErrorTooManyOperations(..)
            | EvalAltResult::ErrorTooManyModules(..)
            | EvalAltResult::ErrorStackOverflow(..)
            | EvalAltResult::ErrorDataTooLarge(..)
            | EvalAltResult::ErrorDataRace(..)
            | EvalAltResult::ErrorModuleNotFound(..) => FaultKind::Engine,

            EvalAltResult::ErrorParsing(..)
            | EvalAltResult::ErrorVariableExists(..)
            | EvalAltResult::ErrorVariableNotFound(..)
            | EvalAltResult::ErrorPropertyNotFound(..)
            | EvalAltResult::ErrorIndexNotFound(..)
            | EvalAltResult::ErrorFunctionNotFound(..)
            | EvalAltResult::ErrorUnboundThis(..)
            | EvalAltResult::ErrorMismatchDataType(..)
            | EvalAltResult::ErrorMismatchOutputType(..)
            | EvalAltResult::ErrorIndexingType(..)
            | EvalAltResult::ErrorArrayBounds(..)
            | EvalAltResult::ErrorStringBounds(..)
            | EvalAltResult::ErrorFor(..)
            | EvalAltResult::ErrorAssignmentToConstant(..)
            | EvalAltResult::ErrorDotExpr(..)
            | EvalAltResult::ErrorArithmetic(..)
            | EvalAltResult::ErrorRuntime(..) => FaultKind::Script,

            _ => FaultKind::Unknown,
        }
    }

    /// Human-readable prefix shown in front of the fault message.
    pub fn prefix(&self) -> &'static str {
        match self {
            FaultKind::Engine => "The script engine failed: ",
            FaultKind::Io => "An I/O error occurred running script: ",
            FaultKind::Script => "An error occurred running script: ",
            FaultKind::Unknown => "An unknown error occurred running script: ",
        }
    }
}

impl fmt::Display for FaultKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FaultKind::Engine => "engine",
            FaultKind::Io => "io",
            FaultKind::Script => "script",
            FaultKind::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

/// A fault raised while evaluating a script. The engine's own error, when there is one, stays
/// reachable through [`std::error::Error::source`].
#[derive(Debug, Error)]
#[error("{}{message}", .kind.prefix())]
pub struct EvaluationFault {
    pub kind: FaultKind,
    pub message: String,
    #[source]
    source: Option<Box<EvalAltResult>>,
}

impl EvaluationFault {
    /// A fault raised by the runtime around the engine rather than by the engine itself.
    pub fn new(kind: FaultKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            source: None,
        }
    }

    pub fn engine(message: impl Into<String>) -> Self {
        Self::new(FaultKind::Engine, message)
    }

    /// The wrapped engine error, if any.
    pub fn cause(&self) -> Option<&EvalAltResult> {
        self.source.as_deref()
    }

    /// Message on a single line, for banners.
    pub fn single_line(&self) -> String {
        self.message.trim().replace('\n', ", ")
    }
}

impl From<Box<EvalAltResult>> for EvaluationFault {
    fn from(error: Box<EvalAltResult>) -> Self {
        Self {
            kind: FaultKind::classify(&error),
            message: error.to_string(),
            source: Some(error),
        }
    }
}
