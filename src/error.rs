use thiserror::Error;

/// A failure produced while editing a proof-in-progress.
///
/// Every command detects its errors up front and leaves the proof store
/// untouched when it returns one of these. Speculative trials that merely
/// fail an acceptance test (minimizer candidates, improve dry runs) are not
/// errors; they are reverted silently and surface only as informational
/// messages in the command [`Outcome`][crate::Outcome].
#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum EditError {
    #[error("step {step} is out of range; the proof has {len} steps")]
    StepOutOfRange { step: usize, len: usize },
    #[error("step {0} is already assigned; DELETE it first")]
    StepAlreadyKnown(usize),
    #[error("step {0} is already unknown")]
    StepAlreadyUnknown(usize),
    #[error("the proof has no unknown steps")]
    NoUnknownSteps,
    #[error("no earlier statement matches the label '{0}'")]
    LabelNotFound(String),
    #[error("the label '{0}' matches {1} statements; use a more specific label")]
    LabelAmbiguous(String, usize),
    #[error("'{label}' does not unify with the target of step {step}")]
    NotUnifiable { label: String, step: usize },
    #[error("new usage of '{0}' is discouraged; use /OVERRIDE to assign it anyway")]
    UsageDiscouraged(String),
    #[error("modification of the proof of '{0}' is discouraged; use /OVERRIDE to edit it anyway")]
    ProofDiscouraged(String),
    #[error("invalid qualifier: {0}")]
    InvalidQualifier(String),
    #[error("syntax error: {0}")]
    Syntax(String),
    #[error("could not read database: {0}")]
    Io(String),
    #[error("internal inconsistency: {0}")]
    Internal(String),
}

/// The error taxonomy class of an [`EditError`], for user-facing reporting.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum ErrorClass {
    UserInput,
    Policy,
    Unification,
    Internal,
}

impl EditError {
    pub fn class(&self) -> ErrorClass {
        use EditError::*;
        match self {
            StepOutOfRange { .. } | StepAlreadyKnown(_) | StepAlreadyUnknown(_)
            | NoUnknownSteps | LabelNotFound(_) | LabelAmbiguous(_, _)
            | InvalidQualifier(_) | Syntax(_) | Io(_) => ErrorClass::UserInput,
            UsageDiscouraged(_) | ProofDiscouraged(_) => ErrorClass::Policy,
            NotUnifiable { .. } => ErrorClass::Unification,
            Internal(_) => ErrorClass::Internal,
        }
    }
}
