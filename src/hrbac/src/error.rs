//! Error types for the HRBAC engine
//!
//! Declaration-time failures are reported through [`HrbacError`] and are
//! returned straight to the caller. Evaluation-time failures are reported
//! through [`EvaluationError`] and never escape a compiled guard.

use thiserror::Error;

/// Policy engine errors
#[derive(Debug, Error)]
pub enum HrbacError {
    /// A required parameter was not supplied
    #[error("Undefined parameter: {0}")]
    UndefinedParameter(String),

    /// A required parameter was explicitly null
    #[error("Null parameter: {0}")]
    NullParameter(String),

    /// A label, claim or parent collection was empty
    #[error("Empty parameter: {0}")]
    EmptyParameter(String),

    /// A value that must be a string was something else
    #[error("Not a string: {0}")]
    NotAString(String),

    /// A value that must denote a predicate was something else
    #[error("Not a function: {0}")]
    NotAFunction(String),

    /// An operator received the wrong number of operands
    #[error("Parameter number mismatch for {context}: expected {expected}, found {found}")]
    ParameterNumberMismatch {
        /// Operator or callback being declared
        context: String,
        /// Number of operands the operator takes
        expected: usize,
        /// Number of operands supplied
        found: usize,
    },

    /// Role label declared twice
    #[error("Role already exists: {0}")]
    RoleAlreadyExists(String),

    /// Label already taken by the other entry kind, or by another predicate
    #[error("Label already in use: {0}")]
    LabelAlreadyInUse(String),

    /// Reference to a role that has not been declared
    #[error("Missing role: {0}")]
    MissingRole(String),

    /// Reference to a predicate label that has not been registered
    #[error("Missing function: {0}")]
    MissingFunction(String),

    /// Role claim could not be read or had the wrong shape
    #[error(transparent)]
    Role(#[from] RoleError),

    /// Policy document is not valid JSON
    #[error("Invalid policy document: {0}")]
    InvalidDocument(String),

    /// I/O error while reading a policy document
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for declaration-time operations
pub type Result<T> = std::result::Result<T, HrbacError>;

/// Failure to obtain a usable role claim from a request
///
/// Guards route this to the unauthorized handler: an unreadable claim is
/// treated as "no matching role", not as a system fault.
#[derive(Debug, Error)]
pub enum RoleError {
    /// The extractor returned a claim of the wrong shape
    #[error("Invalid role claim: {0}")]
    InvalidClaim(Box<HrbacError>),

    /// The extractor itself failed
    #[error("Role extraction failed: {0}")]
    Extraction(anyhow::Error),
}

impl RoleError {
    /// The shape violation behind an invalid claim, if that is what this is
    pub fn claim_error(&self) -> Option<&HrbacError> {
        match self {
            RoleError::InvalidClaim(err) => Some(err),
            RoleError::Extraction(_) => None,
        }
    }
}

impl From<HrbacError> for RoleError {
    fn from(err: HrbacError) -> Self {
        RoleError::InvalidClaim(Box::new(err))
    }
}

/// Failure raised while evaluating a predicate against a request
#[derive(Debug, Error)]
pub enum EvaluationError {
    /// Role claim extraction or validation failed
    #[error(transparent)]
    Role(#[from] RoleError),

    /// Any other predicate fault
    #[error(transparent)]
    Failed(#[from] anyhow::Error),
}

impl EvaluationError {
    /// Build a plain predicate fault from a message
    pub fn failed(message: impl std::fmt::Display) -> Self {
        EvaluationError::Failed(anyhow::anyhow!("{}", message))
    }

    /// Whether this failure came from role claim handling
    pub fn is_role_error(&self) -> bool {
        matches!(self, EvaluationError::Role(_))
    }
}
