//! Domain error types.
//!
//! Errors are layered: arithmetic errors bubble into account errors, which the
//! engine records per strategy. Only configuration and range errors abort a run.

use crate::domain::arithmetic::ContextId;

/// Failure of a numeric operation or of the arithmetic context itself.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ArithmeticError {
    #[error("arithmetic configuration error: {reason}")]
    Configuration { reason: String },

    #[error("value created under context {found} used with context {expected}")]
    ContextMismatch { expected: ContextId, found: ContextId },

    #[error("division by zero")]
    DivisionByZero,

    #[error("invalid numeric literal {literal:?}")]
    InvalidLiteral { literal: String },

    #[error("arithmetic overflow in {op}")]
    Overflow { op: &'static str },
}

impl ArithmeticError {
    /// Configuration errors are fatal to a whole run; the rest are trade level.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            ArithmeticError::Configuration { .. } | ArithmeticError::ContextMismatch { .. }
        )
    }
}

/// Failure of a single ledger operation. The account is left unchanged.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AccountError {
    #[error("invalid amount: {reason}")]
    InvalidAmount { reason: String },

    #[error("insufficient funds in {currency}: required {required}, available {available}")]
    InsufficientFunds {
        currency: String,
        required: String,
        available: String,
    },

    #[error("invalid currency code {code:?}")]
    InvalidCurrency { code: String },

    #[error("no exchange rate between {from} and {to}")]
    MissingRate { from: String, to: String },

    #[error("no open order #{id}")]
    UnknownOrder { id: u64 },

    #[error(transparent)]
    Arithmetic(#[from] ArithmeticError),
}

/// Error returned by a strategy's decision function.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct StrategyError {
    pub message: String,
}

impl StrategyError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl From<AccountError> for StrategyError {
    fn from(err: AccountError) -> Self {
        StrategyError::new(err.to_string())
    }
}

impl From<ArithmeticError> for StrategyError {
    fn from(err: ArithmeticError) -> Self {
        StrategyError::new(err.to_string())
    }
}

/// Unrecoverable fault inside a strategy, captured into its run result.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("strategy failed in window {window}: {message}")]
pub struct StrategyExecutionError {
    pub window: usize,
    pub message: String,
    pub panicked: bool,
}

/// Errors that abort an engine run before any strategy is simulated.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EngineError {
    #[error("invalid range: {reason}")]
    InvalidRange { reason: String },

    #[error("invalid engine parameter: {reason}")]
    InvalidParameter { reason: String },

    #[error(transparent)]
    Configuration(ArithmeticError),

    #[error("duplicate strategy id {id:?}")]
    DuplicateStrategy { id: String },

    #[error("no strategies registered")]
    NoStrategies,

    #[error("failed to build worker pool: {reason}")]
    ThreadPool { reason: String },
}

impl From<ArithmeticError> for EngineError {
    fn from(err: ArithmeticError) -> Self {
        EngineError::Configuration(err)
    }
}

/// Top-level error type for fxtrader.
#[derive(Debug, thiserror::Error)]
pub enum FxError {
    #[error("config parse error in {file}: {reason}")]
    ConfigParse { file: String, reason: String },

    #[error("missing config key [{section}] {key}")]
    ConfigMissing { section: String, key: String },

    #[error("invalid config value [{section}] {key}: {reason}")]
    ConfigInvalid {
        section: String,
        key: String,
        reason: String,
    },

    #[error("data error: {reason}")]
    Data { reason: String },

    #[error("report error: {reason}")]
    Report { reason: String },

    #[error(transparent)]
    Arithmetic(#[from] ArithmeticError),

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<&FxError> for std::process::ExitCode {
    fn from(err: &FxError) -> Self {
        let code: u8 = match err {
            FxError::Io(_) | FxError::Report { .. } => 1,
            FxError::ConfigParse { .. }
            | FxError::ConfigMissing { .. }
            | FxError::ConfigInvalid { .. } => 2,
            FxError::Data { .. } => 3,
            FxError::Engine(_) => 4,
            FxError::Arithmetic(_) => 5,
        };
        std::process::ExitCode::from(code)
    }
}
