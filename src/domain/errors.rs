use thiserror::Error;

/// Errors raised while validating request payloads at the service edge.
///
/// These map to HTTP 422 and never reach the pipeline.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Lot quantities for {instrument_id} sum to {actual}, position holds {expected}")]
    LotQuantityMismatch {
        instrument_id: String,
        expected: rust_decimal::Decimal,
        actual: rust_decimal::Decimal,
    },

    #[error("Model weights sum to {sum}, expected 1")]
    ModelWeightSum { sum: rust_decimal::Decimal },

    #[error("Invalid FX pair: {pair}")]
    InvalidFxPair { pair: String },

    #[error("Negative quantity on tax lot {lot_id}")]
    NegativeLotQuantity { lot_id: String },

    #[error("Invalid scenario name: {name}")]
    InvalidScenarioName { name: String },

    #[error("Too many scenarios: {count} > {max}")]
    TooManyScenarios { count: usize, max: usize },

    #[error("Missing required header: {name}")]
    MissingHeader { name: String },

    #[error("INVALID_OPTIONS:{detail}")]
    InvalidOptions { detail: String },
}

/// Canonicalization failures.
///
/// Only non-finite or non-serializable atoms can trigger this; everything
/// else has a canonical byte form.
#[derive(Debug, Error)]
pub enum CanonicalError {
    #[error("CANONICALIZATION_ERROR: non-finite number at {path}")]
    NonFiniteNumber { path: String },
}

/// Typed errors surfaced by supportability and proposal store adapters.
///
/// Adapters never leak driver errors; everything is mapped here.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("IDEMPOTENCY_KEY_CONFLICT: request hash mismatch for key {key}")]
    IdempotencyConflict { key: String },

    #[error("Correlation id already in use: {correlation_id}")]
    DuplicateCorrelation { correlation_id: String },

    #[error("DPM_ASYNC_OPERATION_NOT_EXECUTABLE: operation {operation_id} is {status}")]
    OperationNotExecutable {
        operation_id: String,
        status: String,
    },

    #[error("Invalid pagination cursor")]
    InvalidCursor,

    #[error("POSTGRES_MIGRATION_CHECKSUM_MISMATCH:{namespace}:{version}")]
    MigrationChecksumMismatch { namespace: String, version: i64 },

    #[error("Store serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Store backend failure: {reason}")]
    Backend { reason: String },
}

impl StoreError {
    pub fn backend(reason: impl Into<String>) -> Self {
        StoreError::Backend {
            reason: reason.into(),
        }
    }
}

/// Errors raised by the workflow decision and proposal lifecycle services.
#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("Run not found: {run_id}")]
    RunNotFound { run_id: String },

    #[error("Proposal not found: {proposal_id}")]
    ProposalNotFound { proposal_id: String },

    #[error("Transition {from} -> {to} is not allowed")]
    InvalidTransition { from: String, to: String },

    #[error("State conflict: expected {expected}, found {actual}")]
    StateConflict { expected: String, actual: String },

    #[error("Workflow review not required for run {run_id}")]
    ReviewNotRequired { run_id: String },

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Policy pack resolution failures.
#[derive(Debug, Error)]
pub enum PolicyError {
    #[error("Unknown policy pack: {pack_id}")]
    UnknownPack { pack_id: String },

    #[error("Policy pack catalog is invalid: {reason}")]
    InvalidCatalog { reason: String },
}

/// Faults inside the decision pipeline that cannot be expressed as a
/// domain outcome. Recoverable conditions become diagnostics instead.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("SOLVER_ERROR: {backend}: {reason}")]
    Solver { backend: String, reason: String },

    #[error(transparent)]
    Canonical(#[from] CanonicalError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Store(#[from] StoreError),
}
