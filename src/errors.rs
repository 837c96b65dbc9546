use thiserror::Error;

/// Application-wide error type - single point of truth
#[derive(Error, Debug)]
pub enum AppError {
    /// Configuration issues
    #[error("Configuration error: {0}")]
    Config(String),

    /// Inbound query could not be parsed
    #[error("Invalid query: {0}")]
    Query(#[from] QueryError),

    /// Neither cache, upstream nor store could answer
    #[error("Resolution failed: {0}")]
    Resolution(#[from] ResolutionError),

    /// Persistence operations
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Upstream API operations
    #[error("Upstream error: {0}")]
    Upstream(#[from] UpstreamError),

    /// File I/O operations
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Data validation/parsing
    #[error("Invalid data: {0}")]
    InvalidData(String),
}

/// Reason an inbound query key was rejected
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QueryError {
    #[error("missing {0} parameter")]
    Missing(&'static str),

    #[error("invalid block hash: {0}")]
    InvalidBlockHash(String),

    #[error("invalid block height: {0}")]
    InvalidHeight(String),

    #[error("invalid txid: {0}")]
    InvalidTxid(String),

    #[error("invalid address: {0}")]
    InvalidAddress(String),

    #[error("unknown query kind: {0}")]
    UnknownKind(String),
}

/// What went wrong talking to the upstream provider
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum UpstreamCause {
    /// Connection refused, DNS failure, reset, etc.
    #[error("network error: {0}")]
    Network(String),

    /// A single attempt exceeded the per-call timeout
    #[error("request timed out after {timeout_seconds}s")]
    Timeout { timeout_seconds: u64 },

    /// Non-success HTTP status other than 404
    #[error("unexpected status {0}")]
    Status(u16),

    /// Provider says the resource does not exist
    #[error("resource not found")]
    NotFound,

    /// Body could not be turned into a record
    #[error("malformed response: {0}")]
    Malformed(String),
}

impl UpstreamCause {
    /// Transient causes are retried by the retry policy
    pub fn is_retryable(&self) -> bool {
        match self {
            UpstreamCause::Network(_) | UpstreamCause::Timeout { .. } => true,
            UpstreamCause::Status(code) => *code >= 500 || *code == 408 || *code == 429,
            UpstreamCause::NotFound | UpstreamCause::Malformed(_) => false,
        }
    }
}

/// Upstream failure after the retry policy gave up
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{operation} failed after {attempts} attempt(s): {cause}")]
pub struct UpstreamError {
    pub operation: String,
    pub cause: UpstreamCause,
    pub attempts: usize,
}

impl UpstreamError {
    pub fn new(operation: impl Into<String>, cause: UpstreamCause, attempts: usize) -> Self {
        Self {
            operation: operation.into(),
            cause,
            attempts,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.cause == UpstreamCause::NotFound
    }
}

/// Persistence store errors
#[derive(Error, Debug)]
pub enum StoreError {
    /// Could not obtain a pooled connection in time
    #[error("connection pool error: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Stored JSON columns could not be (de)serialised
    #[error("serialisation error: {0}")]
    Serialisation(#[from] serde_json::Error),

    /// Database directory could not be prepared
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Blocking store task did not complete
    #[error("store task failed: {0}")]
    Join(String),
}

impl StoreError {
    /// Transient failures (busy, locked, unreachable) may be retried;
    /// constraint violations and malformed data may not.
    pub fn is_transient(&self) -> bool {
        use rusqlite::ErrorCode;

        match self {
            StoreError::Pool(_) => true,
            StoreError::Sqlite(rusqlite::Error::SqliteFailure(e, _)) => matches!(
                e.code,
                ErrorCode::DatabaseBusy
                    | ErrorCode::DatabaseLocked
                    | ErrorCode::CannotOpen
                    | ErrorCode::SystemIoFailure
            ),
            StoreError::Sqlite(_)
            | StoreError::Serialisation(_)
            | StoreError::Io(_)
            | StoreError::Join(_) => false,
        }
    }
}

/// Terminal failure of a resolve() call
#[derive(Error, Debug)]
pub enum ResolutionError {
    /// Upstream failed and the store had nothing (or failed too)
    #[error("data unavailable: {upstream}{}", describe_store_outcome(.store_miss, .store_error))]
    Unavailable {
        upstream: UpstreamError,
        store_miss: bool,
        store_error: Option<StoreError>,
    },
}

fn describe_store_outcome(store_miss: &bool, store_error: &Option<StoreError>) -> String {
    match (store_miss, store_error) {
        (_, Some(e)) => format!("; store fallback failed: {}", e),
        (true, None) => "; no persisted record".to_string(),
        (false, None) => String::new(),
    }
}

impl ResolutionError {
    pub fn upstream(&self) -> &UpstreamError {
        match self {
            ResolutionError::Unavailable { upstream, .. } => upstream,
        }
    }

    pub fn is_store_miss(&self) -> bool {
        match self {
            ResolutionError::Unavailable { store_miss, .. } => *store_miss,
        }
    }
}

/// Application-wide result type - single point of truth
pub type AppResult<T> = Result<T, AppError>;

/// Result type for upstream operations
pub type UpstreamResult<T> = Result<T, UpstreamError>;

/// Result type for persistence operations
pub type StoreResult<T> = Result<T, StoreError>;

// Additional From implementations for common error types
impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::InvalidData(format!("JSON error: {}", err))
    }
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::Config(err.to_string())
    }
}
