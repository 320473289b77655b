use bigdecimal::BigDecimal;
use thiserror::Error;

/// Failures reported by the exchange gateway.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExchangeError {
    #[error("Exchange returned status '{status}' for {operation}: {message}")]
    BadStatus {
        operation: String,
        status: String,
        message: String,
    },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Failed to parse exchange response: {0}")]
    Parse(String),

    #[error("No quoted price available for {0}")]
    PriceUnavailable(String),

    #[error("Authentication error: {0}")]
    Authentication(String),

    #[error("Invalid order: {0}")]
    InvalidOrder(String),
}

/// Failures reported by the persistence collaborators.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PersistenceError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Store rejected write of {0}")]
    WriteRejected(String),

    #[error("Corrupt stored value: {0}")]
    Corrupt(String),
}

/// Degenerate input to the return forecast.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ForecastError {
    #[error("No price data available")]
    NoData,

    #[error("Unexpected number of prices for {asset}: expected {expected}, found {actual}")]
    UnexpectedPriceCount {
        asset: String,
        expected: usize,
        actual: usize,
    },

    #[error("At least 3 days of prices are required, found {0}")]
    InsufficientHistory(usize),

    #[error("Price for {asset} on day {day} is not positive")]
    NonPositivePrice { asset: String, day: usize },

    #[error("Return ratio for {0} does not fit in a double")]
    RatioOutOfRange(String),

    #[error("Matrix is not square ({rows}x{cols})")]
    NotSquare { rows: usize, cols: usize },

    #[error("Matrix is not invertible")]
    NotInvertible,

    #[error("Dimension mismatch: {0}")]
    DimensionMismatch(String),

    #[error("Expected a single column of expected returns, found {0}")]
    InvalidOutputShape(usize),

    #[error("No expected return at index {index} for {asset}")]
    IndexOutOfRange { asset: String, index: usize },
}

/// Top level error for portfolio operations and strategy runs.
#[derive(Error, Debug)]
pub enum TradingError {
    #[error(transparent)]
    Exchange(#[from] ExchangeError),

    #[error(transparent)]
    Persistence(#[from] PersistenceError),

    #[error(transparent)]
    Forecast(#[from] ForecastError),

    #[error("Insufficient {asset} balance: required {required}, available {available}")]
    InsufficientBalance {
        asset: String,
        required: BigDecimal,
        available: BigDecimal,
    },

    #[error("No usable price for {0}")]
    PriceUnavailable(String),
}

pub type TradingResult<T> = Result<T, TradingError>;
