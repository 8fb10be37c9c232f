//! Data source abstraction for price histories, fund terms and trade records.

use crate::domain::{Instrument, InstrumentCode};
use async_trait::async_trait;
use std::fmt;

pub mod directory;
pub mod mock;
pub mod record;

pub use directory::CsvPriceProvider;
pub use mock::InMemoryPriceProvider;
pub use record::{RecordBook, RecordError};

/// Supplies an instrument's terms and its NAV series.
///
/// Implementations must only return price rows up to yesterday; the engine
/// treats every returned row as a settled trading day.
#[async_trait]
pub trait PriceProvider: Send + Sync + fmt::Debug {
    /// Load the instrument identified by `code`.
    ///
    /// # Returns
    /// The instrument with its price series in strictly ascending date order.
    async fn instrument(&self, code: &InstrumentCode) -> Result<Instrument, DataSourceError>;
}

/// Error type for data source operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DataSourceError {
    /// No data for the requested code.
    NotFound(String),
    /// Reading the backing file failed.
    Io(String),
    /// A file was read but its content is malformed.
    ParseError(String),
    /// Rows parsed but do not form a valid price series.
    InvalidSeries { code: String, message: String },
}

impl fmt::Display for DataSourceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataSourceError::NotFound(code) => write!(f, "No price data for {}", code),
            DataSourceError::Io(msg) => write!(f, "I/O error: {}", msg),
            DataSourceError::ParseError(msg) => write!(f, "Parse error: {}", msg),
            DataSourceError::InvalidSeries { code, message } => {
                write!(f, "Invalid price series for {}: {}", code, message)
            }
        }
    }
}

impl std::error::Error for DataSourceError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_datasource_error_display() {
        let err = DataSourceError::NotFound("000001".to_string());
        assert_eq!(err.to_string(), "No price data for 000001");

        let err = DataSourceError::InvalidSeries {
            code: "000001".to_string(),
            message: "price rows out of order".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Invalid price series for 000001: price rows out of order"
        );

        let err = DataSourceError::ParseError("bad date".to_string());
        assert_eq!(err.to_string(), "Parse error: bad date");
    }
}
