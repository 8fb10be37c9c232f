//! In-memory price provider for tests and embedding callers.

use super::{DataSourceError, PriceProvider};
use crate::domain::{Instrument, InstrumentCode};
use async_trait::async_trait;
use std::collections::HashMap;

/// Provider that serves instruments registered up front.
#[derive(Debug, Clone, Default)]
pub struct InMemoryPriceProvider {
    instruments: HashMap<InstrumentCode, Instrument>,
}

impl InMemoryPriceProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an instrument; a later one with the same code replaces it.
    pub fn with_instrument(mut self, instrument: Instrument) -> Self {
        self.instruments.insert(instrument.code.clone(), instrument);
        self
    }

    pub fn with_instruments(mut self, instruments: Vec<Instrument>) -> Self {
        for instrument in instruments {
            self.instruments.insert(instrument.code.clone(), instrument);
        }
        self
    }
}

#[async_trait]
impl PriceProvider for InMemoryPriceProvider {
    async fn instrument(&self, code: &InstrumentCode) -> Result<Instrument, DataSourceError> {
        self.instruments
            .get(code)
            .cloned()
            .ok_or_else(|| DataSourceError::NotFound(code.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Decimal, PriceRow, PriceSeries};
    use chrono::NaiveDate;

    fn make_instrument(code: &str) -> Instrument {
        let date = NaiveDate::from_ymd_opt(2021, 1, 4).unwrap();
        let prices = PriceSeries::new(vec![PriceRow::new(date, Decimal::one())]).unwrap();
        Instrument::new(InstrumentCode::new(code), prices)
    }

    #[tokio::test]
    async fn test_in_memory_provider_returns_registered() {
        let provider = InMemoryPriceProvider::new().with_instrument(make_instrument("000001"));
        let instrument = provider
            .instrument(&InstrumentCode::new("000001"))
            .await
            .unwrap();
        assert_eq!(instrument.code.as_str(), "000001");
        assert_eq!(instrument.prices.rows().len(), 1);
    }

    #[test]
    fn test_in_memory_provider_unknown_code() {
        let provider = InMemoryPriceProvider::new().with_instruments(vec![make_instrument("A")]);
        let err = tokio_test::block_on(provider.instrument(&InstrumentCode::new("B"))).unwrap_err();
        assert_eq!(err, DataSourceError::NotFound("B".to_string()));
    }
}
