#![forbid(unsafe_code)]

//! The deliberately slow data source.

use std::thread;
use std::time::Duration;

use rowfetch_core::{FetchError, RowKey, RowModel};

/// Default per-row lookup latency.
const DEFAULT_LATENCY: Duration = Duration::from_millis(1000);

/// A row model that sleeps for a fixed latency before answering.
///
/// Stands in for any slow lookup — disk, network, expensive computation.
/// The answer is just the row number, which makes stale writes obvious on
/// screen: a row showing the wrong number is a row showing another row's
/// data.
#[derive(Debug, Clone)]
pub struct SlowTableModel {
    latency: Duration,
}

impl SlowTableModel {
    /// Create a model with the given per-lookup latency.
    #[must_use]
    pub fn new(latency: Duration) -> Self {
        Self { latency }
    }
}

impl Default for SlowTableModel {
    fn default() -> Self {
        Self::new(DEFAULT_LATENCY)
    }
}

impl RowModel for SlowTableModel {
    fn fetch(&self, key: RowKey) -> Result<String, FetchError> {
        thread::sleep(self.latency);
        Ok(format!("{key}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[test]
    fn fetch_returns_the_row_number() {
        let model = SlowTableModel::new(Duration::from_millis(1));
        assert_eq!(model.fetch(RowKey::new(17)).unwrap(), "17");
    }

    #[test]
    fn fetch_takes_at_least_the_configured_latency() {
        let model = SlowTableModel::new(Duration::from_millis(20));
        let start = Instant::now();
        let _ = model.fetch(RowKey::new(0));
        assert!(start.elapsed() >= Duration::from_millis(20));
    }
}
