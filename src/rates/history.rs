//! Capped rolling history of valid rates.

use std::collections::{BTreeMap, HashMap, VecDeque};

use serde::Serialize;

/// Valid rates of one metric at one poll, keyed by server name.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoryPoint {
    pub timestamp_ms: u64,
    pub rates: BTreeMap<String, f64>,
}

/// Per-metric ring of history points for one backend.
#[derive(Debug)]
pub struct RateHistory {
    capacity: usize,
    series: HashMap<String, VecDeque<HistoryPoint>>,
}

impl RateHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            series: HashMap::new(),
        }
    }

    /// Append a point; polls that produced no valid rate are not recorded.
    pub fn record(&mut self, metric: &str, timestamp_ms: u64, rates: Vec<(String, f64)>) {
        if rates.is_empty() {
            return;
        }

        let points = self
            .series
            .entry(metric.to_string())
            .or_insert_with(|| VecDeque::with_capacity(self.capacity));
        points.push_back(HistoryPoint {
            timestamp_ms,
            rates: rates.into_iter().collect(),
        });
        while points.len() > self.capacity {
            points.pop_front();
        }
    }

    /// Copy of every series, oldest point first.
    pub fn snapshot(&self) -> BTreeMap<String, Vec<HistoryPoint>> {
        self.series
            .iter()
            .map(|(metric, points)| (metric.clone(), points.iter().cloned().collect()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_oldest_evicted_at_capacity() {
        let mut history = RateHistory::new(3);
        for i in 0..5u64 {
            history.record("m", i, vec![("web1".into(), i as f64)]);
        }

        let snapshot = history.snapshot();
        let points = &snapshot["m"];
        assert_eq!(points.len(), 3);
        assert_eq!(points[0].timestamp_ms, 2);
        assert_eq!(points[2].rates["web1"], 4.0);
    }

    #[test]
    fn test_empty_polls_skipped() {
        let mut history = RateHistory::new(3);
        history.record("m", 1, Vec::new());
        assert!(history.snapshot().is_empty());

        history.record("m", 2, vec![("web1".into(), 1.5)]);
        history.record("m", 3, Vec::new());
        assert_eq!(history.snapshot()["m"].len(), 1);
    }
}
