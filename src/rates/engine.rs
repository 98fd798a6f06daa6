//! Counter-to-rate derivation with reset detection.
//!
//! # Per-key state machine
//! ```text
//! (none) --observe--> baseline, reading = Undefined
//! baseline --observe, elapsed <= 0--> new baseline, Undefined
//! baseline --observe, value < prev--> new baseline, Reset
//! baseline --observe--> new baseline, Valid((value - prev) / elapsed)
//! any --absent from a cycle--> purged
//! ```

use std::collections::{HashMap, HashSet};
use std::time::Instant;

use serde::Serialize;

/// One reading of a monotonic counter.
#[derive(Debug, Clone, PartialEq)]
pub struct CounterSample {
    pub server: String,
    pub metric: String,
    pub value: u64,
    pub at: Instant,
}

impl CounterSample {
    pub fn key(&self) -> SeriesKey {
        SeriesKey {
            server: self.server.clone(),
            metric: self.metric.clone(),
        }
    }
}

/// (server, metric) key inside one backend's table.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SeriesKey {
    pub server: String,
    pub metric: String,
}

/// Outcome of one observation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "kind", content = "per_sec", rename_all = "lowercase")]
pub enum RateReading {
    /// No baseline yet, or no time elapsed since it.
    Undefined,
    /// Counter went backwards; no rate for this interval.
    Reset,
    Valid(f64),
}

impl RateReading {
    pub fn value(&self) -> Option<f64> {
        match self {
            RateReading::Valid(rate) => Some(*rate),
            _ => None,
        }
    }

    pub fn is_valid(&self) -> bool {
        matches!(self, RateReading::Valid(_))
    }
}

/// Tracked state of one series.
#[derive(Debug, Clone, PartialEq)]
pub struct RateEntry {
    pub baseline: u64,
    pub baseline_at: Instant,
    pub reading: RateReading,
    /// Most recent valid rate, kept through resets.
    pub last_valid: Option<f64>,
}

impl RateEntry {
    fn first(sample: &CounterSample) -> Self {
        Self {
            baseline: sample.value,
            baseline_at: sample.at,
            reading: RateReading::Undefined,
            last_valid: None,
        }
    }

    fn advance(&mut self, sample: &CounterSample) -> RateReading {
        let elapsed = sample
            .at
            .checked_duration_since(self.baseline_at)
            .map(|d| d.as_secs_f64())
            .unwrap_or(0.0);

        let reading = if elapsed <= 0.0 {
            RateReading::Undefined
        } else if sample.value < self.baseline {
            RateReading::Reset
        } else {
            RateReading::Valid((sample.value - self.baseline) as f64 / elapsed)
        };

        self.baseline = sample.value;
        self.baseline_at = sample.at;
        self.reading = reading;
        if let RateReading::Valid(rate) = reading {
            self.last_valid = Some(rate);
        }
        reading
    }
}

/// Result of observing one sample within a cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    pub server: String,
    pub metric: String,
    pub total: u64,
    pub reading: RateReading,
}

/// Previous-sample table of one backend.
///
/// Owned by whoever serializes that backend's cycles; never shared globally.
#[derive(Debug, Default)]
pub struct RateTable {
    entries: HashMap<SeriesKey, RateEntry>,
}

impl RateTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, server: &str, metric: &str) -> Option<&RateEntry> {
        self.entries.get(&SeriesKey {
            server: server.to_string(),
            metric: metric.to_string(),
        })
    }

    /// Fold one sample into the table.
    pub fn observe(&mut self, sample: &CounterSample) -> RateReading {
        match self.entries.get_mut(&sample.key()) {
            Some(entry) => entry.advance(sample),
            None => {
                self.entries.insert(sample.key(), RateEntry::first(sample));
                RateReading::Undefined
            }
        }
    }

    /// Drop every key not in `seen`. Returns how many were purged.
    pub fn retain_seen(&mut self, seen: &HashSet<SeriesKey>) -> usize {
        let before = self.entries.len();
        self.entries.retain(|key, _| seen.contains(key));
        before - self.entries.len()
    }

    /// Run one poll cycle: observe every sample, then purge absent keys.
    ///
    /// If a key appears more than once in `samples` the last one wins.
    pub fn apply_cycle(&mut self, samples: &[CounterSample]) -> CycleRates {
        let mut seen = HashSet::with_capacity(samples.len());
        let mut observations = Vec::with_capacity(samples.len());

        for sample in samples {
            let reading = self.observe(sample);
            seen.insert(sample.key());
            observations.push(Observation {
                server: sample.server.clone(),
                metric: sample.metric.clone(),
                total: sample.value,
                reading,
            });
        }

        let purged = self.retain_seen(&seen);
        CycleRates {
            observations,
            purged,
        }
    }
}

/// Everything one cycle produced.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CycleRates {
    pub observations: Vec<Observation>,
    pub purged: usize,
}

impl CycleRates {
    /// Valid rates of `metric`, keyed by server.
    pub fn valid_rates(&self, metric: &str) -> Vec<(String, f64)> {
        self.observations
            .iter()
            .filter(|o| o.metric == metric)
            .filter_map(|o| o.reading.value().map(|r| (o.server.clone(), r)))
            .collect()
    }
}
