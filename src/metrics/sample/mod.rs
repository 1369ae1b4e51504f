use rand::Rng;
use serde::Serialize;
use thiserror::Error;

use std::collections::BTreeMap;

/// Number of values retained by the reservoirs backing the latency
/// histograms.
pub const DEFAULT_CAPACITY: usize = 1024;

/// Percentiles reported in a [`HistogramSnapshot`].
pub static PERCENTILES: &[(&str, f64)] = &[
    ("p25", 25.0),
    ("p50", 50.0),
    ("p75", 75.0),
    ("p90", 90.0),
    ("p99", 99.0),
    ("p999", 99.9),
    ("p9999", 99.99),
];

#[derive(Error, Debug, PartialEq)]
pub enum SampleError {
    #[error("sample contains no values")]
    /// Nothing has been inserted into the sample yet
    Empty,
    #[error("invalid percentile")]
    /// The requested percentile is not in the range 0.0 - 100.0
    InvalidPercentile,
}

/// A fixed-capacity uniform random sample of a stream of values.
///
/// Until the sample is full every value is retained. After that each new value
/// replaces a random slot with probability `capacity / count`, so every value
/// seen so far has the same chance of being in the sample (Vitter's
/// algorithm R). Insertion order is not preserved.
pub struct UniformSample {
    values: Vec<i64>,
    capacity: usize,
    count: u64,
}

impl UniformSample {
    /// Create a sample that retains at most `capacity` values. The storage is
    /// allocated up front so that updates never grow it.
    pub fn new(capacity: usize) -> Self {
        Self {
            values: Vec::with_capacity(capacity),
            capacity,
            count: 0,
        }
    }

    /// Offer a new value to the sample.
    pub fn update(&mut self, value: i64) {
        self.count += 1;

        if self.values.len() < self.capacity {
            self.values.push(value);
            return;
        }

        let slot = rand::thread_rng().gen_range(0..self.count);

        if slot < self.capacity as u64 {
            self.values[slot as usize] = value;
        }
    }

    /// Total number of values ever offered, retained or not.
    pub fn count(&self) -> u64 {
        self.count
    }

    /// Number of values currently retained.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// The retained values, in no particular order.
    pub fn values(&self) -> &[i64] {
        &self.values
    }

    /// Return the retained value closest to the specified percentile. The
    /// percentile must be within the range 0.0 to 100.0
    pub fn percentile(&self, percentile: f64) -> Result<i64, SampleError> {
        let sorted = self.sorted();
        percentile_of(&sorted, percentile)
    }

    /// Produce summary statistics over the retained values. Returns `None`
    /// when the sample is empty.
    pub fn snapshot(&self) -> Option<HistogramSnapshot> {
        let sorted = self.sorted();

        let (min, max) = match (sorted.first(), sorted.last()) {
            (Some(min), Some(max)) => (*min, *max),
            _ => return None,
        };

        let n = sorted.len() as f64;
        let mean = sorted.iter().map(|v| *v as f64).sum::<f64>() / n;
        let variance = sorted
            .iter()
            .map(|v| {
                let d = *v as f64 - mean;
                d * d
            })
            .sum::<f64>()
            / n;

        let mut percentiles = BTreeMap::new();
        for (label, percentile) in PERCENTILES {
            if let Ok(value) = percentile_of(&sorted, *percentile) {
                percentiles.insert(*label, value);
            }
        }

        Some(HistogramSnapshot {
            count: self.count,
            retained: sorted.len(),
            min,
            max,
            mean,
            stddev: variance.sqrt(),
            percentiles,
        })
    }

    fn sorted(&self) -> Vec<i64> {
        let mut sorted = self.values.clone();
        sorted.sort_unstable();
        sorted
    }
}

fn percentile_of(sorted: &[i64], percentile: f64) -> Result<i64, SampleError> {
    if !(0.0..=100.0).contains(&percentile) {
        return Err(SampleError::InvalidPercentile);
    }

    if sorted.is_empty() {
        return Err(SampleError::Empty);
    }

    if percentile == 0.0 {
        Ok(sorted[0])
    } else {
        let need = (percentile / 100.0 * sorted.len() as f64).ceil() as usize;
        Ok(sorted[need.clamp(1, sorted.len()) - 1])
    }
}

/// Point-in-time histogram statistics derived from a [`UniformSample`].
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct HistogramSnapshot {
    /// Total number of values offered to the sample.
    pub count: u64,
    /// Number of values the statistics were computed over.
    pub retained: usize,
    pub min: i64,
    pub max: i64,
    pub mean: f64,
    pub stddev: f64,
    pub percentiles: BTreeMap<&'static str, i64>,
}
