use serde::Serialize;

use super::collector::Collector;
use crate::pipeline::BoxError;

/// Running statistics over a stream of numbers
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Summary {
    pub count: u64,
    pub sum: f64,
    pub min: f64,
    pub max: f64,
}

impl Summary {
    pub fn add(&mut self, value: f64) {
        self.count += 1;
        self.sum += value;
        self.min = self.min.min(value);
        self.max = self.max.max(value);
    }

    /// Combine two summaries; order does not matter
    pub fn merge(self, other: Summary) -> Summary {
        Summary {
            count: self.count + other.count,
            sum: self.sum + other.sum,
            min: self.min.min(other.min),
            max: self.max.max(other.max),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn mean(&self) -> Option<f64> {
        (!self.is_empty()).then(|| self.sum / self.count as f64)
    }
}

impl Default for Summary {
    fn default() -> Self {
        Self {
            count: 0,
            sum: 0.0,
            min: f64::INFINITY,
            max: f64::NEG_INFINITY,
        }
    }
}

impl FromIterator<f64> for Summary {
    fn from_iter<I: IntoIterator<Item = f64>>(iter: I) -> Self {
        let mut summary = Summary::default();
        for value in iter {
            summary.add(value);
        }
        summary
    }
}

/// Summarise a stream of numbers in parallel
pub fn summary() -> Collector<f64, Summary, Summary> {
    Collector::new(
        || Ok::<_, BoxError>(Summary::default()),
        |summary: &mut Summary, value| {
            summary.add(value);
            Ok(())
        },
        |left, right| Ok(left.merge(right)),
        Ok,
    )
}
