use itertools::Itertools;

use crate::error::OptimizerError;
use crate::operators::scalar::expr::BinaryOp;

/// An equal-depth histogram: every bucket holds the same number of rows.
///
/// Bucket `i` covers values in `[bounds[i], bounds[i + 1]]`.
#[derive(Debug, Clone, PartialEq)]
pub struct Histogram {
    bounds: Vec<f64>,
    distinct: Vec<f64>,
}

impl Histogram {
    /// Creates a histogram from the given bucket boundaries and per-bucket distinct counts.
    ///
    /// # Errors
    ///
    /// Returns an error if the number of boundaries is not equal to the number of buckets plus one
    /// or if the boundaries are not sorted or contain NaN.
    pub fn new(bounds: Vec<f64>, distinct: Vec<f64>) -> Result<Self, OptimizerError> {
        if distinct.is_empty() {
            return Err(OptimizerError::argument("Histogram must have at least one bucket"));
        }
        if bounds.len() != distinct.len() + 1 {
            return Err(OptimizerError::argument(format!(
                "Histogram with {} buckets must have {} boundaries but got {}",
                distinct.len(),
                distinct.len() + 1,
                bounds.len()
            )));
        }
        if bounds.iter().any(|b| b.is_nan()) || !bounds.windows(2).all(|w| w[0] <= w[1]) {
            return Err(OptimizerError::argument(format!("Histogram boundaries must be sorted: {:?}", bounds)));
        }
        Ok(Histogram { bounds, distinct })
    }

    /// Builds a histogram with at most `buckets` buckets from the given (non-NULL) values.
    /// Returns `None` if there are no values.
    ///
    /// # Errors
    ///
    /// Returns an error if one of the values is NaN.
    pub fn from_values(values: &[f64], buckets: usize) -> Result<Option<Histogram>, OptimizerError> {
        if values.iter().any(|v| v.is_nan()) {
            return Err(OptimizerError::argument("Histogram values must not contain NaN"));
        }
        if values.is_empty() || buckets == 0 {
            return Ok(None);
        }
        let values: Vec<f64> = values.iter().copied().sorted_by(|a, b| a.total_cmp(b)).collect();
        let buckets = buckets.min(values.len());
        let depth = values.len() as f64 / buckets as f64;

        let mut bounds = Vec::with_capacity(buckets + 1);
        let mut distinct = Vec::with_capacity(buckets);
        bounds.push(values[0]);

        for i in 0..buckets {
            let start = (i as f64 * depth).round() as usize;
            let end = (((i + 1) as f64 * depth).round() as usize).min(values.len());
            let bucket = &values[start..end.max(start + 1)];

            bounds.push(bucket[bucket.len() - 1]);
            distinct.push(bucket.iter().dedup().count() as f64);
        }

        Histogram::new(bounds, distinct).map(Some)
    }

    /// The number of buckets.
    pub fn buckets(&self) -> usize {
        self.distinct.len()
    }

    /// The smallest value.
    pub fn min(&self) -> f64 {
        self.bounds[0]
    }

    /// The largest value.
    pub fn max(&self) -> f64 {
        self.bounds[self.bounds.len() - 1]
    }

    /// Estimates the fraction of non-NULL values for which `value <op> constant` holds.
    /// Returns `None` if the operator is not a comparison.
    pub fn selectivity(&self, op: &BinaryOp, value: f64) -> Option<f64> {
        let selectivity = match op {
            BinaryOp::Eq => self.equal_fraction(value),
            BinaryOp::NotEq => 1.0 - self.equal_fraction(value),
            BinaryOp::Lt => self.less_fraction(value),
            BinaryOp::LtEq => self.less_fraction(value) + self.equal_fraction(value),
            BinaryOp::Gt => 1.0 - self.less_fraction(value) - self.equal_fraction(value),
            BinaryOp::GtEq => 1.0 - self.less_fraction(value),
            _ => return None,
        };
        Some(selectivity.clamp(0.0, 1.0))
    }

    fn bucket_fraction(&self) -> f64 {
        1.0 / self.buckets() as f64
    }

    fn equal_fraction(&self, value: f64) -> f64 {
        if value < self.min() || value > self.max() {
            return 0.0;
        }
        // A value equal to a boundary shared by several buckets belongs to all of them.
        let fraction: f64 = (0..self.buckets())
            .filter(|i| self.bounds[*i] <= value && value <= self.bounds[*i + 1])
            .map(|i| self.bucket_fraction() / self.distinct[i].max(1.0))
            .sum();
        fraction.min(1.0)
    }

    fn less_fraction(&self, value: f64) -> f64 {
        if value <= self.min() {
            return 0.0;
        }
        if value > self.max() {
            return 1.0;
        }
        let mut fraction = 0.0;
        for i in 0..self.buckets() {
            let (low, high) = (self.bounds[i], self.bounds[i + 1]);
            if high < value {
                fraction += self.bucket_fraction();
            } else {
                if high > low && value > low {
                    fraction += self.bucket_fraction() * (value - low) / (high - low);
                }
                break;
            }
        }
        fraction
    }
}
