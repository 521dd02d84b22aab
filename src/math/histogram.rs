//! Fixed-binning one-dimensional histogram.
//!
//! This is the "distribution" handed to the single-distribution fit and the
//! record persisted for every energy point. Entries outside `[low, high)` are
//! kept in the under/overflow counters and still count as entries.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Histogram {
    pub low: f64,
    pub high: f64,
    pub counts: Vec<f64>,
    pub underflow: f64,
    pub overflow: f64,
    pub entries: u64,
}

impl Histogram {
    /// Create an empty histogram. `bins` is clamped to at least one and an
    /// empty range is widened to unit width.
    pub fn new(bins: usize, low: f64, high: f64) -> Self {
        let high = if high > low { high } else { low + 1.0 };
        Self {
            low,
            high,
            counts: vec![0.0; bins.max(1)],
            underflow: 0.0,
            overflow: 0.0,
            entries: 0,
        }
    }

    /// Histogram of `values` with `bins` bins centred on `mean ± half_width`.
    pub fn around(values: &[f64], bins: usize, mean: f64, half_width: f64) -> Self {
        let mut hist = Self::new(bins, mean - half_width, mean + half_width);
        for &v in values {
            hist.fill(v);
        }
        hist
    }

    pub fn fill(&mut self, x: f64) {
        self.entries += 1;
        if x < self.low {
            self.underflow += 1.0;
        } else if x >= self.high {
            self.overflow += 1.0;
        } else {
            let idx = ((x - self.low) / self.bin_width()) as usize;
            let idx = idx.min(self.counts.len() - 1);
            self.counts[idx] += 1.0;
        }
    }

    pub fn bins(&self) -> usize {
        self.counts.len()
    }

    pub fn bin_width(&self) -> f64 {
        (self.high - self.low) / self.counts.len() as f64
    }

    pub fn bin_center(&self, i: usize) -> f64 {
        self.low + (i as f64 + 0.5) * self.bin_width()
    }

    /// Sum of in-range bin contents.
    pub fn integral(&self) -> f64 {
        self.counts.iter().sum()
    }

    /// Mean of the in-range contents, computed from bin centres.
    pub fn mean(&self) -> Option<f64> {
        let total = self.integral();
        if total <= 0.0 {
            return None;
        }
        let sum: f64 = self
            .counts
            .iter()
            .enumerate()
            .map(|(i, c)| c * self.bin_center(i))
            .sum();
        Some(sum / total)
    }

    /// RMS of the in-range contents, computed from bin centres.
    pub fn rms(&self) -> Option<f64> {
        let mean = self.mean()?;
        let total = self.integral();
        let var: f64 = self
            .counts
            .iter()
            .enumerate()
            .map(|(i, c)| {
                let d = self.bin_center(i) - mean;
                c * d * d
            })
            .sum::<f64>()
            / total;
        Some(var.max(0.0).sqrt())
    }

    /// Half-width of the narrowest contiguous window holding `fraction` of the
    /// in-range contents. The window edge bin is interpolated linearly.
    pub fn effective_sigma(&self, fraction: f64) -> Option<f64> {
        let total = self.integral();
        if total <= 0.0 || !(0.0..=1.0).contains(&fraction) {
            return None;
        }
        let target = fraction * total;
        let width = self.bin_width();
        let n = self.counts.len();

        let mut best: Option<f64> = None;
        for start in 0..n {
            let mut acc = 0.0;
            for end in start..n {
                let before = acc;
                acc += self.counts[end];
                if acc >= target {
                    // Only the needed part of the last bin is counted.
                    let partial = if self.counts[end] > 0.0 {
                        (target - before) / self.counts[end]
                    } else {
                        1.0
                    };
                    let span = ((end - start) as f64 + partial) * width;
                    if best.is_none_or(|b| span < b) {
                        best = Some(span);
                    }
                    break;
                }
            }
        }
        best.map(|span| span / 2.0)
    }
}

/// Mean and RMS of a sample (population RMS, as histogram statistics are).
pub fn moments(values: &[f64]) -> Option<(f64, f64)> {
    if values.is_empty() {
        return None;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let var = values.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / n;
    Some((mean, var.max(0.0).sqrt()))
}
