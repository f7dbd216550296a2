//! Thinned diagnostics emitted while a sampler runs.

#[cfg(feature = "serde")]
use std::io::Write;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::utils::MeanAndVariance;

/// State of the chain after step `step`.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct HistoryRecord {
    /// Number of steps completed since the sampler was built.
    pub step: usize,
    /// Open blocks, not counting the null block.
    pub cluster_count: usize,
    pub total_ln_m: f64,
}

/// Destination for history records.
pub trait HistorySink {
    /// # Errors
    /// Sink specific; a failing sink aborts the run.
    fn record(&mut self, record: HistoryRecord) -> Result<()>;
}

impl HistorySink for Vec<HistoryRecord> {
    fn record(&mut self, record: HistoryRecord) -> Result<()> {
        self.push(record);
        Ok(())
    }
}

/// Write each record as one JSON object per line.
#[cfg(feature = "serde")]
#[derive(Debug)]
pub struct JsonLinesSink<W: Write> {
    writer: W,
}

#[cfg(feature = "serde")]
impl<W: Write> JsonLinesSink<W> {
    pub const fn new(writer: W) -> Self {
        Self { writer }
    }

    /// # Errors
    /// If flushing the writer fails.
    pub fn into_inner(mut self) -> Result<W> {
        self.writer.flush()?;
        Ok(self.writer)
    }
}

#[cfg(feature = "serde")]
impl<W: Write> HistorySink for JsonLinesSink<W> {
    fn record(&mut self, record: HistoryRecord) -> Result<()> {
        serde_json::to_writer(&mut self.writer, &record).map_err(std::io::Error::from)?;
        self.writer.write_all(b"\n")?;
        Ok(())
    }
}

/// Running mean and variance of the recorded cluster counts and
/// log-likelihoods.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct HistorySummary {
    cluster_count: MeanAndVariance,
    total_ln_m: MeanAndVariance,
}

impl HistorySummary {
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn update(self, record: &HistoryRecord) -> Self {
        Self {
            cluster_count: self.cluster_count.update(record.cluster_count as f64),
            total_ln_m: self.total_ln_m.update(record.total_ln_m),
        }
    }

    pub const fn n_records(&self) -> usize {
        self.cluster_count.count()
    }

    pub const fn mean_cluster_count(&self) -> f64 {
        self.cluster_count.mean()
    }

    pub fn cluster_count_variance(&self) -> f64 {
        self.cluster_count.sample_variance()
    }

    pub const fn mean_total_ln_m(&self) -> f64 {
        self.total_ln_m.mean()
    }

    pub fn total_ln_m_variance(&self) -> f64 {
        self.total_ln_m.sample_variance()
    }
}

impl HistorySink for HistorySummary {
    fn record(&mut self, record: HistoryRecord) -> Result<()> {
        *self = self.update(&record);
        Ok(())
    }
}

impl<'a> FromIterator<&'a HistoryRecord> for HistorySummary {
    fn from_iter<T: IntoIterator<Item = &'a HistoryRecord>>(iter: T) -> Self {
        iter.into_iter()
            .fold(Self::default(), |acc, record| acc.update(record))
    }
}
