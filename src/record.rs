use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Upper bound on the generations reserved up front.
const MAX_PREALLOCATED: usize = 4096;

/// Global best loss after initialization and after every generation.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConvergenceRecord(Vec<f64>);

impl ConvergenceRecord {
    pub fn with_capacity(generations: usize) -> Self {
        Self(Vec::with_capacity(
            generations.saturating_add(1).min(MAX_PREALLOCATED),
        ))
    }

    pub fn push(&mut self, best: f64) {
        self.0.push(best);
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.0
    }

    pub fn last(&self) -> Option<f64> {
        self.0.last().copied()
    }

    pub fn is_non_increasing(&self) -> bool {
        self.0.windows(2).all(|w| w[1] <= w[0])
    }

    /// Generation at which the final value was first reached.
    pub fn settled_at(&self) -> Option<usize> {
        let last = self.last()?;
        self.0.iter().position(|&v| v == last)
    }

    /// Write as a 1-d float64 `.npy` array.
    pub fn write_npy(&self, path: &Path) -> Result<()> {
        npy::to_file(path, self.0.iter().copied())
            .with_context(|| format!("Error writing convergence record to {}", path.display()))
    }
}

impl From<Vec<f64>> for ConvergenceRecord {
    fn from(value: Vec<f64>) -> Self {
        Self(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use npy::NpyData;

    #[test]
    fn monotonicity_and_settling() {
        let record = ConvergenceRecord::from(vec![30.0, 25.0, 25.0, 21.5, 21.5]);
        assert!(record.is_non_increasing());
        assert_eq!(record.settled_at(), Some(3));
        assert!(!ConvergenceRecord::from(vec![3.0, 4.0]).is_non_increasing());
        assert_eq!(ConvergenceRecord::default().settled_at(), None);
    }

    #[test]
    fn capacity_is_bounded() {
        let mut record = ConvergenceRecord::with_capacity(usize::MAX);
        record.push(1.0);
        assert_eq!(record.len(), 1);
        assert!(ConvergenceRecord::with_capacity(10).0.capacity() >= 11);
    }

    #[test]
    fn npy_file_holds_every_generation() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("record.npy");
        let record = ConvergenceRecord::from(vec![120.5, 101.25, 99.0]);
        record.write_npy(&path).unwrap();

        let bytes = std::fs::read(&path).unwrap();
        let data: NpyData<f64> = NpyData::from_bytes(&bytes).unwrap();
        assert_eq!(data.to_vec(), vec![120.5, 101.25, 99.0]);
    }
}
