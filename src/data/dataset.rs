use burn::data::dataset::Dataset;
use serde::{Deserialize, Serialize};

use crate::domain::error::{HarnessError, Result};

/// One example in channel-first layout.
///
/// `x` holds `[channels, height, width]` values row-major; 1D
/// signals use `height = 1`. `labels` holds `[height, width]`
/// class indices (or targets); image-level labels use `[1, 1]`.
/// `mask` has the shape of `x`; zero marks a missing value.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Sample {
    pub x:           Vec<f32>,
    pub shape:       [usize; 3],
    pub labels:      Option<Vec<f32>>,
    pub label_shape: [usize; 2],
    pub mask:        Option<Vec<f32>>,
}

impl Sample {
    pub fn new(x: Vec<f32>, shape: [usize; 3], labels: Vec<f32>, label_shape: [usize; 2]) -> Self {
        Self { x, shape, labels: Some(labels), label_shape, mask: None }
    }

    pub fn with_mask(mut self, mask: Vec<f32>) -> Self {
        self.mask = Some(mask);
        self
    }

    pub fn numel(&self) -> usize {
        self.shape.iter().product()
    }

    /// Buffer lengths must agree with the declared shapes.
    pub fn validate(&self) -> Result<()> {
        if self.x.len() != self.numel() {
            return Err(HarnessError::batch(format!(
                "sample x has {} values, shape {:?} needs {}",
                self.x.len(), self.shape, self.numel()
            )));
        }
        if let Some(labels) = &self.labels {
            let expected = self.label_shape[0] * self.label_shape[1];
            if labels.len() != expected {
                return Err(HarnessError::batch(format!(
                    "sample labels have {} values, shape {:?} needs {expected}",
                    labels.len(), self.label_shape
                )));
            }
        }
        if let Some(mask) = &self.mask {
            if mask.len() != self.numel() {
                return Err(HarnessError::batch(format!(
                    "sample mask has {} values, x has {}",
                    mask.len(), self.numel()
                )));
            }
        }
        Ok(())
    }
}

/// In-memory dataset of samples sharing one shape.
pub struct SampleDataset {
    samples: Vec<Sample>,
}

impl SampleDataset {
    pub fn new(samples: Vec<Sample>) -> Result<Self> {
        if let Some(first) = samples.first() {
            for s in &samples {
                s.validate()?;
                if s.shape != first.shape || s.label_shape != first.label_shape {
                    return Err(HarnessError::batch(format!(
                        "mixed sample shapes in one dataset: {:?}/{:?} vs {:?}/{:?}",
                        s.shape, s.label_shape, first.shape, first.label_shape
                    )));
                }
            }
        }
        Ok(Self { samples })
    }

    pub fn sample_count(&self) -> usize { self.samples.len() }
}

impl Dataset<Sample> for SampleDataset {
    fn get(&self, index: usize) -> Option<Sample> {
        self.samples.get(index).cloned()
    }

    fn len(&self) -> usize {
        self.samples.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_wrong_buffer_length() {
        let s = Sample::new(vec![0.0; 5], [1, 2, 3], vec![0.0; 6], [2, 3]);
        assert!(matches!(s.validate(), Err(HarnessError::BatchFormat(_))));
    }

    #[test]
    fn test_rejects_mixed_shapes() {
        let a = Sample::new(vec![0.0; 4], [1, 2, 2], vec![0.0; 4], [2, 2]);
        let b = Sample::new(vec![0.0; 9], [1, 3, 3], vec![0.0; 9], [3, 3]);
        assert!(SampleDataset::new(vec![a, b]).is_err());
    }

    #[test]
    fn test_dataset_access() {
        let a  = Sample::new(vec![1.0; 4], [1, 2, 2], vec![0.0; 4], [2, 2]);
        let ds = SampleDataset::new(vec![a.clone(), a]).unwrap();
        assert_eq!(ds.len(), 2);
        assert!(ds.get(1).is_some());
        assert!(ds.get(2).is_none());
    }
}
