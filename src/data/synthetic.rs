// ============================================================
// Layer 4 — Synthetic Sample Generation
// ============================================================
// In production the samples come from a labelled dataset. When
// none is wired in we generate learnable ones from the config so
// the whole pipeline can run end to end:
//
//   x       uniform noise, one channel per selected feature
//   labels  derived from the first channel, so they are
//           predictable from x:
//             class-labelled, per pixel  → quantised x[0, h, w]
//             class-labelled, per sample → quantised mean of x[0]
//             other tasks                → mean of x[0]
//   mask    only when the loss is masked: each value is dropped
//           with a small probability
//
// Seeded from `implementation.trainer.seed` for reproducibility.

use rand::{rngs::StdRng, Rng, SeedableRng};

use crate::data::dataset::Sample;
use crate::domain::config::ExperimentConfig;

const MASK_DROP_PROB: f64 = 0.05;

/// Generates samples shaped for one experiment.
pub struct SyntheticSource {
    channels:     usize,
    height:       usize,
    width:        usize,
    label_levels: Option<usize>,
    per_pixel:    bool,
    masked:       bool,
    count:        usize,
    seed:         u64,
}

impl SyntheticSource {
    pub fn from_config(cfg: &ExperimentConfig) -> Self {
        let (height, width) = match cfg.arch.input_model_dim {
            1 => (1, cfg.data.length),
            _ => (cfg.data.height, cfg.data.width),
        };
        // Binary tasks draw 0/1 labels whatever the raw count
        let label_levels = cfg
            .task
            .is_class_labelled()
            .then(|| cfg.data.num_classes.max(2));

        Self {
            channels:  cfg.in_channels(),
            height,
            width,
            label_levels,
            per_pixel: !cfg.image_level_output(),
            masked:    cfg.implementation.loss.masked,
            count:     cfg.data.num_samples,
            seed:      cfg.implementation.trainer.seed,
        }
    }

    pub fn generate(&self) -> Vec<Sample> {
        let mut rng = StdRng::seed_from_u64(self.seed);
        (0..self.count).map(|_| self.one(&mut rng)).collect()
    }

    fn one(&self, rng: &mut StdRng) -> Sample {
        let plane = self.height * self.width;
        let x: Vec<f32> = (0..self.channels * plane).map(|_| rng.gen::<f32>()).collect();
        let first = &x[..plane];

        let (labels, label_shape) = if self.per_pixel {
            let labels = first.iter().map(|&v| self.label_for(v)).collect();
            (labels, [self.height, self.width])
        } else {
            let mean = first.iter().sum::<f32>() / plane.max(1) as f32;
            (vec![self.label_for(mean)], [1, 1])
        };

        let sample = Sample::new(x, [self.channels, self.height, self.width], labels, label_shape);
        if self.masked {
            let mask = (0..self.channels * plane)
                .map(|_| if rng.gen_bool(MASK_DROP_PROB) { 0.0 } else { 1.0 })
                .collect();
            sample.with_mask(mask)
        } else {
            sample
        }
    }

    fn label_for(&self, value: f32) -> f32 {
        match self.label_levels {
            Some(levels) => ((value * levels as f32).floor() as usize).min(levels - 1) as f32,
            None         => value,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::config::tests::segmentation_config;

    #[test]
    fn test_segmentation_samples_match_config() {
        let cfg     = segmentation_config();
        let samples = SyntheticSource::from_config(&cfg).generate();
        assert_eq!(samples.len(), cfg.data.num_samples);
        let s = &samples[0];
        assert_eq!(s.shape, [3, 8, 8]);
        assert_eq!(s.label_shape, [8, 8]);
        assert!(s.mask.is_none());
        assert!(s.validate().is_ok());
        // Labels are class indices below num_classes
        assert!(s.labels.as_ref().unwrap().iter().all(|&l| l >= 0.0 && l < 3.0 && l.fract() == 0.0));
    }

    #[test]
    fn test_image_level_binary_labels() {
        let mut cfg = segmentation_config();
        cfg.task                  = crate::domain::Task::Classification;
        cfg.arch.output_model_dim = 1;
        cfg.data.num_classes      = 2;
        cfg.implementation.loss.masked = true;
        let samples = SyntheticSource::from_config(&cfg).generate();
        let s = &samples[0];
        assert_eq!(s.label_shape, [1, 1]);
        assert!(s.mask.is_some());
        assert!(samples.iter().all(|s| matches!(s.labels.as_deref(), Some([l]) if *l == 0.0 || *l == 1.0)));
    }

    #[test]
    fn test_seed_is_reproducible() {
        let cfg = segmentation_config();
        let a = SyntheticSource::from_config(&cfg).generate();
        let b = SyntheticSource::from_config(&cfg).generate();
        assert_eq!(a[3].x, b[3].x);
    }
}
