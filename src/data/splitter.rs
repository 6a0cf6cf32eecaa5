// ============================================================
// Layer 4 — Train/Validation/Test Splitter
// ============================================================
// Shuffles samples with a seeded RNG and cuts them into three
// sets. The seed comes from `implementation.trainer.seed` so a
// rerun of the same experiment sees the same split.
//
// Split fractions come from `data.split`; whatever is left after
// train and val goes to test.
//
// Uses Fisher-Yates shuffle via rand::seq::SliceRandom.

use rand::{rngs::StdRng, seq::SliceRandom, SeedableRng};

use crate::domain::config::SplitSpec;

/// The three partitions of one shuffled sample list.
#[derive(Debug)]
pub struct SplitSets<T> {
    pub train: Vec<T>,
    pub val:   Vec<T>,
    pub test:  Vec<T>,
}

/// Shuffle `samples` and split into (train, val, test).
pub fn split_samples<T>(mut samples: Vec<T>, split: &SplitSpec, seed: u64) -> SplitSets<T> {
    let mut rng = StdRng::seed_from_u64(seed);
    samples.shuffle(&mut rng);

    let total     = samples.len();
    let train_end = (((total as f64) * split.train).round() as usize).min(total);
    let val_end   = (train_end + ((total as f64) * split.val).round() as usize).min(total);

    // split_off(n) removes [n..] and returns it
    let test = samples.split_off(val_end);
    let val  = samples.split_off(train_end);

    tracing::debug!(
        "Dataset split: {} train, {} val, {} test",
        samples.len(), val.len(), test.len(),
    );

    SplitSets { train: samples, val, test }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    fn split(train: f64, val: f64) -> SplitSpec {
        SplitSpec { train, val }
    }

    #[test]
    fn test_correct_split_sizes() {
        let items: Vec<usize> = (0..100).collect();
        let sets = split_samples(items, &split(0.7, 0.15), 1);
        assert_eq!(sets.train.len(), 70);
        assert_eq!(sets.val.len(),   15);
        assert_eq!(sets.test.len(),  15);
    }

    #[test]
    fn test_all_items_preserved() {
        let items: Vec<usize> = (0..50).collect();
        let sets = split_samples(items, &split(0.6, 0.2), 7);
        let mut all: Vec<usize> = sets.train.into_iter().chain(sets.val).chain(sets.test).collect();
        all.sort_unstable();
        assert_eq!(all, (0..50).collect::<Vec<_>>());
    }

    #[test]
    fn test_same_seed_same_split() {
        let a = split_samples((0..30).collect::<Vec<usize>>(), &split(0.5, 0.25), 3);
        let b = split_samples((0..30).collect::<Vec<usize>>(), &split(0.5, 0.25), 3);
        assert_eq!(a.train, b.train);
        assert_eq!(a.test, b.test);
    }

    #[test]
    fn test_empty_dataset() {
        let sets = split_samples(Vec::<usize>::new(), &split(0.8, 0.1), 0);
        assert!(sets.train.is_empty());
        assert!(sets.val.is_empty());
        assert!(sets.test.is_empty());
    }

    #[test]
    fn test_full_training_split() {
        let sets = split_samples((0..10).collect::<Vec<usize>>(), &split(1.0, 0.0), 0);
        assert_eq!(sets.train.len(), 10);
        assert!(sets.val.is_empty());
        assert!(sets.test.is_empty());
    }
}
