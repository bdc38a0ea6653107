use ndarray::{ArrayView1, ArrayView2, Axis};

/// Streaming sparse categorical accuracy: the fraction of examples whose predicted class is
/// their label.
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct Accuracy {
    correct: u64,
    total: u64,
}

impl Accuracy {
    pub fn new() -> Self {
        Self::default()
    }

    /// Counts the hits of a batch, predicting the class of the highest logit.
    ///
    /// # Returns
    /// The amount of correctly classified examples in the batch.
    pub fn update(&mut self, logits: ArrayView2<f32>, labels: &[u32]) -> u64 {
        self.count(logits, labels, |row| argmax(row.iter().copied()))
    }

    /// Counts the hits of a batch whose logits are first binarized against `threshold`.
    ///
    /// The predicted class is the first one whose logit exceeds `threshold`, or class 0 when
    /// none does.
    ///
    /// # Returns
    /// The amount of correctly classified examples in the batch.
    pub fn update_above(&mut self, logits: ArrayView2<f32>, labels: &[u32], threshold: f32) -> u64 {
        self.count(logits, labels, |row| {
            Some(row.iter().position(|&v| v > threshold).unwrap_or(0))
        })
    }

    fn count<F>(&mut self, logits: ArrayView2<f32>, labels: &[u32], predict: F) -> u64
    where
        F: Fn(ArrayView1<f32>) -> Option<usize>,
    {
        let hits = logits
            .axis_iter(Axis(0))
            .zip(labels)
            .filter(|(row, label)| predict(row.view()) == Some(**label as usize))
            .count() as u64;

        self.merge(hits, labels.len() as u64);
        hits
    }

    /// Adds counts computed somewhere else, e.g. reduced over every replica.
    pub fn merge(&mut self, correct: u64, total: u64) {
        self.correct += correct;
        self.total += total;
    }

    pub fn correct(&self) -> u64 {
        self.correct
    }

    pub fn total(&self) -> u64 {
        self.total
    }

    /// The current accuracy, `0` when nothing has been seen yet.
    pub fn result(&self) -> f64 {
        if self.total == 0 {
            return 0.;
        }

        self.correct as f64 / self.total as f64
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Index of the first maximum.
fn argmax<I: Iterator<Item = f32>>(values: I) -> Option<usize> {
    values
        .enumerate()
        .fold(None, |best: Option<(usize, f32)>, (i, v)| match best {
            Some((_, b)) if b >= v => best,
            _ => Some((i, v)),
        })
        .map(|(i, _)| i)
}
