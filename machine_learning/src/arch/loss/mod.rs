mod loss_fn;
mod sparse_categorical_crossentropy;

pub use loss_fn::{LossFn, compute_average_loss};
pub use sparse_categorical_crossentropy::SparseCategoricalCrossentropy;
