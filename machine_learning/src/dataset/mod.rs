pub mod fashion_mnist;
pub mod idx;
mod in_memory;

pub use in_memory::{Batch, InMemoryDataset};
