pub mod store;

pub use store::{EnumerationStore, Snapshot};
