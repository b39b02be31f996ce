pub mod loader;
pub mod remote;

pub use loader::{load_directory, load_file, EnumerationSource, SourceSpec};
