pub mod mapping;
pub mod policy;

pub use mapping::*;
pub use policy::*;
