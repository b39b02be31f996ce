pub mod evaluator;
pub mod protocol;
pub mod server;
pub mod source;

pub use evaluator::*;
pub use protocol::*;
pub use server::*;
pub use source::*;
