pub mod generation;
pub mod prediction;
pub mod site;

pub use generation::*;
pub use prediction::*;
pub use site::*;
