mod access_flags;
pub mod class_file;
pub mod code;
mod descriptors;
mod errors;
pub mod hierarchy;
mod members;
mod names;
pub mod verifier;

pub use access_flags::*;
pub use descriptors::*;
pub use errors::*;
pub use members::*;
pub use names::*;
