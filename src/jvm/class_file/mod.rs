//! Binary class file format
//!
//! Everything here mirrors the structures of [chapter 4 of the JVM specification][0] closely:
//! constants are referred to by index, attributes are opaque blobs until decoded. Types implement
//! [`Serialize`] for writing and [`Decode`] for reading class files back in (used to inspect
//! generated classes).
//!
//! [0]: https://docs.oracle.com/javase/specs/jvms/se15/html/jvms-4.html

mod attribute;
mod class;
mod constants;
mod field;
mod method;
mod serialize;
mod version;

pub use attribute::*;
pub use class::*;
pub use constants::*;
pub use field::*;
pub use method::*;
pub use serialize::*;
pub use version::*;
