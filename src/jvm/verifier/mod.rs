//! Verification types and stack map frames
//!
//! For any specific instruction inside a method body, the stack and locals should have the same
//! structure, regardless of which control flow was used to reach that instruction. In other words:
//! although the values on the stack and in the locals may obviously be different, the types and
//! order of the stack and local variables cannot. This information is referred to as the _stack
//! map frame_ (represented using [`Frame`]) and the set of stack map frames for all possible jump
//! targets in a method is the _stack map table_.
//!
//! The "types" used in verification (represented using [`VerificationType`]) are slightly
//! augmented to take into account initialization and null. The code builder tracks them for every
//! instruction it emits and records a frame at each branch target. Frames are then compressed
//! against their predecessor (see [`Frame::stack_map_frame`]) before being written into a
//! [`crate::jvm::class_file::StackMapTable`] attribute, and [`Frame::apply`] undoes the
//! compression when reading a class back.
//!
//! [0]: https://docs.oracle.com/javase/specs/jvms/se17/html/jvms-4.html#jvms-4.10.1

mod frame;
mod types;

pub use frame::*;
pub use types::*;
