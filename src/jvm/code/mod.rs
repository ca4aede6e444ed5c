//! Method bodies: instructions, the simulated machine state, and the code buffer
//!
//! [`CodeBuilder`] is the only way code gets emitted. Every [`Instruction`] passed to it is encoded
//! and also applied to a [`State`] tracking the operand stack, local variables, and held monitors.
//! Forward branches produce [`Chain`]s which are patched once their target is reached.

mod chain;
mod code_builder;
mod instructions;
mod state;

pub use chain::*;
pub use code_builder::*;
pub use instructions::*;
pub use state::*;
