//! Code generation backend for a Java-like compiler
//!
//! The input is a fully typed and resolved syntax tree (see [`tree`]). The output is a set of
//! [`jvm::class_file::ClassFile`]s which can be written straight to disk. In between:
//!
//!   - [`gen`] walks the tree method by method, lowering expressions through addressable
//!     [items](gen::Item) and statements through jump chains
//!   - [`jvm::code::CodeBuilder`] owns the instruction stream of one method, simulating the
//!     operand stack and local variables as it goes and recording stack map frames at merge points
//!   - [`jvm::class_file::ConstantsPool`] deduplicates every constant the code refers to
//!   - [`jvm::class_file`] serializes (and reads back) the binary class file format

pub mod gen;
pub mod jvm;
pub mod tree;
pub mod util;
