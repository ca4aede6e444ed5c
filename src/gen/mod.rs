//! Lowering of typed syntax trees into class files
//!
//! Each method body is translated in one pass. Expressions become [`Item`]s, which defer the
//! choice of instruction until it is known whether the value is loaded, stored, or tested.
//! Conditions become [`CondItem`]s, whose jumps are threaded through short-circuit operators
//! and resolved once their targets are known. Statements keep a stack of enclosing loops,
//! switches, and `try`/`synchronized` blocks, so that `break`, `continue`, and `return` can run
//! the right finalizers on the way out.
//!
//! A class whose code exceeds a class file limit is reported as a [`Diagnostic`] and skipped;
//! anything else going wrong aborts the whole compilation.

mod class;
mod complexity;
mod env;
mod errors;
mod expr;
mod fold;
mod items;
mod method;
mod settings;
mod stmt;

pub use class::{generate_class, ClassError};
pub use errors::*;
pub use items::{CondItem, Item, MemberRef};
pub use method::generate_code;
pub use settings::*;

use crate::jvm::class_file::ClassFile;
use crate::jvm::hierarchy::{ClassData, ClassGraph};
use crate::jvm::BinaryName;
use crate::tree::CompilationUnit;

/// Result of compiling a compilation unit
#[derive(Debug, Default)]
pub struct Output {
    /// Generated classes, in declaration order
    pub classes: Vec<(BinaryName, ClassFile)>,

    /// Classes that were left out because they hit a class file limit
    pub diagnostics: Vec<Diagnostic>,
}

/// Build the class hierarchy seen by the code generator: the library classes the code relies
/// on, the ones the unit says it refers to, and the unit's own classes
pub fn class_graph(unit: &CompilationUnit) -> ClassGraph {
    let mut graph = ClassGraph::new();
    graph.insert_java_library_types();
    for (name, data) in &unit.known_classes {
        graph.add_class(name.clone(), data.clone());
    }
    for decl in &unit.classes {
        let data = ClassData {
            superclass: if decl.is_interface() {
                None
            } else {
                Some(decl.superclass())
            },
            interfaces: decl.interfaces.clone(),
            is_interface: decl.is_interface(),
            outer: decl.outer.clone(),
        };
        graph.add_class(decl.name.clone(), data);
    }
    graph
}

/// Generate class files for every class in the unit
pub fn compile(unit: &CompilationUnit, settings: &Settings) -> Result<Output, Error> {
    let graph = class_graph(unit);
    let mut output = Output::default();
    for decl in &unit.classes {
        match generate_class(decl, unit.source_file.as_deref(), &graph, settings) {
            Ok(class_file) => output.classes.push((decl.name.clone(), class_file)),
            Err(ClassError {
                method,
                error: Error::BytecodeGen(error),
            }) if error.is_limit_violation() => {
                let diagnostic = Diagnostic {
                    class: decl.name.clone(),
                    method,
                    error,
                };
                log::error!("{}", diagnostic);
                output.diagnostics.push(diagnostic);
            }
            Err(ClassError { method, error }) => {
                log::error!(
                    "aborting in {}{}",
                    decl.name,
                    method.map(|method| format!(".{}", method)).unwrap_or_default()
                );
                return Err(error);
            }
        }
    }
    Ok(output)
}
