use crate::jvm::{self, BinaryName};
use std::fmt::{Display, Formatter, Result as FmtResult};

#[derive(Debug)]
pub enum Error {
    BytecodeGen(jvm::Error),

    /// The tree is inconsistent in a way the front-end should have ruled out (unknown local,
    /// `break` outside of any loop, `void` expression used as a value, etc.)
    MalformedTree(String),
}

impl Error {
    /// Does this error only invalidate the enclosing class (as opposed to the whole run)?
    pub fn is_limit_violation(&self) -> bool {
        match self {
            Error::BytecodeGen(err) => err.is_limit_violation(),
            Error::MalformedTree(_) => false,
        }
    }

    pub(crate) fn malformed(message: impl Into<String>) -> Error {
        Error::MalformedTree(message.into())
    }
}

impl From<jvm::Error> for Error {
    fn from(err: jvm::Error) -> Error {
        Error::BytecodeGen(err)
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            Error::BytecodeGen(err) => err.fmt(f),
            Error::MalformedTree(msg) => write!(f, "malformed tree: {}", msg),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::BytecodeGen(err) => Some(err),
            Error::MalformedTree(_) => None,
        }
    }
}

/// Class file limit exceeded while compiling some class
///
/// The class is not emitted, but compilation of the other classes carries on.
#[derive(Debug)]
pub struct Diagnostic {
    pub class: BinaryName,

    /// Name and descriptor of the method, if the problem is in a method
    pub method: Option<String>,
    pub error: jvm::Error,
}

impl Display for Diagnostic {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match &self.method {
            Some(method) => write!(f, "{}.{}: {}", self.class, method, self.error),
            None => write!(f, "{}: {}", self.class, self.error),
        }
    }
}
