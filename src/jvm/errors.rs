use super::class_file::Constant;
use std::fmt::{Display, Formatter, Result as FmtResult};

#[derive(Debug)]
pub enum Error {
    /// Adding the constant would overflow the 16-bit constant pool index space
    ConstantPoolOverflow {
        constant: Constant,
        offset: usize,
    },

    /// Modified UTF-8 encoding of a string exceeds 65535 bytes
    StringTooLong {
        length: usize,
    },

    /// Method bytecode exceeds 65535 bytes
    CodeTooLarge(usize),
    TooManyLocals(usize),
    StackTooDeep(usize),

    /// Parameters (including `this`) need more than 255 slots
    TooManyParameters(usize),

    /// Array creation with more than 255 dimensions
    TooManyDimensions(usize),

    /// Exception table range doesn't fit in the 16-bit `end_pc`
    TryRangeTooLarge {
        start: usize,
        end: usize,
    },

    IoError(std::io::Error),

    /// Class file bytes couldn't be read back
    MalformedClassFile(String),

    /// Generated code violates an invariant of the simulated machine state (indicates a bug)
    Internal(InternalError),
}

impl Error {
    /// Is this a violation of a class file format limit?
    ///
    /// These abort only the enclosing class, unlike internal errors.
    pub fn is_limit_violation(&self) -> bool {
        matches!(
            self,
            Error::ConstantPoolOverflow { .. }
                | Error::StringTooLong { .. }
                | Error::CodeTooLarge(_)
                | Error::TooManyLocals(_)
                | Error::StackTooDeep(_)
                | Error::TooManyParameters(_)
                | Error::TooManyDimensions(_)
                | Error::TryRangeTooLarge { .. }
        )
    }

    pub fn internal(pc: usize, kind: InternalErrorKind) -> Error {
        Error::Internal(InternalError { pc, kind })
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Error {
        Error::IoError(err)
    }
}

#[derive(Debug)]
pub struct InternalError {
    /// Offset in the method code where the inconsistency was detected
    pub pc: usize,
    pub kind: InternalErrorKind,
}

#[derive(Debug)]
pub enum InternalErrorKind {
    EmptyStack,
    InvalidWidth(usize),
    InvalidType { expected: String, found: String },
    NotArrayType(String),
    UndefinedLocal(u16),

    /// Jump sites or states that can't be merged (stack depth, lock depth, or stack types differ)
    IncompatibleStates(String),

    /// Stack was not empty at the end of a statement
    StackNotEmpty(usize),

    /// Unlocking a monitor that isn't the innermost held one
    UnbalancedMonitor(u16),

    /// A branch was patched at a site that doesn't hold a branch
    NotABranch(usize),

    /// Jumps whose target was never placed when the method was finished
    UnresolvedJumps(usize),
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            Error::ConstantPoolOverflow { constant, offset } => write!(
                f,
                "too many constants: adding {:?} at offset {} overflows the constant pool",
                constant, offset
            ),
            Error::StringTooLong { length } => {
                write!(f, "constant string too long ({} bytes)", length)
            }
            Error::CodeTooLarge(len) => write!(f, "code too large ({} bytes)", len),
            Error::TooManyLocals(len) => write!(f, "too many local variables ({})", len),
            Error::StackTooDeep(len) => write!(f, "operand stack too deep ({})", len),
            Error::TooManyParameters(len) => write!(f, "too many parameters ({} slots)", len),
            Error::TooManyDimensions(len) => write!(f, "array type has too many dimensions ({})", len),
            Error::TryRangeTooLarge { start, end } => {
                write!(f, "try statement too large (covers {}..{})", start, end)
            }
            Error::IoError(err) => write!(f, "i/o error: {}", err),
            Error::MalformedClassFile(msg) => write!(f, "malformed class file: {}", msg),
            Error::Internal(InternalError { pc, kind }) => {
                write!(f, "internal code generation error at pc {}: {:?}", pc, kind)
            }
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::IoError(err) => Some(err),
            _ => None,
        }
    }
}
