use super::{decode_bytes, Decode, Serialize};
use crate::jvm::class_file::{ClassConstantIndex, ConstantIndex, Utf8ConstantIndex};
use crate::jvm::verifier::VerificationType;
use crate::jvm::InnerClassAccessFlags;
use byteorder::{ReadBytesExt, WriteBytesExt};
use std::io::{Error, ErrorKind, Result};

/// Attributes (used in classes, fields, methods, and even on some attributes)
///
/// The representation is designed to be easily extended with custom attributes.
/// While some attributes aren't essential, others are really important (eg. the
/// code attribute for including the actual bytecode).
///
/// [0]: https://docs.oracle.com/javase/specs/jvms/se15/html/jvms-4.html#jvms-4.7
#[derive(Debug, Clone, PartialEq)]
pub struct Attribute {
    pub name_index: Utf8ConstantIndex,
    pub info: Vec<u8>,
}

impl Attribute {
    /// Decode the payload of the attribute
    pub fn decode_info<A: AttributeLike + Decode>(&self) -> Result<A> {
        let mut reader = &self.info[..];
        let decoded = A::decode(&mut reader)?;
        if !reader.is_empty() {
            let msg = format!("{} attribute has {} trailing bytes", A::NAME, reader.len());
            return Err(Error::new(ErrorKind::InvalidData, msg));
        }
        Ok(decoded)
    }
}

impl Serialize for Attribute {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> Result<()> {
        self.name_index.serialize(writer)?;

        // Attribute info length is 4 bytes
        (self.info.len() as u32).serialize(writer)?;
        writer.write_all(&self.info)?;

        Ok(())
    }
}

impl Decode for Attribute {
    fn decode<R: ReadBytesExt>(reader: &mut R) -> Result<Self> {
        let name_index = Utf8ConstantIndex::decode(reader)?;
        let len = u32::decode(reader)?;
        let info = decode_bytes(reader, len as usize)?;
        Ok(Attribute { name_index, info })
    }
}

/// Attributes are all stored in the same way (see `Attribute`), but internally
/// they represent very different things. This trait is implemented by things
/// which can be turned into attributes.
pub trait AttributeLike: Serialize {
    /// Name of the attribute
    const NAME: &'static str;
}

/// Attributes whose payload is a single `u16` or a `u16`-prefixed list
macro_rules! simple_attribute {
    ($attr:ident, $inner:ty, $name:literal) => {
        impl AttributeLike for $attr {
            const NAME: &'static str = $name;
        }

        impl Serialize for $attr {
            fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> Result<()> {
                self.0.serialize(writer)
            }
        }

        impl Decode for $attr {
            fn decode<R: ReadBytesExt>(reader: &mut R) -> Result<Self> {
                <$inner>::decode(reader).map($attr)
            }
        }
    };
}

/// Initial value of a `static final` field
///
/// [0]: https://docs.oracle.com/javase/specs/jvms/se15/html/jvms-4.html#jvms-4.7.2
#[derive(Debug, PartialEq)]
pub struct ConstantValue(pub ConstantIndex);
simple_attribute!(ConstantValue, ConstantIndex, "ConstantValue");

/// Checked exceptions declared by a method
///
/// [0]: https://docs.oracle.com/javase/specs/jvms/se15/html/jvms-4.html#jvms-4.7.5
#[derive(Debug, PartialEq)]
pub struct Exceptions(pub Vec<ClassConstantIndex>);
simple_attribute!(Exceptions, Vec<ClassConstantIndex>, "Exceptions");

/// [0]: https://docs.oracle.com/javase/specs/jvms/se15/html/jvms-4.html#jvms-4.7.10
#[derive(Debug, PartialEq)]
pub struct SourceFile(pub Utf8ConstantIndex);
simple_attribute!(SourceFile, Utf8ConstantIndex, "SourceFile");

/// [0]: https://docs.oracle.com/javase/specs/jvms/se15/html/jvms-4.html#jvms-4.7.3
#[derive(Debug, PartialEq)]
pub struct Code {
    pub max_stack: u16,
    pub max_locals: u16,
    pub code_array: BytecodeArray,
    pub exception_table: Vec<ExceptionHandler>,
    pub attributes: Vec<Attribute>,
}

impl Serialize for Code {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> Result<()> {
        self.max_stack.serialize(writer)?;
        self.max_locals.serialize(writer)?;
        self.code_array.serialize(writer)?;
        self.exception_table.serialize(writer)?;
        self.attributes.serialize(writer)?;
        Ok(())
    }
}

impl Decode for Code {
    fn decode<R: ReadBytesExt>(reader: &mut R) -> Result<Self> {
        Ok(Code {
            max_stack: u16::decode(reader)?,
            max_locals: u16::decode(reader)?,
            code_array: BytecodeArray::decode(reader)?,
            exception_table: Vec::decode(reader)?,
            attributes: Vec::decode(reader)?,
        })
    }
}

impl AttributeLike for Code {
    const NAME: &'static str = "Code";
}

/// Row in the exception table of a `Code` attribute
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExceptionHandler {
    /// Start of exception handler range (inclusive)
    pub start_pc: BytecodeIndex,

    /// End of exception handler range (exclusive)
    pub end_pc: BytecodeIndex,

    /// Start of the exception handler
    pub handler_pc: BytecodeIndex,

    /// Class of exceptions caught, or `0` to catch everything
    pub catch_type: ConstantIndex,
}

impl Serialize for ExceptionHandler {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> Result<()> {
        self.start_pc.serialize(writer)?;
        self.end_pc.serialize(writer)?;
        self.handler_pc.serialize(writer)?;
        self.catch_type.serialize(writer)?;
        Ok(())
    }
}

impl Decode for ExceptionHandler {
    fn decode<R: ReadBytesExt>(reader: &mut R) -> Result<Self> {
        Ok(ExceptionHandler {
            start_pc: BytecodeIndex::decode(reader)?,
            end_pc: BytecodeIndex::decode(reader)?,
            handler_pc: BytecodeIndex::decode(reader)?,
            catch_type: ConstantIndex::decode(reader)?,
        })
    }
}

/// Encoded bytecode instructions
#[derive(Debug, PartialEq)]
pub struct BytecodeArray(pub Vec<u8>);

impl Serialize for BytecodeArray {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> Result<()> {
        let len = self.0.len() as u32;
        len.serialize(writer)?;
        writer.write_all(&self.0)?;
        Ok(())
    }
}

impl Decode for BytecodeArray {
    fn decode<R: ReadBytesExt>(reader: &mut R) -> Result<Self> {
        let len = u32::decode(reader)?;
        decode_bytes(reader, len as usize).map(BytecodeArray)
    }
}

/// Index into `BytecodeArray`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct BytecodeIndex(pub u16);

impl Serialize for BytecodeIndex {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> Result<()> {
        self.0.serialize(writer)
    }
}

impl Decode for BytecodeIndex {
    fn decode<R: ReadBytesExt>(reader: &mut R) -> Result<Self> {
        u16::decode(reader).map(BytecodeIndex)
    }
}

/// [0]: https://docs.oracle.com/javase/specs/jvms/se15/html/jvms-4.html#jvms-4.7.12
#[derive(Debug, PartialEq)]
pub struct LineNumberTable(pub Vec<LineNumber>);
simple_attribute!(LineNumberTable, Vec<LineNumber>, "LineNumberTable");

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineNumber {
    pub start_pc: BytecodeIndex,
    pub line_number: u16,
}

impl Serialize for LineNumber {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> Result<()> {
        self.start_pc.serialize(writer)?;
        self.line_number.serialize(writer)
    }
}

impl Decode for LineNumber {
    fn decode<R: ReadBytesExt>(reader: &mut R) -> Result<Self> {
        Ok(LineNumber {
            start_pc: BytecodeIndex::decode(reader)?,
            line_number: u16::decode(reader)?,
        })
    }
}

/// [0]: https://docs.oracle.com/javase/specs/jvms/se15/html/jvms-4.html#jvms-4.7.13
#[derive(Debug, PartialEq)]
pub struct LocalVariableTable(pub Vec<LocalVariable>);
simple_attribute!(LocalVariableTable, Vec<LocalVariable>, "LocalVariableTable");

/// Same layout as `LocalVariableTable`, but with generic signatures instead of descriptors
///
/// [0]: https://docs.oracle.com/javase/specs/jvms/se15/html/jvms-4.html#jvms-4.7.14
#[derive(Debug, PartialEq)]
pub struct LocalVariableTypeTable(pub Vec<LocalVariable>);
simple_attribute!(
    LocalVariableTypeTable,
    Vec<LocalVariable>,
    "LocalVariableTypeTable"
);

/// Live range of a local variable
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocalVariable {
    pub start_pc: BytecodeIndex,
    pub length: u16,
    pub name_index: Utf8ConstantIndex,

    /// Descriptor (or signature, in a `LocalVariableTypeTable`)
    pub descriptor_index: Utf8ConstantIndex,
    pub index: u16,
}

impl Serialize for LocalVariable {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> Result<()> {
        self.start_pc.serialize(writer)?;
        self.length.serialize(writer)?;
        self.name_index.serialize(writer)?;
        self.descriptor_index.serialize(writer)?;
        self.index.serialize(writer)
    }
}

impl Decode for LocalVariable {
    fn decode<R: ReadBytesExt>(reader: &mut R) -> Result<Self> {
        Ok(LocalVariable {
            start_pc: BytecodeIndex::decode(reader)?,
            length: u16::decode(reader)?,
            name_index: Utf8ConstantIndex::decode(reader)?,
            descriptor_index: Utf8ConstantIndex::decode(reader)?,
            index: u16::decode(reader)?,
        })
    }
}

/// [0]: https://docs.oracle.com/javase/specs/jvms/se7/html/jvms-4.html#jvms-4.7.4
#[derive(Debug, PartialEq)]
pub struct StackMapTable(pub Vec<StackMapFrame>);
simple_attribute!(StackMapTable, Vec<StackMapFrame>, "StackMapTable");

/// Verification types as they appear in a class file
pub type ClassFileVerificationType = VerificationType<ClassConstantIndex, u16>;

#[derive(Debug, Clone, PartialEq)]
pub enum StackMapFrame {
    /// Frame has the same locals as the previous frame and number of stack items is zero
    /// Tags: 0-63 or 251
    SameLocalsNoStack { offset_delta: u16 },

    /// Frame has the same locals as the previous frame and number of stack items is one
    /// Tags: 64-127 or 247
    SameLocalsOneStack {
        offset_delta: u16,
        stack: ClassFileVerificationType,
    },

    /// Frame is like the previous frame, but without the last `chopped_k` locals
    ///
    /// Note: `chopped_k` must be in the range 1 to 3 inclusive
    /// Tags: 248-250
    ChopLocalsNoStack { offset_delta: u16, chopped_k: u8 },

    /// Frame is like the previous frame, but with extra locals
    /// Tags: 252-254
    AppendLocalsNoStack {
        offset_delta: u16,
        locals: Vec<ClassFileVerificationType>,
    },

    /// Frame has exactly the locals and stack specified
    /// Tag: 255
    Full {
        offset_delta: u16,
        locals: Vec<ClassFileVerificationType>,
        stack: Vec<ClassFileVerificationType>,
    },
}

impl StackMapFrame {
    pub fn offset_delta(&self) -> u16 {
        match self {
            StackMapFrame::SameLocalsNoStack { offset_delta }
            | StackMapFrame::SameLocalsOneStack { offset_delta, .. }
            | StackMapFrame::ChopLocalsNoStack { offset_delta, .. }
            | StackMapFrame::AppendLocalsNoStack { offset_delta, .. }
            | StackMapFrame::Full { offset_delta, .. } => *offset_delta,
        }
    }
}

impl Serialize for StackMapFrame {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> Result<()> {
        match self {
            // `same_frame` and `same_frame_extended`
            StackMapFrame::SameLocalsNoStack { offset_delta } => {
                if *offset_delta <= 63 {
                    (*offset_delta as u8).serialize(writer)?;
                } else {
                    251u8.serialize(writer)?;
                    offset_delta.serialize(writer)?;
                }
            }

            // `same_locals_1_stack_item_frame` and `same_locals_1_stack_item_frame_extended`
            StackMapFrame::SameLocalsOneStack {
                offset_delta,
                stack,
            } => {
                if *offset_delta <= 63 {
                    (*offset_delta as u8 + 64).serialize(writer)?;
                } else {
                    247u8.serialize(writer)?;
                    offset_delta.serialize(writer)?;
                }
                stack.serialize(writer)?;
            }

            // `chop_frame`
            StackMapFrame::ChopLocalsNoStack {
                offset_delta,
                chopped_k,
            } => {
                if !(1..=3).contains(chopped_k) {
                    let msg = format!("chop frame must chop 1-3 locals, not {}", chopped_k);
                    return Err(Error::new(ErrorKind::InvalidInput, msg));
                }
                (251 - chopped_k).serialize(writer)?;
                offset_delta.serialize(writer)?;
            }

            // `append_frame`
            StackMapFrame::AppendLocalsNoStack {
                offset_delta,
                locals,
            } => {
                let added_k = locals.len();
                if !(1..=3).contains(&added_k) {
                    let msg = format!("append frame must add 1-3 locals, not {}", added_k);
                    return Err(Error::new(ErrorKind::InvalidInput, msg));
                }
                (251 + added_k as u8).serialize(writer)?;
                offset_delta.serialize(writer)?;
                for local in locals {
                    local.serialize(writer)?;
                }
            }

            // `full_frame`
            StackMapFrame::Full {
                offset_delta,
                locals,
                stack,
            } => {
                255u8.serialize(writer)?;
                offset_delta.serialize(writer)?;
                locals.serialize(writer)?;
                stack.serialize(writer)?;
            }
        };
        Ok(())
    }
}

impl Decode for StackMapFrame {
    fn decode<R: ReadBytesExt>(reader: &mut R) -> Result<Self> {
        let frame = match u8::decode(reader)? {
            tag @ 0..=63 => StackMapFrame::SameLocalsNoStack {
                offset_delta: tag as u16,
            },
            tag @ 64..=127 => StackMapFrame::SameLocalsOneStack {
                offset_delta: (tag - 64) as u16,
                stack: VerificationType::decode(reader)?,
            },
            247 => StackMapFrame::SameLocalsOneStack {
                offset_delta: u16::decode(reader)?,
                stack: VerificationType::decode(reader)?,
            },
            tag @ 248..=250 => StackMapFrame::ChopLocalsNoStack {
                offset_delta: u16::decode(reader)?,
                chopped_k: 251 - tag,
            },
            251 => StackMapFrame::SameLocalsNoStack {
                offset_delta: u16::decode(reader)?,
            },
            tag @ 252..=254 => {
                let offset_delta = u16::decode(reader)?;
                let locals = (0..(tag - 251))
                    .map(|_| VerificationType::decode(reader))
                    .collect::<Result<Vec<_>>>()?;
                StackMapFrame::AppendLocalsNoStack {
                    offset_delta,
                    locals,
                }
            }
            255 => StackMapFrame::Full {
                offset_delta: u16::decode(reader)?,
                locals: Vec::decode(reader)?,
                stack: Vec::decode(reader)?,
            },
            tag => {
                let msg = format!("Reserved stack map frame tag {}", tag);
                return Err(Error::new(ErrorKind::InvalidData, msg));
            }
        };
        Ok(frame)
    }
}

/// Every inner class referenced in a class' constant pool must be included in the inner classes
/// attribute on the class.
///
/// [0]: https://docs.oracle.com/javase/specs/jvms/se15/html/jvms-4.html#jvms-4.7.6
#[derive(Debug, PartialEq)]
pub struct InnerClasses(pub Vec<InnerClass>);
simple_attribute!(InnerClasses, Vec<InnerClass>, "InnerClasses");

#[derive(Debug, Clone, PartialEq)]
pub struct InnerClass {
    pub inner_class: ClassConstantIndex,
    pub outer_class: ClassConstantIndex,
    pub inner_name: Utf8ConstantIndex,
    pub access_flags: InnerClassAccessFlags,
}

impl Serialize for InnerClass {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> Result<()> {
        self.inner_class.serialize(writer)?;
        self.outer_class.serialize(writer)?;
        self.inner_name.serialize(writer)?;
        self.access_flags.serialize(writer)?;
        Ok(())
    }
}

impl Decode for InnerClass {
    fn decode<R: ReadBytesExt>(reader: &mut R) -> Result<Self> {
        Ok(InnerClass {
            inner_class: ClassConstantIndex::decode(reader)?,
            outer_class: ClassConstantIndex::decode(reader)?,
            inner_name: Utf8ConstantIndex::decode(reader)?,
            access_flags: InnerClassAccessFlags::decode(reader)?,
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn round_trip(frame: StackMapFrame, expected: &[u8]) {
        let mut bytes = vec![];
        frame.serialize(&mut bytes).unwrap();
        assert_eq!(bytes, expected);
        assert_eq!(StackMapFrame::decode(&mut &bytes[..]).unwrap(), frame);
    }

    #[test]
    fn frame_tags() {
        round_trip(StackMapFrame::SameLocalsNoStack { offset_delta: 5 }, &[5]);
        round_trip(
            StackMapFrame::SameLocalsNoStack { offset_delta: 300 },
            &[251, 1, 44],
        );
        round_trip(
            StackMapFrame::SameLocalsOneStack {
                offset_delta: 2,
                stack: VerificationType::Integer,
            },
            &[66, 1],
        );
        round_trip(
            StackMapFrame::SameLocalsOneStack {
                offset_delta: 64,
                stack: VerificationType::Null,
            },
            &[247, 0, 64, 5],
        );
        round_trip(
            StackMapFrame::ChopLocalsNoStack {
                offset_delta: 1,
                chopped_k: 2,
            },
            &[249, 0, 1],
        );
        round_trip(
            StackMapFrame::AppendLocalsNoStack {
                offset_delta: 7,
                locals: vec![VerificationType::Long, VerificationType::Top],
            },
            &[253, 0, 7, 4, 0],
        );
        round_trip(
            StackMapFrame::Full {
                offset_delta: 0,
                locals: vec![VerificationType::UninitializedThis],
                stack: vec![VerificationType::Uninitialized(3)],
            },
            &[255, 0, 0, 0, 1, 6, 0, 1, 8, 0, 3],
        );
    }

    #[test]
    fn oversized_append_is_rejected() {
        let frame = StackMapFrame::AppendLocalsNoStack {
            offset_delta: 0,
            locals: vec![VerificationType::Integer; 4],
        };
        assert!(frame.serialize(&mut vec![]).is_err());
    }

    #[test]
    fn attribute_payloads() {
        let table = LineNumberTable(vec![LineNumber {
            start_pc: BytecodeIndex(4),
            line_number: 10,
        }]);
        let attr = Attribute {
            name_index: Utf8ConstantIndex(ConstantIndex(1)),
            info: {
                let mut info = vec![];
                table.serialize(&mut info).unwrap();
                info
            },
        };
        assert_eq!(attr.info, vec![0, 1, 0, 4, 0, 10]);
        assert_eq!(attr.decode_info::<LineNumberTable>().unwrap(), table);
        assert!(attr.decode_info::<SourceFile>().is_err());
    }
}
