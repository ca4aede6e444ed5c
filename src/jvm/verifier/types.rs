use crate::jvm::class_file::{ClassConstantIndex, Decode, Serialize};
use crate::jvm::{BaseType, FieldType, RefType};
use crate::util::Width;
use byteorder::{ReadBytesExt, WriteBytesExt};
use std::io::{Error, ErrorKind, Result};

/// These types are from [this hierarchy][0]
///
/// [0]: https://docs.oracle.com/javase/specs/jvms/se7/html/jvms-4.html#jvms-4.10.1.2
#[derive(Debug, Clone, Hash, Eq, PartialEq)]
pub enum VerificationType<Cls, U> {
    /// Unusable local (never written, or written with incompatible types on different paths)
    Top,

    Integer,
    Float,
    Double,
    Long,
    Null,

    /// In the constructor, the `this` parameter starts with this type then turns into an object
    /// type after `<init>` is called
    UninitializedThis,

    /// Object type
    Object(Cls),

    /// State of an object after `new` has been called but `<init>` has not been called
    ///
    ///   - while generating code, `U` tracks the offset of the `new` instruction along with the
    ///     class being constructed (so `<init>` knows what the initialized type is)
    ///   - when serializing into a classfile, we use `u16` for `U`, corresponding to the offset of
    ///     the `new` instruction from the start of the method body
    Uninitialized(U),

    /// Return address pushed by `jsr`
    ///
    /// This never appears in a stack map frame: subroutines are only used for class versions
    /// without stack map tables.
    ReturnAddress,
}

impl<Cls, U> VerificationType<Cls, U> {
    /// Is this type is a reference type?
    pub fn is_reference(&self) -> bool {
        match self {
            VerificationType::Top
            | VerificationType::Integer
            | VerificationType::Float
            | VerificationType::Double
            | VerificationType::Long
            | VerificationType::ReturnAddress => false,

            VerificationType::Null
            | VerificationType::UninitializedThis
            | VerificationType::Object(_)
            | VerificationType::Uninitialized(_) => true,
        }
    }

    pub fn map<C2, U2>(
        &self,
        map_class: impl FnOnce(&Cls) -> C2,
        map_uninitialized: impl FnOnce(&U) -> U2,
    ) -> VerificationType<C2, U2> {
        match self {
            VerificationType::Top => VerificationType::Top,
            VerificationType::Integer => VerificationType::Integer,
            VerificationType::Float => VerificationType::Float,
            VerificationType::Long => VerificationType::Long,
            VerificationType::Double => VerificationType::Double,
            VerificationType::Null => VerificationType::Null,
            VerificationType::UninitializedThis => VerificationType::UninitializedThis,
            VerificationType::ReturnAddress => VerificationType::ReturnAddress,
            VerificationType::Object(cls) => VerificationType::Object(map_class(cls)),
            VerificationType::Uninitialized(uninit) => {
                VerificationType::Uninitialized(map_uninitialized(uninit))
            }
        }
    }

    /// Fallible version of [`VerificationType::map`]
    pub fn try_map<C2, U2, E>(
        &self,
        map_class: impl FnOnce(&Cls) -> std::result::Result<C2, E>,
        map_uninitialized: impl FnOnce(&U) -> std::result::Result<U2, E>,
    ) -> std::result::Result<VerificationType<C2, U2>, E> {
        Ok(match self {
            VerificationType::Object(cls) => VerificationType::Object(map_class(cls)?),
            VerificationType::Uninitialized(uninit) => {
                VerificationType::Uninitialized(map_uninitialized(uninit)?)
            }
            VerificationType::Top => VerificationType::Top,
            VerificationType::Integer => VerificationType::Integer,
            VerificationType::Float => VerificationType::Float,
            VerificationType::Long => VerificationType::Long,
            VerificationType::Double => VerificationType::Double,
            VerificationType::Null => VerificationType::Null,
            VerificationType::UninitializedThis => VerificationType::UninitializedThis,
            VerificationType::ReturnAddress => VerificationType::ReturnAddress,
        })
    }
}

impl<C, U> From<FieldType<C>> for VerificationType<RefType<C>, U> {
    fn from(field_type: FieldType<C>) -> Self {
        match field_type {
            FieldType::Base(BaseType::Int)
            | FieldType::Base(BaseType::Char)
            | FieldType::Base(BaseType::Short)
            | FieldType::Base(BaseType::Byte)
            | FieldType::Base(BaseType::Boolean) => VerificationType::Integer,
            FieldType::Base(BaseType::Float) => VerificationType::Float,
            FieldType::Base(BaseType::Long) => VerificationType::Long,
            FieldType::Base(BaseType::Double) => VerificationType::Double,
            FieldType::Ref(ref_type) => VerificationType::Object(ref_type),
        }
    }
}

impl Serialize for VerificationType<ClassConstantIndex, u16> {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> Result<()> {
        match self {
            VerificationType::Top => 0u8.serialize(writer)?,
            VerificationType::Integer => 1u8.serialize(writer)?,
            VerificationType::Float => 2u8.serialize(writer)?,
            VerificationType::Double => 3u8.serialize(writer)?,
            VerificationType::Long => 4u8.serialize(writer)?,
            VerificationType::Null => 5u8.serialize(writer)?,
            VerificationType::UninitializedThis => 6u8.serialize(writer)?,
            VerificationType::Object(cls) => {
                7u8.serialize(writer)?;
                cls.serialize(writer)?;
            }
            VerificationType::Uninitialized(off) => {
                8u8.serialize(writer)?;
                off.serialize(writer)?;
            }
            VerificationType::ReturnAddress => {
                let msg = "return addresses cannot appear in a stack map frame";
                return Err(Error::new(ErrorKind::InvalidInput, msg));
            }
        };
        Ok(())
    }
}

impl Decode for VerificationType<ClassConstantIndex, u16> {
    fn decode<R: ReadBytesExt>(reader: &mut R) -> Result<Self> {
        Ok(match u8::decode(reader)? {
            0 => VerificationType::Top,
            1 => VerificationType::Integer,
            2 => VerificationType::Float,
            3 => VerificationType::Double,
            4 => VerificationType::Long,
            5 => VerificationType::Null,
            6 => VerificationType::UninitializedThis,
            7 => VerificationType::Object(ClassConstantIndex::decode(reader)?),
            8 => VerificationType::Uninitialized(u16::decode(reader)?),
            tag => {
                let msg = format!("Unknown verification type tag {}", tag);
                return Err(Error::new(ErrorKind::InvalidData, msg));
            }
        })
    }
}

impl<Cls, A> Width for VerificationType<Cls, A> {
    fn width(&self) -> usize {
        match self {
            VerificationType::Double | VerificationType::Long => 2,
            _ => 1,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::jvm::class_file::ConstantIndex;
    use crate::jvm::BinaryName;

    type SerialType = VerificationType<ClassConstantIndex, u16>;

    #[test]
    fn from_field_types() {
        let int: VerificationType<RefType<BinaryName>, ()> = FieldType::boolean().into();
        assert_eq!(int, VerificationType::Integer);
        let obj: VerificationType<RefType<BinaryName>, ()> =
            FieldType::object(BinaryName::STRING).into();
        assert_eq!(obj, VerificationType::Object(RefType::Object(BinaryName::STRING)));
        assert_eq!(VerificationType::<(), ()>::Long.width(), 2);
        assert!(obj.is_reference());
    }

    #[test]
    fn tags() {
        let types: Vec<SerialType> = vec![
            VerificationType::Top,
            VerificationType::Object(ClassConstantIndex(ConstantIndex(258))),
            VerificationType::Uninitialized(9),
        ];
        let mut bytes = vec![];
        for typ in &types {
            typ.serialize(&mut bytes).unwrap();
        }
        assert_eq!(bytes, vec![0, 7, 1, 2, 8, 0, 9]);

        let mut reader = &bytes[..];
        for typ in &types {
            assert_eq!(&SerialType::decode(&mut reader).unwrap(), typ);
        }
        assert!(SerialType::decode(&mut &[9u8][..]).is_err());
        assert!(SerialType::ReturnAddress.serialize(&mut vec![]).is_err());
    }
}
