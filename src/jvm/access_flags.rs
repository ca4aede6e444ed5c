use super::class_file::{Decode, Serialize};
use bitflags::bitflags;
use byteorder::{ReadBytesExt, WriteBytesExt};
use std::io::Result;

bitflags! {
    /// Access flags on classes
    ///
    /// [0]: https://docs.oracle.com/javase/specs/jvms/se15/html/jvms-4.html#jvms-4.1-200-E.1
    pub struct ClassAccessFlags: u16 {
        const PUBLIC = 0x0001;
        const FINAL = 0x0010;
        const SUPER = 0x0020;
        const INTERFACE = 0x0200;
        const ABSTRACT = 0x0400;
        const SYNTHETIC = 0x1000;
        const ANNOTATION = 0x2000;
        const ENUM = 0x4000;
        const MODULE = 0x8000;
    }
}

bitflags! {
    /// Access flags on methods
    ///
    /// [0]: https://docs.oracle.com/javase/specs/jvms/se15/html/jvms-4.html#jvms-4.6-200-A.1
    pub struct MethodAccessFlags: u16 {
        const PUBLIC = 0x0001;
        const PRIVATE = 0x0002;
        const PROTECTED = 0x0004;
        const STATIC = 0x0008;
        const FINAL = 0x0010;
        const SYNCHRONIZED = 0x0020;
        const BRIDGE = 0x0040;
        const VARARGS = 0x0080;
        const NATIVE = 0x0100;
        const ABSTRACT = 0x0400;
        const STRICT = 0x0800;
        const SYNTHETIC = 0x1000;
    }
}

bitflags! {
    /// Access flags on fields
    ///
    /// [0]: https://docs.oracle.com/javase/specs/jvms/se15/html/jvms-4.html#jvms-4.5-200-A.1
    pub struct FieldAccessFlags: u16 {
        const PUBLIC = 0x0001;
        const PRIVATE = 0x0002;
        const PROTECTED = 0x0004;
        const STATIC = 0x0008;
        const FINAL = 0x0010;
        const VOLATILE = 0x0040;
        const TRANSIENT = 0x0080;
        const SYNTHETIC = 0x1000;
        const ENUM = 0x4000;
    }
}

bitflags! {
    /// Access flags on inner classes
    ///
    /// [0]: https://docs.oracle.com/javase/specs/jvms/se15/html/jvms-4.html#jvms-4.7.6-300-D.1-D.1
    pub struct InnerClassAccessFlags: u16 {
        const PUBLIC = 0x0001;
        const PRIVATE = 0x0002;
        const PROTECTED = 0x0004;
        const STATIC = 0x0008;
        const FINAL = 0x0010;
        const INTERFACE = 0x0200;
        const ABSTRACT = 0x0400;
        const SYNTHETIC = 0x1000;
        const ANNOTATION = 0x2000;
        const ENUM = 0x4000;
    }
}

macro_rules! binary_flags {
    ($flags:ident) => {
        impl Serialize for $flags {
            fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> Result<()> {
                self.bits().serialize(writer)
            }
        }

        /// Unknown bits are dropped
        impl Decode for $flags {
            fn decode<R: ReadBytesExt>(reader: &mut R) -> Result<Self> {
                u16::decode(reader).map($flags::from_bits_truncate)
            }
        }

        /// The input tree spells flags as their raw `u16` value
        impl serde::Serialize for $flags {
            fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
                serializer.serialize_u16(self.bits())
            }
        }

        impl<'de> serde::Deserialize<'de> for $flags {
            fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
                let bits = <u16 as serde::Deserialize>::deserialize(deserializer)?;
                $flags::from_bits(bits).ok_or_else(|| {
                    serde::de::Error::custom(format!("invalid {} 0x{:04x}", stringify!($flags), bits))
                })
            }
        }
    };
}

binary_flags!(ClassAccessFlags);
binary_flags!(MethodAccessFlags);
binary_flags!(FieldAccessFlags);
binary_flags!(InnerClassAccessFlags);

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn flags_are_big_endian() {
        let mut bytes = vec![];
        let flags = MethodAccessFlags::PUBLIC | MethodAccessFlags::STATIC | MethodAccessFlags::SYNTHETIC;
        flags.serialize(&mut bytes).unwrap();
        assert_eq!(bytes, vec![0x10, 0x09]);
        assert_eq!(MethodAccessFlags::decode(&mut &bytes[..]).unwrap(), flags);
    }

    #[test]
    fn flags_from_json() {
        let flags: ClassAccessFlags = serde_json::from_str("33").unwrap();
        assert_eq!(flags, ClassAccessFlags::PUBLIC | ClassAccessFlags::SUPER);
        assert!(serde_json::from_str::<FieldAccessFlags>("32768").is_err());
    }
}
