use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use std::io::Result;

/// Utility trait for serializing data inside class files
///
/// Java class files have some peculiarities that make it useful to define an extra trait (instead
/// of just using `serde`):
///
///   - tags are always `u8`
///   - when serializing a sequence, the length of the sequence is usually `u16`
///
pub trait Serialize: Sized {
    /// Serialize construct into a binary output stream
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> Result<()>;
}

/// Inverse of [`Serialize`], for reading class files back in
///
/// Only the structure is decoded: constant pool indices stay indices.
pub trait Decode: Sized {
    fn decode<R: ReadBytesExt>(reader: &mut R) -> Result<Self>;
}

macro_rules! big_endian {
    ($typ:ty, $write:ident, $read:ident) => {
        impl Serialize for $typ {
            fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> Result<()> {
                writer.$write::<BigEndian>(*self)
            }
        }

        impl Decode for $typ {
            fn decode<R: ReadBytesExt>(reader: &mut R) -> Result<Self> {
                reader.$read::<BigEndian>()
            }
        }
    };
}

big_endian!(u16, write_u16, read_u16);
big_endian!(u32, write_u32, read_u32);
big_endian!(i16, write_i16, read_i16);
big_endian!(i32, write_i32, read_i32);
big_endian!(i64, write_i64, read_i64);
big_endian!(f32, write_f32, read_f32);
big_endian!(f64, write_f64, read_f64);

impl Serialize for u8 {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> Result<()> {
        writer.write_u8(*self)
    }
}

impl Decode for u8 {
    fn decode<R: ReadBytesExt>(reader: &mut R) -> Result<Self> {
        reader.read_u8()
    }
}

/// Size in `u16` is the first thing serialized/deserialized
impl<A: Serialize> Serialize for Vec<A> {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> Result<()> {
        (self.len() as u16).serialize(writer)?;
        for elem in self {
            elem.serialize(writer)?;
        }
        Ok(())
    }
}

impl<A: Decode> Decode for Vec<A> {
    fn decode<R: ReadBytesExt>(reader: &mut R) -> Result<Self> {
        let len = u16::decode(reader)?;
        (0..len).map(|_| A::decode(reader)).collect()
    }
}

/// Read exactly `len` raw bytes
pub fn decode_bytes<R: ReadBytesExt>(reader: &mut R, len: usize) -> Result<Vec<u8>> {
    let mut bytes = vec![0; len];
    reader.read_exact(&mut bytes)?;
    Ok(bytes)
}
