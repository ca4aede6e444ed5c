use super::{decode_bytes, Attribute, AttributeLike, Decode, Serialize};
use crate::jvm::descriptors::RenderDescriptor;
use crate::jvm::names::Name;
use crate::jvm::{BinaryName, Error, FieldRef, MethodRef, RefType, UnqualifiedName};
use crate::util::{Offset, OffsetVec, Width};
use byteorder::{ReadBytesExt, WriteBytesExt};
use std::borrow::{Borrow, Cow};
use std::collections::HashMap;
use std::io::ErrorKind;
use std::result::Result;

/// Longest modified UTF-8 encoding a `CONSTANT_Utf8_info` can hold
pub const MAX_UTF8_LENGTH: usize = 0xFFFF;

/// Largest offset the pool can grow to (the pool count is one more than the last index)
const MAX_POOL_OFFSET: usize = 0xFFFF;

/// Class file constants pool builder
///
/// The pool is append only. Every constant is deduplicated: symbolic constants by owner, name and
/// descriptor, numeric constants by bit pattern (so `0.0` and `-0.0` get separate entries, and
/// every `NaN` payload is kept). The [`ConstantsWriter`] trait exposes inserting typed values into
/// the constants pool. One pool is used per class and [`ConstantsPool::reset`] makes it reusable.
#[derive(Debug)]
pub struct ConstantsPool {
    constants: OffsetVec<Constant>,

    classes: HashMap<RefType<BinaryName>, ClassConstantIndex>,
    fieldrefs: HashMap<MemberKey, FieldRefConstantIndex>,
    methodrefs: HashMap<(MemberKey, bool), MethodRefConstantIndex>,
    strings: HashMap<Utf8ConstantIndex, StringConstantIndex>,
    integers: HashMap<i32, ConstantIndex>,
    floats: HashMap<u32, ConstantIndex>,
    longs: HashMap<i64, ConstantIndex>,
    doubles: HashMap<u64, ConstantIndex>,
    name_and_types: HashMap<(Utf8ConstantIndex, Utf8ConstantIndex), NameAndTypeConstantIndex>,
    utf8s: HashMap<String, Utf8ConstantIndex>,
}

/// Owner, name and rendered descriptor of a member reference
///
/// Whether the reference is used statically doesn't change the constant, so it isn't part of the
/// key. Method references also key on whether the owner is an interface.
type MemberKey = (BinaryName, UnqualifiedName, String);

fn field_key(field: &FieldRef) -> MemberKey {
    (field.owner.clone(), field.name.clone(), field.descriptor.render())
}

fn method_key(method: &MethodRef) -> (MemberKey, bool) {
    let member = (method.owner.clone(), method.name.clone(), method.descriptor.render());
    (member, method.owner_is_interface)
}

/// Values which can be put into the pool directly
#[derive(Debug, Clone, PartialEq)]
pub enum PoolValue {
    Utf8(String),
    Integer(i32),
    Float(f32),
    Long(i64),
    Double(f64),
    String(String),
    Class(RefType<BinaryName>),
    Field(FieldRef),
    Method(MethodRef),
    NameAndType { name: String, descriptor: String },
}

impl Default for ConstantsPool {
    fn default() -> Self {
        ConstantsPool::new()
    }
}

impl ConstantsPool {
    /// Make a fresh empty constants pool
    pub fn new() -> ConstantsPool {
        ConstantsPool {
            constants: OffsetVec::new_starting_at(Offset(1)),
            classes: HashMap::new(),
            fieldrefs: HashMap::new(),
            methodrefs: HashMap::new(),
            strings: HashMap::new(),
            integers: HashMap::new(),
            floats: HashMap::new(),
            longs: HashMap::new(),
            doubles: HashMap::new(),
            name_and_types: HashMap::new(),
            utf8s: HashMap::new(),
        }
    }

    /// Forget every constant, so the pool can be used for the next class
    pub fn reset(&mut self) {
        *self = ConstantsPool::new();
    }

    /// Constants inserted so far, in insertion order
    pub fn constants(&self) -> &OffsetVec<Constant> {
        &self.constants
    }

    /// Take the final vector of constants, leaving the pool empty
    pub fn take_constants(&mut self) -> OffsetVec<Constant> {
        std::mem::take(self).constants
    }

    /// Every class (or element class of an object array) referenced from the pool, in the order
    /// the class constants were inserted
    pub fn referenced_classes(&self) -> Vec<BinaryName> {
        let mut classes: Vec<(u16, &BinaryName)> = self
            .classes
            .iter()
            .filter_map(|(class, idx)| match class {
                RefType::Object(cls) => Some((idx.0 .0, cls)),
                RefType::ObjectArray(arr) => Some((idx.0 .0, &arr.element_type)),
                RefType::PrimitiveArray(_) => None,
            })
            .collect();
        classes.sort_by_key(|(idx, _)| *idx);
        let mut seen = std::collections::HashSet::new();
        classes
            .into_iter()
            .filter(|(_, cls)| seen.insert(*cls))
            .map(|(_, cls)| cls.clone())
            .collect()
    }

    /// Push a constant into the constant pool, provided there is space for it
    ///
    /// Note: indexing starts at 1, and some constants take two spaces.
    fn push_constant(&mut self, constant: Constant) -> Result<ConstantIndex, Error> {
        let offset = self.constants.offset_len().0;

        if offset + constant.width() > MAX_POOL_OFFSET {
            return Err(Error::ConstantPoolOverflow { constant, offset });
        }

        self.constants.push(constant);
        Ok(ConstantIndex(offset as u16))
    }

    /// Insert a value (and everything it refers to) if it is absent, returning its index
    pub fn put(&mut self, value: &PoolValue) -> Result<ConstantIndex, Error> {
        Ok(match value {
            PoolValue::Utf8(utf8) => self.get_utf8(utf8.as_str())?.into(),
            PoolValue::Integer(integer) => LoadableConstant::Integer(*integer).constant_index(self)?,
            PoolValue::Float(float) => LoadableConstant::Float(*float).constant_index(self)?,
            PoolValue::Long(long) => LoadableConstant::Long(*long).constant_index(self)?,
            PoolValue::Double(double) => LoadableConstant::Double(*double).constant_index(self)?,
            PoolValue::String(string) => {
                LoadableConstant::String(string.clone()).constant_index(self)?
            }
            PoolValue::Class(class) => class.constant_index(self)?.into(),
            PoolValue::Field(field) => field.constant_index(self)?.into(),
            PoolValue::Method(method) => method.constant_index(self)?.into(),
            PoolValue::NameAndType { name, descriptor } => {
                let name = self.get_utf8(name.as_str())?;
                let descriptor = self.get_utf8(descriptor.as_str())?;
                self.get_name_and_type(name, descriptor)?.into()
            }
        })
    }

    /// Look up the index of a value without inserting it
    pub fn get(&self, value: &PoolValue) -> Option<ConstantIndex> {
        match value {
            PoolValue::Utf8(utf8) => self.utf8s.get(utf8.as_str()).map(|idx| idx.0),
            PoolValue::Integer(integer) => self.integers.get(integer).copied(),
            PoolValue::Float(float) => self.floats.get(&float.to_bits()).copied(),
            PoolValue::Long(long) => self.longs.get(long).copied(),
            PoolValue::Double(double) => self.doubles.get(&double.to_bits()).copied(),
            PoolValue::String(string) => {
                let utf8 = self.utf8s.get(string.as_str())?;
                self.strings.get(utf8).map(|idx| idx.0)
            }
            PoolValue::Class(class) => self.classes.get(class).map(|idx| idx.0),
            PoolValue::Field(field) => self.fieldrefs.get(&field_key(field)).map(|idx| idx.0),
            PoolValue::Method(method) => self.methodrefs.get(&method_key(method)).map(|idx| idx.0),
            PoolValue::NameAndType { name, descriptor } => {
                let name = *self.utf8s.get(name.as_str())?;
                let descriptor = *self.utf8s.get(descriptor.as_str())?;
                self.name_and_types.get(&(name, descriptor)).map(|idx| idx.0)
            }
        }
    }

    /// Get or insert a utf8 constant from the constant pool
    pub fn get_utf8<'a, S: Into<Cow<'a, str>>>(
        &mut self,
        utf8: S,
    ) -> Result<Utf8ConstantIndex, Error> {
        let cow = utf8.into();

        if let Some(idx) = self.utf8s.get::<str>(cow.borrow()) {
            Ok(*idx)
        } else {
            let length = modified_utf8_length(&cow);
            if length > MAX_UTF8_LENGTH {
                return Err(Error::StringTooLong { length });
            }
            let owned = cow.into_owned();
            let constant = Constant::Utf8(owned.clone());
            let idx = Utf8ConstantIndex(self.push_constant(constant)?);
            self.utf8s.insert(owned, idx);
            Ok(idx)
        }
    }

    /// Get or insert a class constant from the constant pool
    pub fn get_class(&mut self, class: &BinaryName) -> Result<ClassConstantIndex, Error> {
        class.constant_index(self)
    }

    /// Get or insert a string constant from the constant pool
    pub fn get_string(&mut self, utf8: Utf8ConstantIndex) -> Result<StringConstantIndex, Error> {
        if let Some(idx) = self.strings.get(&utf8) {
            Ok(*idx)
        } else {
            let constant = Constant::String(utf8);
            let idx = StringConstantIndex(self.push_constant(constant)?);
            self.strings.insert(utf8, idx);
            Ok(idx)
        }
    }

    /// Get or insert a name & type constant from the constant pool
    pub fn get_name_and_type(
        &mut self,
        name: Utf8ConstantIndex,
        descriptor: Utf8ConstantIndex,
    ) -> Result<NameAndTypeConstantIndex, Error> {
        let name_and_type_key = (name, descriptor);
        if let Some(idx) = self.name_and_types.get(&name_and_type_key) {
            Ok(*idx)
        } else {
            let constant = Constant::NameAndType { name, descriptor };
            let idx = NameAndTypeConstantIndex(self.push_constant(constant)?);
            self.name_and_types.insert(name_and_type_key, idx);
            Ok(idx)
        }
    }

    pub fn get_field_ref(&mut self, field: &FieldRef) -> Result<FieldRefConstantIndex, Error> {
        field.constant_index(self)
    }

    pub fn get_method_ref(&mut self, method: &MethodRef) -> Result<MethodRefConstantIndex, Error> {
        method.constant_index(self)
    }

    /// Get or insert a constant loadable with `ldc`, `ldc_w`, or `ldc2_w`
    pub fn get_loadable(&mut self, constant: &LoadableConstant) -> Result<ConstantIndex, Error> {
        constant.constant_index(self)
    }

    /// Add an attribute to the constant pool
    pub fn get_attribute<A: AttributeLike>(&mut self, attribute: A) -> Result<Attribute, Error> {
        let name_index = self.get_utf8(A::NAME)?;
        let mut info = vec![];

        attribute.serialize(&mut info).map_err(Error::IoError)?;

        Ok(Attribute { name_index, info })
    }
}

/// Constants as in the constant pool
///
/// Note: only constants the code generator produces are included (no method handles, method
/// types, or dynamic constants)
///
/// [0]: https://docs.oracle.com/javase/specs/jvms/se15/html/jvms-4.html#jvms-4.4
#[derive(Debug, Clone, PartialEq)]
pub enum Constant {
    /// Class or an interface
    Class(Utf8ConstantIndex),

    /// Field
    FieldRef(ClassConstantIndex, NameAndTypeConstantIndex),

    /// Method (this combines `Methodref` and `InterfaceMethodref`
    MethodRef {
        class: ClassConstantIndex,
        name_and_type: NameAndTypeConstantIndex,
        is_interface: bool,
    },

    /// Constant object of type `java.lang.String`
    String(Utf8ConstantIndex),

    /// Constant primitive of type `int`
    Integer(i32),

    /// Constant primitive of type `float`
    Float(f32),

    /// Constant primitive of type `long`
    Long(i64),

    /// Constant primitive of type `double`
    Double(f64),

    /// Name and a type (eg. for a field or a method)
    NameAndType {
        name: Utf8ConstantIndex,
        descriptor: Utf8ConstantIndex,
    },

    /// Constant UTF-8 encoded raw string value
    ///
    /// Despite the name, the encoding is not quite UTF-8 (the encoding of the
    /// null character `\u{0000}` and the encoding of supplementary characters
    /// is different).
    Utf8(String),
}

impl Serialize for Constant {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        match self {
            Constant::Utf8(string) => {
                1u8.serialize(writer)?;
                let buffer: Vec<u8> = encode_modified_utf8(string);
                (buffer.len() as u16).serialize(writer)?;
                writer.write_all(&buffer)?;
            }
            Constant::Integer(integer) => {
                3u8.serialize(writer)?;
                integer.serialize(writer)?;
            }
            Constant::Float(float) => {
                4u8.serialize(writer)?;
                float.to_bits().serialize(writer)?;
            }
            Constant::Long(long) => {
                5u8.serialize(writer)?;
                long.serialize(writer)?;
            }
            Constant::Double(double) => {
                6u8.serialize(writer)?;
                double.serialize(writer)?;
            }
            Constant::Class(name) => {
                7u8.serialize(writer)?;
                name.serialize(writer)?;
            }
            Constant::String(bytes) => {
                8u8.serialize(writer)?;
                bytes.serialize(writer)?;
            }
            Constant::FieldRef(class, name_and_type) => {
                9u8.serialize(writer)?;
                class.serialize(writer)?;
                name_and_type.serialize(writer)?;
            }
            Constant::MethodRef {
                class,
                name_and_type,
                is_interface,
            } => {
                (if !is_interface { 10u8 } else { 11u8 }).serialize(writer)?;
                class.serialize(writer)?;
                name_and_type.serialize(writer)?;
            }
            Constant::NameAndType { name, descriptor } => {
                12u8.serialize(writer)?;
                name.serialize(writer)?;
                descriptor.serialize(writer)?;
            }
        };
        Ok(())
    }
}

impl Decode for Constant {
    fn decode<R: ReadBytesExt>(reader: &mut R) -> std::io::Result<Self> {
        let constant = match u8::decode(reader)? {
            1 => {
                let len = u16::decode(reader)?;
                let bytes = decode_bytes(reader, len as usize)?;
                let string = decode_modified_utf8(&bytes).ok_or_else(|| {
                    std::io::Error::new(ErrorKind::InvalidData, "Malformed modified UTF-8")
                })?;
                Constant::Utf8(string)
            }
            3 => Constant::Integer(i32::decode(reader)?),
            4 => Constant::Float(f32::from_bits(u32::decode(reader)?)),
            5 => Constant::Long(i64::decode(reader)?),
            6 => Constant::Double(f64::decode(reader)?),
            7 => Constant::Class(Utf8ConstantIndex::decode(reader)?),
            8 => Constant::String(Utf8ConstantIndex::decode(reader)?),
            9 => Constant::FieldRef(
                ClassConstantIndex::decode(reader)?,
                NameAndTypeConstantIndex::decode(reader)?,
            ),
            tag @ (10 | 11) => Constant::MethodRef {
                class: ClassConstantIndex::decode(reader)?,
                name_and_type: NameAndTypeConstantIndex::decode(reader)?,
                is_interface: tag == 11,
            },
            12 => Constant::NameAndType {
                name: Utf8ConstantIndex::decode(reader)?,
                descriptor: Utf8ConstantIndex::decode(reader)?,
            },
            tag => {
                let msg = format!("Unsupported constant pool tag {}", tag);
                return Err(std::io::Error::new(ErrorKind::InvalidData, msg));
            }
        };
        Ok(constant)
    }
}

/// Number of bytes `encode_modified_utf8` would produce
pub fn modified_utf8_length(string: &str) -> usize {
    string
        .chars()
        .map(|c| match c as u32 {
            0 => 2,
            0x01..=0x7F => 1,
            0x80..=0x7FF => 2,
            0x800..=0xFFFF => 3,
            _ => 6,
        })
        .sum()
}

/// Modified UTF-8 format used in class files.
///
/// See [this `DataInput` section for details][0]. Quoting from that section:
///
/// > The differences between this format and the standard UTF-8 format are the following:
/// >
/// >  * The null byte `\u0000` is encoded in 2-byte format rather than 1-byte, so that the encoded
/// >    strings never have embedded nulls.
/// >  * Only the 1-byte, 2-byte, and 3-byte formats are used.
/// >  * Supplementary characters are represented in the form of surrogate pairs.
///
/// [0]: https://docs.oracle.com/en/java/javase/17/docs/api/java.base/java/io/DataInput.html#modified-utf-8
pub fn encode_modified_utf8(string: &str) -> Vec<u8> {
    let mut buffer: Vec<u8> = Vec::with_capacity(string.len());
    let mut units = [0u16; 2];
    for c in string.chars() {
        for unit in c.encode_utf16(&mut units) {
            let code = *unit as u32;
            match code {
                0x01..=0x7F => buffer.push(code as u8),
                0x00 | 0x80..=0x7FF => {
                    buffer.push((code >> 6 & 0x1F) as u8 | 0b1100_0000);
                    buffer.push((code & 0x3F) as u8 | 0b1000_0000);
                }
                _ => {
                    buffer.push((code >> 12 & 0x0F) as u8 | 0b1110_0000);
                    buffer.push((code >> 6 & 0x3F) as u8 | 0b1000_0000);
                    buffer.push((code & 0x3F) as u8 | 0b1000_0000);
                }
            }
        }
    }
    buffer
}

/// Inverse of `encode_modified_utf8`, or `None` if the bytes aren't well-formed
pub fn decode_modified_utf8(bytes: &[u8]) -> Option<String> {
    let mut units: Vec<u16> = Vec::with_capacity(bytes.len());
    let mut iter = bytes.iter().copied();
    while let Some(b0) = iter.next() {
        let unit = match b0 {
            0x01..=0x7F => b0 as u16,
            0xC0..=0xDF => {
                let b1 = iter.next()?;
                ((b0 as u16 & 0x1F) << 6) | (b1 as u16 & 0x3F)
            }
            0xE0..=0xEF => {
                let b1 = iter.next()?;
                let b2 = iter.next()?;
                ((b0 as u16 & 0x0F) << 12) | ((b1 as u16 & 0x3F) << 6) | (b2 as u16 & 0x3F)
            }
            _ => return None,
        };
        units.push(unit);
    }
    String::from_utf16(&units).ok()
}

#[cfg(test)]
mod encode_modified_utf8_tests {
    use super::*;

    #[test]
    fn containing_null_byte() {
        assert_eq!(encode_modified_utf8("a\x00a"), vec![97, 192, 128, 97]);
    }

    #[test]
    fn two_and_three_byte_encodings() {
        assert_eq!(encode_modified_utf8("ĄǍ"), vec![196, 132, 199, 141]);
        assert_eq!(encode_modified_utf8("ऄ"), vec![224, 164, 132]);
    }

    #[test]
    fn supplementary_characters() {
        assert_eq!(
            encode_modified_utf8("\u{10000}\u{10FFFF}"),
            vec![237, 160, 128, 237, 176, 128, 237, 175, 191, 237, 191, 191]
        );
    }

    #[test]
    fn length_matches_encoding() {
        for s in ["", "foo", "a\x00a", "ĄǍǞ", "ऄअॲ", "\u{10000}x\u{dffff}"] {
            assert_eq!(modified_utf8_length(s), encode_modified_utf8(s).len());
            assert_eq!(decode_modified_utf8(&encode_modified_utf8(s)).as_deref(), Some(s));
        }
    }
}

/// Almost all constants have width 1, except for `Constant::Long` and `Constant::Double`. Quoting
/// the JVM specification:
///
/// > All 8-byte constants take up two entries in the constant_pool table of the class file. If a
/// > CONSTANT_Long_info or CONSTANT_Double_info structure is the item in the constant_pool table
/// > at index n, then the next usable item in the pool is located at index n+2. The constant_pool
/// > index n+1 must be valid but is considered unusable.
impl Width for Constant {
    fn width(&self) -> usize {
        match self {
            Constant::Long(_) | Constant::Double(_) => 2,
            _ => 1,
        }
    }
}

#[derive(Copy, Clone, Hash, Eq, PartialEq, Ord, PartialOrd, Debug)]
pub struct ConstantIndex(pub u16);

impl Serialize for ConstantIndex {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        self.0.serialize(writer)
    }
}

impl Decode for ConstantIndex {
    fn decode<R: ReadBytesExt>(reader: &mut R) -> std::io::Result<Self> {
        u16::decode(reader).map(ConstantIndex)
    }
}

/// Typed wrappers around `ConstantIndex`, one per kind of constant they point to
macro_rules! typed_index {
    ($($index:ident),*) => {
        $(
            #[derive(Copy, Clone, Hash, Eq, PartialEq, Debug)]
            pub struct $index(pub ConstantIndex);

            impl From<$index> for ConstantIndex {
                fn from(index: $index) -> ConstantIndex {
                    index.0
                }
            }

            impl Serialize for $index {
                fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
                    self.0.serialize(writer)
                }
            }

            impl Decode for $index {
                fn decode<R: ReadBytesExt>(reader: &mut R) -> std::io::Result<Self> {
                    ConstantIndex::decode(reader).map($index)
                }
            }
        )*
    };
}

typed_index!(
    Utf8ConstantIndex,
    StringConstantIndex,
    NameAndTypeConstantIndex,
    ClassConstantIndex,
    FieldRefConstantIndex,
    MethodRefConstantIndex
);

/// Constants which can be pushed onto the stack with `ldc`, `ldc_w`, or `ldc2_w`
#[derive(Debug, Clone, PartialEq)]
pub enum LoadableConstant {
    Integer(i32),
    Float(f32),
    Long(i64),
    Double(f64),
    String(String),
    Class(RefType<BinaryName>),
}

impl LoadableConstant {
    /// Long and double constants need `ldc2_w`
    pub fn is_wide(&self) -> bool {
        matches!(self, LoadableConstant::Long(_) | LoadableConstant::Double(_))
    }
}

pub trait ConstantsWriter<Index = ConstantIndex> {
    /// Get or insert a constant into the constant pool and return the associated index
    fn constant_index(&self, constants_pool: &mut ConstantsPool) -> Result<Index, Error>;
}

/// When making a `CONSTANT_Class_info`, reference types are almost always objects. However,
/// there are a handful of places where an array type needs to be fit in (eg. for a `checkcast`
/// to an array type). See [this section of the JVM specification][0] for more.
///
/// [0]: https://docs.oracle.com/javase/specs/jvms/se17/html/jvms-4.html#jvms-4.4.1
impl ConstantsWriter<ClassConstantIndex> for RefType<BinaryName> {
    fn constant_index(&self, constants: &mut ConstantsPool) -> Result<ClassConstantIndex, Error> {
        if let Some(idx) = constants.classes.get(self) {
            Ok(*idx)
        } else {
            let name = match self {
                RefType::Object(class) => constants.get_utf8(class.as_str())?,
                other => constants.get_utf8(other.render())?,
            };
            let constant = Constant::Class(name);
            let idx = ClassConstantIndex(constants.push_constant(constant)?);
            constants.classes.insert(self.clone(), idx);
            Ok(idx)
        }
    }
}

/// Write a `CONSTANT_Class_info`
impl ConstantsWriter<ClassConstantIndex> for BinaryName {
    fn constant_index(&self, constants: &mut ConstantsPool) -> Result<ClassConstantIndex, Error> {
        RefType::Object(self.clone()).constant_index(constants)
    }
}

/// Write a `CONSTANT_Methodref_info` or `CONSTANT_InterfaceMethodref_info`
impl ConstantsWriter<MethodRefConstantIndex> for MethodRef {
    fn constant_index(
        &self,
        constants: &mut ConstantsPool,
    ) -> Result<MethodRefConstantIndex, Error> {
        let key = method_key(self);
        if let Some(idx) = constants.methodrefs.get(&key) {
            Ok(*idx)
        } else {
            let class_idx = self.owner.constant_index(constants)?;
            let method_utf8 = constants.get_utf8(self.name.as_str())?;
            let desc_utf8 = constants.get_utf8(self.descriptor.render())?;
            let name_and_type_idx = constants.get_name_and_type(method_utf8, desc_utf8)?;
            let constant = Constant::MethodRef {
                class: class_idx,
                name_and_type: name_and_type_idx,
                is_interface: self.owner_is_interface,
            };
            let idx = MethodRefConstantIndex(constants.push_constant(constant)?);
            constants.methodrefs.insert(key, idx);
            Ok(idx)
        }
    }
}

/// Write a `CONSTANT_Fieldref_info`
impl ConstantsWriter<FieldRefConstantIndex> for FieldRef {
    fn constant_index(
        &self,
        constants: &mut ConstantsPool,
    ) -> Result<FieldRefConstantIndex, Error> {
        let key = field_key(self);
        if let Some(idx) = constants.fieldrefs.get(&key) {
            Ok(*idx)
        } else {
            let class_idx = self.owner.constant_index(constants)?;
            let field_utf8 = constants.get_utf8(self.name.as_str())?;
            let desc_utf8 = constants.get_utf8(self.descriptor.render())?;
            let name_and_type_idx = constants.get_name_and_type(field_utf8, desc_utf8)?;
            let constant = Constant::FieldRef(class_idx, name_and_type_idx);
            let idx = FieldRefConstantIndex(constants.push_constant(constant)?);
            constants.fieldrefs.insert(key, idx);
            Ok(idx)
        }
    }
}

/// Write a constant which can be loaded up using `ldc` or `ldc2_w`
impl ConstantsWriter<ConstantIndex> for LoadableConstant {
    fn constant_index(&self, constants: &mut ConstantsPool) -> Result<ConstantIndex, Error> {
        match self {
            LoadableConstant::String(string) => {
                let str_utf8 = constants.get_utf8(string.as_str())?;
                let str_idx = constants.get_string(str_utf8)?;
                Ok(str_idx.into())
            }
            LoadableConstant::Class(class) => Ok(class.constant_index(constants)?.into()),
            LoadableConstant::Integer(integer) => {
                if let Some(idx) = constants.integers.get(integer) {
                    Ok(*idx)
                } else {
                    let idx = constants.push_constant(Constant::Integer(*integer))?;
                    constants.integers.insert(*integer, idx);
                    Ok(idx)
                }
            }
            LoadableConstant::Long(long) => {
                if let Some(idx) = constants.longs.get(long) {
                    Ok(*idx)
                } else {
                    let idx = constants.push_constant(Constant::Long(*long))?;
                    constants.longs.insert(*long, idx);
                    Ok(idx)
                }
            }
            LoadableConstant::Float(float) => {
                let bits = float.to_bits();
                if let Some(idx) = constants.floats.get(&bits) {
                    Ok(*idx)
                } else {
                    let idx = constants.push_constant(Constant::Float(*float))?;
                    constants.floats.insert(bits, idx);
                    Ok(idx)
                }
            }
            LoadableConstant::Double(double) => {
                let bits = double.to_bits();
                if let Some(idx) = constants.doubles.get(&bits) {
                    Ok(*idx)
                } else {
                    let idx = constants.push_constant(Constant::Double(*double))?;
                    constants.doubles.insert(bits, idx);
                    Ok(idx)
                }
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::jvm::{FieldType, MethodDescriptor, UnqualifiedName};

    fn field() -> FieldRef {
        FieldRef::new(
            BinaryName::from_string(String::from("me/Point")).unwrap(),
            UnqualifiedName::from_string(String::from("x")).unwrap(),
            FieldType::int(),
            false,
        )
    }

    #[test]
    fn symbolic_entries_insert_their_parts() {
        let mut pool = ConstantsPool::new();
        let idx = pool.put(&PoolValue::Field(field())).unwrap();

        // utf8 "me/Point", class, utf8 "x", utf8 "I", name and type, field ref
        assert_eq!(idx, ConstantIndex(6));
        assert_eq!(pool.constants().len(), 6);
        assert_eq!(pool.get(&PoolValue::Field(field())), Some(idx));
        assert_eq!(
            pool.get(&PoolValue::Utf8(String::from("me/Point"))),
            Some(ConstantIndex(1))
        );
        assert_eq!(
            pool.get(&PoolValue::NameAndType {
                name: String::from("x"),
                descriptor: String::from("I")
            }),
            Some(ConstantIndex(5))
        );

        // Inserting again is a no-op
        assert_eq!(pool.put(&PoolValue::Field(field())).unwrap(), idx);
        assert_eq!(pool.constants().len(), 6);
    }

    #[test]
    fn call_site_flags_share_member_entries() {
        let mut pool = ConstantsPool::new();
        let instance = pool.put(&PoolValue::Field(field())).unwrap();
        let static_field = FieldRef {
            is_static: true,
            ..field()
        };
        assert_eq!(pool.put(&PoolValue::Field(static_field)).unwrap(), instance);

        let method = MethodRef {
            owner: BinaryName::from_string(String::from("me/Point")).unwrap(),
            name: UnqualifiedName::from_string(String::from("norm")).unwrap(),
            descriptor: MethodDescriptor {
                parameters: vec![],
                return_type: None,
            },
            is_static: false,
            owner_is_interface: false,
            is_private: false,
        };
        let virtual_call = pool.put(&PoolValue::Method(method.clone())).unwrap();
        let private_call = MethodRef {
            is_private: true,
            ..method.clone()
        };
        let static_call = MethodRef {
            is_static: true,
            ..method.clone()
        };
        let len = pool.constants().len();
        assert_eq!(pool.put(&PoolValue::Method(private_call)).unwrap(), virtual_call);
        assert_eq!(pool.put(&PoolValue::Method(static_call)).unwrap(), virtual_call);
        assert_eq!(pool.constants().len(), len);

        // An interface method is a different kind of constant
        let interface_call = MethodRef {
            owner_is_interface: true,
            ..method
        };
        assert_ne!(pool.put(&PoolValue::Method(interface_call)).unwrap(), virtual_call);
        assert_eq!(pool.constants().len(), len + 1);
    }

    #[test]
    fn wide_constants_take_two_slots() {
        let mut pool = ConstantsPool::new();
        assert_eq!(pool.put(&PoolValue::Long(7)).unwrap(), ConstantIndex(1));
        assert_eq!(pool.put(&PoolValue::Double(7.0)).unwrap(), ConstantIndex(3));
        assert_eq!(pool.put(&PoolValue::Integer(7)).unwrap(), ConstantIndex(5));
        assert_eq!(pool.constants().offset_len(), Offset(6));
    }

    #[test]
    fn floats_compare_by_bits() {
        let mut pool = ConstantsPool::new();
        let pos = pool.put(&PoolValue::Float(0.0)).unwrap();
        let neg = pool.put(&PoolValue::Float(-0.0)).unwrap();
        let nan1 = pool.put(&PoolValue::Double(f64::NAN)).unwrap();
        let nan2 = pool.put(&PoolValue::Double(f64::NAN)).unwrap();
        assert_ne!(pos, neg);
        assert_eq!(nan1, nan2);
    }

    #[test]
    fn strings_share_utf8_entries() {
        let mut pool = ConstantsPool::new();
        let utf8 = pool.put(&PoolValue::Utf8(String::from("hi"))).unwrap();
        let string = pool.put(&PoolValue::String(String::from("hi"))).unwrap();
        assert_eq!(utf8, ConstantIndex(1));
        assert_eq!(string, ConstantIndex(2));
        assert_eq!(pool.constants().len(), 2);
    }

    #[test]
    fn reset_forgets_everything() {
        let mut pool = ConstantsPool::new();
        pool.put(&PoolValue::Integer(1)).unwrap();
        pool.reset();
        assert_eq!(pool.get(&PoolValue::Integer(1)), None);
        assert_eq!(pool.put(&PoolValue::Integer(2)).unwrap(), ConstantIndex(1));
    }

    #[test]
    fn overflowing_the_pool() {
        let mut pool = ConstantsPool::new();
        for i in 0..(MAX_POOL_OFFSET - 3) {
            pool.put(&PoolValue::Integer(i as i32)).unwrap();
        }

        // Offset 65533 is next: a long takes 65533 and 65534, filling the pool
        assert!(pool.put(&PoolValue::Long(0)).is_ok());
        match pool.put(&PoolValue::Integer(-1)) {
            Err(Error::ConstantPoolOverflow { offset, .. }) => assert_eq!(offset, MAX_POOL_OFFSET),
            other => panic!("expected an overflow, got {:?}", other),
        }
    }

    #[test]
    fn overlong_strings() {
        let mut pool = ConstantsPool::new();
        let long = "\u{0800}".repeat(MAX_UTF8_LENGTH / 3 + 1);
        assert!(matches!(
            pool.put(&PoolValue::String(long)),
            Err(Error::StringTooLong { length }) if length == 3 * (MAX_UTF8_LENGTH / 3 + 1)
        ));
        assert!(pool.constants().is_empty());
    }
}
