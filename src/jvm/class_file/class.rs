use super::{
    Attribute, ClassConstantIndex, Constant, ConstantIndex, Decode, Field, Method, Serialize,
    Utf8ConstantIndex, Version,
};
use crate::jvm::{ClassAccessFlags, Error};
use crate::util::{Offset, OffsetVec};
use byteorder::{ReadBytesExt, WriteBytesExt};
use std::fs;
use std::path::Path;

/// Representation of the [`class` file format of the JVM][0]
///
/// [0]: https://docs.oracle.com/javase/specs/jvms/se15/html/jvms-4.html
#[derive(Debug, PartialEq)]
pub struct ClassFile {
    pub version: Version,
    pub constants: OffsetVec<Constant>,
    pub access_flags: ClassAccessFlags,
    pub this_class: ClassConstantIndex,
    pub super_class: Option<ClassConstantIndex>,
    pub interfaces: Vec<ClassConstantIndex>,
    pub fields: Vec<Field>,
    pub methods: Vec<Method>,
    pub attributes: Vec<Attribute>,
}

impl ClassFile {
    /// Magic header bytes that go at the front of the serialized class file
    const MAGIC: [u8; 4] = [0xCA, 0xFE, 0xBA, 0xBE];

    /// Save the class file to disk
    ///
    /// The class is serialized in memory first. If writing fails, whatever part of the file was
    /// written gets removed.
    pub fn save_to_path<P: AsRef<Path>>(
        &self,
        path: P,
        create_missing_directories: bool,
    ) -> std::io::Result<()> {
        let path = path.as_ref();
        if create_missing_directories {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
        }
        let mut bytes = vec![];
        self.serialize(&mut bytes)?;
        if let Err(err) = fs::write(path, &bytes) {
            let _ = fs::remove_file(path);
            return Err(err);
        }
        Ok(())
    }

    /// Read a class file back from its bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<ClassFile, Error> {
        let mut reader = bytes;
        let class_file = ClassFile::decode(&mut reader)
            .map_err(|err| Error::MalformedClassFile(err.to_string()))?;
        if !reader.is_empty() {
            let msg = format!("{} trailing bytes after the class", reader.len());
            return Err(Error::MalformedClassFile(msg));
        }
        Ok(class_file)
    }

    /// Look up a constant by its index
    pub fn constant(&self, index: impl Into<ConstantIndex>) -> Option<&Constant> {
        let index: ConstantIndex = index.into();
        self.constants.get_offset(Offset(index.0 as usize)).ok()
    }

    /// Look up a UTF-8 constant by its index
    pub fn utf8(&self, index: Utf8ConstantIndex) -> Option<&str> {
        match self.constant(index)? {
            Constant::Utf8(string) => Some(string),
            _ => None,
        }
    }

    /// Name of a class constant
    pub fn class_name(&self, index: ClassConstantIndex) -> Option<&str> {
        match self.constant(index)? {
            Constant::Class(name) => self.utf8(*name),
            _ => None,
        }
    }

    /// Find the (first) attribute with the given name
    pub fn attribute<'a>(&self, attributes: &'a [Attribute], name: &str) -> Option<&'a Attribute> {
        attributes
            .iter()
            .find(|attr| self.utf8(attr.name_index) == Some(name))
    }

    /// Find the method with the given name (and descriptor, if there could be overloads)
    pub fn method(&self, name: &str, descriptor: Option<&str>) -> Option<&Method> {
        self.methods.iter().find(|method| {
            self.utf8(method.name_index) == Some(name)
                && descriptor.map_or(true, |desc| self.utf8(method.descriptor_index) == Some(desc))
        })
    }
}

/// The constant pool count is one more than the largest index
impl Serialize for OffsetVec<Constant> {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        (self.offset_len().0 as u16).serialize(writer)?;
        for (_, _, constant) in self {
            constant.serialize(writer)?;
        }
        Ok(())
    }
}

impl Decode for OffsetVec<Constant> {
    fn decode<R: ReadBytesExt>(reader: &mut R) -> std::io::Result<Self> {
        let count = u16::decode(reader)? as usize;
        let mut constants = OffsetVec::new_starting_at(Offset(1));
        while constants.offset_len().0 < count {
            constants.push(Constant::decode(reader)?);
        }
        Ok(constants)
    }
}

impl Serialize for ClassFile {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        writer.write_all(&ClassFile::MAGIC)?;
        self.version.serialize(writer)?;
        self.constants.serialize(writer)?;
        self.access_flags.serialize(writer)?;
        self.this_class.serialize(writer)?;
        match self.super_class {
            Some(super_class) => super_class.serialize(writer)?,
            None => 0u16.serialize(writer)?,
        }
        self.interfaces.serialize(writer)?;
        self.fields.serialize(writer)?;
        self.methods.serialize(writer)?;
        self.attributes.serialize(writer)?;
        Ok(())
    }
}

impl Decode for ClassFile {
    fn decode<R: ReadBytesExt>(reader: &mut R) -> std::io::Result<Self> {
        let mut magic = [0u8; 4];
        reader.read_exact(&mut magic)?;
        if magic != ClassFile::MAGIC {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                "Missing 0xCAFEBABE header",
            ));
        }
        let version = Version::decode(reader)?;
        let constants = OffsetVec::decode(reader)?;
        let access_flags = ClassAccessFlags::decode(reader)?;
        let this_class = ClassConstantIndex::decode(reader)?;
        let super_class = match ConstantIndex::decode(reader)? {
            ConstantIndex(0) => None,
            index => Some(ClassConstantIndex(index)),
        };
        Ok(ClassFile {
            version,
            constants,
            access_flags,
            this_class,
            super_class,
            interfaces: Vec::decode(reader)?,
            fields: Vec::decode(reader)?,
            methods: Vec::decode(reader)?,
            attributes: Vec::decode(reader)?,
        })
    }
}
