use super::{Decode, Serialize};
use byteorder::{ReadBytesExt, WriteBytesExt};
use std::io::Result;

/// Version of the class file, which is used to verify that the JVM has the
/// necessary features to interpret the class
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
pub struct Version {
    pub major_version: u16,
    pub minor_version: u16,
}

impl Version {
    const fn major(major_version: u16) -> Version {
        Version {
            major_version,
            minor_version: 0,
        }
    }

    /// Java 1.1 used minor version 3
    pub const JAVA1: Version = Version {
        major_version: 45,
        minor_version: 3,
    };
    pub const JAVA5: Version = Version::major(49);

    /// First version with the `StackMapTable` attribute
    pub const JAVA6: Version = Version::major(50);

    /// First version where `StackMapTable` is mandatory and `jsr`/`ret` are forbidden
    pub const JAVA7: Version = Version::major(51);

    /// JVM class file version corresponding to Java SE 8 (released March 2014)
    pub const JAVA8: Version = Version::major(52);
    pub const JAVA11: Version = Version::major(55);
    pub const JAVA17: Version = Version::major(61);

    /// Parse a Java release number like `"1.4"`, `"8"`, or `"17"`
    pub fn from_release(release: &str) -> Option<Version> {
        let release = release.strip_prefix("1.").unwrap_or(release);
        match release.parse::<u16>().ok()? {
            0 => None,
            1 => Some(Version::JAVA1),
            n @ 2..=30 => Some(Version::major(44 + n)),
            _ => None,
        }
    }
}

impl Serialize for Version {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> Result<()> {
        self.minor_version.serialize(writer)?;
        self.major_version.serialize(writer)?;
        Ok(())
    }
}

impl Decode for Version {
    fn decode<R: ReadBytesExt>(reader: &mut R) -> Result<Self> {
        let minor_version = u16::decode(reader)?;
        let major_version = u16::decode(reader)?;
        Ok(Version {
            major_version,
            minor_version,
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn releases() {
        assert_eq!(Version::from_release("8"), Some(Version::JAVA8));
        assert_eq!(Version::from_release("1.8"), Some(Version::JAVA8));
        assert_eq!(Version::from_release("1.6"), Some(Version::JAVA6));
        assert_eq!(Version::from_release("11"), Some(Version::JAVA11));
        assert_eq!(Version::from_release("1.1"), Some(Version::JAVA1));
        assert_eq!(Version::from_release("eight"), None);
        assert!(Version::JAVA6 < Version::JAVA7);
    }
}
