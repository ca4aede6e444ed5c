use super::{BinaryName, FieldType, MethodDescriptor, UnqualifiedName};
use serde::{Deserialize, Serialize};

/// Resolved reference to a field
///
/// This is all the front-end needs to tell the code generator about a field: enough to build a
/// `CONSTANT_Fieldref_info` and to know which access instruction to use.
#[derive(Clone, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
pub struct FieldRef {
    pub owner: BinaryName,
    pub name: UnqualifiedName,
    pub descriptor: FieldType<BinaryName>,
    #[serde(default)]
    pub is_static: bool,
}

/// Resolved reference to a method
#[derive(Clone, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
pub struct MethodRef {
    pub owner: BinaryName,
    pub name: UnqualifiedName,
    pub descriptor: MethodDescriptor<BinaryName>,
    #[serde(default)]
    pub is_static: bool,

    /// The owner is an interface (so the constant is an `InterfaceMethodref`)
    #[serde(default)]
    pub owner_is_interface: bool,

    #[serde(default)]
    pub is_private: bool,
}

impl FieldRef {
    pub fn new(
        owner: BinaryName,
        name: UnqualifiedName,
        descriptor: FieldType<BinaryName>,
        is_static: bool,
    ) -> FieldRef {
        FieldRef {
            owner,
            name,
            descriptor,
            is_static,
        }
    }
}

impl MethodRef {
    /// Non-static, non-interface method on a class
    pub fn virtual_method(
        owner: BinaryName,
        name: UnqualifiedName,
        descriptor: MethodDescriptor<BinaryName>,
    ) -> MethodRef {
        MethodRef {
            owner,
            name,
            descriptor,
            is_static: false,
            owner_is_interface: false,
            is_private: false,
        }
    }

    /// Constructor of a class
    pub fn constructor(owner: BinaryName, parameters: Vec<FieldType<BinaryName>>) -> MethodRef {
        let descriptor = MethodDescriptor {
            parameters,
            return_type: None,
        };
        MethodRef::virtual_method(owner, UnqualifiedName::INIT, descriptor)
    }

    pub fn is_constructor(&self) -> bool {
        self.name == UnqualifiedName::INIT
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn member_refs_from_json() {
        let method: MethodRef = serde_json::from_str(
            r#"{ "owner": "java/lang/Runnable", "name": "run", "descriptor": "()V",
                 "owner_is_interface": true }"#,
        )
        .unwrap();
        assert!(method.owner_is_interface);
        assert!(!method.is_static);
        assert!(!method.is_constructor());
        assert_eq!(method.descriptor.return_type, None);

        let field: FieldRef = serde_json::from_str(
            r#"{ "owner": "java/lang/System", "name": "out",
                 "descriptor": "Ljava/io/PrintStream;", "is_static": true }"#,
        )
        .unwrap();
        assert!(field.is_static);
    }
}
