use super::{ArrayType, BinaryName, FieldType, InnerClassAccessFlags, RefType, UnqualifiedName};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// What the code generator needs to know about classes it didn't compile itself
///
/// The front-end owns the real symbol table. Code generation only asks structural questions: which
/// class extends which (to merge reference types when control flow joins and to decide if a cast
/// is needed), whether a class is an interface (to choose `invokeinterface`), and whether a class
/// is nested (to populate the `InnerClasses` attribute).
pub trait ClassHierarchy {
    /// Direct superclass (`None` for `java/lang/Object`, interfaces, and unknown classes)
    fn superclass(&self, class: &BinaryName) -> Option<BinaryName>;

    /// Directly implemented (or extended, for interfaces) interfaces
    fn interfaces(&self, class: &BinaryName) -> Vec<BinaryName>;

    fn is_interface(&self, class: &BinaryName) -> bool;

    /// Enclosing class, for nested classes
    fn outer_class(&self, class: &BinaryName) -> Option<InnerClassData>;

    /// Query if `sub_class` is `super_class` or inherits from it (via classes or interfaces)
    fn is_subclass(&self, sub_class: &BinaryName, super_class: &BinaryName) -> bool {
        if super_class == &BinaryName::OBJECT || sub_class == super_class {
            return true;
        }
        let mut to_visit: Vec<BinaryName> = vec![sub_class.clone()];
        let mut dont_revisit: HashSet<BinaryName> = to_visit.iter().cloned().collect();
        while let Some(next) = to_visit.pop() {
            if &next == super_class {
                return true;
            }
            let supertypes = self.superclass(&next).into_iter().chain(self.interfaces(&next));
            for supertype in supertypes {
                if dont_revisit.insert(supertype.clone()) {
                    to_visit.push(supertype);
                }
            }
        }
        false
    }

    /// Query if one reference type is assignable to another
    ///
    /// This matches the semantics of the prolog predicate `isJavaAssignable(sub_type, super_type)`
    /// in the JVM verifier specification. Unknown classes are only assignable to themselves and
    /// `java/lang/Object`.
    fn is_assignable(&self, sub_type: &RefType<BinaryName>, super_type: &RefType<BinaryName>) -> bool {
        match (sub_type, super_type) {
            (RefType::Object(sub), RefType::Object(sup)) => self.is_subclass(sub, sup),

            // Special superclass and interfaces of all arrays
            (RefType::ObjectArray(_) | RefType::PrimitiveArray(_), RefType::Object(sup)) => {
                sup == &BinaryName::OBJECT
                    || sup == &BinaryName::CLONEABLE
                    || sup == &BinaryName::SERIALIZABLE
            }

            (RefType::PrimitiveArray(arr1), RefType::PrimitiveArray(arr2)) => arr1 == arr2,

            // Cursed (unsound) covariance of arrays
            (RefType::ObjectArray(_), RefType::ObjectArray(_))
            | (RefType::PrimitiveArray(_), RefType::ObjectArray(_)) => {
                match (sub_type.element_type(), super_type.element_type()) {
                    (Some(FieldType::Ref(elem1)), Some(FieldType::Ref(elem2))) => {
                        self.is_assignable(&elem1, &elem2)
                    }
                    _ => false,
                }
            }

            _ => false,
        }
    }

    /// Least common superclass of two reference types
    ///
    /// Interfaces are not considered (the verifier treats interface types as `java/lang/Object`),
    /// so two unrelated classes meet at `java/lang/Object`.
    fn common_superclass(
        &self,
        type1: &RefType<BinaryName>,
        type2: &RefType<BinaryName>,
    ) -> RefType<BinaryName> {
        if self.is_assignable(type1, type2) {
            return type2.clone();
        } else if self.is_assignable(type2, type1) {
            return type1.clone();
        }

        match (type1, type2) {
            (RefType::Object(class1), RefType::Object(class2)) => {
                if self.is_interface(class1) || self.is_interface(class2) {
                    return RefType::Object(BinaryName::OBJECT);
                }
                let mut candidate = self.superclass(class1);
                while let Some(class) = candidate {
                    if self.is_subclass(class2, &class) {
                        return RefType::Object(class);
                    }
                    candidate = self.superclass(&class);
                }
                RefType::Object(BinaryName::OBJECT)
            }
            (RefType::ObjectArray(arr1), RefType::ObjectArray(arr2))
                if arr1.additional_dimensions == arr2.additional_dimensions =>
            {
                match self.common_superclass(
                    &RefType::Object(arr1.element_type.clone()),
                    &RefType::Object(arr2.element_type.clone()),
                ) {
                    RefType::Object(element_type) => RefType::ObjectArray(ArrayType {
                        additional_dimensions: arr1.additional_dimensions,
                        element_type,
                    }),
                    _ => RefType::Object(BinaryName::OBJECT),
                }
            }
            _ => RefType::Object(BinaryName::OBJECT),
        }
    }
}

/// Nesting information of a class, as needed for the `InnerClasses` attribute
#[derive(Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub struct InnerClassData {
    pub outer: BinaryName,

    /// `None` for anonymous classes
    #[serde(default)]
    pub simple_name: Option<UnqualifiedName>,

    #[serde(default = "InnerClassAccessFlags::empty")]
    pub access_flags: InnerClassAccessFlags,
}

#[derive(Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub struct ClassData {
    /// Only `java/lang/Object` and interfaces have no superclass
    #[serde(default)]
    pub superclass: Option<BinaryName>,

    #[serde(default)]
    pub interfaces: Vec<BinaryName>,

    #[serde(default)]
    pub is_interface: bool,

    #[serde(default)]
    pub outer: Option<InnerClassData>,
}

impl ClassData {
    pub fn class(superclass: BinaryName, interfaces: Vec<BinaryName>) -> ClassData {
        ClassData {
            superclass: Some(superclass),
            interfaces,
            is_interface: false,
            outer: None,
        }
    }

    pub fn interface(interfaces: Vec<BinaryName>) -> ClassData {
        ClassData {
            superclass: None,
            interfaces,
            is_interface: true,
            outer: None,
        }
    }
}

/// Tracks the relationships between classes and interfaces
///
/// When generating multiple classes, it is convenient to maintain one unified graph of all of the
/// types involved: the classes being compiled as well as the library classes they refer to.
#[derive(Debug, Default)]
pub struct ClassGraph {
    classes: HashMap<BinaryName, ClassData>,
}

impl ClassGraph {
    /// New empty graph
    pub fn new() -> ClassGraph {
        ClassGraph::default()
    }

    /// Add (or replace) a class
    pub fn add_class(&mut self, name: BinaryName, data: ClassData) {
        self.classes.insert(name, data);
    }

    pub fn get(&self, name: &BinaryName) -> Option<&ClassData> {
        self.classes.get(name)
    }

    /// Add the `java/lang` classes the code generator itself relies on
    pub fn insert_java_library_types(&mut self) {
        use BinaryName as N;

        self.classes.insert(
            N::OBJECT,
            ClassData {
                superclass: None,
                interfaces: vec![],
                is_interface: false,
                outer: None,
            },
        );

        for interface in [N::CHARSEQUENCE, N::CLONEABLE, N::COMPARABLE, N::SERIALIZABLE] {
            self.classes.insert(interface, ClassData::interface(vec![]));
        }

        let classes = [
            (N::STRING, N::OBJECT, vec![N::SERIALIZABLE, N::COMPARABLE, N::CHARSEQUENCE]),
            (N::STRINGBUILDER, N::OBJECT, vec![N::SERIALIZABLE, N::CHARSEQUENCE]),
            (N::CLASS, N::OBJECT, vec![N::SERIALIZABLE]),
            (N::THROWABLE, N::OBJECT, vec![N::SERIALIZABLE]),
            (N::EXCEPTION, N::THROWABLE, vec![]),
            (N::ERROR, N::THROWABLE, vec![]),
            (N::RUNTIMEEXCEPTION, N::EXCEPTION, vec![]),
            (N::NUMBER, N::OBJECT, vec![N::SERIALIZABLE]),
            (N::BOOLEAN, N::OBJECT, vec![N::SERIALIZABLE, N::COMPARABLE]),
            (N::CHARACTER, N::OBJECT, vec![N::SERIALIZABLE, N::COMPARABLE]),
            (N::BYTE, N::NUMBER, vec![N::COMPARABLE]),
            (N::SHORT, N::NUMBER, vec![N::COMPARABLE]),
            (N::INTEGER, N::NUMBER, vec![N::COMPARABLE]),
            (N::LONG, N::NUMBER, vec![N::COMPARABLE]),
            (N::FLOAT, N::NUMBER, vec![N::COMPARABLE]),
            (N::DOUBLE, N::NUMBER, vec![N::COMPARABLE]),
            (N::VOID, N::OBJECT, vec![]),
        ];
        for (class, superclass, interfaces) in classes {
            self.classes.insert(class, ClassData::class(superclass, interfaces));
        }
    }
}

impl ClassHierarchy for ClassGraph {
    fn superclass(&self, class: &BinaryName) -> Option<BinaryName> {
        self.classes.get(class)?.superclass.clone()
    }

    fn interfaces(&self, class: &BinaryName) -> Vec<BinaryName> {
        self.classes
            .get(class)
            .map(|data| data.interfaces.clone())
            .unwrap_or_default()
    }

    fn is_interface(&self, class: &BinaryName) -> bool {
        self.classes.get(class).map_or(false, |data| data.is_interface)
    }

    fn outer_class(&self, class: &BinaryName) -> Option<InnerClassData> {
        self.classes.get(class)?.outer.clone()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::jvm::{BaseType, Name};

    fn name(s: &str) -> BinaryName {
        BinaryName::from_string(s.to_owned()).unwrap()
    }

    fn graph() -> ClassGraph {
        let mut graph = ClassGraph::new();
        graph.insert_java_library_types();
        graph.add_class(name("a/Animal"), ClassData::class(BinaryName::OBJECT, vec![]));
        graph.add_class(name("a/Dog"), ClassData::class(name("a/Animal"), vec![]));
        graph.add_class(name("a/Cat"), ClassData::class(name("a/Animal"), vec![]));
        graph
    }

    #[test]
    fn subclasses() {
        let graph = graph();
        assert!(graph.is_subclass(&name("a/Dog"), &name("a/Animal")));
        assert!(!graph.is_subclass(&name("a/Animal"), &name("a/Dog")));
        assert!(graph.is_subclass(&BinaryName::RUNTIMEEXCEPTION, &BinaryName::THROWABLE));
        assert!(graph.is_subclass(&BinaryName::INTEGER, &BinaryName::SERIALIZABLE));
        assert!(graph.is_subclass(&name("x/Unknown"), &BinaryName::OBJECT));
    }

    #[test]
    fn arrays() {
        let graph = graph();
        let dogs = RefType::array(FieldType::object(name("a/Dog")));
        let animals = RefType::array(FieldType::object(name("a/Animal")));
        let ints = RefType::array(FieldType::Base(BaseType::Int));
        assert!(graph.is_assignable(&dogs, &animals));
        assert!(!graph.is_assignable(&animals, &dogs));
        assert!(graph.is_assignable(&ints, &RefType::Object(BinaryName::CLONEABLE)));
        assert!(!graph.is_assignable(&ints, &animals));
        let objects = RefType::array(FieldType::object(BinaryName::OBJECT));
        assert!(graph.is_assignable(&RefType::array(FieldType::Ref(ints.clone())), &objects));
    }

    #[test]
    fn common_superclasses() {
        let graph = graph();
        let dog = RefType::Object(name("a/Dog"));
        let cat = RefType::Object(name("a/Cat"));
        assert_eq!(graph.common_superclass(&dog, &cat), RefType::Object(name("a/Animal")));
        assert_eq!(
            graph.common_superclass(&RefType::Object(BinaryName::INTEGER), &RefType::Object(BinaryName::LONG)),
            RefType::Object(BinaryName::NUMBER)
        );
        assert_eq!(
            graph.common_superclass(&dog, &RefType::Object(BinaryName::STRING)),
            RefType::Object(BinaryName::OBJECT)
        );
        let dogs = RefType::array(FieldType::Ref(dog));
        let cats = RefType::array(FieldType::Ref(cat));
        assert_eq!(
            graph.common_superclass(&dogs, &cats),
            RefType::array(FieldType::object(name("a/Animal")))
        );
    }

    #[test]
    fn class_data_from_json() {
        let data: ClassData = serde_json::from_str(
            r#"{ "superclass": "a/Animal", "outer": { "outer": "a/Zoo", "simple_name": "Dog", "access_flags": 9 } }"#,
        )
        .unwrap();
        let outer = data.outer.unwrap();
        assert_eq!(outer.outer, name("a/Zoo"));
        assert_eq!(outer.access_flags, InnerClassAccessFlags::PUBLIC | InnerClassAccessFlags::STATIC);
    }
}
