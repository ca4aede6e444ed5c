//! Typed syntax tree consumed by the code generator
//!
//! By the time a tree gets here, every name has been resolved and every expression has been
//! type-checked: fields and methods are referred to by [`FieldRef`] and [`MethodRef`], local
//! variables by [`VarId`], and every expression carries its type as a descriptor. The tree is
//! usually produced by a separate front-end and handed over as JSON.

use crate::jvm::hierarchy::{ClassData, InnerClassData};
use crate::jvm::{
    BaseType, BinaryName, ClassAccessFlags, FieldAccessFlags, FieldRef, FieldType,
    MethodAccessFlags, MethodRef, RefType, UnqualifiedName,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Everything compiled from one source file
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CompilationUnit {
    /// Name of the source file (for the `SourceFile` attribute)
    #[serde(default)]
    pub source_file: Option<String>,

    pub classes: Vec<ClassDecl>,

    /// Library classes referred to by the code (superclasses, interfaces, nesting)
    #[serde(default)]
    pub known_classes: BTreeMap<BinaryName, ClassData>,
}

impl CompilationUnit {
    pub fn from_json(json: &str) -> serde_json::Result<CompilationUnit> {
        serde_json::from_str(json)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ClassDecl {
    pub name: BinaryName,

    #[serde(default = "default_class_flags")]
    pub access_flags: ClassAccessFlags,

    /// Defaults to `java/lang/Object` (interfaces also extend it in the class file)
    #[serde(default)]
    pub superclass: Option<BinaryName>,

    #[serde(default)]
    pub interfaces: Vec<BinaryName>,

    /// Set for nested classes
    #[serde(default)]
    pub outer: Option<InnerClassData>,

    #[serde(default)]
    pub members: Vec<Member>,
}

impl ClassDecl {
    pub fn superclass(&self) -> BinaryName {
        self.superclass.clone().unwrap_or(BinaryName::OBJECT)
    }

    pub fn is_interface(&self) -> bool {
        self.access_flags.contains(ClassAccessFlags::INTERFACE)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Member {
    Field(FieldDecl),
    Method(MethodDecl),

    /// `static { ... }` or an instance initializer block `{ ... }`
    Initializer(Initializer),
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FieldDecl {
    pub name: UnqualifiedName,

    #[serde(default = "FieldAccessFlags::empty")]
    pub access_flags: FieldAccessFlags,

    #[serde(rename = "type")]
    pub ty: FieldType<BinaryName>,

    /// Constant value of a `final` field with a constant initializer
    #[serde(default)]
    pub constant: Option<ConstValue>,

    /// Initializer, unless the field is a static constant
    #[serde(default)]
    pub init: Option<Expr>,

    #[serde(default)]
    pub line: Option<u16>,
}

impl FieldDecl {
    pub fn is_static(&self) -> bool {
        self.access_flags.contains(FieldAccessFlags::STATIC)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Initializer {
    #[serde(default)]
    pub is_static: bool,
    pub body: Stmt,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MethodDecl {
    pub name: UnqualifiedName,

    #[serde(default = "MethodAccessFlags::empty")]
    pub access_flags: MethodAccessFlags,

    #[serde(default)]
    pub params: Vec<VarDecl>,

    /// `None` for `void`
    #[serde(default)]
    pub return_type: Option<FieldType<BinaryName>>,

    /// Declared checked exceptions (the `Exceptions` attribute)
    #[serde(default)]
    pub exceptions: Vec<BinaryName>,

    /// `None` for abstract and native methods
    #[serde(default)]
    pub body: Option<Stmt>,

    /// Line of the closing brace, used for the implicit `return`
    #[serde(default)]
    pub end_line: Option<u16>,
}

impl MethodDecl {
    pub fn is_static(&self) -> bool {
        self.access_flags.contains(MethodAccessFlags::STATIC)
    }

    pub fn is_constructor(&self) -> bool {
        self.name == UnqualifiedName::INIT
    }
}

/// Identifier of a local variable (unique within a method)
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Debug, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VarId(pub u32);

/// Declaration of a local variable or parameter
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct VarDecl {
    pub id: VarId,
    pub name: UnqualifiedName,

    #[serde(rename = "type")]
    pub ty: FieldType<BinaryName>,

    /// Generic signature, when it says more than the type
    #[serde(default)]
    pub signature: Option<String>,

    /// Constant value of a `final` local with a constant initializer
    #[serde(default)]
    pub constant: Option<ConstValue>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Stmt {
    /// Source line where the statement starts
    #[serde(default)]
    pub line: Option<u16>,

    #[serde(flatten)]
    pub kind: StmtKind,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StmtKind {
    Empty,
    Block {
        stmts: Vec<Stmt>,
    },
    LocalVar {
        var: VarDecl,
        #[serde(default)]
        init: Option<Expr>,
    },
    Expr {
        expr: Expr,
    },
    If {
        cond: Expr,
        then: Box<Stmt>,
        #[serde(default)]
        otherwise: Option<Box<Stmt>>,
    },
    While {
        cond: Expr,
        body: Box<Stmt>,
    },
    DoWhile {
        body: Box<Stmt>,
        cond: Expr,
    },
    For {
        #[serde(default)]
        init: Vec<Stmt>,
        #[serde(default)]
        cond: Option<Expr>,
        #[serde(default)]
        update: Vec<Expr>,
        body: Box<Stmt>,
    },
    Labelled {
        label: String,
        body: Box<Stmt>,
    },
    Switch {
        selector: Expr,
        cases: Vec<Case>,
    },
    Break {
        #[serde(default)]
        label: Option<String>,
    },
    Continue {
        #[serde(default)]
        label: Option<String>,
    },
    Return {
        #[serde(default)]
        value: Option<Expr>,
    },
    Throw {
        value: Expr,
    },
    Try {
        body: Box<Stmt>,
        #[serde(default)]
        catches: Vec<Catch>,
        #[serde(default)]
        finally: Option<Box<Stmt>>,
    },
    Synchronized {
        lock: Expr,
        body: Box<Stmt>,
    },
}

impl Stmt {
    pub fn new(kind: StmtKind) -> Stmt {
        Stmt { line: None, kind }
    }
}

/// One `case` group of a switch, falling through into the next group
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Case {
    /// Constant labels (already folded to `int`)
    #[serde(default)]
    pub labels: Vec<i32>,

    /// Also the `default` case
    #[serde(default)]
    pub is_default: bool,

    #[serde(default)]
    pub body: Vec<Stmt>,
}

/// `catch (A | B e) { ... }`
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Catch {
    /// One entry per alternative of a multi-catch
    pub types: Vec<BinaryName>,
    pub param: VarDecl,
    pub body: Stmt,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Expr {
    /// Type of the expression (`None` for `void` method calls)
    #[serde(default, rename = "type")]
    pub ty: Option<FieldType<BinaryName>>,

    /// Value of the expression, if it is a compile-time constant
    #[serde(default)]
    pub constant: Option<ConstValue>,

    #[serde(flatten)]
    pub kind: ExprKind,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExprKind {
    Literal {
        value: ConstValue,
    },
    Null,
    Local {
        var: VarId,
    },
    This,
    Field {
        #[serde(default)]
        receiver: Receiver,
        field: FieldRef,
    },
    Invoke {
        #[serde(default)]
        receiver: Receiver,
        method: MethodRef,
        #[serde(default)]
        args: Vec<Expr>,
    },

    /// `new C(args)` (the class is the owner of the constructor)
    New {
        constructor: MethodRef,
        #[serde(default)]
        args: Vec<Expr>,
    },

    /// `new T[d1][d2][]` or `new T[] { e1, e2 }` (the array type is the expression type)
    NewArray {
        #[serde(default)]
        dims: Vec<Expr>,
        #[serde(default)]
        elems: Option<Vec<Expr>>,
    },
    ArrayLength {
        array: Box<Expr>,
    },
    Index {
        array: Box<Expr>,
        index: Box<Expr>,
    },
    Assign {
        target: Box<Expr>,
        value: Box<Expr>,
    },
    CompoundAssign {
        op: BinaryOp,
        target: Box<Expr>,
        value: Box<Expr>,
    },
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Conditional {
        cond: Box<Expr>,
        then: Box<Expr>,
        otherwise: Box<Expr>,
    },

    /// Conversion to the expression type
    Cast {
        expr: Box<Expr>,
    },
    InstanceOf {
        expr: Box<Expr>,
        class: RefType<BinaryName>,
    },

    /// `T.class` (`None` is `void.class`)
    ClassLiteral {
        #[serde(default)]
        class: Option<FieldType<BinaryName>>,
    },
}

/// Qualifier of a field access or method call
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Receiver {
    /// Unqualified name (an implicit `this` for instance members)
    Implicit,
    This,

    /// `super.m()` or `super(...)`
    Super,
    Expr(Box<Expr>),
}

impl Default for Receiver {
    fn default() -> Receiver {
        Receiver::Implicit
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConstValue {
    /// Also `boolean`, `byte`, `char`, and `short` constants
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    String(String),
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnaryOp {
    Plus,
    Neg,

    /// `~`
    Compl,

    /// `!`
    Not,
    PreInc,
    PreDec,
    PostInc,
    PostDec,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Shl,
    Shr,
    Ushr,

    /// `&` (bitwise or logical, depending on the operand types)
    And,
    Or,
    Xor,

    /// `&&`
    CondAnd,

    /// `||`
    CondOr,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl BinaryOp {
    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            BinaryOp::Eq | BinaryOp::Ne | BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge
        )
    }

    pub fn is_shift(self) -> bool {
        matches!(self, BinaryOp::Shl | BinaryOp::Shr | BinaryOp::Ushr)
    }
}

impl Expr {
    pub fn new(ty: Option<FieldType<BinaryName>>, kind: ExprKind) -> Expr {
        Expr {
            ty,
            constant: None,
            kind,
        }
    }

    pub fn int(value: i32) -> Expr {
        Expr::new(
            Some(FieldType::int()),
            ExprKind::Literal {
                value: ConstValue::Int(value),
            },
        )
    }

    pub fn string(value: &str) -> Expr {
        Expr::new(
            Some(FieldType::object(BinaryName::STRING)),
            ExprKind::Literal {
                value: ConstValue::String(value.to_owned()),
            },
        )
    }

    pub fn local(var: VarId, ty: FieldType<BinaryName>) -> Expr {
        Expr::new(Some(ty), ExprKind::Local { var })
    }

    pub fn binary(op: BinaryOp, ty: FieldType<BinaryName>, left: Expr, right: Expr) -> Expr {
        Expr::new(
            Some(ty),
            ExprKind::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            },
        )
    }

    /// Type of the expression, with `void` being an error for the caller to report
    pub fn field_type(&self) -> Option<&FieldType<BinaryName>> {
        self.ty.as_ref()
    }

    pub fn is_boolean(&self) -> bool {
        matches!(self.ty, Some(FieldType::Base(BaseType::Boolean)))
    }

    /// Is this the `null` literal?
    pub fn is_null(&self) -> bool {
        matches!(self.kind, ExprKind::Null)
    }

    /// Is this the integer constant zero?
    pub fn is_zero(&self) -> bool {
        matches!(
            (&self.constant, &self.kind),
            (Some(ConstValue::Int(0)), _) | (None, ExprKind::Literal { value: ConstValue::Int(0) })
        )
    }

    /// Constant value, from the annotation or from a literal
    pub fn constant_value(&self) -> Option<&ConstValue> {
        match (&self.constant, &self.kind) {
            (Some(value), _) => Some(value),
            (None, ExprKind::Literal { value }) => Some(value),
            _ => None,
        }
    }
}

/// Flags of a class declared without any modifiers
fn default_class_flags() -> ClassAccessFlags {
    ClassAccessFlags::SUPER
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn statements_from_json() {
        let stmt: Stmt = serde_json::from_str(
            r#"{ "kind": "if", "line": 3,
                 "cond": { "kind": "local", "var": 0, "type": "Z" },
                 "then": { "kind": "return", "value": { "kind": "literal", "type": "I", "value": { "int": 1 } } } }"#,
        )
        .unwrap();
        assert_eq!(stmt.line, Some(3));
        match stmt.kind {
            StmtKind::If { cond, then, otherwise } => {
                assert!(cond.is_boolean());
                assert!(otherwise.is_none());
                assert!(matches!(then.kind, StmtKind::Return { value: Some(_) }));
            }
            other => panic!("unexpected statement {:?}", other),
        }
    }

    #[test]
    fn expressions_from_json() {
        let expr: Expr = serde_json::from_str(
            r#"{ "kind": "invoke", "type": "Ljava/lang/String;",
                 "receiver": { "expr": { "kind": "this", "type": "Lp/A;" } },
                 "method": { "owner": "java/lang/Object", "name": "toString",
                             "descriptor": "()Ljava/lang/String;" } }"#,
        )
        .unwrap();
        match &expr.kind {
            ExprKind::Invoke { receiver: Receiver::Expr(this), method, args } => {
                assert!(matches!(this.kind, ExprKind::This));
                assert_eq!(method.name.as_ref(), "toString");
                assert!(args.is_empty());
            }
            other => panic!("unexpected expression {:?}", other),
        }

        let zero: Expr = serde_json::from_str(
            r#"{ "kind": "binary", "op": "sub", "type": "I", "constant": { "int": 0 },
                 "left": { "kind": "literal", "type": "I", "value": { "int": 1 } },
                 "right": { "kind": "literal", "type": "I", "value": { "int": 1 } } }"#,
        )
        .unwrap();
        assert!(zero.is_zero());
        assert_eq!(zero.constant_value(), Some(&ConstValue::Int(0)));
    }

    #[test]
    fn class_defaults() {
        let unit = CompilationUnit::from_json(
            r#"{ "classes": [ { "name": "p/A", "members": [
                   { "kind": "field", "name": "x", "type": "J", "access_flags": 8 },
                   { "kind": "method", "name": "<init>", "access_flags": 1,
                     "body": { "kind": "block", "stmts": [] } } ] } ] }"#,
        )
        .unwrap();
        let class = &unit.classes[0];
        assert_eq!(class.superclass(), BinaryName::OBJECT);
        assert_eq!(class.access_flags, ClassAccessFlags::SUPER);
        assert!(matches!(&class.members[0], Member::Field(field) if field.is_static()));
        assert!(matches!(&class.members[1], Member::Method(method) if method.is_constructor()));
    }
}
