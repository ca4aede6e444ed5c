use super::method::generate_code;
use super::{Error, Settings};
use crate::jvm::class_file::{
    ClassConstantIndex, ClassFile, ConstantIndex, ConstantValue, ConstantsPool, Exceptions, Field,
    InnerClass, InnerClasses, LoadableConstant, Method, SourceFile, Utf8ConstantIndex,
};
use crate::jvm::hierarchy::ClassHierarchy;
use crate::jvm::{
    BinaryName, ClassAccessFlags, FieldAccessFlags, FieldRef, MethodAccessFlags,
    MethodDescriptor, Name, RenderDescriptor, UnqualifiedName,
};
use crate::tree::{
    ClassDecl, ConstValue, Expr, ExprKind, FieldDecl, Member, MethodDecl, Receiver, Stmt,
    StmtKind,
};

/// Error while generating a class, along with the method (if any) it came from
#[derive(Debug)]
pub struct ClassError {
    /// Name and descriptor of the method
    pub method: Option<String>,
    pub error: Error,
}

impl From<Error> for ClassError {
    fn from(error: Error) -> ClassError {
        ClassError {
            method: None,
            error,
        }
    }
}

impl From<crate::jvm::Error> for ClassError {
    fn from(error: crate::jvm::Error) -> ClassError {
        ClassError::from(Error::from(error))
    }
}

/// Generate the class file for one class declaration
///
/// Field initializers move into the code: static ones into a synthesized `<clinit>`, instance
/// ones into every constructor that calls a superclass constructor (right after that call).
pub fn generate_class(
    decl: &ClassDecl,
    source_file: Option<&str>,
    hierarchy: &dyn ClassHierarchy,
    settings: &Settings,
) -> Result<ClassFile, ClassError> {
    let mut pool = ConstantsPool::new();
    let this_class = pool.get_class(&decl.name)?;
    let super_class = if decl.name == BinaryName::OBJECT {
        None
    } else {
        Some(pool.get_class(&decl.superclass())?)
    };
    let interfaces = decl
        .interfaces
        .iter()
        .map(|interface| pool.get_class(interface))
        .collect::<Result<Vec<_>, _>>()?;

    let mut fields = vec![];
    let mut static_inits = vec![];
    let mut instance_inits = vec![];
    let mut methods = vec![];
    for member in &decl.members {
        match member {
            Member::Field(field) => {
                fields.push(generate_field(&mut pool, field)?);
                if let Some(init) = field_initializer(&decl.name, field) {
                    if field.is_static() {
                        static_inits.push(init);
                    } else {
                        instance_inits.push(init);
                    }
                }
            }
            Member::Initializer(initializer) if initializer.is_static => {
                static_inits.push(initializer.body.clone())
            }
            Member::Initializer(initializer) => instance_inits.push(initializer.body.clone()),
            Member::Method(method) => methods.push(method),
        }
    }

    let mut generated_methods = vec![];
    for method in methods {
        let method = with_instance_inits(&decl.name, method, &instance_inits);
        let generated = generate_method(&mut pool, hierarchy, settings, &decl.name, &method)
            .map_err(|error| ClassError {
                method: Some(method_label(&method)),
                error,
            })?;
        generated_methods.push(generated);
    }
    if !static_inits.is_empty() {
        let clinit = MethodDecl {
            name: UnqualifiedName::CLINIT,
            access_flags: MethodAccessFlags::STATIC,
            params: vec![],
            return_type: None,
            exceptions: vec![],
            body: Some(Stmt::new(StmtKind::Block {
                stmts: static_inits,
            })),
            end_line: None,
        };
        let generated = generate_method(&mut pool, hierarchy, settings, &decl.name, &clinit)
            .map_err(|error| ClassError {
                method: Some(method_label(&clinit)),
                error,
            })?;
        generated_methods.push(generated);
    }

    let mut attributes = vec![];
    if let (true, Some(source_file)) = (settings.source_file, source_file) {
        let name = pool.get_utf8(source_file)?;
        attributes.push(pool.get_attribute(SourceFile(name))?);
    }
    let inner_classes = inner_classes(&mut pool, hierarchy, &decl.name)?;
    if !inner_classes.is_empty() {
        attributes.push(pool.get_attribute(InnerClasses(inner_classes))?);
    }

    let mut access_flags = decl.access_flags;
    if decl.is_interface() {
        access_flags.remove(ClassAccessFlags::SUPER);
    }
    log::info!(
        "generated {} ({} fields, {} methods, {} constants)",
        decl.name,
        fields.len(),
        generated_methods.len(),
        pool.constants().offset_len().0
    );
    Ok(ClassFile {
        version: settings.version,
        constants: pool.take_constants(),
        access_flags,
        this_class,
        super_class,
        interfaces,
        fields,
        methods: generated_methods,
        attributes,
    })
}

fn generate_field(pool: &mut ConstantsPool, field: &FieldDecl) -> Result<Field, Error> {
    let name_index = pool.get_utf8(field.name.as_str())?;
    let descriptor_index = pool.get_utf8(field.ty.render())?;
    let mut attributes = vec![];
    if let (true, Some(constant)) = (is_constant_field(field), &field.constant) {
        let value = pool.get_loadable(&loadable(constant))?;
        attributes.push(pool.get_attribute(ConstantValue(value))?);
    }
    Ok(Field {
        access_flags: field.access_flags,
        name_index,
        descriptor_index,
        attributes,
    })
}

/// Static final fields with a constant value get it from the `ConstantValue` attribute
fn is_constant_field(field: &FieldDecl) -> bool {
    field
        .access_flags
        .contains(FieldAccessFlags::STATIC | FieldAccessFlags::FINAL)
        && field.constant.is_some()
}

fn loadable(constant: &ConstValue) -> LoadableConstant {
    match constant {
        ConstValue::Int(i) => LoadableConstant::Integer(*i),
        ConstValue::Long(l) => LoadableConstant::Long(*l),
        ConstValue::Float(f) => LoadableConstant::Float(*f),
        ConstValue::Double(d) => LoadableConstant::Double(*d),
        ConstValue::String(s) => LoadableConstant::String(s.clone()),
    }
}

/// Assignment of a field's initial value, as a statement
fn field_initializer(class: &BinaryName, field: &FieldDecl) -> Option<Stmt> {
    if is_constant_field(field) {
        return None;
    }
    let init = field.init.clone()?;
    let is_static = field.is_static();
    let target = Expr::new(
        Some(field.ty.clone()),
        ExprKind::Field {
            receiver: if is_static {
                Receiver::Implicit
            } else {
                Receiver::This
            },
            field: FieldRef::new(class.clone(), field.name.clone(), field.ty.clone(), is_static),
        },
    );
    let assign = Expr::new(
        Some(field.ty.clone()),
        ExprKind::Assign {
            target: Box::new(target),
            value: Box::new(init),
        },
    );
    Some(Stmt {
        line: field.line,
        kind: StmtKind::Expr { expr: assign },
    })
}

/// Is the statement a call to a superclass constructor (as opposed to `this(...)`)?
fn is_super_call(class: &BinaryName, stmt: &Stmt) -> bool {
    match &stmt.kind {
        StmtKind::Expr {
            expr:
                Expr {
                    kind: ExprKind::Invoke { method, .. },
                    ..
                },
        } => method.is_constructor() && &method.owner != class,
        _ => false,
    }
}

/// Copy of the method, with the instance initializers spliced in if it is a constructor that
/// starts by calling a superclass constructor
fn with_instance_inits(class: &BinaryName, method: &MethodDecl, inits: &[Stmt]) -> MethodDecl {
    let mut method = method.clone();
    if !method.is_constructor() || inits.is_empty() {
        return method;
    }
    if let Some(Stmt {
        kind: StmtKind::Block { stmts },
        ..
    }) = &mut method.body
    {
        if stmts.first().map_or(false, |first| is_super_call(class, first)) {
            stmts.splice(1..1, inits.iter().cloned());
        }
    }
    method
}

fn method_descriptor(method: &MethodDecl) -> MethodDescriptor<BinaryName> {
    MethodDescriptor {
        parameters: method.params.iter().map(|param| param.ty.clone()).collect(),
        return_type: method.return_type.clone(),
    }
}

/// `name(descriptor)`, for diagnostics
fn method_label(method: &MethodDecl) -> String {
    format!("{}{}", method.name, method_descriptor(method).render())
}

fn generate_method(
    pool: &mut ConstantsPool,
    hierarchy: &dyn ClassHierarchy,
    settings: &Settings,
    this_class: &BinaryName,
    method: &MethodDecl,
) -> Result<Method, Error> {
    let mut attributes = vec![];
    if let Some(body) = &method.body {
        let code = generate_code(pool, hierarchy, settings, this_class, method, body)?;
        attributes.push(pool.get_attribute(code)?);
    }
    if !method.exceptions.is_empty() {
        let exceptions = method
            .exceptions
            .iter()
            .map(|class| pool.get_class(class))
            .collect::<Result<Vec<_>, _>>()?;
        attributes.push(pool.get_attribute(Exceptions(exceptions))?);
    }
    let name_index = pool.get_utf8(method.name.as_str())?;
    let descriptor_index = pool.get_utf8(method_descriptor(method).render())?;
    Ok(Method {
        access_flags: method.access_flags,
        name_index,
        descriptor_index,
        attributes,
    })
}

/// Entries for every nested class referenced from the pool (and the classes enclosing them)
///
/// Adding an entry can add the outer class to the pool, which may itself be nested, so this
/// runs until no new nested class shows up.
fn inner_classes(
    pool: &mut ConstantsPool,
    hierarchy: &dyn ClassHierarchy,
    this_class: &BinaryName,
) -> Result<Vec<InnerClass>, crate::jvm::Error> {
    let mut seen: Vec<BinaryName> = vec![];
    let mut entries = vec![];
    loop {
        let mut candidates = vec![this_class.clone()];
        candidates.extend(pool.referenced_classes());
        let mut added = false;
        for class in candidates {
            if seen.contains(&class) {
                continue;
            }
            let data = match hierarchy.outer_class(&class) {
                Some(data) => data,
                None => continue,
            };
            let inner_class = pool.get_class(&class)?;
            let outer_class = match &data.simple_name {
                Some(_) => pool.get_class(&data.outer)?,
                None => ClassConstantIndex(ConstantIndex(0)),
            };
            let inner_name = match &data.simple_name {
                Some(name) => pool.get_utf8(name.as_str())?,
                None => Utf8ConstantIndex(ConstantIndex(0)),
            };
            entries.push(InnerClass {
                inner_class,
                outer_class,
                inner_name,
                access_flags: data.access_flags,
            });
            seen.push(class);
            added = true;
        }
        if !added {
            return Ok(entries);
        }
    }
}
