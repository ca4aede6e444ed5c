use super::env::Env;
use super::items::Item;
use super::{Error, Settings};
use crate::jvm::class_file::{Code, ConstantsPool};
use crate::jvm::code::{CodeBuilder, Instruction, Jump, LocalDebugInfo, TypeCode, VType};
use crate::jvm::hierarchy::ClassHierarchy;
use crate::jvm::verifier::VerificationType;
use crate::jvm::{self, BinaryName, FieldType, RefType, UnqualifiedName};
use crate::tree::{MethodDecl, Stmt, StmtKind, VarDecl, VarId};
use crate::util::Width;
use std::collections::HashMap;

pub(super) type Result<A> = std::result::Result<A, Error>;

/// Most parameter slots a method can take (including `this`)
const MAX_PARAMETER_SLOTS: usize = 255;

/// Most dimensions an array type can have
const MAX_DIMENSIONS: usize = 255;

/// Translation state for a single method body
///
/// Statements are lowered in `stmt`, expressions in `expr`. Both share the code builder, the
/// registers of the locals declared so far, and the stack of enclosing statements that `break`,
/// `continue`, and `return` have to find their way out of.
pub(super) struct MethodGen<'a, 't> {
    pub(super) code: CodeBuilder<'a>,
    pub(super) settings: &'a Settings,

    /// Registers (and type codes) of the locals in scope
    locals: HashMap<VarId, (TypeCode, u16)>,

    pub(super) envs: Vec<Env<'t>>,

    /// Once a finalizer has become a subroutine, so do all later ones in the method
    pub(super) use_jsr: bool,

    /// Type code of the method's return value
    pub(super) return_typecode: TypeCode,
}

/// Generate the `Code` attribute for a method body
///
/// The body is first generated with narrow jumps. If some jump turns out to need a wide offset,
/// the whole body is generated again with wide jumps.
pub fn generate_code(
    pool: &mut ConstantsPool,
    hierarchy: &dyn ClassHierarchy,
    settings: &Settings,
    this_class: &BinaryName,
    method: &MethodDecl,
    body: &Stmt,
) -> Result<Code> {
    check_parameters(method)?;
    if let Some(code) = attempt(pool, hierarchy, settings, this_class, method, body, false)? {
        return Ok(code);
    }
    log::debug!(
        "{}.{}: retrying with wide jumps",
        this_class,
        method.name
    );
    attempt(pool, hierarchy, settings, this_class, method, body, true)?
        .ok_or_else(|| Error::malformed("wide jumps still overflowed"))
}

fn attempt(
    pool: &mut ConstantsPool,
    hierarchy: &dyn ClassHierarchy,
    settings: &Settings,
    this_class: &BinaryName,
    method: &MethodDecl,
    body: &Stmt,
    wide: bool,
) -> Result<Option<Code>> {
    let code = CodeBuilder::new(
        pool,
        hierarchy,
        this_class.clone(),
        settings.code_settings(),
        wide,
    );
    let mut gen = MethodGen::new(code, settings, method);
    gen.gen_method(method, body)?;
    if gen.code.needs_wide_jumps() {
        return Ok(None);
    }
    let mut code = gen.code;
    code.compress_catch_table();
    Ok(Some(code.finish()?))
}

/// Parameters (and `this`) must fit in 255 slots
fn check_parameters(method: &MethodDecl) -> Result<()> {
    let this_slot = if method.is_static() { 0 } else { 1 };
    let slots: usize = this_slot + method.params.iter().map(|param| param.ty.width()).sum::<usize>();
    if slots > MAX_PARAMETER_SLOTS {
        return Err(jvm::Error::TooManyParameters(slots).into());
    }
    for param in &method.params {
        check_dimensions(&param.ty)?;
    }
    Ok(())
}

/// Array types are limited to 255 dimensions
pub(super) fn check_dimensions(ty: &FieldType<BinaryName>) -> Result<()> {
    if let FieldType::Ref(ref_type) = ty {
        let dimensions = ref_type.dimensions();
        if dimensions > MAX_DIMENSIONS {
            return Err(jvm::Error::TooManyDimensions(dimensions).into());
        }
    }
    Ok(())
}

impl<'a, 't> MethodGen<'a, 't> {
    fn new(code: CodeBuilder<'a>, settings: &'a Settings, method: &MethodDecl) -> MethodGen<'a, 't> {
        MethodGen {
            code,
            settings,
            locals: HashMap::new(),
            envs: vec![],
            use_jsr: false,
            return_typecode: TypeCode::of_return(method.return_type.as_ref()),
        }
    }

    fn gen_method(&mut self, method: &MethodDecl, body: &'t Stmt) -> Result<()> {
        if !method.is_static() {
            let this_class = self.code.this_class().clone();
            let vtype = if method.is_constructor() && this_class != BinaryName::OBJECT {
                VerificationType::UninitializedThis
            } else {
                VerificationType::Object(RefType::Object(this_class.clone()))
            };
            let debug = LocalDebugInfo {
                name: UnqualifiedName::THIS,
                descriptor: FieldType::object(this_class),
                signature: None,
            };
            let reg = self.code.new_local(vtype, Some(debug))?;
            self.code.set_defined(reg);
        }
        for param in &method.params {
            let reg = self.declare_local(param)?;
            self.code.set_defined(reg);
        }
        self.code.begin_body();

        // The outermost block shares the scope of the parameters
        match &body.kind {
            StmtKind::Block { stmts } => self.gen_stats(stmts)?,
            _ => self.gen_stat(body)?,
        }

        if self.code.is_alive() {
            self.code.stat_begin(method.end_line);
            if self.return_typecode == TypeCode::Void {
                self.code.emit(Instruction::Return)?;
            } else {
                // Only reachable if the front-end couldn't prove it isn't
                let start = self.code.entry_point()?;
                let jump = self.code.branch(Jump::Goto)?;
                self.code.resolve_to(jump, start)?;
            }
        }
        self.code.end_scopes(0)?;
        self.code.check_limits()?;
        Ok(())
    }

    /// Allocate a register for a local variable (or parameter)
    pub(super) fn declare_local(&mut self, var: &VarDecl) -> Result<u16> {
        check_dimensions(&var.ty)?;
        let debug = LocalDebugInfo {
            name: var.name.clone(),
            descriptor: var.ty.clone(),
            signature: var.signature.clone(),
        };
        let reg = self.code.new_local(VType::from(var.ty.clone()), Some(debug))?;
        self.locals.insert(var.id, (TypeCode::of(&var.ty), reg));
        Ok(reg)
    }

    /// Allocate a register for a compiler temporary
    pub(super) fn make_temp(&mut self, vtype: VType) -> Result<u16> {
        Ok(self.code.new_local(vtype, None)?)
    }

    pub(super) fn local_item(&self, var: VarId) -> Result<Item> {
        match self.locals.get(&var) {
            Some(&(typecode, reg)) => Ok(Item::Local { typecode, reg }),
            None => Err(Error::malformed(format!("unknown local variable {:?}", var))),
        }
    }
}
