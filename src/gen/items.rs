use super::fold;
use super::Error;
use crate::jvm::class_file::LoadableConstant;
use crate::jvm::code::{Chain, CodeBuilder, Instruction, InvokeType, Jump, OrdComparison, TypeCode};
use crate::jvm::{FieldRef, MethodRef};
use crate::tree::ConstValue;
use crate::util::Width;

type Result<A> = std::result::Result<A, Error>;

/// Field or method named by a static or instance member item
#[derive(Clone, Debug, PartialEq)]
pub enum MemberRef {
    Field(FieldRef),
    Method(MethodRef),
}

impl MemberRef {
    fn typecode(&self) -> TypeCode {
        match self {
            MemberRef::Field(field) => TypeCode::of(&field.descriptor),
            MemberRef::Method(method) => TypeCode::of_return(method.descriptor.return_type.as_ref()),
        }
    }
}

/// Something that can be loaded, stored, or invoked
///
/// An item is what translating an expression produces. Nothing is emitted until the context
/// decides how the item is used: a local variable on the left of an assignment is stored to, on
/// the right it is loaded, in `x += 1` it gets an `iinc`. Operands the item needs (the receiver
/// of a field, the array and index of an element) are already on the stack.
///
/// Operations consume the item. Lvalues hold no jump chains so they are cheap to clone when
/// one is needed more than once.
#[derive(Clone, Debug)]
pub enum Item {
    /// Result of a `void` method
    Void,

    /// Value already on the stack
    Stack(TypeCode),

    Local { typecode: TypeCode, reg: u16 },

    /// `this` (in local 0)
    This,

    /// `this`, for a member access through `super`
    Super,

    /// Static field or method (nothing on the stack)
    Static(MemberRef),

    /// Instance field or method (receiver on the stack)
    Member { member: MemberRef, nonvirtual: bool },

    /// Array element (array and index on the stack)
    Indexed(TypeCode),

    /// Constant, not yet loaded
    Immediate(ConstValue, TypeCode),

    /// Assignment whose value may or may not be needed
    Assign(Box<Item>),

    /// Condition, not yet materialized as a boolean
    Cond(CondItem),
}

fn misuse(code: &CodeBuilder, operation: &str, item: &Item) -> Error {
    Error::malformed(format!(
        "cannot {} {:?} (at pc {})",
        operation,
        item,
        code.code_len()
    ))
}

/// Item for a value of the given type code on the stack
pub fn stack_item(typecode: TypeCode) -> Item {
    match typecode {
        TypeCode::Void => Item::Void,
        typecode => Item::Stack(typecode),
    }
}

impl Item {
    pub fn typecode(&self) -> TypeCode {
        match self {
            Item::Void => TypeCode::Void,
            Item::Stack(typecode)
            | Item::Local { typecode, .. }
            | Item::Indexed(typecode)
            | Item::Immediate(_, typecode) => *typecode,
            Item::This | Item::Super => TypeCode::Object,
            Item::Static(member) | Item::Member { member, .. } => member.typecode(),
            Item::Assign(lhs) => lhs.typecode(),
            Item::Cond(_) => TypeCode::Byte,
        }
    }

    /// Number of stack slots holding the operands of this item (not its value)
    pub fn width(&self) -> usize {
        match self {
            Item::Stack(typecode) => typecode.width(),
            Item::Indexed(_) => 2,
            Item::Member { .. } => 1,
            _ => 0,
        }
    }

    /// Put the value on the stack
    pub fn load(self, code: &mut CodeBuilder) -> Result<Item> {
        let typecode = self.typecode();
        match self {
            Item::Stack(_) => return Ok(self),
            Item::Local { reg, .. } => code.emit(Instruction::load(typecode, reg))?,
            Item::This | Item::Super => code.emit(Instruction::ALoad(0))?,
            Item::Static(MemberRef::Field(field)) => code.emit(Instruction::GetStatic(field))?,
            Item::Member {
                member: MemberRef::Field(field),
                ..
            } => code.emit(Instruction::GetField(field))?,
            Item::Indexed(_) => code.emit(Instruction::array_load(typecode))?,
            Item::Immediate(value, _) => code.emit(load_constant(value))?,
            Item::Assign(lhs) => {
                lhs.clone().stash(typecode, code)?;
                lhs.store(code)?;
            }
            Item::Cond(cond) => return cond.load(code),
            Item::Void | Item::Static(MemberRef::Method(_)) | Item::Member { .. } => {
                return Err(misuse(code, "load", &self))
            }
        }
        Ok(stack_item(typecode))
    }

    /// Pop the value on the stack into the item
    pub fn store(self, code: &mut CodeBuilder) -> Result<()> {
        let typecode = self.typecode();
        match self {
            Item::Local { reg, .. } => code.emit(Instruction::store(typecode, reg))?,
            Item::Static(MemberRef::Field(field)) => code.emit(Instruction::PutStatic(field))?,
            Item::Member {
                member: MemberRef::Field(field),
                ..
            } => code.emit(Instruction::PutField(field))?,
            Item::Indexed(_) => code.emit(Instruction::array_store(typecode))?,
            other => return Err(misuse(code, "store to", &other)),
        }
        Ok(())
    }

    /// Call the method, with the receiver (if any) and the arguments on the stack
    pub fn invoke(self, code: &mut CodeBuilder) -> Result<Item> {
        let typecode = self.typecode();
        let (invoke_type, method) = match self {
            Item::Static(MemberRef::Method(method)) => (InvokeType::Static, method),
            Item::Member {
                member: MemberRef::Method(method),
                nonvirtual,
            } => {
                let invoke_type = if nonvirtual {
                    InvokeType::Special
                } else if method.owner_is_interface {
                    InvokeType::Interface
                } else {
                    InvokeType::Virtual
                };
                (invoke_type, method)
            }
            other => return Err(misuse(code, "invoke", &other)),
        };
        code.emit(Instruction::Invoke(invoke_type, method))?;
        Ok(stack_item(typecode))
    }

    /// Duplicate the operands of the item (so that it can be both read and written)
    pub fn duplicate(self, code: &mut CodeBuilder) -> Result<()> {
        match self {
            Item::Stack(typecode) => code.emit(Instruction::dup(typecode.width()))?,
            Item::Indexed(_) => code.emit(Instruction::Dup2)?,
            Item::Member { .. } => code.emit(Instruction::Dup)?,
            Item::Assign(_) | Item::Cond(_) => self.load(code)?.duplicate(code)?,
            _ => (),
        }
        Ok(())
    }

    /// Discard the item (popping its operands, or completing the assignment)
    pub fn drop(self, code: &mut CodeBuilder) -> Result<()> {
        match self {
            Item::Stack(typecode) if typecode != TypeCode::Void => {
                code.emit(Instruction::pop(typecode.width()))?
            }
            Item::Indexed(_) => code.emit(Instruction::Pop2)?,
            Item::Member { .. } => code.emit(Instruction::Pop)?,
            Item::Assign(lhs) => lhs.store(code)?,
            Item::Cond(_) => self.load(code)?.drop(code)?,
            _ => (),
        }
        Ok(())
    }

    /// Copy the value of type `typecode` on top of the stack to below the item's operands
    pub fn stash(self, typecode: TypeCode, code: &mut CodeBuilder) -> Result<()> {
        let value_width = typecode.width();
        match self {
            Item::Indexed(_) => code.emit(Instruction::dup_under(value_width, 2))?,
            Item::Member { .. } => code.emit(Instruction::dup_under(value_width, 1))?,
            Item::Assign(_) | Item::Cond(_) | Item::Void => {
                return Err(misuse(code, "stash under", &self))
            }
            _ => code.emit(Instruction::dup(value_width))?,
        }
        Ok(())
    }

    /// Convert the item to a different type code
    pub fn coerce(self, typecode: TypeCode, code: &mut CodeBuilder) -> Result<Item> {
        let own = self.typecode();
        if own == typecode {
            return Ok(self);
        }
        if let Item::Immediate(value, _) = &self {
            if let Some(converted) = fold::coerce(value, typecode) {
                return Ok(Item::Immediate(converted, typecode));
            }
        }
        self.load(code)?;
        code.emit_all(Instruction::conversions(own, typecode))?;
        Ok(stack_item(typecode))
    }

    /// Turn the item into a condition (true when the value is nonzero)
    pub fn make_cond(self, code: &mut CodeBuilder) -> Result<CondItem> {
        match self {
            Item::Cond(cond) => Ok(cond),
            Item::Immediate(ConstValue::Int(value), _) => Ok(CondItem::new(if value != 0 {
                Jump::Goto
            } else {
                Jump::Never
            })),
            other => {
                other.load(code)?;
                Ok(CondItem::new(Jump::If(OrdComparison::NE)))
            }
        }
    }

    /// Add a constant to a local variable in place
    pub fn incr(self, delta: i32, code: &mut CodeBuilder) -> Result<()> {
        let (typecode, reg) = match self {
            Item::Local { typecode, reg } => (typecode, reg),
            other => return Err(misuse(code, "increment", &other)),
        };
        if typecode == TypeCode::Int {
            if let Ok(delta) = i16::try_from(delta) {
                return Ok(code.emit(Instruction::IInc(reg, delta))?);
            }
        }
        self.clone().load(code)?;
        if delta >= 0 {
            code.emit(load_constant(ConstValue::Int(delta)))?;
            code.emit(Instruction::IAdd)?;
        } else {
            code.emit(load_constant(ConstValue::Int(delta.wrapping_neg())))?;
            code.emit(Instruction::ISub)?;
        }
        Item::Stack(TypeCode::Int).coerce(typecode, code)?;
        self.store(code)
    }
}

/// Shortest instruction pushing a constant
pub fn load_constant(value: ConstValue) -> Instruction {
    match value {
        ConstValue::Int(-1) => Instruction::IConstM1,
        ConstValue::Int(0) => Instruction::IConst0,
        ConstValue::Int(1) => Instruction::IConst1,
        ConstValue::Int(2) => Instruction::IConst2,
        ConstValue::Int(3) => Instruction::IConst3,
        ConstValue::Int(4) => Instruction::IConst4,
        ConstValue::Int(5) => Instruction::IConst5,
        ConstValue::Int(i) => {
            if let Ok(i) = i8::try_from(i) {
                Instruction::BiPush(i)
            } else if let Ok(i) = i16::try_from(i) {
                Instruction::SiPush(i)
            } else {
                Instruction::Ldc(LoadableConstant::Integer(i))
            }
        }
        ConstValue::Long(0) => Instruction::LConst0,
        ConstValue::Long(1) => Instruction::LConst1,
        ConstValue::Long(l) => Instruction::Ldc(LoadableConstant::Long(l)),

        // Bit patterns, so that `-0.0` goes through the constant pool
        ConstValue::Float(f) if f.to_bits() == 0 => Instruction::FConst0,
        ConstValue::Float(f) if f == 1.0 => Instruction::FConst1,
        ConstValue::Float(f) if f == 2.0 => Instruction::FConst2,
        ConstValue::Float(f) => Instruction::Ldc(LoadableConstant::Float(f)),
        ConstValue::Double(d) if d.to_bits() == 0 => Instruction::DConst0,
        ConstValue::Double(d) if d == 1.0 => Instruction::DConst1,
        ConstValue::Double(d) => Instruction::Ldc(LoadableConstant::Double(d)),
        ConstValue::String(s) => Instruction::Ldc(LoadableConstant::String(s)),
    }
}

/// Condition as a branch instruction plus the jumps already known to go to either outcome
///
/// When the branch is taken the condition is true. `Jump::Goto` and `Jump::Never` are the
/// constantly true and false conditions.
#[derive(Clone, Debug)]
pub struct CondItem {
    pub jump: Jump,
    pub true_jumps: Option<Chain>,
    pub false_jumps: Option<Chain>,
}

impl CondItem {
    pub fn new(jump: Jump) -> CondItem {
        CondItem::with_chains(jump, None, None)
    }

    pub fn with_chains(jump: Jump, true_jumps: Option<Chain>, false_jumps: Option<Chain>) -> CondItem {
        CondItem {
            jump,
            true_jumps,
            false_jumps,
        }
    }

    /// Emit the branch taken when the condition holds, returning every jump to the true outcome
    ///
    /// This moves `true_jumps` into the result. The false jumps (if any) still have to be
    /// resolved by the caller, at the fall-through.
    pub fn jump_true(&mut self, code: &mut CodeBuilder) -> Result<Option<Chain>> {
        let branch = code.branch(self.jump)?;
        Ok(code.merge_chains(self.true_jumps.take(), branch)?)
    }

    /// Emit the branch taken when the condition doesn't hold, returning every jump to the false
    /// outcome (this moves `false_jumps` into the result)
    pub fn jump_false(&mut self, code: &mut CodeBuilder) -> Result<Option<Chain>> {
        let branch = code.branch(self.jump.negate())?;
        Ok(code.merge_chains(self.false_jumps.take(), branch)?)
    }

    pub fn negate(self) -> CondItem {
        CondItem {
            jump: self.jump.negate(),
            true_jumps: self.false_jumps,
            false_jumps: self.true_jumps,
        }
    }

    /// Is the condition constantly true?
    pub fn is_true(&self) -> bool {
        self.false_jumps.is_none() && self.jump == Jump::Goto
    }

    /// Is the condition constantly false?
    pub fn is_false(&self) -> bool {
        self.true_jumps.is_none() && self.jump == Jump::Never
    }

    /// Materialize the condition as `0` or `1` on the stack
    pub fn load(mut self, code: &mut CodeBuilder) -> Result<Item> {
        let false_chain = self.jump_false(code)?;
        let mut true_chain = None;
        if !self.is_false() {
            code.resolve(self.true_jumps.take())?;
            code.emit(Instruction::IConst1)?;
            true_chain = code.branch(Jump::Goto)?;
        }
        if false_chain.is_some() {
            code.resolve(false_chain)?;
            code.emit(Instruction::IConst0)?;
        }
        code.resolve(true_chain)?;
        Ok(Item::Stack(TypeCode::Byte))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::jvm::class_file::ConstantsPool;
    use crate::jvm::code::{CodeSettings, LocalDebugInfo};
    use crate::jvm::hierarchy::ClassGraph;
    use crate::jvm::verifier::VerificationType;
    use crate::jvm::{BinaryName, FieldType, Name, UnqualifiedName};

    const SETTINGS: CodeSettings = CodeSettings {
        emit_stack_maps: true,
        line_numbers: false,
        local_variables: false,
    };

    fn with_builder(generate: impl FnOnce(&mut CodeBuilder) -> Result<()>) -> Vec<u8> {
        let mut pool = ConstantsPool::new();
        let mut graph = ClassGraph::new();
        graph.insert_java_library_types();
        let mut code = CodeBuilder::new(
            &mut pool,
            &graph,
            BinaryName::from_string(String::from("p/A")).unwrap(),
            SETTINGS,
            false,
        );
        generate(&mut code).unwrap();
        code.code().to_vec()
    }

    fn int_local(code: &mut CodeBuilder) -> Result<u16> {
        let reg = code.new_local(VerificationType::Integer, None::<LocalDebugInfo>)?;
        code.set_defined(reg);
        Ok(reg)
    }

    #[test]
    fn immediates_pick_short_forms() {
        assert_eq!(load_constant(ConstValue::Int(5)), Instruction::IConst5);
        assert_eq!(load_constant(ConstValue::Int(-128)), Instruction::BiPush(-128));
        assert_eq!(load_constant(ConstValue::Int(300)), Instruction::SiPush(300));
        assert_eq!(
            load_constant(ConstValue::Int(70000)),
            Instruction::Ldc(LoadableConstant::Integer(70000))
        );
        assert_eq!(load_constant(ConstValue::Float(2.0)), Instruction::FConst2);
        assert_eq!(
            load_constant(ConstValue::Float(-0.0)),
            Instruction::Ldc(LoadableConstant::Float(-0.0))
        );
        assert_eq!(load_constant(ConstValue::Long(1)), Instruction::LConst1);
        assert_eq!(load_constant(ConstValue::Double(0.0)), Instruction::DConst0);
    }

    #[test]
    fn increments() {
        // iinc for small deltas on int locals, load/add/store otherwise
        let code = with_builder(|code| {
            let reg = int_local(code)?;
            let local = Item::Local {
                typecode: TypeCode::Int,
                reg,
            };
            local.clone().incr(-1, code)?;
            local.clone().incr(40000, code)?;
            local.incr(-40000, code)
        });
        assert_eq!(
            code,
            vec![
                0x84, 0, 0xff, // iinc 0, -1
                0x1a, 0x12, 1, 0x60, 0x3b, // iload_0; ldc #1; iadd; istore_0
                0x1a, 0x12, 1, 0x64, 0x3b, // iload_0; ldc #1; isub; istore_0
            ]
        );

        let code = with_builder(|code| {
            let reg = int_local(code)?;
            Item::Local {
                typecode: TypeCode::Byte,
                reg,
            }
            .incr(1, code)
        });
        assert_eq!(code, vec![0x1a, 0x04, 0x60, 0x91, 0x3b]);
    }

    #[test]
    fn assignment_value_stays_on_stack() {
        // a[i] = 7 as an expression: the stored value is copied below the array and index
        let code = with_builder(|code| {
            let array = code.new_local(
                VerificationType::Object(crate::jvm::RefType::array(FieldType::int())),
                None,
            )?;
            code.set_defined(array);
            let index = int_local(code)?;
            code.emit(Instruction::ALoad(array))?;
            code.emit(Instruction::ILoad(index))?;
            let target = Item::Indexed(TypeCode::Int);
            Item::Immediate(ConstValue::Int(7), TypeCode::Int).load(code)?;
            let loaded = Item::Assign(Box::new(target)).load(code)?;
            assert_eq!(code.state().stack_size(), 1);
            loaded.drop(code)
        });
        assert_eq!(code, vec![0x2a, 0x1b, 0x10, 7, 0x5b, 0x4f, 0x57]);
    }

    #[test]
    fn conditions_materialize() {
        let code = with_builder(|code| {
            let reg = int_local(code)?;
            Item::Local {
                typecode: TypeCode::Int,
                reg,
            }
            .make_cond(code)?
            .negate()
            .load(code)?
            .drop(code)
        });
        // iload_0; ifne +7; iconst_1; goto +4; iconst_0; pop
        assert_eq!(code, vec![0x1a, 0x9a, 0, 7, 0x04, 0xa7, 0, 4, 0x03, 0x57]);

        let code = with_builder(|code| {
            let cond = Item::Immediate(ConstValue::Int(0), TypeCode::Byte).make_cond(code)?;
            assert!(cond.is_false());
            cond.load(code)?.drop(code)
        });
        assert_eq!(code, vec![0x03, 0x57]);
    }

    #[test]
    fn member_invocation_kinds() {
        let code = with_builder(|code| {
            let method = MethodRef::virtual_method(
                BinaryName::OBJECT,
                UnqualifiedName::from_string(String::from("hashCode")).unwrap(),
                crate::jvm::MethodDescriptor {
                    parameters: vec![],
                    return_type: Some(FieldType::int()),
                },
            );
            let mut interface = method.clone();
            interface.owner_is_interface = true;
            let this = code.new_local(VerificationType::Object(crate::jvm::RefType::Object(BinaryName::OBJECT)), None)?;
            code.set_defined(this);
            for (method, nonvirtual, opcode) in [
                (method.clone(), false, 0xb6),
                (method, true, 0xb7),
                (interface, false, 0xb9),
            ] {
                let start = code.code_len();
                Item::This.load(code)?;
                let result = Item::Member {
                    member: MemberRef::Method(method),
                    nonvirtual,
                }
                .invoke(code)?;
                assert_eq!(code.code()[start + 1], opcode);
                assert_eq!(result.typecode(), TypeCode::Int);
                result.drop(code)?;
            }
            Ok(())
        });
        assert_eq!(code.last(), Some(&0x57));
    }

    #[test]
    fn coercions() {
        let code = with_builder(|code| {
            let folded = Item::Immediate(ConstValue::Int(300), TypeCode::Int).coerce(TypeCode::Byte, code)?;
            assert!(matches!(folded, Item::Immediate(ConstValue::Int(44), TypeCode::Byte)));
            let reg = int_local(code)?;
            let widened = Item::Local {
                typecode: TypeCode::Int,
                reg,
            }
            .coerce(TypeCode::Double, code)?;
            widened.coerce(TypeCode::Char, code)?.drop(code)
        });
        // iload_0; i2d; d2i; i2c; pop
        assert_eq!(code, vec![0x1a, 0x87, 0x8e, 0x92, 0x57]);
    }
}
