use super::fold;
use super::items::{load_constant, stack_item, CondItem, Item, MemberRef};
use super::method::{check_dimensions, MethodGen, Result};
use super::Error;
use crate::jvm::class_file::LoadableConstant;
use crate::jvm::code::{
    CompareMode, EqComparison, Instruction, InvokeType, Jump, OrdComparison, ShiftType, TypeCode,
    VType,
};
use crate::jvm::{
    BinaryName, FieldRef, FieldType, MethodDescriptor, MethodRef, Name, RefType,
    RenderDescriptor, UnqualifiedName,
};
use crate::tree::{BinaryOp, ConstValue, Expr, ExprKind, Receiver, UnaryOp};

impl<'a, 't> MethodGen<'a, 't> {
    /// Translate an expression and convert the result to `typecode`
    pub(super) fn gen_expr(&mut self, expr: &Expr, typecode: TypeCode) -> Result<Item> {
        let item = self.gen_item(expr)?;
        item.coerce(typecode, &mut self.code)
    }

    /// Translate an expression, leaving it as an item of its own type
    pub(super) fn gen_item(&mut self, expr: &Expr) -> Result<Item> {
        if let Some(value) = fold::constant_of(expr) {
            let typecode = match &expr.ty {
                Some(ty) => TypeCode::of(ty),
                None => constant_typecode(&value),
            };
            return Ok(Item::Immediate(value, typecode));
        }
        let typecode = fold::typecode(expr.ty.as_ref());
        match &expr.kind {
            ExprKind::Literal { value } => Ok(Item::Immediate(value.clone(), typecode)),
            ExprKind::Null => {
                self.code.emit(Instruction::AConstNull)?;
                Ok(Item::Stack(TypeCode::Object))
            }
            ExprKind::Local { var } => self.local_item(*var),
            ExprKind::This => Ok(Item::This),
            ExprKind::Field { receiver, field } => self.gen_field(receiver, field),
            ExprKind::Invoke {
                receiver,
                method,
                args,
            } => self.gen_invoke(receiver, method, args),
            ExprKind::New { constructor, args } => {
                self.code.emit(Instruction::New(constructor.owner.clone()))?;
                self.code.emit(Instruction::Dup)?;
                self.gen_args(&constructor.descriptor, args)?;
                Item::Member {
                    member: MemberRef::Method(constructor.clone()),
                    nonvirtual: true,
                }
                .invoke(&mut self.code)?;
                Ok(Item::Stack(TypeCode::Object))
            }
            ExprKind::NewArray { dims, elems } => self.gen_new_array(expr, dims, elems.as_deref()),
            ExprKind::ArrayLength { array } => {
                self.gen_expr(array, TypeCode::Object)?.load(&mut self.code)?;
                self.code.emit(Instruction::ArrayLength)?;
                Ok(Item::Stack(TypeCode::Int))
            }
            ExprKind::Index { array, index } => {
                self.gen_expr(array, TypeCode::Object)?.load(&mut self.code)?;
                self.gen_expr(index, TypeCode::Int)?.load(&mut self.code)?;
                Ok(Item::Indexed(typecode))
            }
            ExprKind::Assign { target, value } => {
                let lhs = self.gen_item(target)?;
                self.gen_expr(value, lhs.typecode())?.load(&mut self.code)?;
                if let (true, Some(ty)) = (value.is_null(), &target.ty) {
                    self.code.state_mut().force_stack_top(VType::from(ty.clone()));
                }
                Ok(Item::Assign(Box::new(lhs)))
            }
            ExprKind::CompoundAssign { op, target, value } => {
                self.gen_compound_assign(*op, target, value)
            }
            ExprKind::Unary { op, operand } => self.gen_unary(expr, *op, operand),
            ExprKind::Binary { op, left, right } => self.gen_binary(expr, *op, left, right),
            ExprKind::Conditional {
                cond,
                then,
                otherwise,
            } => {
                let mut cond = self.gen_cond(cond)?;
                let else_chain = cond.jump_false(&mut self.code)?;
                let mut then_exit = None;
                if !cond.is_false() {
                    self.code.resolve(cond.true_jumps.take())?;
                    self.gen_expr(then, typecode)?.load(&mut self.code)?;
                    self.force_expr_type(expr);
                    then_exit = self.code.branch(Jump::Goto)?;
                }
                if else_chain.is_some() {
                    self.code.resolve(else_chain)?;
                    self.gen_expr(otherwise, typecode)?.load(&mut self.code)?;
                    self.force_expr_type(expr);
                }
                self.code.resolve(then_exit)?;
                Ok(stack_item(typecode))
            }
            ExprKind::Cast { expr: inner } => {
                let result = self.gen_expr(inner, typecode)?.load(&mut self.code)?;
                if let (Some(FieldType::Ref(target)), false) = (&expr.ty, inner.is_null()) {
                    let statically_ok = match &inner.ty {
                        Some(FieldType::Ref(source)) => {
                            self.code.hierarchy().is_assignable(source, target)
                        }
                        _ => false,
                    };
                    if !statically_ok {
                        self.code.emit(Instruction::CheckCast(target.clone()))?;
                    }
                }
                Ok(result)
            }
            ExprKind::InstanceOf { expr: inner, class } => {
                self.gen_expr(inner, TypeCode::Object)?.load(&mut self.code)?;
                self.code.emit(Instruction::InstanceOf(class.clone()))?;
                Ok(Item::Stack(TypeCode::Byte))
            }
            ExprKind::ClassLiteral { class } => {
                self.gen_class_literal(class.as_ref())?;
                Ok(Item::Stack(TypeCode::Object))
            }
        }
    }

    /// Translate an expression in a position where only its truth matters
    pub(super) fn gen_cond(&mut self, expr: &Expr) -> Result<CondItem> {
        if let (None, ExprKind::Conditional { cond, then, otherwise }) =
            (fold::constant_of(expr), &expr.kind)
        {
            let mut cond = self.gen_cond(cond)?;
            if cond.is_true() {
                self.code.resolve(cond.true_jumps.take())?;
                return self.gen_cond(then);
            }
            if cond.is_false() {
                self.code.resolve(cond.false_jumps.take())?;
                return self.gen_cond(otherwise);
            }
            let second_jumps = cond.jump_false(&mut self.code)?;
            self.code.resolve(cond.true_jumps.take())?;
            let mut first = self.gen_cond(then)?;
            let false_jumps = first.jump_false(&mut self.code)?;
            self.code.resolve(first.true_jumps.take())?;
            let true_jumps = self.code.branch(Jump::Goto)?;
            self.code.resolve(second_jumps)?;
            let second = self.gen_cond(otherwise)?;
            let true_jumps = self.code.merge_chains(true_jumps, second.true_jumps)?;
            let false_jumps = self.code.merge_chains(false_jumps, second.false_jumps)?;
            return Ok(CondItem::with_chains(second.jump, true_jumps, false_jumps));
        }
        self.gen_expr(expr, TypeCode::Byte)?.make_cond(&mut self.code)
    }

    /// After merging two branches that pushed different reference types, the stack holds a value
    /// of the expression's declared type
    fn force_expr_type(&mut self, expr: &Expr) {
        if let Some(ty @ FieldType::Ref(_)) = &expr.ty {
            self.code.state_mut().force_stack_top(VType::from(ty.clone()));
        }
    }

    fn gen_receiver(&mut self, receiver: &Receiver) -> Result<()> {
        match receiver {
            Receiver::Implicit | Receiver::This => {
                Item::This.load(&mut self.code)?;
            }
            Receiver::Super => {
                Item::Super.load(&mut self.code)?;
            }
            Receiver::Expr(expr) => {
                self.gen_expr(expr, TypeCode::Object)?.load(&mut self.code)?;
            }
        }
        Ok(())
    }

    /// A static member accessed through an instance still evaluates the instance
    fn gen_discarded_receiver(&mut self, receiver: &Receiver) -> Result<()> {
        if let Receiver::Expr(expr) = receiver {
            let value = self.gen_item(expr)?.load(&mut self.code)?;
            value.drop(&mut self.code)?;
        }
        Ok(())
    }

    fn gen_field(&mut self, receiver: &Receiver, field: &FieldRef) -> Result<Item> {
        let member = MemberRef::Field(field.clone());
        if field.is_static {
            self.gen_discarded_receiver(receiver)?;
            return Ok(Item::Static(member));
        }
        self.gen_receiver(receiver)?;
        Ok(Item::Member {
            member,
            nonvirtual: false,
        })
    }

    fn gen_invoke(&mut self, receiver: &Receiver, method: &MethodRef, args: &[Expr]) -> Result<Item> {
        let member = MemberRef::Method(method.clone());
        let item = if method.is_static {
            self.gen_discarded_receiver(receiver)?;
            Item::Static(member)
        } else {
            self.gen_receiver(receiver)?;
            let nonvirtual = matches!(receiver, Receiver::Super)
                || method.is_constructor()
                || (method.is_private && !self.settings.virtual_private_calls());
            Item::Member { member, nonvirtual }
        };
        self.gen_args(&method.descriptor, args)?;
        item.invoke(&mut self.code)
    }

    fn gen_args(&mut self, descriptor: &MethodDescriptor<BinaryName>, args: &[Expr]) -> Result<()> {
        if descriptor.parameters.len() != args.len() {
            return Err(Error::malformed(format!(
                "{} arguments passed to a method taking {}",
                args.len(),
                descriptor.parameters.len()
            )));
        }
        for (param, arg) in descriptor.parameters.iter().zip(args) {
            self.gen_expr(arg, TypeCode::of(param))?.load(&mut self.code)?;
        }
        Ok(())
    }

    fn gen_new_array(&mut self, expr: &Expr, dims: &[Expr], elems: Option<&[Expr]>) -> Result<Item> {
        let array_type = match &expr.ty {
            Some(FieldType::Ref(ty)) if ty.dimensions() > 0 => ty.clone(),
            other => {
                return Err(Error::malformed(format!(
                    "array creation of non-array type {:?}",
                    other
                )))
            }
        };

        if let Some(elems) = elems {
            let elem_typecode = array_type.element_type().map_or(TypeCode::Object, |ty| TypeCode::of(&ty));
            self.code.emit(load_constant(ConstValue::Int(array_length(elems.len())?)))?;
            self.make_new_array(&array_type, 1)?;
            for (index, elem) in elems.iter().enumerate() {
                self.code.emit(Instruction::Dup)?;
                self.code.emit(load_constant(ConstValue::Int(array_length(index)?)))?;
                self.gen_expr(elem, elem_typecode)?.load(&mut self.code)?;
                self.code.emit(Instruction::array_store(elem_typecode))?;
            }
            return Ok(Item::Stack(TypeCode::Object));
        }

        if dims.is_empty() {
            return Err(Error::malformed("array creation without dimensions or initializer"));
        }
        for dim in dims {
            self.gen_expr(dim, TypeCode::Int)?.load(&mut self.code)?;
        }
        self.make_new_array(&array_type, dims.len())?;
        Ok(Item::Stack(TypeCode::Object))
    }

    /// Emit the array creation instruction, with the `ndims` dimension lengths on the stack
    fn make_new_array(&mut self, array_type: &RefType<BinaryName>, ndims: usize) -> Result<()> {
        check_dimensions(&FieldType::Ref(array_type.clone()))?;
        let insn = match array_type.element_type() {
            Some(FieldType::Base(base)) => Instruction::NewArray(base),
            Some(FieldType::Ref(elem)) if ndims == 1 => Instruction::ANewArray(elem),
            Some(_) => {
                let ndims = u8::try_from(ndims)
                    .map_err(|_| crate::jvm::Error::TooManyDimensions(ndims))?;
                Instruction::MultiANewArray(array_type.clone(), ndims)
            }
            None => return Err(Error::malformed("array creation of non-array type")),
        };
        self.code.emit(insn)?;
        Ok(())
    }

    fn gen_compound_assign(&mut self, op: BinaryOp, target: &Expr, value: &Expr) -> Result<Item> {
        let target_typecode = fold::typecode(target.ty.as_ref());
        if op == BinaryOp::Add && target_typecode == TypeCode::Object {
            return self.gen_concat_assign(target, value);
        }

        let lhs = self.gen_item(target)?;
        if let (Item::Local { typecode, .. }, BinaryOp::Add | BinaryOp::Sub) = (&lhs, op) {
            let value_typecode = fold::typecode(value.ty.as_ref());
            if typecode.truncate() == TypeCode::Int && is_int_subrange(value_typecode) {
                if let Some(ConstValue::Int(delta)) = fold::constant_of(value) {
                    let delta = if op == BinaryOp::Sub {
                        delta.wrapping_neg()
                    } else {
                        delta
                    };
                    lhs.clone().incr(delta, &mut self.code)?;
                    return Ok(lhs);
                }
            }
        }

        let operand_typecode = operand_typecode(op, target, value)?;
        lhs.clone().duplicate(&mut self.code)?;
        lhs.clone()
            .coerce(operand_typecode, &mut self.code)?
            .load(&mut self.code)?;
        self.complete_binop(op, operand_typecode, value)?
            .coerce(target_typecode, &mut self.code)?
            .load(&mut self.code)?;
        Ok(Item::Assign(Box::new(lhs)))
    }

    pub(super) fn gen_unary(&mut self, expr: &Expr, op: UnaryOp, operand: &Expr) -> Result<Item> {
        let typecode = fold::typecode(expr.ty.as_ref());
        match op {
            UnaryOp::Not => Ok(Item::Cond(self.gen_cond(operand)?.negate())),
            UnaryOp::Plus => self.gen_expr(operand, typecode)?.load(&mut self.code),
            UnaryOp::Neg => {
                self.gen_expr(operand, typecode)?.load(&mut self.code)?;
                let insn = match typecode.truncate() {
                    TypeCode::Int => Instruction::INeg,
                    TypeCode::Long => Instruction::LNeg,
                    TypeCode::Float => Instruction::FNeg,
                    TypeCode::Double => Instruction::DNeg,
                    other => return Err(bad_operand("negate", other)),
                };
                self.code.emit(insn)?;
                Ok(stack_item(typecode))
            }
            UnaryOp::Compl => {
                self.gen_expr(operand, typecode)?.load(&mut self.code)?;
                match typecode.truncate() {
                    TypeCode::Int => self.code.emit_all([Instruction::IConstM1, Instruction::IXor])?,
                    TypeCode::Long => self.code.emit_all([
                        Instruction::Ldc(LoadableConstant::Long(-1)),
                        Instruction::LXor,
                    ])?,
                    other => return Err(bad_operand("complement", other)),
                }
                Ok(stack_item(typecode))
            }
            UnaryOp::PreInc | UnaryOp::PreDec => {
                let delta = if op == UnaryOp::PreInc { 1 } else { -1 };
                let od = self.gen_item(operand)?;
                let od_typecode = od.typecode();
                if matches!(od, Item::Local { .. }) && od_typecode.truncate() == TypeCode::Int {
                    od.clone().incr(delta, &mut self.code)?;
                    return Ok(od);
                }
                od.clone().duplicate(&mut self.code)?;
                od.clone().load(&mut self.code)?;
                self.add_one(od_typecode, delta)?;
                Ok(Item::Assign(Box::new(od)))
            }
            UnaryOp::PostInc | UnaryOp::PostDec => {
                let delta = if op == UnaryOp::PostInc { 1 } else { -1 };
                let od = self.gen_item(operand)?;
                let od_typecode = od.typecode();
                od.clone().duplicate(&mut self.code)?;
                if matches!(od, Item::Local { .. }) && od_typecode.truncate() == TypeCode::Int {
                    let result = od.clone().load(&mut self.code)?;
                    od.incr(delta, &mut self.code)?;
                    return Ok(result);
                }
                // The old value stays below the operands of the item, as the result
                let result = od.clone().load(&mut self.code)?;
                od.clone().stash(od_typecode, &mut self.code)?;
                self.add_one(od_typecode, delta)?;
                od.store(&mut self.code)?;
                Ok(result)
            }
        }
    }

    /// Add `delta` (plus or minus one) to the value on the stack, narrowing the result back
    fn add_one(&mut self, typecode: TypeCode, delta: i32) -> Result<()> {
        let (one, add, sub) = match typecode.truncate() {
            TypeCode::Int => (Instruction::IConst1, Instruction::IAdd, Instruction::ISub),
            TypeCode::Long => (Instruction::LConst1, Instruction::LAdd, Instruction::LSub),
            TypeCode::Float => (Instruction::FConst1, Instruction::FAdd, Instruction::FSub),
            TypeCode::Double => (Instruction::DConst1, Instruction::DAdd, Instruction::DSub),
            other => return Err(bad_operand("increment", other)),
        };
        self.code.emit(one)?;
        self.code.emit(if delta > 0 { add } else { sub })?;
        if typecode != TypeCode::Int && typecode.truncate() == TypeCode::Int {
            self.code.emit_all(Instruction::conversions(TypeCode::Int, typecode))?;
        }
        Ok(())
    }

    fn gen_binary(&mut self, expr: &Expr, op: BinaryOp, left: &Expr, right: &Expr) -> Result<Item> {
        match op {
            BinaryOp::CondAnd => {
                let mut lcond = self.gen_cond(left)?;
                if lcond.is_false() {
                    return Ok(Item::Cond(lcond));
                }
                let false_jumps = lcond.jump_false(&mut self.code)?;
                self.code.resolve(lcond.true_jumps.take())?;
                let rcond = self.gen_cond(right)?;
                let false_jumps = self.code.merge_chains(false_jumps, rcond.false_jumps)?;
                Ok(Item::Cond(CondItem::with_chains(rcond.jump, rcond.true_jumps, false_jumps)))
            }
            BinaryOp::CondOr => {
                let mut lcond = self.gen_cond(left)?;
                if lcond.is_true() {
                    return Ok(Item::Cond(lcond));
                }
                let true_jumps = lcond.jump_true(&mut self.code)?;
                self.code.resolve(lcond.false_jumps.take())?;
                let rcond = self.gen_cond(right)?;
                let true_jumps = self.code.merge_chains(true_jumps, rcond.true_jumps)?;
                Ok(Item::Cond(CondItem::with_chains(rcond.jump, true_jumps, rcond.false_jumps)))
            }
            BinaryOp::Add if is_string(expr) => {
                self.new_string_builder()?;
                self.append_strings(expr)?;
                self.builder_to_string()
            }
            _ => {
                let operand_typecode = operand_typecode(op, left, right)?;
                self.gen_expr(left, operand_typecode)?.load(&mut self.code)?;
                self.complete_binop(op, operand_typecode, right)
            }
        }
    }

    /// With the left operand on the stack, evaluate the right one and apply the operator
    fn complete_binop(&mut self, op: BinaryOp, operand_typecode: TypeCode, right: &Expr) -> Result<Item> {
        if op.is_comparison() {
            let jump = match operand_typecode.truncate() {
                TypeCode::Int => {
                    if fold::constant_of(right) == Some(ConstValue::Int(0)) {
                        Jump::If(ord_comparison(op))
                    } else {
                        self.gen_expr(right, TypeCode::Int)?.load(&mut self.code)?;
                        Jump::IfICmp(ord_comparison(op))
                    }
                }
                TypeCode::Long => {
                    self.gen_expr(right, TypeCode::Long)?.load(&mut self.code)?;
                    self.code.emit(Instruction::LCmp)?;
                    Jump::If(ord_comparison(op))
                }
                TypeCode::Float => {
                    self.gen_expr(right, TypeCode::Float)?.load(&mut self.code)?;
                    self.code.emit(Instruction::FCmp(compare_mode(op)))?;
                    Jump::If(ord_comparison(op))
                }
                TypeCode::Double => {
                    self.gen_expr(right, TypeCode::Double)?.load(&mut self.code)?;
                    self.code.emit(Instruction::DCmp(compare_mode(op)))?;
                    Jump::If(ord_comparison(op))
                }
                TypeCode::Object => {
                    let comparison = match op {
                        BinaryOp::Eq => EqComparison::EQ,
                        BinaryOp::Ne => EqComparison::NE,
                        _ => return Err(bad_operand("order", TypeCode::Object)),
                    };
                    if right.is_null() {
                        Jump::IfNull(comparison)
                    } else {
                        self.gen_expr(right, TypeCode::Object)?.load(&mut self.code)?;
                        Jump::IfACmp(comparison)
                    }
                }
                other => return Err(bad_operand("compare", other)),
            };
            return Ok(Item::Cond(CondItem::new(jump)));
        }

        let right_typecode = if op.is_shift() {
            TypeCode::Int
        } else {
            operand_typecode
        };
        self.gen_expr(right, right_typecode)?.load(&mut self.code)?;
        self.code.emit(arithmetic(op, operand_typecode.truncate())?)?;
        Ok(stack_item(operand_typecode))
    }

    fn new_string_builder(&mut self) -> Result<()> {
        self.code.emit(Instruction::New(BinaryName::STRINGBUILDER))?;
        self.code.emit(Instruction::Dup)?;
        let init = MethodRef::constructor(BinaryName::STRINGBUILDER, vec![]);
        self.code.emit(Instruction::Invoke(InvokeType::Special, init))?;
        Ok(())
    }

    /// Append every operand of a (nested) string concatenation
    fn append_strings(&mut self, expr: &Expr) -> Result<()> {
        let mut operands = vec![];
        collect_concat_operands(expr, &mut operands);
        for operand in operands {
            let param = append_parameter(operand.ty.as_ref());
            self.gen_expr(operand, TypeCode::of(&param))?.load(&mut self.code)?;
            self.append(param)?;
        }
        Ok(())
    }

    /// Call the `StringBuilder.append` overload taking `param`
    fn append(&mut self, param: FieldType<BinaryName>) -> Result<()> {
        let method = MethodRef::virtual_method(
            BinaryName::STRINGBUILDER,
            UnqualifiedName::APPEND,
            MethodDescriptor {
                parameters: vec![param],
                return_type: Some(FieldType::object(BinaryName::STRINGBUILDER)),
            },
        );
        self.code.emit(Instruction::Invoke(InvokeType::Virtual, method))?;
        Ok(())
    }

    fn builder_to_string(&mut self) -> Result<Item> {
        let method = MethodRef::virtual_method(
            BinaryName::STRINGBUILDER,
            UnqualifiedName::TOSTRING,
            MethodDescriptor {
                parameters: vec![],
                return_type: Some(FieldType::object(BinaryName::STRING)),
            },
        );
        self.code.emit(Instruction::Invoke(InvokeType::Virtual, method))?;
        Ok(Item::Stack(TypeCode::Object))
    }

    /// `s += x`, building the new string out of the old one
    fn gen_concat_assign(&mut self, target: &Expr, value: &Expr) -> Result<Item> {
        self.new_string_builder()?;
        let lhs = self.gen_item(target)?;
        let width = lhs.width();
        if width > 0 {
            // Receiver (or array and index) below the builder, for the final store
            self.code.emit(Instruction::dup_under(width, 1))?;
        }
        lhs.clone().load(&mut self.code)?;
        self.append(append_parameter(target.ty.as_ref()))?;
        self.append_strings(value)?;
        self.builder_to_string()?;
        Ok(Item::Assign(Box::new(lhs)))
    }

    fn gen_class_literal(&mut self, class: Option<&FieldType<BinaryName>>) -> Result<()> {
        let class_type = FieldType::object(BinaryName::CLASS);
        match class {
            None => self.code.emit(Instruction::GetStatic(FieldRef::new(
                BinaryName::VOID,
                UnqualifiedName::TYPE,
                class_type,
                true,
            )))?,
            Some(FieldType::Base(base)) => self.code.emit(Instruction::GetStatic(FieldRef::new(
                base.box_class(),
                UnqualifiedName::TYPE,
                class_type,
                true,
            )))?,
            Some(FieldType::Ref(ref_type)) if self.settings.ldc_class_literals() => self
                .code
                .emit(Instruction::Ldc(LoadableConstant::Class(ref_type.clone())))?,
            Some(FieldType::Ref(ref_type)) => {
                // `Class.forName` takes the name that `Class.getName` would return
                let name = match ref_type {
                    RefType::Object(name) => name.as_str().replace('/', "."),
                    array => array.render().replace('/', "."),
                };
                let for_name = MethodRef {
                    owner: BinaryName::CLASS,
                    name: UnqualifiedName::FORNAME,
                    descriptor: MethodDescriptor {
                        parameters: vec![FieldType::object(BinaryName::STRING)],
                        return_type: Some(class_type),
                    },
                    is_static: true,
                    owner_is_interface: false,
                    is_private: false,
                };
                self.code.emit(Instruction::Ldc(LoadableConstant::String(name)))?;
                self.code.emit(Instruction::Invoke(InvokeType::Static, for_name))?;
            }
        }
        Ok(())
    }
}

fn constant_typecode(value: &ConstValue) -> TypeCode {
    match value {
        ConstValue::Int(_) => TypeCode::Int,
        ConstValue::Long(_) => TypeCode::Long,
        ConstValue::Float(_) => TypeCode::Float,
        ConstValue::Double(_) => TypeCode::Double,
        ConstValue::String(_) => TypeCode::Object,
    }
}

fn is_int_subrange(typecode: TypeCode) -> bool {
    matches!(
        typecode,
        TypeCode::Int | TypeCode::Short | TypeCode::Char | TypeCode::Byte
    )
}

fn is_string(expr: &Expr) -> bool {
    matches!(&expr.ty, Some(FieldType::Ref(RefType::Object(class))) if class == &BinaryName::STRING)
}

fn array_length(length: usize) -> Result<i32> {
    i32::try_from(length).map_err(|_| Error::malformed("array initializer too long"))
}

fn bad_operand(operation: &str, typecode: TypeCode) -> Error {
    Error::malformed(format!("cannot {} a {:?} operand", operation, typecode))
}

/// Type code both operands of a binary operator are converted to
fn operand_typecode(op: BinaryOp, left: &Expr, right: &Expr) -> Result<TypeCode> {
    let left_typecode = fold::typecode(left.ty.as_ref());
    let right_typecode = fold::typecode(right.ty.as_ref());
    if left.is_boolean() && right.is_boolean() {
        return Ok(TypeCode::Byte);
    }
    let promoted = if op.is_shift() {
        fold::promote(left_typecode, left_typecode)
    } else if left.is_null()
        || right.is_null()
        || left_typecode == TypeCode::Object
        || right_typecode == TypeCode::Object
    {
        Some(TypeCode::Object)
    } else {
        fold::promote(left_typecode, right_typecode)
    };
    promoted.ok_or_else(|| bad_operand("combine", left_typecode))
}

fn ord_comparison(op: BinaryOp) -> OrdComparison {
    match op {
        BinaryOp::Eq => OrdComparison::EQ,
        BinaryOp::Ne => OrdComparison::NE,
        BinaryOp::Lt => OrdComparison::LT,
        BinaryOp::Le => OrdComparison::LE,
        BinaryOp::Gt => OrdComparison::GT,
        _ => OrdComparison::GE,
    }
}

/// `fcmpg`/`dcmpg` push 1 on NaN, which makes `<` and `<=` false
fn compare_mode(op: BinaryOp) -> CompareMode {
    match op {
        BinaryOp::Lt | BinaryOp::Le => CompareMode::G,
        _ => CompareMode::L,
    }
}

fn arithmetic(op: BinaryOp, typecode: TypeCode) -> Result<Instruction> {
    use Instruction::*;
    let insn = match (op, typecode) {
        (BinaryOp::Add, TypeCode::Int) => IAdd,
        (BinaryOp::Add, TypeCode::Long) => LAdd,
        (BinaryOp::Add, TypeCode::Float) => FAdd,
        (BinaryOp::Add, TypeCode::Double) => DAdd,
        (BinaryOp::Sub, TypeCode::Int) => ISub,
        (BinaryOp::Sub, TypeCode::Long) => LSub,
        (BinaryOp::Sub, TypeCode::Float) => FSub,
        (BinaryOp::Sub, TypeCode::Double) => DSub,
        (BinaryOp::Mul, TypeCode::Int) => IMul,
        (BinaryOp::Mul, TypeCode::Long) => LMul,
        (BinaryOp::Mul, TypeCode::Float) => FMul,
        (BinaryOp::Mul, TypeCode::Double) => DMul,
        (BinaryOp::Div, TypeCode::Int) => IDiv,
        (BinaryOp::Div, TypeCode::Long) => LDiv,
        (BinaryOp::Div, TypeCode::Float) => FDiv,
        (BinaryOp::Div, TypeCode::Double) => DDiv,
        (BinaryOp::Rem, TypeCode::Int) => IRem,
        (BinaryOp::Rem, TypeCode::Long) => LRem,
        (BinaryOp::Rem, TypeCode::Float) => FRem,
        (BinaryOp::Rem, TypeCode::Double) => DRem,
        (BinaryOp::Shl, TypeCode::Int) => ISh(ShiftType::Left),
        (BinaryOp::Shl, TypeCode::Long) => LSh(ShiftType::Left),
        (BinaryOp::Shr, TypeCode::Int) => ISh(ShiftType::ArithmeticRight),
        (BinaryOp::Shr, TypeCode::Long) => LSh(ShiftType::ArithmeticRight),
        (BinaryOp::Ushr, TypeCode::Int) => ISh(ShiftType::LogicalRight),
        (BinaryOp::Ushr, TypeCode::Long) => LSh(ShiftType::LogicalRight),
        (BinaryOp::And, TypeCode::Int) => IAnd,
        (BinaryOp::And, TypeCode::Long) => LAnd,
        (BinaryOp::Or, TypeCode::Int) => IOr,
        (BinaryOp::Or, TypeCode::Long) => LOr,
        (BinaryOp::Xor, TypeCode::Int) => IXor,
        (BinaryOp::Xor, TypeCode::Long) => LXor,
        (op, typecode) => {
            return Err(Error::malformed(format!(
                "no {:?} instruction for {:?} operands",
                op, typecode
            )))
        }
    };
    Ok(insn)
}

/// Flatten `a + b + c` (all strings) into its operands, keeping constant parts whole
fn collect_concat_operands<'e>(expr: &'e Expr, operands: &mut Vec<&'e Expr>) {
    match &expr.kind {
        ExprKind::Binary {
            op: BinaryOp::Add,
            left,
            right,
        } if is_string(expr) && fold::constant_of(expr).is_none() => {
            collect_concat_operands(left, operands);
            collect_concat_operands(right, operands);
        }
        _ => operands.push(expr),
    }
}

/// Parameter type of the `StringBuilder.append` overload for a value of the given type
fn append_parameter(ty: Option<&FieldType<BinaryName>>) -> FieldType<BinaryName> {
    use crate::jvm::BaseType;
    match ty {
        Some(FieldType::Base(BaseType::Boolean)) => FieldType::boolean(),
        Some(FieldType::Base(BaseType::Char)) => FieldType::char(),
        Some(FieldType::Base(BaseType::Byte | BaseType::Short | BaseType::Int)) => FieldType::int(),
        Some(FieldType::Base(BaseType::Long)) => FieldType::long(),
        Some(FieldType::Base(BaseType::Float)) => FieldType::float(),
        Some(FieldType::Base(BaseType::Double)) => FieldType::double(),
        Some(string) if is_string_type(string) => string.clone(),
        _ => FieldType::object(BinaryName::OBJECT),
    }
}

fn is_string_type(ty: &FieldType<BinaryName>) -> bool {
    matches!(ty, FieldType::Ref(RefType::Object(class)) if class == &BinaryName::STRING)
}
