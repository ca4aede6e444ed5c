//! Constant folding with Java semantics
//!
//! The front-end usually annotates constant expressions already, but trees built by hand (or by
//! simpler front-ends) may not be, so operators over constant operands get folded here too.
//! Anything that isn't a constant expression in the Java sense (division by zero, string
//! equality, increments) is left alone.

use crate::jvm::code::TypeCode;
use crate::jvm::{BaseType, BinaryName, FieldType, RefType};
use crate::tree::{BinaryOp, ConstValue, Expr, ExprKind, UnaryOp};

/// Type code of an expression type (`None` being `void`)
pub fn typecode(ty: Option<&FieldType<BinaryName>>) -> TypeCode {
    TypeCode::of_return(ty)
}

/// Convert a constant as a Java cast to a type with the given type code would
pub fn coerce(value: &ConstValue, to: TypeCode) -> Option<ConstValue> {
    let converted = match to {
        TypeCode::Int => ConstValue::Int(as_int(value)?),
        TypeCode::Byte => ConstValue::Int(as_int(value)? as i8 as i32),
        TypeCode::Char => ConstValue::Int(as_int(value)? as u16 as i32),
        TypeCode::Short => ConstValue::Int(as_int(value)? as i16 as i32),
        TypeCode::Long => ConstValue::Long(as_long(value)?),
        TypeCode::Float => ConstValue::Float(as_float(value)?),
        TypeCode::Double => ConstValue::Double(as_double(value)?),
        TypeCode::Object => match value {
            ConstValue::String(string) => ConstValue::String(string.clone()),
            _ => return None,
        },
        TypeCode::Void => return None,
    };
    Some(converted)
}

fn as_int(value: &ConstValue) -> Option<i32> {
    match value {
        ConstValue::Int(i) => Some(*i),
        ConstValue::Long(l) => Some(*l as i32),
        ConstValue::Float(f) => Some(*f as i32),
        ConstValue::Double(d) => Some(*d as i32),
        ConstValue::String(_) => None,
    }
}

fn as_long(value: &ConstValue) -> Option<i64> {
    match value {
        ConstValue::Int(i) => Some(*i as i64),
        ConstValue::Long(l) => Some(*l),
        ConstValue::Float(f) => Some(*f as i64),
        ConstValue::Double(d) => Some(*d as i64),
        ConstValue::String(_) => None,
    }
}

fn as_float(value: &ConstValue) -> Option<f32> {
    match value {
        ConstValue::Int(i) => Some(*i as f32),
        ConstValue::Long(l) => Some(*l as f32),
        ConstValue::Float(f) => Some(*f),
        ConstValue::Double(d) => Some(*d as f32),
        ConstValue::String(_) => None,
    }
}

fn as_double(value: &ConstValue) -> Option<f64> {
    match value {
        ConstValue::Int(i) => Some(*i as f64),
        ConstValue::Long(l) => Some(*l as f64),
        ConstValue::Float(f) => Some(*f as f64),
        ConstValue::Double(d) => Some(*d),
        ConstValue::String(_) => None,
    }
}

/// Binary numeric promotion of two operand types
///
/// Returns `None` if either operand isn't numeric (or boolean, which promotes like `int`).
pub fn promote(left: TypeCode, right: TypeCode) -> Option<TypeCode> {
    use TypeCode::*;
    match (left.truncate(), right.truncate()) {
        (Object, _) | (_, Object) | (Void, _) | (_, Void) => None,
        (Double, _) | (_, Double) => Some(Double),
        (Float, _) | (_, Float) => Some(Float),
        (Long, _) | (_, Long) => Some(Long),
        _ => Some(Int),
    }
}

/// Constant value of an expression, if it is a constant expression
pub fn constant_of(expr: &Expr) -> Option<ConstValue> {
    if let Some(value) = expr.constant_value() {
        return retype(expr, value.clone());
    }
    let folded = match &expr.kind {
        ExprKind::Unary { op, operand } => unary(*op, operand)?,
        ExprKind::Binary { op, left, right } => binary(*op, left, right, expr.ty.as_ref())?,
        ExprKind::Cast { expr: inner } => constant_of(inner)?,
        ExprKind::Conditional {
            cond,
            then,
            otherwise,
        } => match constant_of(cond)? {
            ConstValue::Int(0) => constant_of(otherwise)?,
            ConstValue::Int(_) => constant_of(then)?,
            _ => return None,
        },
        _ => return None,
    };
    retype(expr, folded)
}

/// Bring a value to the type of the expression it is the value of (untyped values stay as is)
fn retype(expr: &Expr, value: ConstValue) -> Option<ConstValue> {
    match &expr.ty {
        None => Some(value),
        Some(ty) => coerce(&value, TypeCode::of(ty)),
    }
}

fn unary(op: UnaryOp, operand: &Expr) -> Option<ConstValue> {
    let value = constant_of(operand)?;
    let value = match (op, value) {
        (UnaryOp::Plus, value) => value,
        (UnaryOp::Neg, ConstValue::Int(i)) => ConstValue::Int(i.wrapping_neg()),
        (UnaryOp::Neg, ConstValue::Long(l)) => ConstValue::Long(l.wrapping_neg()),
        (UnaryOp::Neg, ConstValue::Float(f)) => ConstValue::Float(-f),
        (UnaryOp::Neg, ConstValue::Double(d)) => ConstValue::Double(-d),
        (UnaryOp::Compl, ConstValue::Int(i)) => ConstValue::Int(!i),
        (UnaryOp::Compl, ConstValue::Long(l)) => ConstValue::Long(!l),
        (UnaryOp::Not, ConstValue::Int(b)) => ConstValue::Int((b == 0) as i32),
        _ => return None,
    };
    Some(value)
}

fn is_string(ty: Option<&FieldType<BinaryName>>) -> bool {
    matches!(ty, Some(FieldType::Ref(RefType::Object(class))) if class == &BinaryName::STRING)
}

/// Operand rendered as by string conversion
///
/// Floating point operands aren't folded: their decimal rendering is left to the runtime.
fn string_operand(expr: &Expr) -> Option<String> {
    let value = constant_of(expr)?;
    let rendered = match (expr.ty.as_ref(), value) {
        (_, ConstValue::String(string)) => string,
        (Some(FieldType::Base(BaseType::Boolean)), ConstValue::Int(b)) => (b != 0).to_string(),
        (Some(FieldType::Base(BaseType::Char)), ConstValue::Int(c)) => {
            String::from_utf16(&[c as u16]).ok()?
        }
        (_, ConstValue::Int(i)) => i.to_string(),
        (_, ConstValue::Long(l)) => l.to_string(),
        (_, ConstValue::Float(_) | ConstValue::Double(_)) => return None,
    };
    Some(rendered)
}

fn binary(
    op: BinaryOp,
    left: &Expr,
    right: &Expr,
    ty: Option<&FieldType<BinaryName>>,
) -> Option<ConstValue> {
    if op == BinaryOp::Add && is_string(ty) {
        let mut concatenated = string_operand(left)?;
        concatenated.push_str(&string_operand(right)?);
        return Some(ConstValue::String(concatenated));
    }

    let left_code = typecode(left.ty.as_ref());
    let right_code = typecode(right.ty.as_ref());
    let lhs = constant_of(left)?;
    let rhs = constant_of(right)?;

    if op.is_shift() {
        let shift = as_int(&rhs)?;
        return match coerce(&lhs, left_code.truncate())? {
            ConstValue::Int(l) => Some(ConstValue::Int(shift_int(op, l, shift))),
            ConstValue::Long(l) => Some(ConstValue::Long(shift_long(op, l, shift))),
            _ => None,
        };
    }

    let operand_code = promote(left_code, right_code)?;
    let lhs = coerce(&lhs, operand_code)?;
    let rhs = coerce(&rhs, operand_code)?;
    if op.is_comparison() {
        return compare(op, &lhs, &rhs).map(|b| ConstValue::Int(b as i32));
    }
    match (lhs, rhs) {
        (ConstValue::Int(l), ConstValue::Int(r)) => int_op(op, l, r).map(ConstValue::Int),
        (ConstValue::Long(l), ConstValue::Long(r)) => long_op(op, l, r).map(ConstValue::Long),
        (ConstValue::Float(l), ConstValue::Float(r)) => {
            float_op(op, l as f64, r as f64).map(|f| ConstValue::Float(f as f32))
        }
        (ConstValue::Double(l), ConstValue::Double(r)) => float_op(op, l, r).map(ConstValue::Double),
        _ => None,
    }
}

fn shift_int(op: BinaryOp, value: i32, shift: i32) -> i32 {
    let shift = (shift & 31) as u32;
    match op {
        BinaryOp::Shl => value.wrapping_shl(shift),
        BinaryOp::Shr => value >> shift,
        _ => ((value as u32) >> shift) as i32,
    }
}

fn shift_long(op: BinaryOp, value: i64, shift: i32) -> i64 {
    let shift = (shift & 63) as u32;
    match op {
        BinaryOp::Shl => value.wrapping_shl(shift),
        BinaryOp::Shr => value >> shift,
        _ => ((value as u64) >> shift) as i64,
    }
}

fn int_op(op: BinaryOp, l: i32, r: i32) -> Option<i32> {
    let value = match op {
        BinaryOp::Add => l.wrapping_add(r),
        BinaryOp::Sub => l.wrapping_sub(r),
        BinaryOp::Mul => l.wrapping_mul(r),
        BinaryOp::Div if r != 0 => l.wrapping_div(r),
        BinaryOp::Rem if r != 0 => l.wrapping_rem(r),
        BinaryOp::And | BinaryOp::CondAnd => l & r,
        BinaryOp::Or | BinaryOp::CondOr => l | r,
        BinaryOp::Xor => l ^ r,
        _ => return None,
    };
    Some(value)
}

fn long_op(op: BinaryOp, l: i64, r: i64) -> Option<i64> {
    let value = match op {
        BinaryOp::Add => l.wrapping_add(r),
        BinaryOp::Sub => l.wrapping_sub(r),
        BinaryOp::Mul => l.wrapping_mul(r),
        BinaryOp::Div if r != 0 => l.wrapping_div(r),
        BinaryOp::Rem if r != 0 => l.wrapping_rem(r),
        BinaryOp::And => l & r,
        BinaryOp::Or => l | r,
        BinaryOp::Xor => l ^ r,
        _ => return None,
    };
    Some(value)
}

fn float_op(op: BinaryOp, l: f64, r: f64) -> Option<f64> {
    let value = match op {
        BinaryOp::Add => l + r,
        BinaryOp::Sub => l - r,
        BinaryOp::Mul => l * r,
        BinaryOp::Div => l / r,
        BinaryOp::Rem => l % r,
        _ => return None,
    };
    Some(value)
}

fn compare(op: BinaryOp, lhs: &ConstValue, rhs: &ConstValue) -> Option<bool> {
    fn apply<T: PartialOrd>(op: BinaryOp, l: T, r: T) -> Option<bool> {
        Some(match op {
            BinaryOp::Eq => l == r,
            BinaryOp::Ne => l != r,
            BinaryOp::Lt => l < r,
            BinaryOp::Le => l <= r,
            BinaryOp::Gt => l > r,
            BinaryOp::Ge => l >= r,
            _ => return None,
        })
    }
    match (lhs, rhs) {
        (ConstValue::Int(l), ConstValue::Int(r)) => apply(op, l, r),
        (ConstValue::Long(l), ConstValue::Long(r)) => apply(op, l, r),
        (ConstValue::Float(l), ConstValue::Float(r)) => apply(op, l, r),
        (ConstValue::Double(l), ConstValue::Double(r)) => apply(op, l, r),
        _ => None,
    }
}
