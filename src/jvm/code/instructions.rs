use crate::jvm::class_file::{ConstantIndex, ConstantsPool, ConstantsWriter, LoadableConstant};
use crate::jvm::{BaseType, BinaryName, Error, FieldRef, FieldType, MethodRef, RefType};
use crate::util::Width;
use std::convert::TryFrom;
use std::ops::Not;

/// `wide` prefix, for locals past 255 and large `iinc` deltas
pub const WIDE: u8 = 0xc4;
pub const GOTO: u8 = 0xa7;
pub const JSR: u8 = 0xa8;
pub const GOTO_W: u8 = 0xc8;
pub const JSR_W: u8 = 0xc9;
pub const TABLESWITCH: u8 = 0xaa;
pub const LOOKUPSWITCH: u8 = 0xab;

/// Non-branching JVM bytecode instruction
///
/// The representation is slightly different from the usual presentation to make it more
/// convenient to construct bytecode:
///
///   - The "wide" instruction doesn't show up at all, but instead gets merged into the
///     instructions it is allowed to modify
///
///   - Instructions with several encodings (`ldc`/`ldc_w`/`ldc2_w`, `iload`/`iload_0`) are one
///     variant, and the shortest encoding gets picked when the instruction is written out
///
///   - Constant operands are symbolic: they only get a constant pool index when encoded
///
/// Conditional and unconditional jumps, `jsr`, and the switches are emitted separately by the
/// code builder, since they need patching.
#[derive(Clone, Debug, PartialEq)]
pub enum Instruction {
    Nop,
    AConstNull,
    IConstM1,
    IConst0,
    IConst1,
    IConst2,
    IConst3,
    IConst4,
    IConst5,
    LConst0,
    LConst1,
    FConst0,
    FConst1,
    FConst2,
    DConst0,
    DConst1,
    BiPush(i8),
    SiPush(i16),
    Ldc(LoadableConstant), // covers `ldc`, `ldc_w`, and `ldc2_w`
    ILoad(u16),            // covers `iload`, `iload{0,3}`, and `wide iload`
    LLoad(u16),
    FLoad(u16),
    DLoad(u16),
    ALoad(u16),
    IALoad,
    LALoad,
    FALoad,
    DALoad,
    AALoad,
    BALoad,
    CALoad,
    SALoad,
    IStore(u16), // covers `istore`, `istore{0,3}`, and `wide istore`
    LStore(u16),
    FStore(u16),
    DStore(u16),
    AStore(u16),
    IAStore,
    LAStore,
    FAStore,
    DAStore,
    AAStore,
    BAStore,
    CAStore,
    SAStore,
    Pop,
    Pop2,
    Dup,
    DupX1,
    DupX2,
    Dup2,
    Dup2X1,
    Dup2X2,
    Swap,
    IAdd,
    LAdd,
    FAdd,
    DAdd,
    ISub,
    LSub,
    FSub,
    DSub,
    IMul,
    LMul,
    FMul,
    DMul,
    IDiv,
    LDiv,
    FDiv,
    DDiv,
    IRem,
    LRem,
    FRem,
    DRem,
    INeg,
    LNeg,
    FNeg,
    DNeg,
    ISh(ShiftType), // covers `ishr`, `ishl`, and `iushr`
    LSh(ShiftType), // covers `lshr`, `lshl`, and `lushr`
    IAnd,
    LAnd,
    IOr,
    LOr,
    IXor,
    LXor,
    IInc(u16, i16), // covers `iinc` and `wide iinc`
    I2L,
    I2F,
    I2D,
    L2I,
    L2F,
    L2D,
    F2I,
    F2L,
    F2D,
    D2I,
    D2L,
    D2F,
    I2B,
    I2C,
    I2S,
    LCmp,
    FCmp(CompareMode), // covers `fcmpl` and `fcmpg`
    DCmp(CompareMode), // covers `dcmpl` and `dcmpg`
    IReturn,
    LReturn,
    FReturn,
    DReturn,
    AReturn,
    Return,
    AThrow,
    Ret(u16), // covers `ret` and `wide ret`
    GetStatic(FieldRef),
    PutStatic(FieldRef),
    GetField(FieldRef),
    PutField(FieldRef),
    Invoke(InvokeType, MethodRef),
    New(BinaryName),
    NewArray(BaseType),
    ANewArray(RefType<BinaryName>),
    ArrayLength,
    CheckCast(RefType<BinaryName>),
    InstanceOf(RefType<BinaryName>),
    MonitorEnter,
    MonitorExit,
    MultiANewArray(RefType<BinaryName>, u8),
}

impl Instruction {
    /// Does control never fall through to the next instruction?
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Instruction::IReturn
                | Instruction::LReturn
                | Instruction::FReturn
                | Instruction::DReturn
                | Instruction::AReturn
                | Instruction::Return
                | Instruction::AThrow
                | Instruction::Ret(_)
        )
    }

    /// Local variable load of the right kind
    pub fn load(typecode: TypeCode, reg: u16) -> Instruction {
        match typecode.truncate() {
            TypeCode::Long => Instruction::LLoad(reg),
            TypeCode::Float => Instruction::FLoad(reg),
            TypeCode::Double => Instruction::DLoad(reg),
            TypeCode::Object => Instruction::ALoad(reg),
            _ => Instruction::ILoad(reg),
        }
    }

    /// Local variable store of the right kind
    pub fn store(typecode: TypeCode, reg: u16) -> Instruction {
        match typecode.truncate() {
            TypeCode::Long => Instruction::LStore(reg),
            TypeCode::Float => Instruction::FStore(reg),
            TypeCode::Double => Instruction::DStore(reg),
            TypeCode::Object => Instruction::AStore(reg),
            _ => Instruction::IStore(reg),
        }
    }

    pub fn array_load(typecode: TypeCode) -> Instruction {
        match typecode {
            TypeCode::Long => Instruction::LALoad,
            TypeCode::Float => Instruction::FALoad,
            TypeCode::Double => Instruction::DALoad,
            TypeCode::Object => Instruction::AALoad,
            TypeCode::Byte => Instruction::BALoad,
            TypeCode::Char => Instruction::CALoad,
            TypeCode::Short => Instruction::SALoad,
            TypeCode::Int | TypeCode::Void => Instruction::IALoad,
        }
    }

    pub fn array_store(typecode: TypeCode) -> Instruction {
        match typecode {
            TypeCode::Long => Instruction::LAStore,
            TypeCode::Float => Instruction::FAStore,
            TypeCode::Double => Instruction::DAStore,
            TypeCode::Object => Instruction::AAStore,
            TypeCode::Byte => Instruction::BAStore,
            TypeCode::Char => Instruction::CAStore,
            TypeCode::Short => Instruction::SAStore,
            TypeCode::Int | TypeCode::Void => Instruction::IAStore,
        }
    }

    /// Return instruction for a method whose return type has this type code
    pub fn return_value(typecode: TypeCode) -> Instruction {
        match typecode.truncate() {
            TypeCode::Void => Instruction::Return,
            TypeCode::Long => Instruction::LReturn,
            TypeCode::Float => Instruction::FReturn,
            TypeCode::Double => Instruction::DReturn,
            TypeCode::Object => Instruction::AReturn,
            _ => Instruction::IReturn,
        }
    }

    /// Pop or pop2, depending on the width of what is on the stack
    pub fn pop(width: usize) -> Instruction {
        if width == 2 {
            Instruction::Pop2
        } else {
            Instruction::Pop
        }
    }

    /// Dup or dup2, depending on the width of what is on the stack
    pub fn dup(width: usize) -> Instruction {
        if width == 2 {
            Instruction::Dup2
        } else {
            Instruction::Dup
        }
    }

    /// Duplicate a value of width `value_width` and insert it under `under_width` stack slots
    pub fn dup_under(value_width: usize, under_width: usize) -> Instruction {
        match (value_width, under_width) {
            (2, 1) => Instruction::Dup2X1,
            (2, 2) => Instruction::Dup2X2,
            (_, 2) => Instruction::DupX2,
            _ => Instruction::DupX1,
        }
    }

    /// Conversions between the primitive computational types, followed by any narrowing to
    /// `byte`, `char`, or `short`
    pub fn conversions(from: TypeCode, to: TypeCode) -> Vec<Instruction> {
        use TypeCode::*;
        let mut conversions = vec![];
        let convert = match (from.truncate(), to.truncate()) {
            (Int, Long) => Some(Instruction::I2L),
            (Int, Float) => Some(Instruction::I2F),
            (Int, Double) => Some(Instruction::I2D),
            (Long, Int) => Some(Instruction::L2I),
            (Long, Float) => Some(Instruction::L2F),
            (Long, Double) => Some(Instruction::L2D),
            (Float, Int) => Some(Instruction::F2I),
            (Float, Long) => Some(Instruction::F2L),
            (Float, Double) => Some(Instruction::F2D),
            (Double, Int) => Some(Instruction::D2I),
            (Double, Long) => Some(Instruction::D2L),
            (Double, Float) => Some(Instruction::D2F),
            _ => None,
        };
        conversions.extend(convert);
        match to {
            Byte => conversions.push(Instruction::I2B),
            Char => conversions.push(Instruction::I2C),
            Short => conversions.push(Instruction::I2S),
            _ => (),
        }
        conversions
    }

    /// Write out the instruction, putting any constants it references into the pool
    pub fn encode(&self, pool: &mut ConstantsPool, code: &mut Vec<u8>) -> Result<(), Error> {
        use Instruction::*;

        /* The load/store instructions follow the same pattern:
         *
         *   - short form (0-3) have special bytes
         *   - normal form (0-255) use `iload` plus a byte operand
         *   - wide form (255-65535) use `wide iload` plus two byte operands
         */
        fn load_or_store(idx: u16, short_form_start: u8, normal_form: u8, code: &mut Vec<u8>) {
            match u8::try_from(idx) {
                Ok(n @ 0..=3) => code.push(short_form_start + n),
                Ok(n) => code.extend_from_slice(&[normal_form, n]),
                Err(_) => {
                    code.extend_from_slice(&[WIDE, normal_form]);
                    code.extend_from_slice(&idx.to_be_bytes());
                }
            }
        }

        fn with_index(opcode: u8, idx: impl Into<ConstantIndex>, code: &mut Vec<u8>) {
            code.push(opcode);
            code.extend_from_slice(&idx.into().0.to_be_bytes());
        }

        match self {
            Nop => code.push(0x00),
            AConstNull => code.push(0x01),
            IConstM1 => code.push(0x02),
            IConst0 => code.push(0x03),
            IConst1 => code.push(0x04),
            IConst2 => code.push(0x05),
            IConst3 => code.push(0x06),
            IConst4 => code.push(0x07),
            IConst5 => code.push(0x08),
            LConst0 => code.push(0x09),
            LConst1 => code.push(0x0a),
            FConst0 => code.push(0x0b),
            FConst1 => code.push(0x0c),
            FConst2 => code.push(0x0d),
            DConst0 => code.push(0x0e),
            DConst1 => code.push(0x0f),
            BiPush(b) => code.extend_from_slice(&[0x10, *b as u8]),
            SiPush(s) => {
                code.push(0x11);
                code.extend_from_slice(&s.to_be_bytes());
            }
            Ldc(constant) => {
                let idx = constant.constant_index(pool)?;
                if constant.is_wide() {
                    with_index(0x14, idx, code);
                } else {
                    match u8::try_from(idx.0) {
                        Ok(b) => code.extend_from_slice(&[0x12, b]),
                        Err(_) => with_index(0x13, idx, code),
                    }
                }
            }
            ILoad(idx) => load_or_store(*idx, 0x1a, 0x15, code),
            LLoad(idx) => load_or_store(*idx, 0x1e, 0x16, code),
            FLoad(idx) => load_or_store(*idx, 0x22, 0x17, code),
            DLoad(idx) => load_or_store(*idx, 0x26, 0x18, code),
            ALoad(idx) => load_or_store(*idx, 0x2a, 0x19, code),
            IALoad => code.push(0x2e),
            LALoad => code.push(0x2f),
            FALoad => code.push(0x30),
            DALoad => code.push(0x31),
            AALoad => code.push(0x32),
            BALoad => code.push(0x33),
            CALoad => code.push(0x34),
            SALoad => code.push(0x35),
            IStore(idx) => load_or_store(*idx, 0x3b, 0x36, code),
            LStore(idx) => load_or_store(*idx, 0x3f, 0x37, code),
            FStore(idx) => load_or_store(*idx, 0x43, 0x38, code),
            DStore(idx) => load_or_store(*idx, 0x47, 0x39, code),
            AStore(idx) => load_or_store(*idx, 0x4b, 0x3a, code),
            IAStore => code.push(0x4f),
            LAStore => code.push(0x50),
            FAStore => code.push(0x51),
            DAStore => code.push(0x52),
            AAStore => code.push(0x53),
            BAStore => code.push(0x54),
            CAStore => code.push(0x55),
            SAStore => code.push(0x56),
            Pop => code.push(0x57),
            Pop2 => code.push(0x58),
            Dup => code.push(0x59),
            DupX1 => code.push(0x5a),
            DupX2 => code.push(0x5b),
            Dup2 => code.push(0x5c),
            Dup2X1 => code.push(0x5d),
            Dup2X2 => code.push(0x5e),
            Swap => code.push(0x5f),
            IAdd => code.push(0x60),
            LAdd => code.push(0x61),
            FAdd => code.push(0x62),
            DAdd => code.push(0x63),
            ISub => code.push(0x64),
            LSub => code.push(0x65),
            FSub => code.push(0x66),
            DSub => code.push(0x67),
            IMul => code.push(0x68),
            LMul => code.push(0x69),
            FMul => code.push(0x6a),
            DMul => code.push(0x6b),
            IDiv => code.push(0x6c),
            LDiv => code.push(0x6d),
            FDiv => code.push(0x6e),
            DDiv => code.push(0x6f),
            IRem => code.push(0x70),
            LRem => code.push(0x71),
            FRem => code.push(0x72),
            DRem => code.push(0x73),
            INeg => code.push(0x74),
            LNeg => code.push(0x75),
            FNeg => code.push(0x76),
            DNeg => code.push(0x77),
            ISh(ShiftType::Left) => code.push(0x78),
            LSh(ShiftType::Left) => code.push(0x79),
            ISh(ShiftType::ArithmeticRight) => code.push(0x7a),
            LSh(ShiftType::ArithmeticRight) => code.push(0x7b),
            ISh(ShiftType::LogicalRight) => code.push(0x7c),
            LSh(ShiftType::LogicalRight) => code.push(0x7d),
            IAnd => code.push(0x7e),
            LAnd => code.push(0x7f),
            IOr => code.push(0x80),
            LOr => code.push(0x81),
            IXor => code.push(0x82),
            LXor => code.push(0x83),
            IInc(idx, diff) => match (u8::try_from(*idx), i8::try_from(*diff)) {
                (Ok(b), Ok(d)) => code.extend_from_slice(&[0x84, b, d as u8]),
                _ => {
                    code.extend_from_slice(&[WIDE, 0x84]);
                    code.extend_from_slice(&idx.to_be_bytes());
                    code.extend_from_slice(&diff.to_be_bytes());
                }
            },
            I2L => code.push(0x85),
            I2F => code.push(0x86),
            I2D => code.push(0x87),
            L2I => code.push(0x88),
            L2F => code.push(0x89),
            L2D => code.push(0x8a),
            F2I => code.push(0x8b),
            F2L => code.push(0x8c),
            F2D => code.push(0x8d),
            D2I => code.push(0x8e),
            D2L => code.push(0x8f),
            D2F => code.push(0x90),
            I2B => code.push(0x91),
            I2C => code.push(0x92),
            I2S => code.push(0x93),
            LCmp => code.push(0x94),
            FCmp(CompareMode::L) => code.push(0x95),
            FCmp(CompareMode::G) => code.push(0x96),
            DCmp(CompareMode::L) => code.push(0x97),
            DCmp(CompareMode::G) => code.push(0x98),
            Ret(idx) => match u8::try_from(*idx) {
                Ok(b) => code.extend_from_slice(&[0xa9, b]),
                Err(_) => {
                    code.extend_from_slice(&[WIDE, 0xa9]);
                    code.extend_from_slice(&idx.to_be_bytes());
                }
            },
            IReturn => code.push(0xac),
            LReturn => code.push(0xad),
            FReturn => code.push(0xae),
            DReturn => code.push(0xaf),
            AReturn => code.push(0xb0),
            Return => code.push(0xb1),
            GetStatic(field) => with_index(0xb2, field.constant_index(pool)?, code),
            PutStatic(field) => with_index(0xb3, field.constant_index(pool)?, code),
            GetField(field) => with_index(0xb4, field.constant_index(pool)?, code),
            PutField(field) => with_index(0xb5, field.constant_index(pool)?, code),
            Invoke(InvokeType::Virtual, method) => {
                with_index(0xb6, method.constant_index(pool)?, code)
            }
            Invoke(InvokeType::Special, method) => {
                with_index(0xb7, method.constant_index(pool)?, code)
            }
            Invoke(InvokeType::Static, method) => {
                with_index(0xb8, method.constant_index(pool)?, code)
            }
            Invoke(InvokeType::Interface, method) => {
                with_index(0xb9, method.constant_index(pool)?, code);
                let count = method.descriptor.parameter_length(true);
                code.extend_from_slice(&[count as u8, 0]);
            }
            New(class) => with_index(0xbb, class.constant_index(pool)?, code),
            NewArray(base_type) => code.extend_from_slice(&[0xbc, base_type.array_type_code()]),
            ANewArray(ref_type) => with_index(0xbd, ref_type.constant_index(pool)?, code),
            ArrayLength => code.push(0xbe),
            AThrow => code.push(0xbf),
            CheckCast(ref_type) => with_index(0xc0, ref_type.constant_index(pool)?, code),
            InstanceOf(ref_type) => with_index(0xc1, ref_type.constant_index(pool)?, code),
            MonitorEnter => code.push(0xc2),
            MonitorExit => code.push(0xc3),
            MultiANewArray(ref_type, dimensions) => {
                with_index(0xc5, ref_type.constant_index(pool)?, code);
                code.push(*dimensions);
            }
        }
        Ok(())
    }
}

/// Branch instructions which the code builder patches once their target is known
///
/// `Never` is the negation of `Goto`: it is the "jump" of a condition that is constantly false,
/// and emits nothing.
#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash)]
pub enum Jump {
    If(OrdComparison),     // covers `ifeq`, `ifne`, `iflt`, `ifge`, `ifgt`, `ifle`
    IfICmp(OrdComparison), // covers `if_icmpeq`, `if_icmpne`, `if_icmplt`, ... `if_icmple`
    IfACmp(EqComparison),  // covers `if_acmpeq`, `if_acmpne`
    IfNull(EqComparison),  // covers `ifnull`, `ifnonnull`
    Goto,
    Never,
}

impl Jump {
    pub fn negate(self) -> Jump {
        match self {
            Jump::If(op) => Jump::If(!op),
            Jump::IfICmp(op) => Jump::IfICmp(!op),
            Jump::IfACmp(op) => Jump::IfACmp(!op),
            Jump::IfNull(op) => Jump::IfNull(!op),
            Jump::Goto => Jump::Never,
            Jump::Never => Jump::Goto,
        }
    }

    /// Opcode of the narrow form (`None` for `Never`)
    pub fn opcode(self) -> Option<u8> {
        let opcode = match self {
            Jump::If(OrdComparison::EQ) => 0x99,
            Jump::If(OrdComparison::NE) => 0x9a,
            Jump::If(OrdComparison::LT) => 0x9b,
            Jump::If(OrdComparison::GE) => 0x9c,
            Jump::If(OrdComparison::GT) => 0x9d,
            Jump::If(OrdComparison::LE) => 0x9e,
            Jump::IfICmp(OrdComparison::EQ) => 0x9f,
            Jump::IfICmp(OrdComparison::NE) => 0xa0,
            Jump::IfICmp(OrdComparison::LT) => 0xa1,
            Jump::IfICmp(OrdComparison::GE) => 0xa2,
            Jump::IfICmp(OrdComparison::GT) => 0xa3,
            Jump::IfICmp(OrdComparison::LE) => 0xa4,
            Jump::IfACmp(EqComparison::EQ) => 0xa5,
            Jump::IfACmp(EqComparison::NE) => 0xa6,
            Jump::IfNull(EqComparison::EQ) => 0xc6,
            Jump::IfNull(EqComparison::NE) => 0xc7,
            Jump::Goto => GOTO,
            Jump::Never => return None,
        };
        Some(opcode)
    }

    /// Number of (single-width) operands popped by the jump
    pub fn pops(self) -> usize {
        match self {
            Jump::If(_) | Jump::IfNull(_) => 1,
            Jump::IfICmp(_) | Jump::IfACmp(_) => 2,
            Jump::Goto | Jump::Never => 0,
        }
    }
}

/// Possible bit shifts
#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash)]
pub enum ShiftType {
    Left,
    LogicalRight,
    ArithmeticRight,
}

/// Comparison modes for floating point
#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash)]
pub enum CompareMode {
    /// -1 on NaN
    L,

    /// 1 on NaN
    G,
}

/// Binary comparison operators available for `int` branches
#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash)]
pub enum OrdComparison {
    EQ,
    GE,
    GT,
    LE,
    LT,
    NE,
}

impl Not for OrdComparison {
    type Output = Self;

    fn not(self) -> Self::Output {
        match self {
            OrdComparison::EQ => OrdComparison::NE,
            OrdComparison::GE => OrdComparison::LT,
            OrdComparison::GT => OrdComparison::LE,
            OrdComparison::LE => OrdComparison::GT,
            OrdComparison::LT => OrdComparison::GE,
            OrdComparison::NE => OrdComparison::EQ,
        }
    }
}

/// Equality/inequality comparison operators
#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash)]
pub enum EqComparison {
    EQ,
    NE,
}

impl Not for EqComparison {
    type Output = Self;

    fn not(self) -> Self::Output {
        match self {
            EqComparison::EQ => EqComparison::NE,
            EqComparison::NE => EqComparison::EQ,
        }
    }
}

/// Type of method to invoke
#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash)]
pub enum InvokeType {
    Virtual,
    Special,
    Static,

    /// The `count` operand is derived from the method descriptor
    Interface,
}

/// Classification of values by the instructions used to manipulate them
///
/// `boolean` shares `Byte` (the array instructions for `boolean[]` are the `byte[]` ones).
#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash)]
pub enum TypeCode {
    Int,
    Long,
    Float,
    Double,
    Object,
    Byte,
    Char,
    Short,
    Void,
}

impl TypeCode {
    pub fn of(field_type: &FieldType<BinaryName>) -> TypeCode {
        match field_type {
            FieldType::Base(BaseType::Int) => TypeCode::Int,
            FieldType::Base(BaseType::Long) => TypeCode::Long,
            FieldType::Base(BaseType::Float) => TypeCode::Float,
            FieldType::Base(BaseType::Double) => TypeCode::Double,
            FieldType::Base(BaseType::Byte) | FieldType::Base(BaseType::Boolean) => TypeCode::Byte,
            FieldType::Base(BaseType::Char) => TypeCode::Char,
            FieldType::Base(BaseType::Short) => TypeCode::Short,
            FieldType::Ref(_) => TypeCode::Object,
        }
    }

    /// Type code of a method return (`None` is `void`)
    pub fn of_return(return_type: Option<&FieldType<BinaryName>>) -> TypeCode {
        return_type.map_or(TypeCode::Void, TypeCode::of)
    }

    /// Sub-int types are manipulated as ints
    pub fn truncate(self) -> TypeCode {
        match self {
            TypeCode::Byte | TypeCode::Char | TypeCode::Short => TypeCode::Int,
            other => other,
        }
    }
}

impl Width for TypeCode {
    fn width(&self) -> usize {
        match self {
            TypeCode::Long | TypeCode::Double => 2,
            TypeCode::Void => 0,
            _ => 1,
        }
    }
}

/// Encode a single instruction on its own (handy for tests and dumps)
pub fn encode_one(instruction: &Instruction, pool: &mut ConstantsPool) -> Result<Vec<u8>, Error> {
    let mut code = vec![];
    instruction.encode(pool, &mut code)?;
    Ok(code)
}

/// Write a signed 32-bit operand (switch tables, wide jumps)
pub(crate) fn put_i32(code: &mut [u8], at: usize, value: i32) {
    code[at..at + 4].copy_from_slice(&value.to_be_bytes());
}

pub(crate) fn get_i32(code: &[u8], at: usize) -> i32 {
    i32::from_be_bytes([code[at], code[at + 1], code[at + 2], code[at + 3]])
}

pub(crate) fn put_i16(code: &mut [u8], at: usize, value: i16) {
    code[at..at + 2].copy_from_slice(&value.to_be_bytes());
}

pub(crate) fn get_i16(code: &[u8], at: usize) -> i16 {
    i16::from_be_bytes([code[at], code[at + 1]])
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::jvm::{MethodDescriptor, Name, UnqualifiedName};

    fn encode(instruction: Instruction) -> Vec<u8> {
        encode_one(&instruction, &mut ConstantsPool::new()).unwrap()
    }

    #[test]
    fn local_forms() {
        assert_eq!(encode(Instruction::ILoad(2)), vec![0x1c]);
        assert_eq!(encode(Instruction::ALoad(0)), vec![0x2a]);
        assert_eq!(encode(Instruction::DStore(4)), vec![0x39, 4]);
        assert_eq!(encode(Instruction::LLoad(300)), vec![0xc4, 0x16, 0x01, 0x2c]);
        assert_eq!(encode(Instruction::IInc(1, 5)), vec![0x84, 1, 5]);
        assert_eq!(encode(Instruction::IInc(1, 500)), vec![0xc4, 0x84, 0, 1, 0x01, 0xf4]);
        assert_eq!(encode(Instruction::Ret(3)), vec![0xa9, 3]);
    }

    #[test]
    fn constant_forms() {
        let mut pool = ConstantsPool::new();
        let string = Instruction::Ldc(LoadableConstant::String(String::from("hi")));
        assert_eq!(encode_one(&string, &mut pool).unwrap(), vec![0x12, 2]);
        let long = Instruction::Ldc(LoadableConstant::Long(1 << 40));
        assert_eq!(encode_one(&long, &mut pool).unwrap(), vec![0x14, 0, 3]);
        for i in 0..300 {
            pool.get_loadable(&LoadableConstant::Integer(1000 + i)).unwrap();
        }
        let far = Instruction::Ldc(LoadableConstant::Integer(1299));
        assert_eq!(encode_one(&far, &mut pool).unwrap(), vec![0x13, 0x01, 0x30]);
    }

    #[test]
    fn interface_call_counts_arguments() {
        let method = MethodRef {
            owner: BinaryName::CHARSEQUENCE,
            name: UnqualifiedName::from_string(String::from("subSequence")).unwrap(),
            descriptor: MethodDescriptor {
                parameters: vec![FieldType::int(), FieldType::long()],
                return_type: Some(FieldType::object(BinaryName::CHARSEQUENCE)),
            },
            is_static: false,
            owner_is_interface: true,
            is_private: false,
        };
        let bytes = encode(Instruction::Invoke(InvokeType::Interface, method));
        assert_eq!(bytes[0], 0xb9);
        assert_eq!(&bytes[3..], &[4, 0]);
    }

    #[test]
    fn conversions() {
        use TypeCode::*;
        assert_eq!(Instruction::conversions(Int, Byte), vec![Instruction::I2B]);
        assert_eq!(Instruction::conversions(Long, Char), vec![Instruction::L2I, Instruction::I2C]);
        assert_eq!(Instruction::conversions(Short, Int), vec![]);
        assert_eq!(Instruction::conversions(Float, Double), vec![Instruction::F2D]);
        assert_eq!(Jump::If(OrdComparison::LT).negate(), Jump::If(OrdComparison::GE));
        assert_eq!(Jump::Goto.negate().opcode(), None);
    }
}
