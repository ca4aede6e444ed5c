use super::Instruction;
use crate::jvm::class_file::LoadableConstant;
use crate::jvm::hierarchy::ClassHierarchy;
use crate::jvm::verifier::{Frame, VerificationType};
use crate::jvm::{BinaryName, FieldType, InternalErrorKind, RefType};
use crate::util::{OffsetVec, Width};

/// Verification type while generating code
///
/// Classes are still symbolic, and uninitialized values remember which class is being
/// constructed (so that the `<init>` call knows what type they turn into).
pub type VType = VerificationType<RefType<BinaryName>, Uninit>;

/// Frame while generating code
pub type VFrame = Frame<RefType<BinaryName>, Uninit>;

/// Object allocated by `new` at `pc`, not yet passed to `<init>`
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Uninit {
    pub pc: u16,
    pub class: BinaryName,
}

/// One local variable slot
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LocalSlot {
    /// Not definitely assigned on every path to this point
    Undefined,

    Defined(VType),

    /// Second half of the `long` or `double` in the previous slot
    Upper,
}

/// Simulated abstract machine state at the current code position
///
/// The stack records a verification type per value, the locals record which registers are
/// definitely assigned (and with what declared type), and `locks` is the stack of registers
/// holding currently entered monitors.
#[derive(Clone, Debug, PartialEq, Default)]
pub struct State {
    pub stack: OffsetVec<VType>,
    pub locals: Vec<LocalSlot>,
    pub locks: Vec<u16>,
}

type Result<A> = std::result::Result<A, InternalErrorKind>;

impl State {
    pub fn new() -> State {
        State::default()
    }

    /// Stack depth in slots
    pub fn stack_size(&self) -> usize {
        self.stack.offset_len().0
    }

    pub fn push(&mut self, vtype: VType) {
        self.stack.push(vtype);
    }

    pub fn pop(&mut self) -> Result<VType> {
        self.stack
            .pop()
            .map(|(_, _, vtype)| vtype)
            .ok_or(InternalErrorKind::EmptyStack)
    }

    pub fn peek(&self) -> Result<&VType> {
        self.stack.last().ok_or(InternalErrorKind::EmptyStack)
    }

    /// Pop a value, checking it has the expected kind
    ///
    /// Reference types are not checked beyond being references: the front-end already
    /// type-checked the program.
    fn pop_expecting(&mut self, expected: &VType) -> Result<VType> {
        let found = self.pop()?;
        let compatible = if expected.is_reference() {
            found.is_reference()
        } else {
            &found == expected
        };
        if compatible {
            Ok(found)
        } else {
            Err(InternalErrorKind::InvalidType {
                expected: format!("{:?}", expected),
                found: format!("{:?}", found),
            })
        }
    }

    fn pop_reference(&mut self) -> Result<VType> {
        self.pop_expecting(&VerificationType::Null)
    }

    fn pop_int(&mut self) -> Result<()> {
        self.pop_expecting(&VerificationType::Integer).map(|_| ())
    }

    /// Pop values covering exactly `slots` stack slots, returned bottom first
    fn pop_slots(&mut self, slots: usize) -> Result<Vec<VType>> {
        let mut popped = vec![];
        let mut covered = 0;
        while covered < slots {
            let vtype = self.pop()?;
            covered += vtype.width();
            popped.push(vtype);
        }
        if covered != slots {
            return Err(InternalErrorKind::InvalidWidth(covered));
        }
        popped.reverse();
        Ok(popped)
    }

    fn push_all(&mut self, vtypes: &[VType]) {
        for vtype in vtypes {
            self.push(vtype.clone());
        }
    }

    /// Replace the type of the value on top of the stack (used when both arms of a conditional
    /// leave values of a common declared type)
    pub fn force_stack_top(&mut self, vtype: VType) {
        if let Some(top) = self.stack.last_mut() {
            if top.is_reference() && vtype.is_reference() {
                *top = vtype;
            }
        }
    }

    /// Type of the local in `reg`, if it is definitely assigned
    pub fn local(&self, reg: u16) -> Option<&VType> {
        match self.locals.get(reg as usize) {
            Some(LocalSlot::Defined(vtype)) => Some(vtype),
            _ => None,
        }
    }

    /// Mark a register as definitely assigned
    pub fn set_local(&mut self, reg: u16, vtype: VType) {
        let reg = reg as usize;
        let width = vtype.width();
        if self.locals.len() < reg + width {
            self.locals.resize(reg + width, LocalSlot::Undefined);
        }

        // Overwriting half of a wide value invalidates the other half
        if self.locals[reg] == LocalSlot::Upper && reg > 0 {
            self.locals[reg - 1] = LocalSlot::Undefined;
        }
        let last = reg + width - 1;
        if let Some(LocalSlot::Upper) = self.locals.get(last + 1) {
            self.locals[last + 1] = LocalSlot::Undefined;
        }

        self.locals[reg] = LocalSlot::Defined(vtype);
        if width == 2 {
            self.locals[reg + 1] = LocalSlot::Upper;
        }
    }

    /// Forget a register (end of its scope)
    pub fn undefine(&mut self, reg: u16) {
        if let Some(slot) = self.locals.get_mut(reg as usize) {
            *slot = LocalSlot::Undefined;
        }
    }

    /// Forget every register from `reg` upwards
    pub fn undefine_from(&mut self, reg: u16) {
        self.locals.truncate(reg as usize);
    }

    pub fn lock(&mut self, reg: u16) {
        self.locks.push(reg);
    }

    pub fn unlock(&mut self, reg: u16) -> Result<()> {
        match self.locks.pop() {
            Some(locked) if locked == reg => Ok(()),
            _ => Err(InternalErrorKind::UnbalancedMonitor(reg)),
        }
    }

    fn load_local(&mut self, reg: u16, expected: VType) -> Result<()> {
        let vtype = match self.local(reg) {
            Some(found) if found == &expected || (expected.is_reference() && found.is_reference()) => {
                found.clone()
            }
            _ => return Err(InternalErrorKind::UndefinedLocal(reg)),
        };
        self.push(vtype);
        Ok(())
    }

    fn store_local(&mut self, reg: u16, expected: VType) -> Result<()> {
        let vtype = if expected.is_reference() {
            match self.pop()? {
                address @ VerificationType::ReturnAddress => address,
                other if other.is_reference() => other,
                other => {
                    return Err(InternalErrorKind::InvalidType {
                        expected: String::from("reference"),
                        found: format!("{:?}", other),
                    })
                }
            }
        } else {
            self.pop_expecting(&expected)?
        };
        self.set_local(reg, vtype);
        Ok(())
    }

    /// Update the state to reflect the effect of an instruction emitted at `pc`
    ///
    /// `this_class` is the type `UninitializedThis` becomes after the superclass constructor call.
    pub fn apply(&mut self, insn: &Instruction, pc: usize, this_class: &BinaryName) -> Result<()> {
        use Instruction::*;
        use VerificationType::{Double, Float, Integer, Long, Null};

        match insn {
            Nop => (),
            AConstNull => self.push(Null),
            IConstM1 | IConst0 | IConst1 | IConst2 | IConst3 | IConst4 | IConst5 | BiPush(_)
            | SiPush(_) => self.push(Integer),
            LConst0 | LConst1 => self.push(Long),
            FConst0 | FConst1 | FConst2 => self.push(Float),
            DConst0 | DConst1 => self.push(Double),
            Ldc(constant) => self.push(match constant {
                LoadableConstant::Integer(_) => Integer,
                LoadableConstant::Float(_) => Float,
                LoadableConstant::Long(_) => Long,
                LoadableConstant::Double(_) => Double,
                LoadableConstant::String(_) => object(BinaryName::STRING),
                LoadableConstant::Class(_) => object(BinaryName::CLASS),
            }),

            ILoad(reg) => self.load_local(*reg, Integer)?,
            LLoad(reg) => self.load_local(*reg, Long)?,
            FLoad(reg) => self.load_local(*reg, Float)?,
            DLoad(reg) => self.load_local(*reg, Double)?,
            ALoad(reg) => self.load_local(*reg, Null)?,

            IALoad | BALoad | CALoad | SALoad => self.array_load(Integer)?,
            LALoad => self.array_load(Long)?,
            FALoad => self.array_load(Float)?,
            DALoad => self.array_load(Double)?,
            AALoad => {
                self.pop_int()?;
                let element = match self.pop_reference()? {
                    VerificationType::Object(array) => match array.element_type() {
                        Some(FieldType::Ref(element)) => VerificationType::Object(element),
                        _ => return Err(InternalErrorKind::NotArrayType(format!("{:?}", array))),
                    },
                    _ => object(BinaryName::OBJECT),
                };
                self.push(element);
            }

            IStore(reg) => self.store_local(*reg, Integer)?,
            LStore(reg) => self.store_local(*reg, Long)?,
            FStore(reg) => self.store_local(*reg, Float)?,
            DStore(reg) => self.store_local(*reg, Double)?,
            AStore(reg) => self.store_local(*reg, Null)?,

            IAStore | BAStore | CAStore | SAStore => self.array_store(Integer)?,
            LAStore => self.array_store(Long)?,
            FAStore => self.array_store(Float)?,
            DAStore => self.array_store(Double)?,
            AAStore => self.array_store(Null)?,

            Pop => {
                self.pop_slots(1)?;
            }
            Pop2 => {
                self.pop_slots(2)?;
            }
            Dup => {
                let top = self.pop_slots(1)?;
                self.push_all(&top);
                self.push_all(&top);
            }
            DupX1 => {
                let top = self.pop_slots(1)?;
                let under = self.pop_slots(1)?;
                self.push_all(&top);
                self.push_all(&under);
                self.push_all(&top);
            }
            DupX2 => {
                let top = self.pop_slots(1)?;
                let under = self.pop_slots(2)?;
                self.push_all(&top);
                self.push_all(&under);
                self.push_all(&top);
            }
            Dup2 => {
                let top = self.pop_slots(2)?;
                self.push_all(&top);
                self.push_all(&top);
            }
            Dup2X1 => {
                let top = self.pop_slots(2)?;
                let under = self.pop_slots(1)?;
                self.push_all(&top);
                self.push_all(&under);
                self.push_all(&top);
            }
            Dup2X2 => {
                let top = self.pop_slots(2)?;
                let under = self.pop_slots(2)?;
                self.push_all(&top);
                self.push_all(&under);
                self.push_all(&top);
            }
            Swap => {
                let top = self.pop_slots(1)?;
                let under = self.pop_slots(1)?;
                self.push_all(&top);
                self.push_all(&under);
            }

            IAdd | ISub | IMul | IDiv | IRem | IAnd | IOr | IXor | ISh(_) => {
                self.binary(Integer, Integer, Integer)?
            }
            LAdd | LSub | LMul | LDiv | LRem | LAnd | LOr | LXor => {
                self.binary(Long, Long, Long)?
            }
            LSh(_) => self.binary(Long, Integer, Long)?,
            FAdd | FSub | FMul | FDiv | FRem => self.binary(Float, Float, Float)?,
            DAdd | DSub | DMul | DDiv | DRem => self.binary(Double, Double, Double)?,
            INeg | I2B | I2C | I2S => self.unary(Integer, Integer)?,
            LNeg => self.unary(Long, Long)?,
            FNeg => self.unary(Float, Float)?,
            DNeg => self.unary(Double, Double)?,
            IInc(reg, _) => {
                if self.local(*reg) != Some(&Integer) {
                    return Err(InternalErrorKind::UndefinedLocal(*reg));
                }
            }
            I2L => self.unary(Integer, Long)?,
            I2F => self.unary(Integer, Float)?,
            I2D => self.unary(Integer, Double)?,
            L2I => self.unary(Long, Integer)?,
            L2F => self.unary(Long, Float)?,
            L2D => self.unary(Long, Double)?,
            F2I => self.unary(Float, Integer)?,
            F2L => self.unary(Float, Long)?,
            F2D => self.unary(Float, Double)?,
            D2I => self.unary(Double, Integer)?,
            D2L => self.unary(Double, Long)?,
            D2F => self.unary(Double, Float)?,
            LCmp => self.binary(Long, Long, Integer)?,
            FCmp(_) => self.binary(Float, Float, Integer)?,
            DCmp(_) => self.binary(Double, Double, Integer)?,

            IReturn => self.pop_int()?,
            LReturn => {
                self.pop_expecting(&Long)?;
            }
            FReturn => {
                self.pop_expecting(&Float)?;
            }
            DReturn => {
                self.pop_expecting(&Double)?;
            }
            AReturn | AThrow | MonitorEnter | MonitorExit => {
                self.pop_reference()?;
            }
            Return => (),
            Ret(reg) => {
                if self.local(*reg) != Some(&VerificationType::ReturnAddress) {
                    return Err(InternalErrorKind::UndefinedLocal(*reg));
                }
            }

            GetStatic(field) => self.push(field.descriptor.clone().into()),
            PutStatic(field) => {
                self.pop_expecting(&field.descriptor.clone().into())?;
            }
            GetField(field) => {
                self.pop_reference()?;
                self.push(field.descriptor.clone().into());
            }
            PutField(field) => {
                self.pop_expecting(&field.descriptor.clone().into())?;
                self.pop_reference()?;
            }
            Invoke(_, method) => {
                for parameter in method.descriptor.parameters.iter().rev() {
                    self.pop_expecting(&parameter.clone().into())?;
                }
                if !method.is_static {
                    let receiver = self.pop_reference()?;
                    if method.is_constructor() {
                        let initialized = match &receiver {
                            VerificationType::UninitializedThis => object(this_class.clone()),
                            VerificationType::Uninitialized(uninit) => object(uninit.class.clone()),
                            _ => receiver.clone(),
                        };
                        self.replace(&receiver, &initialized);
                    }
                }
                if let Some(return_type) = &method.descriptor.return_type {
                    self.push(return_type.clone().into());
                }
            }

            New(class) => self.push(VerificationType::Uninitialized(Uninit {
                pc: pc as u16,
                class: class.clone(),
            })),
            NewArray(base_type) => {
                self.pop_int()?;
                let array = RefType::array(FieldType::Base(*base_type));
                self.push(VerificationType::Object(array));
            }
            ANewArray(element) => {
                self.pop_int()?;
                let array = RefType::array(FieldType::Ref(element.clone()));
                self.push(VerificationType::Object(array));
            }
            MultiANewArray(array, dimensions) => {
                for _ in 0..*dimensions {
                    self.pop_int()?;
                }
                self.push(VerificationType::Object(array.clone()));
            }
            ArrayLength | InstanceOf(_) => {
                self.pop_reference()?;
                self.push(Integer);
            }
            CheckCast(ref_type) => {
                self.pop_reference()?;
                self.push(VerificationType::Object(ref_type.clone()));
            }
        }
        Ok(())
    }

    fn unary(&mut self, arg: VType, result: VType) -> Result<()> {
        self.pop_expecting(&arg)?;
        self.push(result);
        Ok(())
    }

    fn binary(&mut self, lhs: VType, rhs: VType, result: VType) -> Result<()> {
        self.pop_expecting(&rhs)?;
        self.pop_expecting(&lhs)?;
        self.push(result);
        Ok(())
    }

    fn array_load(&mut self, element: VType) -> Result<()> {
        self.pop_int()?;
        self.pop_reference()?;
        self.push(element);
        Ok(())
    }

    fn array_store(&mut self, element: VType) -> Result<()> {
        self.pop_expecting(&element)?;
        self.pop_int()?;
        self.pop_reference()?;
        Ok(())
    }

    /// Replace every occurrence of a type in the stack and locals
    fn replace(&mut self, from: &VType, to: &VType) {
        self.stack.for_each_mut(|vtype| {
            if vtype == from {
                *vtype = to.clone();
            }
        });
        for slot in &mut self.locals {
            if let LocalSlot::Defined(vtype) = slot {
                if vtype == from {
                    *vtype = to.clone();
                }
            }
        }
    }

    /// Merge the state of another path reaching the same code position
    ///
    /// A local stays defined only if it is defined (with the same type) on both paths. Stacks must
    /// have the same shape, and reference types meet at their least common superclass.
    pub fn join(&self, other: &State, hierarchy: &dyn ClassHierarchy) -> Result<State> {
        if self.stack.len() != other.stack.len() || self.locks != other.locks {
            return Err(InternalErrorKind::IncompatibleStates(format!(
                "stack {:?} / {:?}, locks {:?} / {:?}",
                self.stack, other.stack, self.locks, other.locks
            )));
        }

        let mut stack = OffsetVec::new();
        for (vtype1, vtype2) in self.stack.values().zip(other.stack.values()) {
            stack.push(join_types(vtype1, vtype2, hierarchy)?);
        }

        let locals = self
            .locals
            .iter()
            .zip(other.locals.iter())
            .map(|(slot1, slot2)| {
                if slot1 == slot2 {
                    slot1.clone()
                } else {
                    LocalSlot::Undefined
                }
            })
            .collect();

        Ok(State {
            stack,
            locals,
            locks: self.locks.clone(),
        })
    }

    /// Frame describing this state (as it would appear in a stack map table)
    ///
    /// Undefined registers are `Top`, and trailing undefined registers are dropped.
    pub fn frame(&self) -> VFrame {
        let mut locals = OffsetVec::new();
        let mut slots = self.locals.iter();
        while let Some(slot) = slots.next() {
            match slot {
                LocalSlot::Defined(vtype) => {
                    let wide = vtype.width() == 2;
                    locals.push(vtype.clone());
                    if wide {
                        slots.next();
                    }
                }
                LocalSlot::Undefined | LocalSlot::Upper => {
                    locals.push(VerificationType::Top);
                }
            }
        }
        while let Some(VerificationType::Top) = locals.last() {
            locals.pop();
        }
        Frame::new(locals, self.stack.clone())
    }
}

fn object(class: BinaryName) -> VType {
    VerificationType::Object(RefType::Object(class))
}

fn join_types(vtype1: &VType, vtype2: &VType, hierarchy: &dyn ClassHierarchy) -> Result<VType> {
    use VerificationType::*;
    match (vtype1, vtype2) {
        _ if vtype1 == vtype2 => Ok(vtype1.clone()),
        (Null, other @ Object(_)) | (other @ Object(_), Null) => Ok(other.clone()),
        (Object(ref1), Object(ref2)) => Ok(Object(hierarchy.common_superclass(ref1, ref2))),
        _ => Err(InternalErrorKind::IncompatibleStates(format!(
            "cannot merge {:?} with {:?}",
            vtype1, vtype2
        ))),
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::jvm::hierarchy::{ClassData, ClassGraph};
    use crate::jvm::{BaseType, FieldRef, MethodRef, Name, UnqualifiedName};
    use VerificationType::*;

    fn name(s: &str) -> BinaryName {
        BinaryName::from_string(s.to_owned()).unwrap()
    }

    fn this() -> BinaryName {
        name("demo/Main")
    }

    #[test]
    fn arithmetic_and_locals() {
        let mut state = State::new();
        state.set_local(0, Long);
        state.apply(&Instruction::LLoad(0), 0, &this()).unwrap();
        state.apply(&Instruction::LConst1, 1, &this()).unwrap();
        state.apply(&Instruction::LAdd, 2, &this()).unwrap();
        assert_eq!(state.stack_size(), 2);
        state.apply(&Instruction::L2I, 3, &this()).unwrap();
        state.apply(&Instruction::IStore(1), 4, &this()).unwrap();

        // the int store clobbered the upper half of the long
        assert_eq!(state.local(0), None);
        assert_eq!(state.local(1), Some(&Integer));
        assert_eq!(state.stack_size(), 0);

        let err = state.apply(&Instruction::FLoad(1), 5, &this()).unwrap_err();
        assert!(matches!(err, InternalErrorKind::UndefinedLocal(1)));
        assert!(matches!(
            state.apply(&Instruction::IAdd, 5, &this()),
            Err(InternalErrorKind::EmptyStack)
        ));
    }

    #[test]
    fn dup_forms_respect_widths() {
        let mut state = State::new();
        state.push(Integer);
        state.push(Double);
        state.apply(&Instruction::Dup2X1, 0, &this()).unwrap();
        let stack: Vec<VType> = state.stack.values().cloned().collect();
        assert_eq!(stack, vec![Double, Integer, Double]);

        // `dup` can't split a double
        assert!(matches!(
            state.apply(&Instruction::Dup, 1, &this()),
            Err(InternalErrorKind::InvalidWidth(2))
        ));
    }

    #[test]
    fn constructor_call_initializes() {
        let mut state = State::new();
        state.set_local(0, UninitializedThis);
        state.apply(&Instruction::ALoad(0), 0, &this()).unwrap();
        let super_init = MethodRef::constructor(BinaryName::OBJECT, vec![]);
        state
            .apply(&Instruction::Invoke(super::super::InvokeType::Special, super_init), 1, &this())
            .unwrap();
        assert_eq!(state.local(0), Some(&object(this())));

        let builder = BinaryName::STRINGBUILDER;
        state.apply(&Instruction::New(builder.clone()), 4, &this()).unwrap();
        state.apply(&Instruction::Dup, 7, &this()).unwrap();
        assert_eq!(
            state.peek().unwrap(),
            &Uninitialized(Uninit { pc: 4, class: builder.clone() })
        );
        let init = MethodRef::constructor(builder.clone(), vec![]);
        state
            .apply(&Instruction::Invoke(super::super::InvokeType::Special, init), 8, &this())
            .unwrap();
        assert_eq!(state.stack.values().cloned().collect::<Vec<_>>(), vec![object(builder)]);
    }

    #[test]
    fn field_and_array_effects() {
        let mut state = State::new();
        let field = FieldRef::new(
            this(),
            UnqualifiedName::from_string(String::from("grid")).unwrap(),
            FieldType::array(FieldType::array(FieldType::Base(BaseType::Char))),
            true,
        );
        state.apply(&Instruction::GetStatic(field), 0, &this()).unwrap();
        state.apply(&Instruction::IConst0, 3, &this()).unwrap();
        state.apply(&Instruction::AALoad, 4, &this()).unwrap();
        let row = Object(RefType::array(FieldType::Base(BaseType::Char)));
        assert_eq!(state.peek().unwrap(), &row);
        state.apply(&Instruction::IConst1, 5, &this()).unwrap();
        state.apply(&Instruction::CALoad, 6, &this()).unwrap();
        assert_eq!(state.peek().unwrap(), &Integer);
    }

    #[test]
    fn joins() {
        let mut graph = ClassGraph::new();
        graph.insert_java_library_types();
        graph.add_class(name("demo/Cat"), ClassData::class(name("demo/Animal"), vec![]));
        graph.add_class(name("demo/Dog"), ClassData::class(name("demo/Animal"), vec![]));
        graph.add_class(name("demo/Animal"), ClassData::class(BinaryName::OBJECT, vec![]));

        let mut state1 = State::new();
        state1.set_local(0, Integer);
        state1.set_local(1, Float);
        state1.push(object(name("demo/Cat")));
        let mut state2 = State::new();
        state2.set_local(0, Integer);
        state2.push(object(name("demo/Dog")));

        let joined = state1.join(&state2, &graph).unwrap();
        assert_eq!(joined.peek().unwrap(), &object(name("demo/Animal")));
        assert_eq!(joined.local(0), Some(&Integer));
        assert_eq!(joined.local(1), None);

        let mut state3 = State::new();
        state3.push(Null);
        let nulls = state3.join(&state2, &graph).unwrap();
        assert_eq!(nulls.peek().unwrap(), &object(name("demo/Dog")));

        let empty = State::new();
        assert!(matches!(
            empty.join(&state2, &graph),
            Err(InternalErrorKind::IncompatibleStates(_))
        ));
    }

    #[test]
    fn frames_skip_upper_halves() {
        let mut state = State::new();
        state.set_local(0, object(this()));
        state.set_local(1, Double);
        state.set_local(4, Integer);
        state.set_local(6, Float);
        state.undefine(6);
        let frame = state.frame();
        let locals: Vec<VType> = frame.locals.values().cloned().collect();
        assert_eq!(locals, vec![object(this()), Double, Top, Integer]);
        assert_eq!(frame.locals.offset_len().0, 5);
    }
}
