//! This module contains the AST of JVM bytecode as the analysis sees it. The representation is
//! slightly different from the usual presentation to make it more convenient to analyze:
//!
//!   - The "wide" instruction doesn't show up at all, but instead gets merged into the
//!     instructions it is allowed to modify (the encoded width still accounts for it)
//!
//!   - Some instructions (like the branches) get abstracted into one instruction with a field.
//!     This helps with repetitive pattern matches.
//!
//!   - Constant pool references are replaced by the descriptors they point to, since the operand
//!     stack effect of a field access or invocation is all the analysis needs from them
//!
//! Every instruction also reports its [`Effect`], which is the opcode category the dataflow
//! engine interprets.

use crate::jvm::{BaseType, BinaryName, FieldType, MethodDescriptor, RefType};
use crate::util::Width;

/// Non-branching JVM bytecode instruction
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
    Ldc(Constant),   // `ldc`
    LdcW(Constant),  // `ldc_w`
    Ldc2W(Constant), // `ldc2_w`
    ILoad(u16),      // covers `iload`, `iload{0,3}`, and `wide iload`
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
    GetStatic(FieldType<BinaryName>),
    PutStatic(FieldType<BinaryName>),
    GetField(FieldType<BinaryName>),
    PutField(FieldType<BinaryName>),
    Invoke(InvokeType, MethodDescriptor<BinaryName>),
    InvokeDynamic(MethodDescriptor<BinaryName>),
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

/// Loadable constants (what `ldc` and friends point at in the constant pool)
#[derive(Clone, Debug, PartialEq)]
pub enum Constant {
    Integer(i32),
    Float(f32),
    Long(i64),
    Double(f64),
    String(String),
    Class(RefType<BinaryName>),
    MethodType(MethodDescriptor<BinaryName>),
    MethodHandle,

    /// Dynamically-computed constant, with the type it resolves to
    Dynamic(FieldType<BinaryName>),
}

impl Constant {
    /// Type of the value pushed when this constant is loaded
    pub fn field_type(&self) -> FieldType<BinaryName> {
        match self {
            Constant::Integer(_) => FieldType::int(),
            Constant::Float(_) => FieldType::float(),
            Constant::Long(_) => FieldType::long(),
            Constant::Double(_) => FieldType::double(),
            Constant::String(_) => FieldType::object(BinaryName::STRING),
            Constant::Class(_) => FieldType::object(BinaryName::CLASS),
            Constant::MethodType(_) => FieldType::object(BinaryName::METHODTYPE),
            Constant::MethodHandle => FieldType::object(BinaryName::METHODHANDLE),
            Constant::Dynamic(ty) => ty.clone(),
        }
    }
}

/// How an instruction acts on the frame, independent of any particular value lattice
///
/// Counts are in values (not slots): a `long` on the stack is one value.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum Effect {
    /// No effect on the frame
    Nothing,

    /// Push a freshly produced value
    Push,

    /// Push a copy of a local
    Load(u16),

    /// Pop a value into a local
    Store(u16),

    /// Update a local in place
    Increment(u16),

    /// Pop one value and push one
    Unary,

    /// Pop two values and push one
    Binary,

    /// Pop values without pushing anything
    Consume(usize),

    /// Pop some values and optionally push one (invocations, `multianewarray`)
    Nary { pops: usize, pushes: bool },

    /// Rearrange values on the top of the stack
    Shuffle(Shuffle),

    /// Push a return address and enter a subroutine
    CallSubroutine,

    /// Return from a subroutine through the address held in a local
    ReturnFromSubroutine(u16),
}

/// Stack manipulation instructions whose behaviour depends on the size of the values they touch
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum Shuffle {
    Pop,
    Pop2,
    Dup,
    DupX1,
    DupX2,
    Dup2,
    Dup2X1,
    Dup2X2,
    Swap,
}

/// Access to a local variable slot
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub struct LocalAccess {
    pub slot: u16,

    /// Number of slots touched (2 for `long` and `double`)
    pub width: usize,

    /// Does the instruction assign to the slot?
    pub write: bool,
}

impl LocalAccess {
    const fn read(slot: u16, width: usize) -> LocalAccess {
        LocalAccess {
            slot,
            width,
            write: false,
        }
    }

    const fn write(slot: u16, width: usize) -> LocalAccess {
        LocalAccess {
            slot,
            width,
            write: true,
        }
    }

    /// One past the highest slot touched
    pub fn end(&self) -> usize {
        self.slot as usize + self.width
    }
}

impl Instruction {
    /// Opcode category of the instruction
    pub fn effect(&self) -> Effect {
        use Instruction::*;

        match self {
            Nop => Effect::Nothing,

            AConstNull | IConstM1 | IConst0 | IConst1 | IConst2 | IConst3 | IConst4 | IConst5
            | LConst0 | LConst1 | FConst0 | FConst1 | FConst2 | DConst0 | DConst1 | BiPush(_)
            | SiPush(_) | Ldc(_) | LdcW(_) | Ldc2W(_) | GetStatic(_) | New(_) => Effect::Push,

            ILoad(idx) | LLoad(idx) | FLoad(idx) | DLoad(idx) | ALoad(idx) => Effect::Load(*idx),
            IStore(idx) | LStore(idx) | FStore(idx) | DStore(idx) | AStore(idx) => {
                Effect::Store(*idx)
            }
            IInc(idx, _) => Effect::Increment(*idx),

            IALoad | LALoad | FALoad | DALoad | AALoad | BALoad | CALoad | SALoad => Effect::Binary,
            IAStore | LAStore | FAStore | DAStore | AAStore | BAStore | CAStore | SAStore => {
                Effect::Consume(3)
            }

            Pop => Effect::Shuffle(Shuffle::Pop),
            Pop2 => Effect::Shuffle(Shuffle::Pop2),
            Dup => Effect::Shuffle(Shuffle::Dup),
            DupX1 => Effect::Shuffle(Shuffle::DupX1),
            DupX2 => Effect::Shuffle(Shuffle::DupX2),
            Dup2 => Effect::Shuffle(Shuffle::Dup2),
            Dup2X1 => Effect::Shuffle(Shuffle::Dup2X1),
            Dup2X2 => Effect::Shuffle(Shuffle::Dup2X2),
            Swap => Effect::Shuffle(Shuffle::Swap),

            IAdd | LAdd | FAdd | DAdd | ISub | LSub | FSub | DSub | IMul | LMul | FMul | DMul
            | IDiv | LDiv | FDiv | DDiv | IRem | LRem | FRem | DRem | ISh(_) | LSh(_) | IAnd
            | LAnd | IOr | LOr | IXor | LXor | LCmp | FCmp(_) | DCmp(_) => Effect::Binary,

            INeg | LNeg | FNeg | DNeg | I2L | I2F | I2D | L2I | L2F | L2D | F2I | F2L | F2D
            | D2I | D2L | D2F | I2B | I2C | I2S | GetField(_) | NewArray(_) | ANewArray(_)
            | ArrayLength | CheckCast(_) | InstanceOf(_) => Effect::Unary,

            PutStatic(_) | MonitorEnter | MonitorExit => Effect::Consume(1),
            PutField(_) => Effect::Consume(2),

            Invoke(invoke_type, descriptor) => {
                let receiver = if let InvokeType::Static = invoke_type {
                    0
                } else {
                    1
                };
                Effect::Nary {
                    pops: receiver + descriptor.parameters.len(),
                    pushes: descriptor.return_type.is_some(),
                }
            }
            InvokeDynamic(descriptor) => Effect::Nary {
                pops: descriptor.parameters.len(),
                pushes: descriptor.return_type.is_some(),
            },
            MultiANewArray(_, dimensions) => Effect::Nary {
                pops: *dimensions as usize,
                pushes: true,
            },
        }
    }

    /// Number of slots taken by the value this instruction pushes
    ///
    /// Only meaningful for instructions whose effect is `Push`, `Unary`, `Binary`, or a pushing
    /// `Nary`.
    pub fn pushed_width(&self) -> usize {
        use Instruction::*;

        match self {
            LConst0 | LConst1 | DConst0 | DConst1 | LALoad | DALoad | LAdd | DAdd | LSub | DSub
            | LMul | DMul | LDiv | DDiv | LRem | DRem | LNeg | DNeg | LSh(_) | LAnd | LOr
            | LXor | I2L | I2D | L2D | F2L | F2D | D2L => 2,
            Ldc(constant) | LdcW(constant) | Ldc2W(constant) => constant.field_type().width(),
            GetStatic(field_type) | GetField(field_type) => field_type.width(),
            Invoke(_, descriptor) | InvokeDynamic(descriptor) => {
                descriptor.return_type.as_ref().map_or(0, |ty| ty.width())
            }
            _ => 1,
        }
    }

    /// Local variable accessed by the instruction, if any
    pub fn local_access(&self) -> Option<LocalAccess> {
        use Instruction::*;

        match self {
            ILoad(idx) | FLoad(idx) | ALoad(idx) => Some(LocalAccess::read(*idx, 1)),
            LLoad(idx) | DLoad(idx) => Some(LocalAccess::read(*idx, 2)),
            IStore(idx) | FStore(idx) | AStore(idx) | IInc(idx, _) => {
                Some(LocalAccess::write(*idx, 1))
            }
            LStore(idx) | DStore(idx) => Some(LocalAccess::write(*idx, 2)),
            _ => None,
        }
    }

    /// Operand stack slots popped and pushed (`long` and `double` count for two)
    pub fn stack_slots(&self) -> (usize, usize) {
        use Instruction::*;

        match self {
            Nop | IInc(_, _) => (0, 0),

            AConstNull | IConstM1 | IConst0 | IConst1 | IConst2 | IConst3 | IConst4 | IConst5
            | FConst0 | FConst1 | FConst2 | BiPush(_) | SiPush(_) | New(_) => (0, 1),
            LConst0 | LConst1 | DConst0 | DConst1 => (0, 2),
            Ldc(_) | LdcW(_) | Ldc2W(_) => (0, self.pushed_width()),

            ILoad(_) | FLoad(_) | ALoad(_) => (0, 1),
            LLoad(_) | DLoad(_) => (0, 2),
            IStore(_) | FStore(_) | AStore(_) => (1, 0),
            LStore(_) | DStore(_) => (2, 0),

            IALoad | FALoad | AALoad | BALoad | CALoad | SALoad => (2, 1),
            LALoad | DALoad => (2, 2),
            IAStore | FAStore | AAStore | BAStore | CAStore | SAStore => (3, 0),
            LAStore | DAStore => (4, 0),

            Pop => (1, 0),
            Pop2 => (2, 0),
            Dup => (1, 2),
            DupX1 => (2, 3),
            DupX2 => (3, 4),
            Dup2 => (2, 4),
            Dup2X1 => (3, 5),
            Dup2X2 => (4, 6),
            Swap => (2, 2),

            IAdd | ISub | IMul | IDiv | IRem | ISh(_) | IAnd | IOr | IXor | FAdd | FSub | FMul
            | FDiv | FRem | FCmp(_) => (2, 1),
            LAdd | LSub | LMul | LDiv | LRem | LAnd | LOr | LXor | DAdd | DSub | DMul | DDiv
            | DRem => (4, 2),
            LSh(_) => (3, 2),
            LCmp | DCmp(_) => (4, 1),

            INeg | FNeg | I2F | F2I | I2B | I2C | I2S => (1, 1),
            LNeg | DNeg | L2D | D2L => (2, 2),
            I2L | I2D | F2L | F2D => (1, 2),
            L2I | L2F | D2I | D2F => (2, 1),

            GetStatic(field_type) => (0, field_type.width()),
            PutStatic(field_type) => (field_type.width(), 0),
            GetField(field_type) => (1, field_type.width()),
            PutField(field_type) => (1 + field_type.width(), 0),

            Invoke(invoke_type, descriptor) => {
                let has_receiver = !matches!(invoke_type, InvokeType::Static);
                (
                    descriptor.parameter_length(has_receiver),
                    self.pushed_width(),
                )
            }
            InvokeDynamic(descriptor) => (descriptor.parameter_length(false), self.pushed_width()),

            NewArray(_) | ANewArray(_) | ArrayLength | CheckCast(_) | InstanceOf(_) => (1, 1),
            MonitorEnter | MonitorExit => (1, 0),
            MultiANewArray(_, dimensions) => (*dimensions as usize, 1),
        }
    }
}

/// Width of a load/store family instruction (with its implicit `wide` prefix)
fn local_width(idx: u16) -> usize {
    match idx {
        0..=3 => 1,
        4..=255 => 2,
        _ => 4,
    }
}

impl Width for Instruction {
    fn width(&self) -> usize {
        use Instruction::*;

        match self {
            ILoad(idx) | LLoad(idx) | FLoad(idx) | DLoad(idx) | ALoad(idx) | IStore(idx)
            | LStore(idx) | FStore(idx) | DStore(idx) | AStore(idx) => local_width(*idx),

            IInc(idx, inc) => {
                if *idx <= 255 && i8::try_from(*inc).is_ok() {
                    3
                } else {
                    6
                }
            }

            BiPush(_) | Ldc(_) | NewArray(_) => 2,

            SiPush(_) | LdcW(_) | Ldc2W(_) | GetStatic(_) | PutStatic(_) | GetField(_)
            | PutField(_) | New(_) | ANewArray(_) | CheckCast(_) | InstanceOf(_) => 3,

            Invoke(InvokeType::Interface(_), _) | InvokeDynamic(_) => 5,
            Invoke(_, _) => 3,
            MultiANewArray(_, _) => 4,

            _ => 1,
        }
    }
}

/// Branching JVM bytecode instruction
///
/// The type parameter abstracts over the representation of jump targets: labels while code is
/// being assembled, byte offsets when read out of a class file, and instruction indices once a
/// method body is resolved.
#[derive(Clone, Debug, PartialEq)]
pub enum BranchInstruction<Lbl> {
    If(OrdComparison, Lbl), // covers `ifeq`, `ifne`, `iflt`, `ifge`, `ifgt`, `ifle`
    IfICmp(OrdComparison, Lbl), // covers `if_icmpeq`, `if_icmpne`, `if_icmplt`, ... `if_icmple`
    IfACmp(EqComparison, Lbl), // covers `if_acmpeq`, `if_acmpne`
    IfNull(EqComparison, Lbl), // covers `ifnull`, `ifnonnull`
    Goto(Lbl),
    GotoW(Lbl),
    TableSwitch {
        /// `default` must be at a multiple of four bytes from the start of the current method, so
        /// there must be a 0-3 inclusive byte padding
        padding: u8,

        /// Jump target if the argument is less than `low` or greater than
        /// `low + targets.len()`
        default: Lbl,

        /// Value associated with the first jump target
        low: i32,

        /// Jump targets
        targets: Vec<Lbl>,
    },
    LookupSwitch {
        /// `default` must be at a multiple of four bytes from the start of the current method, so
        /// there must be a 0-3 inclusive byte padding
        padding: u8,

        /// Jump target if there is no corresponding key
        default: Lbl,

        /// Jump targets (sorted so that the keys are ascending)
        targets: Vec<(i32, Lbl)>,
    },
    IReturn,
    LReturn,
    FReturn,
    DReturn,
    AReturn,
    Return,
    AThrow,

    /// Jump to a subroutine, pushing the address of the next instruction
    Jsr(Lbl),
    JsrW(Lbl),

    /// Return from a subroutine to the address stored in a local (covers `wide ret`)
    Ret(u16),
}

impl<Lbl: Copy> BranchInstruction<Lbl> {
    /// Can execution continue with the next instruction?
    ///
    /// Subroutine calls don't count: the next instruction is only reached by a return.
    pub fn falls_through(&self) -> bool {
        matches!(
            self,
            BranchInstruction::If(_, _)
                | BranchInstruction::IfICmp(_, _)
                | BranchInstruction::IfACmp(_, _)
                | BranchInstruction::IfNull(_, _)
        )
    }

    /// Non-fallthrough targets of regular jumps (not subroutine calls)
    pub fn jump_targets(&self) -> Vec<Lbl> {
        match self {
            BranchInstruction::If(_, lbl)
            | BranchInstruction::IfICmp(_, lbl)
            | BranchInstruction::IfACmp(_, lbl)
            | BranchInstruction::IfNull(_, lbl)
            | BranchInstruction::Goto(lbl)
            | BranchInstruction::GotoW(lbl) => vec![*lbl],
            BranchInstruction::TableSwitch {
                default, targets, ..
            } => {
                let mut ts = vec![*default];
                ts.extend(targets.iter().copied());
                ts
            }
            BranchInstruction::LookupSwitch {
                default, targets, ..
            } => {
                let mut ts = vec![*default];
                ts.extend(targets.iter().map(|(_, target)| *target));
                ts
            }
            BranchInstruction::IReturn
            | BranchInstruction::LReturn
            | BranchInstruction::FReturn
            | BranchInstruction::DReturn
            | BranchInstruction::AReturn
            | BranchInstruction::Return
            | BranchInstruction::AThrow
            | BranchInstruction::Jsr(_)
            | BranchInstruction::JsrW(_)
            | BranchInstruction::Ret(_) => vec![],
        }
    }

    /// Entry of the subroutine called, if this is a subroutine call
    pub fn subroutine_target(&self) -> Option<Lbl> {
        match self {
            BranchInstruction::Jsr(lbl) | BranchInstruction::JsrW(lbl) => Some(*lbl),
            _ => None,
        }
    }

    /// Local holding the return address, if this is a subroutine return
    pub fn return_address_slot(&self) -> Option<u16> {
        match self {
            BranchInstruction::Ret(idx) => Some(*idx),
            _ => None,
        }
    }

    /// Opcode category of the instruction
    pub fn effect(&self) -> Effect {
        match self {
            BranchInstruction::If(_, _) | BranchInstruction::IfNull(_, _) => Effect::Consume(1),
            BranchInstruction::IfICmp(_, _) | BranchInstruction::IfACmp(_, _) => {
                Effect::Consume(2)
            }
            BranchInstruction::Goto(_) | BranchInstruction::GotoW(_) => Effect::Nothing,
            BranchInstruction::TableSwitch { .. } | BranchInstruction::LookupSwitch { .. } => {
                Effect::Consume(1)
            }
            BranchInstruction::IReturn
            | BranchInstruction::LReturn
            | BranchInstruction::FReturn
            | BranchInstruction::DReturn
            | BranchInstruction::AReturn
            | BranchInstruction::AThrow => Effect::Consume(1),
            BranchInstruction::Return => Effect::Nothing,
            BranchInstruction::Jsr(_) | BranchInstruction::JsrW(_) => Effect::CallSubroutine,
            BranchInstruction::Ret(idx) => Effect::ReturnFromSubroutine(*idx),
        }
    }

    /// Operand stack slots popped and pushed (`long` and `double` count for two)
    pub fn stack_slots(&self) -> (usize, usize) {
        match self {
            BranchInstruction::If(_, _)
            | BranchInstruction::IfNull(_, _)
            | BranchInstruction::TableSwitch { .. }
            | BranchInstruction::LookupSwitch { .. }
            | BranchInstruction::IReturn
            | BranchInstruction::FReturn
            | BranchInstruction::AReturn
            | BranchInstruction::AThrow => (1, 0),
            BranchInstruction::IfICmp(_, _)
            | BranchInstruction::IfACmp(_, _)
            | BranchInstruction::LReturn
            | BranchInstruction::DReturn => (2, 0),
            BranchInstruction::Goto(_)
            | BranchInstruction::GotoW(_)
            | BranchInstruction::Return
            | BranchInstruction::Ret(_) => (0, 0),
            BranchInstruction::Jsr(_) | BranchInstruction::JsrW(_) => (0, 1),
        }
    }

    /// Rewrite the jump targets, failing on the first target that can't be mapped
    pub fn map_labels<Lbl2, E>(
        &self,
        mut map_label: impl FnMut(&Lbl) -> Result<Lbl2, E>,
    ) -> Result<BranchInstruction<Lbl2>, E> {
        use BranchInstruction::*;

        Ok(match self {
            If(op, lbl) => If(*op, map_label(lbl)?),
            IfICmp(op, lbl) => IfICmp(*op, map_label(lbl)?),
            IfACmp(op, lbl) => IfACmp(*op, map_label(lbl)?),
            IfNull(op, lbl) => IfNull(*op, map_label(lbl)?),
            Goto(lbl) => Goto(map_label(lbl)?),
            GotoW(lbl) => GotoW(map_label(lbl)?),
            TableSwitch {
                padding,
                default,
                low,
                targets,
            } => TableSwitch {
                padding: *padding,
                default: map_label(default)?,
                low: *low,
                targets: targets.iter().map(&mut map_label).collect::<Result<_, _>>()?,
            },
            LookupSwitch {
                padding,
                default,
                targets,
            } => LookupSwitch {
                padding: *padding,
                default: map_label(default)?,
                targets: targets
                    .iter()
                    .map(|(key, lbl)| map_label(lbl).map(|lbl| (*key, lbl)))
                    .collect::<Result<_, _>>()?,
            },
            IReturn => IReturn,
            LReturn => LReturn,
            FReturn => FReturn,
            DReturn => DReturn,
            AReturn => AReturn,
            Return => Return,
            AThrow => AThrow,
            Jsr(lbl) => Jsr(map_label(lbl)?),
            JsrW(lbl) => JsrW(map_label(lbl)?),
            Ret(idx) => Ret(*idx),
        })
    }

    /// Set the alignment padding of a switch (no-op for other instructions)
    pub fn set_padding(&mut self, new_padding: u8) {
        match self {
            BranchInstruction::TableSwitch { padding, .. }
            | BranchInstruction::LookupSwitch { padding, .. } => *padding = new_padding,
            _ => (),
        }
    }
}

impl<Lbl> Width for BranchInstruction<Lbl> {
    fn width(&self) -> usize {
        match self {
            BranchInstruction::IReturn
            | BranchInstruction::LReturn
            | BranchInstruction::FReturn
            | BranchInstruction::DReturn
            | BranchInstruction::AReturn
            | BranchInstruction::Return
            | BranchInstruction::AThrow => 1,

            BranchInstruction::Goto(_)
            | BranchInstruction::Jsr(_)
            | BranchInstruction::If(_, _)
            | BranchInstruction::IfICmp(_, _)
            | BranchInstruction::IfACmp(_, _)
            | BranchInstruction::IfNull(_, _) => 3,

            BranchInstruction::GotoW(_) | BranchInstruction::JsrW(_) => 5,

            BranchInstruction::Ret(idx) => {
                if *idx <= 255 {
                    2
                } else {
                    4
                }
            }

            BranchInstruction::TableSwitch {
                padding, targets, ..
            } => 1 + *padding as usize + 4 * (3 + targets.len()),

            BranchInstruction::LookupSwitch {
                padding, targets, ..
            } => 1 + *padding as usize + 8 * (1 + targets.len()),
        }
    }
}

/// Any instruction in a method body
#[derive(Clone, Debug, PartialEq)]
pub enum Insn<Lbl> {
    Simple(Instruction),
    Branch(BranchInstruction<Lbl>),
}

impl<Lbl: Copy> Insn<Lbl> {
    /// Opcode category of the instruction
    pub fn effect(&self) -> Effect {
        match self {
            Insn::Simple(insn) => insn.effect(),
            Insn::Branch(insn) => insn.effect(),
        }
    }

    /// Local variable accessed by the instruction, if any
    pub fn local_access(&self) -> Option<LocalAccess> {
        match self {
            Insn::Simple(insn) => insn.local_access(),
            Insn::Branch(BranchInstruction::Ret(idx)) => Some(LocalAccess::read(*idx, 1)),
            Insn::Branch(_) => None,
        }
    }

    /// Operand stack slots popped and pushed
    pub fn stack_slots(&self) -> (usize, usize) {
        match self {
            Insn::Simple(insn) => insn.stack_slots(),
            Insn::Branch(insn) => insn.stack_slots(),
        }
    }
}

impl<Lbl> Width for Insn<Lbl> {
    fn width(&self) -> usize {
        match self {
            Insn::Simple(insn) => insn.width(),
            Insn::Branch(insn) => insn.width(),
        }
    }
}

impl<Lbl> From<Instruction> for Insn<Lbl> {
    fn from(insn: Instruction) -> Insn<Lbl> {
        Insn::Simple(insn)
    }
}

impl<Lbl> From<BranchInstruction<Lbl>> for Insn<Lbl> {
    fn from(insn: BranchInstruction<Lbl>) -> Insn<Lbl> {
        Insn::Branch(insn)
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

/// Equality/inequality comparison operators
#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash)]
pub enum EqComparison {
    EQ,
    NE,
}

/// Type of method to invoke
///
/// Note: `InvokeDynamic` is kept separate because it has no receiver.
#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash)]
pub enum InvokeType {
    Virtual,
    Special,
    Static,
    Interface(u8), // `count` is of total arguments, where `long`/`double` count for 2
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::jvm::ParseDescriptor;

    #[test]
    fn encoded_widths() {
        assert_eq!(Instruction::ILoad(3).width(), 1);
        assert_eq!(Instruction::ILoad(4).width(), 2);
        assert_eq!(Instruction::AStore(300).width(), 4);
        assert_eq!(Instruction::IInc(1, 1).width(), 3);
        assert_eq!(Instruction::IInc(1, 1000).width(), 6);
        assert_eq!(BranchInstruction::<()>::Ret(2).width(), 2);
        assert_eq!(BranchInstruction::Jsr(()).width(), 3);
        assert_eq!(
            BranchInstruction::TableSwitch {
                padding: 2,
                default: (),
                low: 0,
                targets: vec![(), ()],
            }
            .width(),
            23
        );
    }

    #[test]
    fn invocation_effects() {
        let descriptor = MethodDescriptor::<BinaryName>::parse("(IJLjava/lang/String;)D").unwrap();
        let virt = Instruction::Invoke(InvokeType::Virtual, descriptor.clone());
        assert_eq!(
            virt.effect(),
            Effect::Nary {
                pops: 4,
                pushes: true
            }
        );
        assert_eq!(virt.pushed_width(), 2);

        let stat = Instruction::Invoke(InvokeType::Static, descriptor);
        assert_eq!(
            stat.effect(),
            Effect::Nary {
                pops: 3,
                pushes: true
            }
        );
    }

    #[test]
    fn local_accesses() {
        let store: Insn<()> = Instruction::DStore(5).into();
        assert_eq!(
            store.local_access(),
            Some(LocalAccess {
                slot: 5,
                width: 2,
                write: true
            })
        );
        assert_eq!(store.local_access().map(|access| access.end()), Some(7));

        let ret: Insn<()> = BranchInstruction::Ret(2).into();
        assert_eq!(ret.local_access().map(|access| access.write), Some(false));
        assert_eq!(ret.effect(), Effect::ReturnFromSubroutine(2));
    }

    #[test]
    fn branch_targets() {
        let cond = BranchInstruction::If(OrdComparison::NE, 7usize);
        assert!(cond.falls_through());
        assert_eq!(cond.jump_targets(), vec![7]);

        let jsr = BranchInstruction::Jsr(3usize);
        assert!(!jsr.falls_through());
        assert!(jsr.jump_targets().is_empty());
        assert_eq!(jsr.subroutine_target(), Some(3));

        let switch = BranchInstruction::LookupSwitch {
            padding: 0,
            default: 1usize,
            targets: vec![(10, 2), (20, 3)],
        };
        assert_eq!(switch.jump_targets(), vec![1, 2, 3]);
        let shifted: Result<_, ()> = switch.map_labels(|lbl| Ok(lbl + 10));
        assert_eq!(shifted.unwrap().jump_targets(), vec![11, 12, 13]);
    }
}
