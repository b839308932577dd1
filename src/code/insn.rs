use crate::model::{BaseType, BinaryName, FieldType, MethodDescriptor, TypeKind, UnqualifiedName};
use std::fmt;
use std::ops::Not;

/// Opaque label marking a position in an instruction sequence
#[derive(Copy, Clone, Hash, Eq, PartialEq)]
pub struct Label(pub(crate) u32);

impl Label {
    /// Get the next fresh label
    pub fn next(&self) -> Label {
        Label(self.0 + 1)
    }
}

impl fmt::Debug for Label {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_fmt(format_args!("l{}", self.0))
    }
}

/// Generates fresh labels
///
/// Cloning does not split the generator source - the cloned generator will produce the same
/// sequence of labels as the original.
#[derive(Clone, Debug)]
pub struct LabelGenerator(Label);

impl LabelGenerator {
    pub fn new() -> LabelGenerator {
        LabelGenerator(Label(0))
    }

    /// Resume generating after the highest label already present in a decoded body
    pub fn starting_after(highest: u32) -> LabelGenerator {
        LabelGenerator(Label(highest + 1))
    }

    pub fn fresh_label(&mut self) -> Label {
        let to_return = self.0;
        self.0 = self.0.next();
        to_return
    }
}

impl Default for LabelGenerator {
    fn default() -> LabelGenerator {
        LabelGenerator::new()
    }
}

/// Reference to a method of some class
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct MethodRef {
    pub owner: BinaryName,
    pub name: UnqualifiedName,
    pub descriptor: MethodDescriptor,
}

/// Reference to a field of some class
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct FieldRef {
    pub owner: BinaryName,
    pub name: UnqualifiedName,
    pub descriptor: FieldType,
}

/// Method dispatch variants
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum InvokeKind {
    /// Dispatch on the runtime type of the receiver
    Virtual,

    /// No receiver
    Static,

    /// Exact dispatch: constructors and superclass calls
    Special,

    /// Dispatch through an interface type
    Interface,
}

/// Comparison condition for conditional branches
///
/// `Null`/`NonNull` pop one reference; `Zero`/`NonZero` pop one int; the remaining variants pop
/// two ints and compare them.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum Condition {
    Null,
    NonNull,
    Zero,
    NonZero,
    Equal,
    NotEqual,
    Less,
    LessOrEqual,
    Greater,
    GreaterOrEqual,
}

impl Not for Condition {
    type Output = Condition;

    fn not(self) -> Condition {
        match self {
            Condition::Null => Condition::NonNull,
            Condition::NonNull => Condition::Null,
            Condition::Zero => Condition::NonZero,
            Condition::NonZero => Condition::Zero,
            Condition::Equal => Condition::NotEqual,
            Condition::NotEqual => Condition::Equal,
            Condition::Less => Condition::GreaterOrEqual,
            Condition::LessOrEqual => Condition::Greater,
            Condition::Greater => Condition::LessOrEqual,
            Condition::GreaterOrEqual => Condition::Less,
        }
    }
}

/// Constant operands that require a constant-table entry when encoded
#[derive(Clone, PartialEq, Debug)]
pub enum ConstOperand {
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    Str(String),
    Class(BinaryName),
}

/// One symbolic instruction
///
/// Instructions reference members by name and descriptor rather than by pool index, and branch
/// targets are [`Label`]s resolved by the codec on encode. Type-sensitive operations carry the
/// [`TypeKind`] selecting the opcode variant (wide kinds select two-slot variants).
#[derive(Clone, PartialEq, Debug)]
pub enum Instruction {
    /// Pseudo-instruction placing a label at this position
    Mark(Label),

    /// Load a local variable slot
    LoadLocal(TypeKind, u16),

    /// Store into a local variable slot
    StoreLocal(TypeKind, u16),

    /// Push `null`
    ConstNull,

    /// Push a small integer with a canonical short-form opcode
    PushInt(i16),

    /// Push a constant through the constant table
    Const(ConstOperand),

    /// Increment an int local in place
    Inc(u16, i16),

    /// Invoke a method with the given dispatch
    Invoke(InvokeKind, MethodRef),

    /// Read an instance field
    GetField(FieldRef),

    /// Write an instance field
    PutField(FieldRef),

    /// Read a static field
    GetStatic(FieldRef),

    /// Write a static field
    PutStatic(FieldRef),

    /// Allocate an uninitialized instance (follow with a `Special` constructor invoke)
    New(BinaryName),

    /// Allocate an array; length popped from the stack
    NewArray(FieldType),

    /// Pop an array, push its length
    ArrayLength,

    /// Pop index and array, push the element
    LoadElement(TypeKind),

    /// Pop value, index and array, store the element
    StoreElement(TypeKind),

    /// Checked cast to a reference type
    CheckCast(FieldType),

    /// Box the primitive on top of the stack into its wrapper
    Box(BaseType),

    /// Unbox the wrapper on top of the stack into its primitive
    Unbox(BaseType),

    /// Numeric conversion between primitive kinds
    Convert(TypeKind, TypeKind),

    /// Duplicate the top value (one slot)
    Dup,

    /// Duplicate the top value (two slots)
    DupWide,

    /// Duplicate the top slot and insert it below the second slot
    DupX1,

    /// Discard the top value (one slot)
    Pop,

    /// Discard the top value (two slots)
    PopWide,

    /// Swap the top two (single-slot) values
    Swap,

    /// Pop a throwable and raise it
    Throw,

    /// Unconditional jump
    Jump(Label),

    /// Conditional jump, taken when the condition holds
    Branch(Condition, Label),

    /// Dense jump table over `low..=low + targets.len() - 1`
    Switch {
        low: i32,
        targets: Vec<Label>,
        default: Label,
    },

    /// Return from the method; `None` for void
    Return(Option<TypeKind>),
}

impl Instruction {
    /// Labels this instruction jumps to (marks excluded)
    pub fn jump_targets(&self) -> Vec<Label> {
        match self {
            Instruction::Jump(label) | Instruction::Branch(_, label) => vec![*label],
            Instruction::Switch {
                targets, default, ..
            } => {
                let mut labels = targets.clone();
                labels.push(*default);
                labels
            }
            _ => vec![],
        }
    }
}
