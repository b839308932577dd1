use super::{
    AnnotationNode, BinaryName, ClassAccessFlags, FieldAccessFlags, FieldType, MethodAccessFlags,
    MethodSignature,
};
use crate::code::{Instruction, Label};

/// Mutable representation of one class under transformation
///
/// A `ClassNode` is produced by decoding raw bytecode through the codec (or synthesized as a bare
/// shell for dynamically created subclasses), mutated throughout a single transformation pass, and
/// consumed exactly once when it is encoded back to bytes and defined in a loader. It is never
/// mutated after that; the owning session enforces the one-shot discipline.
#[derive(Clone, Debug)]
pub struct ClassNode {
    /// Internal name of the class (eg. `app/Widget`)
    pub name: BinaryName,

    /// Superclass name; only ever missing for `java/lang/Object` itself
    pub superclass: Option<BinaryName>,

    /// Implemented interfaces
    pub interfaces: Vec<BinaryName>,

    /// Access flags
    pub access_flags: ClassAccessFlags,

    /// Fields, in declaration order
    pub fields: Vec<FieldNode>,

    /// Methods, in declaration order
    pub methods: Vec<MethodNode>,

    /// Class-level annotations
    pub annotations: Vec<AnnotationNode>,
}

impl ClassNode {
    /// Synthesize a bare class shell extending the given superclass
    pub fn subclass_shell(name: BinaryName, superclass: BinaryName) -> ClassNode {
        ClassNode {
            name,
            superclass: Some(superclass),
            interfaces: vec![],
            access_flags: ClassAccessFlags::PUBLIC | ClassAccessFlags::SUPER,
            fields: vec![],
            methods: vec![],
            annotations: vec![],
        }
    }

    pub fn is_interface(&self) -> bool {
        self.access_flags.contains(ClassAccessFlags::INTERFACE)
    }

    /// Find a field by name
    pub fn field(&self, name: &str) -> Option<&FieldNode> {
        self.fields.iter().find(|f| f.name.as_ref() == name)
    }

    /// Find a method by name and parameter types
    pub fn method(&self, key: &super::MethodKey) -> Option<&MethodNode> {
        self.methods.iter().find(|m| &m.signature.key() == key)
    }
}

/// One field of a class under transformation
#[derive(Clone, Debug)]
pub struct FieldNode {
    pub access_flags: FieldAccessFlags,
    pub name: super::UnqualifiedName,
    pub descriptor: FieldType,
    pub annotations: Vec<AnnotationNode>,
}

impl FieldNode {
    pub fn is_static(&self) -> bool {
        self.access_flags.contains(FieldAccessFlags::STATIC)
    }
}

/// One method of a class under transformation
#[derive(Clone, Debug)]
pub struct MethodNode {
    pub access_flags: MethodAccessFlags,
    pub signature: MethodSignature,
    pub code: Option<Code>,
    pub annotations: Vec<AnnotationNode>,
}

impl MethodNode {
    pub fn is_static(&self) -> bool {
        self.access_flags.contains(MethodAccessFlags::STATIC)
    }

    pub fn is_abstract(&self) -> bool {
        self.access_flags.contains(MethodAccessFlags::ABSTRACT)
    }
}

/// Body of one method: an ordered instruction sequence plus its exception table
///
/// Control flow is expressed through `Label`s carried by `Instruction::Mark` pseudo-instructions;
/// the codec resolves marks to real offsets when encoding (and reconstructs them when decoding),
/// so nothing at this level ever deals in byte offsets.
#[derive(Clone, Debug, Default)]
pub struct Code {
    /// Number of local variable slots the body needs (parameters included)
    pub max_locals: u16,

    /// Instruction sequence
    pub instructions: Vec<Instruction>,

    /// Exception handler regions, in decreasing precedence order
    pub exception_table: Vec<ExceptionTableEntry>,

    /// Debug names for local variable slots
    pub local_names: Vec<LocalName>,
}

/// One exception handler region
#[derive(Clone, Debug)]
pub struct ExceptionTableEntry {
    /// First instruction covered
    pub start: Label,

    /// First instruction no longer covered
    pub end: Label,

    /// Where control transfers when the exception is caught
    pub handler: Label,

    /// Exception type caught; `None` catches everything
    pub catch_type: Option<BinaryName>,
}

/// Debug name for a local variable slot
#[derive(Clone, Debug)]
pub struct LocalName {
    pub slot: u16,
    pub name: String,
    pub descriptor: FieldType,
}
