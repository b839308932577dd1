use crate::code::Label;
use crate::model::{BinaryName, MethodKey, UnqualifiedName};

/// Errors surfaced by the transformation engine
///
/// Everything here is synchronous and non-retryable: a failed operation leaves its session in an
/// indeterminate state, so callers are expected to discard the session and restart from a fresh
/// decode. Variants carry the class/member names needed to diagnose the failure without a
/// debugger.
#[derive(Debug)]
pub enum Error {
    IoError(std::io::Error),

    /// A name failed validation
    MalformedName(String),

    /// A descriptor string failed to parse
    BadDescriptor(String),

    /// The codec rejected its input
    MalformedClass {
        class: String,
        reason: String,
    },

    /// A class could not be located through the loader
    MissingClass(BinaryName),

    /// A referenced member does not exist on its class
    MissingMember {
        class: BinaryName,
        member: UnqualifiedName,
    },

    /// Operation attempted on a session after `create_instantiator`
    SessionLocked(BinaryName),

    /// Operation attempted on an instruction builder after its owning construct finished
    BuilderFinalized,

    /// A named local was used before being declared
    UnknownLocal(String),

    /// `load_this` in a static method body
    NoThisInStaticMethod,

    /// Argument index past the end of the method descriptor
    ArgumentOutOfRange {
        index: usize,
        available: usize,
    },

    /// A field already left its initial state (injected or conduit-backed)
    FieldStateConflict {
        class: BinaryName,
        field: UnqualifiedName,
        existing: &'static str,
    },

    /// Two unrelated features tried to claim the same field
    FieldAlreadyClaimed {
        class: BinaryName,
        field: UnqualifiedName,
        existing_tag: String,
        new_tag: String,
    },

    /// Public fields cannot be intercepted
    FieldNotInterceptable {
        class: BinaryName,
        field: UnqualifiedName,
    },

    /// Introducing a method would collide with an existing incompatible one
    MethodCollision {
        class: BinaryName,
        method: MethodKey,
    },

    /// Accessor creation found a same-named method already present
    AccessorCollision {
        class: BinaryName,
        method: UnqualifiedName,
    },

    /// A proxied or introduced type was expected to be an interface
    NotAnInterface(BinaryName),

    /// Advice requires an instance method
    AdviceOnStatic {
        class: BinaryName,
        method: UnqualifiedName,
    },

    /// Switch case registered twice
    DuplicateSwitchCase(i32),

    /// Switch case registered after the default handler
    SwitchCaseAfterDefault(i32),

    /// Switch case outside the declared `[low, high]` range
    SwitchCaseOutOfRange {
        case: i32,
        low: i32,
        high: i32,
    },

    /// A label was referenced but never placed before encoding
    UnplacedLabel(Label),

    /// A transformation re-entered a class already being transformed
    TransformationCycle(Vec<BinaryName>),

    /// Runtime linking failed
    LinkError {
        class: BinaryName,
        reason: String,
    },
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Error {
        Error::IoError(err)
    }
}
