use super::{BinaryName, Name, UnqualifiedName};
use std::fmt;
use std::fmt::Debug;

/// Primitive types
///
/// See <https://docs.oracle.com/javase/specs/jvms/se16/html/jvms-4.html#jvms-4.3.2>
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum BaseType {
    Byte,
    Char,
    Double,
    Float,
    Int,
    Long,
    Short,
    Boolean,
}

impl BaseType {
    /// Single-character descriptor form
    pub fn render_char(&self) -> char {
        match self {
            BaseType::Byte => 'B',
            BaseType::Char => 'C',
            BaseType::Double => 'D',
            BaseType::Float => 'F',
            BaseType::Int => 'I',
            BaseType::Long => 'J',
            BaseType::Short => 'S',
            BaseType::Boolean => 'Z',
        }
    }

    /// Parse the single-character descriptor form
    pub fn parse_char(c: char) -> Option<BaseType> {
        match c {
            'B' => Some(BaseType::Byte),
            'C' => Some(BaseType::Char),
            'D' => Some(BaseType::Double),
            'F' => Some(BaseType::Float),
            'I' => Some(BaseType::Int),
            'J' => Some(BaseType::Long),
            'S' => Some(BaseType::Short),
            'Z' => Some(BaseType::Boolean),
            _ => None,
        }
    }

    /// Boxed wrapper class for this primitive
    pub fn wrapper_class(&self) -> BinaryName {
        match self {
            BaseType::Byte => BinaryName::BYTE,
            BaseType::Char => BinaryName::CHARACTER,
            BaseType::Double => BinaryName::DOUBLE,
            BaseType::Float => BinaryName::FLOAT,
            BaseType::Int => BinaryName::INTEGER,
            BaseType::Long => BinaryName::LONG,
            BaseType::Short => BinaryName::SHORT,
            BaseType::Boolean => BinaryName::BOOLEAN,
        }
    }

    /// Name of the unboxing method on the wrapper class (eg. `intValue`)
    pub fn unbox_method(&self) -> UnqualifiedName {
        match self {
            BaseType::Byte => UnqualifiedName::BYTEVALUE,
            BaseType::Char => UnqualifiedName::CHARVALUE,
            BaseType::Double => UnqualifiedName::DOUBLEVALUE,
            BaseType::Float => UnqualifiedName::FLOATVALUE,
            BaseType::Int => UnqualifiedName::INTVALUE,
            BaseType::Long => UnqualifiedName::LONGVALUE,
            BaseType::Short => UnqualifiedName::SHORTVALUE,
            BaseType::Boolean => UnqualifiedName::BOOLEANVALUE,
        }
    }
}

/// Type category an instruction must match
///
/// Every type-sensitive operation (load/store/return/dup/pop) selects its variant based on this.
/// `Long` and `Double` are wide: they occupy two stack/local slots.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum TypeKind {
    Reference,
    Int,
    Long,
    Float,
    Double,
}

impl TypeKind {
    /// How many stack/local slots does a value of this kind occupy?
    pub fn width(&self) -> u16 {
        match self {
            TypeKind::Long | TypeKind::Double => 2,
            _ => 1,
        }
    }
}

/// Types of fields, parameters, locals
#[derive(Clone, PartialEq, Eq, Hash)]
pub enum FieldType {
    Base(BaseType),
    Object(BinaryName),
    Array(Box<FieldType>),
}

impl FieldType {
    pub const fn int() -> FieldType {
        FieldType::Base(BaseType::Int)
    }
    pub const fn long() -> FieldType {
        FieldType::Base(BaseType::Long)
    }
    pub const fn float() -> FieldType {
        FieldType::Base(BaseType::Float)
    }
    pub const fn double() -> FieldType {
        FieldType::Base(BaseType::Double)
    }
    pub const fn boolean() -> FieldType {
        FieldType::Base(BaseType::Boolean)
    }
    pub fn object(name: BinaryName) -> FieldType {
        FieldType::Object(name)
    }
    pub fn array(elem: FieldType) -> FieldType {
        FieldType::Array(Box::new(elem))
    }

    /// Type category driving opcode variant selection
    pub fn kind(&self) -> TypeKind {
        match self {
            FieldType::Base(BaseType::Long) => TypeKind::Long,
            FieldType::Base(BaseType::Float) => TypeKind::Float,
            FieldType::Base(BaseType::Double) => TypeKind::Double,
            FieldType::Base(_) => TypeKind::Int,
            FieldType::Object(_) | FieldType::Array(_) => TypeKind::Reference,
        }
    }

    /// Number of stack/local slots a value of this type occupies
    pub fn width(&self) -> u16 {
        self.kind().width()
    }
}

impl RenderDescriptor for FieldType {
    fn render_to(&self, write_to: &mut String) {
        match self {
            FieldType::Base(base) => write_to.push(base.render_char()),
            FieldType::Object(name) => {
                write_to.push('L');
                write_to.push_str(name.as_str());
                write_to.push(';');
            }
            FieldType::Array(elem) => {
                write_to.push('[');
                elem.render_to(write_to);
            }
        }
    }
}

impl ParseDescriptor for FieldType {
    fn parse_from(chars: &mut std::iter::Peekable<std::str::Chars>) -> Result<FieldType, String> {
        match chars.next() {
            Some('L') => {
                let mut name = String::new();
                loop {
                    match chars.next() {
                        Some(';') => break,
                        Some(c) => name.push(c),
                        None => return Err(String::from("Unterminated object descriptor")),
                    }
                }
                let name = BinaryName::from_string(name)?;
                Ok(FieldType::Object(name))
            }
            Some('[') => {
                let elem = FieldType::parse_from(chars)?;
                Ok(FieldType::Array(Box::new(elem)))
            }
            Some(c) => match BaseType::parse_char(c) {
                Some(base) => Ok(FieldType::Base(base)),
                None => Err(format!("Invalid descriptor character '{}'", c)),
            },
            None => Err(String::from("Empty field descriptor")),
        }
    }
}

impl Debug for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

/// Types of methods
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct MethodDescriptor {
    pub parameters: Vec<FieldType>,
    pub return_type: Option<FieldType>,
}

impl MethodDescriptor {
    /// Total number of local slots the parameters occupy (including an implicit `this` if the
    /// method is not static)
    pub fn parameter_length(&self, includes_this: bool) -> u16 {
        let initial = if includes_this { 1 } else { 0 };
        self.parameters
            .iter()
            .fold(initial, |acc, typ| acc + typ.width())
    }

    /// Local slot offset of parameter `index`
    pub fn parameter_offset(&self, index: usize, includes_this: bool) -> u16 {
        let initial = if includes_this { 1 } else { 0 };
        self.parameters[0..index]
            .iter()
            .fold(initial, |acc, typ| acc + typ.width())
    }
}

impl RenderDescriptor for MethodDescriptor {
    fn render_to(&self, write_to: &mut String) {
        write_to.push('(');
        for parameter in &self.parameters {
            parameter.render_to(write_to);
        }
        write_to.push(')');
        match &self.return_type {
            None => write_to.push('V'),
            Some(typ) => typ.render_to(write_to),
        }
    }
}

impl ParseDescriptor for MethodDescriptor {
    fn parse_from(
        chars: &mut std::iter::Peekable<std::str::Chars>,
    ) -> Result<MethodDescriptor, String> {
        if chars.next() != Some('(') {
            return Err(String::from("Method descriptor must start with '('"));
        }
        let mut parameters = vec![];
        while chars.peek() != Some(&')') {
            parameters.push(FieldType::parse_from(chars)?);
        }
        let _ = chars.next();
        let return_type = if chars.peek() == Some(&'V') {
            let _ = chars.next();
            None
        } else {
            Some(FieldType::parse_from(chars)?)
        };
        Ok(MethodDescriptor {
            parameters,
            return_type,
        })
    }
}

impl Debug for MethodDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

/// Things that can be rendered into JVM-style descriptor strings
pub trait RenderDescriptor {
    fn render_to(&self, write_to: &mut String);

    fn render(&self) -> String {
        let mut string = String::new();
        self.render_to(&mut string);
        string
    }
}

/// Things that can be parsed from JVM-style descriptor strings
pub trait ParseDescriptor: Sized {
    fn parse_from(chars: &mut std::iter::Peekable<std::str::Chars>) -> Result<Self, String>;

    fn parse(source: &str) -> Result<Self, String> {
        let mut chars = source.chars().peekable();
        let parsed = Self::parse_from(&mut chars)?;
        if chars.next().is_some() {
            Err(format!("Trailing characters in descriptor '{}'", source))
        } else {
            Ok(parsed)
        }
    }
}

/// Full signature of a method: name, descriptor, and declared checked exceptions
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct MethodSignature {
    pub name: UnqualifiedName,
    pub descriptor: MethodDescriptor,
    pub throws: Vec<BinaryName>,
}

impl MethodSignature {
    pub fn new(name: UnqualifiedName, descriptor: MethodDescriptor) -> MethodSignature {
        MethodSignature {
            name,
            descriptor,
            throws: vec![],
        }
    }

    pub fn with_throws(mut self, throws: Vec<BinaryName>) -> MethodSignature {
        self.throws = throws;
        self
    }

    /// Identity key for override and collision checks
    pub fn key(&self) -> MethodKey {
        MethodKey {
            name: self.name.clone(),
            parameters: self.descriptor.parameters.clone(),
        }
    }
}

/// Key under which method signatures are compared
///
/// The return type is deliberately excluded (two methods differing only in return type would be a
/// same-erasure overload, which is illegal to introduce) but parameter types are compared exactly.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct MethodKey {
    pub name: UnqualifiedName,
    pub parameters: Vec<FieldType>,
}
