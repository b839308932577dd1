use std::borrow::Cow;
use std::fmt::{Debug, Error as FmtError, Formatter};

/// Names of methods and fields
///
/// See <https://docs.oracle.com/javase/specs/jvms/se16/html/jvms-4.html#jvms-4.2.2>
#[derive(Clone, Hash, Eq, PartialEq)]
pub struct UnqualifiedName(Cow<'static, str>);

/// Names of classes and interfaces
///
/// See <https://docs.oracle.com/javase/specs/jvms/se16/html/jvms-4.html#jvms-4.2.1>
#[derive(Clone, Hash, Eq, PartialEq, PartialOrd, Ord)]
pub struct BinaryName(Cow<'static, str>);

/// Extracts the raw underlying string name
impl AsRef<str> for UnqualifiedName {
    fn as_ref(&self) -> &str {
        self.0.as_ref()
    }
}

/// Extracts the raw underlying string name
impl AsRef<str> for BinaryName {
    fn as_ref(&self) -> &str {
        self.0.as_ref()
    }
}

pub trait Name: Sized {
    /// Check if a string would be a valid name
    fn check_valid(name: impl AsRef<str>) -> Result<(), String>;

    /// Extract the raw underlying string data
    fn as_cow(&self) -> &Cow<'static, str>;

    /// Extract the raw underlying string name
    fn as_str(&self) -> &str {
        self.as_cow().as_ref()
    }

    /// Try to construct a name from a string
    fn from_string(name: String) -> Result<Self, String>;
}

impl Name for UnqualifiedName {
    fn check_valid(name: impl AsRef<str>) -> Result<(), String> {
        let name = name.as_ref();
        if name == "<init>" || name == "<clinit>" {
            Ok(())
        } else if name.contains(&['.', ';', '[', '/', '<', '>'][..]) {
            Err(format!(
                "Unqualified name '{}' contains an illegal character",
                name
            ))
        } else if name.is_empty() {
            Err(format!("Unqualified name '{}' is empty", name))
        } else {
            Ok(())
        }
    }

    fn as_cow(&self) -> &Cow<'static, str> {
        &self.0
    }

    fn from_string(name: String) -> Result<Self, String> {
        match Self::check_valid(&name) {
            Ok(()) => Ok(UnqualifiedName(Cow::Owned(name))),
            Err(msg) => Err(msg),
        }
    }
}

impl Name for BinaryName {
    fn check_valid(name: impl AsRef<str>) -> Result<(), String> {
        let name = name.as_ref();
        if name.is_empty() {
            Err(format!("Binary name '{}' is empty", name))
        } else {
            name.split('/').map(UnqualifiedName::check_valid).collect()
        }
    }

    fn as_cow(&self) -> &Cow<'static, str> {
        &self.0
    }

    fn from_string(name: String) -> Result<Self, String> {
        match Self::check_valid(&name) {
            Ok(()) => Ok(BinaryName(Cow::Owned(name))),
            Err(msg) => Err(msg),
        }
    }
}

impl Debug for UnqualifiedName {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), FmtError> {
        f.write_str(self.0.as_ref())
    }
}
impl Debug for BinaryName {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), FmtError> {
        f.write_str(self.0.as_ref())
    }
}

impl From<UnqualifiedName> for BinaryName {
    fn from(name: UnqualifiedName) -> BinaryName {
        BinaryName(name.0)
    }
}

impl UnqualifiedName {
    /// Concatenate the contents of two unqualified names to produce a third
    pub fn concat(&self, other: &UnqualifiedName) -> UnqualifiedName {
        UnqualifiedName(Cow::Owned(format!("{}{}", self.as_str(), other.as_str())))
    }

    /// Append a numeric suffix to the name
    pub fn numbered(&self, n: usize) -> UnqualifiedName {
        UnqualifiedName(Cow::Owned(format!("{}_{}", self.as_str(), n)))
    }

    const fn name(value: &'static str) -> UnqualifiedName {
        UnqualifiedName(Cow::Borrowed(value))
    }

    // Special unqualified names - only these are allowed to have angle brackets in them
    pub const INIT: Self = Self::name("<init>");
    pub const CLINIT: Self = Self::name("<clinit>");

    // JDK names
    pub const VALUEOF: Self = Self::name("valueOf");
    pub const INTVALUE: Self = Self::name("intValue");
    pub const LONGVALUE: Self = Self::name("longValue");
    pub const FLOATVALUE: Self = Self::name("floatValue");
    pub const DOUBLEVALUE: Self = Self::name("doubleValue");
    pub const BOOLEANVALUE: Self = Self::name("booleanValue");
    pub const CHARVALUE: Self = Self::name("charValue");
    pub const SHORTVALUE: Self = Self::name("shortValue");
    pub const BYTEVALUE: Self = Self::name("byteValue");

    // Names on the runtime support types
    pub const GET: Self = Self::name("get");
    pub const SET: Self = Self::name("set");
    pub const INVOKE: Self = Self::name("invoke");
    pub const COMPUTE: Self = Self::name("compute");
    pub const ADVISE: Self = Self::name("advise");
    pub const ADVICECOUNT: Self = Self::name("adviceCount");
    pub const ONCONSTRUCT: Self = Self::name("onConstruct");
    pub const GETREQUIRED: Self = Self::name("getRequired");
    pub const SUCCESS: Self = Self::name("success");
    pub const FAILURE: Self = Self::name("failure");

    // Names on generated invocation classes
    pub const GETPARAMETER: Self = Self::name("getParameter");
    pub const SETPARAMETER: Self = Self::name("setParameter");
    pub const GETRETURNVALUE: Self = Self::name("getReturnValue");
    pub const SETRETURNVALUE: Self = Self::name("setReturnValue");
    pub const PROCEED: Self = Self::name("proceed");
}

impl BinaryName {
    /// Concatenate the contents of an unqualified name onto the end of the binary name to produce
    /// a third. If you want a new segment, use `join` instead.
    pub fn concat(&self, other: &UnqualifiedName) -> BinaryName {
        BinaryName(Cow::Owned(format!("{}{}", self.as_str(), other.as_str())))
    }

    /// Join segments from the other name onto the end of this binary name
    pub fn join(&self, other: impl Name) -> BinaryName {
        BinaryName(Cow::Owned(format!("{}/{}", self.as_str(), other.as_str())))
    }

    /// Append an arbitrary (already validated) suffix
    pub fn suffixed(&self, suffix: &str) -> BinaryName {
        BinaryName(Cow::Owned(format!("{}{}", self.as_str(), suffix)))
    }

    const fn name(value: &'static str) -> BinaryName {
        BinaryName(Cow::Borrowed(value))
    }

    // JDK names
    pub const OBJECT: Self = Self::name("java/lang/Object");
    pub const STRING: Self = Self::name("java/lang/String");
    pub const BOOLEAN: Self = Self::name("java/lang/Boolean");
    pub const BYTE: Self = Self::name("java/lang/Byte");
    pub const CHARACTER: Self = Self::name("java/lang/Character");
    pub const SHORT: Self = Self::name("java/lang/Short");
    pub const INTEGER: Self = Self::name("java/lang/Integer");
    pub const LONG: Self = Self::name("java/lang/Long");
    pub const FLOAT: Self = Self::name("java/lang/Float");
    pub const DOUBLE: Self = Self::name("java/lang/Double");
    pub const THROWABLE: Self = Self::name("java/lang/Throwable");
    pub const EXCEPTION: Self = Self::name("java/lang/Exception");
    pub const ERROR: Self = Self::name("java/lang/Error");
    pub const RUNTIMEEXCEPTION: Self = Self::name("java/lang/RuntimeException");
    pub const ILLEGALSTATEEXCEPTION: Self = Self::name("java/lang/IllegalStateException");
    pub const ILLEGALARGUMENTEXCEPTION: Self = Self::name("java/lang/IllegalArgumentException");

    // Runtime support types the generated code links against
    pub const SHAREDCONTEXT: Self = Self::name("plastic/SharedContext");
    pub const INSTANCECONTEXT: Self = Self::name("plastic/InstanceContext");
    pub const ADVICEBUNDLE: Self = Self::name("plastic/AdviceBundle");
    pub const FIELDCONDUIT: Self = Self::name("plastic/FieldConduit");
    pub const COMPUTEDVALUE: Self = Self::name("plastic/ComputedValue");
    pub const CONSTRUCTORCALLBACK: Self = Self::name("plastic/ConstructorCallback");
    pub const METHODRESULT: Self = Self::name("plastic/MethodResult");
}

#[test]
fn valid_names() {
    assert!(UnqualifiedName::from_string(String::from("field$1")).is_ok());
    assert!(UnqualifiedName::from_string(String::from("bad/name")).is_err());
    assert!(UnqualifiedName::from_string(String::from("")).is_err());
    assert!(BinaryName::from_string(String::from("java/lang/Object")).is_ok());
    assert!(BinaryName::from_string(String::from("java//Object")).is_err());
}
