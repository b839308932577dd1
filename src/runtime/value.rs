use crate::transform::{
    AdviceBundle, ComputedValue, ConstructorCallback, FieldConduit, InstanceContext, SharedContext,
};
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

/// One runtime value
///
/// Strings and reference types are shared by handle; cloning a `Value` never deep-copies an
/// object. Host values wrap live Rust objects handed into generated code.
#[derive(Clone)]
pub enum Value {
    Null,
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    Str(Rc<String>),
    Object(ObjRef),
    Array(ArrayRef),
    Host(HostValue),
}

impl Value {
    pub fn string(s: impl Into<String>) -> Value {
        Value::Str(Rc::new(s.into()))
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_int(&self) -> Result<i32, Thrown> {
        match self {
            Value::Int(i) => Ok(*i),
            other => Err(Thrown::type_error("int", other)),
        }
    }

    pub fn as_long(&self) -> Result<i64, Thrown> {
        match self {
            Value::Long(l) => Ok(*l),
            other => Err(Thrown::type_error("long", other)),
        }
    }

    pub fn as_float(&self) -> Result<f32, Thrown> {
        match self {
            Value::Float(f) => Ok(*f),
            other => Err(Thrown::type_error("float", other)),
        }
    }

    pub fn as_double(&self) -> Result<f64, Thrown> {
        match self {
            Value::Double(d) => Ok(*d),
            other => Err(Thrown::type_error("double", other)),
        }
    }

    pub fn as_str(&self) -> Result<&str, Thrown> {
        match self {
            Value::Str(s) => Ok(s.as_str()),
            other => Err(Thrown::type_error("String", other)),
        }
    }

    pub fn as_object(&self) -> Result<&ObjRef, Thrown> {
        match self {
            Value::Object(obj) => Ok(obj),
            other => Err(Thrown::type_error("object", other)),
        }
    }

    pub fn as_array(&self) -> Result<&ArrayRef, Thrown> {
        match self {
            Value::Array(arr) => Ok(arr),
            other => Err(Thrown::type_error("array", other)),
        }
    }

    /// Reference identity, where the value has one
    pub fn same_reference(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Object(a), Value::Object(b)) => Rc::ptr_eq(&a.0, &b.0),
            (Value::Array(a), Value::Array(b)) => Rc::ptr_eq(&a.0, &b.0),
            (Value::Str(a), Value::Str(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("null"),
            Value::Int(i) => write!(f, "{}", i),
            Value::Long(l) => write!(f, "{}L", l),
            Value::Float(x) => write!(f, "{}f", x),
            Value::Double(x) => write!(f, "{}d", x),
            Value::Str(s) => write!(f, "{:?}", s),
            Value::Object(obj) => write!(f, "{}@{:p}", obj.class_name(), Rc::as_ptr(&obj.0)),
            Value::Array(arr) => write!(f, "array[{}]", arr.len()),
            Value::Host(host) => write!(f, "{:?}", host),
        }
    }
}

/// Handle to a heap object
#[derive(Clone)]
pub struct ObjRef(pub(crate) Rc<RefCell<ObjectData>>);

pub(crate) struct ObjectData {
    pub class_name: String,
    pub fields: HashMap<String, Value>,
}

impl ObjRef {
    pub fn new(class_name: impl Into<String>) -> ObjRef {
        ObjRef(Rc::new(RefCell::new(ObjectData {
            class_name: class_name.into(),
            fields: HashMap::new(),
        })))
    }

    pub fn class_name(&self) -> String {
        self.0.borrow().class_name.clone()
    }

    /// Read a field, or `None` if it has never been written
    pub fn field(&self, name: &str) -> Option<Value> {
        self.0.borrow().fields.get(name).cloned()
    }

    pub fn set_field(&self, name: impl Into<String>, value: Value) {
        self.0.borrow_mut().fields.insert(name.into(), value);
    }
}

/// Handle to a heap array
#[derive(Clone)]
pub struct ArrayRef(pub(crate) Rc<RefCell<Vec<Value>>>);

impl ArrayRef {
    pub fn new(length: usize, fill: Value) -> ArrayRef {
        ArrayRef(Rc::new(RefCell::new(vec![fill; length])))
    }

    pub fn len(&self) -> usize {
        self.0.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, index: usize) -> Result<Value, Thrown> {
        self.0.borrow().get(index).cloned().ok_or_else(|| {
            Thrown::new(
                "java/lang/IndexOutOfBoundsException",
                format!("Index {} out of bounds for length {}", index, self.len()),
            )
        })
    }

    pub fn set(&self, index: usize, value: Value) -> Result<(), Thrown> {
        let mut elements = self.0.borrow_mut();
        let length = elements.len();
        match elements.get_mut(index) {
            Some(slot) => {
                *slot = value;
                Ok(())
            }
            None => Err(Thrown::new(
                "java/lang/IndexOutOfBoundsException",
                format!("Index {} out of bounds for length {}", index, length),
            )),
        }
    }
}

/// Live Rust objects visible to generated code
///
/// These are the only values that cross the host boundary: methods invoked on them run Rust
/// instead of an instruction sequence.
#[derive(Clone)]
pub enum HostValue {
    SharedContext(Rc<SharedContext>),
    InstanceContext(Rc<InstanceContext>),
    AdviceBundle(Rc<AdviceBundle>),
    Conduit(Rc<dyn FieldConduit>),
    Computed(Rc<dyn ComputedValue>),
    ConstructorCallback(Rc<dyn ConstructorCallback>),
    MethodResult(Rc<MethodOutcome>),
}

impl HostValue {
    /// Class name this host value presents to generated code
    pub fn class_name(&self) -> &'static str {
        match self {
            HostValue::SharedContext(_) => "plastic/SharedContext",
            HostValue::InstanceContext(_) => "plastic/InstanceContext",
            HostValue::AdviceBundle(_) => "plastic/AdviceBundle",
            HostValue::Conduit(_) => "plastic/FieldConduit",
            HostValue::Computed(_) => "plastic/ComputedValue",
            HostValue::ConstructorCallback(_) => "plastic/ConstructorCallback",
            HostValue::MethodResult(_) => "plastic/MethodResult",
        }
    }
}

impl fmt::Debug for HostValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.class_name())
    }
}

/// Completed invocation outcome surfaced by method handles
#[derive(Debug, Clone)]
pub enum MethodOutcome {
    /// Normal completion; void methods complete with `Null`
    Success(Value),

    /// Abrupt completion with the thrown value
    Failure(Value),
}

/// An exception in flight inside the interpreter
///
/// Carries the thrown value itself; the class name drives handler matching.
#[derive(Clone, Debug)]
pub struct Thrown {
    pub value: Value,
}

impl Thrown {
    /// Throw one of the well-known `java/lang` exception types with a message
    pub fn new(class_name: &str, message: impl Into<String>) -> Thrown {
        let obj = ObjRef::new(class_name);
        obj.set_field("message", Value::string(message));
        Thrown {
            value: Value::Object(obj),
        }
    }

    pub(crate) fn type_error(expected: &str, got: &Value) -> Thrown {
        Thrown::new(
            "java/lang/ClassCastException",
            format!("Expected {} but found {:?}", expected, got),
        )
    }

    /// Class name of the thrown value, for handler matching
    pub fn class_name(&self) -> String {
        match &self.value {
            Value::Object(obj) => obj.class_name(),
            Value::Host(host) => String::from(host.class_name()),
            _ => String::from("java/lang/Throwable"),
        }
    }

    /// Message carried by the thrown value, if any
    pub fn message(&self) -> Option<String> {
        match &self.value {
            Value::Object(obj) => match obj.field("message") {
                Some(Value::Str(s)) => Some(String::from(s.as_str())),
                _ => None,
            },
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn object_fields_are_shared_through_clones() {
        let obj = ObjRef::new("app/Sample");
        let alias = Value::Object(obj.clone());
        obj.set_field("count", Value::Int(3));
        match alias {
            Value::Object(aliased) => assert!(matches!(aliased.field("count"), Some(Value::Int(3)))),
            _ => unreachable!(),
        }
    }

    #[test]
    fn thrown_carries_class_and_message() {
        let thrown = Thrown::new("java/lang/IllegalStateException", "no value");
        assert_eq!(thrown.class_name(), "java/lang/IllegalStateException");
        assert_eq!(thrown.message().as_deref(), Some("no value"));
    }
}
