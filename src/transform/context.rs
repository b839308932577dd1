use crate::runtime::{Machine, Thrown, Value};
use std::cell::RefCell;
use std::rc::Rc;

/// Class-level injection table
///
/// An append-only ordered list of injected values referenced by index from generated code.
/// Branching produces a snapshot copy that preserves every existing index, so a subclass context
/// can grow independently without disturbing its parent (or any sibling branched earlier).
#[derive(Default)]
pub struct SharedContext {
    entries: RefCell<Vec<Value>>,
}

impl SharedContext {
    pub fn new() -> SharedContext {
        SharedContext::default()
    }

    /// Append a value, returning the index generated code will use to fetch it
    pub fn push(&self, value: Value) -> usize {
        let mut entries = self.entries.borrow_mut();
        entries.push(value);
        entries.len() - 1
    }

    pub fn get(&self, index: usize) -> Result<Value, Thrown> {
        self.entries.borrow().get(index).cloned().ok_or_else(|| {
            Thrown::new(
                "java/lang/IllegalStateException",
                format!("No shared context entry at index {}", index),
            )
        })
    }

    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot copy for a subclass; existing indices are preserved
    pub fn branch(&self) -> SharedContext {
        SharedContext {
            entries: RefCell::new(self.entries.borrow().clone()),
        }
    }
}

/// Per-instance key-typed value table populated at construction
///
/// Keys are internal type names; injected fields that request "value from instance context" are
/// resolved against this table by the field's declared type.
#[derive(Default)]
pub struct InstanceContext {
    values: RefCell<std::collections::HashMap<String, Value>>,
}

impl InstanceContext {
    pub fn new() -> InstanceContext {
        InstanceContext::default()
    }

    pub fn put(&self, type_name: impl Into<String>, value: Value) {
        self.values.borrow_mut().insert(type_name.into(), value);
    }

    pub fn get(&self, type_name: &str) -> Option<Value> {
        self.values.borrow().get(type_name).cloned()
    }

    /// Fetch a value that must be present, raising `IllegalStateException` when it is not
    pub fn get_required(&self, type_name: &str) -> Result<Value, Thrown> {
        self.get(type_name).ok_or_else(|| {
            Thrown::new(
                "java/lang/IllegalStateException",
                format!("No instance context value for {}", type_name),
            )
        })
    }
}

/// Pluggable get/set interceptor substituted for direct field storage
pub trait FieldConduit {
    fn load(&self, instance: &Value) -> Result<Value, Thrown>;
    fn store(&self, instance: &Value, value: Value) -> Result<(), Thrown>;
}

/// Provider for an injected value computed at construction time
pub trait ComputedValue {
    fn compute(&self, instance: &Value) -> Result<Value, Thrown>;
}

/// Hook invoked once per new instance, right after field injection
pub trait ConstructorCallback {
    fn on_construct(&self, instance: &Value) -> Result<(), Thrown>;
}

/// Read-only conduit backed by a computed provider; writes are rejected
pub(crate) struct ComputedConduit {
    pub provider: Rc<dyn ComputedValue>,
}

impl FieldConduit for ComputedConduit {
    fn load(&self, instance: &Value) -> Result<Value, Thrown> {
        self.provider.compute(instance)
    }

    fn store(&self, _instance: &Value, _value: Value) -> Result<(), Thrown> {
        Err(Thrown::new(
            "java/lang/UnsupportedOperationException",
            "Computed conduit fields cannot be written",
        ))
    }
}

/// Interceptor attached to a method
///
/// Each advisor decides explicitly whether to continue the chain by calling
/// [`Invocation::proceed`]; not calling it short-circuits the original implementation.
pub trait MethodAdvice {
    fn advise(&self, invocation: &Invocation<'_>) -> Result<(), Thrown>;
}

/// Ordered advice chain for one method, visible to generated code
#[derive(Default)]
pub struct AdviceBundle {
    advices: Vec<Rc<dyn MethodAdvice>>,
}

impl AdviceBundle {
    pub fn new(advices: Vec<Rc<dyn MethodAdvice>>) -> AdviceBundle {
        AdviceBundle { advices }
    }

    pub fn len(&self) -> usize {
        self.advices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.advices.is_empty()
    }

    pub fn advise(&self, index: usize, invocation: &Invocation<'_>) -> Result<(), Thrown> {
        let advice = self.advices.get(index).ok_or_else(|| {
            Thrown::new(
                "java/lang/IllegalStateException",
                format!("No advice at index {}", index),
            )
        })?;
        advice.advise(invocation)
    }
}

/// Live view of one advised method invocation, handed to each advisor
///
/// Wraps the generated invocation object: every accessor goes through the generated methods, so
/// host advice observes exactly what generated advice code would.
pub struct Invocation<'m> {
    machine: &'m Machine,
    target: Value,
}

impl<'m> Invocation<'m> {
    pub(crate) fn new(machine: &'m Machine, target: Value) -> Invocation<'m> {
        Invocation { machine, target }
    }

    /// Current value of parameter `index`, unboxed to its primitive where applicable
    pub fn parameter(&self, index: i32) -> Result<Value, Thrown> {
        let boxed = self
            .machine
            .call_method(
                &self.target,
                "getParameter",
                "(I)Ljava/lang/Object;",
                vec![Value::Int(index)],
            )?
            .unwrap_or(Value::Null);
        Ok(unbox_wrapper(boxed))
    }

    pub fn set_parameter(&self, index: i32, value: Value) -> Result<(), Thrown> {
        self.machine.call_method(
            &self.target,
            "setParameter",
            "(ILjava/lang/Object;)V",
            vec![Value::Int(index), box_primitive(value)],
        )?;
        Ok(())
    }

    /// Continue the chain: the next advisor runs, or the original body once advisors are exhausted
    pub fn proceed(&self) -> Result<(), Thrown> {
        self.machine
            .call_method(&self.target, "proceed", "()V", vec![])?;
        Ok(())
    }

    /// Return value captured so far, unboxed to its primitive where applicable
    pub fn return_value(&self) -> Result<Value, Thrown> {
        let boxed = self
            .machine
            .call_method(
                &self.target,
                "getReturnValue",
                "()Ljava/lang/Object;",
                vec![],
            )?
            .unwrap_or(Value::Null);
        Ok(unbox_wrapper(boxed))
    }

    pub fn set_return_value(&self, value: Value) -> Result<(), Thrown> {
        self.machine.call_method(
            &self.target,
            "setReturnValue",
            "(Ljava/lang/Object;)V",
            vec![box_primitive(value)],
        )?;
        Ok(())
    }
}

/// Wrap a primitive in its wrapper object, the way generated boxing does
pub fn box_primitive(value: Value) -> Value {
    let wrapper_class = match &value {
        Value::Int(_) => "java/lang/Integer",
        Value::Long(_) => "java/lang/Long",
        Value::Float(_) => "java/lang/Float",
        Value::Double(_) => "java/lang/Double",
        _ => return value,
    };
    let wrapper = crate::runtime::ObjRef::new(wrapper_class);
    wrapper.set_field("value", value);
    Value::Object(wrapper)
}

/// Unwrap a wrapper object back to its primitive; non-wrappers pass through
pub fn unbox_wrapper(value: Value) -> Value {
    if let Value::Object(obj) = &value {
        let class_name = obj.class_name();
        let is_wrapper = matches!(
            class_name.as_str(),
            "java/lang/Boolean"
                | "java/lang/Byte"
                | "java/lang/Character"
                | "java/lang/Short"
                | "java/lang/Integer"
                | "java/lang/Long"
                | "java/lang/Float"
                | "java/lang/Double"
        );
        if is_wrapper {
            if let Some(primitive) = obj.field("value") {
                return primitive;
            }
        }
    }
    value
}
