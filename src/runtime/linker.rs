use super::Value;
use crate::model::{ClassNode, Code, FieldType, MethodDescriptor, Name, RenderDescriptor};
use crate::Error;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

/// A class linked into a [`Machine`]
///
/// Methods are indexed by name plus rendered descriptor so invocation dispatch is a single map
/// probe per class in the superclass chain.
pub struct LoadedClass {
    pub name: String,
    pub superclass: Option<String>,
    pub interfaces: Vec<String>,
    pub is_interface: bool,
    methods: HashMap<(String, String), Rc<LoadedMethod>>,
    field_types: HashMap<String, FieldType>,
}

impl LoadedClass {
    fn method(&self, name: &str, descriptor: &str) -> Option<Rc<LoadedMethod>> {
        self.methods
            .get(&(String::from(name), String::from(descriptor)))
            .cloned()
    }

    /// Declared type of a field, if this class declares it
    pub fn field_type(&self, name: &str) -> Option<&FieldType> {
        self.field_types.get(name)
    }
}

/// One linked method body
pub struct LoadedMethod {
    pub class_name: String,
    pub name: String,
    pub descriptor: MethodDescriptor,
    pub is_static: bool,
    pub code: Option<Rc<Code>>,
}

/// Executes linked classes
///
/// The machine owns every linked class plus the static field store. It has no internal execution
/// state of its own: each method call builds its frame on the Rust call stack, so host callbacks
/// may re-enter the machine freely.
pub struct Machine {
    classes: RefCell<HashMap<String, Rc<LoadedClass>>>,
    statics: RefCell<HashMap<(String, String), Value>>,
}

impl Default for Machine {
    fn default() -> Machine {
        Machine::new()
    }
}

impl Machine {
    pub fn new() -> Machine {
        Machine {
            classes: RefCell::new(HashMap::new()),
            statics: RefCell::new(HashMap::new()),
        }
    }

    /// Link a class model into the machine, replacing any prior definition of the same name
    pub fn define(&self, class: &ClassNode) -> Result<(), Error> {
        let name = String::from(class.name.as_str());
        let methods = class
            .methods
            .iter()
            .map(|method| {
                let loaded = LoadedMethod {
                    class_name: name.clone(),
                    name: String::from(method.signature.name.as_str()),
                    descriptor: method.signature.descriptor.clone(),
                    is_static: method.is_static(),
                    code: method.code.clone().map(Rc::new),
                };
                (
                    (loaded.name.clone(), loaded.descriptor.render()),
                    Rc::new(loaded),
                )
            })
            .collect();
        let field_types = class
            .fields
            .iter()
            .map(|field| (String::from(field.name.as_str()), field.descriptor.clone()))
            .collect();
        let loaded = LoadedClass {
            name: name.clone(),
            superclass: class.superclass.as_ref().map(|s| String::from(s.as_str())),
            interfaces: class
                .interfaces
                .iter()
                .map(|i| String::from(i.as_str()))
                .collect(),
            is_interface: class.is_interface(),
            methods,
            field_types,
        };
        log::debug!("linked class {}", name);
        self.classes.borrow_mut().insert(name, Rc::new(loaded));
        Ok(())
    }

    pub fn lookup_class(&self, name: &str) -> Option<Rc<LoadedClass>> {
        self.classes.borrow().get(name).cloned()
    }

    /// Resolve a method starting at `class_name` and walking up the superclass chain
    pub(crate) fn resolve_method(
        &self,
        class_name: &str,
        name: &str,
        descriptor: &str,
    ) -> Option<Rc<LoadedMethod>> {
        let mut current = Some(String::from(class_name));
        while let Some(class_name) = current {
            match self.lookup_class(&class_name) {
                Some(class) => {
                    if let Some(method) = class.method(name, descriptor) {
                        return Some(method);
                    }
                    current = class.superclass.clone();
                }
                None => current = builtin_superclass(&class_name).map(String::from),
            }
        }
        None
    }

    /// Declared type of `field` on `class_name` or a superclass
    pub(crate) fn resolve_field_type(&self, class_name: &str, field: &str) -> Option<FieldType> {
        let mut current = Some(String::from(class_name));
        while let Some(class_name) = current {
            let class = self.lookup_class(&class_name)?;
            if let Some(typ) = class.field_type(field) {
                return Some(typ.clone());
            }
            current = class.superclass.clone();
        }
        None
    }

    pub(crate) fn static_field(&self, class: &str, field: &str) -> Option<Value> {
        self.statics
            .borrow()
            .get(&(String::from(class), String::from(field)))
            .cloned()
    }

    pub(crate) fn set_static_field(&self, class: &str, field: &str, value: Value) {
        self.statics
            .borrow_mut()
            .insert((String::from(class), String::from(field)), value);
    }

    /// Is `sub` the same as, or a subtype of, `sup`?
    ///
    /// Walks linked superclass/interface chains, falling back to the built-in `java/lang`
    /// hierarchy for classes that were never linked.
    pub fn is_assignable(&self, sub: &str, sup: &str) -> bool {
        if sub == sup || sup == "java/lang/Object" {
            return true;
        }
        let mut pending = vec![String::from(sub)];
        while let Some(current) = pending.pop() {
            if current == sup {
                return true;
            }
            match self.lookup_class(&current) {
                Some(class) => {
                    if let Some(superclass) = &class.superclass {
                        pending.push(superclass.clone());
                    }
                    pending.extend(class.interfaces.iter().cloned());
                }
                None => {
                    if let Some(superclass) = builtin_superclass(&current) {
                        pending.push(String::from(superclass));
                    }
                }
            }
        }
        false
    }
}

/// Superclass of a well-known `java/lang` class
///
/// Only the part of the platform hierarchy the engine generates references to is modelled; the
/// checked/unchecked split (`Exception` vs `RuntimeException`) is what matters most here.
pub(crate) fn builtin_superclass(name: &str) -> Option<&'static str> {
    match name {
        "java/lang/Object" => None,
        "java/lang/Throwable" | "java/lang/String" => Some("java/lang/Object"),
        "java/lang/Exception" | "java/lang/Error" => Some("java/lang/Throwable"),
        "java/lang/RuntimeException" => Some("java/lang/Exception"),
        "java/lang/IllegalStateException"
        | "java/lang/IllegalArgumentException"
        | "java/lang/ClassCastException"
        | "java/lang/NullPointerException"
        | "java/lang/IndexOutOfBoundsException"
        | "java/lang/UnsupportedOperationException" => Some("java/lang/RuntimeException"),
        "java/lang/Boolean" | "java/lang/Byte" | "java/lang/Character" | "java/lang/Short"
        | "java/lang/Integer" | "java/lang/Long" | "java/lang/Float" | "java/lang/Double" => {
            Some("java/lang/Object")
        }
        _ => None,
    }
}

/// Does the class name a checked exception type?
///
/// Checked means assignable to `java/lang/Exception` but not to `java/lang/RuntimeException`.
pub fn is_checked_exception(machine: &Machine, class_name: &str) -> bool {
    machine.is_assignable(class_name, "java/lang/Exception")
        && !machine.is_assignable(class_name, "java/lang/RuntimeException")
}
