use crate::model::{BinaryName, ClassNode, MethodKey, Name};
use std::collections::HashSet;
use std::rc::Rc;

/// Per-class record of implemented methods and interfaces, chained to the transformed ancestor
///
/// Override checks walk the chain until a match or the chain ends. Method identity deliberately
/// ignores the return type (see [`MethodKey`]) so a same-erasure overload is treated as already
/// implemented rather than silently introduced alongside the original.
pub struct InheritanceRecord {
    pub class_name: BinaryName,
    parent: Option<Rc<InheritanceRecord>>,
    methods: HashSet<MethodKey>,
    interfaces: HashSet<BinaryName>,
}

impl InheritanceRecord {
    /// Record the methods and interfaces a class implements, chained to its transformed parent
    pub fn of(class: &ClassNode, parent: Option<Rc<InheritanceRecord>>) -> InheritanceRecord {
        let methods = class
            .methods
            .iter()
            .filter(|m| !m.is_abstract() && m.signature.name.as_str() != "<init>")
            .map(|m| m.signature.key())
            .collect();
        let interfaces = class.interfaces.iter().cloned().collect();
        InheritanceRecord {
            class_name: class.name.clone(),
            parent,
            methods,
            interfaces,
        }
    }

    /// Does this class, or a transformed ancestor, implement the method?
    pub fn implements_method(&self, key: &MethodKey) -> bool {
        if self.methods.contains(key) {
            return true;
        }
        match &self.parent {
            Some(parent) => parent.implements_method(key),
            None => false,
        }
    }

    /// Does this class declare the method itself (ancestors excluded)?
    pub fn declares_method(&self, key: &MethodKey) -> bool {
        self.methods.contains(key)
    }

    /// Is the interface implemented by this class or a transformed ancestor?
    pub fn implements_interface(&self, interface: &BinaryName) -> bool {
        if self.interfaces.contains(interface) {
            return true;
        }
        match &self.parent {
            Some(parent) => parent.implements_interface(interface),
            None => false,
        }
    }

    /// Nearest ancestor record, if this class's superclass was itself transformed
    pub fn parent(&self) -> Option<&Rc<InheritanceRecord>> {
        self.parent.as_ref()
    }
}
