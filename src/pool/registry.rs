use super::settings::PoolSettings;
use crate::code::MethodRef;
use crate::codec::ClassCodec;
use crate::model::{BinaryName, ClassNode, Name};
use crate::runtime::Machine;
use crate::transform::{InheritanceRecord, SharedContext};
use crate::Error;
use elsa::FrozenMap;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

/// Whether a rewrite table entry replaces a field read or a field write
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum AccessKind {
    Read,
    Write,
}

/// Shared state behind every session of one pool
///
/// The registry is the exclusion domain: all sessions of a pool run on the same thread and share
/// it through an `Rc`, so interior mutability is plain `RefCell`. Class models handed out by
/// [`Registry::lookup_type`] are referenced all over generated-code construction, hence the
/// append-only [`FrozenMap`] that lets borrows outlive later insertions.
pub struct Registry {
    pub machine: Rc<Machine>,
    pub codec: Box<dyn ClassCodec>,
    pub settings: PoolSettings,
    types: FrozenMap<String, Box<ClassNode>>,
    records: RefCell<HashMap<String, Rc<InheritanceRecord>>>,
    templates: RefCell<HashMap<String, Rc<SharedContext>>>,
    instrumentation: RefCell<HashMap<(String, String, AccessKind), MethodRef>>,
    in_progress: RefCell<Vec<BinaryName>>,
}

impl Registry {
    pub fn new(codec: Box<dyn ClassCodec>, settings: PoolSettings) -> Registry {
        Registry {
            machine: Rc::new(Machine::new()),
            codec,
            settings,
            types: FrozenMap::new(),
            records: RefCell::new(HashMap::new()),
            templates: RefCell::new(HashMap::new()),
            instrumentation: RefCell::new(HashMap::new()),
            in_progress: RefCell::new(vec![]),
        }
    }

    /// Cache a decoded class model; interface introduction and proxying resolve against this
    pub fn register_type(&self, class: ClassNode) -> &ClassNode {
        let name = String::from(class.name.as_str());
        if let Some(existing) = self.types.get(&name) {
            return existing;
        }
        self.types.insert(name, Box::new(class))
    }

    pub fn lookup_type(&self, name: &str) -> Option<&ClassNode> {
        self.types.get(name)
    }

    pub fn record(&self, name: &str) -> Option<Rc<InheritanceRecord>> {
        self.records.borrow().get(name).cloned()
    }

    pub fn set_record(&self, name: &str, record: Rc<InheritanceRecord>) {
        self.records.borrow_mut().insert(String::from(name), record);
    }

    /// A transformed class is exactly one with an inheritance record
    pub fn is_transformed(&self, name: &str) -> bool {
        self.records.borrow().contains_key(name)
    }

    pub fn template(&self, name: &str) -> Option<Rc<SharedContext>> {
        self.templates.borrow().get(name).cloned()
    }

    pub fn set_template(&self, name: &str, template: Rc<SharedContext>) {
        self.templates
            .borrow_mut()
            .insert(String::from(name), template);
    }

    /// Register a field access rewrite: direct access to `owner.field` becomes an accessor call
    pub fn add_instrumentation(
        &self,
        owner: &str,
        field: &str,
        kind: AccessKind,
        accessor: MethodRef,
    ) {
        self.instrumentation
            .borrow_mut()
            .insert((String::from(owner), String::from(field), kind), accessor);
    }

    /// Current rewrite table, including entries contributed by previously transformed classes
    pub fn instrumentation_snapshot(&self) -> HashMap<(String, String, AccessKind), MethodRef> {
        self.instrumentation.borrow().clone()
    }

    /// Push a class onto the in-progress stack, failing on re-entry
    pub fn begin(&self, name: &BinaryName) -> Result<(), Error> {
        let mut stack = self.in_progress.borrow_mut();
        if stack.contains(name) {
            let mut cycle = stack.clone();
            cycle.push(name.clone());
            return Err(Error::TransformationCycle(cycle));
        }
        stack.push(name.clone());
        Ok(())
    }

    pub fn end(&self, name: &BinaryName) {
        let mut stack = self.in_progress.borrow_mut();
        if stack.last() == Some(name) {
            stack.pop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::BinaryCodec;

    fn registry() -> Registry {
        Registry::new(Box::new(BinaryCodec), PoolSettings::default())
    }

    #[test]
    fn reentrant_transformation_reports_the_cycle() {
        let registry = registry();
        let a = BinaryName::from_string(String::from("app/A")).unwrap();
        let b = BinaryName::from_string(String::from("app/B")).unwrap();

        registry.begin(&a).unwrap();
        registry.begin(&b).unwrap();
        match registry.begin(&a) {
            Err(Error::TransformationCycle(cycle)) => {
                assert_eq!(cycle.len(), 3);
                assert_eq!(cycle[0], a);
                assert_eq!(cycle[2], a);
            }
            other => panic!("expected a cycle error, got {:?}", other.map(|_| ())),
        }

        registry.end(&b);
        registry.end(&a);
        registry.begin(&a).unwrap();
    }

    #[test]
    fn registered_types_survive_later_insertions() {
        let registry = registry();
        let first = registry.register_type(ClassNode::subclass_shell(
            BinaryName::from_string(String::from("app/First")).unwrap(),
            BinaryName::OBJECT,
        ));
        registry.register_type(ClassNode::subclass_shell(
            BinaryName::from_string(String::from("app/Second")).unwrap(),
            BinaryName::OBJECT,
        ));
        assert_eq!(first.name.as_str(), "app/First");
        assert!(registry.lookup_type("app/Second").is_some());
    }
}
