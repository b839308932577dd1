//! Pool and loader integration: where classes enter and leave the transformation engine
//!
//! A [`ClassPool`] owns one [`Registry`] (codec, runtime machine, caches) and one delegate. Asking
//! the pool for a class pulls its bytes through the [`ClassLoader`], decodes them, transforms
//! untransformed superclasses in controlled packages first, runs the delegate's session, and links
//! the finalized class into the machine. The resulting [`ClassInstantiator`] is the only way to
//! make instances of a transformed class.

mod loader;
mod registry;
mod settings;

pub use loader::{ClassLoader, DirectoryLoader, MapLoader};
pub use registry::{AccessKind, Registry};
pub use settings::PoolSettings;

use crate::model::{BinaryName, FieldType, Name};
use crate::runtime::{HostValue, Machine, Thrown, Value};
use crate::transform::{ClassTransform, InstanceContext, SharedContext};
use crate::Error;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

/// Per-class transformation logic plugged into a pool
pub trait TransformerDelegate {
    /// Describe the changes for one class; invoked exactly once per transformed class
    fn transform(&self, transform: &mut ClassTransform) -> Result<(), Error>;
}

/// Factory for instances of one transformed class
///
/// `with` stages instance context values without mutating the original, so a configured
/// instantiator can be kept and reused as a prototype.
#[derive(Clone)]
pub struct ClassInstantiator {
    machine: Rc<Machine>,
    class_name: String,
    shared: Rc<SharedContext>,
    values: HashMap<String, Value>,
}

impl ClassInstantiator {
    pub(crate) fn new(
        machine: Rc<Machine>,
        class_name: String,
        shared: Rc<SharedContext>,
    ) -> ClassInstantiator {
        ClassInstantiator {
            machine,
            class_name,
            shared,
            values: HashMap::new(),
        }
    }

    pub fn class_name(&self) -> &str {
        &self.class_name
    }

    /// A copy of this instantiator carrying one more instance context value, keyed by type name
    pub fn with(&self, type_name: impl Into<String>, value: Value) -> ClassInstantiator {
        let mut staged = self.clone();
        staged.values.insert(type_name.into(), value);
        staged
    }

    /// Construct a new instance, running injection and constructor callbacks
    pub fn new_instance(&self) -> Result<Value, Thrown> {
        let context = Rc::new(InstanceContext::new());
        for (type_name, value) in &self.values {
            context.put(type_name.clone(), value.clone());
        }
        self.machine.construct(
            &self.class_name,
            &[
                FieldType::Object(BinaryName::SHAREDCONTEXT),
                FieldType::Object(BinaryName::INSTANCECONTEXT),
            ],
            vec![
                Value::Host(HostValue::SharedContext(self.shared.clone())),
                Value::Host(HostValue::InstanceContext(context)),
            ],
        )
    }
}

/// The front door of the engine
pub struct ClassPool {
    registry: Rc<Registry>,
    loader: Box<dyn ClassLoader>,
    delegate: Rc<dyn TransformerDelegate>,
    post_process: Option<Box<dyn Fn(ClassInstantiator) -> ClassInstantiator>>,
    instantiators: RefCell<HashMap<String, ClassInstantiator>>,
}

impl ClassPool {
    pub fn new(
        loader: Box<dyn ClassLoader>,
        delegate: Rc<dyn TransformerDelegate>,
        settings: PoolSettings,
    ) -> ClassPool {
        let codec = Box::new(crate::codec::BinaryCodec);
        ClassPool {
            registry: Rc::new(Registry::new(codec, settings)),
            loader,
            delegate,
            post_process: None,
            instantiators: RefCell::new(HashMap::new()),
        }
    }

    /// Hook run on every freshly built instantiator before it is cached and handed back,
    /// typically to stage instance context values on it
    pub fn set_post_process(
        &mut self,
        hook: impl Fn(ClassInstantiator) -> ClassInstantiator + 'static,
    ) {
        self.post_process = Some(Box::new(hook));
    }

    pub fn registry(&self) -> &Rc<Registry> {
        &self.registry
    }

    pub fn machine(&self) -> &Rc<Machine> {
        &self.registry.machine
    }

    /// Cache a class model (typically an interface) so sessions can resolve it by name
    pub fn register_type(&self, class: crate::model::ClassNode) {
        self.registry.register_type(class);
    }

    /// Instantiator for a class, transforming it on first request
    pub fn instantiator(&self, class_name: &BinaryName) -> Result<ClassInstantiator, Error> {
        if let Some(cached) = self.instantiators.borrow().get(class_name.as_str()) {
            return Ok(cached.clone());
        }
        self.registry.begin(class_name)?;
        let result = self.transform_class(class_name);
        self.registry.end(class_name);
        let mut instantiator = result?;
        if let Some(hook) = &self.post_process {
            instantiator = hook(instantiator);
        }
        self.instantiators
            .borrow_mut()
            .insert(String::from(class_name.as_str()), instantiator.clone());
        Ok(instantiator)
    }

    fn transform_class(&self, class_name: &BinaryName) -> Result<ClassInstantiator, Error> {
        log::debug!("transforming {:?}", class_name);
        let bytes = self
            .loader
            .load(class_name.as_str())?
            .ok_or_else(|| Error::MissingClass(class_name.clone()))?;
        let class = self.registry.codec.decode(&bytes)?;
        self.registry.register_type(class.clone());

        if let Some(superclass) = &class.superclass {
            if self.registry.settings.controls(superclass.as_str()) {
                if !self.registry.is_transformed(superclass.as_str()) {
                    self.instantiator(superclass)?;
                }
            } else {
                self.link_external(superclass)?;
            }
        }

        let mut session = ClassTransform::new(class, self.registry.clone());
        self.delegate.transform(&mut session)?;
        session.create_instantiator()
    }

    /// Decode and link an uncontrolled class as-is; silently skips built-in runtime types
    fn link_external(&self, class_name: &BinaryName) -> Result<(), Error> {
        if self.registry.machine.lookup_class(class_name.as_str()).is_some() {
            return Ok(());
        }
        if let Some(bytes) = self.loader.load(class_name.as_str())? {
            let class = self.registry.codec.decode(&bytes)?;
            self.registry.register_type(class.clone());
            self.registry.machine.define(&class)?;
        }
        Ok(())
    }

    /// Open a session for a brand-new class extending an already-transformed base
    pub fn create_class(
        &self,
        class_name: &str,
        base: &BinaryName,
    ) -> Result<ClassTransform, Error> {
        if !self.registry.is_transformed(base.as_str()) {
            if self.registry.settings.controls(base.as_str()) {
                self.instantiator(base)?;
            } else {
                return Err(Error::MissingClass(base.clone()));
            }
        }
        let name =
            BinaryName::from_string(String::from(class_name)).map_err(Error::MalformedName)?;
        let shell = crate::model::ClassNode::subclass_shell(name, base.clone());
        Ok(ClassTransform::new(shell, self.registry.clone()))
    }
}
