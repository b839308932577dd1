//! The transformation session: the public surface for describing structural changes to one class
//!
//! A [`ClassTransform`] owns the decoded class model for the duration of a single pass. Callers
//! describe changes declaratively (introduce a field, inject a value, attach advice, proxy an
//! interface) and the session materializes them into generated instruction sequences when
//! [`ClassTransform::create_instantiator`] finalizes the class. Sessions are one-shot: after
//! finalization every other operation reports [`Error::SessionLocked`].

mod advice;
mod context;
mod inheritance;
mod shim;

pub use context::{
    box_primitive, unbox_wrapper, AdviceBundle, ComputedValue, ConstructorCallback, FieldConduit,
    InstanceContext, Invocation, MethodAdvice, SharedContext,
};
pub use inheritance::InheritanceRecord;
pub use shim::{FieldHandle, MethodHandle};

pub(crate) use advice::{INSTANCE_FIELD, SHARED_FIELD};
use advice::rewrite_advised_method;
use context::ComputedConduit;
use shim::{build_shim, SharedBinding, ShimBinding};

use crate::code::{FieldRef, Instruction, InstructionBuilder, LabelGenerator, MethodRef};
use crate::model::{
    merge_annotations, AnnotationNode, BinaryName, ClassNode, FieldAccessFlags, FieldNode,
    FieldType, MethodAccessFlags, MethodDescriptor, MethodKey, MethodNode, MethodSignature, Name,
    UnqualifiedName,
};
use crate::pool::{AccessKind, ClassInstantiator, Registry};
use crate::runtime::{HostValue, Value};
use crate::Error;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

/// Handle to a field of the class under transformation
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub struct FieldToken(usize);

/// Handle to a method of the class under transformation
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub struct MethodToken(usize);

/// Delegate target for [`ClassTransform::proxy_interface`]
#[derive(Copy, Clone)]
pub enum ProxyTarget {
    /// Delegate held in a field of the class
    Field(FieldToken),

    /// Delegate produced by a zero-argument method of the class
    Method(MethodToken),
}

/// Which accessors [`ClassTransform::create_accessors`] synthesizes
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum AccessorMode {
    Get,
    Set,
    GetSet,
}

enum InjectKind {
    Constant(usize),
    Computed(usize),
    FromInstanceContext,
}

enum FieldState {
    Injected(InjectKind),
    Conduit { context_index: usize },
}

impl FieldState {
    fn describe(&self) -> &'static str {
        match self {
            FieldState::Injected(_) => "injected",
            FieldState::Conduit { .. } => "conduit-backed",
        }
    }
}

/// One class mid-transformation
pub struct ClassTransform {
    registry: Rc<Registry>,
    class: ClassNode,
    parent_record: Option<Rc<InheritanceRecord>>,
    shared: Rc<SharedContext>,
    states: HashMap<String, FieldState>,
    claims: HashMap<String, String>,
    introduced: HashMap<MethodKey, MethodToken>,
    advice: Vec<(MethodKey, Vec<Rc<dyn MethodAdvice>>)>,
    callback_indices: Vec<usize>,
    handle_fields: Vec<usize>,
    handle_methods: Vec<usize>,
    binding: SharedBinding,
    annotation_sources: Vec<Vec<AnnotationNode>>,
    locked: bool,
}

impl ClassTransform {
    pub(crate) fn new(class: ClassNode, registry: Rc<Registry>) -> ClassTransform {
        let parent_record = class
            .superclass
            .as_ref()
            .and_then(|superclass| registry.record(superclass.as_str()));
        let shared = match class
            .superclass
            .as_ref()
            .and_then(|superclass| registry.template(superclass.as_str()))
        {
            Some(parent) => Rc::new(parent.branch()),
            None => Rc::new(SharedContext::new()),
        };
        ClassTransform {
            registry,
            class,
            parent_record,
            shared,
            states: HashMap::new(),
            claims: HashMap::new(),
            introduced: HashMap::new(),
            advice: vec![],
            callback_indices: vec![],
            handle_fields: vec![],
            handle_methods: vec![],
            binding: Rc::new(RefCell::new(None)),
            annotation_sources: vec![],
            locked: false,
        }
    }

    pub fn class_name(&self) -> &BinaryName {
        &self.class.name
    }

    /// Read access to the class model, mainly for inspection in tests and delegates
    pub fn class(&self) -> &ClassNode {
        &self.class
    }

    fn ensure_unlocked(&self) -> Result<(), Error> {
        if self.locked {
            Err(Error::SessionLocked(self.class.name.clone()))
        } else {
            Ok(())
        }
    }

    fn field_name(&self, token: FieldToken) -> &UnqualifiedName {
        &self.class.fields[token.0].name
    }

    fn field_descriptor(&self, token: FieldToken) -> &FieldType {
        &self.class.fields[token.0].descriptor
    }

    /// Token for a field the class already declares
    pub fn field_token(&self, name: &str) -> Option<FieldToken> {
        self.class
            .fields
            .iter()
            .position(|f| f.name.as_str() == name)
            .map(FieldToken)
    }

    /// Token for a method the class already declares
    pub fn method_token(&self, key: &MethodKey) -> Option<MethodToken> {
        self.class
            .methods
            .iter()
            .position(|m| &m.signature.key() == key)
            .map(MethodToken)
    }

    /// Add a field, uniquifying the suggested name if it is already taken
    pub fn introduce_field(
        &mut self,
        descriptor: FieldType,
        suggested: &str,
    ) -> Result<FieldToken, Error> {
        self.ensure_unlocked()?;
        let base = UnqualifiedName::from_string(String::from(suggested))
            .map_err(Error::MalformedName)?;
        let mut name = base.clone();
        let mut attempt = 0;
        while self.class.field(name.as_str()).is_some() {
            name = base.numbered(attempt);
            attempt += 1;
        }
        self.class.fields.push(FieldNode {
            access_flags: FieldAccessFlags::PRIVATE,
            name,
            descriptor,
            annotations: vec![],
        });
        Ok(FieldToken(self.class.fields.len() - 1))
    }

    /// Add a method, or return the token from an earlier identical introduction
    ///
    /// When a transformed ancestor already implements the signature, the generated body is a
    /// transparent passthrough to the superclass implementation; otherwise it returns the type's
    /// default value and is meant to be replaced through [`ClassTransform::change_implementation`].
    pub fn introduce_method(&mut self, signature: MethodSignature) -> Result<MethodToken, Error> {
        self.ensure_unlocked()?;
        let key = signature.key();
        if let Some(token) = self.introduced.get(&key) {
            return Ok(*token);
        }
        if self.class.method(&key).is_some() {
            return Err(Error::MethodCollision {
                class: self.class.name.clone(),
                method: key,
            });
        }

        let inherited = self
            .parent_record
            .as_ref()
            .map(|record| record.implements_method(&key))
            .unwrap_or(false);
        let superclass = self
            .class
            .superclass
            .clone()
            .unwrap_or(BinaryName::OBJECT);

        let mut method = MethodNode {
            access_flags: MethodAccessFlags::PUBLIC,
            signature: signature.clone(),
            code: None,
            annotations: vec![],
        };
        let mut labels = LabelGenerator::new();
        let mut builder = InstructionBuilder::for_method(&mut method, &mut labels);
        if inherited {
            builder.load_this()?;
            builder.load_arguments()?;
            builder.invoke_special(MethodRef {
                owner: superclass,
                name: signature.name.clone(),
                descriptor: signature.descriptor.clone(),
            })?;
            builder.return_value(signature.descriptor.return_type.as_ref())?;
        } else {
            builder.return_default(signature.descriptor.return_type.as_ref())?;
        }

        self.class.methods.push(method);
        let token = MethodToken(self.class.methods.len() - 1);
        self.introduced.insert(key, token);
        Ok(token)
    }

    /// Replace the body of an introduced method
    pub fn change_implementation(
        &mut self,
        token: MethodToken,
        build: impl FnOnce(&mut InstructionBuilder<'_>) -> Result<(), Error>,
    ) -> Result<(), Error> {
        self.ensure_unlocked()?;
        let method = &mut self.class.methods[token.0];
        method.code = None;
        let mut labels = LabelGenerator::new();
        let mut builder = InstructionBuilder::for_method(method, &mut labels);
        build(&mut builder)?;
        builder.finish();
        Ok(())
    }

    /// Implement an interface, introducing every abstract method not already implemented
    ///
    /// Walks the interface hierarchy; when the same signature appears at several levels, the most
    /// specific declaring interface (encountered first) wins.
    pub fn introduce_interface(
        &mut self,
        interface: &BinaryName,
    ) -> Result<Vec<MethodToken>, Error> {
        self.ensure_unlocked()?;
        let already = self.class.interfaces.contains(interface)
            || self
                .parent_record
                .as_ref()
                .map(|record| record.implements_interface(interface))
                .unwrap_or(false);
        if !already {
            self.class.interfaces.push(interface.clone());
        }

        let mut signatures: Vec<MethodSignature> = vec![];
        let mut seen: Vec<MethodKey> = vec![];
        let mut pending = vec![interface.clone()];
        let mut visited = vec![];
        while let Some(current) = pending.pop() {
            if visited.contains(&current) {
                continue;
            }
            visited.push(current.clone());
            let model = self
                .registry
                .lookup_type(current.as_str())
                .ok_or_else(|| Error::MissingClass(current.clone()))?;
            if !model.is_interface() {
                return Err(Error::NotAnInterface(current.clone()));
            }
            for method in &model.methods {
                if !method.is_abstract() {
                    continue;
                }
                let key = method.signature.key();
                if seen.contains(&key) {
                    continue;
                }
                seen.push(key);
                signatures.push(method.signature.clone());
            }
            pending.extend(model.interfaces.iter().cloned());
        }

        let mut tokens = vec![];
        for signature in signatures {
            let key = signature.key();
            if self.class.method(&key).is_some() {
                continue;
            }
            if self
                .parent_record
                .as_ref()
                .map(|record| record.implements_method(&key))
                .unwrap_or(false)
            {
                continue;
            }
            tokens.push(self.introduce_method(signature)?);
        }
        Ok(tokens)
    }

    /// Implement an interface by delegating every method to a field or provider method
    pub fn proxy_interface(
        &mut self,
        interface: &BinaryName,
        target: ProxyTarget,
    ) -> Result<Vec<MethodToken>, Error> {
        self.ensure_unlocked()?;
        let (load_delegate, delegate_type): (LoadDelegate, BinaryName) = match target {
            ProxyTarget::Field(field) => {
                let descriptor = self.field_descriptor(field).clone();
                let delegate_type = match &descriptor {
                    FieldType::Object(name) => name.clone(),
                    other => return Err(Error::BadDescriptor(format!("{:?}", other))),
                };
                let field_ref = FieldRef {
                    owner: self.class.name.clone(),
                    name: self.field_name(field).clone(),
                    descriptor,
                };
                (LoadDelegate::Field(field_ref), delegate_type)
            }
            ProxyTarget::Method(method) => {
                let signature = self.class.methods[method.0].signature.clone();
                let delegate_type = match &signature.descriptor.return_type {
                    Some(FieldType::Object(name)) => name.clone(),
                    other => return Err(Error::BadDescriptor(format!("{:?}", other))),
                };
                let method_ref = MethodRef {
                    owner: self.class.name.clone(),
                    name: signature.name,
                    descriptor: signature.descriptor,
                };
                (LoadDelegate::Method(method_ref), delegate_type)
            }
        };

        let interface_dispatch = self
            .registry
            .lookup_type(delegate_type.as_str())
            .map(|model| model.is_interface())
            .unwrap_or(&delegate_type == interface);

        let tokens = self.introduce_interface(interface)?;
        for token in &tokens {
            let signature = self.class.methods[token.0].signature.clone();
            let load_delegate = load_delegate.clone();
            let delegate_type = delegate_type.clone();
            self.change_implementation(*token, |builder| {
                builder.load_this()?;
                match load_delegate {
                    LoadDelegate::Field(field_ref) => {
                        builder.get_field(field_ref)?;
                    }
                    LoadDelegate::Method(method_ref) => {
                        builder.invoke_virtual(method_ref)?;
                    }
                }
                builder.load_arguments()?;
                let target_ref = MethodRef {
                    owner: delegate_type,
                    name: signature.name.clone(),
                    descriptor: signature.descriptor.clone(),
                };
                if interface_dispatch {
                    builder.invoke_interface(target_ref)?;
                } else {
                    builder.invoke_virtual(target_ref)?;
                }
                builder.return_value(signature.descriptor.return_type.as_ref())?;
                Ok(())
            })?;
        }
        Ok(tokens)
    }

    /// Mark a field as owned by a feature; claiming under a different tag is an error
    pub fn claim_field(&mut self, token: FieldToken, tag: &str) -> Result<(), Error> {
        self.ensure_unlocked()?;
        let name = self.field_name(token).clone();
        match self.claims.get(name.as_str()) {
            Some(existing) if existing != tag => Err(Error::FieldAlreadyClaimed {
                class: self.class.name.clone(),
                field: name,
                existing_tag: existing.clone(),
                new_tag: String::from(tag),
            }),
            _ => {
                self.claims.insert(String::from(name.as_str()), String::from(tag));
                Ok(())
            }
        }
    }

    fn transition(&mut self, token: FieldToken, state: FieldState, tag: &str) -> Result<(), Error> {
        let name = String::from(self.field_name(token).as_str());
        if let Some(existing) = self.states.get(&name) {
            return Err(Error::FieldStateConflict {
                class: self.class.name.clone(),
                field: self.field_name(token).clone(),
                existing: existing.describe(),
            });
        }
        self.claim_field(token, tag)?;
        self.states.insert(name, state);
        Ok(())
    }

    /// Arrange for the constructor to store a constant into the field, then mark it read-only
    pub fn inject(&mut self, token: FieldToken, value: Value) -> Result<(), Error> {
        self.ensure_unlocked()?;
        // Generated code fetches through an Object-typed slot, so primitives go in boxed
        let index = self.shared.push(box_primitive(value));
        self.transition(token, FieldState::Injected(InjectKind::Constant(index)), "inject")
    }

    /// Arrange for the constructor to store a computed value into the field
    pub fn inject_computed(
        &mut self,
        token: FieldToken,
        provider: Rc<dyn ComputedValue>,
    ) -> Result<(), Error> {
        self.ensure_unlocked()?;
        let index = self.shared.push(Value::Host(HostValue::Computed(provider)));
        self.transition(token, FieldState::Injected(InjectKind::Computed(index)), "inject")
    }

    /// Arrange for the constructor to resolve the field from the instance context by its type
    pub fn inject_from_instance_context(&mut self, token: FieldToken) -> Result<(), Error> {
        self.ensure_unlocked()?;
        match self.field_descriptor(token) {
            FieldType::Object(_) => {}
            other => return Err(Error::BadDescriptor(format!("{:?}", other))),
        }
        self.transition(token, FieldState::Injected(InjectKind::FromInstanceContext), "inject")
    }

    /// Replace all access to the field with calls into a pluggable get/set interceptor
    pub fn set_conduit(
        &mut self,
        token: FieldToken,
        conduit: Rc<dyn FieldConduit>,
    ) -> Result<(), Error> {
        self.ensure_unlocked()?;
        let field = &self.class.fields[token.0];
        if field.access_flags.contains(FieldAccessFlags::PUBLIC) {
            return Err(Error::FieldNotInterceptable {
                class: self.class.name.clone(),
                field: field.name.clone(),
            });
        }
        let index = self.shared.push(Value::Host(HostValue::Conduit(conduit)));
        self.transition(token, FieldState::Conduit { context_index: index }, "conduit")
    }

    /// Conduit variant backed by a computed provider; reads compute, writes are rejected
    pub fn set_computed_conduit(
        &mut self,
        token: FieldToken,
        provider: Rc<dyn ComputedValue>,
    ) -> Result<(), Error> {
        self.set_conduit(token, Rc::new(ComputedConduit { provider }))
    }

    /// Synthesize conventional getter/setter methods for a field
    pub fn create_accessors(
        &mut self,
        token: FieldToken,
        mode: AccessorMode,
    ) -> Result<(), Error> {
        self.ensure_unlocked()?;
        let field_name = self.field_name(token).clone();
        let descriptor = self.field_descriptor(token).clone();
        let capitalized = capitalize(field_name.as_str());

        if matches!(mode, AccessorMode::Get | AccessorMode::GetSet) {
            let getter = UnqualifiedName::from_string(format!("get{}", capitalized))
                .map_err(Error::MalformedName)?;
            self.add_accessor_method(
                getter,
                MethodDescriptor {
                    parameters: vec![],
                    return_type: Some(descriptor.clone()),
                },
                &field_name,
                &descriptor,
                true,
            )?;
        }
        if matches!(mode, AccessorMode::Set | AccessorMode::GetSet) {
            let setter = UnqualifiedName::from_string(format!("set{}", capitalized))
                .map_err(Error::MalformedName)?;
            self.add_accessor_method(
                setter,
                MethodDescriptor {
                    parameters: vec![descriptor.clone()],
                    return_type: None,
                },
                &field_name,
                &descriptor,
                false,
            )?;
        }
        Ok(())
    }

    fn add_accessor_method(
        &mut self,
        name: UnqualifiedName,
        descriptor: MethodDescriptor,
        field_name: &UnqualifiedName,
        field_type: &FieldType,
        getter: bool,
    ) -> Result<(), Error> {
        if self
            .class
            .methods
            .iter()
            .any(|m| m.signature.name == name)
        {
            return Err(Error::AccessorCollision {
                class: self.class.name.clone(),
                method: name,
            });
        }
        let field_ref = FieldRef {
            owner: self.class.name.clone(),
            name: field_name.clone(),
            descriptor: field_type.clone(),
        };
        let mut method = MethodNode {
            access_flags: MethodAccessFlags::PUBLIC,
            signature: MethodSignature::new(name, descriptor),
            code: None,
            annotations: vec![],
        };
        let mut labels = LabelGenerator::new();
        let mut builder = InstructionBuilder::for_method(&mut method, &mut labels);
        if getter {
            builder.load_this()?;
            builder.get_field(field_ref)?;
            builder.return_value(Some(field_type))?;
        } else {
            builder.load_this()?;
            builder.load_argument(0)?;
            builder.put_field(field_ref)?;
            builder.return_value(None)?;
        }
        self.class.methods.push(method);
        Ok(())
    }

    /// Attach an interceptor to a method; advisors on the same method chain in registration order
    pub fn add_advice(
        &mut self,
        token: MethodToken,
        advice: Rc<dyn MethodAdvice>,
    ) -> Result<(), Error> {
        self.ensure_unlocked()?;
        let method = &self.class.methods[token.0];
        if method.is_static() {
            return Err(Error::AdviceOnStatic {
                class: self.class.name.clone(),
                method: method.signature.name.clone(),
            });
        }
        let key = method.signature.key();
        match self.advice.iter_mut().find(|(k, _)| k == &key) {
            Some((_, chain)) => chain.push(advice),
            None => self.advice.push((key, vec![advice])),
        }
        Ok(())
    }

    /// Register a callback invoked once per new instance, right after field injection
    pub fn on_construct(&mut self, callback: Rc<dyn ConstructorCallback>) -> Result<(), Error> {
        self.ensure_unlocked()?;
        let index = self
            .shared
            .push(Value::Host(HostValue::ConstructorCallback(callback)));
        self.callback_indices.push(index);
        Ok(())
    }

    /// Request indexed external access to a field; indices are assigned sequentially on first
    /// request
    pub fn field_handle(&mut self, token: FieldToken) -> Result<FieldHandle, Error> {
        self.ensure_unlocked()?;
        let index = match self.handle_fields.iter().position(|f| *f == token.0) {
            Some(index) => index,
            None => {
                self.handle_fields.push(token.0);
                self.handle_fields.len() - 1
            }
        };
        Ok(FieldHandle::new(index, self.binding.clone()))
    }

    /// Request indexed external invocation of a method
    pub fn method_handle(&mut self, token: MethodToken) -> Result<MethodHandle, Error> {
        self.ensure_unlocked()?;
        let index = match self.handle_methods.iter().position(|m| *m == token.0) {
            Some(index) => index,
            None => {
                self.handle_methods.push(token.0);
                self.handle_methods.len() - 1
            }
        };
        Ok(MethodHandle::new(index, self.binding.clone()))
    }

    /// Copy annotations from a template implementation class onto the generated class
    ///
    /// Later sources win when an annotation type is repeated across sources.
    pub fn annotate_from(&mut self, template: &ClassNode) -> Result<(), Error> {
        self.ensure_unlocked()?;
        self.annotation_sources.push(template.annotations.clone());
        Ok(())
    }

    /// Finalize the class and produce an instantiator for it
    pub fn create_instantiator(&mut self) -> Result<ClassInstantiator, Error> {
        self.ensure_unlocked()?;
        self.locked = true;
        log::debug!("finalizing {:?}", self.class.name);

        // (1) annotation merge, later sources winning per type
        if !self.annotation_sources.is_empty() {
            let mut sources: Vec<&[AnnotationNode]> = self
                .annotation_sources
                .iter()
                .map(|s| s.as_slice())
                .collect();
            let own = self.class.annotations.clone();
            sources.push(own.as_slice());
            self.class.annotations = merge_annotations(&sources);
        }

        // (2) the shim class, if any handle was requested
        let shim_class = if self.handle_fields.is_empty() && self.handle_methods.is_empty() {
            None
        } else {
            let fields: Vec<(UnqualifiedName, FieldType)> = self
                .handle_fields
                .iter()
                .map(|f| {
                    let field = &self.class.fields[*f];
                    (field.name.clone(), field.descriptor.clone())
                })
                .collect();
            let methods: Vec<MethodSignature> = self
                .handle_methods
                .iter()
                .map(|m| self.class.methods[*m].signature.clone())
                .collect();
            Some(build_shim(&self.class.name, &fields, &methods)?)
        };

        // (3) wire interception accessors and rewrite field access across every original body
        self.ensure_context_fields()?;
        self.build_interception_accessors()?;
        self.rewrite_field_access()?;

        // (4) advised methods
        let mut companions = vec![];
        let advised = std::mem::take(&mut self.advice);
        for (key, mut chain) in advised {
            // Earlier-registered advice sits closest to the original implementation, so the
            // chain dispatches from the most recently added advisor inward
            chain.reverse();
            let bundle = AdviceBundle::new(chain);
            let index = self
                .shared
                .push(Value::Host(HostValue::AdviceBundle(Rc::new(bundle))));
            companions.push(rewrite_advised_method(&mut self.class, &key, index)?);
        }

        // (5) constructor completion
        self.complete_constructor()?;

        // (6) encode, decode, and link; the codec round trip is the defined form
        let bytes = self.registry.codec.encode(&self.class)?;
        let defined = self.registry.codec.decode(&bytes)?;
        self.registry.machine.define(&defined)?;
        for companion in &companions {
            self.registry.machine.define(companion)?;
        }
        if let Some(shim_class) = &shim_class {
            self.registry.machine.define(shim_class)?;
            let shim = self
                .registry
                .machine
                .construct(shim_class.name.as_str(), &[], vec![])
                .map_err(|thrown| Error::LinkError {
                    class: shim_class.name.clone(),
                    reason: format!("{:?}", thrown),
                })?;
            *self.binding.borrow_mut() = Some(ShimBinding {
                machine: self.registry.machine.clone(),
                shim,
            });
        }

        // (7) capture inheritance and context data for subclasses transformed later
        let record = Rc::new(InheritanceRecord::of(
            &self.class,
            self.parent_record.clone(),
        ));
        self.registry
            .set_record(self.class.name.as_str(), record);
        self.registry
            .set_template(self.class.name.as_str(), self.shared.clone());

        // (8) the instantiator, bound to the defined class
        Ok(ClassInstantiator::new(
            self.registry.machine.clone(),
            String::from(self.class.name.as_str()),
            self.shared.clone(),
        ))
    }

    fn ensure_context_fields(&mut self) -> Result<(), Error> {
        for (name, descriptor) in [
            (SHARED_FIELD, FieldType::Object(BinaryName::SHAREDCONTEXT)),
            (
                INSTANCE_FIELD,
                FieldType::Object(BinaryName::INSTANCECONTEXT),
            ),
        ] {
            if self.class.field(name).is_none() {
                self.class.fields.push(FieldNode {
                    access_flags: FieldAccessFlags::PRIVATE,
                    name: UnqualifiedName::from_string(String::from(name))
                        .map_err(Error::MalformedName)?,
                    descriptor,
                    annotations: vec![],
                });
            }
        }
        Ok(())
    }

    /// Synthesize the per-field interception methods and register the rewrite table entries
    fn build_interception_accessors(&mut self) -> Result<(), Error> {
        let owner = self.class.name.clone();
        let states: Vec<(String, Option<usize>)> = self
            .states
            .iter()
            .map(|(name, state)| match state {
                FieldState::Injected(_) => (name.clone(), None),
                FieldState::Conduit { context_index } => (name.clone(), Some(*context_index)),
            })
            .collect();

        for (field_name, conduit_index) in states {
            // State keys always come from live field tokens
            let descriptor = match self.class.field(&field_name) {
                Some(field) => field.descriptor.clone(),
                None => continue,
            };
            match conduit_index {
                None => {
                    let reject = self.build_reject_setter(&field_name, &descriptor)?;
                    self.registry.add_instrumentation(
                        owner.as_str(),
                        &field_name,
                        AccessKind::Write,
                        reject,
                    );
                }
                Some(context_index) => {
                    let getter =
                        self.build_conduit_getter(&field_name, &descriptor, context_index)?;
                    let setter =
                        self.build_conduit_setter(&field_name, &descriptor, context_index)?;
                    self.registry.add_instrumentation(
                        owner.as_str(),
                        &field_name,
                        AccessKind::Read,
                        getter,
                    );
                    self.registry.add_instrumentation(
                        owner.as_str(),
                        &field_name,
                        AccessKind::Write,
                        setter,
                    );
                }
            }
        }
        Ok(())
    }

    fn build_reject_setter(
        &mut self,
        field_name: &str,
        descriptor: &FieldType,
    ) -> Result<MethodRef, Error> {
        let name = UnqualifiedName::from_string(format!("reject$set${}", field_name))
            .map_err(Error::MalformedName)?;
        let method_descriptor = MethodDescriptor {
            parameters: vec![descriptor.clone()],
            return_type: None,
        };
        let mut method = MethodNode {
            access_flags: MethodAccessFlags::PUBLIC | MethodAccessFlags::SYNTHETIC,
            signature: MethodSignature::new(name.clone(), method_descriptor.clone()),
            code: None,
            annotations: vec![],
        };
        let mut labels = LabelGenerator::new();
        let mut builder = InstructionBuilder::for_method(&mut method, &mut labels);
        let message = format!("Field {} is injected and read-only", field_name);
        builder.throw_exception(BinaryName::ILLEGALSTATEEXCEPTION, Some(&message))?;
        self.class.methods.push(method);
        Ok(MethodRef {
            owner: self.class.name.clone(),
            name,
            descriptor: method_descriptor,
        })
    }

    fn build_conduit_getter(
        &mut self,
        field_name: &str,
        descriptor: &FieldType,
        context_index: usize,
    ) -> Result<MethodRef, Error> {
        let name = UnqualifiedName::from_string(format!("conduit$get${}", field_name))
            .map_err(Error::MalformedName)?;
        let method_descriptor = MethodDescriptor {
            parameters: vec![],
            return_type: Some(descriptor.clone()),
        };
        let mut method = MethodNode {
            access_flags: MethodAccessFlags::PUBLIC | MethodAccessFlags::SYNTHETIC,
            signature: MethodSignature::new(name.clone(), method_descriptor.clone()),
            code: None,
            annotations: vec![],
        };
        let mut labels = LabelGenerator::new();
        let mut builder = InstructionBuilder::for_method(&mut method, &mut labels);
        self.load_conduit(&mut builder, context_index)?;
        builder.load_this()?;
        builder.invoke_virtual(MethodRef {
            owner: BinaryName::FIELDCONDUIT,
            name: UnqualifiedName::GET,
            descriptor: MethodDescriptor {
                parameters: vec![FieldType::Object(BinaryName::OBJECT)],
                return_type: Some(FieldType::Object(BinaryName::OBJECT)),
            },
        })?;
        builder.cast_or_unbox(descriptor)?;
        builder.return_value(Some(descriptor))?;
        self.class.methods.push(method);
        Ok(MethodRef {
            owner: self.class.name.clone(),
            name,
            descriptor: method_descriptor,
        })
    }

    fn build_conduit_setter(
        &mut self,
        field_name: &str,
        descriptor: &FieldType,
        context_index: usize,
    ) -> Result<MethodRef, Error> {
        let name = UnqualifiedName::from_string(format!("conduit$set${}", field_name))
            .map_err(Error::MalformedName)?;
        let method_descriptor = MethodDescriptor {
            parameters: vec![descriptor.clone()],
            return_type: None,
        };
        let mut method = MethodNode {
            access_flags: MethodAccessFlags::PUBLIC | MethodAccessFlags::SYNTHETIC,
            signature: MethodSignature::new(name.clone(), method_descriptor.clone()),
            code: None,
            annotations: vec![],
        };
        let write_behind = self.registry.settings.write_behind;
        let owner = self.class.name.clone();
        let field_ref = FieldRef {
            owner: owner.clone(),
            name: UnqualifiedName::from_string(String::from(field_name))
                .map_err(Error::MalformedName)?,
            descriptor: descriptor.clone(),
        };
        let mut labels = LabelGenerator::new();
        let mut builder = InstructionBuilder::for_method(&mut method, &mut labels);
        self.load_conduit(&mut builder, context_index)?;
        builder.load_this()?;
        builder.load_argument(0)?;
        builder.box_if_primitive(descriptor)?;
        builder.invoke_virtual(MethodRef {
            owner: BinaryName::FIELDCONDUIT,
            name: UnqualifiedName::SET,
            descriptor: MethodDescriptor {
                parameters: vec![
                    FieldType::Object(BinaryName::OBJECT),
                    FieldType::Object(BinaryName::OBJECT),
                ],
                return_type: None,
            },
        })?;
        if write_behind {
            // Keep a shadow copy in the real field for fast direct reads elsewhere
            builder.load_this()?;
            builder.load_argument(0)?;
            builder.put_field(field_ref)?;
        }
        builder.return_value(None)?;
        self.class.methods.push(method);
        Ok(MethodRef {
            owner,
            name,
            descriptor: method_descriptor,
        })
    }

    /// Push the conduit host object stored at `context_index` in the shared context
    fn load_conduit(
        &self,
        builder: &mut InstructionBuilder<'_>,
        context_index: usize,
    ) -> Result<(), Error> {
        builder.load_this()?;
        builder.get_field(FieldRef {
            owner: self.class.name.clone(),
            name: UnqualifiedName::from_string(String::from(SHARED_FIELD))
                .map_err(Error::MalformedName)?,
            descriptor: FieldType::Object(BinaryName::SHAREDCONTEXT),
        })?;
        builder.const_int(context_index as i32)?;
        builder.invoke_virtual(MethodRef {
            owner: BinaryName::SHAREDCONTEXT,
            name: UnqualifiedName::GET,
            descriptor: MethodDescriptor {
                parameters: vec![FieldType::int()],
                return_type: Some(FieldType::Object(BinaryName::OBJECT)),
            },
        })?;
        builder.push_instruction(Instruction::CheckCast(FieldType::Object(
            BinaryName::FIELDCONDUIT,
        )))?;
        Ok(())
    }

    /// Swap every direct access to an instrumented field for its interception accessor
    ///
    /// Applies the pool-wide rewrite table, so fields instrumented on a transformed ancestor are
    /// redirected here too.
    fn rewrite_field_access(&mut self) -> Result<(), Error> {
        let table = self.registry.instrumentation_snapshot();
        if table.is_empty() {
            return Ok(());
        }
        for method in &mut self.class.methods {
            let method_name = method.signature.name.as_str();
            if method_name.starts_with("conduit$") || method_name.starts_with("reject$") {
                continue;
            }
            let code = match &mut method.code {
                Some(code) => code,
                None => continue,
            };
            for insn in &mut code.instructions {
                let replacement = match insn {
                    Instruction::GetField(field) => table
                        .get(&(
                            String::from(field.owner.as_str()),
                            String::from(field.name.as_str()),
                            AccessKind::Read,
                        ))
                        .cloned(),
                    Instruction::PutField(field) => table
                        .get(&(
                            String::from(field.owner.as_str()),
                            String::from(field.name.as_str()),
                            AccessKind::Write,
                        ))
                        .cloned(),
                    _ => None,
                };
                if let Some(accessor) = replacement {
                    *insn = Instruction::Invoke(crate::code::InvokeKind::Virtual, accessor);
                }
            }
        }
        Ok(())
    }

    /// Build the real constructor, folding in any original no-argument constructor body
    fn complete_constructor(&mut self) -> Result<(), Error> {
        let owner = self.class.name.clone();
        let superclass = self
            .class
            .superclass
            .clone()
            .unwrap_or(BinaryName::OBJECT);
        let parent_transformed = self.parent_record.is_some();

        // Fold the original no-arg constructor into a renamed initializer, dropping its leading
        // superclass constructor call (the new constructor makes its own)
        let original_init = self.class.methods.iter().position(|m| {
            m.signature.name == UnqualifiedName::INIT && m.signature.descriptor.parameters.is_empty()
        });
        let folded_initializer = match original_init {
            Some(position) => {
                let mut folded = self.class.methods.remove(position);
                folded.signature.name = UnqualifiedName::from_string(String::from("init$original"))
                    .map_err(Error::MalformedName)?;
                folded.access_flags = MethodAccessFlags::PRIVATE | MethodAccessFlags::SYNTHETIC;
                if let Some(code) = &mut folded.code {
                    let super_call = code.instructions.iter().position(|insn| {
                        matches!(
                            insn,
                            Instruction::Invoke(crate::code::InvokeKind::Special, mref)
                                if mref.name == UnqualifiedName::INIT
                        )
                    });
                    if let Some(position) = super_call {
                        code.instructions.drain(0..=position);
                    }
                }
                let name = folded.signature.name.clone();
                self.class.methods.push(folded);
                Some(name)
            }
            None => None,
        };

        let mut constructor = MethodNode {
            access_flags: MethodAccessFlags::PUBLIC,
            signature: MethodSignature::new(
                UnqualifiedName::INIT,
                MethodDescriptor {
                    parameters: vec![
                        FieldType::Object(BinaryName::SHAREDCONTEXT),
                        FieldType::Object(BinaryName::INSTANCECONTEXT),
                    ],
                    return_type: None,
                },
            ),
            code: None,
            annotations: vec![],
        };
        let mut labels = LabelGenerator::new();
        let mut builder = InstructionBuilder::for_method(&mut constructor, &mut labels);

        builder.load_this()?;
        if parent_transformed {
            builder.load_argument(0)?;
            builder.load_argument(1)?;
            builder.invoke_special(MethodRef {
                owner: superclass,
                name: UnqualifiedName::INIT,
                descriptor: MethodDescriptor {
                    parameters: vec![
                        FieldType::Object(BinaryName::SHAREDCONTEXT),
                        FieldType::Object(BinaryName::INSTANCECONTEXT),
                    ],
                    return_type: None,
                },
            })?;
        } else {
            builder.invoke_special(MethodRef {
                owner: superclass,
                name: UnqualifiedName::INIT,
                descriptor: MethodDescriptor {
                    parameters: vec![],
                    return_type: None,
                },
            })?;
        }

        for (argument, field_name, descriptor) in [
            (
                0,
                SHARED_FIELD,
                FieldType::Object(BinaryName::SHAREDCONTEXT),
            ),
            (
                1,
                INSTANCE_FIELD,
                FieldType::Object(BinaryName::INSTANCECONTEXT),
            ),
        ] {
            builder.load_this()?;
            builder.load_argument(argument)?;
            builder.put_field(FieldRef {
                owner: owner.clone(),
                name: UnqualifiedName::from_string(String::from(field_name))
                    .map_err(Error::MalformedName)?,
                descriptor,
            })?;
        }

        if let Some(initializer) = folded_initializer {
            builder.load_this()?;
            builder.invoke_virtual(MethodRef {
                owner: owner.clone(),
                name: initializer,
                descriptor: MethodDescriptor {
                    parameters: vec![],
                    return_type: None,
                },
            })?;
        }

        // Field injection, in field declaration order
        let injections: Vec<(FieldRef, &InjectKind)> = self
            .class
            .fields
            .iter()
            .filter_map(|field| {
                match self.states.get(field.name.as_str()) {
                    Some(FieldState::Injected(kind)) => Some((
                        FieldRef {
                            owner: owner.clone(),
                            name: field.name.clone(),
                            descriptor: field.descriptor.clone(),
                        },
                        kind,
                    )),
                    _ => None,
                }
            })
            .collect();
        for (field_ref, kind) in injections {
            builder.load_this()?;
            match kind {
                InjectKind::Constant(index) => {
                    builder.load_argument(0)?;
                    builder.const_int(*index as i32)?;
                    builder.invoke_virtual(shared_get())?;
                }
                InjectKind::Computed(index) => {
                    builder.load_argument(0)?;
                    builder.const_int(*index as i32)?;
                    builder.invoke_virtual(shared_get())?;
                    builder.push_instruction(Instruction::CheckCast(FieldType::Object(
                        BinaryName::COMPUTEDVALUE,
                    )))?;
                    builder.load_this()?;
                    builder.invoke_virtual(MethodRef {
                        owner: BinaryName::COMPUTEDVALUE,
                        name: UnqualifiedName::COMPUTE,
                        descriptor: MethodDescriptor {
                            parameters: vec![FieldType::Object(BinaryName::OBJECT)],
                            return_type: Some(FieldType::Object(BinaryName::OBJECT)),
                        },
                    })?;
                }
                InjectKind::FromInstanceContext => {
                    let type_name = match &field_ref.descriptor {
                        FieldType::Object(name) => String::from(name.as_str()),
                        other => return Err(Error::BadDescriptor(format!("{:?}", other))),
                    };
                    builder.load_argument(1)?;
                    builder.const_string(type_name)?;
                    builder.invoke_virtual(MethodRef {
                        owner: BinaryName::INSTANCECONTEXT,
                        name: UnqualifiedName::GETREQUIRED,
                        descriptor: MethodDescriptor {
                            parameters: vec![FieldType::Object(BinaryName::STRING)],
                            return_type: Some(FieldType::Object(BinaryName::OBJECT)),
                        },
                    })?;
                }
            }
            builder.cast_or_unbox(&field_ref.descriptor)?;
            builder.put_field(field_ref)?;
        }

        // Constructor callbacks, after injection
        for index in &self.callback_indices {
            builder.load_argument(0)?;
            builder.const_int(*index as i32)?;
            builder.invoke_virtual(shared_get())?;
            builder.push_instruction(Instruction::CheckCast(FieldType::Object(
                BinaryName::CONSTRUCTORCALLBACK,
            )))?;
            builder.load_this()?;
            builder.invoke_virtual(MethodRef {
                owner: BinaryName::CONSTRUCTORCALLBACK,
                name: UnqualifiedName::ONCONSTRUCT,
                descriptor: MethodDescriptor {
                    parameters: vec![FieldType::Object(BinaryName::OBJECT)],
                    return_type: None,
                },
            })?;
        }

        builder.return_value(None)?;
        self.class.methods.push(constructor);
        Ok(())
    }
}

#[derive(Clone)]
enum LoadDelegate {
    Field(FieldRef),
    Method(MethodRef),
}

fn shared_get() -> MethodRef {
    MethodRef {
        owner: BinaryName::SHAREDCONTEXT,
        name: UnqualifiedName::GET,
        descriptor: MethodDescriptor {
            parameters: vec![FieldType::int()],
            return_type: Some(FieldType::Object(BinaryName::OBJECT)),
        },
    }
}

fn capitalize(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
