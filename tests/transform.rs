//! End-to-end transformation tests: build a small source class, push it through a pool with a
//! delegate, and exercise the generated code in the runtime machine.

mod common;

use common::*;
use plastic::code::FieldRef;
use plastic::model::{
    ClassAccessFlags, ClassNode, FieldAccessFlags, FieldType, MethodAccessFlags, MethodNode, Name,
    ParseDescriptor,
};
use plastic::pool::{ClassPool, MapLoader, PoolSettings, TransformerDelegate};
use plastic::runtime::{ObjRef, Thrown, Value};
use plastic::transform::{
    AccessorMode, ClassTransform, ComputedValue, ConstructorCallback, FieldConduit, FieldHandle,
    Invocation, MethodAdvice, MethodHandle, ProxyTarget,
};
use plastic::Error;
use std::cell::RefCell;
use std::rc::Rc;

fn pool_with(
    classes: Vec<ClassNode>,
    delegate: Rc<dyn TransformerDelegate>,
    write_behind: bool,
) -> ClassPool {
    let mut loader = MapLoader::new();
    for class in &classes {
        loader.add(String::from(class.name.as_str()), encode(class));
    }
    let settings = PoolSettings {
        write_behind,
        controlled_packages: vec![String::from("app/")],
    };
    ClassPool::new(Box::new(loader), delegate, settings)
}

fn string_type() -> FieldType {
    FieldType::parse("Ljava/lang/String;").unwrap()
}

/// `app/Point`: one private field set by the constructor, a passthrough method, and a method that
/// throws a declared checked exception
fn point_class() -> ClassNode {
    let mut class = ClassNode::subclass_shell(name("app/Point"), name("java/lang/Object"));
    class
        .fields
        .push(field("label", "Ljava/lang/String;", FieldAccessFlags::PRIVATE));
    class.methods.push(constructor("java/lang/Object", |b| {
        b.load_this()?;
        b.const_string("fresh")?;
        b.put_field(FieldRef {
            owner: name("app/Point"),
            name: uname("label"),
            descriptor: FieldType::parse("Ljava/lang/String;").unwrap(),
        })?;
        Ok(())
    }));
    class.methods.push(method(
        signature("greet", "(Ljava/lang/String;)Ljava/lang/String;"),
        MethodAccessFlags::PUBLIC,
        |b| {
            b.load_argument(0)?;
            b.return_value(Some(&FieldType::parse("Ljava/lang/String;").unwrap()))?;
            Ok(())
        },
    ));
    class.methods.push(method(
        signature("risky", "()V").with_throws(vec![name("app/CheckedFailure")]),
        MethodAccessFlags::PUBLIC,
        |b| {
            b.throw_exception(name("app/CheckedFailure"), Some("boom"))?;
            Ok(())
        },
    ));
    class
}

/// `app/CheckedFailure extends java/lang/Exception`, linked directly into the machine
fn checked_failure_class() -> ClassNode {
    let mut class = ClassNode::subclass_shell(name("app/CheckedFailure"), name("java/lang/Exception"));
    class.methods.push(method(
        signature("<init>", "(Ljava/lang/String;)V"),
        MethodAccessFlags::PUBLIC,
        |b| {
            b.load_this()?;
            b.load_argument(0)?;
            b.invoke_special(plastic::code::MethodRef {
                owner: name("java/lang/Exception"),
                name: uname("<init>"),
                descriptor: plastic::model::MethodDescriptor::parse("(Ljava/lang/String;)V")
                    .unwrap(),
            })?;
            b.return_value(None)?;
            Ok(())
        },
    ));
    class
}

struct InjectDelegate;

impl TransformerDelegate for InjectDelegate {
    fn transform(&self, t: &mut ClassTransform) -> Result<(), Error> {
        let stamp = t.introduce_field(string_type(), "stamp")?;
        t.inject(stamp, Value::string("v1"))?;
        t.create_accessors(stamp, AccessorMode::Get)?;

        let size = t.introduce_field(FieldType::int(), "size")?;
        t.inject(size, Value::Int(33))?;
        t.create_accessors(size, AccessorMode::Get)?;

        let label = t.field_token("label").unwrap();
        t.create_accessors(label, AccessorMode::GetSet)?;

        // Introducing the same signature twice must hand back the same token
        let poke = t.introduce_method(signature("poke", "()V"))?;
        let again = t.introduce_method(signature("poke", "()V"))?;
        assert_eq!(poke, again);

        t.change_implementation(poke, |b| {
            b.load_this()?;
            b.const_string("nope")?;
            b.put_field(FieldRef {
                owner: name("app/Point"),
                name: uname("stamp"),
                descriptor: FieldType::parse("Ljava/lang/String;").unwrap(),
            })?;
            b.return_value(None)?;
            Ok(())
        })?;
        Ok(())
    }
}

#[test]
fn injected_values_arrive_through_the_constructor() {
    init_logging();
    let pool = pool_with(vec![point_class()], Rc::new(InjectDelegate), false);
    let instantiator = pool.instantiator(&name("app/Point")).unwrap();
    let instance = instantiator.new_instance().unwrap();
    let machine = pool.machine();

    let stamp = machine
        .call_method(&instance, "getStamp", "()Ljava/lang/String;", vec![])
        .unwrap()
        .unwrap();
    assert_eq!(stamp.as_str().unwrap(), "v1");

    let size = machine
        .call_method(&instance, "getSize", "()I", vec![])
        .unwrap()
        .unwrap();
    assert_eq!(size.as_int().unwrap(), 33);

    // The original constructor body was folded in and still runs
    let label = machine
        .call_method(&instance, "getLabel", "()Ljava/lang/String;", vec![])
        .unwrap()
        .unwrap();
    assert_eq!(label.as_str().unwrap(), "fresh");

    machine
        .call_method(
            &instance,
            "setLabel",
            "(Ljava/lang/String;)V",
            vec![Value::string("tag")],
        )
        .unwrap();
    let label = machine
        .call_method(&instance, "getLabel", "()Ljava/lang/String;", vec![])
        .unwrap()
        .unwrap();
    assert_eq!(label.as_str().unwrap(), "tag");
}

#[test]
fn writes_to_injected_fields_throw_after_construction() {
    init_logging();
    let pool = pool_with(vec![point_class()], Rc::new(InjectDelegate), false);
    let instantiator = pool.instantiator(&name("app/Point")).unwrap();
    let instance = instantiator.new_instance().unwrap();

    let thrown = pool
        .machine()
        .call_method(&instance, "poke", "()V", vec![])
        .unwrap_err();
    assert_eq!(thrown.class_name(), "java/lang/IllegalStateException");
    assert_eq!(
        thrown.message().as_deref(),
        Some("Field stamp is injected and read-only")
    );
}

/// Wraps the captured return value in `<tag>(...)` after proceeding
struct Wrap(&'static str);

impl MethodAdvice for Wrap {
    fn advise(&self, invocation: &Invocation<'_>) -> Result<(), Thrown> {
        invocation.proceed()?;
        let rv = invocation.return_value()?;
        let text = String::from(rv.as_str()?);
        invocation.set_return_value(Value::string(format!("{}({})", self.0, text)))
    }
}

struct AdviceDelegate;

impl TransformerDelegate for AdviceDelegate {
    fn transform(&self, t: &mut ClassTransform) -> Result<(), Error> {
        let greet = t
            .method_token(&signature("greet", "(Ljava/lang/String;)Ljava/lang/String;").key())
            .unwrap();
        t.add_advice(greet, Rc::new(Wrap("A")))?;
        t.add_advice(greet, Rc::new(Wrap("B")))?;
        Ok(())
    }
}

#[test]
fn advice_chains_in_registration_order() {
    init_logging();
    let pool = pool_with(vec![point_class()], Rc::new(AdviceDelegate), false);
    let instantiator = pool.instantiator(&name("app/Point")).unwrap();
    let instance = instantiator.new_instance().unwrap();

    let result = pool
        .machine()
        .call_method(
            &instance,
            "greet",
            "(Ljava/lang/String;)Ljava/lang/String;",
            vec![Value::string("x")],
        )
        .unwrap()
        .unwrap();
    // First registered runs closest to the original body; later advice wraps it
    assert_eq!(result.as_str().unwrap(), "B(A(x))");
}

/// Applies a pure function to the captured return value after proceeding
struct Adjust(fn(i32) -> i32);

impl MethodAdvice for Adjust {
    fn advise(&self, invocation: &Invocation<'_>) -> Result<(), Thrown> {
        invocation.proceed()?;
        let rv = invocation.return_value()?.as_int()?;
        invocation.set_return_value(Value::Int(self.0(rv)))
    }
}

struct NumericAdviceDelegate {
    reversed: bool,
}

impl TransformerDelegate for NumericAdviceDelegate {
    fn transform(&self, t: &mut ClassTransform) -> Result<(), Error> {
        let get_value = t.method_token(&signature("getValue", "()I").key()).unwrap();
        let double: Rc<dyn MethodAdvice> = Rc::new(Adjust(|rv| rv * 2));
        let add_one: Rc<dyn MethodAdvice> = Rc::new(Adjust(|rv| rv + 1));
        let chain = if self.reversed {
            [add_one, double]
        } else {
            [double, add_one]
        };
        for advice in chain {
            t.add_advice(get_value, advice)?;
        }
        Ok(())
    }
}

fn advised_counter_value(reversed: bool) -> i32 {
    let pool = pool_with(
        vec![counter_class()],
        Rc::new(NumericAdviceDelegate { reversed }),
        false,
    );
    let instance = pool
        .instantiator(&name("app/Counter"))
        .unwrap()
        .new_instance()
        .unwrap();
    let machine = pool.machine();
    machine
        .call_method(&instance, "setValue", "(I)V", vec![Value::Int(42)])
        .unwrap();
    machine
        .call_method(&instance, "getValue", "()I", vec![])
        .unwrap()
        .unwrap()
        .as_int()
        .unwrap()
}

#[test]
fn numeric_advice_composes_in_registration_order() {
    init_logging();
    assert_eq!(advised_counter_value(false), 85);
    assert_eq!(advised_counter_value(true), 86);
}

/// Changes the first parameter before proceeding
struct Redirect;

impl MethodAdvice for Redirect {
    fn advise(&self, invocation: &Invocation<'_>) -> Result<(), Thrown> {
        let seen = String::from(invocation.parameter(0)?.as_str()?);
        invocation.set_parameter(0, Value::string(format!("{}*", seen)))?;
        invocation.proceed()
    }
}

struct RedirectDelegate;

impl TransformerDelegate for RedirectDelegate {
    fn transform(&self, t: &mut ClassTransform) -> Result<(), Error> {
        let greet = t
            .method_token(&signature("greet", "(Ljava/lang/String;)Ljava/lang/String;").key())
            .unwrap();
        t.add_advice(greet, Rc::new(Redirect))
    }
}

#[test]
fn advice_can_rewrite_parameters_before_the_original_runs() {
    init_logging();
    let pool = pool_with(vec![point_class()], Rc::new(RedirectDelegate), false);
    let instantiator = pool.instantiator(&name("app/Point")).unwrap();
    let instance = instantiator.new_instance().unwrap();

    let result = pool
        .machine()
        .call_method(
            &instance,
            "greet",
            "(Ljava/lang/String;)Ljava/lang/String;",
            vec![Value::string("in")],
        )
        .unwrap()
        .unwrap();
    assert_eq!(result.as_str().unwrap(), "in*");
}

struct PassThrough;

impl MethodAdvice for PassThrough {
    fn advise(&self, invocation: &Invocation<'_>) -> Result<(), Thrown> {
        invocation.proceed()
    }
}

struct RiskyDelegate;

impl TransformerDelegate for RiskyDelegate {
    fn transform(&self, t: &mut ClassTransform) -> Result<(), Error> {
        let risky = t.method_token(&signature("risky", "()V").key()).unwrap();
        t.add_advice(risky, Rc::new(PassThrough))
    }
}

#[test]
fn checked_exceptions_cross_the_advice_chain_intact() {
    init_logging();
    let pool = pool_with(vec![point_class()], Rc::new(RiskyDelegate), false);
    pool.machine().define(&checked_failure_class()).unwrap();

    let instantiator = pool.instantiator(&name("app/Point")).unwrap();
    let instance = instantiator.new_instance().unwrap();

    let thrown = pool
        .machine()
        .call_method(&instance, "risky", "()V", vec![])
        .unwrap_err();
    assert_eq!(thrown.class_name(), "app/CheckedFailure");
    assert_eq!(thrown.message().as_deref(), Some("boom"));
}

#[derive(Default)]
struct HandleDelegate {
    stamp: RefCell<Option<FieldHandle>>,
    label: RefCell<Option<FieldHandle>>,
    greet: RefCell<Option<MethodHandle>>,
    risky: RefCell<Option<MethodHandle>>,
}

impl TransformerDelegate for HandleDelegate {
    fn transform(&self, t: &mut ClassTransform) -> Result<(), Error> {
        let stamp = t.introduce_field(string_type(), "stamp")?;
        t.inject(stamp, Value::string("v1"))?;
        let size = t.introduce_field(FieldType::int(), "size")?;
        t.inject(size, Value::Int(33))?;
        let label = t.field_token("label").unwrap();

        let first = t.field_handle(stamp)?;
        assert_eq!(first.index(), 0);
        assert_eq!(t.field_handle(size)?.index(), 1);
        // Re-requesting a handle keeps the originally assigned index
        assert_eq!(t.field_handle(stamp)?.index(), 0);
        let label_handle = t.field_handle(label)?;
        assert_eq!(label_handle.index(), 2);

        let greet = t
            .method_token(&signature("greet", "(Ljava/lang/String;)Ljava/lang/String;").key())
            .unwrap();
        let risky = t.method_token(&signature("risky", "()V").key()).unwrap();
        let greet_handle = t.method_handle(greet)?;
        assert_eq!(greet_handle.index(), 0);
        let risky_handle = t.method_handle(risky)?;
        assert_eq!(risky_handle.index(), 1);

        *self.stamp.borrow_mut() = Some(first);
        *self.label.borrow_mut() = Some(label_handle);
        *self.greet.borrow_mut() = Some(greet_handle);
        *self.risky.borrow_mut() = Some(risky_handle);
        Ok(())
    }
}

#[test]
fn handles_dispatch_through_the_generated_shim() {
    init_logging();
    let delegate = Rc::new(HandleDelegate::default());
    let pool = pool_with(vec![point_class()], delegate.clone(), false);
    pool.machine().define(&checked_failure_class()).unwrap();

    // Handles bind only once the class is finalized
    let early = delegate.stamp.borrow();
    assert!(early.is_none());
    drop(early);

    let instantiator = pool.instantiator(&name("app/Point")).unwrap();
    let instance = instantiator.new_instance().unwrap();

    let stamp = delegate.stamp.borrow();
    let stamp = stamp.as_ref().unwrap();
    assert_eq!(stamp.get(&instance).unwrap().as_str().unwrap(), "v1");

    let label = delegate.label.borrow();
    let label = label.as_ref().unwrap();
    label.set(&instance, Value::string("tagged")).unwrap();
    assert_eq!(label.get(&instance).unwrap().as_str().unwrap(), "tagged");

    let greet = delegate.greet.borrow();
    let greet = greet.as_ref().unwrap();
    let result = greet.invoke(&instance, vec![Value::string("q")]).unwrap();
    assert_eq!(result.as_str().unwrap(), "q");

    let risky = delegate.risky.borrow();
    let risky = risky.as_ref().unwrap();
    let thrown = risky.invoke(&instance, vec![]).unwrap_err();
    assert_eq!(thrown.class_name(), "app/CheckedFailure");
}

/// `app/Counter`: a private int field with conventional accessors written by hand
fn counter_class() -> ClassNode {
    let mut class = ClassNode::subclass_shell(name("app/Counter"), name("java/lang/Object"));
    class
        .fields
        .push(field("value", "I", FieldAccessFlags::PRIVATE));
    class
        .methods
        .push(constructor("java/lang/Object", |_| Ok(())));
    class.methods.push(method(
        signature("getValue", "()I"),
        MethodAccessFlags::PUBLIC,
        |b| {
            b.load_this()?;
            b.get_field(FieldRef {
                owner: name("app/Counter"),
                name: uname("value"),
                descriptor: FieldType::int(),
            })?;
            b.return_value(Some(&FieldType::int()))?;
            Ok(())
        },
    ));
    class.methods.push(method(
        signature("setValue", "(I)V"),
        MethodAccessFlags::PUBLIC,
        |b| {
            b.load_this()?;
            b.load_argument(0)?;
            b.put_field(FieldRef {
                owner: name("app/Counter"),
                name: uname("value"),
                descriptor: FieldType::int(),
            })?;
            b.return_value(None)?;
            Ok(())
        },
    ));
    class
}

struct RecordingConduit {
    writes: RefCell<Vec<i32>>,
}

impl FieldConduit for RecordingConduit {
    fn load(&self, _instance: &Value) -> Result<Value, Thrown> {
        Ok(Value::Int(42))
    }

    fn store(&self, _instance: &Value, value: Value) -> Result<(), Thrown> {
        self.writes.borrow_mut().push(value.as_int()?);
        Ok(())
    }
}

struct ConduitDelegate {
    conduit: Rc<RecordingConduit>,
    value: RefCell<Option<FieldHandle>>,
}

impl TransformerDelegate for ConduitDelegate {
    fn transform(&self, t: &mut ClassTransform) -> Result<(), Error> {
        let value = t.field_token("value").unwrap();
        t.set_conduit(value, self.conduit.clone())?;
        *self.value.borrow_mut() = Some(t.field_handle(value)?);
        Ok(())
    }
}

#[test]
fn conduits_intercept_both_reads_and_writes() {
    init_logging();
    let conduit = Rc::new(RecordingConduit {
        writes: RefCell::new(vec![]),
    });
    let delegate = Rc::new(ConduitDelegate {
        conduit: conduit.clone(),
        value: RefCell::new(None),
    });
    let pool = pool_with(vec![counter_class()], delegate.clone(), false);
    let instantiator = pool.instantiator(&name("app/Counter")).unwrap();
    let instance = instantiator.new_instance().unwrap();
    let machine = pool.machine();

    let read = machine
        .call_method(&instance, "getValue", "()I", vec![])
        .unwrap()
        .unwrap();
    assert_eq!(read.as_int().unwrap(), 42);

    machine
        .call_method(&instance, "setValue", "(I)V", vec![Value::Int(7)])
        .unwrap();
    assert_eq!(*conduit.writes.borrow(), vec![7]);

    // Without write-behind the real field stays untouched (handles bypass the conduit)
    let handle = delegate.value.borrow();
    let raw = handle.as_ref().unwrap().get(&instance).unwrap();
    assert_eq!(raw.as_int().unwrap(), 0);
}

#[test]
fn write_behind_shadows_conduit_writes_into_the_field() {
    init_logging();
    let conduit = Rc::new(RecordingConduit {
        writes: RefCell::new(vec![]),
    });
    let delegate = Rc::new(ConduitDelegate {
        conduit: conduit.clone(),
        value: RefCell::new(None),
    });
    let pool = pool_with(vec![counter_class()], delegate.clone(), true);
    let instantiator = pool.instantiator(&name("app/Counter")).unwrap();
    let instance = instantiator.new_instance().unwrap();

    pool.machine()
        .call_method(&instance, "setValue", "(I)V", vec![Value::Int(9)])
        .unwrap();
    assert_eq!(*conduit.writes.borrow(), vec![9]);

    let handle = delegate.value.borrow();
    let raw = handle.as_ref().unwrap().get(&instance).unwrap();
    assert_eq!(raw.as_int().unwrap(), 9);
}

struct NullConduit;

impl FieldConduit for NullConduit {
    fn load(&self, _instance: &Value) -> Result<Value, Thrown> {
        Ok(Value::Null)
    }

    fn store(&self, _instance: &Value, _value: Value) -> Result<(), Thrown> {
        Ok(())
    }
}

struct ConflictDelegate;

impl TransformerDelegate for ConflictDelegate {
    fn transform(&self, t: &mut ClassTransform) -> Result<(), Error> {
        let guarded = t.introduce_field(FieldType::int(), "guarded")?;
        t.inject(guarded, Value::Int(1))?;

        match t.set_conduit(guarded, Rc::new(NullConduit)) {
            Err(Error::FieldStateConflict { existing, .. }) => assert_eq!(existing, "injected"),
            other => panic!("expected a state conflict, got {:?}", other),
        }
        match t.claim_field(guarded, "other-feature") {
            Err(Error::FieldAlreadyClaimed { existing_tag, .. }) => {
                assert_eq!(existing_tag, "inject")
            }
            other => panic!("expected a claim conflict, got {:?}", other),
        }
        // Re-claiming under the original tag stays legal
        t.claim_field(guarded, "inject")?;
        Ok(())
    }
}

#[test]
fn field_states_are_mutually_exclusive() {
    init_logging();
    let pool = pool_with(vec![point_class()], Rc::new(ConflictDelegate), false);
    pool.instantiator(&name("app/Point")).unwrap();
}

fn open_class() -> ClassNode {
    let mut class = ClassNode::subclass_shell(name("app/Open"), name("java/lang/Object"));
    class
        .fields
        .push(field("exposed", "I", FieldAccessFlags::PUBLIC));
    class
        .methods
        .push(constructor("java/lang/Object", |_| Ok(())));
    class
}

struct OpenDelegate;

impl TransformerDelegate for OpenDelegate {
    fn transform(&self, t: &mut ClassTransform) -> Result<(), Error> {
        let exposed = t.field_token("exposed").unwrap();
        t.set_conduit(exposed, Rc::new(NullConduit))
    }
}

#[test]
fn public_fields_cannot_be_intercepted() {
    init_logging();
    let pool = pool_with(vec![open_class()], Rc::new(OpenDelegate), false);
    match pool.instantiator(&name("app/Open")) {
        Err(Error::FieldNotInterceptable { field, .. }) => {
            assert_eq!(field.as_str(), "exposed")
        }
        other => panic!("expected rejection, got {:?}", other.map(|_| ())),
    }
}

fn holder_class() -> ClassNode {
    let mut class = ClassNode::subclass_shell(name("app/Holder"), name("java/lang/Object"));
    class
        .methods
        .push(constructor("java/lang/Object", |_| Ok(())));
    class
}

struct HolderDelegate;

impl TransformerDelegate for HolderDelegate {
    fn transform(&self, t: &mut ClassTransform) -> Result<(), Error> {
        let service = t.introduce_field(FieldType::parse("Lapp/Service;").unwrap(), "service")?;
        t.inject_from_instance_context(service)?;
        t.create_accessors(service, AccessorMode::Get)?;
        Ok(())
    }
}

#[test]
fn instance_context_values_resolve_by_type_name() {
    init_logging();
    let pool = pool_with(vec![holder_class()], Rc::new(HolderDelegate), false);
    let instantiator = pool.instantiator(&name("app/Holder")).unwrap();

    let service = Value::Object(ObjRef::new("app/Service"));
    let instance = instantiator
        .with("app/Service", service.clone())
        .new_instance()
        .unwrap();
    let resolved = pool
        .machine()
        .call_method(&instance, "getService", "()Lapp/Service;", vec![])
        .unwrap()
        .unwrap();
    assert!(resolved.same_reference(&service));

    // Constructing without the value fails loudly
    let thrown = instantiator.new_instance().unwrap_err();
    assert_eq!(thrown.class_name(), "java/lang/IllegalStateException");
}

struct Probe {
    seen: RefCell<Option<i32>>,
}

impl ConstructorCallback for Probe {
    fn on_construct(&self, instance: &Value) -> Result<(), Thrown> {
        let size = instance
            .as_object()?
            .field("size")
            .unwrap_or(Value::Null)
            .as_int()?;
        *self.seen.borrow_mut() = Some(size);
        Ok(())
    }
}

struct CallbackDelegate {
    probe: Rc<Probe>,
}

impl TransformerDelegate for CallbackDelegate {
    fn transform(&self, t: &mut ClassTransform) -> Result<(), Error> {
        let size = t.introduce_field(FieldType::int(), "size")?;
        t.inject(size, Value::Int(33))?;
        t.on_construct(self.probe.clone())
    }
}

#[test]
fn constructor_callbacks_run_after_injection() {
    init_logging();
    let probe = Rc::new(Probe {
        seen: RefCell::new(None),
    });
    let delegate = Rc::new(CallbackDelegate {
        probe: probe.clone(),
    });
    let pool = pool_with(vec![holder_class()], delegate, false);
    let instantiator = pool.instantiator(&name("app/Holder")).unwrap();
    assert_eq!(*probe.seen.borrow(), None);

    instantiator.new_instance().unwrap();
    assert_eq!(*probe.seen.borrow(), Some(33));
}

fn greeter_interface() -> ClassNode {
    let mut class = ClassNode::subclass_shell(name("app/Greeter"), name("java/lang/Object"));
    class.access_flags = ClassAccessFlags::PUBLIC | ClassAccessFlags::INTERFACE | ClassAccessFlags::ABSTRACT;
    class.methods.push(MethodNode {
        access_flags: MethodAccessFlags::PUBLIC | MethodAccessFlags::ABSTRACT,
        signature: signature("describe", "()Ljava/lang/String;"),
        code: None,
        annotations: vec![],
    });
    class
}

/// A plain linked class implementing `app/Greeter` outside the pool
fn greeter_impl() -> ClassNode {
    let mut class = ClassNode::subclass_shell(name("app/Impl"), name("java/lang/Object"));
    class.interfaces.push(name("app/Greeter"));
    class.methods.push(method(
        signature("describe", "()Ljava/lang/String;"),
        MethodAccessFlags::PUBLIC,
        |b| {
            b.const_string("proxied")?;
            b.return_value(Some(&FieldType::parse("Ljava/lang/String;").unwrap()))?;
            Ok(())
        },
    ));
    class
}

struct ImplementDelegate;

impl TransformerDelegate for ImplementDelegate {
    fn transform(&self, t: &mut ClassTransform) -> Result<(), Error> {
        let tokens = t.introduce_interface(&name("app/Greeter"))?;
        assert_eq!(tokens.len(), 1);
        t.change_implementation(tokens[0], |b| {
            b.const_string("hello")?;
            b.return_value(Some(&FieldType::parse("Ljava/lang/String;").unwrap()))?;
            Ok(())
        })
    }
}

#[test]
fn introduced_interfaces_bring_their_abstract_methods() {
    init_logging();
    let pool = pool_with(vec![holder_class()], Rc::new(ImplementDelegate), false);
    pool.register_type(greeter_interface());

    let instance = pool
        .instantiator(&name("app/Holder"))
        .unwrap()
        .new_instance()
        .unwrap();
    let described = pool
        .machine()
        .call_method(&instance, "describe", "()Ljava/lang/String;", vec![])
        .unwrap()
        .unwrap();
    assert_eq!(described.as_str().unwrap(), "hello");
}

struct AreaProvider;

impl ComputedValue for AreaProvider {
    fn compute(&self, _instance: &Value) -> Result<Value, Thrown> {
        Ok(Value::Int(7))
    }
}

struct ComputedDelegate;

impl TransformerDelegate for ComputedDelegate {
    fn transform(&self, t: &mut ClassTransform) -> Result<(), Error> {
        let area = t.introduce_field(FieldType::int(), "area")?;
        t.inject_computed(area, Rc::new(AreaProvider))?;
        t.create_accessors(area, AccessorMode::Get)?;
        Ok(())
    }
}

#[test]
fn computed_injections_run_at_construction_time() {
    init_logging();
    let pool = pool_with(vec![holder_class()], Rc::new(ComputedDelegate), false);
    let instance = pool
        .instantiator(&name("app/Holder"))
        .unwrap()
        .new_instance()
        .unwrap();
    let area = pool
        .machine()
        .call_method(&instance, "getArea", "()I", vec![])
        .unwrap()
        .unwrap();
    assert_eq!(area.as_int().unwrap(), 7);
}

struct ElevenProvider;

impl ComputedValue for ElevenProvider {
    fn compute(&self, _instance: &Value) -> Result<Value, Thrown> {
        Ok(Value::Int(11))
    }
}

struct ComputedConduitDelegate;

impl TransformerDelegate for ComputedConduitDelegate {
    fn transform(&self, t: &mut ClassTransform) -> Result<(), Error> {
        let value = t.field_token("value").unwrap();
        t.set_computed_conduit(value, Rc::new(ElevenProvider))
    }
}

#[test]
fn computed_conduits_serve_reads_and_reject_writes() {
    init_logging();
    let pool = pool_with(vec![counter_class()], Rc::new(ComputedConduitDelegate), false);
    let instance = pool
        .instantiator(&name("app/Counter"))
        .unwrap()
        .new_instance()
        .unwrap();
    let machine = pool.machine();

    let read = machine
        .call_method(&instance, "getValue", "()I", vec![])
        .unwrap()
        .unwrap();
    assert_eq!(read.as_int().unwrap(), 11);

    let thrown = machine
        .call_method(&instance, "setValue", "(I)V", vec![Value::Int(1)])
        .unwrap_err();
    assert_eq!(
        thrown.class_name(),
        "java/lang/UnsupportedOperationException"
    );
}

struct ProxyDelegate {
    target: Value,
}

impl TransformerDelegate for ProxyDelegate {
    fn transform(&self, t: &mut ClassTransform) -> Result<(), Error> {
        let delegate_field =
            t.introduce_field(FieldType::parse("Lapp/Greeter;").unwrap(), "delegate")?;
        t.inject(delegate_field, self.target.clone())?;
        let introduced = t.proxy_interface(&name("app/Greeter"), ProxyTarget::Field(delegate_field))?;
        assert_eq!(introduced.len(), 1);
        Ok(())
    }
}

#[test]
fn proxied_interfaces_delegate_to_the_field() {
    init_logging();
    let target = Value::Object(ObjRef::new("app/Impl"));
    let pool = pool_with(
        vec![holder_class()],
        Rc::new(ProxyDelegate {
            target: target.clone(),
        }),
        false,
    );
    pool.register_type(greeter_interface());
    pool.machine().define(&greeter_impl()).unwrap();

    let instantiator = pool.instantiator(&name("app/Holder")).unwrap();
    let instance = instantiator.new_instance().unwrap();
    let described = pool
        .machine()
        .call_method(&instance, "describe", "()Ljava/lang/String;", vec![])
        .unwrap()
        .unwrap();
    assert_eq!(described.as_str().unwrap(), "proxied");
}
