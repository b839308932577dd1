//! Pool-level tests: loading, superclass recursion, caching, cycles, and subclass generation.

mod common;

use common::*;
use plastic::model::{ClassNode, FieldType, MethodAccessFlags, Name, ParseDescriptor};
use plastic::pool::{ClassPool, MapLoader, PoolSettings, TransformerDelegate};
use plastic::runtime::Value;
use plastic::transform::{AccessorMode, ClassTransform};
use plastic::Error;
use std::cell::RefCell;
use std::rc::Rc;

fn pool_with(classes: Vec<ClassNode>, delegate: Rc<dyn TransformerDelegate>) -> ClassPool {
    let mut loader = MapLoader::new();
    for class in &classes {
        loader.add(String::from(class.name.as_str()), encode(class));
    }
    let settings = PoolSettings {
        write_behind: false,
        controlled_packages: vec![String::from("app/")],
    };
    ClassPool::new(Box::new(loader), delegate, settings)
}

fn string_type() -> FieldType {
    FieldType::parse("Ljava/lang/String;").unwrap()
}

fn plain_class(class_name: &str, superclass: &str) -> ClassNode {
    let mut class = ClassNode::subclass_shell(name(class_name), name(superclass));
    class.methods.push(constructor(superclass, |_| Ok(())));
    class
}

struct CountingDelegate {
    invocations: RefCell<usize>,
}

impl TransformerDelegate for CountingDelegate {
    fn transform(&self, _t: &mut ClassTransform) -> Result<(), Error> {
        *self.invocations.borrow_mut() += 1;
        Ok(())
    }
}

#[test]
fn missing_classes_are_reported_by_name() {
    init_logging();
    let pool = pool_with(
        vec![],
        Rc::new(CountingDelegate {
            invocations: RefCell::new(0),
        }),
    );
    match pool.instantiator(&name("app/Ghost")) {
        Err(Error::MissingClass(class)) => assert_eq!(class.as_str(), "app/Ghost"),
        other => panic!("expected a missing class error, got {:?}", other.map(|_| ())),
    }
}

#[test]
fn each_class_is_transformed_exactly_once() {
    init_logging();
    let delegate = Rc::new(CountingDelegate {
        invocations: RefCell::new(0),
    });
    let pool = pool_with(
        vec![plain_class("app/Widget", "java/lang/Object")],
        delegate.clone(),
    );

    let first = pool.instantiator(&name("app/Widget")).unwrap();
    let second = pool.instantiator(&name("app/Widget")).unwrap();
    assert_eq!(*delegate.invocations.borrow(), 1);

    first.new_instance().unwrap();
    second.new_instance().unwrap();
}

/// Injects one marker field per tier, so transformed ancestors are observable from subclasses
struct TieredDelegate;

impl TransformerDelegate for TieredDelegate {
    fn transform(&self, t: &mut ClassTransform) -> Result<(), Error> {
        let (field_name, value) = match t.class_name().as_str() {
            "app/Base" => ("origin", "B"),
            "app/SubA" => ("extra", "A"),
            "app/SubB" => ("extra", "BB"),
            other => panic!("unexpected class {}", other),
        };
        let token = t.introduce_field(string_type(), field_name)?;
        t.inject(token, Value::string(value))?;
        t.create_accessors(token, AccessorMode::Get)?;
        Ok(())
    }
}

#[test]
fn superclasses_transform_first_and_contexts_stay_isolated() {
    init_logging();
    let pool = pool_with(
        vec![
            plain_class("app/Base", "java/lang/Object"),
            plain_class("app/SubA", "app/Base"),
            plain_class("app/SubB", "app/Base"),
        ],
        Rc::new(TieredDelegate),
    );
    let machine = pool.machine().clone();
    let get = |instance: &Value, getter: &str| {
        String::from(
            machine
                .call_method(instance, getter, "()Ljava/lang/String;", vec![])
                .unwrap()
                .unwrap()
                .as_str()
                .unwrap(),
        )
    };

    // Requesting the subclass pulls the base through transformation first
    let a = pool
        .instantiator(&name("app/SubA"))
        .unwrap()
        .new_instance()
        .unwrap();
    let b = pool
        .instantiator(&name("app/SubB"))
        .unwrap()
        .new_instance()
        .unwrap();

    assert_eq!(get(&a, "getExtra"), "A");
    assert_eq!(get(&b, "getExtra"), "BB");

    // Both siblings observe the base's injection at its original index
    assert_eq!(get(&a, "getOrigin"), "B");
    assert_eq!(get(&b, "getOrigin"), "B");

    let base = pool
        .instantiator(&name("app/Base"))
        .unwrap()
        .new_instance()
        .unwrap();
    assert_eq!(get(&base, "getOrigin"), "B");
}

#[test]
fn superclass_cycles_are_detected() {
    init_logging();
    let pool = pool_with(
        vec![
            plain_class("app/Chicken", "app/Egg"),
            plain_class("app/Egg", "app/Chicken"),
        ],
        Rc::new(CountingDelegate {
            invocations: RefCell::new(0),
        }),
    );
    match pool.instantiator(&name("app/Chicken")) {
        Err(Error::TransformationCycle(cycle)) => {
            assert_eq!(cycle.first().map(|n| n.as_str()), Some("app/Chicken"));
            assert_eq!(cycle.last().map(|n| n.as_str()), Some("app/Chicken"));
        }
        other => panic!("expected a cycle error, got {:?}", other.map(|_| ())),
    }
}

/// Introduces an override of an inherited method without customizing it
struct OverrideDelegate;

impl TransformerDelegate for OverrideDelegate {
    fn transform(&self, t: &mut ClassTransform) -> Result<(), Error> {
        if t.class_name().as_str() == "app/Sub" {
            t.introduce_method(signature("describe", "()Ljava/lang/String;"))?;
        }
        Ok(())
    }
}

#[test]
fn introduced_overrides_pass_through_to_the_ancestor() {
    init_logging();
    let mut base = plain_class("app/Base", "java/lang/Object");
    base.methods.push(method(
        signature("describe", "()Ljava/lang/String;"),
        MethodAccessFlags::PUBLIC,
        |b| {
            b.const_string(String::from("base"))?;
            b.return_value(Some(&FieldType::parse("Ljava/lang/String;").unwrap()))?;
            Ok(())
        },
    ));
    let pool = pool_with(
        vec![base, plain_class("app/Sub", "app/Base")],
        Rc::new(OverrideDelegate),
    );

    // The bare override behaves exactly like the inherited implementation
    let instance = pool
        .instantiator(&name("app/Sub"))
        .unwrap()
        .new_instance()
        .unwrap();
    let described = pool
        .machine()
        .call_method(&instance, "describe", "()Ljava/lang/String;", vec![])
        .unwrap()
        .unwrap();
    assert_eq!(described.as_str().unwrap(), "base");
}

/// Resolves a `java/lang/String` field from the instance context
struct ServiceDelegate;

impl TransformerDelegate for ServiceDelegate {
    fn transform(&self, t: &mut ClassTransform) -> Result<(), Error> {
        let service = t.introduce_field(string_type(), "service")?;
        t.inject_from_instance_context(service)?;
        t.create_accessors(service, AccessorMode::Get)?;
        Ok(())
    }
}

#[test]
fn post_processing_stages_values_on_every_instantiator() {
    init_logging();
    let mut pool = pool_with(
        vec![plain_class("app/Widget", "java/lang/Object")],
        Rc::new(ServiceDelegate),
    );
    let seen = Rc::new(RefCell::new(Vec::new()));
    let recorded = seen.clone();
    pool.set_post_process(move |instantiator| {
        recorded
            .borrow_mut()
            .push(String::from(instantiator.class_name()));
        instantiator.with("java/lang/String", Value::string("staged"))
    });

    // The hook's staged value satisfies the instance context lookup
    let instance = pool
        .instantiator(&name("app/Widget"))
        .unwrap()
        .new_instance()
        .unwrap();
    let service = pool
        .machine()
        .call_method(&instance, "getService", "()Ljava/lang/String;", vec![])
        .unwrap()
        .unwrap();
    assert_eq!(service.as_str().unwrap(), "staged");

    // Cached instantiators do not run the hook again
    pool.instantiator(&name("app/Widget")).unwrap();
    assert_eq!(*seen.borrow(), vec![String::from("app/Widget")]);
}

#[test]
fn created_classes_extend_a_transformed_base() {
    init_logging();
    let pool = pool_with(
        vec![plain_class("app/Base", "java/lang/Object")],
        Rc::new(TieredDelegate),
    );

    let mut session = pool.create_class("app/Special", &name("app/Base")).unwrap();
    let tag = session.introduce_field(string_type(), "tag").unwrap();
    session.inject(tag, Value::string("S")).unwrap();
    session.create_accessors(tag, AccessorMode::Get).unwrap();
    let instantiator = session.create_instantiator().unwrap();

    // The session is one-shot
    match session.introduce_field(FieldType::int(), "late") {
        Err(Error::SessionLocked(class)) => assert_eq!(class.as_str(), "app/Special"),
        other => panic!("expected a locked session, got {:?}", other),
    }

    let instance = instantiator.new_instance().unwrap();
    let machine = pool.machine();
    let tag = machine
        .call_method(&instance, "getTag", "()Ljava/lang/String;", vec![])
        .unwrap()
        .unwrap();
    assert_eq!(tag.as_str().unwrap(), "S");

    // Inherited transformed behavior still resolves up the chain
    let origin = machine
        .call_method(&instance, "getOrigin", "()Ljava/lang/String;", vec![])
        .unwrap()
        .unwrap();
    assert_eq!(origin.as_str().unwrap(), "B");
}
