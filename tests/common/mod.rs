//! Helpers shared by the integration tests: tiny hand-built source classes and encoding glue.

use plastic::code::{InstructionBuilder, LabelGenerator, MethodRef};
use plastic::codec::{BinaryCodec, ClassCodec};
use plastic::model::{
    BinaryName, ClassNode, FieldAccessFlags, FieldNode, FieldType, MethodAccessFlags,
    MethodDescriptor, MethodNode, MethodSignature, Name, ParseDescriptor, UnqualifiedName,
};
use plastic::Error;

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn name(text: &str) -> BinaryName {
    BinaryName::from_string(String::from(text)).unwrap()
}

pub fn uname(text: &str) -> UnqualifiedName {
    UnqualifiedName::from_string(String::from(text)).unwrap()
}

pub fn signature(method_name: &str, descriptor: &str) -> MethodSignature {
    MethodSignature::new(uname(method_name), MethodDescriptor::parse(descriptor).unwrap())
}

pub fn field(field_name: &str, descriptor: &str, access_flags: FieldAccessFlags) -> FieldNode {
    FieldNode {
        access_flags,
        name: uname(field_name),
        descriptor: FieldType::parse(descriptor).unwrap(),
        annotations: vec![],
    }
}

type Body = fn(&mut InstructionBuilder) -> Result<(), Error>;

pub fn method(sig: MethodSignature, access_flags: MethodAccessFlags, build: Body) -> MethodNode {
    let mut method = MethodNode {
        access_flags,
        signature: sig,
        code: None,
        annotations: vec![],
    };
    let mut labels = LabelGenerator::new();
    let mut builder = InstructionBuilder::for_method(&mut method, &mut labels);
    build(&mut builder).unwrap();
    method
}

/// A `()V` constructor: superclass call, then the given body, then return
pub fn constructor(superclass: &str, build: Body) -> MethodNode {
    let superclass = name(superclass);
    let mut ctor = MethodNode {
        access_flags: MethodAccessFlags::PUBLIC,
        signature: signature("<init>", "()V"),
        code: None,
        annotations: vec![],
    };
    let mut labels = LabelGenerator::new();
    let mut builder = InstructionBuilder::for_method(&mut ctor, &mut labels);
    builder.load_this().unwrap();
    builder
        .invoke_special(MethodRef {
            owner: superclass,
            name: uname("<init>"),
            descriptor: MethodDescriptor::parse("()V").unwrap(),
        })
        .unwrap();
    build(&mut builder).unwrap();
    builder.return_value(None).unwrap();
    ctor
}

pub fn encode(class: &ClassNode) -> Vec<u8> {
    BinaryCodec.encode(class).unwrap()
}
