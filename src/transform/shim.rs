use super::context::{box_primitive, unbox_wrapper};
use crate::code::{FieldRef, Instruction, InstructionBuilder, LabelGenerator, MethodRef};
use crate::model::TypeKind;
use crate::model::{
    BinaryName, ClassNode, FieldType, MethodAccessFlags, MethodDescriptor, MethodNode,
    MethodSignature, UnqualifiedName,
};
use crate::runtime::{HostValue, Machine, MethodOutcome, Thrown, Value};
use crate::Error;
use std::cell::RefCell;
use std::rc::Rc;

/// Shim instance a handle dispatches through once its class is defined
pub(crate) struct ShimBinding {
    pub machine: Rc<Machine>,
    pub shim: Value,
}

pub(crate) type SharedBinding = Rc<RefCell<Option<ShimBinding>>>;

fn bound(binding: &SharedBinding) -> Result<std::cell::Ref<'_, ShimBinding>, Thrown> {
    let borrowed = binding.borrow();
    if borrowed.is_none() {
        return Err(Thrown::new(
            "java/lang/IllegalStateException",
            "Handle used before its class was finalized",
        ));
    }
    Ok(std::cell::Ref::map(borrowed, |b| b.as_ref().unwrap()))
}

/// Indexed, non-reflective access to one field of instances of a transformed class
///
/// Binds lazily: the shim class cannot exist until the whole class, including every index
/// assignment, is known, so a handle only becomes usable after `create_instantiator`.
pub struct FieldHandle {
    index: usize,
    binding: SharedBinding,
}

impl FieldHandle {
    pub(crate) fn new(index: usize, binding: SharedBinding) -> FieldHandle {
        FieldHandle { index, binding }
    }

    /// Stable index assigned when this handle was requested
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn get(&self, instance: &Value) -> Result<Value, Thrown> {
        let binding = bound(&self.binding)?;
        let result = binding
            .machine
            .call_method(
                &binding.shim,
                "get",
                "(Ljava/lang/Object;I)Ljava/lang/Object;",
                vec![instance.clone(), Value::Int(self.index as i32)],
            )?
            .unwrap_or(Value::Null);
        Ok(unbox_wrapper(result))
    }

    pub fn set(&self, instance: &Value, value: Value) -> Result<(), Thrown> {
        let binding = bound(&self.binding)?;
        binding.machine.call_method(
            &binding.shim,
            "set",
            "(Ljava/lang/Object;ILjava/lang/Object;)V",
            vec![
                instance.clone(),
                Value::Int(self.index as i32),
                box_primitive(value),
            ],
        )?;
        Ok(())
    }
}

/// Indexed, non-reflective invocation of one method of instances of a transformed class
pub struct MethodHandle {
    index: usize,
    binding: SharedBinding,
}

impl MethodHandle {
    pub(crate) fn new(index: usize, binding: SharedBinding) -> MethodHandle {
        MethodHandle { index, binding }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    /// Invoke the method; a captured checked exception surfaces as the `Err` case
    pub fn invoke(&self, instance: &Value, args: Vec<Value>) -> Result<Value, Thrown> {
        let binding = bound(&self.binding)?;
        let packed = crate::runtime::ArrayRef::new(args.len(), Value::Null);
        for (index, arg) in args.into_iter().enumerate() {
            packed.set(index, box_primitive(arg))?;
        }
        let result = binding
            .machine
            .call_method(
                &binding.shim,
                "invoke",
                "(Ljava/lang/Object;I[Ljava/lang/Object;)Lplastic/MethodResult;",
                vec![
                    instance.clone(),
                    Value::Int(self.index as i32),
                    Value::Array(packed),
                ],
            )?
            .unwrap_or(Value::Null);
        match result {
            Value::Host(HostValue::MethodResult(outcome)) => match outcome.as_ref() {
                MethodOutcome::Success(value) => Ok(unbox_wrapper(value.clone())),
                MethodOutcome::Failure(thrown) => Err(Thrown {
                    value: thrown.clone(),
                }),
            },
            other => Err(Thrown::new(
                "java/lang/IllegalStateException",
                format!("Shim invoke returned {:?}", other),
            )),
        }
    }
}

/// Generate the dispatcher class for a transformed class's requested handles
///
/// Each dispatch method is a dense switch over the index; only fields and methods actually
/// requested through a handle are wired in, so tables are minimal. Unregistered indices hit the
/// switch's implicit throwing default.
pub(crate) fn build_shim(
    owner: &BinaryName,
    fields: &[(UnqualifiedName, FieldType)],
    methods: &[MethodSignature],
) -> Result<ClassNode, Error> {
    let mut shim = ClassNode::subclass_shell(owner.suffixed("$Shim"), BinaryName::OBJECT);
    shim.methods.push(shim_constructor()?);
    if !fields.is_empty() {
        shim.methods.push(shim_get(owner, fields)?);
        shim.methods.push(shim_set(owner, fields)?);
    }
    if !methods.is_empty() {
        shim.methods.push(shim_invoke(owner, methods)?);
    }
    Ok(shim)
}

fn shim_method(name: UnqualifiedName, descriptor: MethodDescriptor) -> MethodNode {
    MethodNode {
        access_flags: MethodAccessFlags::PUBLIC,
        signature: MethodSignature::new(name, descriptor),
        code: None,
        annotations: vec![],
    }
}

fn shim_constructor() -> Result<MethodNode, Error> {
    let mut constructor = shim_method(
        UnqualifiedName::INIT,
        MethodDescriptor {
            parameters: vec![],
            return_type: None,
        },
    );
    let mut labels = LabelGenerator::new();
    let mut builder = InstructionBuilder::for_method(&mut constructor, &mut labels);
    builder.load_this()?;
    builder.invoke_special(MethodRef {
        owner: BinaryName::OBJECT,
        name: UnqualifiedName::INIT,
        descriptor: MethodDescriptor {
            parameters: vec![],
            return_type: None,
        },
    })?;
    builder.return_value(None)?;
    Ok(constructor)
}

fn shim_get(
    owner: &BinaryName,
    fields: &[(UnqualifiedName, FieldType)],
) -> Result<MethodNode, Error> {
    let mut method = shim_method(
        UnqualifiedName::GET,
        MethodDescriptor {
            parameters: vec![FieldType::Object(BinaryName::OBJECT), FieldType::int()],
            return_type: Some(FieldType::Object(BinaryName::OBJECT)),
        },
    );
    let mut labels = LabelGenerator::new();
    let mut builder = InstructionBuilder::for_method(&mut method, &mut labels);
    builder.load_argument(1)?;
    builder.switch(0, fields.len() as i32 - 1, |cases| {
        for (index, (name, typ)) in fields.iter().enumerate() {
            cases.case(index as i32, move |builder| {
                builder.load_argument(0)?;
                builder.push_instruction(Instruction::CheckCast(FieldType::Object(
                    owner.clone(),
                )))?;
                builder.get_field(FieldRef {
                    owner: owner.clone(),
                    name: name.clone(),
                    descriptor: typ.clone(),
                })?;
                builder.box_if_primitive(typ)?;
                builder.return_value(Some(&FieldType::Object(BinaryName::OBJECT)))?;
                Ok(())
            })?;
        }
        Ok(())
    })?;
    Ok(method)
}

fn shim_set(
    owner: &BinaryName,
    fields: &[(UnqualifiedName, FieldType)],
) -> Result<MethodNode, Error> {
    let mut method = shim_method(
        UnqualifiedName::SET,
        MethodDescriptor {
            parameters: vec![
                FieldType::Object(BinaryName::OBJECT),
                FieldType::int(),
                FieldType::Object(BinaryName::OBJECT),
            ],
            return_type: None,
        },
    );
    let mut labels = LabelGenerator::new();
    let mut builder = InstructionBuilder::for_method(&mut method, &mut labels);
    builder.load_argument(1)?;
    builder.switch(0, fields.len() as i32 - 1, |cases| {
        for (index, (name, typ)) in fields.iter().enumerate() {
            cases.case(index as i32, move |builder| {
                builder.load_argument(0)?;
                builder.push_instruction(Instruction::CheckCast(FieldType::Object(
                    owner.clone(),
                )))?;
                builder.load_argument(2)?;
                builder.cast_or_unbox(typ)?;
                builder.put_field(FieldRef {
                    owner: owner.clone(),
                    name: name.clone(),
                    descriptor: typ.clone(),
                })?;
                builder.return_value(None)?;
                Ok(())
            })?;
        }
        Ok(())
    })?;
    Ok(method)
}

fn shim_invoke(owner: &BinaryName, methods: &[MethodSignature]) -> Result<MethodNode, Error> {
    let mut method = shim_method(
        UnqualifiedName::INVOKE,
        MethodDescriptor {
            parameters: vec![
                FieldType::Object(BinaryName::OBJECT),
                FieldType::int(),
                FieldType::array(FieldType::Object(BinaryName::OBJECT)),
            ],
            return_type: Some(FieldType::Object(BinaryName::METHODRESULT)),
        },
    );
    let mut labels = LabelGenerator::new();
    let mut builder = InstructionBuilder::for_method(&mut method, &mut labels);
    builder.load_argument(1)?;
    builder.switch(0, methods.len() as i32 - 1, |cases| {
        for (index, signature) in methods.iter().enumerate() {
            cases.case(index as i32, move |builder| {
                builder.try_catch(|tc| {
                    tc.body(move |builder| {
                        builder.load_argument(0)?;
                        builder.push_instruction(Instruction::CheckCast(FieldType::Object(
                            owner.clone(),
                        )))?;
                        for (position, parameter) in
                            signature.descriptor.parameters.iter().enumerate()
                        {
                            builder.load_argument(2)?;
                            builder.const_int(position as i32)?;
                            builder
                                .push_instruction(Instruction::LoadElement(TypeKind::Reference))?;
                            builder.cast_or_unbox(parameter)?;
                        }
                        builder.invoke_virtual(MethodRef {
                            owner: owner.clone(),
                            name: signature.name.clone(),
                            descriptor: signature.descriptor.clone(),
                        })?;
                        match &signature.descriptor.return_type {
                            Some(return_type) => {
                                builder.box_if_primitive(return_type)?;
                            }
                            None => {
                                builder.const_null()?;
                            }
                        }
                        builder.invoke_static(MethodRef {
                            owner: BinaryName::METHODRESULT,
                            name: UnqualifiedName::SUCCESS,
                            descriptor: MethodDescriptor {
                                parameters: vec![FieldType::Object(BinaryName::OBJECT)],
                                return_type: Some(FieldType::Object(BinaryName::METHODRESULT)),
                            },
                        })?;
                        builder.return_value(Some(&FieldType::Object(BinaryName::METHODRESULT)))?;
                        Ok(())
                    })?;
                    for checked in &signature.throws {
                        tc.on(checked.clone(), |builder| {
                            builder.invoke_static(MethodRef {
                                owner: BinaryName::METHODRESULT,
                                name: UnqualifiedName::FAILURE,
                                descriptor: MethodDescriptor {
                                    parameters: vec![FieldType::Object(BinaryName::THROWABLE)],
                                    return_type: Some(FieldType::Object(BinaryName::METHODRESULT)),
                                },
                            })?;
                            builder
                                .return_value(Some(&FieldType::Object(BinaryName::METHODRESULT)))?;
                            Ok(())
                        })?;
                    }
                    Ok(())
                })?;
                Ok(())
            })?;
        }
        Ok(())
    })?;
    Ok(method)
}
