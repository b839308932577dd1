use super::linker::{builtin_superclass, LoadedMethod, Machine};
use super::value::{ArrayRef, HostValue, MethodOutcome, ObjRef, Thrown, Value};
use crate::code::{Condition, ConstOperand, Instruction, InvokeKind, Label, MethodRef};
use crate::model::{Code, FieldType, Name, RenderDescriptor, TypeKind};
use crate::transform::Invocation;
use std::collections::HashMap;
use std::rc::Rc;

/// Default (zero) value for a declared type
pub(crate) fn default_for(typ: &FieldType) -> Value {
    match typ.kind() {
        TypeKind::Reference => Value::Null,
        TypeKind::Int => Value::Int(0),
        TypeKind::Long => Value::Long(0),
        TypeKind::Float => Value::Float(0.0),
        TypeKind::Double => Value::Double(0.0),
    }
}

/// Runtime class name of a value, for dynamic dispatch and cast checks
fn runtime_class_of(value: &Value) -> Option<String> {
    match value {
        Value::Object(obj) => Some(obj.class_name()),
        Value::Host(host) => Some(String::from(host.class_name())),
        Value::Str(_) => Some(String::from("java/lang/String")),
        _ => None,
    }
}

enum Step {
    Next,
    Goto(Label),
    Return(Option<Value>),
}

impl Machine {
    /// Invoke an instance method, dispatching on the receiver's runtime class
    pub fn call_method(
        &self,
        receiver: &Value,
        name: &str,
        descriptor: &str,
        args: Vec<Value>,
    ) -> Result<Option<Value>, Thrown> {
        let class_name = runtime_class_of(receiver).ok_or_else(|| {
            Thrown::new(
                "java/lang/NullPointerException",
                format!("Invoking {} on {:?}", name, receiver),
            )
        })?;
        let method = self
            .resolve_method(&class_name, name, descriptor)
            .ok_or_else(|| unresolved(&class_name, name, descriptor))?;
        let mut full_args = Vec::with_capacity(args.len() + 1);
        full_args.push(receiver.clone());
        full_args.extend(args);
        self.call(&method, full_args)
    }

    /// Invoke a static method
    pub fn call_static(
        &self,
        class_name: &str,
        name: &str,
        descriptor: &str,
        args: Vec<Value>,
    ) -> Result<Option<Value>, Thrown> {
        let method = self
            .resolve_method(class_name, name, descriptor)
            .ok_or_else(|| unresolved(class_name, name, descriptor))?;
        self.call(&method, args)
    }

    /// Allocate an instance and run the constructor matching the given parameter types
    pub fn construct(
        &self,
        class_name: &str,
        parameters: &[FieldType],
        args: Vec<Value>,
    ) -> Result<Value, Thrown> {
        let mut descriptor = String::from("(");
        for parameter in parameters {
            parameter.render_to(&mut descriptor);
        }
        descriptor.push_str(")V");
        let instance = Value::Object(ObjRef::new(class_name));
        self.call_method(&instance, "<init>", &descriptor, args)?;
        Ok(instance)
    }

    /// Run one resolved method; `args` includes the receiver for instance methods
    pub fn call(&self, method: &LoadedMethod, args: Vec<Value>) -> Result<Option<Value>, Thrown> {
        let code = method.code.clone().ok_or_else(|| {
            Thrown::new(
                "java/lang/Error",
                format!("Method {}.{} has no body", method.class_name, method.name),
            )
        })?;
        log::trace!("calling {}.{}", method.class_name, method.name);
        self.exec(&code, args)
    }

    fn exec(&self, code: &Code, args: Vec<Value>) -> Result<Option<Value>, Thrown> {
        // Labels resolve to the index of their mark; execution resumes right after it
        let label_at: HashMap<Label, usize> = code
            .instructions
            .iter()
            .enumerate()
            .filter_map(|(index, insn)| match insn {
                Instruction::Mark(label) => Some((*label, index)),
                _ => None,
            })
            .collect();

        let mut locals = vec![Value::Null; code.max_locals as usize];
        let mut slot = 0usize;
        for arg in args {
            let width = match arg {
                Value::Long(_) | Value::Double(_) => 2,
                _ => 1,
            };
            locals[slot] = arg;
            slot += width;
        }

        let mut stack: Vec<Value> = vec![];
        let mut pc = 0usize;
        loop {
            let insn = code.instructions.get(pc).ok_or_else(|| {
                Thrown::new("java/lang/Error", "Fell off the end of a method body")
            })?;
            match self.step(insn, &mut stack, &mut locals) {
                Ok(Step::Next) => pc += 1,
                Ok(Step::Goto(label)) => {
                    pc = *label_at
                        .get(&label)
                        .ok_or_else(|| Thrown::new("java/lang/Error", "Jump to unplaced label"))?;
                }
                Ok(Step::Return(value)) => return Ok(value),
                Err(thrown) => {
                    let handler = code.exception_table.iter().find(|entry| {
                        let covered = match (label_at.get(&entry.start), label_at.get(&entry.end)) {
                            (Some(start), Some(end)) => *start <= pc && pc < *end,
                            _ => false,
                        };
                        covered
                            && match &entry.catch_type {
                                None => true,
                                Some(catch_type) => {
                                    self.is_assignable(&thrown.class_name(), catch_type.as_str())
                                }
                            }
                    });
                    match handler {
                        Some(entry) => {
                            stack.clear();
                            stack.push(thrown.value);
                            pc = *label_at.get(&entry.handler).ok_or_else(|| {
                                Thrown::new("java/lang/Error", "Handler at unplaced label")
                            })?;
                        }
                        None => return Err(thrown),
                    }
                }
            }
        }
    }

    fn step(
        &self,
        insn: &Instruction,
        stack: &mut Vec<Value>,
        locals: &mut [Value],
    ) -> Result<Step, Thrown> {
        match insn {
            Instruction::Mark(_) => {}

            Instruction::LoadLocal(_, slot) => stack.push(locals[*slot as usize].clone()),
            Instruction::StoreLocal(_, slot) => locals[*slot as usize] = pop(stack)?,

            Instruction::ConstNull => stack.push(Value::Null),
            Instruction::PushInt(value) => stack.push(Value::Int(*value as i32)),
            Instruction::Const(operand) => stack.push(match operand {
                ConstOperand::Int(v) => Value::Int(*v),
                ConstOperand::Long(v) => Value::Long(*v),
                ConstOperand::Float(v) => Value::Float(*v),
                ConstOperand::Double(v) => Value::Double(*v),
                ConstOperand::Str(v) => Value::string(v.clone()),
                ConstOperand::Class(v) => Value::string(v.as_str()),
            }),
            Instruction::Inc(slot, delta) => {
                let current = locals[*slot as usize].as_int()?;
                locals[*slot as usize] = Value::Int(current + *delta as i32);
            }

            Instruction::Invoke(kind, method) => {
                if let Some(result) = self.invoke(*kind, method, stack)? {
                    stack.push(result);
                }
            }

            Instruction::GetField(field) => {
                let receiver = pop(stack)?;
                let obj = receiver.as_object()?;
                let value = obj
                    .field(field.name.as_str())
                    .unwrap_or_else(|| default_for(&field.descriptor));
                stack.push(value);
            }
            Instruction::PutField(field) => {
                let value = pop(stack)?;
                let receiver = pop(stack)?;
                receiver.as_object()?.set_field(field.name.as_str(), value);
            }
            Instruction::GetStatic(field) => {
                let value = self
                    .static_field(field.owner.as_str(), field.name.as_str())
                    .unwrap_or_else(|| default_for(&field.descriptor));
                stack.push(value);
            }
            Instruction::PutStatic(field) => {
                let value = pop(stack)?;
                self.set_static_field(field.owner.as_str(), field.name.as_str(), value);
            }

            Instruction::New(class) => stack.push(Value::Object(ObjRef::new(class.as_str()))),
            Instruction::NewArray(elem) => {
                let length = pop(stack)?.as_int()?;
                if length < 0 {
                    return Err(Thrown::new(
                        "java/lang/IllegalArgumentException",
                        format!("Negative array length {}", length),
                    ));
                }
                stack.push(Value::Array(ArrayRef::new(
                    length as usize,
                    default_for(elem),
                )));
            }
            Instruction::ArrayLength => {
                let array = pop(stack)?;
                stack.push(Value::Int(array.as_array()?.len() as i32));
            }
            Instruction::LoadElement(_) => {
                let index = pop(stack)?.as_int()?;
                let array = pop(stack)?;
                stack.push(array.as_array()?.get(index as usize)?);
            }
            Instruction::StoreElement(_) => {
                let value = pop(stack)?;
                let index = pop(stack)?.as_int()?;
                let array = pop(stack)?;
                array.as_array()?.set(index as usize, value)?;
            }

            Instruction::CheckCast(target) => {
                let value = pop(stack)?;
                if !value.is_null() {
                    if let FieldType::Object(class) = target {
                        match runtime_class_of(&value) {
                            Some(actual) if self.is_assignable(&actual, class.as_str()) => {}
                            Some(actual) => {
                                return Err(Thrown::new(
                                    "java/lang/ClassCastException",
                                    format!("{} cannot be cast to {}", actual, class.as_str()),
                                ))
                            }
                            None => {
                                return Err(Thrown::new(
                                    "java/lang/ClassCastException",
                                    format!("{:?} cannot be cast to {}", value, class.as_str()),
                                ))
                            }
                        }
                    }
                }
                stack.push(value);
            }

            Instruction::Box(base) => {
                let primitive = pop(stack)?;
                let wrapper = ObjRef::new(base.wrapper_class().as_str());
                wrapper.set_field("value", primitive);
                stack.push(Value::Object(wrapper));
            }
            Instruction::Unbox(base) => {
                let wrapper = pop(stack)?;
                let obj = wrapper.as_object()?;
                let value = obj.field("value").ok_or_else(|| {
                    Thrown::new(
                        "java/lang/NullPointerException",
                        format!("Unboxing uninitialized {:?} wrapper", base),
                    )
                })?;
                stack.push(value);
            }
            Instruction::Convert(from, to) => {
                let value = pop(stack)?;
                stack.push(convert(&value, *from, *to)?);
            }

            Instruction::Dup | Instruction::DupWide => {
                let top = peek(stack)?.clone();
                stack.push(top);
            }
            Instruction::DupX1 => {
                let a = pop(stack)?;
                let b = pop(stack)?;
                stack.push(a.clone());
                stack.push(b);
                stack.push(a);
            }
            Instruction::Pop | Instruction::PopWide => {
                pop(stack)?;
            }
            Instruction::Swap => {
                let a = pop(stack)?;
                let b = pop(stack)?;
                stack.push(a);
                stack.push(b);
            }

            Instruction::Throw => {
                let value = pop(stack)?;
                return Err(Thrown { value });
            }

            Instruction::Jump(label) => return Ok(Step::Goto(*label)),
            Instruction::Branch(condition, label) => {
                if self.test(*condition, stack)? {
                    return Ok(Step::Goto(*label));
                }
            }
            Instruction::Switch {
                low,
                targets,
                default,
            } => {
                let value = pop(stack)?.as_int()?;
                let index = value.wrapping_sub(*low);
                let target = if index >= 0 && (index as usize) < targets.len() {
                    targets[index as usize]
                } else {
                    *default
                };
                return Ok(Step::Goto(target));
            }

            Instruction::Return(kind) => {
                let value = match kind {
                    Some(_) => Some(pop(stack)?),
                    None => None,
                };
                return Ok(Step::Return(value));
            }
        }
        Ok(Step::Next)
    }

    fn test(&self, condition: Condition, stack: &mut Vec<Value>) -> Result<bool, Thrown> {
        Ok(match condition {
            Condition::Null => pop(stack)?.is_null(),
            Condition::NonNull => !pop(stack)?.is_null(),
            Condition::Zero => pop(stack)?.as_int()? == 0,
            Condition::NonZero => pop(stack)?.as_int()? != 0,
            other => {
                let b = pop(stack)?.as_int()?;
                let a = pop(stack)?.as_int()?;
                match other {
                    Condition::Equal => a == b,
                    Condition::NotEqual => a != b,
                    Condition::Less => a < b,
                    Condition::LessOrEqual => a <= b,
                    Condition::Greater => a > b,
                    Condition::GreaterOrEqual => a >= b,
                    _ => unreachable!(),
                }
            }
        })
    }

    fn invoke(
        &self,
        kind: InvokeKind,
        mref: &MethodRef,
        stack: &mut Vec<Value>,
    ) -> Result<Option<Value>, Thrown> {
        let descriptor = mref.descriptor.render();
        let argc = mref.descriptor.parameters.len();
        let mut args = Vec::with_capacity(argc);
        for _ in 0..argc {
            args.push(pop(stack)?);
        }
        args.reverse();
        let receiver = match kind {
            InvokeKind::Static => None,
            _ => Some(pop(stack)?),
        };

        if let Some(outcome) = self.invoke_native(mref, receiver.as_ref(), &args)? {
            return Ok(outcome);
        }

        let resolve_from = match (&kind, &receiver) {
            (InvokeKind::Virtual | InvokeKind::Interface, Some(receiver)) => {
                runtime_class_of(receiver).ok_or_else(|| {
                    Thrown::new(
                        "java/lang/NullPointerException",
                        format!("Invoking {} on {:?}", mref.name.as_str(), receiver),
                    )
                })?
            }
            _ => String::from(mref.owner.as_str()),
        };
        let method = self
            .resolve_method(&resolve_from, mref.name.as_str(), &descriptor)
            .ok_or_else(|| unresolved(&resolve_from, mref.name.as_str(), &descriptor))?;

        let mut full_args = Vec::with_capacity(argc + 1);
        if let Some(receiver) = receiver {
            full_args.push(receiver);
        }
        full_args.extend(args);
        self.call(&method, full_args)
    }

    /// Host-side bindings for the support types generated code talks to
    ///
    /// Returns `None` when the call is not a native one and should resolve to an instruction
    /// sequence instead.
    fn invoke_native(
        &self,
        mref: &MethodRef,
        receiver: Option<&Value>,
        args: &[Value],
    ) -> Result<Option<Option<Value>>, Thrown> {
        let owner = mref.owner.as_str();
        let name = mref.name.as_str();
        match owner {
            "plastic/SharedContext" => {
                let context = match receiver {
                    Some(Value::Host(HostValue::SharedContext(context))) => context,
                    _ => return Err(bad_receiver(owner, receiver)),
                };
                match name {
                    "get" => {
                        let index = args[0].as_int()?;
                        Ok(Some(Some(context.get(index as usize)?)))
                    }
                    _ => Err(unresolved(owner, name, "")),
                }
            }
            "plastic/InstanceContext" => {
                let context = match receiver {
                    Some(Value::Host(HostValue::InstanceContext(context))) => context,
                    _ => return Err(bad_receiver(owner, receiver)),
                };
                let key = args[0].as_str()?;
                match name {
                    "get" => Ok(Some(Some(context.get(key).unwrap_or(Value::Null)))),
                    "getRequired" => Ok(Some(Some(context.get_required(key)?))),
                    _ => Err(unresolved(owner, name, "")),
                }
            }
            "plastic/AdviceBundle" => {
                let bundle = match receiver {
                    Some(Value::Host(HostValue::AdviceBundle(bundle))) => bundle,
                    _ => return Err(bad_receiver(owner, receiver)),
                };
                match name {
                    "adviceCount" => Ok(Some(Some(Value::Int(bundle.len() as i32)))),
                    "advise" => {
                        let index = args[0].as_int()? as usize;
                        let invocation = Invocation::new(self, args[1].clone());
                        bundle.advise(index, &invocation)?;
                        Ok(Some(None))
                    }
                    _ => Err(unresolved(owner, name, "")),
                }
            }
            "plastic/FieldConduit" => {
                let conduit = match receiver {
                    Some(Value::Host(HostValue::Conduit(conduit))) => Rc::clone(conduit),
                    _ => return Err(bad_receiver(owner, receiver)),
                };
                match name {
                    // Host conduits trade in plain primitives; generated code in wrappers
                    "get" => Ok(Some(Some(crate::transform::box_primitive(
                        conduit.load(&args[0])?,
                    )))),
                    "set" => {
                        conduit.store(&args[0], crate::transform::unbox_wrapper(args[1].clone()))?;
                        Ok(Some(None))
                    }
                    _ => Err(unresolved(owner, name, "")),
                }
            }
            "plastic/ComputedValue" => {
                let computed = match receiver {
                    Some(Value::Host(HostValue::Computed(computed))) => Rc::clone(computed),
                    _ => return Err(bad_receiver(owner, receiver)),
                };
                match name {
                    "compute" => Ok(Some(Some(crate::transform::box_primitive(
                        computed.compute(&args[0])?,
                    )))),
                    _ => Err(unresolved(owner, name, "")),
                }
            }
            "plastic/ConstructorCallback" => {
                let callback = match receiver {
                    Some(Value::Host(HostValue::ConstructorCallback(callback))) => {
                        Rc::clone(callback)
                    }
                    _ => return Err(bad_receiver(owner, receiver)),
                };
                match name {
                    "onConstruct" => {
                        callback.on_construct(&args[0])?;
                        Ok(Some(None))
                    }
                    _ => Err(unresolved(owner, name, "")),
                }
            }
            "plastic/MethodResult" => {
                let outcome = match name {
                    "success" => MethodOutcome::Success(args[0].clone()),
                    "failure" => MethodOutcome::Failure(args[0].clone()),
                    _ => return Err(unresolved(owner, name, "")),
                };
                Ok(Some(Some(Value::Host(HostValue::MethodResult(Rc::new(
                    outcome,
                ))))))
            }
            "java/lang/Object" if name == "<init>" => Ok(Some(None)),
            _ if builtin_superclass(owner).is_some() && self.lookup_class(owner).is_none() => {
                // Unlinked platform classes: model just the throwable surface
                match name {
                    "<init>" => {
                        if let (Some(receiver), Some(message)) = (receiver, args.first()) {
                            receiver.as_object()?.set_field("message", message.clone());
                        }
                        Ok(Some(None))
                    }
                    "getMessage" => {
                        let message = receiver
                            .and_then(|r| r.as_object().ok().and_then(|o| o.field("message")))
                            .unwrap_or(Value::Null);
                        Ok(Some(Some(message)))
                    }
                    _ => Err(unresolved(owner, name, "")),
                }
            }
            _ => Ok(None),
        }
    }
}

fn convert(value: &Value, from: TypeKind, to: TypeKind) -> Result<Value, Thrown> {
    let number = match from {
        TypeKind::Int => value.as_int()? as f64,
        TypeKind::Long => value.as_long()? as f64,
        TypeKind::Float => value.as_float()? as f64,
        TypeKind::Double => value.as_double()?,
        TypeKind::Reference => {
            return Err(Thrown::new(
                "java/lang/ClassCastException",
                "Numeric conversion on a reference",
            ))
        }
    };
    Ok(match to {
        TypeKind::Int => Value::Int(number as i32),
        TypeKind::Long => match from {
            TypeKind::Int => Value::Long(value.as_int()? as i64),
            _ => Value::Long(number as i64),
        },
        TypeKind::Float => Value::Float(number as f32),
        TypeKind::Double => Value::Double(number),
        TypeKind::Reference => {
            return Err(Thrown::new(
                "java/lang/ClassCastException",
                "Numeric conversion to a reference",
            ))
        }
    })
}

fn pop(stack: &mut Vec<Value>) -> Result<Value, Thrown> {
    stack
        .pop()
        .ok_or_else(|| Thrown::new("java/lang/Error", "Operand stack underflow"))
}

fn peek(stack: &[Value]) -> Result<&Value, Thrown> {
    stack
        .last()
        .ok_or_else(|| Thrown::new("java/lang/Error", "Operand stack underflow"))
}

fn unresolved(class: &str, name: &str, descriptor: &str) -> Thrown {
    Thrown::new(
        "java/lang/Error",
        format!("Unresolved method {}.{}{}", class, name, descriptor),
    )
}

fn bad_receiver(owner: &str, receiver: Option<&Value>) -> Thrown {
    Thrown::new(
        "java/lang/ClassCastException",
        format!("Expected a {} receiver but found {:?}", owner, receiver),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::code::{InstructionBuilder, LabelGenerator};
    use crate::model::{
        BinaryName, ClassNode, MethodAccessFlags, MethodDescriptor, MethodNode, MethodSignature,
        ParseDescriptor, UnqualifiedName,
    };

    fn class_with_method(
        class_name: &str,
        method_name: &str,
        descriptor: &str,
        flags: MethodAccessFlags,
        build: fn(&mut InstructionBuilder) -> Result<(), crate::Error>,
    ) -> ClassNode {
        let mut class = ClassNode::subclass_shell(
            BinaryName::from_string(String::from(class_name)).unwrap(),
            BinaryName::OBJECT,
        );
        let mut method = MethodNode {
            access_flags: flags,
            signature: MethodSignature::new(
                UnqualifiedName::from_string(String::from(method_name)).unwrap(),
                MethodDescriptor::parse(descriptor).unwrap(),
            ),
            code: None,
            annotations: vec![],
        };
        let mut labels = LabelGenerator::new();
        let mut builder = InstructionBuilder::for_method(&mut method, &mut labels);
        build(&mut builder).unwrap();
        class.methods.push(method);
        class
    }

    #[test]
    fn executes_a_branching_static_method() {
        let class = class_with_method(
            "app/Math",
            "signum",
            "(I)I",
            MethodAccessFlags::PUBLIC | MethodAccessFlags::STATIC,
            |b| {
                b.load_argument(0)?;
                b.when_else(
                    Condition::NonZero,
                    |b| {
                        b.const_int(1)?;
                        Ok(())
                    },
                    |b| {
                        b.const_int(0)?;
                        Ok(())
                    },
                )?;
                b.return_value(Some(&FieldType::int()))?;
                Ok(())
            },
        );
        let machine = Machine::new();
        machine.define(&class).unwrap();
        let result = machine
            .call_static("app/Math", "signum", "(I)I", vec![Value::Int(42)])
            .unwrap();
        assert!(matches!(result, Some(Value::Int(1))));
        let result = machine
            .call_static("app/Math", "signum", "(I)I", vec![Value::Int(0)])
            .unwrap();
        assert!(matches!(result, Some(Value::Int(0))));
    }

    #[test]
    fn uncaught_exceptions_surface_as_thrown() {
        let class = class_with_method(
            "app/Boom",
            "boom",
            "()V",
            MethodAccessFlags::PUBLIC | MethodAccessFlags::STATIC,
            |b| {
                b.throw_exception(BinaryName::ILLEGALSTATEEXCEPTION, Some("kaboom"))?;
                Ok(())
            },
        );
        let machine = Machine::new();
        machine.define(&class).unwrap();
        let thrown = machine
            .call_static("app/Boom", "boom", "()V", vec![])
            .unwrap_err();
        assert_eq!(thrown.class_name(), "java/lang/IllegalStateException");
        assert_eq!(thrown.message().as_deref(), Some("kaboom"));
    }

    #[test]
    fn try_catch_routes_to_the_matching_handler() {
        let class = class_with_method(
            "app/Catcher",
            "attempt",
            "()I",
            MethodAccessFlags::PUBLIC | MethodAccessFlags::STATIC,
            |b| {
                b.try_catch(|tc| {
                    tc.body(|b| {
                        b.throw_exception(BinaryName::ILLEGALSTATEEXCEPTION, Some("inner"))?;
                        Ok(())
                    })?;
                    tc.on(BinaryName::RUNTIMEEXCEPTION, |b| {
                        b.pop(TypeKind::Reference)?;
                        b.const_int(7)?;
                        b.return_value(Some(&FieldType::int()))?;
                        Ok(())
                    })?;
                    Ok(())
                })?;
                b.const_int(0)?;
                b.return_value(Some(&FieldType::int()))?;
                Ok(())
            },
        );
        let machine = Machine::new();
        machine.define(&class).unwrap();
        let result = machine
            .call_static("app/Catcher", "attempt", "()I", vec![])
            .unwrap();
        assert!(matches!(result, Some(Value::Int(7))));
    }

    #[test]
    fn switch_without_registered_default_throws() {
        let class = class_with_method(
            "app/Dispatch",
            "pick",
            "(I)I",
            MethodAccessFlags::PUBLIC | MethodAccessFlags::STATIC,
            |b| {
                b.load_argument(0)?;
                b.switch(0, 1, |cases| {
                    cases.case(0, |b| {
                        b.const_int(10)?;
                        b.return_value(Some(&FieldType::int()))?;
                        Ok(())
                    })?;
                    cases.case(1, |b| {
                        b.const_int(20)?;
                        b.return_value(Some(&FieldType::int()))?;
                        Ok(())
                    })?;
                    Ok(())
                })?;
                Ok(())
            },
        );
        let machine = Machine::new();
        machine.define(&class).unwrap();
        let result = machine
            .call_static("app/Dispatch", "pick", "(I)I", vec![Value::Int(1)])
            .unwrap();
        assert!(matches!(result, Some(Value::Int(20))));
        let thrown = machine
            .call_static("app/Dispatch", "pick", "(I)I", vec![Value::Int(9)])
            .unwrap_err();
        assert_eq!(thrown.class_name(), "java/lang/IllegalArgumentException");
    }
}
