use crate::code::{
    Condition, FieldRef, Instruction, InstructionBuilder, LabelGenerator, MethodRef,
};
use crate::model::{
    BinaryName, ClassNode, FieldAccessFlags, FieldNode, FieldType, MethodAccessFlags,
    MethodDescriptor, MethodKey, MethodNode, MethodSignature, Name, UnqualifiedName,
};
use crate::Error;

/// Field names on the owner carrying the construction-time contexts
pub(crate) const SHARED_FIELD: &str = "plastic$shared";
pub(crate) const INSTANCE_FIELD: &str = "plastic$instance";

fn uname(name: String) -> Result<UnqualifiedName, Error> {
    UnqualifiedName::from_string(name).map_err(Error::MalformedName)
}

/// Retrofit one method with its advice chain
///
/// The original body is renamed and preserved; the original slot is rewritten to construct a
/// dedicated invocation object, run the chain through `proceed()`, re-throw any captured checked
/// exception, and return the captured return value. Returns the generated invocation class, which
/// the caller must define alongside the owner.
pub(crate) fn rewrite_advised_method(
    class: &mut ClassNode,
    key: &MethodKey,
    bundle_index: usize,
) -> Result<ClassNode, Error> {
    let owner = class.name.clone();
    let position = class
        .methods
        .iter()
        .position(|m| &m.signature.key() == key)
        .ok_or_else(|| Error::MissingMember {
            class: owner.clone(),
            member: key.name.clone(),
        })?;
    if class.methods[position].is_static() {
        return Err(Error::AdviceOnStatic {
            class: owner,
            method: key.name.clone(),
        });
    }

    let signature = class.methods[position].signature.clone();
    let renamed = uname(format!("advised$original${}", signature.name.as_str()))?;
    let invocation_name = owner.suffixed(&format!("${}$Invocation", signature.name.as_str()));

    // Step 1: move the original body under the internal name, dropping `private` so the
    // invocation class in the same generated context may call it
    let mut original = class.methods[position].clone();
    original.signature.name = renamed.clone();
    original.access_flags.remove(MethodAccessFlags::PRIVATE);
    class.methods.push(original);

    // Step 2: the invocation class
    let invocation = build_invocation_class(
        &invocation_name,
        &owner,
        &renamed,
        &signature,
    )?;

    // Step 3: rewrite the original slot to drive the chain
    let rewritten = &mut class.methods[position];
    rewritten.code = None;
    let mut labels = LabelGenerator::new();
    let mut builder = InstructionBuilder::for_method(rewritten, &mut labels);

    let mut constructor_parameters = vec![
        FieldType::Object(owner.clone()),
        FieldType::Object(BinaryName::INSTANCECONTEXT),
        FieldType::Object(BinaryName::ADVICEBUNDLE),
    ];
    constructor_parameters.extend(signature.descriptor.parameters.iter().cloned());

    builder.declare_local("invocation", FieldType::Object(invocation_name.clone()))?;
    let owner_for_args = owner.clone();
    builder.construct(invocation_name.clone(), constructor_parameters, |builder| {
        builder.load_this()?;
        builder.load_this()?;
        builder.get_field(FieldRef {
            owner: owner_for_args.clone(),
            name: uname(String::from(INSTANCE_FIELD))?,
            descriptor: FieldType::Object(BinaryName::INSTANCECONTEXT),
        })?;
        builder.load_this()?;
        builder.get_field(FieldRef {
            owner: owner_for_args.clone(),
            name: uname(String::from(SHARED_FIELD))?,
            descriptor: FieldType::Object(BinaryName::SHAREDCONTEXT),
        })?;
        builder.const_int(bundle_index as i32)?;
        builder.invoke_virtual(MethodRef {
            owner: BinaryName::SHAREDCONTEXT,
            name: UnqualifiedName::GET,
            descriptor: MethodDescriptor {
                parameters: vec![FieldType::int()],
                return_type: Some(FieldType::Object(BinaryName::OBJECT)),
            },
        })?;
        builder.push_instruction(Instruction::CheckCast(FieldType::Object(
            BinaryName::ADVICEBUNDLE,
        )))?;
        builder.load_arguments()?;
        Ok(())
    })?;
    builder.store_local("invocation")?;

    builder.load_local("invocation")?;
    builder.invoke_virtual(MethodRef {
        owner: invocation_name.clone(),
        name: UnqualifiedName::PROCEED,
        descriptor: MethodDescriptor {
            parameters: vec![],
            return_type: None,
        },
    })?;

    // Re-throw a captured checked exception at the original call site
    let caught_field = FieldRef {
        owner: invocation_name.clone(),
        name: uname(String::from("caught"))?,
        descriptor: FieldType::Object(BinaryName::EXCEPTION),
    };
    builder.load_local("invocation")?;
    builder.get_field(caught_field.clone())?;
    let caught_for_block = caught_field.clone();
    builder.when(Condition::NonNull, move |builder| {
        builder.load_local("invocation")?;
        builder.get_field(caught_for_block)?;
        builder.push_instruction(Instruction::Throw)?;
        Ok(())
    })?;

    match &signature.descriptor.return_type {
        Some(return_type) => {
            builder.load_local("invocation")?;
            builder.get_field(FieldRef {
                owner: invocation_name,
                name: uname(String::from("rv"))?,
                descriptor: return_type.clone(),
            })?;
            builder.return_value(Some(return_type))?;
        }
        None => {
            builder.return_value(None)?;
        }
    }

    Ok(invocation)
}

fn field(name: &str, descriptor: FieldType) -> Result<FieldNode, Error> {
    Ok(FieldNode {
        access_flags: FieldAccessFlags::empty(),
        name: uname(String::from(name))?,
        descriptor,
        annotations: vec![],
    })
}

fn build_invocation_class(
    name: &BinaryName,
    owner: &BinaryName,
    renamed: &UnqualifiedName,
    signature: &MethodSignature,
) -> Result<ClassNode, Error> {
    let mut invocation = ClassNode::subclass_shell(name.clone(), BinaryName::OBJECT);
    let parameters = &signature.descriptor.parameters;
    let return_type = &signature.descriptor.return_type;

    invocation
        .fields
        .push(field("target", FieldType::Object(owner.clone()))?);
    invocation.fields.push(field(
        "context",
        FieldType::Object(BinaryName::INSTANCECONTEXT),
    )?);
    invocation
        .fields
        .push(field("bundle", FieldType::Object(BinaryName::ADVICEBUNDLE))?);
    invocation.fields.push(field("cursor", FieldType::int())?);
    for (index, parameter) in parameters.iter().enumerate() {
        invocation
            .fields
            .push(field(&format!("p{}", index), parameter.clone())?);
    }
    if let Some(return_type) = return_type {
        invocation.fields.push(field("rv", return_type.clone())?);
    }
    invocation
        .fields
        .push(field("caught", FieldType::Object(BinaryName::EXCEPTION))?);

    invocation
        .methods
        .push(invocation_constructor(name, owner, parameters)?);
    invocation
        .methods
        .push(invocation_get_parameter(name, parameters)?);
    invocation
        .methods
        .push(invocation_set_parameter(name, parameters)?);
    invocation
        .methods
        .push(invocation_get_return(name, return_type.as_ref())?);
    invocation
        .methods
        .push(invocation_set_return(name, return_type.as_ref())?);
    invocation
        .methods
        .push(invocation_proceed(name, owner, renamed, signature)?);
    Ok(invocation)
}

fn plain_method(name: UnqualifiedName, descriptor: MethodDescriptor) -> MethodNode {
    MethodNode {
        access_flags: MethodAccessFlags::PUBLIC,
        signature: MethodSignature::new(name, descriptor),
        code: None,
        annotations: vec![],
    }
}

fn invocation_constructor(
    name: &BinaryName,
    owner: &BinaryName,
    parameters: &[FieldType],
) -> Result<MethodNode, Error> {
    let mut ctor_parameters = vec![
        FieldType::Object(owner.clone()),
        FieldType::Object(BinaryName::INSTANCECONTEXT),
        FieldType::Object(BinaryName::ADVICEBUNDLE),
    ];
    ctor_parameters.extend(parameters.iter().cloned());
    let mut constructor = plain_method(
        UnqualifiedName::INIT,
        MethodDescriptor {
            parameters: ctor_parameters,
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

    let mut stored: Vec<(String, FieldType)> = vec![
        (String::from("target"), FieldType::Object(owner.clone())),
        (
            String::from("context"),
            FieldType::Object(BinaryName::INSTANCECONTEXT),
        ),
        (
            String::from("bundle"),
            FieldType::Object(BinaryName::ADVICEBUNDLE),
        ),
    ];
    for (index, parameter) in parameters.iter().enumerate() {
        stored.push((format!("p{}", index), parameter.clone()));
    }
    for (argument, (field_name, descriptor)) in stored.into_iter().enumerate() {
        builder.load_this()?;
        builder.load_argument(argument)?;
        builder.put_field(FieldRef {
            owner: name.clone(),
            name: uname(field_name)?,
            descriptor,
        })?;
    }
    builder.return_value(None)?;
    Ok(constructor)
}

fn invocation_get_parameter(
    name: &BinaryName,
    parameters: &[FieldType],
) -> Result<MethodNode, Error> {
    let mut method = plain_method(
        UnqualifiedName::GETPARAMETER,
        MethodDescriptor {
            parameters: vec![FieldType::int()],
            return_type: Some(FieldType::Object(BinaryName::OBJECT)),
        },
    );
    let mut labels = LabelGenerator::new();
    let mut builder = InstructionBuilder::for_method(&mut method, &mut labels);
    builder.load_argument(0)?;
    builder.switch(0, parameters.len() as i32 - 1, |cases| {
        for (index, parameter) in parameters.iter().enumerate() {
            cases.case(index as i32, move |builder| {
                builder.load_this()?;
                builder.get_field(FieldRef {
                    owner: name.clone(),
                    name: uname(format!("p{}", index))?,
                    descriptor: parameter.clone(),
                })?;
                builder.box_if_primitive(parameter)?;
                builder.return_value(Some(&FieldType::Object(BinaryName::OBJECT)))?;
                Ok(())
            })?;
        }
        Ok(())
    })?;
    Ok(method)
}

fn invocation_set_parameter(
    name: &BinaryName,
    parameters: &[FieldType],
) -> Result<MethodNode, Error> {
    let mut method = plain_method(
        UnqualifiedName::SETPARAMETER,
        MethodDescriptor {
            parameters: vec![FieldType::int(), FieldType::Object(BinaryName::OBJECT)],
            return_type: None,
        },
    );
    let mut labels = LabelGenerator::new();
    let mut builder = InstructionBuilder::for_method(&mut method, &mut labels);
    builder.load_argument(0)?;
    builder.switch(0, parameters.len() as i32 - 1, |cases| {
        for (index, parameter) in parameters.iter().enumerate() {
            cases.case(index as i32, move |builder| {
                builder.load_this()?;
                builder.load_argument(1)?;
                builder.cast_or_unbox(parameter)?;
                builder.put_field(FieldRef {
                    owner: name.clone(),
                    name: uname(format!("p{}", index))?,
                    descriptor: parameter.clone(),
                })?;
                builder.return_value(None)?;
                Ok(())
            })?;
        }
        Ok(())
    })?;
    Ok(method)
}

fn invocation_get_return(
    name: &BinaryName,
    return_type: Option<&FieldType>,
) -> Result<MethodNode, Error> {
    let mut method = plain_method(
        UnqualifiedName::GETRETURNVALUE,
        MethodDescriptor {
            parameters: vec![],
            return_type: Some(FieldType::Object(BinaryName::OBJECT)),
        },
    );
    let mut labels = LabelGenerator::new();
    let mut builder = InstructionBuilder::for_method(&mut method, &mut labels);
    match return_type {
        Some(return_type) => {
            builder.load_this()?;
            builder.get_field(FieldRef {
                owner: name.clone(),
                name: uname(String::from("rv"))?,
                descriptor: return_type.clone(),
            })?;
            builder.box_if_primitive(return_type)?;
        }
        None => {
            builder.const_null()?;
        }
    }
    builder.return_value(Some(&FieldType::Object(BinaryName::OBJECT)))?;
    Ok(method)
}

fn invocation_set_return(
    name: &BinaryName,
    return_type: Option<&FieldType>,
) -> Result<MethodNode, Error> {
    let mut method = plain_method(
        UnqualifiedName::SETRETURNVALUE,
        MethodDescriptor {
            parameters: vec![FieldType::Object(BinaryName::OBJECT)],
            return_type: None,
        },
    );
    let mut labels = LabelGenerator::new();
    let mut builder = InstructionBuilder::for_method(&mut method, &mut labels);
    match return_type {
        Some(return_type) => {
            builder.load_this()?;
            builder.load_argument(0)?;
            builder.cast_or_unbox(return_type)?;
            builder.put_field(FieldRef {
                owner: name.clone(),
                name: uname(String::from("rv"))?,
                descriptor: return_type.clone(),
            })?;
            builder.return_value(None)?;
        }
        None => {
            builder.throw_exception(
                BinaryName::ILLEGALSTATEEXCEPTION,
                Some("Method returns void"),
            )?;
        }
    }
    Ok(method)
}

/// The chain-driving method: runs the next advisor, or the renamed original body once the chain
/// is exhausted, capturing declared checked exceptions onto the invocation object
fn invocation_proceed(
    name: &BinaryName,
    owner: &BinaryName,
    renamed: &UnqualifiedName,
    signature: &MethodSignature,
) -> Result<MethodNode, Error> {
    let mut method = plain_method(
        UnqualifiedName::PROCEED,
        MethodDescriptor {
            parameters: vec![],
            return_type: None,
        },
    );
    let mut labels = LabelGenerator::new();
    let mut builder = InstructionBuilder::for_method(&mut method, &mut labels);

    let cursor = FieldRef {
        owner: name.clone(),
        name: uname(String::from("cursor"))?,
        descriptor: FieldType::int(),
    };
    let bundle = FieldRef {
        owner: name.clone(),
        name: uname(String::from("bundle"))?,
        descriptor: FieldType::Object(BinaryName::ADVICEBUNDLE),
    };

    // index = this.cursor; this.cursor = index + 1
    let index_slot = builder.declare_local("index", FieldType::int())?;
    builder.load_this()?;
    builder.get_field(cursor.clone())?;
    builder.store_local("index")?;
    builder.load_this()?;
    builder.push_instruction(Instruction::Inc(index_slot, 1))?;
    builder.load_local("index")?;
    builder.put_field(cursor)?;
    builder.push_instruction(Instruction::Inc(index_slot, -1))?;

    // Dispatch to the next advisor while the chain has one left
    let bundle_for_block = bundle.clone();
    builder.load_local("index")?;
    builder.load_this()?;
    builder.get_field(bundle.clone())?;
    builder.invoke_virtual(MethodRef {
        owner: BinaryName::ADVICEBUNDLE,
        name: UnqualifiedName::ADVICECOUNT,
        descriptor: MethodDescriptor {
            parameters: vec![],
            return_type: Some(FieldType::int()),
        },
    })?;
    builder.when(Condition::Less, move |builder| {
        builder.load_this()?;
        builder.get_field(bundle_for_block)?;
        builder.load_local("index")?;
        builder.load_this()?;
        builder.invoke_virtual(MethodRef {
            owner: BinaryName::ADVICEBUNDLE,
            name: UnqualifiedName::ADVISE,
            descriptor: MethodDescriptor {
                parameters: vec![FieldType::int(), FieldType::Object(BinaryName::OBJECT)],
                return_type: None,
            },
        })?;
        builder.return_value(None)?;
        Ok(())
    })?;

    // Chain exhausted: invoke the preserved original body
    let return_type = signature.descriptor.return_type.clone();
    let parameters = signature.descriptor.parameters.clone();
    let throws = signature.throws.clone();
    let target = FieldRef {
        owner: name.clone(),
        name: uname(String::from("target"))?,
        descriptor: FieldType::Object(owner.clone()),
    };
    let caught = FieldRef {
        owner: name.clone(),
        name: uname(String::from("caught"))?,
        descriptor: FieldType::Object(BinaryName::EXCEPTION),
    };
    let rv = match &return_type {
        Some(return_type) => Some(FieldRef {
            owner: name.clone(),
            name: uname(String::from("rv"))?,
            descriptor: return_type.clone(),
        }),
        None => None,
    };
    let invocation_name = name.clone();
    let owner = owner.clone();
    let renamed = renamed.clone();
    builder.try_catch(move |tc| {
        let target = target.clone();
        let invocation_name = invocation_name.clone();
        tc.body(move |builder| {
            if rv.is_some() {
                builder.load_this()?;
            }
            builder.load_this()?;
            builder.get_field(target)?;
            for (index, parameter) in parameters.iter().enumerate() {
                builder.load_this()?;
                builder.get_field(FieldRef {
                    owner: invocation_name.clone(),
                    name: uname(format!("p{}", index))?,
                    descriptor: parameter.clone(),
                })?;
            }
            builder.invoke_virtual(MethodRef {
                owner,
                name: renamed,
                descriptor: MethodDescriptor {
                    parameters,
                    return_type,
                },
            })?;
            if let Some(rv) = rv {
                builder.put_field(rv)?;
            }
            Ok(())
        })?;
        for checked in throws {
            let caught = caught.clone();
            tc.on(checked, move |builder| {
                builder.load_this()?;
                builder.swap()?;
                builder.put_field(caught)?;
                Ok(())
            })?;
        }
        Ok(())
    })?;
    builder.return_value(None)?;
    Ok(method)
}
