use super::ClassCodec;
use crate::code::{Condition, ConstOperand, FieldRef, Instruction, InvokeKind, Label, MethodRef};
use crate::model::{
    AnnotationNode, AnnotationValue, BaseType, BinaryName, ClassAccessFlags, ClassNode, Code,
    ExceptionTableEntry, FieldAccessFlags, FieldNode, FieldType, LocalName, MethodAccessFlags,
    MethodDescriptor, MethodNode, MethodSignature, Name, ParseDescriptor, RenderDescriptor,
    TypeKind, UnqualifiedName,
};
use crate::Error;
use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use std::collections::HashMap;
use std::io::Cursor;

const MAGIC: u32 = 0x504C_4153; // "PLAS"
const VERSION: u16 = 1;

/// Concrete codec for the crate's class format
///
/// The format is a private tagged big-endian encoding. Instruction sequences are stored without
/// their `Mark` pseudo-instructions: branch targets and exception-table boundaries are resolved to
/// instruction offsets on encode, and labels are synthesized again on decode. An encode attempt
/// referencing a label that was never placed fails with [`Error::UnplacedLabel`].
#[derive(Default)]
pub struct BinaryCodec;

impl BinaryCodec {
    pub fn new() -> BinaryCodec {
        BinaryCodec
    }
}

impl ClassCodec for BinaryCodec {
    fn decode(&self, bytes: &[u8]) -> Result<ClassNode, Error> {
        let mut reader = Cursor::new(bytes);
        let magic = reader.read_u32::<BigEndian>()?;
        let version = reader.read_u16::<BigEndian>()?;
        if magic != MAGIC || version != VERSION {
            return Err(Error::MalformedClass {
                class: String::from("<unknown>"),
                reason: format!("Bad magic/version {:08x}/{}", magic, version),
            });
        }
        read_class(&mut reader)
    }

    fn encode(&self, class: &ClassNode) -> Result<Vec<u8>, Error> {
        let mut bytes = vec![];
        bytes.write_u32::<BigEndian>(MAGIC)?;
        bytes.write_u16::<BigEndian>(VERSION)?;
        write_class(&mut bytes, class)?;
        Ok(bytes)
    }
}

// Primitive writers in the style of a classfile serializer: sequences are `u16`-length-prefixed,
// strings are UTF-8 with a `u16` byte length.

fn write_str<W: WriteBytesExt>(writer: &mut W, string: &str) -> Result<(), Error> {
    writer.write_u16::<BigEndian>(string.len() as u16)?;
    writer.write_all(string.as_bytes())?;
    Ok(())
}

fn read_str<R: ReadBytesExt>(reader: &mut R) -> Result<String, Error> {
    let length = reader.read_u16::<BigEndian>()? as usize;
    let mut buffer = vec![0u8; length];
    reader.read_exact(&mut buffer)?;
    String::from_utf8(buffer).map_err(|err| Error::MalformedClass {
        class: String::from("<unknown>"),
        reason: format!("Invalid UTF-8 in name: {}", err),
    })
}

fn write_binary_name<W: WriteBytesExt>(writer: &mut W, name: &BinaryName) -> Result<(), Error> {
    write_str(writer, name.as_str())
}

fn read_binary_name<R: ReadBytesExt>(reader: &mut R) -> Result<BinaryName, Error> {
    BinaryName::from_string(read_str(reader)?).map_err(Error::MalformedName)
}

fn write_unqualified_name<W: WriteBytesExt>(
    writer: &mut W,
    name: &UnqualifiedName,
) -> Result<(), Error> {
    write_str(writer, name.as_str())
}

fn read_unqualified_name<R: ReadBytesExt>(reader: &mut R) -> Result<UnqualifiedName, Error> {
    UnqualifiedName::from_string(read_str(reader)?).map_err(Error::MalformedName)
}

fn write_field_type<W: WriteBytesExt>(writer: &mut W, typ: &FieldType) -> Result<(), Error> {
    write_str(writer, &typ.render())
}

fn read_field_type<R: ReadBytesExt>(reader: &mut R) -> Result<FieldType, Error> {
    let rendered = read_str(reader)?;
    FieldType::parse(&rendered).map_err(Error::BadDescriptor)
}

fn write_method_descriptor<W: WriteBytesExt>(
    writer: &mut W,
    descriptor: &MethodDescriptor,
) -> Result<(), Error> {
    write_str(writer, &descriptor.render())
}

fn read_method_descriptor<R: ReadBytesExt>(reader: &mut R) -> Result<MethodDescriptor, Error> {
    let rendered = read_str(reader)?;
    MethodDescriptor::parse(&rendered).map_err(Error::BadDescriptor)
}

fn write_class<W: WriteBytesExt>(writer: &mut W, class: &ClassNode) -> Result<(), Error> {
    write_binary_name(writer, &class.name)?;
    match &class.superclass {
        Some(superclass) => {
            writer.write_u8(1)?;
            write_binary_name(writer, superclass)?;
        }
        None => writer.write_u8(0)?,
    }
    writer.write_u16::<BigEndian>(class.interfaces.len() as u16)?;
    for interface in &class.interfaces {
        write_binary_name(writer, interface)?;
    }
    writer.write_u16::<BigEndian>(class.access_flags.bits())?;
    write_annotations(writer, &class.annotations)?;
    writer.write_u16::<BigEndian>(class.fields.len() as u16)?;
    for field in &class.fields {
        write_field(writer, field)?;
    }
    writer.write_u16::<BigEndian>(class.methods.len() as u16)?;
    for method in &class.methods {
        write_method(writer, &class.name, method)?;
    }
    Ok(())
}

fn read_class<R: ReadBytesExt>(reader: &mut R) -> Result<ClassNode, Error> {
    let name = read_binary_name(reader)?;
    let superclass = match reader.read_u8()? {
        0 => None,
        _ => Some(read_binary_name(reader)?),
    };
    let interface_count = reader.read_u16::<BigEndian>()?;
    let interfaces = (0..interface_count)
        .map(|_| read_binary_name(reader))
        .collect::<Result<_, _>>()?;
    let access_flags =
        ClassAccessFlags::from_bits_truncate(reader.read_u16::<BigEndian>()?);
    let annotations = read_annotations(reader)?;
    let field_count = reader.read_u16::<BigEndian>()?;
    let fields = (0..field_count)
        .map(|_| read_field(reader))
        .collect::<Result<_, _>>()?;
    let method_count = reader.read_u16::<BigEndian>()?;
    let methods = (0..method_count)
        .map(|_| read_method(reader))
        .collect::<Result<_, _>>()?;
    Ok(ClassNode {
        name,
        superclass,
        interfaces,
        access_flags,
        fields,
        methods,
        annotations,
    })
}

fn write_field<W: WriteBytesExt>(writer: &mut W, field: &FieldNode) -> Result<(), Error> {
    writer.write_u16::<BigEndian>(field.access_flags.bits())?;
    write_unqualified_name(writer, &field.name)?;
    write_field_type(writer, &field.descriptor)?;
    write_annotations(writer, &field.annotations)
}

fn read_field<R: ReadBytesExt>(reader: &mut R) -> Result<FieldNode, Error> {
    let access_flags = FieldAccessFlags::from_bits_truncate(reader.read_u16::<BigEndian>()?);
    let name = read_unqualified_name(reader)?;
    let descriptor = read_field_type(reader)?;
    let annotations = read_annotations(reader)?;
    Ok(FieldNode {
        access_flags,
        name,
        descriptor,
        annotations,
    })
}

fn write_method<W: WriteBytesExt>(
    writer: &mut W,
    class: &BinaryName,
    method: &MethodNode,
) -> Result<(), Error> {
    writer.write_u16::<BigEndian>(method.access_flags.bits())?;
    write_unqualified_name(writer, &method.signature.name)?;
    write_method_descriptor(writer, &method.signature.descriptor)?;
    writer.write_u16::<BigEndian>(method.signature.throws.len() as u16)?;
    for thrown in &method.signature.throws {
        write_binary_name(writer, thrown)?;
    }
    write_annotations(writer, &method.annotations)?;
    match &method.code {
        Some(code) => {
            writer.write_u8(1)?;
            write_code(writer, class, code)?;
        }
        None => writer.write_u8(0)?,
    }
    Ok(())
}

fn read_method<R: ReadBytesExt>(reader: &mut R) -> Result<MethodNode, Error> {
    let access_flags = MethodAccessFlags::from_bits_truncate(reader.read_u16::<BigEndian>()?);
    let name = read_unqualified_name(reader)?;
    let descriptor = read_method_descriptor(reader)?;
    let throws_count = reader.read_u16::<BigEndian>()?;
    let throws = (0..throws_count)
        .map(|_| read_binary_name(reader))
        .collect::<Result<_, _>>()?;
    let annotations = read_annotations(reader)?;
    let code = match reader.read_u8()? {
        0 => None,
        _ => Some(read_code(reader)?),
    };
    Ok(MethodNode {
        access_flags,
        signature: MethodSignature {
            name,
            descriptor,
            throws,
        },
        code,
        annotations,
    })
}

/// Resolve every label mark in the body to the offset of the instruction that follows it
///
/// Offsets count real instructions only; a label placed at the very end of the body resolves to
/// one past the last instruction.
fn resolve_labels(code: &Code) -> HashMap<Label, u32> {
    let mut offsets = HashMap::new();
    let mut pc: u32 = 0;
    for insn in &code.instructions {
        match insn {
            Instruction::Mark(label) => {
                offsets.insert(*label, pc);
            }
            _ => pc += 1,
        }
    }
    offsets
}

fn lookup_label(offsets: &HashMap<Label, u32>, label: Label) -> Result<u32, Error> {
    offsets.get(&label).copied().ok_or(Error::UnplacedLabel(label))
}

fn write_code<W: WriteBytesExt>(
    writer: &mut W,
    class: &BinaryName,
    code: &Code,
) -> Result<(), Error> {
    let offsets = resolve_labels(code);
    let real: Vec<&Instruction> = code
        .instructions
        .iter()
        .filter(|insn| !matches!(insn, Instruction::Mark(_)))
        .collect();

    writer.write_u16::<BigEndian>(code.max_locals)?;
    writer.write_u32::<BigEndian>(real.len() as u32)?;
    for insn in real {
        write_instruction(writer, &offsets, insn).map_err(|err| match err {
            Error::UnplacedLabel(label) => Error::MalformedClass {
                class: String::from(class.as_str()),
                reason: format!("Unplaced label {:?} in method body", label),
            },
            other => other,
        })?;
    }

    writer.write_u16::<BigEndian>(code.exception_table.len() as u16)?;
    for entry in &code.exception_table {
        writer.write_u32::<BigEndian>(lookup_label(&offsets, entry.start)?)?;
        writer.write_u32::<BigEndian>(lookup_label(&offsets, entry.end)?)?;
        writer.write_u32::<BigEndian>(lookup_label(&offsets, entry.handler)?)?;
        match &entry.catch_type {
            Some(catch_type) => {
                writer.write_u8(1)?;
                write_binary_name(writer, catch_type)?;
            }
            None => writer.write_u8(0)?,
        }
    }

    writer.write_u16::<BigEndian>(code.local_names.len() as u16)?;
    for local in &code.local_names {
        writer.write_u16::<BigEndian>(local.slot)?;
        write_str(writer, &local.name)?;
        write_field_type(writer, &local.descriptor)?;
    }
    Ok(())
}

fn read_code<R: ReadBytesExt>(reader: &mut R) -> Result<Code, Error> {
    let max_locals = reader.read_u16::<BigEndian>()?;
    let instruction_count = reader.read_u32::<BigEndian>()?;
    let mut raw: Vec<RawInstruction> = (0..instruction_count)
        .map(|_| read_instruction(reader))
        .collect::<Result<_, _>>()?;

    let entry_count = reader.read_u16::<BigEndian>()?;
    let mut raw_entries = vec![];
    for _ in 0..entry_count {
        let start = reader.read_u32::<BigEndian>()?;
        let end = reader.read_u32::<BigEndian>()?;
        let handler = reader.read_u32::<BigEndian>()?;
        let catch_type = match reader.read_u8()? {
            0 => None,
            _ => Some(read_binary_name(reader)?),
        };
        raw_entries.push((start, end, handler, catch_type));
    }

    // Synthesize labels for every referenced offset, in ascending order
    let mut referenced: Vec<u32> = raw
        .iter()
        .flat_map(RawInstruction::targets)
        .chain(
            raw_entries
                .iter()
                .flat_map(|(start, end, handler, _)| [*start, *end, *handler]),
        )
        .collect();
    referenced.sort_unstable();
    referenced.dedup();
    let labels: HashMap<u32, Label> = referenced
        .iter()
        .enumerate()
        .map(|(index, offset)| (*offset, Label(index as u32)))
        .collect();

    let mut instructions = vec![];
    for (pc, insn) in raw.drain(..).enumerate() {
        if let Some(label) = labels.get(&(pc as u32)) {
            instructions.push(Instruction::Mark(*label));
        }
        instructions.push(insn.into_instruction(&labels));
    }
    if let Some(label) = labels.get(&(instruction_count)) {
        instructions.push(Instruction::Mark(*label));
    }

    let exception_table = raw_entries
        .into_iter()
        .map(|(start, end, handler, catch_type)| ExceptionTableEntry {
            start: labels[&start],
            end: labels[&end],
            handler: labels[&handler],
            catch_type,
        })
        .collect();

    let name_count = reader.read_u16::<BigEndian>()?;
    let local_names = (0..name_count)
        .map(|_| -> Result<LocalName, Error> {
            let slot = reader.read_u16::<BigEndian>()?;
            let name = read_str(reader)?;
            let descriptor = read_field_type(reader)?;
            Ok(LocalName {
                slot,
                name,
                descriptor,
            })
        })
        .collect::<Result<_, _>>()?;

    Ok(Code {
        max_locals,
        instructions,
        exception_table,
        local_names,
    })
}

/// Decoded instruction with branch targets still as raw offsets
enum RawInstruction {
    Plain(Instruction),
    Jump(u32),
    Branch(Condition, u32),
    Switch {
        low: i32,
        targets: Vec<u32>,
        default: u32,
    },
}

impl RawInstruction {
    fn targets(&self) -> Vec<u32> {
        match self {
            RawInstruction::Plain(_) => vec![],
            RawInstruction::Jump(target) => vec![*target],
            RawInstruction::Branch(_, target) => vec![*target],
            RawInstruction::Switch {
                targets, default, ..
            } => {
                let mut all = targets.clone();
                all.push(*default);
                all
            }
        }
    }

    fn into_instruction(self, labels: &HashMap<u32, Label>) -> Instruction {
        match self {
            RawInstruction::Plain(insn) => insn,
            RawInstruction::Jump(target) => Instruction::Jump(labels[&target]),
            RawInstruction::Branch(condition, target) => {
                Instruction::Branch(condition, labels[&target])
            }
            RawInstruction::Switch {
                low,
                targets,
                default,
            } => Instruction::Switch {
                low,
                targets: targets.iter().map(|t| labels[t]).collect(),
                default: labels[&default],
            },
        }
    }
}

fn type_kind_tag(kind: TypeKind) -> u8 {
    match kind {
        TypeKind::Reference => 0,
        TypeKind::Int => 1,
        TypeKind::Long => 2,
        TypeKind::Float => 3,
        TypeKind::Double => 4,
    }
}

fn type_kind_from_tag(tag: u8) -> Result<TypeKind, Error> {
    match tag {
        0 => Ok(TypeKind::Reference),
        1 => Ok(TypeKind::Int),
        2 => Ok(TypeKind::Long),
        3 => Ok(TypeKind::Float),
        4 => Ok(TypeKind::Double),
        other => Err(malformed(format!("Bad type kind tag {}", other))),
    }
}

fn condition_tag(condition: Condition) -> u8 {
    match condition {
        Condition::Null => 0,
        Condition::NonNull => 1,
        Condition::Zero => 2,
        Condition::NonZero => 3,
        Condition::Equal => 4,
        Condition::NotEqual => 5,
        Condition::Less => 6,
        Condition::LessOrEqual => 7,
        Condition::Greater => 8,
        Condition::GreaterOrEqual => 9,
    }
}

fn condition_from_tag(tag: u8) -> Result<Condition, Error> {
    match tag {
        0 => Ok(Condition::Null),
        1 => Ok(Condition::NonNull),
        2 => Ok(Condition::Zero),
        3 => Ok(Condition::NonZero),
        4 => Ok(Condition::Equal),
        5 => Ok(Condition::NotEqual),
        6 => Ok(Condition::Less),
        7 => Ok(Condition::LessOrEqual),
        8 => Ok(Condition::Greater),
        9 => Ok(Condition::GreaterOrEqual),
        other => Err(malformed(format!("Bad condition tag {}", other))),
    }
}

fn invoke_kind_tag(kind: InvokeKind) -> u8 {
    match kind {
        InvokeKind::Virtual => 0,
        InvokeKind::Static => 1,
        InvokeKind::Special => 2,
        InvokeKind::Interface => 3,
    }
}

fn invoke_kind_from_tag(tag: u8) -> Result<InvokeKind, Error> {
    match tag {
        0 => Ok(InvokeKind::Virtual),
        1 => Ok(InvokeKind::Static),
        2 => Ok(InvokeKind::Special),
        3 => Ok(InvokeKind::Interface),
        other => Err(malformed(format!("Bad invoke kind tag {}", other))),
    }
}

fn malformed(reason: String) -> Error {
    Error::MalformedClass {
        class: String::from("<unknown>"),
        reason,
    }
}

fn write_method_ref<W: WriteBytesExt>(writer: &mut W, method: &MethodRef) -> Result<(), Error> {
    write_binary_name(writer, &method.owner)?;
    write_unqualified_name(writer, &method.name)?;
    write_method_descriptor(writer, &method.descriptor)
}

fn read_method_ref<R: ReadBytesExt>(reader: &mut R) -> Result<MethodRef, Error> {
    Ok(MethodRef {
        owner: read_binary_name(reader)?,
        name: read_unqualified_name(reader)?,
        descriptor: read_method_descriptor(reader)?,
    })
}

fn write_field_ref<W: WriteBytesExt>(writer: &mut W, field: &FieldRef) -> Result<(), Error> {
    write_binary_name(writer, &field.owner)?;
    write_unqualified_name(writer, &field.name)?;
    write_field_type(writer, &field.descriptor)
}

fn read_field_ref<R: ReadBytesExt>(reader: &mut R) -> Result<FieldRef, Error> {
    Ok(FieldRef {
        owner: read_binary_name(reader)?,
        name: read_unqualified_name(reader)?,
        descriptor: read_field_type(reader)?,
    })
}

fn write_instruction<W: WriteBytesExt>(
    writer: &mut W,
    offsets: &HashMap<Label, u32>,
    insn: &Instruction,
) -> Result<(), Error> {
    match insn {
        Instruction::Mark(_) => unreachable!("marks are filtered out before encoding"),
        Instruction::LoadLocal(kind, slot) => {
            writer.write_u8(0)?;
            writer.write_u8(type_kind_tag(*kind))?;
            writer.write_u16::<BigEndian>(*slot)?;
        }
        Instruction::StoreLocal(kind, slot) => {
            writer.write_u8(1)?;
            writer.write_u8(type_kind_tag(*kind))?;
            writer.write_u16::<BigEndian>(*slot)?;
        }
        Instruction::ConstNull => writer.write_u8(2)?,
        Instruction::PushInt(value) => {
            writer.write_u8(3)?;
            writer.write_i16::<BigEndian>(*value)?;
        }
        Instruction::Const(operand) => {
            writer.write_u8(4)?;
            write_const_operand(writer, operand)?;
        }
        Instruction::Inc(slot, delta) => {
            writer.write_u8(5)?;
            writer.write_u16::<BigEndian>(*slot)?;
            writer.write_i16::<BigEndian>(*delta)?;
        }
        Instruction::Invoke(kind, method) => {
            writer.write_u8(6)?;
            writer.write_u8(invoke_kind_tag(*kind))?;
            write_method_ref(writer, method)?;
        }
        Instruction::GetField(field) => {
            writer.write_u8(7)?;
            write_field_ref(writer, field)?;
        }
        Instruction::PutField(field) => {
            writer.write_u8(8)?;
            write_field_ref(writer, field)?;
        }
        Instruction::GetStatic(field) => {
            writer.write_u8(9)?;
            write_field_ref(writer, field)?;
        }
        Instruction::PutStatic(field) => {
            writer.write_u8(10)?;
            write_field_ref(writer, field)?;
        }
        Instruction::New(class) => {
            writer.write_u8(11)?;
            write_binary_name(writer, class)?;
        }
        Instruction::NewArray(elem) => {
            writer.write_u8(12)?;
            write_field_type(writer, elem)?;
        }
        Instruction::ArrayLength => writer.write_u8(13)?,
        Instruction::LoadElement(kind) => {
            writer.write_u8(14)?;
            writer.write_u8(type_kind_tag(*kind))?;
        }
        Instruction::StoreElement(kind) => {
            writer.write_u8(15)?;
            writer.write_u8(type_kind_tag(*kind))?;
        }
        Instruction::CheckCast(typ) => {
            writer.write_u8(16)?;
            write_field_type(writer, typ)?;
        }
        Instruction::Box(base) => {
            writer.write_u8(17)?;
            writer.write_u8(base.render_char() as u8)?;
        }
        Instruction::Unbox(base) => {
            writer.write_u8(18)?;
            writer.write_u8(base.render_char() as u8)?;
        }
        Instruction::Convert(from, to) => {
            writer.write_u8(19)?;
            writer.write_u8(type_kind_tag(*from))?;
            writer.write_u8(type_kind_tag(*to))?;
        }
        Instruction::Dup => writer.write_u8(20)?,
        Instruction::DupWide => writer.write_u8(21)?,
        Instruction::DupX1 => writer.write_u8(22)?,
        Instruction::Pop => writer.write_u8(23)?,
        Instruction::PopWide => writer.write_u8(24)?,
        Instruction::Swap => writer.write_u8(25)?,
        Instruction::Throw => writer.write_u8(26)?,
        Instruction::Jump(label) => {
            writer.write_u8(27)?;
            writer.write_u32::<BigEndian>(lookup_label(offsets, *label)?)?;
        }
        Instruction::Branch(condition, label) => {
            writer.write_u8(28)?;
            writer.write_u8(condition_tag(*condition))?;
            writer.write_u32::<BigEndian>(lookup_label(offsets, *label)?)?;
        }
        Instruction::Switch {
            low,
            targets,
            default,
        } => {
            writer.write_u8(29)?;
            writer.write_i32::<BigEndian>(*low)?;
            writer.write_u16::<BigEndian>(targets.len() as u16)?;
            for target in targets {
                writer.write_u32::<BigEndian>(lookup_label(offsets, *target)?)?;
            }
            writer.write_u32::<BigEndian>(lookup_label(offsets, *default)?)?;
        }
        Instruction::Return(kind) => {
            writer.write_u8(30)?;
            match kind {
                Some(kind) => writer.write_u8(type_kind_tag(*kind))?,
                None => writer.write_u8(0xFF)?,
            }
        }
    }
    Ok(())
}

fn read_instruction<R: ReadBytesExt>(reader: &mut R) -> Result<RawInstruction, Error> {
    let tag = reader.read_u8()?;
    let insn = match tag {
        0 => RawInstruction::Plain(Instruction::LoadLocal(
            type_kind_from_tag(reader.read_u8()?)?,
            reader.read_u16::<BigEndian>()?,
        )),
        1 => RawInstruction::Plain(Instruction::StoreLocal(
            type_kind_from_tag(reader.read_u8()?)?,
            reader.read_u16::<BigEndian>()?,
        )),
        2 => RawInstruction::Plain(Instruction::ConstNull),
        3 => RawInstruction::Plain(Instruction::PushInt(reader.read_i16::<BigEndian>()?)),
        4 => RawInstruction::Plain(Instruction::Const(read_const_operand(reader)?)),
        5 => RawInstruction::Plain(Instruction::Inc(
            reader.read_u16::<BigEndian>()?,
            reader.read_i16::<BigEndian>()?,
        )),
        6 => {
            let kind = invoke_kind_from_tag(reader.read_u8()?)?;
            RawInstruction::Plain(Instruction::Invoke(kind, read_method_ref(reader)?))
        }
        7 => RawInstruction::Plain(Instruction::GetField(read_field_ref(reader)?)),
        8 => RawInstruction::Plain(Instruction::PutField(read_field_ref(reader)?)),
        9 => RawInstruction::Plain(Instruction::GetStatic(read_field_ref(reader)?)),
        10 => RawInstruction::Plain(Instruction::PutStatic(read_field_ref(reader)?)),
        11 => RawInstruction::Plain(Instruction::New(read_binary_name(reader)?)),
        12 => RawInstruction::Plain(Instruction::NewArray(read_field_type(reader)?)),
        13 => RawInstruction::Plain(Instruction::ArrayLength),
        14 => RawInstruction::Plain(Instruction::LoadElement(type_kind_from_tag(
            reader.read_u8()?,
        )?)),
        15 => RawInstruction::Plain(Instruction::StoreElement(type_kind_from_tag(
            reader.read_u8()?,
        )?)),
        16 => RawInstruction::Plain(Instruction::CheckCast(read_field_type(reader)?)),
        17 => RawInstruction::Plain(Instruction::Box(read_base_type(reader)?)),
        18 => RawInstruction::Plain(Instruction::Unbox(read_base_type(reader)?)),
        19 => RawInstruction::Plain(Instruction::Convert(
            type_kind_from_tag(reader.read_u8()?)?,
            type_kind_from_tag(reader.read_u8()?)?,
        )),
        20 => RawInstruction::Plain(Instruction::Dup),
        21 => RawInstruction::Plain(Instruction::DupWide),
        22 => RawInstruction::Plain(Instruction::DupX1),
        23 => RawInstruction::Plain(Instruction::Pop),
        24 => RawInstruction::Plain(Instruction::PopWide),
        25 => RawInstruction::Plain(Instruction::Swap),
        26 => RawInstruction::Plain(Instruction::Throw),
        27 => RawInstruction::Jump(reader.read_u32::<BigEndian>()?),
        28 => {
            let condition = condition_from_tag(reader.read_u8()?)?;
            RawInstruction::Branch(condition, reader.read_u32::<BigEndian>()?)
        }
        29 => {
            let low = reader.read_i32::<BigEndian>()?;
            let count = reader.read_u16::<BigEndian>()?;
            let targets = (0..count)
                .map(|_| reader.read_u32::<BigEndian>())
                .collect::<Result<_, _>>()?;
            let default = reader.read_u32::<BigEndian>()?;
            RawInstruction::Switch {
                low,
                targets,
                default,
            }
        }
        30 => {
            let kind = match reader.read_u8()? {
                0xFF => None,
                tag => Some(type_kind_from_tag(tag)?),
            };
            RawInstruction::Plain(Instruction::Return(kind))
        }
        other => return Err(malformed(format!("Bad instruction tag {}", other))),
    };
    Ok(insn)
}

fn read_base_type<R: ReadBytesExt>(reader: &mut R) -> Result<BaseType, Error> {
    let c = reader.read_u8()? as char;
    BaseType::parse_char(c).ok_or_else(|| malformed(format!("Bad base type '{}'", c)))
}

fn write_const_operand<W: WriteBytesExt>(
    writer: &mut W,
    operand: &ConstOperand,
) -> Result<(), Error> {
    match operand {
        ConstOperand::Int(value) => {
            writer.write_u8(0)?;
            writer.write_i32::<BigEndian>(*value)?;
        }
        ConstOperand::Long(value) => {
            writer.write_u8(1)?;
            writer.write_i64::<BigEndian>(*value)?;
        }
        ConstOperand::Float(value) => {
            writer.write_u8(2)?;
            writer.write_f32::<BigEndian>(*value)?;
        }
        ConstOperand::Double(value) => {
            writer.write_u8(3)?;
            writer.write_f64::<BigEndian>(*value)?;
        }
        ConstOperand::Str(value) => {
            writer.write_u8(4)?;
            write_str(writer, value)?;
        }
        ConstOperand::Class(value) => {
            writer.write_u8(5)?;
            write_binary_name(writer, value)?;
        }
    }
    Ok(())
}

fn read_const_operand<R: ReadBytesExt>(reader: &mut R) -> Result<ConstOperand, Error> {
    let operand = match reader.read_u8()? {
        0 => ConstOperand::Int(reader.read_i32::<BigEndian>()?),
        1 => ConstOperand::Long(reader.read_i64::<BigEndian>()?),
        2 => ConstOperand::Float(reader.read_f32::<BigEndian>()?),
        3 => ConstOperand::Double(reader.read_f64::<BigEndian>()?),
        4 => ConstOperand::Str(read_str(reader)?),
        5 => ConstOperand::Class(read_binary_name(reader)?),
        other => return Err(malformed(format!("Bad constant tag {}", other))),
    };
    Ok(operand)
}

fn write_annotations<W: WriteBytesExt>(
    writer: &mut W,
    annotations: &[AnnotationNode],
) -> Result<(), Error> {
    writer.write_u16::<BigEndian>(annotations.len() as u16)?;
    for annotation in annotations {
        write_annotation(writer, annotation)?;
    }
    Ok(())
}

fn read_annotations<R: ReadBytesExt>(reader: &mut R) -> Result<Vec<AnnotationNode>, Error> {
    let count = reader.read_u16::<BigEndian>()?;
    (0..count).map(|_| read_annotation(reader)).collect()
}

fn write_annotation<W: WriteBytesExt>(
    writer: &mut W,
    annotation: &AnnotationNode,
) -> Result<(), Error> {
    write_binary_name(writer, &annotation.type_name)?;
    writer.write_u16::<BigEndian>(annotation.values.len() as u16)?;
    for (name, value) in &annotation.values {
        write_str(writer, name)?;
        write_annotation_value(writer, value)?;
    }
    Ok(())
}

fn read_annotation<R: ReadBytesExt>(reader: &mut R) -> Result<AnnotationNode, Error> {
    let type_name = read_binary_name(reader)?;
    let count = reader.read_u16::<BigEndian>()?;
    let values = (0..count)
        .map(|_| -> Result<(String, AnnotationValue), Error> {
            let name = read_str(reader)?;
            let value = read_annotation_value(reader)?;
            Ok((name, value))
        })
        .collect::<Result<_, _>>()?;
    Ok(AnnotationNode { type_name, values })
}

fn write_annotation_value<W: WriteBytesExt>(
    writer: &mut W,
    value: &AnnotationValue,
) -> Result<(), Error> {
    match value {
        AnnotationValue::Int(v) => {
            writer.write_u8(0)?;
            writer.write_i32::<BigEndian>(*v)?;
        }
        AnnotationValue::Long(v) => {
            writer.write_u8(1)?;
            writer.write_i64::<BigEndian>(*v)?;
        }
        AnnotationValue::Float(v) => {
            writer.write_u8(2)?;
            writer.write_f32::<BigEndian>(*v)?;
        }
        AnnotationValue::Double(v) => {
            writer.write_u8(3)?;
            writer.write_f64::<BigEndian>(*v)?;
        }
        AnnotationValue::Boolean(v) => {
            writer.write_u8(4)?;
            writer.write_u8(*v as u8)?;
        }
        AnnotationValue::Str(v) => {
            writer.write_u8(5)?;
            write_str(writer, v)?;
        }
        AnnotationValue::Class(v) => {
            writer.write_u8(6)?;
            write_field_type(writer, v)?;
        }
        AnnotationValue::Enum {
            type_name,
            constant,
        } => {
            writer.write_u8(7)?;
            write_binary_name(writer, type_name)?;
            write_str(writer, constant)?;
        }
        AnnotationValue::Nested(nested) => {
            writer.write_u8(8)?;
            write_annotation(writer, nested)?;
        }
        AnnotationValue::Array(values) => {
            writer.write_u8(9)?;
            writer.write_u16::<BigEndian>(values.len() as u16)?;
            for element in values {
                write_annotation_value(writer, element)?;
            }
        }
    }
    Ok(())
}

fn read_annotation_value<R: ReadBytesExt>(reader: &mut R) -> Result<AnnotationValue, Error> {
    let value = match reader.read_u8()? {
        0 => AnnotationValue::Int(reader.read_i32::<BigEndian>()?),
        1 => AnnotationValue::Long(reader.read_i64::<BigEndian>()?),
        2 => AnnotationValue::Float(reader.read_f32::<BigEndian>()?),
        3 => AnnotationValue::Double(reader.read_f64::<BigEndian>()?),
        4 => AnnotationValue::Boolean(reader.read_u8()? != 0),
        5 => AnnotationValue::Str(read_str(reader)?),
        6 => AnnotationValue::Class(read_field_type(reader)?),
        7 => AnnotationValue::Enum {
            type_name: read_binary_name(reader)?,
            constant: read_str(reader)?,
        },
        8 => AnnotationValue::Nested(read_annotation(reader)?),
        9 => {
            let count = reader.read_u16::<BigEndian>()?;
            let values = (0..count)
                .map(|_| read_annotation_value(reader))
                .collect::<Result<_, _>>()?;
            AnnotationValue::Array(values)
        }
        other => return Err(malformed(format!("Bad annotation value tag {}", other))),
    };
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::code::{InstructionBuilder, LabelGenerator};
    use crate::model::MethodSignature;

    #[test]
    fn round_trip_class_with_branching_body() -> Result<(), Error> {
        let mut class = ClassNode::subclass_shell(
            BinaryName::from_string(String::from("app/Sample")).unwrap(),
            BinaryName::OBJECT,
        );
        class.annotations.push(AnnotationNode {
            type_name: BinaryName::from_string(String::from("app/Audit")).unwrap(),
            values: vec![(
                String::from("value"),
                AnnotationValue::Array(vec![
                    AnnotationValue::Str(String::from("a")),
                    AnnotationValue::Int(7),
                ]),
            )],
        });
        class.fields.push(FieldNode {
            access_flags: FieldAccessFlags::PRIVATE,
            name: UnqualifiedName::from_string(String::from("count")).unwrap(),
            descriptor: FieldType::int(),
            annotations: vec![],
        });

        let mut method = MethodNode {
            access_flags: MethodAccessFlags::PUBLIC,
            signature: MethodSignature::new(
                UnqualifiedName::from_string(String::from("pick")).unwrap(),
                MethodDescriptor::parse("(I)I").unwrap(),
            ),
            code: None,
            annotations: vec![],
        };
        let mut labels = LabelGenerator::new();
        let mut builder = InstructionBuilder::for_method(&mut method, &mut labels);
        builder.load_argument(0)?;
        builder.when_else(
            crate::code::Condition::NonZero,
            |b| {
                b.const_int(100_000)?;
                Ok(())
            },
            |b| {
                b.const_int(-1)?;
                Ok(())
            },
        )?;
        builder.return_value(Some(&FieldType::int()))?;
        class.methods.push(method);

        let codec = BinaryCodec::new();
        let bytes = codec.encode(&class)?;
        let decoded = codec.decode(&bytes)?;

        assert_eq!(decoded.name, class.name);
        assert_eq!(decoded.annotations, class.annotations);
        assert_eq!(decoded.fields.len(), 1);
        let body = decoded.methods[0].code.as_ref().unwrap();

        // Marks differ in identity but the branch structure must survive
        let branches = body
            .instructions
            .iter()
            .filter(|i| matches!(i, Instruction::Branch(..) | Instruction::Jump(_)))
            .count();
        assert_eq!(branches, 2);

        // Re-encoding the decoded class must be stable
        let bytes_again = codec.encode(&decoded)?;
        assert_eq!(codec.decode(&bytes_again)?.methods[0].code.as_ref().unwrap().instructions.len(),
                   body.instructions.len());
        Ok(())
    }

    #[test]
    fn encode_rejects_unplaced_labels() {
        let mut class = ClassNode::subclass_shell(
            BinaryName::from_string(String::from("app/Broken")).unwrap(),
            BinaryName::OBJECT,
        );
        let mut code = Code::default();
        code.instructions.push(Instruction::Jump(Label(42)));
        class.methods.push(MethodNode {
            access_flags: MethodAccessFlags::PUBLIC,
            signature: MethodSignature::new(
                UnqualifiedName::from_string(String::from("broken")).unwrap(),
                MethodDescriptor::parse("()V").unwrap(),
            ),
            code: Some(code),
            annotations: vec![],
        });
        assert!(matches!(
            BinaryCodec::new().encode(&class),
            Err(Error::MalformedClass { .. })
        ));
    }
}
