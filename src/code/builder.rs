use super::{Condition, ConstOperand, FieldRef, Instruction, InvokeKind, Label, LabelGenerator, MethodRef};
use crate::model::{
    BaseType, BinaryName, Code, FieldType, LocalName, MethodDescriptor, MethodNode, TypeKind,
    UnqualifiedName,
};
use crate::Error;
use std::collections::HashMap;

/// One-shot state of a builder
///
/// Once the construct that owns a builder finishes, the builder flips to `Finalized` and every
/// further mutating call reports [`Error::BuilderFinalized`]. This guards against callbacks
/// retaining and misusing a builder past its intended scope.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
enum BuilderState {
    Building,
    Finalized,
}

/// Callback emitting one block of instructions
type Block<'c, 'a> = Box<dyn FnOnce(&mut InstructionBuilder<'a>) -> Result<(), Error> + 'c>;

/// Fluent builder for one method body
///
/// Appends symbolic instructions to a [`Code`] sequence. Every type-sensitive operation picks the
/// opcode variant matching the target type's [`TypeKind`]; wide kinds (`long`, `double`) get the
/// two-slot variants. Composite constructs (conditionals, loops, switches, try/catch, array
/// iteration) are emitted through callbacks that receive the same builder.
#[derive(Debug)]
pub struct InstructionBuilder<'a> {
    code: &'a mut Code,
    labels: &'a mut LabelGenerator,
    descriptor: MethodDescriptor,
    is_static: bool,
    named: HashMap<String, (u16, FieldType)>,
    state: BuilderState,
}

impl<'a> InstructionBuilder<'a> {
    /// Create a builder appending to the given code sequence
    pub fn new(
        code: &'a mut Code,
        labels: &'a mut LabelGenerator,
        descriptor: MethodDescriptor,
        is_static: bool,
    ) -> InstructionBuilder<'a> {
        let parameter_slots = descriptor.parameter_length(!is_static);
        if code.max_locals < parameter_slots {
            code.max_locals = parameter_slots;
        }
        let named = code
            .local_names
            .iter()
            .map(|local| (local.name.clone(), (local.slot, local.descriptor.clone())))
            .collect();
        InstructionBuilder {
            code,
            labels,
            descriptor,
            is_static,
            named,
            state: BuilderState::Building,
        }
    }

    /// Create a builder for a method node, initializing an empty body if none exists yet
    pub fn for_method(
        method: &'a mut MethodNode,
        labels: &'a mut LabelGenerator,
    ) -> InstructionBuilder<'a> {
        let descriptor = method.signature.descriptor.clone();
        let is_static = method.is_static();
        let code = method.code.get_or_insert_with(Code::default);
        InstructionBuilder::new(code, labels, descriptor, is_static)
    }

    /// Seal the builder; any further use is an error
    pub(crate) fn finish(&mut self) {
        self.state = BuilderState::Finalized;
    }

    fn check_building(&self) -> Result<(), Error> {
        match self.state {
            BuilderState::Building => Ok(()),
            BuilderState::Finalized => Err(Error::BuilderFinalized),
        }
    }

    /// Append a raw instruction
    pub fn push_instruction(&mut self, insn: Instruction) -> Result<&mut Self, Error> {
        self.check_building()?;
        self.code.instructions.push(insn);
        Ok(self)
    }

    /// Generate a fresh label
    pub fn fresh_label(&mut self) -> Label {
        self.labels.fresh_label()
    }

    /// Place a label at the current position
    pub fn place_label(&mut self, label: Label) -> Result<&mut Self, Error> {
        self.push_instruction(Instruction::Mark(label))
    }

    /// Open a fresh (anonymous) local variable slot
    fn fresh_local(&mut self, typ: &FieldType) -> u16 {
        let slot = self.code.max_locals;
        self.code.max_locals += typ.width();
        slot
    }

    /// Declare a named local variable, returning its slot
    pub fn declare_local(&mut self, name: &str, typ: FieldType) -> Result<u16, Error> {
        self.check_building()?;
        let slot = self.fresh_local(&typ);
        self.named.insert(String::from(name), (slot, typ.clone()));
        self.code.local_names.push(LocalName {
            slot,
            name: String::from(name),
            descriptor: typ,
        });
        Ok(slot)
    }

    /// Load `this` (slot 0 of an instance method)
    pub fn load_this(&mut self) -> Result<&mut Self, Error> {
        if self.is_static {
            return Err(Error::NoThisInStaticMethod);
        }
        self.push_instruction(Instruction::LoadLocal(TypeKind::Reference, 0))
    }

    /// Load argument `index` (0-based, not counting `this`)
    pub fn load_argument(&mut self, index: usize) -> Result<&mut Self, Error> {
        if index >= self.descriptor.parameters.len() {
            return Err(Error::ArgumentOutOfRange {
                index,
                available: self.descriptor.parameters.len(),
            });
        }
        let kind = self.descriptor.parameters[index].kind();
        let offset = self.descriptor.parameter_offset(index, !self.is_static);
        self.push_instruction(Instruction::LoadLocal(kind, offset))
    }

    /// Load every argument in order
    pub fn load_arguments(&mut self) -> Result<&mut Self, Error> {
        for index in 0..self.descriptor.parameters.len() {
            self.load_argument(index)?;
        }
        Ok(self)
    }

    /// Load a named local variable
    pub fn load_local(&mut self, name: &str) -> Result<&mut Self, Error> {
        let (slot, kind) = self.lookup_local(name)?;
        self.push_instruction(Instruction::LoadLocal(kind, slot))
    }

    /// Store into a named local variable
    pub fn store_local(&mut self, name: &str) -> Result<&mut Self, Error> {
        let (slot, kind) = self.lookup_local(name)?;
        self.push_instruction(Instruction::StoreLocal(kind, slot))
    }

    fn lookup_local(&self, name: &str) -> Result<(u16, TypeKind), Error> {
        match self.named.get(name) {
            Some((slot, typ)) => Ok((*slot, typ.kind())),
            None => Err(Error::UnknownLocal(String::from(name))),
        }
    }

    /// Push an integer constant, using the short-form encoding when the value is small
    pub fn const_int(&mut self, integer: i32) -> Result<&mut Self, Error> {
        let insn = match integer {
            -32768..=32767 => Instruction::PushInt(integer as i16),
            _ => Instruction::Const(ConstOperand::Int(integer)),
        };
        self.push_instruction(insn)
    }

    /// Push a long constant
    ///
    /// Small values go through the short int form plus a widening conversion rather than the
    /// constant table, mirroring what a classfile emitter would do to keep the pool small.
    pub fn const_long(&mut self, long: i64) -> Result<&mut Self, Error> {
        match i16::try_from(long) {
            Ok(small) => self
                .push_instruction(Instruction::PushInt(small))?
                .push_instruction(Instruction::Convert(TypeKind::Int, TypeKind::Long)),
            Err(_) => self.push_instruction(Instruction::Const(ConstOperand::Long(long))),
        }
    }

    /// Push a float constant
    pub fn const_float(&mut self, float: f32) -> Result<&mut Self, Error> {
        self.push_instruction(Instruction::Const(ConstOperand::Float(float)))
    }

    /// Push a double constant, using the short int form for small whole values
    pub fn const_double(&mut self, double: f64) -> Result<&mut Self, Error> {
        if double.fract() == 0.0 && (-128.0..=127.0).contains(&double) {
            self.push_instruction(Instruction::PushInt(double as i16))?
                .push_instruction(Instruction::Convert(TypeKind::Int, TypeKind::Double))
        } else {
            self.push_instruction(Instruction::Const(ConstOperand::Double(double)))
        }
    }

    /// Push a constant string
    pub fn const_string(&mut self, string: impl Into<String>) -> Result<&mut Self, Error> {
        self.push_instruction(Instruction::Const(ConstOperand::Str(string.into())))
    }

    /// Push `null`
    pub fn const_null(&mut self) -> Result<&mut Self, Error> {
        self.push_instruction(Instruction::ConstNull)
    }

    /// Push a class constant
    pub fn const_class(&mut self, class: BinaryName) -> Result<&mut Self, Error> {
        self.push_instruction(Instruction::Const(ConstOperand::Class(class)))
    }

    /// Push the default (zero) value for a type; pushes nothing for `None` (void)
    pub fn const_default(&mut self, typ: Option<&FieldType>) -> Result<&mut Self, Error> {
        match typ.map(FieldType::kind) {
            None => Ok(self),
            Some(TypeKind::Reference) => self.const_null(),
            Some(TypeKind::Int) => self.const_int(0),
            Some(TypeKind::Long) => self.const_long(0),
            Some(TypeKind::Float) => self.const_float(0.0),
            Some(TypeKind::Double) => self.const_double(0.0),
        }
    }

    /// Invoke a method
    pub fn invoke(&mut self, kind: InvokeKind, method: MethodRef) -> Result<&mut Self, Error> {
        self.push_instruction(Instruction::Invoke(kind, method))
    }

    pub fn invoke_virtual(&mut self, method: MethodRef) -> Result<&mut Self, Error> {
        self.invoke(InvokeKind::Virtual, method)
    }

    pub fn invoke_static(&mut self, method: MethodRef) -> Result<&mut Self, Error> {
        self.invoke(InvokeKind::Static, method)
    }

    pub fn invoke_special(&mut self, method: MethodRef) -> Result<&mut Self, Error> {
        self.invoke(InvokeKind::Special, method)
    }

    pub fn invoke_interface(&mut self, method: MethodRef) -> Result<&mut Self, Error> {
        self.invoke(InvokeKind::Interface, method)
    }

    /// Read an instance field
    pub fn get_field(&mut self, field: FieldRef) -> Result<&mut Self, Error> {
        self.push_instruction(Instruction::GetField(field))
    }

    /// Write an instance field
    pub fn put_field(&mut self, field: FieldRef) -> Result<&mut Self, Error> {
        self.push_instruction(Instruction::PutField(field))
    }

    /// Read a static field
    pub fn get_static(&mut self, field: FieldRef) -> Result<&mut Self, Error> {
        self.push_instruction(Instruction::GetStatic(field))
    }

    /// Write a static field
    pub fn put_static(&mut self, field: FieldRef) -> Result<&mut Self, Error> {
        self.push_instruction(Instruction::PutStatic(field))
    }

    /// Construct a new instance: allocate, duplicate, emit the constructor arguments through the
    /// callback, and invoke the matching constructor
    pub fn construct(
        &mut self,
        class: BinaryName,
        parameters: Vec<FieldType>,
        arguments: impl FnOnce(&mut InstructionBuilder<'a>) -> Result<(), Error>,
    ) -> Result<&mut Self, Error> {
        self.push_instruction(Instruction::New(class.clone()))?
            .push_instruction(Instruction::Dup)?;
        arguments(self)?;
        self.invoke_special(MethodRef {
            owner: class,
            name: UnqualifiedName::INIT,
            descriptor: MethodDescriptor {
                parameters,
                return_type: None,
            },
        })
    }

    /// Box the primitive on top of the stack into its wrapper type
    pub fn box_value(&mut self, base: BaseType) -> Result<&mut Self, Error> {
        self.push_instruction(Instruction::Box(base))
    }

    /// Cast the reference on top of the stack to the target type, unboxing if the target is a
    /// primitive
    pub fn cast_or_unbox(&mut self, target: &FieldType) -> Result<&mut Self, Error> {
        match target {
            FieldType::Base(base) => self
                .push_instruction(Instruction::CheckCast(FieldType::Object(
                    base.wrapper_class(),
                )))?
                .push_instruction(Instruction::Unbox(*base)),
            other => self.push_instruction(Instruction::CheckCast(other.clone())),
        }
    }

    /// Box the top of the stack if (and only if) the given type is a primitive
    pub fn box_if_primitive(&mut self, typ: &FieldType) -> Result<&mut Self, Error> {
        match typ {
            FieldType::Base(base) => self.box_value(*base),
            _ => Ok(self),
        }
    }

    /// Construct and throw an exception, optionally passing a message to its constructor
    pub fn throw_exception(
        &mut self,
        class: BinaryName,
        message: Option<&str>,
    ) -> Result<&mut Self, Error> {
        match message {
            Some(message) => {
                let message = String::from(message);
                self.construct(
                    class,
                    vec![FieldType::Object(BinaryName::STRING)],
                    move |builder| {
                        builder.const_string(message)?;
                        Ok(())
                    },
                )?
            }
            None => self.construct(class, vec![], |_| Ok(()))?,
        };
        self.push_instruction(Instruction::Throw)
    }

    /// Duplicate the top of the stack, selecting the wide variant for two-slot kinds
    pub fn dup(&mut self, kind: TypeKind) -> Result<&mut Self, Error> {
        let insn = if kind.width() == 2 {
            Instruction::DupWide
        } else {
            Instruction::Dup
        };
        self.push_instruction(insn)
    }

    /// Discard the top of the stack, selecting the wide variant for two-slot kinds
    pub fn pop(&mut self, kind: TypeKind) -> Result<&mut Self, Error> {
        let insn = if kind.width() == 2 {
            Instruction::PopWide
        } else {
            Instruction::Pop
        };
        self.push_instruction(insn)
    }

    /// Swap the top two single-slot values
    pub fn swap(&mut self) -> Result<&mut Self, Error> {
        self.push_instruction(Instruction::Swap)
    }

    /// Return the value on top of the stack (or nothing for void)
    pub fn return_value(&mut self, typ: Option<&FieldType>) -> Result<&mut Self, Error> {
        self.push_instruction(Instruction::Return(typ.map(FieldType::kind)))
    }

    /// Return the default (zero) value for the type
    pub fn return_default(&mut self, typ: Option<&FieldType>) -> Result<&mut Self, Error> {
        self.const_default(typ)?;
        self.return_value(typ)
    }

    /// Conditional with no false branch
    ///
    /// Emits a branch past the block when the condition does not hold, then the block.
    pub fn when(
        &mut self,
        condition: Condition,
        then_block: impl FnOnce(&mut InstructionBuilder<'a>) -> Result<(), Error>,
    ) -> Result<&mut Self, Error> {
        self.check_building()?;
        let end = self.fresh_label();
        self.push_instruction(Instruction::Branch(!condition, end))?;
        then_block(self)?;
        self.place_label(end)
    }

    /// Conditional with both branches
    ///
    /// Emits the branch, the true block, an unconditional jump past the false block, then the
    /// false block.
    pub fn when_else(
        &mut self,
        condition: Condition,
        then_block: impl FnOnce(&mut InstructionBuilder<'a>) -> Result<(), Error>,
        else_block: impl FnOnce(&mut InstructionBuilder<'a>) -> Result<(), Error>,
    ) -> Result<&mut Self, Error> {
        self.check_building()?;
        let els = self.fresh_label();
        let end = self.fresh_label();
        self.push_instruction(Instruction::Branch(!condition, els))?;
        then_block(self)?;
        self.push_instruction(Instruction::Jump(end))?;
        self.place_label(els)?;
        else_block(self)?;
        self.place_label(end)
    }

    /// Test-then-body loop
    ///
    /// Emits the test, a branch past the loop when the condition fails, the body, an unconditional
    /// jump back to the test label, and finally the exit label.
    pub fn while_loop(
        &mut self,
        test: impl FnOnce(&mut InstructionBuilder<'a>) -> Result<(), Error>,
        condition: Condition,
        body: impl FnOnce(&mut InstructionBuilder<'a>) -> Result<(), Error>,
    ) -> Result<&mut Self, Error> {
        self.check_building()?;
        let test_label = self.fresh_label();
        let exit = self.fresh_label();
        self.place_label(test_label)?;
        test(self)?;
        self.push_instruction(Instruction::Branch(!condition, exit))?;
        body(self)?;
        self.push_instruction(Instruction::Jump(test_label))?;
        self.place_label(exit)
    }

    /// Dense switch over the contiguous range `[low, high]`
    ///
    /// The callback registers one handler per case; cases left unregistered fall to the default
    /// handler, and when no default is registered an implicit one throwing
    /// `IllegalArgumentException` is supplied. The int to switch on must already be on the stack.
    pub fn switch<'c>(
        &mut self,
        low: i32,
        high: i32,
        register: impl FnOnce(&mut SwitchCases<'c, 'a>) -> Result<(), Error>,
    ) -> Result<&mut Self, Error> {
        self.check_building()?;
        let mut cases = SwitchCases {
            low,
            high,
            handlers: (low..=high).map(|_| None).collect(),
            default: None,
        };
        register(&mut cases)?;

        let default_label = self.fresh_label();
        let targets: Vec<(Label, Option<Block<'c, 'a>>)> = cases
            .handlers
            .into_iter()
            .map(|handler| match handler {
                Some(block) => (self.labels.fresh_label(), Some(block)),
                None => (default_label, None),
            })
            .collect();

        self.push_instruction(Instruction::Switch {
            low,
            targets: targets.iter().map(|(label, _)| *label).collect(),
            default: default_label,
        })?;

        for (label, handler) in targets {
            if let Some(block) = handler {
                self.place_label(label)?;
                block(self)?;
            }
        }

        self.place_label(default_label)?;
        match cases.default {
            Some(block) => {
                block(self)?;
            }
            None => {
                self.throw_exception(
                    BinaryName::ILLEGALARGUMENTEXCEPTION,
                    Some("Unexpected switch value"),
                )?;
            }
        }
        Ok(self)
    }

    /// Try/catch region
    ///
    /// The callback registers the body and zero or more handlers; an exception-table entry
    /// covering the body's instruction range is emitted for each handler. Handlers are entered
    /// with the thrown value on the stack.
    pub fn try_catch<'c>(
        &mut self,
        register: impl FnOnce(&mut TryCatch<'c, 'a>) -> Result<(), Error>,
    ) -> Result<&mut Self, Error> {
        self.check_building()?;
        let mut try_catch = TryCatch {
            body: None,
            handlers: vec![],
        };
        register(&mut try_catch)?;

        let start = self.fresh_label();
        let end = self.fresh_label();
        let done = self.fresh_label();

        self.place_label(start)?;
        if let Some(body) = try_catch.body {
            body(self)?;
        }
        self.place_label(end)?;
        self.push_instruction(Instruction::Jump(done))?;

        for (catch_type, handler) in try_catch.handlers {
            let handler_label = self.fresh_label();
            self.code.exception_table.push(crate::model::ExceptionTableEntry {
                start,
                end,
                handler: handler_label,
                catch_type: Some(catch_type),
            });
            self.place_label(handler_label)?;
            handler(self)?;
            self.push_instruction(Instruction::Jump(done))?;
        }

        self.place_label(done)
    }

    /// Iterate over the array on top of the stack
    ///
    /// Opens a fresh int local, initializes it to zero, and loops while the index is less than
    /// the array's length. The callback runs once per element with the element already pushed.
    pub fn iterate_array(
        &mut self,
        element_type: &FieldType,
        body: impl FnOnce(&mut InstructionBuilder<'a>) -> Result<(), Error>,
    ) -> Result<&mut Self, Error> {
        self.check_building()?;
        let array_slot = self.fresh_local(&FieldType::array(element_type.clone()));
        let index_slot = self.fresh_local(&FieldType::int());
        let element_kind = element_type.kind();

        self.push_instruction(Instruction::StoreLocal(TypeKind::Reference, array_slot))?
            .push_instruction(Instruction::PushInt(0))?
            .push_instruction(Instruction::StoreLocal(TypeKind::Int, index_slot))?;

        self.while_loop(
            |b| {
                b.push_instruction(Instruction::LoadLocal(TypeKind::Int, index_slot))?
                    .push_instruction(Instruction::LoadLocal(TypeKind::Reference, array_slot))?
                    .push_instruction(Instruction::ArrayLength)?;
                Ok(())
            },
            Condition::Less,
            |b| {
                b.push_instruction(Instruction::LoadLocal(TypeKind::Reference, array_slot))?
                    .push_instruction(Instruction::LoadLocal(TypeKind::Int, index_slot))?
                    .push_instruction(Instruction::LoadElement(element_kind))?;
                body(b)?;
                b.push_instruction(Instruction::Inc(index_slot, 1))?;
                Ok(())
            },
        )
    }
}

/// Registration surface for [`InstructionBuilder::switch`]
pub struct SwitchCases<'c, 'a> {
    low: i32,
    high: i32,
    handlers: Vec<Option<Block<'c, 'a>>>,
    default: Option<Block<'c, 'a>>,
}

impl<'c, 'a> SwitchCases<'c, 'a> {
    /// Register a handler for one case value
    pub fn case(
        &mut self,
        value: i32,
        body: impl FnOnce(&mut InstructionBuilder<'a>) -> Result<(), Error> + 'c,
    ) -> Result<(), Error> {
        if self.default.is_some() {
            return Err(Error::SwitchCaseAfterDefault(value));
        }
        if value < self.low || value > self.high {
            return Err(Error::SwitchCaseOutOfRange {
                case: value,
                low: self.low,
                high: self.high,
            });
        }
        let slot = &mut self.handlers[(value - self.low) as usize];
        if slot.is_some() {
            return Err(Error::DuplicateSwitchCase(value));
        }
        *slot = Some(Box::new(body));
        Ok(())
    }

    /// Register the default handler, replacing the implicit throwing one
    pub fn default(
        &mut self,
        body: impl FnOnce(&mut InstructionBuilder<'a>) -> Result<(), Error> + 'c,
    ) -> Result<(), Error> {
        self.default = Some(Box::new(body));
        Ok(())
    }
}

/// Registration surface for [`InstructionBuilder::try_catch`]
pub struct TryCatch<'c, 'a> {
    body: Option<Block<'c, 'a>>,
    handlers: Vec<(BinaryName, Block<'c, 'a>)>,
}

impl<'c, 'a> TryCatch<'c, 'a> {
    /// Register the protected body
    pub fn body(
        &mut self,
        body: impl FnOnce(&mut InstructionBuilder<'a>) -> Result<(), Error> + 'c,
    ) -> Result<(), Error> {
        self.body = Some(Box::new(body));
        Ok(())
    }

    /// Register a handler for one exception type
    pub fn on(
        &mut self,
        catch_type: BinaryName,
        handler: impl FnOnce(&mut InstructionBuilder<'a>) -> Result<(), Error> + 'c,
    ) -> Result<(), Error> {
        self.handlers.push((catch_type, Box::new(handler)));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Name;
    use crate::model::MethodSignature;

    fn int_method() -> MethodNode {
        MethodNode {
            access_flags: crate::model::MethodAccessFlags::PUBLIC,
            signature: MethodSignature::new(
                UnqualifiedName::from_string(String::from("sample")).unwrap(),
                crate::model::ParseDescriptor::parse("(I)I").unwrap(),
            ),
            code: None,
            annotations: vec![],
        }
    }

    #[test]
    fn conditional_emits_branch_and_blocks() -> Result<(), Error> {
        let mut method = int_method();
        let mut labels = LabelGenerator::new();
        let mut builder = InstructionBuilder::for_method(&mut method, &mut labels);
        builder.load_argument(0)?;
        builder.when_else(
            Condition::NonZero,
            |b| {
                b.const_int(1)?;
                Ok(())
            },
            |b| {
                b.const_int(2)?;
                Ok(())
            },
        )?;
        builder.return_value(Some(&FieldType::int()))?;

        let code = method.code.unwrap();
        assert!(matches!(
            code.instructions[1],
            Instruction::Branch(Condition::Zero, _)
        ));
        assert!(code
            .instructions
            .iter()
            .any(|i| matches!(i, Instruction::Jump(_))));
        Ok(())
    }

    #[test]
    fn builder_locks_after_finish() {
        let mut method = int_method();
        let mut labels = LabelGenerator::new();
        let mut builder = InstructionBuilder::for_method(&mut method, &mut labels);
        builder.finish();
        assert!(matches!(
            builder.const_int(1),
            Err(Error::BuilderFinalized)
        ));
    }

    #[test]
    fn switch_rejects_duplicate_and_post_default_cases() {
        let mut method = int_method();
        let mut labels = LabelGenerator::new();
        let mut builder = InstructionBuilder::for_method(&mut method, &mut labels);
        builder.load_argument(0).unwrap();
        let err = builder
            .switch(0, 2, |cases| {
                cases.case(1, |b| {
                    b.return_default(Some(&FieldType::int()))?;
                    Ok(())
                })?;
                cases.case(1, |b| {
                    b.return_default(Some(&FieldType::int()))?;
                    Ok(())
                })?;
                Ok(())
            })
            .unwrap_err();
        assert!(matches!(err, Error::DuplicateSwitchCase(1)));

        let mut method = int_method();
        let mut labels = LabelGenerator::new();
        let mut builder = InstructionBuilder::for_method(&mut method, &mut labels);
        builder.load_argument(0).unwrap();
        let err = builder
            .switch(0, 2, |cases| {
                cases.default(|b| {
                    b.return_default(Some(&FieldType::int()))?;
                    Ok(())
                })?;
                cases.case(0, |b| {
                    b.return_default(Some(&FieldType::int()))?;
                    Ok(())
                })?;
                Ok(())
            })
            .unwrap_err();
        assert!(matches!(err, Error::SwitchCaseAfterDefault(0)));
    }
}
