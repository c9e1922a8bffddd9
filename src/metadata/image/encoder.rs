use std::collections::HashMap;

use crate::{
    assembly::{ExceptionHandler, HandlerKind, Immediate, InstrId, MethodBody, OperandType, Operand},
    file::writer::ByteWriter,
    metadata::{
        image::{compute_mvid, MAGIC, VERSION},
        members::{
            AttrValue, CustomAttribute, FieldDef, GenericParam, MethodDef, NamedArg, ParamDef,
            PropertyDef, TypeDef,
        },
        module::{CilModule, Version},
        references::{CallSite, FieldRef, MethodRef},
        security::SecurityDeclaration,
        typesystem::{TypeRef, TypeSig, ELEMENT_TYPE},
    },
    Error, Result,
};

/// Custom attribute value tags, matching the ECMA-335 II.23.3 serialization types
#[allow(non_snake_case)]
pub(super) mod ATTR_TAG {
    pub const BOOL: u8 = 0x02;
    pub const I4: u8 = 0x08;
    pub const I8: u8 = 0x0a;
    pub const R4: u8 = 0x0c;
    pub const R8: u8 = 0x0d;
    pub const STRING: u8 = 0x0e;
    pub const TYPE: u8 = 0x50;
    pub const ENUM: u8 = 0x55;
}

/// Token operand kinds of `ldtoken`
#[allow(non_snake_case)]
pub(super) mod TOKEN_KIND {
    pub const TYPE: u8 = 0;
    pub const FIELD: u8 = 1;
    pub const METHOD: u8 = 2;
}

/// Exception handler clause kinds
#[allow(non_snake_case)]
pub(super) mod HANDLER_KIND {
    pub const CATCH: u8 = 0;
    pub const FILTER: u8 = 1;
    pub const FINALLY: u8 = 2;
    pub const FAULT: u8 = 3;
}

/// Encode `module` as a module image.
///
/// # Errors
/// Returns [`crate::Error::Error`] if a branch or handler references an instruction outside of
/// its body or an operand does not match its opcode, and propagates length overflows of the
/// compressed integer encoding.
pub fn encode(module: &CilModule) -> Result<Vec<u8>> {
    let mut body = ByteWriter::new();
    write_module(&mut body, module)?;
    let body = body.into_inner();

    let mut image = ByteWriter::new();
    image.write_bytes(MAGIC);
    image.write_le::<u16>(VERSION);
    image.write_bytes(&compute_mvid(&body).to_bytes());
    image.write_bytes(&body);
    Ok(image.into_inner())
}

fn write_module(w: &mut ByteWriter, module: &CilModule) -> Result<()> {
    w.write_prefixed_string_utf8(&module.name)?;
    write_version(w, module.version);

    w.write_count(module.assembly_refs.len())?;
    for aref in &module.assembly_refs {
        w.write_prefixed_string_utf8(&aref.name)?;
        write_version(w, aref.version);
    }

    write_custom_attributes(w, &module.custom_attributes)?;

    w.write_count(module.security_declarations.len())?;
    for declaration in &module.security_declarations {
        write_security_declaration(w, declaration)?;
    }

    w.write_count(module.resources.len())?;
    for resource in &module.resources {
        w.write_prefixed_string_utf8(&resource.name)?;
        w.write_count(resource.data.len())?;
        w.write_bytes(&resource.data);
    }

    w.write_count(module.types.len())?;
    for def in &module.types {
        write_type_def(w, def)?;
    }
    Ok(())
}

fn write_version(w: &mut ByteWriter, version: Version) {
    w.write_le::<u16>(version.major);
    w.write_le::<u16>(version.minor);
    w.write_le::<u16>(version.build);
    w.write_le::<u16>(version.revision);
}

fn write_bool(w: &mut ByteWriter, value: bool) {
    w.write_le::<u8>(u8::from(value));
}

fn write_opt_string(w: &mut ByteWriter, value: Option<&str>) -> Result<()> {
    match value {
        Some(value) => {
            write_bool(w, true);
            w.write_prefixed_string_utf8(value)
        }
        None => {
            write_bool(w, false);
            Ok(())
        }
    }
}

fn write_security_declaration(w: &mut ByteWriter, declaration: &SecurityDeclaration) -> Result<()> {
    w.write_le::<u16>(declaration.action as u16);
    w.write_count(declaration.attributes.len())?;
    for attribute in &declaration.attributes {
        write_type_ref(w, &attribute.attribute_type)?;
        write_named_args(w, &attribute.named_args)?;
    }
    Ok(())
}

fn write_type_def(w: &mut ByteWriter, def: &TypeDef) -> Result<()> {
    w.write_prefixed_string_utf8(&def.namespace)?;
    w.write_prefixed_string_utf8(&def.name)?;
    w.write_le::<u32>(def.flags.bits());

    match &def.base_type {
        Some(base) => {
            write_bool(w, true);
            write_type_sig(w, base)?;
        }
        None => write_bool(w, false),
    }

    write_sigs(w, &def.interfaces)?;
    write_generic_params(w, &def.generic_params)?;

    w.write_count(def.fields.len())?;
    for field in &def.fields {
        write_field_def(w, field)?;
    }

    w.write_count(def.methods.len())?;
    for method in &def.methods {
        write_method_def(w, method)?;
    }

    w.write_count(def.properties.len())?;
    for property in &def.properties {
        write_property_def(w, property)?;
    }

    w.write_count(def.nested_types.len())?;
    for nested in &def.nested_types {
        write_type_def(w, nested)?;
    }

    write_custom_attributes(w, &def.custom_attributes)
}

fn write_generic_params(w: &mut ByteWriter, params: &[GenericParam]) -> Result<()> {
    w.write_count(params.len())?;
    for param in params {
        w.write_prefixed_string_utf8(&param.name)?;
        write_sigs(w, &param.constraints)?;
    }
    Ok(())
}

fn write_field_def(w: &mut ByteWriter, field: &FieldDef) -> Result<()> {
    w.write_prefixed_string_utf8(&field.name)?;
    w.write_le::<u16>(field.flags.bits());
    write_type_sig(w, &field.field_type)?;
    write_custom_attributes(w, &field.custom_attributes)
}

fn write_param_def(w: &mut ByteWriter, param: &ParamDef) -> Result<()> {
    w.write_prefixed_string_utf8(&param.name)?;
    w.write_le::<u16>(param.flags.bits());
    write_type_sig(w, &param.param_type)?;
    write_custom_attributes(w, &param.custom_attributes)
}

fn write_method_def(w: &mut ByteWriter, method: &MethodDef) -> Result<()> {
    w.write_prefixed_string_utf8(&method.name)?;
    w.write_le::<u16>(method.flags.bits());
    w.write_le::<u16>(method.impl_flags);
    write_type_sig(w, &method.return_type)?;

    w.write_count(method.params.len())?;
    for param in &method.params {
        write_param_def(w, param)?;
    }

    write_generic_params(w, &method.generic_params)?;
    write_custom_attributes(w, &method.custom_attributes)?;

    match &method.body {
        Some(body) => {
            write_bool(w, true);
            write_method_body(w, body)
        }
        None => {
            write_bool(w, false);
            Ok(())
        }
    }
}

fn write_property_def(w: &mut ByteWriter, property: &PropertyDef) -> Result<()> {
    w.write_prefixed_string_utf8(&property.name)?;
    w.write_le::<u16>(property.flags.bits());
    write_bool(w, property.has_this);
    write_type_sig(w, &property.property_type)?;
    write_opt_string(w, property.getter.as_deref())?;
    write_opt_string(w, property.setter.as_deref())?;
    write_custom_attributes(w, &property.custom_attributes)
}

fn write_custom_attributes(w: &mut ByteWriter, attributes: &[CustomAttribute]) -> Result<()> {
    w.write_count(attributes.len())?;
    for attribute in attributes {
        write_method_ref(w, &attribute.ctor)?;
        w.write_count(attribute.fixed_args.len())?;
        for value in &attribute.fixed_args {
            write_attr_value(w, value)?;
        }
        write_named_args(w, &attribute.named_args)?;
    }
    Ok(())
}

fn write_named_args(w: &mut ByteWriter, args: &[NamedArg]) -> Result<()> {
    w.write_count(args.len())?;
    for arg in args {
        write_bool(w, arg.is_field);
        w.write_prefixed_string_utf8(&arg.name)?;
        write_attr_value(w, &arg.value)?;
    }
    Ok(())
}

fn write_attr_value(w: &mut ByteWriter, value: &AttrValue) -> Result<()> {
    match value {
        AttrValue::Bool(value) => {
            w.write_le::<u8>(ATTR_TAG::BOOL);
            write_bool(w, *value);
        }
        AttrValue::I4(value) => {
            w.write_le::<u8>(ATTR_TAG::I4);
            w.write_le::<i32>(*value);
        }
        AttrValue::I8(value) => {
            w.write_le::<u8>(ATTR_TAG::I8);
            w.write_le::<i64>(*value);
        }
        AttrValue::R4(value) => {
            w.write_le::<u8>(ATTR_TAG::R4);
            w.write_le::<f32>(*value);
        }
        AttrValue::R8(value) => {
            w.write_le::<u8>(ATTR_TAG::R8);
            w.write_le::<f64>(*value);
        }
        AttrValue::String(value) => {
            w.write_le::<u8>(ATTR_TAG::STRING);
            write_opt_string(w, value.as_deref())?;
        }
        AttrValue::Type(sig) => {
            w.write_le::<u8>(ATTR_TAG::TYPE);
            write_type_sig(w, sig)?;
        }
        AttrValue::Enum { enum_type, value } => {
            w.write_le::<u8>(ATTR_TAG::ENUM);
            write_type_ref(w, enum_type)?;
            w.write_le::<i64>(*value);
        }
    }
    Ok(())
}

fn write_type_ref(w: &mut ByteWriter, type_ref: &TypeRef) -> Result<()> {
    w.write_prefixed_string_utf8(&type_ref.scope)?;
    w.write_prefixed_string_utf8(&type_ref.namespace)?;
    w.write_prefixed_string_utf8(&type_ref.name)?;
    match &type_ref.declaring {
        Some(declaring) => {
            write_bool(w, true);
            write_type_ref(w, declaring)
        }
        None => {
            write_bool(w, false);
            Ok(())
        }
    }
}

fn write_sigs(w: &mut ByteWriter, sigs: &[TypeSig]) -> Result<()> {
    w.write_count(sigs.len())?;
    for sig in sigs {
        write_type_sig(w, sig)?;
    }
    Ok(())
}

fn write_type_sig(w: &mut ByteWriter, sig: &TypeSig) -> Result<()> {
    let tag = match sig {
        TypeSig::Void => ELEMENT_TYPE::VOID,
        TypeSig::Boolean => ELEMENT_TYPE::BOOLEAN,
        TypeSig::Char => ELEMENT_TYPE::CHAR,
        TypeSig::I1 => ELEMENT_TYPE::I1,
        TypeSig::U1 => ELEMENT_TYPE::U1,
        TypeSig::I2 => ELEMENT_TYPE::I2,
        TypeSig::U2 => ELEMENT_TYPE::U2,
        TypeSig::I4 => ELEMENT_TYPE::I4,
        TypeSig::U4 => ELEMENT_TYPE::U4,
        TypeSig::I8 => ELEMENT_TYPE::I8,
        TypeSig::U8 => ELEMENT_TYPE::U8,
        TypeSig::R4 => ELEMENT_TYPE::R4,
        TypeSig::R8 => ELEMENT_TYPE::R8,
        TypeSig::String => ELEMENT_TYPE::STRING,
        TypeSig::Object => ELEMENT_TYPE::OBJECT,
        TypeSig::I => ELEMENT_TYPE::I,
        TypeSig::U => ELEMENT_TYPE::U,
        TypeSig::TypedByRef => ELEMENT_TYPE::TYPEDBYREF,
        TypeSig::Class(_) => ELEMENT_TYPE::CLASS,
        TypeSig::ValueType(_) => ELEMENT_TYPE::VALUETYPE,
        TypeSig::GenericInst(_, _) => ELEMENT_TYPE::GENERICINST,
        TypeSig::Var(_) => ELEMENT_TYPE::VAR,
        TypeSig::MVar(_) => ELEMENT_TYPE::MVAR,
        TypeSig::SzArray(_) => ELEMENT_TYPE::SZARRAY,
        TypeSig::Array(_, _) => ELEMENT_TYPE::ARRAY,
        TypeSig::Ptr(_) => ELEMENT_TYPE::PTR,
        TypeSig::ByRef(_) => ELEMENT_TYPE::BYREF,
    };
    w.write_le::<u8>(tag);

    match sig {
        TypeSig::Class(type_ref) | TypeSig::ValueType(type_ref) => write_type_ref(w, type_ref),
        TypeSig::GenericInst(element, args) => {
            write_type_sig(w, element)?;
            write_sigs(w, args)
        }
        TypeSig::Var(name) | TypeSig::MVar(name) => w.write_prefixed_string_utf8(name),
        TypeSig::SzArray(element) | TypeSig::Ptr(element) | TypeSig::ByRef(element) => {
            write_type_sig(w, element)
        }
        TypeSig::Array(element, rank) => {
            write_type_sig(w, element)?;
            w.write_compressed_uint(*rank)
        }
        _ => Ok(()),
    }
}

/// Field reference in image encoding, shared with the symbol map format.
pub(crate) fn write_field_ref(w: &mut ByteWriter, field: &FieldRef) -> Result<()> {
    write_type_sig(w, &field.declaring_type)?;
    w.write_prefixed_string_utf8(&field.name)?;
    write_type_sig(w, &field.field_type)
}

/// Method reference in image encoding, shared with the symbol map format.
pub(crate) fn write_method_ref(w: &mut ByteWriter, method: &MethodRef) -> Result<()> {
    write_type_sig(w, &method.declaring_type)?;
    w.write_prefixed_string_utf8(&method.name)?;
    write_bool(w, method.has_this);
    write_type_sig(w, &method.return_type)?;
    write_sigs(w, &method.params)?;
    w.write_compressed_uint(method.generic_arity)?;
    write_sigs(w, &method.generic_args)
}

fn write_call_site(w: &mut ByteWriter, site: &CallSite) -> Result<()> {
    write_bool(w, site.has_this);
    write_type_sig(w, &site.return_type)?;
    write_sigs(w, &site.params)
}

fn write_method_body(w: &mut ByteWriter, body: &MethodBody) -> Result<()> {
    let positions: HashMap<InstrId, usize> = body
        .instructions()
        .iter()
        .enumerate()
        .map(|(index, instr)| (instr.id, index))
        .collect();
    let index_of = |id: InstrId| -> Result<usize> {
        positions
            .get(&id)
            .copied()
            .ok_or_else(|| Error::Error(format!("Instruction {id} is not part of the body")))
    };

    w.write_le::<u16>(body.max_stack);
    write_bool(w, body.init_locals);
    write_sigs(w, &body.locals)?;

    w.write_count(body.len())?;
    for instr in body.instructions() {
        w.write_le::<u16>(instr.opcode.value());

        match (instr.opcode.operand_type(), &instr.operand) {
            (OperandType::None, Operand::None) => {}
            (OperandType::Int8, Operand::Immediate(Immediate::Int8(value))) => w.write_le::<i8>(*value),
            (OperandType::Int32, Operand::Immediate(Immediate::Int32(value))) => {
                w.write_le::<i32>(*value);
            }
            (OperandType::Int64, Operand::Immediate(Immediate::Int64(value))) => {
                w.write_le::<i64>(*value);
            }
            (OperandType::Float32, Operand::Immediate(Immediate::Float32(value))) => {
                w.write_le::<f32>(*value);
            }
            (OperandType::Float64, Operand::Immediate(Immediate::Float64(value))) => {
                w.write_le::<f64>(*value);
            }
            (OperandType::String, Operand::String(value)) => w.write_prefixed_string_utf8(value)?,
            (OperandType::Type, Operand::Type(sig)) => write_type_sig(w, sig)?,
            (OperandType::Field, Operand::Field(field)) => write_field_ref(w, field)?,
            (OperandType::Method, Operand::Method(method)) => write_method_ref(w, method)?,
            (OperandType::Token, Operand::Type(sig)) => {
                w.write_le::<u8>(TOKEN_KIND::TYPE);
                write_type_sig(w, sig)?;
            }
            (OperandType::Token, Operand::Field(field)) => {
                w.write_le::<u8>(TOKEN_KIND::FIELD);
                write_field_ref(w, field)?;
            }
            (OperandType::Token, Operand::Method(method)) => {
                w.write_le::<u8>(TOKEN_KIND::METHOD);
                write_method_ref(w, method)?;
            }
            (OperandType::Signature, Operand::Signature(site)) => write_call_site(w, site)?,
            (OperandType::ShortLocal | OperandType::Local, Operand::Local(index))
            | (OperandType::ShortArgument | OperandType::Argument, Operand::Argument(index)) => {
                w.write_le::<u16>(*index);
            }
            (OperandType::ShortTarget | OperandType::Target, Operand::Target(target)) => {
                w.write_count(index_of(*target)?)?;
            }
            (OperandType::Switch, Operand::Switch(targets)) => {
                w.write_count(targets.len())?;
                for target in targets {
                    w.write_count(index_of(*target)?)?;
                }
            }
            (_, operand) => {
                return Err(Error::Error(format!(
                    "Operand {:?} does not match opcode {}",
                    operand, instr.opcode
                )))
            }
        }
    }

    w.write_count(body.exception_handlers.len())?;
    for handler in &body.exception_handlers {
        write_exception_handler(w, handler, &index_of)?;
    }
    Ok(())
}

fn write_exception_handler(
    w: &mut ByteWriter,
    handler: &ExceptionHandler,
    index_of: &impl Fn(InstrId) -> Result<usize>,
) -> Result<()> {
    match &handler.kind {
        HandlerKind::Catch(sig) => {
            w.write_le::<u8>(HANDLER_KIND::CATCH);
            write_type_sig(w, sig)?;
        }
        HandlerKind::Filter(start) => {
            w.write_le::<u8>(HANDLER_KIND::FILTER);
            w.write_count(index_of(*start)?)?;
        }
        HandlerKind::Finally => w.write_le::<u8>(HANDLER_KIND::FINALLY),
        HandlerKind::Fault => w.write_le::<u8>(HANDLER_KIND::FAULT),
    }

    // Region ends are optional, stored as index + 1 with 0 meaning "end of body"
    let end = |id: Option<InstrId>| -> Result<usize> {
        match id {
            Some(id) => Ok(index_of(id)? + 1),
            None => Ok(0),
        }
    };

    w.write_count(index_of(handler.try_start)?)?;
    w.write_count(end(handler.try_end)?)?;
    w.write_count(index_of(handler.handler_start)?)?;
    w.write_count(end(handler.handler_end)?)
}
