use crate::{
    assembly::{ExceptionHandler, HandlerKind, Immediate, InstrId, MethodBody, OpCode, Operand, OperandType},
    file::parser::Parser,
    metadata::{
        image::{
            compute_mvid,
            encoder::{ATTR_TAG, HANDLER_KIND, TOKEN_KIND},
            is_image, VERSION,
        },
        members::{
            AttrValue, CustomAttribute, FieldDef, GenericParam, MethodDef, NamedArg, ParamDef,
            PropertyDef, TypeDef,
        },
        module::{AssemblyRef, CilModule, Resource, Version},
        references::{CallSite, FieldRef, MethodRef},
        security::{SecurityAction, SecurityAttribute, SecurityDeclaration},
        typesystem::{
            FieldAttributes, MethodAttributes, ParamAttributes, PropertyAttributes,
            TypeAttributes, TypeRef, TypeSig, ELEMENT_TYPE,
        },
    },
    Error, Result,
};

/// Maximum nesting of recursive structures (type signatures, nested types, enclosing types)
const MAX_NESTING: usize = 64;

/// Decode a module image.
///
/// # Errors
/// Returns [`crate::Error::Empty`] for empty input, [`crate::Error::NotSupported`] if the magic
/// or version do not match, [`crate::Error::Malformed`] if the content is inconsistent (bad
/// checksum, unknown tags, dangling instruction references, trailing data) and
/// [`crate::Error::OutOfBounds`] for truncated images.
pub fn decode(data: &[u8]) -> Result<CilModule> {
    if data.is_empty() {
        return Err(Error::Empty);
    }
    if !is_image(data) {
        return Err(Error::NotSupported);
    }

    let mut parser = Parser::new(data);
    parser.advance_by(8)?;
    if parser.read_le::<u16>()? != VERSION {
        return Err(Error::NotSupported);
    }

    let mut mvid = [0u8; 16];
    mvid.copy_from_slice(parser.read_bytes(16)?);
    let mvid = uguid::Guid::from_bytes(mvid);

    let body = &data[parser.pos()..];
    if compute_mvid(body) != mvid {
        return Err(malformed_error!("Module image checksum does not match its content"));
    }

    let mut decoder = Decoder {
        parser: Parser::new(body),
        depth: 0,
    };
    let mut module = decoder.module()?;
    if decoder.parser.has_more_data() {
        return Err(malformed_error!(
            "{} bytes of trailing data after the module",
            decoder.parser.remaining()
        ));
    }

    module.mvid = mvid;
    Ok(module)
}

/// Read a field reference written by `write_field_ref`, advancing `parser`.
pub(crate) fn read_field_ref(parser: &mut Parser<'_>) -> Result<FieldRef> {
    with_decoder(parser, Decoder::field_ref)
}

/// Read a method reference written by `write_method_ref`, advancing `parser`.
pub(crate) fn read_method_ref(parser: &mut Parser<'_>) -> Result<MethodRef> {
    with_decoder(parser, Decoder::method_ref)
}

fn with_decoder<'a, T>(
    parser: &mut Parser<'a>,
    read: impl FnOnce(&mut Decoder<'a>) -> Result<T>,
) -> Result<T> {
    let mut decoder = Decoder {
        parser: std::mem::replace(parser, Parser::new(&[])),
        depth: 0,
    };
    let result = read(&mut decoder);
    *parser = decoder.parser;
    result
}

struct Decoder<'a> {
    parser: Parser<'a>,
    depth: usize,
}

impl Decoder<'_> {
    fn enter(&mut self) -> Result<()> {
        self.depth += 1;
        if self.depth > MAX_NESTING {
            return Err(malformed_error!("Nesting exceeds {} levels", MAX_NESTING));
        }
        Ok(())
    }

    fn leave(&mut self) {
        self.depth -= 1;
    }

    fn string(&mut self) -> Result<String> {
        self.parser.read_prefixed_string_utf8()
    }

    fn bool(&mut self) -> Result<bool> {
        match self.parser.read_le::<u8>()? {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(malformed_error!("Invalid boolean value {}", other)),
        }
    }

    fn opt_string(&mut self) -> Result<Option<String>> {
        if self.bool()? {
            Ok(Some(self.string()?))
        } else {
            Ok(None)
        }
    }

    fn list<T>(&mut self, mut item: impl FnMut(&mut Self) -> Result<T>) -> Result<Vec<T>> {
        let count = self.parser.read_count()?;
        let mut items = Vec::with_capacity(count);
        for _ in 0..count {
            items.push(item(self)?);
        }
        Ok(items)
    }

    fn version(&mut self) -> Result<Version> {
        Ok(Version {
            major: self.parser.read_le()?,
            minor: self.parser.read_le()?,
            build: self.parser.read_le()?,
            revision: self.parser.read_le()?,
        })
    }

    fn module(&mut self) -> Result<CilModule> {
        let name = self.string()?;
        let version = self.version()?;
        let mut module = CilModule::new(name, version);

        module.assembly_refs = self.list(|d| {
            Ok(AssemblyRef {
                name: d.string()?,
                version: d.version()?,
            })
        })?;
        module.custom_attributes = self.custom_attributes()?;
        module.security_declarations = self.list(Self::security_declaration)?;
        module.resources = self.list(|d| {
            let name = d.string()?;
            let length = d.parser.read_count()?;
            let data = d.parser.read_bytes(length)?.to_vec();
            Ok(Resource { name, data })
        })?;
        module.types = self.list(Self::type_def)?;
        Ok(module)
    }

    fn security_declaration(&mut self) -> Result<SecurityDeclaration> {
        let raw = self.parser.read_le::<u16>()?;
        let action = SecurityAction::from_repr(raw)
            .ok_or_else(|| malformed_error!("Unknown security action {}", raw))?;
        let attributes = self.list(|d| {
            Ok(SecurityAttribute {
                attribute_type: d.type_ref()?,
                named_args: d.named_args()?,
            })
        })?;
        Ok(SecurityDeclaration { action, attributes })
    }

    fn type_def(&mut self) -> Result<TypeDef> {
        self.enter()?;

        let namespace = self.string()?;
        let name = self.string()?;
        let flags = TypeAttributes::from_bits_retain(self.parser.read_le()?);
        let mut def = TypeDef::new(namespace, name, flags);

        if self.bool()? {
            def.base_type = Some(self.type_sig()?);
        }
        def.interfaces = self.sigs()?;
        def.generic_params = self.generic_params()?;
        def.fields = self.list(Self::field_def)?;
        def.methods = self.list(Self::method_def)?;
        def.properties = self.list(Self::property_def)?;
        def.nested_types = self.list(Self::type_def)?;
        def.custom_attributes = self.custom_attributes()?;

        self.leave();
        Ok(def)
    }

    fn generic_params(&mut self) -> Result<Vec<GenericParam>> {
        self.list(|d| {
            Ok(GenericParam {
                name: d.string()?,
                constraints: d.sigs()?,
            })
        })
    }

    fn field_def(&mut self) -> Result<FieldDef> {
        Ok(FieldDef {
            name: self.string()?,
            flags: FieldAttributes::from_bits_retain(self.parser.read_le()?),
            field_type: self.type_sig()?,
            custom_attributes: self.custom_attributes()?,
        })
    }

    fn param_def(&mut self) -> Result<ParamDef> {
        Ok(ParamDef {
            name: self.string()?,
            flags: ParamAttributes::from_bits_retain(self.parser.read_le()?),
            param_type: self.type_sig()?,
            custom_attributes: self.custom_attributes()?,
        })
    }

    fn method_def(&mut self) -> Result<MethodDef> {
        let name = self.string()?;
        let flags = MethodAttributes::from_bits_retain(self.parser.read_le()?);
        let impl_flags = self.parser.read_le()?;
        let return_type = self.type_sig()?;

        let mut method = MethodDef::new(name, flags, return_type);
        method.impl_flags = impl_flags;
        method.params = self.list(Self::param_def)?;
        method.generic_params = self.generic_params()?;
        method.custom_attributes = self.custom_attributes()?;
        if self.bool()? {
            method.body = Some(self.method_body()?);
        }
        Ok(method)
    }

    fn property_def(&mut self) -> Result<PropertyDef> {
        Ok(PropertyDef {
            name: self.string()?,
            flags: PropertyAttributes::from_bits_retain(self.parser.read_le()?),
            has_this: self.bool()?,
            property_type: self.type_sig()?,
            getter: self.opt_string()?,
            setter: self.opt_string()?,
            custom_attributes: self.custom_attributes()?,
        })
    }

    fn custom_attributes(&mut self) -> Result<Vec<CustomAttribute>> {
        self.list(|d| {
            Ok(CustomAttribute {
                ctor: d.method_ref()?,
                fixed_args: d.list(Self::attr_value)?,
                named_args: d.named_args()?,
            })
        })
    }

    fn named_args(&mut self) -> Result<Vec<NamedArg>> {
        self.list(|d| {
            Ok(NamedArg {
                is_field: d.bool()?,
                name: d.string()?,
                value: d.attr_value()?,
            })
        })
    }

    fn attr_value(&mut self) -> Result<AttrValue> {
        Ok(match self.parser.read_le::<u8>()? {
            ATTR_TAG::BOOL => AttrValue::Bool(self.bool()?),
            ATTR_TAG::I4 => AttrValue::I4(self.parser.read_le()?),
            ATTR_TAG::I8 => AttrValue::I8(self.parser.read_le()?),
            ATTR_TAG::R4 => AttrValue::R4(self.parser.read_le()?),
            ATTR_TAG::R8 => AttrValue::R8(self.parser.read_le()?),
            ATTR_TAG::STRING => AttrValue::String(self.opt_string()?),
            ATTR_TAG::TYPE => AttrValue::Type(self.type_sig()?),
            ATTR_TAG::ENUM => AttrValue::Enum {
                enum_type: self.type_ref()?,
                value: self.parser.read_le()?,
            },
            tag => return Err(malformed_error!("Unknown attribute value tag 0x{:02x}", tag)),
        })
    }

    fn type_ref(&mut self) -> Result<TypeRef> {
        self.enter()?;
        let scope = self.string()?;
        let namespace = self.string()?;
        let name = self.string()?;
        let declaring = if self.bool()? {
            Some(Box::new(self.type_ref()?))
        } else {
            None
        };
        self.leave();

        Ok(TypeRef {
            scope,
            namespace,
            name,
            declaring,
        })
    }

    fn sigs(&mut self) -> Result<Vec<TypeSig>> {
        self.list(Self::type_sig)
    }

    fn type_sig(&mut self) -> Result<TypeSig> {
        self.enter()?;
        let sig = match self.parser.read_le::<u8>()? {
            ELEMENT_TYPE::VOID => TypeSig::Void,
            ELEMENT_TYPE::BOOLEAN => TypeSig::Boolean,
            ELEMENT_TYPE::CHAR => TypeSig::Char,
            ELEMENT_TYPE::I1 => TypeSig::I1,
            ELEMENT_TYPE::U1 => TypeSig::U1,
            ELEMENT_TYPE::I2 => TypeSig::I2,
            ELEMENT_TYPE::U2 => TypeSig::U2,
            ELEMENT_TYPE::I4 => TypeSig::I4,
            ELEMENT_TYPE::U4 => TypeSig::U4,
            ELEMENT_TYPE::I8 => TypeSig::I8,
            ELEMENT_TYPE::U8 => TypeSig::U8,
            ELEMENT_TYPE::R4 => TypeSig::R4,
            ELEMENT_TYPE::R8 => TypeSig::R8,
            ELEMENT_TYPE::STRING => TypeSig::String,
            ELEMENT_TYPE::OBJECT => TypeSig::Object,
            ELEMENT_TYPE::I => TypeSig::I,
            ELEMENT_TYPE::U => TypeSig::U,
            ELEMENT_TYPE::TYPEDBYREF => TypeSig::TypedByRef,
            ELEMENT_TYPE::CLASS => TypeSig::Class(self.type_ref()?),
            ELEMENT_TYPE::VALUETYPE => TypeSig::ValueType(self.type_ref()?),
            ELEMENT_TYPE::GENERICINST => {
                let element = self.type_sig()?;
                TypeSig::GenericInst(Box::new(element), self.sigs()?)
            }
            ELEMENT_TYPE::VAR => TypeSig::Var(self.string()?),
            ELEMENT_TYPE::MVAR => TypeSig::MVar(self.string()?),
            ELEMENT_TYPE::SZARRAY => TypeSig::SzArray(Box::new(self.type_sig()?)),
            ELEMENT_TYPE::PTR => TypeSig::Ptr(Box::new(self.type_sig()?)),
            ELEMENT_TYPE::BYREF => TypeSig::ByRef(Box::new(self.type_sig()?)),
            ELEMENT_TYPE::ARRAY => {
                let element = self.type_sig()?;
                TypeSig::Array(Box::new(element), self.parser.read_compressed_uint()?)
            }
            tag => return Err(malformed_error!("Unknown element type 0x{:02x}", tag)),
        };
        self.leave();
        Ok(sig)
    }

    fn field_ref(&mut self) -> Result<FieldRef> {
        Ok(FieldRef {
            declaring_type: self.type_sig()?,
            name: self.string()?,
            field_type: self.type_sig()?,
        })
    }

    fn method_ref(&mut self) -> Result<MethodRef> {
        Ok(MethodRef {
            declaring_type: self.type_sig()?,
            name: self.string()?,
            has_this: self.bool()?,
            return_type: self.type_sig()?,
            params: self.sigs()?,
            generic_arity: self.parser.read_compressed_uint()?,
            generic_args: self.sigs()?,
        })
    }

    fn call_site(&mut self) -> Result<CallSite> {
        Ok(CallSite {
            has_this: self.bool()?,
            return_type: self.type_sig()?,
            params: self.sigs()?,
        })
    }

    fn target(&mut self, count: usize) -> Result<InstrId> {
        let index = self.parser.read_count()?;
        if index >= count {
            return Err(malformed_error!(
                "Instruction index {} out of range, body has {} instructions",
                index,
                count
            ));
        }
        // Instructions are pushed in order into a fresh body, so the id of the
        // instruction at `index` is `index`
        Ok(InstrId(index as u32))
    }

    fn region_end(&mut self, count: usize) -> Result<Option<InstrId>> {
        match self.parser.read_count()? {
            0 => Ok(None),
            end if end <= count => Ok(Some(InstrId((end - 1) as u32))),
            end => Err(malformed_error!("Region end {} out of range", end)),
        }
    }

    fn method_body(&mut self) -> Result<MethodBody> {
        let mut body = MethodBody::new();
        body.max_stack = self.parser.read_le()?;
        body.init_locals = self.bool()?;
        body.locals = self.sigs()?;

        let count = self.parser.read_count()?;
        for _ in 0..count {
            let value = self.parser.read_le::<u16>()?;
            let opcode = OpCode::from_value(value)
                .ok_or_else(|| malformed_error!("Unknown opcode 0x{:04x}", value))?;

            let operand = match opcode.operand_type() {
                OperandType::None => Operand::None,
                OperandType::Int8 => Operand::Immediate(Immediate::Int8(self.parser.read_le()?)),
                OperandType::Int32 => Operand::Immediate(Immediate::Int32(self.parser.read_le()?)),
                OperandType::Int64 => Operand::Immediate(Immediate::Int64(self.parser.read_le()?)),
                OperandType::Float32 => Operand::Immediate(Immediate::Float32(self.parser.read_le()?)),
                OperandType::Float64 => Operand::Immediate(Immediate::Float64(self.parser.read_le()?)),
                OperandType::String => Operand::String(self.string()?),
                OperandType::Type => Operand::Type(self.type_sig()?),
                OperandType::Field => Operand::Field(self.field_ref()?),
                OperandType::Method => Operand::Method(self.method_ref()?),
                OperandType::Token => match self.parser.read_le::<u8>()? {
                    TOKEN_KIND::TYPE => Operand::Type(self.type_sig()?),
                    TOKEN_KIND::FIELD => Operand::Field(self.field_ref()?),
                    TOKEN_KIND::METHOD => Operand::Method(self.method_ref()?),
                    kind => return Err(malformed_error!("Unknown token kind {}", kind)),
                },
                OperandType::Signature => Operand::Signature(self.call_site()?),
                OperandType::ShortLocal | OperandType::Local => Operand::Local(self.parser.read_le()?),
                OperandType::ShortArgument | OperandType::Argument => {
                    Operand::Argument(self.parser.read_le()?)
                }
                OperandType::ShortTarget | OperandType::Target => Operand::Target(self.target(count)?),
                OperandType::Switch => {
                    let targets = self.list(|d| d.target(count))?;
                    Operand::Switch(targets)
                }
            };

            if !opcode.operand_type().accepts(&operand) {
                return Err(malformed_error!("Invalid operand for {}", opcode));
            }
            body.push(opcode, operand);
        }

        body.exception_handlers = self.list(|d| {
            let kind = match d.parser.read_le::<u8>()? {
                HANDLER_KIND::CATCH => HandlerKind::Catch(d.type_sig()?),
                HANDLER_KIND::FILTER => HandlerKind::Filter(d.target(count)?),
                HANDLER_KIND::FINALLY => HandlerKind::Finally,
                HANDLER_KIND::FAULT => HandlerKind::Fault,
                kind => return Err(malformed_error!("Unknown handler kind {}", kind)),
            };
            Ok(ExceptionHandler {
                kind,
                try_start: d.target(count)?,
                try_end: d.region_end(count)?,
                handler_start: d.target(count)?,
                handler_end: d.region_end(count)?,
            })
        })?;

        Ok(body)
    }
}
