//! Rewriting of single instructions.
//!
//! Every instruction whose operand names a facade member is replaced by its equivalent on the
//! target program:
//!
//! | Operand | Declaring type | Result |
//! |---------|----------------|--------|
//! | type | any facade type | usage error |
//! | field | gated type (`ldfld` / `stfld`) | `ldstr name` + `callvirt` accessor |
//! | field | other facade type | original field |
//! | method | `Reflector` | removed |
//! | method | `Singletons` | instance accessor of the singleton |
//! | method | other facade type | original method |

use crate::{
    assembly::{InstrId, MethodBody, OpCode, Operand},
    metadata::{
        references::{FieldRef, MethodRef},
        typesystem::{TypeRef, TypeSig},
        CilModule,
    },
    weaver::{
        cache::SymbolMapCache,
        gated::{Access, GatedAccessors},
        registry::SingletonRegistry,
        reroute::BranchSites,
        WeaveStats, WeaverConfig,
    },
    Result,
};

/// What happened to the instruction at the cursor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// Unchanged or patched in place
    Kept,
    /// One instruction was inserted before it
    Inserted,
    /// Removed from the body
    Removed,
}

impl Step {
    /// Distance from the cursor to the next unprocessed instruction.
    #[must_use]
    pub fn advance(self) -> usize {
        match self {
            Step::Kept => 1,
            Step::Inserted => 2,
            Step::Removed => 0,
        }
    }
}

/// Returns `true` if `operand` names a type satisfying `is_facade` anywhere in its signature.
pub fn operand_mentions(operand: &Operand, is_facade: &impl Fn(&TypeRef) -> bool) -> bool {
    match operand {
        Operand::Type(sig) => sig.mentions(is_facade),
        Operand::Field(field) => field_mentions(field, is_facade),
        Operand::Method(method) => method_mentions(method, is_facade),
        Operand::Signature(site) => {
            site.return_type.mentions(is_facade) || site.params.iter().any(|p| p.mentions(is_facade))
        }
        _ => false,
    }
}

fn field_mentions(field: &FieldRef, is_facade: &impl Fn(&TypeRef) -> bool) -> bool {
    field.declaring_type.mentions(is_facade) || field.field_type.mentions(is_facade)
}

fn method_mentions(method: &MethodRef, is_facade: &impl Fn(&TypeRef) -> bool) -> bool {
    method.declaring_type.mentions(is_facade)
        || method.return_type.mentions(is_facade)
        || method
            .params
            .iter()
            .chain(&method.generic_args)
            .any(|sig| sig.mentions(is_facade))
}

/// Shared, read-only state of the instruction rewriter.
pub struct InstructionRewriter<'a> {
    root: &'a str,
    reflector: String,
    singletons: String,
    gated_name: String,
    cache: &'a SymbolMapCache<'a>,
    registry: SingletonRegistry<'a>,
    gated: Option<GatedAccessors<'a>>,
}

impl<'a> InstructionRewriter<'a> {
    /// Rewriter for facade symbols under `config.facade_namespace`.
    #[must_use]
    pub fn new(config: &'a WeaverConfig, target: &'a CilModule, cache: &'a SymbolMapCache<'a>) -> Self {
        let root = config.facade_namespace.as_str();
        InstructionRewriter {
            root,
            reflector: format!("{root}.{}", crate::facade::REFLECTOR),
            singletons: format!("{root}.{}", crate::facade::SINGLETONS),
            gated_name: format!("{root}.{}", config.gated_type),
            cache,
            registry: SingletonRegistry::new(target, &config.singletons),
            gated: GatedAccessors::new(target, &config.gated_type),
        }
    }

    /// Returns `true` for types of the facade module.
    #[must_use]
    pub fn is_facade(&self, type_ref: &TypeRef) -> bool {
        type_ref.is_in_namespace(self.root)
    }

    /// The symbol map cache backing this rewriter.
    #[must_use]
    pub fn cache(&self) -> &SymbolMapCache<'a> {
        self.cache
    }

    /// The facade type declaring a member, `None` for members of other types.
    fn facade_declaring<'s>(&self, declaring: &'s TypeSig) -> Option<&'s TypeRef> {
        declaring.element_ref().filter(|type_ref| self.is_facade(type_ref))
    }

    /// Rewrite the instruction at `index` of `body`, a body of the method `owner`.
    ///
    /// # Errors
    /// Returns [`crate::Error::FacadeUsage`] for facade types the rewriter can not replace and
    /// [`crate::Error::Invariant`] when the facade module does not match the target.
    pub fn rewrite(
        &self,
        owner: &str,
        body: &mut MethodBody,
        sites: &BranchSites,
        index: usize,
        stats: &mut WeaveStats,
    ) -> Result<Step> {
        let Some(instruction) = body.get(index) else {
            return Ok(Step::Kept);
        };
        let is_facade = |type_ref: &TypeRef| self.is_facade(type_ref);
        if !operand_mentions(&instruction.operand, &is_facade) {
            return Ok(Step::Kept);
        }

        let (id, opcode) = (instruction.id, instruction.opcode);
        match instruction.operand.clone() {
            Operand::Field(field) => self.rewrite_field(owner, body, sites, index, id, opcode, &field, stats),
            Operand::Method(method) => self.rewrite_method(owner, body, sites, index, id, &method, stats),
            operand => Err(usage_error!(
                owner,
                "operand of {} names a facade type ({}), use the original type instead",
                opcode,
                operand_display(&operand)
            )),
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn rewrite_field(
        &self,
        owner: &str,
        body: &mut MethodBody,
        sites: &BranchSites,
        index: usize,
        id: InstrId,
        opcode: OpCode,
        field: &FieldRef,
        stats: &mut WeaveStats,
    ) -> Result<Step> {
        let Some(declaring) = self.facade_declaring(&field.declaring_type) else {
            return Err(usage_error!(
                owner,
                "{} {} has a facade type in its signature",
                opcode,
                field.full_name()
            ));
        };
        let original = self.cache.find_original_field(declaring, field)?;

        // Static and address accesses of the gated type keep a plain field operand
        let access = if declaring.full_name() == self.gated_name {
            Access::of(opcode)
        } else {
            None
        };
        let Some(access) = access else {
            set_operand(body, id, opcode, Operand::Field(original));
            stats.fields += 1;
            return Ok(Step::Kept);
        };

        let gated = self.gated.as_ref().ok_or_else(|| {
            invariant_error!(self.gated_name, "gated type does not exist in the target")
        })?;
        let accessor = gated.accessor(access, &original)?;

        let name = body.insert_at(index, OpCode::Ldstr, Operand::String(field.name.clone()))?;
        sites.reroute(body, id, name);
        set_operand(body, id, OpCode::Callvirt, Operand::Method(accessor));
        stats.gated += 1;
        Ok(Step::Inserted)
    }

    #[allow(clippy::too_many_arguments)]
    fn rewrite_method(
        &self,
        owner: &str,
        body: &mut MethodBody,
        sites: &BranchSites,
        index: usize,
        id: InstrId,
        method: &MethodRef,
        stats: &mut WeaveStats,
    ) -> Result<Step> {
        let Some(declaring) = self.facade_declaring(&method.declaring_type) else {
            return Err(usage_error!(
                owner,
                "call of {} has a facade type in its signature",
                method.full_name()
            ));
        };
        let declaring_name = declaring.full_name();

        if declaring_name == self.reflector {
            let next = body.get(index + 1).map(|next| next.id).ok_or_else(|| {
                invariant_error!(method.full_name(), "conversion is the last instruction of {}", owner)
            })?;
            sites.reroute(body, id, next);
            body.remove(id)?;
            stats.conversions += 1;
            return Ok(Step::Removed);
        }

        if declaring_name == self.singletons {
            let facade_name = method.return_type.full_name();
            let type_name = facade_name
                .strip_prefix(self.root)
                .and_then(|rest| rest.strip_prefix('.'))
                .ok_or_else(|| invariant_error!(method.full_name(), "accessor does not return a facade type"))?;
            let (opcode, operand) = self.registry.accessor(type_name)?;
            set_operand(body, id, opcode, operand);
            stats.singletons += 1;
            return Ok(Step::Kept);
        }

        let original = self.cache.find_original_method(declaring, method)?;
        if let Some(instruction) = body.instruction_mut(id) {
            instruction.operand = Operand::Method(original);
        }
        stats.methods += 1;
        Ok(Step::Kept)
    }
}

fn set_operand(body: &mut MethodBody, id: InstrId, opcode: OpCode, operand: Operand) {
    if let Some(instruction) = body.instruction_mut(id) {
        instruction.opcode = opcode;
        instruction.operand = operand;
    }
}

fn operand_display(operand: &Operand) -> String {
    match operand {
        Operand::Type(sig) => sig.full_name(),
        Operand::Signature(site) => site.to_string(),
        _ => String::new(),
    }
}
