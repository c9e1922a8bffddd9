//! Rewriting of one method.

use crate::{
    assembly::MethodBody,
    metadata::{
        members::MethodDef,
        typesystem::{TypeRef, TypeSig},
    },
    weaver::{
        instruction::{operand_mentions, InstructionRewriter},
        reroute::BranchSites,
        WeaveStats,
    },
    Result,
};

/// Reject facade types in the signature of `method`.
///
/// # Errors
/// Returns [`crate::Error::FacadeUsage`] naming the method if its return type, a parameter
/// type or a generic constraint mentions a facade type.
pub fn check_signature(rewriter: &InstructionRewriter<'_>, declaring: &TypeRef, method: &MethodDef) -> Result<()> {
    let is_facade = |type_ref: &TypeRef| rewriter.is_facade(type_ref);

    if method.return_type.mentions(&is_facade) {
        return Err(usage_error!(
            method.full_name(declaring),
            "return type {} is a facade type",
            method.return_type
        ));
    }

    if let Some(param) = method
        .params
        .iter()
        .find(|param| param.param_type.mentions(&is_facade))
    {
        return Err(usage_error!(
            method.full_name(declaring),
            "parameter {} has the facade type {}",
            param.name,
            param.param_type
        ));
    }

    for generic in &method.generic_params {
        if let Some(constraint) = generic.constraints.iter().find(|c| c.mentions(&is_facade)) {
            return Err(usage_error!(
                method.full_name(declaring),
                "generic parameter {} is constrained to the facade type {}",
                generic.name,
                constraint
            ));
        }
    }

    Ok(())
}

/// Returns `true` if an operand or a local of `body` names a facade type.
#[must_use]
pub fn mentions_facade(rewriter: &InstructionRewriter<'_>, body: &MethodBody) -> bool {
    let is_facade = |type_ref: &TypeRef| rewriter.is_facade(type_ref);
    body.locals.iter().any(|local| local.mentions(&is_facade))
        || body
            .instructions()
            .iter()
            .any(|instruction| operand_mentions(&instruction.operand, &is_facade))
}

/// Rewrite `method`, declared by `declaring`.
///
/// Bodies without facade references are left exactly as they are. Other bodies get their
/// facade-typed locals retyped, their macros expanded, every instruction rewritten and their
/// macros optimized again.
///
/// # Errors
/// Returns [`crate::Error::FacadeUsage`] and [`crate::Error::Invariant`] as raised by the
/// signature check and the instruction rewriter.
pub fn rewrite_method(
    rewriter: &InstructionRewriter<'_>,
    declaring: &TypeRef,
    method: &mut MethodDef,
) -> Result<WeaveStats> {
    check_signature(rewriter, declaring, method)?;

    let mut stats = WeaveStats::default();
    if !method
        .body
        .as_ref()
        .is_some_and(|body| mentions_facade(rewriter, body))
    {
        return Ok(stats);
    }

    let owner = method.full_name(declaring);
    let Some(body) = method.body.as_mut() else {
        return Ok(stats);
    };
    let sites = BranchSites::collect(body);

    let is_facade = |type_ref: &TypeRef| rewriter.is_facade(type_ref);
    for local in &mut body.locals {
        if !local.mentions(&is_facade) {
            continue;
        }
        *local = local.try_map_refs(&mut |type_ref| {
            if rewriter.is_facade(type_ref) {
                rewriter
                    .cache()
                    .find_original_type(type_ref)
                    .map(|original| Some(TypeSig::Class(original)))
            } else {
                Ok(None)
            }
        })?;
        stats.locals += 1;
    }

    body.simplify_macros();
    let mut index = 0;
    while index < body.len() {
        index += rewriter.rewrite(&owner, body, &sites, index, &mut stats)?.advance();
    }
    body.optimize_macros();

    if stats.gated > 0 {
        body.max_stack = body.max_stack.saturating_add(1);
    }
    stats.bodies = 1;

    log::debug!("Rewrote {owner}");
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        assembly::{OpCode, Operand},
        facade::{FacadeSynthesizer, SynthesizerConfig},
        metadata::{
            members::GenericParam,
            references::FieldRef,
            typesystem::MethodAttributes,
            CilModule,
        },
        test::TargetBuilder,
        weaver::{cache::SymbolMapCache, WeaverConfig},
        Error,
    };

    fn modules() -> (CilModule, CilModule) {
        let target = TargetBuilder::scenario();
        let facade = FacadeSynthesizer::new(SynthesizerConfig::new("HKReflect"))
            .synthesize(&target)
            .unwrap();
        (target, facade)
    }

    fn facade(namespace: &str, name: &str) -> TypeSig {
        TypeSig::Class(TypeRef::new("HKReflect", namespace, name))
    }

    fn plugin() -> TypeRef {
        TypeRef::new("", "Mod", "Plugin")
    }

    #[test]
    fn signatures_with_facade_types_are_rejected() {
        let (target, facade_module) = modules();
        let config = WeaverConfig::default();
        let cache = SymbolMapCache::new(&facade_module, &target, "HKReflect");
        let rewriter = InstructionRewriter::new(&config, &target, &cache);

        let returns = MethodDef::new("Get", MethodAttributes::PUBLIC, facade("HKReflect.Game", "T"));
        let error = check_signature(&rewriter, &plugin(), &returns).unwrap_err();
        assert!(matches!(&error, Error::FacadeUsage { symbol, .. } if symbol == "HKReflect.Game.T Mod.Plugin::Get()"));

        let takes = MethodDef::new("Set", MethodAttributes::PUBLIC, TypeSig::Void)
            .with_param("value", TypeSig::SzArray(Box::new(facade("HKReflect", "PlayerData"))));
        assert!(check_signature(&rewriter, &plugin(), &takes).is_err());

        let mut constrained = MethodDef::new("Use", MethodAttributes::PUBLIC, TypeSig::Void);
        constrained.generic_params.push(GenericParam {
            name: "U".into(),
            constraints: vec![facade("HKReflect.Game", "T")],
        });
        assert!(check_signature(&rewriter, &plugin(), &constrained).is_err());

        let fine = MethodDef::new("Run", MethodAttributes::PUBLIC, TypeSig::I4).with_param("x", TypeSig::R4);
        assert!(check_signature(&rewriter, &plugin(), &fine).is_ok());
    }

    #[test]
    fn untouched_bodies_keep_their_macros() {
        let (target, facade_module) = modules();
        let config = WeaverConfig::default();
        let cache = SymbolMapCache::new(&facade_module, &target, "HKReflect");
        let rewriter = InstructionRewriter::new(&config, &target, &cache);

        let mut body = MethodBody::new();
        body.push(OpCode::Ldc_I4_S, Operand::Immediate(crate::assembly::Immediate::Int8(4)));
        body.push(OpCode::Ret, Operand::None);
        let mut method = MethodDef::new("Run", MethodAttributes::PUBLIC, TypeSig::I4).with_body(body.clone());

        let stats = rewrite_method(&rewriter, &plugin(), &mut method).unwrap();
        assert_eq!(stats, WeaveStats::default());
        assert_eq!(method.body, Some(body));
        assert!(cache.is_empty().unwrap());
    }

    #[test]
    fn locals_are_retyped_and_stack_grows() {
        let (target, facade_module) = modules();
        let config = WeaverConfig::default();
        let cache = SymbolMapCache::new(&facade_module, &target, "HKReflect");
        let rewriter = InstructionRewriter::new(&config, &target, &cache);

        let mut body = MethodBody::new();
        body.locals.push(facade("HKReflect.Game", "T"));
        body.locals.push(TypeSig::I4);
        body.push(OpCode::Ldloc_0, Operand::None);
        body.push(
            OpCode::Ldfld,
            Operand::Field(FieldRef::new(facade("HKReflect", "PlayerData"), "health", TypeSig::I4)),
        );
        body.push(OpCode::Ret, Operand::None);
        let mut method = MethodDef::new("Run", MethodAttributes::PUBLIC, TypeSig::I4).with_body(body);

        let stats = rewrite_method(&rewriter, &plugin(), &mut method).unwrap();
        assert_eq!(stats.locals, 1);
        assert_eq!(stats.gated, 1);
        assert_eq!(stats.bodies, 1);

        let body = method.body.unwrap();
        assert_eq!(body.locals[0].full_name(), "Game.T");
        assert_eq!(body.locals[0].element_ref().unwrap().scope, "Assembly-CSharp");
        assert_eq!(body.max_stack, 9);
        assert_eq!(body.instructions()[0].opcode, OpCode::Ldloc_0);
        assert_eq!(
            body.instructions()[2].to_string(),
            "callvirt System.Int32 PlayerData::GetInt(System.String)"
        );
    }
}
