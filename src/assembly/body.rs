//! Editable CIL method bodies.
//!
//! A [`MethodBody`] is an ordered list of [`Instruction`]s plus locals and exception handlers.
//! Branches and handler boundaries reference instructions by [`InstrId`], which makes the body
//! safe to edit: inserting or removing an instruction never invalidates another instruction's
//! operand. Byte offsets are derived from the current instruction list whenever needed.
//!
//! # Macro forms
//!
//! Many opcodes exist in a short "macro" form (`ldloc.0`, `ldc.i4.s`, `br.s`). Editors first
//! call [`MethodBody::simplify_macros`] to expand everything to the general form, so that
//! later edits can not push a short branch out of range, and finish with
//! [`MethodBody::optimize_macros`] which picks the smallest valid encoding again.
//!
//! # Examples
//!
//! ```rust
//! use cilfacade::assembly::{MethodBody, OpCode, Operand};
//!
//! let mut body = MethodBody::new();
//! let ret = body.push(OpCode::Ret, Operand::None);
//! body.insert_before(ret, OpCode::Ldc_I4_0, Operand::None)?;
//! body.insert_before(ret, OpCode::Pop, Operand::None)?;
//!
//! assert_eq!(body.len(), 3);
//! assert_eq!(body.code_size(), 3);
//! # Ok::<(), cilfacade::Error>(())
//! ```

use std::collections::HashMap;

use crate::{
    assembly::{Immediate, InstrId, Instruction, OpCode, Operand},
    metadata::typesystem::TypeSig,
    Error, Result,
};

/// The kind of an exception handler clause.
#[derive(Debug, Clone, PartialEq)]
pub enum HandlerKind {
    /// Typed catch clause
    Catch(TypeSig),
    /// Filter clause, the filter code starts at the given instruction
    Filter(InstrId),
    /// Finally clause
    Finally,
    /// Fault clause
    Fault,
}

/// An exception handler clause.
///
/// Region ends are exclusive; `None` means the region extends to the end of the body.
#[derive(Debug, Clone, PartialEq)]
pub struct ExceptionHandler {
    /// Clause kind
    pub kind: HandlerKind,
    /// First instruction of the protected region
    pub try_start: InstrId,
    /// First instruction after the protected region
    pub try_end: Option<InstrId>,
    /// First instruction of the handler
    pub handler_start: InstrId,
    /// First instruction after the handler
    pub handler_end: Option<InstrId>,
}

impl ExceptionHandler {
    /// Every instruction id this clause references, including filter starts.
    pub fn boundaries_mut(&mut self) -> impl Iterator<Item = &mut InstrId> {
        let filter = match &mut self.kind {
            HandlerKind::Filter(start) => Some(start),
            _ => None,
        };

        [Some(&mut self.try_start), Some(&mut self.handler_start)]
            .into_iter()
            .chain([self.try_end.as_mut(), self.handler_end.as_mut(), filter])
            .flatten()
    }

    /// Returns `true` if this clause references `id`.
    #[must_use]
    pub fn references(&self, id: InstrId) -> bool {
        self.try_start == id
            || self.handler_start == id
            || self.try_end == Some(id)
            || self.handler_end == Some(id)
            || matches!(self.kind, HandlerKind::Filter(start) if start == id)
    }
}

/// A CIL method body.
///
/// Two bodies are equal when they hold the same instructions, locals and handlers; instruction
/// ids only matter through the instructions they designate.
#[derive(Debug, Clone)]
pub struct MethodBody {
    /// Maximum evaluation stack depth
    pub max_stack: u16,
    /// Zero-initialize locals on entry
    pub init_locals: bool,
    /// Local variable types
    pub locals: Vec<TypeSig>,
    /// Exception handler clauses
    pub exception_handlers: Vec<ExceptionHandler>,
    instructions: Vec<Instruction>,
    next_id: u32,
}

impl Default for MethodBody {
    fn default() -> Self {
        Self::new()
    }
}

impl MethodBody {
    /// Create an empty body with the default stack depth of 8.
    #[must_use]
    pub fn new() -> Self {
        MethodBody {
            max_stack: 8,
            init_locals: false,
            locals: Vec::new(),
            exception_handlers: Vec::new(),
            instructions: Vec::new(),
            next_id: 0,
        }
    }

    /// Number of instructions
    #[must_use]
    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    /// Returns `true` if the body has no instructions
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    /// The instructions in execution order
    #[must_use]
    pub fn instructions(&self) -> &[Instruction] {
        &self.instructions
    }

    /// Instruction at `index`
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&Instruction> {
        self.instructions.get(index)
    }

    /// Mutable instruction at `index`
    pub fn get_mut(&mut self, index: usize) -> Option<&mut Instruction> {
        self.instructions.get_mut(index)
    }

    /// Position of the instruction `id`
    #[must_use]
    pub fn index_of(&self, id: InstrId) -> Option<usize> {
        self.instructions.iter().position(|instr| instr.id == id)
    }

    /// Instruction with the given id
    #[must_use]
    pub fn instruction(&self, id: InstrId) -> Option<&Instruction> {
        self.instructions.iter().find(|instr| instr.id == id)
    }

    /// Mutable instruction with the given id
    pub fn instruction_mut(&mut self, id: InstrId) -> Option<&mut Instruction> {
        self.instructions.iter_mut().find(|instr| instr.id == id)
    }

    fn allocate_id(&mut self) -> InstrId {
        let id = InstrId(self.next_id);
        self.next_id += 1;
        id
    }

    /// Append an instruction and return its id.
    pub fn push(&mut self, opcode: OpCode, operand: Operand) -> InstrId {
        let id = self.allocate_id();
        self.instructions.push(Instruction { id, opcode, operand });
        id
    }

    /// Insert an instruction at `index`, shifting the following instructions back.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if `index` is past the end of the body.
    pub fn insert_at(&mut self, index: usize, opcode: OpCode, operand: Operand) -> Result<InstrId> {
        if index > self.instructions.len() {
            return Err(out_of_bounds_error!());
        }

        let id = self.allocate_id();
        self.instructions.insert(index, Instruction { id, opcode, operand });
        Ok(id)
    }

    /// Insert an instruction directly before `anchor`.
    ///
    /// Branches targeting `anchor` keep targeting `anchor`.
    ///
    /// # Errors
    /// Returns [`crate::Error::Error`] if `anchor` is not part of this body.
    pub fn insert_before(&mut self, anchor: InstrId, opcode: OpCode, operand: Operand) -> Result<InstrId> {
        let index = self
            .index_of(anchor)
            .ok_or_else(|| Error::Error(format!("Instruction {anchor} is not part of this body")))?;
        self.insert_at(index, opcode, operand)
    }

    /// Remove the instruction `id`.
    ///
    /// # Errors
    /// Returns [`crate::Error::Error`] if `id` is not part of this body, or if a branch or
    /// exception handler still references it.
    pub fn remove(&mut self, id: InstrId) -> Result<Instruction> {
        let index = self
            .index_of(id)
            .ok_or_else(|| Error::Error(format!("Instruction {id} is not part of this body")))?;

        let referenced = self
            .instructions
            .iter()
            .any(|instr| instr.operand.targets().contains(&id))
            || self.exception_handlers.iter().any(|eh| eh.references(id));
        if referenced {
            return Err(Error::Error(format!(
                "Instruction {id} is still referenced and can not be removed"
            )));
        }

        Ok(self.instructions.remove(index))
    }

    /// Byte offset of every instruction, in order.
    #[must_use]
    pub fn offsets(&self) -> Vec<u32> {
        let mut offset = 0;
        self.instructions
            .iter()
            .map(|instr| {
                let current = offset;
                offset += instr.size();
                current
            })
            .collect()
    }

    /// Encoded size of the instruction stream in bytes
    #[must_use]
    pub fn code_size(&self) -> u32 {
        self.instructions.iter().map(Instruction::size).sum()
    }

    /// Expand every macro form into its general form.
    ///
    /// Short branches become long branches, `ldarg.N` / `ldloc.N` / `stloc.N` and their `.s`
    /// variants take an explicit index, and every `ldc.i4` shortcut becomes `ldc.i4 <value>`.
    pub fn simplify_macros(&mut self) {
        for instr in &mut self.instructions {
            let (opcode, operand) = match (instr.opcode, &instr.operand) {
                (OpCode::Ldarg_0, _) => (OpCode::Ldarg, Operand::Argument(0)),
                (OpCode::Ldarg_1, _) => (OpCode::Ldarg, Operand::Argument(1)),
                (OpCode::Ldarg_2, _) => (OpCode::Ldarg, Operand::Argument(2)),
                (OpCode::Ldarg_3, _) => (OpCode::Ldarg, Operand::Argument(3)),
                (OpCode::Ldloc_0, _) => (OpCode::Ldloc, Operand::Local(0)),
                (OpCode::Ldloc_1, _) => (OpCode::Ldloc, Operand::Local(1)),
                (OpCode::Ldloc_2, _) => (OpCode::Ldloc, Operand::Local(2)),
                (OpCode::Ldloc_3, _) => (OpCode::Ldloc, Operand::Local(3)),
                (OpCode::Stloc_0, _) => (OpCode::Stloc, Operand::Local(0)),
                (OpCode::Stloc_1, _) => (OpCode::Stloc, Operand::Local(1)),
                (OpCode::Stloc_2, _) => (OpCode::Stloc, Operand::Local(2)),
                (OpCode::Stloc_3, _) => (OpCode::Stloc, Operand::Local(3)),
                (OpCode::Ldarg_S, operand) => (OpCode::Ldarg, operand.clone()),
                (OpCode::Ldarga_S, operand) => (OpCode::Ldarga, operand.clone()),
                (OpCode::Starg_S, operand) => (OpCode::Starg, operand.clone()),
                (OpCode::Ldloc_S, operand) => (OpCode::Ldloc, operand.clone()),
                (OpCode::Ldloca_S, operand) => (OpCode::Ldloca, operand.clone()),
                (OpCode::Stloc_S, operand) => (OpCode::Stloc, operand.clone()),
                (OpCode::Ldc_I4_M1, _) => (OpCode::Ldc_I4, int32(-1)),
                (OpCode::Ldc_I4_0, _) => (OpCode::Ldc_I4, int32(0)),
                (OpCode::Ldc_I4_1, _) => (OpCode::Ldc_I4, int32(1)),
                (OpCode::Ldc_I4_2, _) => (OpCode::Ldc_I4, int32(2)),
                (OpCode::Ldc_I4_3, _) => (OpCode::Ldc_I4, int32(3)),
                (OpCode::Ldc_I4_4, _) => (OpCode::Ldc_I4, int32(4)),
                (OpCode::Ldc_I4_5, _) => (OpCode::Ldc_I4, int32(5)),
                (OpCode::Ldc_I4_6, _) => (OpCode::Ldc_I4, int32(6)),
                (OpCode::Ldc_I4_7, _) => (OpCode::Ldc_I4, int32(7)),
                (OpCode::Ldc_I4_8, _) => (OpCode::Ldc_I4, int32(8)),
                (OpCode::Ldc_I4_S, Operand::Immediate(Immediate::Int8(value))) => {
                    (OpCode::Ldc_I4, int32(i32::from(*value)))
                }
                (opcode, operand) => match opcode.long_branch() {
                    Some(long) => (long, operand.clone()),
                    None => continue,
                },
            };

            instr.opcode = opcode;
            instr.operand = operand;
        }
    }

    /// Select the smallest encoding for every instruction that has a macro form.
    ///
    /// Branch distances are measured on the offsets before any instruction shrinks. Shrinking
    /// only ever brings a branch closer to its target, so a branch that fits a 1-byte offset
    /// still fits after the pass. `switch` has no short form.
    pub fn optimize_macros(&mut self) {
        for instr in &mut self.instructions {
            let replacement = match (instr.opcode, &instr.operand) {
                (OpCode::Ldarg, Operand::Argument(index)) => Some(match index {
                    0 => (OpCode::Ldarg_0, Operand::None),
                    1 => (OpCode::Ldarg_1, Operand::None),
                    2 => (OpCode::Ldarg_2, Operand::None),
                    3 => (OpCode::Ldarg_3, Operand::None),
                    _ if *index <= 255 => (OpCode::Ldarg_S, Operand::Argument(*index)),
                    _ => continue,
                }),
                (OpCode::Ldloc, Operand::Local(index)) => Some(match index {
                    0 => (OpCode::Ldloc_0, Operand::None),
                    1 => (OpCode::Ldloc_1, Operand::None),
                    2 => (OpCode::Ldloc_2, Operand::None),
                    3 => (OpCode::Ldloc_3, Operand::None),
                    _ if *index <= 255 => (OpCode::Ldloc_S, Operand::Local(*index)),
                    _ => continue,
                }),
                (OpCode::Stloc, Operand::Local(index)) => Some(match index {
                    0 => (OpCode::Stloc_0, Operand::None),
                    1 => (OpCode::Stloc_1, Operand::None),
                    2 => (OpCode::Stloc_2, Operand::None),
                    3 => (OpCode::Stloc_3, Operand::None),
                    _ if *index <= 255 => (OpCode::Stloc_S, Operand::Local(*index)),
                    _ => continue,
                }),
                (OpCode::Ldarga, Operand::Argument(index)) if *index <= 255 => {
                    Some((OpCode::Ldarga_S, Operand::Argument(*index)))
                }
                (OpCode::Starg, Operand::Argument(index)) if *index <= 255 => {
                    Some((OpCode::Starg_S, Operand::Argument(*index)))
                }
                (OpCode::Ldloca, Operand::Local(index)) if *index <= 255 => {
                    Some((OpCode::Ldloca_S, Operand::Local(*index)))
                }
                (OpCode::Ldc_I4, Operand::Immediate(Immediate::Int32(value))) => Some(match value {
                    -1 => (OpCode::Ldc_I4_M1, Operand::None),
                    0 => (OpCode::Ldc_I4_0, Operand::None),
                    1 => (OpCode::Ldc_I4_1, Operand::None),
                    2 => (OpCode::Ldc_I4_2, Operand::None),
                    3 => (OpCode::Ldc_I4_3, Operand::None),
                    4 => (OpCode::Ldc_I4_4, Operand::None),
                    5 => (OpCode::Ldc_I4_5, Operand::None),
                    6 => (OpCode::Ldc_I4_6, Operand::None),
                    7 => (OpCode::Ldc_I4_7, Operand::None),
                    8 => (OpCode::Ldc_I4_8, Operand::None),
                    _ => match i8::try_from(*value) {
                        Ok(short) => (OpCode::Ldc_I4_S, Operand::Immediate(Immediate::Int8(short))),
                        Err(_) => continue,
                    },
                }),
                _ => None,
            };

            if let Some((opcode, operand)) = replacement {
                instr.opcode = opcode;
                instr.operand = operand;
            }
        }

        self.optimize_branches();
    }

    fn optimize_branches(&mut self) {
        let offsets = self.offsets();
        let shrink: Vec<usize> = self
            .instructions
            .iter()
            .enumerate()
            .filter_map(|(index, instr)| {
                instr.opcode.short_branch()?;
                let Operand::Target(target) = instr.operand else {
                    return None;
                };
                let target_index = self.index_of(target)?;
                let delta = i64::from(offsets[target_index]) - (i64::from(offsets[index]) + 2);
                i8::try_from(delta).ok().map(|_| index)
            })
            .collect();

        for index in shrink {
            if let Some(short) = self.instructions[index].opcode.short_branch() {
                self.instructions[index].opcode = short;
            }
        }
    }
}

impl PartialEq for MethodBody {
    fn eq(&self, other: &Self) -> bool {
        if self.max_stack != other.max_stack
            || self.init_locals != other.init_locals
            || self.locals != other.locals
            || self.instructions.len() != other.instructions.len()
            || self.exception_handlers.len() != other.exception_handlers.len()
        {
            return false;
        }

        let ours = self.positions();
        let theirs = other.positions();
        let same_target = |a: &InstrId, b: &InstrId| ours.get(a) == theirs.get(b);
        let same_bound = |a: &Option<InstrId>, b: &Option<InstrId>| match (a, b) {
            (Some(a), Some(b)) => same_target(a, b),
            (None, None) => true,
            _ => false,
        };

        let instructions = self.instructions.iter().zip(&other.instructions).all(|(a, b)| {
            a.opcode == b.opcode
                && match (&a.operand, &b.operand) {
                    (Operand::Target(x), Operand::Target(y)) => same_target(x, y),
                    (Operand::Switch(x), Operand::Switch(y)) => {
                        x.len() == y.len() && x.iter().zip(y).all(|(x, y)| same_target(x, y))
                    }
                    (x, y) => x == y,
                }
        });

        instructions
            && self
                .exception_handlers
                .iter()
                .zip(&other.exception_handlers)
                .all(|(a, b)| {
                    let kind = match (&a.kind, &b.kind) {
                        (HandlerKind::Filter(x), HandlerKind::Filter(y)) => same_target(x, y),
                        (x, y) => x == y,
                    };
                    kind && same_target(&a.try_start, &b.try_start)
                        && same_target(&a.handler_start, &b.handler_start)
                        && same_bound(&a.try_end, &b.try_end)
                        && same_bound(&a.handler_end, &b.handler_end)
                })
    }
}

impl MethodBody {
    fn positions(&self) -> HashMap<InstrId, usize> {
        self.instructions
            .iter()
            .enumerate()
            .map(|(index, instr)| (instr.id, index))
            .collect()
    }
}

fn int32(value: i32) -> Operand {
    Operand::Immediate(Immediate::Int32(value))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_keeps_ids_stable() {
        let mut body = MethodBody::new();
        let first = body.push(OpCode::Ldarg_0, Operand::None);
        let ret = body.push(OpCode::Ret, Operand::None);

        let nop = body.insert_before(ret, OpCode::Nop, Operand::None).unwrap();
        assert_eq!(body.index_of(first), Some(0));
        assert_eq!(body.index_of(nop), Some(1));
        assert_eq!(body.index_of(ret), Some(2));
        assert_ne!(nop, first);
        assert_ne!(nop, ret);

        assert!(body.insert_at(10, OpCode::Nop, Operand::None).is_err());
    }

    #[test]
    fn remove_refuses_referenced_instructions() {
        let mut body = MethodBody::new();
        let target = body.push(OpCode::Nop, Operand::None);
        let branch = body.push(OpCode::Br_S, Operand::Target(target));

        assert!(body.remove(target).is_err());

        body.get_mut(1).unwrap().operand = Operand::Target(branch);
        let removed = body.remove(target).unwrap();
        assert_eq!(removed.opcode, OpCode::Nop);
        assert_eq!(body.len(), 1);
    }

    #[test]
    fn remove_refuses_handler_boundaries() {
        let mut body = MethodBody::new();
        let start = body.push(OpCode::Nop, Operand::None);
        let handler = body.push(OpCode::Endfinally, Operand::None);
        body.exception_handlers.push(ExceptionHandler {
            kind: HandlerKind::Finally,
            try_start: start,
            try_end: Some(handler),
            handler_start: handler,
            handler_end: None,
        });

        assert!(body.remove(start).is_err());
        assert!(body.remove(handler).is_err());
    }

    #[test]
    fn equality_ignores_ids() {
        let mut pushed = MethodBody::new();
        let ret = pushed.push(OpCode::Ret, Operand::None);
        pushed.insert_before(ret, OpCode::Br, Operand::Target(ret)).unwrap();

        let mut direct = MethodBody::new();
        direct.push(OpCode::Br, Operand::Target(InstrId(1)));
        direct.push(OpCode::Ret, Operand::None);

        assert_eq!(pushed, direct);

        direct.get_mut(0).unwrap().operand = Operand::Target(InstrId(0));
        assert_ne!(pushed, direct);
    }

    #[test]
    fn offsets_follow_sizes() {
        let mut body = MethodBody::new();
        body.push(OpCode::Ldc_I4_S, Operand::Immediate(Immediate::Int8(5)));
        body.push(OpCode::Ldloc, Operand::Local(7));
        body.push(OpCode::Ret, Operand::None);
        assert_eq!(body.offsets(), vec![0, 2, 6]);
        assert_eq!(body.code_size(), 7);
    }

    #[test]
    fn simplify_expands_macros() {
        let mut body = MethodBody::new();
        let ret = body.push(OpCode::Ret, Operand::None);
        body.insert_before(ret, OpCode::Ldarg_1, Operand::None).unwrap();
        body.insert_before(ret, OpCode::Ldc_I4_S, Operand::Immediate(Immediate::Int8(-7))).unwrap();
        body.insert_before(ret, OpCode::Brtrue_S, Operand::Target(ret)).unwrap();
        body.insert_before(ret, OpCode::Stloc_S, Operand::Local(9)).unwrap();

        body.simplify_macros();

        let opcodes: Vec<_> = body.instructions().iter().map(|i| i.opcode).collect();
        assert_eq!(
            opcodes,
            vec![OpCode::Ldarg, OpCode::Ldc_I4, OpCode::Brtrue, OpCode::Stloc, OpCode::Ret]
        );
        assert_eq!(body.get(0).unwrap().operand, Operand::Argument(1));
        assert_eq!(body.get(1).unwrap().operand, int32(-7));
        assert_eq!(body.get(2).unwrap().operand, Operand::Target(ret));
    }

    #[test]
    fn optimize_restores_macros() {
        let mut body = MethodBody::new();
        let ret = body.push(OpCode::Ret, Operand::None);
        body.insert_before(ret, OpCode::Ldarg_0, Operand::None).unwrap();
        body.insert_before(ret, OpCode::Ldloc_S, Operand::Local(4)).unwrap();
        body.insert_before(ret, OpCode::Ldc_I4_S, Operand::Immediate(Immediate::Int8(100))).unwrap();
        body.insert_before(ret, OpCode::Ldc_I4_2, Operand::None).unwrap();
        body.insert_before(ret, OpCode::Br_S, Operand::Target(ret)).unwrap();
        let original = body.clone();

        body.simplify_macros();
        assert_ne!(body, original);
        body.optimize_macros();
        assert_eq!(body, original);
    }

    #[test]
    fn optimize_keeps_far_branches_long() {
        let mut body = MethodBody::new();
        let start = body.push(OpCode::Nop, Operand::None);
        let far = body.push(OpCode::Br, Operand::Target(start));
        let near = body.push(OpCode::Br, Operand::Target(far));
        for _ in 0..200 {
            body.push(OpCode::Nop, Operand::None);
        }
        let back = body.push(OpCode::Br, Operand::Target(start));
        let table = body.push(OpCode::Switch, Operand::Switch(vec![start]));
        body.push(OpCode::Ldc_I4, int32(1000));
        body.push(OpCode::Ldloc, Operand::Local(300));

        body.optimize_macros();

        assert_eq!(body.instruction(far).unwrap().opcode, OpCode::Br_S);
        assert_eq!(body.instruction(near).unwrap().opcode, OpCode::Br_S);
        assert_eq!(body.instruction(back).unwrap().opcode, OpCode::Br);
        assert_eq!(body.instruction(table).unwrap().opcode, OpCode::Switch);

        let tail: Vec<_> = body.instructions()[body.len() - 2..].iter().map(|i| i.opcode).collect();
        assert_eq!(tail, vec![OpCode::Ldc_I4, OpCode::Ldloc]);
    }

    #[test]
    fn short_branch_boundary() {
        fn forward_branch(gap: usize) -> OpCode {
            let mut body = MethodBody::new();
            let branch = body.push(OpCode::Br, Operand::Target(InstrId(u32::MAX)));
            for _ in 0..gap {
                body.push(OpCode::Nop, Operand::None);
            }
            let target = body.push(OpCode::Ret, Operand::None);
            body.get_mut(0).unwrap().operand = Operand::Target(target);

            body.optimize_macros();
            body.instruction(branch).unwrap().opcode
        }

        // measured as if the branch were already short: 5 + gap - 2
        assert_eq!(forward_branch(124), OpCode::Br_S);
        assert_eq!(forward_branch(125), OpCode::Br);
    }
}
