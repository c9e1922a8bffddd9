//! Control-flow edge maintenance.
//!
//! When an instruction is replaced by a sequence that starts somewhere else, or removed
//! altogether, every edge pointing at it has to move. Edges live in branch operands (single
//! targets and switch tables) and in exception handler boundaries.

use std::collections::HashSet;

use crate::assembly::{InstrId, MethodBody};

/// The branch instructions of one body, collected once before rewriting starts.
///
/// Instructions inserted by the rewriter are never branches, so the set stays complete for
/// the lifetime of the rewrite.
#[derive(Debug, Default)]
pub struct BranchSites {
    sites: HashSet<InstrId>,
}

impl BranchSites {
    /// Collect every branch, conditional branch, `switch` and `leave` of `body`.
    #[must_use]
    pub fn collect(body: &MethodBody) -> Self {
        BranchSites {
            sites: body
                .instructions()
                .iter()
                .filter(|instruction| instruction.opcode.is_branch())
                .map(|instruction| instruction.id)
                .collect(),
        }
    }

    /// Number of branch instructions
    #[must_use]
    pub fn len(&self) -> usize {
        self.sites.len()
    }

    /// Returns `true` if the body has no branches
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sites.is_empty()
    }

    /// Redirect every edge that targets `from` to `to`.
    ///
    /// Must run while `from` is still part of the body. Returns the number of edges moved.
    pub fn reroute(&self, body: &mut MethodBody, from: InstrId, to: InstrId) -> usize {
        let mut moved = 0;

        for &site in &self.sites {
            let Some(instruction) = body.instruction_mut(site) else {
                continue;
            };
            for target in instruction.operand.targets_mut() {
                if *target == from {
                    *target = to;
                    moved += 1;
                }
            }
        }

        for handler in &mut body.exception_handlers {
            for boundary in handler.boundaries_mut() {
                if *boundary == from {
                    *boundary = to;
                    moved += 1;
                }
            }
        }

        moved
    }
}

/// Returns `true` if any branch or handler of `body` references `id`.
#[must_use]
pub fn is_referenced(body: &MethodBody, id: InstrId) -> bool {
    body.instructions()
        .iter()
        .any(|instruction| instruction.operand.targets().contains(&id))
        || body.exception_handlers.iter().any(|handler| handler.references(id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assembly::{ExceptionHandler, HandlerKind, OpCode, Operand};

    #[test]
    fn reroutes_branches_switches_and_handlers() {
        let mut body = MethodBody::new();
        let first = body.push(OpCode::Nop, Operand::None);
        let marker = body.push(OpCode::Call, Operand::None);
        let next = body.push(OpCode::Ret, Operand::None);
        let branch = body.insert_at(0, OpCode::Br, Operand::Target(marker)).unwrap();
        let switch = body
            .insert_at(0, OpCode::Switch, Operand::Switch(vec![first, marker, marker]))
            .unwrap();
        body.exception_handlers.push(ExceptionHandler {
            kind: HandlerKind::Finally,
            try_start: first,
            try_end: Some(marker),
            handler_start: marker,
            handler_end: None,
        });

        let sites = BranchSites::collect(&body);
        assert_eq!(sites.len(), 2);
        assert_eq!(sites.reroute(&mut body, marker, next), 5);

        assert_eq!(body.instruction(branch).unwrap().operand, Operand::Target(next));
        assert_eq!(
            body.instruction(switch).unwrap().operand,
            Operand::Switch(vec![first, next, next])
        );
        assert_eq!(body.exception_handlers[0].try_end, Some(next));
        assert!(!is_referenced(&body, marker));
        assert!(body.remove(marker).is_ok());
    }

    #[test]
    fn leave_is_a_branch_site() {
        let mut body = MethodBody::new();
        let ret = body.push(OpCode::Ret, Operand::None);
        body.insert_at(0, OpCode::Leave_S, Operand::Target(ret)).unwrap();
        body.insert_at(0, OpCode::Nop, Operand::None).unwrap();

        let sites = BranchSites::collect(&body);
        assert_eq!(sites.len(), 1);
        assert!(is_referenced(&body, ret));
    }
}
