//! CIL instruction representation and operand types.
//!
//! An [`Instruction`] pairs an [`OpCode`] with a typed [`Operand`] and carries a stable
//! [`InstrId`]. Branch operands reference other instructions by id instead of by byte offset,
//! so instructions can be inserted and removed without re-encoding the body. Offsets are
//! only computed on demand (see [`crate::assembly::MethodBody::offsets`]).
//!
//! # Key Components
//!
//! - [`Instruction`] - An opcode with its operand
//! - [`Operand`] - Type-safe operand representation
//! - [`Immediate`] - Immediate constants
//! - [`OperandType`] - The operand kind an opcode expects
//! - [`FlowType`] - Control flow behavior classification

use std::fmt;

use crate::{
    assembly::OpCode,
    metadata::{
        references::{CallSite, FieldRef, MethodRef},
        typesystem::TypeSig,
    },
};

/// Stable identity of an instruction within its [`crate::assembly::MethodBody`].
///
/// Ids survive insertions and removals of other instructions, they are never reused within
/// one body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InstrId(pub(crate) u32);

impl fmt::Display for InstrId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Types of operands for CIL instructions.
///
/// Each variant describes both the meaning and the encoded size of the operand that follows
/// an opcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperandType {
    /// No operand present
    None,
    /// Signed 8-bit integer
    Int8,
    /// Signed 32-bit integer
    Int32,
    /// Signed 64-bit integer
    Int64,
    /// 32-bit floating point
    Float32,
    /// 64-bit floating point
    Float64,
    /// User string
    String,
    /// Type reference
    Type,
    /// Field reference
    Field,
    /// Method reference
    Method,
    /// Type, field or method reference (`ldtoken`)
    Token,
    /// Stand-alone call site signature
    Signature,
    /// Local variable index, 1 byte
    ShortLocal,
    /// Local variable index, 2 bytes
    Local,
    /// Argument index, 1 byte
    ShortArgument,
    /// Argument index, 2 bytes
    Argument,
    /// Branch target, 1-byte relative offset
    ShortTarget,
    /// Branch target, 4-byte relative offset
    Target,
    /// Jump table
    Switch,
}

impl OperandType {
    /// Encoded size of the operand in bytes; `switch` tables are sized by their target count.
    #[must_use]
    pub fn size(self, switch_targets: usize) -> u32 {
        match self {
            OperandType::None => 0,
            OperandType::Int8 | OperandType::ShortLocal | OperandType::ShortArgument | OperandType::ShortTarget => 1,
            OperandType::Local | OperandType::Argument => 2,
            OperandType::Int32
            | OperandType::Float32
            | OperandType::String
            | OperandType::Type
            | OperandType::Field
            | OperandType::Method
            | OperandType::Token
            | OperandType::Signature
            | OperandType::Target => 4,
            OperandType::Int64 | OperandType::Float64 => 8,
            OperandType::Switch => 4 + 4 * switch_targets as u32,
        }
    }

    /// Returns `true` if `operand` is a valid operand for this operand type.
    #[must_use]
    pub fn accepts(self, operand: &Operand) -> bool {
        match (self, operand) {
            (OperandType::None, Operand::None)
            | (OperandType::Int8, Operand::Immediate(Immediate::Int8(_)))
            | (OperandType::Int32, Operand::Immediate(Immediate::Int32(_)))
            | (OperandType::Int64, Operand::Immediate(Immediate::Int64(_)))
            | (OperandType::Float32, Operand::Immediate(Immediate::Float32(_)))
            | (OperandType::Float64, Operand::Immediate(Immediate::Float64(_)))
            | (OperandType::String, Operand::String(_))
            | (OperandType::Type, Operand::Type(_))
            | (OperandType::Field, Operand::Field(_))
            | (OperandType::Method, Operand::Method(_))
            | (OperandType::Token, Operand::Type(_) | Operand::Field(_) | Operand::Method(_))
            | (OperandType::Signature, Operand::Signature(_))
            | (OperandType::Local, Operand::Local(_))
            | (OperandType::Argument, Operand::Argument(_))
            | (OperandType::ShortTarget | OperandType::Target, Operand::Target(_))
            | (OperandType::Switch, Operand::Switch(_)) => true,
            (OperandType::ShortLocal, Operand::Local(index))
            | (OperandType::ShortArgument, Operand::Argument(index)) => *index <= u16::from(u8::MAX),
            _ => false,
        }
    }
}

/// Immediate constant operands.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Immediate {
    /// Signed 8-bit integer (`ldc.i4.s`, `unaligned.`, `no.`)
    Int8(i8),
    /// Signed 32-bit integer
    Int32(i32),
    /// Signed 64-bit integer
    Int64(i64),
    /// 32-bit floating point
    Float32(f32),
    /// 64-bit floating point
    Float64(f64),
}

/// A typed instruction operand.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    /// No operand
    None,
    /// Immediate constant
    Immediate(Immediate),
    /// User string (`ldstr`)
    String(String),
    /// Type reference
    Type(TypeSig),
    /// Field reference
    Field(FieldRef),
    /// Method reference
    Method(MethodRef),
    /// Stand-alone signature (`calli`)
    Signature(CallSite),
    /// Local variable index
    Local(u16),
    /// Argument index; index 0 is `this` for instance methods
    Argument(u16),
    /// Branch target
    Target(InstrId),
    /// Jump table targets
    Switch(Vec<InstrId>),
}

impl Operand {
    /// Instructions referenced by this operand.
    #[must_use]
    pub fn targets(&self) -> &[InstrId] {
        match self {
            Operand::Target(target) => std::slice::from_ref(target),
            Operand::Switch(targets) => targets,
            _ => &[],
        }
    }

    /// Mutable access to the instructions referenced by this operand.
    pub fn targets_mut(&mut self) -> &mut [InstrId] {
        match self {
            Operand::Target(target) => std::slice::from_mut(target),
            Operand::Switch(targets) => targets,
            _ => &mut [],
        }
    }
}

/// Control flow behavior of an instruction.
///
/// Describes how the instruction affects the order of execution, used to find branch
/// sites and method exits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowType {
    /// Execution continues with the next instruction
    Sequential,
    /// Execution may continue with the target or the next instruction
    ConditionalBranch,
    /// Execution always continues with the target
    UnconditionalBranch,
    /// Calls a method, then continues with the next instruction
    Call,
    /// Returns from the method (or ends a filter)
    Return,
    /// Jumps through a table, or falls through
    Switch,
    /// Throws an exception
    Throw,
    /// Ends a finally or fault handler
    EndFinally,
    /// Leaves a protected region
    Leave,
}

/// A single CIL instruction.
#[derive(Debug, Clone, PartialEq)]
pub struct Instruction {
    /// Stable identity within the owning body
    pub id: InstrId,
    /// The opcode
    pub opcode: OpCode,
    /// The operand, matching [`OpCode::operand_type`]
    pub operand: Operand,
}

impl Instruction {
    /// Encoded size in bytes, opcode included.
    #[must_use]
    pub fn size(&self) -> u32 {
        self.opcode.size()
            + self
                .opcode
                .operand_type()
                .size(self.operand.targets().len())
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.opcode)?;
        match &self.operand {
            Operand::None => Ok(()),
            Operand::Immediate(Immediate::Int8(value)) => write!(f, " {value}"),
            Operand::Immediate(Immediate::Int32(value)) => write!(f, " {value}"),
            Operand::Immediate(Immediate::Int64(value)) => write!(f, " {value}"),
            Operand::Immediate(Immediate::Float32(value)) => write!(f, " {value}"),
            Operand::Immediate(Immediate::Float64(value)) => write!(f, " {value}"),
            Operand::String(value) => write!(f, " \"{value}\""),
            Operand::Type(sig) => write!(f, " {sig}"),
            Operand::Field(field) => write!(f, " {field}"),
            Operand::Method(method) => write!(f, " {method}"),
            Operand::Signature(site) => write!(f, " {site}"),
            Operand::Local(index) => write!(f, " V_{index}"),
            Operand::Argument(index) => write!(f, " A_{index}"),
            Operand::Target(target) => write!(f, " {target}"),
            Operand::Switch(targets) => {
                f.write_str(" (")?;
                for (index, target) in targets.iter().enumerate() {
                    if index > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{target}")?;
                }
                f.write_str(")")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::typesystem::TypeRef;

    #[test]
    fn operand_acceptance() {
        let ldloc_s = OpCode::Ldloc_S.operand_type();
        assert!(ldloc_s.accepts(&Operand::Local(255)));
        assert!(!ldloc_s.accepts(&Operand::Local(256)));
        assert!(!ldloc_s.accepts(&Operand::Argument(1)));

        let token = OpCode::Ldtoken.operand_type();
        assert!(token.accepts(&Operand::Type(TypeSig::I4)));
        assert!(!token.accepts(&Operand::String("x".into())));

        assert!(OpCode::Ldc_I4_S
            .operand_type()
            .accepts(&Operand::Immediate(Immediate::Int8(-3))));
        assert!(!OpCode::Ldc_I4_S
            .operand_type()
            .accepts(&Operand::Immediate(Immediate::Int32(-3))));
    }

    #[test]
    fn instruction_sizes() {
        let ret = Instruction {
            id: InstrId(0),
            opcode: OpCode::Ret,
            operand: Operand::None,
        };
        assert_eq!(ret.size(), 1);

        let switch = Instruction {
            id: InstrId(1),
            opcode: OpCode::Switch,
            operand: Operand::Switch(vec![InstrId(0), InstrId(0), InstrId(0)]),
        };
        assert_eq!(switch.size(), 1 + 4 + 12);

        let ldloc = Instruction {
            id: InstrId(2),
            opcode: OpCode::Ldloc,
            operand: Operand::Local(300),
        };
        assert_eq!(ldloc.size(), 4);

        let ldc_r8 = Instruction {
            id: InstrId(3),
            opcode: OpCode::Ldc_R8,
            operand: Operand::Immediate(Immediate::Float64(1.5)),
        };
        assert_eq!(ldc_r8.size(), 9);
    }

    #[test]
    fn display() {
        let ldfld = Instruction {
            id: InstrId(0),
            opcode: OpCode::Ldfld,
            operand: Operand::Field(FieldRef::new(
                TypeSig::Class(TypeRef::new("", "", "PlayerData")),
                "health",
                TypeSig::I4,
            )),
        };
        assert_eq!(ldfld.to_string(), "ldfld System.Int32 PlayerData::health");

        let br = Instruction {
            id: InstrId(4),
            opcode: OpCode::Br_S,
            operand: Operand::Target(InstrId(2)),
        };
        assert_eq!(br.to_string(), "br.s #2");
    }
}
