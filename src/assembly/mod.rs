//! CIL instructions and editable method bodies.
//!
//! This module holds everything needed to inspect and patch method code: the opcode table,
//! typed instructions whose branch operands survive edits, and [`MethodBody`] with its
//! macro simplification / optimization passes.
//!
//! # Key Components
//!
//! - [`OpCode`] - The ECMA-335 opcode table
//! - [`Instruction`] / [`Operand`] - A single instruction with a typed operand
//! - [`MethodBody`] - Instructions, locals and exception handlers of one method
//!
//! # Examples
//!
//! ```rust
//! use cilfacade::assembly::{MethodBody, OpCode, Operand};
//!
//! let mut body = MethodBody::new();
//! let target = body.push(OpCode::Ret, Operand::None);
//! body.insert_before(target, OpCode::Br, Operand::Target(target))?;
//!
//! body.optimize_macros();
//! assert_eq!(body.instructions()[0].opcode, OpCode::Br_S);
//! # Ok::<(), cilfacade::Error>(())
//! ```

mod body;
mod instruction;
mod opcodes;

pub use body::{ExceptionHandler, HandlerKind, MethodBody};
pub use instruction::{FlowType, Immediate, InstrId, Instruction, Operand, OperandType};
pub use opcodes::{OpCode, FE_PREFIX};
