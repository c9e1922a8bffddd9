//! The CIL opcode table (ECMA-335 Partition III).
//!
//! Every opcode knows its encoded value, mnemonic, operand type and control flow behaviour.
//! Two-byte opcodes carry the `0xFE` prefix in the high byte of [`OpCode::value`]
//! (e.g. `ceq` is `0xFE01`).

use strum::{EnumCount, EnumIter};

use crate::assembly::instruction::{FlowType, OperandType};

/// The shared first byte of two-byte opcodes
pub const FE_PREFIX: u8 = 0xFE;

macro_rules! opcodes {
    ($( $variant:ident = $value:literal, $mnemonic:literal, $operand:ident, $flow:ident; )*) => {
        /// A CIL opcode.
        ///
        /// Variant names follow the mnemonic with `.` replaced by `_` (`ldarg.s` is
        /// [`OpCode::Ldarg_S`]).
        #[allow(non_camel_case_types, missing_docs)]
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, EnumCount)]
        pub enum OpCode {
            $( $variant, )*
        }

        impl OpCode {
            /// Encoded value; two-byte opcodes are `0xFExx`
            #[must_use]
            pub fn value(self) -> u16 {
                match self {
                    $( OpCode::$variant => $value, )*
                }
            }

            /// Assembler mnemonic
            #[must_use]
            pub fn mnemonic(self) -> &'static str {
                match self {
                    $( OpCode::$variant => $mnemonic, )*
                }
            }

            /// Kind of operand that follows the opcode
            #[must_use]
            pub fn operand_type(self) -> OperandType {
                match self {
                    $( OpCode::$variant => OperandType::$operand, )*
                }
            }

            /// Control flow behaviour
            #[must_use]
            pub fn flow(self) -> FlowType {
                match self {
                    $( OpCode::$variant => FlowType::$flow, )*
                }
            }

            /// Look up an opcode by its encoded value
            #[must_use]
            pub fn from_value(value: u16) -> Option<OpCode> {
                match value {
                    $( $value => Some(OpCode::$variant), )*
                    _ => None,
                }
            }
        }
    };
}

opcodes! {
    Nop = 0x00, "nop", None, Sequential;
    Break = 0x01, "break", None, Sequential;
    Ldarg_0 = 0x02, "ldarg.0", None, Sequential;
    Ldarg_1 = 0x03, "ldarg.1", None, Sequential;
    Ldarg_2 = 0x04, "ldarg.2", None, Sequential;
    Ldarg_3 = 0x05, "ldarg.3", None, Sequential;
    Ldloc_0 = 0x06, "ldloc.0", None, Sequential;
    Ldloc_1 = 0x07, "ldloc.1", None, Sequential;
    Ldloc_2 = 0x08, "ldloc.2", None, Sequential;
    Ldloc_3 = 0x09, "ldloc.3", None, Sequential;
    Stloc_0 = 0x0A, "stloc.0", None, Sequential;
    Stloc_1 = 0x0B, "stloc.1", None, Sequential;
    Stloc_2 = 0x0C, "stloc.2", None, Sequential;
    Stloc_3 = 0x0D, "stloc.3", None, Sequential;
    Ldarg_S = 0x0E, "ldarg.s", ShortArgument, Sequential;
    Ldarga_S = 0x0F, "ldarga.s", ShortArgument, Sequential;
    Starg_S = 0x10, "starg.s", ShortArgument, Sequential;
    Ldloc_S = 0x11, "ldloc.s", ShortLocal, Sequential;
    Ldloca_S = 0x12, "ldloca.s", ShortLocal, Sequential;
    Stloc_S = 0x13, "stloc.s", ShortLocal, Sequential;
    Ldnull = 0x14, "ldnull", None, Sequential;
    Ldc_I4_M1 = 0x15, "ldc.i4.m1", None, Sequential;
    Ldc_I4_0 = 0x16, "ldc.i4.0", None, Sequential;
    Ldc_I4_1 = 0x17, "ldc.i4.1", None, Sequential;
    Ldc_I4_2 = 0x18, "ldc.i4.2", None, Sequential;
    Ldc_I4_3 = 0x19, "ldc.i4.3", None, Sequential;
    Ldc_I4_4 = 0x1A, "ldc.i4.4", None, Sequential;
    Ldc_I4_5 = 0x1B, "ldc.i4.5", None, Sequential;
    Ldc_I4_6 = 0x1C, "ldc.i4.6", None, Sequential;
    Ldc_I4_7 = 0x1D, "ldc.i4.7", None, Sequential;
    Ldc_I4_8 = 0x1E, "ldc.i4.8", None, Sequential;
    Ldc_I4_S = 0x1F, "ldc.i4.s", Int8, Sequential;
    Ldc_I4 = 0x20, "ldc.i4", Int32, Sequential;
    Ldc_I8 = 0x21, "ldc.i8", Int64, Sequential;
    Ldc_R4 = 0x22, "ldc.r4", Float32, Sequential;
    Ldc_R8 = 0x23, "ldc.r8", Float64, Sequential;
    Dup = 0x25, "dup", None, Sequential;
    Pop = 0x26, "pop", None, Sequential;
    Jmp = 0x27, "jmp", Method, Call;
    Call = 0x28, "call", Method, Call;
    Calli = 0x29, "calli", Signature, Call;
    Ret = 0x2A, "ret", None, Return;
    Br_S = 0x2B, "br.s", ShortTarget, UnconditionalBranch;
    Brfalse_S = 0x2C, "brfalse.s", ShortTarget, ConditionalBranch;
    Brtrue_S = 0x2D, "brtrue.s", ShortTarget, ConditionalBranch;
    Beq_S = 0x2E, "beq.s", ShortTarget, ConditionalBranch;
    Bge_S = 0x2F, "bge.s", ShortTarget, ConditionalBranch;
    Bgt_S = 0x30, "bgt.s", ShortTarget, ConditionalBranch;
    Ble_S = 0x31, "ble.s", ShortTarget, ConditionalBranch;
    Blt_S = 0x32, "blt.s", ShortTarget, ConditionalBranch;
    Bne_Un_S = 0x33, "bne.un.s", ShortTarget, ConditionalBranch;
    Bge_Un_S = 0x34, "bge.un.s", ShortTarget, ConditionalBranch;
    Bgt_Un_S = 0x35, "bgt.un.s", ShortTarget, ConditionalBranch;
    Ble_Un_S = 0x36, "ble.un.s", ShortTarget, ConditionalBranch;
    Blt_Un_S = 0x37, "blt.un.s", ShortTarget, ConditionalBranch;
    Br = 0x38, "br", Target, UnconditionalBranch;
    Brfalse = 0x39, "brfalse", Target, ConditionalBranch;
    Brtrue = 0x3A, "brtrue", Target, ConditionalBranch;
    Beq = 0x3B, "beq", Target, ConditionalBranch;
    Bge = 0x3C, "bge", Target, ConditionalBranch;
    Bgt = 0x3D, "bgt", Target, ConditionalBranch;
    Ble = 0x3E, "ble", Target, ConditionalBranch;
    Blt = 0x3F, "blt", Target, ConditionalBranch;
    Bne_Un = 0x40, "bne.un", Target, ConditionalBranch;
    Bge_Un = 0x41, "bge.un", Target, ConditionalBranch;
    Bgt_Un = 0x42, "bgt.un", Target, ConditionalBranch;
    Ble_Un = 0x43, "ble.un", Target, ConditionalBranch;
    Blt_Un = 0x44, "blt.un", Target, ConditionalBranch;
    Switch = 0x45, "switch", Switch, Switch;
    Ldind_I1 = 0x46, "ldind.i1", None, Sequential;
    Ldind_U1 = 0x47, "ldind.u1", None, Sequential;
    Ldind_I2 = 0x48, "ldind.i2", None, Sequential;
    Ldind_U2 = 0x49, "ldind.u2", None, Sequential;
    Ldind_I4 = 0x4A, "ldind.i4", None, Sequential;
    Ldind_U4 = 0x4B, "ldind.u4", None, Sequential;
    Ldind_I8 = 0x4C, "ldind.i8", None, Sequential;
    Ldind_I = 0x4D, "ldind.i", None, Sequential;
    Ldind_R4 = 0x4E, "ldind.r4", None, Sequential;
    Ldind_R8 = 0x4F, "ldind.r8", None, Sequential;
    Ldind_Ref = 0x50, "ldind.ref", None, Sequential;
    Stind_Ref = 0x51, "stind.ref", None, Sequential;
    Stind_I1 = 0x52, "stind.i1", None, Sequential;
    Stind_I2 = 0x53, "stind.i2", None, Sequential;
    Stind_I4 = 0x54, "stind.i4", None, Sequential;
    Stind_I8 = 0x55, "stind.i8", None, Sequential;
    Stind_R4 = 0x56, "stind.r4", None, Sequential;
    Stind_R8 = 0x57, "stind.r8", None, Sequential;
    Add = 0x58, "add", None, Sequential;
    Sub = 0x59, "sub", None, Sequential;
    Mul = 0x5A, "mul", None, Sequential;
    Div = 0x5B, "div", None, Sequential;
    Div_Un = 0x5C, "div.un", None, Sequential;
    Rem = 0x5D, "rem", None, Sequential;
    Rem_Un = 0x5E, "rem.un", None, Sequential;
    And = 0x5F, "and", None, Sequential;
    Or = 0x60, "or", None, Sequential;
    Xor = 0x61, "xor", None, Sequential;
    Shl = 0x62, "shl", None, Sequential;
    Shr = 0x63, "shr", None, Sequential;
    Shr_Un = 0x64, "shr.un", None, Sequential;
    Neg = 0x65, "neg", None, Sequential;
    Not = 0x66, "not", None, Sequential;
    Conv_I1 = 0x67, "conv.i1", None, Sequential;
    Conv_I2 = 0x68, "conv.i2", None, Sequential;
    Conv_I4 = 0x69, "conv.i4", None, Sequential;
    Conv_I8 = 0x6A, "conv.i8", None, Sequential;
    Conv_R4 = 0x6B, "conv.r4", None, Sequential;
    Conv_R8 = 0x6C, "conv.r8", None, Sequential;
    Conv_U4 = 0x6D, "conv.u4", None, Sequential;
    Conv_U8 = 0x6E, "conv.u8", None, Sequential;
    Callvirt = 0x6F, "callvirt", Method, Call;
    Cpobj = 0x70, "cpobj", Type, Sequential;
    Ldobj = 0x71, "ldobj", Type, Sequential;
    Ldstr = 0x72, "ldstr", String, Sequential;
    Newobj = 0x73, "newobj", Method, Call;
    Castclass = 0x74, "castclass", Type, Sequential;
    Isinst = 0x75, "isinst", Type, Sequential;
    Conv_R_Un = 0x76, "conv.r.un", None, Sequential;
    Unbox = 0x79, "unbox", Type, Sequential;
    Throw = 0x7A, "throw", None, Throw;
    Ldfld = 0x7B, "ldfld", Field, Sequential;
    Ldflda = 0x7C, "ldflda", Field, Sequential;
    Stfld = 0x7D, "stfld", Field, Sequential;
    Ldsfld = 0x7E, "ldsfld", Field, Sequential;
    Ldsflda = 0x7F, "ldsflda", Field, Sequential;
    Stsfld = 0x80, "stsfld", Field, Sequential;
    Stobj = 0x81, "stobj", Type, Sequential;
    Conv_Ovf_I1_Un = 0x82, "conv.ovf.i1.un", None, Sequential;
    Conv_Ovf_I2_Un = 0x83, "conv.ovf.i2.un", None, Sequential;
    Conv_Ovf_I4_Un = 0x84, "conv.ovf.i4.un", None, Sequential;
    Conv_Ovf_I8_Un = 0x85, "conv.ovf.i8.un", None, Sequential;
    Conv_Ovf_U1_Un = 0x86, "conv.ovf.u1.un", None, Sequential;
    Conv_Ovf_U2_Un = 0x87, "conv.ovf.u2.un", None, Sequential;
    Conv_Ovf_U4_Un = 0x88, "conv.ovf.u4.un", None, Sequential;
    Conv_Ovf_U8_Un = 0x89, "conv.ovf.u8.un", None, Sequential;
    Conv_Ovf_I_Un = 0x8A, "conv.ovf.i.un", None, Sequential;
    Conv_Ovf_U_Un = 0x8B, "conv.ovf.u.un", None, Sequential;
    Box = 0x8C, "box", Type, Sequential;
    Newarr = 0x8D, "newarr", Type, Sequential;
    Ldlen = 0x8E, "ldlen", None, Sequential;
    Ldelema = 0x8F, "ldelema", Type, Sequential;
    Ldelem_I1 = 0x90, "ldelem.i1", None, Sequential;
    Ldelem_U1 = 0x91, "ldelem.u1", None, Sequential;
    Ldelem_I2 = 0x92, "ldelem.i2", None, Sequential;
    Ldelem_U2 = 0x93, "ldelem.u2", None, Sequential;
    Ldelem_I4 = 0x94, "ldelem.i4", None, Sequential;
    Ldelem_U4 = 0x95, "ldelem.u4", None, Sequential;
    Ldelem_I8 = 0x96, "ldelem.i8", None, Sequential;
    Ldelem_I = 0x97, "ldelem.i", None, Sequential;
    Ldelem_R4 = 0x98, "ldelem.r4", None, Sequential;
    Ldelem_R8 = 0x99, "ldelem.r8", None, Sequential;
    Ldelem_Ref = 0x9A, "ldelem.ref", None, Sequential;
    Stelem_I = 0x9B, "stelem.i", None, Sequential;
    Stelem_I1 = 0x9C, "stelem.i1", None, Sequential;
    Stelem_I2 = 0x9D, "stelem.i2", None, Sequential;
    Stelem_I4 = 0x9E, "stelem.i4", None, Sequential;
    Stelem_I8 = 0x9F, "stelem.i8", None, Sequential;
    Stelem_R4 = 0xA0, "stelem.r4", None, Sequential;
    Stelem_R8 = 0xA1, "stelem.r8", None, Sequential;
    Stelem_Ref = 0xA2, "stelem.ref", None, Sequential;
    Ldelem_Any = 0xA3, "ldelem", Type, Sequential;
    Stelem_Any = 0xA4, "stelem", Type, Sequential;
    Unbox_Any = 0xA5, "unbox.any", Type, Sequential;
    Conv_Ovf_I1 = 0xB3, "conv.ovf.i1", None, Sequential;
    Conv_Ovf_U1 = 0xB4, "conv.ovf.u1", None, Sequential;
    Conv_Ovf_I2 = 0xB5, "conv.ovf.i2", None, Sequential;
    Conv_Ovf_U2 = 0xB6, "conv.ovf.u2", None, Sequential;
    Conv_Ovf_I4 = 0xB7, "conv.ovf.i4", None, Sequential;
    Conv_Ovf_U4 = 0xB8, "conv.ovf.u4", None, Sequential;
    Conv_Ovf_I8 = 0xB9, "conv.ovf.i8", None, Sequential;
    Conv_Ovf_U8 = 0xBA, "conv.ovf.u8", None, Sequential;
    Refanyval = 0xC2, "refanyval", Type, Sequential;
    Ckfinite = 0xC3, "ckfinite", None, Sequential;
    Mkrefany = 0xC6, "mkrefany", Type, Sequential;
    Ldtoken = 0xD0, "ldtoken", Token, Sequential;
    Conv_U2 = 0xD1, "conv.u2", None, Sequential;
    Conv_U1 = 0xD2, "conv.u1", None, Sequential;
    Conv_I = 0xD3, "conv.i", None, Sequential;
    Conv_Ovf_I = 0xD4, "conv.ovf.i", None, Sequential;
    Conv_Ovf_U = 0xD5, "conv.ovf.u", None, Sequential;
    Add_Ovf = 0xD6, "add.ovf", None, Sequential;
    Add_Ovf_Un = 0xD7, "add.ovf.un", None, Sequential;
    Mul_Ovf = 0xD8, "mul.ovf", None, Sequential;
    Mul_Ovf_Un = 0xD9, "mul.ovf.un", None, Sequential;
    Sub_Ovf = 0xDA, "sub.ovf", None, Sequential;
    Sub_Ovf_Un = 0xDB, "sub.ovf.un", None, Sequential;
    Endfinally = 0xDC, "endfinally", None, EndFinally;
    Leave = 0xDD, "leave", Target, Leave;
    Leave_S = 0xDE, "leave.s", ShortTarget, Leave;
    Stind_I = 0xDF, "stind.i", None, Sequential;
    Conv_U = 0xE0, "conv.u", None, Sequential;
    Arglist = 0xFE00, "arglist", None, Sequential;
    Ceq = 0xFE01, "ceq", None, Sequential;
    Cgt = 0xFE02, "cgt", None, Sequential;
    Cgt_Un = 0xFE03, "cgt.un", None, Sequential;
    Clt = 0xFE04, "clt", None, Sequential;
    Clt_Un = 0xFE05, "clt.un", None, Sequential;
    Ldftn = 0xFE06, "ldftn", Method, Sequential;
    Ldvirtftn = 0xFE07, "ldvirtftn", Method, Sequential;
    Ldarg = 0xFE09, "ldarg", Argument, Sequential;
    Ldarga = 0xFE0A, "ldarga", Argument, Sequential;
    Starg = 0xFE0B, "starg", Argument, Sequential;
    Ldloc = 0xFE0C, "ldloc", Local, Sequential;
    Ldloca = 0xFE0D, "ldloca", Local, Sequential;
    Stloc = 0xFE0E, "stloc", Local, Sequential;
    Localloc = 0xFE0F, "localloc", None, Sequential;
    Endfilter = 0xFE11, "endfilter", None, Return;
    Unaligned = 0xFE12, "unaligned.", Int8, Sequential;
    Volatile = 0xFE13, "volatile.", None, Sequential;
    Tail = 0xFE14, "tail.", None, Sequential;
    Initobj = 0xFE15, "initobj", Type, Sequential;
    Constrained = 0xFE16, "constrained.", Type, Sequential;
    Cpblk = 0xFE17, "cpblk", None, Sequential;
    Initblk = 0xFE18, "initblk", None, Sequential;
    No = 0xFE19, "no.", Int8, Sequential;
    Rethrow = 0xFE1A, "rethrow", None, Throw;
    Sizeof = 0xFE1C, "sizeof", Type, Sequential;
    Refanytype = 0xFE1D, "refanytype", None, Sequential;
    Readonly = 0xFE1E, "readonly.", None, Sequential;
}

impl OpCode {
    /// Encoded size of the opcode itself (1 or 2 bytes)
    #[must_use]
    pub fn size(self) -> u32 {
        if self.value() >> 8 == u16::from(FE_PREFIX) {
            2
        } else {
            1
        }
    }

    /// Returns `true` for opcodes whose operand references other instructions.
    ///
    /// These are the instructions whose targets must follow instructions that get replaced
    /// or removed.
    #[must_use]
    pub fn is_branch(self) -> bool {
        matches!(
            self.flow(),
            FlowType::ConditionalBranch
                | FlowType::UnconditionalBranch
                | FlowType::Switch
                | FlowType::Leave
        )
    }

    /// The 4-byte-offset form of a short branch, `None` for every other opcode.
    #[must_use]
    pub fn long_branch(self) -> Option<OpCode> {
        Some(match self {
            OpCode::Br_S => OpCode::Br,
            OpCode::Brfalse_S => OpCode::Brfalse,
            OpCode::Brtrue_S => OpCode::Brtrue,
            OpCode::Beq_S => OpCode::Beq,
            OpCode::Bge_S => OpCode::Bge,
            OpCode::Bgt_S => OpCode::Bgt,
            OpCode::Ble_S => OpCode::Ble,
            OpCode::Blt_S => OpCode::Blt,
            OpCode::Bne_Un_S => OpCode::Bne_Un,
            OpCode::Bge_Un_S => OpCode::Bge_Un,
            OpCode::Bgt_Un_S => OpCode::Bgt_Un,
            OpCode::Ble_Un_S => OpCode::Ble_Un,
            OpCode::Blt_Un_S => OpCode::Blt_Un,
            OpCode::Leave_S => OpCode::Leave,
            _ => return None,
        })
    }

    /// The 1-byte-offset form of a long branch, `None` for every other opcode.
    #[must_use]
    pub fn short_branch(self) -> Option<OpCode> {
        Some(match self {
            OpCode::Br => OpCode::Br_S,
            OpCode::Brfalse => OpCode::Brfalse_S,
            OpCode::Brtrue => OpCode::Brtrue_S,
            OpCode::Beq => OpCode::Beq_S,
            OpCode::Bge => OpCode::Bge_S,
            OpCode::Bgt => OpCode::Bgt_S,
            OpCode::Ble => OpCode::Ble_S,
            OpCode::Blt => OpCode::Blt_S,
            OpCode::Bne_Un => OpCode::Bne_Un_S,
            OpCode::Bge_Un => OpCode::Bge_Un_S,
            OpCode::Bgt_Un => OpCode::Bgt_Un_S,
            OpCode::Ble_Un => OpCode::Ble_Un_S,
            OpCode::Blt_Un => OpCode::Blt_Un_S,
            OpCode::Leave => OpCode::Leave_S,
            _ => return None,
        })
    }
}

impl std::fmt::Display for OpCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.mnemonic())
    }
}
