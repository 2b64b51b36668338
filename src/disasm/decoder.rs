//! x86/x86-64 instruction decoder façade using iced-x86
//!
//! Resolves a raw encoding into the operand, register and flag metadata the
//! matrix builder and search loop work from. Flag masks are translated into
//! real EFLAGS bit positions here so nothing downstream sees iced's own
//! rflags bit assignment.

use anyhow::{bail, Result};
use iced_x86::{
    Decoder, DecoderOptions, Formatter, Instruction, InstructionInfoFactory, IntelFormatter,
    Mnemonic, OpAccess, OpKind, Register,
};

use super::regs;
use super::Architecture;

/// Visible operand of a decoded instruction, as a closed variant set.
#[derive(Debug, Clone, PartialEq)]
pub enum OperandKind {
    Register(Register),
    Memory(MemOperand),
    Immediate(u64),
    Pointer,
}

/// Memory operand shape; displacement is sign-extended.
#[derive(Debug, Clone, PartialEq)]
pub struct MemOperand {
    pub base: Register,
    pub index: Register,
    pub scale: u32,
    pub displacement: i64,
}

/// One visible operand with its access mask.
#[derive(Debug, Clone)]
pub struct Operand {
    pub kind: OperandKind,
    pub access: OpAccess,
}

/// Register use (explicit or implicit) with its access mask.
#[derive(Debug, Clone, Copy)]
pub struct UsedReg {
    pub reg: Register,
    pub access: OpAccess,
}

/// A decoded instruction with everything the test generator needs.
#[derive(Debug, Clone)]
pub struct DecodedInstr {
    pub arch: Architecture,
    pub mnemonic: Mnemonic,
    /// Intel-syntax display text
    pub text: String,
    pub len: usize,
    /// Visible operands in encoding order
    pub operands: Vec<Operand>,
    /// Every register the instruction touches, implicit ones included
    pub used_regs: Vec<UsedReg>,
    /// Effective operand width in bits
    pub operand_width: u32,
    /// Effective address width in bits
    pub address_width: u32,
    /// EFLAGS bits the instruction computes
    pub flags_modified: u32,
    /// EFLAGS bits the instruction unconditionally clears
    pub flags_set0: u32,
    /// EFLAGS bits the instruction unconditionally sets
    pub flags_set1: u32,
    /// EFLAGS bits the instruction reads
    pub flags_tested: u32,
}

impl DecodedInstr {
    /// Whether any visible operand is an immediate.
    pub fn has_immediate_input(&self) -> bool {
        self.operands
            .iter()
            .any(|op| matches!(op.kind, OperandKind::Immediate(_)))
    }

    /// The immediate value of operand `i`, if it is one.
    pub fn immediate(&self, i: usize) -> Option<u64> {
        match self.operands.get(i)?.kind {
            OperandKind::Immediate(value) => Some(value),
            _ => None,
        }
    }

    /// The register of operand `i`, if it is one.
    pub fn op_register(&self, i: usize) -> Option<Register> {
        match self.operands.get(i)?.kind {
            OperandKind::Register(reg) => Some(reg),
            _ => None,
        }
    }

    /// The memory operand at `i`, if it is one.
    pub fn op_memory(&self, i: usize) -> Option<&MemOperand> {
        match &self.operands.get(i)?.kind {
            OperandKind::Memory(mem) => Some(mem),
            _ => None,
        }
    }
}

/// Decoder façade for one machine mode.
pub struct InstrDecoder {
    arch: Architecture,
}

impl InstrDecoder {
    pub fn new(arch: Architecture) -> Self {
        Self { arch }
    }

    /// Decode a single instruction at the given address.
    pub fn decode(&self, bytes: &[u8], address: u64) -> Result<DecodedInstr> {
        let mut decoder =
            Decoder::with_ip(self.arch.bitness(), bytes, address, DecoderOptions::NONE);
        let instr = decoder.decode();
        if instr.is_invalid() {
            bail!("undecodable instruction: {:02X?}", bytes);
        }
        Ok(self.extract(&instr))
    }

    fn extract(&self, instr: &Instruction) -> DecodedInstr {
        let mut info_factory = InstructionInfoFactory::new();
        let info = info_factory.info(instr);

        let operands = (0..instr.op_count())
            .map(|i| Operand {
                kind: self.operand_kind(instr, i),
                access: op_access(info, i),
            })
            .collect::<Vec<_>>();

        let used_regs = info
            .used_registers()
            .iter()
            .map(|u| UsedReg {
                reg: u.register(),
                access: u.access(),
            })
            .collect();

        let mut formatter = IntelFormatter::new();
        let mut text = String::new();
        formatter.format(instr, &mut text);

        DecodedInstr {
            arch: self.arch,
            mnemonic: instr.mnemonic(),
            text,
            len: instr.len(),
            operand_width: self.operand_width(instr),
            address_width: self.address_width_of(instr),
            used_regs,
            operands,
            flags_modified: regs::rflags_to_eflags(instr.rflags_written()),
            flags_set0: regs::rflags_to_eflags(instr.rflags_cleared()),
            flags_set1: regs::rflags_to_eflags(instr.rflags_set()),
            flags_tested: regs::rflags_to_eflags(instr.rflags_read()),
        }
    }

    fn operand_kind(&self, instr: &Instruction, i: u32) -> OperandKind {
        match instr.op_kind(i) {
            OpKind::Register => OperandKind::Register(instr.op_register(i)),
            OpKind::Memory => OperandKind::Memory(MemOperand {
                base: instr.memory_base(),
                index: instr.memory_index(),
                scale: instr.memory_index_scale(),
                displacement: instr.memory_displacement64() as i64,
            }),
            OpKind::Immediate8
            | OpKind::Immediate8_2nd
            | OpKind::Immediate16
            | OpKind::Immediate32
            | OpKind::Immediate64
            | OpKind::Immediate8to16
            | OpKind::Immediate8to32
            | OpKind::Immediate8to64
            | OpKind::Immediate32to64 => OperandKind::Immediate(instr.immediate(i)),
            OpKind::NearBranch16 | OpKind::NearBranch32 | OpKind::NearBranch64 => {
                OperandKind::Immediate(instr.near_branch_target())
            }
            _ => OperandKind::Pointer,
        }
    }

    /// Effective operand width, taken from the first visible operand.
    fn operand_width(&self, instr: &Instruction) -> u32 {
        if instr.op_count() > 0 {
            match instr.op_kind(0) {
                OpKind::Register => return regs::width_bits(instr.op_register(0)) as u32,
                OpKind::Memory => {
                    let size = instr.memory_size().size() as u32 * 8;
                    if size != 0 {
                        return size;
                    }
                }
                _ => {}
            }
        }
        self.arch.bitness()
    }

    /// Effective address width: the width of the memory operand's base or
    /// index register when there is one, the mode's width otherwise.
    fn address_width_of(&self, instr: &Instruction) -> u32 {
        for i in 0..instr.op_count() {
            if instr.op_kind(i) == OpKind::Memory {
                for reg in [instr.memory_base(), instr.memory_index()] {
                    if reg != Register::None && reg != Register::RIP && reg != Register::EIP {
                        return regs::width_bits(reg) as u32;
                    }
                }
            }
        }
        self.arch.bitness()
    }
}

fn op_access(info: &iced_x86::InstructionInfo, i: u32) -> OpAccess {
    match i {
        0 => info.op0_access(),
        1 => info.op1_access(),
        2 => info.op2_access(),
        3 => info.op3_access(),
        4 => info.op4_access(),
        _ => OpAccess::None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::disasm::regs::eflags;

    fn decode64(bytes: &[u8]) -> DecodedInstr {
        InstrDecoder::new(Architecture::X86_64)
            .decode(bytes, 0x1000)
            .expect("decode")
    }

    #[test]
    fn test_decode_add_rax_rbx() {
        // ADD RAX, RBX (48 01 D8)
        let instr = decode64(&[0x48, 0x01, 0xD8]);
        assert_eq!(instr.mnemonic, Mnemonic::Add);
        assert_eq!(instr.len, 3);
        assert_eq!(instr.operand_width, 64);
        assert_eq!(instr.operands.len(), 2);
        assert_eq!(instr.op_register(0), Some(Register::RAX));
        assert_eq!(instr.op_register(1), Some(Register::RBX));
        assert!(!instr.has_immediate_input());
    }

    #[test]
    fn test_decode_mov_eax_imm() {
        // MOV EAX, 0xDEADBEEF (B8 EF BE AD DE)
        let instr = decode64(&[0xB8, 0xEF, 0xBE, 0xAD, 0xDE]);
        assert_eq!(instr.mnemonic, Mnemonic::Mov);
        assert_eq!(instr.operand_width, 32);
        assert!(instr.has_immediate_input());
        assert_eq!(instr.immediate(1), Some(0xDEAD_BEEF));
        assert_eq!(instr.flags_modified, 0);
    }

    #[test]
    fn test_decode_add_flags() {
        let instr = decode64(&[0x48, 0x01, 0xD8]);
        assert_eq!(
            instr.flags_modified,
            eflags::CF | eflags::PF | eflags::AF | eflags::ZF | eflags::SF | eflags::OF
        );
        assert_eq!(instr.flags_set0, 0);
        assert_eq!(instr.flags_set1, 0);
        assert_eq!(instr.flags_tested, 0);
    }

    #[test]
    fn test_decode_xor_clears_cf_of() {
        // XOR EAX, EAX (31 C0)
        let instr = decode64(&[0x31, 0xC0]);
        assert_eq!(instr.mnemonic, Mnemonic::Xor);
        assert_ne!(instr.flags_set0 & (eflags::CF | eflags::OF), 0);
        assert_ne!(instr.flags_modified & eflags::ZF, 0);
    }

    #[test]
    fn test_decode_adc_tests_carry() {
        // ADC RAX, RBX (48 11 D8)
        let instr = decode64(&[0x48, 0x11, 0xD8]);
        assert_eq!(instr.flags_tested, eflags::CF);
    }

    #[test]
    fn test_decode_lea_memory_operand() {
        // LEA RAX, [RCX*4] (48 8D 04 8D 00 00 00 00)
        let instr = decode64(&[0x48, 0x8D, 0x04, 0x8D, 0x00, 0x00, 0x00, 0x00]);
        assert_eq!(instr.mnemonic, Mnemonic::Lea);
        let mem = instr.op_memory(1).expect("memory operand");
        assert_eq!(mem.base, Register::None);
        assert_eq!(mem.index, Register::RCX);
        assert_eq!(mem.scale, 4);
        assert_eq!(mem.displacement, 0);
        assert_eq!(instr.address_width, 64);
    }

    #[test]
    fn test_decode_invalid_bytes() {
        let decoder = InstrDecoder::new(Architecture::X86_64);
        // A lone prefix byte does not decode.
        assert!(decoder.decode(&[0x66], 0).is_err());
    }

    #[test]
    fn test_decode_setcc_width() {
        // SETE AL (0F 94 C0)
        let instr = decode64(&[0x0F, 0x94, 0xC0]);
        assert_eq!(instr.mnemonic, Mnemonic::Sete);
        assert_eq!(instr.operand_width, 8);
        assert_eq!(instr.flags_tested, eflags::ZF);
    }

    #[test]
    fn test_text_is_intel_syntax() {
        let instr = decode64(&[0x48, 0x01, 0xD8]);
        assert!(instr.text.starts_with("add"));
        assert!(instr.text.contains("rax"));
    }
}
