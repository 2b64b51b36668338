//! Shared fixtures for x86-witness integration tests

#![allow(dead_code)]

use x86_witness::disasm::decoder::{DecodedInstr, InstrDecoder};
use x86_witness::Architecture;

// ============================================================================
// Real x86-64 Instruction Bytes
// ============================================================================

/// NOP (90)
pub const NOP: &[u8] = &[0x90];

/// ADD RAX, RBX (48 01 D8)
pub const ADD_RAX_RBX: &[u8] = &[0x48, 0x01, 0xD8];

/// ADD RAX, RAX (48 01 C0)
pub const ADD_RAX_RAX: &[u8] = &[0x48, 0x01, 0xC0];

/// SUB RAX, RAX (48 29 C0)
pub const SUB_RAX_RAX: &[u8] = &[0x48, 0x29, 0xC0];

/// XOR EAX, EAX (31 C0)
pub const XOR_EAX_EAX: &[u8] = &[0x31, 0xC0];

/// XOR EAX, EBX (31 D8)
pub const XOR_EAX_EBX: &[u8] = &[0x31, 0xD8];

/// MOV EAX, 0xDEADBEEF (B8 EF BE AD DE)
pub const MOV_EAX_DEADBEEF: &[u8] = &[0xB8, 0xEF, 0xBE, 0xAD, 0xDE];

/// MOV AH, 0x12 (B4 12)
pub const MOV_AH_IMM: &[u8] = &[0xB4, 0x12];

/// DIV RCX (48 F7 F1)
pub const DIV_RCX: &[u8] = &[0x48, 0xF7, 0xF1];

/// BTR EAX, 5 (0F BA F0 05)
pub const BTR_EAX_5: &[u8] = &[0x0F, 0xBA, 0xF0, 0x05];

/// SETE AL (0F 94 C0)
pub const SETE_AL: &[u8] = &[0x0F, 0x94, 0xC0];

/// LEA RAX, [RBX+RBX*1] (48 8D 04 1B)
pub const LEA_RAX_RBX_RBX: &[u8] = &[0x48, 0x8D, 0x04, 0x1B];

/// LEA RAX, [RCX*4] (48 8D 04 8D 00 00 00 00)
pub const LEA_RAX_RCX_4: &[u8] = &[0x48, 0x8D, 0x04, 0x8D, 0x00, 0x00, 0x00, 0x00];

/// ADC RAX, RBX (48 11 D8)
pub const ADC_RAX_RBX: &[u8] = &[0x48, 0x11, 0xD8];

// ============================================================================
// Helpers
// ============================================================================

/// Decode one 64-bit instruction.
pub fn decode64(bytes: &[u8]) -> DecodedInstr {
    InstrDecoder::new(Architecture::X86_64)
        .decode(bytes, 0x1000)
        .expect("fixture bytes decode")
}

/// EFLAGS bit position of a single-bit mask.
pub fn flag_bit(mask: u32) -> u16 {
    mask.trailing_zeros() as u16
}
