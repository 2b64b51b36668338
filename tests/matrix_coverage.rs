//! Target-matrix boundary behavior over the public API
//!
//! These are the semantic guarantees emulator validators rely on: targets
//! that an encoding can never produce must not be enumerated, and targets
//! it can produce must be.

mod common;

use common::*;
use iced_x86::Register;
use x86_witness::disasm::regs::eflags;
use x86_witness::{build_matrix, BitTarget, ExceptionKind};

fn reg_target(matrix: &[BitTarget], reg: Register, bit_pos: u16, expected: u8) -> bool {
    matrix.contains(&BitTarget::Reg {
        reg,
        bit_pos,
        expected,
    })
}

fn flag_target(matrix: &[BitTarget], mask: u32, expected: u8) -> bool {
    matrix.contains(&BitTarget::Flag {
        bit_pos: flag_bit(mask),
        expected,
    })
}

// ============================================================================
// Forced-zero results
// ============================================================================

#[test]
fn test_xor_same_root_never_targets_one() {
    let matrix = build_matrix(&decode64(XOR_EAX_EAX));
    for bit in 0..32 {
        assert!(!reg_target(&matrix, Register::EAX, bit, 1));
    }
}

#[test]
fn test_xor_same_root_flags() {
    let matrix = build_matrix(&decode64(XOR_EAX_EAX));
    assert!(flag_target(&matrix, eflags::ZF, 1));
    assert!(!flag_target(&matrix, eflags::ZF, 0));
    assert!(flag_target(&matrix, eflags::CF, 0));
    assert!(!flag_target(&matrix, eflags::CF, 1));
    assert!(flag_target(&matrix, eflags::OF, 0));
    assert!(!flag_target(&matrix, eflags::OF, 1));
}

#[test]
fn test_sub_same_root_suppresses_sign() {
    let matrix = build_matrix(&decode64(SUB_RAX_RAX));
    assert!(!flag_target(&matrix, eflags::SF, 1));
    assert!(flag_target(&matrix, eflags::SF, 0));
}

// ============================================================================
// Immediate-aware pruning
// ============================================================================

#[test]
fn test_mov_imm_bit_targets_mirror_value() {
    let matrix = build_matrix(&decode64(MOV_EAX_DEADBEEF));
    let value: u64 = 0xDEAD_BEEF;
    for bit in 0..32u16 {
        let set = value & (1 << bit) != 0;
        assert_eq!(reg_target(&matrix, Register::EAX, bit, 1), set);
        assert_eq!(reg_target(&matrix, Register::EAX, bit, 0), !set);
    }
}

#[test]
fn test_btr_imm_never_witnesses_cleared_bit_high() {
    let matrix = build_matrix(&decode64(BTR_EAX_5));
    assert!(!reg_target(&matrix, Register::EAX, 5, 1));
    for bit in [0u16, 4, 6, 31] {
        assert!(reg_target(&matrix, Register::EAX, bit, 1));
    }
}

#[test]
fn test_immediate_suppresses_computed_flag_targets() {
    let matrix = build_matrix(&decode64(BTR_EAX_5));
    // BTR computes CF, but with an immediate input the flag enumeration is
    // limited to the forced set-0/set-1 bits.
    assert!(!flag_target(&matrix, eflags::CF, 1));
}

// ============================================================================
// Address computations
// ============================================================================

#[test]
fn test_lea_doubling_form_clears_bit_zero() {
    let matrix = build_matrix(&decode64(LEA_RAX_RBX_RBX));
    assert!(!reg_target(&matrix, Register::RAX, 0, 1));
    assert!(reg_target(&matrix, Register::RAX, 0, 0));
    assert!(reg_target(&matrix, Register::RAX, 1, 1));
}

#[test]
fn test_lea_scaled_form_clears_low_bits() {
    let matrix = build_matrix(&decode64(LEA_RAX_RCX_4));
    assert!(!reg_target(&matrix, Register::RAX, 0, 1));
    assert!(!reg_target(&matrix, Register::RAX, 1, 1));
    assert!(reg_target(&matrix, Register::RAX, 2, 1));
}

// ============================================================================
// SETcc and exceptions
// ============================================================================

#[test]
fn test_setcc_targets_only_bit_zero() {
    let matrix = build_matrix(&decode64(SETE_AL));
    assert!(reg_target(&matrix, Register::AL, 0, 0));
    assert!(reg_target(&matrix, Register::AL, 0, 1));
    for bit in 1..8 {
        for expected in [0, 1] {
            assert!(!reg_target(&matrix, Register::AL, bit, expected));
        }
    }
}

#[test]
fn test_div_enumerates_both_exceptions() {
    let matrix = build_matrix(&decode64(DIV_RCX));
    assert!(matrix.contains(&BitTarget::Exception(ExceptionKind::DivideError)));
    assert!(matrix.contains(&BitTarget::Exception(ExceptionKind::IntegerOverflow)));
}

#[test]
fn test_full_width_coverage_for_plain_add() {
    let matrix = build_matrix(&decode64(ADD_RAX_RBX));
    for bit in 0..64 {
        assert!(reg_target(&matrix, Register::RAX, bit, 0));
        assert!(reg_target(&matrix, Register::RAX, bit, 1));
    }
    for mask in [
        eflags::CF,
        eflags::PF,
        eflags::AF,
        eflags::ZF,
        eflags::SF,
        eflags::OF,
    ] {
        assert!(flag_target(&matrix, mask, 0));
        assert!(flag_target(&matrix, mask, 1));
    }
}

#[test]
fn test_matrix_is_deterministic() {
    let a = build_matrix(&decode64(ADD_RAX_RBX));
    let b = build_matrix(&decode64(ADD_RAX_RBX));
    assert_eq!(a, b);
}
