//! Bit-matrix builder
//!
//! Derives the list of target bits for one decoded instruction. A small
//! semantic pre-analysis prunes targets the encoding can never produce
//! (same-register sources, zero immediates, scaled address computations)
//! so the search loop does not burn its attempt budget on them.

use iced_x86::{Mnemonic, Register};

use crate::disasm::decoder::DecodedInstr;
use crate::disasm::regs::{self, eflags};

use super::{BitTarget, ExceptionKind};

/// The SETcc family writes a single 0/1 byte.
fn is_setcc(mnemonic: Mnemonic) -> bool {
    matches!(
        mnemonic,
        Mnemonic::Seta
            | Mnemonic::Setae
            | Mnemonic::Setb
            | Mnemonic::Setbe
            | Mnemonic::Sete
            | Mnemonic::Setg
            | Mnemonic::Setge
            | Mnemonic::Setl
            | Mnemonic::Setle
            | Mnemonic::Setne
            | Mnemonic::Setno
            | Mnemonic::Setnp
            | Mnemonic::Setns
            | Mnemonic::Seto
            | Mnemonic::Setp
            | Mnemonic::Sets
    )
}

/// Exceptions an instruction can raise that the oracle witnesses.
fn exception_targets(mnemonic: Mnemonic) -> Vec<ExceptionKind> {
    match mnemonic {
        Mnemonic::Div => vec![ExceptionKind::DivideError, ExceptionKind::IntegerOverflow],
        _ => Vec::new(),
    }
}

/// Build the ordered target list for one instruction: register bits first,
/// then EFLAGS bits, then exceptions.
pub fn build_matrix(instr: &DecodedInstr) -> Vec<BitTarget> {
    let regs_written = regs::regs_written(instr);

    let mut matrix = Vec::new();

    let same_reg_src_dest = match (instr.op_register(0), instr.op_register(1)) {
        (Some(a), Some(b)) => a == b,
        _ => false,
    };

    let input_is_immediate = instr.has_immediate_input();
    let imm1 = instr.immediate(1);
    let right_imm_zero = imm1 == Some(0);

    let mut result_always_zero = match instr.mnemonic {
        Mnemonic::Sub | Mnemonic::Cmp | Mnemonic::Xor => same_reg_src_dest,
        Mnemonic::And | Mnemonic::Test | Mnemonic::Mov => right_imm_zero,
        _ => false,
    };

    let first_bit_always_zero = match instr.mnemonic {
        Mnemonic::Add | Mnemonic::Fadd => same_reg_src_dest,
        // [base+base*1] with no displacement doubles the base, so bit 0 of
        // the address is always clear.
        Mnemonic::Lea => instr
            .op_memory(1)
            .map(|mem| {
                mem.base != Register::None && mem.index == mem.base && mem.displacement == 0
            })
            .unwrap_or(false),
        _ => false,
    };

    let mut num_bits_zero = 0u16;
    if instr.mnemonic == Mnemonic::Lea {
        if let Some(mem) = instr.op_memory(1) {
            if mem.base == Register::None
                && mem.index != Register::None
                && mem.scale > 1
                && mem.displacement == 0
            {
                // The scale is a power of two; it shifts that many low bits
                // out of reach.
                num_bits_zero = mem.scale.trailing_zeros() as u16;
            }
        }
    }

    for &reg in &regs_written {
        let reg_size = regs::width_bits(reg) as u16;

        let mut max_bits = reg_size;
        match instr.mnemonic {
            m if is_setcc(m) => max_bits = 1,
            Mnemonic::Lea => max_bits = instr.address_width as u16,
            Mnemonic::Bswap => {
                // Byte-swapping a 16-bit register leaves nothing defined;
                // hardware zeroes the word.
                result_always_zero = reg_size <= 16;
            }
            _ => {}
        }

        for bit_pos in 0..reg_size {
            // SETcc only ever produces 0 or 1; the upper bits belong to the
            // preserved destination, not to the instruction.
            if is_setcc(instr.mnemonic) && bit_pos >= max_bits {
                continue;
            }

            let mut test_zero = true;
            let mut test_one =
                bit_pos >= num_bits_zero && !result_always_zero && bit_pos < max_bits;

            if let Some(imm) = imm1 {
                match instr.mnemonic {
                    Mnemonic::Mov => {
                        // The input value is known, so each output bit is too.
                        test_zero = imm & (1u64 << bit_pos) == 0;
                        test_one = imm & (1u64 << bit_pos) != 0;
                    }
                    Mnemonic::Or => {
                        // A set input bit can never produce a clear output bit.
                        test_zero = imm & (1u64 << bit_pos) == 0;
                    }
                    Mnemonic::And => {
                        // A clear input bit can never produce a set output bit.
                        test_one = imm & (1u64 << bit_pos) != 0;
                    }
                    Mnemonic::Btr => {
                        // BTR clears exactly reg[imm mod width].
                        test_one = imm % u64::from(instr.operand_width) != u64::from(bit_pos);
                    }
                    _ => {}
                }
            }

            if test_zero {
                matrix.push(BitTarget::Reg {
                    reg,
                    bit_pos,
                    expected: 0,
                });
            }

            if bit_pos == 0 && first_bit_always_zero {
                test_one = false;
            }

            if test_one {
                matrix.push(BitTarget::Reg {
                    reg,
                    bit_pos,
                    expected: 1,
                });
            }
        }
    }

    for i in 0..32u16 {
        let flag = 1u32 << i;

        if !input_is_immediate && instr.flags_modified & flag != 0 {
            let mut test_flag_zero = true;
            let mut test_flag_one = true;

            match flag {
                eflags::ZF | eflags::PF => {
                    // A forced-zero result forces these to 1.
                    test_flag_zero = !result_always_zero;
                }
                eflags::CF | eflags::AF => {
                    test_flag_one = !result_always_zero && !right_imm_zero;
                }
                eflags::OF => {
                    test_flag_one = !same_reg_src_dest && !right_imm_zero;
                }
                eflags::SF => {
                    test_flag_one = !result_always_zero;
                }
                _ => {}
            }

            if test_flag_zero {
                matrix.push(BitTarget::Flag {
                    bit_pos: i,
                    expected: 0,
                });
            }
            if test_flag_one {
                matrix.push(BitTarget::Flag {
                    bit_pos: i,
                    expected: 1,
                });
            }
        }

        if instr.flags_set0 & flag != 0 {
            matrix.push(BitTarget::Flag {
                bit_pos: i,
                expected: 0,
            });
        }
        if instr.flags_set1 & flag != 0 {
            matrix.push(BitTarget::Flag {
                bit_pos: i,
                expected: 1,
            });
        }
    }

    for exception in exception_targets(instr.mnemonic) {
        matrix.push(BitTarget::Exception(exception));
    }

    matrix
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::disasm::decoder::InstrDecoder;
    use crate::disasm::Architecture;

    fn matrix_for(bytes: &[u8]) -> Vec<BitTarget> {
        let instr = InstrDecoder::new(Architecture::X86_64)
            .decode(bytes, 0x1000)
            .expect("decode");
        build_matrix(&instr)
    }

    fn has_reg_target(matrix: &[BitTarget], reg: Register, bit: u16, expected: u8) -> bool {
        matrix.contains(&BitTarget::Reg {
            reg,
            bit_pos: bit,
            expected,
        })
    }

    fn flag_bit(mask: u32) -> u16 {
        mask.trailing_zeros() as u16
    }

    #[test]
    fn test_xor_same_reg_has_no_one_targets() {
        // XOR EAX, EAX (31 C0)
        let matrix = matrix_for(&[0x31, 0xC0]);
        for bit in 0..32 {
            assert!(has_reg_target(&matrix, Register::EAX, bit, 0));
            assert!(!has_reg_target(&matrix, Register::EAX, bit, 1));
        }
    }

    #[test]
    fn test_xor_same_reg_flag_targets() {
        let matrix = matrix_for(&[0x31, 0xC0]);
        // ZF is forced to 1; its zero polarity is unreachable.
        assert!(!matrix.contains(&BitTarget::Flag {
            bit_pos: flag_bit(eflags::ZF),
            expected: 0
        }));
        assert!(matrix.contains(&BitTarget::Flag {
            bit_pos: flag_bit(eflags::ZF),
            expected: 1
        }));
        // CF and OF are unconditionally cleared.
        assert!(matrix.contains(&BitTarget::Flag {
            bit_pos: flag_bit(eflags::CF),
            expected: 0
        }));
        assert!(!matrix.contains(&BitTarget::Flag {
            bit_pos: flag_bit(eflags::CF),
            expected: 1
        }));
        assert!(!matrix.contains(&BitTarget::Flag {
            bit_pos: flag_bit(eflags::OF),
            expected: 1
        }));
    }

    #[test]
    fn test_xor_distinct_regs_has_both_polarities() {
        // XOR EAX, EBX (31 D8)
        let matrix = matrix_for(&[0x31, 0xD8]);
        assert!(has_reg_target(&matrix, Register::EAX, 0, 0));
        assert!(has_reg_target(&matrix, Register::EAX, 0, 1));
        assert!(has_reg_target(&matrix, Register::EAX, 31, 1));
    }

    #[test]
    fn test_add_rax_rbx_covers_all_bits_and_flags() {
        // ADD RAX, RBX (48 01 D8)
        let matrix = matrix_for(&[0x48, 0x01, 0xD8]);
        for bit in 0..64 {
            assert!(has_reg_target(&matrix, Register::RAX, bit, 0));
            assert!(has_reg_target(&matrix, Register::RAX, bit, 1));
        }
        for mask in [
            eflags::CF,
            eflags::PF,
            eflags::AF,
            eflags::ZF,
            eflags::SF,
            eflags::OF,
        ] {
            for expected in [0, 1] {
                assert!(matrix.contains(&BitTarget::Flag {
                    bit_pos: flag_bit(mask),
                    expected
                }));
            }
        }
    }

    #[test]
    fn test_add_same_reg_first_bit() {
        // ADD RAX, RAX (48 01 C0): doubling always clears bit 0.
        let matrix = matrix_for(&[0x48, 0x01, 0xC0]);
        assert!(has_reg_target(&matrix, Register::RAX, 0, 0));
        assert!(!has_reg_target(&matrix, Register::RAX, 0, 1));
        assert!(has_reg_target(&matrix, Register::RAX, 1, 1));
    }

    #[test]
    fn test_mov_imm_targets_follow_value() {
        // MOV EAX, 0xDEADBEEF (B8 EF BE AD DE)
        let matrix = matrix_for(&[0xB8, 0xEF, 0xBE, 0xAD, 0xDE]);
        let imm: u64 = 0xDEAD_BEEF;
        for bit in 0..32u16 {
            let set = imm & (1 << bit) != 0;
            assert_eq!(has_reg_target(&matrix, Register::EAX, bit, 1), set);
            assert_eq!(has_reg_target(&matrix, Register::EAX, bit, 0), !set);
        }
    }

    #[test]
    fn test_mov_imm_has_no_flag_targets() {
        let matrix = matrix_for(&[0xB8, 0xEF, 0xBE, 0xAD, 0xDE]);
        assert!(!matrix
            .iter()
            .any(|t| matches!(t, BitTarget::Flag { .. })));
    }

    #[test]
    fn test_lea_base_plus_base() {
        // LEA RAX, [RBX+RBX*1] (48 8D 04 1B)
        let matrix = matrix_for(&[0x48, 0x8D, 0x04, 0x1B]);
        assert!(!has_reg_target(&matrix, Register::RAX, 0, 1));
        assert!(has_reg_target(&matrix, Register::RAX, 0, 0));
        assert!(has_reg_target(&matrix, Register::RAX, 1, 1));
    }

    #[test]
    fn test_lea_scaled_index_clears_low_bits() {
        // LEA RAX, [RCX*4] (48 8D 04 8D 00 00 00 00)
        let matrix = matrix_for(&[0x48, 0x8D, 0x04, 0x8D, 0x00, 0x00, 0x00, 0x00]);
        assert!(!has_reg_target(&matrix, Register::RAX, 0, 1));
        assert!(!has_reg_target(&matrix, Register::RAX, 1, 1));
        assert!(has_reg_target(&matrix, Register::RAX, 2, 1));
        assert!(has_reg_target(&matrix, Register::RAX, 0, 0));
    }

    #[test]
    fn test_btr_imm_excludes_cleared_bit() {
        // BTR EAX, 5 (0F BA F0 05)
        let matrix = matrix_for(&[0x0F, 0xBA, 0xF0, 0x05]);
        assert!(!has_reg_target(&matrix, Register::EAX, 5, 1));
        assert!(has_reg_target(&matrix, Register::EAX, 5, 0));
        assert!(has_reg_target(&matrix, Register::EAX, 4, 1));
        assert!(has_reg_target(&matrix, Register::EAX, 6, 1));
    }

    #[test]
    fn test_and_imm_limits_one_targets() {
        // AND EAX, 0xFF (25 FF 00 00 00)
        let matrix = matrix_for(&[0x25, 0xFF, 0x00, 0x00, 0x00]);
        assert!(has_reg_target(&matrix, Register::EAX, 7, 1));
        assert!(!has_reg_target(&matrix, Register::EAX, 8, 1));
        assert!(has_reg_target(&matrix, Register::EAX, 8, 0));
    }

    #[test]
    fn test_or_imm_limits_zero_targets() {
        // OR EAX, 0xFF (0D FF 00 00 00)
        let matrix = matrix_for(&[0x0D, 0xFF, 0x00, 0x00, 0x00]);
        assert!(!has_reg_target(&matrix, Register::EAX, 0, 0));
        assert!(has_reg_target(&matrix, Register::EAX, 0, 1));
        assert!(has_reg_target(&matrix, Register::EAX, 8, 0));
    }

    #[test]
    fn test_setcc_only_bit_zero() {
        // SETE AL (0F 94 C0)
        let matrix = matrix_for(&[0x0F, 0x94, 0xC0]);
        assert!(has_reg_target(&matrix, Register::AL, 0, 0));
        assert!(has_reg_target(&matrix, Register::AL, 0, 1));
        for bit in 1..8 {
            assert!(!has_reg_target(&matrix, Register::AL, bit, 0));
            assert!(!has_reg_target(&matrix, Register::AL, bit, 1));
        }
    }

    #[test]
    fn test_div_has_exception_targets() {
        // DIV RCX (48 F7 F1)
        let matrix = matrix_for(&[0x48, 0xF7, 0xF1]);
        assert!(matrix.contains(&BitTarget::Exception(ExceptionKind::DivideError)));
        assert!(matrix.contains(&BitTarget::Exception(ExceptionKind::IntegerOverflow)));
    }

    #[test]
    fn test_bswap_r32_keeps_both_polarities() {
        // BSWAP EAX (0F C8)
        let matrix = matrix_for(&[0x0F, 0xC8]);
        assert!(has_reg_target(&matrix, Register::EAX, 0, 1));
        assert!(has_reg_target(&matrix, Register::EAX, 31, 1));
    }

    #[test]
    fn test_bswap_r16_only_zero_targets() {
        // BSWAP AX (66 0F C8): the low word ends up zeroed.
        let matrix = matrix_for(&[0x66, 0x0F, 0xC8]);
        for bit in 0..16 {
            assert!(has_reg_target(&matrix, Register::AX, bit, 0));
            assert!(!has_reg_target(&matrix, Register::AX, bit, 1));
        }
    }

    #[test]
    fn test_sub_same_reg_result_always_zero() {
        // SUB RAX, RAX (48 29 C0)
        let matrix = matrix_for(&[0x48, 0x29, 0xC0]);
        for bit in 0..64 {
            assert!(!has_reg_target(&matrix, Register::RAX, bit, 1));
        }
        // SF can never go negative on a zero result.
        assert!(!matrix.contains(&BitTarget::Flag {
            bit_pos: flag_bit(eflags::SF),
            expected: 1
        }));
    }
}
