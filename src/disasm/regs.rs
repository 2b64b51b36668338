//! Register metadata and register-set analysis
//!
//! Canonicalizes the overlapping x86 register file into the root registers
//! the execution context works with, and derives the read/written register
//! sets and EFLAGS masks of a decoded instruction.

use iced_x86::Register;

use super::decoder::{DecodedInstr, OperandKind};
use super::Architecture;

/// EFLAGS bit positions as the CPU defines them.
pub mod eflags {
    pub const CF: u32 = 1 << 0;
    pub const PF: u32 = 1 << 2;
    pub const AF: u32 = 1 << 4;
    pub const ZF: u32 = 1 << 6;
    pub const SF: u32 = 1 << 7;
    pub const TF: u32 = 1 << 8;
    pub const IF: u32 = 1 << 9;
    pub const DF: u32 = 1 << 10;
    pub const OF: u32 = 1 << 11;
    pub const AC: u32 = 1 << 18;

    /// Arithmetic status flags, used to seed the opposite polarity before a
    /// trial run.
    pub const STATUS: u32 = CF | PF | AF | ZF | SF | OF;
}

/// Translate an iced rflags mask (its own bit assignment) into real EFLAGS
/// bit positions. x87 condition bits have no EFLAGS home and are dropped.
pub fn rflags_to_eflags(mask: u32) -> u32 {
    use iced_x86::RflagsBits;

    let mut out = 0;
    let pairs = [
        (RflagsBits::CF, eflags::CF),
        (RflagsBits::PF, eflags::PF),
        (RflagsBits::AF, eflags::AF),
        (RflagsBits::ZF, eflags::ZF),
        (RflagsBits::SF, eflags::SF),
        (RflagsBits::IF, eflags::IF),
        (RflagsBits::DF, eflags::DF),
        (RflagsBits::OF, eflags::OF),
        (RflagsBits::AC, eflags::AC),
    ];
    for (iced_bit, eflags_bit) in pairs {
        if mask & iced_bit != 0 {
            out |= eflags_bit;
        }
    }
    out
}

/// Registers the oracle never stages or captures: the instruction pointer
/// and the absent register.
pub fn is_filtered(reg: Register) -> bool {
    matches!(reg, Register::None | Register::EIP | Register::RIP)
}

/// Width of a register in bits.
pub fn width_bits(reg: Register) -> usize {
    reg.size() * 8
}

/// Largest enclosing register under the given machine mode.
///
/// Only general-purpose registers are remapped; vector and other classes
/// are their own root. An unknown class passes through unchanged.
pub fn root_register(arch: Architecture, reg: Register) -> Register {
    if reg.is_gpr() {
        match arch {
            Architecture::X86_64 => reg.full_register(),
            Architecture::X86 => reg.full_register32(),
        }
    } else {
        reg
    }
}

/// Byte offset of a register inside its root. The legacy high-byte
/// registers live at offset 1; everything else starts at the low byte.
pub fn byte_offset(reg: Register) -> usize {
    match reg {
        Register::AH | Register::BH | Register::CH | Register::DH => 1,
        _ => 0,
    }
}

/// Lowercase register name as it appears in the corpus files.
pub fn name(reg: Register) -> String {
    format!("{reg:?}").to_lowercase()
}

/// Look a register up by its corpus-file name.
pub fn by_name(reg_name: &str) -> Option<Register> {
    Register::values().find(|r| name(*r).eq_ignore_ascii_case(reg_name))
}

/// The high-byte registers are promoted to their 16-bit alias so that input
/// staging always writes a contiguous buffer starting at offset zero.
fn promote_high_byte(reg: Register) -> Register {
    match reg {
        Register::AH => Register::AX,
        Register::BH => Register::BX,
        Register::CH => Register::CX,
        Register::DH => Register::DX,
        other => other,
    }
}

/// A register the analyzers will track: general purpose or XMM, not the
/// instruction pointer. Segment and control registers cannot be driven by
/// the execution context.
fn is_tracked(reg: Register) -> bool {
    !is_filtered(reg) && (reg.is_gpr() || reg.is_xmm())
}

/// Sort width-descending; ties broken by register id so the order is
/// deterministic for a given decoder.
fn sort_regs(mut regs: Vec<Register>) -> Vec<Register> {
    regs.sort_by_key(|r| (std::cmp::Reverse(width_bits(*r)), *r as u32));
    regs.dedup();
    regs
}

/// Registers the instruction writes, as the decoder names them (not yet
/// rooted). Implicit destinations are included.
pub fn regs_written(instr: &DecodedInstr) -> Vec<Register> {
    use iced_x86::OpAccess;

    let mut regs: Vec<Register> = instr
        .used_regs
        .iter()
        .filter(|u| {
            matches!(
                u.access,
                OpAccess::Write | OpAccess::CondWrite | OpAccess::ReadWrite | OpAccess::ReadCondWrite
            )
        })
        .map(|u| u.reg)
        .filter(|r| is_tracked(*r))
        .collect();
    regs.sort_by_key(|r| *r as u32);
    regs.dedup();
    sort_regs(regs)
}

/// Registers that feed the instruction: every register use (destinations
/// included, since partial writes preserve upper bits) plus memory base and
/// index registers, canonicalized to one alias per root register.
pub fn regs_read(instr: &DecodedInstr) -> Vec<Register> {
    let mut regs: Vec<Register> = instr
        .used_regs
        .iter()
        .map(|u| u.reg)
        .filter(|r| is_tracked(*r))
        .collect();

    for op in &instr.operands {
        if let OperandKind::Memory(mem) = &op.kind {
            for reg in [mem.base, mem.index] {
                if is_tracked(reg) {
                    regs.push(reg);
                }
            }
        }
    }

    regs.sort_by_key(|r| *r as u32);
    regs.dedup();

    // Overlapping aliases collapse to the widest one per root.
    let mut per_root: Vec<(Register, Register)> = Vec::new();
    for reg in regs {
        let root = root_register(instr.arch, reg);
        let alias = promote_high_byte(reg);
        match per_root.iter_mut().find(|(r, _)| *r == root) {
            Some((_, kept)) => {
                if width_bits(alias) > width_bits(*kept) {
                    *kept = alias;
                }
            }
            None => per_root.push((root, alias)),
        }
    }

    sort_regs(per_root.into_iter().map(|(_, alias)| alias).collect())
}
