//! Per-encoding search loop
//!
//! For every target bit of an encoding: seed the destination with the
//! opposite polarity, stage the inputs, execute in the sandbox, classify
//! the result and capture the architectural state on a hit. Attempts per
//! target are bounded; targets that never land are logged and dropped.

use iced_x86::Register;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::corpus::{CaseEntry, TestGroup};
use crate::disasm::decoder::{DecodedInstr, InstrDecoder};
use crate::disasm::regs::{self, eflags};
use crate::disasm::Architecture;
use crate::inputs::InputGenerator;
use crate::matrix::{build_matrix, BitTarget, ExceptionKind};
use crate::sandbox::{ExecutionStatus, ScopedContext};

/// Retries the search allocates to a single target before declaring it
/// probably impossible.
pub const ABORT_TARGET_THRESHOLD: usize = 100_000;

/// Probe one encoding: run the search loop over its whole target matrix and
/// return the deduplicated group. Fatal sandbox failures return the group
/// in whatever state it reached; the caller filters on emptiness.
pub fn generate_group(arch: Architecture, code: &[u8]) -> TestGroup {
    let mut group = TestGroup::new(code.to_vec());
    probe(arch, &mut group);
    group.dedup_entries();
    group
}

fn probe(arch: Architecture, group: &mut TestGroup) {
    let decoder = InstrDecoder::new(arch);
    let instr = match decoder.decode(&group.bytes, 0) {
        Ok(instr) => instr,
        Err(e) => {
            println!("skipping undecodable encoding: {e}");
            return;
        }
    };

    // Immediates shrink the input space, so the budget shrinks with them.
    let max_attempts = if instr.has_immediate_input() {
        ABORT_TARGET_THRESHOLD / 3
    } else {
        ABORT_TARGET_THRESHOLD
    };

    let matrix = build_matrix(&instr);

    let mut ctx = match ScopedContext::new(arch, &group.bytes) {
        Ok(ctx) => ctx,
        Err(e) => {
            println!("failed to prepare context for {}: {e}", instr.text);
            return;
        }
    };

    group.address = ctx.code_address();

    let mut rng = StdRng::seed_from_u64(instr.mnemonic as u64);

    for target in &matrix {
        let mut entry = CaseEntry::default();
        let mut input_gens = make_input_generators(&mut rng, &instr);

        let mut hit = false;
        let mut illegal = false;
        let mut iteration = 0usize;

        while !hit && !illegal {
            // The destination must disagree with the target before the run.
            seed_opposite(&mut ctx, arch, target);

            stage_inputs(&mut ctx, &mut rng, &mut input_gens, &instr, &mut entry, iteration);

            if !ctx.execute() {
                println!("failed to execute {}", instr.text);
                return;
            }

            match ctx.execution_status() {
                ExecutionStatus::Success => {
                    if !matches!(target, BitTarget::Exception(_))
                        && target_hit(&ctx, arch, target)
                    {
                        capture_outputs(&ctx, &instr, &mut entry);
                        hit = true;
                    }
                }
                status @ (ExecutionStatus::ExceptionIntDivideError
                | ExecutionStatus::ExceptionIntOverflow) => {
                    let kind = if status == ExecutionStatus::ExceptionIntDivideError {
                        ExceptionKind::DivideError
                    } else {
                        ExceptionKind::IntegerOverflow
                    };
                    if *target == BitTarget::Exception(kind) {
                        entry.exception = Some(kind);
                        hit = true;
                    }
                    // Any other exception is noise; the iteration retries.
                }
                ExecutionStatus::IllegalInstruction => {
                    illegal = true;
                }
                ExecutionStatus::Fault => {
                    println!("execution fault on {}; dropping encoding", instr.text);
                    return;
                }
            }

            iteration += 1;
            if iteration > max_attempts {
                println!(
                    "test probably impossible: {} ; {}",
                    instr.text,
                    target.describe()
                );
                break;
            }
        }

        if illegal {
            println!("illegal instruction: {}", instr.text);
            group.illegal = true;
            break;
        }

        if hit {
            group.entries.push(entry);
        }
    }
}

/// One input generator per read register, in the read-set order.
fn make_input_generators(rng: &mut StdRng, instr: &DecodedInstr) -> Vec<InputGenerator> {
    regs::regs_read(instr)
        .iter()
        .map(|reg| InputGenerator::new(regs::width_bits(*reg), rng))
        .collect()
}

/// Fill the target's register and the status flags with the opposite of the
/// expected polarity so a hit is unambiguous.
fn seed_opposite(ctx: &mut ScopedContext, arch: Architecture, target: &BitTarget) {
    let expected = target.expected_value();

    if let BitTarget::Reg { reg, .. } = target {
        if !regs::is_filtered(*reg) {
            let reg_size = regs::width_bits(*reg) / 8;
            let offset = regs::byte_offset(*reg);
            let root = regs::root_register(arch, *reg);
            let root_size = regs::width_bits(root) / 8;

            let fill = if expected == 0 { 0xFF } else { 0x00 };
            let mut buf = vec![0u8; root_size];
            for b in buf.iter_mut().skip(offset).take(reg_size) {
                *b = fill;
            }
            ctx.set_reg_bytes(root, &buf);
        }
    }

    let flags = if expected == 0 { eflags::STATUS } else { 0 };
    ctx.set_eflags(flags);
}

/// Stage every read register from its generator, then advance the
/// generator chain and randomize the tested flags.
fn stage_inputs(
    ctx: &mut ScopedContext,
    rng: &mut StdRng,
    input_gens: &mut [InputGenerator],
    instr: &DecodedInstr,
    entry: &mut CaseEntry,
    iteration: usize,
) {
    let regs_read = regs::regs_read(instr);

    // Scrub the roots first so untouched bytes are recognizable garbage
    // rather than leftovers from the previous trial.
    let mut roots: Vec<Register> = regs_read
        .iter()
        .map(|reg| regs::root_register(instr.arch, *reg))
        .collect();
    roots.sort_by_key(|r| *r as u32);
    roots.dedup();
    for root in &roots {
        if regs::is_filtered(*root) {
            continue;
        }
        let size = regs::width_bits(*root) / 8;
        ctx.set_reg_bytes(*root, &vec![0xCC; size]);
    }

    for (reg, input_gen) in regs_read.iter().zip(input_gens.iter()) {
        if regs::is_filtered(*reg) {
            continue;
        }

        let used_size = regs::width_bits(*reg) / 8;
        let root = regs::root_register(instr.arch, *reg);
        let root_size = regs::width_bits(root) / 8;
        let offset = regs::byte_offset(*reg);

        // Splice into the current root image so sibling sub-registers
        // staged earlier survive.
        let mut buf = ctx.get_reg_bytes(root);
        buf.resize(root_size, 0);
        buf[offset..offset + used_size].copy_from_slice(&input_gen.current()[..used_size]);

        ctx.set_reg_bytes(root, &buf);
        entry.input_regs.insert(root, buf);
    }

    // Odometer advancement: the first generator steps every iteration and
    // carries into the next on rollover. Every third iteration the carry is
    // suppressed, which biases density toward the low-order generators.
    for input_gen in input_gens.iter_mut() {
        let rolled = input_gen.advance();
        if !rolled || (iteration + 1) % 3 == 0 {
            break;
        }
    }

    // Randomize the flags the instruction tests, on top of the seeded
    // value so untested flags keep their polarity.
    let mut flags = ctx.eflags();
    if instr.flags_tested != 0 {
        let mut staged = 0u32;
        for i in 0..32 {
            let bit = 1u32 << i;
            if instr.flags_tested & bit != 0 {
                let value = u32::from(rng.gen_range(0..2u8)) << i;
                staged |= value;
                flags = (flags & !bit) | value;
            }
        }
        entry.input_flags = Some(staged);
    }

    // The trap flag would turn the sandbox into a single-stepper.
    flags &= !eflags::TF;
    ctx.set_eflags(flags);
}

/// Whether the executed state shows the target's expected bit.
fn target_hit(ctx: &ScopedContext, arch: Architecture, target: &BitTarget) -> bool {
    match *target {
        BitTarget::Reg {
            reg,
            bit_pos,
            expected,
        } => {
            let root = regs::root_register(arch, reg);
            let data = ctx.get_reg_bytes(root);
            let offset = regs::byte_offset(reg) + usize::from(bit_pos) / 8;
            let bit = (data[offset] >> (bit_pos % 8)) & 1;
            bit == expected
        }
        BitTarget::Flag { bit_pos, expected } => {
            ((ctx.eflags() >> bit_pos) & 1) as u8 == expected
        }
        BitTarget::Exception(_) => false,
    }
}

/// Copy every written root register and the IF-masked flags into the entry.
fn capture_outputs(ctx: &ScopedContext, instr: &DecodedInstr, entry: &mut CaseEntry) {
    for reg in regs::regs_written(instr) {
        let root = regs::root_register(instr.arch, reg);
        let size = regs::width_bits(root) / 8;
        let mut data = ctx.get_reg_bytes(root);
        data.truncate(size);
        entry.output_regs.insert(root, data);
    }

    if instr.flags_modified != 0 {
        entry.output_flags = Some(ctx.eflags() & !eflags::IF);
    }
}
