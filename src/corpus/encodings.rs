//! Encoding enumeration
//!
//! Walks every `Code` value of the target mnemonic, instantiates its
//! operand template from a small palette of registers, immediates and
//! addressing forms, and keeps each byte sequence the encoder accepts.
//! Operand kinds outside the palette (segment, control, MMX, implied
//! stack) simply produce no encodings.

use iced_x86::{
    Code, Encoder, Instruction, MemoryOperand, Mnemonic, OpCodeOperandKind, Register,
};

use crate::disasm::Architecture;

/// Restricts enumeration to a set of mnemonics.
#[derive(Debug, Clone, Default)]
pub struct Filter {
    mnemonics: Vec<Mnemonic>,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mnemonic(mut self, mnemonic: Mnemonic) -> Self {
        self.mnemonics.push(mnemonic);
        self
    }

    fn matches(&self, mnemonic: Mnemonic) -> bool {
        self.mnemonics.is_empty() || self.mnemonics.contains(&mnemonic)
    }
}

/// All distinct encodings produced for a filter, stored as one flat byte
/// buffer with per-entry offsets.
#[derive(Debug, Default)]
pub struct EncodingCorpus {
    data: Vec<u8>,
    entry_offsets: Vec<(u32, u32)>,
}

impl EncodingCorpus {
    pub fn len(&self) -> usize {
        self.entry_offsets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entry_offsets.is_empty()
    }

    pub fn get(&self, index: usize) -> &[u8] {
        let (offset, len) = self.entry_offsets[index];
        &self.data[offset as usize..(offset + len) as usize]
    }

    pub fn iter(&self) -> impl Iterator<Item = &[u8]> {
        (0..self.len()).map(|i| self.get(i))
    }

    fn push(&mut self, bytes: &[u8]) {
        let offset = self.data.len() as u32;
        self.data.extend_from_slice(bytes);
        self.entry_offsets.push((offset, bytes.len() as u32));
    }

    /// Run `work` once per encoding across `threads` workers. Each worker
    /// pulls the next index from a shared cursor; `work` must bring its own
    /// state.
    pub fn for_each_parallel<F>(&self, threads: usize, work: F)
    where
        F: Fn(&[u8]) + Sync,
    {
        use std::sync::atomic::{AtomicUsize, Ordering};

        let cursor = AtomicUsize::new(0);
        let workers = threads.max(1).min(self.len().max(1));

        std::thread::scope(|scope| {
            for _ in 0..workers {
                scope.spawn(|| loop {
                    let index = cursor.fetch_add(1, Ordering::Relaxed);
                    if index >= self.len() {
                        break;
                    }
                    work(self.get(index));
                });
            }
        });
    }
}

/// One concrete operand drawn from the palette.
#[derive(Debug, Clone)]
enum OpChoice {
    Reg(Register),
    Imm(u64),
    Mem(MemForm),
}

/// Addressing form; turned into a `MemoryOperand` at encode time.
#[derive(Debug, Clone, Copy)]
struct MemForm {
    base: Register,
    index: Register,
    scale: u32,
    displ: i64,
    displ_size: u32,
}

impl MemForm {
    fn operand(&self) -> MemoryOperand {
        MemoryOperand::new(
            self.base,
            self.index,
            self.scale,
            self.displ,
            self.displ_size,
            false,
            Register::None,
        )
    }
}

const GPR8: &[Register] = &[Register::AL, Register::BL, Register::CL, Register::DL, Register::AH];
const GPR16: &[Register] = &[Register::AX, Register::BX, Register::CX, Register::DX];
const GPR32: &[Register] = &[Register::EAX, Register::EBX, Register::ECX, Register::EDX];
const GPR64: &[Register] = &[Register::RAX, Register::RBX, Register::RCX, Register::RDX];
const XMM: &[Register] = &[Register::XMM0, Register::XMM1, Register::XMM2];

/// Immediates biased the same way the input generator is: zero, small
/// values and a sign boundary.
const IMMEDIATES: &[u64] = &[0, 1, 5, 0x7F];

fn mem_forms(arch: Architecture) -> Vec<MemForm> {
    let (base, index, double) = match arch {
        Architecture::X86_64 => (Register::RBX, Register::RCX, Register::RAX),
        Architecture::X86 => (Register::EBX, Register::ECX, Register::EAX),
    };
    vec![
        // [base]
        MemForm {
            base,
            index: Register::None,
            scale: 1,
            displ: 0,
            displ_size: 0,
        },
        // [base+index*1]
        MemForm {
            base,
            index,
            scale: 1,
            displ: 0,
            displ_size: 0,
        },
        // [base+base*1]: the doubling form
        MemForm {
            base: double,
            index: double,
            scale: 1,
            displ: 0,
            displ_size: 0,
        },
        // [index*4]: scale with no base needs an explicit disp32
        MemForm {
            base: Register::None,
            index,
            scale: 4,
            displ: 0,
            displ_size: 4,
        },
        // [base+disp8]
        MemForm {
            base,
            index: Register::None,
            scale: 1,
            displ: 0x40,
            displ_size: 1,
        },
    ]
}

fn reg_choices(palette: &[Register]) -> Vec<OpChoice> {
    palette.iter().map(|r| OpChoice::Reg(*r)).collect()
}

fn imm_choices() -> Vec<OpChoice> {
    IMMEDIATES.iter().map(|v| OpChoice::Imm(*v)).collect()
}

fn mem_choices(arch: Architecture) -> Vec<OpChoice> {
    mem_forms(arch).into_iter().map(OpChoice::Mem).collect()
}

/// The palette for one operand slot, or `None` when the kind is outside
/// what the sandbox can drive.
fn operand_choices(
    kind: OpCodeOperandKind,
    arch: Architecture,
    include_memory: bool,
) -> Option<Vec<OpChoice>> {
    use OpCodeOperandKind as K;

    let mut choices = match kind {
        K::al => vec![OpChoice::Reg(Register::AL)],
        K::ax => vec![OpChoice::Reg(Register::AX)],
        K::eax => vec![OpChoice::Reg(Register::EAX)],
        K::rax => vec![OpChoice::Reg(Register::RAX)],
        K::cl => vec![OpChoice::Reg(Register::CL)],

        K::r8_reg | K::r8_opcode => reg_choices(GPR8),
        K::r16_reg | K::r16_opcode => reg_choices(GPR16),
        K::r32_reg | K::r32_opcode => reg_choices(GPR32),
        K::r64_reg | K::r64_opcode => reg_choices(GPR64),

        K::r8_or_mem => reg_choices(GPR8),
        K::r16_or_mem => reg_choices(GPR16),
        K::r32_or_mem => reg_choices(GPR32),
        K::r64_or_mem => reg_choices(GPR64),

        K::xmm_reg => reg_choices(XMM),
        K::xmm_or_mem => reg_choices(XMM),

        K::imm8 | K::imm8sex16 | K::imm8sex32 | K::imm8sex64 | K::imm16 | K::imm32
        | K::imm32sex64 | K::imm64 => imm_choices(),
        K::imm8_const_1 => vec![OpChoice::Imm(1)],

        K::mem => {
            if include_memory {
                mem_choices(arch)
            } else {
                return None;
            }
        }

        _ => return None,
    };

    if include_memory
        && matches!(
            kind,
            K::r8_or_mem | K::r16_or_mem | K::r32_or_mem | K::r64_or_mem | K::xmm_or_mem
        )
    {
        choices.extend(mem_choices(arch));
    }

    Some(choices)
}

fn build_instruction(code: Code, ops: &[OpChoice]) -> Option<Instruction> {
    use OpChoice::*;

    let instr = match ops {
        [] => Instruction::with(code),
        [Reg(a)] => Instruction::with1(code, *a).ok()?,
        [Mem(m)] => Instruction::with1(code, m.operand()).ok()?,
        [Imm(v)] => Instruction::with1(code, *v as i32).ok()?,
        [Reg(a), Reg(b)] => Instruction::with2(code, *a, *b).ok()?,
        [Reg(a), Mem(m)] => Instruction::with2(code, *a, m.operand()).ok()?,
        [Mem(m), Reg(b)] => Instruction::with2(code, m.operand(), *b).ok()?,
        [Reg(a), Imm(v)] => {
            if *v > i32::MAX as u64 {
                Instruction::with2(code, *a, *v).ok()?
            } else {
                Instruction::with2(code, *a, *v as i32).ok()?
            }
        }
        [Mem(m), Imm(v)] => Instruction::with2(code, m.operand(), *v as i32).ok()?,
        [Reg(a), Reg(b), Imm(v)] => Instruction::with3(code, *a, *b, *v as i32).ok()?,
        [Reg(a), Reg(b), Reg(c)] => Instruction::with3(code, *a, *b, *c).ok()?,
        [Reg(a), Mem(m), Imm(v)] => Instruction::with3(code, *a, m.operand(), *v as i32).ok()?,
        [Reg(a), Reg(b), Mem(m)] => Instruction::with3(code, *a, *b, m.operand()).ok()?,
        [Reg(a), Mem(m), Reg(c)] => Instruction::with3(code, *a, m.operand(), *c).ok()?,
        _ => return None,
    };
    Some(instr)
}

/// Enumerate every encoding of the filtered mnemonics valid under `arch`.
/// `progress` is called with (current, total) over the code table.
pub fn build(
    arch: Architecture,
    filter: &Filter,
    include_memory: bool,
    mut progress: impl FnMut(usize, usize),
) -> EncodingCorpus {
    let mut corpus = EncodingCorpus::default();
    let mut seen = std::collections::HashSet::new();

    let codes: Vec<Code> = Code::values().collect();
    let total = codes.len();

    for (index, code) in codes.into_iter().enumerate() {
        progress(index + 1, total);

        if code == Code::INVALID || !filter.matches(code.mnemonic()) {
            continue;
        }

        let op_code = code.op_code();
        if !op_code.is_instruction() {
            continue;
        }
        let mode_ok = match arch {
            Architecture::X86_64 => op_code.mode64(),
            Architecture::X86 => op_code.mode32(),
        };
        if !mode_ok {
            continue;
        }

        let op_count = op_code.op_count() as usize;
        if op_count > 3 {
            continue;
        }

        // LEA is an address computation; its memory operand never
        // dereferences, so the addressing forms are always enumerated.
        let memory_here = include_memory || code.mnemonic() == Mnemonic::Lea;

        let mut slots = Vec::with_capacity(op_count);
        let mut supported = true;
        for i in 0..op_count {
            match operand_choices(op_code.op_kind(i as u32), arch, memory_here) {
                Some(choices) => slots.push(choices),
                None => {
                    supported = false;
                    break;
                }
            }
        }
        if !supported {
            continue;
        }

        for combo in cartesian(&slots) {
            let Some(instr) = build_instruction(code, &combo) else {
                continue;
            };
            let mut encoder = Encoder::new(arch.bitness());
            if encoder.encode(&instr, 0).is_err() {
                continue;
            }
            let bytes = encoder.take_buffer();
            if seen.insert(bytes.clone()) {
                corpus.push(&bytes);
            }
        }
    }

    corpus
}

/// Cartesian product over the operand slots. An empty slot list yields the
/// single empty combination (no-operand instructions).
fn cartesian(slots: &[Vec<OpChoice>]) -> Vec<Vec<OpChoice>> {
    let mut combos: Vec<Vec<OpChoice>> = vec![Vec::new()];
    for slot in slots {
        let mut next = Vec::with_capacity(combos.len() * slot.len());
        for combo in &combos {
            for choice in slot {
                let mut extended = combo.clone();
                extended.push(choice.clone());
                next.push(extended);
            }
        }
        combos = next;
    }
    combos
}
