//! The mnemonics the oracle generates corpora for
//!
//! Control-transfer, I/O, privileged, string and stack-manipulating
//! mnemonics are deliberately absent: they either escape the sandbox or
//! mutate state the execution context does not own.

use iced_x86::Mnemonic;

/// Stable table driving a full generation run, in output-file order.
pub static SUPPORTED_MNEMONICS: &[Mnemonic] = &[
    Mnemonic::Adc,
    Mnemonic::Adcx,
    Mnemonic::Add,
    Mnemonic::Addpd,
    Mnemonic::Addps,
    Mnemonic::Addsd,
    Mnemonic::Addss,
    Mnemonic::Adox,
    Mnemonic::And,
    Mnemonic::Andn,
    Mnemonic::Andnpd,
    Mnemonic::Andnps,
    Mnemonic::Andpd,
    Mnemonic::Andps,
    Mnemonic::Bextr,
    Mnemonic::Blsi,
    Mnemonic::Blsmsk,
    Mnemonic::Blsr,
    Mnemonic::Bsf,
    Mnemonic::Bsr,
    Mnemonic::Bswap,
    Mnemonic::Bt,
    Mnemonic::Btc,
    Mnemonic::Btr,
    Mnemonic::Bts,
    Mnemonic::Bzhi,
    Mnemonic::Cbw,
    Mnemonic::Cdq,
    Mnemonic::Cdqe,
    Mnemonic::Clc,
    Mnemonic::Cld,
    Mnemonic::Cmc,
    Mnemonic::Cmova,
    Mnemonic::Cmovae,
    Mnemonic::Cmovb,
    Mnemonic::Cmovbe,
    Mnemonic::Cmove,
    Mnemonic::Cmovg,
    Mnemonic::Cmovge,
    Mnemonic::Cmovl,
    Mnemonic::Cmovle,
    Mnemonic::Cmovne,
    Mnemonic::Cmovno,
    Mnemonic::Cmovnp,
    Mnemonic::Cmovns,
    Mnemonic::Cmovo,
    Mnemonic::Cmovp,
    Mnemonic::Cmovs,
    Mnemonic::Cmp,
    Mnemonic::Comisd,
    Mnemonic::Comiss,
    Mnemonic::Cqo,
    Mnemonic::Cwd,
    Mnemonic::Cwde,
    Mnemonic::Dec,
    Mnemonic::Div,
    Mnemonic::Divpd,
    Mnemonic::Divps,
    Mnemonic::Divsd,
    Mnemonic::Divss,
    Mnemonic::Idiv,
    Mnemonic::Imul,
    Mnemonic::Inc,
    Mnemonic::Lahf,
    Mnemonic::Lea,
    Mnemonic::Lzcnt,
    Mnemonic::Maxpd,
    Mnemonic::Maxps,
    Mnemonic::Minpd,
    Mnemonic::Minps,
    Mnemonic::Mov,
    Mnemonic::Movaps,
    Mnemonic::Movbe,
    Mnemonic::Movd,
    Mnemonic::Movdqa,
    Mnemonic::Movdqu,
    Mnemonic::Movq,
    Mnemonic::Movsx,
    Mnemonic::Movsxd,
    Mnemonic::Movups,
    Mnemonic::Movzx,
    Mnemonic::Mul,
    Mnemonic::Mulpd,
    Mnemonic::Mulps,
    Mnemonic::Mulsd,
    Mnemonic::Mulss,
    Mnemonic::Mulx,
    Mnemonic::Neg,
    Mnemonic::Nop,
    Mnemonic::Not,
    Mnemonic::Or,
    Mnemonic::Orpd,
    Mnemonic::Orps,
    Mnemonic::Paddb,
    Mnemonic::Paddd,
    Mnemonic::Paddq,
    Mnemonic::Paddw,
    Mnemonic::Pand,
    Mnemonic::Pandn,
    Mnemonic::Pavgb,
    Mnemonic::Pcmpeqb,
    Mnemonic::Pcmpeqd,
    Mnemonic::Pcmpeqw,
    Mnemonic::Pdep,
    Mnemonic::Pext,
    Mnemonic::Pmaxub,
    Mnemonic::Pminub,
    Mnemonic::Popcnt,
    Mnemonic::Por,
    Mnemonic::Psadbw,
    Mnemonic::Pshufd,
    Mnemonic::Pslld,
    Mnemonic::Psllq,
    Mnemonic::Psrld,
    Mnemonic::Psrlq,
    Mnemonic::Psubb,
    Mnemonic::Psubd,
    Mnemonic::Psubq,
    Mnemonic::Psubw,
    Mnemonic::Ptest,
    Mnemonic::Punpckhbw,
    Mnemonic::Punpcklbw,
    Mnemonic::Pxor,
    Mnemonic::Rcl,
    Mnemonic::Rcr,
    Mnemonic::Rol,
    Mnemonic::Ror,
    Mnemonic::Rorx,
    Mnemonic::Sahf,
    Mnemonic::Sar,
    Mnemonic::Sarx,
    Mnemonic::Sbb,
    Mnemonic::Seta,
    Mnemonic::Setae,
    Mnemonic::Setb,
    Mnemonic::Setbe,
    Mnemonic::Sete,
    Mnemonic::Setg,
    Mnemonic::Setge,
    Mnemonic::Setl,
    Mnemonic::Setle,
    Mnemonic::Setne,
    Mnemonic::Setno,
    Mnemonic::Setnp,
    Mnemonic::Setns,
    Mnemonic::Seto,
    Mnemonic::Setp,
    Mnemonic::Sets,
    Mnemonic::Shl,
    Mnemonic::Shld,
    Mnemonic::Shlx,
    Mnemonic::Shr,
    Mnemonic::Shrd,
    Mnemonic::Shrx,
    Mnemonic::Sub,
    Mnemonic::Subpd,
    Mnemonic::Subps,
    Mnemonic::Subsd,
    Mnemonic::Subss,
    Mnemonic::Test,
    Mnemonic::Tzcnt,
    Mnemonic::Ucomisd,
    Mnemonic::Ucomiss,
    Mnemonic::Xadd,
    Mnemonic::Xchg,
    Mnemonic::Xor,
    Mnemonic::Xorpd,
    Mnemonic::Xorps,
];

/// Lowercase name of a mnemonic, matching the corpus file names.
pub fn mnemonic_name(mnemonic: Mnemonic) -> String {
    format!("{mnemonic:?}").to_lowercase()
}

/// Resolve a supported mnemonic from its lowercase name.
pub fn mnemonic_by_name(name: &str) -> Option<Mnemonic> {
    SUPPORTED_MNEMONICS
        .iter()
        .copied()
        .find(|m| mnemonic_name(*m).eq_ignore_ascii_case(name))
}
