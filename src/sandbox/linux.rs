//! ptrace-based execution context for x86-64 Linux
//!
//! A forked child stops itself under ptrace after mapping one RWX page.
//! The parent pokes the instruction followed by an int3 fence into that
//! page, drives the child's registers through GETREGS/SETREGS, and resumes
//! it for exactly one instruction per trial. Signals delivered to the child
//! classify the outcome; they are suppressed on the next resume so a
//! faulted trial does not poison the following one.

use std::io;
use std::mem;
use std::ptr;

use anyhow::{bail, Context, Result};
use iced_x86::Register;
use libc::{c_void, pid_t, user_fpregs_struct, user_regs_struct};

use crate::disasm::{regs, Architecture};

use super::ExecutionStatus;

const CODE_PAGE_SIZE: usize = 4096;

// si_code values for SIGFPE, as the kernel defines them.
const FPE_INTDIV: i32 = 1;
const FPE_INTOVF: i32 = 2;

pub struct ScopedContext {
    child: pid_t,
    code_addr: u64,
    regs: user_regs_struct,
    fpregs: user_fpregs_struct,
    /// Set once XMM state has been staged; keeps the FP register traffic
    /// off the hot path for pure-GPR instructions.
    fp_active: bool,
    status: ExecutionStatus,
}

impl ScopedContext {
    /// Fork and trace a child, map its code page and install the
    /// instruction. Fails if the platform cannot host the requested mode.
    pub fn new(arch: Architecture, code: &[u8]) -> Result<Self> {
        if arch != Architecture::X86_64 {
            bail!("the execution sandbox only hosts 64-bit mode");
        }
        if code.is_empty() || code.len() > CODE_PAGE_SIZE - 16 {
            bail!("instruction length {} out of range", code.len());
        }

        let mut fds = [0i32; 2];
        if unsafe { libc::pipe(fds.as_mut_ptr()) } != 0 {
            return Err(io::Error::last_os_error()).context("pipe");
        }
        let (read_fd, write_fd) = (fds[0], fds[1]);

        let pid = unsafe { libc::fork() };
        if pid < 0 {
            unsafe {
                libc::close(read_fd);
                libc::close(write_fd);
            }
            return Err(io::Error::last_os_error()).context("fork");
        }

        if pid == 0 {
            // Child: only async-signal-safe calls from here on.
            unsafe {
                libc::close(read_fd);
                libc::ptrace(
                    libc::PTRACE_TRACEME,
                    0,
                    ptr::null_mut::<c_void>(),
                    ptr::null_mut::<c_void>(),
                );
                let page = libc::mmap(
                    ptr::null_mut(),
                    CODE_PAGE_SIZE,
                    libc::PROT_READ | libc::PROT_WRITE | libc::PROT_EXEC,
                    libc::MAP_PRIVATE | libc::MAP_ANONYMOUS,
                    -1,
                    0,
                );
                if page == libc::MAP_FAILED {
                    libc::_exit(1);
                }
                let addr = page as u64;
                libc::write(write_fd, &addr as *const u64 as *const c_void, 8);
                libc::close(write_fd);
                // The parent owns execution from the first stop onward; the
                // loop is only reached if it ever resumes us at our own code.
                loop {
                    libc::raise(libc::SIGSTOP);
                }
            }
        }

        unsafe {
            libc::close(write_fd);
        }

        let ctx = (|| -> Result<Self> {
            let mut addr = 0u64;
            let n = unsafe { libc::read(read_fd, &mut addr as *mut u64 as *mut c_void, 8) };
            unsafe {
                libc::close(read_fd);
            }
            if n != 8 {
                bail!("child failed to map its code page");
            }

            wait_for_stop(pid, libc::SIGSTOP)?;

            if unsafe {
                libc::ptrace(
                    libc::PTRACE_SETOPTIONS,
                    pid,
                    ptr::null_mut::<c_void>(),
                    libc::PTRACE_O_EXITKILL as *mut c_void,
                )
            } < 0
            {
                return Err(io::Error::last_os_error()).context("ptrace setoptions");
            }

            let mut ctx = Self {
                child: pid,
                code_addr: addr,
                regs: unsafe { mem::zeroed() },
                fpregs: unsafe { mem::zeroed() },
                fp_active: false,
                status: ExecutionStatus::Success,
            };
            ctx.poke_code(code)?;
            ctx.read_regs().context("initial register read")?;
            ctx.read_fpregs().context("initial fp register read")?;
            Ok(ctx)
        })();

        match ctx {
            Ok(ctx) => Ok(ctx),
            Err(e) => {
                unsafe {
                    libc::kill(pid, libc::SIGKILL);
                    libc::waitpid(pid, ptr::null_mut(), 0);
                }
                Err(e)
            }
        }
    }

    /// Address the instruction executes at inside the child.
    pub fn code_address(&self) -> u64 {
        self.code_addr
    }

    /// Stage the full byte image of a root register. GPR roots take up to
    /// 8 bytes, XMM registers exactly 16.
    pub fn set_reg_bytes(&mut self, reg: Register, bytes: &[u8]) {
        if reg.is_xmm() {
            let idx = reg.number() * 4;
            for (i, chunk) in bytes.chunks(4).take(4).enumerate() {
                let mut word = [0u8; 4];
                word[..chunk.len()].copy_from_slice(chunk);
                self.fpregs.xmm_space[idx + i] = u32::from_le_bytes(word);
            }
            self.fp_active = true;
            return;
        }

        let mut word = [0u8; 8];
        let len = bytes.len().min(8);
        word[..len].copy_from_slice(&bytes[..len]);
        let value = u64::from_le_bytes(word);
        if let Some(slot) = gpr_slot_mut(&mut self.regs, reg) {
            *slot = value;
        }
    }

    /// Read the byte image of a root register at its architectural width.
    pub fn get_reg_bytes(&self, reg: Register) -> Vec<u8> {
        if reg.is_xmm() {
            let idx = reg.number() * 4;
            let mut out = Vec::with_capacity(16);
            for i in 0..4 {
                out.extend_from_slice(&self.fpregs.xmm_space[idx + i].to_le_bytes());
            }
            return out;
        }

        let value = gpr_slot(&self.regs, reg).unwrap_or(0);
        let width = (regs::width_bits(reg) / 8).min(8);
        value.to_le_bytes()[..width].to_vec()
    }

    pub fn set_eflags(&mut self, value: u32) {
        self.regs.eflags = u64::from(value);
    }

    pub fn eflags(&self) -> u32 {
        self.regs.eflags as u32
    }

    /// Run the staged instruction once. Returns `false` on a fatal tracing
    /// failure; the classified outcome is read via `execution_status`.
    pub fn execute(&mut self) -> bool {
        self.regs.rip = self.code_addr;
        if !self.write_regs() {
            self.status = ExecutionStatus::Fault;
            return false;
        }

        if unsafe {
            libc::ptrace(
                libc::PTRACE_CONT,
                self.child,
                ptr::null_mut::<c_void>(),
                ptr::null_mut::<c_void>(),
            )
        } < 0
        {
            self.status = ExecutionStatus::Fault;
            return false;
        }

        let mut wstatus = 0i32;
        if unsafe { libc::waitpid(self.child, &mut wstatus, 0) } != self.child {
            self.status = ExecutionStatus::Fault;
            return false;
        }
        if !libc::WIFSTOPPED(wstatus) {
            // The child died; nothing left to trace.
            self.status = ExecutionStatus::Fault;
            return false;
        }

        self.status = match libc::WSTOPSIG(wstatus) {
            libc::SIGTRAP => ExecutionStatus::Success,
            libc::SIGFPE => match self.pending_si_code() {
                Some(FPE_INTDIV) => ExecutionStatus::ExceptionIntDivideError,
                Some(FPE_INTOVF) => ExecutionStatus::ExceptionIntOverflow,
                _ => ExecutionStatus::Fault,
            },
            libc::SIGILL => ExecutionStatus::IllegalInstruction,
            _ => ExecutionStatus::Fault,
        };

        if !self.read_regs_ok() {
            self.status = ExecutionStatus::Fault;
            return false;
        }
        if self.fp_active && self.read_fpregs().is_err() {
            self.status = ExecutionStatus::Fault;
            return false;
        }
        true
    }

    pub fn execution_status(&self) -> ExecutionStatus {
        self.status
    }

    fn pending_si_code(&self) -> Option<i32> {
        let mut si: libc::siginfo_t = unsafe { mem::zeroed() };
        let rc = unsafe {
            libc::ptrace(
                libc::PTRACE_GETSIGINFO,
                self.child,
                ptr::null_mut::<c_void>(),
                &mut si as *mut libc::siginfo_t as *mut c_void,
            )
        };
        (rc >= 0).then(|| si.si_code)
    }

    /// Install the instruction followed by an int3 fence.
    fn poke_code(&self, code: &[u8]) -> Result<()> {
        let mut image = code.to_vec();
        while image.len() % 8 != 0 {
            image.push(0xCC);
        }
        image.extend_from_slice(&[0xCC; 8]);

        for (i, chunk) in image.chunks(8).enumerate() {
            let mut word = [0u8; 8];
            word.copy_from_slice(chunk);
            let value = u64::from_le_bytes(word);
            let addr = self.code_addr + (i as u64) * 8;
            if unsafe {
                libc::ptrace(
                    libc::PTRACE_POKEDATA,
                    self.child,
                    addr as *mut c_void,
                    value as *mut c_void,
                )
            } < 0
            {
                return Err(io::Error::last_os_error()).context("ptrace pokedata");
            }
        }
        Ok(())
    }

    fn read_regs(&mut self) -> Result<()> {
        if self.read_regs_ok() {
            Ok(())
        } else {
            Err(io::Error::last_os_error()).context("ptrace getregs")
        }
    }

    fn read_regs_ok(&mut self) -> bool {
        unsafe {
            libc::ptrace(
                libc::PTRACE_GETREGS,
                self.child,
                ptr::null_mut::<c_void>(),
                &mut self.regs as *mut user_regs_struct as *mut c_void,
            ) >= 0
        }
    }

    fn write_regs(&mut self) -> bool {
        let ok = unsafe {
            libc::ptrace(
                libc::PTRACE_SETREGS,
                self.child,
                ptr::null_mut::<c_void>(),
                &mut self.regs as *mut user_regs_struct as *mut c_void,
            ) >= 0
        };
        if !ok {
            return false;
        }
        if self.fp_active {
            unsafe {
                libc::ptrace(
                    libc::PTRACE_SETFPREGS,
                    self.child,
                    ptr::null_mut::<c_void>(),
                    &mut self.fpregs as *mut user_fpregs_struct as *mut c_void,
                ) >= 0
            }
        } else {
            true
        }
    }

    fn read_fpregs(&mut self) -> Result<()> {
        let ok = unsafe {
            libc::ptrace(
                libc::PTRACE_GETFPREGS,
                self.child,
                ptr::null_mut::<c_void>(),
                &mut self.fpregs as *mut user_fpregs_struct as *mut c_void,
            ) >= 0
        };
        if ok {
            Ok(())
        } else {
            Err(io::Error::last_os_error()).context("ptrace getfpregs")
        }
    }
}

impl Drop for ScopedContext {
    fn drop(&mut self) {
        unsafe {
            libc::kill(self.child, libc::SIGKILL);
            libc::waitpid(self.child, ptr::null_mut(), 0);
        }
    }
}

fn wait_for_stop(pid: pid_t, expected_sig: i32) -> Result<()> {
    let mut wstatus = 0i32;
    if unsafe { libc::waitpid(pid, &mut wstatus, 0) } != pid {
        return Err(io::Error::last_os_error()).context("waitpid");
    }
    if !libc::WIFSTOPPED(wstatus) || libc::WSTOPSIG(wstatus) != expected_sig {
        bail!("child did not reach its initial stop (status {wstatus:#x})");
    }
    Ok(())
}

fn gpr_slot(regs: &user_regs_struct, reg: Register) -> Option<u64> {
    Some(match reg {
        Register::RAX => regs.rax,
        Register::RBX => regs.rbx,
        Register::RCX => regs.rcx,
        Register::RDX => regs.rdx,
        Register::RSI => regs.rsi,
        Register::RDI => regs.rdi,
        Register::RBP => regs.rbp,
        Register::RSP => regs.rsp,
        Register::R8 => regs.r8,
        Register::R9 => regs.r9,
        Register::R10 => regs.r10,
        Register::R11 => regs.r11,
        Register::R12 => regs.r12,
        Register::R13 => regs.r13,
        Register::R14 => regs.r14,
        Register::R15 => regs.r15,
        _ => return None,
    })
}

fn gpr_slot_mut(regs: &mut user_regs_struct, reg: Register) -> Option<&mut u64> {
    Some(match reg {
        Register::RAX => &mut regs.rax,
        Register::RBX => &mut regs.rbx,
        Register::RCX => &mut regs.rcx,
        Register::RDX => &mut regs.rdx,
        Register::RSI => &mut regs.rsi,
        Register::RDI => &mut regs.rdi,
        Register::RBP => &mut regs.rbp,
        Register::RSP => &mut regs.rsp,
        Register::R8 => &mut regs.r8,
        Register::R9 => &mut regs.r9,
        Register::R10 => &mut regs.r10,
        Register::R11 => &mut regs.r11,
        Register::R12 => &mut regs.r12,
        Register::R13 => &mut regs.r13,
        Register::R14 => &mut regs.r14,
        Register::R15 => &mut regs.r15,
        _ => return None,
    })
}
