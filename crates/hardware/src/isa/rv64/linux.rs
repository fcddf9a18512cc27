//! Minimal Linux syscall emulation for RV64 guests.
//!
//! Supervisor calls reach this layer through the exception-handler state
//! machine: the handler captures the syscall arguments from committed
//! architectural state at construction, performs the host-side effect,
//! and reports a [`ProcessStateChange`] carrying the return value. Only
//! the calls needed by freestanding test programs are emulated; anything
//! else returns `-ENOSYS`.

use std::io::Write;

use crate::common::error::InstructionException;
use crate::common::reg::Register;
use crate::common::value::RegisterValue;
use crate::isa::{
    ExceptionContext, ExceptionHandler, ExceptionResult, Instruction, ProcessStateChange,
    register_type,
};
use crate::memory::MemoryAccessTarget;

/// `write` syscall number.
const SYS_WRITE: u64 = 64;
/// `exit` syscall number.
const SYS_EXIT: u64 = 93;
/// `exit_group` syscall number.
const SYS_EXIT_GROUP: u64 = 94;
/// `uname` syscall number.
const SYS_UNAME: u64 = 160;
/// `brk` syscall number.
const SYS_BRK: u64 = 214;

/// `-ENOSYS`, returned for unemulated calls.
const ENOSYS: u64 = (-38i64) as u64;

/// Length of each `utsname` field, terminator included.
const UTS_FIELD_LEN: usize = 65;

/// The `utsname` fields reported to the guest, in struct order:
/// sysname, nodename, release, version, machine, domainname.
const UTS_FIELDS: [&[u8]; 6] = [b"Linux", b"oosim", b"5.15.0", b"#1", b"riscv64", b""];

fn argument_register(index: i16) -> Register {
    // a0 is x10.
    Register::new(register_type::GENERAL, 10 + index)
}

/// Creates the handler for the exception recorded on `uop`.
pub fn handler_for(
    uop: &dyn Instruction,
    context: &ExceptionContext<'_>,
) -> Box<dyn ExceptionHandler> {
    match uop.exception() {
        Some(InstructionException::Syscall) => {
            Box::new(SyscallHandler::new(uop.address(), context))
        }
        exception => Box::new(FatalHandler {
            address: uop.address(),
            exception,
        }),
    }
}

/// One-cycle handler emulating a supervisor call.
pub struct SyscallHandler {
    result: ExceptionResult,
}

impl SyscallHandler {
    /// Captures arguments and performs the call's host-side effect.
    pub fn new(address: u64, context: &ExceptionContext<'_>) -> Self {
        let number = context
            .read_register(Register::new(register_type::GENERAL, 17))
            .as_u64();
        let args: Vec<u64> = (0..3)
            .map(|i| context.read_register(argument_register(i)).as_u64())
            .collect();

        let mut exit = None;
        let mut memory_writes = Vec::new();
        let return_value = match number {
            SYS_WRITE => {
                let (fd, buffer, length) = (args[0], args[1], args[2] as usize);
                let bytes = context.read_memory(buffer, length);
                match fd {
                    1 => {
                        std::io::stdout().write_all(bytes).ok();
                    }
                    2 => {
                        std::io::stderr().write_all(bytes).ok();
                    }
                    _ => {}
                }
                bytes.len() as u64
            }
            SYS_EXIT | SYS_EXIT_GROUP => {
                exit = Some(args[0]);
                0
            }
            SYS_UNAME => {
                let base = args[0];
                for (index, field) in UTS_FIELDS.iter().enumerate() {
                    let mut bytes = vec![0u8; UTS_FIELD_LEN];
                    bytes[..field.len()].copy_from_slice(field);
                    memory_writes.push((
                        MemoryAccessTarget::new(
                            base + (index * UTS_FIELD_LEN) as u64,
                            UTS_FIELD_LEN as u16,
                        ),
                        RegisterValue::new(bytes),
                    ));
                }
                0
            }
            // The guest owns its address space here; accept any break.
            SYS_BRK => args[0],
            _ => {
                tracing::debug!(number, "unemulated syscall");
                ENOSYS
            }
        };

        Self {
            result: ExceptionResult {
                fatal: false,
                exit,
                instruction_address: address + 4,
                state_change: ProcessStateChange {
                    register_writes: vec![(
                        argument_register(0),
                        RegisterValue::from_u64_full(return_value),
                    )],
                    memory_writes,
                },
            },
        }
    }
}

impl ExceptionHandler for SyscallHandler {
    fn tick(&mut self) -> bool {
        true
    }

    fn result(&self) -> ExceptionResult {
        self.result.clone()
    }
}

/// Handler for unrecoverable exceptions; halts the core.
pub struct FatalHandler {
    address: u64,
    exception: Option<InstructionException>,
}

impl ExceptionHandler for FatalHandler {
    fn tick(&mut self) -> bool {
        match self.exception {
            Some(exception) => {
                tracing::error!(address = self.address, %exception, "unhandled exception");
            }
            None => tracing::error!(address = self.address, "unhandled exception"),
        }
        true
    }

    fn result(&self) -> ExceptionResult {
        ExceptionResult {
            fatal: true,
            exit: None,
            instruction_address: self.address,
            state_change: ProcessStateChange::default(),
        }
    }
}
