//! Instruction-stepped Zilog Z80 CPU emulator.
//!
//! Each call to [`Z80::step`] (via [`emu_core::Cpu`]) executes exactly one
//! instruction and returns its T-state cost from the Zilog timing table.
//! The full instruction set is covered: unprefixed, CB, ED, DD/FD and the
//! DD CB/FD CB double prefixes, including the undocumented IXH/IXL/IYH/IYL
//! register forms and the X/Y result-flag copies.
//!
//! Interrupts follow the documented protocol: maskable requests are latched
//! with their data-bus byte and accepted at the next instruction boundary
//! when IFF1 is set (mode 0, 1 or 2); NMI is edge-triggered and jumps to
//! $0066. `EI` enables interrupts only after the following instruction.
//!
//! Holes in the ED page execute as 8 T-state no-ops and an orphan DD/FD
//! prefix costs 4 T-states, matching real hardware; no opcode panics.

mod alu;
mod cpu;
mod execute;
mod flags;
mod registers;

pub use cpu::Z80;
pub use flags::{CF, HF, NF, PF, SF, XF, YF, ZF};
pub use registers::Registers;
