//! Z80 CPU state and the stepping/interrupt protocol.

use emu_core::{Bus, Cpu};

use crate::registers::Registers;

/// Which register pair stands in for HL during decoding.
///
/// A DD or FD prefix switches the following instruction to IX or IY; the
/// decoder is written once against HL and substitutes through this mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Index {
    Hl,
    Ix,
    Iy,
}

/// The Z80 CPU.
pub struct Z80 {
    pub regs: Registers,
    /// Latched maskable-interrupt data-bus byte.
    pub int_pending: Option<u8>,
    /// Latched non-maskable interrupt.
    pub nmi_pending: bool,
    /// Set by EI: interrupts are recognised only after the next instruction.
    pub ei_delay: bool,
}

impl Z80 {
    #[must_use]
    pub fn new() -> Self {
        Self {
            regs: Registers {
                sp: 0xFFFF,
                ..Registers::default()
            },
            int_pending: None,
            nmi_pending: false,
            ei_delay: false,
        }
    }

    // -----------------------------------------------------------------------
    // Bus access helpers
    // -----------------------------------------------------------------------

    /// Fetch the byte at PC and advance (operand fetch, no refresh).
    pub(crate) fn fetch<B: Bus>(&mut self, bus: &mut B) -> u8 {
        let byte = bus.read(self.regs.pc);
        self.regs.pc = self.regs.pc.wrapping_add(1);
        byte
    }

    /// Fetch an opcode at PC (M1 cycle: increments R).
    pub(crate) fn fetch_opcode<B: Bus>(&mut self, bus: &mut B) -> u8 {
        self.regs.inc_r();
        self.fetch(bus)
    }

    /// Fetch a little-endian 16-bit operand.
    pub(crate) fn fetch16<B: Bus>(&mut self, bus: &mut B) -> u16 {
        let lo = self.fetch(bus);
        let hi = self.fetch(bus);
        u16::from(hi) << 8 | u16::from(lo)
    }

    pub(crate) fn read16<B: Bus>(&mut self, bus: &mut B, addr: u16) -> u16 {
        let lo = bus.read(addr);
        let hi = bus.read(addr.wrapping_add(1));
        u16::from(hi) << 8 | u16::from(lo)
    }

    pub(crate) fn write16<B: Bus>(&mut self, bus: &mut B, addr: u16, value: u16) {
        bus.write(addr, value as u8);
        bus.write(addr.wrapping_add(1), (value >> 8) as u8);
    }

    pub(crate) fn push16<B: Bus>(&mut self, bus: &mut B, value: u16) {
        self.regs.sp = self.regs.sp.wrapping_sub(1);
        bus.write(self.regs.sp, (value >> 8) as u8);
        self.regs.sp = self.regs.sp.wrapping_sub(1);
        bus.write(self.regs.sp, value as u8);
    }

    pub(crate) fn pop16<B: Bus>(&mut self, bus: &mut B) -> u16 {
        let lo = bus.read(self.regs.sp);
        self.regs.sp = self.regs.sp.wrapping_add(1);
        let hi = bus.read(self.regs.sp);
        self.regs.sp = self.regs.sp.wrapping_add(1);
        u16::from(hi) << 8 | u16::from(lo)
    }

    // -----------------------------------------------------------------------
    // Register access with index substitution
    // -----------------------------------------------------------------------

    /// The HL-family pair for the current index mode.
    pub(crate) fn get_hl(&self, idx: Index) -> u16 {
        match idx {
            Index::Hl => self.regs.hl(),
            Index::Ix => self.regs.ix,
            Index::Iy => self.regs.iy,
        }
    }

    pub(crate) fn set_hl(&mut self, idx: Index, value: u16) {
        match idx {
            Index::Hl => self.regs.set_hl(value),
            Index::Ix => self.regs.ix = value,
            Index::Iy => self.regs.iy = value,
        }
    }

    /// 8-bit register by decode field (0-5, 7), with H/L substituted by the
    /// index-register halves under DD/FD.
    pub(crate) fn get_r(&self, r: u8, idx: Index) -> u8 {
        match (r, idx) {
            (0, _) => self.regs.b,
            (1, _) => self.regs.c,
            (2, _) => self.regs.d,
            (3, _) => self.regs.e,
            (4, Index::Hl) => self.regs.h,
            (4, Index::Ix) => (self.regs.ix >> 8) as u8,
            (4, Index::Iy) => (self.regs.iy >> 8) as u8,
            (5, Index::Hl) => self.regs.l,
            (5, Index::Ix) => self.regs.ix as u8,
            (5, Index::Iy) => self.regs.iy as u8,
            (7, _) => self.regs.a,
            _ => unreachable!("register field 6 is a memory operand"),
        }
    }

    pub(crate) fn set_r(&mut self, r: u8, idx: Index, value: u8) {
        match (r, idx) {
            (0, _) => self.regs.b = value,
            (1, _) => self.regs.c = value,
            (2, _) => self.regs.d = value,
            (3, _) => self.regs.e = value,
            (4, Index::Hl) => self.regs.h = value,
            (4, Index::Ix) => self.regs.ix = (self.regs.ix & 0x00FF) | u16::from(value) << 8,
            (4, Index::Iy) => self.regs.iy = (self.regs.iy & 0x00FF) | u16::from(value) << 8,
            (5, Index::Hl) => self.regs.l = value,
            (5, Index::Ix) => self.regs.ix = (self.regs.ix & 0xFF00) | u16::from(value),
            (5, Index::Iy) => self.regs.iy = (self.regs.iy & 0xFF00) | u16::from(value),
            (7, _) => self.regs.a = value,
            _ => unreachable!("register field 6 is a memory operand"),
        }
    }

    /// Effective address for a `(HL)` / `(IX+d)` / `(IY+d)` operand.
    ///
    /// For the indexed forms this fetches the displacement byte and updates
    /// WZ with the computed address.
    pub(crate) fn mem_addr<B: Bus>(&mut self, bus: &mut B, idx: Index) -> u16 {
        match idx {
            Index::Hl => self.regs.hl(),
            Index::Ix | Index::Iy => {
                let d = self.fetch(bus) as i8;
                let addr = self.get_hl(idx).wrapping_add_signed(i16::from(d));
                self.regs.wz = addr;
                addr
            }
        }
    }

    /// Condition-code field decode (0-7: NZ Z NC C PO PE P M).
    pub(crate) fn condition(&self, cc: u8) -> bool {
        use crate::flags::{CF, PF, SF, ZF};
        match cc {
            0 => self.regs.f & ZF == 0,
            1 => self.regs.f & ZF != 0,
            2 => self.regs.f & CF == 0,
            3 => self.regs.f & CF != 0,
            4 => self.regs.f & PF == 0,
            5 => self.regs.f & PF != 0,
            6 => self.regs.f & SF == 0,
            _ => self.regs.f & SF != 0,
        }
    }

    // -----------------------------------------------------------------------
    // Interrupt acceptance
    // -----------------------------------------------------------------------

    fn accept_nmi<B: Bus>(&mut self, bus: &mut B) -> u32 {
        self.nmi_pending = false;
        self.regs.halted = false;
        self.regs.iff2 = self.regs.iff1;
        self.regs.iff1 = false;
        self.regs.inc_r();
        let pc = self.regs.pc;
        self.push16(bus, pc);
        self.regs.pc = 0x0066;
        self.regs.wz = 0x0066;
        11
    }

    fn accept_int<B: Bus>(&mut self, bus: &mut B, data: u8) -> u32 {
        self.regs.halted = false;
        self.regs.iff1 = false;
        self.regs.iff2 = false;
        self.regs.inc_r();
        let pc = self.regs.pc;
        match self.regs.im {
            0 => {
                // Mode 0 executes the byte the device places on the bus. Only
                // the RST family occurs on this bus; anything else is a no-op.
                if data & 0xC7 == 0xC7 {
                    self.push16(bus, pc);
                    self.regs.pc = u16::from(data & 0x38);
                    self.regs.wz = self.regs.pc;
                }
                13
            }
            1 => {
                self.push16(bus, pc);
                self.regs.pc = 0x0038;
                self.regs.wz = 0x0038;
                13
            }
            _ => {
                self.push16(bus, pc);
                let table = u16::from(self.regs.i) << 8 | u16::from(data);
                self.regs.pc = self.read16(bus, table);
                self.regs.wz = self.regs.pc;
                19
            }
        }
    }
}

impl Default for Z80 {
    fn default() -> Self {
        Self::new()
    }
}

impl Cpu for Z80 {
    fn step<B: Bus>(&mut self, bus: &mut B) -> u32 {
        if self.nmi_pending {
            return self.accept_nmi(bus);
        }

        if !self.ei_delay
            && self.regs.iff1
            && let Some(data) = self.int_pending.take()
        {
            return self.accept_int(bus, data);
        }
        self.ei_delay = false;

        if self.regs.halted {
            // HALT executes NOPs until an interrupt arrives.
            self.regs.inc_r();
            return 4;
        }

        // Collect DD/FD prefixes (each one is a 4 T-state fetch), then
        // dispatch on the operation page.
        let mut idx = Index::Hl;
        let mut prefix_cycles = 0u32;
        loop {
            let op = self.fetch_opcode(bus);
            match op {
                0xDD => {
                    idx = Index::Ix;
                    prefix_cycles += 4;
                }
                0xFD => {
                    idx = Index::Iy;
                    prefix_cycles += 4;
                }
                0xCB => return prefix_cycles + self.execute_cb(bus, idx),
                0xED => return prefix_cycles + self.execute_ed(bus),
                _ => return prefix_cycles + self.execute_main(bus, op, idx),
            }
        }
    }

    fn request_interrupt(&mut self, data: u8) {
        self.int_pending = Some(data);
    }

    fn request_nmi(&mut self) {
        self.nmi_pending = true;
    }

    fn reset(&mut self) {
        self.regs.pc = 0;
        self.regs.sp = 0xFFFF;
        self.regs.i = 0;
        self.regs.r = 0;
        self.regs.iff1 = false;
        self.regs.iff2 = false;
        self.regs.im = 0;
        self.regs.halted = false;
        self.regs.wz = 0;
        self.int_pending = None;
        self.nmi_pending = false;
        self.ei_delay = false;
    }

    fn pc(&self) -> u16 {
        self.regs.pc
    }

    fn is_halted(&self) -> bool {
        self.regs.halted
    }
}
