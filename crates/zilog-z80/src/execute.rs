//! Instruction decoding and execution.
//!
//! One decoder covers the unprefixed page; DD/FD reuse it through the
//! [`Index`] substitution mode instead of duplicating every arm. Cycle
//! returns are the Zilog-documented T-state counts for the instruction
//! itself; prefix fetch costs are added by the caller.

use emu_core::Bus;

use crate::alu::{self, AluResult};
use crate::cpu::{Index, Z80};
use crate::flags::{CF, HF, NF, PF, SF, XF, YF, ZF, sz53, sz53p};

impl Z80 {
    /// 16-bit pair by decode field (0=BC, 1=DE, 2=HL-family, 3=SP).
    fn get_rp(&self, rp: u8, idx: Index) -> u16 {
        match rp {
            0 => self.regs.bc(),
            1 => self.regs.de(),
            2 => self.get_hl(idx),
            _ => self.regs.sp,
        }
    }

    fn set_rp(&mut self, rp: u8, idx: Index, value: u16) {
        match rp {
            0 => self.regs.set_bc(value),
            1 => self.regs.set_de(value),
            2 => self.set_hl(idx, value),
            _ => self.regs.sp = value,
        }
    }

    /// 16-bit pair for PUSH/POP (3=AF instead of SP).
    fn get_rp2(&self, rp: u8, idx: Index) -> u16 {
        match rp {
            0 => self.regs.bc(),
            1 => self.regs.de(),
            2 => self.get_hl(idx),
            _ => self.regs.af(),
        }
    }

    fn set_rp2(&mut self, rp: u8, idx: Index, value: u16) {
        match rp {
            0 => self.regs.set_bc(value),
            1 => self.regs.set_de(value),
            2 => self.set_hl(idx, value),
            _ => self.regs.set_af(value),
        }
    }

    /// ALU group dispatch (field 0-7: ADD ADC SUB SBC AND XOR OR CP).
    fn alu_a(&mut self, group: u8, value: u8) {
        let a = self.regs.a;
        let carry = self.regs.f & CF != 0;
        let result = match group {
            0 => alu::add8(a, value, false),
            1 => alu::add8(a, value, carry),
            2 => alu::sub8(a, value, false),
            3 => alu::sub8(a, value, carry),
            4 => alu::and8(a, value),
            5 => alu::xor8(a, value),
            6 => alu::or8(a, value),
            _ => alu::cp8(a, value),
        };
        self.regs.a = result.value;
        self.regs.f = result.flags;
    }

    /// CB rotate/shift group dispatch by the y field.
    fn rot_op(&self, y: u8, value: u8) -> AluResult {
        let carry = self.regs.f & CF != 0;
        match y {
            0 => alu::rlc(value),
            1 => alu::rrc(value),
            2 => alu::rl(value, carry),
            3 => alu::rr(value, carry),
            4 => alu::sla(value),
            5 => alu::sra(value),
            6 => alu::sll(value),
            _ => alu::srl(value),
        }
    }

    /// BIT n flag update. X/Y come from `xy_source` (the tested value for
    /// registers, the internal address latch for memory forms).
    fn bit_flags(&mut self, y: u8, value: u8, xy_source: u8) {
        let bit = value & (1 << y);
        let mut f = (self.regs.f & CF) | HF | (xy_source & (XF | YF));
        if bit == 0 {
            f |= ZF | PF;
        }
        if y == 7 && bit != 0 {
            f |= SF;
        }
        self.regs.f = f;
    }

    // =======================================================================
    // Unprefixed page (shared by DD/FD through index substitution)
    // =======================================================================

    pub(crate) fn execute_main<B: Bus>(&mut self, bus: &mut B, op: u8, idx: Index) -> u32 {
        match op {
            // NOP
            0x00 => 4,

            // LD rp, nn
            0x01 | 0x11 | 0x21 | 0x31 => {
                let nn = self.fetch16(bus);
                self.set_rp((op >> 4) & 3, idx, nn);
                10
            }

            // LD (BC), A
            0x02 => {
                let addr = self.regs.bc();
                bus.write(addr, self.regs.a);
                self.regs.wz =
                    u16::from(self.regs.a) << 8 | (addr.wrapping_add(1) & 0xFF);
                7
            }

            // INC rp
            0x03 | 0x13 | 0x23 | 0x33 => {
                let rp = (op >> 4) & 3;
                let value = self.get_rp(rp, idx).wrapping_add(1);
                self.set_rp(rp, idx, value);
                6
            }

            // INC r
            0x04 | 0x0C | 0x14 | 0x1C | 0x24 | 0x2C | 0x3C => {
                let r = (op >> 3) & 7;
                let result = alu::inc8(self.get_r(r, idx));
                self.set_r(r, idx, result.value);
                self.regs.f = (self.regs.f & CF) | result.flags;
                4
            }

            // DEC r
            0x05 | 0x0D | 0x15 | 0x1D | 0x25 | 0x2D | 0x3D => {
                let r = (op >> 3) & 7;
                let result = alu::dec8(self.get_r(r, idx));
                self.set_r(r, idx, result.value);
                self.regs.f = (self.regs.f & CF) | result.flags;
                4
            }

            // LD r, n
            0x06 | 0x0E | 0x16 | 0x1E | 0x26 | 0x2E | 0x3E => {
                let n = self.fetch(bus);
                self.set_r((op >> 3) & 7, idx, n);
                7
            }

            // RLCA
            0x07 => {
                let carry = self.regs.a >> 7;
                self.regs.a = (self.regs.a << 1) | carry;
                self.regs.f = (self.regs.f & (SF | ZF | PF))
                    | (self.regs.a & (YF | XF))
                    | carry;
                4
            }

            // EX AF, AF'
            0x08 => {
                core::mem::swap(&mut self.regs.a, &mut self.regs.a_alt);
                core::mem::swap(&mut self.regs.f, &mut self.regs.f_alt);
                4
            }

            // ADD HL, rp
            0x09 | 0x19 | 0x29 | 0x39 => {
                let hl = self.get_hl(idx);
                let rr = self.get_rp((op >> 4) & 3, idx);
                let (value, flags) = alu::add16(hl, rr);
                self.set_hl(idx, value);
                self.regs.wz = hl.wrapping_add(1);
                self.regs.f = (self.regs.f & (SF | ZF | PF)) | flags;
                11
            }

            // LD A, (BC)
            0x0A => {
                let addr = self.regs.bc();
                self.regs.a = bus.read(addr);
                self.regs.wz = addr.wrapping_add(1);
                7
            }

            // DEC rp
            0x0B | 0x1B | 0x2B | 0x3B => {
                let rp = (op >> 4) & 3;
                let value = self.get_rp(rp, idx).wrapping_sub(1);
                self.set_rp(rp, idx, value);
                6
            }

            // RRCA
            0x0F => {
                let carry = self.regs.a & 1;
                self.regs.a = (self.regs.a >> 1) | (carry << 7);
                self.regs.f = (self.regs.f & (SF | ZF | PF))
                    | (self.regs.a & (YF | XF))
                    | carry;
                4
            }

            // DJNZ e
            0x10 => {
                let d = self.fetch(bus) as i8;
                self.regs.b = self.regs.b.wrapping_sub(1);
                if self.regs.b != 0 {
                    self.regs.pc = self.regs.pc.wrapping_add_signed(i16::from(d));
                    self.regs.wz = self.regs.pc;
                    13
                } else {
                    8
                }
            }

            // LD (DE), A
            0x12 => {
                let addr = self.regs.de();
                bus.write(addr, self.regs.a);
                self.regs.wz =
                    u16::from(self.regs.a) << 8 | (addr.wrapping_add(1) & 0xFF);
                7
            }

            // RLA
            0x17 => {
                let carry_in = self.regs.f & CF;
                let carry_out = self.regs.a >> 7;
                self.regs.a = (self.regs.a << 1) | carry_in;
                self.regs.f = (self.regs.f & (SF | ZF | PF))
                    | (self.regs.a & (YF | XF))
                    | carry_out;
                4
            }

            // JR e
            0x18 => {
                let d = self.fetch(bus) as i8;
                self.regs.pc = self.regs.pc.wrapping_add_signed(i16::from(d));
                self.regs.wz = self.regs.pc;
                12
            }

            // LD A, (DE)
            0x1A => {
                let addr = self.regs.de();
                self.regs.a = bus.read(addr);
                self.regs.wz = addr.wrapping_add(1);
                7
            }

            // RRA
            0x1F => {
                let carry_in = (self.regs.f & CF) << 7;
                let carry_out = self.regs.a & 1;
                self.regs.a = (self.regs.a >> 1) | carry_in;
                self.regs.f = (self.regs.f & (SF | ZF | PF))
                    | (self.regs.a & (YF | XF))
                    | carry_out;
                4
            }

            // JR cc, e
            0x20 | 0x28 | 0x30 | 0x38 => {
                let d = self.fetch(bus) as i8;
                if self.condition((op >> 3) & 3) {
                    self.regs.pc = self.regs.pc.wrapping_add_signed(i16::from(d));
                    self.regs.wz = self.regs.pc;
                    12
                } else {
                    7
                }
            }

            // LD (nn), HL
            0x22 => {
                let addr = self.fetch16(bus);
                let value = self.get_hl(idx);
                self.write16(bus, addr, value);
                self.regs.wz = addr.wrapping_add(1);
                16
            }

            // DAA
            0x27 => {
                let a = self.regs.a;
                let nf = self.regs.f & NF != 0;
                let cf = self.regs.f & CF != 0;
                let hf = self.regs.f & HF != 0;

                let mut correction: u8 = 0;
                let mut new_cf = cf;
                if hf || (a & 0x0F) > 9 {
                    correction |= 0x06;
                }
                if cf || a > 0x99 {
                    correction |= 0x60;
                    new_cf = true;
                }

                let result = if nf {
                    a.wrapping_sub(correction)
                } else {
                    a.wrapping_add(correction)
                };
                let new_hf = if nf {
                    hf && (a & 0x0F) < 6
                } else {
                    (a & 0x0F) > 9
                };

                self.regs.a = result;
                self.regs.f = sz53p(result)
                    | if nf { NF } else { 0 }
                    | if new_cf { CF } else { 0 }
                    | if new_hf { HF } else { 0 };
                4
            }

            // LD HL, (nn)
            0x2A => {
                let addr = self.fetch16(bus);
                let value = self.read16(bus, addr);
                self.set_hl(idx, value);
                self.regs.wz = addr.wrapping_add(1);
                16
            }

            // CPL
            0x2F => {
                self.regs.a = !self.regs.a;
                self.regs.f = (self.regs.f & (SF | ZF | PF | CF))
                    | HF
                    | NF
                    | (self.regs.a & (XF | YF));
                4
            }

            // LD (nn), A
            0x32 => {
                let addr = self.fetch16(bus);
                bus.write(addr, self.regs.a);
                self.regs.wz =
                    u16::from(self.regs.a) << 8 | (addr.wrapping_add(1) & 0xFF);
                13
            }

            // INC (HL)
            0x34 => {
                let addr = self.mem_addr(bus, idx);
                let result = alu::inc8(bus.read(addr));
                bus.write(addr, result.value);
                self.regs.f = (self.regs.f & CF) | result.flags;
                if idx == Index::Hl { 11 } else { 19 }
            }

            // DEC (HL)
            0x35 => {
                let addr = self.mem_addr(bus, idx);
                let result = alu::dec8(bus.read(addr));
                bus.write(addr, result.value);
                self.regs.f = (self.regs.f & CF) | result.flags;
                if idx == Index::Hl { 11 } else { 19 }
            }

            // LD (HL), n — displacement precedes the immediate under DD/FD
            0x36 => {
                let addr = self.mem_addr(bus, idx);
                let n = self.fetch(bus);
                bus.write(addr, n);
                if idx == Index::Hl { 10 } else { 15 }
            }

            // SCF
            0x37 => {
                self.regs.f = (self.regs.f & (SF | ZF | PF))
                    | CF
                    | (self.regs.a & (XF | YF));
                4
            }

            // LD A, (nn)
            0x3A => {
                let addr = self.fetch16(bus);
                self.regs.a = bus.read(addr);
                self.regs.wz = addr.wrapping_add(1);
                13
            }

            // CCF
            0x3F => {
                let old_cf = self.regs.f & CF;
                self.regs.f = (self.regs.f & (SF | ZF | PF))
                    | (self.regs.a & (XF | YF))
                    | if old_cf != 0 { HF } else { CF };
                4
            }

            // HALT
            0x76 => {
                self.regs.halted = true;
                4
            }

            // LD r, r'
            0x40..=0x7F => {
                let dst = (op >> 3) & 7;
                let src = op & 7;
                if src == 6 {
                    // LD r, (HL)/(IX+d) — destination is always a real register
                    let addr = self.mem_addr(bus, idx);
                    let value = bus.read(addr);
                    self.set_r(dst, Index::Hl, value);
                    if idx == Index::Hl { 7 } else { 15 }
                } else if dst == 6 {
                    // LD (HL)/(IX+d), r — source is always a real register
                    let addr = self.mem_addr(bus, idx);
                    let value = self.get_r(src, Index::Hl);
                    bus.write(addr, value);
                    if idx == Index::Hl { 7 } else { 15 }
                } else {
                    let value = self.get_r(src, idx);
                    self.set_r(dst, idx, value);
                    4
                }
            }

            // ALU A, r
            0x80..=0xBF => {
                let group = (op >> 3) & 7;
                let src = op & 7;
                if src == 6 {
                    let addr = self.mem_addr(bus, idx);
                    let value = bus.read(addr);
                    self.alu_a(group, value);
                    if idx == Index::Hl { 7 } else { 15 }
                } else {
                    let value = self.get_r(src, idx);
                    self.alu_a(group, value);
                    4
                }
            }

            // RET cc
            0xC0 | 0xC8 | 0xD0 | 0xD8 | 0xE0 | 0xE8 | 0xF0 | 0xF8 => {
                if self.condition((op >> 3) & 7) {
                    self.regs.pc = self.pop16(bus);
                    self.regs.wz = self.regs.pc;
                    11
                } else {
                    5
                }
            }

            // POP rp2
            0xC1 | 0xD1 | 0xE1 | 0xF1 => {
                let value = self.pop16(bus);
                self.set_rp2((op >> 4) & 3, idx, value);
                10
            }

            // JP cc, nn
            0xC2 | 0xCA | 0xD2 | 0xDA | 0xE2 | 0xEA | 0xF2 | 0xFA => {
                let nn = self.fetch16(bus);
                self.regs.wz = nn;
                if self.condition((op >> 3) & 7) {
                    self.regs.pc = nn;
                }
                10
            }

            // JP nn
            0xC3 => {
                let nn = self.fetch16(bus);
                self.regs.pc = nn;
                self.regs.wz = nn;
                10
            }

            // CALL cc, nn
            0xC4 | 0xCC | 0xD4 | 0xDC | 0xE4 | 0xEC | 0xF4 | 0xFC => {
                let nn = self.fetch16(bus);
                self.regs.wz = nn;
                if self.condition((op >> 3) & 7) {
                    let pc = self.regs.pc;
                    self.push16(bus, pc);
                    self.regs.pc = nn;
                    17
                } else {
                    10
                }
            }

            // CALL nn
            0xCD => {
                let nn = self.fetch16(bus);
                self.regs.wz = nn;
                let pc = self.regs.pc;
                self.push16(bus, pc);
                self.regs.pc = nn;
                17
            }

            // PUSH rp2
            0xC5 | 0xD5 | 0xE5 | 0xF5 => {
                let value = self.get_rp2((op >> 4) & 3, idx);
                self.push16(bus, value);
                11
            }

            // ALU A, n
            0xC6 | 0xCE | 0xD6 | 0xDE | 0xE6 | 0xEE | 0xF6 | 0xFE => {
                let n = self.fetch(bus);
                self.alu_a((op >> 3) & 7, n);
                7
            }

            // RST n
            0xC7 | 0xCF | 0xD7 | 0xDF | 0xE7 | 0xEF | 0xF7 | 0xFF => {
                let pc = self.regs.pc;
                self.push16(bus, pc);
                self.regs.pc = u16::from(op & 0x38);
                self.regs.wz = self.regs.pc;
                11
            }

            // RET
            0xC9 => {
                self.regs.pc = self.pop16(bus);
                self.regs.wz = self.regs.pc;
                10
            }

            // OUT (n), A
            0xD3 => {
                let n = self.fetch(bus);
                let port = u16::from(self.regs.a) << 8 | u16::from(n);
                bus.io_write(port, self.regs.a);
                self.regs.wz =
                    u16::from(self.regs.a) << 8 | u16::from(n.wrapping_add(1));
                11
            }

            // EXX
            0xD9 => {
                core::mem::swap(&mut self.regs.b, &mut self.regs.b_alt);
                core::mem::swap(&mut self.regs.c, &mut self.regs.c_alt);
                core::mem::swap(&mut self.regs.d, &mut self.regs.d_alt);
                core::mem::swap(&mut self.regs.e, &mut self.regs.e_alt);
                core::mem::swap(&mut self.regs.h, &mut self.regs.h_alt);
                core::mem::swap(&mut self.regs.l, &mut self.regs.l_alt);
                4
            }

            // IN A, (n)
            0xDB => {
                let n = self.fetch(bus);
                let port = u16::from(self.regs.a) << 8 | u16::from(n);
                self.regs.a = bus.io_read(port);
                self.regs.wz = port.wrapping_add(1);
                11
            }

            // EX (SP), HL
            0xE3 => {
                let sp = self.regs.sp;
                let from_stack = self.read16(bus, sp);
                let from_reg = self.get_hl(idx);
                self.write16(bus, sp, from_reg);
                self.set_hl(idx, from_stack);
                self.regs.wz = from_stack;
                19
            }

            // JP (HL)
            0xE9 => {
                self.regs.pc = self.get_hl(idx);
                4
            }

            // EX DE, HL — always the real HL, even under DD/FD
            0xEB => {
                core::mem::swap(&mut self.regs.d, &mut self.regs.h);
                core::mem::swap(&mut self.regs.e, &mut self.regs.l);
                4
            }

            // DI
            0xF3 => {
                self.regs.iff1 = false;
                self.regs.iff2 = false;
                4
            }

            // LD SP, HL
            0xF9 => {
                self.regs.sp = self.get_hl(idx);
                6
            }

            // EI — interrupts recognised after the following instruction
            0xFB => {
                self.regs.iff1 = true;
                self.regs.iff2 = true;
                self.ei_delay = true;
                4
            }

            // CB/DD/ED/FD are consumed by the caller
            _ => 4,
        }
    }

    // =======================================================================
    // CB page
    // =======================================================================

    pub(crate) fn execute_cb<B: Bus>(&mut self, bus: &mut B, idx: Index) -> u32 {
        if idx != Index::Hl {
            return self.execute_cb_indexed(bus, idx);
        }

        let op = self.fetch_opcode(bus);
        let x = op >> 6;
        let y = (op >> 3) & 7;
        let z = op & 7;

        if z == 6 {
            let addr = self.regs.hl();
            let value = bus.read(addr);
            match x {
                0 => {
                    let result = self.rot_op(y, value);
                    bus.write(addr, result.value);
                    self.regs.f = result.flags;
                    15
                }
                1 => {
                    self.bit_flags(y, value, (self.regs.wz >> 8) as u8);
                    12
                }
                2 => {
                    bus.write(addr, value & !(1 << y));
                    15
                }
                _ => {
                    bus.write(addr, value | (1 << y));
                    15
                }
            }
        } else {
            let value = self.get_r(z, Index::Hl);
            match x {
                0 => {
                    let result = self.rot_op(y, value);
                    self.set_r(z, Index::Hl, result.value);
                    self.regs.f = result.flags;
                }
                1 => self.bit_flags(y, value, value),
                2 => self.set_r(z, Index::Hl, value & !(1 << y)),
                _ => self.set_r(z, Index::Hl, value | (1 << y)),
            }
            8
        }
    }

    /// DD CB / FD CB: displacement byte comes before the final opcode, and
    /// neither is an M1 fetch. All operations act on (IX+d); the result is
    /// also copied into the register field when it is not 6 (undocumented).
    fn execute_cb_indexed<B: Bus>(&mut self, bus: &mut B, idx: Index) -> u32 {
        let d = self.fetch(bus) as i8;
        let addr = self.get_hl(idx).wrapping_add_signed(i16::from(d));
        self.regs.wz = addr;
        let op = self.fetch(bus);

        let x = op >> 6;
        let y = (op >> 3) & 7;
        let z = op & 7;

        let value = bus.read(addr);
        match x {
            0 => {
                let result = self.rot_op(y, value);
                bus.write(addr, result.value);
                self.regs.f = result.flags;
                if z != 6 {
                    self.set_r(z, Index::Hl, result.value);
                }
                19
            }
            1 => {
                self.bit_flags(y, value, (addr >> 8) as u8);
                16
            }
            2 => {
                let result = value & !(1 << y);
                bus.write(addr, result);
                if z != 6 {
                    self.set_r(z, Index::Hl, result);
                }
                19
            }
            _ => {
                let result = value | (1 << y);
                bus.write(addr, result);
                if z != 6 {
                    self.set_r(z, Index::Hl, result);
                }
                19
            }
        }
    }

    // =======================================================================
    // ED page
    // =======================================================================

    pub(crate) fn execute_ed<B: Bus>(&mut self, bus: &mut B) -> u32 {
        let op = self.fetch_opcode(bus);
        match op {
            // IN r, (C) — y=6 sets flags only
            0x40 | 0x48 | 0x50 | 0x58 | 0x60 | 0x68 | 0x70 | 0x78 => {
                let y = (op >> 3) & 7;
                let port = self.regs.bc();
                let value = bus.io_read(port);
                if y != 6 {
                    self.set_r(y, Index::Hl, value);
                }
                self.regs.f = (self.regs.f & CF) | sz53p(value);
                self.regs.wz = port.wrapping_add(1);
                12
            }

            // OUT (C), r — y=6 outputs 0
            0x41 | 0x49 | 0x51 | 0x59 | 0x61 | 0x69 | 0x71 | 0x79 => {
                let y = (op >> 3) & 7;
                let port = self.regs.bc();
                let value = if y == 6 { 0 } else { self.get_r(y, Index::Hl) };
                bus.io_write(port, value);
                self.regs.wz = port.wrapping_add(1);
                12
            }

            // SBC HL, rp
            0x42 | 0x52 | 0x62 | 0x72 => {
                let hl = self.regs.hl();
                let rr = self.get_rp((op >> 4) & 3, Index::Hl);
                let carry = self.regs.f & CF != 0;
                let (value, flags) = alu::sbc16(hl, rr, carry);
                self.regs.set_hl(value);
                self.regs.f = flags;
                self.regs.wz = hl.wrapping_add(1);
                15
            }

            // ADC HL, rp
            0x4A | 0x5A | 0x6A | 0x7A => {
                let hl = self.regs.hl();
                let rr = self.get_rp((op >> 4) & 3, Index::Hl);
                let carry = self.regs.f & CF != 0;
                let (value, flags) = alu::adc16(hl, rr, carry);
                self.regs.set_hl(value);
                self.regs.f = flags;
                self.regs.wz = hl.wrapping_add(1);
                15
            }

            // LD (nn), rp
            0x43 | 0x53 | 0x63 | 0x73 => {
                let addr = self.fetch16(bus);
                let value = self.get_rp((op >> 4) & 3, Index::Hl);
                self.write16(bus, addr, value);
                self.regs.wz = addr.wrapping_add(1);
                20
            }

            // LD rp, (nn)
            0x4B | 0x5B | 0x6B | 0x7B => {
                let addr = self.fetch16(bus);
                let value = self.read16(bus, addr);
                self.set_rp((op >> 4) & 3, Index::Hl, value);
                self.regs.wz = addr.wrapping_add(1);
                20
            }

            // NEG (all eight decodes)
            0x44 | 0x4C | 0x54 | 0x5C | 0x64 | 0x6C | 0x74 | 0x7C => {
                let result = alu::sub8(0, self.regs.a, false);
                self.regs.a = result.value;
                self.regs.f = result.flags;
                8
            }

            // RETN / RETI
            0x45 | 0x4D | 0x55 | 0x5D | 0x65 | 0x6D | 0x75 | 0x7D => {
                self.regs.pc = self.pop16(bus);
                self.regs.wz = self.regs.pc;
                self.regs.iff1 = self.regs.iff2;
                14
            }

            // IM 0/1/2 (with the undocumented duplicate decodes)
            0x46 | 0x4E | 0x56 | 0x5E | 0x66 | 0x6E | 0x76 | 0x7E => {
                const MODES: [u8; 8] = [0, 0, 1, 2, 0, 0, 1, 2];
                self.regs.im = MODES[usize::from((op >> 3) & 7)];
                8
            }

            // LD I, A
            0x47 => {
                self.regs.i = self.regs.a;
                9
            }

            // LD R, A
            0x4F => {
                self.regs.r = self.regs.a;
                9
            }

            // LD A, I
            0x57 => {
                self.regs.a = self.regs.i;
                self.regs.f = (self.regs.f & CF)
                    | sz53(self.regs.a)
                    | if self.regs.iff2 { PF } else { 0 };
                9
            }

            // LD A, R
            0x5F => {
                self.regs.a = self.regs.r;
                self.regs.f = (self.regs.f & CF)
                    | sz53(self.regs.a)
                    | if self.regs.iff2 { PF } else { 0 };
                9
            }

            // RRD
            0x67 => {
                let addr = self.regs.hl();
                let value = bus.read(addr);
                let new_value = (self.regs.a << 4) | (value >> 4);
                self.regs.a = (self.regs.a & 0xF0) | (value & 0x0F);
                bus.write(addr, new_value);
                self.regs.f = (self.regs.f & CF) | sz53p(self.regs.a);
                self.regs.wz = addr.wrapping_add(1);
                18
            }

            // RLD
            0x6F => {
                let addr = self.regs.hl();
                let value = bus.read(addr);
                let new_value = (value << 4) | (self.regs.a & 0x0F);
                self.regs.a = (self.regs.a & 0xF0) | (value >> 4);
                bus.write(addr, new_value);
                self.regs.f = (self.regs.f & CF) | sz53p(self.regs.a);
                self.regs.wz = addr.wrapping_add(1);
                18
            }

            // Block transfer/search/IO
            0xA0 => self.block_ld(bus, 1, false),
            0xA8 => self.block_ld(bus, -1, false),
            0xB0 => self.block_ld(bus, 1, true),
            0xB8 => self.block_ld(bus, -1, true),
            0xA1 => self.block_cp(bus, 1, false),
            0xA9 => self.block_cp(bus, -1, false),
            0xB1 => self.block_cp(bus, 1, true),
            0xB9 => self.block_cp(bus, -1, true),
            0xA2 => self.block_in(bus, 1, false),
            0xAA => self.block_in(bus, -1, false),
            0xB2 => self.block_in(bus, 1, true),
            0xBA => self.block_in(bus, -1, true),
            0xA3 => self.block_out(bus, 1, false),
            0xAB => self.block_out(bus, -1, false),
            0xB3 => self.block_out(bus, 1, true),
            0xBB => self.block_out(bus, -1, true),

            // Unassigned ED opcodes execute as two-byte no-ops
            _ => 8,
        }
    }

    /// LDI/LDD/LDIR/LDDR.
    fn block_ld<B: Bus>(&mut self, bus: &mut B, dir: i16, repeat: bool) -> u32 {
        let hl = self.regs.hl();
        let de = self.regs.de();
        let value = bus.read(hl);
        bus.write(de, value);

        self.regs.set_hl(hl.wrapping_add_signed(dir));
        self.regs.set_de(de.wrapping_add_signed(dir));
        let bc = self.regs.bc().wrapping_sub(1);
        self.regs.set_bc(bc);

        let n = self.regs.a.wrapping_add(value);
        self.regs.f = (self.regs.f & (SF | ZF | CF))
            | if bc != 0 { PF } else { 0 }
            | (n & XF)
            | if n & 0x02 != 0 { YF } else { 0 };

        if repeat && bc != 0 {
            self.regs.pc = self.regs.pc.wrapping_sub(2);
            self.regs.wz = self.regs.pc.wrapping_add(1);
            21
        } else {
            16
        }
    }

    /// CPI/CPD/CPIR/CPDR.
    fn block_cp<B: Bus>(&mut self, bus: &mut B, dir: i16, repeat: bool) -> u32 {
        let hl = self.regs.hl();
        let value = bus.read(hl);
        let result = alu::sub8(self.regs.a, value, false);

        self.regs.set_hl(hl.wrapping_add_signed(dir));
        let bc = self.regs.bc().wrapping_sub(1);
        self.regs.set_bc(bc);
        self.regs.wz = self.regs.wz.wrapping_add_signed(dir);

        let half = result.flags & HF != 0;
        let n = result.value.wrapping_sub(u8::from(half));
        self.regs.f = (self.regs.f & CF)
            | (result.flags & (SF | ZF | HF))
            | NF
            | if bc != 0 { PF } else { 0 }
            | (n & XF)
            | if n & 0x02 != 0 { YF } else { 0 };

        let found = result.flags & ZF != 0;
        if repeat && bc != 0 && !found {
            self.regs.pc = self.regs.pc.wrapping_sub(2);
            self.regs.wz = self.regs.pc.wrapping_add(1);
            21
        } else {
            16
        }
    }

    /// INI/IND/INIR/INDR.
    fn block_in<B: Bus>(&mut self, bus: &mut B, dir: i16, repeat: bool) -> u32 {
        let port = self.regs.bc();
        let value = bus.io_read(port);
        let hl = self.regs.hl();
        bus.write(hl, value);

        self.regs.wz = port.wrapping_add_signed(dir);
        self.regs.set_hl(hl.wrapping_add_signed(dir));
        self.regs.b = self.regs.b.wrapping_sub(1);
        self.regs.f = sz53(self.regs.b) | NF;

        if repeat && self.regs.b != 0 {
            self.regs.pc = self.regs.pc.wrapping_sub(2);
            21
        } else {
            16
        }
    }

    /// OUTI/OUTD/OTIR/OTDR.
    fn block_out<B: Bus>(&mut self, bus: &mut B, dir: i16, repeat: bool) -> u32 {
        let hl = self.regs.hl();
        let value = bus.read(hl);
        self.regs.b = self.regs.b.wrapping_sub(1);
        let port = self.regs.bc();
        bus.io_write(port, value);

        self.regs.wz = port.wrapping_add_signed(dir);
        self.regs.set_hl(hl.wrapping_add_signed(dir));
        self.regs.f = sz53(self.regs.b) | NF;

        if repeat && self.regs.b != 0 {
            self.regs.pc = self.regs.pc.wrapping_sub(2);
            21
        } else {
            16
        }
    }
}
