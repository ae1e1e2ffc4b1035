//! Versioned machine-state snapshot codec.
//!
//! A record is one contiguous, fixed-layout blob with no internal
//! pointers: a 128-byte state header followed by the full 64 KB RAM image
//! (which includes the video RAM window). The full RAM image is stored
//! for every model, so all variants share one record size and a record
//! can be persisted and restored verbatim.
//!
//! Layout (all multi-byte fields little-endian):
//!
//! | Offset | Size | Contents                         |
//! |--------|------|----------------------------------|
//! | 0      | 4    | `SNAPSHOT_VERSION`               |
//! | 4      | 1    | model tag                        |
//! | 5      | 32   | CPU block                        |
//! | 37     | 16   | PIO block (2 × 8 bytes)          |
//! | 53     | 9    | keyboard latch + matrix          |
//! | 62     | 6    | video beam counters              |
//! | 68     | 24   | frame clock + overshoot          |
//! | 92     | 36   | reserved (zero)                  |
//! | 128    | 64K  | RAM image                        |
//!
//! `load_snapshot` validates version, size and model before touching the
//! machine; a rejected record leaves the target bit-for-bit unchanged.
//! After a successful load, execution continues exactly as it would have
//! from the moment of `save_snapshot`.

use zilog_z80_pio::{PioSnapshot, PortSnapshot};

use crate::Z1013;

/// Bump when the record layout changes.
pub const SNAPSHOT_VERSION: u32 = 1;

/// State header size.
const STATE_SIZE: usize = 128;

/// Total record size.
pub const SNAPSHOT_SIZE: usize = STATE_SIZE + 0x1_0000;

// Header field offsets.
const OFF_VERSION: usize = 0;
const OFF_MODEL: usize = 4;
const OFF_CPU: usize = 5;
const OFF_PIO: usize = 37;
const OFF_KEYBOARD: usize = 53;
const OFF_VIDEO: usize = 62;
const OFF_CLOCK: usize = 68;
const OFF_RAM: usize = STATE_SIZE;

fn put_u16(buf: &mut [u8], offset: usize, value: u16) {
    buf[offset..offset + 2].copy_from_slice(&value.to_le_bytes());
}

fn put_u32(buf: &mut [u8], offset: usize, value: u32) {
    buf[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
}

fn put_u64(buf: &mut [u8], offset: usize, value: u64) {
    buf[offset..offset + 8].copy_from_slice(&value.to_le_bytes());
}

fn get_u16(buf: &[u8], offset: usize) -> u16 {
    u16::from_le_bytes([buf[offset], buf[offset + 1]])
}

fn get_u32(buf: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([
        buf[offset],
        buf[offset + 1],
        buf[offset + 2],
        buf[offset + 3],
    ])
}

fn get_u64(buf: &[u8], offset: usize) -> u64 {
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&buf[offset..offset + 8]);
    u64::from_le_bytes(bytes)
}

/// Serialise the complete machine state into a fixed-size record.
#[must_use]
pub fn save_snapshot(machine: &Z1013) -> Vec<u8> {
    let mut record = vec![0u8; SNAPSHOT_SIZE];

    put_u32(&mut record, OFF_VERSION, SNAPSHOT_VERSION);
    record[OFF_MODEL] = machine.model.tag();

    // CPU block
    let regs = &machine.cpu.regs;
    let cpu = &mut record[OFF_CPU..OFF_CPU + 32];
    cpu[0] = regs.a;
    cpu[1] = regs.f;
    cpu[2] = regs.b;
    cpu[3] = regs.c;
    cpu[4] = regs.d;
    cpu[5] = regs.e;
    cpu[6] = regs.h;
    cpu[7] = regs.l;
    cpu[8] = regs.a_alt;
    cpu[9] = regs.f_alt;
    cpu[10] = regs.b_alt;
    cpu[11] = regs.c_alt;
    cpu[12] = regs.d_alt;
    cpu[13] = regs.e_alt;
    cpu[14] = regs.h_alt;
    cpu[15] = regs.l_alt;
    put_u16(cpu, 16, regs.ix);
    put_u16(cpu, 18, regs.iy);
    put_u16(cpu, 20, regs.sp);
    put_u16(cpu, 22, regs.pc);
    put_u16(cpu, 24, regs.wz);
    cpu[26] = regs.i;
    cpu[27] = regs.r;
    cpu[28] = regs.im;
    cpu[29] = u8::from(regs.iff1)
        | u8::from(regs.iff2) << 1
        | u8::from(regs.halted) << 2
        | u8::from(machine.cpu.ei_delay) << 3
        | u8::from(machine.cpu.int_pending.is_some()) << 4
        | u8::from(machine.cpu.nmi_pending) << 5;
    cpu[30] = machine.cpu.int_pending.unwrap_or(0);

    // PIO block
    let pio = machine.bus.pio.snapshot();
    for (slot, port) in [(0, &pio.a), (1, &pio.b)] {
        let base = OFF_PIO + slot * 8;
        record[base] = port.output;
        record[base + 1] = port.input;
        record[base + 2] = port.mode;
        record[base + 3] = port.io_select;
        record[base + 4] = port.vector;
        record[base + 5] = port.int_control;
        record[base + 6] = port.int_mask;
        record[base + 7] = port.status;
    }

    // Keyboard
    let (column, matrix) = machine.bus.keyboard.state();
    record[OFF_KEYBOARD] = column;
    record[OFF_KEYBOARD + 1..OFF_KEYBOARD + 9].copy_from_slice(&matrix);

    // Video beam
    let (line, line_cycles) = machine.bus.video.state();
    put_u16(&mut record, OFF_VIDEO, line);
    put_u32(&mut record, OFF_VIDEO + 2, line_cycles);

    // Frame clock + overshoot
    let (elapsed_us, cycles_issued) = machine.frame_clock.state();
    put_u64(&mut record, OFF_CLOCK, elapsed_us);
    put_u64(&mut record, OFF_CLOCK + 8, cycles_issued);
    put_u64(&mut record, OFF_CLOCK + 16, machine.overshoot);

    // RAM image (includes the video RAM window)
    record[OFF_RAM..].copy_from_slice(machine.bus.memory.ram());

    record
}

/// Restore a machine-state record.
///
/// Version, size and model are validated first; on any mismatch the
/// machine is left untouched and an error describing the rejection is
/// returned.
pub fn load_snapshot(machine: &mut Z1013, record: &[u8]) -> Result<(), String> {
    if record.len() != SNAPSHOT_SIZE {
        return Err(format!(
            "snapshot must be {SNAPSHOT_SIZE} bytes, got {}",
            record.len()
        ));
    }

    let version = get_u32(record, OFF_VERSION);
    if version != SNAPSHOT_VERSION {
        return Err(format!(
            "snapshot version {version} does not match supported version {SNAPSHOT_VERSION}"
        ));
    }

    let tag = record[OFF_MODEL];
    if tag != machine.model.tag() {
        return Err(format!(
            "snapshot is for model tag {tag}, machine is {}",
            machine.model.tag()
        ));
    }

    // Validation passed: replace the whole machine state.
    let cpu = &record[OFF_CPU..OFF_CPU + 32];
    let regs = &mut machine.cpu.regs;
    regs.a = cpu[0];
    regs.f = cpu[1];
    regs.b = cpu[2];
    regs.c = cpu[3];
    regs.d = cpu[4];
    regs.e = cpu[5];
    regs.h = cpu[6];
    regs.l = cpu[7];
    regs.a_alt = cpu[8];
    regs.f_alt = cpu[9];
    regs.b_alt = cpu[10];
    regs.c_alt = cpu[11];
    regs.d_alt = cpu[12];
    regs.e_alt = cpu[13];
    regs.h_alt = cpu[14];
    regs.l_alt = cpu[15];
    regs.ix = get_u16(cpu, 16);
    regs.iy = get_u16(cpu, 18);
    regs.sp = get_u16(cpu, 20);
    regs.pc = get_u16(cpu, 22);
    regs.wz = get_u16(cpu, 24);
    regs.i = cpu[26];
    regs.r = cpu[27];
    regs.im = cpu[28] & 3;
    let status = cpu[29];
    regs.iff1 = status & 0x01 != 0;
    regs.iff2 = status & 0x02 != 0;
    regs.halted = status & 0x04 != 0;
    machine.cpu.ei_delay = status & 0x08 != 0;
    machine.cpu.int_pending = if status & 0x10 != 0 {
        Some(cpu[30])
    } else {
        None
    };
    machine.cpu.nmi_pending = status & 0x20 != 0;

    let mut pio = PioSnapshot::default();
    for (slot, port) in [(0usize, &mut pio.a), (1, &mut pio.b)] {
        let base = OFF_PIO + slot * 8;
        *port = PortSnapshot {
            output: record[base],
            input: record[base + 1],
            mode: record[base + 2],
            io_select: record[base + 3],
            vector: record[base + 4],
            int_control: record[base + 5],
            int_mask: record[base + 6],
            status: record[base + 7],
        };
    }
    machine.bus.pio.restore(&pio);

    let mut matrix = [0u8; 8];
    matrix.copy_from_slice(&record[OFF_KEYBOARD + 1..OFF_KEYBOARD + 9]);
    machine
        .bus
        .keyboard
        .restore(record[OFF_KEYBOARD], matrix);

    machine
        .bus
        .video
        .restore(get_u16(record, OFF_VIDEO), get_u32(record, OFF_VIDEO + 2));

    machine
        .frame_clock
        .restore(get_u64(record, OFF_CLOCK), get_u64(record, OFF_CLOCK + 8));
    machine.overshoot = get_u64(record, OFF_CLOCK + 16);

    machine.bus.memory.ram_mut().copy_from_slice(&record[OFF_RAM..]);
    machine.bus.refresh_pio_inputs();

    log::info!(
        "snapshot restored: model tag {tag}, PC ${:04X}",
        machine.cpu.regs.pc
    );
    Ok(())
}
