//! Headersave memory-image loader.
//!
//! The common Z1013 file format: a 32-byte header followed by the memory
//! payload.
//!
//! | Offset | Size | Contents                         |
//! |--------|------|----------------------------------|
//! | 0      | 2    | load address (LE)                |
//! | 2      | 2    | end address (LE, inclusive)      |
//! | 4      | 2    | start address (LE)               |
//! | 12     | 1    | file type (`C` = executable)     |
//! | 13     | 3    | magic `D3 D3 D3`                 |
//! | 16     | 16   | file name                        |
//!
//! The payload is written through the bus (so ROM windows stay
//! protected). Executable files with a non-zero start address transfer
//! control by setting PC. Malformed input is rejected before any memory
//! is touched.

use emu_core::Bus;

use crate::Z1013;

const HEADER_SIZE: usize = 32;
const MAGIC: [u8; 3] = [0xD3, 0xD3, 0xD3];

/// File type byte for self-starting machine code.
const TYPE_EXECUTABLE: u8 = b'C';

pub fn quickload(machine: &mut Z1013, data: &[u8]) -> Result<(), String> {
    if data.len() <= HEADER_SIZE {
        return Err(format!(
            "headersave file too short: {} bytes",
            data.len()
        ));
    }
    if data[13..16] != MAGIC {
        return Err("missing headersave magic D3 D3 D3".to_string());
    }

    let load_addr = u16::from_le_bytes([data[0], data[1]]);
    let end_addr = u16::from_le_bytes([data[2], data[3]]);
    let start_addr = u16::from_le_bytes([data[4], data[5]]);
    let file_type = data[12];

    if end_addr < load_addr {
        return Err(format!(
            "headersave range ${end_addr:04X} < ${load_addr:04X}"
        ));
    }

    let name: String = data[16..32]
        .iter()
        .map(|&b| {
            if b.is_ascii_graphic() || b == b' ' {
                char::from(b)
            } else {
                ' '
            }
        })
        .collect();

    let payload = &data[HEADER_SIZE..];
    let range_len = usize::from(end_addr - load_addr) + 1;
    let copy_len = payload.len().min(range_len);
    for (i, &byte) in payload[..copy_len].iter().enumerate() {
        machine.bus.write(load_addr.wrapping_add(i as u16), byte);
    }

    log::info!(
        "quickload \"{}\": ${load_addr:04X}-${end_addr:04X}, type {}",
        name.trim_end(),
        char::from(file_type)
    );

    if file_type == TYPE_EXECUTABLE && start_addr != 0 {
        machine.cpu.regs.pc = start_addr;
        log::info!("quickload autostart at ${start_addr:04X}");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Z1013Config, Z1013Model};

    fn make_machine() -> Z1013 {
        Z1013::new(&Z1013Config {
            model: Z1013Model::Model64,
            os_rom: vec![0u8; 0x800],
            font_rom: vec![0u8; 0x800],
        })
        .expect("valid config")
    }

    fn make_file(load: u16, end: u16, start: u16, typ: u8, payload: &[u8]) -> Vec<u8> {
        let mut data = vec![0u8; HEADER_SIZE];
        data[0..2].copy_from_slice(&load.to_le_bytes());
        data[2..4].copy_from_slice(&end.to_le_bytes());
        data[4..6].copy_from_slice(&start.to_le_bytes());
        data[12] = typ;
        data[13..16].copy_from_slice(&MAGIC);
        data[16..21].copy_from_slice(b"DEMO ");
        data.extend_from_slice(payload);
        data
    }

    #[test]
    fn loads_payload_at_load_address() {
        let mut machine = make_machine();
        let file = make_file(0x2000, 0x2003, 0, b'B', &[1, 2, 3, 4]);
        quickload(&mut machine, &file).expect("load should succeed");

        assert_eq!(machine.bus.memory.peek(0x2000), 1);
        assert_eq!(machine.bus.memory.peek(0x2003), 4);
        // Non-executable type leaves PC alone.
        assert_eq!(machine.cpu.regs.pc, 0xF000);
    }

    #[test]
    fn executable_type_sets_pc() {
        let mut machine = make_machine();
        let file = make_file(0x4000, 0x4001, 0x4000, TYPE_EXECUTABLE, &[0, 0]);
        quickload(&mut machine, &file).expect("load should succeed");
        assert_eq!(machine.cpu.regs.pc, 0x4000);
    }

    #[test]
    fn rejects_missing_magic() {
        let mut machine = make_machine();
        let mut file = make_file(0x2000, 0x2001, 0, b'B', &[1, 2]);
        file[14] = 0x00;
        assert!(quickload(&mut machine, &file).is_err());
        assert_eq!(machine.bus.memory.peek(0x2000), 0, "memory untouched");
    }

    #[test]
    fn rejects_short_file() {
        let mut machine = make_machine();
        assert!(quickload(&mut machine, &[0u8; 32]).is_err());
    }

    #[test]
    fn rejects_inverted_range() {
        let mut machine = make_machine();
        let file = make_file(0x3000, 0x2000, 0, b'B', &[1]);
        assert!(quickload(&mut machine, &file).is_err());
    }

    #[test]
    fn payload_clipped_to_header_range() {
        let mut machine = make_machine();
        let file = make_file(0x2000, 0x2001, 0, b'B', &[1, 2, 3, 4]);
        quickload(&mut machine, &file).expect("load should succeed");
        assert_eq!(machine.bus.memory.peek(0x2001), 2);
        assert_eq!(machine.bus.memory.peek(0x2002), 0, "clipped");
    }
}
