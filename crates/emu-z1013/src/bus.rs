//! System bus: memory dispatch, I/O port decode and peripheral wiring.
//!
//! I/O map (low address byte):
//!
//! | Port  | Device                          |
//! |-------|---------------------------------|
//! | $00   | PIO port A data (user/cassette) |
//! | $01   | PIO port B data (keyboard/tape) |
//! | $02   | PIO port A control              |
//! | $03   | PIO port B control              |
//! | $08   | Keyboard column latch (write)   |
//!
//! PIO port B input lines: bits 0-3 carry the selected keyboard column's
//! row lines (active low, half selected by the port's own bit 4 output),
//! bit 7 is the cassette input. PIO port A bit 7 is the cassette/speaker
//! output the audio buffer samples.

use emu_core::{Bus, Tickable};
use zilog_z80_pio::Pio;

use crate::audio::AudioBuffer;
use crate::cassette::TapeDeck;
use crate::keyboard::Keyboard;
use crate::memory::Memory;
use crate::video::Video;

/// Cassette output line on PIO port A.
const TAPE_OUT_BIT: u8 = 0x80;
/// Cassette input line on PIO port B.
const TAPE_IN_BIT: u8 = 0x80;
/// Keyboard row-half select on PIO port B.
const HALF_SELECT_BIT: u8 = 0x10;

/// The Z1013 bus, implementing [`emu_core::Bus`].
///
/// Owns memory and every peripheral; the CPU reaches all of them through
/// the trait methods.
pub struct Z1013Bus {
    pub memory: Memory,
    pub video: Video,
    pub pio: Pio,
    pub keyboard: Keyboard,
    pub tape: TapeDeck,
    pub audio: AudioBuffer,
}

impl Z1013Bus {
    #[must_use]
    pub fn new(
        memory: Memory,
        video: Video,
        keyboard: Keyboard,
        tape: TapeDeck,
        audio: AudioBuffer,
    ) -> Self {
        let mut bus = Self {
            memory,
            video,
            pio: Pio::new(),
            keyboard,
            tape,
            audio,
        };
        bus.refresh_pio_inputs();
        bus
    }

    /// Present the current keyboard column and cassette level on the PIO's
    /// port B input lines.
    ///
    /// Called whenever the lines can have changed: column latch writes,
    /// PIO register access, and every tick (the tape level edges drive the
    /// PIO's bit-control interrupt logic).
    pub(crate) fn refresh_pio_inputs(&mut self) {
        let upper_half = self.pio.output_b() & HALF_SELECT_BIT != 0;
        let rows = self.keyboard.read_lines(upper_half);
        let tape = if self.tape.level() { TAPE_IN_BIT } else { 0 };
        // Bit 4 is pulled low until the PIO drives it as an output.
        self.pio.set_input_b(rows | 0x60 | tape);
    }
}

impl Bus for Z1013Bus {
    fn read(&mut self, addr: u16) -> u8 {
        self.memory.read(addr)
    }

    fn write(&mut self, addr: u16, value: u8) {
        self.memory.write(addr, value);
    }

    fn io_read(&mut self, port: u16) -> u8 {
        match port as u8 {
            reg @ 0x00..=0x03 => {
                self.refresh_pio_inputs();
                self.pio.read(reg)
            }
            // The column latch is write-only; reads float.
            _ => 0xFF,
        }
    }

    fn io_write(&mut self, port: u16, value: u8) {
        match port as u8 {
            reg @ 0x00..=0x03 => {
                self.pio.write(reg, value);
                self.refresh_pio_inputs();
            }
            0x08 => {
                self.keyboard.set_column(value);
                self.refresh_pio_inputs();
            }
            _ => {}
        }
    }
}

impl Tickable for Z1013Bus {
    fn tick(&mut self, cycles: u32) {
        self.video.tick(cycles, &self.memory);
        self.tape.tick(cycles);
        self.refresh_pio_inputs();
        let tape_out = self.pio.output_a() & TAPE_OUT_BIT != 0;
        self.audio.tick(cycles, tape_out);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cassette;

    fn make_bus() -> Z1013Bus {
        let mut rom = vec![0u8; 0x800];
        rom[0] = 0x76;
        let mut memory = Memory::new(&rom);
        memory.map_ram(0x0000, 0x4000);
        memory.map_ram(0xEC00, 0x400);
        memory.map_rom(0xF000, 0x800);

        Z1013Bus::new(
            memory,
            Video::new(2_000_000, &[0u8; 0x800]),
            Keyboard::new(8),
            TapeDeck::new(2_000_000),
            AudioBuffer::new(2_000_000, 48_000),
        )
    }

    #[test]
    fn memory_routes_through_page_table() {
        let mut bus = make_bus();
        bus.write(0x2000, 0x12);
        assert_eq!(bus.read(0x2000), 0x12);
        assert_eq!(bus.read(0xF000), 0x76);
        bus.write(0xF000, 0x00);
        assert_eq!(bus.read(0xF000), 0x76);
    }

    #[test]
    fn keyboard_scan_via_latch_and_pio() {
        let mut bus = make_bus();
        bus.keyboard.key_down(b'A'); // column 1, row 0

        bus.io_write(0x08, 1);
        let lines = bus.io_read(0x01);
        assert_eq!(lines & 0x0F, 0x0E, "row 0 active low");

        bus.io_write(0x08, 0);
        let lines = bus.io_read(0x01);
        assert_eq!(lines & 0x0F, 0x0F, "other column idle");

        bus.keyboard.key_up(b'A');
        bus.io_write(0x08, 1);
        let lines = bus.io_read(0x01);
        assert_eq!(lines & 0x0F, 0x0F);
    }

    #[test]
    fn half_select_switches_row_groups() {
        let mut bus = make_bus();
        bus.keyboard.key_down(b'1'); // column 1, row 4
        bus.io_write(0x08, 1);

        // Port B must be in bit-control mode to drive bit 4 as an output.
        bus.io_write(0x03, 0xCF);
        bus.io_write(0x03, 0xEF); // bit 4 output, rest input

        bus.io_write(0x01, 0x00); // lower half
        assert_eq!(bus.io_read(0x01) & 0x0F, 0x0F);

        bus.io_write(0x01, HALF_SELECT_BIT); // upper half
        assert_eq!(bus.io_read(0x01) & 0x0F, 0x0E);
    }

    #[test]
    fn unmapped_port_reads_float() {
        let mut bus = make_bus();
        assert_eq!(bus.io_read(0x08), 0xFF);
        assert_eq!(bus.io_read(0x55), 0xFF);
    }

    #[test]
    fn tape_level_appears_on_port_b_bit_7() {
        let mut bus = make_bus();
        let image = vec![0u8; cassette::HEADER_LEN];
        bus.tape.insert(cassette::encode(&image).unwrap());
        bus.tape.play();

        // Silence entry first: level goes high as it starts playing.
        bus.tick(1);
        assert_ne!(bus.io_read(0x01) & TAPE_IN_BIT, 0);
    }

    #[test]
    fn audio_follows_pio_port_a_output() {
        let mut bus = make_bus();
        bus.io_write(0x02, 0x0F); // port A to output mode
        bus.io_write(0x00, TAPE_OUT_BIT);
        bus.tick(40_000);
        let samples = bus.audio.take_samples();
        assert!(!samples.is_empty());
        assert!(samples.iter().all(|&s| s > 0.0));
    }
}
