//! Top-level Z1013 system.
//!
//! Owns the CPU, bus and frame clock for one machine instance. The host
//! drives it with [`Z1013::exec`] once per display frame; everything else
//! (input, media, snapshots) is synchronous API on the instance. Multiple
//! instances are independent — dropping one releases all its memory.

use emu_core::{Cpu, FrameClock, Tickable};
use zilog_z80::Z80;

use crate::audio::{AudioBuffer, SAMPLE_RATE};
use crate::bus::Z1013Bus;
use crate::cassette::{self, TapeDeck};
use crate::config::{ConfigError, Z1013Config, Z1013Model};
use crate::keyboard::Keyboard;
use crate::memory::Memory;
use crate::quickload;
use crate::snapshot;
use crate::video::{DisplayInfo, Video};

/// Monitor entry point; the hardware reset circuit starts execution here.
const RESET_VECTOR: u16 = 0xF000;

/// Required monitor and font ROM sizes.
const OS_ROM_SIZE: usize = 0x800;
const FONT_ROM_SIZE: usize = 0x800;

/// A Z1013 machine instance.
pub struct Z1013 {
    pub(crate) cpu: Z80,
    pub(crate) bus: Z1013Bus,
    pub(crate) model: Z1013Model,
    pub(crate) frame_clock: FrameClock,
    /// Cycles the last `exec` ran past its budget; deducted from the next.
    pub(crate) overshoot: u64,
}

impl Z1013 {
    /// Build and reset a machine for the given configuration.
    ///
    /// Configuration problems are fatal and reported before any execution
    /// can begin; no partially-initialised machine escapes.
    pub fn new(config: &Z1013Config) -> Result<Self, ConfigError> {
        if config.os_rom.len() != OS_ROM_SIZE {
            return Err(ConfigError::OsRomSize {
                expected: OS_ROM_SIZE,
                got: config.os_rom.len(),
            });
        }
        if config.font_rom.len() != FONT_ROM_SIZE {
            return Err(ConfigError::FontRomSize {
                expected: FONT_ROM_SIZE,
                got: config.font_rom.len(),
            });
        }

        let model = config.model;
        let clock_hz = model.clock_hz();

        let mut memory = Memory::new(&config.os_rom);
        memory.map_ram(0x0000, model.ram_size().min(0xEC00) as u32);
        if model.ram_size() > 0xEC00 {
            memory.map_ram(0xF800, 0x800);
        }
        memory.map_ram(0xEC00, 0x400); // video RAM
        memory.map_rom(0xF000, 0x800);

        let bus = Z1013Bus::new(
            memory,
            Video::new(clock_hz, &config.font_rom),
            Keyboard::new(model.matrix_rows()),
            TapeDeck::new(clock_hz),
            AudioBuffer::new(clock_hz, SAMPLE_RATE),
        );

        let mut machine = Self {
            cpu: Z80::new(),
            bus,
            model,
            frame_clock: FrameClock::new(clock_hz),
            overshoot: 0,
        };
        machine.reset();
        Ok(machine)
    }

    /// Reset CPU and peripherals without clearing RAM, entering the
    /// monitor at its reset vector.
    pub fn reset(&mut self) {
        self.cpu.reset();
        self.cpu.regs.pc = RESET_VECTOR;
        self.bus.pio.reset();
        self.bus.video.reset();
        self.bus.keyboard.release_all();
        self.bus.audio.reset();
        self.frame_clock.reset();
        self.overshoot = 0;
    }

    /// Run the machine for `micro_seconds` of emulated time.
    ///
    /// The elapsed time is converted to a cycle budget by the frame clock;
    /// the CPU steps until the budget is spent, with every peripheral
    /// ticked by each instruction's cycle cost. The final instruction may
    /// run past the budget by its own cost — the overshoot is deducted
    /// from the next call, so long-run timing never drifts.
    ///
    /// Returns the number of cycles actually executed.
    pub fn exec(&mut self, micro_seconds: u32) -> u64 {
        let budget = self.frame_clock.budget(micro_seconds);
        let due = budget.saturating_sub(self.overshoot);
        self.overshoot = self.overshoot.saturating_sub(budget);
        if due == 0 {
            return 0;
        }

        let mut executed = 0u64;
        while executed < due {
            // Hand a latched PIO interrupt to the CPU at the boundary.
            if self.cpu.regs.iff1
                && self.cpu.int_pending.is_none()
                && let Some(vector) = self.bus.pio.ack_irq()
            {
                self.cpu.request_interrupt(vector);
            }

            let cycles = self.cpu.step(&mut self.bus);
            self.bus.tick(cycles);
            executed += u64::from(cycles);
        }

        self.overshoot += executed - due;
        executed
    }

    /// Press the key for a logical key code.
    pub fn key_down(&mut self, code: u8) {
        self.bus.keyboard.key_down(code);
        self.bus.refresh_pio_inputs();
    }

    /// Release the key for a logical key code.
    pub fn key_up(&mut self, code: u8) {
        self.bus.keyboard.key_up(code);
        self.bus.refresh_pio_inputs();
    }

    /// Display geometry for the host window (query before creating it).
    #[must_use]
    pub fn display_info(&self) -> DisplayInfo {
        Video::display_info()
    }

    /// Reference to the framebuffer (ARGB32, row-major).
    #[must_use]
    pub fn framebuffer(&self) -> &[u32] {
        self.bus.video.framebuffer()
    }

    /// Drain the audio samples produced since the last call.
    pub fn take_audio(&mut self) -> Vec<f32> {
        self.bus.audio.take_samples()
    }

    /// Ingest a media image with a file-extension hint.
    ///
    /// `"tap"` images are pulse-encoded onto the virtual tape deck and
    /// start playing. Failure leaves the deck untouched.
    pub fn insert_tape(&mut self, data: &[u8], extension: &str) -> Result<(), String> {
        match extension.to_ascii_lowercase().as_str() {
            "tap" => {
                let pulses = cassette::encode(data)?;
                log::info!(
                    "tape inserted: {} bytes, {} half-periods",
                    data.len(),
                    pulses.len()
                );
                self.bus.tape.insert(pulses);
                self.bus.tape.play();
                Ok(())
            }
            other => Err(format!("unsupported media extension: {other:?}")),
        }
    }

    /// Remove the tape from the deck.
    pub fn eject_tape(&mut self) {
        self.bus.tape.eject();
    }

    /// Load a headersave memory image (see [`crate::quickload`]).
    pub fn quickload(&mut self, data: &[u8]) -> Result<(), String> {
        quickload::quickload(self, data)
    }

    /// Serialise the complete machine state.
    #[must_use]
    pub fn save_snapshot(&self) -> Vec<u8> {
        snapshot::save_snapshot(self)
    }

    /// Restore a machine state record. On any mismatch the machine is
    /// left untouched and an error is returned.
    pub fn load_snapshot(&mut self, record: &[u8]) -> Result<(), String> {
        snapshot::load_snapshot(self, record)
    }

    #[must_use]
    pub fn model(&self) -> Z1013Model {
        self.model
    }

    #[must_use]
    pub fn cpu(&self) -> &Z80 {
        &self.cpu
    }

    pub fn cpu_mut(&mut self) -> &mut Z80 {
        &mut self.cpu
    }

    #[must_use]
    pub fn bus(&self) -> &Z1013Bus {
        &self.bus
    }

    pub fn bus_mut(&mut self) -> &mut Z1013Bus {
        &mut self.bus
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use emu_core::Bus;

    fn make_config(model: Z1013Model) -> Z1013Config {
        // Monitor that disables interrupts and halts.
        let mut os_rom = vec![0u8; OS_ROM_SIZE];
        os_rom[0] = 0xF3; // DI
        os_rom[1] = 0x76; // HALT
        Z1013Config {
            model,
            os_rom,
            font_rom: vec![0u8; FONT_ROM_SIZE],
        }
    }

    #[test]
    fn new_validates_rom_sizes() {
        let mut config = make_config(Z1013Model::Model64);
        config.os_rom.truncate(100);
        assert!(matches!(
            Z1013::new(&config),
            Err(ConfigError::OsRomSize { .. })
        ));

        let mut config = make_config(Z1013Model::Model64);
        config.font_rom.push(0);
        assert!(matches!(
            Z1013::new(&config),
            Err(ConfigError::FontRomSize { .. })
        ));
    }

    #[test]
    fn reset_enters_monitor() {
        let machine = Z1013::new(&make_config(Z1013Model::Model16))
            .expect("valid config");
        assert_eq!(machine.cpu().regs.pc, RESET_VECTOR);
    }

    #[test]
    fn exec_runs_the_monitor() {
        let mut machine =
            Z1013::new(&make_config(Z1013Model::Model16)).expect("valid config");
        let cycles = machine.exec(1_000);
        assert!(cycles >= 2_000, "2 MHz: 1 ms is at least 2000 cycles");
        assert!(machine.cpu().is_halted());
    }

    #[test]
    fn exec_zero_microseconds_is_a_no_op() {
        let mut machine =
            Z1013::new(&make_config(Z1013Model::Model16)).expect("valid config");
        assert_eq!(machine.exec(0), 0);
    }

    #[test]
    fn overshoot_carries_between_calls() {
        let mut machine =
            Z1013::new(&make_config(Z1013Model::Model16)).expect("valid config");
        // Tiny slices force budgets smaller than one instruction; the
        // total over many calls must still track the clock.
        let mut total = 0u64;
        for _ in 0..1_000 {
            total += machine.exec(2); // 4 cycles each at 2 MHz
        }
        assert_eq!(total, 4_000);
    }

    #[test]
    fn model_64_has_high_ram() {
        let mut machine =
            Z1013::new(&make_config(Z1013Model::Model64)).expect("valid config");
        machine.bus_mut().write(0xF800, 0x42);
        assert_eq!(machine.bus_mut().read(0xF800), 0x42);

        let mut machine =
            Z1013::new(&make_config(Z1013Model::Model16)).expect("valid config");
        machine.bus_mut().write(0xF800, 0x42);
        assert_eq!(machine.bus_mut().read(0xF800), 0xFF);
    }

    #[test]
    fn insert_tape_rejects_unknown_extension() {
        let mut machine =
            Z1013::new(&make_config(Z1013Model::Model16)).expect("valid config");
        let err = machine.insert_tape(&[0u8; 64], "xyz");
        assert!(err.is_err());
        assert!(!machine.bus().tape.is_loaded());
    }

    #[test]
    fn insert_tape_rejects_short_image_without_touching_deck() {
        let mut machine =
            Z1013::new(&make_config(Z1013Model::Model16)).expect("valid config");
        assert!(machine.insert_tape(&[0u8; 8], "tap").is_err());
        assert!(!machine.bus().tape.is_loaded());

        assert!(machine.insert_tape(&[0u8; 64], "tap").is_ok());
        assert!(machine.bus().tape.is_playing());
    }
}
