//! Machine model configuration.

use std::fmt;

/// Supported Z1013 hardware variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Z1013Model {
    /// Z1013.01: 1 MHz, 16 KB RAM, 8×4 keyboard.
    Model01,
    /// Z1013.16: 2 MHz, 16 KB RAM, 8×8 keyboard.
    Model16,
    /// Z1013.64: 2 MHz, 64 KB RAM, 8×8 keyboard.
    Model64,
}

impl Z1013Model {
    /// CPU clock in Hz.
    #[must_use]
    pub const fn clock_hz(self) -> u64 {
        match self {
            Self::Model01 => 1_000_000,
            Self::Model16 | Self::Model64 => 2_000_000,
        }
    }

    /// Installed RAM in bytes.
    #[must_use]
    pub const fn ram_size(self) -> usize {
        match self {
            Self::Model01 | Self::Model16 => 0x4000,
            Self::Model64 => 0x1_0000,
        }
    }

    /// Keyboard matrix rows (4 on the .01, 8 on the later models).
    #[must_use]
    pub const fn matrix_rows(self) -> u8 {
        match self {
            Self::Model01 => 4,
            Self::Model16 | Self::Model64 => 8,
        }
    }

    /// Model byte used in snapshot records.
    #[must_use]
    pub const fn tag(self) -> u8 {
        match self {
            Self::Model01 => 1,
            Self::Model16 => 16,
            Self::Model64 => 64,
        }
    }
}

/// Configuration for creating a [`crate::Z1013`] instance.
pub struct Z1013Config {
    pub model: Z1013Model,
    /// Monitor ROM image, mapped at $F000. Must be exactly 2,048 bytes.
    pub os_rom: Vec<u8>,
    /// Character generator ROM (256 glyphs × 8 bytes). Must be exactly
    /// 2,048 bytes.
    pub font_rom: Vec<u8>,
}

/// Fatal configuration problems detected before any execution begins.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    OsRomSize { expected: usize, got: usize },
    FontRomSize { expected: usize, got: usize },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OsRomSize { expected, got } => {
                write!(f, "monitor ROM must be {expected} bytes, got {got}")
            }
            Self::FontRomSize { expected, got } => {
                write!(f, "font ROM must be {expected} bytes, got {got}")
            }
        }
    }
}

impl std::error::Error for ConfigError {}
