//! Keyboard matrix.
//!
//! The keyboard is a passive matrix of 8 columns × 8 rows (8×4 on the
//! Z1013.01). The monitor scans it by writing the column number to the
//! latch at I/O port $08, then reading four row lines, active low, on
//! PIO port B bits 0-3. On the 8×8 models the PIO's port B bit 4 output
//! selects whether rows 0-3 or 4-7 are presented.
//!
//! [`Keyboard::key_down`]/[`key_up`](Keyboard::key_up) take logical key
//! codes (upper-case ASCII plus control codes) and translate them through
//! the model's mapping table, holding Shift crosspoints down as needed.

use crate::keyboard_map::{self, KeyPos};

/// Keyboard matrix state plus the column latch.
pub struct Keyboard {
    /// Pressed-key bits per column; bit n = row n.
    matrix: [u8; 8],
    /// Column selected via port $08.
    column: u8,
    /// Matrix rows: 4 or 8 depending on model.
    rows: u8,
}

impl Keyboard {
    #[must_use]
    pub fn new(rows: u8) -> Self {
        Self {
            matrix: [0; 8],
            column: 0,
            rows,
        }
    }

    fn lookup(&self, code: u8) -> Option<KeyPos> {
        if self.rows == 4 {
            keyboard_map::lookup_8x4(code)
        } else {
            keyboard_map::lookup_8x8(code)
        }
    }

    fn shift_pos(&self) -> KeyPos {
        if self.rows == 4 {
            keyboard_map::SHIFT_8X4
        } else {
            keyboard_map::SHIFT_8X8
        }
    }

    /// Press the key for a logical key code. Unknown codes are ignored.
    pub fn key_down(&mut self, code: u8) {
        if let Some(pos) = self.lookup(code) {
            self.matrix[usize::from(pos.column)] |= 1 << pos.row;
            if pos.shift {
                let shift = self.shift_pos();
                self.matrix[usize::from(shift.column)] |= 1 << shift.row;
            }
        }
    }

    /// Release the key for a logical key code.
    pub fn key_up(&mut self, code: u8) {
        if let Some(pos) = self.lookup(code) {
            self.matrix[usize::from(pos.column)] &= !(1 << pos.row);
            if pos.shift {
                let shift = self.shift_pos();
                self.matrix[usize::from(shift.column)] &= !(1 << shift.row);
            }
        }
    }

    /// Release every key.
    pub fn release_all(&mut self) {
        self.matrix = [0; 8];
    }

    /// Latch the scanned column (port $08 write).
    pub fn set_column(&mut self, value: u8) {
        self.column = value & 0x07;
    }

    /// Row lines for the latched column, active low in bits 0-3.
    ///
    /// `upper_half` is PIO port B bit 4: false presents rows 0-3, true
    /// rows 4-7. The 8×4 matrix only has the lower half.
    #[must_use]
    pub fn read_lines(&self, upper_half: bool) -> u8 {
        let column = self.matrix[usize::from(self.column)];
        let nibble = if upper_half && self.rows == 8 {
            column >> 4
        } else {
            column & 0x0F
        };
        !nibble & 0x0F
    }

    /// Latch state for serialisation.
    #[must_use]
    pub fn state(&self) -> (u8, [u8; 8]) {
        (self.column, self.matrix)
    }

    /// Restore latch and matrix from serialised state.
    pub fn restore(&mut self, column: u8, matrix: [u8; 8]) {
        self.column = column & 0x07;
        self.matrix = matrix;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_keys_reads_all_high() {
        let kbd = Keyboard::new(8);
        assert_eq!(kbd.read_lines(false), 0x0F);
        assert_eq!(kbd.read_lines(true), 0x0F);
    }

    #[test]
    fn key_down_pulls_row_low_in_its_column() {
        let mut kbd = Keyboard::new(8);
        // 'A' sits at column 1, row 0
        kbd.key_down(b'A');

        kbd.set_column(1);
        assert_eq!(kbd.read_lines(false), 0x0E);

        // Other columns unaffected
        kbd.set_column(0);
        assert_eq!(kbd.read_lines(false), 0x0F);

        kbd.key_up(b'A');
        kbd.set_column(1);
        assert_eq!(kbd.read_lines(false), 0x0F);
    }

    #[test]
    fn upper_half_selects_rows_4_to_7() {
        let mut kbd = Keyboard::new(8);
        // '1' sits at column 1, row 4
        kbd.key_down(b'1');
        kbd.set_column(1);
        assert_eq!(kbd.read_lines(false), 0x0F, "not visible in lower half");
        assert_eq!(kbd.read_lines(true), 0x0E);
    }

    #[test]
    fn shifted_code_holds_shift_crosspoint() {
        let mut kbd = Keyboard::new(8);
        kbd.key_down(b'!'); // Shift + 1
        kbd.set_column(1);
        assert_eq!(kbd.read_lines(true), 0x0E, "base key down");

        let shift = keyboard_map::SHIFT_8X8;
        kbd.set_column(shift.column);
        let lines = kbd.read_lines(shift.row >= 4);
        assert_eq!(lines & (1 << (shift.row % 4)), 0, "shift key down");

        kbd.key_up(b'!');
        kbd.set_column(1);
        assert_eq!(kbd.read_lines(true), 0x0F);
    }

    #[test]
    fn lowercase_maps_to_uppercase() {
        let mut kbd = Keyboard::new(8);
        kbd.key_down(b'a');
        kbd.set_column(1);
        assert_eq!(kbd.read_lines(false), 0x0E);
    }

    #[test]
    fn small_matrix_ignores_digits() {
        let mut kbd = Keyboard::new(4);
        kbd.key_down(b'1');
        for column in 0..8 {
            kbd.set_column(column);
            assert_eq!(kbd.read_lines(false), 0x0F);
        }
    }

    #[test]
    fn small_matrix_has_enter() {
        let mut kbd = Keyboard::new(4);
        kbd.key_down(0x0D);
        kbd.set_column(3);
        assert_eq!(kbd.read_lines(false) & 0x08, 0, "Enter at column 3 row 3");
    }

    #[test]
    fn release_all_clears_matrix() {
        let mut kbd = Keyboard::new(8);
        kbd.key_down(b'A');
        kbd.key_down(b'Z');
        kbd.release_all();
        for column in 0..8 {
            kbd.set_column(column);
            assert_eq!(kbd.read_lines(false), 0x0F);
            assert_eq!(kbd.read_lines(true), 0x0F);
        }
    }
}
