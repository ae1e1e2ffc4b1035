//! Cassette interface: pulse-width codec and playback deck.
//!
//! Tape data is a stream of half-period durations in microseconds. Every
//! impulse is one full square-wave cycle, so it contributes two equal
//! entries:
//!
//! - short impulse: `833, 833` µs
//! - long impulse: `1666, 1666` µs (twice the short duration)
//!
//! Framing:
//!
//! - a bit 1 is two short impulses, a bit 0 is one long impulse; bits are
//!   sent LSB first;
//! - every byte is terminated by an end-of-byte frame of four short
//!   impulses followed by one long impulse;
//! - a recording starts with a 17,400 µs silence, then a synchronisation
//!   preamble of exactly 30,000 short impulses (plus end-of-byte), the
//!   32-byte header block, a second preamble of 7,200 short impulses
//!   (plus end-of-byte), then the remaining data bytes.
//!
//! Getting the pulse counts and durations wrong breaks loading on the
//! machine side, so [`encode`]/[`decode`] are exact inverses and the tests
//! pin the reference sequence.

/// Short impulse half-period, µs.
pub const SHORT_PULSE_US: u16 = 833;
/// Long impulse half-period, µs.
pub const LONG_PULSE_US: u16 = 1666;
/// Leading silence, µs.
pub const LEAD_SILENCE_US: u16 = 17_400;
/// Short impulses in the leading synchronisation preamble.
pub const LEAD_SYNC_IMPULSES: u32 = 30_000;
/// Short impulses in the preamble between header and data.
pub const DATA_SYNC_IMPULSES: u32 = 7_200;
/// Header block length in bytes.
pub const HEADER_LEN: usize = 32;

fn push_short(out: &mut Vec<u16>) {
    out.push(SHORT_PULSE_US);
    out.push(SHORT_PULSE_US);
}

fn push_long(out: &mut Vec<u16>) {
    out.push(LONG_PULSE_US);
    out.push(LONG_PULSE_US);
}

fn push_end_of_byte(out: &mut Vec<u16>) {
    for _ in 0..4 {
        push_short(out);
    }
    push_long(out);
}

fn push_byte(out: &mut Vec<u16>, byte: u8) {
    let mut bits = byte;
    for _ in 0..8 {
        if bits & 0x01 != 0 {
            push_short(out);
            push_short(out);
        } else {
            push_long(out);
        }
        bits >>= 1;
    }
    push_end_of_byte(out);
}

/// Encode a raw data buffer into a half-period pulse stream.
///
/// The input must carry at least the 32-byte header block.
pub fn encode(data: &[u8]) -> Result<Vec<u16>, String> {
    if data.len() < HEADER_LEN {
        return Err(format!(
            "tape image too small: need at least {HEADER_LEN} bytes, got {}",
            data.len()
        ));
    }

    // Rough upper bound: every byte costs at most 8 long impulses plus the
    // end-of-byte frame.
    let mut out = Vec::with_capacity(
        1 + 2 * (LEAD_SYNC_IMPULSES + DATA_SYNC_IMPULSES + 10) as usize
            + data.len() * 2 * (8 + 5),
    );

    out.push(LEAD_SILENCE_US);

    for _ in 0..LEAD_SYNC_IMPULSES {
        push_short(&mut out);
    }
    push_end_of_byte(&mut out);

    for &byte in &data[..HEADER_LEN] {
        push_byte(&mut out, byte);
    }

    for _ in 0..DATA_SYNC_IMPULSES {
        push_short(&mut out);
    }
    push_end_of_byte(&mut out);

    for &byte in &data[HEADER_LEN..] {
        push_byte(&mut out, byte);
    }

    Ok(out)
}

/// Half-period classification with ±20 % tolerance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Pulse {
    Short,
    Long,
    Silence,
}

fn classify(duration: u16) -> Result<Pulse, String> {
    let d = u32::from(duration);
    let short = u32::from(SHORT_PULSE_US);
    let long = u32::from(LONG_PULSE_US);
    if d * 10 >= short * 8 && d * 10 <= short * 12 {
        Ok(Pulse::Short)
    } else if d * 10 >= long * 8 && d * 10 <= long * 12 {
        Ok(Pulse::Long)
    } else if d > long * 2 {
        Ok(Pulse::Silence)
    } else {
        Err(format!("unclassifiable pulse width {duration} µs"))
    }
}

/// Cursor over a pulse stream, consuming whole impulses (half-period
/// pairs).
struct ImpulseReader<'a> {
    pulses: &'a [u16],
    pos: usize,
}

impl<'a> ImpulseReader<'a> {
    fn new(pulses: &'a [u16]) -> Self {
        Self { pulses, pos: 0 }
    }

    fn is_empty(&self) -> bool {
        self.pos >= self.pulses.len()
    }

    /// Peek at the class of the next impulse without consuming it.
    fn peek(&self) -> Result<Option<Pulse>, String> {
        if self.is_empty() {
            return Ok(None);
        }
        classify(self.pulses[self.pos]).map(Some)
    }

    /// Consume one impulse (two matching half-periods, or a single silence
    /// entry).
    fn next(&mut self) -> Result<Option<Pulse>, String> {
        let Some(kind) = self.peek()? else {
            return Ok(None);
        };
        if kind == Pulse::Silence {
            self.pos += 1;
            return Ok(Some(kind));
        }

        let second = self
            .pulses
            .get(self.pos + 1)
            .copied()
            .ok_or_else(|| "truncated impulse at end of stream".to_string())?;
        if classify(second)? != kind {
            return Err(format!(
                "mismatched half-periods at entry {}",
                self.pos
            ));
        }
        self.pos += 2;
        Ok(Some(kind))
    }

    /// Consume a synchronisation run: shorts up to the terminating long
    /// impulse (the preamble's end-of-byte frame merges into the run).
    /// Returns the number of short impulses consumed.
    fn sync_run(&mut self) -> Result<u32, String> {
        let mut shorts = 0u32;
        loop {
            match self.next()? {
                Some(Pulse::Short) => shorts += 1,
                Some(Pulse::Long) => return Ok(shorts),
                Some(Pulse::Silence) => {
                    if shorts != 0 {
                        return Err("silence inside preamble".to_string());
                    }
                }
                None => return Err("stream ended inside preamble".to_string()),
            }
        }
    }

    /// Consume one data byte: eight bits LSB first, then the end-of-byte
    /// frame.
    fn byte(&mut self) -> Result<u8, String> {
        let mut value = 0u8;
        for bit in 0..8 {
            match self.next()? {
                Some(Pulse::Short) => {
                    // A 1 bit is two short impulses.
                    match self.next()? {
                        Some(Pulse::Short) => value |= 1 << bit,
                        other => {
                            return Err(format!(
                                "expected second short impulse of a 1 bit, got {other:?}"
                            ));
                        }
                    }
                }
                Some(Pulse::Long) => {}
                other => {
                    return Err(format!("expected data impulse, got {other:?}"));
                }
            }
        }

        // End-of-byte frame: four shorts, one long.
        for _ in 0..4 {
            match self.next()? {
                Some(Pulse::Short) => {}
                other => {
                    return Err(format!(
                        "malformed end-of-byte frame, got {other:?}"
                    ));
                }
            }
        }
        match self.next()? {
            Some(Pulse::Long) => Ok(value),
            other => Err(format!("end-of-byte frame not closed, got {other:?}")),
        }
    }
}

/// Decode a half-period pulse stream back into the raw data buffer.
///
/// Inverse of [`encode`]; tolerates ±20 % pulse-width jitter.
pub fn decode(pulses: &[u16]) -> Result<Vec<u8>, String> {
    let mut reader = ImpulseReader::new(pulses);

    // Leading silence (optional, any length), then the first preamble.
    while let Some(Pulse::Silence) = reader.peek()? {
        reader.next()?;
    }
    let lead = reader.sync_run()?;
    if lead < 100 {
        return Err(format!("leading preamble too short: {lead} impulses"));
    }

    let mut data = Vec::new();
    for _ in 0..HEADER_LEN {
        data.push(reader.byte()?);
    }

    // Second preamble between header and payload.
    let mid = reader.sync_run()?;
    if mid < 100 {
        return Err(format!("data preamble too short: {mid} impulses"));
    }

    while !reader.is_empty() {
        data.push(reader.byte()?);
    }
    Ok(data)
}

// ---------------------------------------------------------------------------
// Playback deck
// ---------------------------------------------------------------------------

/// Virtual tape deck: plays a half-period stream against the CPU clock,
/// exposing the current line level for the cassette input bit.
pub struct TapeDeck {
    pulses: Vec<u16>,
    /// Index of the half-period currently playing.
    position: usize,
    /// CPU cycles left in the current half-period.
    cycles_remaining: u64,
    /// CPU cycles per microsecond.
    cycles_per_us: u64,
    level: bool,
    playing: bool,
}

impl TapeDeck {
    #[must_use]
    pub fn new(clock_hz: u64) -> Self {
        Self {
            pulses: Vec::new(),
            position: 0,
            cycles_remaining: 0,
            cycles_per_us: (clock_hz / 1_000_000).max(1),
            level: false,
            playing: false,
        }
    }

    /// Insert an encoded pulse stream and rewind.
    pub fn insert(&mut self, pulses: Vec<u16>) {
        self.pulses = pulses;
        self.rewind();
    }

    /// Remove the tape.
    pub fn eject(&mut self) {
        self.pulses.clear();
        self.rewind();
    }

    pub fn rewind(&mut self) {
        self.position = 0;
        self.cycles_remaining = 0;
        self.level = false;
        self.playing = false;
    }

    pub fn play(&mut self) {
        if !self.pulses.is_empty() {
            self.playing = true;
        }
    }

    pub fn stop(&mut self) {
        self.playing = false;
    }

    #[must_use]
    pub fn is_playing(&self) -> bool {
        self.playing
    }

    #[must_use]
    pub fn is_loaded(&self) -> bool {
        !self.pulses.is_empty()
    }

    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.position >= self.pulses.len() && self.cycles_remaining == 0
    }

    /// Current cassette line level.
    #[must_use]
    pub fn level(&self) -> bool {
        self.level
    }

    /// Advance playback by elapsed CPU cycles, toggling the line at each
    /// half-period boundary.
    pub fn tick(&mut self, cycles: u32) {
        if !self.playing {
            return;
        }

        let mut remaining = u64::from(cycles);
        while remaining > 0 {
            if self.cycles_remaining == 0 {
                if self.position >= self.pulses.len() {
                    self.playing = false;
                    return;
                }
                self.cycles_remaining =
                    u64::from(self.pulses[self.position]) * self.cycles_per_us;
                self.position += 1;
                self.level = !self.level;
            }

            let step = remaining.min(self.cycles_remaining);
            self.cycles_remaining -= step;
            remaining -= step;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_image() -> Vec<u8> {
        let mut data = vec![0u8; HEADER_LEN];
        data[0] = 0x55;
        data[1] = 0xAA;
        data.extend_from_slice(&[0x01, 0x02, 0xFE, 0xFF, 0x00]);
        data
    }

    #[test]
    fn rejects_undersized_input() {
        assert!(encode(&[0u8; 31]).is_err());
        assert!(encode(&[0u8; 32]).is_ok());
    }

    #[test]
    fn reference_sequence_prefix() {
        let pulses = encode(&sample_image()).unwrap();

        // Entry 0: the leading silence.
        assert_eq!(pulses[0], LEAD_SILENCE_US);

        // Then exactly 30,000 short impulses = 60,000 half-periods.
        let sync_halves = 2 * LEAD_SYNC_IMPULSES as usize;
        for (i, &p) in pulses[1..=sync_halves].iter().enumerate() {
            assert_eq!(p, SHORT_PULSE_US, "preamble half-period {i}");
        }

        // Followed by the end-of-byte frame: 4 shorts + 1 long.
        let frame = &pulses[1 + sync_halves..1 + sync_halves + 10];
        assert_eq!(&frame[..8], &[SHORT_PULSE_US; 8]);
        assert_eq!(&frame[8..], &[LONG_PULSE_US; 2]);
    }

    #[test]
    fn long_pulse_is_twice_the_short() {
        assert_eq!(LONG_PULSE_US, 2 * SHORT_PULSE_US);
    }

    #[test]
    fn zero_byte_costs_eight_long_impulses() {
        // One 0x00 byte: 8 zero bits (8 long impulses) + end-of-byte frame
        // (4 short + 1 long) = 13 impulses = 26 half-periods.
        let mut out = Vec::new();
        push_byte(&mut out, 0x00);
        assert_eq!(out.len(), 26);

        // 0xFF: 8 one bits (16 short impulses) + frame = 21 impulses.
        let mut out = Vec::new();
        push_byte(&mut out, 0xFF);
        assert_eq!(out.len(), 42);
    }

    #[test]
    fn encode_decode_round_trip() {
        let image = sample_image();
        let pulses = encode(&image).unwrap();
        let decoded = decode(&pulses).unwrap();
        assert_eq!(decoded, image);
    }

    #[test]
    fn decode_tolerates_jitter() {
        let image = sample_image();
        let mut pulses = encode(&image).unwrap();
        // Stretch every half-period by ~10 %.
        for p in &mut pulses[1..] {
            *p += *p / 10;
        }
        assert_eq!(decode(&pulses).unwrap(), image);
    }

    #[test]
    fn decode_rejects_garbage() {
        assert!(decode(&[100, 100, 100]).is_err());
        assert!(decode(&[]).is_err());
    }

    #[test]
    fn deck_toggles_level_per_half_period() {
        let mut deck = TapeDeck::new(2_000_000);
        deck.insert(vec![100, 100, 100]);
        deck.play();
        assert!(!deck.level());

        // 100 µs at 2 MHz = 200 cycles per half-period. The first tick
        // starts the first half-period (level goes high).
        deck.tick(1);
        assert!(deck.level());

        deck.tick(199);
        deck.tick(1);
        assert!(!deck.level(), "second half-period is low");
    }

    #[test]
    fn deck_stops_at_end_of_tape() {
        let mut deck = TapeDeck::new(1_000_000);
        deck.insert(vec![10, 10]);
        deck.play();
        deck.tick(100);
        assert!(!deck.is_playing());
        assert!(deck.is_finished());
    }

    #[test]
    fn deck_without_tape_ignores_play() {
        let mut deck = TapeDeck::new(1_000_000);
        deck.play();
        assert!(!deck.is_playing());
    }
}
