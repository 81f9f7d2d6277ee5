//! Frame header construction.
//!
//! Every upload starts with a fixed 64 byte header: the `wang` magic, a
//! brightness code, per-slot blink/border bitmasks, one packed speed/mode
//! byte per slot, big-endian pixel-column counts, and a timestamp the badge
//! stores but never displays.

use chrono::{DateTime, Datelike, TimeZone, Timelike};
use led_badge_core::{BadgeError, Result};

/// Header size; also the bulk transfer block size frames are padded to.
pub const HEADER_LEN: usize = 64;
/// Hard ceiling on a full frame. The controller cannot take more.
pub const MAX_FRAME_LEN: usize = 8192;
/// Payload bytes per pixel column: 11 display rows, one bit per row byte.
pub const BYTES_PER_COLUMN: usize = 11;
/// Message slots in one frame.
pub const SLOTS: usize = 8;

const OFFSET_BRIGHTNESS: usize = 5;
const OFFSET_BLINK: usize = 6;
const OFFSET_ANTS: usize = 7;
const OFFSET_SPEED_MODE: usize = 8;
const OFFSET_LENGTHS: usize = 16;
const OFFSET_TIMESTAMP: usize = 38;

/// Header template: `wang` magic, full brightness, every slot at speed 5
/// mode 0, no lengths, zeroed timestamp.
const TEMPLATE: [u8; HEADER_LEN] = [
    0x77, 0x61, 0x6e, 0x67, 0x00, 0x00, 0x00, 0x00, //
    0x40, 0x40, 0x40, 0x40, 0x40, 0x40, 0x40, 0x40, //
    0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, //
    0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, //
    0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, //
    0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, //
    0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, //
    0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, //
];

/// Brightness as one of the four codes the controller accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Brightness {
    Quarter = 0x40,
    Half = 0x20,
    ThreeQuarters = 0x10,
    Full = 0x00,
}

impl Brightness {
    /// Bucket a percentage into the nearest device level.
    pub fn from_percent(percent: u8) -> Self {
        match percent {
            0..=25 => Brightness::Quarter,
            26..=50 => Brightness::Half,
            51..=75 => Brightness::ThreeQuarters,
            _ => Brightness::Full,
        }
    }
}

/// Build the 64 byte frame header.
///
/// `lengths` holds the pixel-column count per message; only the first
/// [`SLOTS`] entries are honored. `speeds` (1..=8), `modes` (0..=8),
/// `blinks` and `ants` are clamped element-wise into their valid range and
/// padded to all 8 slots by repeating their last element, regardless of how
/// many lengths were supplied.
///
/// The caller provides the timestamp explicitly; this function never reads
/// the system clock.
pub fn build_header<Tz: TimeZone>(
    lengths: &[u16],
    speeds: &[u8],
    modes: &[u8],
    blinks: &[bool],
    ants: &[bool],
    brightness: Brightness,
    timestamp: &DateTime<Tz>,
) -> Result<[u8; HEADER_LEN]> {
    if lengths.is_empty() {
        return Err(BadgeError::InvalidInput(
            "at least one message length is required".into(),
        ));
    }
    let columns: usize = lengths.iter().map(|&l| l as usize).sum();
    let size = HEADER_LEN + columns * BYTES_PER_COLUMN;
    if size > MAX_FRAME_LEN {
        return Err(BadgeError::PayloadTooLarge {
            size,
            limit: MAX_FRAME_LEN,
        });
    }

    let speeds = pad_slots(speeds, "speed")?.map(|s| s.clamp(1, 8) - 1);
    let modes = pad_slots(modes, "mode")?.map(|m| m.min(8));
    let blinks = pad_slots(blinks, "blink")?;
    let ants = pad_slots(ants, "ants")?;

    let mut h = TEMPLATE;
    h[OFFSET_BRIGHTNESS] = brightness as u8;
    for i in 0..SLOTS {
        h[OFFSET_BLINK] |= (blinks[i] as u8) << i;
        h[OFFSET_ANTS] |= (ants[i] as u8) << i;
        h[OFFSET_SPEED_MODE + i] = 16 * speeds[i] + modes[i];
    }
    for (i, &len) in lengths.iter().take(SLOTS).enumerate() {
        let at = OFFSET_LENGTHS + 2 * i;
        h[at..at + 2].copy_from_slice(&len.to_be_bytes());
    }
    h[OFFSET_TIMESTAMP] = (timestamp.year() % 100) as u8;
    h[OFFSET_TIMESTAMP + 1] = timestamp.month() as u8;
    h[OFFSET_TIMESTAMP + 2] = timestamp.day() as u8;
    h[OFFSET_TIMESTAMP + 3] = timestamp.hour() as u8;
    h[OFFSET_TIMESTAMP + 4] = timestamp.minute() as u8;
    h[OFFSET_TIMESTAMP + 5] = timestamp.second() as u8;

    Ok(h)
}

/// Spread `values` over all 8 slots, repeating the final element. Entries
/// past slot 8 are ignored.
fn pad_slots<T: Copy>(values: &[T], what: &'static str) -> Result<[T; SLOTS]> {
    let Some(&last) = values.last() else {
        return Err(BadgeError::InvalidInput(format!(
            "at least one {what} value is required"
        )));
    };
    let mut slots = [last; SLOTS];
    for (slot, &value) in slots.iter_mut().zip(values) {
        *slot = value;
    }
    Ok(slots)
}
