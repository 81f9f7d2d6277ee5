//! Protocol encoding and USB transport for 11x44 LED name badges.
//!
//! These badges show up to 8 scrolling messages on an 11 pixel tall LED
//! matrix. A frame is one 64 byte header ([`build_header`]) followed by the
//! column bytes of every message, zero padded to the 64 byte block size and
//! streamed to a bulk-OUT endpoint with a fixed delay between blocks.
//!
//! [`Session`] owns the device between `open` and `close`; [`send`] is the
//! one-shot path the CLI uses.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::thread;

use chrono::{DateTime, TimeZone};
use led_badge_core::{BadgeError, Discovered, Result, UsbAccess};

pub mod header;
pub mod usb;

pub use header::{build_header, Brightness, BYTES_PER_COLUMN, HEADER_LEN, MAX_FRAME_LEN, SLOTS};

pub mod consts {
    use std::time::Duration;

    /// USB vendor id shared by this badge family
    pub const VENDOR_ID: u16 = 0x0416;
    /// USB product id shared by this badge family
    pub const PRODUCT_ID: u16 = 0x5020;
    /// Bulk transfer block size; frames are zero padded to a multiple of this
    pub const BLOCK_SIZE: usize = 64;
    /// Pause before each block so the controller keeps up
    pub const BLOCK_DELAY: Duration = Duration::from_millis(100);
}

/// One message slot: a pre-rendered bitmap plus its display settings.
///
/// The bitmap holds 11 bytes per pixel column, one bit per display row.
#[derive(Debug, Clone)]
pub struct Message {
    pub bitmap: Vec<u8>,
    /// Pixel column count declared for this slot
    pub columns: u16,
    /// Scroll speed, 1..=8
    pub speed: u8,
    /// Display mode, 0..=8: scroll left/right/up/down, still, animation,
    /// drop-down, curtain, laser
    pub mode: u8,
    pub blink: bool,
    /// Animated border
    pub ants: bool,
}

/// Device selection for [`Session::open`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum DeviceSelect {
    /// First discovered device in id order (default)
    #[default]
    Auto,
    /// Exact `bus:address:endpoint` id as printed by discovery
    Id(String),
}

impl FromStr for DeviceSelect {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("auto") {
            Ok(Self::Auto)
        } else {
            Ok(Self::Id(s.to_string()))
        }
    }
}

impl fmt::Display for DeviceSelect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Auto => write!(f, "auto"),
            Self::Id(id) => write!(f, "{id}"),
        }
    }
}

struct Opened<A: UsbAccess> {
    handle: A::Handle,
    endpoint: u8,
    description: String,
}

/// A transport session over one badge.
///
/// Lifecycle: constructed empty, populated by [`discover`](Self::discover),
/// narrowed to one opened device, torn down by [`close`](Self::close) (which
/// also runs on drop, so a failed write cannot leak the handle). A session
/// never swaps devices while one is open, and callers must serialize access
/// themselves if they share one.
pub struct Session<A: UsbAccess> {
    access: A,
    devices: BTreeMap<String, Discovered<A::Device>>,
    scanned: bool,
    opened: Option<Opened<A>>,
}

impl<A: UsbAccess> Session<A> {
    pub fn new(access: A) -> Self {
        Self {
            access,
            devices: BTreeMap::new(),
            scanned: false,
            opened: None,
        }
    }

    /// Enumerate matching badges, one entry per bulk-OUT endpoint, and return
    /// their ids and descriptions. The bus is scanned once per session.
    pub fn discover(&mut self) -> Result<BTreeMap<String, String>> {
        if !self.scanned {
            for entry in self
                .access
                .enumerate(consts::VENDOR_ID, consts::PRODUCT_ID)?
            {
                self.devices.insert(entry.id.clone(), entry);
            }
            self.scanned = true;
        }
        Ok(self
            .devices
            .iter()
            .map(|(id, entry)| (id.clone(), entry.description.clone()))
            .collect())
    }

    /// Open one of the discovered devices and claim its configuration.
    ///
    /// Returns `Ok(false)` when nothing matches: absent hardware is an
    /// expected outcome, not an error. Opening while a device is already open
    /// keeps the current one. OS denial surfaces as
    /// [`BadgeError::PermissionDenied`].
    pub fn open(&mut self, select: &DeviceSelect) -> Result<bool> {
        if self.opened.is_some() {
            return Ok(true);
        }
        match self.discover() {
            Ok(_) => {}
            Err(BadgeError::DeviceUnavailable) => return Ok(false),
            Err(err) => return Err(err),
        }
        let id = match select {
            DeviceSelect::Auto => self.devices.keys().next().cloned(),
            DeviceSelect::Id(id) => self.devices.contains_key(id).then(|| id.clone()),
        };
        let Some(id) = id else {
            return Ok(false);
        };
        let entry = &self.devices[&id];
        let handle = self.access.claim(&entry.device)?;
        log::debug!("opened {}", entry.description);
        self.opened = Some(Opened {
            handle,
            endpoint: entry.endpoint,
            description: entry.description.clone(),
        });
        Ok(true)
    }

    /// Pad the frame to the block size and stream it to the open endpoint in
    /// ascending offset order, pausing [`consts::BLOCK_DELAY`] before each
    /// block.
    ///
    /// Writing with nothing open is a no-op. A frame whose padded length
    /// exceeds [`MAX_FRAME_LEN`] is refused before any block goes out; a
    /// truncated or oversized write can corrupt the controller.
    pub fn write(&mut self, buf: &[u8]) -> Result<()> {
        let Some(opened) = self.opened.as_mut() else {
            log::debug!("write without an open device, nothing to do");
            return Ok(());
        };
        let mut padded = buf.to_vec();
        let rem = padded.len() % consts::BLOCK_SIZE;
        if rem != 0 {
            padded.resize(padded.len() + consts::BLOCK_SIZE - rem, 0);
        }
        if padded.len() > MAX_FRAME_LEN {
            return Err(BadgeError::PayloadTooLarge {
                size: padded.len(),
                limit: MAX_FRAME_LEN,
            });
        }
        log::debug!(
            "writing {} bytes to {} in {} blocks",
            padded.len(),
            opened.description,
            padded.len() / consts::BLOCK_SIZE
        );
        for chunk in padded.chunks(consts::BLOCK_SIZE) {
            thread::sleep(consts::BLOCK_DELAY);
            self.access
                .write_chunk(&mut opened.handle, opened.endpoint, chunk)?;
        }
        Ok(())
    }

    /// Reset the device and drop all claims. Safe to call repeatedly or with
    /// nothing open; also runs on drop.
    pub fn close(&mut self) {
        if let Some(opened) = self.opened.take() {
            if let Err(err) = self.access.release(opened.handle) {
                log::warn!("failed to release {}: {err}", opened.description);
            }
        }
    }

    /// Description of the currently open device, if any.
    pub fn description(&self) -> Option<&str> {
        self.opened.as_ref().map(|o| o.description.as_str())
    }

    /// Whether a device is currently open.
    pub fn has_device(&self) -> bool {
        self.opened.is_some()
    }
}

impl<A: UsbAccess> Drop for Session<A> {
    fn drop(&mut self) {
        self.close();
    }
}

/// Build one frame from `messages` and push it to the selected badge.
///
/// The frame is the header built from the message settings followed by every
/// bitmap in order. The session is closed on every exit path, including a
/// failed write. Returns whether a badge was present and written to.
pub fn send<A: UsbAccess, Tz: TimeZone>(
    access: A,
    select: &DeviceSelect,
    messages: &[Message],
    brightness: Brightness,
    timestamp: &DateTime<Tz>,
) -> Result<bool> {
    let lengths: Vec<u16> = messages.iter().map(|m| m.columns).collect();
    let speeds: Vec<u8> = messages.iter().map(|m| m.speed).collect();
    let modes: Vec<u8> = messages.iter().map(|m| m.mode).collect();
    let blinks: Vec<bool> = messages.iter().map(|m| m.blink).collect();
    let ants: Vec<bool> = messages.iter().map(|m| m.ants).collect();
    let header = build_header(
        &lengths, &speeds, &modes, &blinks, &ants, brightness, timestamp,
    )?;

    let payload: usize = messages.iter().map(|m| m.bitmap.len()).sum();
    let mut buf = Vec::with_capacity(HEADER_LEN + payload);
    buf.extend_from_slice(&header);
    for message in messages {
        buf.extend_from_slice(&message.bitmap);
    }

    let mut session = Session::new(access);
    if !session.open(select)? {
        return Ok(false);
    }
    let result = session.write(&buf);
    session.close();
    result.map(|()| true)
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use chrono::Utc;

    use super::*;

    /// In-memory [`UsbAccess`] recording every block written.
    #[derive(Default, Clone)]
    struct FakeAccess {
        ids: Vec<&'static str>,
        written: Rc<RefCell<Vec<Vec<u8>>>>,
        released: Rc<RefCell<usize>>,
    }

    impl FakeAccess {
        fn with_ids(ids: &[&'static str]) -> Self {
            Self {
                ids: ids.to_vec(),
                ..Self::default()
            }
        }
    }

    impl UsbAccess for FakeAccess {
        type Device = ();
        type Handle = ();

        fn enumerate(&self, _vid: u16, _pid: u16) -> Result<Vec<Discovered<()>>> {
            Ok(self
                .ids
                .iter()
                .map(|id| Discovered {
                    id: id.to_string(),
                    description: format!("fake badge {id}"),
                    endpoint: 2,
                    device: (),
                })
                .collect())
        }

        fn claim(&self, _device: &()) -> Result<()> {
            Ok(())
        }

        fn write_chunk(&self, _handle: &mut (), _endpoint: u8, chunk: &[u8]) -> Result<()> {
            self.written.borrow_mut().push(chunk.to_vec());
            Ok(())
        }

        fn release(&self, _handle: ()) -> Result<()> {
            *self.released.borrow_mut() += 1;
            Ok(())
        }
    }

    #[test]
    fn auto_open_picks_the_lowest_id() {
        let access = FakeAccess::with_ids(&["1:2:3", "1:2:1"]);
        let mut session = Session::new(access);
        assert!(session.open(&DeviceSelect::Auto).unwrap());
        assert_eq!(session.description(), Some("fake badge 1:2:1"));
    }

    #[test]
    fn open_by_id_and_by_unknown_id() {
        let access = FakeAccess::with_ids(&["1:2:1", "1:2:3"]);
        let mut session = Session::new(access.clone());
        assert!(session
            .open(&DeviceSelect::Id("1:2:3".into()))
            .unwrap());
        assert_eq!(session.description(), Some("fake badge 1:2:3"));

        let mut session = Session::new(access);
        assert!(!session.open(&DeviceSelect::Id("9:9:9".into())).unwrap());
        assert!(!session.has_device());
    }

    #[test]
    fn open_without_devices_reports_absence() {
        let mut session = Session::new(FakeAccess::default());
        assert!(!session.open(&DeviceSelect::Auto).unwrap());
    }

    #[test]
    fn open_while_open_keeps_the_current_device() {
        let access = FakeAccess::with_ids(&["1:2:1", "1:2:3"]);
        let mut session = Session::new(access);
        assert!(session.open(&DeviceSelect::Auto).unwrap());
        assert!(session.open(&DeviceSelect::Id("1:2:3".into())).unwrap());
        assert_eq!(session.description(), Some("fake badge 1:2:1"));
    }

    #[test]
    fn write_pads_to_the_next_block_multiple() {
        let access = FakeAccess::with_ids(&["1:2:1"]);
        let written = access.written.clone();
        let mut session = Session::new(access);
        session.open(&DeviceSelect::Auto).unwrap();
        session.write(&[0xAB; 100]).unwrap();

        let blocks = written.borrow();
        assert_eq!(blocks.len(), 2, "100 bytes pad to 128");
        assert!(blocks.iter().all(|b| b.len() == consts::BLOCK_SIZE));
        assert_eq!(blocks[0], vec![0xAB; 64]);
        assert_eq!(&blocks[1][..36], &[0xAB; 36]);
        assert_eq!(&blocks[1][36..], &[0u8; 28], "padding is zeroed");
    }

    #[test]
    fn oversized_write_sends_nothing() {
        let access = FakeAccess::with_ids(&["1:2:1"]);
        let written = access.written.clone();
        let mut session = Session::new(access);
        session.open(&DeviceSelect::Auto).unwrap();

        // 8193 bytes pad to 8256, past the ceiling
        let err = session.write(&vec![0; 8193]).unwrap_err();
        assert!(matches!(
            err,
            BadgeError::PayloadTooLarge { size: 8256, limit: 8192 }
        ));
        assert!(written.borrow().is_empty(), "no block may reach the device");
    }

    #[test]
    fn write_without_open_is_a_noop() {
        let access = FakeAccess::with_ids(&["1:2:1"]);
        let written = access.written.clone();
        let mut session = Session::new(access);
        session.write(&[0; 64]).unwrap();
        assert!(written.borrow().is_empty());
    }

    #[test]
    fn close_is_idempotent_and_runs_on_drop() {
        let access = FakeAccess::with_ids(&["1:2:1"]);
        let released = access.released.clone();
        let mut session = Session::new(access);
        session.open(&DeviceSelect::Auto).unwrap();
        session.close();
        session.close();
        assert!(!session.has_device());
        assert_eq!(session.description(), None);
        assert_eq!(*released.borrow(), 1);

        drop(session);
        assert_eq!(*released.borrow(), 1, "drop after close releases nothing");
    }

    #[test]
    fn dropping_an_open_session_releases_the_device() {
        let access = FakeAccess::with_ids(&["1:2:1"]);
        let released = access.released.clone();
        let mut session = Session::new(access);
        session.open(&DeviceSelect::Auto).unwrap();
        drop(session);
        assert_eq!(*released.borrow(), 1);
    }

    #[test]
    fn send_concatenates_header_and_bitmaps() {
        let access = FakeAccess::with_ids(&["1:2:1"]);
        let written = access.written.clone();
        let released = access.released.clone();
        let message = Message {
            bitmap: vec![0xAA; 11],
            columns: 1,
            speed: 3,
            mode: 0,
            blink: false,
            ants: false,
        };
        let sent = send(
            access,
            &DeviceSelect::Auto,
            &[message],
            Brightness::Full,
            &Utc.with_ymd_and_hms(2020, 2, 3, 4, 5, 6).unwrap(),
        )
        .unwrap();
        assert!(sent);

        let blocks = written.borrow();
        let frame: Vec<u8> = blocks.concat();
        assert_eq!(frame.len(), 128, "64 header + 11 payload pads to 128");
        assert_eq!(&frame[..4], b"wang");
        assert_eq!(frame[17], 1, "one column");
        assert_eq!(&frame[64..75], &[0xAA; 11]);
        assert_eq!(*released.borrow(), 1, "session closed after send");
    }

    #[test]
    fn send_without_device_reports_false() {
        let sent = send(
            FakeAccess::default(),
            &DeviceSelect::Auto,
            &[Message {
                bitmap: vec![],
                columns: 0,
                speed: 4,
                mode: 0,
                blink: false,
                ants: false,
            }],
            Brightness::Full,
            &Utc.with_ymd_and_hms(2020, 2, 3, 4, 5, 6).unwrap(),
        )
        .unwrap();
        assert!(!sent);
    }

    #[test]
    fn device_select_parses_auto_and_ids() {
        assert_eq!("auto".parse::<DeviceSelect>().unwrap(), DeviceSelect::Auto);
        assert_eq!("Auto".parse::<DeviceSelect>().unwrap(), DeviceSelect::Auto);
        assert_eq!(
            "1:2:3".parse::<DeviceSelect>().unwrap(),
            DeviceSelect::Id("1:2:3".into())
        );
    }
}
