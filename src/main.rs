use std::fmt;
use std::path::PathBuf;
use std::process::ExitCode;
use std::str::FromStr;

use badge11x44::usb::LibUsbAccess;
use badge11x44::{send, Brightness, DeviceSelect, Message, Session, SLOTS};
use bpaf::Bpaf;
use chrono::{Local, NaiveDateTime, TimeZone};
use led_badge_core::BadgeError;

use crate::bitmap::load_bitmap;

mod bitmap;

/// Comma or space separated list of small integers, one value per message.
/// Shorter lists apply their last value to the remaining messages.
#[derive(Debug, Clone)]
struct IntList(Vec<u8>);

impl fmt::Display for IntList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.0.iter().map(u8::to_string).collect();
        f.write_str(&parts.join(","))
    }
}

impl FromStr for IntList {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let values = s
            .split([',', ' '])
            .filter(|part| !part.is_empty())
            .map(|part| {
                part.parse::<u8>()
                    .map_err(|err| format!("invalid value {part:?}: {err}"))
            })
            .collect::<Result<Vec<u8>, _>>()?;
        if values.is_empty() {
            return Err("expected at least one value".into());
        }
        Ok(Self(values))
    }
}

impl IntList {
    /// Value for message `i`, repeating the last entry the same way the
    /// header spreads short lists over its slots.
    fn get(&self, i: usize) -> u8 {
        *self
            .0
            .get(i)
            .unwrap_or_else(|| self.0.last().expect("list is never empty"))
    }
}

#[derive(Clone, Debug, Bpaf)]
#[bpaf(options, version, descr(env!("CARGO_PKG_DESCRIPTION")))]
struct Cli {
    /// Scroll speed (1..8), up to 8 comma separated values
    #[bpaf(short('s'), long, fallback(IntList(vec![4])), display_fallback)]
    speed: IntList,
    /// Display mode per message: scroll-left(0) -right(1) -up(2) -down(3),
    /// still-centered(4), animation(5), drop-down(6), curtain(7), laser(8)
    #[bpaf(short('m'), long, fallback(IntList(vec![0])), display_fallback)]
    mode: IntList,
    /// 1: blinking, 0: normal, up to 8 comma separated values
    #[bpaf(short('b'), long, fallback(IntList(vec![0])), display_fallback)]
    blink: IntList,
    /// 1: animated border, 0: normal, up to 8 comma separated values
    #[bpaf(short('a'), long, fallback(IntList(vec![0])), display_fallback)]
    ants: IntList,
    /// Brightness in percent, bucketed to 25, 50, 75 or 100
    #[bpaf(short('B'), long, fallback(100))]
    brightness: u8,
    /// Badge to write to: "auto" or a bus:address:endpoint id from --list-devices
    #[bpaf(short('d'), long, fallback(DeviceSelect::Auto), display_fallback)]
    device: DeviceSelect,
    /// Timestamp to embed instead of the current time, e.g. 2024-05-01T12:30:00
    #[bpaf(long, argument("WHEN"))]
    date: Option<NaiveDateTime>,
    /// List connected badges and exit
    #[bpaf(short('l'), long)]
    list_devices: bool,
    /// Up to 8 pre-rendered bitmap files, 11 bytes per pixel column
    #[bpaf(positional("BITMAP"), many)]
    bitmaps: Vec<PathBuf>,
}

fn main() -> ExitCode {
    env_logger::init();
    let cli = cli().run();
    match run(cli) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("error: {err}");
            if matches!(err, BadgeError::PermissionDenied(_)) {
                eprintln!();
                eprintln!("Tip: on Linux, grant access to the badge with a udev rule, e.g.");
                eprintln!(
                    "  SUBSYSTEM==\"usb\", ATTRS{{idVendor}}==\"0416\", \
                     ATTRS{{idProduct}}==\"5020\", MODE=\"0666\""
                );
                eprintln!("or rerun with sudo.");
            }
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<ExitCode, BadgeError> {
    if cli.list_devices {
        return list_devices();
    }

    if cli.bitmaps.is_empty() {
        return Err(BadgeError::InvalidInput(
            "at least one bitmap file is required".into(),
        ));
    }
    if cli.bitmaps.len() > SLOTS {
        return Err(BadgeError::InvalidInput(format!(
            "the badge shows at most {SLOTS} messages"
        )));
    }

    let timestamp = match cli.date {
        Some(naive) => Local.from_local_datetime(&naive).single().ok_or_else(|| {
            BadgeError::InvalidInput(format!("{naive} is not a valid local timestamp"))
        })?,
        None => Local::now(),
    };

    let mut messages = Vec::with_capacity(cli.bitmaps.len());
    for (i, path) in cli.bitmaps.iter().enumerate() {
        let (bitmap, columns) = load_bitmap(path)?;
        messages.push(Message {
            bitmap,
            columns,
            speed: cli.speed.get(i),
            mode: cli.mode.get(i),
            blink: cli.blink.get(i) != 0,
            ants: cli.ants.get(i) != 0,
        });
    }

    let brightness = Brightness::from_percent(cli.brightness);
    if send(LibUsbAccess, &cli.device, &messages, brightness, &timestamp)? {
        println!("sent {} message(s) to the badge", messages.len());
        Ok(ExitCode::SUCCESS)
    } else {
        println!("No device found");
        Ok(ExitCode::FAILURE)
    }
}

fn list_devices() -> Result<ExitCode, BadgeError> {
    let mut session = Session::new(LibUsbAccess);
    let devices = match session.discover() {
        Ok(devices) => devices,
        // No usable USB backend means no badges, same as an empty bus.
        Err(BadgeError::DeviceUnavailable) => Default::default(),
        Err(err) => return Err(err),
    };
    if devices.is_empty() {
        println!("No device found");
        return Ok(ExitCode::FAILURE);
    }
    for (id, description) in devices {
        println!("{id}  {description}");
    }
    Ok(ExitCode::SUCCESS)
}
