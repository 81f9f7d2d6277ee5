/// Errors that can occur while encoding or transmitting a frame
#[derive(Debug, thiserror::Error)]
pub enum BadgeError {
    /// Malformed caller input (empty parameter list, bad bitmap file, ...)
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Frame exceeds the device ceiling; writing it could corrupt the display
    #[error("frame of {size} bytes exceeds the {limit} byte device limit")]
    PayloadTooLarge { size: usize, limit: usize },

    /// The OS denied access while claiming the device
    #[error("permission denied while {0}")]
    PermissionDenied(&'static str),

    /// No matching device is connected
    #[error("device not found")]
    DeviceUnavailable,

    /// USB communication error
    #[error("usb error: {0}")]
    Usb(#[from] rusb::Error),

    /// Generic IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, BadgeError>;
