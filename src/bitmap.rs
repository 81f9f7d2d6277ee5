//! Loading pre-rendered badge bitmaps from disk.
//!
//! A bitmap file holds column bytes exactly as the device consumes them:
//! 11 bytes per pixel column, one bit per display row. Rendering text or
//! icons into this format is left to external tools.

use std::path::Path;

use badge11x44::BYTES_PER_COLUMN;
use led_badge_core::{BadgeError, Result};

/// Read a bitmap file and derive its pixel column count.
pub fn load_bitmap(path: &Path) -> Result<(Vec<u8>, u16)> {
    let bitmap = std::fs::read(path)?;
    if bitmap.len() % BYTES_PER_COLUMN != 0 {
        return Err(BadgeError::InvalidInput(format!(
            "{}: {} bytes is not a whole number of {BYTES_PER_COLUMN} byte columns",
            path.display(),
            bitmap.len(),
        )));
    }
    let columns = u16::try_from(bitmap.len() / BYTES_PER_COLUMN).map_err(|_| {
        BadgeError::InvalidInput(format!("{}: too many columns", path.display()))
    })?;
    Ok((bitmap, columns))
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn derives_column_count() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(&[0x55; 33]).unwrap();
        let (bitmap, columns) = load_bitmap(file.path()).unwrap();
        assert_eq!(columns, 3);
        assert_eq!(bitmap.len(), 33);
    }

    #[test]
    fn rejects_ragged_files() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(&[0x55; 34]).unwrap();
        assert!(matches!(
            load_bitmap(file.path()),
            Err(BadgeError::InvalidInput(_))
        ));
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            load_bitmap(&dir.path().join("nope.bin")),
            Err(BadgeError::Io(_))
        ));
    }
}
