//! Core error type and device access capability for led-badge.
//!
//! This crate provides:
//! - The [`BadgeError`] taxonomy shared by the protocol and transport crates
//! - The [`UsbAccess`] capability trait a transport session is constructed
//!   with, so sessions can run against real hardware or a test fake

mod access;
mod error;

pub use access::{Discovered, UsbAccess};
pub use error::{BadgeError, Result};
