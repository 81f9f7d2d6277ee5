//! The low-level USB capability a transport session is built on.

use crate::Result;

/// One candidate found during enumeration: a device paired with one of its
/// bulk-OUT endpoints. A device exposing several such endpoints yields one
/// entry per endpoint.
#[derive(Debug)]
pub struct Discovered<D> {
    /// Composite id in `bus:address:endpoint` form
    pub id: String,
    /// Human readable description for listings
    pub description: String,
    /// Endpoint address frames are written to
    pub endpoint: u8,
    /// Backend device, opened lazily by [`UsbAccess::claim`]
    pub device: D,
}

/// Device access capability handed to a transport session at construction.
///
/// The session never touches the USB stack directly; everything goes through
/// this trait, so tests can substitute an in-memory fake.
pub trait UsbAccess {
    type Device;
    type Handle;

    /// Scan for devices matching the vendor/product pair, one entry per
    /// bulk-OUT endpoint.
    fn enumerate(&self, vendor_id: u16, product_id: u16) -> Result<Vec<Discovered<Self::Device>>>;

    /// Open the device and claim its configuration, detaching a bound kernel
    /// driver first on platforms that have one.
    fn claim(&self, device: &Self::Device) -> Result<Self::Handle>;

    /// Write one block to the endpoint, blocking until the device accepts it.
    fn write_chunk(&self, handle: &mut Self::Handle, endpoint: u8, chunk: &[u8]) -> Result<()>;

    /// Reset the device and release every claim taken by [`claim`](Self::claim).
    fn release(&self, handle: Self::Handle) -> Result<()>;
}
