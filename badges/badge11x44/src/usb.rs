//! libusb backed implementation of the [`UsbAccess`] capability.

use std::time::Duration;

use led_badge_core::{BadgeError, Discovered, Result, UsbAccess};
use rusb::{Device, DeviceDescriptor, DeviceHandle, Direction, GlobalContext, TransferType};

/// Interface the badge exposes its bulk endpoint on
const INTERFACE: u8 = 0;
/// Configuration claimed while writing
const CONFIGURATION: u8 = 1;
/// Per-block bulk write timeout
const WRITE_TIMEOUT: Duration = Duration::from_secs(1);

/// Device access through libusb, the stack the badge firmware is built for.
#[derive(Debug, Default, Clone, Copy)]
pub struct LibUsbAccess;

/// Map OS denial to [`BadgeError::PermissionDenied`] with the failing step.
fn denied(step: &'static str) -> impl FnOnce(rusb::Error) -> BadgeError {
    move |err| match err {
        rusb::Error::Access => BadgeError::PermissionDenied(step),
        other => BadgeError::Usb(other),
    }
}

fn labels(device: &Device<GlobalContext>, descriptor: &DeviceDescriptor) -> (String, String) {
    let fallback = || {
        (
            format!("{:04x}", descriptor.vendor_id()),
            format!("{:04x}", descriptor.product_id()),
        )
    };
    match device.open() {
        Ok(handle) => (
            handle
                .read_manufacturer_string_ascii(descriptor)
                .unwrap_or_else(|_| fallback().0),
            handle
                .read_product_string_ascii(descriptor)
                .unwrap_or_else(|_| fallback().1),
        ),
        Err(_) => fallback(),
    }
}

impl UsbAccess for LibUsbAccess {
    type Device = Device<GlobalContext>;
    type Handle = DeviceHandle<GlobalContext>;

    fn enumerate(&self, vendor_id: u16, product_id: u16) -> Result<Vec<Discovered<Self::Device>>> {
        // A missing or broken libusb backend means no devices, not a fault.
        let devices = rusb::devices().map_err(|err| {
            log::debug!("usb enumeration unavailable: {err}");
            BadgeError::DeviceUnavailable
        })?;

        let mut found = Vec::new();
        for device in devices.iter() {
            let Ok(descriptor) = device.device_descriptor() else {
                continue;
            };
            if descriptor.vendor_id() != vendor_id || descriptor.product_id() != product_id {
                continue;
            }
            let Ok(config) = device.config_descriptor(0) else {
                continue;
            };
            let (manufacturer, product) = labels(&device, &descriptor);
            for interface in config.interfaces() {
                for interface_descriptor in interface.descriptors() {
                    for endpoint in interface_descriptor.endpoint_descriptors() {
                        if endpoint.direction() != Direction::Out
                            || endpoint.transfer_type() != TransferType::Bulk
                        {
                            continue;
                        }
                        found.push(Discovered {
                            id: format!(
                                "{}:{}:{}",
                                device.bus_number(),
                                device.address(),
                                endpoint.address()
                            ),
                            description: format!(
                                "{manufacturer} - {product} (bus={} dev={} endpoint={})",
                                device.bus_number(),
                                device.address(),
                                endpoint.address()
                            ),
                            endpoint: endpoint.address(),
                            device: device.clone(),
                        });
                    }
                }
            }
        }
        Ok(found)
    }

    fn claim(&self, device: &Self::Device) -> Result<Self::Handle> {
        let mut handle = device.open().map_err(denied("opening the device"))?;
        // Windows backends report NotSupported here; there is no driver to
        // detach, which is fine.
        if handle.kernel_driver_active(INTERFACE).unwrap_or(false) {
            handle
                .detach_kernel_driver(INTERFACE)
                .map_err(denied("detaching the kernel driver"))?;
        }
        handle
            .set_active_configuration(CONFIGURATION)
            .map_err(denied("claiming the configuration"))?;
        handle
            .claim_interface(INTERFACE)
            .map_err(denied("claiming the interface"))?;
        Ok(handle)
    }

    fn write_chunk(&self, handle: &mut Self::Handle, endpoint: u8, chunk: &[u8]) -> Result<()> {
        let written = handle
            .write_bulk(endpoint, chunk, WRITE_TIMEOUT)
            .map_err(denied("writing to the endpoint"))?;
        if written != chunk.len() {
            log::warn!("short bulk write: {written} of {} bytes", chunk.len());
            return Err(BadgeError::Usb(rusb::Error::Io));
        }
        Ok(())
    }

    fn release(&self, mut handle: Self::Handle) -> Result<()> {
        handle.reset()?;
        handle.release_interface(INTERFACE)?;
        Ok(())
    }
}
