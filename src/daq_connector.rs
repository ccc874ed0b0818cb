use crate::command_channel::{CommandChannel, Query};
use crate::daq_device::{DaqConfig, DaqDevice, DaqDeviceError};
use crate::usb_transport::RusbTransport;

pub const MCC_VENDOR_ID: u16 = 0x09db;

/// Modules this driver knows how to talk to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceModel {
    Usb2001Tc,
    Usb7202,
    Usb7204,
    Usb1608Gx,
    Usb1608FsPlus,
}

impl DeviceModel {
    pub const ALL: [Self; 5] = [
        Self::Usb2001Tc,
        Self::Usb7202,
        Self::Usb7204,
        Self::Usb1608Gx,
        Self::Usb1608FsPlus,
    ];

    pub fn product_id(&self) -> u16 {
        match self {
            Self::Usb2001Tc => 0x00F9,
            Self::Usb7202 => 0x00F2,
            Self::Usb7204 => 0x00F0,
            Self::Usb1608Gx => 0x0111,
            Self::Usb1608FsPlus => 0x00EA,
        }
    }

    pub fn from_product_id(product_id: u16) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|model| model.product_id() == product_id)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Usb2001Tc => "USB-2001-TC",
            Self::Usb7202 => "USB-7202",
            Self::Usb7204 => "USB-7204",
            Self::Usb1608Gx => "USB-1608GX",
            Self::Usb1608FsPlus => "USB-1608-FS-PLUS",
        }
    }
}

#[derive(Debug, Clone)]
pub struct DaqDeviceInfo {
    pub model: DeviceModel,
    pub bus_number: u8,
    pub address: u8,
}

#[derive(Debug, thiserror::Error)]
pub enum DaqConnectorError {
    #[error("USB error: {0}")]
    Usb(#[from] rusb::Error),

    #[error("Product ID 0x{product_id:04x} is not a supported DAQFlex device")]
    InvalidDeviceIdentity { product_id: u16 },

    #[error("No matching {model} device found")]
    DeviceNotFound { model: &'static str },

    #[error("Device error: {0}")]
    Device(#[from] DaqDeviceError),
}

pub struct DaqConnector;

impl DaqConnector {
    /// Connect to the first device with `product_id`, or the one whose
    /// manufacturer serial number equals `serial_number`.
    pub fn connect(
        product_id: u16,
        serial_number: Option<&str>,
        config: DaqConfig,
    ) -> Result<DaqDevice<RusbTransport>, DaqConnectorError> {
        let model = DeviceModel::from_product_id(product_id)
            .ok_or(DaqConnectorError::InvalidDeviceIdentity { product_id })?;

        for device in rusb::devices()?.iter() {
            let Ok(descriptor) = device.device_descriptor() else {
                continue;
            };
            if descriptor.vendor_id() != MCC_VENDOR_ID || descriptor.product_id() != product_id {
                continue;
            }

            let handle = match device.open() {
                Ok(handle) => handle,
                Err(e) => {
                    log::debug!("Could not open {} at {:?}: {}", model.name(), device, e);
                    continue;
                }
            };
            let transport = match RusbTransport::claim(handle, 0) {
                Ok(transport) => transport,
                Err(e) => {
                    log::debug!("Could not claim {} at {:?}: {}", model.name(), device, e);
                    continue;
                }
            };

            let transport = match serial_number {
                Some(wanted) => {
                    let mut channel = CommandChannel::new(transport, config.control_timeout);
                    let found = channel
                        .query_text(Query::SerialNumber)
                        .map_err(DaqDeviceError::from)?;
                    if found != wanted {
                        log::debug!(
                            "Skipping {} with serial number {}, looking for {}",
                            model.name(),
                            found,
                            wanted
                        );
                        continue;
                    }
                    channel.into_transport()
                }
                None => transport,
            };

            log::info!("Connected to {} at {:?}", model.name(), device);
            return Ok(DaqDevice::new(transport, config)?);
        }

        Err(DaqConnectorError::DeviceNotFound {
            model: model.name(),
        })
    }

    /// List attached devices, optionally only those of one model.
    pub fn get_available_devices(
        model: Option<DeviceModel>,
    ) -> Result<Vec<DaqDeviceInfo>, DaqConnectorError> {
        let mut devices = Vec::new();
        for device in rusb::devices()?.iter() {
            let Ok(descriptor) = device.device_descriptor() else {
                continue;
            };
            if descriptor.vendor_id() != MCC_VENDOR_ID {
                continue;
            }
            let Some(found) = DeviceModel::from_product_id(descriptor.product_id()) else {
                continue;
            };
            if model.is_some_and(|wanted| wanted != found) {
                continue;
            }
            devices.push(DaqDeviceInfo {
                model: found,
                bus_number: device.bus_number(),
                address: device.address(),
            });
        }
        Ok(devices)
    }
}
