//! # DAQFlex RS
//!
//! A Rust library for driving USB data-acquisition modules that speak the
//! DAQFlex text protocol.
//!
//! Commands travel as 64-byte text messages over vendor control transfers,
//! scan data arrives as little-endian 16-bit samples on a bulk IN endpoint.
//! This crate discovers that endpoint, reads the scan setup and per-channel
//! calibration from the device, streams blocks of samples and converts them
//! into volts.
//!
//! ## Features
//!
//! - **Device discovery**: Uses `rusb` to find and claim supported modules
//! - **Command channel**: Framing, reply parsing and a typed query table
//! - **Scan configuration**: Channel span, rate and calibration, refreshed as a unit
//! - **Streaming acquisition**: Blocking bulk reads that tolerate partial timeouts
//! - **DataFrame output**: Calibrated blocks as `polars` frames with a time column
//!
//! ## Examples
//!
//! ### Connecting and reading a block
//!
//! ```rust,no_run
//! use daqflex_rs::{DaqConfig, DaqConnector, DeviceModel};
//!
//! let config = DaqConfig::default().with_samples_per_block(1000);
//! let mut device = DaqConnector::connect(DeviceModel::Usb1608Gx.product_id(), None, config)?;
//!
//! device.flush_input_data()?;
//! device.start_scan()?;
//! let block = device.get_block()?.to_vec();
//! device.stop_scan()?;
//!
//! let channels = device.scan_configuration().channel_count();
//! println!("First sample: {:.4} V", device.scale(block[0], 0));
//! println!("Scanned {} channels", channels);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ### Changing scan settings
//!
//! ```rust,no_run
//! use daqflex_rs::{DaqConfig, DaqConnector, DeviceModel, ScanSettings, VoltageRange};
//!
//! let mut device = DaqConnector::connect(
//!     DeviceModel::Usb7204.product_id(),
//!     Some("018FF921"),
//!     DaqConfig::default(),
//! )?;
//!
//! let settings = ScanSettings::new()
//!     .channels(0, 3)
//!     .sample_rate(10_000.0)
//!     .continuous()
//!     .range(0, VoltageRange::Bip5V);
//! let config = device.apply_scan_settings(settings)?;
//! println!("Scanning {} channels at {} Hz", config.channel_count(), config.sample_rate);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ### Calibrating samples without a device
//!
//! ```rust
//! use daqflex_rs::{scale_and_calibrate, ChannelCalibration, VoltageRange};
//!
//! let calibration = ChannelCalibration {
//!     slope: 1.0,
//!     offset: 0.0,
//!     range: VoltageRange::Bip10V,
//! };
//! assert!((scale_and_calibrate(65535, &calibration) - 10.0).abs() < 1e-9);
//! ```

pub mod acquisition;
pub mod calibration;
pub mod command_channel;
pub mod daq_connector;
pub mod daq_device;
pub mod endpoint_descriptor;
pub mod scan_config;
pub mod usb_transport;

#[cfg(test)]
mod mock_transport;

// Re-export the main types for convenience
pub use acquisition::{AcquisitionError, BulkTimeout};

pub use calibration::{block_to_dataframe, calibration_expr, scale_and_calibrate};

pub use command_channel::{CommandChannel, CommandError, ProtocolParseError, Query};

pub use daq_connector::{DaqConnector, DaqConnectorError, DaqDeviceInfo, DeviceModel};

pub use daq_device::{DaqConfig, DaqDevice, DaqDeviceError};

pub use endpoint_descriptor::{parse_endpoint_descriptors, EndpointInfo};

pub use scan_config::{
    ChannelCalibration, ScanConfiguration, ScanSettings, VoltageRange, MAX_COUNTS,
};

pub use usb_transport::{BulkCompletion, ControlRequest, RusbTransport, TransportError, UsbTransport};
