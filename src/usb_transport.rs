use rusb::{DeviceHandle, Direction, GlobalContext, Recipient, RequestType};
use std::collections::HashMap;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("Transfer timed out")]
    Timeout,

    #[error("Pipe error, the device stalled or rejected the request (possibly an invalid command)")]
    Pipe,

    #[error("Device is no longer connected")]
    NoDevice,

    #[error("Unknown USB error: {0}")]
    Unknown(String),
}

impl From<rusb::Error> for TransportError {
    fn from(err: rusb::Error) -> Self {
        match err {
            rusb::Error::Timeout => Self::Timeout,
            rusb::Error::Pipe => Self::Pipe,
            rusb::Error::NoDevice => Self::NoDevice,
            other => Self::Unknown(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    Standard,
    Vendor,
}

/// Setup fields of a control transfer, minus direction and length.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControlRequest {
    pub kind: RequestKind,
    pub request: u8,
    pub value: u16,
    pub index: u16,
}

impl ControlRequest {
    pub fn vendor(request: u8) -> Self {
        Self {
            kind: RequestKind::Vendor,
            request,
            value: 0,
            index: 0,
        }
    }

    pub fn standard(request: u8, value: u16, index: u16) -> Self {
        Self {
            kind: RequestKind::Standard,
            request,
            value,
            index,
        }
    }

    fn request_type(&self, direction: Direction) -> u8 {
        let kind = match self.kind {
            RequestKind::Standard => RequestType::Standard,
            RequestKind::Vendor => RequestType::Vendor,
        };
        rusb::request_type(direction, kind, Recipient::Device)
    }
}

/// Outcome of a single bulk read.
///
/// A bulk read can time out after part of the data has already landed in the
/// buffer, so the byte count is reported alongside the status instead of
/// being folded into a `Result`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BulkCompletion {
    pub transferred: usize,
    pub status: Result<(), TransportError>,
}

impl BulkCompletion {
    pub fn complete(transferred: usize) -> Self {
        Self {
            transferred,
            status: Ok(()),
        }
    }

    pub fn failed(transferred: usize, error: TransportError) -> Self {
        Self {
            transferred,
            status: Err(error),
        }
    }
}

/// Blocking USB primitives the driver needs from an already claimed device.
pub trait UsbTransport {
    /// Host-to-device control transfer. Returns the number of bytes sent.
    fn control_out(
        &mut self,
        request: ControlRequest,
        data: &[u8],
        timeout: Duration,
    ) -> Result<usize, TransportError>;

    /// Device-to-host control transfer. Returns the number of bytes received.
    fn control_in(
        &mut self,
        request: ControlRequest,
        buffer: &mut [u8],
        timeout: Duration,
    ) -> Result<usize, TransportError>;

    /// Bulk read from an IN endpoint.
    fn bulk_in(&mut self, endpoint: u8, buffer: &mut [u8], timeout: Duration) -> BulkCompletion;
}

/// [`UsbTransport`] over a libusb handle with interface 0 claimed.
///
/// Bulk reads are issued one max-size packet at a time, each with the full
/// timeout, so a timeout part way through a larger buffer still reports the
/// packets that arrived before it. The interface is released again when the
/// transport is dropped.
pub struct RusbTransport {
    handle: DeviceHandle<GlobalContext>,
    interface: u8,
    packet_sizes: HashMap<u8, usize>,
}

impl RusbTransport {
    pub fn claim(mut handle: DeviceHandle<GlobalContext>, interface: u8) -> Result<Self, rusb::Error> {
        // Not supported on every platform, claiming will tell us if it mattered
        let _ = handle.set_auto_detach_kernel_driver(true);
        handle.claim_interface(interface)?;
        log::debug!("Claimed interface {} on {:?}", interface, handle.device());

        let packet_sizes = match handle.device().active_config_descriptor() {
            Ok(config) => config
                .interfaces()
                .flat_map(|interface| interface.descriptors())
                .flat_map(|descriptor| {
                    descriptor
                        .endpoint_descriptors()
                        .map(|endpoint| (endpoint.address(), usize::from(endpoint.max_packet_size())))
                        .collect::<Vec<_>>()
                })
                .collect(),
            Err(e) => {
                log::debug!("No active configuration descriptor, bulk reads go unsplit: {}", e);
                HashMap::new()
            }
        };

        Ok(Self {
            handle,
            interface,
            packet_sizes,
        })
    }
}

/// Fill `buffer` with consecutive reads of at most `packet_size` bytes.
///
/// A short packet ends the transfer. A failed read ends it too, and the bytes
/// gathered by the earlier reads are reported with the error.
fn read_in_packets<F>(buffer: &mut [u8], packet_size: usize, mut read: F) -> BulkCompletion
where
    F: FnMut(&mut [u8]) -> Result<usize, rusb::Error>,
{
    let mut transferred = 0;
    for packet in buffer.chunks_mut(packet_size.max(1)) {
        let requested = packet.len();
        match read(packet) {
            Ok(received) => {
                transferred += received;
                if received < requested {
                    break;
                }
            }
            Err(e) => return BulkCompletion::failed(transferred, e.into()),
        }
    }
    BulkCompletion::complete(transferred)
}

impl UsbTransport for RusbTransport {
    fn control_out(
        &mut self,
        request: ControlRequest,
        data: &[u8],
        timeout: Duration,
    ) -> Result<usize, TransportError> {
        Ok(self.handle.write_control(
            request.request_type(Direction::Out),
            request.request,
            request.value,
            request.index,
            data,
            timeout,
        )?)
    }

    fn control_in(
        &mut self,
        request: ControlRequest,
        buffer: &mut [u8],
        timeout: Duration,
    ) -> Result<usize, TransportError> {
        Ok(self.handle.read_control(
            request.request_type(Direction::In),
            request.request,
            request.value,
            request.index,
            buffer,
            timeout,
        )?)
    }

    fn bulk_in(&mut self, endpoint: u8, buffer: &mut [u8], timeout: Duration) -> BulkCompletion {
        let packet_size = self
            .packet_sizes
            .get(&endpoint)
            .copied()
            .unwrap_or(buffer.len());
        let handle = &self.handle;
        read_in_packets(buffer, packet_size, |packet| {
            handle.read_bulk(endpoint, packet, timeout)
        })
    }
}

impl Drop for RusbTransport {
    fn drop(&mut self) {
        if let Err(e) = self.handle.release_interface(self.interface) {
            log::debug!("Failed to release interface {}: {}", self.interface, e);
        }
    }
}
