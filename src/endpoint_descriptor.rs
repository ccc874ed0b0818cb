use crate::usb_transport::{ControlRequest, TransportError, UsbTransport};
use std::time::Duration;

const GET_DESCRIPTOR: u8 = 0x06;
const CONFIGURATION_DESCRIPTOR: u8 = 0x02;
const ENDPOINT_DESCRIPTOR: u8 = 0x05;
const CONFIGURATION_HEADER_LENGTH: usize = 9;
const DIRECTION_IN: u8 = 0x80;

/// Bulk endpoint addressing discovered from the configuration descriptor.
///
/// A zero address or packet size means the endpoint was not found.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EndpointInfo {
    pub bulk_in_endpoint_address: u8,
    pub bulk_out_endpoint_address: u8,
    pub bulk_packet_size: u16,
}

impl EndpointInfo {
    pub fn has_bulk_in(&self) -> bool {
        self.bulk_in_endpoint_address != 0 && self.bulk_packet_size != 0
    }
}

/// Walk a raw descriptor blob and pick out the bulk endpoints.
///
/// Records are `[length, type, ...]`. Unknown record types are skipped, and the
/// walk ends at a zero length record, at the end of `data`, or at a record that
/// is cut off by the end of `data`.
pub fn parse_endpoint_descriptors(data: &[u8]) -> EndpointInfo {
    let mut info = EndpointInfo::default();
    let mut offset = 0;

    while offset + 1 < data.len() {
        let length = data[offset] as usize;
        let descriptor_type = data[offset + 1];
        if length == 0 {
            break;
        }

        if descriptor_type == ENDPOINT_DESCRIPTOR {
            let Some(record) = data.get(offset..offset + 6) else {
                break;
            };
            let address = record[2];
            if address & DIRECTION_IN != 0 {
                info.bulk_in_endpoint_address = address;
                info.bulk_packet_size = u16::from_le_bytes([record[4], record[5]]);
            } else {
                info.bulk_out_endpoint_address = address;
            }
        }

        offset += length;
    }

    info
}

/// Fetch the active configuration descriptor and parse its endpoints.
pub fn fetch_endpoint_info<T: UsbTransport + ?Sized>(
    transport: &mut T,
    timeout: Duration,
) -> Result<EndpointInfo, TransportError> {
    let request = ControlRequest::standard(
        GET_DESCRIPTOR,
        u16::from(CONFIGURATION_DESCRIPTOR) << 8,
        0,
    );

    let mut header = [0u8; CONFIGURATION_HEADER_LENGTH];
    let received = transport.control_in(request, &mut header, timeout)?;
    let total_length = if received >= 4 {
        u16::from_le_bytes([header[2], header[3]]) as usize
    } else {
        received
    };

    let mut descriptor = vec![0u8; total_length.max(CONFIGURATION_HEADER_LENGTH)];
    let received = transport.control_in(request, &mut descriptor, timeout)?;
    descriptor.truncate(received);

    let info = parse_endpoint_descriptors(&descriptor);
    log::debug!(
        "Endpoints: in=0x{:02x} out=0x{:02x} packet size={}",
        info.bulk_in_endpoint_address,
        info.bulk_out_endpoint_address,
        info.bulk_packet_size
    );
    Ok(info)
}
