//! Scripted stand-in for a DAQFlex module, used by the unit tests.

use crate::command_channel::{MAX_MESSAGE_LENGTH, STRING_MESSAGE};
use crate::usb_transport::{
    BulkCompletion, ControlRequest, RequestKind, TransportError, UsbTransport,
};
use std::collections::{HashMap, VecDeque};
use std::time::Duration;

const GET_DESCRIPTOR: u8 = 0x06;

#[derive(Debug, Default)]
pub struct ScriptedTransport {
    responses: HashMap<String, Result<String, TransportError>>,
    descriptor: Vec<u8>,
    bulk: VecDeque<(Vec<u8>, Result<(), TransportError>)>,
    pending: Option<Result<String, TransportError>>,
    pub sent_commands: Vec<String>,
    pub bulk_requests: Vec<(u8, usize, Duration)>,
    pub descriptor_requests: Vec<(ControlRequest, usize)>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Canned reply for a command; unknown commands stall the pipe.
    pub fn respond(mut self, command: &str, response: &str) -> Self {
        self.responses
            .insert(command.to_string(), Ok(response.to_string()));
        self
    }

    pub fn fail(mut self, command: &str, error: TransportError) -> Self {
        self.responses.insert(command.to_string(), Err(error));
        self
    }

    pub fn set_response(&mut self, command: &str, response: &str) {
        self.responses
            .insert(command.to_string(), Ok(response.to_string()));
    }

    pub fn with_descriptor(mut self, descriptor: Vec<u8>) -> Self {
        self.descriptor = descriptor;
        self
    }

    pub fn push_bulk(&mut self, data: Vec<u8>, status: Result<(), TransportError>) {
        self.bulk.push_back((data, status));
    }

    /// A two-channel module on channels 0..=1 at 1 kHz, both ±10 V.
    pub fn two_channel_device() -> Self {
        Self::new()
            .with_descriptor(bulk_config_descriptor(0x81, 0x02, 64))
            .respond("?DEV:MFGSER", "DEV:MFGSER=018FF921")
            .respond("?AISCAN:LOWCHAN", "AISCAN:LOWCHAN=0")
            .respond("?AISCAN:HIGHCHAN", "AISCAN:HIGHCHAN=1")
            .respond("?AISCAN:RATE", "AISCAN:RATE=1000.000")
            .respond("?AI{0}:SLOPE", "AI{0}:SLOPE=1.000000")
            .respond("?AI{0}:OFFSET", "AI{0}:OFFSET=0.000000")
            .respond("?AI{0}:RANGE", "AI{0}:RANGE=BIP10V")
            .respond("?AI{1}:SLOPE", "AI{1}:SLOPE=1.000000")
            .respond("?AI{1}:OFFSET", "AI{1}:OFFSET=0.000000")
            .respond("?AI{1}:RANGE", "AI{1}:RANGE=BIP10V")
    }
}

impl UsbTransport for ScriptedTransport {
    fn control_out(
        &mut self,
        request: ControlRequest,
        data: &[u8],
        _timeout: Duration,
    ) -> Result<usize, TransportError> {
        assert_eq!(request.kind, RequestKind::Vendor);
        assert_eq!(request.request, STRING_MESSAGE);
        assert_eq!(data.len(), MAX_MESSAGE_LENGTH);
        assert!(self.pending.is_none(), "command sent before previous reply was read");

        let end = data.iter().position(|&b| b == 0).unwrap_or(data.len());
        let command = String::from_utf8_lossy(&data[..end]).into_owned();
        let reply = self
            .responses
            .get(&command)
            .cloned()
            .unwrap_or(Err(TransportError::Pipe));
        self.sent_commands.push(command);

        match reply {
            Err(TransportError::Pipe) => Err(TransportError::Pipe),
            other => {
                self.pending = Some(other);
                Ok(data.len())
            }
        }
    }

    fn control_in(
        &mut self,
        request: ControlRequest,
        buffer: &mut [u8],
        _timeout: Duration,
    ) -> Result<usize, TransportError> {
        if request.kind == RequestKind::Standard && request.request == GET_DESCRIPTOR {
            self.descriptor_requests.push((request, buffer.len()));
            let n = buffer.len().min(self.descriptor.len());
            buffer[..n].copy_from_slice(&self.descriptor[..n]);
            return Ok(n);
        }

        let reply = self
            .pending
            .take()
            .expect("reply read without a preceding command")?;
        let bytes = reply.as_bytes();
        let n = bytes.len().min(buffer.len());
        buffer[..n].copy_from_slice(&bytes[..n]);
        buffer[n..].fill(0);
        Ok(buffer.len())
    }

    fn bulk_in(&mut self, endpoint: u8, buffer: &mut [u8], timeout: Duration) -> BulkCompletion {
        self.bulk_requests.push((endpoint, buffer.len(), timeout));
        match self.bulk.pop_front() {
            Some((data, status)) => {
                let n = data.len().min(buffer.len());
                buffer[..n].copy_from_slice(&data[..n]);
                BulkCompletion {
                    transferred: n,
                    status,
                }
            }
            None => BulkCompletion::failed(0, TransportError::Timeout),
        }
    }
}

/// Configuration descriptor with one interface and two bulk endpoints.
pub fn bulk_config_descriptor(in_address: u8, out_address: u8, packet_size: u16) -> Vec<u8> {
    let [size_lo, size_hi] = packet_size.to_le_bytes();
    let mut descriptor = vec![
        // configuration
        0x09, 0x02, 0x00, 0x00, 0x01, 0x01, 0x00, 0x80, 0x32,
        // interface
        0x09, 0x04, 0x00, 0x00, 0x02, 0xFF, 0x00, 0x00, 0x00,
        // bulk IN
        0x07, 0x05, in_address, 0x02, size_lo, size_hi, 0x00,
        // bulk OUT
        0x07, 0x05, out_address, 0x02, size_lo, size_hi, 0x00,
    ];
    let [total_lo, total_hi] = (descriptor.len() as u16).to_le_bytes();
    descriptor[2] = total_lo;
    descriptor[3] = total_hi;
    descriptor
}

/// Little-endian bytes of consecutive raw samples.
pub fn sample_bytes(samples: &[u16]) -> Vec<u8> {
    samples.iter().flat_map(|s| s.to_le_bytes()).collect()
}
