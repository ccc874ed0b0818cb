use crate::usb_transport::{ControlRequest, TransportError, UsbTransport};
use std::str::FromStr;
use std::time::Duration;

/// Vendor request code carrying DAQFlex text messages in both directions.
pub const STRING_MESSAGE: u8 = 0x80;
/// Size of every DAQFlex message payload.
pub const MAX_MESSAGE_LENGTH: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolParseError {
    #[error("Response '{response}' to '{command}' is shorter than the expected prefix '{expected_prefix}'")]
    ResponseTooShort {
        command: String,
        response: String,
        expected_prefix: String,
    },

    #[error("Response '{response}' to '{command}' does not start with '{expected_prefix}'")]
    PrefixMismatch {
        command: String,
        response: String,
        expected_prefix: String,
    },

    #[error("Could not parse value '{value}' in response to '{command}'")]
    InvalidValue { command: String, value: String },

    #[error("Unknown range '{token}' reported for channel {channel}")]
    UnknownRange { channel: u32, token: String },

    #[error("High channel {high} is below low channel {low}")]
    InvalidChannelSpan { low: u32, high: u32 },

    #[error("Device answered '{response}' to '{command}' instead of echoing it")]
    MissingEcho { command: String, response: String },
}

#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    #[error("Command '{command}' is {length} bytes, messages are limited to 64")]
    CommandTooLong { command: String, length: usize },

    #[error("Transport error on '{command}': {source}")]
    Transport {
        command: String,
        #[source]
        source: TransportError,
    },

    #[error(transparent)]
    Parse(#[from] ProtocolParseError),
}

/// Queries understood by the firmware, with the exact reply prefix each one
/// produces. The prefix is validated before the value is parsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Query {
    LowChannel,
    HighChannel,
    ScanRate,
    Slope(u32),
    Offset(u32),
    Range(u32),
    SerialNumber,
}

impl Query {
    pub fn command(&self) -> String {
        match self {
            Self::LowChannel => "?AISCAN:LOWCHAN".to_string(),
            Self::HighChannel => "?AISCAN:HIGHCHAN".to_string(),
            Self::ScanRate => "?AISCAN:RATE".to_string(),
            Self::Slope(channel) => format!("?AI{{{}}}:SLOPE", channel),
            Self::Offset(channel) => format!("?AI{{{}}}:OFFSET", channel),
            Self::Range(channel) => format!("?AI{{{}}}:RANGE", channel),
            Self::SerialNumber => "?DEV:MFGSER".to_string(),
        }
    }

    pub fn response_prefix(&self) -> String {
        match self {
            Self::LowChannel => "AISCAN:LOWCHAN=".to_string(),
            Self::HighChannel => "AISCAN:HIGHCHAN=".to_string(),
            Self::ScanRate => "AISCAN:RATE=".to_string(),
            Self::Slope(channel) => format!("AI{{{}}}:SLOPE=", channel),
            Self::Offset(channel) => format!("AI{{{}}}:OFFSET=", channel),
            Self::Range(channel) => format!("AI{{{}}}:RANGE=", channel),
            Self::SerialNumber => "DEV:MFGSER=".to_string(),
        }
    }

    /// Strip this query's prefix from `response`, returning the value text.
    pub fn strip_response<'a>(&self, response: &'a str) -> Result<&'a str, ProtocolParseError> {
        let prefix = self.response_prefix();
        if response.len() < prefix.len() {
            return Err(ProtocolParseError::ResponseTooShort {
                command: self.command(),
                response: response.to_string(),
                expected_prefix: prefix,
            });
        }
        match response.strip_prefix(prefix.as_str()) {
            Some(value) => Ok(value.trim()),
            None => Err(ProtocolParseError::PrefixMismatch {
                command: self.command(),
                response: response.to_string(),
                expected_prefix: prefix,
            }),
        }
    }

    pub fn parse_response<V: FromStr>(&self, response: &str) -> Result<V, ProtocolParseError> {
        let value = self.strip_response(response)?;
        value.parse().map_err(|_| ProtocolParseError::InvalidValue {
            command: self.command(),
            value: value.to_string(),
        })
    }
}

/// Pad `command` with zeros to a full message payload.
pub fn frame_command(command: &str) -> Result<[u8; MAX_MESSAGE_LENGTH], CommandError> {
    let bytes = command.as_bytes();
    if bytes.len() > MAX_MESSAGE_LENGTH {
        return Err(CommandError::CommandTooLong {
            command: command.to_string(),
            length: bytes.len(),
        });
    }

    let mut payload = [0u8; MAX_MESSAGE_LENGTH];
    payload[..bytes.len()].copy_from_slice(bytes);
    Ok(payload)
}

/// Interpret a received payload as a NUL terminated string.
pub fn decode_response(payload: &[u8]) -> String {
    let end = payload.iter().position(|&b| b == 0).unwrap_or(payload.len());
    String::from_utf8_lossy(&payload[..end]).into_owned()
}

/// Strict request/response text exchange over vendor control transfers.
pub struct CommandChannel<T> {
    transport: T,
    timeout: Duration,
}

impl<T: UsbTransport> CommandChannel<T> {
    pub fn new(transport: T, timeout: Duration) -> Self {
        Self { transport, timeout }
    }

    /// Send one message and read back the device's reply.
    pub fn send_command(&mut self, command: &str) -> Result<String, CommandError> {
        let payload = frame_command(command)?;
        let request = ControlRequest::vendor(STRING_MESSAGE);
        let transport_error = |source: TransportError| CommandError::Transport {
            command: command.to_string(),
            source,
        };

        log::debug!("Sending: {}", command);
        self.transport
            .control_out(request, &payload, self.timeout)
            .map_err(transport_error)?;

        let mut reply = [0u8; MAX_MESSAGE_LENGTH];
        let received = self
            .transport
            .control_in(request, &mut reply, self.timeout)
            .map_err(transport_error)?;

        let response = decode_response(&reply[..received.min(MAX_MESSAGE_LENGTH)]);
        log::debug!("Got: {}", response);
        Ok(response)
    }

    /// Issue a query and parse the value after its response prefix.
    pub fn query<V: FromStr>(&mut self, query: Query) -> Result<V, CommandError> {
        let response = self.send_command(&query.command())?;
        Ok(query.parse_response(&response)?)
    }

    /// Issue a query and return the raw value text after its response prefix.
    pub fn query_text(&mut self, query: Query) -> Result<String, CommandError> {
        let response = self.send_command(&query.command())?;
        Ok(query.strip_response(&response)?.to_string())
    }

    /// Send a setter or action command and check the device echoed its keyword.
    pub fn execute(&mut self, command: &str) -> Result<String, CommandError> {
        let response = self.send_command(command)?;
        let keyword = command.split('=').next().unwrap_or(command);
        if !response.starts_with(keyword) {
            return Err(ProtocolParseError::MissingEcho {
                command: command.to_string(),
                response,
            }
            .into());
        }
        Ok(response)
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn into_transport(self) -> T {
        self.transport
    }
}
