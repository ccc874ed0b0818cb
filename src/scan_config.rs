use crate::command_channel::{CommandChannel, CommandError, ProtocolParseError, Query};
use crate::usb_transport::UsbTransport;

/// Full-scale A/D code of every supported module.
pub const MAX_COUNTS: u16 = 0xFFFF;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoltageRange {
    Bip1V,
    Bip2V,
    Bip5V,
    Bip10V,
}

impl VoltageRange {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Bip1V => "BIP1V",
            Self::Bip2V => "BIP2V",
            Self::Bip5V => "BIP5V",
            Self::Bip10V => "BIP10V",
        }
    }

    pub fn from_token(token: &str) -> Option<Self> {
        match token {
            "BIP1V" => Some(Self::Bip1V),
            "BIP2V" => Some(Self::Bip2V),
            "BIP5V" => Some(Self::Bip5V),
            "BIP10V" => Some(Self::Bip10V),
            _ => None,
        }
    }

    pub fn max_volts(&self) -> i32 {
        match self {
            Self::Bip1V => 1,
            Self::Bip2V => 2,
            Self::Bip5V => 5,
            Self::Bip10V => 10,
        }
    }

    pub fn min_volts(&self) -> i32 {
        -self.max_volts()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScanConfiguration {
    pub low_channel: u32,
    pub high_channel: u32,
    pub sample_rate: f64,
    pub samples_per_block: usize,
}

impl ScanConfiguration {
    /// Zero for an inverted span.
    pub fn channel_count(&self) -> usize {
        self.high_channel
            .checked_sub(self.low_channel)
            .map_or(0, |span| span as usize + 1)
    }

    /// Number of raw samples in one block across all channels.
    pub fn block_len(&self) -> usize {
        self.channel_count() * self.samples_per_block
    }

    pub fn absolute_channel(&self, channel_index: usize) -> u32 {
        self.low_channel + channel_index as u32
    }
}

/// Linear correction and input range of one channel, as reported by the device.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChannelCalibration {
    pub slope: f64,
    pub offset: f64,
    pub range: VoltageRange,
}

impl ChannelCalibration {
    pub fn range_min(&self) -> i32 {
        self.range.min_volts()
    }

    pub fn range_max(&self) -> i32 {
        self.range.max_volts()
    }
}

/// Scan geometry, per-channel calibration and the block buffer sized for them.
///
/// The three always agree: `calibrations.len() == config.channel_count()` and
/// `buffer.len() == config.block_len()`. A session replaces the whole value at
/// once, never its parts.
#[derive(Debug, Clone, PartialEq)]
pub struct ScanState {
    config: ScanConfiguration,
    calibrations: Vec<ChannelCalibration>,
    buffer: Vec<u16>,
}

impl ScanState {
    fn new(config: ScanConfiguration, calibrations: Vec<ChannelCalibration>) -> Self {
        let buffer = vec![0; config.block_len()];
        Self {
            config,
            calibrations,
            buffer,
        }
    }

    /// Same configuration and calibration with a freshly sized buffer.
    pub fn with_samples_per_block(&self, samples_per_block: usize) -> Self {
        let config = ScanConfiguration {
            samples_per_block,
            ..self.config
        };
        Self::new(config, self.calibrations.clone())
    }

    pub fn config(&self) -> &ScanConfiguration {
        &self.config
    }

    pub fn calibrations(&self) -> &[ChannelCalibration] {
        &self.calibrations
    }

    pub fn buffer(&self) -> &[u16] {
        &self.buffer
    }

    pub fn buffer_mut(&mut self) -> &mut [u16] {
        &mut self.buffer
    }
}

/// Query scan geometry and calibration from the device.
///
/// Nothing is kept from a previous refresh: the result is only handed back once
/// every query has succeeded, so callers can swap it in as a unit.
pub fn query_scan_state<T: UsbTransport>(
    channel: &mut CommandChannel<T>,
    samples_per_block: usize,
) -> Result<ScanState, CommandError> {
    let low_channel: u32 = channel.query(Query::LowChannel)?;
    let high_channel: u32 = channel.query(Query::HighChannel)?;
    if high_channel < low_channel {
        return Err(ProtocolParseError::InvalidChannelSpan {
            low: low_channel,
            high: high_channel,
        }
        .into());
    }
    let sample_rate: f64 = channel.query(Query::ScanRate)?;

    let calibrations = (low_channel..=high_channel)
        .map(|ai| -> Result<ChannelCalibration, CommandError> {
            let slope: f64 = channel.query(Query::Slope(ai))?;
            let offset: f64 = channel.query(Query::Offset(ai))?;
            let token = channel.query_text(Query::Range(ai))?;
            let range = VoltageRange::from_token(&token)
                .ok_or(ProtocolParseError::UnknownRange { channel: ai, token })?;
            log::debug!(
                "Channel {} slope: {} offset: {} range: {}",
                ai,
                slope,
                offset,
                range.as_str()
            );
            Ok(ChannelCalibration {
                slope,
                offset,
                range,
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    let config = ScanConfiguration {
        low_channel,
        high_channel,
        sample_rate,
        samples_per_block,
    };
    Ok(ScanState::new(config, calibrations))
}

/// Device-side scan settings to push before a refresh.
///
/// Only the fields that were set are sent.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScanSettings {
    low_channel: Option<u32>,
    high_channel: Option<u32>,
    sample_rate: Option<f64>,
    samples: Option<u32>,
    ranges: Vec<(u32, VoltageRange)>,
}

impl ScanSettings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn channels(mut self, low: u32, high: u32) -> Self {
        self.low_channel = Some(low);
        self.high_channel = Some(high);
        self
    }

    pub fn sample_rate(mut self, hz: f64) -> Self {
        self.sample_rate = Some(hz);
        self
    }

    /// Samples per channel for a finite scan. Zero scans continuously.
    pub fn samples(mut self, samples: u32) -> Self {
        self.samples = Some(samples);
        self
    }

    pub fn continuous(self) -> Self {
        self.samples(0)
    }

    pub fn range(mut self, channel: u32, range: VoltageRange) -> Self {
        self.ranges.retain(|(ai, _)| *ai != channel);
        self.ranges.push((channel, range));
        self
    }

    /// The setter commands, in the order they must be sent.
    pub fn into_commands(self) -> Vec<String> {
        let mut commands = Vec::new();
        if let Some(low) = self.low_channel {
            commands.push(format!("AISCAN:LOWCHAN={}", low));
        }
        if let Some(high) = self.high_channel {
            commands.push(format!("AISCAN:HIGHCHAN={}", high));
        }
        if let Some(rate) = self.sample_rate {
            commands.push(format!("AISCAN:RATE={}", rate));
        }
        if let Some(samples) = self.samples {
            commands.push(format!("AISCAN:SAMPLES={}", samples));
        }
        for (channel, range) in self.ranges {
            commands.push(format!("AI{{{}}}:RANGE={}", channel, range.as_str()));
        }
        commands
    }
}
