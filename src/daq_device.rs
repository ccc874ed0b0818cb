use crate::acquisition::{self, AcquisitionError, BulkTimeout};
use crate::calibration::{block_to_dataframe, scale_and_calibrate};
use crate::command_channel::{CommandChannel, CommandError, Query};
use crate::endpoint_descriptor::{fetch_endpoint_info, EndpointInfo};
use crate::scan_config::{
    query_scan_state, ChannelCalibration, ScanConfiguration, ScanSettings, ScanState,
};
use crate::usb_transport::{TransportError, UsbTransport};
use polars::prelude::{DataFrame, PolarsError};
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum DaqDeviceError {
    #[error("Command error: {0}")]
    Command(#[from] CommandError),

    #[error("Acquisition error: {0}")]
    Acquisition(#[from] AcquisitionError),

    #[error("Failed to read the configuration descriptor: {0}")]
    Descriptor(#[source] TransportError),

    #[error("Samples per block must be at least 1")]
    InvalidBlockSize,

    #[error("DataFrame error: {0}")]
    DataFrame(#[from] PolarsError),
}

/// Timeouts and block sizing for a session.
#[derive(Debug, Clone, PartialEq)]
pub struct DaqConfig {
    pub control_timeout: Duration,
    pub bulk_timeout: BulkTimeout,
    pub flush_timeout: Duration,
    pub samples_per_block: usize,
}

impl Default for DaqConfig {
    fn default() -> Self {
        Self {
            control_timeout: Duration::from_secs(1),
            bulk_timeout: BulkTimeout::default(),
            flush_timeout: Duration::from_millis(200),
            samples_per_block: 256,
        }
    }
}

impl DaqConfig {
    pub fn with_control_timeout(mut self, timeout: Duration) -> Self {
        self.control_timeout = timeout;
        self
    }

    pub fn with_bulk_timeout(mut self, timeout: BulkTimeout) -> Self {
        self.bulk_timeout = timeout;
        self
    }

    pub fn with_flush_timeout(mut self, timeout: Duration) -> Self {
        self.flush_timeout = timeout;
        self
    }

    pub fn with_samples_per_block(mut self, samples_per_block: usize) -> Self {
        self.samples_per_block = samples_per_block;
        self
    }
}

/// An open DAQFlex session on a claimed device.
///
/// Every transfer takes `&mut self`, so command traffic and bulk reads can
/// never overlap on one session.
pub struct DaqDevice<T: UsbTransport> {
    channel: CommandChannel<T>,
    endpoints: EndpointInfo,
    config: DaqConfig,
    scan: ScanState,
}

impl<T: UsbTransport> DaqDevice<T> {
    /// Discover the bulk endpoints and read the current scan settings.
    pub fn new(mut transport: T, config: DaqConfig) -> Result<Self, DaqDeviceError> {
        if config.samples_per_block == 0 {
            return Err(DaqDeviceError::InvalidBlockSize);
        }

        let endpoints = fetch_endpoint_info(&mut transport, config.control_timeout)
            .map_err(DaqDeviceError::Descriptor)?;
        if !endpoints.has_bulk_in() {
            log::warn!("Device reports no bulk IN endpoint, scans will not be readable");
        }

        let mut channel = CommandChannel::new(transport, config.control_timeout);
        let scan = query_scan_state(&mut channel, config.samples_per_block)?;
        log::debug!("Initial scan configuration: {:?}", scan.config());

        Ok(Self {
            channel,
            endpoints,
            config,
            scan,
        })
    }

    /// Send a raw DAQFlex message and return the reply text.
    pub fn send_command(&mut self, command: &str) -> Result<String, CommandError> {
        self.channel.send_command(command)
    }

    pub fn serial_number(&mut self) -> Result<String, CommandError> {
        self.channel.query_text(Query::SerialNumber)
    }

    /// Re-read scan settings and calibration after they changed on the device.
    ///
    /// On failure the previous configuration, calibration and buffer stay as
    /// they were.
    #[tracing::instrument(level = "debug", skip(self))]
    pub fn refresh_scan_parameters(&mut self) -> Result<&ScanConfiguration, DaqDeviceError> {
        let staged = query_scan_state(&mut self.channel, self.config.samples_per_block)?;
        log::debug!("Refreshed scan configuration: {:?}", staged.config());
        self.scan = staged;
        Ok(self.scan.config())
    }

    /// Push `settings` to the device, then refresh from what it reports back.
    pub fn apply_scan_settings(
        &mut self,
        settings: ScanSettings,
    ) -> Result<&ScanConfiguration, DaqDeviceError> {
        for command in settings.into_commands() {
            self.channel.execute(&command)?;
        }
        self.refresh_scan_parameters()
    }

    pub fn start_scan(&mut self) -> Result<(), CommandError> {
        self.channel.execute("AISCAN:START").map(|_| ())
    }

    pub fn stop_scan(&mut self) -> Result<(), CommandError> {
        self.channel.execute("AISCAN:STOP").map(|_| ())
    }

    /// Resize the block buffer. The old buffer contents are discarded.
    pub fn set_samples_per_block(&mut self, samples_per_block: usize) -> Result<(), DaqDeviceError> {
        if samples_per_block == 0 {
            return Err(DaqDeviceError::InvalidBlockSize);
        }
        self.config.samples_per_block = samples_per_block;
        self.scan = self.scan.with_samples_per_block(samples_per_block);
        Ok(())
    }

    /// Block until `sample_count` raw samples are read into `destination`.
    #[tracing::instrument(level = "debug", skip(self, destination))]
    pub fn read_scan_data(
        &mut self,
        destination: &mut [u16],
        sample_count: usize,
    ) -> Result<usize, AcquisitionError> {
        let timeout = self.config.bulk_timeout.resolve(self.scan.config());
        acquisition::read_scan_data(
            self.channel.transport_mut(),
            &self.endpoints,
            destination,
            sample_count,
            timeout,
        )
    }

    /// Fill the session buffer with one block and return it.
    pub fn get_block(&mut self) -> Result<&[u16], AcquisitionError> {
        let sample_count = self.scan.config().block_len();
        let timeout = self.config.bulk_timeout.resolve(self.scan.config());
        acquisition::read_scan_data(
            self.channel.transport_mut(),
            &self.endpoints,
            self.scan.buffer_mut(),
            sample_count,
            timeout,
        )?;
        Ok(self.scan.buffer())
    }

    /// Throw away stale data queued on the bulk endpoint.
    #[tracing::instrument(level = "debug", skip(self))]
    pub fn flush_input_data(&mut self) -> Result<usize, AcquisitionError> {
        acquisition::flush_input_data(
            self.channel.transport_mut(),
            &self.endpoints,
            self.config.flush_timeout,
        )
    }

    /// Volts for a raw sample of the channel at `channel_index` in the scan.
    ///
    /// # Panics
    ///
    /// If `channel_index` is not below the scan's channel count.
    pub fn scale(&self, raw: u16, channel_index: usize) -> f64 {
        scale_and_calibrate(raw, &self.scan.calibrations()[channel_index])
    }

    /// The session buffer as calibrated voltages, one column per channel.
    pub fn block_dataframe(&self) -> Result<DataFrame, DaqDeviceError> {
        Ok(block_to_dataframe(
            self.scan.buffer(),
            self.scan.config(),
            self.scan.calibrations(),
        )?)
    }

    pub fn scan_configuration(&self) -> &ScanConfiguration {
        self.scan.config()
    }

    pub fn calibrations(&self) -> &[ChannelCalibration] {
        self.scan.calibrations()
    }

    pub fn buffer(&self) -> &[u16] {
        self.scan.buffer()
    }

    pub fn endpoints(&self) -> &EndpointInfo {
        &self.endpoints
    }

    pub fn config(&self) -> &DaqConfig {
        &self.config
    }

    #[cfg(test)]
    pub(crate) fn transport_mut(&mut self) -> &mut T {
        self.channel.transport_mut()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command_channel::ProtocolParseError;
    use crate::mock_transport::{sample_bytes, ScriptedTransport};
    use crate::scan_config::VoltageRange;

    fn open(transport: ScriptedTransport, samples_per_block: usize) -> DaqDevice<ScriptedTransport> {
        let config = DaqConfig::default().with_samples_per_block(samples_per_block);
        DaqDevice::new(transport, config).unwrap()
    }

    #[test]
    fn test_open_reads_endpoints_and_scan() {
        let device = open(ScriptedTransport::two_channel_device(), 16);
        assert_eq!(device.endpoints().bulk_in_endpoint_address, 0x81);
        assert_eq!(device.endpoints().bulk_packet_size, 64);
        assert_eq!(device.scan_configuration().channel_count(), 2);
        assert_eq!(device.calibrations().len(), 2);
        assert_eq!(device.buffer().len(), 32);
    }

    #[test]
    fn test_zero_block_size_is_rejected() {
        let config = DaqConfig::default().with_samples_per_block(0);
        assert!(matches!(
            DaqDevice::new(ScriptedTransport::two_channel_device(), config),
            Err(DaqDeviceError::InvalidBlockSize)
        ));
    }

    #[test]
    fn test_failed_refresh_keeps_previous_state() {
        let mut device = open(ScriptedTransport::two_channel_device(), 4);
        let before_config = *device.scan_configuration();
        let before_calibrations = device.calibrations().to_vec();

        // widen the scan so a refresh would change geometry, then break the
        // range of the last channel
        let transport = device.transport_mut();
        transport.set_response("?AISCAN:HIGHCHAN", "AISCAN:HIGHCHAN=2");
        transport.set_response("?AI{2}:SLOPE", "AI{2}:SLOPE=1.0");
        transport.set_response("?AI{2}:OFFSET", "AI{2}:OFFSET=0.0");
        transport.set_response("?AI{2}:RANGE", "AI{2}:RANGE=BOGUS");

        let err = device.refresh_scan_parameters().unwrap_err();
        assert!(matches!(
            err,
            DaqDeviceError::Command(CommandError::Parse(ProtocolParseError::UnknownRange {
                channel: 2,
                ..
            }))
        ));
        assert_eq!(*device.scan_configuration(), before_config);
        assert_eq!(device.calibrations(), before_calibrations.as_slice());
        assert_eq!(device.buffer().len(), 8);
    }

    #[test]
    fn test_successful_refresh_resizes_everything() {
        let mut device = open(ScriptedTransport::two_channel_device(), 4);
        let transport = device.transport_mut();
        transport.set_response("?AISCAN:HIGHCHAN", "AISCAN:HIGHCHAN=2");
        transport.set_response("?AI{2}:SLOPE", "AI{2}:SLOPE=1.0");
        transport.set_response("?AI{2}:OFFSET", "AI{2}:OFFSET=0.0");
        transport.set_response("?AI{2}:RANGE", "AI{2}:RANGE=BIP1V");

        assert_eq!(device.refresh_scan_parameters().unwrap().channel_count(), 3);
        assert_eq!(device.calibrations().len(), 3);
        assert_eq!(device.calibrations()[2].range, VoltageRange::Bip1V);
        assert_eq!(device.buffer().len(), 12);
    }

    #[test]
    fn test_get_block_and_scale() {
        let mut device = open(ScriptedTransport::two_channel_device(), 2);
        device
            .transport_mut()
            .push_bulk(sample_bytes(&[0, 65535, 65535, 0]), Ok(()));

        let block = device.get_block().unwrap().to_vec();
        assert_eq!(block, vec![0, 65535, 65535, 0]);
        assert!((device.scale(block[0], 0) + 10.0).abs() < 1e-9);
        assert!((device.scale(block[1], 1) - 10.0).abs() < 1e-9);

        let df = device.block_dataframe().unwrap();
        assert_eq!(df.height(), 2);
        let ai1 = df.column("ai1").unwrap().f64().unwrap();
        assert!((ai1.get(1).unwrap() + 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_bulk_timeout_comes_from_config() {
        let config = DaqConfig::default()
            .with_samples_per_block(1)
            .with_bulk_timeout(BulkTimeout::Fixed(Duration::from_millis(750)));
        let mut device = DaqDevice::new(ScriptedTransport::two_channel_device(), config).unwrap();
        device.transport_mut().push_bulk(sample_bytes(&[1, 2]), Ok(()));

        let mut destination = [0u16; 2];
        device.read_scan_data(&mut destination, 2).unwrap();
        assert_eq!(destination, [1, 2]);
        assert_eq!(
            device.transport_mut().bulk_requests,
            vec![(0x81, 64, Duration::from_millis(750))]
        );
    }

    #[test]
    fn test_set_samples_per_block_reallocates() {
        let mut device = open(ScriptedTransport::two_channel_device(), 4);
        device.set_samples_per_block(100).unwrap();
        assert_eq!(device.buffer().len(), 200);
        assert_eq!(device.scan_configuration().samples_per_block, 100);
        assert!(matches!(
            device.set_samples_per_block(0),
            Err(DaqDeviceError::InvalidBlockSize)
        ));
        assert_eq!(device.buffer().len(), 200);
    }

    #[test]
    fn test_apply_scan_settings() {
        let transport = ScriptedTransport::two_channel_device()
            .respond("AISCAN:RATE=2000", "AISCAN:RATE=2000")
            .respond("AI{0}:RANGE=BIP5V", "AI{0}:RANGE=BIP5V");
        let mut device = open(transport, 4);
        device
            .transport_mut()
            .set_response("?AISCAN:RATE", "AISCAN:RATE=2000.0");
        device
            .transport_mut()
            .set_response("?AI{0}:RANGE", "AI{0}:RANGE=BIP5V");

        let settings = ScanSettings::new()
            .sample_rate(2000.0)
            .range(0, VoltageRange::Bip5V);
        let config = *device.apply_scan_settings(settings).unwrap();
        assert!((config.sample_rate - 2000.0).abs() < f64::EPSILON);
        assert_eq!(device.calibrations()[0].range, VoltageRange::Bip5V);
    }

    #[test]
    fn test_start_stop_and_serial() {
        let transport = ScriptedTransport::two_channel_device()
            .respond("AISCAN:START", "AISCAN:START")
            .respond("AISCAN:STOP", "AISCAN:STOP");
        let mut device = open(transport, 4);
        device.start_scan().unwrap();
        device.stop_scan().unwrap();
        assert_eq!(device.serial_number().unwrap(), "018FF921");
    }

    #[test]
    fn test_flush_uses_flush_timeout() {
        let config = DaqConfig::default().with_flush_timeout(Duration::from_millis(50));
        let mut device = DaqDevice::new(ScriptedTransport::two_channel_device(), config).unwrap();
        device.transport_mut().push_bulk(vec![0; 64], Ok(()));

        assert_eq!(device.flush_input_data().unwrap(), 64);
        assert!(device
            .transport_mut()
            .bulk_requests
            .iter()
            .all(|&(_, _, timeout)| timeout == Duration::from_millis(50)));
    }
}
