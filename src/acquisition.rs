use crate::endpoint_descriptor::EndpointInfo;
use crate::scan_config::ScanConfiguration;
use crate::usb_transport::{TransportError, UsbTransport};
use std::time::Duration;

const BYTES_PER_SAMPLE: usize = 2;

#[derive(Debug, thiserror::Error)]
pub enum AcquisitionError {
    #[error("Bulk transfer failed: {0}")]
    Transport(#[from] TransportError),

    #[error("No bulk IN endpoint was discovered on this device")]
    MissingBulkEndpoint,

    #[error("Destination holds {available} samples, {required} were requested")]
    BufferTooSmall { required: usize, available: usize },
}

/// How long a single bulk read may block.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BulkTimeout {
    Fixed(Duration),
    /// Time to acquire one block at the configured rate, times `margin`, but
    /// never less than `minimum`.
    ScaledToBlock { margin: f64, minimum: Duration },
}

impl BulkTimeout {
    pub fn resolve(&self, config: &ScanConfiguration) -> Duration {
        match *self {
            Self::Fixed(timeout) => timeout,
            Self::ScaledToBlock { margin, minimum } => {
                if config.sample_rate <= 0.0 {
                    return minimum;
                }
                let block_secs = config.samples_per_block as f64 / config.sample_rate * margin;
                Duration::try_from_secs_f64(block_secs)
                    .map_or(minimum, |scaled| scaled.max(minimum))
            }
        }
    }
}

impl Default for BulkTimeout {
    fn default() -> Self {
        Self::Fixed(Duration::from_secs(2000))
    }
}

/// Read `sample_count` raw samples from the bulk IN endpoint into `destination`.
///
/// Reads are issued one packet at a time until enough bytes have arrived. A
/// read that times out after delivering some bytes counts as progress, any
/// other failure ends the acquisition. Returns the number of bytes received,
/// which can exceed `sample_count * 2` by up to one packet; the excess is
/// dropped.
pub fn read_scan_data<T: UsbTransport + ?Sized>(
    transport: &mut T,
    endpoints: &EndpointInfo,
    destination: &mut [u16],
    sample_count: usize,
    timeout: Duration,
) -> Result<usize, AcquisitionError> {
    if !endpoints.has_bulk_in() {
        return Err(AcquisitionError::MissingBulkEndpoint);
    }
    if destination.len() < sample_count {
        return Err(AcquisitionError::BufferTooSmall {
            required: sample_count,
            available: destination.len(),
        });
    }

    let packet_size = usize::from(endpoints.bulk_packet_size);
    let target_bytes = sample_count * BYTES_PER_SAMPLE;
    // A read may start anywhere below the target and return a whole packet
    let mut staging = vec![0u8; target_bytes + packet_size];
    let mut total_transferred = 0;

    while total_transferred < target_bytes {
        let chunk = &mut staging[total_transferred..total_transferred + packet_size];
        let completion = transport.bulk_in(endpoints.bulk_in_endpoint_address, chunk, timeout);
        log::trace!(
            "Bulk read: {} bytes, {:?}",
            completion.transferred,
            completion.status
        );
        total_transferred += completion.transferred;

        match completion.status {
            Ok(()) => {}
            Err(TransportError::Timeout) if completion.transferred > 0 => {}
            Err(e) => return Err(e.into()),
        }
    }

    if total_transferred > target_bytes {
        log::warn!(
            "Discarding {} bytes received past the end of the block",
            total_transferred - target_bytes
        );
    }

    for (sample, bytes) in destination[..sample_count]
        .iter_mut()
        .zip(staging.chunks_exact(BYTES_PER_SAMPLE))
    {
        *sample = u16::from_le_bytes([bytes[0], bytes[1]]);
    }

    Ok(total_transferred)
}

/// Drain whatever the device has queued on the bulk IN endpoint.
///
/// Stops at the first empty read or timeout. Returns the number of bytes
/// thrown away.
pub fn flush_input_data<T: UsbTransport + ?Sized>(
    transport: &mut T,
    endpoints: &EndpointInfo,
    timeout: Duration,
) -> Result<usize, AcquisitionError> {
    if !endpoints.has_bulk_in() {
        return Err(AcquisitionError::MissingBulkEndpoint);
    }

    let mut packet = vec![0u8; usize::from(endpoints.bulk_packet_size)];
    let mut discarded = 0;
    loop {
        let completion = transport.bulk_in(endpoints.bulk_in_endpoint_address, &mut packet, timeout);
        discarded += completion.transferred;
        match completion.status {
            Ok(()) if completion.transferred > 0 => {}
            Ok(()) | Err(TransportError::Timeout) => break,
            Err(e) => return Err(e.into()),
        }
    }

    log::debug!("Flushed {} bytes of stale input", discarded);
    Ok(discarded)
}
