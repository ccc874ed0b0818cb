use crate::scan_config::{ChannelCalibration, ScanConfiguration, MAX_COUNTS};
use polars::prelude::*;

pub const TIME_COLUMN_NAME: &str = "time";
const ROW_INDEX_COLUMN_NAME: &str = "row_index";

/// Convert a raw A/D code to volts.
///
/// The device's own gain/offset correction is applied to the code first, and
/// only the corrected code is mapped onto the channel's voltage range.
pub fn scale_and_calibrate(raw: u16, calibration: &ChannelCalibration) -> f64 {
    let full_scale = f64::from(calibration.range_max() - calibration.range_min());
    let calibrated = f64::from(raw) * calibration.slope + calibration.offset;
    (calibrated / f64::from(MAX_COUNTS)) * full_scale + f64::from(calibration.range_min())
}

/// [`scale_and_calibrate`] as a column expression.
pub fn calibration_expr(raw: Expr, calibration: &ChannelCalibration) -> Expr {
    let full_scale = f64::from(calibration.range_max() - calibration.range_min());
    let calibrated = raw.cast(DataType::Float64) * lit(calibration.slope) + lit(calibration.offset);
    (calibrated / lit(f64::from(MAX_COUNTS))) * lit(full_scale)
        + lit(f64::from(calibration.range_min()))
}

pub fn channel_column_name(channel: u32) -> String {
    format!("ai{}", channel)
}

fn raw_column_name(channel: u32) -> String {
    format!("ai{}_raw", channel)
}

/// Calibrated voltages of an interleaved block, one column per channel.
///
/// `data` holds whole scans of `calibrations.len()` samples each; a trailing
/// partial scan is dropped. The `time` column is seconds from the first scan.
pub fn block_to_dataframe(
    data: &[u16],
    config: &ScanConfiguration,
    calibrations: &[ChannelCalibration],
) -> PolarsResult<DataFrame> {
    let channel_count = calibrations.len();
    if channel_count == 0 {
        return Ok(DataFrame::empty());
    }
    if data.len() % channel_count != 0 {
        log::warn!(
            "Dropping {} samples of an incomplete scan",
            data.len() % channel_count
        );
    }

    let columns: Vec<Column> = (0..channel_count)
        .map(|index| {
            let values: Vec<u32> = data
                .chunks_exact(channel_count)
                .map(|scan| u32::from(scan[index]))
                .collect();
            Series::new(raw_column_name(config.absolute_channel(index)).into(), values).into()
        })
        .collect();

    let mut selection = vec![(col(ROW_INDEX_COLUMN_NAME).cast(DataType::Float64)
        * lit(1.0 / config.sample_rate))
    .alias(TIME_COLUMN_NAME)];
    for (index, calibration) in calibrations.iter().enumerate() {
        let channel = config.absolute_channel(index);
        selection.push(
            calibration_expr(col(raw_column_name(channel)), calibration)
                .alias(channel_column_name(channel)),
        );
    }

    DataFrame::new(columns)?
        .lazy()
        .with_row_index(ROW_INDEX_COLUMN_NAME, Some(0))
        .select(selection)
        .collect()
}
