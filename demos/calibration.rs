// Channel calibration example
//
// This example prints the calibration the device reports for every channel in
// the current scan and shows how raw codes map to volts.

use daqflex_rs::{DaqConfig, DaqConnector, DeviceModel, MAX_COUNTS};
use clap::Parser;

#[derive(Parser)]
#[command(name = "calibration")]
#[command(version = "1.0")]
#[command(about = "Show per-channel calibration of a DAQFlex device")]
struct Args {
    /// Product ID of the device, e.g. 0x0111
    #[arg(short, long, default_value = "0x0111", value_parser = parse_product_id)]
    product_id: u16,

    /// Only connect to the device with this serial number
    #[arg(short, long)]
    serial: Option<String>,
}

fn parse_product_id(text: &str) -> Result<u16, std::num::ParseIntError> {
    u16::from_str_radix(text.trim_start_matches("0x"), 16)
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args = Args::parse();

    let model = DeviceModel::from_product_id(args.product_id)
        .map_or("unknown model", |model| model.name());
    println!("DAQFlex Channel Calibration ({})", model);
    println!("==================================\n");

    let mut device = DaqConnector::connect(args.product_id, args.serial.as_deref(), DaqConfig::default())?;

    // Make sure we are looking at the device's current settings
    device.refresh_scan_parameters()?;

    let config = *device.scan_configuration();
    println!(
        "{:>8} {:>12} {:>12} {:>10}",
        "channel", "slope", "offset", "range"
    );
    for (index, calibration) in device.calibrations().iter().enumerate() {
        println!(
            "{:>8} {:>12.6} {:>12.4} {:>4}..{:<4}",
            config.absolute_channel(index),
            calibration.slope,
            calibration.offset,
            calibration.range_min(),
            calibration.range_max()
        );
    }

    println!("\nRaw code to volts:");
    for raw in [0, MAX_COUNTS / 4, MAX_COUNTS / 2, MAX_COUNTS / 4 * 3, MAX_COUNTS] {
        let volts: Vec<String> = (0..config.channel_count())
            .map(|index| format!("{:>9.4}V", device.scale(raw, index)))
            .collect();
        println!("  {:>5} -> {}", raw, volts.join(" "));
    }

    Ok(())
}
