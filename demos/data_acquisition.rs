// Data acquisition example
//
// This example configures a finite scan, reads one block and summarizes the
// calibrated voltages per channel.

use daqflex_rs::{DaqConfig, DaqConnector, DeviceModel, ScanSettings, VoltageRange};
use polars::prelude::DataFrame;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    println!("DAQFlex Data Acquisition Example");
    println!("================================\n");

    let samples_per_block = 1000;
    let config = DaqConfig::default().with_samples_per_block(samples_per_block);
    let mut device = DaqConnector::connect(DeviceModel::Usb1608Gx.product_id(), None, config)?;
    println!("Connected to {}\n", DeviceModel::Usb1608Gx.name());

    // Step 1: Configure channels 0-3 at 10 kHz, one block worth of samples
    println!("1. Configuring scan");
    let settings = ScanSettings::new()
        .channels(0, 3)
        .sample_rate(10_000.0)
        .samples(samples_per_block as u32)
        .range(0, VoltageRange::Bip10V)
        .range(1, VoltageRange::Bip5V);
    let scan = *device.apply_scan_settings(settings)?;
    println!(
        "   {} channels at {} Hz, {} samples per channel",
        scan.channel_count(),
        scan.sample_rate,
        scan.samples_per_block
    );

    // Step 2: Drop anything left over from a previous run and start
    println!("\n2. Starting scan");
    let flushed = device.flush_input_data()?;
    println!("   Flushed {} stale bytes", flushed);
    device.start_scan()?;

    // Step 3: Read one block
    println!("\n3. Reading block");
    let raw_samples = device.get_block()?.len();
    println!("   Received {} raw samples", raw_samples);
    device.stop_scan()?;

    // Step 4: Summarize
    println!("\n4. Channel summary");
    let data = device.block_dataframe()?;
    for index in 0..scan.channel_count() {
        print_data_summary(&data, &format!("ai{}", scan.absolute_channel(index)))?;
    }

    println!("\nData acquisition example completed!");
    Ok(())
}

// Helper function to print basic statistics about acquired data
fn print_data_summary(data: &DataFrame, column: &str) -> Result<(), Box<dyn std::error::Error>> {
    let col = data.column(column)?;

    if let Ok(series) = col.f64() {
        let values: Vec<f64> = series.into_no_null_iter().collect();

        if !values.is_empty() {
            let min = values.iter().fold(f64::INFINITY, |a, &b| a.min(b));
            let max = values.iter().fold(f64::NEG_INFINITY, |a, &b| a.max(b));
            let mean = values.iter().sum::<f64>() / values.len() as f64;

            println!("   {}: {:.4}V to {:.4}V (mean: {:.4}V)", column, min, max, mean);
        }
    }

    Ok(())
}
