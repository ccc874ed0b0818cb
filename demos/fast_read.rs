// Fast data reading example
//
// This example demonstrates continuous high-speed acquisition from a DAQFlex
// device, reading block after block from a running scan.

use clap::Parser;
use daqflex_rs::{BulkTimeout, DaqConfig, DaqConnector, ScanSettings};
use std::io::{self, Write};
use std::time::Duration;

#[derive(Parser)]
#[command(name = "fast_read")]
#[command(version = "1.0")]
#[command(about = "High-speed data acquisition from a DAQFlex device")]
#[command(long_about = "Continuously read blocks from a DAQFlex device as fast as possible. Great for performance testing and real-time monitoring.")]
struct Args {
    /// Product ID of the device, e.g. 0x0111
    #[arg(value_parser = parse_product_id)]
    product_id: u16,

    /// Sample rate per channel in Hz
    #[arg(short, long, default_value_t = 10_000.0)]
    rate: f64,

    /// Highest channel to scan, starting at channel 0
    #[arg(short = 'c', long, default_value_t = 0)]
    high_channel: u32,

    /// Samples per channel in each block
    #[arg(short, long, default_value_t = 1024)]
    block: usize,

    /// Enable verbose logging
    #[arg(short, long, help = "Show debug information and detailed logs")]
    verbose: bool,

    /// Display only statistics (no voltage values)
    #[arg(short, long, help = "Show only performance statistics, not voltage readings")]
    stats_only: bool,
}

fn parse_product_id(text: &str) -> Result<u16, std::num::ParseIntError> {
    u16::from_str_radix(text.trim_start_matches("0x"), 16)
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    if args.verbose {
        env_logger::Builder::from_default_env()
            .filter_level(log::LevelFilter::Debug)
            .init();
    } else {
        env_logger::init();
    }

    println!("DAQFlex Fast Data Reader");
    println!("========================");
    println!("Channels: 0..={}", args.high_channel);
    println!("Rate: {} Hz", args.rate);
    println!("Block: {} samples per channel", args.block);
    println!("Press Ctrl+C to stop\n");

    // Time out a read after twice the time one block should take
    let config = DaqConfig::default()
        .with_samples_per_block(args.block)
        .with_bulk_timeout(BulkTimeout::ScaledToBlock {
            margin: 2.0,
            minimum: Duration::from_millis(500),
        });
    let mut device = DaqConnector::connect(args.product_id, None, config)?;

    let settings = ScanSettings::new()
        .channels(0, args.high_channel)
        .sample_rate(args.rate)
        .continuous();
    device.apply_scan_settings(settings)?;
    device.flush_input_data()?;
    device.start_scan()?;
    println!("Starting continuous data acquisition...\n");

    let channel_count = device.scan_configuration().channel_count();
    let mut block_count = 0u64;
    let start_time = std::time::Instant::now();

    loop {
        match device.get_block() {
            Ok(block) => {
                block_count += 1;
                let num_samples = block.len();
                let first: Vec<u16> = block.iter().take(channel_count).copied().collect();

                let elapsed = start_time.elapsed();
                let blocks_per_sec = block_count as f64 / elapsed.as_secs_f64();
                let samples_per_sec =
                    (block_count * num_samples as u64) as f64 / elapsed.as_secs_f64();

                print!(
                    "\r[{}] {} blocks ({} samples) | {:.1} Hz | {:.0} samples/s",
                    format_duration(elapsed),
                    block_count,
                    num_samples,
                    blocks_per_sec,
                    samples_per_sec
                );

                if !args.stats_only {
                    print!(" | First: [");
                    for (index, &raw) in first.iter().enumerate() {
                        if index > 0 {
                            print!(", ");
                        }
                        print!("{:.3}V", device.scale(raw, index));
                    }
                    print!("]");
                }
                io::stdout().flush()?;
            }
            Err(e) => {
                eprintln!("\nError reading data: {}", e);
                eprintln!("Restarting scan...");
                device.stop_scan()?;
                device.flush_input_data()?;
                device.start_scan()?;
            }
        }
    }
}

fn format_duration(duration: Duration) -> String {
    let total_secs = duration.as_secs();
    let hours = total_secs / 3600;
    let minutes = (total_secs % 3600) / 60;
    let seconds = total_secs % 60;

    if hours > 0 {
        format!("{:02}:{:02}:{:02}", hours, minutes, seconds)
    } else {
        format!("{:02}:{:02}", minutes, seconds)
    }
}
