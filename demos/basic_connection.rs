// Basic device discovery and connection example
//
// This example shows how to discover DAQFlex devices and establish a basic connection.

use daqflex_rs::{DaqConfig, DaqConnector};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging (optional)
    env_logger::init();

    println!("DAQFlex Device Discovery Example");
    println!("================================\n");

    // Step 1: List all attached DAQFlex devices
    println!("1. Discovering available DAQFlex devices...");
    let devices = DaqConnector::get_available_devices(None)?;

    let Some(first) = devices.first() else {
        println!("No DAQFlex devices found. Please connect a device and try again.");
        return Ok(());
    };

    println!("Found {} device(s):", devices.len());
    for (i, device) in devices.iter().enumerate() {
        println!(
            "  {}. {} on bus {} address {}",
            i + 1,
            device.model.name(),
            device.bus_number,
            device.address
        );
    }
    println!();

    // Step 2: Connect to the first device
    println!("2. Connecting to {}...", first.model.name());
    let mut device = DaqConnector::connect(first.model.product_id(), None, DaqConfig::default())?;
    println!("Successfully connected!");

    // Step 3: Device information
    println!("\n3. Device information:");
    println!("   Serial number: {}", device.serial_number()?);
    let endpoints = *device.endpoints();
    println!(
        "   Bulk IN endpoint: 0x{:02x} ({} byte packets)",
        endpoints.bulk_in_endpoint_address, endpoints.bulk_packet_size
    );

    // Step 4: Scan configuration reported by the device
    println!("\n4. Scan configuration:");
    let config = *device.scan_configuration();
    println!(
        "   Channels {}..={} at {} Hz",
        config.low_channel, config.high_channel, config.sample_rate
    );

    println!("\n5. Connection test completed successfully!");

    Ok(())
}
