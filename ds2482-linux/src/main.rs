use clap::Parser;
use ds18b20::{
    DeviceRecord, Registry, Resolution, Target, VerifyOutcome, read_scratchpad, start_conversion,
};
use ds2482::{DeviceConfiguration, Ds2482Builder};
use embedded_onewire::{OneWire, OneWireError};
use std::{path::PathBuf, time::Duration};

mod store;

use store::FileStore;

/// Most sensors registered in one start-up scan.
const MAX_NEW: usize = 32;

/// Logs DS18B20 temperatures read through a DS2482 bridge.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to I2C bus (e.g., /dev/i2c-1)
    #[arg(short, long)]
    path: String,
    /// 7-bit I2C address of the bridge
    #[arg(short, long, default_value_t = 0x18)]
    address: u8,
    /// Number of 1-Wire channels: 1 (DS2482-100) or 8 (DS2482-800)
    #[arg(short, long, default_value_t = 1, value_parser = clap::value_parser!(u8).range(1..=8))]
    channels: u8,
    /// File holding the sensor registry
    #[arg(short, long, default_value = "ds18b20.reg")]
    registry: PathBuf,
    /// Size of the registry image in bytes
    #[arg(long, default_value_t = 1024)]
    capacity: usize,
    /// Forget every registered sensor before scanning
    #[arg(long)]
    reset: bool,
    /// Seconds between readings
    #[arg(short, long, default_value_t = 10)]
    interval: u64,
}

fn main() {
    env_logger::init();
    let args = Args::parse();
    let i2c = linux_embedded_hal::I2cdev::new(&args.path).expect("Failed to open I2C device");
    let mut bridge = Ds2482Builder::default()
        .with_address(args.address)
        .with_channels(args.channels)
        .with_config(DeviceConfiguration::new().with_active_pullup(true))
        .build(i2c, linux_embedded_hal::Delay)
        .expect("Failed to create DS2482 instance");
    let mut delay = linux_embedded_hal::Delay;

    let store = FileStore::open(&args.registry, args.capacity).expect("Failed to open registry file");
    let mut registry = Registry::new(store).expect("Failed to read registry");
    if args.reset {
        registry.reset().expect("Failed to reset registry");
        log::info!("Registry cleared");
    }

    for n in 1..=registry.total() {
        match registry.verify(&mut bridge, n) {
            Ok(VerifyOutcome::Missing) => log::warn!("Sensor {n} did not answer"),
            Ok(_) => {}
            Err(e) => log::error!("Sensor {n}: {e:?}"),
        }
    }

    let mut found = [DeviceRecord::default(); MAX_NEW];
    match registry.discover_new(&mut bridge, &mut found) {
        Ok(count) => {
            for rec in &found[..count] {
                match registry.push(rec) {
                    Ok(n) => log::info!("Registered {} as sensor {n}", rec.rom),
                    Err(e) => log::error!("Could not register {}: {e:?}", rec.rom),
                }
            }
        }
        Err(e) => log::error!("Scan failed: {e:?}"),
    }
    log::info!("{} sensors registered", registry.total());

    loop {
        for channel in 0..bridge.channels() {
            let target = Target::All {
                channel,
                resolution: Resolution::Twelve,
            };
            match start_conversion(&mut bridge, &mut delay, target, true) {
                Ok(()) => {}
                Err(OneWireError::NoDevicePresent) => log::debug!("Channel {channel} is empty"),
                Err(e) => log::warn!("Conversion on channel {channel} failed: {e:?}"),
            }
        }
        for n in 1..=registry.total() {
            let rec = match registry.load(n) {
                Ok(rec) => rec,
                Err(e) => {
                    log::error!("Sensor {n}: {e:?}");
                    continue;
                }
            };
            match read_scratchpad(&mut bridge, &rec) {
                Ok(pad) => log::info!(
                    "Sensor {n} ({}): {} °C, {} °F",
                    rec.rom,
                    pad.celsius(),
                    pad.fahrenheit()
                ),
                Err(e) => log::warn!("Sensor {n} ({}): {e:?}", rec.rom),
            }
        }
        std::thread::sleep(Duration::from_secs(args.interval));
    }
}
