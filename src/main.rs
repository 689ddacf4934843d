//! Gyro logger - records ISM330DHCX readings to per-sensor CSV files
//!
//! Registers the soldered (0x6A) and default (0x6B) sensor addresses,
//! samples both at the requested rate on a background thread, and appends
//! timestamped rows to `sensorN.csv` in the output folder until Ctrl+C or
//! the optional duration elapses.

use clap::Parser;
use ism330_gyro_logger::{
    GyroError, GyroRecorder, SharedBus, ISM330DHCX_ADDRESS_HIGH, ISM330DHCX_ADDRESS_LOW,
};
use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

#[cfg(not(any(target_os = "linux", target_os = "windows")))]
compile_error!("Unsupported platform. Only Linux (native I2C) and Windows (CH341) are supported.");

#[derive(Parser, Debug)]
#[command(name = "gyro-logger")]
#[command(about = "Record ISM330DHCX gyroscope data to per-sensor CSV logs", long_about = None)]
struct Args {
    /// Output folder for per-sensor CSV logs
    #[arg(short, long, default_value = "gyro_logs")]
    output: PathBuf,

    /// Target sample rate in Hz, per device
    #[arg(short, long, default_value = "100")]
    rate: u32,

    /// I2C character device to use
    #[cfg(target_os = "linux")]
    #[arg(short, long, default_value = "/dev/i2c-16")]
    bus: String,

    /// CH341 adapter index to use
    #[cfg(target_os = "windows")]
    #[arg(short, long, default_value = "0")]
    channel: u32,

    /// Recording duration in seconds (runs until Ctrl+C if omitted)
    #[arg(short, long)]
    duration: Option<u64>,
}

#[cfg(target_os = "linux")]
fn open_bus(args: &Args) -> SharedBus {
    use ism330_gyro_logger::{shared, NativeBus};
    shared(NativeBus::new(&args.bus))
}

#[cfg(target_os = "windows")]
fn open_bus(args: &Args) -> SharedBus {
    use ism330_gyro_logger::{shared, Ch341Bus, Ch341Port};
    shared(Ch341Bus::new(Ch341Port::new(args.channel)))
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    println!("ISM330DHCX Gyro Logger");
    println!("======================");

    if args.rate == 0 || args.rate > 1000 {
        eprintln!("Error: sample rate must be between 1-1000 Hz, got {}", args.rate);
        std::process::exit(1);
    }

    if args.output.exists() {
        println!("[WARNING] Log folder already exists. Data will be appended to existing files.");
    } else {
        fs::create_dir_all(&args.output)?;
    }

    println!("Initializing I2C transport...");
    let mut recorder = match GyroRecorder::new(open_bus(&args)) {
        Ok(recorder) => recorder,
        Err(GyroError::TransportUnavailable(detail)) => {
            eprintln!("Error: I2C transport unavailable: {detail}");
            eprintln!("Please check:");
            #[cfg(target_os = "linux")]
            {
                eprintln!("  1. The I2C character device exists (ls /dev/i2c-*)");
                eprintln!("  2. You have permission to open it (i2c group membership)");
            }
            #[cfg(target_os = "windows")]
            {
                eprintln!("  1. The CH341 adapter is connected via USB");
                eprintln!("  2. The WCH CH341PAR driver is installed");
                eprintln!("  3. No other application is using the adapter");
            }
            std::process::exit(1);
        }
        Err(e) => {
            eprintln!("Error initializing transport: {e}");
            std::process::exit(1);
        }
    };

    // Identity mismatch or an absent sensor is a skip, not a failure; the
    // run aborts only when no sensor verifies at all.
    for address in [ISM330DHCX_ADDRESS_LOW, ISM330DHCX_ADDRESS_HIGH] {
        match recorder.add_device(address) {
            Ok(()) => println!(
                "Added device at 0x{address:02X}; logging to sensor{}.csv",
                recorder.device_count() - 1
            ),
            Err(GyroError::InvalidDeviceId { found, .. }) => {
                eprintln!(
                    "Skipping 0x{address:02X}: WHO_AM_I returned 0x{found:02X}, expected 0x6B"
                );
            }
            Err(e @ (GyroError::Transmit { .. } | GyroError::ShortRead { .. })) => {
                eprintln!("Skipping 0x{address:02X}: {e}");
            }
            Err(e) => {
                eprintln!("Error probing 0x{address:02X}: {e}");
                std::process::exit(1);
            }
        }
    }

    if recorder.device_count() == 0 {
        eprintln!("Error: no ISM330DHCX devices verified on the bus.");
        eprintln!("Please check the sensor wiring and address straps (0x6A/0x6B).");
        std::process::exit(1);
    }

    let running = Arc::new(AtomicBool::new(true));
    let handler_flag = running.clone();
    ctrlc::set_handler(move || {
        println!("\nReceived Ctrl+C, stopping...");
        handler_flag.store(false, Ordering::SeqCst);
    })?;

    recorder.set_recording(true, args.rate);
    recorder.start(&args.output)?;

    println!();
    println!(
        "Recording {} device(s) at {} Hz, started {}",
        recorder.device_count(),
        args.rate,
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
    );
    match args.duration {
        Some(seconds) => println!("Running for {seconds} seconds (Ctrl+C stops early)\n"),
        None => println!("Press Ctrl+C to stop\n"),
    }

    let started = Instant::now();
    let mut last_status = Instant::now();
    while running.load(Ordering::SeqCst) {
        if let Some(limit) = args.duration {
            if started.elapsed() >= Duration::from_secs(limit) {
                break;
            }
        }

        if last_status.elapsed() >= Duration::from_secs(5) {
            if !recorder.status_check() {
                eprintln!("[WARNING] A registered sensor is no longer responding.");
            }
            last_status = Instant::now();
        }

        thread::sleep(Duration::from_millis(100));
    }

    recorder.stop()?;

    println!("Recording stopped after {:.1} s", started.elapsed().as_secs_f64());
    println!("Logs written to {}", args.output.display());

    Ok(())
}
