//! Multi-device ISM330DHCX gyroscope logger
//!
//! This library samples one or more ISM330DHCX inertial sensors over I2C at
//! a bounded rate and appends timestamped readings to per-device CSV logs.
//! The same transaction contract is served by two backends, selected at
//! build time: the native Linux I2C character device, and the CH341
//! USB-to-I2C bridge reached through its vendor driver on Windows.
//!
//! # Quick Start
//!
//! ## Recording two sensors
//! ```no_run
//! use ism330_gyro_logger::{
//!     shared, GyroRecorder, NativeBus, ISM330DHCX_ADDRESS_HIGH, ISM330DHCX_ADDRESS_LOW,
//! };
//!
//! let bus = shared(NativeBus::new("/dev/i2c-16"));
//! let mut recorder = GyroRecorder::new(bus)?;
//!
//! // Soldered and default addresses; identity-checked before admission.
//! recorder.add_device(ISM330DHCX_ADDRESS_LOW)?;
//! recorder.add_device(ISM330DHCX_ADDRESS_HIGH)?;
//!
//! recorder.set_recording(true, 100); // 100 Hz per device
//! recorder.start("gyro_logs")?;
//!
//! std::thread::sleep(std::time::Duration::from_secs(60));
//! recorder.stop()?;
//! # Ok::<(), ism330_gyro_logger::GyroError>(())
//! ```
//!
//! ## Talking to a device directly
//! ```no_run
//! use ism330_gyro_logger::{shared, GyroDevice, Ism330Dhcx, NativeBus, ISM330DHCX_ADDRESS_LOW};
//!
//! let bus = shared(NativeBus::new("/dev/i2c-16"));
//! let gyro = Ism330Dhcx::new(bus, ISM330DHCX_ADDRESS_LOW);
//!
//! gyro.verify_identity()?;
//! gyro.configure()?;
//! if gyro.is_data_ready() {
//!     let (x, y, z) = gyro.read_sample()?.to_mdps();
//!     println!("gyro: {x:.1} / {y:.1} / {z:.1} mdps");
//! }
//! # Ok::<(), ism330_gyro_logger::GyroError>(())
//! ```

pub mod bridge;
pub mod csv_log;
pub mod error;
#[cfg(target_os = "windows")]
mod ffi;
pub mod ism330dhcx;
#[cfg(target_os = "linux")]
pub mod native;
pub mod recorder;
pub mod transport;

// Re-export public API
pub use bridge::{BridgeBus, BridgePort};
#[cfg(target_os = "windows")]
pub use bridge::{Ch341Bus, Ch341Port};
pub use csv_log::SampleLog;
pub use error::{GyroError, Result};
pub use ism330dhcx::{
    GyroDevice, GyroSample, Ism330Dhcx, ISM330DHCX_ADDRESS_HIGH, ISM330DHCX_ADDRESS_LOW,
};
#[cfg(target_os = "linux")]
pub use native::NativeBus;
pub use recorder::GyroRecorder;
pub use transport::{shared, BusTransport, SharedBus, EMPTY_READ};
