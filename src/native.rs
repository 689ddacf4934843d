//! Native Linux I2C backend
//!
//! Frames transactions directly onto an I2C character device: an
//! address-select ioctl, then a plain read or write. The queued outbound
//! bytes are transmitted raw; unlike the bridge backend, no
//! register/payload splitting happens here.

use std::path::PathBuf;

use i2cdev::core::I2CDevice;
use i2cdev::linux::LinuxI2CDevice;

use crate::error::{GyroError, Result};
use crate::transport::{BusTransport, WireState};

/// Bus transport over `/dev/i2c-N`.
pub struct NativeBus {
    path: PathBuf,
    dev: Option<LinuxI2CDevice>,
    wire: WireState,
}

impl NativeBus {
    /// Create a transport for the given character device path.
    ///
    /// The device is not opened until [`BusTransport::open`] is called.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            dev: None,
            wire: WireState::default(),
        }
    }
}

impl BusTransport for NativeBus {
    fn open(&mut self) -> Result<()> {
        // Close first if previously open, then claim the device node. The
        // slave address is selected per transaction, so 0 is passed here.
        self.dev = None;
        let dev = LinuxI2CDevice::new(&self.path, 0).map_err(|e| {
            GyroError::TransportUnavailable(format!("{}: {}", self.path.display(), e))
        })?;
        self.dev = Some(dev);
        self.wire.reset();
        Ok(())
    }

    fn close(&mut self) {
        self.dev = None;
        self.wire.reset();
    }

    fn begin_transaction(&mut self, address: u8) {
        self.wire.begin(address);
    }

    fn queue_write(&mut self, bytes: &[u8]) {
        self.wire.queue(bytes);
    }

    fn commit_write(&mut self) -> Result<()> {
        let address = self.wire.target();
        let dev = self.dev.as_mut().ok_or_else(|| {
            GyroError::TransportUnavailable("bus is not open".to_string())
        })?;

        dev.set_slave_address(address as u16)
            .map_err(|e| GyroError::Transmit {
                address,
                detail: e.to_string(),
            })?;

        dev.write(self.wire.tx()).map_err(|e| GyroError::Transmit {
            address,
            detail: e.to_string(),
        })?;

        Ok(())
    }

    fn request_read(&mut self, address: u8, count: usize) -> usize {
        let Some(dev) = self.dev.as_mut() else {
            return 0;
        };
        if dev.set_slave_address(address as u16).is_err() {
            return 0;
        }

        let mut buf = vec![0u8; count];
        match dev.read(&mut buf) {
            Ok(()) => {
                self.wire.fill_rx(&buf);
                count
            }
            Err(_) => 0,
        }
    }

    fn read_byte(&mut self) -> u8 {
        self.wire.pop()
    }

    fn available(&self) -> usize {
        self.wire.available()
    }
}
