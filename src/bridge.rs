//! USB bridge-chip backend
//!
//! The bridge chip does not expose raw byte transfers; every bus operation
//! is a (device, register, buffer) command. `BridgeBus` maps the transaction
//! contract onto that protocol: the first queued byte of a write is the
//! register address and the rest is the payload. A single-byte write latches
//! the register pointer for a subsequent read and performs NO bus write.
//! This asymmetry is the bridge's command protocol and is load-bearing for
//! every register read.

use crate::error::{GyroError, Result};
use crate::transport::{BusTransport, WireState};

/// Byte-transfer primitive of a USB-to-I2C bridge session.
///
/// Implemented by the CH341 vendor driver on Windows; tests substitute an
/// in-memory port.
pub trait BridgePort {
    /// Claim the bridge session.
    fn open(&mut self) -> Result<()>;

    /// Release the bridge session.
    fn close(&mut self);

    /// Write `payload` to `reg` on `device`. Returns false on rejection.
    fn write_reg(&mut self, device: u8, reg: u8, payload: &[u8]) -> bool;

    /// Fill `buf` starting at `reg` on `device`. Returns false on failure.
    fn read_reg(&mut self, device: u8, reg: u8, buf: &mut [u8]) -> bool;
}

/// Bus transport over a bridge-chip command port.
pub struct BridgeBus<P: BridgePort> {
    port: P,
    wire: WireState,
    latched_reg: u8,
    open: bool,
}

impl<P: BridgePort> BridgeBus<P> {
    pub fn new(port: P) -> Self {
        Self {
            port,
            wire: WireState::default(),
            latched_reg: 0,
            open: false,
        }
    }
}

impl<P: BridgePort> BusTransport for BridgeBus<P> {
    fn open(&mut self) -> Result<()> {
        self.port.open()?;
        self.open = true;
        self.wire.reset();
        Ok(())
    }

    fn close(&mut self) {
        if self.open {
            self.port.close();
            self.open = false;
        }
        self.wire.reset();
    }

    fn begin_transaction(&mut self, address: u8) {
        self.wire.begin(address);
    }

    fn queue_write(&mut self, bytes: &[u8]) {
        self.wire.queue(bytes);
    }

    fn commit_write(&mut self) -> Result<()> {
        if !self.open {
            return Err(GyroError::TransportUnavailable(
                "bridge is not open".to_string(),
            ));
        }

        let address = self.wire.target();
        let tx = self.wire.tx();
        match tx.len() {
            0 => Ok(()),
            // A lone byte is a register pointer for the next read, not a
            // bus write.
            1 => {
                self.latched_reg = tx[0];
                Ok(())
            }
            _ => {
                let reg = tx[0];
                let payload = &tx[1..];
                if self.port.write_reg(address, reg, payload) {
                    Ok(())
                } else {
                    Err(GyroError::Transmit {
                        address,
                        detail: "bridge rejected the write".to_string(),
                    })
                }
            }
        }
    }

    fn request_read(&mut self, address: u8, count: usize) -> usize {
        if !self.open {
            return 0;
        }

        let mut buf = vec![0u8; count];
        if self.port.read_reg(address, self.latched_reg, &mut buf) {
            self.wire.fill_rx(&buf);
            count
        } else {
            0
        }
    }

    fn read_byte(&mut self) -> u8 {
        self.wire.pop()
    }

    fn available(&self) -> usize {
        self.wire.available()
    }
}

/// CH341 adapter session reached through the vendor DLL.
#[cfg(target_os = "windows")]
pub struct Ch341Port {
    index: u32,
    open: bool,
}

#[cfg(target_os = "windows")]
impl Ch341Port {
    /// Bind to the CH341 adapter at `index` (usually 0).
    pub fn new(index: u32) -> Self {
        Self { index, open: false }
    }
}

#[cfg(target_os = "windows")]
impl BridgePort for Ch341Port {
    fn open(&mut self) -> Result<()> {
        use crate::ffi::*;

        unsafe {
            if CH341OpenDevice(self.index as ULONG) == FALSE {
                return Err(GyroError::TransportUnavailable(format!(
                    "CH341 adapter {} could not be opened",
                    self.index
                )));
            }
            if CH341SetStream(self.index as ULONG, CH341_I2C_STANDARD) == FALSE {
                CH341CloseDevice(self.index as ULONG);
                return Err(GyroError::TransportUnavailable(
                    "CH341 adapter rejected I2C stream mode".to_string(),
                ));
            }
        }

        self.open = true;
        Ok(())
    }

    fn close(&mut self) {
        if self.open {
            unsafe {
                crate::ffi::CH341CloseDevice(self.index as crate::ffi::ULONG);
            }
            self.open = false;
        }
    }

    fn write_reg(&mut self, device: u8, reg: u8, payload: &[u8]) -> bool {
        use crate::ffi::*;

        unsafe {
            CH341WriteI2C(
                self.index as ULONG,
                device,
                reg,
                payload.as_ptr() as *mut UCHAR,
                payload.len() as ULONG,
            ) != FALSE
        }
    }

    fn read_reg(&mut self, device: u8, reg: u8, buf: &mut [u8]) -> bool {
        use crate::ffi::*;

        unsafe {
            CH341ReadI2C(
                self.index as ULONG,
                device,
                reg,
                buf.as_mut_ptr(),
                buf.len() as ULONG,
            ) != FALSE
        }
    }
}

/// The bridge transport used in the reference Windows deployment.
#[cfg(target_os = "windows")]
pub type Ch341Bus = BridgeBus<Ch341Port>;
