//! ISM330DHCX gyroscope driver over a shared bus transport

use crate::error::{GyroError, Result};
use crate::transport::{lock_unpoisoned, SharedBus};

/// I2C address with the SDO/SA0 pad soldered low
pub const ISM330DHCX_ADDRESS_LOW: u8 = 0x6A;
/// Default I2C address (SDO/SA0 high)
pub const ISM330DHCX_ADDRESS_HIGH: u8 = 0x6B;

// ISM330DHCX register addresses
const REG_WHO_AM_I: u8 = 0x0F;
const REG_CTRL2_G: u8 = 0x11; // Gyro data rate and full scale
const REG_CTRL3_C: u8 = 0x12; // Block data update, address auto-increment
const REG_CTRL4_C: u8 = 0x13; // LPF1 path enable
const REG_CTRL6_C: u8 = 0x15; // LPF1 bandwidth selection
const REG_STATUS: u8 = 0x1E;
const REG_OUTX_L_G: u8 = 0x22; // First of six gyro output bytes

// Expected WHO_AM_I value
const WHO_AM_I_VALUE: u8 = 0x6B;

// STATUS_REG: gyro data available
const STATUS_GYRO_DRDY: u8 = 0x02;

// CTRL2_G: 6.66 kHz output data rate, 250 dps full scale
const CTRL2_G_ODR_6667HZ_FS_250DPS: u8 = 0xA0;
// CTRL3_C: block data update + register address auto-increment
const CTRL3_C_BDU_IF_INC: u8 = 0x44;
// CTRL4_C: route the gyro through the LPF1 filter
const CTRL4_C_LPF1_SEL_G: u8 = 0x02;
// CTRL6_C: medium LPF1 bandwidth
const CTRL6_C_FTYPE_MEDIUM: u8 = 0x01;

// 8.75 mdps per LSB at 250 dps full scale
const GYRO_SENSITIVITY_MDPS: f32 = 8.75;

/// One gyroscope reading, raw 16-bit axis values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GyroSample {
    pub x: i16,
    pub y: i16,
    pub z: i16,
}

impl GyroSample {
    /// Convert all three axes to milli-degrees per second.
    pub fn to_mdps(&self) -> (f32, f32, f32) {
        (self.x_mdps(), self.y_mdps(), self.z_mdps())
    }

    /// X-axis rate in milli-degrees per second
    pub fn x_mdps(&self) -> f32 {
        self.x as f32 * GYRO_SENSITIVITY_MDPS
    }

    /// Y-axis rate in milli-degrees per second
    pub fn y_mdps(&self) -> f32 {
        self.y as f32 * GYRO_SENSITIVITY_MDPS
    }

    /// Z-axis rate in milli-degrees per second
    pub fn z_mdps(&self) -> f32 {
        self.z as f32 * GYRO_SENSITIVITY_MDPS
    }
}

/// A sensor endpoint bound to one bus address.
///
/// The recorder schedules any implementation of this contract; a device is
/// admitted only after `verify_identity` succeeds.
pub trait GyroDevice: Send + Sync {
    /// 7-bit bus address of the device
    fn address(&self) -> u8;

    /// Read the identity register and compare against the expected constant.
    ///
    /// Gates admission into the recorder's device list; on mismatch the
    /// caller decides whether to abort or continue without the device.
    fn verify_identity(&self) -> Result<()>;

    /// Apply the fixed operating parameters. Idempotent; called once at
    /// registration.
    fn configure(&self) -> Result<()>;

    /// Non-blocking check whether a fresh sample is available.
    fn is_data_ready(&self) -> bool;

    /// Read one sample. Only meaningful after `is_data_ready` returned true.
    fn read_sample(&self) -> Result<GyroSample>;

    /// Liveness probe, usable for health checks outside the sampling path.
    fn is_connected(&self) -> bool;
}

/// ISM330DHCX gyroscope on a shared bus transport.
pub struct Ism330Dhcx {
    bus: SharedBus,
    address: u8,
}

impl Ism330Dhcx {
    /// Bind a driver to `address` on the shared bus.
    ///
    /// No bus traffic happens here; identity verification and configuration
    /// run when the device is registered with the recorder.
    pub fn new(bus: SharedBus, address: u8) -> Self {
        Self { bus, address }
    }

    /// Read the WHO_AM_I register.
    pub fn who_am_i(&self) -> Result<u8> {
        self.read_register(REG_WHO_AM_I)
    }

    /// Write a single byte to a register
    fn write_register(&self, reg: u8, value: u8) -> Result<()> {
        let mut bus = lock_unpoisoned(&self.bus);
        bus.begin_transaction(self.address);
        bus.queue_write(&[reg, value]);
        bus.commit_write()
    }

    /// Read a single byte from a register
    fn read_register(&self, reg: u8) -> Result<u8> {
        let mut value = [0u8];
        self.read_registers(reg, &mut value)?;
        Ok(value[0])
    }

    /// Read consecutive registers in one write-then-read transaction
    fn read_registers(&self, reg: u8, buf: &mut [u8]) -> Result<()> {
        let mut bus = lock_unpoisoned(&self.bus);

        // Point at the starting register, then read; the device
        // auto-increments across the block.
        bus.begin_transaction(self.address);
        bus.queue_write(&[reg]);
        bus.commit_write()?;

        let received = bus.request_read(self.address, buf.len());
        if received < buf.len() {
            return Err(GyroError::ShortRead {
                address: self.address,
                expected: buf.len(),
                actual: received,
            });
        }

        for byte in buf.iter_mut() {
            *byte = bus.read_byte();
        }
        Ok(())
    }
}

impl GyroDevice for Ism330Dhcx {
    fn address(&self) -> u8 {
        self.address
    }

    fn verify_identity(&self) -> Result<()> {
        let found = self.who_am_i()?;
        if found != WHO_AM_I_VALUE {
            return Err(GyroError::InvalidDeviceId {
                address: self.address,
                found,
            });
        }
        Ok(())
    }

    fn configure(&self) -> Result<()> {
        self.write_register(REG_CTRL3_C, CTRL3_C_BDU_IF_INC)?;
        self.write_register(REG_CTRL2_G, CTRL2_G_ODR_6667HZ_FS_250DPS)?;
        self.write_register(REG_CTRL4_C, CTRL4_C_LPF1_SEL_G)?;
        self.write_register(REG_CTRL6_C, CTRL6_C_FTYPE_MEDIUM)?;
        Ok(())
    }

    fn is_data_ready(&self) -> bool {
        self.read_register(REG_STATUS)
            .map(|status| status & STATUS_GYRO_DRDY != 0)
            .unwrap_or(false)
    }

    fn read_sample(&self) -> Result<GyroSample> {
        let mut raw = [0u8; 6];
        self.read_registers(REG_OUTX_L_G, &mut raw)?;

        Ok(GyroSample {
            x: i16::from_le_bytes([raw[0], raw[1]]),
            y: i16::from_le_bytes([raw[2], raw[3]]),
            z: i16::from_le_bytes([raw[4], raw[5]]),
        })
    }

    fn is_connected(&self) -> bool {
        self.who_am_i().map(|v| v == WHO_AM_I_VALUE).unwrap_or(false)
    }
}
