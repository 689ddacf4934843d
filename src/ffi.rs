//! FFI bindings for the CH341 USB bridge driver
//!
//! Low-level bindings to the vendor CH341DLLA64 library. Based on CH341DLL.H
//! from the WCH CH341PAR package. Only the device-management and I2C entry
//! points the bridge backend needs are declared.

#![allow(non_camel_case_types)]
#![allow(dead_code)]

// Windows types (matching the vendor header)
pub type ULONG = u32;
pub type UCHAR = u8;
pub type BOOL = i32;
pub type PUCHAR = *mut u8;

pub const FALSE: BOOL = 0;
pub const TRUE: BOOL = 1;

// CH341SetStream I2C interface speed bits (mode parameter, bits 1..0)
pub const CH341_I2C_LOW_SPEED: ULONG = 0; // 20 kHz
pub const CH341_I2C_STANDARD: ULONG = 1; // 100 kHz
pub const CH341_I2C_FAST: ULONG = 2; // 400 kHz
pub const CH341_I2C_HIGH_SPEED: ULONG = 3; // 750 kHz

// External function declarations from CH341DLLA64.dll
#[link(name = "CH341DLLA64")]
extern "C" {
    /// Open the CH341 device at the given enumeration index
    pub fn CH341OpenDevice(iIndex: ULONG) -> BOOL;

    /// Close the CH341 device at the given enumeration index
    pub fn CH341CloseDevice(iIndex: ULONG);

    /// Get the driver version
    pub fn CH341GetVersion() -> ULONG;

    /// Configure the serial stream mode (I2C speed, SPI mode bits)
    pub fn CH341SetStream(iIndex: ULONG, iMode: ULONG) -> BOOL;

    /// Read `iLength` bytes from register `iAddr` of I2C device `iDevice`
    pub fn CH341ReadI2C(
        iIndex: ULONG,
        iDevice: UCHAR,
        iAddr: UCHAR,
        oBuffer: PUCHAR,
        iLength: ULONG,
    ) -> BOOL;

    /// Write `iLength` bytes to register `iAddr` of I2C device `iDevice`
    pub fn CH341WriteI2C(
        iIndex: ULONG,
        iDevice: UCHAR,
        iAddr: UCHAR,
        iBuffer: PUCHAR,
        iLength: ULONG,
    ) -> BOOL;
}
