pub mod lcd;
pub mod linux;
pub mod sim;

use std::fmt::Debug;
use thiserror::Error;

#[derive(Debug, Error, Eq, PartialEq, Clone)]
pub enum I2cError {
    #[error("invalid argument")]
    InvalidArgument,
    #[error("no device responded at address {0:#04x}")]
    NoDevice(u8),
    #[error("IO error: {0}")]
    Io(std::io::ErrorKind),
    #[error("bus error: {0}")]
    Bus(String),
}

impl From<std::io::Error> for I2cError {
    fn from(err: std::io::Error) -> Self {
        I2cError::Io(err.kind())
    }
}

pub type I2cResult<T> = Result<T, I2cError>;

/// Byte-oriented access to an I2C bus.
///
/// Only the two SMBus primitives needed to drive a parallel-port expander are exposed: sending a
/// single byte to a device and receiving a single byte from it. The latter is mostly useful as a
/// presence probe.
pub trait I2cBus: Debug {
    /// Sends one byte to the device at the 7-bit `address`.
    fn write_byte(&mut self, address: u8, byte: u8) -> I2cResult<()>;

    /// Receives one byte from the device at the 7-bit `address`.
    ///
    /// # Errors
    /// Fails if nothing acknowledges the address.
    fn read_byte(&mut self, address: u8) -> I2cResult<u8>;
}

impl<B: I2cBus + ?Sized> I2cBus for Box<B> {
    fn write_byte(&mut self, address: u8, byte: u8) -> I2cResult<()> {
        (**self).write_byte(address, byte)
    }

    fn read_byte(&mut self, address: u8) -> I2cResult<u8> {
        (**self).read_byte(address)
    }
}

/// Checks that `address` fits into 7 bits.
pub(crate) fn check_address(address: u8) -> I2cResult<()> {
    if address > 0x7F {
        return Err(I2cError::InvalidArgument);
    }
    Ok(())
}
