//! [I2cBus] implementation on top of the Linux `i2c-dev` interface.
use crate::{check_address, I2cBus, I2cError, I2cResult};
use linux_embedded_hal::i2cdev::core::I2CDevice;
use linux_embedded_hal::i2cdev::linux::{LinuxI2CDevice, LinuxI2CError};
use log::{debug, trace};
use std::fmt::{Debug, Formatter};
use std::path::{Path, PathBuf};

/// An I2C adapter exposed as a character device, like `/dev/i2c-1`.
///
/// The kernel binds a file descriptor to a single slave address, so the handle for the last used
/// address is cached and only reopened when another address is targeted.
pub struct LinuxI2cBus {
    path: PathBuf,
    device: Option<(u8, LinuxI2CDevice)>,
}

impl LinuxI2cBus {
    pub fn new(path: impl AsRef<Path>) -> Self {
        LinuxI2cBus {
            path: path.as_ref().to_path_buf(),
            device: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn device(&mut self, address: u8) -> I2cResult<&mut LinuxI2CDevice> {
        check_address(address)?;

        let cached = matches!(&self.device, Some((a, _)) if *a == address);
        if !cached {
            debug!("Opening {} for address {:#04x}", self.path.display(), address);
            let device = LinuxI2CDevice::new(&self.path, address as u16)?;
            self.device = Some((address, device));
        }

        match &mut self.device {
            Some((_, device)) => Ok(device),
            None => Err(I2cError::NoDevice(address)),
        }
    }
}

impl Debug for LinuxI2cBus {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "LinuxI2cBus({})", self.path.display())
    }
}

impl From<LinuxI2CError> for I2cError {
    fn from(err: LinuxI2CError) -> Self {
        I2cError::Bus(err.to_string())
    }
}

impl I2cBus for LinuxI2cBus {
    fn write_byte(&mut self, address: u8, byte: u8) -> I2cResult<()> {
        trace!("i2c {:#04x} <- {:08b}", address, byte);
        self.device(address)?.smbus_write_byte(byte)?;
        Ok(())
    }

    fn read_byte(&mut self, address: u8) -> I2cResult<u8> {
        let byte = self.device(address)?.smbus_read_byte()?;
        trace!("i2c {:#04x} -> {:08b}", address, byte);
        Ok(byte)
    }
}
