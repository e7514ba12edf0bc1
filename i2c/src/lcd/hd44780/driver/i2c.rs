use crate::lcd::hd44780::driver::{CursorDirection, HD44780Driver, LONG_EXECUTION_TIME};
use crate::{check_address, I2cBus, I2cResult};
use log::{debug, trace};
use std::thread::sleep;
use std::time::Duration;

// PCF8574 backpack wiring: P0 = RS, P1 = RW, P2 = E, P3 = backlight, P4..P7 = D4..D7.
const REGISTER_SELECT: u8 = 0b0000_0001;
const ENABLE: u8 = 0b0000_0100;
const BACKLIGHT: u8 = 0b0000_1000;

/// Delay between presenting a nibble and raising E.
pub const ENABLE_SETUP: Duration = Duration::from_micros(500);
/// How long E is held high. The controller needs at least 450 ns.
pub const ENABLE_PULSE: Duration = Duration::from_micros(500);
/// Delay after E falls before the next transfer.
pub const ENABLE_SETTLE: Duration = Duration::from_micros(500);

/// HD44780 driver for modules with a PCF8574 I2C backpack, always using the 4-bit interface.
///
/// Every byte is split into two nibbles, each presented on D7..D4 together with the RS and
/// backlight bits and latched with an enable pulse. The RW line is never driven, so nothing can be
/// read back from the controller.
#[derive(Debug)]
pub struct I2cHD44780Driver<B: I2cBus> {
    bus: B,
    address: u8,
    backlight: bool,
}

impl<B: I2cBus> I2cHD44780Driver<B> {
    pub fn new(bus: B, address: u8) -> I2cResult<Self> {
        check_address(address)?;
        Ok(I2cHD44780Driver {
            bus,
            address,
            backlight: true,
        })
    }

    pub fn address(&self) -> u8 {
        self.address
    }

    pub fn backlight(&self) -> bool {
        self.backlight
    }

    /// Checks whether anything answers at the display's address.
    pub fn probe(&mut self) -> I2cResult<()> {
        self.bus.read_byte(self.address)?;
        Ok(())
    }

    fn pulse_enable(&mut self, bits: u8) -> I2cResult<()> {
        sleep(ENABLE_SETUP);
        self.bus.write_byte(self.address, bits | ENABLE)?;
        sleep(ENABLE_PULSE);
        self.bus.write_byte(self.address, bits & !ENABLE)?;
        sleep(ENABLE_SETTLE);
        Ok(())
    }

    fn write_nibble(&mut self, bits: u8) -> I2cResult<()> {
        self.bus.write_byte(self.address, bits)?;
        self.pulse_enable(bits)
    }

    fn transfer(&mut self, data: u8, rs: bool, backlight: bool) -> I2cResult<()> {
        trace!("Sending data: {:08b}, RS: {}, BL: {}", data, rs, backlight);

        let mut flags = 0;
        if rs {
            flags |= REGISTER_SELECT;
        }
        if backlight {
            flags |= BACKLIGHT;
        }

        self.write_nibble((data & 0xF0) | flags)?;
        self.write_nibble(((data << 4) & 0xF0) | flags)?;
        Ok(())
    }

    fn send(&mut self, data: u8, rs: bool) -> I2cResult<()> {
        self.transfer(data, rs, self.backlight)
    }
}

impl<B: I2cBus> HD44780Driver for I2cHD44780Driver<B> {
    fn init(&mut self, multiline: bool, alt_font: bool) -> I2cResult<()> {
        debug!("Initializing HD44780 at {:#04x}", self.address);

        // Synchronize. The controller might be in 8-bit mode or halfway through a 4-bit transfer,
        // these nibbles (3, 3, 3, 2) get it into 4-bit mode from any of those states.
        self.send(0b00110011, false)?;
        self.send(0b00110010, false)?;

        self.function_set(false, multiline, alt_font)?;
        self.set_entry_mode(CursorDirection::Right, false)?;
        self.set_display_control(true, false, false)?;
        self.clear_display()?;
        Ok(())
    }

    fn set_backlight(&mut self, on: bool) {
        self.backlight = on;
    }

    fn shutdown(&mut self) -> I2cResult<()> {
        self.clear_display()?;

        // The backlight only follows the expander's outputs, so it has to be dropped from the
        // bytes themselves. Another clear is the harmless instruction to carry it.
        self.backlight = false;
        self.transfer(0b00000001, false, false)?;
        sleep(LONG_EXECUTION_TIME);
        Ok(())
    }

    fn send_command(&mut self, command: u8) -> I2cResult<()> {
        self.send(command, false)
    }

    fn send_data(&mut self, data: u8) -> I2cResult<()> {
        self.send(data, true)
    }
}
