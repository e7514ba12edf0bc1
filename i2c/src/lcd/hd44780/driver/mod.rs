//! HD44780 LCD driver module.
//!
//! See [HD44780Driver] for the instruction set, and [I2cHD44780Driver] for the implementation
//! that talks to the controller through a PCF8574 I2C expander in 4-bit mode.

mod i2c;

use crate::{I2cError, I2cResult};
pub use i2c::*;
use std::fmt::Debug;
use std::thread::sleep;
use std::time::Duration;

/// Execution time of the clear display and return home instructions.
///
/// The datasheet specifies 1.52 ms at 270 kHz, with some headroom for slower oscillators.
pub const LONG_EXECUTION_TIME: Duration = Duration::from_millis(2);

pub trait HD44780Driver: Debug {
    /// Initializes the HD44780 controller with the default settings.
    fn init(&mut self, multiline: bool, alt_font: bool) -> I2cResult<()>;

    /// Clears the display and sets the cursor to the home position.
    ///
    /// Blocks for [LONG_EXECUTION_TIME] so that the next transfer isn't ignored.
    fn clear_display(&mut self) -> I2cResult<()> {
        self.send_command(0b00000001)?;
        sleep(LONG_EXECUTION_TIME);
        Ok(())
    }

    /// Sets the cursor to the home position.
    ///
    /// Blocks for [LONG_EXECUTION_TIME] so that the next transfer isn't ignored.
    fn return_home(&mut self) -> I2cResult<()> {
        self.send_command(0b00000010)?;
        sleep(LONG_EXECUTION_TIME);
        Ok(())
    }

    /// Sets the display to the specified entry mode.
    fn set_entry_mode(&mut self, cursor_direction: CursorDirection, shift: bool) -> I2cResult<()> {
        let mut command = 0b00000100;
        if cursor_direction == CursorDirection::Right {
            command |= 0b00000010;
        }
        if shift {
            command |= 0b00000001;
        }
        self.send_command(command)
    }

    /// Sets the display on/off, cursor on/off, and blinking on/off.
    fn set_display_control(
        &mut self,
        display_on: bool,
        cursor_on: bool,
        blink_on: bool,
    ) -> I2cResult<()> {
        let mut command = 0b00001000;
        if display_on {
            command |= 0b00000100;
        }
        if cursor_on {
            command |= 0b00000010;
        }
        if blink_on {
            command |= 0b00000001;
        }
        self.send_command(command)
    }

    /// Sets the function set.
    ///
    /// `data_length` selects the 8-bit interface, `two_lines` the 2-line mode and `font` the
    /// 5x10 font.
    fn function_set(&mut self, data_length: bool, two_lines: bool, font: bool) -> I2cResult<()> {
        let mut command = 0b00100000;
        if data_length {
            command |= 0b00010000;
        }
        if two_lines {
            command |= 0b00001000;
        }
        if font {
            command |= 0b00000100;
        }
        self.send_command(command)
    }

    /// Sets the DDRAM address.
    fn set_ddram_address(&mut self, address: u8) -> I2cResult<()> {
        if address > 0b01111111 {
            return Err(I2cError::InvalidArgument);
        }
        let command = 0b10000000 | address;
        self.send_command(command)
    }

    /// Turns the backlight of the module on or off, if it has one.
    ///
    /// The change takes effect with the next transfer.
    fn set_backlight(&mut self, on: bool);

    /// Clears the display and turns the backlight off, leaving it dark.
    fn shutdown(&mut self) -> I2cResult<()>;

    // Low-level commands
    // These raw commands are used by the high-level functions above.
    // They are not meant to be used directly, but implemented by the driver implementation.

    /// Sends a command to the HD44780 controller.
    /// Sets the RS pin to 0 (command).
    fn send_command(&mut self, command: u8) -> I2cResult<()>;

    /// Sends data to the HD44780 controller.
    /// Sets the RS pin to 1 (data).
    fn send_data(&mut self, data: u8) -> I2cResult<()>;
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum CursorDirection {
    /// Moves the cursor to the left after writing/reading data.
    Left,
    /// Moves the cursor to the right after writing/reading data.
    Right,
}
