//! HD44780 character LCD support.
//!
//! [driver] holds the controller's instruction set and the transfer implementation for displays
//! wired through a PCF8574 I2C backpack, [display] builds line and cursor handling on top of it.

pub mod driver;
pub mod display;

pub use display::*;
