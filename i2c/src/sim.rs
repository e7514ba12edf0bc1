//! An in-memory I2C bus with an HD44780 behind a PCF8574 attached to it.
//!
//! The model latches the expander's upper nibble on every falling edge of the enable line, exactly
//! like the real controller does, so anything written through it can be read back as DDRAM
//! contents. It only understands the subset of the instruction set the drivers in this crate use.
//!
//! Handles are cheap to clone and share the same state, so a test can keep one while a driver owns
//! the other.
use crate::{I2cBus, I2cError, I2cResult};
use std::cell::RefCell;
use std::rc::Rc;

const ENABLE: u8 = 0b0000_0100;
const REGISTER_SELECT: u8 = 0b0000_0001;
const BACKLIGHT: u8 = 0b0000_1000;

const DDRAM_SIZE: usize = 0x80;

/// A single transfer decoded by the simulated controller.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum LcdEvent {
    Command(u8),
    Data(u8),
}

#[derive(Debug)]
struct SimState {
    address: u8,
    present: bool,
    unplug_after: Option<usize>,
    port: u8,
    writes: Vec<u8>,
    four_bit: bool,
    pending_nibble: Option<u8>,
    events: Vec<LcdEvent>,
    ddram: [u8; DDRAM_SIZE],
    address_counter: u8,
}

impl SimState {
    fn unplug(&mut self) {
        // Losing power resets the controller to 8-bit mode.
        self.present = false;
        self.unplug_after = None;
        self.four_bit = false;
        self.pending_nibble = None;
        self.port = 0;
    }

    fn latch(&mut self, port: u8) {
        let nibble = port >> 4;
        let data = port & REGISTER_SELECT != 0;

        if !self.four_bit {
            // In 8-bit mode only D7..D4 are wired, the lower half reads as zero.
            self.execute(nibble << 4, data);
            return;
        }

        match self.pending_nibble.take() {
            Some(high) => self.execute((high << 4) | nibble, data),
            None => self.pending_nibble = Some(nibble),
        }
    }

    fn execute(&mut self, byte: u8, data: bool) {
        if data {
            self.events.push(LcdEvent::Data(byte));
            self.ddram[self.address_counter as usize] = byte;
            self.address_counter = (self.address_counter + 1) % DDRAM_SIZE as u8;
            return;
        }

        self.events.push(LcdEvent::Command(byte));
        match byte.leading_zeros() {
            // Set DDRAM address
            0 => self.address_counter = byte & 0x7F,
            // Function set
            2 => {
                self.four_bit = byte & 0b0001_0000 == 0;
                self.pending_nibble = None;
            }
            // Return home
            6 => self.address_counter = 0,
            // Clear display
            7 => {
                self.ddram = [b' '; DDRAM_SIZE];
                self.address_counter = 0;
            }
            _ => {}
        }
    }
}

#[derive(Debug, Clone)]
pub struct SimulatedBus {
    state: Rc<RefCell<SimState>>,
}

impl SimulatedBus {
    /// Creates a bus with a display answering at `address`.
    pub fn new(address: u8) -> Self {
        SimulatedBus {
            state: Rc::new(RefCell::new(SimState {
                address,
                present: true,
                unplug_after: None,
                port: 0,
                writes: Vec::new(),
                four_bit: false,
                pending_nibble: None,
                events: Vec::new(),
                ddram: [b' '; DDRAM_SIZE],
                address_counter: 0,
            })),
        }
    }

    /// Plugs or unplugs the simulated display. An unplugged display fails every transfer.
    pub fn set_present(&self, present: bool) {
        let mut state = self.state.borrow_mut();
        if present {
            state.present = true;
        } else {
            state.unplug();
        }
    }

    /// Unplugs the display once `writes` more bytes have been written to it.
    pub fn unplug_after(&self, writes: usize) {
        self.state.borrow_mut().unplug_after = Some(writes);
    }

    pub fn is_present(&self) -> bool {
        self.state.borrow().present
    }

    /// Every byte written to the expander, in order.
    pub fn writes(&self) -> Vec<u8> {
        self.state.borrow().writes.clone()
    }

    /// Every instruction and data byte latched by the controller, in order.
    pub fn events(&self) -> Vec<LcdEvent> {
        self.state.borrow().events.clone()
    }

    pub fn clear_log(&self) {
        let mut state = self.state.borrow_mut();
        state.writes.clear();
        state.events.clear();
    }

    pub fn is_four_bit(&self) -> bool {
        self.state.borrow().four_bit
    }

    /// Whether the backlight bit is set on the expander's outputs right now.
    pub fn backlight(&self) -> bool {
        self.state.borrow().port & BACKLIGHT != 0
    }

    pub fn address_counter(&self) -> u8 {
        self.state.borrow().address_counter
    }

    /// Reads `len` characters of DDRAM starting at `address`.
    pub fn ddram_text(&self, address: u8, len: usize) -> String {
        let state = self.state.borrow();
        (0..len)
            .map(|i| state.ddram[(address as usize + i) % DDRAM_SIZE] as char)
            .collect()
    }
}

impl I2cBus for SimulatedBus {
    fn write_byte(&mut self, address: u8, byte: u8) -> I2cResult<()> {
        let mut state = self.state.borrow_mut();
        if !state.present || state.address != address {
            return Err(I2cError::NoDevice(address));
        }
        let remaining = state.unplug_after;
        match remaining {
            Some(0) => {
                state.unplug();
                return Err(I2cError::NoDevice(address));
            }
            Some(n) => state.unplug_after = Some(n - 1),
            None => {}
        }

        state.writes.push(byte);
        let previous = state.port;
        state.port = byte;
        if previous & ENABLE != 0 && byte & ENABLE == 0 {
            state.latch(previous);
        }
        Ok(())
    }

    fn read_byte(&mut self, address: u8) -> I2cResult<u8> {
        let state = self.state.borrow();
        if !state.present || state.address != address {
            return Err(I2cError::NoDevice(address));
        }
        Ok(state.port)
    }
}
