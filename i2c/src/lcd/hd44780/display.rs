//! Line and cursor handling on top of an [HD44780Driver].
use crate::lcd::hd44780::driver::HD44780Driver;
use crate::I2cResult;
use log::warn;

/// Physical layout of a character display.
///
/// The controller's DDRAM is not laid out linearly: on 4-line modules the third line continues
/// the first one and the fourth continues the second. `line_addresses` maps every visible line to
/// the DDRAM address of its first character.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct DisplayGeometry {
    pub width: u8,
    pub line_addresses: &'static [u8],
}

impl DisplayGeometry {
    pub const fn lcd_16x2() -> Self {
        DisplayGeometry {
            width: 16,
            line_addresses: &[0x00, 0x40],
        }
    }

    pub const fn lcd_20x4() -> Self {
        DisplayGeometry {
            width: 20,
            line_addresses: &[0x00, 0x40, 0x14, 0x54],
        }
    }

    /// Looks up a preset by its size, e.g. `(20, 4)`.
    pub fn from_size(width: u8, lines: u8) -> Option<Self> {
        match (width, lines) {
            (16, 2) => Some(Self::lcd_16x2()),
            (20, 4) => Some(Self::lcd_20x4()),
            _ => None,
        }
    }

    pub fn lines(&self) -> usize {
        self.line_addresses.len()
    }

    /// Gets the DDRAM address of the given cell. Columns past the width wrap around.
    ///
    /// # Panics
    /// If `row` is not a line of this display.
    pub fn ddram_address(&self, column: usize, row: usize) -> u8 {
        let column = (column % self.width as usize) as u8;
        self.line_addresses[row] + column
    }
}

/// A character display: a controller plus the geometry of the glass in front of it.
///
/// [Self::initialize] has to be called once before anything else; nothing checks that.
#[derive(Debug)]
pub struct CharacterDisplay<D: HD44780Driver> {
    driver: D,
    geometry: DisplayGeometry,
}

impl<D: HD44780Driver> CharacterDisplay<D> {
    pub fn new(driver: D, geometry: DisplayGeometry) -> Self {
        CharacterDisplay { driver, geometry }
    }

    pub fn geometry(&self) -> DisplayGeometry {
        self.geometry
    }

    pub fn driver(&self) -> &D {
        &self.driver
    }

    pub fn driver_mut(&mut self) -> &mut D {
        &mut self.driver
    }

    /// Runs the controller's power-on sequence and clears the display.
    pub fn initialize(&mut self) -> I2cResult<()> {
        self.driver.init(self.geometry.lines() > 1, false)
    }

    /// Replaces the whole `row` with `text`.
    ///
    /// The text is cut at the display width or padded with spaces up to it, so whatever was on
    /// the line before is always overwritten.
    ///
    /// # Panics
    /// If `row` is not a line of this display.
    pub fn write_line(&mut self, text: &str, row: usize) -> I2cResult<()> {
        let width = self.geometry.width as usize;
        self.driver.set_ddram_address(self.geometry.line_addresses[row])?;

        let padded = text.chars().chain(std::iter::repeat(' ')).take(width);
        for c in padded {
            self.send_char(c)?;
        }
        Ok(())
    }

    /// Moves the cursor to the given cell. Columns past the width wrap around.
    ///
    /// # Panics
    /// If `row` is not a line of this display.
    pub fn set_cursor(&mut self, column: usize, row: usize) -> I2cResult<()> {
        let address = self.geometry.ddram_address(column, row);
        self.driver.set_ddram_address(address)
    }

    /// Writes `text` at the cursor, as is.
    pub fn write_text(&mut self, text: &str) -> I2cResult<()> {
        for c in text.chars() {
            self.send_char(c)?;
        }
        Ok(())
    }

    pub fn clear(&mut self) -> I2cResult<()> {
        self.driver.clear_display()
    }

    pub fn home(&mut self) -> I2cResult<()> {
        self.driver.return_home()
    }

    /// Clears the display and switches the backlight off.
    pub fn shutdown(&mut self) -> I2cResult<()> {
        self.driver.shutdown()
    }

    fn send_char(&mut self, c: char) -> I2cResult<()> {
        if c.is_ascii() {
            self.driver.send_data(c as u8)
        } else {
            warn!("Non-ASCII character: {}", c);
            self.driver.send_data(b'?')
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lcd::hd44780::driver::I2cHD44780Driver;
    use crate::sim::{LcdEvent, SimulatedBus};

    const ADDRESS: u8 = 0x27;

    type SimDisplay = CharacterDisplay<I2cHD44780Driver<SimulatedBus>>;

    fn display(geometry: DisplayGeometry) -> (SimulatedBus, SimDisplay) {
        let bus = SimulatedBus::new(ADDRESS);
        let driver = I2cHD44780Driver::new(bus.clone(), ADDRESS).unwrap();
        let mut display = CharacterDisplay::new(driver, geometry);
        display.initialize().unwrap();
        bus.clear_log();
        (bus, display)
    }

    #[test]
    fn ddram_addresses() {
        let geometry = DisplayGeometry::lcd_20x4();
        assert_eq!(geometry.ddram_address(0, 0), 0x00);
        assert_eq!(geometry.ddram_address(3, 1), 0x43);
        assert_eq!(geometry.ddram_address(0, 2), 0x14);
        assert_eq!(geometry.ddram_address(19, 3), 0x67);
        assert_eq!(geometry.ddram_address(25, 2), 0x19);
    }

    #[test]
    fn presets_by_size() {
        assert_eq!(DisplayGeometry::from_size(16, 2), Some(DisplayGeometry::lcd_16x2()));
        assert_eq!(DisplayGeometry::from_size(20, 4), Some(DisplayGeometry::lcd_20x4()));
        assert_eq!(DisplayGeometry::from_size(40, 2), None);
    }

    #[test]
    fn write_line_pads_every_row() {
        let geometry = DisplayGeometry::lcd_20x4();
        let (bus, mut display) = display(geometry);

        for (row, text) in ["RPiSpy         <", "I2C LCD", "", "exactly twenty chars"]
            .iter()
            .enumerate()
        {
            display.write_line(text, row).unwrap();
            let expected = format!("{:<20}", text);
            assert_eq!(bus.ddram_text(geometry.line_addresses[row], 20), expected);
        }
    }

    #[test]
    fn write_line_overwrites_previous_content() {
        let (bus, mut display) = display(DisplayGeometry::lcd_16x2());
        display.write_line("a rather long line", 1).unwrap();
        assert_eq!(bus.ddram_text(0x40, 16), "a rather long li");

        display.write_line("short", 1).unwrap();
        assert_eq!(bus.ddram_text(0x40, 16), "short           ");
        // Nothing spills past the visible width.
        assert_eq!(bus.ddram_text(0x50, 2), "  ");
    }

    #[test]
    fn set_cursor_wraps_columns() {
        let (bus, mut display) = display(DisplayGeometry::lcd_20x4());

        display.set_cursor(20, 0).unwrap();
        let wrapped = bus.events();
        bus.clear_log();
        display.set_cursor(0, 0).unwrap();
        assert_eq!(bus.events(), wrapped);
        assert_eq!(wrapped, vec![LcdEvent::Command(0x80)]);

        display.set_cursor(42, 3).unwrap();
        assert_eq!(bus.address_counter(), 0x56);
    }

    #[test]
    #[should_panic]
    fn set_cursor_row_out_of_range() {
        let (_bus, mut display) = display(DisplayGeometry::lcd_16x2());
        let _ = display.set_cursor(0, 2);
    }

    #[test]
    fn write_text_updates_mid_line() {
        let (bus, mut display) = display(DisplayGeometry::lcd_20x4());
        display.write_line("Temp: 20C", 2).unwrap();
        display.set_cursor(6, 2).unwrap();
        display.write_text("31").unwrap();

        assert_eq!(bus.ddram_text(0x14, 20), format!("{:<20}", "Temp: 31C"));
    }

    #[test]
    fn repeated_writes_are_idempotent() {
        let (bus, mut display) = display(DisplayGeometry::lcd_16x2());
        display.set_cursor(2, 1).unwrap();
        display.write_text("Hi").unwrap();
        let once = bus.ddram_text(0, 0x80);

        display.set_cursor(2, 1).unwrap();
        display.write_text("Hi").unwrap();
        assert_eq!(bus.ddram_text(0, 0x80), once);
    }

    #[test]
    fn non_ascii_is_replaced() {
        let (bus, mut display) = display(DisplayGeometry::lcd_16x2());
        display.home().unwrap();
        display.write_text("20°C").unwrap();
        assert_eq!(bus.ddram_text(0, 4), "20?C");
    }

    #[test]
    fn clear_and_home() {
        let (bus, mut display) = display(DisplayGeometry::lcd_16x2());
        display.write_line("something", 0).unwrap();
        display.clear().unwrap();
        assert_eq!(bus.ddram_text(0, 16), " ".repeat(16));
        assert_eq!(bus.address_counter(), 0);

        display.set_cursor(5, 1).unwrap();
        display.home().unwrap();
        assert_eq!(bus.address_counter(), 0);
        assert_eq!(bus.events().last(), Some(&LcdEvent::Command(0x02)));
    }
}
