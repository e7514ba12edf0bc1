use lcdmon_i2c::lcd::hd44780::DisplayGeometry;
use serde::{Deserialize, Serialize};
use std::env::var_os;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed config: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid value for {name}: {value:?}")]
    InvalidValue { name: &'static str, value: String },
    #[error("unsupported display size {width}x{lines}")]
    UnsupportedGeometry { width: u8, lines: u8 },
}

/// Daemon configuration.
///
/// Loaded from a JSON file (see [Config::load]), any missing field falls back to its default.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct Config {
    /// The I2C adapter device the display hangs off.
    pub bus: PathBuf,
    /// 7-bit address of the PCF8574 backpack.
    pub address: u8,
    /// Characters per line.
    pub width: u8,
    pub lines: u8,
    /// Marker file telling that the display was initialized by a live session.
    pub lock_file: PathBuf,
    /// File other processes drop display updates into.
    pub mailbox_file: PathBuf,
    /// Delay between probes while the display is missing.
    pub probe_backoff_ms: u64,
    /// Delay between mailbox checks while the display is connected.
    pub poll_interval_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            bus: PathBuf::from("/dev/i2c-0"),
            address: 0x3F,
            width: 20,
            lines: 4,
            lock_file: PathBuf::from("/tmp/lcdmon.lck"),
            mailbox_file: PathBuf::from("/tmp/lcdmon.dat"),
            probe_backoff_ms: 100,
            poll_interval_ms: 50,
        }
    }
}

impl Config {
    /// Loads the config file named by `LCDMON_CONFIG` (or `lcdmon.json`) if it exists, then applies
    /// the environment overrides.
    pub fn load() -> Result<Self, ConfigError> {
        let config_str = var_os("LCDMON_CONFIG");
        let config_str: &OsStr = config_str.as_deref().unwrap_or(OsStr::new("lcdmon.json"));

        let mut config = Self::from_file(Path::new(config_str))?.unwrap_or_default();
        config.apply_overrides(|name| dotenv::var(name).ok())?;
        config.geometry()?;
        Ok(config)
    }

    /// Reads a config file, returning `None` if there is none.
    pub fn from_file(path: &Path) -> Result<Option<Self>, ConfigError> {
        if !path.exists() {
            return Ok(None);
        }
        let file = std::fs::File::open(path)?;
        let reader = std::io::BufReader::new(file);
        Ok(Some(serde_json::from_reader(reader)?))
    }

    /// Overrides fields with the `LCDMON_*` variables returned by `lookup`.
    pub fn apply_overrides(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        if let Some(bus) = lookup("LCDMON_I2C_BUS") {
            self.bus = PathBuf::from(bus);
        }
        if let Some(address) = lookup("LCDMON_I2C_ADDRESS") {
            self.address = parse_address(&address).ok_or(ConfigError::InvalidValue {
                name: "LCDMON_I2C_ADDRESS",
                value: address,
            })?;
        }
        if let Some(lock_file) = lookup("LCDMON_LOCK_FILE") {
            self.lock_file = PathBuf::from(lock_file);
        }
        if let Some(mailbox_file) = lookup("LCDMON_MAILBOX_FILE") {
            self.mailbox_file = PathBuf::from(mailbox_file);
        }
        Ok(())
    }

    pub fn geometry(&self) -> Result<DisplayGeometry, ConfigError> {
        DisplayGeometry::from_size(self.width, self.lines).ok_or(
            ConfigError::UnsupportedGeometry {
                width: self.width,
                lines: self.lines,
            },
        )
    }

    pub fn probe_backoff(&self) -> Duration {
        Duration::from_millis(self.probe_backoff_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// Parses a 7-bit I2C address, either decimal or `0x`-prefixed hex.
fn parse_address(s: &str) -> Option<u8> {
    let s = s.trim();
    let address = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u8::from_str_radix(hex, 16).ok()?,
        None => s.parse().ok()?,
    };
    (address <= 0x7F).then_some(address)
}
