//! The polling loop that owns the display.
//!
//! Each cycle probes the display. While it answers, the first cycle after it (re)appeared
//! initializes it and takes the [OwnershipLock], and every cycle drains the [Mailbox] into it.
//! When the probe fails the lock is dropped, so the next time the display shows up it gets
//! initialized again.
use crate::config::{Config, ConfigError};
use crate::lock::OwnershipLock;
use crate::mailbox::{self, Mailbox, MailboxCommand, MailboxEntry, MailboxError};
use lcdmon_i2c::lcd::hd44780::driver::I2cHD44780Driver;
use lcdmon_i2c::lcd::hd44780::CharacterDisplay;
use lcdmon_i2c::{I2cBus, I2cError};
use log::{debug, info, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::sleep;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoordinatorError {
    #[error("display transfer failed: {0}")]
    Transport(#[from] I2cError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Default)]
pub enum SessionState {
    /// Waiting for the display to answer.
    #[default]
    Probing,
    /// The display answers and is (being) kept up to date.
    Connected,
}

/// What happened to the mailbox during a cycle.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum Drain {
    /// There was nothing to do.
    Empty,
    /// This many entries were shown and the mailbox was removed.
    Applied(usize),
    /// The mailbox couldn't be parsed and was left for the next cycle.
    Deferred(MailboxError),
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub enum PollOutcome {
    /// The display didn't answer the probe.
    Absent,
    Connected {
        /// Whether the display was initialized in this cycle.
        initialized: bool,
        drain: Drain,
    },
}

/// Delays used by [SessionCoordinator::run].
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct PollTiming {
    pub probe_backoff: Duration,
    pub poll_interval: Duration,
}

impl Default for PollTiming {
    fn default() -> Self {
        PollTiming {
            probe_backoff: Duration::from_millis(100),
            poll_interval: Duration::from_millis(50),
        }
    }
}

pub struct SessionCoordinator<B: I2cBus> {
    display: CharacterDisplay<I2cHD44780Driver<B>>,
    lock: OwnershipLock,
    mailbox: Mailbox,
    timing: PollTiming,
    state: SessionState,
}

impl<B: I2cBus> SessionCoordinator<B> {
    pub fn new(
        display: CharacterDisplay<I2cHD44780Driver<B>>,
        lock: OwnershipLock,
        mailbox: Mailbox,
        timing: PollTiming,
    ) -> Self {
        SessionCoordinator {
            display,
            lock,
            mailbox,
            timing,
            state: SessionState::Probing,
        }
    }

    pub fn from_config(bus: B, config: &Config) -> Result<Self, ConfigError> {
        let driver = I2cHD44780Driver::new(bus, config.address).map_err(|_| {
            ConfigError::InvalidValue {
                name: "address",
                value: config.address.to_string(),
            }
        })?;
        let display = CharacterDisplay::new(driver, config.geometry()?);
        Ok(Self::new(
            display,
            OwnershipLock::new(&config.lock_file),
            Mailbox::new(&config.mailbox_file),
            PollTiming {
                probe_backoff: config.probe_backoff(),
                poll_interval: config.poll_interval(),
            },
        ))
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn display(&self) -> &CharacterDisplay<I2cHD44780Driver<B>> {
        &self.display
    }

    /// Runs a single cycle.
    ///
    /// # Errors
    /// - [CoordinatorError::Transport] if the display stopped answering halfway through. The
    ///   coordinator goes back to probing, and the mailbox is kept.
    /// - [CoordinatorError::Io] if the lock or mailbox file couldn't be accessed.
    pub fn poll(&mut self) -> Result<PollOutcome, CoordinatorError> {
        if let Err(err) = self.display.driver_mut().probe() {
            if self.state == SessionState::Connected {
                info!("Display went away: {}", err);
            }
            self.state = SessionState::Probing;
            // Whatever was initialized before is gone with the power.
            self.lock.release()?;
            return Ok(PollOutcome::Absent);
        }

        if self.state == SessionState::Probing {
            info!(
                "Display found at {:#04x}",
                self.display.driver().address()
            );
            self.state = SessionState::Connected;
        }

        match self.poll_connected() {
            Err(CoordinatorError::Transport(err)) => {
                self.state = SessionState::Probing;
                Err(CoordinatorError::Transport(err))
            }
            result => result,
        }
    }

    fn poll_connected(&mut self) -> Result<PollOutcome, CoordinatorError> {
        let initialized = if self.lock.is_held() {
            false
        } else {
            self.start_session()?;
            true
        };
        let drain = self.drain()?;
        Ok(PollOutcome::Connected { initialized, drain })
    }

    fn start_session(&mut self) -> Result<(), CoordinatorError> {
        info!("Initializing display");
        self.display.initialize()?;
        self.lock.acquire()?;
        self.mailbox.reset_home()?;
        Ok(())
    }

    /// Shows everything in the mailbox, then removes it.
    fn drain(&mut self) -> Result<Drain, CoordinatorError> {
        let Some(content) = self.mailbox.read()? else {
            return Ok(Drain::Empty);
        };

        let lines = self.display.geometry().lines();
        let parsed = mailbox::parse_bytes(&content)
            .and_then(|entries| mailbox::check_rows(&entries, lines).map(|()| entries));
        let entries = match parsed {
            Ok(entries) => entries,
            Err(err) => {
                debug!("Leaving mailbox for the next cycle: {}", err);
                return Ok(Drain::Deferred(err));
            }
        };

        for entry in &entries {
            self.apply(entry)?;
        }
        self.mailbox.remove()?;
        debug!("Applied {} mailbox entries", entries.len());
        Ok(Drain::Applied(entries.len()))
    }

    fn apply(&mut self, entry: &MailboxEntry) -> Result<(), I2cError> {
        match entry {
            MailboxEntry::Command(MailboxCommand::Home) => self.display.home(),
            MailboxEntry::Command(MailboxCommand::Clear) => self.display.clear(),
            MailboxEntry::Write { column, row, text } => {
                self.display.set_cursor(*column, *row)?;
                self.display.write_text(text)
            }
        }
    }

    /// Polls until `running` is cleared.
    pub fn run(&mut self, running: &AtomicBool) {
        while running.load(Ordering::SeqCst) {
            let delay = match self.poll() {
                Ok(PollOutcome::Absent) => self.timing.probe_backoff,
                Ok(_) => self.timing.poll_interval,
                Err(err) => {
                    warn!("Cycle failed: {}", err);
                    self.timing.probe_backoff
                }
            };
            sleep(delay);
        }
    }

    /// Blanks the display and drops the lock. Failures are only logged, there is nothing left to
    /// do about them.
    pub fn shutdown(&mut self) {
        if self.state == SessionState::Connected {
            if let Err(err) = self.display.shutdown() {
                warn!("Could not turn the display off: {}", err);
            }
        }
        if let Err(err) = self.lock.release() {
            warn!("Could not remove {}: {}", self.lock.path().display(), err);
        }
        self.state = SessionState::Probing;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lcdmon_i2c::lcd::hd44780::DisplayGeometry;
    use lcdmon_i2c::sim::{LcdEvent, SimulatedBus};
    use std::fs;
    use tempfile::TempDir;

    const ADDRESS: u8 = 0x3F;

    struct Fixture {
        _dir: TempDir,
        bus: SimulatedBus,
        lock: OwnershipLock,
        mailbox: Mailbox,
        coordinator: SessionCoordinator<SimulatedBus>,
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let bus = SimulatedBus::new(ADDRESS);
        let lock = OwnershipLock::new(dir.path().join("lcdmon.lck"));
        let mailbox = Mailbox::new(dir.path().join("lcdmon.dat"));
        let driver = I2cHD44780Driver::new(bus.clone(), ADDRESS).unwrap();
        let coordinator = SessionCoordinator::new(
            CharacterDisplay::new(driver, DisplayGeometry::lcd_20x4()),
            lock.clone(),
            mailbox.clone(),
            PollTiming::default(),
        );
        Fixture {
            _dir: dir,
            bus,
            lock,
            mailbox,
            coordinator,
        }
    }

    /// A fixture that already went through its first cycle.
    fn connected() -> Fixture {
        let mut f = fixture();
        f.coordinator.poll().unwrap();
        f.bus.clear_log();
        f
    }

    #[test]
    fn first_cycle_initializes_and_homes() {
        let mut f = fixture();
        let outcome = f.coordinator.poll().unwrap();

        assert_eq!(
            outcome,
            PollOutcome::Connected {
                initialized: true,
                drain: Drain::Applied(1),
            }
        );
        assert_eq!(f.coordinator.state(), SessionState::Connected);
        assert!(f.lock.is_held());
        assert!(!f.mailbox.path().exists());
        assert!(f.bus.is_four_bit());
        assert_eq!(f.bus.events().last(), Some(&LcdEvent::Command(0x02)));
    }

    #[test]
    fn existing_lock_skips_initialization() {
        let mut f = fixture();
        f.lock.acquire().unwrap();

        let outcome = f.coordinator.poll().unwrap();
        assert_eq!(
            outcome,
            PollOutcome::Connected {
                initialized: false,
                drain: Drain::Empty,
            }
        );
        assert!(f.bus.writes().is_empty());
    }

    #[test]
    fn drains_in_order() {
        let mut f = connected();
        fs::write(f.mailbox.path(), "-1,-1,home\n2,1,Hi").unwrap();

        let outcome = f.coordinator.poll().unwrap();
        assert_eq!(
            outcome,
            PollOutcome::Connected {
                initialized: false,
                drain: Drain::Applied(2),
            }
        );
        assert_eq!(
            f.bus.events(),
            vec![
                LcdEvent::Command(0x02),
                LcdEvent::Command(0x80 | 0x42),
                LcdEvent::Data(b'H'),
                LcdEvent::Data(b'i'),
            ]
        );
        assert_eq!(f.bus.ddram_text(0x40, 4), "  Hi");
        assert!(!f.mailbox.path().exists());

        // Nothing left for the next cycle.
        f.bus.clear_log();
        assert_eq!(
            f.coordinator.poll().unwrap(),
            PollOutcome::Connected {
                initialized: false,
                drain: Drain::Empty,
            }
        );
        assert!(f.bus.events().is_empty());
    }

    #[test]
    fn malformed_mailbox_is_left_alone() {
        let mut f = connected();
        let content = "-1,-1,clear\n0,0,ok\n5,1\n";
        fs::write(f.mailbox.path(), content).unwrap();

        let outcome = f.coordinator.poll().unwrap();
        assert_eq!(
            outcome,
            PollOutcome::Connected {
                initialized: false,
                drain: Drain::Deferred(MailboxError::MissingField { line: 3 }),
            }
        );
        assert!(f.bus.events().is_empty());
        assert_eq!(fs::read_to_string(f.mailbox.path()).unwrap(), content);

        // Fixed by the writer, picked up by the next cycle.
        fs::write(f.mailbox.path(), "5,1,ok\n").unwrap();
        assert!(matches!(
            f.coordinator.poll().unwrap(),
            PollOutcome::Connected { drain: Drain::Applied(1), .. }
        ));
    }

    #[test]
    fn non_utf8_mailbox_is_left_alone() {
        let mut f = connected();
        let content = b"0,0,caf\xe9\n";
        fs::write(f.mailbox.path(), content).unwrap();

        assert_eq!(
            f.coordinator.poll().unwrap(),
            PollOutcome::Connected {
                initialized: false,
                drain: Drain::Deferred(MailboxError::InvalidUtf8 { line: 1 }),
            }
        );
        assert_eq!(f.coordinator.state(), SessionState::Connected);
        assert!(f.bus.events().is_empty());
        assert_eq!(fs::read(f.mailbox.path()).unwrap(), content);
    }

    #[test]
    fn rows_outside_the_display_are_rejected() {
        let mut f = connected();
        fs::write(f.mailbox.path(), "-1,-1,home\n0,4,below\n").unwrap();

        assert!(matches!(
            f.coordinator.poll().unwrap(),
            PollOutcome::Connected {
                drain: Drain::Deferred(MailboxError::RowOutOfRange { row: 4 }),
                ..
            }
        ));
        assert!(f.bus.events().is_empty());
        assert!(f.mailbox.path().exists());
    }

    #[test]
    fn reapplying_is_harmless() {
        let mut f = connected();
        fs::write(f.mailbox.path(), "3,2,again\n").unwrap();
        f.coordinator.poll().unwrap();
        let once = f.bus.ddram_text(0, 0x80);

        fs::write(f.mailbox.path(), "3,2,again\n").unwrap();
        f.coordinator.poll().unwrap();
        assert_eq!(f.bus.ddram_text(0, 0x80), once);
        assert_eq!(f.bus.ddram_text(0x14, 8), "   again");
    }

    #[test]
    fn reinitializes_after_disconnect() {
        let mut f = connected();
        f.bus.set_present(false);

        assert_eq!(f.coordinator.poll().unwrap(), PollOutcome::Absent);
        assert_eq!(f.coordinator.state(), SessionState::Probing);
        assert!(!f.lock.is_held());

        // Still gone, still fine.
        assert_eq!(f.coordinator.poll().unwrap(), PollOutcome::Absent);

        f.bus.set_present(true);
        assert!(!f.bus.is_four_bit());
        let outcome = f.coordinator.poll().unwrap();
        assert_eq!(
            outcome,
            PollOutcome::Connected {
                initialized: true,
                drain: Drain::Applied(1),
            }
        );
        assert!(f.lock.is_held());
        assert!(f.bus.is_four_bit());

        let events = f.bus.events();
        assert_eq!(events.first(), Some(&LcdEvent::Command(0x30)));
        assert_eq!(events.last(), Some(&LcdEvent::Command(0x02)));
    }

    #[test]
    fn transport_failure_mid_drain_keeps_mailbox() {
        let mut f = connected();
        fs::write(f.mailbox.path(), "0,0,some text\n").unwrap();
        f.bus.unplug_after(12);

        let result = f.coordinator.poll();
        assert!(matches!(
            result,
            Err(CoordinatorError::Transport(I2cError::NoDevice(ADDRESS)))
        ));
        assert_eq!(f.coordinator.state(), SessionState::Probing);
        assert!(f.mailbox.path().exists());

        // The next probe notices the display is gone and drops the lock.
        assert_eq!(f.coordinator.poll().unwrap(), PollOutcome::Absent);
        assert!(!f.lock.is_held());
    }

    #[test]
    fn shutdown_blanks_display_and_drops_lock() {
        let mut f = connected();
        fs::write(f.mailbox.path(), "0,0,bye\n").unwrap();
        f.coordinator.poll().unwrap();

        f.coordinator.shutdown();
        assert!(!f.bus.backlight());
        assert_eq!(f.bus.ddram_text(0, 3), "   ");
        assert!(!f.lock.is_held());
        assert_eq!(f.coordinator.state(), SessionState::Probing);
    }

    #[test]
    fn shutdown_while_probing_leaves_bus_alone() {
        let mut f = fixture();
        f.bus.set_present(false);
        f.coordinator.poll().unwrap();

        f.coordinator.shutdown();
        assert!(f.bus.writes().is_empty());
    }

    #[test]
    fn run_stops_when_flag_is_cleared() {
        let mut f = fixture();
        let running = AtomicBool::new(false);
        f.coordinator.run(&running);
        assert_eq!(f.coordinator.state(), SessionState::Probing);
        assert!(f.bus.writes().is_empty());
    }

    #[test]
    fn from_config_uses_geometry() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config {
            width: 16,
            lines: 2,
            lock_file: dir.path().join("lcdmon.lck"),
            mailbox_file: dir.path().join("lcdmon.dat"),
            ..Config::default()
        };
        let coordinator =
            SessionCoordinator::from_config(SimulatedBus::new(config.address), &config).unwrap();
        assert_eq!(coordinator.display().geometry(), DisplayGeometry::lcd_16x2());
        assert_eq!(coordinator.timing.poll_interval, Duration::from_millis(50));
    }
}
