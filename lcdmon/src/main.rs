use dotenv::dotenv;
use lcdmon::config::Config;
use lcdmon::coordinator::SessionCoordinator;
use lcdmon_i2c::linux::LinuxI2cBus;
use log::{debug, info};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use sysinfo::System;

fn main() -> eyre::Result<()> {
    // Initialize environment and logger
    dotenv().ok();
    pretty_env_logger::init();

    const UNKNOWN_STR: &str = "???";

    info!("lcdmon v{} starting...", env!("CARGO_PKG_VERSION"));
    info!(
        "Host {} ({})",
        System::host_name().as_deref().unwrap_or(UNKNOWN_STR),
        System::long_os_version().as_deref().unwrap_or(UNKNOWN_STR),
    );

    let config = Config::load()?;
    info!(
        "LCD @ {} {:#04x}, {}x{}",
        config.bus.display(),
        config.address,
        config.width,
        config.lines
    );
    info!(
        "Lock: {}, mailbox: {}",
        config.lock_file.display(),
        config.mailbox_file.display()
    );

    let running = Arc::new(AtomicBool::new(true));
    {
        let running = running.clone();
        ctrlc::set_handler(move || {
            running.store(false, Ordering::SeqCst);
        })?;
    }

    let bus = LinuxI2cBus::new(&config.bus);
    debug!("{:?} opened.", bus);
    let mut coordinator = SessionCoordinator::from_config(bus, &config)?;

    info!("Starting main loop...");
    coordinator.run(&running);

    info!("Shutting down...");
    coordinator.shutdown();

    Ok(())
}
