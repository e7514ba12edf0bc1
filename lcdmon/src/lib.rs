//! Keeps an I2C character LCD in sync with a mailbox file shared by other processes.
//!
//! See [coordinator::SessionCoordinator] for the main loop, [mailbox] for the file format.

pub mod config;
pub mod coordinator;
pub mod lock;
pub mod mailbox;
