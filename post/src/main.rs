//! Queues display updates for `lcdmon`.
//!
//! ```text
//! lcdmon-post clear -- 0 0 Hello -- 0 1 world
//! ```
//!
//! Every entry is either `home`, `clear` or `<column> <row> <text...>`, entries are separated by
//! `--`.
use dotenv::dotenv;
use eyre::{bail, eyre};
use lcdmon::config::Config;
use lcdmon::mailbox::{Mailbox, MailboxCommand, MailboxEntry};
use log::info;

fn parse_entry(args: &[String]) -> eyre::Result<MailboxEntry> {
    match args {
        [] => bail!("Empty entry"),
        [command] if command == "home" => Ok(MailboxEntry::Command(MailboxCommand::Home)),
        [command] if command == "clear" => Ok(MailboxEntry::Command(MailboxCommand::Clear)),
        [column, row, text @ ..] => {
            let column: usize = column
                .parse()
                .map_err(|_| eyre!("Invalid column {:?}", column))?;
            let row: usize = row.parse().map_err(|_| eyre!("Invalid row {:?}", row))?;
            let text = text.join(" ");
            if text.contains(['\n', '\r']) {
                bail!("Text can't span multiple lines");
            }
            Ok(MailboxEntry::write(column, row, text))
        }
        other => bail!("Unrecognized entry {:?}", other.join(" ")),
    }
}

fn parse_entries(args: &[String]) -> eyre::Result<Vec<MailboxEntry>> {
    args.split(|arg| arg == "--").map(parse_entry).collect()
}

fn main() -> eyre::Result<()> {
    dotenv().ok();
    pretty_env_logger::init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    if args.is_empty() {
        bail!("Usage: lcdmon-post home | clear | <column> <row> <text...> [-- ...]");
    }

    let entries = parse_entries(&args)?;
    let config = Config::load()?;
    let mailbox = Mailbox::new(&config.mailbox_file);
    mailbox.post(&entries)?;

    info!(
        "Queued {} entries in {}",
        entries.len(),
        mailbox.path().display()
    );
    Ok(())
}
