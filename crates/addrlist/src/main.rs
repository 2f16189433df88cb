//! `addrlist` - harvests correspondents from mail folders into a ranked
//! address book, and looks them up again.

#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

mod cli;

use std::path::Path;

use addrlist_core::{AddressBook, Config, Multiplexer};
use anyhow::Context;
use clap::Parser;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use cli::{Cli, Command};

/// Most results printed by `find`.
const MAX_RESULTS: usize = 20;

/// Shorter queries (in bytes) match too much to be useful.
const MIN_QUERY_LEN: usize = 3;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.debug);

    let config_path = match cli.config {
        Some(path) => path,
        None => Config::default_path()?,
    };
    let config = Config::load(&config_path)
        .with_context(|| format!("loading configuration from {}", config_path.display()))?;

    match cli.command {
        Some(Command::Find { query }) => find(&query, &config.store),
        None => scan(&config).await,
    }
}

fn init_logging(debug: bool) {
    let default = if debug {
        "addrlist=debug,addrlist_core=debug"
    } else {
        "warn"
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

async fn scan(config: &Config) -> anyhow::Result<()> {
    info!(store = %config.store.display(), "starting scan");

    let mut book = AddressBook::new(tracing::info_span!("book"));
    book.import(&config.store)
        .with_context(|| format!("importing {}", config.store.display()))?;

    let mut sessions = Multiplexer::new(tracing::info_span!("multiplexer"));
    sessions.register_accounts(config);
    let summary = sessions.run(&mut book).await;
    info!(
        completed = summary.completed,
        failed = summary.failed,
        records = book.len(),
        "scan finished"
    );

    book.export(&config.store)
        .with_context(|| format!("exporting {}", config.store.display()))?;
    Ok(())
}

fn find(query: &str, store: &Path) -> anyhow::Result<()> {
    if !is_searchable(query) {
        return Ok(());
    }

    let mut matches = AddressBook::find_matches(query, store, MAX_RESULTS)
        .with_context(|| format!("searching {}", store.display()))?;
    matches.sort_by(|a, b| a.name.cmp(&b.name));

    for record in matches {
        println!("{}\t{}", record.email, record.name);
    }
    Ok(())
}

const fn is_searchable(query: &str) -> bool {
    query.len() >= MIN_QUERY_LEN
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_queries_are_skipped() {
        assert!(!is_searchable(""));
        assert!(!is_searchable("al"));
        assert!(is_searchable("ali"));
        // Two characters, three bytes.
        assert!(is_searchable("jö"));
    }
}
