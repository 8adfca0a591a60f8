//! Database inspection binary
//!
//! Prints record counts per key namespace and the current game status of a
//! RocksDB ledger directory.

use clap::Parser;
use std::collections::BTreeMap;
use twod_ledger::{
    games::{status::GAME_STATUS_KEY, types::GameStatus},
    storage::{get_json, KvStore, RocksStore},
};

#[derive(Parser, Debug)]
#[command(name = "inspect_db")]
#[command(about = "Summarise a 2D ledger database", long_about = None)]
struct Args {
    /// Database directory
    #[arg(long, default_value = "./DB/ledger_data")]
    db_path: String,
}

const NAMESPACES: &[&str] = &[
    "account/",
    "wager/pending/",
    "wager/settled/",
    "history/",
    "result/",
];

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let store = RocksStore::open_existing(&args.db_path)?;

    let mut counts = BTreeMap::new();
    for prefix in NAMESPACES {
        let mut count = 0usize;
        let mut cursor: Option<Vec<u8>> = None;
        loop {
            let rows = store.scan_prefix(prefix.as_bytes(), cursor.as_deref(), 1024)?;
            count += rows.len();
            match rows.last() {
                Some((key, _)) if rows.len() == 1024 => cursor = Some(key.clone()),
                _ => break,
            }
        }
        counts.insert(*prefix, count);
    }

    println!("Ledger database: {}", args.db_path);
    for (prefix, count) in &counts {
        println!("  {:<16} {}", prefix, count);
    }

    match get_json::<GameStatus>(&store, GAME_STATUS_KEY)? {
        Some(status) => println!(
            "  game status      {} open={} manually_closed={} (version {})",
            status.value.current_session,
            status.value.is_open,
            status.value.is_manually_closed,
            status.version
        ),
        None => println!("  game status      not initialised"),
    }

    Ok(())
}
