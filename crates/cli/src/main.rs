use std::cmp::Ordering;
use std::path::PathBuf;

use anyhow::Context;
use chrono::DateTime;
use clap::Parser;

use scribe_session::{read_log, LogOrigin};

/// Prints a session transcript from its append-only log.
///
/// Log lines are committed in transcription-arrival order; this sorts
/// them back into capture order by `start_ts`.
#[derive(Parser, Debug)]
#[command(name = "scribe")]
struct Args {
    /// Session name under the data directory.
    session: String,

    /// Root data directory.
    #[arg(short, long, default_value = "data")]
    data_dir: PathBuf,

    /// Emit raw JSON lines instead of the formatted transcript.
    #[arg(long)]
    json: bool,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    let path = args.data_dir.join(&args.session).join("log.jsonl");
    let mut entries = read_log(&path)
        .with_context(|| format!("reading session log {}", path.display()))?;

    entries.sort_by(|a, b| {
        a.start_ts
            .partial_cmp(&b.start_ts)
            .unwrap_or(Ordering::Equal)
    });

    for entry in &entries {
        if args.json {
            println!("{}", serde_json::to_string(entry)?);
            continue;
        }
        let stamp = DateTime::from_timestamp(
            entry.start_ts as i64,
            (entry.start_ts.fract() * 1e9) as u32,
        )
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| format!("{:.3}", entry.start_ts));

        let marker = match entry.origin {
            LogOrigin::Voice => "",
            LogOrigin::Text => " (chat)",
        };
        println!("[{stamp}] {}{marker}: {}", entry.display_name, entry.text);
    }

    Ok(())
}
