mod config;

use std::{sync::Arc, time::Duration};

use anyhow::Result;
use clap::Parser;
use lifecycle::{OperationState, OperationStatus};
use preferences::{PreferenceMedium, PreferenceStore, SqliteMedium};
use rand::Rng;
use record_client::{FetchError, HttpRecordSource, RecordLookup};
use shared::{
    domain::{RecordId, ThemeMode},
    protocol::RecordPayload,
};
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};

#[derive(Parser, Debug)]
struct Args {
    /// Record id to fetch.
    #[arg(long)]
    record_id: Option<i64>,
    /// Fetch a random record id instead of a fixed one.
    #[arg(long)]
    random: bool,
    /// Flip the persisted theme preference before fetching.
    #[arg(long)]
    toggle_theme: bool,
    #[arg(long)]
    server_url: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().init();
    let args = Args::parse();
    let settings = config::load_settings();
    let server_url = args.server_url.unwrap_or(settings.server_url);

    let medium: Arc<dyn PreferenceMedium> =
        Arc::new(SqliteMedium::new(&settings.preferences_db_url).await?);
    let theme = PreferenceStore::open(medium, "theme", ThemeMode::default()).await;
    if args.toggle_theme {
        let next = theme.get().await.toggled();
        if let Err(err) = theme.set(next).await {
            warn!("theme updated in memory but not persisted: {err}");
        }
    }
    println!("Theme: {}", theme.get().await);

    let record_id = if args.random {
        Some(random_record_id(settings.random_id_max))
    } else {
        args.record_id.map(RecordId)
    };

    let mut source = HttpRecordSource::new(server_url);
    if settings.artificial_delay_ms > 0 {
        source = source.with_artificial_delay(Duration::from_millis(settings.artificial_delay_ms));
    }

    let lookup = RecordLookup::new(Arc::new(source), record_id);
    let mut states = lookup.controller().subscribe_states();
    render(&lookup.controller().snapshot().await);

    if let Some(record_id) = record_id {
        info!(record_id = record_id.0, "fetching record");
        let _settlement = lookup.submit(record_id).await?;
        loop {
            match states.recv().await {
                Ok(state) => {
                    let settled = state.is_settled();
                    render(&state);
                    if settled {
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "state updates dropped by slow consumer");
                }
                Err(RecvError::Closed) => break,
            }
        }
    }

    lookup.dispose().await;
    Ok(())
}

fn random_record_id(max: i64) -> RecordId {
    RecordId(rand::rng().random_range(1..=max.max(1)))
}

fn render(state: &OperationState<RecordPayload, FetchError>) {
    match state.status {
        OperationStatus::Idle => println!("Submit a record id to begin."),
        OperationStatus::Pending => println!("Fetching record..."),
        OperationStatus::Resolved => {
            if let Some(record) = &state.data {
                match &record.kind {
                    Some(kind) => println!("#{} {} ({kind})", record.record_id, record.name),
                    None => println!("#{} {}", record.record_id, record.name),
                }
            }
        }
        OperationStatus::Rejected => {
            if let Some(error) = &state.error {
                println!("Fetch failed: {error}");
            }
        }
    }
}
