use bionexus::backend::HttpBackend;
use bionexus::config::WorkspaceConfig;
use bionexus::notifications::TracingNotifier;
use bionexus::session::ItemStatus;
use bionexus::{Collaborators, Workspace};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const USAGE: &str = "usage: bionexus <session-id|new> [file-to-import]";

#[tokio::main(flavor = "current_thread")]
async fn main() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("bionexus=info")),
        )
        .init();

    if let Err(e) = run().await {
        tracing::error!("{}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let mut args = std::env::args().skip(1);
    let target = args.next().ok_or(USAGE)?;
    let import_path = args.next().map(PathBuf::from);

    let config_path = std::env::var_os("BIONEXUS_CONFIG").map(PathBuf::from);
    let config = WorkspaceConfig::load(config_path.as_deref())?;

    let backend = Arc::new(HttpBackend::from_config(&config)?);
    match backend.health().await {
        Ok(health) => tracing::info!("Backend at {} is {}", backend.base_url(), health.status),
        Err(e) => tracing::warn!("Health check against {} failed: {}", backend.base_url(), e),
    }

    let collaborators = Collaborators {
        sessions: backend.clone(),
        jobs: backend,
        notifier: Arc::new(TracingNotifier),
    };

    let workspace = if target == "new" {
        Workspace::create(collaborators, &config).await?
    } else {
        Workspace::open(collaborators, &config, &target).await?
    };
    tracing::info!("Session {} is open", workspace.session_id());

    if let Some(path) = import_path {
        match workspace.imports().import_path(&path).await {
            Ok(report) => tracing::info!(
                "Imported {}: {} admitted, {} dropped, {} rows skipped, {} submitted, {} failed",
                path.display(),
                report.admitted.len(),
                report.dropped,
                report.skipped_rows,
                report.submitted,
                report.failed
            ),
            Err(e) => tracing::warn!("Import of {} failed: {}", path.display(), e),
        }
    }

    watch_until_settled(&workspace).await;
    workspace.close().await;
    Ok(())
}

/// Log item status changes until every item is terminal or Ctrl-C.
async fn watch_until_settled(workspace: &Workspace) {
    let mut changes = workspace.store().subscribe();
    let mut seen: HashMap<String, ItemStatus> = HashMap::new();

    loop {
        let settled = {
            let state = changes.borrow_and_update();
            let Some(session) = state.session() else {
                break;
            };

            for item in &session.items {
                if seen.insert(item.id.clone(), item.status) != Some(item.status) {
                    match &item.error_message {
                        Some(message) => tracing::info!("{} [{}]: {}", item.name, item.status, message),
                        None => tracing::info!("{} [{}]", item.name, item.status),
                    }
                }
            }
            session.is_settled()
        };

        if settled {
            tracing::info!("All items have finished processing");
            break;
        }

        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Interrupted");
                break;
            }
            changed = changes.changed() => {
                if changed.is_err() {
                    break;
                }
            }
        }
    }
}
