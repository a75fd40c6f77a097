use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;
use tracing::{debug, error, info, warn};

use movieo_sync::achievement::{AchievementTracker, CheckOutcome, ProgressNotifier, UnlockQueue};
use movieo_sync::customization::CustomizationStore;
use movieo_sync::global::{config::AppConfig, logging};
use movieo_sync::{AppError, MovieoClient};

#[tokio::main]
async fn main() -> Result<()> {
    let config = match AppConfig::load() {
        Ok(cfg) => Arc::new(cfg),
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            eprintln!("Please ensure config.toml exists in the working directory");
            return Err(e.into());
        }
    };

    let _log_guard = logging::init(&config.app);

    info!("Starting movieo-sync...");
    debug!(?config, "Loaded configuration");

    if let Err(e) = run(config).await {
        error!(error = %e, "movieo-sync stopped");
        return Err(e.into());
    }

    info!("Shutdown complete");
    Ok(())
}

/// Wire the components and poll until Ctrl+C
async fn run(config: Arc<AppConfig>) -> Result<(), AppError> {
    let client = MovieoClient::new(&config.api)?;
    if !client.has_token() {
        warn!("No API token configured, every request will fail with an auth error");
    }
    let client = Arc::new(client);

    // Composition root: every component gets its collaborators explicitly
    let customizations = CustomizationStore::new(client.clone());
    let tracker = Arc::new(AchievementTracker::new(client.clone(), config.category_table()?));
    let notifier = ProgressNotifier::new(
        tracker.clone(),
        Duration::from_millis(config.achievements.min_check_interval_ms),
    )
    .with_server_check(config.achievements.trigger_server_check);

    let unlocks = Arc::new(Mutex::new(UnlockQueue::new()));
    notifier.subscribe({
        let unlocks = unlocks.clone();
        move |event| {
            if let Ok(mut queue) = unlocks.lock() {
                queue.push(event.clone());
            }
        }
    });

    match customizations.load_all().await {
        Ok(entries) => info!(count = entries.len(), "Customizations available"),
        Err(e) => error!(error = %e, "Failed to load customizations"),
    }

    // First snapshot only sets the baseline
    match notifier.progress_changed(None).await {
        Ok(_) => info!(
            tracked = tracker.notified_count(),
            "Achievement baseline loaded"
        ),
        Err(e) => error!(error = %e, "Failed to load achievements"),
    }

    let mut ticker = tokio::time::interval(Duration::from_secs(config.achievements.poll_interval_seconds.max(1)));
    ticker.tick().await;

    info!("Watching for achievement unlocks, press Ctrl+C to shutdown");
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                match notifier.progress_changed(None).await {
                    Ok(CheckOutcome::Checked(events)) if !events.is_empty() => {
                        debug!(count = events.len(), "New unlocks queued");
                    }
                    Ok(_) => {}
                    Err(e) if e.is_retryable() => warn!(error = %e, "Achievement check failed, retrying next tick"),
                    Err(e) => error!(error = %e, "Achievement check failed"),
                }

                if let Ok(mut queue) = unlocks.lock() {
                    while let Some(event) = queue.dismiss() {
                        let category_info = tracker.categories().get(&event.category);
                        info!(
                            category = %category_info.map(|c| c.label.as_str()).unwrap_or(event.category.as_str()),
                            tier = %event.tier,
                            rarity = ?event.rarity,
                            target = event.target,
                            unit = %category_info.map(|c| c.unit.as_str()).unwrap_or("units"),
                            unlocked_at = %event.unlocked_at,
                            "Achievement unlocked"
                        );
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => {
                warn!("Shutdown signal received");
                break;
            }
        }
    }

    Ok(())
}
