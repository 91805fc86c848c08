use std::sync::Arc;
use std::time::Duration;

use lookout_common::config::LookoutConfig;
use lookout_common::error::Result;
use lookout_common::time::{Sleeper, SystemClock, TokioSleeper};
use lookout_engine::LookoutEngine;
use lookout_notifier::memory::MemoryTransport;
use lookout_notifier::slack::SlackClient;
use lookout_notifier::{ChatTransport, ResilientSender};
use lookout_watcher::WatchCommand;

/// Pause before restarting a watch that exited cleanly.
const RESTART_DELAY: Duration = Duration::from_secs(1);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "kube_lookout=info,lookout_watcher=info,lookout_engine=info,lookout_notifier=info"
                    .into()
            }),
        )
        .json()
        .init();

    tracing::info!("KubeLookout starting...");

    // Load configuration
    let config = LookoutConfig::from_env()?;

    let transport: Arc<dyn ChatTransport> = match (&config.slack_token, config.dry_run) {
        (Some(token), false) => Arc::new(SlackClient::new(token.clone())),
        _ => {
            tracing::info!("Dry run: messages are logged, not delivered");
            Arc::new(MemoryTransport::dry_run())
        }
    };
    let sleeper: Arc<dyn Sleeper> = Arc::new(TokioSleeper);
    let sender = ResilientSender::new(transport, sleeper.clone());

    let mut engine = LookoutEngine::new(
        config.display.clone(),
        config.threads.clone(),
        sender,
        Arc::new(SystemClock),
        sleeper,
    );
    let watch = WatchCommand::parse(&config.watch_command)?;

    tracing::info!(
        rollout_channel = %config.threads.rollout_channel,
        alert_channel = %config.threads.alert_channel,
        project = %config.display.project,
        "Watching deployments"
    );

    // Run with graceful shutdown on Ctrl+C
    tokio::select! {
        result = watch_forever(&watch, &mut engine) => {
            if let Err(e) = result {
                tracing::error!(error = %e, "Lookout exited with error");
                return Err(e.into());
            }
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Received shutdown signal, stopping gracefully...");
        }
    }

    tracing::info!("KubeLookout stopped.");
    Ok(())
}

/// Feed the engine from the watch, restarting it whenever it exits cleanly.
async fn watch_forever(watch: &WatchCommand, engine: &mut LookoutEngine) -> Result<()> {
    loop {
        let snapshots = watch.spawn()?;
        engine.run(snapshots).await?;
        tracing::info!("Watch ended, restarting");
        tokio::time::sleep(RESTART_DELAY).await;
    }
}
