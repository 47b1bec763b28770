//! The long-running worker: scheduler + dispatcher until interrupted.

use std::sync::Arc;

use clap::Args;
use log::info;
use remindd_core::channel::build_channels;
use remindd_core::storage::config::Strategy;
use remindd_core::storage::{Config, ReminderStore};
use remindd_core::{Dispatcher, Scheduler, TimerScheduler};
use tokio::sync::watch;

#[derive(Args)]
pub struct RunArgs {
    /// Override the configured scheduling strategy (poll or timer)
    #[arg(long)]
    strategy: Option<String>,
}

pub fn run(args: RunArgs) -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = Config::load()?;
    let strategy = match args.strategy.as_deref() {
        Some("poll") => Strategy::Poll,
        Some("timer") => Strategy::Timer,
        Some(other) => return Err(format!("unknown strategy '{other}'").into()),
        None => config.scheduler.strategy,
    };

    let store = ReminderStore::open()?;
    let channels = build_channels(&config.channels)?;
    let mut dispatcher = Dispatcher::new(store.clone(), channels, config.delivery.to_policy());
    if let Some(path) = &config.template_path {
        dispatcher = dispatcher.with_template(std::fs::read_to_string(path)?);
    }
    let dispatcher = Arc::new(dispatcher);

    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(async move {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("shutdown requested");
                let _ = shutdown_tx.send(true);
            }
        });

        match strategy {
            Strategy::Poll => {
                Scheduler::new(store, dispatcher, config.poll_interval())
                    .run(shutdown_rx)
                    .await;
            }
            Strategy::Timer => {
                TimerScheduler::new(store, dispatcher).run(shutdown_rx).await;
            }
        }
    });

    Ok(())
}
