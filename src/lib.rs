pub mod activity_log;
pub mod commands;
pub mod config;
pub mod core_state; // Shared engine state: document, sensors, status board
pub mod db;
pub mod events;
pub mod history;
pub mod medications; // Action processor
pub mod models;
pub mod notifications;
pub mod scheduling;
pub mod statistics;

use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use config::EngineConfig;
use core_state::{CoreError, CoreState};
use events::{EventBus, PeriodicHandle, Subscription, STATE_CHANGED_TOPIC};
use notifications::{LogNotifier, NOTIFICATION_ACTION_TOPICS};

/// Process entry point: logging, configuration, runtime, then `serve`.
pub fn run() -> Result<(), CoreError> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config::default_log_filter())),
        )
        .init();

    tracing::info!("DoseKeeper starting v{}", config::APP_VERSION);

    let engine_config = EngineConfig::from_env()?;
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(CoreError::Runtime)?;
    runtime.block_on(serve(engine_config))
}

/// Tick and event subscriptions owned by the running process. Dropping it
/// stops them all.
pub struct Lifecycle {
    pub tick: PeriodicHandle,
    pub subscriptions: Vec<Subscription>,
}

/// Wire the periodic tick and the event topics to `state`.
pub fn start(state: &Arc<CoreState>, bus: &EventBus, config: &EngineConfig) -> Lifecycle {
    let tick_state = Arc::clone(state);
    let tick = events::register_periodic("scheduling_tick", config.tick_interval, move || {
        let state = Arc::clone(&tick_state);
        async move {
            state.refresh().await;
        }
    });

    let mut subscriptions = Vec::new();
    for topic in NOTIFICATION_ACTION_TOPICS {
        let state = Arc::clone(state);
        subscriptions.push(bus.subscribe(topic, move |payload| {
            let state = Arc::clone(&state);
            async move {
                commands::notifications::handle_action_event(&state, topic, &payload).await;
            }
        }));
    }
    let sensor_state = Arc::clone(state);
    subscriptions.push(bus.subscribe(STATE_CHANGED_TOPIC, move |payload| {
        let state = Arc::clone(&sensor_state);
        async move {
            commands::sensors::handle_state_changed(&state, payload).await;
        }
    }));

    Lifecycle { tick, subscriptions }
}

/// Open the document, start the tick and subscriptions, and pump stdin
/// until EOF or Ctrl+C.
pub async fn serve(config: EngineConfig) -> Result<(), CoreError> {
    let state = Arc::new(CoreState::open(&config, Arc::new(LogNotifier)).await?);
    let bus = EventBus::new();
    let initial = state.refresh().await;
    tracing::info!(medications = initial.evaluated, "Initial evaluation complete");

    let lifecycle = start(&state, &bus, &config);

    let stdin = tokio::io::BufReader::new(tokio::io::stdin());
    let stdout = tokio::io::stdout();
    tokio::select! {
        result = events::inbound::pump(stdin, stdout, &state, &bus) => {
            if let Err(e) = result {
                tracing::warn!(error = %e, "Inbound stream failed");
            }
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutdown signal received");
        }
    }

    lifecycle.tick.shutdown();
    drop(lifecycle);
    state.flush().await?;
    tracing::info!("DoseKeeper stopped");
    Ok(())
}
