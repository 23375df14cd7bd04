mod config;
mod controller;
mod desktop;
mod error;
mod event;
mod fade;
mod frontend;
mod hotkey;
mod navigation;
mod paths;
mod plugin;
mod process;
mod splash;
mod status;
mod surface;
mod transition;

#[cfg(test)]
mod testing;

use std::time::Instant;

use log::{error, info, warn};
use tokio::sync::mpsc;
use tokio::time::{interval, MissedTickBehavior};

use crate::controller::{ControllerSource, GilrsSource, NoControllers, POLL_INTERVAL};
use crate::desktop::SystemDesktop;
use crate::event::FrontendEvent;
use crate::frontend::Frontend;
use crate::splash::PROGRESS_TICK;
use crate::surface::TrackedSurfaces;
use crate::transition::ANIMATION_TICK;

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    // ── App data directory ────────────────────────────────────────────────────
    let app_dir = paths::app_data_dir();
    if let Err(e) = std::fs::create_dir_all(&app_dir) {
        error!("Failed to create app data directory {}: {e}", app_dir.display());
        std::process::exit(1);
    }

    // ── Configuration ─────────────────────────────────────────────────────────
    let config_path = paths::config_file_path();
    let initial_config = config::load_or_default(&config_path).unwrap_or_else(|e| {
        error!("Config error (using defaults): {e:#}");
        config::Config::default()
    });

    let (event_tx, mut event_rx) = mpsc::channel::<FrontendEvent>(64);

    // ── Background producers ──────────────────────────────────────────────────
    tokio::spawn(config::watch_config(config_path, event_tx.clone()));

    let hotkey_handle = match hotkey::start(event_tx.clone()) {
        Ok(handle) => Some(handle),
        Err(e) => {
            warn!("Keyboard input disabled: {e:#}");
            None
        }
    };

    // Graceful shutdown on Ctrl+C.
    {
        let tx = event_tx.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                let _ = tx.send(FrontendEvent::Shutdown).await;
            }
        });
    }

    let mut controllers: Box<dyn ControllerSource> = match GilrsSource::new() {
        Some(source) => Box::new(source),
        None => Box::new(NoControllers),
    };

    let mut frontend = Frontend::new(
        initial_config,
        TrackedSurfaces::new(),
        SystemDesktop::new(),
        event_tx,
        Some(paths::status_file_path()),
    );
    info!("cabinet-frontend v{} started", env!("CARGO_PKG_VERSION"));

    // ── Event loop ────────────────────────────────────────────────────────────
    let mut poll_timer = interval(POLL_INTERVAL);
    let mut animation_timer = interval(ANIMATION_TICK);
    let mut progress_timer = interval(PROGRESS_TICK);
    for timer in [&mut poll_timer, &mut animation_timer, &mut progress_timer] {
        timer.set_missed_tick_behavior(MissedTickBehavior::Skip);
    }

    while !frontend.exit_requested() {
        tokio::select! {
            _ = poll_timer.tick() => {
                let samples = controllers.poll_controllers();
                frontend.on_poll_tick(&samples, Instant::now());
            }
            _ = animation_timer.tick() => frontend.on_animation_tick(Instant::now()),
            _ = progress_timer.tick() => frontend.on_progress_tick(Instant::now()),
            event = event_rx.recv() => match event {
                Some(event) => frontend.handle_event(event, Instant::now()),
                None => break,
            },
        }
    }

    if let Some(handle) = hotkey_handle {
        handle.stop();
    }
    info!("Front-end stopped");
}
