//! Vibescale bot - headless room participant
//!
//! Joins a room and drives the local player in a slow circle. Useful for
//! exercising a room server with a second participant. It handles:
//! - Room connection with automatic reconnection
//! - Event logging for joins, leaves, errors and collisions
//! - A movement loop fed by a scripted axis input

use std::time::Duration;

use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use vibescale::game::{points_of, AxisInput, MovementController};
use vibescale::{ConnectionState, Room, RoomConfig, RoomEvent, RoomEventKind};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Load configuration
    let config = RoomConfig::from_env()?;

    // Initialize tracing
    init_tracing(&config.log_level);

    info!("Starting Vibescale bot");
    info!("Room: {} at {}", config.room_id, config.server_url);

    let room = Room::new(config)?;
    register_logging(&room);

    if room.connect().await != ConnectionState::Connected {
        anyhow::bail!("could not join room {}", room.room_id());
    }

    room.mutate_player(|player| {
        player.username = "bot".to_string();
    });

    let input = AxisInput::new();
    let controller = MovementController::builder(room.clone())
        .device(input.clone())
        .on_collision(|hit| {
            info!(
                other_id = %hit.other_id,
                points = hit.result.total_points,
                "Bumped into a player"
            );
        })
        .build();
    controller.start();

    // Gentle circle: full throttle, light steer
    input.set(1.0, 0.3);

    let mut status = tokio::time::interval(Duration::from_secs(10));
    tokio::select! {
        _ = shutdown_signal() => {}
        _ = async {
            loop {
                status.tick().await;
                if let Some(me) = room.local_player() {
                    info!(
                        players = room.all_players().len(),
                        points = points_of(&me),
                        x = me.position.x,
                        y = me.position.y,
                        "Status"
                    );
                }
            }
        } => {}
    }

    controller.stop();
    room.disconnect();

    info!("Bot shutdown complete");
    Ok(())
}

/// Initialize tracing/logging
fn init_tracing(log_level: &str) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .init();
}

/// Log the room events a human cares about
fn register_logging(room: &Room) {
    room.on(RoomEventKind::PlayerJoined, |event| {
        if let Some(player) = event.player() {
            info!(player_id = %player.id, username = %player.username, "Player joined");
        }
    });
    room.on(RoomEventKind::PlayerLeft, |event| {
        if let Some(player) = event.player() {
            info!(player_id = %player.id, "Player left");
        }
    });
    room.on(RoomEventKind::Disconnected, |_| warn!("Disconnected from room"));
    room.on(RoomEventKind::Error, |event| {
        if let RoomEvent::Error(e) = event {
            warn!(error = %e, "Room error");
        }
    });
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install signal handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        }
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        }
    }
}
