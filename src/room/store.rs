//! Canonical in-memory view of the players in one room
//!
//! The store never publishes on its own. Every operation applies its change
//! first and returns the resulting [`RoomEvent`]s; the owner publishes them
//! after releasing its lock, so readers never observe a half-applied change
//! and handlers may call back into the room.

use std::collections::HashMap;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, warn};

use crate::events::RoomEvent;

use super::detector::StateChangeDetector;
use super::player::PlayerState;

/// Outcome of a local mutation
#[derive(Debug, Clone, PartialEq)]
pub enum Mutation {
    /// No local player yet (not joined)
    NoLocalPlayer,
    /// Result would break player invariants; the view is unchanged
    Rejected,
    /// Applied to the local view only
    LocalOnly,
    /// Applied and significant; this state should be sent
    Transmit(PlayerState),
}

impl Mutation {
    pub fn transmittable(&self) -> Option<&PlayerState> {
        match self {
            Mutation::Transmit(state) => Some(state),
            _ => None,
        }
    }
}

struct RemoteEntry {
    state: PlayerState,
    last_seen: Instant,
}

pub struct RoomStateStore {
    local: Option<PlayerState>,
    /// Last local state handed to the network
    baseline: Option<PlayerState>,
    remote: HashMap<String, RemoteEntry>,
    detector: Box<dyn StateChangeDetector>,
}

impl RoomStateStore {
    pub fn new(detector: Box<dyn StateChangeDetector>) -> Self {
        Self {
            local: None,
            baseline: None,
            remote: HashMap::new(),
            detector,
        }
    }

    /// Install the local player confirmed by a join handshake
    ///
    /// Remote entries are dropped since the server re-announces the room.
    /// On a re-join the offline view is kept and only identity and liveness
    /// are taken from the handshake; the handshake state becomes the baseline
    /// so the next meaningful mutation transmits the retained view.
    pub fn install_local(&mut self, mut confirmed: PlayerState) -> Vec<RoomEvent> {
        confirmed.is_local = true;
        confirmed.is_connected = true;

        let mut events: Vec<RoomEvent> = self
            .remote
            .drain()
            .map(|(_, entry)| RoomEvent::PlayerLeft(entry.state))
            .collect();

        let event = match self.local.take() {
            Some(mut view) => {
                view.id = confirmed.id.clone();
                view.is_local = true;
                view.is_connected = true;
                self.local = Some(view.clone());
                RoomEvent::PlayerUpdated(view)
            }
            None => {
                self.local = Some(confirmed.clone());
                RoomEvent::PlayerJoined(confirmed.clone())
            }
        };
        self.baseline = Some(confirmed);
        events.push(event);
        events
    }

    /// Insert or replace a remote player
    pub fn apply_remote_update(&mut self, mut state: PlayerState, now: Instant) -> Option<RoomEvent> {
        if let Err(e) = state.validate() {
            warn!(player_id = %state.id, error = %e, "Dropping malformed player update");
            return None;
        }

        if self.local_id() == Some(state.id.as_str()) {
            debug!(player_id = %state.id, "Ignoring echo of local player");
            return None;
        }

        state.is_local = false;
        let entry = RemoteEntry {
            state: state.clone(),
            last_seen: now,
        };

        match self.remote.insert(state.id.clone(), entry) {
            None => Some(RoomEvent::PlayerJoined(state)),
            Some(_) => Some(RoomEvent::PlayerUpdated(state)),
        }
    }

    /// Remove a remote player; unknown ids are a no-op
    pub fn remove_player(&mut self, id: &str) -> Option<RoomEvent> {
        self.remote
            .remove(id)
            .map(|entry| RoomEvent::PlayerLeft(entry.state))
    }

    /// Apply a draft-style mutation to a copy of the local player
    pub fn mutate_local<F>(&mut self, mutator: F) -> (Mutation, Option<RoomEvent>)
    where
        F: FnOnce(&mut PlayerState),
    {
        let Some(current) = self.local.as_ref() else {
            debug!("Mutation before join ignored");
            return (Mutation::NoLocalPlayer, None);
        };

        let mut next = current.clone();
        mutator(&mut next);
        next.id = current.id.clone();
        next.is_local = true;

        if let Err(e) = next.validate() {
            warn!(player_id = %next.id, error = %e, "Rejecting local mutation");
            return (Mutation::Rejected, None);
        }

        let meaningful = {
            let baseline = self.baseline.as_ref().unwrap_or(current);
            self.detector.has_changed(baseline, &next)
        };

        self.local = Some(next.clone());

        if meaningful {
            self.baseline = Some(next.clone());
            (Mutation::Transmit(next.clone()), Some(RoomEvent::PlayerMutated(next)))
        } else {
            (Mutation::LocalOnly, None)
        }
    }

    /// Make the current local view the baseline and return it for sending
    pub fn resync(&mut self) -> Option<PlayerState> {
        let local = self.local.clone()?;
        self.baseline = Some(local.clone());
        Some(local)
    }

    /// Mark everyone as disconnected after the connection dropped
    pub fn mark_connection_lost(&mut self) -> Vec<RoomEvent> {
        let mut events = Vec::new();

        for entry in self.remote.values_mut() {
            if entry.state.is_connected {
                entry.state.is_connected = false;
                events.push(RoomEvent::PlayerUpdated(entry.state.clone()));
            }
        }

        if let Some(local) = self.local.as_mut() {
            if local.is_connected {
                local.is_connected = false;
                events.push(RoomEvent::PlayerUpdated(local.clone()));
            }
        }

        events
    }

    /// Remove remote players not heard from within `timeout`
    pub fn expire_stale(&mut self, now: Instant, timeout: Duration) -> Vec<RoomEvent> {
        let stale: Vec<String> = self
            .remote
            .iter()
            .filter(|(_, entry)| now.saturating_duration_since(entry.last_seen) >= timeout)
            .map(|(id, _)| id.clone())
            .collect();

        stale
            .iter()
            .filter_map(|id| {
                debug!(player_id = %id, "Expiring silent player");
                self.remove_player(id)
            })
            .collect()
    }

    pub fn local_id(&self) -> Option<&str> {
        self.local.as_ref().map(|p| p.id.as_str())
    }

    pub fn local_player(&self) -> Option<&PlayerState> {
        self.local.as_ref()
    }

    pub fn get_player(&self, id: &str) -> Option<&PlayerState> {
        match self.local.as_ref() {
            Some(local) if local.id == id => Some(local),
            _ => self.remote.get(id).map(|entry| &entry.state),
        }
    }

    /// Local player (if joined) followed by every remote player
    pub fn all_players(&self) -> Vec<PlayerState> {
        self.local
            .iter()
            .cloned()
            .chain(self.remote.values().map(|entry| entry.state.clone()))
            .collect()
    }

    pub fn remote_players(&self) -> impl Iterator<Item = &PlayerState> {
        self.remote.values().map(|entry| &entry.state)
    }

    pub fn remote_count(&self) -> usize {
        self.remote.len()
    }
}
