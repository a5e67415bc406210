use std::collections::HashMap;

use serde::Serialize;
use tokio::sync::mpsc::UnboundedSender;
use tracing::warn;
use uuid::Uuid;

use crate::camera::CameraModeKind;

#[derive(Debug, Clone, Serialize)]
pub struct RacerSnapshot {
    pub id: usize,
    pub position: [f32; 3],
    pub velocity: [f32; 3],
    pub rotation: [f32; 4], // visual roll, x y z w
}

#[derive(Debug, Clone, Serialize)]
pub struct ObstacleSnapshot {
    pub name: String,
    pub translation: [f32; 3],
    pub rotation: [f32; 4],
}

#[derive(Debug, Clone, Serialize)]
pub struct CameraSnapshot {
    pub mode: CameraModeKind,
    pub position: [f32; 3],
    pub target: [f32; 3],
}

#[derive(Debug, Clone, Serialize)]
pub struct RaceSnapshot {
    pub tick: u64,
    pub elapsed: f32,
    pub running: bool,
    pub leader: Option<usize>,
    pub standings: Vec<usize>, // best first
    pub leader_progress: f32,  // 0..=1 along the track
    pub auto_follow: bool,
    pub camera: CameraSnapshot,
    pub racers: Vec<RacerSnapshot>,
    pub doors: Vec<ObstacleSnapshot>,
    pub rotors: Vec<ObstacleSnapshot>,
}

/// Everything the server pushes to a spectator.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    Welcome { spectator_id: Uuid },
    Pong,
    Snapshot(RaceSnapshot),
}

impl ServerMessage {
    pub fn to_json(&self) -> Option<String> {
        match serde_json::to_string(self) {
            Ok(json) => Some(json),
            Err(err) => {
                warn!("Failed to serialize server message: {err}");
                None
            }
        }
    }
}

/// Connected spectators, keyed by their connection id.
#[derive(Default)]
pub struct SpectatorRegistry {
    clients: HashMap<Uuid, UnboundedSender<String>>,
}

impl SpectatorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, tx: UnboundedSender<String>) -> Uuid {
        let id = Uuid::new_v4();
        self.clients.insert(id, tx);
        id
    }

    pub fn remove(&mut self, id: &Uuid) {
        self.clients.remove(id);
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    /// Serialize once, fan out. Closed channels are ignored; their
    /// connection task removes them on disconnect.
    pub fn broadcast(&self, message: &ServerMessage) {
        if self.is_empty() {
            return;
        }
        let Some(json) = message.to_json() else { return };

        for tx in self.clients.values() {
            let _ = tx.send(json.clone());
        }
    }
}
