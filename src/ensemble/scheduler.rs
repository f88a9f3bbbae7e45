use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::config::ConfigurationStore;
use crate::core::noise::NoiseSource;

use super::correction;
use super::events::{OnsetBoard, OnsetEvent};
use super::player::PlayerTimingState;
use super::EngineError;

/// How much played history the onset board keeps, in beats of the base
/// period.
const BOARD_RETENTION_BEATS: f64 = 64.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Idle,
    Running,
    Stopped,
}

#[derive(Debug)]
struct PlayerRuntime {
    id: u32,
    state: PlayerTimingState,
    noise: NoiseSource,
}

/// Drives the ensemble: one `advance` call per reference pulse steps every
/// active player once and emits their onsets ordered by player id.
///
/// `advance` is the only mutating entry point and takes `&mut self`, so two
/// beats can never interleave; configuration reads go through the store's
/// snapshot and stay consistent while a UI edits between beats.
pub struct EnsembleScheduler {
    store: Arc<ConfigurationStore>,
    players: Vec<PlayerRuntime>,
    state: EngineState,
    beat: u64,
    seed: u64,
    last_reference: Option<f64>,
    board: OnsetBoard,
}

impl EnsembleScheduler {
    pub fn new(store: Arc<ConfigurationStore>, seed: u64) -> Self {
        let base_period = store.global().base_period;
        Self {
            store,
            players: Vec::new(),
            state: EngineState::Idle,
            beat: 0,
            seed,
            last_reference: None,
            board: OnsetBoard::new(BOARD_RETENTION_BEATS * base_period),
        }
    }

    /// Scheduler with every player currently in the store registered.
    pub fn with_all_players(
        store: Arc<ConfigurationStore>,
        seed: u64,
    ) -> Result<Self, EngineError> {
        let count = store.player_count() as u32;
        let mut scheduler = Self::new(store, seed);
        for id in 0..count {
            scheduler.add_player(id)?;
        }
        Ok(scheduler)
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    pub fn beat(&self) -> u64 {
        self.beat
    }

    pub fn player_count(&self) -> usize {
        self.players.len()
    }

    pub fn player_state(&self, id: u32) -> Option<&PlayerTimingState> {
        self.players
            .iter()
            .find(|p| p.id == id)
            .map(|p| &p.state)
    }

    pub fn board(&self) -> &OnsetBoard {
        &self.board
    }

    pub fn board_mut(&mut self) -> &mut OnsetBoard {
        &mut self.board
    }

    /// Register a player between beats. The id must already have a config
    /// record in the store.
    pub fn add_player(&mut self, id: u32) -> Result<(), EngineError> {
        if self.state == EngineState::Stopped {
            return Err(EngineError::EngineStopped);
        }
        if self.players.iter().any(|p| p.id == id) {
            return Err(EngineError::InvalidConfig(format!(
                "player {id} already registered"
            )));
        }
        if self.store.player(id).is_none() {
            return Err(EngineError::InvalidConfig(format!(
                "no config record for player {id}"
            )));
        }
        let base_period = self.store.global().base_period;
        let mut state = PlayerTimingState::new(base_period);
        if let Some(reference) = self.last_reference {
            // Joining mid-session: enter as if the last pulse was played.
            state.last_onset = reference;
        }
        let runtime = PlayerRuntime {
            id,
            state,
            noise: NoiseSource::seeded(player_seed(self.seed, id)),
        };
        let at = self.players.partition_point(|p| p.id < id);
        self.players.insert(at, runtime);
        debug!("player {id} joined; ensemble size {}", self.players.len());
        Ok(())
    }

    /// Drop a player between beats; unknown ids are a no-op.
    pub fn remove_player(&mut self, id: u32) -> Result<(), EngineError> {
        if self.state == EngineState::Stopped {
            return Err(EngineError::EngineStopped);
        }
        let before = self.players.len();
        self.players.retain(|p| p.id != id);
        if self.players.len() < before {
            debug!("player {id} left; ensemble size {}", self.players.len());
        }
        Ok(())
    }

    /// Step every active player against the given reference onset and emit
    /// one event per player, ordered by ascending player id. The first call
    /// starts the session.
    pub fn advance(&mut self, reference_onset: f64) -> Result<Vec<OnsetEvent>, EngineError> {
        if self.state == EngineState::Stopped {
            return Err(EngineError::EngineStopped);
        }
        if !reference_onset.is_finite() {
            return Err(EngineError::InvalidConfig(format!(
                "reference onset {reference_onset} is not finite"
            )));
        }
        if self.state == EngineState::Idle {
            self.state = EngineState::Running;
            // Players enter on the first pulse: predicted onset == reference.
            for player in &mut self.players {
                player.state.last_onset = reference_onset - player.state.period_estimate;
            }
            info!("ensemble running with {} players", self.players.len());
        }

        // One consistent view of the configuration for the whole beat.
        let session = self.store.snapshot();
        let base_period = session.global.base_period;
        let pair_index = session.global.pair_policy.index_for_beat(self.beat);

        // Reject the whole beat before touching any player, so a failed
        // advance never leaves the ensemble half-stepped.
        for player in &self.players {
            let cfg = session.players.get(player.id as usize).ok_or_else(|| {
                EngineError::InvalidConfig(format!("no config record for player {}", player.id))
            })?;
            correction::validate_pair(cfg.alpha_beta[pair_index], pair_index)?;
        }

        let mut events = Vec::with_capacity(self.players.len());
        for player in &mut self.players {
            let cfg = session.players.get(player.id as usize).ok_or_else(|| {
                EngineError::InvalidConfig(format!("no config record for player {}", player.id))
            })?;
            player.state.active_pair_index = pair_index;
            let outcome = correction::step(
                &mut player.state,
                cfg,
                reference_onset,
                base_period,
                &mut player.noise,
            )?;
            if outcome.period_clamped {
                warn!(
                    "player {} period estimate clamped at beat {} (asynchrony {:.4})",
                    player.id, self.beat, outcome.asynchrony
                );
            }
            events.push(OnsetEvent {
                player_id: player.id,
                beat: self.beat,
                scheduled_time: outcome.scheduled,
                actual_time: outcome.actual,
                asynchrony: outcome.asynchrony,
            });
        }

        for event in &events {
            self.board.publish(*event);
        }
        self.board.prune(reference_onset);

        self.last_reference = Some(reference_onset);
        self.beat += 1;
        Ok(events)
    }

    /// Transition to `Stopped`. Immediate and terminal: later `advance`,
    /// `add_player`, and `remove_player` calls are rejected.
    pub fn stop(&mut self) {
        if self.state != EngineState::Stopped {
            info!("ensemble stopped after {} beats", self.beat);
        }
        self.state = EngineState::Stopped;
    }
}

/// Per-player noise stream, decoupled from registration order.
fn player_seed(seed: u64, id: u32) -> u64 {
    seed ^ (id as u64 + 1).wrapping_mul(0x9E37_79B9_7F4A_7C15)
}
