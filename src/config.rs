use std::fs;
use std::path::Path;
use std::sync::RwLock;

use serde::{Deserialize, Serialize};

use crate::ensemble::EngineError;

/// Hard ceiling on ensemble size; exceeding it is a configuration error,
/// never a mid-run failure.
pub const MAX_PLAYERS: usize = 16;

/// Number of adaptation-gain pairs carried per player.
pub const PAIR_COUNT: usize = 4;

/// One phase/period correction gain pair.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct AlphaBeta {
    #[serde(default = "AlphaBeta::default_gain")]
    pub alpha: f32,
    #[serde(default = "AlphaBeta::default_gain")]
    pub beta: f32,
}

impl AlphaBeta {
    fn default_gain() -> f32 {
        0.1
    }
}

impl Default for AlphaBeta {
    fn default() -> Self {
        Self {
            alpha: Self::default_gain(),
            beta: Self::default_gain(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlayerConfig {
    #[serde(default = "PlayerConfig::default_volume")]
    pub volume: f32,
    #[serde(default = "PlayerConfig::default_noise_std")]
    pub motor_noise_std: f32,
    #[serde(default = "PlayerConfig::default_noise_std")]
    pub time_keeper_noise_std: f32,
    #[serde(default = "PlayerConfig::default_alpha_beta")]
    pub alpha_beta: [AlphaBeta; PAIR_COUNT],
}

impl PlayerConfig {
    fn default_volume() -> f32 {
        1.0
    }
    fn default_noise_std() -> f32 {
        0.25
    }
    fn default_alpha_beta() -> [AlphaBeta; PAIR_COUNT] {
        [AlphaBeta::default(); PAIR_COUNT]
    }

    /// Noise STDs must be finite and non-negative; a bad value rejects the
    /// whole write. Alpha/beta magnitude is checked lazily by the engine.
    pub fn validate(&self) -> Result<(), EngineError> {
        if !self.motor_noise_std.is_finite() || self.motor_noise_std < 0.0 {
            return Err(EngineError::InvalidConfig(format!(
                "motor_noise_std {} must be finite and >= 0",
                self.motor_noise_std
            )));
        }
        if !self.time_keeper_noise_std.is_finite() || self.time_keeper_noise_std < 0.0 {
            return Err(EngineError::InvalidConfig(format!(
                "time_keeper_noise_std {} must be finite and >= 0",
                self.time_keeper_noise_std
            )));
        }
        if !self.volume.is_finite() {
            return Err(EngineError::InvalidConfig(format!(
                "volume {} must be finite",
                self.volume
            )));
        }
        Ok(())
    }

    fn clamped(mut self) -> Self {
        self.volume = self.volume.clamp(0.0, 1.0);
        self
    }
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            volume: Self::default_volume(),
            motor_noise_std: Self::default_noise_std(),
            time_keeper_noise_std: Self::default_noise_std(),
            alpha_beta: Self::default_alpha_beta(),
        }
    }
}

/// Which of the four alpha/beta pairs applies at a given beat.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PairPolicy {
    /// Always the same pair (the default is pair 0).
    Fixed { index: usize },
    /// Cycle through the four pairs, one per beat.
    RoundRobin,
}

impl PairPolicy {
    pub fn index_for_beat(&self, beat: u64) -> usize {
        match self {
            PairPolicy::Fixed { index } => (*index).min(PAIR_COUNT - 1),
            PairPolicy::RoundRobin => (beat % PAIR_COUNT as u64) as usize,
        }
    }
}

impl Default for PairPolicy {
    fn default() -> Self {
        Self::Fixed { index: 0 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GlobalConfig {
    #[serde(default = "GlobalConfig::default_master_volume")]
    pub master_volume: f32,
    #[serde(default = "GlobalConfig::default_num_intro_tones")]
    pub num_intro_tones: u32,
    /// Nominal inter-onset interval in seconds.
    #[serde(default = "GlobalConfig::default_base_period")]
    pub base_period: f64,
    /// Opaque path/handle to the session's MIDI file; never parsed here.
    #[serde(default)]
    pub midi_file_ref: String,
    #[serde(default)]
    pub pair_policy: PairPolicy,
}

impl GlobalConfig {
    fn default_master_volume() -> f32 {
        100.0
    }
    fn default_num_intro_tones() -> u32 {
        4
    }
    fn default_base_period() -> f64 {
        0.5
    }

    pub fn validate(&self) -> Result<(), EngineError> {
        if !self.base_period.is_finite() || self.base_period <= 0.0 {
            return Err(EngineError::InvalidConfig(format!(
                "base_period {} must be finite and > 0",
                self.base_period
            )));
        }
        if !self.master_volume.is_finite() {
            return Err(EngineError::InvalidConfig(format!(
                "master_volume {} must be finite",
                self.master_volume
            )));
        }
        if let PairPolicy::Fixed { index } = self.pair_policy {
            if index >= PAIR_COUNT {
                return Err(EngineError::InvalidConfig(format!(
                    "pair index {index} out of range 0..{PAIR_COUNT}"
                )));
            }
        }
        Ok(())
    }

    fn clamped(mut self) -> Self {
        self.master_volume = self.master_volume.clamp(0.0, 100.0);
        self
    }
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            master_volume: Self::default_master_volume(),
            num_intro_tones: Self::default_num_intro_tones(),
            base_period: Self::default_base_period(),
            midi_file_ref: String::new(),
            pair_policy: PairPolicy::default(),
        }
    }
}

/// The persisted session document: global settings plus one record per
/// player, indexed by position (player id 0..N).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionConfig {
    #[serde(default)]
    pub global: GlobalConfig,
    #[serde(default = "SessionConfig::default_players")]
    pub players: Vec<PlayerConfig>,
}

impl SessionConfig {
    fn default_players() -> Vec<PlayerConfig> {
        vec![PlayerConfig::default(); 4]
    }

    pub fn validate(&self) -> Result<(), EngineError> {
        self.global.validate()?;
        if self.players.len() > MAX_PLAYERS {
            return Err(EngineError::InvalidConfig(format!(
                "{} players exceeds the limit of {MAX_PLAYERS}",
                self.players.len()
            )));
        }
        for (id, player) in self.players.iter().enumerate() {
            player
                .validate()
                .map_err(|err| match err {
                    EngineError::InvalidConfig(msg) => {
                        EngineError::InvalidConfig(format!("player {id}: {msg}"))
                    }
                    other => other,
                })?;
        }
        Ok(())
    }

    fn clamped(mut self) -> Self {
        self.global = self.global.clamped();
        self.players = self.players.into_iter().map(PlayerConfig::clamped).collect();
        self
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            global: GlobalConfig::default(),
            players: Self::default_players(),
        }
    }
}

/// Validated session state. Writes go through validating setters; reads
/// clone a consistent snapshot, so the scheduler and a UI can read
/// concurrently while edits land between beats.
pub struct ConfigurationStore {
    inner: RwLock<SessionConfig>,
}

impl ConfigurationStore {
    pub fn new(cfg: SessionConfig) -> Result<Self, EngineError> {
        cfg.validate()?;
        Ok(Self {
            inner: RwLock::new(cfg.clamped()),
        })
    }

    pub fn snapshot(&self) -> SessionConfig {
        self.inner.read().expect("config store lock").clone()
    }

    pub fn global(&self) -> GlobalConfig {
        self.inner.read().expect("config store lock").global.clone()
    }

    pub fn set_global(&self, global: GlobalConfig) -> Result<(), EngineError> {
        global.validate()?;
        let mut inner = self.inner.write().expect("config store lock");
        inner.global = global.clamped();
        Ok(())
    }

    pub fn player(&self, id: u32) -> Option<PlayerConfig> {
        self.inner
            .read()
            .expect("config store lock")
            .players
            .get(id as usize)
            .cloned()
    }

    pub fn player_count(&self) -> usize {
        self.inner.read().expect("config store lock").players.len()
    }

    pub fn set_player(&self, id: u32, cfg: PlayerConfig) -> Result<(), EngineError> {
        cfg.validate()?;
        let mut inner = self.inner.write().expect("config store lock");
        let slot = inner
            .players
            .get_mut(id as usize)
            .ok_or_else(|| EngineError::InvalidConfig(format!("unknown player {id}")))?;
        *slot = cfg.clamped();
        Ok(())
    }

    /// Register a new player record; its id is the returned index.
    pub fn push_player(&self, cfg: PlayerConfig) -> Result<u32, EngineError> {
        cfg.validate()?;
        let mut inner = self.inner.write().expect("config store lock");
        if inner.players.len() >= MAX_PLAYERS {
            return Err(EngineError::InvalidConfig(format!(
                "player limit of {MAX_PLAYERS} reached"
            )));
        }
        inner.players.push(cfg.clamped());
        Ok((inner.players.len() - 1) as u32)
    }

    /// Rendering gain for a player: `volume * master_volume / 100`.
    pub fn gain_for(&self, id: u32) -> Option<f32> {
        let inner = self.inner.read().expect("config store lock");
        let player = inner.players.get(id as usize)?;
        Some(player.volume * inner.global.master_volume / 100.0)
    }

    pub fn load_or_default(path: &str) -> Self {
        let path_obj = Path::new(path);
        if path_obj.exists() {
            match fs::read_to_string(path_obj) {
                Ok(contents) => match toml::from_str::<SessionConfig>(&contents) {
                    Ok(cfg) => match Self::new(cfg) {
                        Ok(store) => return store,
                        Err(err) => {
                            eprintln!("Invalid session {path}: {err}. Using defaults.");
                        }
                    },
                    Err(err) => {
                        eprintln!("Failed to parse session {path}: {err}. Using defaults.");
                    }
                },
                Err(err) => {
                    eprintln!("Failed to read session {path}: {err}. Using defaults.");
                }
            }
            return Self {
                inner: RwLock::new(SessionConfig::default()),
            };
        }

        // File does not exist: write commented defaults and return them.
        let default_cfg = SessionConfig::default();
        match toml::to_string_pretty(&default_cfg) {
            Ok(text) => {
                let mut commented = String::new();
                for line in text.lines() {
                    let trimmed = line.trim();
                    // Keep only the top-level section headers; commented
                    // sub-tables fall back to their serde defaults on load.
                    let keep = trimmed.is_empty()
                        || trimmed == "[global]"
                        || trimmed == "[[players]]";
                    if keep {
                        commented.push_str(line);
                    } else {
                        commented.push_str("# ");
                        commented.push_str(line);
                    }
                    commented.push('\n');
                }
                if let Err(err) = fs::write(path_obj, commented) {
                    eprintln!("Failed to write default session to {path}: {err}");
                }
            }
            Err(err) => {
                eprintln!("Failed to serialize default session: {err}");
            }
        }
        Self {
            inner: RwLock::new(default_cfg),
        }
    }

    pub fn save(&self, path: &str) -> std::io::Result<()> {
        let text = toml::to_string_pretty(&self.snapshot())
            .map_err(|err| std::io::Error::new(std::io::ErrorKind::InvalidData, err))?;
        fs::write(path, text)
    }
}
