/// Mutable per-player runtime state, created when a player joins the
/// ensemble and mutated once per beat by the correction step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlayerTimingState {
    /// Current inter-onset interval estimate in seconds.
    pub period_estimate: f64,
    /// Time of the player's last produced onset.
    pub last_onset: f64,
    /// Signed `actual - reference` of the last beat.
    pub last_asynchrony: f64,
    /// Which of the four alpha/beta pairs applies this beat.
    pub active_pair_index: usize,
    /// How often the period estimate hit its divergence clamp.
    pub clamp_events: u32,
}

impl PlayerTimingState {
    /// Fresh state whose first predicted onset lands on a reference pulse
    /// at t = 0 (`last_onset + period_estimate == 0`).
    pub fn new(base_period: f64) -> Self {
        Self {
            period_estimate: base_period,
            last_onset: -base_period,
            last_asynchrony: 0.0,
            active_pair_index: 0,
            clamp_events: 0,
        }
    }
}
