use crate::config::{AlphaBeta, PlayerConfig};
use crate::core::noise::NoiseSource;
use crate::ensemble::player::PlayerTimingState;
use crate::ensemble::EngineError;

/// Correction gains outside this magnitude diverge; rejected per step, not
/// clamped, so misconfiguration stays visible.
pub const GAIN_LIMIT: f64 = 2.0;

/// Period estimate bounds relative to the nominal base period.
pub const PERIOD_FLOOR_FACTOR: f64 = 0.1;
pub const PERIOD_CEIL_FACTOR: f64 = 10.0;

/// Result of one correction step for one player.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BeatOutcome {
    /// Onset implied by the correction alone, before motor noise.
    pub scheduled: f64,
    /// Emitted onset: `scheduled + motor_noise`.
    pub actual: f64,
    /// `actual - reference_onset` for this beat.
    pub asynchrony: f64,
    /// The period estimate hit its divergence clamp during this step.
    pub period_clamped: bool,
}

/// Check one gain pair against the divergence guard, returning the gains
/// widened to f64. Called per beat, so a pair edited out of range shows up
/// at the next step rather than at write time.
pub fn validate_pair(pair: AlphaBeta, pair_index: usize) -> Result<(f64, f64), EngineError> {
    let alpha = pair.alpha as f64;
    let beta = pair.beta as f64;
    if !alpha.is_finite() || alpha.abs() > GAIN_LIMIT {
        return Err(EngineError::InvalidConfig(format!(
            "alpha {alpha} of pair {pair_index} outside [-{GAIN_LIMIT}, {GAIN_LIMIT}]"
        )));
    }
    if !beta.is_finite() || beta.abs() > GAIN_LIMIT {
        return Err(EngineError::InvalidConfig(format!(
            "beta {beta} of pair {pair_index} outside [-{GAIN_LIMIT}, {GAIN_LIMIT}]"
        )));
    }
    Ok((alpha, beta))
}

fn clamp_period(period: f64, base_period: f64) -> (f64, bool) {
    let lo = PERIOD_FLOOR_FACTOR * base_period;
    let hi = PERIOD_CEIL_FACTOR * base_period;
    if period < lo {
        (lo, true)
    } else if period > hi {
        (hi, true)
    } else {
        (period, false)
    }
}

/// Advance one player by one beat of the linear phase/period correction
/// model.
///
/// Asynchrony is measured against the prediction `last_onset +
/// period_estimate`; phase correction (alpha) moves the next onset toward
/// the reference, period correction (beta) adjusts the running tempo
/// estimate. Timekeeper noise lands on the stored period estimate after the
/// onset is computed, so it perturbs the following beat's interval only.
pub fn step(
    state: &mut PlayerTimingState,
    cfg: &PlayerConfig,
    reference_onset: f64,
    base_period: f64,
    noise: &mut NoiseSource,
) -> Result<BeatOutcome, EngineError> {
    if !reference_onset.is_finite() {
        return Err(EngineError::InvalidConfig(format!(
            "reference onset {reference_onset} is not finite"
        )));
    }

    let pair_index = state.active_pair_index.min(cfg.alpha_beta.len() - 1);
    let (alpha, beta) = validate_pair(cfg.alpha_beta[pair_index], pair_index)?;

    let e = reference_onset - state.last_onset - state.period_estimate;

    let (period, clamped_by_correction) =
        clamp_period(state.period_estimate + beta * e, base_period);

    let scheduled = state.last_onset + period + alpha * e;
    let actual = scheduled + noise.sample(cfg.motor_noise_std as f64);

    let (next_period, clamped_by_noise) = clamp_period(
        period + noise.sample(cfg.time_keeper_noise_std as f64),
        base_period,
    );

    let period_clamped = clamped_by_correction || clamped_by_noise;
    if period_clamped {
        state.clamp_events = state.clamp_events.saturating_add(1);
    }

    let asynchrony = actual - reference_onset;
    state.period_estimate = next_period;
    state.last_onset = actual;
    state.last_asynchrony = asynchrony;

    Ok(BeatOutcome {
        scheduled,
        actual,
        asynchrony,
        period_clamped,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AlphaBeta, PlayerConfig};

    fn silent_player(alpha: f32, beta: f32) -> PlayerConfig {
        PlayerConfig {
            motor_noise_std: 0.0,
            time_keeper_noise_std: 0.0,
            alpha_beta: [AlphaBeta { alpha, beta }; 4],
            ..PlayerConfig::default()
        }
    }

    #[test]
    fn no_correction_keeps_period_and_advances_by_it() {
        let cfg = silent_player(0.0, 0.0);
        let mut state = PlayerTimingState::new(0.5);
        let mut noise = NoiseSource::seeded(0);

        // Reference drifts; with alpha = beta = 0 the player ignores it.
        let out = step(&mut state, &cfg, 0.1, 0.5, &mut noise).expect("step");
        assert_eq!(state.period_estimate, 0.5);
        assert_eq!(out.actual, 0.0);
        let out = step(&mut state, &cfg, 0.7, 0.5, &mut noise).expect("step");
        assert_eq!(state.period_estimate, 0.5);
        assert_eq!(out.actual, 0.5);
    }

    #[test]
    fn full_phase_correction_cancels_asynchrony() {
        let cfg = silent_player(1.0, 0.0);
        let mut state = PlayerTimingState {
            period_estimate: 0.5,
            last_onset: 0.02,
            last_asynchrony: 0.0,
            active_pair_index: 0,
            clamp_events: 0,
        };
        let mut noise = NoiseSource::seeded(0);
        let out = step(&mut state, &cfg, 0.5, 0.5, &mut noise).expect("step");
        assert!(out.asynchrony.abs() < 1e-12, "asynchrony {}", out.asynchrony);
        assert!((out.actual - 0.5).abs() < 1e-12, "actual {}", out.actual);
    }

    #[test]
    fn gain_out_of_range_is_rejected_per_step() {
        let cfg = silent_player(3.0, 0.0);
        let mut state = PlayerTimingState::new(0.5);
        let before = state;
        let mut noise = NoiseSource::seeded(0);
        let err = step(&mut state, &cfg, 0.5, 0.5, &mut noise).unwrap_err();
        assert!(matches!(err, EngineError::InvalidConfig(_)), "{err}");
        assert_eq!(state, before, "failed step must not mutate state");
    }

    #[test]
    fn runaway_period_hits_divergence_clamp() {
        let cfg = silent_player(0.0, 2.0);
        let mut state = PlayerTimingState::new(0.5);
        let mut noise = NoiseSource::seeded(0);
        // Reference far in the future: beta * e blows past 10x base period.
        let out = step(&mut state, &cfg, 100.0, 0.5, &mut noise).expect("step");
        assert!(out.period_clamped);
        assert_eq!(state.period_estimate, 5.0);
        assert_eq!(state.clamp_events, 1);
    }

    #[test]
    fn perturbed_period_converges_toward_reference() {
        let cfg = silent_player(0.5, 0.1);
        let mut state = PlayerTimingState {
            period_estimate: 0.55,
            last_onset: -0.55,
            last_asynchrony: 0.0,
            active_pair_index: 0,
            clamp_events: 0,
        };
        let mut noise = NoiseSource::seeded(0);
        let mut last_abs = f64::INFINITY;
        for beat in 0..40u64 {
            let reference = beat as f64 * 0.5;
            let out = step(&mut state, &cfg, reference, 0.5, &mut noise).expect("step");
            if beat >= 20 {
                assert!(
                    out.asynchrony.abs() <= last_abs + 1e-9,
                    "beat {beat}: {} > {last_abs}",
                    out.asynchrony.abs()
                );
            }
            last_abs = out.asynchrony.abs();
        }
        assert!(last_abs < 1e-3, "final asynchrony {last_abs}");
        assert!((state.period_estimate - 0.5).abs() < 1e-2);
    }
}
