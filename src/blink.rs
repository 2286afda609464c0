//! Procedural eyelid timeline generation.
//!
//! Blinks are scheduled without per-frame author input: occurrence `k` is
//! centered at `start_offset + k * mean_interval` and jittered by a seeded
//! hash, so the schedule is a pure function of `(duration, config)` and a
//! given seed always reproduces the same timeline.

use crate::error::{LipwaveError, LipwaveResult};
use crate::timeline::{Label, TimedEvent, Timeline};

/// Eyelid state within a blink cycle.
///
/// Mapped to the three base images the user supplies: the blink mapping
/// table uses labels `A` (open), `B` (half), `C` (closed).
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum BlinkState {
    /// Eyes fully open (resting state).
    Open,
    /// Eyelids halfway, entering or leaving a blink.
    Half,
    /// Eyes fully closed at the blink midpoint.
    Closed,
}

impl BlinkState {
    /// Mapping-table label for this state.
    pub fn label(self) -> Label {
        match self {
            BlinkState::Open => Label('A'),
            BlinkState::Half => Label('B'),
            BlinkState::Closed => Label('C'),
        }
    }
}

/// Tunable blink cadence. All times in seconds.
#[derive(Clone, Copy, Debug, serde::Serialize, serde::Deserialize)]
pub struct BlinkConfig {
    /// Center of the first blink occurrence.
    pub start_offset: f64,
    /// Average interval between blink centers.
    pub mean_interval: f64,
    /// Bounded jitter applied to each center, `[-jitter, +jitter]`.
    pub jitter: f64,
    /// Duration of the HALF and CLOSED sub-phases.
    pub phase_secs: f64,
    /// Determinism seed for the jitter hash.
    pub seed: u64,
}

impl Default for BlinkConfig {
    fn default() -> Self {
        Self {
            start_offset: 1.0,
            mean_interval: 3.0,
            jitter: 1.0,
            phase_secs: 1.0 / 12.0,
            seed: 0,
        }
    }
}

impl BlinkConfig {
    /// Validate cadence parameters.
    pub fn validate(&self) -> LipwaveResult<()> {
        for (name, v) in [
            ("start_offset", self.start_offset),
            ("mean_interval", self.mean_interval),
            ("jitter", self.jitter),
            ("phase_secs", self.phase_secs),
        ] {
            if !v.is_finite() {
                return Err(LipwaveError::validation(format!(
                    "blink {name} must be finite"
                )));
            }
        }
        if self.start_offset < 0.0 {
            return Err(LipwaveError::validation("blink start_offset must be >= 0"));
        }
        if self.mean_interval <= 0.0 {
            return Err(LipwaveError::validation("blink mean_interval must be > 0"));
        }
        if self.jitter < 0.0 || self.jitter >= self.mean_interval {
            return Err(LipwaveError::validation(
                "blink jitter must be in [0, mean_interval)",
            ));
        }
        if self.phase_secs <= 0.0 {
            return Err(LipwaveError::validation("blink phase_secs must be > 0"));
        }
        Ok(())
    }
}

/// Generate an eyelid timeline covering `duration` seconds.
///
/// Each blink emits HALF at its start, CLOSED one sub-phase later, and OPEN
/// one sub-phase after that. An occurrence whose start would land at or
/// before the previous blink's OPEN-return event is skipped, and one that
/// would not complete before `duration` is dropped, so blink phase intervals
/// never intersect and the eyes always finish open.
pub fn schedule_blinks(duration: f64, cfg: &BlinkConfig) -> LipwaveResult<Timeline> {
    cfg.validate()?;
    if !duration.is_finite() || duration < 0.0 {
        return Err(LipwaveError::validation(format!(
            "blink schedule duration must be finite and >= 0, got {duration}"
        )));
    }
    if duration == 0.0 {
        return Ok(Timeline::empty());
    }

    let mut events = vec![TimedEvent {
        start: 0.0,
        label: BlinkState::Open.label(),
    }];

    let mut prev_open = 0.0;
    let mut k: u64 = 0;
    loop {
        let center = cfg.start_offset + (k as f64) * cfg.mean_interval;
        if center >= duration {
            break;
        }
        k += 1;

        let start = center + cfg.jitter * (2.0 * unit_hash(cfg.seed, k - 1) - 1.0);
        let end = start + 2.0 * cfg.phase_secs;
        if start <= prev_open || end >= duration {
            continue;
        }

        events.push(TimedEvent {
            start,
            label: BlinkState::Half.label(),
        });
        events.push(TimedEvent {
            start: start + cfg.phase_secs,
            label: BlinkState::Closed.label(),
        });
        events.push(TimedEvent {
            start: end,
            label: BlinkState::Open.label(),
        });
        prev_open = end;
    }

    Timeline::new(events, duration)
}

/// FNV-1a hash of `(seed, k)` mapped to `[0, 1)`.
fn unit_hash(seed: u64, k: u64) -> f64 {
    const OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME: u64 = 0x0000_0100_0000_01B3;

    let mut h = seed ^ OFFSET_BASIS;
    for b in k.to_le_bytes() {
        h ^= u64::from(b);
        h = h.wrapping_mul(PRIME);
    }
    ((h >> 11) as f64) / ((1u64 << 53) as f64)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn phases(tl: &Timeline) -> Vec<(char, f64)> {
        tl.events()
            .iter()
            .map(|e| (e.label.as_char(), e.start))
            .collect()
    }

    #[test]
    fn same_seed_reproduces_timeline() {
        let cfg = BlinkConfig::default();
        let a = schedule_blinks(30.0, &cfg).unwrap();
        let b = schedule_blinks(30.0, &cfg).unwrap();
        assert_eq!(phases(&a), phases(&b));
    }

    #[test]
    fn different_seeds_differ() {
        let a = schedule_blinks(30.0, &BlinkConfig::default()).unwrap();
        let b = schedule_blinks(
            30.0,
            &BlinkConfig {
                seed: 99,
                ..BlinkConfig::default()
            },
        )
        .unwrap();
        assert_ne!(phases(&a), phases(&b));
    }

    #[test]
    fn blink_phases_never_intersect() {
        let cfg = BlinkConfig::default();
        let tl = schedule_blinks(120.0, &cfg).unwrap();

        // Pattern after the initial OPEN is strict HALF -> CLOSED -> OPEN
        // triples; Timeline construction already guarantees strictly
        // increasing starts, so a valid pattern implies disjoint intervals.
        let ev = tl.events();
        assert_eq!(ev[0].label.as_char(), 'A');
        assert_eq!((ev.len() - 1) % 3, 0);
        for blink in ev[1..].chunks_exact(3) {
            assert_eq!(blink[0].label.as_char(), 'B');
            assert_eq!(blink[1].label.as_char(), 'C');
            assert_eq!(blink[2].label.as_char(), 'A');
            assert!((blink[1].start - blink[0].start - cfg.phase_secs).abs() < 1e-9);
            assert!((blink[2].start - blink[1].start - cfg.phase_secs).abs() < 1e-9);
        }
    }

    #[test]
    fn overlap_prone_config_skips_occurrences() {
        // Jitter nearly as large as the interval forces occasional overlap
        // candidates; the schedule must stay valid and strictly ordered.
        let cfg = BlinkConfig {
            start_offset: 0.2,
            mean_interval: 0.5,
            jitter: 0.45,
            phase_secs: 0.2,
            seed: 7,
        };
        let tl = schedule_blinks(60.0, &cfg).unwrap();
        let ev = tl.events();
        assert!(!ev.is_empty());
        assert_eq!((ev.len() - 1) % 3, 0);
        // With ~120 candidate occurrences and 0.4s blinks in 0.5s slots,
        // some occurrences must have been skipped.
        assert!(((ev.len() - 1) / 3) < 120);
    }

    #[test]
    fn all_events_complete_within_duration() {
        let tl = schedule_blinks(10.0, &BlinkConfig::default()).unwrap();
        for e in tl.events() {
            assert!(e.start < 10.0);
        }
        // Last event is always an OPEN return.
        assert_eq!(tl.events().last().unwrap().label.as_char(), 'A');
    }

    #[test]
    fn zero_duration_yields_empty_timeline() {
        let tl = schedule_blinks(0.0, &BlinkConfig::default()).unwrap();
        assert!(tl.is_empty());
    }

    #[test]
    fn zero_jitter_centers_are_regular() {
        let cfg = BlinkConfig {
            jitter: 0.0,
            ..BlinkConfig::default()
        };
        let tl = schedule_blinks(20.0, &cfg).unwrap();
        let halves: Vec<f64> = tl
            .events()
            .iter()
            .filter(|e| e.label.as_char() == 'B')
            .map(|e| e.start)
            .collect();
        for (i, t) in halves.iter().enumerate() {
            let expect = cfg.start_offset + (i as f64) * cfg.mean_interval;
            assert!((t - expect).abs() < 1e-9);
        }
    }

    #[test]
    fn config_rejects_jitter_at_or_above_interval() {
        let cfg = BlinkConfig {
            mean_interval: 1.0,
            jitter: 1.0,
            ..BlinkConfig::default()
        };
        assert!(cfg.validate().is_err());
    }
}
