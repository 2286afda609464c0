use crate::error::{LipwaveError, LipwaveResult};

/// Single-letter state label shared by mouth shapes and blink phases.
///
/// Labels are case-sensitive and restricted to ASCII uppercase letters, the
/// convention used by the phoneme recognizer and the mapping-table format.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
pub struct Label(pub(crate) char);

impl Label {
    /// Parse a label from raw text: exactly one ASCII uppercase letter.
    pub fn parse(s: &str) -> LipwaveResult<Self> {
        let mut chars = s.chars();
        match (chars.next(), chars.next()) {
            (Some(c), None) if c.is_ascii_uppercase() => Ok(Self(c)),
            _ => Err(LipwaveError::validation(format!(
                "label must be a single uppercase letter, got '{s}'"
            ))),
        }
    }

    /// The underlying letter.
    pub fn as_char(self) -> char {
        self.0
    }
}

impl std::fmt::Display for Label {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One timed state change: `label` becomes active at `start` seconds and
/// stays active until the next event's start (or the timeline duration).
#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize)]
pub struct TimedEvent {
    /// Activation timestamp in seconds.
    pub start: f64,
    /// State label active from `start` onward.
    pub label: Label,
}

/// Ordered, non-overlapping event sequence covering a fixed duration.
///
/// Invariants are enforced at construction: events sorted strictly ascending
/// by start, first start >= 0, every start < duration, and a non-zero
/// duration implies at least one event.
#[derive(Clone, Debug, serde::Serialize)]
pub struct Timeline {
    events: Vec<TimedEvent>,
    duration: f64,
}

impl Timeline {
    /// Build a timeline from pre-ordered events, validating all invariants.
    pub fn new(events: Vec<TimedEvent>, duration: f64) -> LipwaveResult<Self> {
        if !duration.is_finite() || duration < 0.0 {
            return Err(LipwaveError::validation(format!(
                "timeline duration must be finite and >= 0, got {duration}"
            )));
        }
        if events.is_empty() {
            if duration > 0.0 {
                return Err(LipwaveError::empty_timeline(format!(
                    "no events for a declared duration of {duration}s"
                )));
            }
            return Ok(Self { events, duration });
        }

        if events[0].start < 0.0 {
            return Err(LipwaveError::validation(format!(
                "first event start must be >= 0, got {}",
                events[0].start
            )));
        }
        for pair in events.windows(2) {
            if !(pair[0].start < pair[1].start) {
                return Err(LipwaveError::validation(format!(
                    "event starts must be strictly increasing ({} then {})",
                    pair[0].start, pair[1].start
                )));
            }
        }
        let last = events[events.len() - 1].start;
        if !(last < duration) {
            return Err(LipwaveError::validation(format!(
                "event at {last}s is at or past timeline duration {duration}s"
            )));
        }

        Ok(Self { events, duration })
    }

    /// The empty zero-duration timeline.
    pub fn empty() -> Self {
        Self {
            events: Vec::new(),
            duration: 0.0,
        }
    }

    /// Normalize raw recognizer segments into a timeline.
    ///
    /// Segments are sorted by start, consecutive runs of the same label are
    /// collapsed into one event (recognizer jitter would otherwise force
    /// redundant frame recomputation), and the duration is taken from the
    /// recognizer's reported total, falling back to the last start plus
    /// `min_interval` when unspecified.
    pub fn from_segments(
        mut segments: Vec<(f64, Label)>,
        total_duration: Option<f64>,
        min_interval: f64,
    ) -> LipwaveResult<Self> {
        if segments.is_empty() {
            let duration = total_duration.unwrap_or(0.0);
            if duration > 0.0 {
                return Err(LipwaveError::empty_timeline(format!(
                    "recognizer produced no segments for {duration}s of audio"
                )));
            }
            return Ok(Self::empty());
        }

        segments.sort_by(|a, b| a.0.total_cmp(&b.0));
        for pair in segments.windows(2) {
            if pair[0].0 == pair[1].0 {
                return Err(LipwaveError::validation(format!(
                    "two recognizer segments share start time {}",
                    pair[0].0
                )));
            }
        }

        let mut events: Vec<TimedEvent> = Vec::with_capacity(segments.len());
        for (start, label) in segments {
            if events.last().is_some_and(|prev| prev.label == label) {
                continue;
            }
            events.push(TimedEvent { start, label });
        }

        let last_start = events[events.len() - 1].start;
        let duration = total_duration.unwrap_or(last_start + min_interval);
        Self::new(events, duration)
    }

    /// Events in ascending start order.
    pub fn events(&self) -> &[TimedEvent] {
        &self.events
    }

    /// Covered duration in seconds.
    pub fn duration(&self) -> f64 {
        self.duration
    }

    /// Return `true` when the timeline has no events.
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Label active at timestamp `t`: the event with the greatest
    /// `start <= t`. `None` before the first event.
    pub fn label_at(&self, t: f64) -> Option<Label> {
        let idx = self.events.partition_point(|e| e.start <= t);
        if idx == 0 {
            return None;
        }
        Some(self.events[idx - 1].label)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn label(c: char) -> Label {
        Label::parse(&c.to_string()).unwrap()
    }

    #[test]
    fn label_parse_accepts_single_uppercase_only() {
        assert!(Label::parse("A").is_ok());
        assert!(Label::parse("X").is_ok());
        assert!(Label::parse("a").is_err());
        assert!(Label::parse("AB").is_err());
        assert!(Label::parse("").is_err());
        assert!(Label::parse("1").is_err());
    }

    #[test]
    fn from_segments_collapses_identical_runs() {
        let segments = vec![
            (0.0, label('A')),
            (0.1, label('A')),
            (0.2, label('A')),
            (0.5, label('B')),
        ];
        let tl = Timeline::from_segments(segments, Some(1.0), 1.0 / 24.0).unwrap();
        assert_eq!(tl.events().len(), 2);
        assert_eq!(tl.events()[0].start, 0.0);
        assert_eq!(tl.events()[0].label, label('A'));
        assert_eq!(tl.events()[1].start, 0.5);
        assert_eq!(tl.events()[1].label, label('B'));
    }

    #[test]
    fn from_segments_sorts_unordered_input() {
        let segments = vec![(0.5, label('B')), (0.0, label('A'))];
        let tl = Timeline::from_segments(segments, Some(1.0), 1.0 / 24.0).unwrap();
        assert_eq!(tl.events()[0].label, label('A'));
        assert_eq!(tl.events()[1].label, label('B'));
    }

    #[test]
    fn from_segments_rejects_duplicate_starts() {
        let segments = vec![(0.5, label('A')), (0.5, label('B'))];
        let err = Timeline::from_segments(segments, Some(1.0), 1.0 / 24.0).unwrap_err();
        assert!(matches!(err, LipwaveError::Validation(_)));
    }

    #[test]
    fn from_segments_rejects_empty_with_nonzero_duration() {
        let err = Timeline::from_segments(Vec::new(), Some(2.0), 1.0 / 24.0).unwrap_err();
        assert!(matches!(err, LipwaveError::EmptyTimeline(_)));
    }

    #[test]
    fn from_segments_empty_with_zero_duration_is_empty_timeline() {
        let tl = Timeline::from_segments(Vec::new(), None, 1.0 / 24.0).unwrap();
        assert!(tl.is_empty());
        assert_eq!(tl.duration(), 0.0);
    }

    #[test]
    fn from_segments_duration_falls_back_to_last_start_plus_interval() {
        let segments = vec![(0.0, label('A')), (1.0, label('B'))];
        let tl = Timeline::from_segments(segments, None, 1.0 / 24.0).unwrap();
        assert_eq!(tl.duration(), 1.0 + 1.0 / 24.0);
    }

    #[test]
    fn new_rejects_event_past_duration() {
        let events = vec![TimedEvent {
            start: 2.0,
            label: label('A'),
        }];
        assert!(Timeline::new(events, 1.5).is_err());
    }

    #[test]
    fn label_at_resolves_greatest_start_at_or_before() {
        let events = vec![
            TimedEvent {
                start: 0.0,
                label: label('A'),
            },
            TimedEvent {
                start: 1.0,
                label: label('B'),
            },
        ];
        let tl = Timeline::new(events, 2.0).unwrap();
        assert_eq!(tl.label_at(0.0), Some(label('A')));
        assert_eq!(tl.label_at(0.99), Some(label('A')));
        assert_eq!(tl.label_at(1.0), Some(label('B')));
        assert_eq!(tl.label_at(1.99), Some(label('B')));
    }

    #[test]
    fn label_at_before_first_event_is_none() {
        let events = vec![TimedEvent {
            start: 0.5,
            label: label('A'),
        }];
        let tl = Timeline::new(events, 1.0).unwrap();
        assert_eq!(tl.label_at(0.25), None);
        assert_eq!(tl.label_at(0.5), Some(label('A')));
    }
}
