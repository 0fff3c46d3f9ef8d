//! Keyframe timeline synthesis.
//!
//! Turns a [`PhonemeSequence`] and the measured audio duration into a
//! [`Timeline`]: ordered keyframes that start and end on the neutral pose,
//! with the last key exactly at the audio duration.

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::mapping::map_phoneme;
use crate::blendshape::BlendshapeVector;
use crate::config::{TimelineConfig, TimingPolicy, UntimedEmission};
use crate::error::{Result, VisemeError};
use crate::phoneme::{PhonemeSequence, TimedPhoneme};

/// Longest utterance, in seconds, a timeline may span.
pub const MAX_TARGET_SECS: f64 = 300.0;

/// A timestamped full blendshape vector.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Keyframe {
    /// Seconds from the start of the audio.
    pub time: f64,
    #[serde(rename = "blendshapes")]
    pub shapes: BlendshapeVector,
}

impl Keyframe {
    pub fn new(time: f64, shapes: BlendshapeVector) -> Self {
        Self { time, shapes }
    }

    pub fn neutral(time: f64) -> Self {
        Self::new(time, BlendshapeVector::NEUTRAL)
    }
}

/// Reasons a keyframe list is not a valid timeline.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TimelineError {
    #[error("timeline needs at least two keyframes, got {0}")]
    TooShort(usize),
    #[error("first keyframe must be neutral at time 0")]
    BadStart,
    #[error("last keyframe must be neutral")]
    BadEnd,
    #[error("keyframe {index} has invalid time {time}")]
    InvalidTime { index: usize, time: f64 },
    #[error("keyframe {index} goes back in time")]
    OutOfOrder { index: usize },
}

/// Ordered keyframes for one utterance. Immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(into = "Vec<Keyframe>", try_from = "Vec<Keyframe>")]
pub struct Timeline {
    keyframes: Vec<Keyframe>,
}

impl Timeline {
    pub fn keyframes(&self) -> &[Keyframe] {
        &self.keyframes
    }

    pub fn len(&self) -> usize {
        self.keyframes.len()
    }

    /// Always false: a timeline has at least its two neutral bookends.
    pub fn is_empty(&self) -> bool {
        self.keyframes.is_empty()
    }

    /// Time of the last keyframe (the audio duration).
    pub fn duration(&self) -> f64 {
        self.keyframes.last().map_or(0.0, |k| k.time)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Keyframe> {
        self.keyframes.iter()
    }
}

impl TryFrom<Vec<Keyframe>> for Timeline {
    type Error = TimelineError;

    fn try_from(keyframes: Vec<Keyframe>) -> std::result::Result<Self, Self::Error> {
        let (Some(first), Some(last)) = (keyframes.first(), keyframes.last()) else {
            return Err(TimelineError::TooShort(0));
        };
        if keyframes.len() < 2 {
            return Err(TimelineError::TooShort(keyframes.len()));
        }
        if first.time != 0.0 || !first.shapes.is_neutral() {
            return Err(TimelineError::BadStart);
        }
        if !last.shapes.is_neutral() {
            return Err(TimelineError::BadEnd);
        }
        for (index, pair) in keyframes.windows(2).enumerate() {
            let time = pair[1].time;
            if !time.is_finite() {
                return Err(TimelineError::InvalidTime {
                    index: index + 1,
                    time,
                });
            }
            if time < pair[0].time {
                return Err(TimelineError::OutOfOrder { index: index + 1 });
            }
        }
        Ok(Self { keyframes })
    }
}

impl From<Timeline> for Vec<Keyframe> {
    fn from(timeline: Timeline) -> Self {
        timeline.keyframes
    }
}

impl<'a> IntoIterator for &'a Timeline {
    type Item = &'a Keyframe;
    type IntoIter = std::slice::Iter<'a, Keyframe>;

    fn into_iter(self) -> Self::IntoIter {
        self.keyframes.iter()
    }
}

/// Builds timelines from phoneme sequences.
#[derive(Debug, Clone, Default)]
pub struct TimelineSynthesizer {
    config: TimelineConfig,
}

impl TimelineSynthesizer {
    /// Create a synthesizer.
    ///
    /// # Errors
    ///
    /// Returns [`VisemeError::Config`] if `config` fails validation.
    pub fn new(config: TimelineConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &TimelineConfig {
        &self.config
    }

    /// Synthesize a timeline lasting exactly `target_secs`.
    ///
    /// Returns `Ok(None)` when there are no phonemes: nothing to animate,
    /// which callers must keep distinct from an idle timeline.
    ///
    /// # Errors
    ///
    /// Returns [`VisemeError::InvalidInput`] if `target_secs` is not a
    /// positive finite number no greater than [`MAX_TARGET_SECS`].
    pub fn synthesize(
        &self,
        phonemes: &PhonemeSequence,
        target_secs: f64,
    ) -> Result<Option<Timeline>> {
        if !target_secs.is_finite() || target_secs <= 0.0 {
            return Err(VisemeError::InvalidInput(format!(
                "target duration must be positive, got {target_secs}"
            )));
        }
        if target_secs > MAX_TARGET_SECS {
            return Err(VisemeError::InvalidInput(format!(
                "target duration {target_secs}s exceeds {MAX_TARGET_SECS}s"
            )));
        }
        if phonemes.is_empty() {
            debug!("no phonemes, nothing to animate");
            return Ok(None);
        }

        let frames = match (self.config.timing, phonemes) {
            (TimingPolicy::Auto, PhonemeSequence::Timed(timed)) => {
                self.native_frames(timed, target_secs)
            }
            _ => self.equal_share_frames(&phonemes.symbols(), target_secs),
        };

        Ok(Some(self.finalize(frames, target_secs)))
    }

    /// Dwell keys at reported timing, stretched to the target if needed.
    fn native_frames(&self, timed: &[TimedPhoneme], target_secs: f64) -> Vec<Keyframe> {
        let mut frames = Vec::with_capacity(timed.len() * 2);
        let mut cursor = 0.0;
        for phoneme in timed {
            let duration = phoneme.duration_ms as f64 / 1000.0;
            self.push_dwell(&mut frames, &phoneme.symbol, cursor, duration);
            cursor += duration;
        }

        let source_total = cursor;
        let mismatch = (source_total - target_secs).abs();
        if source_total > 0.0 && mismatch > self.config.rescale_tolerance_secs {
            let factor = target_secs / source_total;
            debug!(
                "rescaling timed phonemes: source {source_total:.4}s, target {target_secs:.4}s, factor {factor:.4}"
            );
            for frame in &mut frames {
                frame.time *= factor;
            }
        } else {
            debug!("keeping reported timing: source {source_total:.4}s, target {target_secs:.4}s");
        }
        frames
    }

    /// Equal slots of `target / n` seconds per phoneme.
    fn equal_share_frames(&self, symbols: &[&str], target_secs: f64) -> Vec<Keyframe> {
        let slot = target_secs / symbols.len() as f64;
        debug!(
            "estimating timing: {} phonemes, {:.4}s each",
            symbols.len(),
            slot
        );

        let mut frames = Vec::new();
        for (i, symbol) in symbols.iter().enumerate() {
            let start = i as f64 * slot;
            match self.config.untimed_emission {
                UntimedEmission::Dwell => self.push_slot_dwell(&mut frames, symbol, start, slot),
                UntimedEmission::Sampled => {
                    let end = (i + 1) as f64 * slot;
                    self.push_sampled(&mut frames, symbol, start, end);
                }
            }
        }
        frames
    }

    /// Onset just after the phoneme starts, release back to neutral just
    /// before it ends. The release is dropped when it would not follow the
    /// onset.
    fn push_dwell(&self, frames: &mut Vec<Keyframe>, symbol: &str, start: f64, duration: f64) {
        if duration <= 0.0 {
            return;
        }
        let offset = self.config.dwell_offset_secs;
        let onset = start + offset;
        frames.push(Keyframe::new(
            onset,
            BlendshapeVector::from_partial(map_phoneme(symbol)),
        ));

        let release = start + duration - offset;
        if release > onset {
            frames.push(Keyframe::neutral(release));
        }
    }

    /// Dwell keys for an equal-share slot. A slot no longer than the offset
    /// gets a single onset at its midpoint so it stays inside the slot.
    fn push_slot_dwell(&self, frames: &mut Vec<Keyframe>, symbol: &str, start: f64, slot: f64) {
        if slot > self.config.dwell_offset_secs {
            self.push_dwell(frames, symbol, start, slot);
            return;
        }
        frames.push(Keyframe::new(
            start + slot / 2.0,
            BlendshapeVector::from_partial(map_phoneme(symbol)),
        ));
    }

    /// Hold the phoneme's shape across `[start, end)` at the frame rate.
    fn push_sampled(&self, frames: &mut Vec<Keyframe>, symbol: &str, start: f64, end: f64) {
        let shapes = BlendshapeVector::from_partial(map_phoneme(symbol));
        let step = 1.0 / f64::from(self.config.frame_rate);
        let before = frames.len();

        let mut k = 0u64;
        loop {
            let time = start + k as f64 * step;
            if time >= end {
                break;
            }
            if time > 0.0 {
                frames.push(Keyframe::new(time, shapes));
            }
            k += 1;
        }

        // A slot shorter than one step at t=0 would otherwise vanish.
        if frames.len() == before {
            frames.push(Keyframe::new(start + (end - start) / 2.0, shapes));
        }
    }

    /// Round, clamp to `(0, target)`, order, collapse equal times, then add
    /// the neutral bookends.
    fn finalize(&self, mut frames: Vec<Keyframe>, target_secs: f64) -> Timeline {
        if let Some(precision) = self.config.time_precision {
            for frame in &mut frames {
                frame.time = round_to(frame.time, precision);
            }
        }

        frames.retain(|f| f.time > 0.0 && f.time < target_secs);
        frames.sort_by(|a, b| a.time.total_cmp(&b.time));

        let mut keyframes = Vec::with_capacity(frames.len() + 2);
        keyframes.push(Keyframe::neutral(0.0));
        for frame in frames {
            match keyframes.last_mut() {
                // Later-emitted frame wins on a tie.
                Some(last) if last.time == frame.time && last.time > 0.0 => *last = frame,
                _ => keyframes.push(frame),
            }
        }
        keyframes.push(Keyframe::neutral(target_secs));

        debug!("synthesized {} keyframes", keyframes.len());
        Timeline { keyframes }
    }
}

fn round_to(value: f64, decimals: u32) -> f64 {
    let scale = 10f64.powi(decimals as i32);
    (value * scale).round() / scale
}
