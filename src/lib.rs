//! Mouthpiece: phoneme-driven lip-sync keyframes for 3D avatars.
//!
//! Turns phonemizer output into a timeline of ARKit-style blendshape
//! keyframes that spans a target audio duration.
//!
//! # Architecture
//!
//! - **Phoneme source**: parses espeak-ng `--pho` text or a flat symbol list
//!   into a [`PhonemeSequence`]
//! - **Mapping**: an ordered rule table maps each phoneme to a partial
//!   blendshape configuration
//! - **Timeline**: lays mouth shapes out over the target duration, rescaling
//!   reported timing or splitting it equally, with neutral bookends
//! - **Phonemizers**: `espeak-ng` and TTS-script backends run as child processes
//! - **Store**: writes `blendshapes-<id>.json` files and prunes old ones
//!
//! [`VisemeService`] wires these together for one request at a time.

pub mod app_dirs;
pub mod blendshape;
pub mod config;
pub mod error;
pub mod phoneme;
pub mod phonemizer;
pub mod service;
pub mod store;
pub mod viseme;

pub use blendshape::{BLENDSHAPE_COUNT, Blendshape, BlendshapeVector};
pub use config::{MouthpieceConfig, PhonemizerMode, TimelineConfig};
pub use error::{Result, VisemeError};
pub use phoneme::{PhonemeSequence, PhonemeSource, TimedPhoneme};
pub use service::{TalkRequest, TalkResponse, VisemeService};
pub use store::{FsKeyframeStore, KeyframeStore};
pub use viseme::{Keyframe, Timeline, TimelineSynthesizer, map_phoneme};

/// Synthesize a timeline from raw phonemizer output with default tuning.
///
/// Returns `Ok(None)` when the source yields no phonemes.
///
/// # Errors
///
/// Returns [`VisemeError::InvalidInput`] if `target_secs` is not a positive,
/// finite number.
pub fn synthesize(source: &PhonemeSource, target_secs: f64) -> Result<Option<Timeline>> {
    TimelineSynthesizer::default().synthesize(&source.parse(), target_secs)
}
