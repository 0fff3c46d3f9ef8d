//! Viseme timelines for lip-sync animation.
//!
//! A viseme is a visual mouth shape that corresponds to a phoneme (sound).
//! This module maps phonemes to blendshape weights for a 3D avatar and lays
//! them out on a timeline matching the synthesized audio.

pub mod mapping;
pub mod timeline;

pub use mapping::{FALLBACK_SHAPE, PhoneticClass, classify, map_phoneme};
pub use timeline::{MAX_TARGET_SECS, Keyframe, Timeline, TimelineError, TimelineSynthesizer};
