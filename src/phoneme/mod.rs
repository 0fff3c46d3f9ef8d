//! Phoneme source adapter.
//!
//! Phonemizers hand us one of two shapes: line-oriented text with per-phoneme
//! durations (espeak-ng `--pho`), or a flat list of symbols with no timing at
//! all. Both are normalized into a [`PhonemeSequence`] whose variant records
//! whether durations are known.

mod parse;

pub use parse::{parse_flat_text, parse_text, parse_timed_lines};

/// Raw phonemizer output, before parsing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PhonemeSource {
    /// Text output from a phonemizer; format is auto-detected.
    Text(String),
    /// A plain array of phoneme symbols (no timing).
    Symbols(Vec<String>),
}

impl PhonemeSource {
    /// Normalize this source into a phoneme sequence.
    ///
    /// Never fails: text that matches neither format yields an empty sequence.
    pub fn parse(&self) -> PhonemeSequence {
        match self {
            Self::Text(text) => parse_text(text),
            Self::Symbols(symbols) => PhonemeSequence::Untimed(symbols.clone()),
        }
    }
}

impl From<&str> for PhonemeSource {
    fn from(text: &str) -> Self {
        Self::Text(text.to_owned())
    }
}

impl From<Vec<String>> for PhonemeSource {
    fn from(symbols: Vec<String>) -> Self {
        Self::Symbols(symbols)
    }
}

/// A phoneme with a duration reported by the phonemizer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimedPhoneme {
    pub symbol: String,
    pub duration_ms: u64,
}

impl TimedPhoneme {
    pub fn new(symbol: impl Into<String>, duration_ms: u64) -> Self {
        Self {
            symbol: symbol.into(),
            duration_ms,
        }
    }
}

/// Whether a token's duration came from the phonemizer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhonemeDuration {
    /// Reported duration in milliseconds.
    Known(u64),
    /// No timing available; estimated by the synthesizer.
    Unknown,
}

/// Borrowed view of one token in a [`PhonemeSequence`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhonemeToken<'a> {
    pub symbol: &'a str,
    pub duration: PhonemeDuration,
}

/// Ordered phonemes in speech order. The two policies never mix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PhonemeSequence {
    /// Every token has a known duration.
    Timed(Vec<TimedPhoneme>),
    /// No token has a known duration.
    Untimed(Vec<String>),
}

impl PhonemeSequence {
    pub fn len(&self) -> usize {
        match self {
            Self::Timed(p) => p.len(),
            Self::Untimed(p) => p.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether durations were reported by the phonemizer.
    pub fn is_timed(&self) -> bool {
        matches!(self, Self::Timed(_))
    }

    /// Iterate tokens with their duration discriminant.
    pub fn tokens(&self) -> Box<dyn Iterator<Item = PhonemeToken<'_>> + '_> {
        match self {
            Self::Timed(p) => Box::new(p.iter().map(|t| PhonemeToken {
                symbol: &t.symbol,
                duration: PhonemeDuration::Known(t.duration_ms),
            })),
            Self::Untimed(p) => Box::new(p.iter().map(|s| PhonemeToken {
                symbol: s,
                duration: PhonemeDuration::Unknown,
            })),
        }
    }

    /// Symbols in order, dropping any timing.
    pub fn symbols(&self) -> Vec<&str> {
        self.tokens().map(|t| t.symbol).collect()
    }
}
