//! Phoneme to blendshape mapping.
//!
//! Symbols are classified by an ordered rule table (first match wins). The
//! weights were calibrated by eye against the avatar rig, tuned for fairly
//! pronounced mouth movement on Italian speech.

use once_cell::sync::Lazy;
use regex::Regex;
use std::fmt;
use tracing::error;

use crate::blendshape::PartialShape;

use crate::blendshape::Blendshape::{
    JawOpen, MouthClose, MouthFunnel, MouthPucker, MouthShrugUpper, MouthStretchLeft,
    MouthStretchRight, TongueOut,
};

/// Phonetic class a symbol falls into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PhoneticClass {
    /// /a/ (mouth open wide)
    OpenA,
    /// /e/, /ɛ/
    E,
    /// /i/ (lips stretched)
    I,
    /// /o/, /ɔ/ (rounded)
    O,
    /// /u/ (rounded, small)
    U,
    /// /tʃ/, /dʒ/, /ʃ/, /ʒ/
    Postalveolar,
    /// /p/, /b/, /m/ (lips pressed together)
    Bilabial,
    /// /f/, /v/ (teeth on lip)
    Labiodental,
    /// /t/, /d/, /n/
    Alveolar,
    /// /k/, /g/, /ŋ/
    Velar,
    /// /l/, /r/
    Liquid,
    /// /ɲ/ ("gn")
    PalatalNasal,
    /// /ʎ/ ("gli")
    PalatalLateral,
    /// /s/, /z/
    Sibilant,
    /// /w/, /j/
    Semivowel,
}

impl fmt::Display for PhoneticClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::OpenA => "open-a",
            Self::E => "e",
            Self::I => "i",
            Self::O => "o",
            Self::U => "u",
            Self::Postalveolar => "postalveolar",
            Self::Bilabial => "bilabial",
            Self::Labiodental => "labiodental",
            Self::Alveolar => "alveolar",
            Self::Velar => "velar",
            Self::Liquid => "liquid",
            Self::PalatalNasal => "palatal-nasal",
            Self::PalatalLateral => "palatal-lateral",
            Self::Sibilant => "sibilant",
            Self::Semivowel => "semivowel",
        };
        f.write_str(label)
    }
}

/// Shape for symbols no rule matches: relaxed, nearly closed mouth.
pub const FALLBACK_SHAPE: &PartialShape = &[(JawOpen, 0.05), (MouthClose, 0.1)];

/// A single classification rule.
struct RuleEntry {
    class: PhoneticClass,
    pattern: &'static str,
    shape: &'static PartialShape,
}

/// Rule table. **Order matters**: `S`/`Z` (postalveolar) must be tried
/// before the lowercase sibilants, and matching is case-sensitive.
static RULE_TABLE: &[RuleEntry] = &[
    // Single `a`/`A` from espeak plus the script phonemizer's `ao`. Both
    // alternatives are anchored so `ai` or `ab` fall through.
    RuleEntry {
        class: PhoneticClass::OpenA,
        pattern: r"^(?:[aA]|ao)$",
        shape: &[(JawOpen, 0.8), (MouthClose, 0.1)],
    },
    RuleEntry {
        class: PhoneticClass::E,
        pattern: r"^[eEɛ]$",
        shape: &[
            (JawOpen, 0.6),
            (MouthStretchLeft, 0.5),
            (MouthStretchRight, 0.5),
            (MouthClose, 0.2),
        ],
    },
    RuleEntry {
        class: PhoneticClass::I,
        pattern: r"^[iI]$",
        shape: &[
            (JawOpen, 0.3),
            (MouthStretchLeft, 0.8),
            (MouthStretchRight, 0.8),
            (MouthClose, 0.1),
        ],
    },
    RuleEntry {
        class: PhoneticClass::O,
        pattern: r"^[oOɔ]$",
        shape: &[
            (JawOpen, 0.6),
            (MouthPucker, 0.7),
            (MouthFunnel, 0.5),
            (MouthClose, 0.1),
        ],
    },
    RuleEntry {
        class: PhoneticClass::U,
        pattern: r"^[uU]$",
        shape: &[
            (JawOpen, 0.4),
            (MouthPucker, 0.9),
            (MouthFunnel, 0.6),
            (MouthClose, 0.1),
        ],
    },
    RuleEntry {
        class: PhoneticClass::Postalveolar,
        pattern: r"^(?:tS|dZ|S|Z)$",
        shape: &[
            (MouthPucker, 0.5),
            (JawOpen, 0.3),
            (MouthShrugUpper, 0.6),
            (MouthClose, 0.2),
        ],
    },
    RuleEntry {
        class: PhoneticClass::Bilabial,
        pattern: r"^[pbm]$",
        shape: &[(MouthClose, 1.0), (JawOpen, 0.05)],
    },
    RuleEntry {
        class: PhoneticClass::Labiodental,
        pattern: r"^[fv]$",
        shape: &[(MouthShrugUpper, 0.8), (JawOpen, 0.2), (MouthClose, 0.3)],
    },
    RuleEntry {
        class: PhoneticClass::Alveolar,
        pattern: r"^[tdn]$",
        shape: &[(JawOpen, 0.2), (MouthShrugUpper, 0.7), (MouthClose, 0.3)],
    },
    RuleEntry {
        class: PhoneticClass::Velar,
        pattern: r"^[kgN]$",
        shape: &[(JawOpen, 0.4), (MouthClose, 0.2)],
    },
    RuleEntry {
        class: PhoneticClass::Liquid,
        pattern: r"^[lr]$",
        shape: &[(JawOpen, 0.3), (TongueOut, 0.5), (MouthClose, 0.2)],
    },
    RuleEntry {
        class: PhoneticClass::PalatalNasal,
        pattern: r"^J$",
        shape: &[
            (JawOpen, 0.3),
            (MouthStretchLeft, 0.4),
            (MouthStretchRight, 0.4),
            (MouthClose, 0.2),
        ],
    },
    RuleEntry {
        class: PhoneticClass::PalatalLateral,
        pattern: r"^L$",
        shape: &[(JawOpen, 0.3), (TongueOut, 0.4), (MouthClose, 0.2)],
    },
    RuleEntry {
        class: PhoneticClass::Sibilant,
        pattern: r"^[sz]$",
        shape: &[
            (JawOpen, 0.2),
            (MouthStretchLeft, 0.3),
            (MouthStretchRight, 0.3),
            (MouthShrugUpper, 0.5),
            (MouthClose, 0.3),
        ],
    },
    RuleEntry {
        class: PhoneticClass::Semivowel,
        pattern: r"^[wj]$",
        shape: &[(JawOpen, 0.3), (MouthPucker, 0.6), (MouthFunnel, 0.4)],
    },
];

struct Rule {
    class: PhoneticClass,
    pattern: Regex,
    shape: &'static PartialShape,
}

static RULES: Lazy<Vec<Rule>> = Lazy::new(|| {
    RULE_TABLE
        .iter()
        .filter_map(|entry| match Regex::new(entry.pattern) {
            Ok(pattern) => Some(Rule {
                class: entry.class,
                pattern,
                shape: entry.shape,
            }),
            Err(e) => {
                error!("invalid viseme pattern for {}: {e}", entry.class);
                None
            }
        })
        .collect()
});

/// Strip stress and length marks before lookup.
fn normalize(symbol: &str) -> String {
    symbol.replace(['\'', '_', ':'], "")
}

fn matching_rule(symbol: &str) -> Option<&'static Rule> {
    let symbol = normalize(symbol);
    RULES.iter().find(|rule| rule.pattern.is_match(&symbol))
}

/// Classify a phoneme symbol, or `None` if no rule matches.
pub fn classify(symbol: &str) -> Option<PhoneticClass> {
    matching_rule(symbol).map(|rule| rule.class)
}

/// Map a phoneme symbol to the blendshapes it moves.
///
/// Never fails: unmatched symbols get [`FALLBACK_SHAPE`].
pub fn map_phoneme(symbol: &str) -> &'static PartialShape {
    matching_rule(symbol).map_or(FALLBACK_SHAPE, |rule| rule.shape)
}
