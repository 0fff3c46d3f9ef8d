use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, error};

use super::{PhonemeSequence, TimedPhoneme};

/// `<phoneme>[_digit]?[*]? <duration_ms> ...` as printed by `espeak-ng --pho`.
static PHO_LINE: Lazy<Option<Regex>> = Lazy::new(|| {
    Regex::new(r"^\s*([a-zA-Z]+[_\d]?\*?)\s+(\d+)")
        .map_err(|e| error!("invalid pho line pattern: {e}"))
        .ok()
});

/// Stress (`'`, `,`) and boundary (`_`, `?`) markers in `-x` style output.
const FLAT_MARKERS: [char; 4] = ['\'', ',', '_', '?'];

/// Parse phonemizer text, preferring timed lines and falling back to a flat
/// symbol list.
pub fn parse_text(text: &str) -> PhonemeSequence {
    let timed = parse_timed_lines(text);
    if !timed.is_empty() {
        debug!("parsed {} timed phonemes", timed.len());
        return PhonemeSequence::Timed(timed);
    }

    let flat = parse_flat_text(text);
    debug!("parsed {} untimed phonemes (flat fallback)", flat.len());
    PhonemeSequence::Untimed(flat)
}

/// Parse `--pho` style lines.
///
/// Lines before the first match are skipped; once a line has matched, the
/// first line that does not match ends the phoneme block.
pub fn parse_timed_lines(text: &str) -> Vec<TimedPhoneme> {
    let Some(pattern) = PHO_LINE.as_ref() else {
        return Vec::new();
    };

    let mut phonemes = Vec::new();
    for line in text.trim().lines() {
        let parsed = pattern.captures(line).and_then(|caps| {
            let symbol = caps.get(1)?.as_str().replace('*', "");
            let duration_ms = caps.get(2)?.as_str().parse::<u64>().ok()?;
            Some(TimedPhoneme::new(symbol, duration_ms))
        });

        match parsed {
            Some(phoneme) => phonemes.push(phoneme),
            None if !phonemes.is_empty() => break,
            None => {}
        }
    }
    phonemes
}

/// Parse `-x` style output: whitespace separated symbols with stress and
/// boundary markers removed.
pub fn parse_flat_text(text: &str) -> Vec<String> {
    let joined = text.trim().lines().collect::<Vec<_>>().join(" ");
    joined
        .split_whitespace()
        .map(|raw| raw.replace(FLAT_MARKERS, ""))
        .filter(|symbol| !symbol.is_empty())
        .collect()
}
