//! External phonemizers.
//!
//! A [`PhonemeBackend`] turns request text into a [`PhonemeSource`] by
//! shelling out to a speech tool. Two backends exist:
//!
//! - [`EspeakBackend`]: `espeak-ng --pho`, whose output carries per-phoneme
//!   durations in milliseconds.
//! - [`ScriptBackend`]: a TTS script that writes an audio file plus a JSON
//!   array of phoneme symbols, with no timing.

mod espeak;
mod script;

pub use espeak::EspeakBackend;
pub use script::ScriptBackend;

use std::path::{Path, PathBuf};
use std::process::{Output, Stdio};
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tokio::time::timeout;

use crate::config::PhonemizerMode;
use crate::error::{Result, VisemeError};
use crate::phoneme::PhonemeSource;

/// Produces phonemes for a piece of text.
#[async_trait]
pub trait PhonemeBackend: Send + Sync {
    /// The mode this backend serves.
    fn mode(&self) -> PhonemizerMode;

    /// Phonemize `text`.
    ///
    /// # Errors
    ///
    /// Returns [`VisemeError::UpstreamUnavailable`] if the tool cannot be
    /// run, fails, times out, or produces unusable output.
    async fn phonemize(&self, text: &str) -> Result<PhonemeSource>;
}

/// Resolve a binary to an executable path.
///
/// Absolute or relative paths are used as given; bare names go through a
/// `PATH` lookup.
pub(crate) fn resolve_binary(binary: &Path) -> Result<PathBuf> {
    if binary.components().count() > 1 {
        return Ok(binary.to_path_buf());
    }
    which::which(binary).map_err(|e| {
        VisemeError::UpstreamUnavailable(format!("{} not found: {e}", binary.display()))
    })
}

/// Run `command` to completion, killing it after `deadline`.
///
/// A non-zero exit status is an error carrying the tool's stderr.
pub(crate) async fn run_with_timeout(
    mut command: Command,
    deadline: Duration,
    label: &str,
) -> Result<Output> {
    command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let child = command
        .spawn()
        .map_err(|e| VisemeError::UpstreamUnavailable(format!("failed to run {label}: {e}")))?;

    let output = timeout(deadline, child.wait_with_output())
        .await
        .map_err(|_| {
            VisemeError::UpstreamUnavailable(format!(
                "{label} timed out after {}s",
                deadline.as_secs_f64()
            ))
        })?
        .map_err(|e| VisemeError::UpstreamUnavailable(format!("{label} failed: {e}")))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(VisemeError::UpstreamUnavailable(format!(
            "{label} exited with {}: {}",
            output.status,
            stderr.trim()
        )));
    }
    Ok(output)
}
