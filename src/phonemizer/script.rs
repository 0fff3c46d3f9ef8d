//! TTS-script phonemizer.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, warn};

use super::{PhonemeBackend, resolve_binary, run_with_timeout};
use crate::config::{PhonemizerMode, ScriptConfig};
use crate::error::{Result, VisemeError};
use crate::phoneme::PhonemeSource;

const WAV_NAME: &str = "speech.wav";
const JSON_NAME: &str = "phonemes.json";

/// Runs `<interpreter> <script> <text> <wav> <json>` in a scratch directory
/// and reads the JSON array of phoneme symbols the script leaves behind.
///
/// The synthesized audio is discarded; only the symbols are used.
#[derive(Debug, Clone)]
pub struct ScriptBackend {
    interpreter: PathBuf,
    script: PathBuf,
    timeout: Duration,
}

impl ScriptBackend {
    pub fn new(interpreter: impl Into<PathBuf>, script: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            interpreter: interpreter.into(),
            script: script.into(),
            timeout,
        }
    }

    /// Build a backend from configuration, or `None` when no script is set.
    pub fn from_config(config: &ScriptConfig, timeout: Duration) -> Option<Self> {
        config
            .script_path
            .as_ref()
            .map(|script| Self::new(config.interpreter.clone(), script.clone(), timeout))
    }

    fn parse_symbols(raw: &str) -> Result<Vec<String>> {
        let value: serde_json::Value = serde_json::from_str(raw).map_err(|e| {
            VisemeError::UpstreamUnavailable(format!("phoneme JSON is not valid: {e}"))
        })?;
        let serde_json::Value::Array(items) = value else {
            return Err(VisemeError::UpstreamUnavailable(
                "phoneme JSON is not an array".into(),
            ));
        };

        let mut symbols = Vec::with_capacity(items.len());
        for item in items {
            match item {
                serde_json::Value::String(s) => symbols.push(s),
                other => warn!("skipping non-string phoneme entry: {other}"),
            }
        }
        Ok(symbols)
    }
}

#[async_trait]
impl PhonemeBackend for ScriptBackend {
    fn mode(&self) -> PhonemizerMode {
        PhonemizerMode::Script
    }

    async fn phonemize(&self, text: &str) -> Result<PhonemeSource> {
        let interpreter = resolve_binary(&self.interpreter)?;
        let scratch = tempfile::Builder::new()
            .prefix("mouthpiece-script-")
            .tempdir()
            .map_err(|e| VisemeError::UpstreamUnavailable(format!("scratch directory: {e}")))?;
        let wav_path = scratch.path().join(WAV_NAME);
        let json_path = scratch.path().join(JSON_NAME);

        let mut command = Command::new(&interpreter);
        command
            .arg(&self.script)
            .arg(text)
            .arg(&wav_path)
            .arg(&json_path);

        debug!(
            "running {} {}",
            interpreter.display(),
            self.script.display()
        );
        let output = run_with_timeout(command, self.timeout, "tts script").await?;

        let raw = tokio::fs::read_to_string(&json_path).await.map_err(|e| {
            let stdout = String::from_utf8_lossy(&output.stdout);
            VisemeError::UpstreamUnavailable(format!(
                "tts script did not write {}: {e}; output: {}",
                json_path.display(),
                stdout.trim()
            ))
        })?;

        let symbols = Self::parse_symbols(&raw)?;
        debug!("tts script produced {} phonemes", symbols.len());
        Ok(PhonemeSource::Symbols(symbols))
    }
}
