//! espeak-ng phonemizer.

use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use super::{PhonemeBackend, resolve_binary, run_with_timeout};
use crate::config::{EspeakConfig, PhonemizerMode};
use crate::error::{Result, VisemeError};
use crate::phoneme::PhonemeSource;

/// Runs `espeak-ng -v <voice> -f <file> -w /dev/null --pho`.
///
/// Text goes through a temp file rather than argv so quoting never matters.
/// The returned source is the combined stdout and stderr of the process,
/// left for [`PhonemeSource::parse`] to interpret.
#[derive(Debug, Clone)]
pub struct EspeakBackend {
    binary: PathBuf,
    voice: String,
    timeout: Duration,
}

impl EspeakBackend {
    pub fn new(config: &EspeakConfig, timeout: Duration) -> Self {
        Self {
            binary: config.binary.clone(),
            voice: config.voice.clone(),
            timeout,
        }
    }

    fn write_input(text: &str) -> Result<tempfile::NamedTempFile> {
        let mut file = tempfile::Builder::new()
            .prefix("mouthpiece-input-")
            .suffix(".txt")
            .tempfile()
            .map_err(|e| VisemeError::UpstreamUnavailable(format!("temp input file: {e}")))?;
        file.write_all(text.as_bytes())
            .and_then(|()| file.flush())
            .map_err(|e| VisemeError::UpstreamUnavailable(format!("temp input file: {e}")))?;
        Ok(file)
    }
}

#[async_trait]
impl PhonemeBackend for EspeakBackend {
    fn mode(&self) -> PhonemizerMode {
        PhonemizerMode::Espeak
    }

    async fn phonemize(&self, text: &str) -> Result<PhonemeSource> {
        let binary = resolve_binary(&self.binary)?;
        let input = Self::write_input(text)?;

        let mut command = Command::new(&binary);
        command
            .arg("-v")
            .arg(&self.voice)
            .arg("-f")
            .arg(input.path())
            .arg("-w")
            .arg("/dev/null")
            .arg("--pho");

        debug!("running {} -v {} --pho", binary.display(), self.voice);
        let output = run_with_timeout(command, self.timeout, "espeak-ng").await?;

        let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
        combined.push_str(&String::from_utf8_lossy(&output.stderr));
        debug!("espeak-ng produced {} bytes", combined.len());
        Ok(PhonemeSource::Text(combined))
    }
}
