//! Request-level viseme generation.
//!
//! [`VisemeService`] is the whole speak-to-keyframes path for one request:
//! validate, phonemize, synthesize, persist.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::{MouthpieceConfig, PhonemizerMode};
use crate::error::{Result, VisemeError};
use crate::phonemizer::{EspeakBackend, PhonemeBackend, ScriptBackend};
use crate::store::{FsKeyframeStore, KeyframeStore, new_request_id};
use crate::viseme::{MAX_TARGET_SECS, TimelineSynthesizer};

/// A lip-sync request: text to speak and the audio duration to fill.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TalkRequest {
    pub text: String,
    /// Target duration in seconds.
    pub duration: f64,
    /// Phonemizer to use; the configured default when absent.
    #[serde(default)]
    pub mode: Option<PhonemizerMode>,
}

/// Result of a [`TalkRequest`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TalkResponse {
    /// Retrieval handle, or `None` when the phonemizer produced nothing usable.
    pub blendshapes_url: Option<String>,
}

/// Generates and stores keyframe timelines for talk requests.
pub struct VisemeService {
    synthesizer: TimelineSynthesizer,
    backends: HashMap<PhonemizerMode, Arc<dyn PhonemeBackend>>,
    store: Arc<dyn KeyframeStore>,
    default_mode: PhonemizerMode,
}

impl std::fmt::Debug for VisemeService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut modes: Vec<_> = self.backends.keys().map(ToString::to_string).collect();
        modes.sort();
        f.debug_struct("VisemeService")
            .field("synthesizer", &self.synthesizer)
            .field("backends", &modes)
            .field("default_mode", &self.default_mode)
            .finish_non_exhaustive()
    }
}

impl VisemeService {
    /// A service with no phonemizers registered.
    pub fn new(synthesizer: TimelineSynthesizer, store: Arc<dyn KeyframeStore>) -> Self {
        Self {
            synthesizer,
            backends: HashMap::new(),
            store,
            default_mode: PhonemizerMode::default(),
        }
    }

    /// Build the service described by `config`: espeak always, the script
    /// backend only when a script path is configured, and a filesystem store.
    ///
    /// # Errors
    ///
    /// Returns an error if the config is invalid or the output directory
    /// cannot be created.
    pub fn from_config(config: &MouthpieceConfig) -> Result<Self> {
        config.validate()?;
        let synthesizer = TimelineSynthesizer::new(config.timeline.clone())?;
        let store = FsKeyframeStore::from_config(&config.store)?;
        let timeout = Duration::from_secs(config.phonemizer.timeout_secs);

        let mut service = Self::new(synthesizer, Arc::new(store))
            .with_default_mode(config.phonemizer.default_mode)
            .with_backend(Arc::new(EspeakBackend::new(
                &config.phonemizer.espeak,
                timeout,
            )));
        if let Some(script) = ScriptBackend::from_config(&config.phonemizer.script, timeout) {
            service = service.with_backend(Arc::new(script));
        }
        Ok(service)
    }

    /// Register `backend` for its mode, replacing any existing one.
    #[must_use]
    pub fn with_backend(mut self, backend: Arc<dyn PhonemeBackend>) -> Self {
        self.backends.insert(backend.mode(), backend);
        self
    }

    #[must_use]
    pub fn with_default_mode(mut self, mode: PhonemizerMode) -> Self {
        self.default_mode = mode;
        self
    }

    pub fn default_mode(&self) -> PhonemizerMode {
        self.default_mode
    }

    /// Handle one talk request.
    ///
    /// # Errors
    ///
    /// - [`VisemeError::InvalidInput`] for empty text, a duration that is not
    ///   in `(0, MAX_TARGET_SECS]`, or a mode with no registered backend.
    /// - [`VisemeError::UpstreamUnavailable`] if the phonemizer fails.
    /// - [`VisemeError::Store`] if the timeline cannot be persisted.
    pub async fn generate(&self, request: &TalkRequest) -> Result<TalkResponse> {
        let text = request.text.trim();
        if text.is_empty() {
            return Err(VisemeError::InvalidInput("text must not be empty".into()));
        }
        if !request.duration.is_finite() || request.duration <= 0.0 {
            return Err(VisemeError::InvalidInput(format!(
                "duration must be a positive number of seconds, got {}",
                request.duration
            )));
        }
        if request.duration > MAX_TARGET_SECS {
            return Err(VisemeError::InvalidInput(format!(
                "duration {}s exceeds the {MAX_TARGET_SECS}s limit",
                request.duration
            )));
        }

        let mode = request.mode.unwrap_or(self.default_mode);
        let backend = self.backends.get(&mode).ok_or_else(|| {
            VisemeError::InvalidInput(format!("phonemizer mode {mode} is not configured"))
        })?;

        let id = new_request_id();
        info!(
            "talk request {id}: mode={mode}, duration={}s, {} chars",
            request.duration,
            text.chars().count()
        );

        let source = backend.phonemize(text).await?;
        let sequence = source.parse();
        debug!(
            "request {id}: {} phonemes (timed: {})",
            sequence.len(),
            sequence.is_timed()
        );

        let Some(timeline) = self.synthesizer.synthesize(&sequence, request.duration)? else {
            info!("request {id}: no phonemes, nothing to animate");
            return Ok(TalkResponse {
                blendshapes_url: None,
            });
        };

        let store = Arc::clone(&self.store);
        let frames = timeline.len();
        let save_id = id.clone();
        let url = tokio::task::spawn_blocking(move || store.save(&timeline, &save_id))
            .await
            .map_err(|e| VisemeError::Store(format!("store task failed: {e}")))??;

        info!("request {id}: {frames} keyframes at {url}");
        Ok(TalkResponse {
            blendshapes_url: Some(url),
        })
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

    use super::*;
    use crate::phoneme::PhonemeSource;
    use async_trait::async_trait;

    struct Canned(PhonemizerMode, PhonemeSource);

    #[async_trait]
    impl PhonemeBackend for Canned {
        fn mode(&self) -> PhonemizerMode {
            self.0
        }

        async fn phonemize(&self, _text: &str) -> Result<PhonemeSource> {
            Ok(self.1.clone())
        }
    }

    fn service(dir: &std::path::Path) -> VisemeService {
        let store = FsKeyframeStore::new(dir, "").unwrap();
        VisemeService::new(TimelineSynthesizer::default(), Arc::new(store)).with_backend(
            Arc::new(Canned(PhonemizerMode::Espeak, "a 100\nm 100\n".into())),
        )
    }

    fn request(text: &str, duration: f64) -> TalkRequest {
        TalkRequest {
            text: text.into(),
            duration,
            mode: None,
        }
    }

    #[test]
    fn request_uses_camel_case_and_optional_mode() {
        let req: TalkRequest =
            serde_json::from_str(r#"{"text":"ciao","duration":1.5,"mode":"python"}"#).unwrap();
        assert_eq!(req.mode, Some(PhonemizerMode::Script));

        let req: TalkRequest = serde_json::from_str(r#"{"text":"ciao","duration":1}"#).unwrap();
        assert_eq!(req.mode, None);

        let json = serde_json::to_string(&TalkResponse {
            blendshapes_url: Some("/blendshapes-x.json".into()),
        })
        .unwrap();
        assert_eq!(json, r#"{"blendshapesUrl":"/blendshapes-x.json"}"#);
    }

    #[tokio::test]
    async fn generate_persists_timeline() {
        let dir = tempfile::tempdir().unwrap();
        let response = service(dir.path())
            .generate(&request("amo", 0.3))
            .await
            .unwrap();

        let url = response.blendshapes_url.unwrap();
        assert!(url.starts_with("/blendshapes-"));
        let file = dir.path().join(url.trim_start_matches('/'));
        assert!(file.exists());
    }

    #[tokio::test]
    async fn empty_text_is_invalid_input() {
        let dir = tempfile::tempdir().unwrap();
        let err = service(dir.path())
            .generate(&request("   ", 1.0))
            .await
            .unwrap_err();
        assert!(matches!(err, VisemeError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn bad_duration_is_invalid_input() {
        let dir = tempfile::tempdir().unwrap();
        let svc = service(dir.path());
        for duration in [0.0, -1.0, f64::NAN, f64::INFINITY, MAX_TARGET_SECS + 1.0] {
            let err = svc.generate(&request("ciao", duration)).await.unwrap_err();
            assert!(matches!(err, VisemeError::InvalidInput(_)), "{duration}");
        }
    }

    #[tokio::test]
    async fn unregistered_mode_is_invalid_input() {
        let dir = tempfile::tempdir().unwrap();
        let mut req = request("ciao", 1.0);
        req.mode = Some(PhonemizerMode::Script);
        let err = service(dir.path()).generate(&req).await.unwrap_err();
        assert!(err.to_string().contains("script"));
    }

    #[tokio::test]
    async fn no_phonemes_yields_no_url() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsKeyframeStore::new(dir.path(), "").unwrap();
        let svc = VisemeService::new(TimelineSynthesizer::default(), Arc::new(store))
            .with_backend(Arc::new(Canned(PhonemizerMode::Espeak, "   \n".into())));

        let response = svc.generate(&request("ciao", 2.0)).await.unwrap();
        assert_eq!(response.blendshapes_url, None);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn from_config_registers_script_only_when_configured() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = MouthpieceConfig::default();
        config.store.output_dir = dir.path().join("public");

        let svc = VisemeService::from_config(&config).unwrap();
        assert!(svc.backends.contains_key(&PhonemizerMode::Espeak));
        assert!(!svc.backends.contains_key(&PhonemizerMode::Script));

        config.phonemizer.script.script_path = Some("/srv/tts.py".into());
        let svc = VisemeService::from_config(&config).unwrap();
        assert!(svc.backends.contains_key(&PhonemizerMode::Script));
        assert!(dir.path().join("public").is_dir());
    }
}
