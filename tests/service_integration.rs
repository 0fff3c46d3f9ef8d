//! Integration tests: talk requests through the service with stand-in
//! phonemizers and stores.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use mouthpiece::blendshape::Blendshape;
use mouthpiece::phonemizer::PhonemeBackend;
use mouthpiece::store::new_request_id;
use mouthpiece::{
    FsKeyframeStore, KeyframeStore, PhonemeSource, PhonemizerMode, TalkRequest, Timeline,
    TimelineSynthesizer, VisemeError, VisemeService,
};

struct FixedBackend {
    mode: PhonemizerMode,
    output: PhonemeSource,
    seen: Mutex<Vec<String>>,
}

impl FixedBackend {
    fn new(mode: PhonemizerMode, output: PhonemeSource) -> Arc<Self> {
        Arc::new(Self {
            mode,
            output,
            seen: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl PhonemeBackend for FixedBackend {
    fn mode(&self) -> PhonemizerMode {
        self.mode
    }

    async fn phonemize(&self, text: &str) -> mouthpiece::Result<PhonemeSource> {
        self.seen.lock().unwrap().push(text.to_owned());
        Ok(self.output.clone())
    }
}

struct DownBackend;

#[async_trait]
impl PhonemeBackend for DownBackend {
    fn mode(&self) -> PhonemizerMode {
        PhonemizerMode::Espeak
    }

    async fn phonemize(&self, _text: &str) -> mouthpiece::Result<PhonemeSource> {
        Err(VisemeError::UpstreamUnavailable("espeak-ng not installed".into()))
    }
}

#[derive(Default)]
struct MemoryStore {
    saved: Mutex<Vec<(String, Timeline)>>,
}

impl KeyframeStore for MemoryStore {
    fn save(&self, timeline: &Timeline, id: &str) -> mouthpiece::Result<String> {
        self.saved
            .lock()
            .unwrap()
            .push((id.to_owned(), timeline.clone()));
        Ok(format!("mem://{id}"))
    }
}

fn talk(text: &str, duration: f64, mode: Option<PhonemizerMode>) -> TalkRequest {
    TalkRequest {
        text: text.to_owned(),
        duration,
        mode,
    }
}

#[tokio::test]
async fn espeak_request_is_stored_and_loadable() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(FsKeyframeStore::new(dir.path(), "/avatar").unwrap());
    let backend = FixedBackend::new(
        PhonemizerMode::Espeak,
        PhonemeSource::from("_ 50\ntS 80 0 100\na 120\no 100\n"),
    );
    let service = VisemeService::new(TimelineSynthesizer::default(), store.clone())
        .with_backend(backend.clone());

    let response = service
        .generate(&talk("  ciao  ", 0.3, None))
        .await
        .unwrap();
    let url = response.blendshapes_url.unwrap();
    let id = url
        .strip_prefix("/avatar/blendshapes-")
        .and_then(|rest| rest.strip_suffix(".json"))
        .unwrap();

    let timeline = store.load(id).unwrap();
    assert_eq!(timeline.duration(), 0.3);
    assert!(timeline.len() > 2);
    assert_eq!(backend.seen.lock().unwrap().as_slice(), ["ciao"]);
}

#[tokio::test]
async fn script_mode_uses_equal_share_timing() {
    let store = Arc::new(MemoryStore::default());
    let symbols = vec!["o".to_owned(), "k".to_owned()];
    let service = VisemeService::new(TimelineSynthesizer::default(), store.clone())
        .with_backend(FixedBackend::new(
            PhonemizerMode::Espeak,
            PhonemeSource::from("a 100"),
        ))
        .with_backend(FixedBackend::new(
            PhonemizerMode::Script,
            PhonemeSource::Symbols(symbols),
        ));

    let response = service
        .generate(&talk("ok", 0.5, Some(PhonemizerMode::Script)))
        .await
        .unwrap();
    assert!(response.blendshapes_url.unwrap().starts_with("mem://"));

    let saved = store.saved.lock().unwrap();
    let (_, timeline) = &saved[0];
    let rounded: Vec<_> = timeline
        .iter()
        .filter(|k| k.shapes.get(Blendshape::MouthPucker) > 0.0)
        .collect();
    assert!(!rounded.is_empty());
    assert!(rounded.iter().all(|k| k.time < 0.25));
}

#[tokio::test]
async fn default_mode_is_configurable() {
    let store = Arc::new(MemoryStore::default());
    let script = FixedBackend::new(PhonemizerMode::Script, PhonemeSource::Symbols(vec!["a".into()]));
    let service = VisemeService::new(TimelineSynthesizer::default(), store)
        .with_backend(script.clone())
        .with_default_mode(PhonemizerMode::Script);

    service.generate(&talk("a", 1.0, None)).await.unwrap();
    assert_eq!(script.seen.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn unparseable_output_yields_no_url() {
    let store = Arc::new(MemoryStore::default());
    let service = VisemeService::new(TimelineSynthesizer::default(), store.clone()).with_backend(
        FixedBackend::new(PhonemizerMode::Espeak, PhonemeSource::from("' , _ ?")),
    );

    let response = service.generate(&talk("hmm", 1.0, None)).await.unwrap();
    assert_eq!(response.blendshapes_url, None);
    assert!(store.saved.lock().unwrap().is_empty());
}

#[tokio::test]
async fn upstream_failure_propagates() {
    let store = Arc::new(MemoryStore::default());
    let service = VisemeService::new(TimelineSynthesizer::default(), store)
        .with_backend(Arc::new(DownBackend));

    let err = service.generate(&talk("ciao", 1.0, None)).await.unwrap_err();
    assert!(matches!(err, VisemeError::UpstreamUnavailable(_)));
}

#[tokio::test]
async fn concurrent_requests_get_distinct_files() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(FsKeyframeStore::new(dir.path(), "").unwrap());
    let service = Arc::new(
        VisemeService::new(TimelineSynthesizer::default(), store).with_backend(
            FixedBackend::new(PhonemizerMode::Espeak, PhonemeSource::from("a 100\nm 100")),
        ),
    );

    let mut handles = Vec::new();
    for _ in 0..8 {
        let service = Arc::clone(&service);
        handles.push(tokio::spawn(async move {
            service.generate(&talk("amo", 0.2, None)).await
        }));
    }

    let mut urls = Vec::new();
    for handle in handles {
        urls.push(handle.await.unwrap().unwrap().blendshapes_url.unwrap());
    }
    urls.sort();
    urls.dedup();
    assert_eq!(urls.len(), 8);
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 8);
}

#[test]
fn prune_keeps_fresh_files() {
    let dir = tempfile::tempdir().unwrap();
    let store = FsKeyframeStore::new(dir.path(), "").unwrap();
    let timeline = mouthpiece::synthesize(&PhonemeSource::from("a 100"), 0.1)
        .unwrap()
        .unwrap();
    for _ in 0..3 {
        store.save(&timeline, &new_request_id()).unwrap();
    }

    assert_eq!(store.prune_older_than(Duration::from_secs(60)).unwrap(), 0);
    std::thread::sleep(Duration::from_millis(20));
    assert_eq!(store.prune_older_than(Duration::ZERO).unwrap(), 3);
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
}
