//! Integration tests for the model loader: dedup, caching and failure paths.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::path::{Path, PathBuf};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::{Duration, Instant};

use idscan_core::loader::{ModelCompiler, ModelLoader, ModelReference};
use parking_lot::Mutex;
use idscan_core::LoadStage;
use idscan_test_support::{FetchBehavior, MockModelFetcher, StubCompiler, StubModel};

fn reference(name: &str) -> ModelReference {
    ModelReference::parse(&format!("https://models.example.com/{name}.bin")).unwrap()
}

fn loader(
    fetcher: &Arc<MockModelFetcher>,
    compiler: &StubCompiler,
    cache_dir: impl Into<PathBuf>,
) -> ModelLoader<StubCompiler> {
    ModelLoader::new(fetcher.clone(), compiler.clone(), cache_dir)
}

#[test]
fn concurrent_loads_share_one_fetch() {
    let dir = tempfile::tempdir().unwrap();
    let fetcher = Arc::new(MockModelFetcher::new("weights").with_delay(Duration::from_millis(200)));
    let compiler = StubCompiler::new();
    let loader = Arc::new(loader(&fetcher, &compiler, dir.path()));
    let reference = reference("face");

    let callers = 8;
    let barrier = Arc::new(Barrier::new(callers));
    let handles: Vec<_> = (0..callers)
        .map(|_| {
            let loader = Arc::clone(&loader);
            let barrier = Arc::clone(&barrier);
            let reference = reference.clone();
            thread::spawn(move || {
                barrier.wait();
                loader.load_model(&reference)
            })
        })
        .collect();

    let models: Vec<Arc<StubModel>> = handles
        .into_iter()
        .map(|h| h.join().unwrap().expect("load succeeds"))
        .collect();

    assert_eq!(fetcher.fetch_count(), 1);
    assert_eq!(compiler.compile_count(), 1);
    assert!(models.iter().all(|m| Arc::ptr_eq(m, &models[0])));
    assert_eq!(models[0].payload, b"weights");
}

#[test]
fn cached_reference_is_not_fetched_again() {
    let dir = tempfile::tempdir().unwrap();
    let fetcher = Arc::new(MockModelFetcher::new("weights"));
    let compiler = StubCompiler::new();
    let loader = loader(&fetcher, &compiler, dir.path());
    let reference = reference("doc");

    loader.load_model(&reference).unwrap();
    let again = loader.load_model(&reference).unwrap();

    assert_eq!(fetcher.fetch_count(), 1);
    assert_eq!(again.payload, b"weights");
    assert!(loader.cache().lookup(&reference).is_some());
}

#[test]
fn cache_survives_a_restart() {
    let dir = tempfile::tempdir().unwrap();
    let compiler = StubCompiler::new();
    let reference = reference("doc");

    let first = Arc::new(MockModelFetcher::new("weights"));
    loader(&first, &compiler, dir.path())
        .load_model(&reference)
        .unwrap();

    let second = Arc::new(MockModelFetcher::new("other"));
    let model = loader(&second, &compiler, dir.path())
        .load_model(&reference)
        .unwrap();

    assert_eq!(second.fetch_count(), 0);
    assert_eq!(model.payload, b"weights");
}

#[test]
fn different_references_are_fetched_independently() {
    let dir = tempfile::tempdir().unwrap();
    let fetcher = Arc::new(MockModelFetcher::new("weights"));
    let compiler = StubCompiler::new();
    let loader = loader(&fetcher, &compiler, dir.path());

    loader.load_model(&reference("face")).unwrap();
    loader.load_model(&reference("doc")).unwrap();

    assert_eq!(fetcher.fetched(), vec![reference("face"), reference("doc")]);
}

#[test]
fn download_failure_reaches_every_waiter_and_is_not_cached() {
    let dir = tempfile::tempdir().unwrap();
    let fetcher = Arc::new(MockModelFetcher::new("weights").with_delay(Duration::from_millis(150)));
    fetcher.set_behavior(FetchBehavior::Fail);
    let compiler = StubCompiler::new();
    let loader = Arc::new(loader(&fetcher, &compiler, dir.path()));
    let reference = reference("face");

    let barrier = Arc::new(Barrier::new(4));
    let handles: Vec<_> = (0..4)
        .map(|_| {
            let loader = Arc::clone(&loader);
            let barrier = Arc::clone(&barrier);
            let reference = reference.clone();
            thread::spawn(move || {
                barrier.wait();
                loader.load_model(&reference)
            })
        })
        .collect();

    for handle in handles {
        let err = handle.join().unwrap().expect_err("load fails");
        assert_eq!(err.stage, LoadStage::Download);
        assert!(err.message.contains("connection reset"));
    }
    assert_eq!(fetcher.fetch_count(), 1);

    // The failure is not remembered: the next call fetches again.
    fetcher.set_behavior(FetchBehavior::Succeed);
    let model = loader.load_model(&reference).unwrap();
    assert_eq!(model.payload, b"weights");
    assert_eq!(fetcher.fetch_count(), 2);
}

#[test]
fn compile_failure_is_reported_as_compile_stage() {
    let dir = tempfile::tempdir().unwrap();
    let fetcher = Arc::new(MockModelFetcher::new("weights"));
    let compiler = StubCompiler::new();
    compiler.set_fail_compile(true);

    let err = loader(&fetcher, &compiler, dir.path())
        .load_model(&reference("face"))
        .expect_err("compile fails");

    assert_eq!(err.stage, LoadStage::Compile);
    assert!(err.to_string().contains("not a valid model archive"));
}

#[test]
fn decode_failure_is_reported_as_decode_stage() {
    let dir = tempfile::tempdir().unwrap();
    let fetcher = Arc::new(MockModelFetcher::new("weights"));
    let compiler = StubCompiler::new();
    compiler.set_fail_load(true);

    let err = loader(&fetcher, &compiler, dir.path())
        .load_model(&reference("face"))
        .expect_err("load fails");

    assert_eq!(err.stage, LoadStage::Decode);
}

#[test]
fn corrupt_cache_entry_is_refetched() {
    let dir = tempfile::tempdir().unwrap();
    let compiler = StubCompiler::new();
    let reference = reference("face");
    let fetcher = Arc::new(MockModelFetcher::new("weights"));
    let loader = loader(&fetcher, &compiler, dir.path());

    let cached = loader.cache().artifact_path(&reference);
    std::fs::write(&cached, b"garbage").unwrap();

    let model = loader.load_model(&reference).unwrap();
    assert_eq!(model.payload, b"weights");
    assert_eq!(fetcher.fetch_count(), 1);
    assert!(std::fs::read(&cached).unwrap().starts_with(b"compiled:"));
}

#[test]
fn unwritable_cache_falls_back_to_temporary_artifact() {
    let dir = tempfile::tempdir().unwrap();
    // A regular file where the cache directory should be.
    let blocked = dir.path().join("models");
    std::fs::write(&blocked, b"").unwrap();

    let fetcher = Arc::new(MockModelFetcher::new("weights"));
    let compiler = StubCompiler::new();
    let loader = loader(&fetcher, &compiler, &blocked);
    let reference = reference("face");

    let model = loader.load_model(&reference).unwrap();
    assert_eq!(model.payload, b"weights");

    // Nothing was cached, so a second call downloads again.
    loader.load_model(&reference).unwrap();
    assert_eq!(fetcher.fetch_count(), 2);
}

#[test]
fn panicking_fetch_releases_waiters() {
    let dir = tempfile::tempdir().unwrap();
    let fetcher = Arc::new(MockModelFetcher::new("weights").with_delay(Duration::from_millis(150)));
    fetcher.set_behavior(FetchBehavior::Panic);
    let compiler = StubCompiler::new();
    let loader = Arc::new(loader(&fetcher, &compiler, dir.path()));
    let reference = reference("face");

    let leader = {
        let loader = Arc::clone(&loader);
        let reference = reference.clone();
        thread::spawn(move || loader.load_model(&reference))
    };
    thread::sleep(Duration::from_millis(50));
    let follower = {
        let loader = Arc::clone(&loader);
        let reference = reference.clone();
        thread::spawn(move || loader.load_model(&reference))
    };

    assert!(leader.join().is_err(), "leader thread panics");
    let err = follower.join().unwrap().expect_err("follower sees an error");
    assert!(err.message.contains("abandoned"));

    fetcher.set_behavior(FetchBehavior::Succeed);
    assert!(loader.load_model(&reference).is_ok());
}

#[test]
fn staging_dir_is_cleaned_up() {
    let dir = tempfile::tempdir().unwrap();
    let staging = dir.path().join("staging");
    let fetcher = Arc::new(MockModelFetcher::new("weights"));
    let compiler = StubCompiler::new();
    let loader = loader(&fetcher, &compiler, dir.path().join("cache")).with_staging_dir(&staging);

    loader.load_model(&reference("face")).unwrap();

    assert_eq!(std::fs::read_dir(&staging).unwrap().count(), 0);
}

/// Delegates to [`StubCompiler`] but stalls loads of one artifact.
#[derive(Clone, Default)]
struct StallingCompiler {
    inner: StubCompiler,
    stalled: Arc<Mutex<Option<(PathBuf, Duration)>>>,
}

impl StallingCompiler {
    fn stall(&self, artifact: PathBuf, delay: Duration) {
        *self.stalled.lock() = Some((artifact, delay));
    }
}

impl ModelCompiler for StallingCompiler {
    type Model = StubModel;

    fn artifact_extension(&self) -> &str {
        self.inner.artifact_extension()
    }

    fn compile(&self, downloaded: &Path, output: &Path) -> anyhow::Result<()> {
        self.inner.compile(downloaded, output)
    }

    fn load(&self, compiled: &Path) -> anyhow::Result<StubModel> {
        let delay = self
            .stalled
            .lock()
            .as_ref()
            .and_then(|(path, delay)| (path == compiled).then_some(*delay));
        if let Some(delay) = delay {
            thread::sleep(delay);
        }
        self.inner.load(compiled)
    }
}

#[test]
fn slow_model_load_does_not_block_other_references() {
    let dir = tempfile::tempdir().unwrap();
    let fetcher = Arc::new(MockModelFetcher::new("weights"));
    let loader = Arc::new(ModelLoader::new(
        fetcher.clone(),
        StallingCompiler::default(),
        dir.path(),
    ));
    let slow = reference("document");
    let fast = reference("face");
    loader.load_model(&slow).unwrap();
    loader.load_model(&fast).unwrap();

    loader
        .compiler()
        .stall(loader.cache().artifact_path(&slow), Duration::from_millis(600));
    let stalled = {
        let loader = Arc::clone(&loader);
        let slow = slow.clone();
        thread::spawn(move || loader.load_model(&slow))
    };
    thread::sleep(Duration::from_millis(100));

    let started = Instant::now();
    let model = loader.load_model(&fast).unwrap();
    let elapsed = started.elapsed();

    assert_eq!(model.payload, b"weights");
    assert!(elapsed < Duration::from_millis(300), "waited {elapsed:?}");
    assert!(stalled.join().unwrap().is_ok());
    assert_eq!(fetcher.fetch_count(), 2);
}
