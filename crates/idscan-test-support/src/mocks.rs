//! Mock implementations of core port traits.

use std::collections::VecDeque;
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, ThreadId};
use std::time::Duration;

use image::RgbImage;
use idscan_core::decode::ModelOutputs;
use idscan_core::domain::{CameraProperties, ScanError, VideoFrame};
use idscan_core::loader::{ModelCompiler, ModelReference};
use idscan_core::ports::{CameraDevice, FrameSource, ModelFetcher, SourceFrame};
use idscan_core::scanner::{InferenceTracker, Scanner};
use idscan_core::InferenceModel;

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

/// How [`MockModelFetcher`] answers the next fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchBehavior {
    /// Write the payload.
    Succeed,
    /// Return an error.
    Fail,
    /// Panic inside `fetch`.
    Panic,
}

/// Mock implementation of `ModelFetcher` for testing.
///
/// Writes a fixed payload and counts calls. An optional delay keeps a fetch
/// in flight long enough for concurrent callers to pile up behind it.
pub struct MockModelFetcher {
    payload: Vec<u8>,
    delay: Duration,
    behavior: Mutex<FetchBehavior>,
    fetched: Mutex<Vec<ModelReference>>,
}

impl MockModelFetcher {
    /// Creates a fetcher that writes `payload` for every reference.
    #[must_use]
    pub fn new(payload: impl Into<Vec<u8>>) -> Self {
        Self {
            payload: payload.into(),
            delay: Duration::ZERO,
            behavior: Mutex::new(FetchBehavior::Succeed),
            fetched: Mutex::new(Vec::new()),
        }
    }

    /// Sleeps for `delay` before answering each fetch.
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Changes how subsequent fetches behave.
    pub fn set_behavior(&self, behavior: FetchBehavior) {
        *lock(&self.behavior) = behavior;
    }

    /// Number of fetches started.
    #[must_use]
    pub fn fetch_count(&self) -> usize {
        lock(&self.fetched).len()
    }

    /// Every reference fetched, in call order.
    #[must_use]
    pub fn fetched(&self) -> Vec<ModelReference> {
        lock(&self.fetched).clone()
    }
}

impl ModelFetcher for MockModelFetcher {
    fn fetch(&self, reference: &ModelReference, destination: &Path) -> anyhow::Result<u64> {
        lock(&self.fetched).push(reference.clone());
        if !self.delay.is_zero() {
            thread::sleep(self.delay);
        }

        let behavior = *lock(&self.behavior);
        match behavior {
            FetchBehavior::Succeed => {
                fs::write(destination, &self.payload)?;
                Ok(self.payload.len() as u64)
            }
            FetchBehavior::Fail => anyhow::bail!("connection reset fetching {reference}"),
            FetchBehavior::Panic => panic!("fetcher panicked on {reference}"),
        }
    }
}

/// Prefix [`StubCompiler`] writes in front of the downloaded bytes.
pub const COMPILED_PREFIX: &[u8] = b"compiled:";

/// A model "loaded" by [`StubCompiler`].
#[derive(Debug, PartialEq, Eq)]
pub struct StubModel {
    /// The downloaded payload.
    pub payload: Vec<u8>,
}

#[derive(Default)]
struct CompilerState {
    compiles: AtomicUsize,
    loads: AtomicUsize,
    fail_compile: AtomicBool,
    fail_load: AtomicBool,
}

/// Mock implementation of `ModelCompiler` for testing.
///
/// Compiling prepends [`COMPILED_PREFIX`]; loading strips it and rejects any
/// file without it. Clones share counters, so a test can keep one clone to
/// inspect and hand another to the loader.
#[derive(Clone, Default)]
pub struct StubCompiler {
    state: Arc<CompilerState>,
}

impl StubCompiler {
    /// Creates a compiler that succeeds.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes subsequent compiles fail.
    pub fn set_fail_compile(&self, fail: bool) {
        self.state.fail_compile.store(fail, Ordering::SeqCst);
    }

    /// Makes subsequent loads fail.
    pub fn set_fail_load(&self, fail: bool) {
        self.state.fail_load.store(fail, Ordering::SeqCst);
    }

    /// Number of compile calls.
    #[must_use]
    pub fn compile_count(&self) -> usize {
        self.state.compiles.load(Ordering::SeqCst)
    }

    /// Number of load calls.
    #[must_use]
    pub fn load_count(&self) -> usize {
        self.state.loads.load(Ordering::SeqCst)
    }
}

impl ModelCompiler for StubCompiler {
    type Model = StubModel;

    fn artifact_extension(&self) -> &str {
        "stub"
    }

    fn compile(&self, downloaded: &Path, output: &Path) -> anyhow::Result<()> {
        self.state.compiles.fetch_add(1, Ordering::SeqCst);
        anyhow::ensure!(
            !self.state.fail_compile.load(Ordering::SeqCst),
            "not a valid model archive"
        );
        let mut bytes = COMPILED_PREFIX.to_vec();
        bytes.extend(fs::read(downloaded)?);
        fs::write(output, bytes)?;
        Ok(())
    }

    fn load(&self, compiled: &Path) -> anyhow::Result<StubModel> {
        self.state.loads.fetch_add(1, Ordering::SeqCst);
        anyhow::ensure!(
            !self.state.fail_load.load(Ordering::SeqCst),
            "corrupt artifact"
        );
        let bytes = fs::read(compiled)?;
        let payload = bytes
            .strip_prefix(COMPILED_PREFIX)
            .ok_or_else(|| anyhow::anyhow!("artifact was not compiled"))?;
        Ok(StubModel {
            payload: payload.to_vec(),
        })
    }
}

/// Mock implementation of `InferenceModel` for testing.
///
/// Replies with scripted outputs in order; the last reply repeats once the
/// script runs out. `Err` entries make the run itself fail.
pub struct ScriptedModel {
    input_size: u32,
    script: Mutex<VecDeque<Result<ModelOutputs, String>>>,
    last: Mutex<Option<Result<ModelOutputs, String>>>,
    inputs: Mutex<Vec<(u32, u32)>>,
}

impl ScriptedModel {
    /// Creates a model that always replies with `outputs`.
    #[must_use]
    pub fn fixed(outputs: ModelOutputs) -> Self {
        Self::scripted(vec![Ok(outputs)])
    }

    /// Creates a model that replies with each entry of `script` in turn.
    #[must_use]
    pub fn scripted(script: Vec<Result<ModelOutputs, String>>) -> Self {
        Self {
            input_size: 128,
            script: Mutex::new(script.into()),
            last: Mutex::new(None),
            inputs: Mutex::new(Vec::new()),
        }
    }

    /// Sets the square input side.
    #[must_use]
    pub const fn with_input_size(mut self, size: u32) -> Self {
        self.input_size = size;
        self
    }

    /// Dimensions of every input image received.
    #[must_use]
    pub fn inputs(&self) -> Vec<(u32, u32)> {
        lock(&self.inputs).clone()
    }
}

impl InferenceModel for ScriptedModel {
    fn input_size(&self) -> u32 {
        self.input_size
    }

    fn predict(&self, input: &RgbImage) -> anyhow::Result<ModelOutputs> {
        lock(&self.inputs).push(input.dimensions());
        let next = lock(&self.script).pop_front();
        let mut last = lock(&self.last);
        if let Some(reply) = next {
            *last = Some(reply);
        }
        match last.clone() {
            Some(Ok(outputs)) => Ok(outputs),
            Some(Err(message)) => Err(anyhow::anyhow!(message)),
            None => Ok(ModelOutputs::new()),
        }
    }
}

/// How [`InstrumentedScanner`] handles one scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanBehavior {
    /// Produce a [`ScanRecord`].
    Succeed,
    /// Return [`ScanError::InferenceFailed`].
    Fail,
    /// Panic.
    Panic,
}

/// What [`InstrumentedScanner`] produces.
#[derive(Debug, Clone, PartialEq)]
pub struct ScanRecord {
    /// Frame width, to tell frames apart.
    pub frame_width: u32,
    /// Thread the scan ran on.
    pub thread: ThreadId,
    /// Camera properties passed to the scan.
    pub camera: Option<CameraProperties>,
}

/// Mock implementation of `Scanner` for testing.
///
/// Holds each scan for a fixed time and records the highest number of scans
/// that were ever inside `scan` at once.
pub struct InstrumentedScanner {
    hold: Duration,
    script: Mutex<VecDeque<ScanBehavior>>,
    active: AtomicUsize,
    high_water: AtomicUsize,
    scans: AtomicUsize,
    resets: AtomicUsize,
    tracker: Arc<InferenceTracker>,
}

impl InstrumentedScanner {
    /// Creates a scanner whose scans take `hold`.
    #[must_use]
    pub fn new(hold: Duration) -> Self {
        Self {
            hold,
            script: Mutex::new(VecDeque::new()),
            active: AtomicUsize::new(0),
            high_water: AtomicUsize::new(0),
            scans: AtomicUsize::new(0),
            resets: AtomicUsize::new(0),
            tracker: Arc::new(InferenceTracker::new("instrumented")),
        }
    }

    /// Behaviors for the next scans, in order; later scans succeed.
    #[must_use]
    pub fn with_script(self, script: impl IntoIterator<Item = ScanBehavior>) -> Self {
        lock(&self.script).extend(script);
        self
    }

    /// Most scans ever observed running at once.
    #[must_use]
    pub fn high_water_mark(&self) -> usize {
        self.high_water.load(Ordering::SeqCst)
    }

    /// Scans started.
    #[must_use]
    pub fn scan_count(&self) -> usize {
        self.scans.load(Ordering::SeqCst)
    }

    /// Calls to `reset`.
    #[must_use]
    pub fn reset_count(&self) -> usize {
        self.resets.load(Ordering::SeqCst)
    }
}

struct ActiveGuard<'a>(&'a AtomicUsize);

impl Drop for ActiveGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl Scanner for InstrumentedScanner {
    type Output = ScanRecord;

    fn scan(
        &self,
        frame: &VideoFrame,
        camera: Option<&CameraProperties>,
    ) -> Result<ScanRecord, ScanError> {
        self.scans.fetch_add(1, Ordering::SeqCst);
        let now_active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        let _guard = ActiveGuard(&self.active);
        self.high_water.fetch_max(now_active, Ordering::SeqCst);

        thread::sleep(self.hold);
        self.tracker.record(self.hold);

        let behavior = lock(&self.script)
            .pop_front()
            .unwrap_or(ScanBehavior::Succeed);
        match behavior {
            ScanBehavior::Succeed => Ok(ScanRecord {
                frame_width: frame.size().width,
                thread: thread::current().id(),
                camera: camera.cloned(),
            }),
            ScanBehavior::Fail => Err(ScanError::InferenceFailed("scripted failure".into())),
            ScanBehavior::Panic => panic!("scripted panic"),
        }
    }

    fn reset(&self) {
        self.resets.fetch_add(1, Ordering::SeqCst);
        self.tracker.reset();
    }

    fn inference_trackers(&self) -> Vec<Arc<InferenceTracker>> {
        vec![Arc::clone(&self.tracker)]
    }
}

/// Mock implementation of `CameraDevice` for testing.
///
/// Reports whatever properties were last set.
#[derive(Default)]
pub struct MockCamera {
    properties: Mutex<CameraProperties>,
}

impl MockCamera {
    /// Creates a camera reporting `properties`.
    #[must_use]
    pub fn new(properties: CameraProperties) -> Self {
        Self {
            properties: Mutex::new(properties),
        }
    }

    /// Changes what the camera reports from now on.
    pub fn set(&self, properties: CameraProperties) {
        *lock(&self.properties) = properties;
    }
}

impl CameraDevice for MockCamera {
    fn properties(&self) -> CameraProperties {
        lock(&self.properties).clone()
    }
}

/// Mock implementation of `FrameSource` for testing.
///
/// Yields pre-built frames and tracks iteration for assertions.
pub struct MockFrameSource {
    frames: Vec<SourceFrame>,
    iteration_count: Mutex<usize>,
}

impl MockFrameSource {
    /// Creates a new mock source with the given frames.
    #[must_use]
    pub fn new(frames: Vec<SourceFrame>) -> Self {
        Self {
            frames,
            iteration_count: Mutex::new(0),
        }
    }

    /// Returns the number of times the source has been iterated.
    #[must_use]
    pub fn iteration_count(&self) -> usize {
        *lock(&self.iteration_count)
    }
}

impl FrameSource for MockFrameSource {
    fn frames(&self) -> Box<dyn Iterator<Item = anyhow::Result<SourceFrame>> + Send + '_> {
        *lock(&self.iteration_count) += 1;
        Box::new(self.frames.iter().cloned().map(Ok))
    }

    fn count_hint(&self) -> Option<usize> {
        Some(self.frames.len())
    }
}
