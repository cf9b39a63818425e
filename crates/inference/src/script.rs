//! Backend that delegates generation to resident external inference workers.
//!
//! Each execution slot owns one long-lived `<program> <script>` process. The
//! process loads the model once and keeps it, swapping adapter weights only
//! when a request names a different adapter. Its slot index is passed in
//! [`WORKER_INDEX_ENV`] so the script can pin itself to a device.
//!
//! Requests are written to the worker's stdin, one JSON object per line:
//!
//! ```json
//! {"text": "...", "cfg_scale": 2.0, "steps": 10, "seed": 1234,
//!  "lora_name": "speaker_a", "lora_path": "lora/speaker_a",
//!  "ref_audio_path": null, "ref_text": null}
//! ```
//!
//! The worker answers with JSON lines on stdout, ending every request with
//! exactly one `done` or `error`:
//!
//! ```json
//! {"event": "loaded", "lora_name": "speaker_a"}
//! {"event": "progress", "progress": 0.5, "message": "Generating audio"}
//! {"event": "done", "wav_path": "/tmp/out.wav"}
//! {"event": "error", "message": "CUDA out of memory"}
//! ```
//!
//! Lines that are not events (library chatter) are ignored. The WAV named by
//! `done` is read back and then removed. An `error` leaves the worker in
//! service; a worker that exits is replaced on the next request.

use std::collections::{BTreeSet, VecDeque};
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command, ExitStatus, Stdio};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use voxgate_core::audio::Waveform;
use voxgate_core::synthesis::SynthesisRequest;

use crate::adapters::AdapterCatalog;
use crate::synthesizer::{InferenceError, ProgressReporter, Synthesizer, PHASE_LOADING};
use crate::wav;

/// Environment variable carrying the worker's slot index.
pub const WORKER_INDEX_ENV: &str = "VOXGATE_WORKER_INDEX";

/// Stderr lines kept per worker for error messages.
const MAX_STDERR_LINES: usize = 20;

/// Longest stderr line kept, in bytes.
const MAX_STDERR_LINE_BYTES: usize = 512;

/// How long an exiting worker gets before it is killed.
const EXIT_GRACE: Duration = Duration::from_secs(2);

#[derive(Debug, Serialize)]
struct ScriptRequest<'a> {
    text: &'a str,
    cfg_scale: f64,
    steps: u32,
    seed: u64,
    lora_name: Option<&'a str>,
    lora_path: Option<String>,
    ref_audio_path: Option<String>,
    ref_text: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
enum ScriptEvent {
    Loaded {
        #[serde(default)]
        lora_name: Option<String>,
    },
    Progress {
        progress: f64,
        #[serde(default)]
        message: String,
    },
    Done {
        wav_path: PathBuf,
    },
    Error {
        message: String,
    },
}

// ---------------------------------------------------------------------------
// Stderr tail
// ---------------------------------------------------------------------------

/// The last few stderr lines of a worker. Carriage returns split lines so
/// progress bars do not grow a single unbounded line.
#[derive(Debug, Default)]
struct StderrTail(VecDeque<String>);

impl StderrTail {
    fn push(&mut self, raw: &[u8]) {
        let line = String::from_utf8_lossy(raw);
        let line = line.trim();
        if line.is_empty() {
            return;
        }
        if self.0.len() == MAX_STDERR_LINES {
            self.0.pop_front();
        }
        self.0.push_back(line.to_string());
    }

    fn clear(&mut self) {
        self.0.clear();
    }

    fn render(&self) -> String {
        self.0.iter().map(String::as_str).collect::<Vec<_>>().join("\n")
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Read stderr until the worker closes it, keeping only the tail.
///
/// The pipe is never closed early: a worker writing to a closed stderr
/// would die mid-generation.
fn drain_stderr(stderr: ChildStderr, tail: &Mutex<StderrTail>) {
    let mut reader = BufReader::new(stderr);
    let mut line = Vec::new();
    loop {
        let chunk = match reader.fill_buf() {
            Ok(chunk) if chunk.is_empty() => break,
            Ok(chunk) => chunk,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(_) => break,
        };
        let consumed = chunk.len();
        for &byte in chunk {
            if byte == b'\n' || byte == b'\r' {
                lock(tail).push(&line);
                line.clear();
            } else if line.len() < MAX_STDERR_LINE_BYTES {
                line.push(byte);
            }
        }
        reader.consume(consumed);
    }
    lock(tail).push(&line);
}

/// Wait briefly for an exiting worker, then kill it.
fn reap(child: &mut Child) -> Option<ExitStatus> {
    let deadline = Instant::now() + EXIT_GRACE;
    loop {
        match child.try_wait() {
            Ok(Some(status)) => return Some(status),
            Ok(None) if Instant::now() < deadline => thread::sleep(Duration::from_millis(20)),
            Ok(None) => {
                let _ = child.kill();
                return child.wait().ok();
            }
            Err(_) => return None,
        }
    }
}

// ---------------------------------------------------------------------------
// Worker process
// ---------------------------------------------------------------------------

struct ScriptWorker {
    slot: usize,
    child: Child,
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
    stderr: Arc<Mutex<StderrTail>>,
    drain: Option<JoinHandle<()>>,
    /// Adapter currently applied, valid once `model_loaded` is set.
    lora: Option<String>,
    model_loaded: bool,
    loaded_workers: Arc<AtomicUsize>,
    broken: bool,
}

impl ScriptWorker {
    fn spawn(
        program: &str,
        script: &Path,
        slot: usize,
        loaded_workers: Arc<AtomicUsize>,
    ) -> Result<Self, InferenceError> {
        let mut child = Command::new(program)
            .arg(script)
            .env(WORKER_INDEX_ENV, slot.to_string())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;

        let (Some(stdin), Some(stdout), Some(stderr)) =
            (child.stdin.take(), child.stdout.take(), child.stderr.take())
        else {
            let _ = child.kill();
            let _ = child.wait();
            return Err(InferenceError::Process(
                "inference worker started without pipes".into(),
            ));
        };

        let tail = Arc::new(Mutex::new(StderrTail::default()));
        let drain = {
            let tail = Arc::clone(&tail);
            thread::spawn(move || drain_stderr(stderr, &tail))
        };

        tracing::info!(slot, pid = child.id(), "Inference worker started");

        Ok(Self {
            slot,
            child,
            stdin,
            stdout: BufReader::new(stdout),
            stderr: tail,
            drain: Some(drain),
            lora: None,
            model_loaded: false,
            loaded_workers,
            broken: false,
        })
    }

    fn serves(&self, lora: Option<&str>) -> bool {
        self.model_loaded && self.lora.as_deref() == lora
    }

    /// Send one request and follow its events to `done` or `error`.
    fn run(
        &mut self,
        payload: &[u8],
        progress: &dyn ProgressReporter,
    ) -> Result<PathBuf, InferenceError> {
        lock(&self.stderr).clear();

        let sent = self
            .stdin
            .write_all(payload)
            .and_then(|()| self.stdin.write_all(b"\n"))
            .and_then(|()| self.stdin.flush());
        if let Err(e) = sent {
            tracing::debug!(slot = self.slot, error = %e, "Inference worker stdin closed");
            return Err(self.exited());
        }

        let mut line = Vec::new();
        loop {
            line.clear();
            match self.stdout.read_until(b'\n', &mut line) {
                Ok(0) => return Err(self.exited()),
                Ok(_) => {}
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    self.broken = true;
                    return Err(e.into());
                }
            }

            let text = String::from_utf8_lossy(&line);
            match serde_json::from_str::<ScriptEvent>(text.trim()) {
                Ok(ScriptEvent::Loaded { lora_name }) => self.mark_loaded(lora_name),
                Ok(ScriptEvent::Progress {
                    progress: value,
                    message,
                }) => progress.report(value, &message),
                Ok(ScriptEvent::Done { wav_path }) => return Ok(wav_path),
                Ok(ScriptEvent::Error { message }) => return Err(InferenceError::Backend(message)),
                Err(_) => tracing::trace!(line = %text.trim(), "Ignoring non-event output"),
            }
        }
    }

    fn mark_loaded(&mut self, lora: Option<String>) {
        tracing::info!(
            slot = self.slot,
            lora = lora.as_deref().unwrap_or("none"),
            "Inference worker loaded model",
        );
        if !self.model_loaded {
            self.model_loaded = true;
            self.loaded_workers.fetch_add(1, Ordering::SeqCst);
        }
        self.lora = lora;
    }

    /// The worker stopped mid-request. Reap it and describe why.
    fn exited(&mut self) -> InferenceError {
        self.broken = true;
        let status = match reap(&mut self.child) {
            Some(status) => status
                .code()
                .map_or_else(|| "signal".to_string(), |c| c.to_string()),
            None => "unknown".to_string(),
        };
        if let Some(drain) = self.drain.take() {
            let _ = drain.join();
        }
        let tail = lock(&self.stderr).render();

        tracing::warn!(slot = self.slot, status = %status, "Inference worker exited");
        if tail.is_empty() {
            InferenceError::Process(format!("worker exited with status {status}"))
        } else {
            InferenceError::Process(format!("worker exited with status {status}: {tail}"))
        }
    }
}

impl Drop for ScriptWorker {
    fn drop(&mut self) {
        if self.model_loaded {
            self.loaded_workers.fetch_sub(1, Ordering::SeqCst);
        }
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

/// Idle workers plus the slot indices free for new ones.
#[derive(Default)]
struct WorkerPool {
    idle: Vec<ScriptWorker>,
    free_slots: BTreeSet<usize>,
    next_slot: usize,
}

// ---------------------------------------------------------------------------
// Synthesizer
// ---------------------------------------------------------------------------

/// Runs requests on resident `program script` workers, one per slot.
pub struct ScriptSynthesizer {
    program: String,
    script: PathBuf,
    adapters: AdapterCatalog,
    pool: Mutex<WorkerPool>,
    loaded_workers: Arc<AtomicUsize>,
}

impl ScriptSynthesizer {
    pub fn new(
        program: impl Into<String>,
        script: impl Into<PathBuf>,
        adapters: AdapterCatalog,
    ) -> Self {
        Self {
            program: program.into(),
            script: script.into(),
            adapters,
            pool: Mutex::new(WorkerPool::default()),
            loaded_workers: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn script(&self) -> &Path {
        &self.script
    }

    fn payload(&self, request: &SynthesisRequest) -> Result<Vec<u8>, InferenceError> {
        let lora_path = match request.lora_name.as_deref() {
            Some(name) => Some(
                self.adapters
                    .resolve(name)
                    .ok_or_else(|| {
                        InferenceError::Backend(format!("LoRA model '{name}' not found"))
                    })?
                    .display()
                    .to_string(),
            ),
            None => None,
        };
        let clone = request.voice_clone.as_ref();

        let body = ScriptRequest {
            text: &request.text,
            cfg_scale: request.cfg_scale,
            steps: request.steps,
            seed: request.resolve_seed(),
            lora_name: request.lora_name.as_deref(),
            lora_path,
            ref_audio_path: clone.map(|c| c.ref_audio_path.display().to_string()),
            ref_text: clone.map(|c| c.ref_text.as_str()),
        };
        serde_json::to_vec(&body)
            .map_err(|e| InferenceError::Process(format!("Failed to encode request: {e}")))
    }

    /// Take an idle worker, preferring one that already holds `lora`, or
    /// start a new one.
    fn checkout(&self, lora: Option<&str>) -> Result<ScriptWorker, InferenceError> {
        let slot = {
            let mut pool = lock(&self.pool);
            let warm = pool.idle.iter().position(|w| w.serves(lora));
            if let Some(index) = warm.or_else(|| pool.idle.len().checked_sub(1)) {
                return Ok(pool.idle.swap_remove(index));
            }
            match pool.free_slots.pop_first() {
                Some(slot) => slot,
                None => {
                    pool.next_slot += 1;
                    pool.next_slot - 1
                }
            }
        };

        ScriptWorker::spawn(
            &self.program,
            &self.script,
            slot,
            Arc::clone(&self.loaded_workers),
        )
        .map_err(|e| {
            lock(&self.pool).free_slots.insert(slot);
            e
        })
    }

    fn checkin(&self, worker: ScriptWorker) {
        let mut pool = lock(&self.pool);
        if worker.broken {
            pool.free_slots.insert(worker.slot);
            drop(pool);
            drop(worker);
        } else {
            pool.idle.push(worker);
        }
    }
}

impl Synthesizer for ScriptSynthesizer {
    fn name(&self) -> &'static str {
        "script"
    }

    fn synthesize(
        &self,
        request: &SynthesisRequest,
        progress: &dyn ProgressReporter,
    ) -> Result<Waveform, InferenceError> {
        if !self.is_ready() {
            return Err(InferenceError::NotReady(format!(
                "inference script {} does not exist",
                self.script.display()
            )));
        }
        let payload = self.payload(request)?;

        progress.phase(PHASE_LOADING);

        let mut worker = self.checkout(request.lora_name.as_deref())?;
        let outcome = worker.run(&payload, progress);
        self.checkin(worker);
        let path = outcome?;

        let waveform = wav::read_wav(&path);
        if let Err(e) = std::fs::remove_file(&path) {
            tracing::debug!(path = %path.display(), error = %e, "Failed to remove script output");
        }
        Ok(waveform?)
    }

    fn is_ready(&self) -> bool {
        self.script.is_file()
    }

    /// True once any live worker has reported a loaded model.
    fn model_loaded(&self) -> bool {
        self.loaded_workers.load(Ordering::SeqCst) > 0
    }

    /// Every slot has its own worker process and model copy.
    fn is_reentrant(&self) -> bool {
        true
    }
}
