//! # Orchestrator
//!
//! Runs one image through the linear pipeline
//! `Acquire -> Decode -> Compute -> Encode -> Deposit`.
//!
//! The source is either a blob on the remote store or a local file, and the
//! result goes back to the store, into the local output directory, or both.
//! The first failing stage aborts the run. Downloaded sources and partially
//! written local outputs live in temporary files, so they are removed whether
//! the run succeeds, fails or is cancelled.

use std::future::Future;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Instant;

use image::DynamicImage;
use tempfile::NamedTempFile;
use tracing::{debug, info, Instrument};

use super::store_client::{Deposit, FetchedBlob, RemoteStore};
use crate::codec;
use crate::errors::error_logging;
use crate::observability;
use crate::path_validation::{processed_name, secure_filename, validate_path_for_reading};
use crate::pipeline_errors::PipelineError;
use crate::segmentation;

/// The five ordered stages of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineStage {
    Acquire,
    Decode,
    Compute,
    Encode,
    Deposit,
}

impl PipelineStage {
    pub fn as_str(self) -> &'static str {
        match self {
            PipelineStage::Acquire => "acquire",
            PipelineStage::Decode => "decode",
            PipelineStage::Compute => "compute",
            PipelineStage::Encode => "encode",
            PipelineStage::Deposit => "deposit",
        }
    }
}

impl std::fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Source and destination of a run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrchestrationMode {
    /// Fetch from the store, deposit back to the store
    RemoteToRemote { source: String },
    /// Read a local file, deposit to the store
    LocalToRemote { path: PathBuf },
    /// Fetch from the store, write to the local output directory
    RemoteToLocal { source: String },
    /// Fetch from the store, deposit to the store and write locally
    RemoteToBoth { source: String },
}

impl OrchestrationMode {
    pub fn label(&self) -> &'static str {
        match self {
            OrchestrationMode::RemoteToRemote { .. } => "server_to_server",
            OrchestrationMode::LocalToRemote { .. } => "client_to_server",
            OrchestrationMode::RemoteToLocal { .. } => "server_to_client",
            OrchestrationMode::RemoteToBoth { .. } => "server_to_both",
        }
    }

    /// Human-readable source, for logs
    pub fn source(&self) -> String {
        match self {
            OrchestrationMode::RemoteToRemote { source }
            | OrchestrationMode::RemoteToLocal { source }
            | OrchestrationMode::RemoteToBoth { source } => source.clone(),
            OrchestrationMode::LocalToRemote { path } => path.display().to_string(),
        }
    }

    fn deposits_remote(&self) -> bool {
        !matches!(self, OrchestrationMode::RemoteToLocal { .. })
    }

    fn deposits_local(&self) -> bool {
        matches!(
            self,
            OrchestrationMode::RemoteToLocal { .. } | OrchestrationMode::RemoteToBoth { .. }
        )
    }
}

/// Result of a successful run
#[derive(Debug, Clone, PartialEq)]
pub struct RunOutcome {
    pub threshold: u8,
    /// Width and height of the processed image
    pub dimensions: (u32, u32),
    /// One entry per destination, remote first
    pub deposits: Vec<Deposit>,
}

/// Source bytes read during the acquire stage
struct AcquiredSource {
    name: String,
    bytes: Vec<u8>,
}

/// Encoded binary image ready for deposit
struct EncodedOutput {
    name: String,
    bytes: Vec<u8>,
    threshold: u8,
    dimensions: (u32, u32),
}

/// Drives runs against a [`RemoteStore`] and a local output directory
#[derive(Debug, Clone)]
pub struct Orchestrator<S: RemoteStore> {
    store: S,
    local_output_dir: PathBuf,
}

async fn timed_stage<T>(
    stage: PipelineStage,
    work: impl Future<Output = Result<T, PipelineError>>,
) -> Result<T, PipelineError> {
    let start = Instant::now();
    let result = work.instrument(observability::stage_span(stage.as_str())).await;
    let elapsed = start.elapsed();

    observability::record_stage_metrics(stage.as_str(), result.is_ok(), elapsed);
    debug!(stage = %stage, success = result.is_ok(), duration_ms = elapsed.as_millis() as u64, "Stage finished");
    result
}

async fn on_worker<T, F>(work: F) -> Result<T, PipelineError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, PipelineError> + Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| PipelineError::Internal(e.to_string()))?
}

impl<S: RemoteStore> Orchestrator<S> {
    pub fn new(store: S, local_output_dir: impl Into<PathBuf>) -> Self {
        Self {
            store,
            local_output_dir: local_output_dir.into(),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn local_output_dir(&self) -> &Path {
        &self.local_output_dir
    }

    /// Variant 1: store to store
    pub async fn run_remote_to_remote(&self, source: &str) -> Result<RunOutcome, PipelineError> {
        self.run(OrchestrationMode::RemoteToRemote {
            source: source.to_string(),
        })
        .await
    }

    /// Variant 2: local file to store
    pub async fn run_local_to_remote(&self, path: &Path) -> Result<RunOutcome, PipelineError> {
        self.run(OrchestrationMode::LocalToRemote {
            path: path.to_path_buf(),
        })
        .await
    }

    /// Variant 3: store to local directory
    pub async fn run_remote_to_local(&self, source: &str) -> Result<RunOutcome, PipelineError> {
        self.run(OrchestrationMode::RemoteToLocal {
            source: source.to_string(),
        })
        .await
    }

    /// Store to both the store and the local directory
    pub async fn run_remote_to_both(&self, source: &str) -> Result<RunOutcome, PipelineError> {
        self.run(OrchestrationMode::RemoteToBoth {
            source: source.to_string(),
        })
        .await
    }

    /// Run one image through the pipeline.
    pub async fn run(&self, mode: OrchestrationMode) -> Result<RunOutcome, PipelineError> {
        let start = Instant::now();
        let source = mode.source();
        let span = observability::pipeline_span(mode.label(), &source);

        let result = self.execute(&mode).instrument(span).await;
        let elapsed = start.elapsed();
        observability::record_pipeline_metrics(mode.label(), result.is_ok(), elapsed);

        match &result {
            Ok(outcome) => {
                info!(
                    mode = mode.label(),
                    source = %source,
                    threshold = outcome.threshold,
                    width = outcome.dimensions.0,
                    height = outcome.dimensions.1,
                    deposits = outcome.deposits.len(),
                    duration_ms = elapsed.as_millis() as u64,
                    "Pipeline run completed"
                );
            }
            Err(e) => {
                observability::record_error_metrics(e.kind(), "pipeline");
                error_logging::log_pipeline_error(e, mode.label(), e.kind(), Some(&source), Some(elapsed));
            }
        }

        result
    }

    async fn execute(&self, mode: &OrchestrationMode) -> Result<RunOutcome, PipelineError> {
        let acquired = timed_stage(PipelineStage::Acquire, async {
            match mode {
                OrchestrationMode::LocalToRemote { path } => Self::acquire_local(path).await,
                OrchestrationMode::RemoteToRemote { source }
                | OrchestrationMode::RemoteToLocal { source }
                | OrchestrationMode::RemoteToBoth { source } => self.acquire_remote(source).await,
            }
        })
        .await?;

        let output = Self::process(acquired).await?;

        // The local copy is staged before the remote deposit and only renamed
        // into place once every other destination has accepted the result.
        let staged_local = if mode.deposits_local() {
            let dir = self.local_output_dir.clone();
            let bytes = output.bytes.clone();
            Some(
                timed_stage(
                    PipelineStage::Deposit,
                    on_worker(move || stage_local(&dir, &bytes)),
                )
                .await?,
            )
        } else {
            None
        };

        let mut deposits = Vec::new();
        if mode.deposits_remote() {
            let name = output.name.clone();
            let bytes = output.bytes.clone();
            deposits.push(
                timed_stage(PipelineStage::Deposit, self.store.deposit(&name, bytes)).await?,
            );
        }
        if let Some(staged) = staged_local {
            let target = self.local_output_dir.join(&output.name);
            let size = output.bytes.len();
            deposits.push(
                timed_stage(
                    PipelineStage::Deposit,
                    on_worker(move || persist_local(staged, &target, size)),
                )
                .await?,
            );
        }

        Ok(RunOutcome {
            threshold: output.threshold,
            dimensions: output.dimensions,
            deposits,
        })
    }

    async fn acquire_local(path: &Path) -> Result<AcquiredSource, PipelineError> {
        validate_path_for_reading(path).map_err(|e| PipelineError::Acquire(e.to_string()))?;

        let name = path
            .file_name()
            .map(|name| secure_filename(&name.to_string_lossy()))
            .unwrap_or_else(|| "unnamed_file".to_string());

        let bytes = read_source(path).await?;
        Ok(AcquiredSource { name, bytes })
    }

    /// Fetch into a temp file and read it back; the temp file is gone on return.
    async fn acquire_remote(&self, locator: &str) -> Result<AcquiredSource, PipelineError> {
        let blob: FetchedBlob = self.store.fetch(locator).await?;
        let bytes = read_source(blob.path()).await?;
        Ok(AcquiredSource {
            name: blob.name.clone(),
            bytes,
        })
    }

    /// Decode, compute and encode.
    async fn process(source: AcquiredSource) -> Result<EncodedOutput, PipelineError> {
        let AcquiredSource { name: source_name, bytes } = source;
        let image: DynamicImage = timed_stage(
            PipelineStage::Decode,
            on_worker(move || codec::decode_bytes(&bytes).map_err(PipelineError::from)),
        )
        .await?;

        let result = timed_stage(
            PipelineStage::Compute,
            on_worker(move || segmentation::segment_image(&image).map_err(PipelineError::from)),
        )
        .await?;

        observability::record_threshold_metrics(
            result.threshold,
            result.foreground_ratio,
            u64::from(result.image.width()) * u64::from(result.image.height()),
        );

        let name = processed_name(&source_name);
        let threshold = result.threshold;
        let dimensions = result.dimensions();
        let encode_name = name.clone();
        let bytes = timed_stage(
            PipelineStage::Encode,
            on_worker(move || codec::encode_gray(&result.image, &encode_name).map_err(PipelineError::from)),
        )
        .await?;

        Ok(EncodedOutput {
            name,
            bytes,
            threshold,
            dimensions,
        })
    }
}

/// Read source bytes; any I/O failure counts as an acquire failure.
async fn read_source(path: &Path) -> Result<Vec<u8>, PipelineError> {
    tokio::fs::read(path).await.map_err(|e| {
        error_logging::log_filesystem_error(&e, "read_source", Some(&path.display().to_string()), None);
        PipelineError::Acquire(format!("Cannot read {}: {}", path.display(), e))
    })
}

/// Write `bytes` to a temp file inside `dir`, creating `dir` if absent.
fn stage_local(dir: &Path, bytes: &[u8]) -> Result<NamedTempFile, PipelineError> {
    std::fs::create_dir_all(dir).map_err(|e| {
        PipelineError::Deposit(format!("Cannot create output directory {}: {}", dir.display(), e))
    })?;

    let mut temp = NamedTempFile::new_in(dir)
        .map_err(|e| PipelineError::Deposit(format!("Cannot create temporary file: {}", e)))?;
    temp.write_all(bytes)
        .map_err(|e| PipelineError::Deposit(format!("Cannot write {}: {}", temp.path().display(), e)))?;
    Ok(temp)
}

/// Rename a staged temp file to its final name.
fn persist_local(staged: NamedTempFile, target: &Path, size: usize) -> Result<Deposit, PipelineError> {
    staged
        .persist(target)
        .map_err(|e| PipelineError::Deposit(format!("Cannot write {}: {}", target.display(), e.error)))?;

    info!(path = %target.display(), size, "Processed image written locally");
    Ok(Deposit {
        name: target
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default(),
        locator: target.display().to_string(),
    })
}
