use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use rand::seq::SliceRandom;
use rand::Rng;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::{
    composition::pipeline::{output_name, Job, ShortsPipeline},
    error::{CompositionError, CompositorError, Result},
    video::{extension_of, EncodedVideo},
};

/// Exit status of a batch run
pub const EXIT_OK: i32 = 0;
pub const EXIT_FATAL: i32 = 1;
pub const EXIT_EMPTY_POOL: i32 = 2;
pub const EXIT_SKIPPED: i32 = 3;

/// Media files in `dir` whose extension is in `extensions`, sorted by path
///
/// Hidden files and sub-directories are ignored; extension matching is
/// case-insensitive.
pub fn discover_media(dir: &Path, extensions: &[String]) -> Result<Vec<PathBuf>> {
    let entries = std::fs::read_dir(dir).map_err(|e| {
        CompositorError::generic(format!("cannot read directory {}: {}", dir.display(), e))
    })?;

    let mut files = Vec::new();
    for entry in entries {
        let path = entry?.path();
        let hidden = path
            .file_name()
            .and_then(|name| name.to_str())
            .map_or(true, |name| name.starts_with('.'));
        if hidden || !path.is_file() {
            continue;
        }
        let accepted = extension_of(&path).map_or(false, |ext| {
            extensions.iter().any(|allowed| allowed.eq_ignore_ascii_case(&ext))
        });
        if accepted {
            files.push(path);
        }
    }

    files.sort();
    Ok(files)
}

/// Like [`discover_media`], but an empty result is an [`CompositionError::EmptyPool`]
pub fn require_pool(dir: &Path, extensions: &[String], kind: &str) -> Result<Vec<PathBuf>> {
    let files = discover_media(dir, extensions)?;
    if files.is_empty() {
        return Err(CompositionError::EmptyPool {
            kind: kind.to_string(),
            path: dir.display().to_string(),
        }
        .into());
    }
    debug!("Found {} {} files in {}", files.len(), kind, dir.display());
    Ok(files)
}

/// Directories a batch reads from and writes to
#[derive(Debug, Clone)]
pub struct BatchPaths {
    pub inputs: PathBuf,
    pub reactions: Option<PathBuf>,
    pub music: PathBuf,
    pub output: PathBuf,
}

/// An item that did not produce an output
#[derive(Debug, Clone, PartialEq)]
pub struct SkippedItem {
    pub input: PathBuf,
    pub reason: String,
}

/// Outcome of a whole batch
#[derive(Debug, Clone, Default)]
pub struct BatchReport {
    pub succeeded: Vec<EncodedVideo>,
    pub skipped: Vec<SkippedItem>,
    /// The item whose structural error stopped the run
    pub aborted: Option<SkippedItem>,
}

impl BatchReport {
    pub fn total(&self) -> usize {
        self.succeeded.len() + self.skipped.len() + usize::from(self.aborted.is_some())
    }

    pub fn is_aborted(&self) -> bool {
        self.aborted.is_some()
    }

    pub fn exit_code(&self) -> i32 {
        if self.aborted.is_some() {
            EXIT_FATAL
        } else if self.skipped.is_empty() {
            EXIT_OK
        } else {
            EXIT_SKIPPED
        }
    }
}

/// Exit status for an error that stopped the batch before it ran
pub fn exit_code_for(error: &CompositorError) -> i32 {
    if error.is_empty_pool() {
        EXIT_EMPTY_POOL
    } else {
        EXIT_FATAL
    }
}

/// Plans and runs one short per input file
pub struct BatchRunner {
    pipeline: Arc<ShortsPipeline>,
}

impl BatchRunner {
    pub fn new(pipeline: ShortsPipeline) -> Self {
        Self {
            pipeline: Arc::new(pipeline),
        }
    }

    pub fn pipeline(&self) -> &ShortsPipeline {
        &self.pipeline
    }

    /// Pair every input with a reaction and a music file
    ///
    /// Pairings are drawn with replacement from `rng`. Every pool the layout
    /// needs must be non-empty, checked before any job is produced.
    pub fn plan<R: Rng + ?Sized>(&self, paths: &BatchPaths, rng: &mut R) -> Result<Vec<Job>> {
        let batch = &self.pipeline.config().batch;

        let reactions = if batch.layout.needs_reaction() {
            let dir = paths.reactions.as_ref().ok_or_else(|| CompositionError::InvalidParameters {
                details: format!("the {} layout needs a reaction directory", batch.layout),
            })?;
            require_pool(dir, &batch.video_extensions, "reaction")?
        } else {
            Vec::new()
        };
        let music = require_pool(&paths.music, &batch.music_extensions, "music")?;
        let inputs = require_pool(&paths.inputs, &batch.video_extensions, "input video")?;

        let mut jobs = Vec::with_capacity(inputs.len());
        for (position, input) in inputs.into_iter().enumerate() {
            let index = position + 1;
            let music = music.choose(rng).cloned().ok_or_else(|| CompositionError::EmptyPool {
                kind: "music".to_string(),
                path: paths.music.display().to_string(),
            })?;
            let reaction = reactions.choose(rng).cloned();
            let output = paths.output.join(output_name(index, &input));

            debug!(
                "Job {}: {} + {:?} + {}",
                index,
                input.display(),
                reaction,
                music.display()
            );
            jobs.push(Job {
                index,
                input,
                reaction,
                music,
                output,
            });
        }

        info!("Planned {} jobs ({} layout)", jobs.len(), batch.layout);
        Ok(jobs)
    }

    /// Run `jobs` concurrently
    ///
    /// Per-item failures skip the item and are reported, never retried. An
    /// error for which [`CompositorError::aborts_batch`] holds cancels every
    /// item that has not finished yet and marks the report as aborted.
    pub async fn run(&self, jobs: Vec<Job>) -> BatchReport {
        let workers = self.pipeline.config().batch.workers.max(1);
        let permits = Arc::new(Semaphore::new(workers));
        let mut tasks = JoinSet::new();
        let mut pending: BTreeMap<usize, PathBuf> = BTreeMap::new();
        // Blocking work cannot be cancelled once started, so it checks this first
        let cancelled = Arc::new(AtomicBool::new(false));

        info!("Processing {} items with {} workers", jobs.len(), workers);
        for job in jobs {
            pending.insert(job.index, job.input.clone());
            let pipeline = Arc::clone(&self.pipeline);
            let permits = Arc::clone(&permits);
            let cancelled = Arc::clone(&cancelled);
            tasks.spawn(async move {
                // The semaphore is never closed
                let _permit = permits.acquire_owned().await.ok();
                let input = job.input.clone();
                let index = job.index;
                let result = tokio::task::spawn_blocking(move || {
                    if cancelled.load(Ordering::SeqCst) {
                        return Err(CompositorError::generic(
                            "batch aborted before this item started",
                        ));
                    }
                    pipeline.run(&job)
                })
                    .await
                    .unwrap_or_else(|e| {
                        Err(CompositorError::generic(format!("worker panicked: {}", e)))
                    });
                (index, input, result)
            });
        }

        let mut outcomes = Vec::new();
        let mut aborted: Option<(usize, SkippedItem)> = None;
        while let Some(joined) = tasks.join_next().await {
            let (index, input, result) = match joined {
                Ok(outcome) => outcome,
                Err(e) if e.is_cancelled() => continue,
                Err(e) => {
                    error!("Batch task failed to complete: {}", e);
                    continue;
                }
            };
            pending.remove(&index);

            match result {
                Err(e) if e.aborts_batch() && aborted.is_none() => {
                    error!("🛑 [{}] Aborting batch on {}: {}", index, input.display(), e);
                    cancelled.store(true, Ordering::SeqCst);
                    tasks.abort_all();
                    aborted = Some((
                        index,
                        SkippedItem {
                            input,
                            reason: e.to_string(),
                        },
                    ));
                }
                result => outcomes.push((index, input, result)),
            }
        }
        outcomes.sort_by_key(|(index, _, _)| *index);

        let mut report = BatchReport::default();
        for (index, input, result) in outcomes {
            match result {
                Ok(encoded) => report.succeeded.push(encoded),
                Err(e) => {
                    warn!("⚠️ [{}] Skipped {}: {}", index, input.display(), e.user_message());
                    report.skipped.push(SkippedItem {
                        input,
                        reason: e.to_string(),
                    });
                }
            }
        }

        // Items whose task never reported back
        let unfinished = if aborted.is_some() {
            "batch aborted before this item finished"
        } else {
            "worker task did not complete"
        };
        for (index, input) in pending {
            warn!("⚠️ [{}] Skipped {}: {}", index, input.display(), unfinished);
            report.skipped.push(SkippedItem {
                input,
                reason: unfinished.to_string(),
            });
        }
        report.aborted = aborted.map(|(_, item)| item);

        if let Some(item) = &report.aborted {
            error!(
                "🛑 Batch aborted by {}: {} succeeded, {} skipped",
                item.input.display(),
                report.succeeded.len(),
                report.skipped.len()
            );
        } else {
            info!(
                "🎉 Batch finished: {} succeeded, {} skipped",
                report.succeeded.len(),
                report.skipped.len()
            );
        }
        report
    }
}
