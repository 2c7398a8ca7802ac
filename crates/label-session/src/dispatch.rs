use crate::event::{WorkEvent, WorkKind};
use ai::Labeler;
use label_config::{ConfigStore, LabelerKind};
use std::{path::PathBuf, sync::Arc, time::Duration};
use thiserror::Error;
use tokio::{
    sync::{mpsc, OwnedSemaphorePermit, Semaphore},
    task::JoinHandle,
};
use translation::{is_translation_failure, Translator};
use tracing::{debug, error, info};

pub const SOURCE_LANGUAGE: &str = "en";
pub const TARGET_LANGUAGE: &str = "zh";

const EVENT_CHANNEL_SIZE: usize = 512;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DispatchError {
    #[error("a {0} operation is already running")]
    Busy(WorkKind),
}

#[derive(Debug, Clone)]
pub struct CaptionJob {
    pub row: usize,
    pub image_path: PathBuf,
}

#[derive(Debug, Clone)]
pub struct TranslationJob {
    pub row: usize,
    pub text: String,
}

/// Runs captioning and translation off the controlling task.
///
/// Each operation is one tokio task. Results come back only as
/// [`WorkEvent`]s on the channel returned by [`WorkDispatcher::new`]. At most
/// one captioning and one translation operation run at a time.
#[derive(Clone)]
pub struct WorkDispatcher {
    config: Arc<ConfigStore>,
    labeler: Arc<dyn Labeler>,
    translator: Arc<dyn Translator>,
    caption_permit: Arc<Semaphore>,
    translation_permit: Arc<Semaphore>,
    tx: mpsc::Sender<WorkEvent>,
}

/// What a captioning operation needs besides its jobs.
#[derive(Debug, Clone)]
pub struct CaptionRequest {
    pub backend: LabelerKind,
    pub directory_prompt: Option<String>,
}

struct CaptionWorker {
    labeler: Arc<dyn Labeler>,
    translator: Arc<dyn Translator>,
    tx: mpsc::Sender<WorkEvent>,
    request: CaptionRequest,
    auto_translate: bool,
}

struct TranslationWorker {
    translator: Arc<dyn Translator>,
    tx: mpsc::Sender<WorkEvent>,
}

async fn emit(tx: &mpsc::Sender<WorkEvent>, event: WorkEvent) {
    if let Err(e) = tx.send(event).await {
        error!("failed to send work event: {}", e);
    }
}

async fn pause_between(index: usize, delay: Duration) {
    if index > 0 && !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }
}

impl WorkDispatcher {
    pub fn new(
        config: Arc<ConfigStore>,
        labeler: Arc<dyn Labeler>,
        translator: Arc<dyn Translator>,
    ) -> (Self, mpsc::Receiver<WorkEvent>) {
        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_SIZE);
        let dispatcher = Self {
            config,
            labeler,
            translator,
            caption_permit: Arc::new(Semaphore::new(1)),
            translation_permit: Arc::new(Semaphore::new(1)),
            tx,
        };
        (dispatcher, rx)
    }

    pub fn is_busy(&self, kind: WorkKind) -> bool {
        self.permit(kind).available_permits() == 0
    }

    fn permit(&self, kind: WorkKind) -> &Arc<Semaphore> {
        match kind {
            WorkKind::Caption => &self.caption_permit,
            WorkKind::Translation => &self.translation_permit,
        }
    }

    fn acquire(&self, kind: WorkKind) -> Result<OwnedSemaphorePermit, DispatchError> {
        self.permit(kind)
            .clone()
            .try_acquire_owned()
            .map_err(|_| DispatchError::Busy(kind))
    }

    fn caption_worker(&self, request: CaptionRequest) -> CaptionWorker {
        CaptionWorker {
            labeler: self.labeler.clone(),
            translator: self.translator.clone(),
            tx: self.tx.clone(),
            request,
            auto_translate: self.config.labeling_config().auto_translate,
        }
    }

    fn translation_worker(&self) -> TranslationWorker {
        TranslationWorker {
            translator: self.translator.clone(),
            tx: self.tx.clone(),
        }
    }

    pub fn start_caption(
        &self,
        job: CaptionJob,
        request: CaptionRequest,
    ) -> Result<JoinHandle<()>, DispatchError> {
        let permit = self.acquire(WorkKind::Caption)?;
        let worker = self.caption_worker(request);

        Ok(tokio::spawn(async move {
            worker.run(&job).await;
            emit(&worker.tx, WorkEvent::Finished(WorkKind::Caption)).await;
            drop(permit);
        }))
    }

    /// Captions `jobs` one after another, pausing `batch_delay_ms` between
    /// items. A failed item never stops the batch.
    pub fn start_batch_caption(
        &self,
        jobs: Vec<CaptionJob>,
        request: CaptionRequest,
    ) -> Result<JoinHandle<()>, DispatchError> {
        let permit = self.acquire(WorkKind::Caption)?;
        let worker = self.caption_worker(request);
        let delay = Duration::from_millis(self.config.labeling_config().batch_delay_ms);

        Ok(tokio::spawn(async move {
            let total = jobs.len();
            info!("batch caption started: {} images", total);

            let mut succeeded = 0;
            for (index, job) in jobs.iter().enumerate() {
                pause_between(index, delay).await;
                if worker.run(job).await {
                    succeeded += 1;
                }
            }

            info!("batch caption completed: {}/{}", succeeded, total);
            emit(
                &worker.tx,
                WorkEvent::BatchCaptionCompleted { succeeded, total },
            )
            .await;
            emit(&worker.tx, WorkEvent::Finished(WorkKind::Caption)).await;
            drop(permit);
        }))
    }

    pub fn start_translation(&self, job: TranslationJob) -> Result<JoinHandle<()>, DispatchError> {
        let permit = self.acquire(WorkKind::Translation)?;
        let worker = self.translation_worker();

        Ok(tokio::spawn(async move {
            worker.run(&job).await;
            emit(&worker.tx, WorkEvent::Finished(WorkKind::Translation)).await;
            drop(permit);
        }))
    }

    pub fn start_batch_translation(
        &self,
        jobs: Vec<TranslationJob>,
    ) -> Result<JoinHandle<()>, DispatchError> {
        let permit = self.acquire(WorkKind::Translation)?;
        let worker = self.translation_worker();
        let delay = Duration::from_millis(self.config.labeling_config().translate_batch_delay_ms);

        Ok(tokio::spawn(async move {
            let total = jobs.len();
            info!("batch translation started: {} captions", total);

            let mut succeeded = 0;
            for (index, job) in jobs.iter().enumerate() {
                pause_between(index, delay).await;
                if worker.run(job).await {
                    succeeded += 1;
                }
            }

            info!("batch translation completed: {}/{}", succeeded, total);
            emit(
                &worker.tx,
                WorkEvent::BatchTranslationCompleted { succeeded, total },
            )
            .await;
            emit(&worker.tx, WorkEvent::Finished(WorkKind::Translation)).await;
            drop(permit);
        }))
    }
}

impl CaptionWorker {
    /// Returns whether the caption succeeded.
    async fn run(&self, job: &CaptionJob) -> bool {
        emit(&self.tx, WorkEvent::CaptionStarted { row: job.row }).await;

        let result = self
            .labeler
            .label(
                &job.image_path,
                self.request.backend,
                self.request.directory_prompt.as_deref(),
            )
            .await;

        if result.is_failure() {
            debug!("row {} caption failed: {}", job.row, result.description);
            emit(
                &self.tx,
                WorkEvent::CaptionFailed {
                    row: job.row,
                    error: result.description,
                },
            )
            .await;
            return false;
        }

        let needs_translation = self.auto_translate && result.zh.is_empty();
        let description = result.description.clone();
        emit(&self.tx, WorkEvent::CaptionDone { row: job.row, result }).await;

        if needs_translation {
            TranslationWorker {
                translator: self.translator.clone(),
                tx: self.tx.clone(),
            }
            .run(&TranslationJob {
                row: job.row,
                text: description,
            })
            .await;
        }

        true
    }
}

impl TranslationWorker {
    async fn run(&self, job: &TranslationJob) -> bool {
        emit(&self.tx, WorkEvent::TranslationStarted { row: job.row }).await;

        let text = self
            .translator
            .translate(&job.text, SOURCE_LANGUAGE, TARGET_LANGUAGE)
            .await;

        if is_translation_failure(&text) {
            emit(
                &self.tx,
                WorkEvent::TranslationFailed {
                    row: job.row,
                    error: text,
                },
            )
            .await;
            false
        } else {
            emit(&self.tx, WorkEvent::TranslationDone { row: job.row, text }).await;
            true
        }
    }
}
