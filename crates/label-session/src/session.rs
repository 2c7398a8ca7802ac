use crate::{
    dispatch::{CaptionJob, CaptionRequest, DispatchError, TranslationJob, WorkDispatcher},
    event::{WorkEvent, WorkKind},
};
use ai::Labeler;
use label_config::{ConfigStore, LabelerKind};
use std::{
    path::{Path, PathBuf},
    sync::Arc,
};
use strum_macros::Display;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use translation::Translator;

pub const SUPPORTED_IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "bmp", "webp"];

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("not a directory: {0}")]
    NotADirectory(PathBuf),
    #[error("no directory is open")]
    NoDirectory,
    #[error("row {0} does not exist")]
    RowOutOfRange(usize),
    #[error("row {0} has no caption to translate")]
    EmptyCaption(usize),
    #[error("there are unsaved changes")]
    UnsavedChanges,
    #[error("work is still running, wait for it to finish")]
    Busy,
    #[error(transparent)]
    Dispatch(#[from] DispatchError),
}

pub type SessionResult<T> = Result<T, SessionError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "lowercase")]
pub enum RowStatus {
    Empty,
    Captioning,
    Captioned,
    Translating,
    Translated,
}

#[derive(Debug, Clone)]
pub struct ImageRow {
    pub path: PathBuf,
    pub caption: String,
    pub translation: String,
    pub status: RowStatus,
    /// Edited, captioned or translated since the last load or save.
    pub dirty: bool,
}

impl ImageRow {
    fn load(path: PathBuf) -> Self {
        let sidecar = sidecar_path(&path);
        let caption = match std::fs::read_to_string(&sidecar) {
            Ok(v) => v.trim().to_string(),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
            Err(e) => {
                warn!("failed to read {}: {}", sidecar.display(), e);
                String::new()
            }
        };

        let status = if caption.is_empty() {
            RowStatus::Empty
        } else {
            RowStatus::Captioned
        };

        Self {
            path,
            caption,
            translation: String::new(),
            status,
            dirty: false,
        }
    }

    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|v| v.to_string_lossy().to_string())
            .unwrap_or_default()
    }

    pub fn sidecar_path(&self) -> PathBuf {
        sidecar_path(&self.path)
    }

    fn settled_status(&self) -> RowStatus {
        if self.caption.is_empty() {
            RowStatus::Empty
        } else if self.translation.is_empty() {
            RowStatus::Captioned
        } else {
            RowStatus::Translated
        }
    }
}

/// `foo.jpg` is captioned by `foo.txt` next to it.
pub fn sidecar_path(image_path: &Path) -> PathBuf {
    image_path.with_extension("txt")
}

pub fn is_supported_image(path: &Path) -> bool {
    path.extension()
        .and_then(|v| v.to_str())
        .map(|v| {
            SUPPORTED_IMAGE_EXTENSIONS
                .iter()
                .any(|ext| v.eq_ignore_ascii_case(ext))
        })
        .unwrap_or(false)
}

/// Images of `directory`, sorted by file name. Subdirectories are not
/// visited.
pub fn list_images(directory: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut images = vec![];
    for entry in std::fs::read_dir(directory)? {
        let path = entry?.path();
        if path.is_file() && is_supported_image(&path) {
            images.push(path);
        }
    }
    images.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    Ok(images)
}

/// The shared prefix (text before the first comma) of the first two
/// non-empty captions, or empty when they differ or there are fewer than two.
pub fn extract_trigger_word<'a>(captions: impl IntoIterator<Item = &'a str>) -> String {
    let prefixes = captions
        .into_iter()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .take(2)
        .map(|v| v.split(',').next().unwrap_or(v).trim())
        .collect::<Vec<_>>();

    match prefixes.as_slice() {
        [first, second] if !first.is_empty() && first == second => first.to_string(),
        _ => String::new(),
    }
}

/// Rows of one directory plus the work running on them.
///
/// Background results are applied by [`LabelSession::next_event`], so the row
/// data is only ever touched by the task that owns the session.
pub struct LabelSession {
    config: Arc<ConfigStore>,
    dispatcher: WorkDispatcher,
    events: mpsc::Receiver<WorkEvent>,
    directory: Option<PathBuf>,
    rows: Vec<ImageRow>,
    trigger_word: String,
    backend_override: Option<LabelerKind>,
}

impl LabelSession {
    pub fn new(
        config: Arc<ConfigStore>,
        labeler: Arc<dyn Labeler>,
        translator: Arc<dyn Translator>,
    ) -> Self {
        let (dispatcher, events) = WorkDispatcher::new(config.clone(), labeler, translator);
        Self {
            config,
            dispatcher,
            events,
            directory: None,
            rows: vec![],
            trigger_word: String::new(),
            backend_override: None,
        }
    }

    pub fn directory(&self) -> Option<&Path> {
        self.directory.as_deref()
    }

    pub fn rows(&self) -> &[ImageRow] {
        &self.rows
    }

    pub fn row(&self, row: usize) -> SessionResult<&ImageRow> {
        self.rows.get(row).ok_or(SessionError::RowOutOfRange(row))
    }

    fn row_mut(&mut self, row: usize) -> SessionResult<&mut ImageRow> {
        self.rows.get_mut(row).ok_or(SessionError::RowOutOfRange(row))
    }

    pub fn is_dirty(&self) -> bool {
        self.rows.iter().any(|v| v.dirty)
    }

    pub fn is_busy(&self) -> bool {
        self.dispatcher.is_busy(WorkKind::Caption) || self.dispatcher.is_busy(WorkKind::Translation)
    }

    /// Refuses to drop unsaved edits unless `force` is set.
    pub fn confirm_discard(&self, force: bool) -> SessionResult<()> {
        if self.is_dirty() && !force {
            return Err(SessionError::UnsavedChanges);
        }
        Ok(())
    }

    /// Replaces all rows with the images of `path` and their sidecar
    /// captions. Returns the number of images.
    ///
    /// Events still queued from earlier work are applied to the current rows
    /// first, so their captions count as unsaved changes.
    pub fn open_directory(&mut self, path: impl AsRef<Path>, force: bool) -> SessionResult<usize> {
        let path = path.as_ref();
        if !path.is_dir() {
            return Err(SessionError::NotADirectory(path.to_path_buf()));
        }
        if self.is_busy() {
            return Err(SessionError::Busy);
        }
        // finished work can leave events queued for the current rows
        while self.try_next_event().is_some() {}
        self.confirm_discard(force)?;

        let path = path.canonicalize()?;
        let rows = list_images(&path)?
            .into_iter()
            .map(ImageRow::load)
            .collect::<Vec<_>>();

        info!("opened {} with {} images", path.display(), rows.len());

        self.directory = Some(path);
        self.rows = rows;
        self.trigger_word = extract_trigger_word(self.rows.iter().map(|v| v.caption.as_str()));

        Ok(self.rows.len())
    }

    pub fn trigger_word(&self) -> &str {
        &self.trigger_word
    }

    pub fn set_trigger_word(&mut self, trigger_word: &str) {
        self.trigger_word = trigger_word.trim().to_string();
    }

    /// Backend used instead of `labeling_config.backend` for this session.
    pub fn set_backend_override(&mut self, backend: Option<LabelerKind>) {
        self.backend_override = backend;
    }

    pub fn backend(&self) -> LabelerKind {
        self.backend_override
            .unwrap_or_else(|| self.config.labeling_config().backend)
    }

    /// The directory's own instruction, if it has one that differs from the
    /// default.
    pub fn directory_prompt(&self) -> Option<String> {
        let directory = self.directory.as_ref()?;
        self.config
            .directory_entry(&directory.to_string_lossy())
            .filter(|v| v.has_custom_prompt())
            .map(|v| v.prompt)
    }

    fn caption_request(&self) -> CaptionRequest {
        CaptionRequest {
            backend: self.backend(),
            directory_prompt: self.directory_prompt(),
        }
    }

    pub fn set_caption(&mut self, row: usize, text: &str) -> SessionResult<()> {
        let row = self.row_mut(row)?;
        row.caption = text.trim().to_string();
        row.dirty = true;
        row.status = row.settled_status();
        Ok(())
    }

    pub fn label_row(&mut self, row: usize) -> SessionResult<()> {
        if self.directory.is_none() {
            return Err(SessionError::NoDirectory);
        }
        let job = CaptionJob {
            row,
            image_path: self.row(row)?.path.clone(),
        };
        self.dispatcher.start_caption(job, self.caption_request())?;
        Ok(())
    }

    /// Captions every row without a caption, or every row when
    /// `overwrite_existing` is on. Returns the number of queued rows.
    pub fn label_all(&mut self) -> SessionResult<usize> {
        let overwrite = self.config.labeling_config().overwrite_existing;
        self.label_all_with(overwrite)
    }

    pub fn label_all_with(&mut self, overwrite: bool) -> SessionResult<usize> {
        if self.directory.is_none() {
            return Err(SessionError::NoDirectory);
        }
        let jobs = self
            .rows
            .iter()
            .enumerate()
            .filter(|(_, v)| overwrite || v.caption.is_empty())
            .map(|(row, v)| CaptionJob {
                row,
                image_path: v.path.clone(),
            })
            .collect::<Vec<_>>();

        let count = jobs.len();
        self.dispatcher
            .start_batch_caption(jobs, self.caption_request())?;
        Ok(count)
    }

    pub fn translate_row(&mut self, row: usize) -> SessionResult<()> {
        let caption = self.row(row)?.caption.clone();
        if caption.is_empty() {
            return Err(SessionError::EmptyCaption(row));
        }
        self.dispatcher.start_translation(TranslationJob {
            row,
            text: caption,
        })?;
        Ok(())
    }

    /// Translates every captioned row that has no translation yet. Returns
    /// the number of queued rows.
    pub fn translate_all(&mut self) -> SessionResult<usize> {
        let jobs = self
            .rows
            .iter()
            .enumerate()
            .filter(|(_, v)| !v.caption.is_empty() && v.translation.is_empty())
            .map(|(row, v)| TranslationJob {
                row,
                text: v.caption.clone(),
            })
            .collect::<Vec<_>>();

        let count = jobs.len();
        self.dispatcher.start_batch_translation(jobs)?;
        Ok(count)
    }

    /// Waits for the next background event and applies it to the rows.
    pub async fn next_event(&mut self) -> Option<WorkEvent> {
        let event = self.events.recv().await?;
        self.apply(&event);
        Some(event)
    }

    /// Applies an event without waiting, if one is queued.
    pub fn try_next_event(&mut self) -> Option<WorkEvent> {
        let event = self.events.try_recv().ok()?;
        self.apply(&event);
        Some(event)
    }

    pub fn apply(&mut self, event: &WorkEvent) {
        let trigger_word = self.trigger_word.clone();
        match event {
            WorkEvent::CaptionStarted { row } => {
                if let Some(row) = self.rows.get_mut(*row) {
                    row.status = RowStatus::Captioning;
                }
            }
            WorkEvent::CaptionDone { row, result } => {
                if let Some(row) = self.rows.get_mut(*row) {
                    row.caption = if trigger_word.is_empty() {
                        result.description.clone()
                    } else {
                        format!("{}, {}", trigger_word, result.description)
                    };
                    row.translation = result.zh.clone();
                    row.dirty = true;
                    row.status = row.settled_status();
                }
            }
            WorkEvent::CaptionFailed { row: index, error } => {
                warn!("caption of row {} failed: {}", index, error);
                if let Some(row) = self.rows.get_mut(*index) {
                    row.status = row.settled_status();
                }
            }
            WorkEvent::TranslationStarted { row } => {
                if let Some(row) = self.rows.get_mut(*row) {
                    row.status = RowStatus::Translating;
                }
            }
            WorkEvent::TranslationDone { row, text } => {
                if let Some(row) = self.rows.get_mut(*row) {
                    row.translation = text.clone();
                    row.dirty = true;
                    row.status = row.settled_status();
                }
            }
            WorkEvent::TranslationFailed { row: index, error } => {
                warn!("translation of row {} failed: {}", index, error);
                if let Some(row) = self.rows.get_mut(*index) {
                    row.translation = error.clone();
                    row.dirty = true;
                    row.status = RowStatus::Captioned;
                }
            }
            WorkEvent::BatchCaptionCompleted { succeeded, total } => {
                info!("captioned {}/{} images", succeeded, total);
            }
            WorkEvent::BatchTranslationCompleted { succeeded, total } => {
                info!("translated {}/{} captions", succeeded, total);
            }
            WorkEvent::Finished(_) => {}
        }
    }

    /// Writes every non-empty caption to its sidecar file and returns how
    /// many were written. Rows that failed to write stay dirty.
    pub fn save_all(&mut self) -> SessionResult<usize> {
        if self.directory.is_none() {
            return Err(SessionError::NoDirectory);
        }

        let mut saved = 0;
        for row in self.rows.iter_mut() {
            if row.caption.is_empty() {
                row.dirty = false;
                continue;
            }

            let sidecar = row.sidecar_path();
            match std::fs::write(&sidecar, &row.caption) {
                Ok(_) => {
                    saved += 1;
                    row.dirty = false;
                }
                Err(e) => error!("failed to write {}: {}", sidecar.display(), e),
            }
        }

        info!("saved {} captions", saved);
        Ok(saved)
    }
}
