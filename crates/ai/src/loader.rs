use anyhow::anyhow;
use std::{sync::Mutex, time::Instant};
use tracing::{debug, info};

struct LoadedModel<T> {
    model_id: String,
    model: T,
}

/// Holds at most one loaded model. Asking for a different model id drops the
/// current one before loading the next, so weights are loaded once and kept
/// until the id changes.
///
/// Loading and inference both happen under the lock; callers run this on a
/// blocking thread.
pub(crate) struct ModelLoader<T> {
    model: Mutex<Option<LoadedModel<T>>>,
}

impl<T> ModelLoader<T> {
    pub fn new() -> Self {
        Self {
            model: Mutex::new(None),
        }
    }

    pub fn loaded_model_id(&self) -> Option<String> {
        self.model
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .map(|v| v.model_id.clone())
    }

    pub fn with_model<R, C, F>(&self, model_id: &str, create_model: C, f: F) -> anyhow::Result<R>
    where
        C: FnOnce() -> anyhow::Result<T>,
        F: FnOnce(&mut T) -> anyhow::Result<R>,
    {
        let mut current = self.model.lock().unwrap_or_else(|e| e.into_inner());

        if let Some(loaded) = current.as_ref() {
            if loaded.model_id != model_id {
                info!(
                    "model changed from {} to {}, offload current model",
                    loaded.model_id, model_id
                );
                *current = None;
            }
        }

        if current.is_none() {
            debug!("loading model {}", model_id);
            let start = Instant::now();
            let model = create_model()?;
            info!("model {} loaded in {:?}", model_id, start.elapsed());
            *current = Some(LoadedModel {
                model_id: model_id.to_string(),
                model,
            });
        }

        let loaded = current.as_mut().ok_or(anyhow!("no valid model"))?;
        f(&mut loaded.model)
    }

    pub fn offload(&self) {
        let mut current = self.model.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(loaded) = current.take() {
            debug!("offload model {}", loaded.model_id);
        }
    }
}
