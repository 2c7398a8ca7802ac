use crate::CaptionResult;
use async_trait::async_trait;
use label_config::LabelerKind;
use std::path::Path;

/// Anything that can caption an image with one of the configured backends.
///
/// Implementations never fail: problems are reported through a
/// [`CaptionResult`] whose description carries the failure marker.
#[async_trait]
pub trait Labeler: Send + Sync {
    async fn label(
        &self,
        image_path: &Path,
        backend: LabelerKind,
        directory_prompt: Option<&str>,
    ) -> CaptionResult;
}
