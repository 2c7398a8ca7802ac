use ai::CaptionResult;
use strum_macros::Display;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "lowercase")]
pub enum WorkKind {
    Caption,
    Translation,
}

/// Progress reported by background work. Rows are indexes into the session
/// that started the work.
#[derive(Debug, Clone, PartialEq)]
pub enum WorkEvent {
    CaptionStarted {
        row: usize,
    },
    CaptionDone {
        row: usize,
        result: CaptionResult,
    },
    CaptionFailed {
        row: usize,
        error: String,
    },
    BatchCaptionCompleted {
        succeeded: usize,
        total: usize,
    },
    TranslationStarted {
        row: usize,
    },
    TranslationDone {
        row: usize,
        text: String,
    },
    TranslationFailed {
        row: usize,
        error: String,
    },
    BatchTranslationCompleted {
        succeeded: usize,
        total: usize,
    },
    /// Last event of every operation, single or batch.
    Finished(WorkKind),
}
