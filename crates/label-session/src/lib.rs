mod dispatch;
mod event;
mod session;

pub use dispatch::{
    CaptionJob, CaptionRequest, DispatchError, TranslationJob, WorkDispatcher, SOURCE_LANGUAGE,
    TARGET_LANGUAGE,
};
pub use event::{WorkEvent, WorkKind};
pub use session::*;
