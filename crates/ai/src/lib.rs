mod caption;
mod dispatcher;
mod loader;
mod traits;

pub mod blip;
pub mod gemini;
pub mod llm;
pub mod utils;

pub use caption::*;
pub use dispatcher::*;
pub use traits::*;
