mod download;
pub use download::*;
