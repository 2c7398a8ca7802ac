mod image_caption;
mod labeler;

pub use image_caption::*;
pub use labeler::*;
