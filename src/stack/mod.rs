//! Stack compatibility validation

pub mod image;
mod validator;

pub use image::{image_source_for, ImageSource, RunImage, StaticImage, StaticImageSource};
pub use validator::StackValidator;
