//! `mediaconv-images`
//!
//! Processed image records and the input value object that triggers them.

pub mod image;
pub mod input;

pub use image::{ImageParts, ProcessedImage};
pub use input::ProcessImageInput;
