//! `mediaconv-ai`
//!
//! **Responsibility:** the vision-analysis boundary.
//!
//! This crate is intentionally **not** part of the domain model:
//! - It knows nothing about jobs or stored records.
//! - It takes an image url + prompt and returns text; nothing else.
//! - Retries are not its concern (they happen by queue redelivery).

pub mod analyzer;
pub mod canned;
pub mod openai;
pub mod result;

pub use analyzer::{AnalysisRequest, ImageAnalyzer};
pub use canned::CannedImageAnalyzer;
pub use openai::{OpenAiConfig, OpenAiImageAnalyzer};
pub use result::{AnalyzerError, ImageAnalysis};
