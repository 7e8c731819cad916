//! `mediaconv-core`: shared building blocks.
//!
//! This crate contains **pure** primitives (no infrastructure concerns).

pub mod context;
pub mod error;
pub mod id;
pub mod time;
pub mod validation;

pub use context::TraceContext;
pub use error::DomainError;
pub use id::{ImageId, JobId};
pub use validation::{FieldError, ValidationErrors};
