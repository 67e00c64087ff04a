//! Generator implementations for Quill.
//!
//! This crate provides the concrete Gemini implementation of the
//! `Generator` trait, along with the Gemini File API client used to stage
//! reference attachments for a generation run.

pub mod gemini;

pub use gemini::file_api::{FileState, GeminiFile, GeminiFileApi};
pub use gemini::{FileReference, GeminiGenerator};
