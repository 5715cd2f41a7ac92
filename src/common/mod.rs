//! Common types shared across the analyzer components

pub mod error;
pub use error::{AnalysisError, AnalysisResult};
