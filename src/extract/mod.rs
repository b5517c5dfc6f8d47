//! Extraction layer: the declarative-rule interpreter.

mod engine;

pub use engine::ExtractionEngine;
