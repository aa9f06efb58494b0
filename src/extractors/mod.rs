// src/extractors/mod.rs
pub mod line;
pub mod scanner;
pub mod values;

// Re-export key extraction types for convenience
pub use scanner::{ExtractedRow, ScanReport, SectionScanner};
