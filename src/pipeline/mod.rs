//! Pipeline building blocks for PDF-to-text conversion.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ probe ──▶ workspace ──▶ converter (per page) ──▶ scheduler ──▶ merge
//! (check)  (pdfinfo)  (scratch)    pdftoppm→tesseract→pdftotext
//! ```
//!
//! 1. [`input`]: validate the source path and PDF magic
//! 2. [`probe`]: page count and metadata via `pdfinfo`
//! 3. [`workspace`]: scratch directory lifecycle and artifact naming
//! 4. [`stages`]: fixed-flag adapters for the three per-page tools
//! 5. [`converter`]: per-page state machine over the stages
//! 6. [`process`]: the process-invocation layer every tool goes through
//!
//! Scheduling and merging live in [`crate::scheduler`] and [`crate::merge`].

pub mod converter;
pub mod input;
pub mod probe;
pub mod process;
pub mod stages;
pub mod workspace;
