//! Progress-callback trait for per-page conversion events.
//!
//! Inject an [`Arc<dyn ConversionProgressCallback>`] via
//! [`crate::config::ConversionConfigBuilder::progress_callback`] to receive
//! events as the pipeline works through the pages.
//!
//! # Example
//!
//! ```rust
//! use pdftt::{ConversionProgressCallback, ConversionConfig};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     completed: AtomicUsize,
//! }
//!
//! impl ConversionProgressCallback for CountingCallback {
//!     fn on_page_complete(&self, page_num: u32, total_pages: usize, text_bytes: u64) {
//!         self.completed.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("Page {}/{} done ({} bytes)", page_num, total_pages, text_bytes);
//!     }
//! }
//!
//! let counter = Arc::new(CountingCallback { completed: AtomicUsize::new(0) });
//!
//! let config = ConversionConfig::builder()
//!     .progress_callback(counter as Arc<dyn ConversionProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use crate::output::PageState;
use std::sync::Arc;

/// Called by the conversion pipeline as it processes each page.
///
/// Pages run concurrently, so `on_page_*` methods may be called from
/// several tasks at once and in any page order. All methods default to
/// no-ops.
pub trait ConversionProgressCallback: Send + Sync {
    /// Called once, after probing, with the number of selected pages.
    fn on_conversion_start(&self, total_pages: usize) {
        let _ = total_pages;
    }

    /// Called when a page is dispatched to a worker.
    fn on_page_start(&self, page_num: u32, total_pages: usize) {
        let _ = (page_num, total_pages);
    }

    /// Called on every page state transition, including `Merged` and `Failed`.
    fn on_page_state(&self, page_num: u32, state: PageState) {
        let _ = (page_num, state);
    }

    /// Called when a page reaches `TextExtracted`.
    ///
    /// `text_bytes` is the size of the page's text artifact.
    fn on_page_complete(&self, page_num: u32, total_pages: usize, text_bytes: u64) {
        let _ = (page_num, total_pages, text_bytes);
    }

    /// Called when a page fails.
    fn on_page_error(&self, page_num: u32, total_pages: usize, error: &str) {
        let _ = (page_num, total_pages, error);
    }

    /// Called once after the scheduler has finished, before merging.
    fn on_conversion_complete(&self, total_pages: usize, success_count: usize) {
        let _ = (total_pages, success_count);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl ConversionProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::ConversionConfig`].
pub type ProgressCallback = Arc<dyn ConversionProgressCallback>;
