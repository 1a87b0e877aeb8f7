//! Progress-callback trait for per-stage pipeline events.
//!
//! Inject an [`Arc<dyn ProcessProgressCallback>`] via
//! [`crate::config::ProcessConfigBuilder::progress_callback`] to be told when
//! each stage of a run starts, finishes or fails. The CLI uses it to drive a
//! spinner; library callers can forward events anywhere.
//!
//! # Example
//!
//! ```rust
//! use pdf2json::{ProcessConfig, ProcessProgressCallback, Stage};
//! use std::sync::Arc;
//!
//! struct Log;
//!
//! impl ProcessProgressCallback for Log {
//!     fn on_stage_complete(&self, stage: Stage, detail: &str) {
//!         eprintln!("{} done: {}", stage.label(), detail);
//!     }
//! }
//!
//! let config = ProcessConfig::builder()
//!     .progress_callback(Arc::new(Log) as Arc<dyn ProcessProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// One step of the pipeline, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Stage {
    /// Copy the local PDF or download the URL into the run directory.
    Resolve,
    /// Upload to the parsing service and wait for Markdown.
    Parse,
    /// Build the section tree.
    Structure,
    /// Save embedded images and look for a DOI.
    Extract,
    /// Ask the LLM for the author list.
    Authors,
}

impl Stage {
    /// All stages in the order they run.
    pub const ALL: [Stage; 5] = [
        Stage::Resolve,
        Stage::Parse,
        Stage::Structure,
        Stage::Extract,
        Stage::Authors,
    ];

    /// Short human-readable name.
    pub fn label(self) -> &'static str {
        match self {
            Stage::Resolve => "Fetching PDF",
            Stage::Parse => "Parsing to Markdown",
            Stage::Structure => "Building section tree",
            Stage::Extract => "Extracting images and DOI",
            Stage::Authors => "Extracting authors",
        }
    }

    /// 1-indexed position in [`Stage::ALL`].
    pub fn position(self) -> usize {
        Stage::ALL
            .iter()
            .position(|s| *s == self)
            .map_or(0, |i| i + 1)
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Called by the pipeline as it moves through each [`Stage`].
///
/// All methods have default no-op implementations so callers only override
/// what they care about. Implementations must be `Send + Sync` because the
/// HTTP service shares one config across concurrent requests.
pub trait ProcessProgressCallback: Send + Sync {
    /// Called just before a stage starts.
    fn on_stage_start(&self, stage: Stage) {
        let _ = stage;
    }

    /// Called when a stage succeeds.
    ///
    /// `detail` is a short summary such as `"12 sections"`.
    fn on_stage_complete(&self, stage: Stage, detail: &str) {
        let _ = (stage, detail);
    }

    /// Called when a stage fails; the run stops afterwards.
    fn on_stage_error(&self, stage: Stage, error: &str) {
        let _ = (stage, error);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl ProcessProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::ProcessConfig`].
pub type ProgressCallback = Arc<dyn ProcessProgressCallback>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<String>>,
    }

    impl ProcessProgressCallback for Recorder {
        fn on_stage_start(&self, stage: Stage) {
            self.events.lock().unwrap().push(format!("start {stage:?}"));
        }

        fn on_stage_complete(&self, stage: Stage, detail: &str) {
            self.events
                .lock()
                .unwrap()
                .push(format!("done {stage:?} {detail}"));
        }

        fn on_stage_error(&self, stage: Stage, error: &str) {
            self.events
                .lock()
                .unwrap()
                .push(format!("fail {stage:?} {error}"));
        }
    }

    #[test]
    fn noop_callback_does_not_panic() {
        let cb = NoopProgressCallback;
        cb.on_stage_start(Stage::Parse);
        cb.on_stage_complete(Stage::Parse, "ok");
        cb.on_stage_error(Stage::Authors, "boom");
    }

    #[test]
    fn recorder_sees_events_in_order() {
        let rec = Recorder::default();
        rec.on_stage_start(Stage::Structure);
        rec.on_stage_complete(Stage::Structure, "3 sections");
        rec.on_stage_start(Stage::Extract);
        rec.on_stage_error(Stage::Extract, "no pdfium");
        assert_eq!(
            *rec.events.lock().unwrap(),
            vec![
                "start Structure",
                "done Structure 3 sections",
                "start Extract",
                "fail Extract no pdfium",
            ]
        );
    }

    #[test]
    fn stage_positions_follow_execution_order() {
        let positions: Vec<usize> = Stage::ALL.iter().map(|s| s.position()).collect();
        assert_eq!(positions, vec![1, 2, 3, 4, 5]);
        assert_eq!(Stage::Authors.to_string(), "Extracting authors");
    }

    #[test]
    fn arc_dyn_callback_works() {
        let cb: ProgressCallback = Arc::new(NoopProgressCallback);
        cb.on_stage_start(Stage::Resolve);
    }
}
