//! Log context handle
//!
//! Each component receives a [`LogContext`] at construction and enters it
//! for the duration of every operation, so log lines carry the device and
//! component they came from without any process-wide logger lookup.

use tracing::span::EnteredSpan;
use tracing::{info_span, Span};

/// Span carried by every component of one mount device
#[derive(Debug, Clone)]
pub struct LogContext {
    span: Span,
}

impl LogContext {
    /// Root context for one mount device
    pub fn new(device: &str) -> Self {
        Self {
            span: info_span!("mount", device = %device),
        }
    }

    /// Context that records nothing
    pub fn disabled() -> Self {
        Self { span: Span::none() }
    }

    /// Context for a component owned by this device
    pub fn child(&self, component: &'static str) -> Self {
        Self {
            span: info_span!(parent: &self.span, "component", name = component),
        }
    }

    /// Enter the context. The guard owns its span handle, so the caller
    /// stays free to borrow itself mutably while it is held.
    pub fn enter(&self) -> EnteredSpan {
        self.span.clone().entered()
    }

    /// Underlying span, for instrumenting work handed to other threads
    pub fn span(&self) -> &Span {
        &self.span
    }
}

impl Default for LogContext {
    fn default() -> Self {
        Self::disabled()
    }
}
