//! Cooperative cancellation and deadlines for the token-scan loops.

use crate::error::{codes, Diagnostic};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Shared flag another thread can flip to stop a running scan.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    flag: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }
}

/// Limits checked once per token.
#[derive(Debug, Clone, Default)]
pub struct ScanBudget {
    pub token: Option<CancellationToken>,
    pub deadline: Option<Instant>,
}

impl ScanBudget {
    pub fn unlimited() -> Self {
        Self::default()
    }

    pub fn with_token(mut self, token: CancellationToken) -> Self {
        self.token = Some(token);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.deadline = Some(Instant::now() + timeout);
        self
    }

    /// `Err` with the failure diagnostic once the scan must stop.
    pub fn check(&self, line: u32) -> Result<(), Diagnostic> {
        if self.token.as_ref().is_some_and(CancellationToken::is_cancelled) {
            return Err(Diagnostic::error(
                codes::PARSE_CANCELLED,
                line,
                "parse cancelled by caller",
            ));
        }
        if self.deadline.is_some_and(|d| Instant::now() >= d) {
            return Err(Diagnostic::error(
                codes::PARSE_DEADLINE_EXCEEDED,
                line,
                "parse exceeded its deadline",
            )
            .with_suggestion("raise engine.deadline_ms or reduce nesting in the input"));
        }
        Ok(())
    }
}
