//! Per-call context and time source.
//!
//! # Responsibility
//! - Carry the audit actor, trace id and cancellation signal of one call.
//! - Provide the injectable clock both storage adapters stamp timestamps with.
//!
//! # Invariants
//! - Timestamps handed to storage have millisecond precision.

use crate::model::organization::ActorId;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Caller-supplied context passed to every repository/service operation.
#[derive(Debug, Clone, Default)]
pub struct OpContext {
    /// Written into `created_by`/`updated_by`.
    pub actor: Option<ActorId>,
    /// Copied into published events.
    pub trace_id: String,
    /// Aborts the operation when triggered. A cancelled mutation has undefined
    /// completion state; callers must re-fetch.
    pub cancel: CancellationToken,
}

impl OpContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_actor(mut self, actor: ActorId) -> Self {
        self.actor = Some(actor);
        self
    }

    pub fn with_trace_id(mut self, trace_id: impl Into<String>) -> Self {
        self.trace_id = trace_id.into();
        self
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

/// Time source for `created_at`/`updated_at`/`deleted_at`.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

pub type SharedClock = Arc<dyn Clock>;

pub fn system_clock() -> SharedClock {
    Arc::new(SystemClock)
}

/// Reads `clock` truncated to whole milliseconds.
pub fn now_millis(clock: &dyn Clock) -> DateTime<Utc> {
    let now = clock.now();
    DateTime::from_timestamp_millis(now.timestamp_millis()).unwrap_or(now)
}

#[cfg(test)]
mod tests {
    use super::{now_millis, Clock, OpContext};
    use chrono::{DateTime, TimeZone, Utc};

    struct FixedClock(DateTime<Utc>);

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.0
        }
    }

    #[test]
    fn now_millis_drops_sub_millisecond_precision() {
        let precise = Utc.timestamp_opt(1_700_000_000, 123_456_789).unwrap();
        let truncated = now_millis(&FixedClock(precise));
        assert_eq!(truncated.timestamp_millis(), precise.timestamp_millis());
        assert_eq!(truncated.timestamp_subsec_nanos(), 123_000_000);
    }

    #[test]
    fn context_reports_cancellation() {
        let ctx = OpContext::new().with_trace_id("trace-1");
        assert!(!ctx.is_cancelled());
        ctx.cancel.cancel();
        assert!(ctx.is_cancelled());
        assert_eq!(ctx.trace_id, "trace-1");
    }
}
