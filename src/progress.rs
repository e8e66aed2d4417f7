//! Progress reporting contract for batch pipelines.
//!
//! The validator and publisher report coarse progress through this
//! trait rather than owning any notion of how progress is surfaced
//! (SSE, a log line, a channel) — that's an external collaborator's
//! concern; HTTP/UI streaming stays out of the core's scope.

use async_trait::async_trait;

/// One stage of a batch pipeline, for progress reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Parsing,
    ValidatingCscas,
    ValidatingDscs,
    ValidatingCrls,
    Publishing,
}

/// A progress update: stage label plus a 0-100 percentage.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Progress {
    pub stage: Stage,
    pub percent: f32,
    pub processed: usize,
    pub total: usize,
}

/// Sink for coarse progress updates during parse/validate/publish.
///
/// Implementations must be cheap to call often; the validator's
/// reporting cadence guarantee (at least once per 10% of work or
/// every 1000 entries, whichever is finer) assumes this.
#[async_trait]
pub trait ProgressSink: Send + Sync {
    async fn report(&self, progress: Progress);
}

/// A [`ProgressSink`] that discards every update, for callers that
/// don't need progress streaming (tests, batch CLIs run to completion).
#[derive(Debug, Clone, Copy, Default)]
pub struct NullProgressSink;

#[async_trait]
impl ProgressSink for NullProgressSink {
    async fn report(&self, _progress: Progress) {}
}

/// Tracks processed/total counts and decides, per the cadence rule
/// above, whether the next `report` call should actually fire.
pub struct ProgressCadence {
    total: usize,
    processed: usize,
    last_reported_percent: f32,
}

impl ProgressCadence {
    pub fn new(total: usize) -> Self {
        Self {
            total,
            processed: 0,
            last_reported_percent: -1.0,
        }
    }

    /// Record that one more entry completed; returns `Some(Progress)`
    /// when the cadence threshold (10% or 1000 entries) is crossed.
    pub fn advance(&mut self, stage: Stage) -> Option<Progress> {
        self.processed += 1;
        let percent = if self.total == 0 {
            100.0
        } else {
            (self.processed as f32 / self.total as f32) * 100.0
        };

        let crossed_percent = percent - self.last_reported_percent >= 10.0;
        let crossed_count = self.processed % 1000 == 0;
        let finished = self.processed == self.total;

        if crossed_percent || crossed_count || finished {
            self.last_reported_percent = percent;
            Some(Progress {
                stage,
                percent,
                processed: self.processed,
                total: self.total,
            })
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn null_sink_accepts_any_progress() {
        let sink = NullProgressSink;
        sink.report(Progress {
            stage: Stage::Parsing,
            percent: 50.0,
            processed: 5,
            total: 10,
        })
        .await;
    }

    #[test]
    fn cadence_reports_every_10_percent() {
        let mut cadence = ProgressCadence::new(10);
        let reports: Vec<_> = (0..10)
            .filter_map(|_| cadence.advance(Stage::ValidatingCscas))
            .collect();
        // 10 entries over a total of 10 crosses 10% on every single step.
        assert_eq!(reports.len(), 10);
    }

    #[test]
    fn cadence_reports_at_least_every_1000_entries() {
        let mut cadence = ProgressCadence::new(1_000_000);
        let mut reports = 0;
        for _ in 0..2000 {
            if cadence.advance(Stage::Publishing).is_some() {
                reports += 1;
            }
        }
        assert!(reports >= 2);
    }
}
