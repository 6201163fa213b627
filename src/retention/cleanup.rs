// retention/cleanup.rs — Scheduled data-retention pass.
//
// Two phases per pass:
//   1. Delete analytics events older than the analytics retention period, as
//      one atomic batch. If the batch fails, zero events are deleted and the
//      pass is reported failed for retry on the next tick.
//   2. Anonymize users idle past the user-activity period, each user
//      independently — one failure never blocks the rest.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::time::{interval, Duration};
use tracing::{info, warn};

use super::RetentionEngine;
use crate::config::RetentionConfig;
use crate::errors::ApiError;
use crate::AppContext;

/// Outcome of one cleanup pass. Logged, never persisted.
#[derive(Debug, Clone, Serialize)]
pub struct CleanupReport {
    pub events_deleted: u64,
    pub users_anonymized: usize,
    /// Users whose anonymization failed this pass; retried on the next one.
    pub users_failed: usize,
}

impl RetentionEngine {
    pub async fn run_scheduled_cleanup(
        &self,
        periods: &RetentionConfig,
        now: DateTime<Utc>,
    ) -> Result<CleanupReport, ApiError> {
        let cutoff = periods.analytics_cutoff(now);
        let events_deleted = self.storage().delete_events_before(cutoff).await?;

        let activity_cutoff = periods.activity_cutoff(now);
        let stale = self.storage().stale_user_ids(activity_cutoff).await?;

        let mut users_anonymized = 0;
        let mut users_failed = 0;
        for user_id in &stale {
            match self.storage().anonymize_user(user_id).await {
                Ok(true) => users_anonymized += 1,
                // Already anonymized by a concurrent call — nothing to do.
                Ok(false) => {}
                Err(e) => {
                    users_failed += 1;
                    warn!(user_id = %user_id, err = %e, "scheduled anonymization failed");
                }
            }
        }

        let report = CleanupReport {
            events_deleted,
            users_anonymized,
            users_failed,
        };
        info!(
            events_deleted = report.events_deleted,
            users_anonymized = report.users_anonymized,
            users_failed = report.users_failed,
            "data retention cleanup completed"
        );
        Ok(report)
    }
}

/// Background retention job — runs perpetually on the configured interval.
///
/// Call this in a `tokio::spawn` during startup. Retention periods are read
/// from the hot config on every tick so edits to config.toml apply without a
/// restart.
pub async fn run_retention_job(ctx: Arc<AppContext>) {
    let secs = ctx.config.retention.cleanup_interval_secs.max(1);
    info!(interval_secs = secs, "retention job started");
    let mut ticker = interval(Duration::from_secs(secs));

    loop {
        ticker.tick().await;
        let periods = ctx.hot.read().await.retention.clone();
        match ctx.retention.run_scheduled_cleanup(&periods, Utc::now()).await {
            Ok(report) if report.users_failed > 0 => warn!(
                users_failed = report.users_failed,
                "retention pass completed with per-user failures"
            ),
            Ok(_) => {}
            Err(e) => warn!(err = %e, "retention pass failed — will retry next tick"),
        }
    }
}
