//! Detached persistence of a completed session's outcomes.

use std::sync::Arc;
use tokio::task::JoinHandle;

use crate::metrics::LEDGER_FLUSH_TOTAL;
use crate::services::session_machine::FlushPlan;
use crate::stores::{ProgressLedger, ScoreLedger};
use crate::utils::retry::{retry_async_with_config, RetryConfig};

/// Background tasks spawned for one flush. Dropping the handle detaches them.
#[derive(Debug, Default)]
pub struct FlushHandle {
    score: Option<JoinHandle<()>>,
    progress: Option<JoinHandle<()>>,
}

impl FlushHandle {
    pub fn is_empty(&self) -> bool {
        self.score.is_none() && self.progress.is_none()
    }

    /// Waits for both ledger writes to finish (successfully or not).
    pub async fn join(self) {
        for handle in [self.score, self.progress].into_iter().flatten() {
            if let Err(e) = handle.await {
                tracing::error!("Ledger flush task aborted: {}", e);
            }
        }
    }
}

#[derive(Clone)]
pub struct FlushDispatcher {
    progress: Arc<dyn ProgressLedger>,
    scores: Arc<dyn ScoreLedger>,
    retry: RetryConfig,
}

impl FlushDispatcher {
    pub fn new(
        progress: Arc<dyn ProgressLedger>,
        scores: Arc<dyn ScoreLedger>,
        retry: RetryConfig,
    ) -> Self {
        Self {
            progress,
            scores,
            retry,
        }
    }

    /// Spawns the score append and the progress upsert as two independent tasks.
    /// Must be called from within a tokio runtime.
    pub fn dispatch(&self, plan: FlushPlan) -> FlushHandle {
        let FlushPlan {
            user_id,
            category,
            score,
            progress,
        } = plan;

        let score = score.map(|score| {
            let scores = self.scores.clone();
            let retry = self.retry.clone();
            let user_id = user_id.clone();
            let category = category.clone();
            tokio::spawn(async move {
                let result = retry_async_with_config(retry, || {
                    scores.append(&user_id, &category, score)
                })
                .await;
                match result {
                    Ok(event) => {
                        LEDGER_FLUSH_TOTAL.with_label_values(&["score", "success"]).inc();
                        tracing::info!(
                            "Score {} recorded for user {} in {} ({})",
                            score,
                            user_id,
                            category,
                            event.id
                        );
                    }
                    Err(e) => {
                        LEDGER_FLUSH_TOTAL.with_label_values(&["score", "error"]).inc();
                        tracing::error!("Score flush failed for user {}: {}", user_id, e);
                    }
                }
            })
        });

        let progress = (!progress.is_empty()).then(|| {
            let ledger = self.progress.clone();
            let retry = self.retry.clone();
            tokio::spawn(async move {
                let result =
                    retry_async_with_config(retry, || ledger.upsert_batch(&user_id, &progress))
                        .await;
                match result {
                    Ok(()) => {
                        LEDGER_FLUSH_TOTAL
                            .with_label_values(&["progress", "success"])
                            .inc();
                        tracing::info!(
                            "Progress recorded for user {} ({} answers)",
                            user_id,
                            progress.len()
                        );
                    }
                    Err(e) => {
                        LEDGER_FLUSH_TOTAL
                            .with_label_values(&["progress", "error"])
                            .inc();
                        tracing::error!("Progress flush failed for user {}: {}", user_id, e);
                    }
                }
            })
        });

        FlushHandle { score, progress }
    }
}
