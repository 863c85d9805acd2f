//! Dispatcher: runs admitted inference requests against their provider.
//!
//! ARCHITECTURE
//! ============
//! The admission gate inserts a `pending` row and the route handler hands a
//! job here. Each job runs on its own task and holds one semaphore permit
//! while it talks to the provider, so at most `DISPATCH_MAX_IN_FLIGHT` calls
//! are outstanding. The row walks `pending -> processing -> completed|failed`;
//! the terminal transition is what releases the user's concurrency slot.
//!
//! ERROR HANDLING
//! ==============
//! Provider failures are recorded on the row, never surfaced to the caller
//! (who already received 202). Database failures while recording an outcome
//! are logged; the row then stays in flight until the reaper's stale sweep
//! fails it. A job whose row is no longer `pending` when its permit arrives
//! (swept, or discarded) is dropped without calling the provider.

use std::sync::Arc;
use std::time::{Duration, Instant};

use sqlx::PgPool;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{info, warn};
use uuid::Uuid;

use crate::llm::inference_backing_model;
use crate::llm::types::{ChatMessage, Completion, LlmCompletion, LlmError, ResolvedParams};
use crate::services::inference::{self, CompletedInference};

/// One admitted request, ready to run.
#[derive(Debug, Clone)]
pub struct InferenceJob {
    pub request_id: Uuid,
    pub user_id: Uuid,
    pub model: String,
    pub prompt: String,
    pub params: ResolvedParams,
}

#[derive(Clone)]
pub struct Dispatcher {
    pool: PgPool,
    llm: Arc<dyn LlmCompletion>,
    permits: Arc<Semaphore>,
}

impl Dispatcher {
    #[must_use]
    pub fn new(pool: PgPool, llm: Arc<dyn LlmCompletion>, max_in_flight: usize) -> Self {
        Self { pool, llm, permits: Arc::new(Semaphore::new(max_in_flight.max(1))) }
    }

    /// Spawn the job on its own task.
    pub fn dispatch(&self, job: InferenceJob) -> JoinHandle<()> {
        let this = self.clone();
        tokio::spawn(async move { this.run(job).await })
    }

    async fn run(&self, job: InferenceJob) {
        let Ok(_permit) = self.permits.clone().acquire_owned().await else {
            warn!(request_id = %job.request_id, "dispatcher closed; request left pending");
            return;
        };

        match inference::mark_processing(&self.pool, job.request_id).await {
            Ok(true) => {}
            Ok(false) => {
                warn!(request_id = %job.request_id, "request no longer pending; skipping");
                return;
            }
            Err(e) => warn!(error = %e, request_id = %job.request_id, "failed to mark request processing"),
        }

        match run_completion(self.llm.as_ref(), &job).await {
            Ok(done) => {
                info!(
                    request_id = %job.request_id,
                    model = %job.model,
                    tokens = done.tokens_total(),
                    elapsed_ms = done.processing_time_ms,
                    "inference completed"
                );
                match inference::mark_completed(&self.pool, job.request_id, &done).await {
                    Ok(true) => {}
                    Ok(false) => {
                        warn!(request_id = %job.request_id, "request settled before completion; result dropped");
                        return;
                    }
                    Err(e) => {
                        warn!(error = %e, request_id = %job.request_id, "failed to record completion");
                        return;
                    }
                }
                if let Err(e) = inference::record_usage(&self.pool, job.user_id, &job.model, &done).await {
                    warn!(error = %e, user_id = %job.user_id, "failed to update usage statistics");
                }
            }
            Err(e) => {
                warn!(error = %e, request_id = %job.request_id, model = %job.model, "inference failed");
                if let Err(e) = inference::mark_failed(&self.pool, job.request_id, &e.to_string()).await {
                    warn!(error = %e, request_id = %job.request_id, "failed to record failure");
                }
            }
        }
    }
}

// =============================================================================
// PROVIDER CALL
// =============================================================================

/// Send the job's prompt to the provider and time the call.
///
/// # Errors
///
/// Returns the provider error unchanged.
pub async fn run_completion(llm: &dyn LlmCompletion, job: &InferenceJob) -> Result<CompletedInference, LlmError> {
    let started = Instant::now();
    let messages = [ChatMessage::user(job.prompt.clone())];
    let completion = llm
        .complete(inference_backing_model(&job.model), &messages, &job.params)
        .await?;
    Ok(to_completed(completion, started.elapsed()))
}

fn to_completed(completion: Completion, elapsed: Duration) -> CompletedInference {
    CompletedInference {
        response: completion.text,
        tokens_prompt: i64::try_from(completion.tokens_prompt).unwrap_or(i64::MAX),
        tokens_completion: i64::try_from(completion.tokens_completion).unwrap_or(i64::MAX),
        processing_time_ms: i64::try_from(elapsed.as_millis()).unwrap_or(i64::MAX),
    }
}

#[cfg(test)]
#[path = "dispatcher_test.rs"]
mod tests;
