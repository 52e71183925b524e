// ABOUTME: Runs one turn end to end - agent runner on one side, delivery throttler on the other.
// ABOUTME: Both halves share a bounded channel and are driven together on the caller's task.

use crate::delivery::{Delivery, DeliveryThrottler, MessageSurface};
use crate::metrics;
use ferry_agent::{AgentRunner, AgentUpdate, TurnOutcome, TurnRequest};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;

/// Capacity of the per-turn update channel
pub const UPDATE_CHANNEL_CAPACITY: usize = 64;

/// Shown when the agent succeeds without saying anything
pub const EMPTY_ANSWER: &str = "✅ Done (no text output).";

#[derive(Debug)]
pub struct TurnReport {
    pub outcome: TurnOutcome,
    /// None when the final answer could not be delivered
    pub delivery: Option<Delivery>,
    pub elapsed: Duration,
}

/// Stream one turn into the throttler's surface and deliver the final answer
pub async fn run_turn<S: MessageSurface>(
    runner: &dyn AgentRunner,
    throttler: &DeliveryThrottler<S>,
    request: TurnRequest,
) -> TurnReport {
    let started = Instant::now();
    let mut draft = throttler.create().await;
    let (tx, mut rx) = mpsc::channel(UPDATE_CHANNEL_CAPACITY);

    tracing::info!(
        runner = runner.name(),
        resume = request.session_id.is_some(),
        prompt_len = request.prompt.len(),
        "Starting turn"
    );

    let consume = async {
        let mut updates = 0usize;
        while let Some(update) = rx.recv().await {
            updates += 1;
            match update {
                AgentUpdate::Text(text) => {
                    throttler.update(&mut draft, &text, false).await;
                }
                AgentUpdate::Progress(line) => {
                    tracing::debug!(progress = %line, "Agent activity");
                    throttler.progress(&mut draft, &line).await;
                }
            }
        }
        updates
    };

    let (outcome, updates) = tokio::join!(runner.run(request, tx), consume);

    let delivery = if outcome.success {
        let text = if outcome.output.trim().is_empty() {
            EMPTY_ANSWER
        } else {
            outcome.output.as_str()
        };
        throttler.finalize(draft, text).await
    } else {
        throttler.finalize_plain(draft, &outcome.display_text()).await
    };
    let delivery = match delivery {
        Ok(delivery) => Some(delivery),
        Err(e) => {
            tracing::warn!(error = %e, "Failed to deliver final answer");
            None
        }
    };

    let elapsed = started.elapsed();
    let label = if outcome.success {
        "success"
    } else if outcome.started {
        "error"
    } else {
        "not_started"
    };
    metrics::record_turn(label, elapsed);

    tracing::info!(
        outcome = label,
        updates,
        elapsed_ms = elapsed.as_millis() as u64,
        session_id = outcome.session_id.as_deref().unwrap_or(""),
        cost_usd = outcome.usage.as_ref().and_then(|u| u.cost_usd).unwrap_or(0.0),
        "Turn finished"
    );

    TurnReport {
        outcome,
        delivery,
        elapsed,
    }
}
