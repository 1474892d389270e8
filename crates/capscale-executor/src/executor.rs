//! Worker pool that applies updates and waits for them to settle.
//!
//! Each worker owns one pool slot for the whole job: the mutation call and
//! every settle poll after it. Slots are released on an observed steady
//! state (or an exhausted poll budget), never on mutation acknowledgement.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use capscale_core::{ControlPlane, ResourceDescription, RunSettings, UpdateRequest};

use crate::error::{UpdateError, UpdateResult};

/// Result of one applied update.
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateOutcome {
    pub request: UpdateRequest,
    /// Description returned when the control plane accepted the update.
    pub accepted: ResourceDescription,
    /// Whether the resource was observed settled before the job completed.
    pub settled: bool,
    /// Describe calls made while waiting to settle.
    pub poll_attempts: u32,
}

struct Job {
    request: UpdateRequest,
    reply: oneshot::Sender<UpdateResult<UpdateOutcome>>,
}

#[derive(Debug, Clone, Copy)]
struct SettlePolicy {
    interval: Duration,
    max_attempts: u32,
}

/// Fixed-size pool of update workers.
///
/// Dropping the executor without calling [`shutdown`](Self::shutdown)
/// closes the queue but leaves workers running until the jobs already
/// queued have been applied; an accepted update cannot be rolled back.
pub struct UpdateExecutor {
    sender: mpsc::Sender<Job>,
    workers: Vec<JoinHandle<()>>,
}

impl UpdateExecutor {
    /// Spawn `settings.pool_capacity` workers on the current runtime.
    pub fn start(control_plane: Arc<dyn ControlPlane>, settings: &RunSettings) -> Self {
        let capacity = settings.pool_capacity.max(1);
        let (sender, receiver) = mpsc::channel(capacity);
        let queue = Arc::new(Mutex::new(receiver));
        let policy = SettlePolicy {
            interval: settings.settle_poll_interval(),
            max_attempts: settings.settle_max_attempts,
        };

        let workers = (0..capacity)
            .map(|id| {
                tokio::spawn(worker(
                    id,
                    Arc::clone(&control_plane),
                    Arc::clone(&queue),
                    policy,
                ))
            })
            .collect();

        info!(
            workers = capacity,
            poll_interval_ms = policy.interval.as_millis() as u64,
            max_attempts = policy.max_attempts,
            "update executor started"
        );
        Self { sender, workers }
    }

    /// Number of workers, i.e. the most updates that can be in flight.
    pub fn capacity(&self) -> usize {
        self.workers.len()
    }

    /// Queue `request` and wait for its job to complete.
    ///
    /// Safe to call from many tasks at once; waits for queue space when
    /// every worker is busy and the queue is full.
    pub async fn submit(&self, request: UpdateRequest) -> UpdateResult<UpdateOutcome> {
        let resource = request.resource.clone();
        let (reply, response) = oneshot::channel();

        self.sender
            .send(Job { request, reply })
            .await
            .map_err(|_| UpdateError::Closed)?;

        response
            .await
            .map_err(|_| UpdateError::Dropped(resource))?
    }

    /// Stop accepting jobs and wait for queued ones to finish.
    pub async fn shutdown(self) {
        drop(self.sender);
        for handle in self.workers {
            if let Err(e) = handle.await {
                warn!(error = %e, "update worker panicked");
            }
        }
        debug!("update executor drained");
    }
}

async fn worker(
    id: usize,
    control_plane: Arc<dyn ControlPlane>,
    queue: Arc<Mutex<mpsc::Receiver<Job>>>,
    policy: SettlePolicy,
) {
    loop {
        let job = queue.lock().await.recv().await;
        let Some(Job { request, reply }) = job else {
            break;
        };

        let result = apply_and_settle(control_plane.as_ref(), request, policy).await;
        if reply.send(result).is_err() {
            debug!(worker = id, "submitter gone, outcome discarded");
        }
    }
    debug!(worker = id, "update worker stopped");
}

/// Apply `request` without waiting for the resource to settle.
pub async fn apply_direct(
    control_plane: &dyn ControlPlane,
    request: UpdateRequest,
) -> UpdateResult<UpdateOutcome> {
    let accepted = control_plane
        .update_resource(&request)
        .await
        .map_err(|source| UpdateError::Rejected {
            resource: request.resource.clone(),
            source,
        })?;

    info!(
        resource = %request.resource,
        throughput = ?request.throughput,
        indexes = request.index_updates.len(),
        status = ?accepted.status,
        "capacity update accepted"
    );

    Ok(UpdateOutcome {
        settled: accepted.is_settled(),
        request,
        accepted,
        poll_attempts: 0,
    })
}

async fn apply_and_settle(
    control_plane: &dyn ControlPlane,
    request: UpdateRequest,
    policy: SettlePolicy,
) -> UpdateResult<UpdateOutcome> {
    let mut outcome = apply_direct(control_plane, request).await?;
    let resource = outcome.request.resource.as_str();

    for attempt in 1..=policy.max_attempts {
        outcome.poll_attempts = attempt;
        match control_plane.describe_resource(resource).await {
            Ok(description) if description.is_settled() => {
                outcome.settled = true;
                break;
            }
            Ok(description) => {
                debug!(
                    %resource,
                    attempt,
                    status = ?description.status,
                    "waiting for resource to settle"
                );
            }
            Err(e) => {
                warn!(%resource, attempt, error = %e, "settle poll failed");
            }
        }
        if attempt < policy.max_attempts {
            tokio::time::sleep(policy.interval).await;
        }
    }

    if outcome.settled {
        debug!(%resource, polls = outcome.poll_attempts, "resource settled");
    } else {
        warn!(
            %resource,
            polls = outcome.poll_attempts,
            "resource did not settle within the poll budget, releasing slot"
        );
    }
    Ok(outcome)
}
