use crate::campaign::{CampaignRun, CampaignRunner};
use serde::{Deserialize, Serialize};
use std::{collections::HashMap, sync::Arc};
use thiserror::Error;
use tokio::{
    sync::{Mutex, Semaphore, mpsc},
    task::JoinHandle,
};
use tracing::{debug, error};

type States = Arc<Mutex<HashMap<String, RunState>>>;

/// Hands campaign runs to a background worker that executes up to
/// `concurrency` of them at once.
#[derive(Clone)]
pub struct JobQueue {
    tx: mpsc::Sender<Job>,
    states: States,
}

struct Job {
    run: CampaignRun,
}

/// In-process view of a run. Not persisted; absent after a restart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum RunState {
    Queued,
    Running,
    Finished { delivered: u32, failed: u32 },
    /// The run task panicked; whatever it stored before that stays.
    Aborted,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum QueueError {
    #[error("campaign queue is full")]
    Full,
    #[error("campaign worker is not accepting jobs")]
    Closed,
}

/// A queue slot held before the campaign record is written. Sending on it
/// never waits and never fails; dropping it gives the slot back.
pub struct QueueSlot {
    permit: mpsc::OwnedPermit<Job>,
    states: States,
}

impl QueueSlot {
    pub async fn send(self, run: CampaignRun) {
        self.states
            .lock()
            .await
            .insert(run.product_id().to_string(), RunState::Queued);
        self.permit.send(Job { run });
    }
}

impl JobQueue {
    pub fn spawn(
        runner: CampaignRunner,
        capacity: usize,
        concurrency: usize,
    ) -> (Self, JoinHandle<()>) {
        let (tx, mut rx) = mpsc::channel::<Job>(capacity.max(1));
        let states: States = Arc::new(Mutex::new(HashMap::new()));
        let states_bg = states.clone();
        let limiter = Arc::new(Semaphore::new(concurrency.max(1)));

        let handle = tokio::spawn(async move {
            while let Some(job) = rx.recv().await {
                let Ok(permit) = limiter.clone().acquire_owned().await else {
                    error!(target = "campaign.run", "worker limiter closed");
                    break;
                };
                let runner = runner.clone();
                let states = states_bg.clone();
                tokio::spawn(async move {
                    let product_id = job.run.product_id().to_string();
                    states
                        .lock()
                        .await
                        .insert(product_id.clone(), RunState::Running);

                    let outcome = tokio::spawn(async move { runner.execute(job.run).await }).await;
                    let state = match outcome {
                        Ok(report) => {
                            debug!(
                                target = "campaign.run",
                                product_id = %product_id,
                                artifacts = report.artifacts_stored(),
                                "run recorded"
                            );
                            RunState::Finished {
                                delivered: report.delivered,
                                failed: report.failed,
                            }
                        }
                        Err(err) => {
                            error!(
                                target = "campaign.run",
                                product_id = %product_id,
                                error = %err,
                                "campaign run aborted"
                            );
                            RunState::Aborted
                        }
                    };
                    states.lock().await.insert(product_id, state);
                    drop(permit);
                });
            }
        });

        (Self { tx, states }, handle)
    }

    /// Claims a queue slot without waiting. `Full` once `capacity` runs are
    /// already waiting for the worker.
    pub fn reserve(&self) -> Result<QueueSlot, QueueError> {
        match self.tx.clone().try_reserve_owned() {
            Ok(permit) => Ok(QueueSlot {
                permit,
                states: self.states.clone(),
            }),
            Err(mpsc::error::TrySendError::Full(_)) => Err(QueueError::Full),
            Err(mpsc::error::TrySendError::Closed(_)) => Err(QueueError::Closed),
        }
    }

    pub async fn state(&self, product_id: &str) -> Option<RunState> {
        self.states.lock().await.get(product_id).cloned()
    }
}
