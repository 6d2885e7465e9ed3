/*
 * @file worker.rs
 * @brief Engine worker task and bounded blocking pool
 * @author Kevin Thomas
 * @date 2025
 *
 * MIT License
 *
 * Copyright (c) 2025 Kevin Thomas
 *
 * Permission is hereby granted, free of charge, to any person obtaining a copy
 * of this software and associated documentation files (the "Software"), to deal
 * in the Software without restriction, including without limitation the rights
 * to use, copy, modify, merge, publish, distribute, sublicense, and/or sell
 * copies of the Software, and to permit persons to whom the Software is
 * furnished to do so, subject to the following conditions:
 *
 * The above copyright notice and this permission notice shall be included in all
 * copies or substantial portions of the Software.
 *
 * THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF ANY KIND, EXPRESS OR
 * IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY,
 * FITNESS FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT SHALL THE
 * AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER
 * LIABILITY, WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING FROM,
 * OUT OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER DEALINGS IN THE
 * SOFTWARE.
 */

//! Engine worker task and bounded blocking pool.
//!
//! The [`Engine`] lives on a single task. Front ends talk to it through a
//! cloneable [`EngineHandle`]: every request is a job on a bounded channel
//! with a oneshot reply, so `process` and `clear_history` are serialized in
//! submission order. Dropping a reply future abandons the result; the job
//! still runs to completion.

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot, Semaphore};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::engine::Engine;
use crate::error::EngineStopped;
use crate::history::HistoryEntry;

/// Jobs that may wait in the queue before submitters back off.
const QUEUE_DEPTH: usize = 8;

enum Job {
    Process {
        text: String,
        reply: oneshot::Sender<String>,
    },
    Clear {
        reply: oneshot::Sender<()>,
    },
    Greeting {
        reply: oneshot::Sender<String>,
    },
    History {
        reply: oneshot::Sender<Vec<HistoryEntry>>,
    },
}

/// Cloneable submitter for the engine task.
#[derive(Clone)]
pub struct EngineHandle {
    jobs: mpsc::Sender<Job>,
}

impl EngineHandle {
    /// Moves `engine` onto its own task.
    ///
    /// # Returns
    /// The handle plus the task, which ends once every handle is dropped.
    pub fn spawn(engine: Engine) -> (Self, JoinHandle<()>) {
        let (jobs, queue) = mpsc::channel(QUEUE_DEPTH);
        let task = tokio::spawn(run_engine(engine, queue));
        (Self { jobs }, task)
    }

    /// Submits an utterance and waits for its response.
    ///
    /// # Errors
    /// [`EngineStopped`] if the worker is gone.
    pub async fn process(&self, text: impl Into<String>) -> Result<String, EngineStopped> {
        let text = text.into();
        self.request(|reply| Job::Process { text, reply }).await
    }

    /// Clears history and chat context once all earlier jobs are done.
    pub async fn clear_history(&self) -> Result<(), EngineStopped> {
        self.request(|reply| Job::Clear { reply }).await
    }

    pub async fn greeting(&self) -> Result<String, EngineStopped> {
        self.request(|reply| Job::Greeting { reply }).await
    }

    /// Snapshot of the history at the time the job runs.
    pub async fn history(&self) -> Result<Vec<HistoryEntry>, EngineStopped> {
        self.request(|reply| Job::History { reply }).await
    }

    async fn request<T>(
        &self,
        job: impl FnOnce(oneshot::Sender<T>) -> Job,
    ) -> Result<T, EngineStopped> {
        let (reply, response) = oneshot::channel();
        self.jobs.send(job(reply)).await.map_err(|_| EngineStopped)?;
        response.await.map_err(|_| EngineStopped)
    }
}

async fn run_engine(mut engine: Engine, mut queue: mpsc::Receiver<Job>) {
    info!("engine worker started");
    while let Some(job) = queue.recv().await {
        match job {
            Job::Process { text, reply } => {
                let response = engine.process(&text).await;
                if reply.send(response).is_err() {
                    debug!("caller dropped a process reply");
                }
            }
            Job::Clear { reply } => {
                engine.clear_history();
                let _ = reply.send(());
            }
            Job::Greeting { reply } => {
                let _ = reply.send(engine.greeting());
            }
            Job::History { reply } => {
                let _ = reply.send(engine.history().entries().to_vec());
            }
        }
    }
    info!("engine worker stopped");
}

/// Bounded pool for blocking work such as audio capture and speech.
///
/// At most `size` jobs run at once; the rest wait for a permit. Aborting
/// the returned handle before a permit is granted cancels the job.
#[derive(Clone)]
pub struct BlockingPool {
    permits: Arc<Semaphore>,
}

impl BlockingPool {
    pub fn new(size: usize) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(size.max(1))),
        }
    }

    /// Runs `job` on the blocking thread pool once a permit is free.
    ///
    /// # Returns
    /// A handle resolving to `Some(output)`, or `None` if the job panicked
    /// or the pool was closed.
    pub fn submit<F, T>(&self, job: F) -> JoinHandle<Option<T>>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let permits = Arc::clone(&self.permits);
        tokio::spawn(async move {
            let _permit = permits.acquire_owned().await.ok()?;
            tokio::task::spawn_blocking(job).await.ok()
        })
    }

    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }
}
