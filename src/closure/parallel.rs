// src/closure/parallel.rs

//! Parallel closure builder
//!
//! A fixed pool of workers pulls packages from a shared queue. Claiming a
//! package (testing and inserting its key) happens under the result lock
//! in one step, so no two workers ever expand the same package. The caller
//! waits until the queue is empty and every worker is idle, then sends one
//! stop message per worker.
//!
//! With self-host enabled, every claimed binary also queues its source
//! package and every claimed source queues the binaries of its
//! BuildRequires, so the result matches [`SelfHostBuilder`](super::SelfHostBuilder).

use super::{expand_requirements, requirements_of, ClosureResult};
use crate::error::{Error, Result};
use crate::index::get_source_for_package;
use crate::packages::Package;
use crate::resolver::ResolutionContext;
use crossbeam_channel::{Receiver, Sender};
use parking_lot::{Condvar, Mutex};
use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use tracing::{debug, warn};

/// A package waiting to be expanded
#[derive(Debug, Clone)]
enum Work {
    Binary(Arc<Package>),
    Source(Arc<Package>),
}

enum Message {
    Work(Work),
    Stop,
}

/// Work queue with a completion barrier
///
/// `pending` counts items put but not yet marked done, so it reaches zero
/// only when the queue is empty and no worker is mid-expansion.
struct WorkQueue {
    tx: Sender<Message>,
    pending: Mutex<usize>,
    drained: Condvar,
}

impl WorkQueue {
    fn new(tx: Sender<Message>) -> Self {
        Self {
            tx,
            pending: Mutex::new(0),
            drained: Condvar::new(),
        }
    }

    fn put(&self, work: Work) {
        *self.pending.lock() += 1;
        if self.tx.send(Message::Work(work)).is_err() {
            // No receiver left; nothing will ever process it
            self.task_done();
        }
    }

    fn task_done(&self) {
        let mut pending = self.pending.lock();
        *pending -= 1;
        if *pending == 0 {
            self.drained.notify_all();
        }
    }

    fn join(&self) {
        let mut pending = self.pending.lock();
        while *pending > 0 {
            self.drained.wait(&mut pending);
        }
    }

    fn stop(&self, workers: usize) {
        for _ in 0..workers {
            let _ = self.tx.send(Message::Stop);
        }
    }
}

pub struct ParallelBuilder<'a> {
    ctx: &'a ResolutionContext,
    workers: usize,
    self_host: bool,
}

impl<'a> ParallelBuilder<'a> {
    /// Builder with one worker per available CPU
    pub fn new(ctx: &'a ResolutionContext) -> Self {
        Self {
            ctx,
            workers: num_cpus::get(),
            self_host: false,
        }
    }

    pub fn workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    /// Also alternate into source packages and their BuildRequires
    pub fn self_host(mut self, self_host: bool) -> Self {
        self.self_host = self_host;
        self
    }

    /// Closure of `roots` in a fresh result, ambiguities reconciled
    pub fn build(&self, roots: &[Arc<Package>]) -> Result<ClosureResult> {
        let mut result = ClosureResult::new();
        self.expand(roots, &mut result)?;
        result.reconcile();
        Ok(result)
    }

    /// Add the closure of `roots` to `result`
    ///
    /// Ambiguities are not reconciled. On error `result` is left as it was.
    pub fn expand(&self, roots: &[Arc<Package>], result: &mut ClosureResult) -> Result<()> {
        self.ctx.check_index()?;

        let state = Mutex::new(result.clone());
        let failure: Mutex<Option<Error>> = Mutex::new(None);
        let (tx, rx) = crossbeam_channel::unbounded();
        let queue = WorkQueue::new(tx);

        debug!("Starting {} closure workers", self.workers);

        std::thread::scope(|scope| {
            for _ in 0..self.workers {
                let rx = rx.clone();
                let (state, failure, queue) = (&state, &failure, &queue);
                scope.spawn(move || self.worker(rx, state, failure, queue));
            }

            for root in roots {
                queue.put(Work::Binary(Arc::clone(root)));
            }

            queue.join();
            queue.stop(self.workers);
        });

        match failure.into_inner() {
            Some(e) => Err(e),
            None => {
                *result = state.into_inner();
                Ok(())
            }
        }
    }

    fn worker(
        &self,
        rx: Receiver<Message>,
        state: &Mutex<ClosureResult>,
        failure: &Mutex<Option<Error>>,
        queue: &WorkQueue,
    ) {
        while let Ok(message) = rx.recv() {
            let work = match message {
                Message::Work(work) => work,
                Message::Stop => break,
            };

            // After a failure the remaining items are only drained
            if failure.lock().is_none() {
                let outcome = catch_unwind(AssertUnwindSafe(|| self.process(work, state, queue)))
                    .unwrap_or_else(|panic| Err(Error::WorkerPanicked(panic_message(&*panic))));
                if let Err(e) = outcome {
                    warn!("Closure worker failed: {}", e);
                    failure.lock().get_or_insert(e);
                }
            }

            // Must run even after a panic, or join() never returns
            queue.task_done();
        }
    }

    fn process(&self, work: Work, state: &Mutex<ClosureResult>, queue: &WorkQueue) -> Result<()> {
        match work {
            Work::Binary(pkg) => {
                if !state.lock().binaries.insert(Arc::clone(&pkg)) {
                    return Ok(());
                }

                let follow_recommends = self.ctx.settings.follow_recommends;
                let expansion = expand_requirements(
                    self.ctx,
                    &pkg,
                    requirements_of(&pkg, follow_recommends),
                    &|name: &str| state.lock().binaries.contains_name(name),
                )?;

                let deps = state.lock().absorb(expansion);
                for dep in deps {
                    queue.put(Work::Binary(dep));
                }

                if self.self_host {
                    if pkg.source_name.is_none() {
                        warn!("{} has no source package, skipping its build requirements", pkg);
                    } else {
                        let source = get_source_for_package(self.ctx.index(), &pkg)?;
                        queue.put(Work::Source(source));
                    }
                }
            }
            Work::Source(source) => {
                if !state.lock().sources.insert(Arc::clone(&source)) {
                    return Ok(());
                }

                let expansion = expand_requirements(
                    self.ctx,
                    &source,
                    source.requires.iter(),
                    &|name: &str| state.lock().binaries.contains_name(name),
                )?;

                let deps = state.lock().absorb(expansion);
                for dep in deps {
                    queue.put(Work::Binary(dep));
                }
            }
        }
        Ok(())
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
