//! Drain coordination: close the result queue once every worker has exited.

use std::sync::Arc;
use std::thread;

use crossbeam_utils::sync::WaitGroup;
use tracing::info;

use crate::error::SimError;
use crate::executor::Executor;

/// Counts workers up at registration and down when their token drops.
pub struct CompletionBarrier {
    group: WaitGroup,
    registered: usize,
}

/// Held by one worker for its whole lifetime. Dropping it (normal return or
/// unwinding) counts the worker down.
#[must_use = "dropping the token immediately marks the worker finished"]
pub struct WorkerToken {
    _group: WaitGroup,
}

impl CompletionBarrier {
    pub fn new() -> Self {
        Self {
            group: WaitGroup::new(),
            registered: 0,
        }
    }

    /// Count one more worker; must happen before the worker starts.
    pub fn register(&mut self) -> WorkerToken {
        self.registered += 1;
        WorkerToken {
            _group: self.group.clone(),
        }
    }

    pub fn registered(&self) -> usize {
        self.registered
    }

    /// Block until every issued token has been dropped.
    pub fn wait(self) {
        self.group.wait();
    }
}

/// Spawn the thread that waits on `barrier` and then closes the result queue.
///
/// This thread is the only place the result queue is closed, and it can only
/// get there after the last worker token, and so the last publish, is gone.
pub fn spawn_drain_coordinator(
    barrier: CompletionBarrier,
    executor: Arc<Executor>,
) -> Result<thread::JoinHandle<()>, SimError> {
    let name = "drain-coordinator".to_string();
    thread::Builder::new()
        .name(name.clone())
        .spawn(move || {
            let workers = barrier.registered();
            barrier.wait();
            debug_assert!(!executor.results().is_closed(), "result queue closed early");
            executor.results().close();
            info!(workers, "all workers exited; result queue closed");
        })
        .map_err(|source| SimError::Spawn { name, source })
}
