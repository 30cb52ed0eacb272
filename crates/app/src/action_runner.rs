//! Action runner: executes accepted actions off the calling thread.
//!
//! Every started action gets its own blocking task, so a long-running body
//! never stalls the caller or other actions. A body that panics still
//! completes its action; the panic is logged and goes no further.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use tokio::runtime::Handle;
use tokio::task::JoinHandle;

use webthing_domain::action::Action;

/// Spawns [`Action::start`] on the blocking pool of a tokio runtime.
#[derive(Debug, Clone)]
pub struct ActionRunner {
    handle: Handle,
}

impl ActionRunner {
    #[must_use]
    pub fn new(handle: Handle) -> Self {
        Self { handle }
    }

    /// Runner bound to the runtime of the calling task.
    ///
    /// # Panics
    ///
    /// Panics when called outside a tokio runtime.
    #[must_use]
    pub fn current() -> Self {
        Self::new(Handle::current())
    }

    /// Start `action` on a dedicated blocking task.
    pub fn spawn(&self, action: Arc<Action>) -> JoinHandle<()> {
        self.handle.spawn_blocking(move || run(&action))
    }
}

fn run(action: &Action) {
    match catch_unwind(AssertUnwindSafe(|| action.start())) {
        Ok(Ok(())) => {}
        Ok(Err(err)) => {
            tracing::warn!(action = action.name(), id = action.id(), %err, "action not started");
        }
        Err(_) => {
            tracing::error!(
                action = action.name(),
                id = action.id(),
                status = %action.status(),
                "action body panicked"
            );
        }
    }
}
