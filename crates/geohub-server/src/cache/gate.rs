//! One-shot initialization gate for the connector cache.

use tokio::sync::{Mutex, MutexGuard, watch};

/// Closed until a single successful initialization opens it.
///
/// [`InitGate::begin`] serializes initializers. Dropping the returned permit
/// without calling [`InitPermit::open`] leaves the gate closed so a later
/// attempt can retry.
#[derive(Debug)]
pub struct InitGate {
    ready: watch::Sender<bool>,
    initializing: Mutex<()>,
}

impl Default for InitGate {
    fn default() -> Self {
        Self::new()
    }
}

impl InitGate {
    pub fn new() -> Self {
        let (ready, _) = watch::channel(false);
        Self {
            ready,
            initializing: Mutex::new(()),
        }
    }

    pub fn is_open(&self) -> bool {
        *self.ready.borrow()
    }

    /// Claims the right to initialize, or `None` if the gate is already open.
    pub async fn begin(&self) -> Option<InitPermit<'_>> {
        let guard = self.initializing.lock().await;
        if self.is_open() {
            return None;
        }
        Some(InitPermit {
            gate: self,
            _guard: guard,
        })
    }

    /// Resolves once the gate is open.
    pub async fn wait(&self) {
        let mut rx = self.ready.subscribe();
        // The sender lives as long as `self`, so this cannot observe a closed channel.
        let _ = rx.wait_for(|open| *open).await;
    }
}

/// Exclusive right to open an [`InitGate`].
#[derive(Debug)]
pub struct InitPermit<'a> {
    gate: &'a InitGate,
    _guard: MutexGuard<'a, ()>,
}

impl InitPermit<'_> {
    pub fn open(self) {
        self.gate.ready.send_replace(true);
    }
}
