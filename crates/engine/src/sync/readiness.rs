//! Per-generation "items loaded" signal.
//!
//! Each cache-replacing cycle may arm a new generation. A generation resolves
//! at most once; waiters bound to an older generation learn that they were
//! superseded instead of waiting forever.

use tokio::sync::watch;

/// Outcome observed by an [`ItemsLoaded`] waiter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    /// The awaited generation resolved.
    Loaded,
    /// A newer generation was armed before the awaited one resolved.
    Superseded { generation: u64 },
    /// The field was torn down.
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ReadinessState {
    generation: u64,
    resolved: Option<u64>,
}

/// Sender side, owned by the controller.
#[derive(Debug)]
pub struct ReadinessSignal {
    sender: watch::Sender<ReadinessState>,
}

impl Default for ReadinessSignal {
    fn default() -> Self {
        Self::new()
    }
}

impl ReadinessSignal {
    pub fn new() -> Self {
        let (sender, _) = watch::channel(ReadinessState {
            generation: 0,
            resolved: None,
        });
        Self { sender }
    }

    pub fn generation(&self) -> u64 {
        self.sender.borrow().generation
    }

    pub fn is_resolved(&self) -> bool {
        let state = *self.sender.borrow();
        state.resolved == Some(state.generation)
    }

    /// Arms the next generation and returns its number.
    pub fn rearm(&self) -> u64 {
        let mut generation = 0;
        self.sender.send_modify(|state| {
            state.generation += 1;
            generation = state.generation;
        });
        generation
    }

    /// Resolves the current generation. Returns false when it was already
    /// resolved.
    pub fn resolve(&self) -> bool {
        self.sender.send_if_modified(|state| {
            if state.resolved == Some(state.generation) {
                return false;
            }
            state.resolved = Some(state.generation);
            true
        })
    }

    /// Waiter bound to the current generation.
    pub fn waiter(&self) -> ItemsLoaded {
        ItemsLoaded {
            generation: self.generation(),
            receiver: self.sender.subscribe(),
        }
    }
}

/// Waits for one generation of the readiness signal.
#[derive(Debug)]
pub struct ItemsLoaded {
    generation: u64,
    receiver: watch::Receiver<ReadinessState>,
}

impl ItemsLoaded {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub async fn wait(mut self) -> Readiness {
        loop {
            let state = *self.receiver.borrow_and_update();
            if state.resolved == Some(self.generation) {
                return Readiness::Loaded;
            }
            if state.generation > self.generation {
                return Readiness::Superseded {
                    generation: state.generation,
                };
            }
            if self.receiver.changed().await.is_err() {
                return Readiness::Closed;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn resolves_once_per_generation() {
        let signal = ReadinessSignal::new();
        let waiter = signal.waiter();
        assert!(signal.resolve());
        assert!(!signal.resolve());
        assert_eq!(waiter.wait().await, Readiness::Loaded);
    }

    #[tokio::test]
    async fn rearm_supersedes_pending_waiters() {
        let signal = ReadinessSignal::new();
        let stale = signal.waiter();
        assert_eq!(signal.rearm(), 1);
        assert!(!signal.is_resolved());
        assert_eq!(stale.wait().await, Readiness::Superseded { generation: 1 });

        let current = signal.waiter();
        signal.resolve();
        assert_eq!(current.wait().await, Readiness::Loaded);
    }

    #[tokio::test]
    async fn resolved_generation_stays_loaded_after_rearm() {
        let signal = ReadinessSignal::new();
        let waiter = signal.waiter();
        signal.resolve();
        signal.rearm();
        assert_eq!(waiter.wait().await, Readiness::Loaded);
    }

    #[tokio::test]
    async fn dropping_the_signal_closes_waiters() {
        let signal = ReadinessSignal::new();
        let waiter = signal.waiter();
        drop(signal);
        assert_eq!(waiter.wait().await, Readiness::Closed);
    }
}
