//! Process-exit shutdown hooks
//!
//! The composition root owns a [`ShutdownRegistry`] and runs it when the host
//! is about to exit (signal handler, or a [`ShutdownGuard`] going out of
//! scope). Supervisors register one hook per live driver and remove it again
//! on a normal stop.

use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

type Hook = Box<dyn FnOnce() + Send + 'static>;

/// Identifies a registered hook
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct HookId(u64);

#[derive(Default)]
struct RegistryState {
    next_id: u64,
    hooks: BTreeMap<u64, Hook>,
}

/// Shared set of cleanup callbacks run once at host exit
#[derive(Clone, Default)]
pub struct ShutdownRegistry {
    state: Arc<Mutex<RegistryState>>,
}

impl ShutdownRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F>(&self, hook: F) -> HookId
    where
        F: FnOnce() + Send + 'static,
    {
        let mut state = self.state.lock();
        let id = state.next_id;
        state.next_id += 1;
        state.hooks.insert(id, Box::new(hook));
        HookId(id)
    }

    /// Remove a hook without running it. Returns whether it was present.
    pub fn deregister(&self, id: HookId) -> bool {
        self.state.lock().hooks.remove(&id.0).is_some()
    }

    /// Run and remove every registered hook, in registration order
    pub fn run_all(&self) -> usize {
        // Hooks may call back into the registry
        let hooks = std::mem::take(&mut self.state.lock().hooks);
        let count = hooks.len();
        if count > 0 {
            debug!(count, "Running shutdown hooks");
        }
        for (_, hook) in hooks {
            hook();
        }
        count
    }

    pub fn len(&self) -> usize {
        self.state.lock().hooks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().hooks.is_empty()
    }

    /// Guard that runs all hooks when dropped
    pub fn guard(&self) -> ShutdownGuard {
        ShutdownGuard {
            registry: self.clone(),
        }
    }
}

impl std::fmt::Debug for ShutdownRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShutdownRegistry")
            .field("hooks", &self.len())
            .finish()
    }
}

/// Runs the registry on drop, covering early returns and unwinding
#[must_use = "hooks run when the guard is dropped"]
pub struct ShutdownGuard {
    registry: ShutdownRegistry,
}

impl Drop for ShutdownGuard {
    fn drop(&mut self) {
        self.registry.run_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_run_all_runs_each_hook_once() {
        let registry = ShutdownRegistry::new();
        let calls = Arc::new(AtomicUsize::new(0));

        for _ in 0..3 {
            let calls = calls.clone();
            registry.register(move || {
                calls.fetch_add(1, Ordering::SeqCst);
            });
        }

        assert_eq!(registry.len(), 3);
        assert_eq!(registry.run_all(), 3);
        assert_eq!(registry.run_all(), 0);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_deregistered_hook_does_not_run() {
        let registry = ShutdownRegistry::new();
        let calls = Arc::new(AtomicUsize::new(0));

        let counter = calls.clone();
        let id = registry.register(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        assert!(registry.deregister(id));
        assert!(!registry.deregister(id));
        registry.run_all();
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_hook_may_reenter_registry() {
        let registry = ShutdownRegistry::new();
        let inner = registry.clone();
        let id = Arc::new(Mutex::new(None));

        let own_id = id.clone();
        let registered = registry.register(move || {
            if let Some(own) = *own_id.lock() {
                inner.deregister(own);
            }
        });
        *id.lock() = Some(registered);

        assert_eq!(registry.run_all(), 1);
    }

    #[test]
    fn test_guard_runs_on_drop() {
        let registry = ShutdownRegistry::new();
        let calls = Arc::new(AtomicUsize::new(0));

        let counter = calls.clone();
        registry.register(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        {
            let _guard = registry.guard();
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
