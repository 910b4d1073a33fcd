//! Per-VM mutual exclusion for callers running passes concurrently

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

/// Hands out one lock per VM reference
///
/// The reconciler assumes a single writer per VM for the length of a pass;
/// callers that reconcile several VMs at once run each pass under the VM's
/// lock.
#[derive(Default, Clone)]
pub struct VmLocks {
    locks: Arc<Mutex<HashMap<String, Arc<Mutex<()>>>>>,
}

impl VmLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn entry(&self, vm: &str) -> Arc<Mutex<()>> {
        self.locks.lock().entry(vm.to_string()).or_default().clone()
    }

    /// Run `f` once no other pass holds `vm`
    pub fn run<T>(&self, vm: &str, f: impl FnOnce() -> T) -> T {
        let lock = self.entry(vm);
        tracing::trace!(vm = %vm, "Waiting for VM lock");
        let _guard = lock.lock();
        f()
    }

    /// Run `f` only if `vm` is free right now
    pub fn try_run<T>(&self, vm: &str, f: impl FnOnce() -> T) -> Option<T> {
        let lock = self.entry(vm);
        let _guard = lock.try_lock()?;
        Some(f())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_vm_excluded() {
        let locks = VmLocks::new();
        let inner = locks.run("vm-a", || locks.try_run("vm-a", || ()));
        assert!(inner.is_none());
        assert!(locks.try_run("vm-a", || ()).is_some());
    }

    #[test]
    fn test_different_vms_independent() {
        let locks = VmLocks::new();
        let inner = locks.run("vm-a", || locks.try_run("vm-b", || 7));
        assert_eq!(inner, Some(7));
    }

    #[test]
    fn test_shared_across_clones() {
        let locks = VmLocks::new();
        let other = locks.clone();
        let inner = locks.run("vm-a", || other.try_run("vm-a", || ()));
        assert!(inner.is_none());
    }

    #[test]
    fn test_serializes_threads() {
        let locks = VmLocks::new();
        let active = Arc::new(Mutex::new(0u32));
        let max_seen = Arc::new(Mutex::new(0u32));

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let locks = locks.clone();
                let active = active.clone();
                let max_seen = max_seen.clone();
                std::thread::spawn(move || {
                    locks.run("vm-a", || {
                        let now = {
                            let mut a = active.lock();
                            *a += 1;
                            *a
                        };
                        {
                            let mut m = max_seen.lock();
                            *m = (*m).max(now);
                        }
                        std::thread::sleep(std::time::Duration::from_millis(5));
                        *active.lock() -= 1;
                    })
                })
            })
            .collect();

        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(*max_seen.lock(), 1);
    }
}
