//! Registry of every thread's transaction handle.
//!
//! The registry maps thread ids to handles. It is the lookup used by every
//! environment call and the set closed on environment shutdown. Membership
//! is exact: handles leave it when detached, when their thread exits, or when
//! the registry itself is closed.

use crate::error::{CoreError, CoreResult};
use crate::txn::ReusableTxn;
use parking_lot::Mutex;
use std::cell::RefCell;
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::thread::{self, ThreadId};
use tracing::debug;

#[derive(Debug, Default)]
struct Slots {
    handles: HashMap<ThreadId, Arc<ReusableTxn>>,
    closed: bool,
}

#[derive(Debug, Default)]
struct RegistryInner {
    slots: Mutex<Slots>,
}

impl RegistryInner {
    /// Drops the exiting thread's handle, closing it on that thread.
    fn thread_exited(&self, thread: ThreadId) {
        let handle = self.slots.lock().handles.remove(&thread);
        if let Some(handle) = handle {
            debug!(handle = handle.id(), thread = ?thread, "thread exited");
            handle.close();
        }
    }
}

/// Per-environment handle registry.
#[derive(Debug, Default)]
pub(crate) struct TxnRegistry {
    inner: Arc<RegistryInner>,
}

impl TxnRegistry {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Returns the calling thread's handle, if it has one.
    pub(crate) fn current(&self) -> CoreResult<Option<Arc<ReusableTxn>>> {
        let slots = self.inner.slots.lock();
        if slots.closed {
            return Err(CoreError::EnvironmentClosed);
        }
        Ok(slots.handles.get(&thread::current().id()).cloned())
    }

    /// Returns the calling thread's handle, creating it on first use.
    pub(crate) fn get_or_create(
        &self,
        create: impl FnOnce(ThreadId) -> ReusableTxn,
    ) -> CoreResult<Arc<ReusableTxn>> {
        let thread = thread::current().id();
        let mut slots = self.inner.slots.lock();
        if slots.closed {
            return Err(CoreError::EnvironmentClosed);
        }
        if let Some(handle) = slots.handles.get(&thread) {
            return Ok(Arc::clone(handle));
        }
        let handle = Arc::new(create(thread));
        slots.handles.insert(thread, Arc::clone(&handle));
        drop(slots);

        exit_guard::watch(&self.inner, thread);
        Ok(handle)
    }

    /// Removes the calling thread's handle so the registry no longer owns it.
    pub(crate) fn remove_current(&self) -> Option<Arc<ReusableTxn>> {
        self.inner
            .slots
            .lock()
            .handles
            .remove(&thread::current().id())
    }

    /// Marks the registry closed and hands back every remaining handle.
    ///
    /// Later calls return an empty list.
    pub(crate) fn close(&self) -> Vec<Arc<ReusableTxn>> {
        let mut slots = self.inner.slots.lock();
        slots.closed = true;
        slots.handles.drain().map(|(_, handle)| handle).collect()
    }

    /// Number of registered handles.
    pub(crate) fn len(&self) -> usize {
        self.inner.slots.lock().handles.len()
    }
}

mod exit_guard {
    use super::*;

    struct ExitGuard {
        thread: ThreadId,
        registries: RefCell<Vec<Weak<RegistryInner>>>,
    }

    impl Drop for ExitGuard {
        fn drop(&mut self) {
            for registry in self.registries.get_mut().drain(..) {
                if let Some(registry) = registry.upgrade() {
                    registry.thread_exited(self.thread);
                }
            }
        }
    }

    thread_local! {
        static GUARD: ExitGuard = ExitGuard {
            thread: thread::current().id(),
            registries: RefCell::new(Vec::new()),
        };
    }

    /// Arranges for the calling thread's slot in `registry` to be cleared
    /// when the thread exits.
    pub(super) fn watch(registry: &Arc<RegistryInner>, thread: ThreadId) {
        // Fails only while the thread is already tearing down its locals.
        let watched = GUARD.try_with(|guard| {
            let mut registries = guard.registries.borrow_mut();
            registries.retain(|weak| weak.strong_count() > 0);
            registries.push(Arc::downgrade(registry));
        });
        if let Err(e) = watched {
            debug!(
                thread = ?thread,
                error = %e,
                "no exit hook; handle stays registered until the environment closes"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Environment;

    #[test]
    fn handle_is_created_once_per_thread() {
        let env = Environment::open_temporary().unwrap();
        assert_eq!(env.active_handles(), 0);

        let first = env.current_handle().unwrap();
        let second = env.current_handle().unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(env.active_handles(), 1);
    }

    #[test]
    fn threads_get_independent_handles() {
        let env = Environment::open_temporary().unwrap();
        let here = env.current_handle().unwrap();
        let there = thread::scope(|s| {
            s.spawn(|| env.current_handle().unwrap().id())
                .join()
                .unwrap()
        });
        assert_ne!(here.id(), there);
    }

    #[test]
    fn thread_exit_removes_handle() {
        let env = Environment::open_temporary().unwrap();
        env.current_handle().unwrap();

        let state = thread::scope(|s| {
            s.spawn(|| {
                env.begin_txn(true).unwrap();
                env.current_handle().unwrap()
            })
            .join()
            .unwrap()
        });

        assert_eq!(env.active_handles(), 1);
        assert_eq!(state.state(), crate::TxnState::Closed);
    }

    #[test]
    fn handle_created_during_thread_teardown_is_closed_with_env() {
        struct LateUser(Option<Arc<Environment>>);

        impl Drop for LateUser {
            fn drop(&mut self) {
                if let Some(env) = self.0.take() {
                    // Thread identity itself may already be torn down.
                    let _ = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                        env.current_handle()
                    }));
                }
            }
        }

        thread_local! {
            static LATE: RefCell<LateUser> = const { RefCell::new(LateUser(None)) };
        }

        let env = Arc::new(Environment::open_temporary().unwrap());
        let worker_env = Arc::clone(&env);
        thread::spawn(move || {
            LATE.with(|late| late.borrow_mut().0 = Some(worker_env));
        })
        .join()
        .unwrap();

        // Whether the exit hook was still available depends on teardown order.
        assert!(env.active_handles() <= 1);
        env.close();
        assert_eq!(env.active_handles(), 0);
    }

    #[test]
    fn closed_registry_rejects_lookups() {
        let registry = TxnRegistry::new();
        assert!(registry.close().is_empty());
        assert!(matches!(
            registry.current(),
            Err(CoreError::EnvironmentClosed)
        ));
        assert!(registry.remove_current().is_none());
        assert_eq!(registry.len(), 0);
    }
}
