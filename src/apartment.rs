use crate::backend::{ComponentRuntime, ContextToken, HResult};
use crate::model::ThreadingModel;

/// Holds the probing thread inside a COM apartment for as long as it lives.
///
/// `SingleThreaded` enters an STA; every other model enters the MTA. The
/// apartment is left exactly once on drop, and only if it was entered.
/// Not `Clone`; the guard may only be moved.
pub struct ApartmentGuard<'r, R: ComponentRuntime + ?Sized> {
    runtime: &'r R,
    model: ThreadingModel,
    state: Result<ContextToken, HResult>,
}

impl<'r, R: ComponentRuntime + ?Sized> ApartmentGuard<'r, R> {
    pub fn enter(runtime: &'r R, model: ThreadingModel) -> Self {
        let state = runtime.enter_context(model);
        match &state {
            Ok(_) => tracing::debug!(%model, "entered apartment"),
            Err(code) => tracing::debug!(%model, %code, "failed to enter apartment"),
        }
        Self {
            runtime,
            model,
            state,
        }
    }

    pub fn is_entered(&self) -> bool {
        self.state.is_ok()
    }

    /// Raw failure code from the runtime, if entering failed.
    pub fn failure(&self) -> Option<HResult> {
        self.state.as_ref().err().copied()
    }
}

impl<R: ComponentRuntime + ?Sized> Drop for ApartmentGuard<'_, R> {
    fn drop(&mut self) {
        let state = std::mem::replace(&mut self.state, Err(HResult::E_FAIL));
        if let Ok(token) = state {
            self.runtime.leave_context(token);
            tracing::debug!(model = %self.model, "left apartment");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixture::FixtureRuntime;

    #[test]
    fn leaves_exactly_once_after_successful_entry() {
        let runtime = FixtureRuntime::default();
        {
            let guard = ApartmentGuard::enter(&runtime, ThreadingModel::SingleThreaded);
            assert!(guard.is_entered());
            assert_eq!(guard.failure(), None);
            assert_eq!(runtime.open_contexts(), 1);
        }
        assert_eq!(runtime.open_contexts(), 0);
        assert_eq!(runtime.context_log(), vec![ThreadingModel::SingleThreaded]);
    }

    #[test]
    fn never_leaves_when_entry_failed() {
        let runtime = FixtureRuntime::default().with_context_failure(HResult::RPC_E_CHANGED_MODE);
        {
            let guard = ApartmentGuard::enter(&runtime, ThreadingModel::MultiThreaded);
            assert!(!guard.is_entered());
            assert_eq!(guard.failure(), Some(HResult::RPC_E_CHANGED_MODE));
        }
        assert_eq!(runtime.leave_count(), 0);
    }

    #[test]
    fn moving_the_guard_does_not_release_early() {
        let runtime = FixtureRuntime::default();
        let guard = ApartmentGuard::enter(&runtime, ThreadingModel::Both);
        let moved = guard;
        assert_eq!(runtime.open_contexts(), 1);
        drop(moved);
        assert_eq!(runtime.open_contexts(), 0);
        assert_eq!(runtime.leave_count(), 1);
    }
}
