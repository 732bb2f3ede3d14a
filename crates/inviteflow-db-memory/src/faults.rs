//! Fault injection for exercising retry and isolation paths.

use inviteflow_storage::StorageError;
use papaya::HashMap as PapayaHashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

/// What happens when a faulted object is written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// Every write is rejected as invalid data.
    Permanent,
    /// The next `n` writes fail with a connection error, then writes succeed.
    Transient(u32),
    /// Every write sleeps this long before it is applied.
    Stall(Duration),
}

#[derive(Debug)]
struct FaultState {
    fault: Fault,
    remaining: AtomicU32,
}

/// Faults keyed by the id of the object being written.
#[derive(Debug, Default)]
pub struct FaultPlan {
    faults: PapayaHashMap<String, FaultState>,
}

pub(crate) enum Trigger {
    Fail(StorageError),
    Stall(Duration),
}

impl FaultPlan {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arms `fault` for writes targeting `id`, replacing any earlier one.
    pub fn arm(&self, id: impl Into<String>, fault: Fault) {
        let remaining = match fault {
            Fault::Transient(n) => n,
            _ => 0,
        };
        self.faults.pin().insert(
            id.into(),
            FaultState {
                fault,
                remaining: AtomicU32::new(remaining),
            },
        );
    }

    pub fn disarm(&self, id: &str) {
        self.faults.pin().remove(id);
    }

    pub fn clear(&self) {
        self.faults.pin().clear();
    }

    /// Consumes one shot of the fault armed for `id`, if any.
    pub(crate) fn trigger(&self, operation: &str, id: &str) -> Option<Trigger> {
        let guard = self.faults.pin();
        let state = guard.get(id)?;
        match state.fault {
            Fault::Permanent => Some(Trigger::Fail(StorageError::invalid_data(format!(
                "{operation} rejected for {id}"
            )))),
            Fault::Transient(_) => {
                let consumed = state
                    .remaining
                    .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
                    .is_ok();
                consumed.then(|| {
                    Trigger::Fail(StorageError::connection_error(format!(
                        "{operation} dropped for {id}"
                    )))
                })
            }
            Fault::Stall(delay) => Some(Trigger::Stall(delay)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn failure(plan: &FaultPlan, id: &str) -> Option<StorageError> {
        match plan.trigger("write", id)? {
            Trigger::Fail(err) => Some(err),
            Trigger::Stall(_) => None,
        }
    }

    #[test]
    fn test_transient_fault_runs_out() {
        let plan = FaultPlan::new();
        plan.arm("c1", Fault::Transient(2));
        assert!(failure(&plan, "c1").is_some_and(|e| e.is_transient()));
        assert!(failure(&plan, "c1").is_some());
        assert!(failure(&plan, "c1").is_none());
    }

    #[test]
    fn test_permanent_fault_persists_until_disarmed() {
        let plan = FaultPlan::new();
        plan.arm("c3", Fault::Permanent);
        for _ in 0..5 {
            assert!(failure(&plan, "c3").is_some_and(|e| !e.is_transient()));
        }
        plan.disarm("c3");
        assert!(failure(&plan, "c3").is_none());
        assert!(failure(&plan, "other").is_none());
    }
}
