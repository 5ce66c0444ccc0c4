//! Concurrency quotas: per-role semaphores under a global cap.

use crate::error::{SchedulerError, SchedulerResult};
use monoco_core::Role;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// A held slot: one role permit plus one global permit.
///
/// Dropping the permit releases both slots; the next waiter proceeds in FIFO
/// order (tokio semaphores queue fairly).
#[derive(Debug)]
pub struct QuotaPermit {
    _role: OwnedSemaphorePermit,
    _global: OwnedSemaphorePermit,
}

/// Per-role semaphores plus a global cap.
#[derive(Debug)]
pub struct RoleQuotas {
    global: Arc<Semaphore>,
    global_cap: usize,
    per_role: HashMap<Role, (Arc<Semaphore>, usize)>,
}

impl RoleQuotas {
    /// Build quotas from the configured caps.
    #[must_use]
    pub fn new(global_cap: usize, role_caps: &HashMap<Role, usize>) -> Self {
        let per_role = Role::ALL
            .iter()
            .map(|role| {
                let cap = role_caps.get(role).copied().unwrap_or(global_cap);
                (*role, (Arc::new(Semaphore::new(cap)), cap))
            })
            .collect();
        Self {
            global: Arc::new(Semaphore::new(global_cap)),
            global_cap,
            per_role,
        }
    }

    /// Acquire a slot, waiting until one frees up.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::QuotaExhausted`] immediately when the role's
    /// configured cap is zero — a zero quota never blocks.
    pub async fn acquire(&self, role: Role) -> SchedulerResult<QuotaPermit> {
        let (semaphore, cap) = match self.per_role.get(&role) {
            Some((semaphore, cap)) => (Arc::clone(semaphore), *cap),
            None => return Err(SchedulerError::QuotaExhausted { role }),
        };
        if cap == 0 || self.global_cap == 0 {
            return Err(SchedulerError::QuotaExhausted { role });
        }

        let role_permit = semaphore
            .acquire_owned()
            .await
            .map_err(|_| SchedulerError::ShuttingDown)?;
        let global_permit = Arc::clone(&self.global)
            .acquire_owned()
            .await
            .map_err(|_| SchedulerError::ShuttingDown)?;

        Ok(QuotaPermit {
            _role: role_permit,
            _global: global_permit,
        })
    }

    /// Acquire a slot without waiting.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::QuotaExhausted`] when either the role or the
    /// global quota has no free slot.
    pub fn try_acquire(&self, role: Role) -> SchedulerResult<QuotaPermit> {
        let (semaphore, cap) = match self.per_role.get(&role) {
            Some((semaphore, cap)) => (Arc::clone(semaphore), *cap),
            None => return Err(SchedulerError::QuotaExhausted { role }),
        };
        if cap == 0 || self.global_cap == 0 {
            return Err(SchedulerError::QuotaExhausted { role });
        }

        let role_permit = semaphore
            .try_acquire_owned()
            .map_err(|_| SchedulerError::QuotaExhausted { role })?;
        let global_permit = Arc::clone(&self.global)
            .try_acquire_owned()
            .map_err(|_| SchedulerError::QuotaExhausted { role })?;

        Ok(QuotaPermit {
            _role: role_permit,
            _global: global_permit,
        })
    }

    /// Free slots for one role (bounded by the global pool).
    #[must_use]
    pub fn available(&self, role: Role) -> usize {
        self.per_role
            .get(&role)
            .map_or(0, |(semaphore, _)| semaphore.available_permits())
            .min(self.global.available_permits())
    }

    /// Free slots in the global pool.
    #[must_use]
    pub fn global_available(&self) -> usize {
        self.global.available_permits()
    }
}
