//! Borrowed session handle.

use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use std::time::Instant;

use super::core::{PoolInner, Resource};
use super::SessionFactory;
use crate::resilience::{Clock, SystemClock};

/// Exclusive use of one pooled session.
///
/// Dropping the lease returns the session without validation. Call
/// [`release`](Self::release) to go through `validate_on_release`.
pub struct Lease<F: SessionFactory, C: Clock = SystemClock> {
    pool: Arc<PoolInner<F, C>>,
    resource: Option<Resource<F::Session>>,
}

impl<F: SessionFactory, C: Clock> Lease<F, C> {
    pub(crate) fn new(pool: Arc<PoolInner<F, C>>, resource: Resource<F::Session>) -> Self {
        Self { pool, resource: Some(resource) }
    }

    fn resource(&self) -> &Resource<F::Session> {
        match &self.resource {
            Some(resource) => resource,
            None => unreachable!("lease resource is only taken when the lease ends"),
        }
    }

    /// Pool-assigned identifier of the underlying session.
    pub fn id(&self) -> u64 {
        self.resource().id
    }

    pub fn created_at(&self) -> Instant {
        self.resource().created_at
    }

    /// Hand the session back to the pool.
    pub async fn release(mut self) {
        if let Some(resource) = self.resource.take() {
            self.pool.release(resource).await;
        }
    }
}

impl<F: SessionFactory, C: Clock> Deref for Lease<F, C> {
    type Target = F::Session;

    fn deref(&self) -> &Self::Target {
        &self.resource().session
    }
}

impl<F: SessionFactory, C: Clock> DerefMut for Lease<F, C> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        match &mut self.resource {
            Some(resource) => &mut resource.session,
            None => unreachable!("lease resource is only taken when the lease ends"),
        }
    }
}

impl<F: SessionFactory, C: Clock> Drop for Lease<F, C> {
    fn drop(&mut self) {
        if let Some(resource) = self.resource.take() {
            self.pool.checkin(resource);
        }
    }
}

impl<F: SessionFactory, C: Clock> fmt::Debug for Lease<F, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Lease")
            .field("id", &self.resource.as_ref().map(|r| r.id))
            .field("state", &self.resource.as_ref().map(|r| r.state))
            .finish()
    }
}
