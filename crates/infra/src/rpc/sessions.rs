//! Pool adapter turning an [`RpcTransport`] into a session factory.

use std::sync::Arc;

use async_trait::async_trait;
use erpshield_common::SessionFactory;
use erpshield_core::RpcTransport;
use erpshield_domain::ShieldError;

/// Opens, probes and closes transport sessions on behalf of the pool.
pub struct TransportSessions<T: RpcTransport> {
    transport: Arc<T>,
}

impl<T: RpcTransport> TransportSessions<T> {
    pub fn new(transport: Arc<T>) -> Self {
        Self { transport }
    }

    pub fn transport(&self) -> &Arc<T> {
        &self.transport
    }
}

#[async_trait]
impl<T: RpcTransport> SessionFactory for TransportSessions<T> {
    type Session = T::Session;
    type Error = ShieldError;

    async fn create(&self) -> Result<T::Session, ShieldError> {
        self.transport.open_session().await
    }

    async fn validate(&self, session: &T::Session) -> bool {
        self.transport.ping(session).await
    }

    fn destroy(&self, session: T::Session) {
        self.transport.close_session(session);
    }
}
