use crate::{
    conn::{xmutexed::XMutexed, ConnectionCore},
    ConnectParams, ConnectionConfiguration, DbResult,
};
use std::sync::Arc;

#[cfg(any(feature = "sync", feature = "async"))]
use std::time::Instant;

// An encapsulation of the ConnectionCore, shared between the public
// connection handle and streaming responses.
#[derive(Clone, Debug)]
pub(crate) struct AmConnCore(Arc<XMutexed<ConnectionCore>>);

impl AmConnCore {
    #[cfg(feature = "sync")]
    pub fn try_new_sync(
        params: ConnectParams,
        config: &ConnectionConfiguration,
    ) -> DbResult<Self> {
        trace!("trying to connect to {params}");
        let start = Instant::now();
        let core = ConnectionCore::try_new_sync(params, config)?;
        debug!(
            "user \"{}\" connected to {} ({} µs, backend pid {})",
            core.params().user(),
            core.uri(),
            Instant::now().duration_since(start).as_micros(),
            core.backend_pid(),
        );
        Ok(Self(Arc::new(XMutexed::new_sync(core))))
    }

    #[cfg(feature = "async")]
    pub async fn try_new_async(
        params: ConnectParams,
        config: &ConnectionConfiguration,
    ) -> DbResult<Self> {
        trace!("trying to connect to {params}");
        let start = Instant::now();
        let core = ConnectionCore::try_new_async(params, config).await?;
        debug!(
            "user \"{}\" connected to {} ({} µs, backend pid {})",
            core.params().user(),
            core.uri(),
            Instant::now().duration_since(start).as_micros(),
            core.backend_pid(),
        );
        Ok(Self(Arc::new(XMutexed::new_async(core))))
    }

    #[cfg(feature = "sync")]
    pub fn sync_lock(&self) -> DbResult<std::sync::MutexGuard<'_, ConnectionCore>> {
        self.0.lock_sync().map_err(|_| crate::DbError::Poison)
    }

    #[cfg(feature = "async")]
    pub async fn async_lock(&self) -> tokio::sync::MutexGuard<'_, ConnectionCore> {
        self.0.lock_async().await
    }

    #[cfg(feature = "async")]
    pub fn try_lock_async(&self) -> Option<tokio::sync::MutexGuard<'_, ConnectionCore>> {
        self.0.try_lock_async()
    }
}
