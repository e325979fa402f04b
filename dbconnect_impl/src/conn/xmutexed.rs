#[derive(Debug)]
pub(crate) enum XMutexed<T> {
    #[cfg(feature = "sync")]
    Sync(std::sync::Mutex<T>),
    #[cfg(feature = "async")]
    Async(tokio::sync::Mutex<T>),
    #[cfg(not(any(feature = "sync", feature = "async")))]
    Dummy(T),
}

impl<T> XMutexed<T> {
    #[cfg(feature = "sync")]
    pub(crate) fn new_sync(inner: T) -> Self {
        Self::Sync(std::sync::Mutex::new(inner))
    }

    #[cfg(feature = "async")]
    pub(crate) fn new_async(inner: T) -> Self {
        Self::Async(tokio::sync::Mutex::new(inner))
    }

    #[cfg(feature = "sync")]
    pub(crate) fn lock_sync(
        &self,
    ) -> Result<std::sync::MutexGuard<'_, T>, std::sync::PoisonError<std::sync::MutexGuard<'_, T>>>
    {
        match self {
            Self::Sync(m) => m.lock(),
            #[cfg(feature = "async")]
            Self::Async(_) => unreachable!("async mutex in sync context"),
        }
    }

    #[cfg(feature = "async")]
    pub(crate) async fn lock_async(&self) -> tokio::sync::MutexGuard<'_, T> {
        match self {
            #[cfg(feature = "sync")]
            Self::Sync(_) => unreachable!("sync mutex in async context"),
            Self::Async(m) => m.lock().await,
        }
    }

    #[cfg(feature = "async")]
    pub(crate) fn try_lock_async(&self) -> Option<tokio::sync::MutexGuard<'_, T>> {
        match self {
            #[cfg(feature = "sync")]
            Self::Sync(_) => unreachable!("sync mutex in async context"),
            Self::Async(m) => m.try_lock().ok(),
        }
    }
}
