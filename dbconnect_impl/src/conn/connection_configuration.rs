use crate::protocol::ServerMsg;
use std::sync::Arc;

/// What to do with server notices.
#[derive(Clone, Default)]
pub enum NoticeProcessing {
    /// Log at warn level (the default).
    #[default]
    Log,
    /// Discard notices.
    Quiet,
    /// Invoke a user-supplied handler.
    Custom(Arc<dyn Fn(&ServerMsg) + Send + Sync>),
}

impl std::fmt::Debug for NoticeProcessing {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Self::Log => write!(f, "Log"),
            Self::Quiet => write!(f, "Quiet"),
            Self::Custom(_) => write!(f, "Custom(..)"),
        }
    }
}

/// Behavioural knobs of a connection, as opposed to the endpoint description
/// in [`ConnectParams`](crate::ConnectParams).
#[derive(Clone, Debug, Default)]
pub struct ConnectionConfiguration {
    use_single_row_mode: bool,
    notice_processing: NoticeProcessing,
    tweaks_version: Option<String>,
}

impl ConnectionConfiguration {
    /// Returns whether many-row responses are streamed row by row.
    pub fn is_use_single_row_mode(&self) -> bool {
        self.use_single_row_mode
    }
    /// Defines whether many-row responses are streamed row by row.
    pub fn set_use_single_row_mode(&mut self, on: bool) {
        self.use_single_row_mode = on;
    }
    /// Builder-method for defining whether many-row responses are streamed
    /// row by row.
    #[must_use]
    pub fn with_use_single_row_mode(mut self, on: bool) -> Self {
        self.use_single_row_mode = on;
        self
    }

    /// Returns the notice handling mode.
    pub fn notice_processing(&self) -> &NoticeProcessing {
        &self.notice_processing
    }
    /// Sets the notice handling mode.
    pub fn set_notice_processing(&mut self, np: NoticeProcessing) {
        self.notice_processing = np;
    }
    /// Builder-method for setting the notice handling mode.
    #[must_use]
    pub fn with_notice_processing(mut self, np: NoticeProcessing) -> Self {
        self.notice_processing = np;
        self
    }

    /// Returns the tweaks version, if set.
    pub fn tweaks_version(&self) -> Option<&str> {
        self.tweaks_version.as_deref()
    }
    /// Builder-method for setting the tweaks version, which selects the
    /// generation of behavioural adjustments a deployment opts into.
    #[must_use]
    pub fn with_tweaks_version(mut self, version: impl Into<String>) -> Self {
        self.tweaks_version = Some(version.into());
        self
    }
}
