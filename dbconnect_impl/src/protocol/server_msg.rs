use std::error::Error;

/// Severity of a server message.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Severity {
    /// An additional message sent along with the regular response.
    Notice,
    Warning,
    /// The request could not be answered correctly.
    Error,
    /// A session-terminating error.
    Fatal,
    /// A server-terminating error.
    Panic,
    Info,
    Log,
    Debug,

    /// A severity this client does not know.
    __UNKNOWN__(String),
}

impl Severity {
    pub(crate) fn from_tag(s: &str) -> Self {
        match s {
            "NOTICE" => Self::Notice,
            "WARNING" => Self::Warning,
            "ERROR" => Self::Error,
            "FATAL" => Self::Fatal,
            "PANIC" => Self::Panic,
            "INFO" => Self::Info,
            "LOG" => Self::Log,
            "DEBUG" => Self::Debug,
            other => Self::__UNKNOWN__(other.to_string()),
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Self::Notice => write!(f, "Notice"),
            Self::Warning => write!(f, "Warning"),
            Self::Error => write!(f, "Error"),
            Self::Fatal => write!(f, "Fatal error"),
            Self::Panic => write!(f, "Panic"),
            Self::Info => write!(f, "Info"),
            Self::Log => write!(f, "Log"),
            Self::Debug => write!(f, "Debug"),
            Self::__UNKNOWN__(s) => write!(f, "Message of unknown severity ({s})"),
        }
    }
}

/// Categorical causes derived from the server's SQLSTATE.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[non_exhaustive]
pub enum Cause {
    IntegrityConstraintViolation,
    RestrictViolation,
    NotNullViolation,
    ForeignKeyViolation,
    UniqueViolation,
    CheckViolation,
    ExclusionViolation,
    SerializationFailure,
    DeadlockDetected,
    InsufficientResources,
    DiskFull,
    OutOfMemory,
    TooManyConnections,
    Unspecified,
}

impl Cause {
    /// Classifies a five-character SQLSTATE.
    #[must_use]
    pub fn of_sqlstate(sqlstate: &str) -> Cause {
        match sqlstate {
            "23000" => Cause::IntegrityConstraintViolation,
            "23001" => Cause::RestrictViolation,
            "23502" => Cause::NotNullViolation,
            "23503" => Cause::ForeignKeyViolation,
            "23505" => Cause::UniqueViolation,
            "23514" => Cause::CheckViolation,
            "23P01" => Cause::ExclusionViolation,
            "40001" => Cause::SerializationFailure,
            "40P01" => Cause::DeadlockDetected,
            "53000" => Cause::InsufficientResources,
            "53100" => Cause::DiskFull,
            "53200" => Cause::OutOfMemory,
            "53300" => Cause::TooManyConnections,
            _ => Cause::Unspecified,
        }
    }
}

/// An error or notice reported by the server.
#[derive(Clone, PartialEq, Eq)]
pub struct ServerMsg {
    severity: Severity,
    sqlstate: String,
    message: String,
    detail: Option<String>,
    hint: Option<String>,
    position: Option<u32>,
}

impl ServerMsg {
    /// Returns the severity.
    #[must_use]
    pub fn severity(&self) -> &Severity {
        &self.severity
    }
    /// Returns the five-character SQLSTATE.
    #[must_use]
    pub fn sqlstate(&self) -> &str {
        &self.sqlstate
    }
    /// Returns the primary message text.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
    /// Returns the detail text, if the server sent one.
    #[must_use]
    pub fn detail(&self) -> Option<&str> {
        self.detail.as_deref()
    }
    /// Returns the hint text, if the server sent one.
    #[must_use]
    pub fn hint(&self) -> Option<&str> {
        self.hint.as_deref()
    }
    /// Returns the 1-based error position in the query text, if any.
    #[must_use]
    pub fn position(&self) -> Option<u32> {
        self.position
    }

    /// The categorical cause derived from the SQLSTATE.
    #[must_use]
    pub fn cause(&self) -> Cause {
        Cause::of_sqlstate(&self.sqlstate)
    }

    // Builds from the (field-type, value) pairs of an ErrorResponse or
    // NoticeResponse. Unknown field types are skipped.
    pub(crate) fn from_fields(fields: Vec<(u8, String)>) -> Self {
        let mut severity = Severity::Error;
        let mut sqlstate = String::new();
        let mut message = String::new();
        let mut detail = None;
        let mut hint = None;
        let mut position = None;
        for (key, value) in fields {
            match key {
                // 'V' is the non-localized severity, preferred over 'S'
                b'V' => severity = Severity::from_tag(&value),
                b'S' => {
                    if matches!(severity, Severity::Error) {
                        severity = Severity::from_tag(&value);
                    }
                }
                b'C' => sqlstate = value,
                b'M' => message = value,
                b'D' => detail = Some(value),
                b'H' => hint = Some(value),
                b'P' => position = value.parse().ok(),
                _ => {}
            }
        }
        Self {
            severity,
            sqlstate,
            message,
            detail,
            hint,
            position,
        }
    }

    #[cfg(test)]
    pub(crate) fn for_test(severity: Severity, sqlstate: &str, message: &str) -> Self {
        Self {
            severity,
            sqlstate: sqlstate.to_string(),
            message: message.to_string(),
            detail: None,
            hint: None,
            position: None,
        }
    }
}

impl Error for ServerMsg {}

impl std::fmt::Display for ServerMsg {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(
            f,
            r#"{} [sql state: {}]: "{}""#,
            self.severity, self.sqlstate, self.message
        )?;
        if let Some(ref detail) = self.detail {
            write!(f, " ({detail})")?;
        }
        Ok(())
    }
}

impl std::fmt::Debug for ServerMsg {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{self}")
    }
}

#[cfg(test)]
mod tests {
    use super::Cause;

    #[test]
    fn sqlstate_classification() {
        assert_eq!(Cause::of_sqlstate("23505"), Cause::UniqueViolation);
        assert_eq!(Cause::of_sqlstate("23503"), Cause::ForeignKeyViolation);
        assert_eq!(Cause::of_sqlstate("40001"), Cause::SerializationFailure);
        assert_eq!(Cause::of_sqlstate("40P01"), Cause::DeadlockDetected);
        assert_eq!(Cause::of_sqlstate("53300"), Cause::TooManyConnections);
        assert_eq!(Cause::of_sqlstate("42601"), Cause::Unspecified);
    }
}
