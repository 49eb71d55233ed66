use std::borrow::Cow;

/// All possible error kinds.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// No response arrived within the transport timeout and the request has
    /// been aborted.
    Timeout,
    /// A response arrived but its status code reports a failure.
    HttpStatus,
    /// The request failed at the transport level before any response, for
    /// example because the address could not be resolved or the connection
    /// was refused.
    Network,
    /// A required input is missing or malformed.
    InvalidInput,
    /// The response body is not the expected `JSON` value.
    JsonResponse,
    /// A request has been dropped before being settled.
    Internal,
}

impl ErrorKind {
    pub(crate) const fn description(self) -> &'static str {
        match self {
            Self::Timeout => "Timeout",
            Self::HttpStatus => "Http Status",
            Self::Network => "Network",
            Self::InvalidInput => "Invalid Input",
            Self::JsonResponse => "Json Response",
            Self::Internal => "Internal",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.description())
    }
}

/// A controller error.
#[derive(Clone, PartialEq, Eq)]
pub struct Error {
    kind: ErrorKind,
    info: Cow<'static, str>,
    status: Option<u16>,
}

impl std::fmt::Debug for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.error())
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.error())
    }
}

impl std::error::Error for Error {}

impl Error {
    /// Creates an [`Error`] from an [`ErrorKind`] and a description.
    #[must_use]
    #[inline]
    pub fn new(kind: ErrorKind, info: impl Into<Cow<'static, str>>) -> Self {
        Self {
            kind,
            info: info.into(),
            status: None,
        }
    }

    /// Creates an [`ErrorKind::HttpStatus`] error from a status code and its
    /// reason text.
    #[must_use]
    pub fn http_status(code: u16, reason: &str) -> Self {
        Self {
            kind: ErrorKind::HttpStatus,
            info: format!("HTTP {code}: {reason}").into(),
            status: Some(code),
        }
    }

    /// Creates an [`ErrorKind::Timeout`] error.
    #[must_use]
    pub fn timeout(timeout: std::time::Duration) -> Self {
        Self::new(
            ErrorKind::Timeout,
            format!("Request timeout after {}ms", timeout.as_millis()),
        )
    }

    /// Returns the [`ErrorKind`].
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Returns the error description.
    #[must_use]
    pub fn info(&self) -> &str {
        &self.info
    }

    /// Returns the status code of an [`ErrorKind::HttpStatus`] error.
    #[must_use]
    pub const fn status(&self) -> Option<u16> {
        self.status
    }

    fn error(&self) -> String {
        format!("{}: {}", self.kind, self.info)
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            return Self::new(ErrorKind::Timeout, e.to_string());
        }

        if let Some(status) = e.status() {
            return Self::http_status(
                status.as_u16(),
                status.canonical_reason().unwrap_or("Unknown"),
            );
        }

        if e.is_builder() {
            return Self::new(ErrorKind::InvalidInput, e.to_string());
        }

        if e.is_decode() {
            return Self::new(ErrorKind::JsonResponse, e.to_string());
        }

        Self::new(ErrorKind::Network, e.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Self::new(ErrorKind::JsonResponse, format!("Json error caused by {e}"))
    }
}

impl From<tokio::sync::oneshot::error::RecvError> for Error {
    fn from(e: tokio::sync::oneshot::error::RecvError) -> Self {
        Self::new(
            ErrorKind::Internal,
            format!("Request dropped before completion: {e}"),
        )
    }
}

/// A specialized [`Result`] type for [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::{Error, ErrorKind};

    #[test]
    fn http_status_error() {
        let error = Error::http_status(404, "Not Found");

        assert_eq!(error.kind(), ErrorKind::HttpStatus);
        assert_eq!(error.status(), Some(404));
        assert_eq!(error.info(), "HTTP 404: Not Found");
        assert_eq!(error.to_string(), "Http Status: HTTP 404: Not Found");
    }

    #[test]
    fn timeout_error() {
        let error = Error::timeout(Duration::from_secs(10));

        assert_eq!(error.kind(), ErrorKind::Timeout);
        assert_eq!(error.status(), None);
        assert_eq!(error.info(), "Request timeout after 10000ms");
    }

    #[test]
    fn json_error() {
        let e = serde_json::from_str::<u8>("not json").unwrap_err();
        let error = Error::from(e);

        assert_eq!(error.kind(), ErrorKind::JsonResponse);
        assert!(error.info().starts_with("Json error caused by"));
    }
}
