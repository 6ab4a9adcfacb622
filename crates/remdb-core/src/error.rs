//! The error taxonomy shared by every REM core crate.
//!
//! Mirrors `kv_rs::error::Error` in shape (a single enum, a `CResult` alias,
//! manual `Display`/`std::error::Error` impls, `From` conversions at the I/O
//! boundary) but carries the full set of kinds the core needs to report
//! across component boundaries without leaking stack traces or secrets.

use std::fmt;

/// The stable, machine-readable classification of an [`Error`].
///
/// Every variant here has a fixed wire code (see [`Kind::code`]) that must
/// never change once shipped; callers match on `Kind`, not on the error's
/// `Display` text.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Kind {
    NotFound,
    AlreadyExists,
    SchemaMismatch,
    VectorDimMismatch,
    QueryInvalid,
    QueryTooBroad,
    ReadOnly,
    DivergentHistory,
    KeyMismatch,
    Corruption,
    TenantMismatch,
    Transient,
    Cancelled,
    Internal,
}

impl Kind {
    /// The stable machine code surfaced to callers across the process
    /// boundary (never renamed, even if the `Display` message changes).
    pub fn code(self) -> &'static str {
        match self {
            Kind::NotFound => "NOT_FOUND",
            Kind::AlreadyExists => "ALREADY_EXISTS",
            Kind::SchemaMismatch => "SCHEMA_MISMATCH",
            Kind::VectorDimMismatch => "VECTOR_DIM_MISMATCH",
            Kind::QueryInvalid => "QUERY_INVALID",
            Kind::QueryTooBroad => "QUERY_TOO_BROAD",
            Kind::ReadOnly => "READ_ONLY",
            Kind::DivergentHistory => "DIVERGENT_HISTORY",
            Kind::KeyMismatch => "KEY_MISMATCH",
            Kind::Corruption => "CORRUPTION",
            Kind::TenantMismatch => "TENANT_MISMATCH",
            Kind::Transient => "TRANSIENT",
            Kind::Cancelled => "CANCELLED",
            Kind::Internal => "INTERNAL",
        }
    }
}

/// A REM core error: a stable [`Kind`], a human-readable message, and an
/// optional wrapped cause (I/O errors, lock errors, etc).
#[derive(Debug)]
pub struct Error {
    kind: Kind,
    message: String,
    source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
}

pub type CResult<T> = std::result::Result<T, Error>;

impl Error {
    pub fn new(kind: Kind, message: impl Into<String>) -> Self {
        Error { kind, message: message.into(), source: None }
    }

    pub fn wrap(
        kind: Kind,
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Error { kind, message: message.into(), source: Some(Box::new(source)) }
    }

    pub fn kind(&self) -> Kind {
        self.kind
    }

    pub fn code(&self) -> &'static str {
        self.kind.code()
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Error::new(Kind::NotFound, message)
    }

    pub fn already_exists(message: impl Into<String>) -> Self {
        Error::new(Kind::AlreadyExists, message)
    }

    pub fn schema_mismatch(message: impl Into<String>) -> Self {
        Error::new(Kind::SchemaMismatch, message)
    }

    pub fn vector_dim_mismatch(message: impl Into<String>) -> Self {
        Error::new(Kind::VectorDimMismatch, message)
    }

    pub fn query_invalid(message: impl Into<String>) -> Self {
        Error::new(Kind::QueryInvalid, message)
    }

    pub fn query_too_broad(message: impl Into<String>) -> Self {
        Error::new(Kind::QueryTooBroad, message)
    }

    pub fn read_only(message: impl Into<String>) -> Self {
        Error::new(Kind::ReadOnly, message)
    }

    pub fn divergent_history(message: impl Into<String>) -> Self {
        Error::new(Kind::DivergentHistory, message)
    }

    pub fn key_mismatch(message: impl Into<String>) -> Self {
        Error::new(Kind::KeyMismatch, message)
    }

    pub fn corruption(message: impl Into<String>) -> Self {
        Error::new(Kind::Corruption, message)
    }

    pub fn tenant_mismatch(message: impl Into<String>) -> Self {
        Error::new(Kind::TenantMismatch, message)
    }

    pub fn transient(message: impl Into<String>) -> Self {
        Error::new(Kind::Transient, message)
    }

    pub fn cancelled(message: impl Into<String>) -> Self {
        Error::new(Kind::Cancelled, message)
    }

    /// An internal/bug-class error. `detail` is a breadcrumb for operators;
    /// it must never contain key material, tenant secrets or plaintext
    /// values — callers are responsible for that invariant since this
    /// constructor has no way to check it.
    pub fn internal(detail: impl Into<String>) -> Self {
        Error::new(Kind::Internal, detail)
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self.kind, Kind::Transient | Kind::Cancelled)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind.code(), self.message)
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source.as_ref().map(|e| e.as_ref() as &(dyn std::error::Error + 'static))
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        let kind = match err.kind() {
            std::io::ErrorKind::NotFound => Kind::NotFound,
            std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut => Kind::Transient,
            _ => Kind::Internal,
        };
        Error::wrap(kind, "I/O error", err)
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::wrap(Kind::SchemaMismatch, "JSON (de)serialization failed", err)
    }
}
