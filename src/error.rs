//! Error taxonomy for tenant resolution.
//!
//! Every failure the engine surfaces falls into one of five kinds. Callers
//! branch on the kind rather than on message text: NotFound from the tenant
//! repository is always recovered into a soft-empty tenant context, and
//! KeyDoesNotExist tells a provider that an optional claim was simply absent.

use thiserror::Error;

use crate::scopes::ScopesError;

/// Classification of a [`MappingError`], stable across context wrapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    KeyDoesNotExist,
    Unauthorized,
    InvalidData,
    Internal,
}

#[derive(Debug, Error)]
pub enum MappingError {
    #[error("{resource} not found [ID={id}]")]
    NotFound { resource: &'static str, id: String },

    #[error("the key does not exist in the source object [key={0}]")]
    KeyDoesNotExist(String),

    #[error("Unauthorized [reason={0}]")]
    Unauthorized(String),

    #[error("Invalid data [reason={0}]")]
    InvalidData(String),

    #[error("Internal Server Error: {0}")]
    Internal(String),

    #[error(transparent)]
    Scopes(#[from] ScopesError),

    #[error("{context}: {source}")]
    Context {
        context: String,
        #[source]
        source: Box<MappingError>,
    },
}

impl MappingError {
    pub fn not_found(resource: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            resource,
            id: id.into(),
        }
    }

    pub fn unauthorized(reason: impl Into<String>) -> Self {
        Self::Unauthorized(reason.into())
    }

    pub fn invalid_data(reason: impl Into<String>) -> Self {
        Self::InvalidData(reason.into())
    }

    pub fn internal(reason: impl Into<String>) -> Self {
        Self::Internal(reason.into())
    }

    /// Kind of the innermost error, looking through any context wrapping.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::KeyDoesNotExist(_) => ErrorKind::KeyDoesNotExist,
            Self::Unauthorized(_) => ErrorKind::Unauthorized,
            Self::InvalidData(_) => ErrorKind::InvalidData,
            Self::Internal(_) | Self::Scopes(_) => ErrorKind::Internal,
            Self::Context { source, .. } => source.kind(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::NotFound
    }

    pub fn is_key_does_not_exist(&self) -> bool {
        self.kind() == ErrorKind::KeyDoesNotExist
    }

    pub fn is_unauthorized(&self) -> bool {
        self.kind() == ErrorKind::Unauthorized
    }

    /// Prefix the error with a description of the step that failed.
    pub fn wrap(self, context: impl Into<String>) -> Self {
        Self::Context {
            context: context.into(),
            source: Box::new(self),
        }
    }
}

/// Context wrapping for results, keeping the underlying error kind intact.
pub trait ResultExt<T> {
    fn wrap_err(self, context: impl Into<String>) -> Result<T, MappingError>;

    fn wrap_err_with<F>(self, f: F) -> Result<T, MappingError>
    where
        F: FnOnce() -> String;
}

impl<T, E> ResultExt<T> for Result<T, E>
where
    E: Into<MappingError>,
{
    fn wrap_err(self, context: impl Into<String>) -> Result<T, MappingError> {
        self.map_err(|e| e.into().wrap(context))
    }

    fn wrap_err_with<F>(self, f: F) -> Result<T, MappingError>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| e.into().wrap(f()))
    }
}
