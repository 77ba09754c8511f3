use thiserror::Error;

/// Request-level failures. Anything that happens to a single account during a
/// fan-out is a [`crate::providers::CallError`] instead and never reaches here.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0}")]
    Validation(String),
    #[error("unauthorized")]
    Unauthorized,
    #[error("invalid credentials")]
    InvalidCredentials,
    #[error("Database unavailable")]
    DbUnavailable,
    #[error("{0}")]
    Internal(String),
}

impl AppError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn internal(err: impl std::fmt::Display) -> Self {
        Self::Internal(err.to_string())
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "VAL-1001",
            Self::Unauthorized => "AUTH-1001",
            Self::InvalidCredentials => "AUTH-1002",
            Self::DbUnavailable => "DB-1001",
            Self::Internal(_) => "GEN-1000",
        }
    }

    pub fn explain(&self) -> &'static str {
        match self {
            Self::Validation(_) => "The request body was missing a field or had the wrong shape.",
            Self::Unauthorized => "No valid session cookie was presented.",
            Self::InvalidCredentials => "The username or password did not match a stored user.",
            Self::DbUnavailable => "The application could not access the SQLite database.",
            Self::Internal(_) => "An unspecified error occurred.",
        }
    }
}

impl From<r2d2::Error> for AppError {
    fn from(_: r2d2::Error) -> Self {
        Self::DbUnavailable
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        Self::Internal(format!("{err:#}"))
    }
}

impl From<tokio::task::JoinError> for AppError {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::Internal(err.to_string())
    }
}
