//! Error types for the lead-tracker library.
//!
//! This module provides custom error types using `thiserror` so store,
//! collaborator and broadcast failures stay distinguishable all the way up
//! to the CLI.

use thiserror::Error;

/// Errors that can occur in the lead-tracker application.
#[derive(Error, Debug)]
pub enum TrackerError {
    /// Database-related errors
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Connection pool errors
    #[error("Connection pool error: {0}")]
    Pool(#[from] r2d2::Error),

    /// A record that was looked up by id does not exist
    #[error("{entity} not found: {id}")]
    NotFound {
        /// Kind of record ("company", "mail", ...)
        entity: &'static str,
        /// Identifier that was requested
        id: String,
    },

    /// Form input rejected at the boundary
    #[error("Invalid input: {0}")]
    Validation(String),

    /// Newsletter resolution produced nobody to send to
    #[error("No recipients for mail {0}")]
    NoRecipients(String),

    /// Newsletter already has a sent record
    #[error("Mail {0} has already been sent")]
    AlreadySent(String),

    /// Email delivery collaborator failure
    #[error("Mail delivery error: {0}")]
    Mail(String),

    /// Chat delivery collaborator failure
    #[error("Chat delivery error: {0}")]
    Chat(String),

    /// Headless CMS failure
    #[error("Content store error: {0}")]
    Cms(String),

    /// HTTP transport errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Messages went out but the sent record could not be written
    #[error("Sent {delivered} message(s) for mail {mail_id} but failed to record the send: {source}")]
    BookkeepingFailed {
        /// Broadcast identifier
        mail_id: String,
        /// Number of deliveries that succeeded before bookkeeping
        delivered: usize,
        /// Underlying store error
        #[source]
        source: Box<TrackerError>,
    },

    /// File I/O errors
    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid date format
    #[error("Invalid date format: {0}")]
    InvalidDate(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Binary serialization errors
    #[error("Binary serialization error: {0}")]
    Bincode(#[from] bincode::Error),

    /// Cache errors
    #[error("Cache error: {0}")]
    Cache(String),

    /// General error with context
    #[error("{0}")]
    Other(String),
}

/// Convenience type alias for Result with `TrackerError`
pub type Result<T> = std::result::Result<T, TrackerError>;

impl TrackerError {
    /// Shorthand for a missing record.
    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity,
            id: id.into(),
        }
    }
}

impl From<anyhow::Error> for TrackerError {
    fn from(err: anyhow::Error) -> Self {
        TrackerError::Other(err.to_string())
    }
}

impl From<sled::Error> for TrackerError {
    fn from(err: sled::Error) -> Self {
        TrackerError::Cache(err.to_string())
    }
}

impl From<lettre::error::Error> for TrackerError {
    fn from(err: lettre::error::Error) -> Self {
        TrackerError::Mail(err.to_string())
    }
}

impl From<lettre::transport::smtp::Error> for TrackerError {
    fn from(err: lettre::transport::smtp::Error) -> Self {
        TrackerError::Mail(err.to_string())
    }
}

impl From<lettre::address::AddressError> for TrackerError {
    fn from(err: lettre::address::AddressError) -> Self {
        TrackerError::Mail(err.to_string())
    }
}
