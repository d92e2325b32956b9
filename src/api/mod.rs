use serde::Deserialize;
use thiserror::Error;

mod http;
pub mod runner;

pub use http::HttpGateway;
pub use runner::{ApiJob, ApiOutcome, RequestRunner};

/// Profile of the authenticated user as returned by the login endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct UserProfile {
    pub username: String,
}

/// Successful login response: bearer token plus the user it belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LoginSession {
    pub token: String,
    pub user: UserProfile,
}

/// A note as the server stores it. `id` is server-assigned and immutable;
/// unsaved drafts never appear here.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RemoteNote {
    pub id: i64,
    pub title: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub updated_at: Option<String>,
}

/// Failures produced by the gateway. `Rejected` carries the server's
/// `detail` message verbatim when one was present; everything else is a
/// transport-level problem that surfaces through the same path.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ApiError {
    #[error("{detail}")]
    Rejected { status: u16, detail: String },
    #[error("request timed out: {0}")]
    Timeout(String),
    #[error("network error: {0}")]
    Transport(String),
    #[error("unexpected response: {0}")]
    Decode(String),
}

impl ApiError {
    pub fn is_auth_rejection(&self) -> bool {
        matches!(self, ApiError::Rejected { status, .. } if *status == 401 || *status == 403)
    }
}

/// The REST backend seam. The state model and the CLI consume this trait;
/// tests swap in an in-memory fake.
pub trait NotesGateway: Send + Sync {
    fn register(&self, username: &str, password: &str) -> Result<(), ApiError>;

    fn login(&self, username: &str, password: &str) -> Result<LoginSession, ApiError>;

    /// Fetch notes matching `search` (empty string fetches everything).
    /// The returned order is the server's order and is preserved as-is.
    fn list_notes(&self, token: &str, search: &str) -> Result<Vec<RemoteNote>, ApiError>;

    fn create_note(&self, token: &str, title: &str, content: &str)
        -> Result<RemoteNote, ApiError>;

    fn update_note(
        &self,
        token: &str,
        id: i64,
        title: &str,
        content: &str,
    ) -> Result<RemoteNote, ApiError>;

    fn delete_note(&self, token: &str, id: i64) -> Result<(), ApiError>;
}
