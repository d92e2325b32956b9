use std::time::Duration;

use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::{StatusCode, Url};
use serde::{Deserialize, Serialize};

use super::{ApiError, LoginSession, NotesGateway, RemoteNote};

#[derive(Debug, Serialize)]
struct CredentialsPayload<'a> {
    username: &'a str,
    password: &'a str,
}

#[derive(Debug, Serialize)]
struct NotePayload<'a> {
    title: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    detail: Option<String>,
}

/// Gateway implementation over `reqwest::blocking`. Owns transport details
/// only: request serialisation, bearer auth, timeout, and mapping non-2xx
/// and network failures into [`ApiError`].
pub struct HttpGateway {
    client: Client,
    base: Url,
}

impl HttpGateway {
    /// Build a gateway with one shared client and an explicit request
    /// timeout. `base` must be the service root, e.g. `http://host/api/`.
    pub fn new(mut base: Url, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(timeout).build()?;
        // Url::join drops the last path segment unless the base ends in '/'.
        if !base.path().ends_with('/') {
            base.set_path(&format!("{}/", base.path()));
        }
        Ok(Self { client, base })
    }

    pub fn base_url(&self) -> &Url {
        &self.base
    }

    fn endpoint(&self, path: &str) -> Result<Url, ApiError> {
        self.base
            .join(path)
            .map_err(|err| ApiError::Transport(format!("invalid endpoint {path}: {err}")))
    }

    fn execute(&self, request: RequestBuilder) -> Result<Response, ApiError> {
        let response = request.send().map_err(map_transport_error)?;
        let status = response.status();
        if status.is_success() {
            Ok(response)
        } else {
            let body = response.bytes().map_err(map_transport_error)?;
            Err(rejection(status, body.as_ref()))
        }
    }

    fn receive_json<T: serde::de::DeserializeOwned>(
        &self,
        request: RequestBuilder,
    ) -> Result<T, ApiError> {
        let response = self.execute(request)?;
        let body = response.bytes().map_err(map_transport_error)?;
        serde_json::from_slice(&body)
            .map_err(|err| ApiError::Decode(format!("invalid JSON payload: {err}")))
    }
}

impl NotesGateway for HttpGateway {
    fn register(&self, username: &str, password: &str) -> Result<(), ApiError> {
        let request = self
            .client
            .post(self.endpoint("users/register/")?)
            .json(&CredentialsPayload { username, password });
        self.execute(request).map(|_| ())
    }

    fn login(&self, username: &str, password: &str) -> Result<LoginSession, ApiError> {
        let request = self
            .client
            .post(self.endpoint("users/login/")?)
            .json(&CredentialsPayload { username, password });
        self.receive_json(request)
    }

    fn list_notes(&self, token: &str, search: &str) -> Result<Vec<RemoteNote>, ApiError> {
        let mut request = self.client.get(self.endpoint("notes/")?).bearer_auth(token);
        if !search.is_empty() {
            request = request.query(&[("search", search)]);
        }
        self.receive_json(request)
    }

    fn create_note(
        &self,
        token: &str,
        title: &str,
        content: &str,
    ) -> Result<RemoteNote, ApiError> {
        let request = self
            .client
            .post(self.endpoint("notes/")?)
            .bearer_auth(token)
            .json(&NotePayload { title, content });
        self.receive_json(request)
    }

    fn update_note(
        &self,
        token: &str,
        id: i64,
        title: &str,
        content: &str,
    ) -> Result<RemoteNote, ApiError> {
        let request = self
            .client
            .put(self.endpoint(&format!("notes/{id}/"))?)
            .bearer_auth(token)
            .json(&NotePayload { title, content });
        self.receive_json(request)
    }

    fn delete_note(&self, token: &str, id: i64) -> Result<(), ApiError> {
        let request = self
            .client
            .delete(self.endpoint(&format!("notes/{id}/"))?)
            .bearer_auth(token);
        self.execute(request).map(|_| ())
    }
}

fn map_transport_error(error: reqwest::Error) -> ApiError {
    if error.is_timeout() {
        ApiError::Timeout(error.to_string())
    } else {
        ApiError::Transport(error.to_string())
    }
}

fn rejection(status: StatusCode, body: &[u8]) -> ApiError {
    let detail = serde_json::from_slice::<ErrorBody>(body)
        .ok()
        .and_then(|parsed| parsed.detail)
        .filter(|detail| !detail.trim().is_empty())
        .unwrap_or_else(|| status_message(status));
    ApiError::Rejected {
        status: status.as_u16(),
        detail,
    }
}

fn status_message(status: StatusCode) -> String {
    match status.canonical_reason() {
        Some(reason) => format!("request failed: {} {}", status.as_u16(), reason),
        None => format!("request failed with status {}", status.as_u16()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejection_surfaces_detail_verbatim() {
        let error = rejection(
            StatusCode::BAD_REQUEST,
            br#"{"detail":"A user with that username already exists."}"#,
        );
        assert_eq!(
            error,
            ApiError::Rejected {
                status: 400,
                detail: "A user with that username already exists.".into(),
            }
        );
    }

    #[test]
    fn rejection_falls_back_to_status_for_non_json_bodies() {
        let error = rejection(StatusCode::BAD_GATEWAY, b"<html>upstream died</html>");
        match error {
            ApiError::Rejected { status, detail } => {
                assert_eq!(status, 502);
                assert!(detail.contains("502"), "expected status in {detail:?}");
            }
            other => panic!("expected rejection, got {other:?}"),
        }
    }

    #[test]
    fn rejection_ignores_blank_detail_fields() {
        let error = rejection(StatusCode::UNAUTHORIZED, br#"{"detail":"  "}"#);
        match error {
            ApiError::Rejected { ref detail, .. } => {
                assert!(detail.contains("401"), "expected fallback, got {detail:?}");
            }
            other => panic!("expected rejection, got {other:?}"),
        }
        assert!(error.is_auth_rejection());
    }

    #[test]
    fn base_url_gains_trailing_slash() -> anyhow::Result<()> {
        let gateway = HttpGateway::new(
            Url::parse("http://localhost:8000/api")?,
            Duration::from_secs(5),
        )?;
        assert_eq!(gateway.base_url().path(), "/api/");
        let endpoint = gateway.endpoint("notes/")?;
        assert_eq!(endpoint.path(), "/api/notes/");
        Ok(())
    }
}
