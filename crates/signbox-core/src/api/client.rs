//! API client for the file-storage service.
//!
//! `ApiClient` is the authenticated request dispatcher: every protected call
//! goes through `dispatch`, which renews the access token when it is close to
//! expiry, attaches it as a bearer credential, and ends the session when the
//! server answers 401.

use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use tracing::{debug, info, warn};

use super::retry::RetryPolicy;
use super::transport::{ApiRequest, ApiResponse, FormPart, ReqwestTransport, Transport};
use super::ApiError;
use crate::auth::{CredentialStore, Refresher, SessionNotifier, SessionState};
use crate::config::Config;
use crate::models::{
    AuthResponse, DownloadedFile, FileItem, FileUploadResponse, LoginRequest, RegisterRequest,
    User,
};
use crate::verify::{self, RawVerification, Verdict};

// ============================================================================
// Endpoints (relative to the API base URL)
// ============================================================================

pub const LOGIN_PATH: &str = "auth/login";
pub const REGISTER_PATH: &str = "auth/register";
pub const REFRESH_PATH: &str = "auth/refresh";
pub const LOGOUT_PATH: &str = "auth/logout";
pub const FILES_PATH: &str = "files/";
pub const UPLOAD_PATH: &str = "files/upload";
pub const VERIFY_PATH: &str = "files/verify";

/// Multipart field carrying file contents
const FILE_FIELD: &str = "file";

/// Cheap to clone; clones share the transport, store and session.
#[derive(Clone)]
pub struct ApiClient {
    transport: Arc<dyn Transport>,
    store: Arc<CredentialStore>,
    session: SessionNotifier,
    refresher: Refresher,
    retry: RetryPolicy,
}

impl ApiClient {
    /// Create a client talking to the configured server over HTTP
    pub fn new(config: &Config, store: Arc<CredentialStore>, session: SessionNotifier) -> Result<Self> {
        let transport = ReqwestTransport::new(&config.api_base_url, config.request_timeout())
            .context("Failed to build HTTP client")?;
        Ok(Self::with_transport(
            Arc::new(transport),
            store,
            session,
            config.refresh_threshold(),
        ))
    }

    pub fn with_transport(
        transport: Arc<dyn Transport>,
        store: Arc<CredentialStore>,
        session: SessionNotifier,
        refresh_threshold: chrono::Duration,
    ) -> Self {
        let refresher = Refresher::new(
            Arc::clone(&store),
            session.clone(),
            Arc::clone(&transport),
            REFRESH_PATH,
            refresh_threshold,
        );
        Self {
            transport,
            store,
            session,
            refresher,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn session(&self) -> &SessionNotifier {
        &self.session
    }

    pub fn store(&self) -> &Arc<CredentialStore> {
        &self.store
    }

    pub fn refresher(&self) -> &Refresher {
        &self.refresher
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    // ===== Dispatch =====

    /// Send a request through the authenticated request layer.
    ///
    /// Non-2xx responses are returned as `Ok`; only transport failures are
    /// errors. A 401 on a protected call clears the credential store and
    /// marks the session logged out before the response is returned.
    pub async fn dispatch(&self, mut request: ApiRequest) -> Result<ApiResponse, ApiError> {
        if !request.authenticated {
            return self.transport.send(request).await;
        }

        let outcome = self.refresher.ensure_fresh().await;
        request.bearer = self.store.access_token();
        debug!(
            method = %request.method,
            path = %request.path,
            ?outcome,
            has_token = request.bearer.is_some(),
            "Dispatching request"
        );

        let path = request.path.clone();
        let response = self.transport.send(request).await?;

        if response.status == StatusCode::UNAUTHORIZED {
            warn!(path = %path, "Request rejected as unauthorized, ending session");
            self.end_session();
        }
        Ok(response)
    }

    fn end_session(&self) {
        self.store.clear();
        self.session.set_session_state(SessionState::NotLoggedIn);
    }

    // ===== Authentication =====

    /// Log in and start a session. Returns the user profile if the server sent one.
    pub async fn login(&self, email: &str, password: &str) -> Result<Option<User>> {
        let body = serde_json::to_value(LoginRequest {
            email: email.to_string(),
            password: password.to_string(),
        })?;
        let request = ApiRequest::post(LOGIN_PATH).unauthenticated().json(body);
        self.authenticate(request).await.context("Login failed")
    }

    /// Create an account and start a session with the tokens it returns
    pub async fn register(&self, email: &str, password: &str, name: Option<&str>) -> Result<Option<User>> {
        let body = serde_json::to_value(RegisterRequest {
            email: email.to_string(),
            password: password.to_string(),
            name: name.map(str::to_string),
        })?;
        let request = ApiRequest::post(REGISTER_PATH).unauthenticated().json(body);
        self.authenticate(request).await.context("Registration failed")
    }

    async fn authenticate(&self, request: ApiRequest) -> Result<Option<User>, ApiError> {
        let response = self.dispatch(request).await?.error_for_status()?;
        let grant: AuthResponse = response.json()?;
        let (pair, user) = grant.into_credentials(Utc::now())?;

        info!(access_expires_at = %pair.access_expires_at, "Session started");
        self.store.set(pair);
        self.session.set_session_state(SessionState::LoggedIn);
        Ok(user)
    }

    /// End the session locally, then tell the server on a best-effort basis.
    ///
    /// Local state is cleared whatever happens to the server call.
    pub async fn logout(&self) {
        let token = self.store.access_token();
        self.end_session();
        info!("Logged out");

        let Some(token) = token else {
            return;
        };
        let mut request = ApiRequest::post(LOGOUT_PATH).unauthenticated();
        request.bearer = Some(token);
        match self.transport.send(request).await {
            Ok(response) if response.is_success() => debug!("Server acknowledged logout"),
            Ok(response) => debug!(status = response.status.as_u16(), "Server logout rejected"),
            Err(e) => debug!(error = %e, "Server logout failed"),
        }
    }

    // ===== Files =====

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let response = self
            .dispatch_with_retry(ApiRequest::get(path), &self.retry)
            .await
            .with_context(|| format!("Failed to send GET request to {}", path))?
            .error_for_status()?;
        response
            .json()
            .with_context(|| format!("Failed to parse JSON response from {}", path))
    }

    /// List the files owned by the logged-in user
    pub async fn list_files(&self) -> Result<Vec<FileItem>> {
        self.get(FILES_PATH).await
    }

    /// Fetch the record of a single file
    pub async fn file_info(&self, file_id: &str) -> Result<FileItem> {
        self.get(&format!("files/{}", file_id)).await
    }

    /// Upload a file, asking the server to sign it when `sign` is set
    pub async fn upload_file(&self, filename: &str, bytes: Vec<u8>, sign: bool) -> Result<FileUploadResponse> {
        let mut parts = vec![FormPart::File {
            name: FILE_FIELD.to_string(),
            filename: filename.to_string(),
            bytes,
        }];
        if sign {
            parts.push(FormPart::Text {
                name: "sign".to_string(),
                value: "true".to_string(),
            });
        }

        let response = self
            .dispatch(ApiRequest::post(UPLOAD_PATH).multipart(parts))
            .await
            .context("Failed to upload file")?
            .error_for_status()?;
        let uploaded: FileUploadResponse = response.json().context("Failed to parse upload response")?;
        info!(filename = %uploaded.filename, signed = uploaded.is_signed, "File uploaded");
        Ok(uploaded)
    }

    /// Download a file's contents
    pub async fn download_file(&self, file_id: &str) -> Result<DownloadedFile> {
        let path = format!("files/{}/download", file_id);
        let response = self
            .dispatch_with_retry(ApiRequest::get(path.as_str()), &self.retry)
            .await
            .context("Failed to download file")?
            .error_for_status()?;

        let filename = response
            .attachment_filename()
            .unwrap_or_else(|| format!("file-{}", file_id));
        debug!(%filename, bytes = response.body.len(), "File downloaded");
        Ok(DownloadedFile {
            filename,
            bytes: response.body,
        })
    }

    /// Ask the server whether a file carries a valid signature.
    ///
    /// Always yields a verdict; transport and server errors are folded into
    /// a presumed-unsigned verdict rather than returned.
    pub async fn verify_file(&self, filename: &str, bytes: Vec<u8>) -> Verdict {
        let parts = vec![FormPart::File {
            name: FILE_FIELD.to_string(),
            filename: filename.to_string(),
            bytes,
        }];
        let raw = RawVerification::from(self.dispatch(ApiRequest::post(VERIFY_PATH).multipart(parts)).await);
        let verdict = verify::interpret(&raw);
        info!(
            %filename,
            verified = verdict.is_verified,
            kind = ?verdict.kind,
            "Verification finished"
        );
        verdict
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;
    use crate::auth::store::pair_expiring_in;
    use crate::auth::CredentialPair;
    use crate::testutil::ScriptedTransport;
    use crate::verify::{UnsignedCause, VerdictKind};

    const GRANT: &str = r#"{"access_token":"access-1","refresh_token":"refresh-1","access_token_expiration_time":900000,"refresh_token_expiration_time":604800000,"user":{"id":"u1","email":"ana@example.com"}}"#;

    fn client_with(pair: Option<CredentialPair>) -> (ApiClient, Arc<ScriptedTransport>) {
        let store = Arc::new(CredentialStore::in_memory());
        if let Some(pair) = pair {
            store.set(pair);
        }
        let session = SessionNotifier::new(SessionState::from_stored(store.get().as_ref()));
        let transport = ScriptedTransport::new();
        let client = ApiClient::with_transport(transport.clone(), store, session, Duration::minutes(5))
            .with_retry_policy(RetryPolicy::none());
        (client, transport)
    }

    #[tokio::test]
    async fn test_dispatch_attaches_bearer() {
        let (client, transport) =
            client_with(Some(pair_expiring_in(Duration::minutes(10), Duration::days(1))));
        transport.respond(FILES_PATH, 200, "[]");

        let response = client.dispatch(ApiRequest::get(FILES_PATH)).await.expect("response");
        assert_eq!(response.status, StatusCode::OK);

        let sent = transport.requests();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].bearer.as_deref(), Some("access-1"));
    }

    #[tokio::test]
    async fn test_401_ends_session() {
        let (client, transport) =
            client_with(Some(pair_expiring_in(Duration::minutes(10), Duration::days(1))));
        let rx = client.session().subscribe();
        transport.respond(FILES_PATH, 401, r#"{"error":"Token is invalid"}"#);

        let response = client.dispatch(ApiRequest::get(FILES_PATH)).await.expect("response");

        assert_eq!(response.status, StatusCode::UNAUTHORIZED);
        assert!(client.store().get().is_none());
        assert_eq!(client.session().current(), SessionState::NotLoggedIn);
        assert!(rx.has_changed().expect("sender alive"));
    }

    #[tokio::test]
    async fn test_401_ends_session_even_when_already_logged_out() {
        let (client, transport) = client_with(None);
        transport.respond("files/42", 401, "");

        let response = client.dispatch(ApiRequest::get("files/42")).await.expect("response");
        assert_eq!(response.status, StatusCode::UNAUTHORIZED);
        assert!(transport.requests()[0].bearer.is_none());
        assert_eq!(client.session().current(), SessionState::NotLoggedIn);
    }

    #[tokio::test]
    async fn test_other_errors_pass_through_untouched() {
        let pair = pair_expiring_in(Duration::minutes(10), Duration::days(1));
        let (client, transport) = client_with(Some(pair.clone()));
        transport.respond("files/missing", 404, r#"{"error":"File not found"}"#);
        transport.fail(FILES_PATH, "connection reset");

        let response = client.dispatch(ApiRequest::get("files/missing")).await.expect("response");
        assert_eq!(response.status, StatusCode::NOT_FOUND);
        assert_eq!(response.text(), r#"{"error":"File not found"}"#);

        let err = client.dispatch(ApiRequest::get(FILES_PATH)).await.expect_err("transport error");
        assert!(matches!(err, ApiError::Transport(_)));

        assert_eq!(client.store().get(), Some(pair));
        assert_eq!(client.session().current(), SessionState::LoggedIn);
    }

    #[tokio::test]
    async fn test_dispatch_refreshes_before_sending() {
        let (client, transport) =
            client_with(Some(pair_expiring_in(Duration::seconds(30), Duration::days(1))));
        transport.respond(
            REFRESH_PATH,
            200,
            r#"{"access_token":"access-2","access_token_expiration_time":900000}"#,
        );
        transport.respond(FILES_PATH, 200, "[]");

        client.dispatch(ApiRequest::get(FILES_PATH)).await.expect("response");

        let sent = transport.requests();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].path, REFRESH_PATH);
        assert_eq!(sent[1].bearer.as_deref(), Some("access-2"));
    }

    #[tokio::test]
    async fn test_failed_refresh_sends_call_without_credential() {
        let (client, transport) =
            client_with(Some(pair_expiring_in(Duration::seconds(30), Duration::days(1))));
        transport.respond(REFRESH_PATH, 500, "");
        transport.respond(FILES_PATH, 401, "");

        let response = client.dispatch(ApiRequest::get(FILES_PATH)).await.expect("response");

        assert_eq!(response.status, StatusCode::UNAUTHORIZED);
        assert!(transport.requests()[1].bearer.is_none());
        assert_eq!(client.session().current(), SessionState::NotLoggedIn);
    }

    #[tokio::test]
    async fn test_login_then_protected_call_does_not_refresh() {
        let (client, transport) = client_with(None);
        transport.respond(LOGIN_PATH, 200, GRANT);
        transport.respond(FILES_PATH, 200, r#"[{"_id":"f1","filename":"a.pdf","is_signed":true}]"#);

        let user = client.login("ana@example.com", "secret").await.expect("login");
        assert_eq!(user.map(|u| u.id).as_deref(), Some("u1"));
        assert_eq!(client.session().current(), SessionState::LoggedIn);

        let files = client.list_files().await.expect("files");
        assert_eq!(files.len(), 1);
        assert!(files[0].is_signed);

        assert_eq!(transport.calls_to(REFRESH_PATH), 0);
        let sent = transport.requests();
        assert!(sent[0].bearer.is_none());
        assert!(!sent[0].authenticated);
        assert_eq!(sent[1].bearer.as_deref(), Some("access-1"));
    }

    #[tokio::test]
    async fn test_login_with_out_of_range_lifetime_is_rejected() {
        let (client, transport) = client_with(None);
        transport.respond(
            LOGIN_PATH,
            200,
            r#"{"access_token":"a","refresh_token":"r","access_token_expiration_time":9223372036854775807,"refresh_token_expiration_time":604800000}"#,
        );

        let err = client.login("ana@example.com", "secret").await.expect_err("invalid grant");
        assert!(matches!(
            err.downcast_ref::<ApiError>(),
            Some(ApiError::InvalidResponse(_))
        ));
        assert!(client.store().get().is_none());
        assert_eq!(client.session().current(), SessionState::NotLoggedIn);
    }

    #[tokio::test]
    async fn test_refresh_with_out_of_range_lifetime_logs_out() {
        let (client, transport) =
            client_with(Some(pair_expiring_in(Duration::seconds(30), Duration::days(1))));
        transport.respond(
            REFRESH_PATH,
            200,
            r#"{"access_token":"access-2","access_token_expiration_time":9223372036854775807}"#,
        );
        transport.respond(FILES_PATH, 401, r#"{"error":"Token is missing"}"#);

        let response = client.dispatch(ApiRequest::get(FILES_PATH)).await.expect("response");
        assert_eq!(response.status.as_u16(), 401);
        assert!(client.store().get().is_none());
        assert_eq!(client.session().current(), SessionState::NotLoggedIn);
        assert!(transport.requests()[1].bearer.is_none());
    }

    #[tokio::test]
    async fn test_rejected_login_does_not_touch_session() {
        let pair = pair_expiring_in(Duration::minutes(10), Duration::days(1));
        let (client, transport) = client_with(Some(pair.clone()));
        transport.respond(LOGIN_PATH, 401, r#"{"error":"Invalid credentials"}"#);

        let err = client.login("ana@example.com", "wrong").await.expect_err("rejected");
        assert!(matches!(err.downcast_ref::<ApiError>(), Some(ApiError::Unauthorized)));
        assert_eq!(client.store().get(), Some(pair));
        assert_eq!(client.session().current(), SessionState::LoggedIn);
    }

    #[tokio::test]
    async fn test_register_starts_session() {
        let (client, transport) = client_with(None);
        transport.respond(REGISTER_PATH, 201, GRANT);

        client
            .register("ana@example.com", "secret", Some("Ana"))
            .await
            .expect("register");

        let sent = &transport.requests()[0];
        let crate::api::RequestBody::Json(ref body) = sent.body else {
            panic!("expected JSON body");
        };
        assert_eq!(body["name"], "Ana");
        assert_eq!(client.store().access_token().as_deref(), Some("access-1"));
        assert!(client.session().current().is_logged_in());
    }

    #[tokio::test]
    async fn test_logout_clears_state_when_server_unreachable() {
        let (client, transport) =
            client_with(Some(pair_expiring_in(Duration::minutes(10), Duration::days(1))));
        transport.fail(LOGOUT_PATH, "connection refused");

        client.logout().await;

        assert!(client.store().get().is_none());
        assert_eq!(client.session().current(), SessionState::NotLoggedIn);
        let sent = transport.requests();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].bearer.as_deref(), Some("access-1"));
    }

    #[tokio::test]
    async fn test_upload_sends_sign_flag() {
        let (client, transport) =
            client_with(Some(pair_expiring_in(Duration::minutes(10), Duration::days(1))));
        transport.respond(UPLOAD_PATH, 201, r#"{"_id":"f9","filename":"a.pdf","is_signed":true}"#);

        let uploaded = client.upload_file("a.pdf", b"%PDF".to_vec(), true).await.expect("upload");
        assert_eq!(uploaded.id.as_deref(), Some("f9"));

        let sent = &transport.requests()[0];
        let crate::api::RequestBody::Multipart(ref parts) = sent.body else {
            panic!("expected multipart body");
        };
        assert_eq!(parts.len(), 2);
        assert!(matches!(&parts[1], FormPart::Text { name, value } if name == "sign" && value == "true"));
    }

    #[tokio::test]
    async fn test_download_falls_back_to_generated_name() {
        let (client, transport) =
            client_with(Some(pair_expiring_in(Duration::minutes(10), Duration::days(1))));
        transport.respond("files/f1/download", 200, "contents");

        let file = client.download_file("f1").await.expect("download");
        assert_eq!(file.filename, "file-f1");
        assert_eq!(file.bytes, b"contents");
    }

    #[tokio::test]
    async fn test_verify_yields_verdicts() {
        let (client, transport) =
            client_with(Some(pair_expiring_in(Duration::minutes(10), Duration::days(1))));
        transport.respond(VERIFY_PATH, 200, r#"{"is_valid":true,"message":"ok"}"#);
        let verdict = client.verify_file("a.pdf", b"x".to_vec()).await;
        assert!(verdict.is_verified);
        assert_eq!(verdict.message, "ok");

        let (client, transport) =
            client_with(Some(pair_expiring_in(Duration::minutes(10), Duration::days(1))));
        transport.respond(VERIFY_PATH, 400, r#"{"error":"not signed"}"#);
        let verdict = client.verify_file("b.pdf", b"y".to_vec()).await;
        assert!(!verdict.is_verified);
        assert_eq!(verdict.message, "not signed");
        // content-level result, not a session failure
        assert!(client.session().current().is_logged_in());
    }

    #[tokio::test]
    async fn test_verify_401_ends_session_and_reports_unsigned() {
        let (client, transport) =
            client_with(Some(pair_expiring_in(Duration::minutes(10), Duration::days(1))));
        transport.respond(VERIFY_PATH, 401, "");

        let verdict = client.verify_file("a.pdf", b"x".to_vec()).await;
        assert_eq!(
            verdict.kind,
            VerdictKind::PresumedUnsigned(UnsignedCause::ServerRejected(401))
        );
        assert_eq!(client.session().current(), SessionState::NotLoggedIn);
    }

    #[tokio::test]
    async fn test_concurrent_calls_near_expiry_both_succeed() {
        let (client, transport) =
            client_with(Some(pair_expiring_in(Duration::seconds(30), Duration::days(1))));
        transport.respond(
            REFRESH_PATH,
            200,
            r#"{"access_token":"access-2","access_token_expiration_time":900000}"#,
        );
        transport.respond(VERIFY_PATH, 200, r#"{"is_valid":false}"#);

        let verdicts = futures::future::join_all([
            client.verify_file("a.pdf", b"a".to_vec()),
            client.verify_file("b.pdf", b"b".to_vec()),
        ])
        .await;

        assert!(verdicts.iter().all(|v| !v.is_verified && v.kind == VerdictKind::Invalid));
        assert!(transport.calls_to(REFRESH_PATH) >= 1);
        assert_eq!(client.store().access_token().as_deref(), Some("access-2"));
        assert!(client.session().current().is_logged_in());
    }
}
