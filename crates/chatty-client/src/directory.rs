use async_trait::async_trait;
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use tracing::{debug, info};
use uuid::Uuid;

use chatty_types::api::{
    LoginRequest, LoginResponse, MeResponse, MessageResponse, PublicKeyResponse, RegisterRequest,
    RegisterResponse, UpdatePublicKeyRequest, UploadResponse, UserSummary, WireBundle,
};

use crate::config::ClientConfig;
use crate::error::{ClientError, Result};

/// Where public keys are published and looked up.
#[async_trait]
pub trait PublicKeyDirectory: Send + Sync {
    /// PEM public key of `user_id`. An unknown user or a user without a key
    /// is `NotFound`.
    async fn fetch_public_key(&self, user_id: Uuid) -> Result<String>;

    /// Replace the caller's published key.
    async fn publish_public_key(&self, public_key_pem: &str) -> Result<()>;
}

/// Opaque storage for encrypted attachment bodies.
#[async_trait]
pub trait FileTransfer: Send + Sync {
    /// Store `ciphertext` and return the pointer that later retrieves it.
    async fn upload(&self, ciphertext: Vec<u8>) -> Result<String>;

    async fn download(&self, pointer: &str) -> Result<Vec<u8>>;
}

/// REST client for the relay server.
#[derive(Clone)]
pub struct HttpClient {
    http: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl HttpClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: None,
        }
    }

    pub fn from_config(config: &ClientConfig) -> Self {
        Self::new(config.server_url.clone())
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    /// Create an account. The returned token is kept for later calls.
    pub async fn register(
        &mut self,
        username: &str,
        password: &str,
        public_key_pem: Option<&str>,
    ) -> Result<RegisterResponse> {
        let body = RegisterRequest {
            username: username.to_string(),
            password: password.to_string(),
            public_key: public_key_pem.map(str::to_string),
        };
        let resp = self
            .http
            .post(self.url("/auth/register"))
            .json(&body)
            .send()
            .await?;
        let registered: RegisterResponse = check(resp).await?.json().await?;

        info!("Registered as {}", registered.user_id);
        self.token = Some(registered.token.clone());
        Ok(registered)
    }

    pub async fn login(&mut self, username: &str, password: &str) -> Result<LoginResponse> {
        let body = LoginRequest {
            username: username.to_string(),
            password: password.to_string(),
        };
        let resp = self
            .http
            .post(self.url("/auth/login"))
            .json(&body)
            .send()
            .await?;
        let logged_in: LoginResponse = check(resp).await?.json().await?;

        info!("Logged in as {}", logged_in.username);
        self.token = Some(logged_in.token.clone());
        Ok(logged_in)
    }

    /// Identity behind the current token. Fails when the token is missing,
    /// expired or belongs to a deleted account.
    pub async fn me(&self) -> Result<MeResponse> {
        let resp = self.authed(Method::GET, "/auth/me")?.send().await?;
        Ok(check(resp).await?.json().await?)
    }

    pub async fn users(&self) -> Result<Vec<UserSummary>> {
        let resp = self.authed(Method::GET, "/users")?.send().await?;
        Ok(check(resp).await?.json().await?)
    }

    /// Post an encoded bundle. The server validates the bundle shape before
    /// storing it.
    pub async fn send_bundle(
        &self,
        receiver_id: Uuid,
        bundle: &WireBundle,
    ) -> Result<MessageResponse> {
        let resp = self
            .authed(Method::POST, &format!("/messages/{}", receiver_id))?
            .json(bundle)
            .send()
            .await?;
        let stored: MessageResponse = check(resp).await?.json().await?;

        debug!("Message {} delivered to {}", stored.id, receiver_id);
        Ok(stored)
    }

    /// Conversation with `other_id`, oldest first.
    pub async fn conversation(
        &self,
        other_id: Uuid,
        limit: Option<u32>,
    ) -> Result<Vec<MessageResponse>> {
        let mut req = self.authed(Method::GET, &format!("/messages/{}", other_id))?;
        if let Some(limit) = limit {
            req = req.query(&[("limit", limit)]);
        }
        let resp = req.send().await?;
        Ok(check(resp).await?.json().await?)
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn authed(&self, method: Method, path: &str) -> Result<RequestBuilder> {
        let token = self
            .token
            .as_deref()
            .ok_or_else(|| ClientError::Transport("not logged in".into()))?;
        Ok(self.http.request(method, self.url(path)).bearer_auth(token))
    }
}

#[async_trait]
impl PublicKeyDirectory for HttpClient {
    async fn fetch_public_key(&self, user_id: Uuid) -> Result<String> {
        let resp = self
            .authed(Method::GET, &format!("/keys/{}", user_id))?
            .send()
            .await?;
        let key: PublicKeyResponse = check(resp).await?.json().await?;
        Ok(key.public_key)
    }

    async fn publish_public_key(&self, public_key_pem: &str) -> Result<()> {
        let body = UpdatePublicKeyRequest {
            public_key: public_key_pem.to_string(),
        };
        let resp = self.authed(Method::PUT, "/keys")?.json(&body).send().await?;
        check(resp).await?;
        info!("Published public key");
        Ok(())
    }
}

#[async_trait]
impl FileTransfer for HttpClient {
    async fn upload(&self, ciphertext: Vec<u8>) -> Result<String> {
        let size = ciphertext.len();
        let resp = self
            .authed(Method::POST, "/files")?
            .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
            .body(ciphertext)
            .send()
            .await?;
        let uploaded: UploadResponse = check(resp).await?.json().await?;

        debug!("Uploaded {} encrypted bytes as {}", size, uploaded.file_id);
        Ok(uploaded.file_id)
    }

    async fn download(&self, pointer: &str) -> Result<Vec<u8>> {
        let resp = self
            .authed(Method::GET, &format!("/files/{}", pointer))?
            .send()
            .await?;
        let bytes = check(resp).await?.bytes().await?;
        Ok(bytes.to_vec())
    }
}

async fn check(resp: Response) -> Result<Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }

    let url = resp.url().path().to_string();
    match status {
        StatusCode::NOT_FOUND => Err(ClientError::NotFound(url)),
        _ => Err(ClientError::Transport(format!("{} returned {}", url, status))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_trailing_slash_is_trimmed() {
        let client = HttpClient::new("http://localhost:5001/");
        assert_eq!(client.url("/users"), "http://localhost:5001/users");
    }

    #[test]
    fn token_is_attached_by_with_token() {
        let client = HttpClient::new("http://localhost:5001").with_token("jwt");
        assert_eq!(client.token(), Some("jwt"));
    }

    #[tokio::test]
    async fn authed_calls_without_token_fail_before_sending() {
        let client = HttpClient::new("http://127.0.0.1:9");

        let err = client.fetch_public_key(Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, ClientError::Transport(ref m) if m.contains("not logged in")));

        let err = client.me().await.unwrap_err();
        assert!(matches!(err, ClientError::Transport(ref m) if m.contains("not logged in")));
    }
}
