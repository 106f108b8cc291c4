use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use uuid::Uuid;

use nextext_types::api::{
    ConversationSummary, CurrentUserResponse, ErrorResponse, LoginRequest, LoginResponse,
    RegisterRequest, RegisterResponse, SendMessageRequest, StartChatRequest, StartChatResponse,
};
use nextext_types::models::Message;

use crate::error::ClientError;

/// Session established by [`ApiClient::login`].
#[derive(Debug, Clone)]
struct Session {
    token: String,
    email: String,
}

/// Thin typed wrapper over the HTTP API. Cheap to clone; clones share the
/// connection pool.
#[derive(Debug, Clone)]
pub struct ApiClient {
    http: Client,
    base_url: String,
    session: Option<Session>,
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            http: Client::new(),
            base_url,
            session: None,
        }
    }

    /// Resume a session from a token obtained earlier.
    pub fn with_session(mut self, token: impl Into<String>, email: impl Into<String>) -> Self {
        self.session = Some(Session {
            token: token.into(),
            email: email.into(),
        });
        self
    }

    /// Email of the logged-in user, used to tell own messages apart.
    pub fn email(&self) -> Option<&str> {
        self.session.as_ref().map(|s| s.email.as_str())
    }

    pub async fn register(
        &self,
        name: &str,
        email: &str,
        password: &str,
    ) -> Result<RegisterResponse, ClientError> {
        let body = RegisterRequest {
            name: name.to_string(),
            email: email.to_string(),
            password: password.to_string(),
        };
        let resp = self.http.post(self.url("/register")).json(&body).send().await?;
        read_json(resp).await
    }

    pub async fn login(&mut self, email: &str, password: &str) -> Result<LoginResponse, ClientError> {
        let body = LoginRequest {
            email: email.to_string(),
            password: password.to_string(),
        };
        let resp = self.http.post(self.url("/login")).json(&body).send().await?;
        let login: LoginResponse = read_json(resp).await?;

        self.session = Some(Session {
            token: login.token.clone(),
            email: login.email.clone(),
        });
        Ok(login)
    }

    pub async fn current_user(&self) -> Result<CurrentUserResponse, ClientError> {
        let resp = self.authed(self.http.get(self.url("/user")))?.send().await?;
        read_json(resp).await
    }

    pub async fn start_chat(&self, short_code: &str) -> Result<StartChatResponse, ClientError> {
        let body = StartChatRequest {
            short_code: short_code.to_string(),
        };
        let resp = self
            .authed(self.http.post(self.url("/start-chat")))?
            .json(&body)
            .send()
            .await?;
        read_json(resp).await
    }

    pub async fn conversations(&self) -> Result<Vec<ConversationSummary>, ClientError> {
        let resp = self.authed(self.http.get(self.url("/conversations")))?.send().await?;
        read_json(resp).await
    }

    pub async fn messages(&self, conversation_id: Uuid) -> Result<Vec<Message>, ClientError> {
        let url = self.url(&format!("/messages/{}", conversation_id));
        let resp = self.authed(self.http.get(url))?.send().await?;
        read_json(resp).await
    }

    pub async fn send_message(
        &self,
        conversation_id: Uuid,
        content: &str,
    ) -> Result<Message, ClientError> {
        let url = self.url(&format!("/messages/{}", conversation_id));
        let body = SendMessageRequest {
            content: content.to_string(),
        };
        let resp = self.authed(self.http.post(url))?.json(&body).send().await?;
        read_json(resp).await
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn authed(&self, req: RequestBuilder) -> Result<RequestBuilder, ClientError> {
        let session = self.session.as_ref().ok_or(ClientError::NotLoggedIn)?;
        Ok(req.header("Authorization", format!("Bearer {}", session.token)))
    }
}

async fn read_json<T: DeserializeOwned>(resp: Response) -> Result<T, ClientError> {
    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ErrorResponse>(&body)
            .map(|e| e.error)
            .unwrap_or(body);
        return Err(ClientError::Status { status, message });
    }
    Ok(resp.json().await?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_trailing_slash_is_dropped() {
        let client = ApiClient::new("http://localhost:3000/");
        assert_eq!(client.url("/user"), "http://localhost:3000/user");
    }

    #[tokio::test]
    async fn protected_calls_need_a_session() {
        let client = ApiClient::new("http://127.0.0.1:9");
        assert!(client.email().is_none());
        let err = client.conversations().await.unwrap_err();
        assert!(matches!(err, ClientError::NotLoggedIn));

        let resumed = client.with_session("token", "me@x.com");
        assert_eq!(resumed.email(), Some("me@x.com"));
    }
}
