use super::{FeedbackPatch, NewMessage, NewSession, RemoteStore, SessionPatch};
use crate::error::{AppError, Result};
use crate::model::{
    FeedbackScores, Message, MessageFeedback, MessageId, OwnerId, Session, SessionId,
};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, error};

const FEEDBACK_COLUMNS: &str =
    "pronunciation_score,accuracy_score,fluency_score,completeness_score";

/// Error body returned by PostgREST
#[derive(Debug, Deserialize)]
struct PostgrestError {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

/// Backend reached over a PostgREST-style HTTP API.
///
/// Session timestamps (`last_message_at`, `last_accessed_at`) are maintained
/// by database triggers; this client never sends them.
pub struct RestStore {
    client: Client,
    base_url: String,
    api_key: String,
    access_token: Option<String>,
    owner: Option<OwnerId>,
}

impl RestStore {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            access_token: None,
            owner: None,
        }
    }

    /// Attach the signed-in user's token and id
    pub fn with_auth(mut self, access_token: impl Into<String>, owner: OwnerId) -> Self {
        self.access_token = Some(access_token.into());
        self.owner = Some(owner);
        self
    }

    /// URL of a table (or `rpc/...`) endpoint
    pub fn endpoint(&self, path: &str) -> String {
        format!("{}/rest/v1/{}", self.base_url, path)
    }

    fn request(&self, method: reqwest::Method, path: &str) -> RequestBuilder {
        let bearer = self.access_token.as_deref().unwrap_or(&self.api_key);
        self.client
            .request(method, self.endpoint(path))
            .header("apikey", &self.api_key)
            .bearer_auth(bearer)
    }

    async fn send<T: DeserializeOwned>(&self, op: &str, request: RequestBuilder) -> Result<T> {
        debug!("REST {}", op);
        let response = request.send().await.map_err(classify_transport)?;
        let response = check_status(op, response).await?;
        response
            .json::<T>()
            .await
            .map_err(|e| AppError::query(format!("{}: undecodable response: {}", op, e)))
    }

    /// Insert/update returning exactly one representation row
    async fn send_single<T: DeserializeOwned>(
        &self,
        op: &str,
        request: RequestBuilder,
    ) -> Result<T> {
        let rows: Vec<T> = self
            .send(op, request.header("Prefer", "return=representation"))
            .await?;
        rows.into_iter()
            .next()
            .ok_or_else(|| AppError::query(format!("{}: no row returned", op)))
    }
}

fn classify_transport(e: reqwest::Error) -> AppError {
    if e.is_connect() || e.is_timeout() {
        AppError::connection(e.to_string())
    } else if e.is_decode() {
        AppError::query(e.to_string())
    } else {
        AppError::Unknown(e.to_string())
    }
}

/// Map a non-success response into the error taxonomy
pub(crate) fn classify_response(status: StatusCode, body: &str) -> AppError {
    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        return AppError::AuthRequired(format!("backend returned {}", status));
    }

    match serde_json::from_str::<PostgrestError>(body) {
        Ok(PostgrestError {
            code: Some(code),
            message,
        }) => AppError::from_postgres_code(&code, message.unwrap_or_else(|| body.to_string())),
        _ if status.is_server_error() => {
            AppError::connection(format!("backend returned {}", status))
        }
        _ => AppError::query(format!("backend returned {}: {}", status, body)),
    }
}

async fn check_status(op: &str, response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let error = classify_response(status, &body);
    error!("REST {} failed: {}", op, error);
    Err(error)
}

#[derive(Serialize)]
struct SessionInsert<'a> {
    user_id: &'a OwnerId,
    #[serde(flatten)]
    input: &'a NewSession,
}

#[async_trait::async_trait]
impl RemoteStore for RestStore {
    fn current_owner(&self) -> Option<OwnerId> {
        self.owner.clone()
    }

    async fn create_session(&self, owner_id: &OwnerId, input: NewSession) -> Result<Session> {
        input.validate()?;
        let body = SessionInsert {
            user_id: owner_id,
            input: &input,
        };
        self.send_single(
            "create_session",
            self.request(reqwest::Method::POST, "sessions").json(&body),
        )
        .await
    }

    async fn list_sessions(&self, owner_id: &OwnerId) -> Result<Vec<Session>> {
        let request = self.request(reqwest::Method::GET, "sessions").query(&[
            ("select", "*".to_string()),
            ("user_id", format!("eq.{}", owner_id)),
            ("order", "last_accessed_at.desc".to_string()),
        ]);
        self.send("list_sessions", request).await
    }

    async fn get_session(&self, session_id: &SessionId, owner_id: &OwnerId) -> Result<Session> {
        let request = self.request(reqwest::Method::GET, "sessions").query(&[
            ("select", "*".to_string()),
            ("id", format!("eq.{}", session_id)),
            ("user_id", format!("eq.{}", owner_id)),
        ]);
        let rows: Vec<Session> = self.send("get_session", request).await?;
        rows.into_iter()
            .next()
            .ok_or_else(|| AppError::query(format!("session {} not found", session_id)))
    }

    async fn update_session(
        &self,
        session_id: &SessionId,
        owner_id: &OwnerId,
        patch: SessionPatch,
    ) -> Result<Session> {
        patch.validate()?;
        let request = self
            .request(reqwest::Method::PATCH, "sessions")
            .query(&[
                ("id", format!("eq.{}", session_id)),
                ("user_id", format!("eq.{}", owner_id)),
            ])
            .json(&patch);
        self.send_single("update_session", request).await
    }

    async fn create_message(
        &self,
        session_id: &SessionId,
        author_id: &OwnerId,
        input: NewMessage,
    ) -> Result<Message> {
        input.validate()?;
        let body = json!({
            "session_id": session_id,
            "user_id": author_id,
            "content": input.content,
            "type": input.kind,
            "translation": input.translation,
        });
        let mut message: Message = self
            .send_single(
                "create_message",
                self.request(reqwest::Method::POST, "messages").json(&body),
            )
            .await?;

        if let Some(scores) = input.feedback {
            let feedback = self.add_feedback(&message.id, scores).await?;
            message.feedback = Some(feedback.scores);
        }

        Ok(message)
    }

    async fn list_messages(&self, session_id: &SessionId) -> Result<Vec<Message>> {
        let request = self.request(reqwest::Method::GET, "messages").query(&[
            ("select", format!("*,message_feedback({})", FEEDBACK_COLUMNS)),
            ("session_id", format!("eq.{}", session_id)),
            ("order", "sequence_number.asc".to_string()),
        ]);
        self.send("list_messages", request).await
    }

    async fn add_feedback(
        &self,
        message_id: &MessageId,
        scores: FeedbackScores,
    ) -> Result<MessageFeedback> {
        scores.validate()?;
        let body = MessageFeedback {
            message_id: message_id.clone(),
            scores,
        };
        self.send_single(
            "add_feedback",
            self.request(reqwest::Method::POST, "message_feedback")
                .json(&body),
        )
        .await
    }

    async fn update_feedback(
        &self,
        message_id: &MessageId,
        patch: FeedbackPatch,
    ) -> Result<MessageFeedback> {
        patch.validate()?;
        let request = self
            .request(reqwest::Method::PATCH, "message_feedback")
            .query(&[("message_id", format!("eq.{}", message_id))])
            .json(&patch);
        self.send_single("update_feedback", request).await
    }
}
