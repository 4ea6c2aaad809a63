use crate::models::Timeline;
use reqwest::{Client, header::CONTENT_TYPE};
use serde::de::{DeserializeOwned, IgnoredAny};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use thiserror::Error;
use tracing::{debug, warn};
use url::Url;

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("backend request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("backend responded with status {0}")]
    Status(u16),

    #[error("{action} rejected: {message}")]
    Rejected { action: String, message: String },

    #[error("unexpected backend payload: {0}")]
    Decode(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ViewType {
    #[default]
    Daily,
    Monthly,
    Yearly,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub token: String,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub must_change_password: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRecord {
    pub user_id: String,
    pub username: String,
    #[serde(default)]
    pub role: String,
    #[serde(default)]
    pub must_change_password: bool,
}

impl UserRecord {
    pub fn is_admin(&self) -> bool {
        self.role == "admin"
    }
}

#[derive(Deserialize)]
struct UsersPayload {
    #[serde(default)]
    users: Vec<UserRecord>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResetPayload {
    temp_password: String,
}

/// Client for the scripted backend: every call is a POST of
/// `{"action": ..., ...params}` answered by `{"success": bool, ...}`.
#[derive(Clone)]
pub struct BackendClient {
    client: Client,
    endpoint: Url,
}

impl BackendClient {
    pub fn new(endpoint: Url) -> Result<Self, BackendError> {
        let client = Client::builder().build()?;
        Ok(Self { client, endpoint })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    pub async fn login(&self, username: &str, password: &str) -> Result<Session, BackendError> {
        self.call("login", json!({ "username": username, "password": password }))
            .await
    }

    pub async fn logout(&self, token: &str) -> Result<(), BackendError> {
        self.call::<IgnoredAny>("logout", json!({ "token": token }))
            .await
            .map(|_| ())
    }

    pub async fn get_my_profile(&self, token: &str) -> Result<Map<String, Value>, BackendError> {
        let mut profile: Map<String, Value> =
            self.call("getMyProfile", json!({ "token": token })).await?;
        profile.remove("success");
        Ok(profile)
    }

    pub async fn get_my_timeline(
        &self,
        token: &str,
        view: ViewType,
    ) -> Result<Timeline, BackendError> {
        self.call("getMyTimeline", json!({ "token": token, "viewType": view }))
            .await
    }

    pub async fn change_password(
        &self,
        token: &str,
        old_password: &str,
        new_password: &str,
    ) -> Result<(), BackendError> {
        self.call::<IgnoredAny>(
            "changePassword",
            json!({
                "token": token,
                "oldPassword": old_password,
                "newPassword": new_password,
            }),
        )
        .await
        .map(|_| ())
    }

    pub async fn admin_get_users(&self, token: &str) -> Result<Vec<UserRecord>, BackendError> {
        let payload: UsersPayload = self.call("adminGetUsers", json!({ "token": token })).await?;
        Ok(payload.users)
    }

    pub async fn admin_reset_password(
        &self,
        token: &str,
        target_user_id: &str,
    ) -> Result<String, BackendError> {
        let payload: ResetPayload = self
            .call(
                "adminResetPassword",
                json!({ "token": token, "targetUserId": target_user_id }),
            )
            .await?;
        Ok(payload.temp_password)
    }

    async fn call<T: DeserializeOwned>(
        &self,
        action: &str,
        params: Value,
    ) -> Result<T, BackendError> {
        let mut body = match params {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        body.insert("action".to_string(), Value::String(action.to_string()));

        debug!(action, "calling backend");
        // The script endpoint only reads plain-text bodies.
        let response = self
            .client
            .post(self.endpoint.clone())
            .header(CONTENT_TYPE, "text/plain;charset=utf-8")
            .body(serde_json::to_string(&body)?)
            .send()
            .await?;

        if !response.status().is_success() {
            warn!(action, status = %response.status(), "backend returned an error status");
            return Err(BackendError::Status(response.status().as_u16()));
        }

        let payload: Value = response.json().await?;
        if payload.get("success").and_then(Value::as_bool) != Some(true) {
            let message = payload
                .get("error")
                .and_then(Value::as_str)
                .unwrap_or("unknown error")
                .to_string();
            return Err(BackendError::Rejected {
                action: action.to_string(),
                message,
            });
        }

        Ok(serde_json::from_value(payload)?)
    }
}
