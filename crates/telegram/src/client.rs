use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use thiserror::Error;

use kodbook_core::config::TelegramConfig;

use crate::keyboard::{KeyboardError, SendMessageRequest};
use crate::polling::{TransportError, UpdateSource};
use crate::updates::Update;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("http request failed: {0}")]
    Http(String),
    #[error("bot api rejected `{method}` ({code}): {description}")]
    Api { method: &'static str, code: i64, description: String },
    #[error(transparent)]
    Keyboard(#[from] KeyboardError),
}

impl From<reqwest::Error> for ClientError {
    // The request URL embeds the bot token.
    fn from(error: reqwest::Error) -> Self {
        Self::Http(error.without_url().to_string())
    }
}

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    #[serde(default)]
    error_code: Option<i64>,
    #[serde(default)]
    description: Option<String>,
}

impl<T> ApiResponse<T> {
    fn into_result(self, method: &'static str) -> Result<T, ClientError> {
        match (self.ok, self.result) {
            (true, Some(result)) => Ok(result),
            (_, _) => Err(ClientError::Api {
                method,
                code: self.error_code.unwrap_or_default(),
                description: self.description.unwrap_or_else(|| "missing result".to_owned()),
            }),
        }
    }
}

#[derive(Debug, Serialize)]
struct GetUpdatesRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    offset: Option<i64>,
    timeout: u64,
    allowed_updates: &'a [&'a str],
}

#[derive(Debug, Serialize)]
struct AnswerCallbackQueryRequest<'a> {
    callback_query_id: &'a str,
}

#[derive(Debug, Deserialize)]
pub struct BotIdentity {
    pub id: i64,
    #[serde(default)]
    pub username: Option<String>,
}

pub struct BotApiClient {
    http: reqwest::Client,
    base_url: String,
    token: SecretString,
    poll_timeout_secs: u64,
}

impl BotApiClient {
    pub fn new(config: &TelegramConfig) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.poll_timeout_secs + 10))
            .build()?;

        Ok(Self {
            http,
            base_url: config.api_base_url.trim_end_matches('/').to_owned(),
            token: config.bot_token.clone(),
            poll_timeout_secs: config.poll_timeout_secs,
        })
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/bot{}/{method}", self.base_url, self.token.expose_secret())
    }

    async fn call<Req, Resp>(
        &self,
        method: &'static str,
        request: &Req,
    ) -> Result<Resp, ClientError>
    where
        Req: Serialize + Sync,
        Resp: DeserializeOwned,
    {
        let response: ApiResponse<Resp> =
            self.http.post(self.method_url(method)).json(request).send().await?.json().await?;
        response.into_result(method)
    }

    pub async fn get_me(&self) -> Result<BotIdentity, ClientError> {
        self.call("getMe", &serde_json::json!({})).await
    }

    pub async fn get_updates(&self, offset: Option<i64>) -> Result<Vec<Update>, ClientError> {
        let request = GetUpdatesRequest {
            offset,
            timeout: self.poll_timeout_secs,
            allowed_updates: &["message", "callback_query"],
        };
        self.call("getUpdates", &request).await
    }

    pub async fn post_message(&self, request: &SendMessageRequest) -> Result<(), ClientError> {
        let _sent: serde_json::Value = self.call("sendMessage", request).await?;
        Ok(())
    }

    pub async fn answer_callback_query(&self, callback_query_id: &str) -> Result<(), ClientError> {
        let _answered: bool = self
            .call("answerCallbackQuery", &AnswerCallbackQueryRequest { callback_query_id })
            .await?;
        Ok(())
    }
}

#[async_trait]
impl UpdateSource for BotApiClient {
    async fn fetch_updates(
        &self,
        offset: Option<i64>,
    ) -> Result<Option<Vec<Update>>, TransportError> {
        self.get_updates(offset)
            .await
            .map(Some)
            .map_err(|error| TransportError::Poll(error.to_string()))
    }

    async fn answer_callback(&self, callback_query_id: &str) -> Result<(), TransportError> {
        self.answer_callback_query(callback_query_id)
            .await
            .map_err(|error| TransportError::Answer(error.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use secrecy::SecretString;

    use kodbook_core::config::TelegramConfig;

    use super::{ApiResponse, BotApiClient, BotIdentity, ClientError};
    use crate::updates::Update;

    fn config() -> TelegramConfig {
        TelegramConfig {
            bot_token: SecretString::from("123456:abc-secret".to_owned()),
            api_base_url: "https://api.telegram.org/".to_owned(),
            poll_timeout_secs: 25,
        }
    }

    #[test]
    fn method_url_joins_base_token_and_method() {
        let client = BotApiClient::new(&config()).expect("client");

        assert_eq!(
            client.method_url("getUpdates"),
            "https://api.telegram.org/bot123456:abc-secret/getUpdates"
        );
    }

    #[test]
    fn successful_envelope_yields_result() {
        let response: ApiResponse<Vec<Update>> = serde_json::from_str(
            r#"{"ok": true, "result": [{"update_id": 1, "message": {"message_id": 1, "chat": {"id": 2}, "text": "x"}}]}"#,
        )
        .expect("json");

        let updates = response.into_result("getUpdates").expect("updates");
        assert_eq!(updates.len(), 1);
    }

    #[test]
    fn envelope_decodes_result_types_without_default() {
        let identified: ApiResponse<BotIdentity> = serde_json::from_str(
            r#"{"ok": true, "result": {"id": 42, "username": "kodbook_bot"}}"#,
        )
        .expect("json");
        let identity = identified.into_result("getMe").expect("identity");
        assert_eq!(identity.id, 42);
        assert_eq!(identity.username.as_deref(), Some("kodbook_bot"));

        let empty: ApiResponse<BotIdentity> =
            serde_json::from_str(r#"{"ok": true}"#).expect("json without result");
        let error = empty.into_result("getMe").expect_err("missing result");
        assert_eq!(error.to_string(), "bot api rejected `getMe` (0): missing result");
    }

    #[test]
    fn rejected_envelope_names_the_method() {
        let response: ApiResponse<serde_json::Value> = serde_json::from_str(
            r#"{"ok": false, "error_code": 403, "description": "Forbidden: bot was blocked by the user"}"#,
        )
        .expect("json");

        let error = response.into_result("sendMessage").expect_err("rejected");
        assert!(matches!(error, ClientError::Api { code: 403, .. }));
        assert_eq!(
            error.to_string(),
            "bot api rejected `sendMessage` (403): Forbidden: bot was blocked by the user"
        );
    }
}
