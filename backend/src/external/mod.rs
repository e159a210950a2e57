pub mod dto;

use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::{Client, StatusCode, Url};

use crate::config::ExternalApiConfig;
use crate::error::AppError;

pub use dto::RoutineEntry;

/// Upstream institutional scheduling system.
#[async_trait]
pub trait ScheduleSource: Send + Sync {
    /// Exchanges the configured credentials for a bearer token.
    async fn get_auth_token(&self) -> Result<String, AppError>;

    /// Full routine list of one calendar day. `None` items are null entries
    /// in the upstream list; they are kept so the validator can reject them.
    /// A rejected token surfaces as [`AppError::TokenExpired`].
    async fn get_routines_of_date(
        &self,
        token: &str,
        date: NaiveDate,
    ) -> Result<Vec<Option<RoutineEntry>>, AppError>;
}

pub struct HttpScheduleSource {
    client: Client,
    config: ExternalApiConfig,
}

impl HttpScheduleSource {
    pub fn new(config: ExternalApiConfig) -> Result<Self, AppError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| AppError::Config(format!("Failed to build http client: {}", e)))?;
        Ok(Self { client, config })
    }
}

/// Upstream expects midnight UTC of the requested day.
pub fn upstream_date(date: NaiveDate) -> String {
    format!("{}T00:00:00Z", date.format("%Y-%m-%d"))
}

fn transport_error(context: &str, e: reqwest::Error) -> AppError {
    if e.is_timeout() {
        AppError::ExternalService(format!("{}: request timed out", context))
    } else {
        AppError::ExternalService(format!("{}: {}", context, e))
    }
}

#[async_trait]
impl ScheduleSource for HttpScheduleSource {
    async fn get_auth_token(&self) -> Result<String, AppError> {
        let url = Url::parse_with_params(
            &self.config.auth_url,
            &[
                ("username", self.config.username.as_str()),
                ("password", self.config.password.as_str()),
                ("grant_type", "password"),
            ],
        )
        .map_err(|e| AppError::Config(format!("AUTH_BASE_URL is not a valid url: {}", e)))?;

        let response = self.client
            .post(url)
            .header("Content-Type", "application/x-www-form-urlencoded")
            .header("Origin", &self.config.origin)
            .header("Authorization", &self.config.basic_auth)
            .send()
            .await
            .map_err(|e| transport_error("auth token request failed", e))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::ExternalService(format!("Auth API error {}: {}", status, body)));
        }

        let parsed: dto::TokenResponse = response
            .json()
            .await
            .map_err(|e| AppError::ExternalService(format!("Failed to parse auth response: {}", e)))?;

        parsed
            .access_token
            .filter(|t| !t.is_empty())
            .ok_or_else(|| AppError::ExternalService("Auth response carried no access_token".to_string()))
    }

    async fn get_routines_of_date(
        &self,
        token: &str,
        date: NaiveDate,
    ) -> Result<Vec<Option<RoutineEntry>>, AppError> {
        let request_body = dto::RoutineListRequest {
            teacher_dto: dto::TeacherFilter { id: None },
            date_of: upstream_date(date),
        };

        let response = self.client
            .post(&self.config.routine_url)
            .header("Authorization", format!("Bearer {}", token))
            .header("Origin", &self.config.origin)
            .json(&request_body)
            .send()
            .await
            .map_err(|e| transport_error("routine request failed", e))?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED {
            return Err(AppError::TokenExpired);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::ExternalService(format!("Routine API error {}: {}", status, body)));
        }

        let body_text = response
            .text()
            .await
            .map_err(|e| transport_error("reading routine response failed", e))?;

        let parsed: dto::RoutineListResponse = serde_json::from_str(&body_text).map_err(|e| {
            tracing::error!("Failed to parse: {}", e);
            AppError::ExternalService(format!("Failed to parse routine response: {}", e))
        })?;

        parsed
            .list
            .ok_or_else(|| AppError::ExternalService("Routine response has no list".to_string()))
    }
}

/// Source that never returns anything; used when running without upstream credentials.
pub struct NoopScheduleSource;

#[async_trait]
impl ScheduleSource for NoopScheduleSource {
    async fn get_auth_token(&self) -> Result<String, AppError> {
        Ok(String::new())
    }

    async fn get_routines_of_date(
        &self,
        _token: &str,
        _date: NaiveDate,
    ) -> Result<Vec<Option<RoutineEntry>>, AppError> {
        Ok(Vec::new())
    }
}
