//! Discourse forum client for member participation stats.

use std::sync::Arc;
use std::time::Duration;

use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};
use serde::{Deserialize, Serialize};

use crate::api::{ApiClient, ApiError, ApiRequest, HttpTransport};
use crate::backoff::RetryPolicy;
use crate::config::{ConfigError, DiscourseConfig};

/// Forum participation for one user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForumActivity {
    pub posts: u64,
    pub time_read_seconds: u64,
}

#[derive(Debug, Deserialize)]
struct UserEnvelope {
    user: UserStats,
}

#[derive(Debug, Deserialize)]
struct UserStats {
    #[serde(default)]
    post_count: u64,
    #[serde(default)]
    time_read: u64,
}

#[derive(Clone)]
pub struct DiscourseClient {
    api: ApiClient,
}

impl DiscourseClient {
    pub fn new(api: ApiClient) -> Self {
        Self { api }
    }

    pub fn from_config(
        config: &DiscourseConfig,
        retry: RetryPolicy,
        timeout: Duration,
    ) -> Result<Self, ConfigError> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(
            HeaderName::from_static("api-key"),
            HeaderValue::from_str(&config.api_key)?,
        );
        headers.insert(
            HeaderName::from_static("api-username"),
            HeaderValue::from_str(&config.api_user)?,
        );
        let transport = HttpTransport::new(config.base_url.clone(), headers, timeout)
            .map_err(ConfigError::Client)?;
        Ok(Self::new(ApiClient::new(Arc::new(transport), retry)))
    }

    /// Post count and total reading time of a forum user.
    pub async fn user_activity(&self, forum_user: &str) -> Result<ForumActivity, ApiError> {
        let envelope: UserEnvelope = self
            .api
            .fetch(&ApiRequest::get(format!("/u/{forum_user}.json")))
            .await?;
        Ok(ForumActivity {
            posts: envelope.user.post_count,
            time_read_seconds: envelope.user.time_read,
        })
    }
}
