//! Neon CRM client.
//!
//! Lists accounts page by page and assembles one [`Account`] per member from
//! its detail, membership and event-registration resources.

pub mod payload;

use std::sync::Arc;

use members::{Account, EventDetails, EventRegistration, Membership};
use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderValue};
use serde::Serialize;
use serde_json::{Value, json};
use tracing::{debug, warn};

use crate::api::{ApiClient, ApiError, ApiRequest, HttpTransport, Paginator};
use crate::config::{ConfigError, NeonConfig, PullConfig};

pub use payload::{AccountSummary, PayloadError, RegistrationRow};

/// Operators accepted by `POST /v2/accounts/search`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SearchOperator {
    Equal,
    NotEqual,
    Blank,
    NotBlank,
    GreaterThan,
    LessThan,
    Contain,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchField {
    pub field: String,
    pub operator: SearchOperator,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

impl SearchField {
    pub fn new(field: impl Into<String>, operator: SearchOperator) -> Self {
        Self {
            field: field.into(),
            operator,
            value: None,
        }
    }

    pub fn value(mut self, value: impl Into<String>) -> Self {
        self.value = Some(value.into());
        self
    }
}

/// Which accounts to walk.
#[derive(Debug, Clone, PartialEq)]
pub enum AccountQuery {
    /// `GET /v2/accounts` filtered by user type.
    List { user_type: String },
    /// `POST /v2/accounts/search` with server-side filters.
    Search {
        search_fields: Vec<SearchField>,
        output_fields: Vec<String>,
    },
}

impl AccountQuery {
    /// Every individual account holder.
    pub fn individuals() -> Self {
        AccountQuery::List {
            user_type: "INDIVIDUAL".to_string(),
        }
    }

    /// Individual accounts with at least one membership enrollment.
    pub fn members() -> Self {
        AccountQuery::Search {
            search_fields: vec![
                SearchField::new("Account Type", SearchOperator::Equal).value("Individual"),
                SearchField::new("First Membership Enrollment Date", SearchOperator::NotBlank),
            ],
            output_fields: vec![
                "Account ID".to_string(),
                "Account Current Membership Status".to_string(),
            ],
        }
    }

    fn request(&self) -> (ApiRequest, &'static str) {
        match self {
            AccountQuery::List { user_type } => (
                ApiRequest::get("/v2/accounts").query("userType", user_type),
                "accounts",
            ),
            AccountQuery::Search {
                search_fields,
                output_fields,
            } => (
                ApiRequest::post_json(
                    "/v2/accounts/search",
                    json!({ "searchFields": search_fields, "outputFields": output_fields }),
                ),
                "searchResults",
            ),
        }
    }
}

#[derive(Clone)]
pub struct NeonClient {
    api: ApiClient,
    page_size: u32,
}

impl NeonClient {
    pub fn new(api: ApiClient, page_size: u32) -> Self {
        Self {
            api,
            page_size: page_size.max(1),
        }
    }

    /// Builds a client authenticated with the configured API user and key.
    pub fn from_config(config: &PullConfig) -> Result<Self, ConfigError> {
        let NeonConfig {
            base_url,
            api_user,
            api_key,
        } = &config.neon;
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let transport = HttpTransport::new(base_url.clone(), headers, config.request_timeout)
            .map_err(ConfigError::Client)?
            .with_basic_auth(api_user.clone(), api_key.clone());
        Ok(Self::new(
            ApiClient::new(Arc::new(transport), config.retry),
            config.page_size,
        ))
    }

    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    /// Account summary pages for `query`. Items are raw rows; see
    /// [`payload::parse_account_summary`].
    pub fn account_pages(&self, query: &AccountQuery) -> Paginator<Value> {
        let (request, results_key) = query.request();
        self.api.paginate(request, results_key, self.page_size)
    }

    /// Assembles one account.
    ///
    /// Fails only when the account detail itself is unavailable. Memberships
    /// and registrations are fetched together; either failing leaves that
    /// part absent without affecting the other.
    pub async fn account(&self, summary: &AccountSummary) -> Result<Account, ApiError> {
        let id = summary.id.as_str();
        let path = format!("/v2/accounts/{id}");
        let detail: Value = self.api.fetch(&ApiRequest::get(path.as_str())).await?;
        let mut profile =
            payload::parse_account_detail(id, &detail).map_err(|e| ApiError::Malformed {
                path,
                reason: e.to_string(),
            })?;
        profile.current_membership_status = summary.current_membership_status;

        let (memberships, registrations) =
            tokio::join!(self.memberships(id), self.event_registrations(id));

        let memberships = memberships
            .inspect_err(|e| warn!(account_id = id, error = %e, "memberships unavailable"))
            .ok();
        let registrations = registrations
            .inspect_err(|e| warn!(account_id = id, error = %e, "event registrations unavailable"))
            .ok();

        debug!(
            account_id = id,
            memberships = memberships.as_ref().map(Vec::len),
            registrations = registrations.as_ref().map(Vec::len),
            "assembled account"
        );
        Ok(Account::new(id, profile, memberships, registrations))
    }

    /// All membership terms of an account, oldest first.
    pub async fn memberships(&self, account_id: &str) -> Result<Vec<Membership>, ApiError> {
        let request = ApiRequest::get(format!("/v2/accounts/{account_id}/memberships"))
            .query("sortColumn", "date")
            .query("sortDirection", "ASC");
        let rows: Vec<Value> = self
            .api
            .paginate(request, "memberships", self.page_size)
            .collect_items()
            .await?;

        Ok(rows
            .iter()
            .filter_map(|row| {
                payload::parse_membership(row)
                    .inspect_err(|e| {
                        warn!(account_id, error = %e, raw = %row, "dropping membership row")
                    })
                    .ok()
            })
            .collect())
    }

    /// All event registrations of an account, each enriched with its event.
    ///
    /// A failed event lookup leaves that registration without enrichment.
    pub async fn event_registrations(
        &self,
        account_id: &str,
    ) -> Result<Vec<EventRegistration>, ApiError> {
        let request = ApiRequest::get(format!("/v2/accounts/{account_id}/eventRegistrations"))
            .query("sortColumn", "registrationDateTime")
            .query("sortDirection", "ASC");
        let rows: Vec<Value> = self
            .api
            .paginate(request, "eventRegistrations", self.page_size)
            .collect_items()
            .await?;

        let mut registrations = Vec::with_capacity(rows.len());
        for raw in &rows {
            let row = match payload::parse_registration(raw) {
                Ok(row) => row,
                Err(e) => {
                    warn!(account_id, error = %e, raw = %raw, "dropping registration row");
                    continue;
                }
            };

            let event = match self.event(&row.event_id).await {
                Ok(event) => Some(event),
                Err(e) => {
                    warn!(
                        account_id,
                        event_id = %row.event_id,
                        error = %e,
                        "event detail unavailable, keeping bare registration"
                    );
                    None
                }
            };

            match EventRegistration::new(
                row.event_id,
                row.registration_date,
                row.status,
                row.amount,
                event,
            ) {
                Ok(registration) => registrations.push(registration),
                Err(e) => warn!(account_id, error = %e, raw = %raw, "dropping registration row"),
            }
        }
        Ok(registrations)
    }

    /// Name, date and category of one event.
    pub async fn event(&self, event_id: &str) -> Result<EventDetails, ApiError> {
        let path = format!("/v2/events/{event_id}");
        let body: Value = self.api.fetch(&ApiRequest::get(path.as_str())).await?;
        payload::parse_event(&body).map_err(|e| ApiError::Malformed {
            path,
            reason: e.to_string(),
        })
    }
}
