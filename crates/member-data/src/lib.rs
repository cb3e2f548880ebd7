//! Member history retrieval from Neon CRM.
//!
//! This crate walks CRM account listings, assembles each member's
//! memberships and event registrations into a [`members::Account`], and
//! optionally joins forum participation from Discourse. All HTTP goes through
//! [`api::ApiClient`], which retries rate limiting with exponential backoff.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use member_data::prelude::*;
//!
//! let config = PullConfig::from_env()?;
//! let driver = BatchDriver::new(NeonClient::from_config(&config)?, 1);
//! let (accounts, report) = driver.collect(&AccountQuery::members()).await;
//!
//! for account in &accounts {
//!     println!("{} {}", account.id, account.membership_count());
//! }
//! ```

pub mod api;
pub mod backoff;
pub mod batch;
pub mod config;
pub mod discourse;
pub mod neon;

pub mod prelude {
    //! Convenient re-exports for common usage.

    pub use crate::api::{ApiClient, ApiError, ApiRequest, ErrorKind, Paginator, Transport};
    pub use crate::backoff::{Backoff, RetryPolicy, backoff_time};
    pub use crate::batch::{BatchDriver, BatchReport};
    pub use crate::config::{ConfigError, PullConfig};
    pub use crate::discourse::{DiscourseClient, ForumActivity};
    pub use crate::neon::{AccountQuery, AccountSummary, NeonClient};
    pub use members::{Account, DerivedMetrics, EventCategory};
}
