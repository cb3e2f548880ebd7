//! Member history model for survival-analysis datasets.
//!
//! An [`Account`](models::Account) holds one member's contact data plus their
//! membership terms and event registrations; [`metrics`] derives counts,
//! spend and membership periods from it.

pub mod metrics;
pub mod models;

pub use metrics::{ClassCounts, DerivedMetrics, MembershipPeriod, MembershipPeriods};
pub use models::{
    Account, AccountMembershipStatus, Address, EventCategory, EventDetails, EventRegistration,
    EventType, Membership, MembershipType, ModelError, Profile, TransactionStatus,
};
