//! Member account model.
//!
//! Accounts are assembled once per run from CRM responses and never mutated
//! afterwards. Derived values live in [`crate::metrics`].

use enum_map::Enum;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use time::Date;

#[derive(Debug, Error, PartialEq)]
pub enum ModelError {
    #[error("membership ends ({end}) before it starts ({start})")]
    EndBeforeStart { start: Date, end: Date },
    #[error("negative amount: {0}")]
    NegativeAmount(f64),
}

/// Payment outcome shared by memberships and event registrations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionStatus {
    Succeeded,
    Canceled,
    Refunded,
    Failed,
    Deferred,
    Pending,
}

impl TransactionStatus {
    /// Only succeeded transactions count toward membership and spend.
    pub fn is_succeeded(self) -> bool {
        self == TransactionStatus::Succeeded
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MembershipType {
    #[serde(rename = "MONTH")]
    Monthly,
    #[serde(rename = "YEAR")]
    Annual,
}

impl MembershipType {
    /// Number of monthly units one succeeded term of this type is worth.
    pub fn month_units(self) -> u32 {
        match self {
            MembershipType::Monthly => 1,
            MembershipType::Annual => 12,
        }
    }
}

/// Membership status as reported by the account search output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountMembershipStatus {
    Active,
    Inactive,
    Future,
    Unknown,
}

impl AccountMembershipStatus {
    /// Maps the search output value. Anything unrecognized is `Unknown`.
    pub fn from_remote(value: &str) -> Self {
        match value.trim() {
            "Active" => AccountMembershipStatus::Active,
            "Inactive" => AccountMembershipStatus::Inactive,
            "Future" => AccountMembershipStatus::Future,
            _ => AccountMembershipStatus::Unknown,
        }
    }
}

/// Event category. Authoritative for all class-attendance bucketing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Enum, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum EventCategory {
    Woodworking,
    WoodshopSafety,
    Metalworking,
    Machining,
    Printing3d,
    LaserCutting,
    Electronics,
    Textiles,
    Cnc,
    Miscellaneous,
    Private,
    Orientation,
    SafetyTour,
    MentorSeries,
    ToolSharpening,
    None,
}

impl EventCategory {
    pub const ALL: [EventCategory; 16] = [
        EventCategory::Woodworking,
        EventCategory::WoodshopSafety,
        EventCategory::Metalworking,
        EventCategory::Machining,
        EventCategory::Printing3d,
        EventCategory::LaserCutting,
        EventCategory::Electronics,
        EventCategory::Textiles,
        EventCategory::Cnc,
        EventCategory::Miscellaneous,
        EventCategory::Private,
        EventCategory::Orientation,
        EventCategory::SafetyTour,
        EventCategory::MentorSeries,
        EventCategory::ToolSharpening,
        EventCategory::None,
    ];

    /// Maps a CRM category name. Unrecognized names fall back to `None`.
    pub fn from_remote(name: &str) -> Self {
        match name {
            "Woodworking" => EventCategory::Woodworking,
            "Woodshop Safety" => EventCategory::WoodshopSafety,
            "Metalworking" => EventCategory::Metalworking,
            "Machining" => EventCategory::Machining,
            "_3D Printing" => EventCategory::Printing3d,
            "Laser Cutting" => EventCategory::LaserCutting,
            "Electronics" => EventCategory::Electronics,
            "Textiles" => EventCategory::Textiles,
            "CNC Router" => EventCategory::Cnc,
            "Miscellaneous" => EventCategory::Miscellaneous,
            "Private" => EventCategory::Private,
            "Orientation" => EventCategory::Orientation,
            "Facility and Safety Tour" => EventCategory::SafetyTour,
            "Woodshop Mentor Series" => EventCategory::MentorSeries,
            "Tool Sharpening" => EventCategory::ToolSharpening,
            _ => EventCategory::None,
        }
    }

    /// The category name as the CRM spells it.
    pub fn as_remote(self) -> &'static str {
        match self {
            EventCategory::Woodworking => "Woodworking",
            EventCategory::WoodshopSafety => "Woodshop Safety",
            EventCategory::Metalworking => "Metalworking",
            EventCategory::Machining => "Machining",
            EventCategory::Printing3d => "_3D Printing",
            EventCategory::LaserCutting => "Laser Cutting",
            EventCategory::Electronics => "Electronics",
            EventCategory::Textiles => "Textiles",
            EventCategory::Cnc => "CNC Router",
            EventCategory::Miscellaneous => "Miscellaneous",
            EventCategory::Private => "Private",
            EventCategory::Orientation => "Orientation",
            EventCategory::SafetyTour => "Facility and Safety Tour",
            EventCategory::MentorSeries => "Woodshop Mentor Series",
            EventCategory::ToolSharpening => "Tool Sharpening",
            EventCategory::None => "None",
        }
    }
}

impl From<String> for EventCategory {
    fn from(value: String) -> Self {
        EventCategory::from_remote(&value)
    }
}

impl From<EventCategory> for String {
    fn from(value: EventCategory) -> Self {
        value.as_remote().to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventType {
    pub name: String,
    pub category: EventCategory,
}

impl EventType {
    /// Builds an event type from a raw event title, dropping the
    /// `" w/ <instructor>"` suffix.
    pub fn from_title(title: &str, category: EventCategory) -> Self {
        let name = title.split(" w/").next().unwrap_or(title).trim_end();
        Self {
            name: name.to_string(),
            category,
        }
    }
}

/// Event detail resolved for a registration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventDetails {
    pub event_type: EventType,
    pub event_date: Date,
}

/// One paid term of facility access.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "MembershipRecord")]
pub struct Membership {
    pub price: f64,
    pub start_date: Date,
    pub end_date: Date,
    pub status: TransactionStatus,
    pub membership_type: MembershipType,
}

/// Unvalidated [`Membership`] fields.
#[derive(Deserialize)]
struct MembershipRecord {
    price: f64,
    start_date: Date,
    end_date: Date,
    status: TransactionStatus,
    membership_type: MembershipType,
}

impl TryFrom<MembershipRecord> for Membership {
    type Error = ModelError;

    fn try_from(r: MembershipRecord) -> Result<Self, Self::Error> {
        Membership::new(r.price, r.start_date, r.end_date, r.status, r.membership_type)
    }
}

impl Membership {
    /// Validates the term: the end may not precede the start and the price
    /// may not be negative.
    pub fn new(
        price: f64,
        start_date: Date,
        end_date: Date,
        status: TransactionStatus,
        membership_type: MembershipType,
    ) -> Result<Self, ModelError> {
        if end_date < start_date {
            return Err(ModelError::EndBeforeStart {
                start: start_date,
                end: end_date,
            });
        }
        if price < 0.0 {
            return Err(ModelError::NegativeAmount(price));
        }
        Ok(Self {
            price,
            start_date,
            end_date,
            status,
            membership_type,
        })
    }

    /// Whether the term was paid for.
    pub fn is_succeeded(&self) -> bool {
        self.status.is_succeeded()
    }

    /// Returns true if `date` falls within the term, both ends inclusive.
    pub fn covers(&self, date: Date) -> bool {
        self.start_date <= date && date <= self.end_date
    }
}

/// One signup for one event occurrence.
///
/// `event` is `None` when the event detail could not be fetched; the
/// registration still counts toward registration totals and spend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "EventRegistrationRecord")]
pub struct EventRegistration {
    pub event_id: String,
    pub registration_date: Date,
    pub status: TransactionStatus,
    pub amount: f64,
    pub event: Option<EventDetails>,
}

#[derive(Deserialize)]
struct EventRegistrationRecord {
    event_id: String,
    registration_date: Date,
    status: TransactionStatus,
    amount: f64,
    event: Option<EventDetails>,
}

impl TryFrom<EventRegistrationRecord> for EventRegistration {
    type Error = ModelError;

    fn try_from(r: EventRegistrationRecord) -> Result<Self, Self::Error> {
        EventRegistration::new(r.event_id, r.registration_date, r.status, r.amount, r.event)
    }
}

impl EventRegistration {
    /// Rejects negative amounts.
    pub fn new(
        event_id: impl Into<String>,
        registration_date: Date,
        status: TransactionStatus,
        amount: f64,
        event: Option<EventDetails>,
    ) -> Result<Self, ModelError> {
        if amount < 0.0 {
            return Err(ModelError::NegativeAmount(amount));
        }
        Ok(Self {
            event_id: event_id.into(),
            registration_date,
            status,
            amount,
            event,
        })
    }

    /// A succeeded registration counts as attendance.
    pub fn attended(&self) -> bool {
        self.status.is_succeeded()
    }

    /// Category of the resolved event, `None` when unresolved.
    pub fn category(&self) -> EventCategory {
        self.event
            .as_ref()
            .map_or(EventCategory::None, |e| e.event_type.category)
    }

    /// Date of the resolved event.
    pub fn event_date(&self) -> Option<Date> {
        self.event.as_ref().map(|e| e.event_date)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Address {
    pub street: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub zip: Option<String>,
    pub phone: Option<String>,
}

/// Contact, demographic and custom-field data of one account.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub first_name: String,
    pub last_name: String,
    pub email: Option<String>,
    pub address: Option<Address>,
    pub gender: Option<String>,
    pub birthdate: Option<Date>,
    pub openpath_id: Option<String>,
    pub discourse_id: Option<String>,
    pub referral_source: Option<String>,
    pub family_membership: bool,
    pub waiver_date: Option<Date>,
    pub orientation_date: Option<Date>,
    pub current_membership_status: Option<AccountMembershipStatus>,
}

/// One member with their membership and event history.
///
/// `None` history means the sub-fetch failed; `Some` of an empty list means
/// the member has no records of that kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "AccountRecord")]
pub struct Account {
    pub id: String,
    pub profile: Profile,
    memberships: Option<Vec<Membership>>,
    event_registrations: Option<Vec<EventRegistration>>,
}

#[derive(Deserialize)]
struct AccountRecord {
    id: String,
    profile: Profile,
    memberships: Option<Vec<Membership>>,
    event_registrations: Option<Vec<EventRegistration>>,
}

impl From<AccountRecord> for Account {
    fn from(r: AccountRecord) -> Self {
        Account::new(r.id, r.profile, r.memberships, r.event_registrations)
    }
}

impl Account {
    /// Assembles an account, ordering memberships by start date and
    /// registrations by registration date.
    pub fn new(
        id: impl Into<String>,
        profile: Profile,
        memberships: Option<Vec<Membership>>,
        event_registrations: Option<Vec<EventRegistration>>,
    ) -> Self {
        let memberships = memberships.map(|mut m| {
            m.sort_by_key(|m| m.start_date);
            m
        });
        let event_registrations = event_registrations.map(|mut r| {
            r.sort_by_key(|r| r.registration_date);
            r
        });
        Self {
            id: id.into(),
            profile,
            memberships,
            event_registrations,
        }
    }

    /// First and last name joined by a space.
    pub fn full_name(&self) -> String {
        format!("{} {}", self.profile.first_name, self.profile.last_name)
            .trim()
            .to_string()
    }

    /// Membership terms, oldest first. Empty when the fetch failed.
    pub fn memberships(&self) -> &[Membership] {
        self.memberships.as_deref().unwrap_or_default()
    }

    /// Registrations, oldest first. Empty when the fetch failed.
    pub fn event_registrations(&self) -> &[EventRegistration] {
        self.event_registrations.as_deref().unwrap_or_default()
    }

    /// Whether the membership list was retrieved at all.
    pub fn has_membership_history(&self) -> bool {
        self.memberships.is_some()
    }

    /// Whether the registration list was retrieved at all.
    pub fn has_registration_history(&self) -> bool {
        self.event_registrations.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::date;

    fn monthly(start: Date, end: Date) -> Membership {
        Membership::new(
            50.0,
            start,
            end,
            TransactionStatus::Succeeded,
            MembershipType::Monthly,
        )
        .unwrap()
    }

    #[test]
    fn test_category_round_trip() {
        for category in EventCategory::ALL {
            assert_eq!(EventCategory::from_remote(category.as_remote()), category);
        }
    }

    #[test]
    fn test_unknown_category_is_none() {
        assert_eq!(
            EventCategory::from_remote("Underwater Basket Weaving"),
            EventCategory::None
        );
        assert_eq!(EventCategory::from_remote(""), EventCategory::None);
    }

    #[test]
    fn test_category_serde_uses_remote_names() {
        let json = serde_json::to_string(&EventCategory::LaserCutting).unwrap();
        assert_eq!(json, "\"Laser Cutting\"");

        let parsed: EventCategory = serde_json::from_str("\"CNC Router\"").unwrap();
        assert_eq!(parsed, EventCategory::Cnc);

        let unknown: EventCategory = serde_json::from_str("\"Blacksmithing\"").unwrap();
        assert_eq!(unknown, EventCategory::None);
    }

    #[test]
    fn test_status_and_term_wire_names() {
        let status: TransactionStatus = serde_json::from_str("\"REFUNDED\"").unwrap();
        assert_eq!(status, TransactionStatus::Refunded);

        let term: MembershipType = serde_json::from_str("\"YEAR\"").unwrap();
        assert_eq!(term, MembershipType::Annual);
    }

    #[test]
    fn test_event_type_strips_instructor() {
        let event_type = EventType::from_title("Intro to Lathe w/ Sam", EventCategory::Woodworking);
        assert_eq!(event_type.name, "Intro to Lathe");

        let plain = EventType::from_title("Laser Basics", EventCategory::LaserCutting);
        assert_eq!(plain.name, "Laser Basics");
    }

    #[test]
    fn test_membership_rejects_inverted_dates() {
        let err = Membership::new(
            10.0,
            date!(2023 - 02 - 01),
            date!(2023 - 01 - 01),
            TransactionStatus::Succeeded,
            MembershipType::Monthly,
        )
        .unwrap_err();
        assert!(matches!(err, ModelError::EndBeforeStart { .. }));
    }

    #[test]
    fn test_negative_amounts_rejected() {
        let err = EventRegistration::new(
            "42",
            date!(2023 - 01 - 01),
            TransactionStatus::Succeeded,
            -5.0,
            None,
        )
        .unwrap_err();
        assert_eq!(err, ModelError::NegativeAmount(-5.0));
    }

    #[test]
    fn test_account_sorts_history() {
        let later = monthly(date!(2023 - 03 - 01), date!(2023 - 03 - 31));
        let earlier = monthly(date!(2023 - 01 - 01), date!(2023 - 01 - 31));
        let reg_late = EventRegistration::new(
            "2",
            date!(2023 - 05 - 01),
            TransactionStatus::Succeeded,
            0.0,
            None,
        )
        .unwrap();
        let reg_early = EventRegistration::new(
            "1",
            date!(2022 - 12 - 01),
            TransactionStatus::Succeeded,
            0.0,
            None,
        )
        .unwrap();

        let account = Account::new(
            "7",
            Profile::default(),
            Some(vec![later.clone(), earlier.clone()]),
            Some(vec![reg_late, reg_early]),
        );

        assert_eq!(account.memberships(), &[earlier, later]);
        assert_eq!(account.event_registrations()[0].event_id, "1");
    }

    #[test]
    fn test_absent_history_reads_as_empty() {
        let account = Account::new("7", Profile::default(), None, Some(Vec::new()));
        assert!(account.memberships().is_empty());
        assert!(!account.has_membership_history());
        assert!(account.has_registration_history());
    }

    #[test]
    fn test_current_status_from_remote() {
        assert_eq!(
            AccountMembershipStatus::from_remote("Inactive"),
            AccountMembershipStatus::Inactive
        );
        assert_eq!(
            AccountMembershipStatus::from_remote("???"),
            AccountMembershipStatus::Unknown
        );
    }

    fn membership_json(start: &str, end: &str, price: f64) -> serde_json::Value {
        serde_json::json!({
            "price": price,
            "start_date": start,
            "end_date": end,
            "status": "SUCCEEDED",
            "membership_type": "MONTH",
        })
    }

    #[test]
    fn test_deserialized_membership_is_validated() {
        let inverted = membership_json("2023-05-31", "2023-05-01", 50.0);
        assert!(serde_json::from_value::<Membership>(inverted).is_err());

        let negative = membership_json("2023-05-01", "2023-05-31", -5.0);
        assert!(serde_json::from_value::<Membership>(negative).is_err());

        let valid = membership_json("2023-05-01", "2023-05-31", 50.0);
        let membership: Membership = serde_json::from_value(valid).unwrap();
        assert_eq!(membership.start_date, date!(2023 - 05 - 01));
    }

    #[test]
    fn test_deserialized_registration_is_validated() {
        let negative = serde_json::json!({
            "event_id": "42",
            "registration_date": "2023-01-01",
            "status": "SUCCEEDED",
            "amount": -5.0,
            "event": null,
        });
        assert!(serde_json::from_value::<EventRegistration>(negative).is_err());
    }

    #[test]
    fn test_deserialized_account_is_validated_and_sorted() {
        let bad = serde_json::json!({
            "id": "7",
            "profile": Profile::default(),
            "memberships": [membership_json("2023-05-31", "2023-05-01", 50.0)],
            "event_registrations": null,
        });
        assert!(serde_json::from_value::<Account>(bad).is_err());

        let unsorted = serde_json::json!({
            "id": "7",
            "profile": Profile::default(),
            "memberships": [
                membership_json("2023-05-01", "2023-05-31", 50.0),
                membership_json("2023-01-01", "2023-01-31", 50.0),
            ],
            "event_registrations": null,
        });
        let account: Account = serde_json::from_value(unsorted).unwrap();
        assert_eq!(account.memberships()[0].start_date, date!(2023 - 01 - 01));
        assert!(!account.has_registration_history());

        // Serialized output reads back unchanged.
        let round_trip: Account =
            serde_json::from_value(serde_json::to_value(&account).unwrap()).unwrap();
        assert_eq!(round_trip, account);
    }
}
