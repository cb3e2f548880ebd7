//! Neon CRM wire formats and their conversion into the member model.
//!
//! Responses are decoded into loosely-typed wire structs first, then
//! validated into [`members`] types. Rows that cannot be validated are
//! rejected here so nothing untyped reaches aggregation.

use std::collections::HashMap;

use members::{
    AccountMembershipStatus, Address, EventCategory, EventDetails, EventType, Membership,
    MembershipType, ModelError, Profile, TransactionStatus,
};
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use thiserror::Error;
use time::format_description::well_known::Rfc3339;
use time::macros::format_description;
use time::{Date, Month, OffsetDateTime};
use tracing::warn;

#[derive(Debug, Error)]
pub enum PayloadError {
    #[error("not an individual account")]
    NotIndividual,
    #[error("missing field `{0}`")]
    MissingField(&'static str),
    #[error("invalid date `{value}` in `{field}`")]
    InvalidDate { field: &'static str, value: String },
    #[error("unexpected shape: {0}")]
    Shape(#[from] serde_json::Error),
    #[error(transparent)]
    Model(#[from] ModelError),
}

/// Accepts ids and custom-field values sent either as strings or numbers.
fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::String(s)) => Some(s),
        Some(Value::Number(n)) => Some(n.to_string()),
        Some(Value::Bool(b)) => Some(b.to_string()),
        _ => None,
    })
}

/// `{"id": .., "code": .., "name": ..}` lookups used for gender, state and
/// custom-field options.
#[derive(Debug, Default, Deserialize)]
struct NamedWire {
    #[serde(default, deserialize_with = "lenient_string")]
    code: Option<String>,
    #[serde(default)]
    name: Option<String>,
}

// ---------------------------------------------------------------------------
// Dates
// ---------------------------------------------------------------------------

/// `YYYY-MM-DD`.
pub fn parse_iso_date(value: &str) -> Option<Date> {
    Date::parse(value.trim(), format_description!("[year]-[month]-[day]")).ok()
}

/// `M/D/YYYY`, with or without zero padding.
pub fn parse_us_date(value: &str) -> Option<Date> {
    let mut parts = value.trim().splitn(3, '/');
    let month: u8 = parts.next()?.trim().parse().ok()?;
    let day: u8 = parts.next()?.trim().parse().ok()?;
    let year: i32 = parts.next()?.trim().parse().ok()?;
    Date::from_calendar_date(year, Month::try_from(month).ok()?, day).ok()
}

/// Date part of an RFC 3339 timestamp such as `2023-03-01T18:30:00Z`.
pub fn parse_timestamp_date(value: &str) -> Option<Date> {
    OffsetDateTime::parse(value.trim(), &Rfc3339)
        .map(|ts| ts.date())
        .ok()
        .or_else(|| value.get(..10).and_then(parse_iso_date))
}

// ---------------------------------------------------------------------------
// Account listing
// ---------------------------------------------------------------------------

/// One row of an account listing or account search page.
#[derive(Debug, Clone, PartialEq)]
pub struct AccountSummary {
    pub id: String,
    pub user_type: Option<String>,
    pub current_membership_status: Option<AccountMembershipStatus>,
}

impl AccountSummary {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            user_type: None,
            current_membership_status: None,
        }
    }

    /// Listing rows carry a user type; search rows are pre-filtered.
    pub fn is_individual(&self) -> bool {
        self.user_type
            .as_deref()
            .is_none_or(|t| t.eq_ignore_ascii_case("INDIVIDUAL"))
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum AccountSummaryWire {
    Listed {
        #[serde(rename = "accountId", deserialize_with = "lenient_string")]
        id: Option<String>,
        #[serde(rename = "userType", default)]
        user_type: Option<String>,
    },
    Searched {
        #[serde(rename = "Account ID", deserialize_with = "lenient_string")]
        id: Option<String>,
        #[serde(rename = "Account Current Membership Status", default)]
        status: Option<String>,
    },
}

pub fn parse_account_summary(row: &Value) -> Result<AccountSummary, PayloadError> {
    let summary = match AccountSummaryWire::deserialize(row)? {
        AccountSummaryWire::Listed { id, user_type } => AccountSummary {
            id: id.ok_or(PayloadError::MissingField("accountId"))?,
            user_type,
            current_membership_status: None,
        },
        AccountSummaryWire::Searched { id, status } => AccountSummary {
            id: id.ok_or(PayloadError::MissingField("Account ID"))?,
            user_type: None,
            current_membership_status: status
                .as_deref()
                .map(AccountMembershipStatus::from_remote),
        },
    };
    Ok(summary)
}

// ---------------------------------------------------------------------------
// Account detail
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AccountDetailWire {
    individual_account: Option<IndividualAccountWire>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct IndividualAccountWire {
    primary_contact: Option<ContactWire>,
    #[serde(default)]
    account_custom_fields: Option<Vec<CustomFieldWire>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ContactWire {
    first_name: Option<String>,
    last_name: Option<String>,
    email1: Option<String>,
    gender: Option<NamedWire>,
    dob: Option<DobWire>,
    #[serde(default)]
    addresses: Option<Vec<AddressWire>>,
}

#[derive(Debug, Deserialize)]
struct DobWire {
    #[serde(default, deserialize_with = "lenient_string")]
    year: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    month: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    day: Option<String>,
}

impl DobWire {
    fn to_date(&self) -> Option<Date> {
        let year: i32 = self.year.as_deref()?.trim().parse().ok()?;
        let month: u8 = self.month.as_deref()?.trim().parse().ok()?;
        let day: u8 = self.day.as_deref()?.trim().parse().ok()?;
        Date::from_calendar_date(year, Month::try_from(month).ok()?, day).ok()
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AddressWire {
    #[serde(default)]
    is_primary_address: Option<bool>,
    address_line1: Option<String>,
    city: Option<String>,
    state_province: Option<NamedWire>,
    #[serde(default, deserialize_with = "lenient_string")]
    zip_code: Option<String>,
    phone1: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CustomFieldWire {
    name: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    value: Option<String>,
    #[serde(default)]
    option_values: Option<Vec<NamedWire>>,
}

/// Custom field contents keyed by field name.
#[derive(Debug, Default)]
struct CustomFields(HashMap<String, CustomFieldWire>);

impl CustomFields {
    fn new(fields: Vec<CustomFieldWire>) -> Self {
        Self(
            fields
                .into_iter()
                .filter_map(|f| Some((f.name.clone()?, f)))
                .collect(),
        )
    }

    fn value(&self, name: &str) -> Option<&str> {
        self.0
            .get(name)?
            .value
            .as_deref()
            .map(str::trim)
            .filter(|v| !v.is_empty())
    }

    fn options(&self, name: &str) -> impl Iterator<Item = &str> {
        self.0
            .get(name)
            .and_then(|f| f.option_values.as_deref())
            .unwrap_or_default()
            .iter()
            .filter_map(|o| o.name.as_deref())
    }

    fn has_option(&self, name: &str, option: &str) -> bool {
        self.options(name).any(|o| o == option)
    }

    fn date(&self, account_id: &str, name: &str) -> Option<Date> {
        let raw = self.value(name)?;
        let parsed = parse_us_date(raw);
        if parsed.is_none() {
            warn!(account_id, field = name, raw, "unparsable custom field date");
        }
        parsed
    }
}

/// Builds the contact and custom-field part of an account from
/// `GET /v2/accounts/{id}`.
pub fn parse_account_detail(account_id: &str, body: &Value) -> Result<Profile, PayloadError> {
    let detail = AccountDetailWire::deserialize(body)?;
    let individual = detail.individual_account.ok_or(PayloadError::NotIndividual)?;
    let contact = individual
        .primary_contact
        .ok_or(PayloadError::MissingField("primaryContact"))?;

    let birthdate = contact.dob.as_ref().and_then(|dob| {
        let parsed = dob.to_date();
        if parsed.is_none() {
            warn!(account_id, dob = ?dob, "unparsable birthdate");
        }
        parsed
    });

    let address = contact
        .addresses
        .unwrap_or_default()
        .into_iter()
        .find(|a| a.is_primary_address == Some(true))
        .map(|a| Address {
            street: a.address_line1,
            city: a.city,
            state: a.state_province.and_then(|s| s.code),
            zip: a.zip_code,
            phone: a.phone1,
        });

    let custom = CustomFields::new(individual.account_custom_fields.unwrap_or_default());

    let family_membership = custom.has_option("Family Group Sub Member", "Yes")
        || custom.has_option("FamilyGroupPrimaryMember", "Family Group Primary Member");

    Ok(Profile {
        first_name: contact.first_name.unwrap_or_default(),
        last_name: contact.last_name.unwrap_or_default(),
        email: contact.email1,
        address,
        gender: contact.gender.and_then(|g| g.name),
        birthdate,
        openpath_id: custom.value("OpenPathID").map(str::to_string),
        discourse_id: custom.value("DiscourseID").map(str::to_string),
        referral_source: custom.options("Referral Source").next().map(str::to_string),
        family_membership,
        waiver_date: custom.date(account_id, "WaiverDate"),
        orientation_date: custom.date(account_id, "FacilityTourDate"),
        current_membership_status: None,
    })
}

// ---------------------------------------------------------------------------
// Memberships
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MembershipWire {
    #[serde(default)]
    fee: Option<f64>,
    term_start_date: String,
    term_end_date: String,
    term_unit: MembershipType,
    status: TransactionStatus,
}

/// One row of `GET /v2/accounts/{id}/memberships`.
pub fn parse_membership(row: &Value) -> Result<Membership, PayloadError> {
    let wire = MembershipWire::deserialize(row)?;
    let start = parse_iso_date(&wire.term_start_date).ok_or_else(|| PayloadError::InvalidDate {
        field: "termStartDate",
        value: wire.term_start_date.clone(),
    })?;
    let end = parse_iso_date(&wire.term_end_date).ok_or_else(|| PayloadError::InvalidDate {
        field: "termEndDate",
        value: wire.term_end_date.clone(),
    })?;
    Ok(Membership::new(
        wire.fee.unwrap_or_default(),
        start,
        end,
        wire.status,
        wire.term_unit,
    )?)
}

// ---------------------------------------------------------------------------
// Event registrations
// ---------------------------------------------------------------------------

/// A registration row before its event detail is resolved.
#[derive(Debug, Clone, PartialEq)]
pub struct RegistrationRow {
    pub event_id: String,
    pub registration_date: Date,
    pub status: TransactionStatus,
    pub amount: f64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RegistrationWire {
    #[serde(deserialize_with = "lenient_string")]
    event_id: Option<String>,
    registration_date_time: String,
    #[serde(default)]
    registration_amount: Option<f64>,
    #[serde(default)]
    tickets: Vec<TicketWire>,
}

#[derive(Debug, Deserialize)]
struct TicketWire {
    #[serde(default)]
    attendees: Vec<AttendeeWire>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AttendeeWire {
    registration_status: TransactionStatus,
}

/// One row of `GET /v2/accounts/{id}/eventRegistrations`.
///
/// The registration status is the first ticket's first attendee's status.
pub fn parse_registration(row: &Value) -> Result<RegistrationRow, PayloadError> {
    let wire = RegistrationWire::deserialize(row)?;
    let event_id = wire.event_id.ok_or(PayloadError::MissingField("eventId"))?;
    let registration_date =
        parse_timestamp_date(&wire.registration_date_time).ok_or_else(|| {
            PayloadError::InvalidDate {
                field: "registrationDateTime",
                value: wire.registration_date_time.clone(),
            }
        })?;
    let status = wire
        .tickets
        .first()
        .and_then(|t| t.attendees.first())
        .map(|a| a.registration_status)
        .ok_or(PayloadError::MissingField("tickets[0].attendees[0].registrationStatus"))?;
    let amount = wire.registration_amount.unwrap_or_default();
    if amount < 0.0 {
        return Err(ModelError::NegativeAmount(amount).into());
    }

    Ok(RegistrationRow {
        event_id,
        registration_date,
        status,
        amount,
    })
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EventWire {
    #[serde(default)]
    name: Option<String>,
    event_dates: Option<EventDatesWire>,
    #[serde(default)]
    category: Option<NamedWire>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EventDatesWire {
    start_date: Option<String>,
}

/// `GET /v2/events/{id}`.
pub fn parse_event(body: &Value) -> Result<EventDetails, PayloadError> {
    let wire = EventWire::deserialize(body)?;
    let raw_date = wire
        .event_dates
        .and_then(|d| d.start_date)
        .ok_or(PayloadError::MissingField("eventDates.startDate"))?;
    let event_date = parse_iso_date(&raw_date).ok_or(PayloadError::InvalidDate {
        field: "eventDates.startDate",
        value: raw_date,
    })?;
    let category = wire
        .category
        .and_then(|c| c.name)
        .map_or(EventCategory::None, |name| EventCategory::from_remote(&name));

    Ok(EventDetails {
        event_type: EventType::from_title(wire.name.as_deref().unwrap_or_default(), category),
        event_date,
    })
}
