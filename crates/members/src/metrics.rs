//! Derived membership and attendance metrics.
//!
//! Everything here is a pure function of an assembled [`Account`]. Only
//! succeeded memberships and registrations count toward totals; absent
//! history reads as empty and yields zeros or `None`, never an error.

use std::ops::Index;

use enum_map::EnumMap;
use serde::Serialize;
use time::Date;

use crate::models::{Account, EventCategory, Membership, MembershipType};

/// Attended-class counts per event category.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct ClassCounts(EnumMap<EventCategory, u32>);

impl ClassCounts {
    /// Counts one more class in `category`.
    pub fn record(&mut self, category: EventCategory) {
        self.0[category] += 1;
    }

    /// Classes attended in `category`.
    pub fn get(&self, category: EventCategory) -> u32 {
        self.0[category]
    }

    /// Classes across all categories.
    pub fn total(&self) -> u32 {
        self.0.values().sum()
    }

    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }

    fn sum_of(&self, categories: &[EventCategory]) -> u32 {
        categories.iter().map(|c| self.0[*c]).sum()
    }

    /// Woodworking, woodshop safety and CNC router classes.
    pub fn woodshop(&self) -> u32 {
        self.sum_of(&[
            EventCategory::Woodworking,
            EventCategory::WoodshopSafety,
            EventCategory::Cnc,
        ])
    }

    /// Metalworking and machining classes.
    pub fn metal_shop(&self) -> u32 {
        self.sum_of(&[EventCategory::Metalworking, EventCategory::Machining])
    }

    /// Laser cutting classes.
    pub fn lasers(&self) -> u32 {
        self.0[EventCategory::LaserCutting]
    }

    /// Textiles classes.
    pub fn textiles(&self) -> u32 {
        self.0[EventCategory::Textiles]
    }

    /// Electronics classes.
    pub fn electronics(&self) -> u32 {
        self.0[EventCategory::Electronics]
    }

    /// 3D printing classes.
    pub fn printing_3d(&self) -> u32 {
        self.0[EventCategory::Printing3d]
    }

    /// Every category with its count, zero counts included.
    pub fn iter(&self) -> impl Iterator<Item = (EventCategory, u32)> + '_ {
        self.0.iter().map(|(category, count)| (category, *count))
    }
}

impl Index<EventCategory> for ClassCounts {
    type Output = u32;

    fn index(&self, category: EventCategory) -> &u32 {
        &self.0[category]
    }
}

impl FromIterator<EventCategory> for ClassCounts {
    fn from_iter<I: IntoIterator<Item = EventCategory>>(iter: I) -> Self {
        let mut counts = ClassCounts::default();
        for category in iter {
            counts.record(category);
        }
        counts
    }
}

/// A membership placed at a 1-based interval within its type's history.
///
/// Interval `i` spans `[i - 1, i]` on the analysis time axis.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MembershipPeriod<'a> {
    pub interval: u32,
    pub membership: &'a Membership,
}

impl MembershipPeriod<'_> {
    /// Interval start on the analysis time axis.
    pub fn start(&self) -> u32 {
        self.interval - 1
    }

    /// Interval end on the analysis time axis.
    pub fn stop(&self) -> u32 {
        self.interval
    }
}

/// Succeeded memberships partitioned by type, each in chronological order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MembershipPeriods<'a> {
    pub annual: Vec<MembershipPeriod<'a>>,
    pub monthly: Vec<MembershipPeriod<'a>>,
}

impl<'a> MembershipPeriods<'a> {
    /// Periods of one membership type.
    pub fn of_type(&self, membership_type: MembershipType) -> &[MembershipPeriod<'a>] {
        match membership_type {
            MembershipType::Annual => &self.annual,
            MembershipType::Monthly => &self.monthly,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.annual.is_empty() && self.monthly.is_empty()
    }

    /// Annual periods first, then monthly.
    pub fn iter(&self) -> impl Iterator<Item = &MembershipPeriod<'a>> {
        self.annual.iter().chain(self.monthly.iter())
    }
}

/// Account-level metrics handed to the export collaborator.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DerivedMetrics {
    pub membership_count: u32,
    pub total_dollars_spent: f64,
    pub event_registration_count: usize,
    pub event_attended_count: usize,
    pub first_membership_start: Option<Date>,
    pub latest_membership_end: Option<Date>,
    pub membership_duration_days: Option<i64>,
    pub has_annual_membership: bool,
    pub classes_before_first_membership: Option<usize>,
    pub classes_attended: ClassCounts,
}

impl Account {
    /// Succeeded annual terms count 12, succeeded monthly terms count 1.
    pub fn membership_count(&self) -> u32 {
        self.memberships()
            .iter()
            .filter(|m| m.is_succeeded())
            .map(|m| m.membership_type.month_units())
            .sum()
    }

    /// Succeeded membership prices plus attended registration amounts.
    pub fn total_dollars_spent(&self) -> f64 {
        let memberships: f64 = self
            .memberships()
            .iter()
            .filter(|m| m.is_succeeded())
            .map(|m| m.price)
            .sum();
        let events: f64 = self
            .event_registrations()
            .iter()
            .filter(|r| r.attended())
            .map(|r| r.amount)
            .sum();
        memberships + events
    }

    /// Registrations of any status.
    pub fn event_registration_count(&self) -> usize {
        self.event_registrations().len()
    }

    /// Succeeded registrations.
    pub fn event_attended_count(&self) -> usize {
        self.event_registrations()
            .iter()
            .filter(|r| r.attended())
            .count()
    }

    /// Attended classes whose event date lies in `[start, end]`.
    ///
    /// Registrations without resolved event detail have no event date and
    /// are not counted.
    pub fn classes_by_category_in_period(&self, start: Date, end: Date) -> ClassCounts {
        self.event_registrations()
            .iter()
            .filter(|r| r.attended())
            .filter_map(|r| r.event.as_ref())
            .filter(|e| start <= e.event_date && e.event_date <= end)
            .map(|e| e.event_type.category)
            .collect()
    }

    /// Attended classes over the whole history.
    pub fn classes_attended(&self) -> ClassCounts {
        self.event_registrations()
            .iter()
            .filter(|r| r.attended() && r.event.is_some())
            .map(|r| r.category())
            .collect()
    }

    /// Whether the member attended a resolved event in `category`.
    pub fn has_attended(&self, category: EventCategory) -> bool {
        self.event_registrations()
            .iter()
            .any(|r| r.attended() && r.event.is_some() && r.category() == category)
    }

    /// Numbers succeeded memberships 1, 2, 3... separately per type.
    pub fn membership_periods(&self) -> MembershipPeriods<'_> {
        let mut periods = MembershipPeriods::default();
        for membership in self.memberships().iter().filter(|m| m.is_succeeded()) {
            let bucket = match membership.membership_type {
                MembershipType::Annual => &mut periods.annual,
                MembershipType::Monthly => &mut periods.monthly,
            };
            let interval = bucket.len() as u32 + 1;
            bucket.push(MembershipPeriod {
                interval,
                membership,
            });
        }
        periods
    }

    /// The membership's own price when succeeded, plus attended registrations
    /// paid for during its term.
    pub fn dollars_spent_in_period(&self, membership: &Membership) -> f64 {
        let fee = if membership.is_succeeded() {
            membership.price
        } else {
            0.0
        };
        let events: f64 = self
            .event_registrations()
            .iter()
            .filter(|r| r.attended() && membership.covers(r.registration_date))
            .map(|r| r.amount)
            .sum();
        fee + events
    }

    /// Start of the earliest membership term.
    pub fn first_membership_start_date(&self) -> Option<Date> {
        self.memberships().first().map(|m| m.start_date)
    }

    /// End of the latest-starting membership term.
    pub fn latest_membership_end_date(&self) -> Option<Date> {
        self.memberships().last().map(|m| m.end_date)
    }

    /// Days from the first membership start to the latest membership end.
    pub fn membership_duration(&self) -> Option<time::Duration> {
        let start = self.first_membership_start_date()?;
        let end = self.latest_membership_end_date()?;
        Some(end - start)
    }

    /// Whether any succeeded term was annual.
    pub fn has_annual_membership(&self) -> bool {
        self.memberships()
            .iter()
            .any(|m| m.is_succeeded() && m.membership_type == MembershipType::Annual)
    }

    /// Attended classes held before the first membership began.
    pub fn classes_before_first_membership(&self) -> Option<usize> {
        let first_start = self.first_membership_start_date()?;
        Some(
            self.event_registrations()
                .iter()
                .filter(|r| r.attended())
                .filter_map(|r| r.event_date())
                .filter(|d| *d < first_start)
                .count(),
        )
    }

    /// Age in whole years on `today`.
    pub fn age_on(&self, today: Date) -> Option<i32> {
        let birthdate = self.profile.birthdate?;
        let mut age = today.year() - birthdate.year();
        if (today.month() as u8, today.day()) < (birthdate.month() as u8, birthdate.day()) {
            age -= 1;
        }
        (age >= 0).then_some(age)
    }

    /// All account-level metrics in one serializable bundle.
    pub fn derived_metrics(&self) -> DerivedMetrics {
        DerivedMetrics {
            membership_count: self.membership_count(),
            total_dollars_spent: self.total_dollars_spent(),
            event_registration_count: self.event_registration_count(),
            event_attended_count: self.event_attended_count(),
            first_membership_start: self.first_membership_start_date(),
            latest_membership_end: self.latest_membership_end_date(),
            membership_duration_days: self.membership_duration().map(|d| d.whole_days()),
            has_annual_membership: self.has_annual_membership(),
            classes_before_first_membership: self.classes_before_first_membership(),
            classes_attended: self.classes_attended(),
        }
    }
}
