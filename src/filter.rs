use std::fmt;

use chrono::NaiveDate;
use tracing::{debug, warn};

use crate::loader::Dataset;
use crate::models::BookingRecord;

pub const ALL_SERVICES: &str = "All";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ServiceFilter {
    #[default]
    All,
    Named(String),
}

impl ServiceFilter {
    pub fn parse(value: &str) -> Self {
        let value = value.trim();
        if value.is_empty() || value.eq_ignore_ascii_case(ALL_SERVICES) {
            Self::All
        } else {
            Self::Named(value.to_string())
        }
    }

    pub fn matches(&self, record: &BookingRecord) -> bool {
        match self {
            Self::All => true,
            Self::Named(service) => record.service == *service,
        }
    }
}

impl fmt::Display for ServiceFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::All => f.write_str(ALL_SERVICES),
            Self::Named(service) => f.write_str(service),
        }
    }
}

/// Inclusive calendar-date window. A window with `start > end` matches nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        Self { start, end }
    }

    pub fn contains(&self, record: &BookingRecord) -> bool {
        let date = record.booking_date();
        self.start <= date && date <= self.end
    }
}

/// Filter selection driven by the presentation layer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterSelection {
    pub service: ServiceFilter,
    pub range: Option<DateRange>,
}

impl FilterSelection {
    pub fn set_service_filter(&mut self, service: &str) {
        self.service = ServiceFilter::parse(service);
    }

    pub fn set_date_range(&mut self, start: NaiveDate, end: NaiveDate) {
        self.range = Some(DateRange::new(start, end));
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Clamps the selection against `dataset`: unknown services fall back
    /// to `All`, an unset range widens to the dataset's date bounds.
    pub fn resolve(&self, dataset: &Dataset) -> ResolvedFilter {
        let service = match &self.service {
            ServiceFilter::Named(name) if !dataset.has_service(name) => {
                warn!(service = %name, "unknown service selected, showing all services");
                ServiceFilter::All
            }
            other => other.clone(),
        };
        let range = self.range.or_else(|| {
            dataset
                .date_bounds()
                .map(|(start, end)| DateRange::new(start, end))
        });
        ResolvedFilter { service, range }
    }
}

/// A selection after clamping. `range` is `None` only for an empty dataset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedFilter {
    pub service: ServiceFilter,
    pub range: Option<DateRange>,
}

impl ResolvedFilter {
    pub fn apply<'a>(&self, dataset: &'a Dataset) -> Vec<&'a BookingRecord> {
        let filtered = filter_records(dataset.records(), &self.service, self.range.as_ref());
        debug!(
            service = %self.service,
            kept = filtered.len(),
            total = dataset.len(),
            "applied filters"
        );
        filtered
    }
}

/// Keeps records matching the service and (when given) the date range,
/// in their original order.
pub fn filter_records<'a, I>(
    records: I,
    service: &ServiceFilter,
    range: Option<&DateRange>,
) -> Vec<&'a BookingRecord>
where
    I: IntoIterator<Item = &'a BookingRecord>,
{
    records
        .into_iter()
        .filter(|record| service.matches(record))
        .filter(|record| range.map_or(true, |range| range.contains(record)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn booking(id: &str, date: &str, service: &str) -> BookingRecord {
        let booked_at = crate::loader::parse_booking_date(date).unwrap();
        BookingRecord {
            booking_id: id.to_string(),
            month: booked_at.format("%Y-%m").to_string(),
            booked_at,
            service: service.to_string(),
            customer_type: "Regular".to_string(),
            revenue: Some(100.0),
            satisfaction: Some(4.0),
            handled_by_call_center: Some("No".to_string()),
        }
    }

    fn date(value: &str) -> NaiveDate {
        NaiveDate::parse_from_str(value, "%Y-%m-%d").unwrap()
    }

    fn sample_dataset() -> Dataset {
        Dataset::new(
            PathBuf::from("bookings.csv"),
            vec![
                booking("B1", "2024-01-05", "Spa"),
                booking("B2", "2024-02-10", "Gym"),
                booking("B3", "2024-03-01 18:45:00", "Spa"),
                booking("B4", "2024-03-20", "Dining"),
            ],
        )
    }

    fn ids(records: &[&BookingRecord]) -> Vec<String> {
        records.iter().map(|record| record.booking_id.clone()).collect()
    }

    #[test]
    fn parses_all_sentinel() {
        assert_eq!(ServiceFilter::parse("All"), ServiceFilter::All);
        assert_eq!(ServiceFilter::parse("all"), ServiceFilter::All);
        assert_eq!(ServiceFilter::parse("  "), ServiceFilter::All);
        assert_eq!(
            ServiceFilter::parse("Spa"),
            ServiceFilter::Named("Spa".to_string())
        );
    }

    #[test]
    fn filters_by_service_preserving_order() {
        let dataset = sample_dataset();
        let spa = filter_records(
            dataset.records(),
            &ServiceFilter::Named("Spa".to_string()),
            None,
        );
        assert_eq!(ids(&spa), vec!["B1", "B3"]);
    }

    #[test]
    fn all_is_idempotent_after_named_filter() {
        let dataset = sample_dataset();
        for service in ["Spa", "Gym", "Dining", "Missing"] {
            let named = ServiceFilter::Named(service.to_string());
            let once = filter_records(dataset.records(), &named, None);
            let twice = filter_records(once.iter().copied(), &ServiceFilter::All, None);
            assert_eq!(ids(&once), ids(&twice));
        }
    }

    #[test]
    fn date_range_is_inclusive_on_calendar_days() {
        let dataset = sample_dataset();
        let range = DateRange::new(date("2024-01-05"), date("2024-03-01"));
        let kept = filter_records(dataset.records(), &ServiceFilter::All, Some(&range));
        assert_eq!(ids(&kept), vec!["B1", "B2", "B3"]);
    }

    #[test]
    fn inverted_range_yields_nothing() {
        let dataset = sample_dataset();
        let range = DateRange::new(date("2024-03-31"), date("2024-01-01"));
        let kept = filter_records(dataset.records(), &ServiceFilter::All, Some(&range));
        assert!(kept.is_empty());
    }

    #[test]
    fn resolve_clamps_unknown_service_and_fills_range() {
        let dataset = sample_dataset();
        let mut selection = FilterSelection::default();
        selection.set_service_filter("Helicopter");

        let resolved = selection.resolve(&dataset);
        assert_eq!(resolved.service, ServiceFilter::All);
        assert_eq!(
            resolved.range,
            Some(DateRange::new(date("2024-01-05"), date("2024-03-20")))
        );
        assert_eq!(resolved.apply(&dataset).len(), dataset.len());
    }

    #[test]
    fn resolve_keeps_explicit_choices() {
        let dataset = sample_dataset();
        let mut selection = FilterSelection::default();
        selection.set_service_filter("Spa");
        selection.set_date_range(date("2024-02-01"), date("2024-12-31"));

        let resolved = selection.resolve(&dataset);
        assert_eq!(ids(&resolved.apply(&dataset)), vec!["B3"]);

        selection.reset();
        assert_eq!(selection, FilterSelection::default());
    }

    #[test]
    fn filtering_leaves_dataset_untouched() {
        let dataset = sample_dataset();
        let _ = filter_records(
            dataset.records(),
            &ServiceFilter::Named("Gym".to_string()),
            None,
        );
        assert_eq!(dataset.len(), 4);
        assert_eq!(dataset.records()[0].booking_id, "B1");
    }
}
