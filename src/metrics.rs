use std::collections::{BTreeMap, HashMap, HashSet};

use crate::filter::FilterSelection;
use crate::loader::Dataset;
use crate::models::{
    AppliedFilter, BookingRecord, CallCenterCount, CustomerTypeShare, DashboardResults,
    KpiSummary, MonthlyTrend, ServicePerformance, CALL_CENTER_YES, VIP_CUSTOMER_TYPE,
};

/// Runs one filter-aggregate cycle. Called afresh on every filter change.
pub fn compute_results(dataset: &Dataset, selection: &FilterSelection) -> DashboardResults {
    let resolved = selection.resolve(dataset);
    let filtered = resolved.apply(dataset);

    DashboardResults {
        filter: AppliedFilter {
            service: resolved.service.to_string(),
            start: resolved.range.map(|range| range.start),
            end: resolved.range.map(|range| range.end),
        },
        row_count: filtered.len(),
        kpis: compute_kpis(&filtered),
        monthly: monthly_trends(&filtered),
        services: service_performance(&filtered),
        customer_types: customer_type_distribution(&filtered),
        call_center: call_center_distribution(&filtered),
    }
}

pub fn compute_kpis(records: &[&BookingRecord]) -> KpiSummary {
    let total_revenue: f64 = records.iter().filter_map(|record| record.revenue).sum();
    let vip_revenue: f64 = records
        .iter()
        .filter(|record| record.customer_type == VIP_CUSTOMER_TYPE)
        .filter_map(|record| record.revenue)
        .sum();
    let handled = records
        .iter()
        .filter(|record| record.handled_by_call_center.as_deref() == Some(CALL_CENTER_YES))
        .count();

    KpiSummary {
        total_bookings: distinct_bookings(records.iter().copied()),
        total_revenue,
        avg_revenue: mean(records.iter().filter_map(|record| record.revenue)),
        avg_satisfaction: mean(records.iter().filter_map(|record| record.satisfaction)),
        vip_revenue,
        call_center_rate: percentage(handled, records.len()),
    }
}

/// Per-month bookings, revenue and satisfaction in chronological order.
pub fn monthly_trends(records: &[&BookingRecord]) -> Vec<MonthlyTrend> {
    // `YYYY-MM` keys sort chronologically.
    let mut months: BTreeMap<&str, Vec<&BookingRecord>> = BTreeMap::new();
    for &record in records {
        months.entry(record.month.as_str()).or_default().push(record);
    }

    months
        .into_iter()
        .map(|(month, rows)| MonthlyTrend {
            month: month.to_string(),
            bookings: distinct_bookings(rows.iter().copied()),
            revenue: rows.iter().filter_map(|record| record.revenue).sum(),
            avg_satisfaction: mean(rows.iter().filter_map(|record| record.satisfaction)),
        })
        .collect()
}

/// Per-service bookings and revenue, highest revenue first.
pub fn service_performance(records: &[&BookingRecord]) -> Vec<ServicePerformance> {
    let mut map: HashMap<&str, (HashSet<&str>, f64)> = HashMap::new();

    for record in records {
        let entry = map
            .entry(record.service.as_str())
            .or_insert_with(|| (HashSet::new(), 0.0));
        entry.0.insert(record.booking_id.as_str());
        entry.1 += record.revenue.unwrap_or(0.0);
    }

    let mut values: Vec<ServicePerformance> = map
        .into_iter()
        .map(|(service, (bookings, revenue))| ServicePerformance {
            service: service.to_string(),
            bookings: bookings.len(),
            revenue,
        })
        .collect();

    values.sort_by(|a, b| {
        b.revenue
            .partial_cmp(&a.revenue)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.service.cmp(&b.service))
    });
    values
}

/// Share of rows per customer type, as percentages of the row count.
pub fn customer_type_distribution(records: &[&BookingRecord]) -> Vec<CustomerTypeShare> {
    let total = records.len();
    count_by(records.iter().map(|record| record.customer_type.as_str()))
        .into_iter()
        .map(|(customer_type, count)| CustomerTypeShare {
            customer_type,
            percentage: percentage(count, total),
        })
        .collect()
}

/// Row counts per call-center flag. Rows without a value are skipped.
pub fn call_center_distribution(records: &[&BookingRecord]) -> Vec<CallCenterCount> {
    count_by(
        records
            .iter()
            .filter_map(|record| record.handled_by_call_center.as_deref()),
    )
    .into_iter()
    .map(|(handled_by_call_center, count)| CallCenterCount {
        handled_by_call_center,
        count,
    })
    .collect()
}

fn distinct_bookings<'a>(records: impl Iterator<Item = &'a BookingRecord>) -> usize {
    records
        .map(|record| record.booking_id.as_str())
        .collect::<HashSet<_>>()
        .len()
}

fn mean(values: impl Iterator<Item = f64>) -> Option<f64> {
    let (sum, count) = values.fold((0.0, 0usize), |(sum, count), value| (sum + value, count + 1));
    if count == 0 {
        None
    } else {
        Some(sum / count as f64)
    }
}

fn percentage(part: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        part as f64 / total as f64 * 100.0
    }
}

/// Counts per label, most frequent first, ties by label.
fn count_by<'a>(labels: impl Iterator<Item = &'a str>) -> Vec<(String, usize)> {
    let mut map: HashMap<&str, usize> = HashMap::new();
    for label in labels {
        *map.entry(label).or_insert(0) += 1;
    }

    let mut counts: Vec<(String, usize)> = map
        .into_iter()
        .map(|(label, count)| (label.to_string(), count))
        .collect();
    counts.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    counts
}
