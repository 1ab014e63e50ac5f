use chrono::{NaiveDate, NaiveDateTime};
use serde::Serialize;

pub const VIP_CUSTOMER_TYPE: &str = "VIP Member";
pub const CALL_CENTER_YES: &str = "Yes";

#[derive(Debug, Clone)]
pub struct BookingRecord {
    pub booking_id: String,
    pub booked_at: NaiveDateTime,
    pub service: String,
    pub customer_type: String,
    pub revenue: Option<f64>,
    pub satisfaction: Option<f64>,
    pub handled_by_call_center: Option<String>,
    /// `YYYY-MM` bucket derived from `booked_at` at load time.
    pub month: String,
}

impl BookingRecord {
    pub fn booking_date(&self) -> NaiveDate {
        self.booked_at.date()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KpiSummary {
    pub total_bookings: usize,
    pub total_revenue: f64,
    pub avg_revenue: Option<f64>,
    pub avg_satisfaction: Option<f64>,
    pub vip_revenue: f64,
    pub call_center_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonthlyTrend {
    pub month: String,
    pub bookings: usize,
    pub revenue: f64,
    pub avg_satisfaction: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServicePerformance {
    pub service: String,
    pub bookings: usize,
    pub revenue: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CustomerTypeShare {
    pub customer_type: String,
    pub percentage: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CallCenterCount {
    pub handled_by_call_center: String,
    pub count: usize,
}

/// The filter that was actually applied after clamping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AppliedFilter {
    pub service: String,
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DashboardResults {
    pub filter: AppliedFilter,
    pub row_count: usize,
    pub kpis: KpiSummary,
    pub monthly: Vec<MonthlyTrend>,
    pub services: Vec<ServicePerformance>,
    pub customer_types: Vec<CustomerTypeShare>,
    pub call_center: Vec<CallCenterCount>,
}

impl DashboardResults {
    pub fn monthly_bookings(&self) -> Vec<(&str, usize)> {
        self.monthly
            .iter()
            .map(|trend| (trend.month.as_str(), trend.bookings))
            .collect()
    }

    pub fn monthly_revenue(&self) -> Vec<(&str, f64)> {
        self.monthly
            .iter()
            .map(|trend| (trend.month.as_str(), trend.revenue))
            .collect()
    }

    pub fn monthly_satisfaction(&self) -> Vec<(&str, Option<f64>)> {
        self.monthly
            .iter()
            .map(|trend| (trend.month.as_str(), trend.avg_satisfaction))
            .collect()
    }
}
