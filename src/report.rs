use std::fmt::Write;

use crate::models::DashboardResults;

pub const CURRENCY_SYMBOL: &str = "₦";

/// Whole-unit amount with thousands separators, e.g. `₦1,234,568`.
pub fn format_currency(amount: f64) -> String {
    let rounded = format!("{:.0}", amount.abs());
    let mut grouped = String::with_capacity(rounded.len() + rounded.len() / 3);
    for (index, digit) in rounded.chars().enumerate() {
        if index > 0 && (rounded.len() - index) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(digit);
    }

    let sign = if amount < 0.0 && rounded != "0" { "-" } else { "" };
    format!("{sign}{CURRENCY_SYMBOL}{grouped}")
}

fn format_or_na(value: Option<f64>, render: impl Fn(f64) -> String) -> String {
    value.map(render).unwrap_or_else(|| "n/a".to_string())
}

fn filter_label(results: &DashboardResults) -> String {
    match (results.filter.start, results.filter.end) {
        (Some(start), Some(end)) => format!("{} ({} to {})", results.filter.service, start, end),
        _ => format!("{} (no bookings loaded)", results.filter.service),
    }
}

/// Plain-text KPI block for the terminal.
pub fn render_summary(results: &DashboardResults) -> String {
    let kpis = &results.kpis;
    let mut output = String::new();

    let _ = writeln!(output, "Filter: {}", filter_label(results));
    let _ = writeln!(output, "Rows matched: {}", results.row_count);
    let _ = writeln!(output);
    let _ = writeln!(output, "Total Bookings          {}", kpis.total_bookings);
    let _ = writeln!(
        output,
        "Total Revenue           {}",
        format_currency(kpis.total_revenue)
    );
    let _ = writeln!(
        output,
        "Avg Revenue per Booking {}",
        format_or_na(kpis.avg_revenue, format_currency)
    );
    let _ = writeln!(
        output,
        "Avg Satisfaction        {}",
        format_or_na(kpis.avg_satisfaction, |value| format!("{value:.2}"))
    );
    let _ = writeln!(
        output,
        "VIP Revenue             {}",
        format_currency(kpis.vip_revenue)
    );
    let _ = writeln!(
        output,
        "Call Center Handling    {:.1}%",
        kpis.call_center_rate
    );

    if !results.services.is_empty() {
        let _ = writeln!(output);
        let _ = writeln!(output, "Top services:");
        for service in results.services.iter().take(5) {
            let _ = writeln!(
                output,
                "  {:<20} {:>14} {:>6} bookings",
                service.service,
                format_currency(service.revenue),
                service.bookings
            );
        }
    }

    output
}

/// Markdown rendering of the full dashboard.
pub fn build_report(source: &str, results: &DashboardResults) -> String {
    let kpis = &results.kpis;
    let mut output = String::new();

    let _ = writeln!(output, "# Club Concierge Product Performance Report");
    let _ = writeln!(
        output,
        "Generated from `{}` for {}",
        source,
        filter_label(results)
    );
    let _ = writeln!(output);
    let _ = writeln!(output, "## Key Metrics");
    let _ = writeln!(output, "| Metric | Value |");
    let _ = writeln!(output, "| --- | --- |");
    let _ = writeln!(output, "| Total Bookings | {} |", kpis.total_bookings);
    let _ = writeln!(
        output,
        "| Total Revenue | {} |",
        format_currency(kpis.total_revenue)
    );
    let _ = writeln!(
        output,
        "| Avg Revenue per Booking | {} |",
        format_or_na(kpis.avg_revenue, format_currency)
    );
    let _ = writeln!(
        output,
        "| Avg Satisfaction | {} |",
        format_or_na(kpis.avg_satisfaction, |value| format!("{value:.2} / 5"))
    );
    let _ = writeln!(
        output,
        "| VIP Revenue | {} |",
        format_currency(kpis.vip_revenue)
    );
    let _ = writeln!(
        output,
        "| Call Center Handling | {:.1}% |",
        kpis.call_center_rate
    );

    let _ = writeln!(output);
    let _ = writeln!(output, "## Monthly Trends");
    if results.monthly.is_empty() {
        let _ = writeln!(output, "No bookings in this window.");
    } else {
        let _ = writeln!(output, "| Month | Bookings | Revenue | Satisfaction |");
        let _ = writeln!(output, "| --- | ---: | ---: | ---: |");
        let bookings = results.monthly_bookings();
        let revenue = results.monthly_revenue();
        let satisfaction = results.monthly_satisfaction();
        for ((month, count), ((_, amount), (_, rating))) in bookings
            .iter()
            .zip(revenue.iter().zip(satisfaction.iter()))
        {
            let _ = writeln!(
                output,
                "| {} | {} | {} | {} |",
                month,
                count,
                format_currency(*amount),
                format_or_na(*rating, |value| format!("{value:.2}"))
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Service Performance");
    if results.services.is_empty() {
        let _ = writeln!(output, "No services booked in this window.");
    } else {
        for service in results.services.iter() {
            let _ = writeln!(
                output,
                "- {}: {} across {} bookings",
                service.service,
                format_currency(service.revenue),
                service.bookings
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Customer Type Distribution");
    if results.customer_types.is_empty() {
        let _ = writeln!(output, "No customers in this window.");
    } else {
        for share in results.customer_types.iter() {
            let _ = writeln!(
                output,
                "- {}: {:.1}%",
                share.customer_type, share.percentage
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Call Center Handling Share");
    if results.call_center.is_empty() {
        let _ = writeln!(output, "No call center data in this window.");
    } else {
        for entry in results.call_center.iter() {
            let _ = writeln!(
                output,
                "- {}: {} bookings",
                entry.handled_by_call_center, entry.count
            );
        }
    }

    output
}
