use std::collections::BTreeMap;

use chrono::NaiveDate;
use colored::Colorize;
use serde::Serialize;

use super::report::{Table, heading, truncate};
use crate::analytics::events::{
    ActionCount, FunnelStep, MatchBasis, PATH_ITEMS, events_for_lead, lead_path,
};
use crate::analytics::fetch::DashboardMetrics;
use crate::analytics::format::{format_duration_ms, format_timestamp};
use crate::analytics::segments::LeadSegment;
use crate::client::models::{Event, Lead};

#[derive(Debug, Serialize)]
pub struct DashboardReport {
    pub metrics: DashboardMetrics,
    pub stage_distribution: Vec<(String, usize)>,
    pub top_actions: Vec<ActionCount>,
    pub funnel: Vec<FunnelStep>,
    pub funnel_basis: MatchBasis,
    pub event_trend: BTreeMap<NaiveDate, usize>,
    pub converted_trend: BTreeMap<NaiveDate, usize>,
    #[serde(skip)]
    pub recent: Vec<Event>,
}

pub fn print_dashboard(report: &DashboardReport) {
    let m = &report.metrics;
    heading("Leki Command Center");
    let mut metrics = Table::new(["Metric", "Value"]);
    metrics
        .row(["Total Tracked Visitors".to_string(), m.unique_visitors.to_string()])
        .row(["HVP Count (>=150)".to_string(), m.hvp_count.to_string()])
        .row(["Emails Captured".to_string(), m.emails_captured.to_string()])
        .row(["Total Sessions".to_string(), m.total_sessions.to_string()])
        .row(["Avg Lead Score".to_string(), format!("{:.1}", m.avg_lead_score)]);
    metrics.print();

    heading("Lead Stage Distribution");
    let mut stages = Table::new(["Stage", "Leads"]);
    for (stage, count) in &report.stage_distribution {
        stages.row([stage.clone(), count.to_string()]);
    }
    print_or_note(&stages, "No lead stage data available.");

    heading("Top Actions by Converted Leads");
    let mut actions = Table::new(["Action", "Count"]);
    for action in &report.top_actions {
        actions.row([action.action.clone(), action.count.to_string()]);
    }
    print_or_note(&actions, "No aggregated event data found.");

    heading("Converted Lead Funnel");
    let mut funnel = Table::new(["Event Type", "Events", "Leads"]);
    for step in &report.funnel {
        funnel.row([step.event_type.clone(), step.event_count.to_string(), step.lead_count.to_string()]);
    }
    print_or_note(&funnel, "No converted-lead events available for a funnel.");

    heading("Events Over Time");
    print_trend(&report.event_trend, "No dated events.");

    heading("Converted Lead Events Over Time");
    print_trend(&report.converted_trend, "No dated converted-lead events.");

    heading("Most Recent Live Actions");
    let mut recent = Table::new(["When", "Event", "Points", "Metadata"]);
    for event in &report.recent {
        recent.row([
            format_timestamp(event.created_at),
            event.kind().unwrap_or_default().to_string(),
            event.points.map(|p| p.to_string()).unwrap_or_default(),
            event
                .metadata
                .as_ref()
                .map(|m| truncate(&m.to_string(), 60))
                .unwrap_or_default(),
        ]);
    }
    print_or_note(&recent, "No recent events to display.");
}

fn print_trend(trend: &BTreeMap<NaiveDate, usize>, empty: &str) {
    let mut table = Table::new(["Date", "Events"]);
    for (day, count) in trend {
        table.row([day.to_string(), count.to_string()]);
    }
    print_or_note(&table, empty);
}

fn print_or_note(table: &Table, empty: &str) {
    if table.is_empty() {
        println!("{}", empty.dimmed());
    } else {
        table.print();
    }
}

/// One block per lead: identity and session details, then the page path.
pub fn print_leads(segment: LeadSegment, leads: &[Lead], events: &[Event]) {
    heading(segment.label());
    if leads.is_empty() {
        println!("{}", "No leads match the selected segment.".dimmed());
        return;
    }

    for lead in leads {
        println!(
            "\n{} | score {}",
            lead.label().bold(),
            lead.score().round() as i64
        );
        println!(
            "  Stage: {}   First Seen: {}   Last Seen: {}",
            lead.stage.as_deref().unwrap_or("UNKNOWN"),
            format_timestamp(lead.first_seen),
            format_timestamp(lead.last_seen)
        );
        println!(
            "  Session ID: {}   Anonymous ID: {}",
            or_na(lead.session_id.as_deref()),
            or_na(lead.anonymous_key())
        );
        let duration = format_duration_ms(lead.duration_ms);
        println!(
            "  Referrer: {}   Duration: {}",
            or_na(lead.referrer.as_deref()),
            or_na(Some(duration.as_str()))
        );

        let lead_events = events_for_lead(events, lead);
        if lead_events.is_empty() {
            println!("  {}", "No events found for this lead.".dimmed());
            continue;
        }
        let path = lead_path(&lead_events, PATH_ITEMS);
        if path.is_empty() {
            println!("  {}", "No page path data available in event metadata.".dimmed());
        }
        for item in path {
            println!("  - {}", item);
        }
    }
}

fn or_na(value: Option<&str>) -> &str {
    value.map(str::trim).filter(|v| !v.is_empty()).unwrap_or("N/A")
}
