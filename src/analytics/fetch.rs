use std::collections::HashSet;

use serde::Serialize;
use tracing::{debug, info};

use super::events::{ActionCount, aggregate_top_actions, dedup_events};
use super::segments::{HVP_MIN_SCORE, converted_leads};
use crate::client::models::{Event, Lead, LeadProfile};
use crate::client::query::Query;
use crate::client::rest::SupabaseClient;
use crate::error::StoreError;

const EVENT_COLUMNS: &str = "anonymous_id,email,event_type,points,metadata,created_at";
const LEADS_PAGE: usize = 250;
const VISITORS_PAGE: usize = 1000;
const ROLLUP_LIMIT: usize = 200;
const CONVERTED_LIMIT: usize = 1000;
const RECENT_EVENTS: usize = 500;
const IN_BATCH: usize = 200;

#[derive(Debug, Default)]
pub struct DashboardData {
    /// Top leads from `v_lead_rollup`, highest score first.
    pub rollup: Vec<Lead>,
    pub leads: Vec<Lead>,
    pub events: Vec<Event>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DashboardMetrics {
    pub unique_visitors: usize,
    pub hvp_count: u64,
    pub emails_captured: u64,
    pub total_sessions: u64,
    pub avg_lead_score: f64,
}

pub async fn fetch_dashboard_data(db: &SupabaseClient) -> Result<DashboardData, StoreError> {
    let rollup = db
        .table("v_lead_rollup")
        .select("email,lead_score,last_seen,stage,anonymous_id")
        .order("lead_score", true)
        .limit(ROLLUP_LIMIT);
    let converted = db.table("leads").not_null("email").limit(CONVERTED_LIMIT);
    let events = db
        .table("events")
        .select(EVENT_COLUMNS)
        .order("created_at", true)
        .limit(RECENT_EVENTS);
    let recent = recent_leads(db).fetch_all::<Lead>(LEADS_PAGE);

    let (rollup, recent, converted, events) =
        tokio::try_join!(
            rollup.execute::<Lead>(),
            recent,
            converted.execute::<Lead>(),
            events.execute::<Event>()
        )?;

    let leads = merge_leads(recent, converted);
    info!(
        "Dashboard data: {} rollup rows, {} leads, {} events",
        rollup.len(),
        leads.len(),
        events.len()
    );
    Ok(DashboardData { rollup, leads, events })
}

// Paged reads need a total order, otherwise rows can repeat or go missing
// between pages.

fn recent_leads(db: &SupabaseClient) -> Query<'_> {
    db.table("leads").order("first_seen", true).order("anonymous_id", false)
}

fn visitor_ids(db: &SupabaseClient) -> Query<'_> {
    db.table("leads").select("anonymous_id").order("anonymous_id", false)
}

fn profile_events(db: &SupabaseClient) -> Query<'_> {
    db.table("v_lead_profiles").select("top_events").order("email", false)
}

/// Recent leads followed by converted ones, first row per `anonymous_id` kept.
fn merge_leads(recent: Vec<Lead>, converted: Vec<Lead>) -> Vec<Lead> {
    let mut seen: HashSet<Option<String>> = HashSet::new();
    recent
        .into_iter()
        .chain(converted)
        .filter(|lead| seen.insert(lead.anonymous_id.clone()))
        .collect()
}

pub async fn fetch_metrics(db: &SupabaseClient, leads: &[Lead]) -> Result<DashboardMetrics, StoreError> {
    let visitors = visitor_ids(db).fetch_all::<Lead>(VISITORS_PAGE);
    let hvp = db.table("leads").select("lead_score").gte("lead_score", HVP_MIN_SCORE);
    let emails = db.table("leads").select("email").not_null("email").neq("email", "");
    let sessions = db.table("sessions");

    let (visitors, hvp_count, emails_captured, total_sessions) =
        tokio::try_join!(visitors, hvp.count(), emails.count(), sessions.count())?;

    Ok(DashboardMetrics {
        unique_visitors: unique_visitors(&visitors),
        hvp_count,
        emails_captured,
        total_sessions,
        avg_lead_score: average_score(leads),
    })
}

pub fn unique_visitors(leads: &[Lead]) -> usize {
    leads.iter().filter_map(Lead::anonymous_key).collect::<HashSet<_>>().len()
}

/// Mean of the known scores, rounded to one decimal; 0 when there are none.
pub fn average_score(leads: &[Lead]) -> f64 {
    let scores: Vec<f64> = leads.iter().filter_map(|l| l.lead_score).collect();
    if scores.is_empty() {
        return 0.0;
    }
    let mean = scores.iter().sum::<f64>() / scores.len() as f64;
    (mean * 10.0).round() / 10.0
}

/// Every event tied to a converted lead by anonymous id or email.
pub async fn fetch_converted_events(db: &SupabaseClient, leads: &[Lead]) -> Result<Vec<Event>, StoreError> {
    let converted = converted_leads(leads);
    if converted.is_empty() {
        return Ok(Vec::new());
    }

    let ids = distinct(converted.iter().filter_map(|l| l.anonymous_key().map(str::to_string)));
    let emails = distinct(converted.iter().filter_map(Lead::email_key));

    let mut results: Vec<Event> = Vec::new();
    for (field, values) in [("anonymous_id", &ids), ("email", &emails)] {
        for batch in values.chunks(IN_BATCH) {
            let query = db.table("events").select(EVENT_COLUMNS).in_(field, batch);
            let rows: Vec<Event> = query.execute().await?;
            debug!("{} events for {} {} values", rows.len(), batch.len(), field);
            results.extend(rows);
        }
    }

    Ok(dedup_events(results))
}

fn distinct(values: impl Iterator<Item = String>) -> Vec<String> {
    let mut seen = HashSet::new();
    values.filter(|v| seen.insert(v.clone())).collect()
}

pub async fn fetch_top_actions(db: &SupabaseClient) -> Result<Vec<ActionCount>, StoreError> {
    let profiles: Vec<LeadProfile> = profile_events(db).fetch_all(VISITORS_PAGE).await?;
    Ok(aggregate_top_actions(&profiles))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lead(anon: Option<&str>, score: Option<f64>) -> Lead {
        Lead {
            anonymous_id: anon.map(str::to_string),
            lead_score: score,
            ..Default::default()
        }
    }

    fn order_of(query: &Query<'_>) -> Option<String> {
        query
            .url()
            .unwrap()
            .query_pairs()
            .find(|(k, _)| k == "order")
            .map(|(_, v)| v.into_owned())
    }

    #[test]
    fn paged_reads_have_a_stable_order() {
        let db = SupabaseClient::new("https://acme.supabase.co", "key", std::time::Duration::from_secs(5)).unwrap();
        assert_eq!(order_of(&recent_leads(&db)).as_deref(), Some("first_seen.desc,anonymous_id.asc"));
        assert_eq!(order_of(&visitor_ids(&db)).as_deref(), Some("anonymous_id.asc"));
        assert_eq!(order_of(&profile_events(&db)).as_deref(), Some("email.asc"));
    }

    #[test]
    fn merge_keeps_first_row_per_anonymous_id() {
        let mut recent_a = lead(Some("a"), Some(10.0));
        recent_a.stage = Some("MQL".into());
        let mut converted_a = lead(Some("a"), Some(10.0));
        converted_a.email = Some("a@x.com".into());

        let merged = merge_leads(vec![recent_a, lead(None, None)], vec![converted_a, lead(Some("b"), None), lead(None, None)]);
        assert_eq!(merged.len(), 3);
        assert_eq!(merged[0].stage.as_deref(), Some("MQL"));
        assert_eq!(merged[2].anonymous_id.as_deref(), Some("b"));
    }

    #[test]
    fn visitors_are_distinct_trimmed_ids() {
        let leads = vec![lead(Some("a"), None), lead(Some(" a "), None), lead(Some(""), None), lead(Some("b"), None)];
        assert_eq!(unique_visitors(&leads), 2);
    }

    #[test]
    fn average_ignores_missing_scores() {
        let leads = vec![lead(None, Some(10.0)), lead(None, Some(15.0)), lead(None, Some(20.25)), lead(None, None)];
        assert_eq!(average_score(&leads), 15.1);
        assert_eq!(average_score(&[]), 0.0);
    }

    #[test]
    fn distinct_keeps_first_occurrence() {
        let values = ["b", "a", "b"].into_iter().map(str::to_string);
        assert_eq!(distinct(values), vec!["b", "a"]);
    }
}
