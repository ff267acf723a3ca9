//! Event-stream aggregations for the dashboard.

use std::collections::{BTreeMap, HashMap, HashSet};

use chrono::NaiveDate;
use serde::Serialize;
use serde_json::Value;

use crate::client::models::{Event, Lead, LeadProfile};

const PAGE_KEYS: [&str; 8] = ["page_path", "page_url", "path", "url", "href", "location", "page", "title"];

pub const FUNNEL_STEPS: usize = 10;
pub const TOP_ACTIONS: usize = 20;
pub const PATH_ITEMS: usize = 20;
pub const RECENT_ACTIONS: usize = 25;

/// Looks `key` up in event metadata stored either as a JSON object or as a
/// string holding one. Null and blank values count as missing.
pub fn metadata_value(metadata: Option<&Value>, key: &str) -> Option<String> {
    let value = match metadata? {
        Value::Object(map) => map.get(key).cloned(),
        Value::String(raw) => match serde_json::from_str::<Value>(raw) {
            Ok(Value::Object(mut map)) => map.remove(key),
            _ => None,
        },
        _ => None,
    }?;

    let text = match value {
        Value::Null => return None,
        Value::String(s) => s,
        other => other.to_string(),
    };
    let text = text.trim();
    (!text.is_empty()).then(|| text.to_string())
}

fn is_identity(event: &Event) -> bool {
    event
        .event_type
        .as_deref()
        .map(|t| t.trim().to_lowercase())
        .is_some_and(|t| t == "identify" || t == "identity")
}

pub fn filter_identity_events(events: &[Event]) -> Vec<Event> {
    events.iter().filter(|e| !is_identity(e)).cloned().collect()
}

/// Events sharing the lead's anonymous id, or its email ignoring case.
pub fn events_for_lead(events: &[Event], lead: &Lead) -> Vec<Event> {
    let anonymous = lead.anonymous_key();
    let email = lead.email_key();
    if anonymous.is_none() && email.is_none() {
        return Vec::new();
    }

    events
        .iter()
        .filter(|e| {
            let by_id = anonymous.is_some_and(|id| e.anonymous_id.as_deref().map(str::trim) == Some(id));
            let by_email = email
                .as_deref()
                .is_some_and(|mail| e.email.as_deref().map(|m| m.trim().to_lowercase()).as_deref() == Some(mail));
            by_id || by_email
        })
        .cloned()
        .collect()
}

pub fn event_page(event: &Event) -> Option<String> {
    PAGE_KEYS
        .iter()
        .find_map(|key| metadata_value(event.metadata.as_ref(), key))
}

/// `"{timestamp} | {event_type} | {page}"` for the lead's page-bearing
/// events in time order, keeping the last `limit`.
pub fn lead_path(events: &[Event], limit: usize) -> Vec<String> {
    let mut ordered: Vec<&Event> = events.iter().collect();
    // Undated events sort last.
    ordered.sort_by_key(|e| (e.created_at.is_none(), e.created_at));

    let items: Vec<String> = ordered
        .into_iter()
        .filter_map(|e| {
            let page = event_page(e)?;
            let kind = e.kind().unwrap_or("event");
            Some(format!("{} | {} | {}", super::format::format_timestamp(e.created_at), kind, page))
        })
        .collect();

    let skip = items.len().saturating_sub(limit);
    items.into_iter().skip(skip).collect()
}

/// Which identity linked events to converted leads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum MatchBasis {
    AnonymousId,
    Email,
    Unmatched,
}

#[derive(Debug, Clone)]
pub struct ConvertedEvent {
    pub event: Event,
    pub lead_key: String,
}

/// Attributes events to converted leads. Anonymous ids are preferred (from
/// the column, else from metadata); emails are used only when no converted
/// lead has an anonymous id.
pub fn match_converted_events(converted: &[Lead], events: &[Event]) -> (Vec<ConvertedEvent>, MatchBasis) {
    let ids: HashSet<&str> = converted.iter().filter_map(Lead::anonymous_key).collect();
    if !ids.is_empty() {
        let matched: Vec<ConvertedEvent> = events
            .iter()
            .filter_map(|e| {
                let key = e
                    .anonymous_id
                    .as_deref()
                    .map(str::trim)
                    .filter(|id| !id.is_empty())
                    .map(str::to_string)
                    .or_else(|| metadata_value(e.metadata.as_ref(), "anonymous_id"))?;
                ids.contains(key.as_str()).then(|| ConvertedEvent {
                    event: e.clone(),
                    lead_key: key,
                })
            })
            .collect();
        return (matched, MatchBasis::AnonymousId);
    }

    let emails: HashSet<String> = converted.iter().filter_map(Lead::email_key).collect();
    if emails.is_empty() {
        return (Vec::new(), MatchBasis::Unmatched);
    }
    let matched = events
        .iter()
        .filter_map(|e| {
            let key = e
                .email
                .as_deref()
                .map(|m| m.trim().to_lowercase())
                .filter(|m| !m.is_empty())
                .or_else(|| metadata_value(e.metadata.as_ref(), "email").map(|m| m.to_lowercase()))?;
            emails.contains(&key).then(|| ConvertedEvent {
                event: e.clone(),
                lead_key: key,
            })
        })
        .collect();
    (matched, MatchBasis::Email)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FunnelStep {
    pub event_type: String,
    pub event_count: usize,
    pub lead_count: usize,
}

/// Top event types by volume among converted-lead events, with the number of
/// distinct leads behind each. Identity events are left out.
pub fn conversion_funnel(events: &[ConvertedEvent]) -> Vec<FunnelStep> {
    let mut groups: HashMap<&str, (usize, HashSet<&str>)> = HashMap::new();
    for item in events.iter().filter(|c| !is_identity(&c.event)) {
        let Some(kind) = item.event.kind() else {
            continue;
        };
        let entry = groups.entry(kind).or_default();
        entry.0 += 1;
        entry.1.insert(item.lead_key.as_str());
    }

    let mut steps: Vec<FunnelStep> = groups
        .into_iter()
        .map(|(kind, (event_count, leads))| FunnelStep {
            event_type: kind.to_string(),
            event_count,
            lead_count: leads.len(),
        })
        .collect();
    steps.sort_by(|a, b| b.event_count.cmp(&a.event_count).then_with(|| a.event_type.cmp(&b.event_type)));
    steps.truncate(FUNNEL_STEPS);
    steps
}

/// Events per UTC calendar day, ascending. Undated events are ignored.
pub fn daily_trend(events: &[Event]) -> BTreeMap<NaiveDate, usize> {
    let mut trend = BTreeMap::new();
    for ts in events.iter().filter_map(|e| e.created_at) {
        *trend.entry(ts.date_naive()).or_default() += 1;
    }
    trend
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActionCount {
    pub action: String,
    pub count: i64,
}

/// Sums `top_events` across lead profiles. Both `{"action": count}` objects
/// and `[{"event_type": .., "count": ..}]` arrays are accepted.
pub fn aggregate_top_actions(profiles: &[LeadProfile]) -> Vec<ActionCount> {
    let mut totals: HashMap<String, i64> = HashMap::new();

    for events in profiles.iter().filter_map(|p| p.top_events.as_ref()) {
        match events {
            Value::Object(map) => {
                for (name, count) in map {
                    *totals.entry(name.clone()).or_default() += as_count(count);
                }
            }
            Value::Array(items) => {
                for item in items {
                    let name = item
                        .get("event_type")
                        .or_else(|| item.get("name"))
                        .and_then(Value::as_str)
                        .map(str::trim)
                        .filter(|n| !n.is_empty());
                    if let Some(name) = name {
                        let count = item.get("count").map(as_count).unwrap_or(0);
                        *totals.entry(name.to_string()).or_default() += count;
                    }
                }
            }
            _ => {}
        }
    }

    let mut actions: Vec<ActionCount> = totals
        .into_iter()
        .map(|(action, count)| ActionCount { action, count })
        .collect();
    actions.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.action.cmp(&b.action)));
    actions.truncate(TOP_ACTIONS);
    actions
}

fn as_count(value: &Value) -> i64 {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)).unwrap_or(0),
        Value::String(s) => s.trim().parse().unwrap_or(0),
        _ => 0,
    }
}

/// Newest first, undated events last.
pub fn recent_actions(events: &[Event], limit: usize) -> Vec<Event> {
    let mut sorted = events.to_vec();
    sorted.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    sorted.truncate(limit);
    sorted
}

/// Drops rows that were fetched twice through different filters.
pub fn dedup_events(events: Vec<Event>) -> Vec<Event> {
    let mut seen = HashSet::new();
    events
        .into_iter()
        .filter(|e| {
            let (anonymous, email, kind, points, at) = e.dedup_key();
            seen.insert((
                anonymous.map(str::to_string),
                email.map(str::to_string),
                kind.map(str::to_string),
                points,
                at,
            ))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use serde_json::json;

    fn event(anon: Option<&str>, email: Option<&str>, kind: &str, metadata: Value, hour: Option<u32>) -> Event {
        Event {
            anonymous_id: anon.map(str::to_string),
            email: email.map(str::to_string),
            event_type: Some(kind.to_string()),
            points: Some(5),
            metadata: Some(metadata),
            created_at: hour.map(|h| Utc.with_ymd_and_hms(2024, 5, 1, h, 0, 0).unwrap()),
        }
    }

    fn lead(anon: Option<&str>, email: Option<&str>) -> Lead {
        Lead {
            anonymous_id: anon.map(str::to_string),
            email: email.map(str::to_string),
            ..Default::default()
        }
    }

    #[test]
    fn metadata_lookup_handles_objects_and_json_strings() {
        let object = json!({ "page_path": "/helmets" });
        assert_eq!(metadata_value(Some(&object), "page_path").as_deref(), Some("/helmets"));

        let encoded = json!("{\"url\": \"https://shop/x\"}");
        assert_eq!(metadata_value(Some(&encoded), "url").as_deref(), Some("https://shop/x"));

        assert_eq!(metadata_value(Some(&json!("not json")), "url"), None);
        assert_eq!(metadata_value(Some(&json!({ "url": "  " })), "url"), None);
        assert_eq!(metadata_value(None, "url"), None);
    }

    #[test]
    fn page_uses_first_present_key() {
        let e = event(None, None, "page_view", json!({ "title": "Home", "href": "/home" }), None);
        assert_eq!(event_page(&e).as_deref(), Some("/home"));

        let bare = event(None, None, "click", json!({ "button": "buy" }), None);
        assert_eq!(event_page(&bare), None);
    }

    #[test]
    fn identity_events_are_dropped() {
        let events = vec![
            event(None, None, "Identify", json!({}), None),
            event(None, None, "identity", json!({}), None),
            event(None, None, "page_view", json!({}), None),
        ];
        let kept = filter_identity_events(&events);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].kind(), Some("page_view"));
    }

    #[test]
    fn lead_events_match_id_or_email() {
        let events = vec![
            event(Some(" anon-1 "), None, "a", json!({}), None),
            event(None, Some("Rider@Mail.com"), "b", json!({}), None),
            event(Some("anon-2"), None, "c", json!({}), None),
        ];
        let matched = events_for_lead(&events, &lead(Some("anon-1"), Some("rider@mail.com ")));
        let kinds: Vec<_> = matched.iter().filter_map(Event::kind).collect();
        assert_eq!(kinds, vec!["a", "b"]);

        assert!(events_for_lead(&events, &lead(None, None)).is_empty());
    }

    #[test]
    fn path_is_chronological_and_limited() {
        let events = vec![
            event(None, None, "page_view", json!({ "page_path": "/b" }), Some(11)),
            event(None, None, "click", json!({}), Some(10)),
            event(None, None, "page_view", json!({ "page_path": "/a" }), Some(9)),
            event(None, None, " ", json!({ "page_path": "/c" }), Some(12)),
        ];
        assert_eq!(
            lead_path(&events, 20),
            vec![
                "2024-05-01 09:00 | page_view | /a",
                "2024-05-01 11:00 | page_view | /b",
                "2024-05-01 12:00 | event | /c",
            ]
        );
        assert_eq!(lead_path(&events, 1), vec!["2024-05-01 12:00 | event | /c"]);
    }

    #[test]
    fn converted_events_prefer_anonymous_id_then_metadata() {
        let leads = vec![lead(Some("anon-1"), Some("a@x.com"))];
        let events = vec![
            event(Some("anon-1"), None, "view", json!({}), None),
            event(None, None, "view", json!({ "anonymous_id": "anon-1" }), None),
            event(None, Some("a@x.com"), "view", json!({}), None),
        ];
        let (matched, basis) = match_converted_events(&leads, &events);
        assert_eq!(basis, MatchBasis::AnonymousId);
        assert_eq!(matched.len(), 2);
        assert!(matched.iter().all(|m| m.lead_key == "anon-1"));
    }

    #[test]
    fn converted_events_fall_back_to_email() {
        let leads = vec![lead(None, Some("A@x.com"))];
        let events = vec![
            event(None, Some("a@X.com"), "view", json!({}), None),
            event(None, None, "view", json!({ "email": "a@x.com" }), None),
            event(None, Some("b@x.com"), "view", json!({}), None),
        ];
        let (matched, basis) = match_converted_events(&leads, &events);
        assert_eq!(basis, MatchBasis::Email);
        assert_eq!(matched.len(), 2);

        let (none, basis) = match_converted_events(&[lead(None, None)], &events);
        assert!(none.is_empty());
        assert_eq!(basis, MatchBasis::Unmatched);
    }

    #[test]
    fn funnel_counts_events_and_distinct_leads() {
        let converted = |anon: &str, kind: &str| ConvertedEvent {
            event: event(Some(anon), None, kind, json!({}), None),
            lead_key: anon.to_string(),
        };
        let events = vec![
            converted("a", "view"),
            converted("a", "view"),
            converted("b", "view"),
            converted("a", "add_to_cart"),
            converted("a", "identify"),
        ];
        assert_eq!(
            conversion_funnel(&events),
            vec![
                FunnelStep {
                    event_type: "view".into(),
                    event_count: 3,
                    lead_count: 2
                },
                FunnelStep {
                    event_type: "add_to_cart".into(),
                    event_count: 1,
                    lead_count: 1
                },
            ]
        );
    }

    #[test]
    fn funnel_keeps_top_ten() {
        let events: Vec<ConvertedEvent> = (0..12)
            .flat_map(|i| {
                (0..=i).map(move |_| ConvertedEvent {
                    event: event(Some("a"), None, &format!("step{i:02}"), json!({}), None),
                    lead_key: "a".into(),
                })
            })
            .collect();
        let funnel = conversion_funnel(&events);
        assert_eq!(funnel.len(), FUNNEL_STEPS);
        assert_eq!(funnel[0].event_type, "step11");
    }

    #[test]
    fn trend_groups_by_day() {
        let day2 = Utc.with_ymd_and_hms(2024, 5, 2, 8, 0, 0).unwrap();
        let mut events = vec![
            event(None, None, "a", json!({}), Some(1)),
            event(None, None, "a", json!({}), Some(2)),
            event(None, None, "a", json!({}), None),
        ];
        events.push(Event {
            created_at: Some(day2),
            ..Default::default()
        });

        let trend: Vec<(String, usize)> = daily_trend(&events)
            .into_iter()
            .map(|(d, n)| (d.to_string(), n))
            .collect();
        assert_eq!(trend, vec![("2024-05-01".into(), 2), ("2024-05-02".into(), 1)]);
    }

    #[test]
    fn top_actions_accept_objects_and_arrays() {
        let profiles = vec![
            LeadProfile {
                top_events: Some(json!({ "page_view": 4, "add_to_cart": "2" })),
            },
            LeadProfile {
                top_events: Some(json!([{ "event_type": "page_view", "count": 3 }, { "count": 9 }])),
            },
            LeadProfile::default(),
        ];
        assert_eq!(
            aggregate_top_actions(&profiles),
            vec![
                ActionCount {
                    action: "page_view".into(),
                    count: 7
                },
                ActionCount {
                    action: "add_to_cart".into(),
                    count: 2
                },
            ]
        );
    }

    #[test]
    fn recent_actions_are_newest_first() {
        let events = vec![
            event(None, None, "old", json!({}), Some(1)),
            event(None, None, "undated", json!({}), None),
            event(None, None, "new", json!({}), Some(5)),
        ];
        let recent = recent_actions(&events, 2);
        let kinds: Vec<_> = recent.iter().filter_map(Event::kind).collect();
        assert_eq!(kinds, vec!["new", "old"]);
    }

    #[test]
    fn duplicate_rows_collapse() {
        let e = event(Some("a"), Some("a@x.com"), "view", json!({ "x": 1 }), Some(3));
        let mut other = e.clone();
        other.metadata = Some(json!({ "x": 2 }));
        assert_eq!(dedup_events(vec![e.clone(), other, e]).len(), 1);
    }
}
