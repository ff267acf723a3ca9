use std::collections::HashMap;

use serde::Serialize;

use crate::client::models::Lead;

pub const HVP_MIN_SCORE: f64 = 150.0;

/// Lead buckets shown in the converted-lead list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, clap::ValueEnum)]
pub enum LeadSegment {
    /// Score >= 150, any stage.
    HighValue,
    /// Stage SQL, score 100-149.
    SalesQualified,
    /// Stage MQL, score 0-99.
    MarketingQualified,
}

impl LeadSegment {
    pub fn label(&self) -> &'static str {
        match self {
            Self::HighValue => "High Value Prospects (HVP)",
            Self::SalesQualified => "Sales Qualified Leads",
            Self::MarketingQualified => "Marketing Qualified / Low Value",
        }
    }

    fn stage(&self) -> Option<&'static str> {
        match self {
            Self::HighValue => None,
            Self::SalesQualified => Some("SQL"),
            Self::MarketingQualified => Some("MQL"),
        }
    }

    fn score_window(&self) -> (f64, Option<f64>) {
        match self {
            Self::HighValue => (HVP_MIN_SCORE, None),
            Self::SalesQualified => (100.0, Some(149.0)),
            Self::MarketingQualified => (0.0, Some(99.0)),
        }
    }

    /// Stage comparison ignores case; a missing score counts as 0.
    pub fn matches(&self, lead: &Lead) -> bool {
        if let Some(stage) = self.stage() {
            let lead_stage = lead.stage.as_deref().unwrap_or_default().trim();
            if !lead_stage.eq_ignore_ascii_case(stage) {
                return false;
            }
        }
        let score = lead.score();
        let (min, max) = self.score_window();
        score >= min && max.is_none_or(|max| score <= max)
    }
}

/// Leads that left an email address.
pub fn converted_leads(leads: &[Lead]) -> Vec<Lead> {
    leads.iter().filter(|l| l.email_key().is_some()).cloned().collect()
}

pub fn filter_leads(leads: &[Lead], segment: LeadSegment) -> Vec<Lead> {
    leads.iter().filter(|l| segment.matches(l)).cloned().collect()
}

/// Lead count per stage, largest first. Leads without a stage are `UNKNOWN`.
pub fn stage_distribution(leads: &[Lead]) -> Vec<(String, usize)> {
    let mut counts: HashMap<String, usize> = HashMap::new();
    for lead in leads {
        let stage = lead.stage.clone().unwrap_or_else(|| "UNKNOWN".to_string());
        *counts.entry(stage).or_default() += 1;
    }

    let mut out: Vec<(String, usize)> = counts.into_iter().collect();
    out.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    out
}
