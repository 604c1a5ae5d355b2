//! Dashboard computations: stale-lead detection and chart groupings.
//!
//! Everything here works on rows that were already fetched; nothing fails.

use std::collections::{BTreeMap, HashMap};

use chrono::{Datelike, Duration, NaiveDateTime, NaiveTime};
use serde::Serialize;

use crate::models::{Company, ContactEntry, Project, ReferenceItem, UNSET_LABEL};

/// A company with no recent contact
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StaleLead {
    /// The flagged company
    pub company: Company,
    /// Its most recent contact, if it was ever contacted
    pub latest_contact: Option<ContactEntry>,
}

/// Most recent contact per company id.
///
/// On equal dates the row that appears first in `contacts` wins.
#[must_use]
pub fn latest_contacts(contacts: &[ContactEntry]) -> HashMap<&str, &ContactEntry> {
    let mut latest: HashMap<&str, &ContactEntry> = HashMap::new();
    for contact in contacts {
        let Some(company_id) = contact.company_id.as_deref() else {
            continue;
        };
        latest
            .entry(company_id)
            .and_modify(|current| {
                if contact.contact_date > current.contact_date {
                    *current = contact;
                }
            })
            .or_insert(contact);
    }
    latest
}

/// Companies whose latest contact is missing or older than `now - threshold`.
///
/// A contact date counts as midnight of that day. Dated leads come first,
/// most recent contact first; never-contacted companies follow in input order.
#[must_use]
pub fn find_stale_leads(
    companies: &[Company],
    contacts: &[ContactEntry],
    now: NaiveDateTime,
    threshold: Duration,
) -> Vec<StaleLead> {
    let cutoff = now - threshold;
    let latest = latest_contacts(contacts);

    let mut stale: Vec<StaleLead> = companies
        .iter()
        .filter_map(|company| {
            let latest_contact = latest.get(company.id.as_str()).copied();
            let is_stale = latest_contact.map_or(true, |contact| contact.contact_date.and_time(NaiveTime::default()) < cutoff);
            is_stale.then(|| StaleLead {
                company: company.clone(),
                latest_contact: latest_contact.cloned(),
            })
        })
        .collect();

    // Stable: undated leads keep input order.
    stale.sort_by(|a, b| match (&a.latest_contact, &b.latest_contact) {
        (Some(a), Some(b)) => b.contact_date.cmp(&a.contact_date),
        (Some(_), None) => std::cmp::Ordering::Less,
        (None, Some(_)) => std::cmp::Ordering::Greater,
        (None, None) => std::cmp::Ordering::Equal,
    });
    stale
}

/// One bar or slice of a chart
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChartPoint {
    /// Category or month label
    pub label: String,
    /// Count for the label
    pub value: usize,
}

impl ChartPoint {
    fn new(label: impl Into<String>, value: usize) -> Self {
        Self {
            label: label.into(),
            value,
        }
    }
}

fn by_count_desc(points: &mut [ChartPoint]) {
    points.sort_by(|a, b| b.value.cmp(&a.value));
}

/// Contact counts for the `top` most contacted companies
#[must_use]
pub fn contacts_per_company(companies: &[Company], contacts: &[ContactEntry], top: usize) -> Vec<ChartPoint> {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for company_id in contacts.iter().filter_map(|c| c.company_id.as_deref()) {
        *counts.entry(company_id).or_default() += 1;
    }

    let mut points: Vec<ChartPoint> = companies
        .iter()
        .map(|company| ChartPoint::new(company.name.clone(), counts.get(company.id.as_str()).copied().unwrap_or(0)))
        .collect();
    by_count_desc(&mut points);
    points.truncate(top);
    points
}

/// Contact counts per calendar month (`YYYY-MM`), oldest month first
#[must_use]
pub fn contacts_per_month(contacts: &[ContactEntry]) -> Vec<ChartPoint> {
    let mut months: BTreeMap<(i32, u32), usize> = BTreeMap::new();
    for contact in contacts {
        *months
            .entry((contact.contact_date.year(), contact.contact_date.month()))
            .or_default() += 1;
    }
    months
        .into_iter()
        .map(|((year, month), count)| ChartPoint::new(format!("{year:04}-{month:02}"), count))
        .collect()
}

/// Project counts per status label, largest first
#[must_use]
pub fn projects_per_status(projects: &[Project]) -> Vec<ChartPoint> {
    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    for project in projects {
        *counts.entry(project.status.as_deref().unwrap_or(UNSET_LABEL)).or_default() += 1;
    }
    let mut points: Vec<ChartPoint> = counts.into_iter().map(|(label, n)| ChartPoint::new(label, n)).collect();
    by_count_desc(&mut points);
    points
}

/// Company counts per communication channel, largest first.
///
/// Channels missing from the reference list are pooled under `未設定`.
#[must_use]
pub fn companies_per_channel(companies: &[Company], channels: &[ReferenceItem]) -> Vec<ChartPoint> {
    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    for company in companies {
        let label = channels
            .iter()
            .find(|channel| channel.name == company.communication_channel)
            .map_or(UNSET_LABEL, |channel| channel.name.as_str());
        *counts.entry(label).or_default() += 1;
    }
    let mut points: Vec<ChartPoint> = counts.into_iter().map(|(label, n)| ChartPoint::new(label, n)).collect();
    by_count_desc(&mut points);
    points
}

fn newest_companies(companies: &[Company], limit: usize) -> Vec<Company> {
    let mut newest: Vec<&Company> = companies.iter().collect();
    newest.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    newest.into_iter().take(limit).cloned().collect()
}

/// Everything the dashboard screen shows
#[derive(Debug, Clone, Serialize)]
pub struct DashboardSummary {
    /// Companies needing follow-up, most recently contacted first
    pub stale_leads: Vec<StaleLead>,
    /// Total companies
    pub company_count: usize,
    /// Total contact entries
    pub contact_count: usize,
    /// Total projects
    pub project_count: usize,
    /// Newest companies
    pub recent_companies: Vec<Company>,
    /// Latest contacts
    pub recent_contacts: Vec<ContactEntry>,
    /// Latest projects by billing date
    pub recent_projects: Vec<Project>,
    /// Contact counts for the busiest companies
    pub contacts_per_company: Vec<ChartPoint>,
    /// Contact counts per `YYYY-MM`
    pub contacts_per_month: Vec<ChartPoint>,
    /// Project counts per status label
    pub projects_per_status: Vec<ChartPoint>,
    /// Company counts per communication channel
    pub companies_per_channel: Vec<ChartPoint>,
}

impl DashboardSummary {
    /// Build the dashboard from full table reads.
    ///
    /// `contacts` and `projects` are expected newest first, as the store
    /// returns them. Companies may come in any order.
    #[must_use]
    pub fn build(
        companies: &[Company],
        contacts: &[ContactEntry],
        projects: &[Project],
        channels: &[ReferenceItem],
        now: NaiveDateTime,
        stale_after: Duration,
        recent_items: usize,
    ) -> Self {
        Self {
            stale_leads: find_stale_leads(companies, contacts, now, stale_after),
            company_count: companies.len(),
            contact_count: contacts.len(),
            project_count: projects.len(),
            recent_companies: newest_companies(companies, recent_items),
            recent_contacts: contacts.iter().take(recent_items).cloned().collect(),
            recent_projects: projects.iter().take(recent_items).cloned().collect(),
            contacts_per_company: contacts_per_company(companies, contacts, recent_items),
            contacts_per_month: contacts_per_month(contacts),
            projects_per_status: projects_per_status(projects),
            companies_per_channel: companies_per_channel(companies, channels),
        }
    }
}
