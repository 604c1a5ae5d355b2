//! Plain-text views printed by the CLI.

use crate::broadcast::{BroadcastReport, ChatReport, DeliveryStatus};
use crate::dashboard::{ChartPoint, DashboardSummary};
use crate::models::{Company, ContactEntry, Project, ReferenceItem, ReferenceKind, ReferenceMap, UNSET_LABEL};
use crate::service::{MailDetail, MailSummary};

const DATE_FORMAT: &str = "%Y-%m-%d";
const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M";

/// Yen amount with thousands separators, e.g. `¥1,234,567`
#[must_use]
pub fn format_yen(amount: i64) -> String {
    let digits = amount.unsigned_abs().to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    if amount < 0 {
        format!("-¥{grouped}")
    } else {
        format!("¥{grouped}")
    }
}

fn line(out: &mut String, text: impl AsRef<str>) {
    out.push_str(text.as_ref());
    out.push('\n');
}

fn or_unset(value: Option<&str>) -> &str {
    value.filter(|v| !v.is_empty()).unwrap_or(UNSET_LABEL)
}

#[must_use]
pub fn mail_list(mails: &[MailSummary]) -> String {
    let mut out = String::new();
    if mails.is_empty() {
        line(&mut out, "No mails published.");
        return out;
    }
    for summary in mails {
        let flag = if summary.sent { "sent" } else { "-" };
        line(
            &mut out,
            format!(
                "{:<6} {}  {}  {}",
                flag,
                summary.mail.id,
                summary.mail.title,
                summary.mail.published_at.as_deref().unwrap_or("")
            ),
        );
    }
    out
}

#[must_use]
pub fn mail_detail(detail: &MailDetail) -> String {
    let mut out = String::new();
    let mail = detail.mail();
    line(&mut out, format!("{} ({})", mail.title, mail.id));
    if !mail.description.is_empty() {
        line(&mut out, &mail.description);
    }
    line(&mut out, "");

    match detail {
        MailDetail::Sent {
            kind, sent_at, companies, ..
        } => {
            line(&mut out, format!("Sent at {} ({})", sent_at.format(DATETIME_FORMAT), kind.as_str()));
            line(&mut out, format!("Addressed to {} companies:", companies.len()));
            for company in companies {
                line(&mut out, format!("  {}  {}", company.id, company.name));
            }
        },
        MailDetail::Unsent { business_types, .. } => {
            line(&mut out, "Not sent yet. Business types to segment by:");
            for item in business_types {
                line(&mut out, format!("  [{}] {}", item.id, item.name));
            }
        },
    }
    out
}

#[must_use]
pub fn companies(companies: &[Company], business_types: &ReferenceMap, lead_statuses: &ReferenceMap) -> String {
    let mut out = String::new();
    for company in companies {
        line(
            &mut out,
            format!(
                "{}  {}  {} / {}  {}  {}",
                company.id,
                company.name,
                company.communication_channel,
                company.contact,
                business_types.label(company.business_type_id),
                lead_statuses.label(company.lead_status_id),
            ),
        );
    }
    line(&mut out, format!("{} companies", companies.len()));
    out
}

#[must_use]
pub fn company_detail(
    company: &Company,
    contacts: &[ContactEntry],
    projects: &[Project],
    business_types: &ReferenceMap,
    lead_statuses: &ReferenceMap,
) -> String {
    let mut out = String::new();
    line(&mut out, format!("{} ({})", company.name, company.id));
    line(&mut out, format!("  Contact:        {}", company.contact));
    line(&mut out, format!("  Channel:        {}", company.communication_channel));
    line(&mut out, format!("  Reach method:   {}", company.reach_method));
    line(&mut out, format!("  Business type:  {}", business_types.label(company.business_type_id)));
    line(&mut out, format!("  Lead status:    {}", lead_statuses.label(company.lead_status_id)));
    line(&mut out, format!("  In charge:      {}", or_unset(company.person_in_charge.as_deref())));
    line(&mut out, format!("  Updated:        {}", company.updated_at.format(DATETIME_FORMAT)));
    line(&mut out, "");
    line(&mut out, format!("Contact history ({})", contacts.len()));
    for contact in contacts {
        line(
            &mut out,
            format!("  {}  [{}]  {}", contact.contact_date.format(DATE_FORMAT), contact.status, contact.content),
        );
    }
    line(&mut out, "");
    line(&mut out, format!("Projects ({})", projects.len()));
    for project in projects {
        line(&mut out, format!("  {}", project_row(project)));
    }
    out
}

#[must_use]
pub fn contacts(contacts: &[ContactEntry]) -> String {
    let mut out = String::new();
    for contact in contacts {
        line(
            &mut out,
            format!(
                "{}  {}  [{}]  {}",
                contact.contact_date.format(DATE_FORMAT),
                or_unset(contact.company_name.as_deref()),
                contact.status,
                contact.content
            ),
        );
    }
    line(&mut out, format!("{} contacts", contacts.len()));
    out
}

fn project_row(project: &Project) -> String {
    let payment = project
        .payment_date
        .map_or_else(|| "unpaid".to_string(), |date| format!("paid {}", date.format(DATE_FORMAT)));
    format!(
        "{}  {}  {}  billed {}  {}  {}",
        project.id,
        or_unset(project.company_name.as_deref()),
        format_yen(project.price),
        project.billing_date.format(DATE_FORMAT),
        payment,
        or_unset(project.status.as_deref()),
    )
}

#[must_use]
pub fn projects(projects: &[Project]) -> String {
    let mut out = String::new();
    for project in projects {
        line(&mut out, project_row(project));
    }
    let unpaid: i64 = projects.iter().filter(|p| !p.is_paid()).map(|p| p.price).sum();
    line(&mut out, format!("{} projects, {} unpaid", projects.len(), format_yen(unpaid)));
    out
}

#[must_use]
pub fn references(kind: ReferenceKind, items: &[ReferenceItem]) -> String {
    let mut out = String::new();
    line(&mut out, format!("{kind} ({})", items.len()));
    for item in items {
        line(&mut out, format!("  [{}] {}", item.id, item.name));
    }
    out
}

fn chart(out: &mut String, title: &str, points: &[ChartPoint]) {
    line(out, title);
    let width = points.iter().map(|p| p.value).max().unwrap_or(0).max(1);
    for point in points {
        let bar = "#".repeat(point.value * 30 / width);
        line(out, format!("  {:<16} {:>4} {}", point.label, point.value, bar));
    }
    line(out, "");
}

#[must_use]
pub fn dashboard(summary: &DashboardSummary) -> String {
    let mut out = String::new();
    line(
        &mut out,
        format!(
            "Companies: {}  Contacts: {}  Projects: {}",
            summary.company_count, summary.contact_count, summary.project_count
        ),
    );
    line(&mut out, "");

    line(&mut out, format!("Stale leads ({})", summary.stale_leads.len()));
    for lead in &summary.stale_leads {
        let last = lead
            .latest_contact
            .as_ref()
            .map_or_else(|| "never contacted".to_string(), |c| format!("last contact {}", c.contact_date.format(DATE_FORMAT)));
        line(&mut out, format!("  {}  {}  {}", lead.company.id, lead.company.name, last));
    }
    line(&mut out, "");

    chart(&mut out, "Contacts per company", &summary.contacts_per_company);
    chart(&mut out, "Contacts per month", &summary.contacts_per_month);
    chart(&mut out, "Projects per status", &summary.projects_per_status);
    chart(&mut out, "Companies per channel", &summary.companies_per_channel);

    line(&mut out, "Recent companies");
    for company in &summary.recent_companies {
        line(&mut out, format!("  {}  {}", company.id, company.name));
    }
    line(&mut out, "Recent contacts");
    for contact in &summary.recent_contacts {
        line(
            &mut out,
            format!(
                "  {}  {}  {}",
                contact.contact_date.format(DATE_FORMAT),
                or_unset(contact.company_name.as_deref()),
                contact.content
            ),
        );
    }
    line(&mut out, "Recent projects");
    for project in &summary.recent_projects {
        line(&mut out, format!("  {}", project_row(project)));
    }
    out
}

#[must_use]
pub fn targets(companies: &[Company]) -> String {
    let mut out = String::new();
    for company in companies {
        line(&mut out, format!("  {}  {}  {}", company.id, company.name, company.contact));
    }
    line(&mut out, format!("{} recipients", companies.len()));
    out
}

#[must_use]
pub fn broadcast_report(report: &BroadcastReport) -> String {
    let mut out = String::new();
    for outcome in report.outcomes.iter().filter(|o| o.is_sent()) {
        line(&mut out, format!("  {}  {}  sent", outcome.company_name, outcome.recipient));
    }
    line(
        &mut out,
        format!(
            "Delivered {} of {}; {} companies recorded as sent.",
            report.delivered(),
            report.outcomes.len(),
            report.linked
        ),
    );

    let mut failed = report.failed().peekable();
    if failed.peek().is_some() {
        line(&mut out, "Failed deliveries:");
        for outcome in failed {
            if let DeliveryStatus::Failed(reason) = &outcome.status {
                line(&mut out, format!("  {}  {}  {}", outcome.company_name, outcome.recipient, reason));
            }
        }
    }
    out
}

#[must_use]
pub fn chat_report(report: &ChatReport) -> String {
    format!("Posted to {} (ts {}) for mail {}\n", report.channel, report.message_ts, report.sent_mail.mail_id)
}
