use chrono::{Duration, NaiveDate, NaiveDateTime};
use lead_tracker::dashboard::{ChartPoint, DashboardSummary};
use lead_tracker::db::Database;
use lead_tracker::models::{Company, NewCompany, NewContactEntry, NewProject, ProjectStatus, ReferenceKind};
use tempfile::TempDir;

fn now() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 10, 16)
        .and_then(|d| d.and_hms_opt(12, 0, 0))
        .expect("valid timestamp")
}

fn open() -> (TempDir, Database) {
    let dir = TempDir::new().expect("temp dir");
    let db = Database::new(&format!("sqlite://{}", dir.path().join("leads.db").display())).expect("db");
    (dir, db)
}

fn company(db: &Database, name: &str, channel: &str) -> Company {
    db.add_company(NewCompany {
        name: name.to_string(),
        contact: format!("{}@example.com", name.to_lowercase()),
        communication_channel: channel.to_string(),
        reach_method: "web".to_string(),
        ..NewCompany::default()
    })
    .expect("company")
}

fn contact(db: &Database, company: &Company, days_ago: i64) {
    db.add_contact(NewContactEntry {
        company_id: company.id.clone(),
        content: format!("{days_ago} days ago"),
        status: "initial".to_string(),
        contact_date: now().date() - Duration::days(days_ago),
    })
    .expect("contact");
}

fn summary(db: &Database) -> DashboardSummary {
    DashboardSummary::build(
        &db.list_companies().expect("companies"),
        &db.list_contacts().expect("contacts"),
        &db.list_projects().expect("projects"),
        &db.list_references(ReferenceKind::CommunicationChannel).expect("channels"),
        now(),
        Duration::days(30),
        5,
    )
}

#[test]
fn test_stale_leads_from_stored_history() {
    let (_dir, db) = open();
    let a = company(&db, "Alpha", "mail");
    let b = company(&db, "Bravo", "mail");
    let c = company(&db, "Charlie", "mail");
    contact(&db, &a, 40);
    contact(&db, &a, 70);
    contact(&db, &b, 10);

    let summary = summary(&db);
    let stale: Vec<_> = summary.stale_leads.iter().map(|lead| lead.company.id.as_str()).collect();
    assert_eq!(stale, vec![a.id.as_str(), c.id.as_str()]);

    let latest = summary.stale_leads[0].latest_contact.as_ref().expect("latest contact");
    assert_eq!(latest.content, "40 days ago");
    assert!(summary.stale_leads[1].latest_contact.is_none());
}

#[test]
fn test_dashboard_totals_and_charts() {
    let (_dir, db) = open();
    db.add_reference(ReferenceKind::CommunicationChannel, "mail").expect("channel");
    let a = company(&db, "Alpha", "mail");
    let b = company(&db, "Bravo", "mail");
    company(&db, "Charlie", "fax");
    contact(&db, &a, 1);
    contact(&db, &a, 2);
    contact(&db, &b, 3);

    for status in [ProjectStatus::Quoted, ProjectStatus::Quoted, ProjectStatus::Paid] {
        db.add_project(NewProject {
            company_id: a.id.clone(),
            price: 10_000,
            billing_date: now().date(),
            payment_date: None,
            status: Some(status),
        })
        .expect("project");
    }

    let summary = summary(&db);
    assert_eq!(summary.company_count, 3);
    assert_eq!(summary.contact_count, 3);
    assert_eq!(summary.project_count, 3);
    assert_eq!(summary.recent_contacts.len(), 3);

    assert_eq!(summary.contacts_per_company[0], ChartPoint { label: "Alpha".to_string(), value: 2 });
    assert_eq!(
        summary.projects_per_status,
        vec![
            ChartPoint { label: "見積済".to_string(), value: 2 },
            ChartPoint { label: "入金済".to_string(), value: 1 },
        ]
    );
    assert_eq!(
        summary.companies_per_channel,
        vec![
            ChartPoint { label: "mail".to_string(), value: 2 },
            ChartPoint { label: "未設定".to_string(), value: 1 },
        ]
    );
}

#[test]
fn test_recent_items_capped() {
    let (_dir, db) = open();
    for i in 0..8 {
        company(&db, &format!("Company{i}"), "phone");
    }
    let summary = summary(&db);
    assert_eq!(summary.company_count, 8);
    assert_eq!(summary.recent_companies.len(), 5);
    // Nobody was ever contacted
    assert_eq!(summary.stale_leads.len(), 8);
}
