use std::collections::HashSet;
use std::fs;
use std::path::Path;
use std::time::Duration;

use chrono::{NaiveDateTime, Utc};
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row, ToSql};
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::DatabaseConfig;
use crate::error::{Result, TrackerError};
use crate::logging::OperationTimer;
use crate::models::{
    BroadcastKind, Company, CompanyRef, CompanyUpdate, ContactEntry, NewCompany, NewContactEntry, NewProject, Project,
    ReferenceItem, ReferenceKind, ReferenceMap, SentMail,
};
use crate::schema::{companies, contact_history, projects, reference, sent_mail_companies, sent_mails};
use crate::validation::InputValidator;

// Type alias for the database connection pool
pub type DbPool = Pool<SqliteConnectionManager>;
/// Connection checked out of [`DbPool`]
pub type DbConnection = r2d2::PooledConnection<SqliteConnectionManager>;

/// Database manager for handling connections and operations
#[derive(Clone)]
pub struct Database {
    pool: DbPool,
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database").field("state", &self.pool.state()).finish()
    }
}

/// Strip the `sqlite:` / `sqlite://` scheme off a configured URL.
fn database_path(database_url: &str) -> &str {
    database_url
        .strip_prefix("sqlite://")
        .or_else(|| database_url.strip_prefix("sqlite:"))
        .unwrap_or(database_url)
}

fn now() -> NaiveDateTime {
    Utc::now().naive_utc()
}

impl Database {
    /// Create a new database connection pool
    pub fn new(database_url: &str) -> Result<Self> {
        Self::with_pool_size(database_url, 10)
    }

    /// Open the database described by the `[database]` config section
    pub fn from_config(config: &DatabaseConfig) -> Result<Self> {
        Self::open(&config.url, config.max_connections, Duration::from_secs(config.connection_timeout_secs))
    }

    /// Create a pool with an explicit connection limit
    pub fn with_pool_size(database_url: &str, max_connections: u32) -> Result<Self> {
        Self::open(database_url, max_connections, Duration::from_secs(30))
    }

    fn open(database_url: &str, max_connections: u32, connection_timeout: Duration) -> Result<Self> {
        let path = database_path(database_url);

        // Create parent directory if it doesn't exist
        if let Some(parent) = Path::new(path).parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let manager = SqliteConnectionManager::file(path);
        let pool = Pool::builder()
            .max_size(max_connections)
            .connection_timeout(connection_timeout)
            .build(manager)?;

        let conn = pool.get()?;
        Self::run_migrations(&conn)?;
        info!(path, "Opened lead database");

        Ok(Self { pool })
    }

    /// Run database migrations
    fn run_migrations(conn: &Connection) -> Result<()> {
        conn.execute_batch(include_str!("../migrations/2024-10-01-000000_create_tables/up.sql"))?;
        conn.execute_batch(include_str!("../migrations/2024-11-15-000000_add_sent_mails/up.sql"))?;
        Ok(())
    }

    /// Get a connection from the pool
    pub fn get_connection(&self) -> Result<DbConnection> {
        Ok(self.pool.get()?)
    }

    /// Map a database row to a Company
    fn map_company(row: &Row) -> rusqlite::Result<Company> {
        Ok(Company {
            id: row.get(companies::ID)?,
            name: row.get(companies::NAME)?,
            contact: row.get(companies::CONTACT)?,
            communication_channel: row.get(companies::COMMUNICATION_CHANNEL)?,
            reach_method: row.get(companies::REACH_METHOD)?,
            business_type_id: row.get(companies::BUSINESS_TYPE_ID)?,
            lead_status_id: row.get(companies::LEAD_STATUS_ID)?,
            person_in_charge: row.get(companies::PERSON_IN_CHARGE)?,
            created_at: row.get(companies::CREATED_AT)?,
            updated_at: row.get(companies::UPDATED_AT)?,
        })
    }

    /// Map a contact_history row, with the joined company name when selected
    fn map_contact(row: &Row) -> rusqlite::Result<ContactEntry> {
        Ok(ContactEntry {
            id: row.get(contact_history::ID)?,
            company_id: row.get(contact_history::COMPANY_ID)?,
            company_name: row.get("company_name")?,
            content: row.get(contact_history::CONTENT)?,
            status: row.get(contact_history::STATUS)?,
            contact_date: row.get(contact_history::CONTACT_DATE)?,
            created_at: row.get(contact_history::CREATED_AT)?,
        })
    }

    /// Map a projects row, with the joined company name when selected
    fn map_project(row: &Row) -> rusqlite::Result<Project> {
        Ok(Project {
            id: row.get(projects::ID)?,
            company_id: row.get(projects::COMPANY_ID)?,
            company_name: row.get("company_name")?,
            price: row.get(projects::PRICE)?,
            billing_date: row.get(projects::BILLING_DATE)?,
            payment_date: row.get(projects::PAYMENT_DATE)?,
            status: row.get(projects::STATUS)?,
            created_at: row.get(projects::CREATED_AT)?,
        })
    }

    fn map_sent_mail(row: &Row) -> rusqlite::Result<(i64, String, String, NaiveDateTime)> {
        Ok((
            row.get(sent_mails::ID)?,
            row.get(sent_mails::MAIL_ID)?,
            row.get(sent_mails::KIND)?,
            row.get(sent_mails::SENT_AT)?,
        ))
    }

    fn into_sent_mail((id, mail_id, kind, sent_at): (i64, String, String, NaiveDateTime)) -> Result<SentMail> {
        Ok(SentMail {
            id,
            mail_id,
            kind: kind.parse()?,
            sent_at,
        })
    }

    // ---------------------------------------------------------------------
    // Companies
    // ---------------------------------------------------------------------

    /// All companies ordered by name
    pub fn list_companies(&self) -> Result<Vec<Company>> {
        let conn = self.get_connection()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT * FROM {} ORDER BY {} ASC",
            companies::TABLE,
            companies::NAME
        ))?;
        let rows = stmt.query_map([], Self::map_company)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// Get a company by id
    pub fn get_company(&self, id: &str) -> Result<Option<Company>> {
        let conn = self.get_connection()?;
        let company = conn
            .query_row(
                &format!("SELECT * FROM {} WHERE {} = ?", companies::TABLE, companies::ID),
                params![id],
                Self::map_company,
            )
            .optional()?;
        Ok(company)
    }

    /// Insert a new company
    pub fn add_company(&self, new_company: NewCompany) -> Result<Company> {
        InputValidator::validate_new_company(&new_company)?;
        let conn = self.get_connection()?;

        let created_at = now();
        let company = Company {
            id: Uuid::new_v4().to_string(),
            name: InputValidator::sanitize_text(&new_company.name),
            contact: new_company.contact.trim().to_string(),
            communication_channel: new_company.communication_channel.trim().to_string(),
            reach_method: new_company.reach_method.trim().to_string(),
            business_type_id: new_company.business_type_id,
            lead_status_id: new_company.lead_status_id,
            person_in_charge: new_company.person_in_charge,
            created_at,
            updated_at: created_at,
        };

        conn.execute(
            &format!(
                "INSERT INTO {} ({}, {}, {}, {}, {}, {}, {}, {}, {}, {}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
                companies::TABLE,
                companies::ID,
                companies::NAME,
                companies::CONTACT,
                companies::COMMUNICATION_CHANNEL,
                companies::REACH_METHOD,
                companies::BUSINESS_TYPE_ID,
                companies::LEAD_STATUS_ID,
                companies::PERSON_IN_CHARGE,
                companies::CREATED_AT,
                companies::UPDATED_AT
            ),
            params![
                company.id,
                company.name,
                company.contact,
                company.communication_channel,
                company.reach_method,
                company.business_type_id,
                company.lead_status_id,
                company.person_in_charge,
                company.created_at,
                company.updated_at
            ],
        )?;

        debug!(company_id = %company.id, name = %company.name, "Added company");
        Ok(company)
    }

    /// Apply a partial update to a company and return the stored row
    pub fn update_company(&self, id: &str, update: CompanyUpdate) -> Result<Company> {
        InputValidator::validate_company_update(&update)?;
        let existing = self
            .get_company(id)?
            .ok_or_else(|| TrackerError::not_found("company", id))?;

        // Mail recipients must keep a deliverable address after partial updates.
        let channel = update
            .communication_channel
            .as_deref()
            .unwrap_or(&existing.communication_channel);
        if channel == crate::models::MAIL_CHANNEL {
            InputValidator::validate_email(update.contact.as_deref().unwrap_or(&existing.contact))?;
        }

        let conn = self.get_connection()?;

        let mut update_fields = Vec::new();
        let mut update_params: Vec<Box<dyn ToSql>> = Vec::new();

        if let Some(name) = update.name {
            update_fields.push(format!("{} = ?", companies::NAME));
            update_params.push(Box::new(InputValidator::sanitize_text(&name)));
        }
        if let Some(contact) = update.contact {
            update_fields.push(format!("{} = ?", companies::CONTACT));
            update_params.push(Box::new(contact.trim().to_string()));
        }
        if let Some(channel) = update.communication_channel {
            update_fields.push(format!("{} = ?", companies::COMMUNICATION_CHANNEL));
            update_params.push(Box::new(channel));
        }
        if let Some(reach_method) = update.reach_method {
            update_fields.push(format!("{} = ?", companies::REACH_METHOD));
            update_params.push(Box::new(reach_method));
        }
        if let Some(business_type_id) = update.business_type_id {
            update_fields.push(format!("{} = ?", companies::BUSINESS_TYPE_ID));
            update_params.push(Box::new(business_type_id));
        }
        if let Some(lead_status_id) = update.lead_status_id {
            update_fields.push(format!("{} = ?", companies::LEAD_STATUS_ID));
            update_params.push(Box::new(lead_status_id));
        }
        if let Some(person) = update.person_in_charge {
            update_fields.push(format!("{} = ?", companies::PERSON_IN_CHARGE));
            update_params.push(Box::new(person));
        }

        update_fields.push(format!("{} = ?", companies::UPDATED_AT));
        update_params.push(Box::new(now()));
        update_params.push(Box::new(id.to_string()));

        let changed = conn.execute(
            &format!(
                "UPDATE {} SET {} WHERE {} = ?",
                companies::TABLE,
                update_fields.join(", "),
                companies::ID
            ),
            params_from_iter(update_params.iter()),
        )?;

        if changed == 0 {
            return Err(TrackerError::not_found("company", id));
        }

        self.get_company(id)?
            .ok_or_else(|| TrackerError::not_found("company", id))
    }

    /// Companies whose business type is one of `business_type_ids`
    pub fn companies_in_business_types(&self, business_type_ids: &[i64]) -> Result<Vec<Company>> {
        if business_type_ids.is_empty() {
            return Ok(Vec::new());
        }

        let _timer = OperationTimer::new("companies_in_business_types");
        let conn = self.get_connection()?;
        let placeholders = vec!["?"; business_type_ids.len()].join(", ");
        let mut stmt = conn.prepare(&format!(
            "SELECT * FROM {} WHERE {} IN ({}) ORDER BY {} ASC",
            companies::TABLE,
            companies::BUSINESS_TYPE_ID,
            placeholders,
            companies::NAME
        ))?;
        let rows = stmt.query_map(params_from_iter(business_type_ids.iter()), Self::map_company)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    // ---------------------------------------------------------------------
    // Contact history
    // ---------------------------------------------------------------------

    /// All contact entries with company names, newest first
    pub fn list_contacts(&self) -> Result<Vec<ContactEntry>> {
        let conn = self.get_connection()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT h.*, c.{name} AS company_name FROM {history} h \
             LEFT JOIN {companies} c ON c.{id} = h.{company_id} \
             ORDER BY h.{date} DESC",
            name = companies::NAME,
            history = contact_history::TABLE,
            companies = companies::TABLE,
            id = companies::ID,
            company_id = contact_history::COMPANY_ID,
            date = contact_history::CONTACT_DATE,
        ))?;
        let rows = stmt.query_map([], Self::map_contact)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// Contact entries for one company, newest first
    pub fn contacts_for_company(&self, company_id: &str) -> Result<Vec<ContactEntry>> {
        let conn = self.get_connection()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT h.*, c.{name} AS company_name FROM {history} h \
             LEFT JOIN {companies} c ON c.{id} = h.{company_id} \
             WHERE h.{company_id} = ? ORDER BY h.{date} DESC",
            name = companies::NAME,
            history = contact_history::TABLE,
            companies = companies::TABLE,
            id = companies::ID,
            company_id = contact_history::COMPANY_ID,
            date = contact_history::CONTACT_DATE,
        ))?;
        let rows = stmt.query_map(params![company_id], Self::map_contact)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// Log a contact with a company
    pub fn add_contact(&self, entry: NewContactEntry) -> Result<ContactEntry> {
        InputValidator::validate_contact_entry(&entry)?;
        let company = self
            .get_company(&entry.company_id)?
            .ok_or_else(|| TrackerError::not_found("company", entry.company_id.as_str()))?;

        let conn = self.get_connection()?;
        let contact = ContactEntry {
            id: Uuid::new_v4().to_string(),
            company_id: Some(company.id),
            company_name: Some(company.name),
            content: InputValidator::sanitize_text(&entry.content),
            status: entry.status.trim().to_string(),
            contact_date: entry.contact_date,
            created_at: now(),
        };

        conn.execute(
            &format!(
                "INSERT INTO {} ({}, {}, {}, {}, {}, {}) VALUES (?, ?, ?, ?, ?, ?)",
                contact_history::TABLE,
                contact_history::ID,
                contact_history::COMPANY_ID,
                contact_history::CONTENT,
                contact_history::STATUS,
                contact_history::CONTACT_DATE,
                contact_history::CREATED_AT
            ),
            params![
                contact.id,
                contact.company_id,
                contact.content,
                contact.status,
                contact.contact_date,
                contact.created_at
            ],
        )?;

        Ok(contact)
    }

    // ---------------------------------------------------------------------
    // Projects
    // ---------------------------------------------------------------------

    /// All projects with company names, latest billing first
    pub fn list_projects(&self) -> Result<Vec<Project>> {
        let conn = self.get_connection()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT p.*, c.{name} AS company_name FROM {projects} p \
             LEFT JOIN {companies} c ON c.{id} = p.{company_id} \
             ORDER BY p.{billing} DESC",
            name = companies::NAME,
            projects = projects::TABLE,
            companies = companies::TABLE,
            id = companies::ID,
            company_id = projects::COMPANY_ID,
            billing = projects::BILLING_DATE,
        ))?;
        let rows = stmt.query_map([], Self::map_project)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// Projects for one company, latest billing first
    pub fn projects_for_company(&self, company_id: &str) -> Result<Vec<Project>> {
        let conn = self.get_connection()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT p.*, c.{name} AS company_name FROM {projects} p \
             LEFT JOIN {companies} c ON c.{id} = p.{company_id} \
             WHERE p.{company_id} = ? ORDER BY p.{billing} DESC",
            name = companies::NAME,
            projects = projects::TABLE,
            companies = companies::TABLE,
            id = companies::ID,
            company_id = projects::COMPANY_ID,
            billing = projects::BILLING_DATE,
        ))?;
        let rows = stmt.query_map(params![company_id], Self::map_project)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// Insert a new project
    pub fn add_project(&self, new_project: NewProject) -> Result<Project> {
        InputValidator::validate_project(&new_project)?;
        let company = self
            .get_company(&new_project.company_id)?
            .ok_or_else(|| TrackerError::not_found("company", new_project.company_id.as_str()))?;

        let conn = self.get_connection()?;
        let project = Project {
            id: Uuid::new_v4().to_string(),
            company_id: Some(company.id),
            company_name: Some(company.name),
            price: new_project.price,
            billing_date: new_project.billing_date,
            payment_date: new_project.payment_date,
            status: new_project.status.map(|status| status.label().to_string()),
            created_at: now(),
        };

        conn.execute(
            &format!(
                "INSERT INTO {} ({}, {}, {}, {}, {}, {}, {}) VALUES (?, ?, ?, ?, ?, ?, ?)",
                projects::TABLE,
                projects::ID,
                projects::COMPANY_ID,
                projects::PRICE,
                projects::BILLING_DATE,
                projects::PAYMENT_DATE,
                projects::STATUS,
                projects::CREATED_AT
            ),
            params![
                project.id,
                project.company_id,
                project.price,
                project.billing_date,
                project.payment_date,
                project.status,
                project.created_at
            ],
        )?;

        Ok(project)
    }

    // ---------------------------------------------------------------------
    // Reference lists
    // ---------------------------------------------------------------------

    /// Entries of one reference list ordered by name
    pub fn list_references(&self, kind: ReferenceKind) -> Result<Vec<ReferenceItem>> {
        let conn = self.get_connection()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {}, {} FROM {} ORDER BY {} ASC",
            reference::ID,
            reference::NAME,
            kind.table(),
            reference::NAME
        ))?;
        let rows = stmt.query_map([], |row| {
            Ok(ReferenceItem {
                id: row.get(0)?,
                name: row.get(1)?,
            })
        })?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// Id to name lookup for one reference list
    pub fn reference_map(&self, kind: ReferenceKind) -> Result<ReferenceMap> {
        Ok(self.list_references(kind)?.into_iter().collect())
    }

    /// Append an entry to a reference list
    pub fn add_reference(&self, kind: ReferenceKind, name: &str) -> Result<ReferenceItem> {
        let name = InputValidator::sanitize_text(name);
        InputValidator::validate_name(&name)?;

        let conn = self.get_connection()?;
        conn.execute(
            &format!(
                "INSERT INTO {} ({}, {}) VALUES (?, ?)",
                kind.table(),
                reference::NAME,
                reference::CREATED_AT
            ),
            params![name, now()],
        )?;

        let item = ReferenceItem {
            id: conn.last_insert_rowid(),
            name,
        };
        debug!(%kind, id = item.id, name = %item.name, "Added reference entry");
        Ok(item)
    }

    // ---------------------------------------------------------------------
    // Broadcast bookkeeping
    // ---------------------------------------------------------------------

    /// Write the sent marker for a broadcast
    pub fn record_sent_mail(&self, mail_id: &str, kind: BroadcastKind, sent_at: NaiveDateTime) -> Result<SentMail> {
        let conn = self.get_connection()?;
        conn.execute(
            &format!(
                "INSERT INTO {} ({}, {}, {}) VALUES (?, ?, ?)",
                sent_mails::TABLE,
                sent_mails::MAIL_ID,
                sent_mails::KIND,
                sent_mails::SENT_AT
            ),
            params![mail_id, kind.as_str(), sent_at],
        )?;

        Ok(SentMail {
            id: conn.last_insert_rowid(),
            mail_id: mail_id.to_string(),
            kind,
            sent_at,
        })
    }

    /// Link every company a newsletter was addressed to; returns rows written
    pub fn link_sent_companies(&self, mail_id: &str, company_ids: &[String]) -> Result<usize> {
        if company_ids.is_empty() {
            return Ok(0);
        }

        let mut conn = self.get_connection()?;
        let tx = conn.transaction()?;
        let mut written = 0;
        {
            let mut stmt = tx.prepare(&format!(
                "INSERT INTO {} ({}, {}) VALUES (?, ?)",
                sent_mail_companies::TABLE,
                sent_mail_companies::SENT_MAIL_ID,
                sent_mail_companies::COMPANY_ID,
            ))?;
            for company_id in company_ids {
                written += stmt.execute(params![mail_id, company_id])?;
            }
        }
        tx.commit()?;
        Ok(written)
    }

    /// Earliest sent marker of `kind` for a mail, if any
    pub fn sent_mail(&self, mail_id: &str, kind: BroadcastKind) -> Result<Option<SentMail>> {
        let conn = self.get_connection()?;
        let row = conn
            .query_row(
                &format!(
                    "SELECT * FROM {} WHERE {} = ? AND {} = ? ORDER BY {} ASC LIMIT 1",
                    sent_mails::TABLE,
                    sent_mails::MAIL_ID,
                    sent_mails::KIND,
                    sent_mails::SENT_AT
                ),
                params![mail_id, kind.as_str()],
                Self::map_sent_mail,
            )
            .optional()?;
        row.map(Self::into_sent_mail).transpose()
    }

    /// Earliest sent marker of any kind for a mail, if any
    pub fn first_sent_mail(&self, mail_id: &str) -> Result<Option<SentMail>> {
        let conn = self.get_connection()?;
        let row = conn
            .query_row(
                &format!(
                    "SELECT * FROM {} WHERE {} = ? ORDER BY {} ASC LIMIT 1",
                    sent_mails::TABLE,
                    sent_mails::MAIL_ID,
                    sent_mails::SENT_AT
                ),
                params![mail_id],
                Self::map_sent_mail,
            )
            .optional()?;
        row.map(Self::into_sent_mail).transpose()
    }

    /// Ids of every mail with any sent marker
    pub fn sent_mail_ids(&self) -> Result<HashSet<String>> {
        let conn = self.get_connection()?;
        let mut stmt = conn.prepare(&format!("SELECT DISTINCT {} FROM {}", sent_mails::MAIL_ID, sent_mails::TABLE))?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        Ok(rows.collect::<rusqlite::Result<HashSet<_>>>()?)
    }

    /// Companies linked to a sent newsletter, ordered by name
    pub fn companies_for_sent_mail(&self, mail_id: &str) -> Result<Vec<CompanyRef>> {
        let conn = self.get_connection()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT c.{id}, c.{name} FROM {links} l \
             JOIN {companies} c ON c.{id} = l.{company_id} \
             WHERE l.{mail_id} = ? ORDER BY c.{name} ASC",
            id = companies::ID,
            name = companies::NAME,
            links = sent_mail_companies::TABLE,
            companies = companies::TABLE,
            company_id = sent_mail_companies::COMPANY_ID,
            mail_id = sent_mail_companies::SENT_MAIL_ID,
        ))?;
        let rows = stmt.query_map(params![mail_id], |row| {
            Ok(CompanyRef {
                id: row.get(0)?,
                name: row.get(1)?,
            })
        })?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }
}
