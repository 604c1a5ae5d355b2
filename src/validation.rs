use std::sync::OnceLock;

use chrono::NaiveDate;
use regex::Regex;

use crate::error::{Result, TrackerError};
use crate::models::{CompanyUpdate, NewCompany, NewContactEntry, NewProject, MAIL_CHANNEL};

fn invalid(message: impl Into<String>) -> TrackerError {
    TrackerError::Validation(message.into())
}

fn email_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^[^@\s]{1,64}@[^@\s]+\.[^@\s]+$").unwrap_or_else(|_| unreachable!("static pattern"))
    })
}

/// Validation utilities for form input at the store boundary
#[derive(Debug, Copy, Clone)]
pub struct InputValidator;

impl InputValidator {
    /// Validate a company or reference name
    pub fn validate_name(name: &str) -> Result<()> {
        if name.trim().is_empty() {
            return Err(invalid("Name cannot be empty"));
        }

        if name.chars().count() > 200 {
            return Err(invalid("Name too long (max 200 characters)"));
        }

        if name.contains('\0') || name.contains('\r') || name.contains('\n') {
            return Err(invalid("Name contains invalid characters"));
        }

        Ok(())
    }

    /// Validate email format
    pub fn validate_email(email: &str) -> Result<()> {
        if email.trim().is_empty() {
            return Err(invalid("Email cannot be empty"));
        }

        if email.len() > 254 {
            return Err(invalid("Email too long (max 254 characters)"));
        }

        if !email_pattern().is_match(email) {
            return Err(invalid(format!("Not an email address: {email}")));
        }

        Ok(())
    }

    /// Validate a new company form
    pub fn validate_new_company(company: &NewCompany) -> Result<()> {
        Self::validate_name(&company.name)?;

        if company.contact.trim().is_empty() {
            return Err(invalid("Contact cannot be empty"));
        }
        if company.communication_channel.trim().is_empty() {
            return Err(invalid("Communication channel cannot be empty"));
        }
        if company.reach_method.trim().is_empty() {
            return Err(invalid("Reach method cannot be empty"));
        }

        // Newsletter resolution sends straight to `contact`.
        if company.communication_channel == MAIL_CHANNEL {
            Self::validate_email(&company.contact)?;
        }

        Ok(())
    }

    /// Validate a company update form
    pub fn validate_company_update(update: &CompanyUpdate) -> Result<()> {
        if update.is_empty() {
            return Err(invalid("Nothing to update"));
        }
        if let Some(name) = &update.name {
            Self::validate_name(name)?;
        }
        if let Some(contact) = &update.contact {
            if contact.trim().is_empty() {
                return Err(invalid("Contact cannot be empty"));
            }
        }
        if let (Some(channel), Some(contact)) = (&update.communication_channel, &update.contact) {
            if channel == MAIL_CHANNEL {
                Self::validate_email(contact)?;
            }
        }
        Ok(())
    }

    /// Validate a new contact-history entry
    pub fn validate_contact_entry(entry: &NewContactEntry) -> Result<()> {
        if entry.company_id.trim().is_empty() {
            return Err(invalid("Company is required"));
        }
        if entry.content.trim().is_empty() {
            return Err(invalid("Contact content cannot be empty"));
        }
        if entry.status.trim().is_empty() {
            return Err(invalid("Contact status cannot be empty"));
        }
        Ok(())
    }

    /// Validate a new project
    pub fn validate_project(project: &NewProject) -> Result<()> {
        if project.company_id.trim().is_empty() {
            return Err(invalid("Company is required"));
        }
        Self::validate_price(project.price)?;
        Self::validate_payment_date(project.billing_date, project.payment_date)
    }

    /// Validate a project price in yen
    pub fn validate_price(price: i64) -> Result<()> {
        if price < 0 {
            return Err(invalid("Price cannot be negative"));
        }
        Ok(())
    }

    /// Payment cannot precede billing
    pub fn validate_payment_date(billing: NaiveDate, payment: Option<NaiveDate>) -> Result<()> {
        if let Some(paid) = payment {
            if paid < billing {
                return Err(invalid("Payment date cannot be before billing date"));
            }
        }
        Ok(())
    }

    /// Parse a `YYYY-MM-DD` date from a form field
    pub fn parse_date(input: &str) -> Result<NaiveDate> {
        NaiveDate::parse_from_str(input.trim(), "%Y-%m-%d")
            .map_err(|_| TrackerError::InvalidDate(format!("{input} (expected YYYY-MM-DD)")))
    }

    /// Sanitize text input
    #[must_use]
    pub fn sanitize_text(text: &str) -> String {
        text.chars()
            .filter(|c| !c.is_control() || *c == '\n' || *c == '\t' || *c == '\r')
            .collect::<String>()
            .trim()
            .to_string()
    }

    /// Validate database URL
    pub fn validate_database_url(url: &str) -> Result<()> {
        if url.trim().is_empty() {
            return Err(invalid("Database URL cannot be empty"));
        }

        if !url.starts_with("sqlite:") {
            return Err(invalid("Only SQLite databases are supported"));
        }

        if url.len() > 1000 {
            return Err(invalid("Database URL too long"));
        }

        Ok(())
    }
}
