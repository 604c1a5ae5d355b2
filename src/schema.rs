//! Database schema definitions
//!
//! This module provides constants for table and column names used with rusqlite.
//! The tables themselves are created by the SQL files under `migrations/`.

/// Companies table schema
pub mod companies {
    /// Table name
    pub const TABLE: &str = "companies";
    /// Primary key column (uuid text)
    pub const ID: &str = "id";
    /// Company name column
    pub const NAME: &str = "name";
    /// Contact address column (email, phone, form URL, ...)
    pub const CONTACT: &str = "contact";
    /// Communication channel name column
    pub const COMMUNICATION_CHANNEL: &str = "communication_channel";
    /// Reach method name column
    pub const REACH_METHOD: &str = "reach_method";
    /// Foreign key to business_types
    pub const BUSINESS_TYPE_ID: &str = "business_type_id";
    /// Foreign key to lead_statuses
    pub const LEAD_STATUS_ID: &str = "lead_status_id";
    /// Person in charge column
    pub const PERSON_IN_CHARGE: &str = "person_in_charge";
    /// Creation timestamp column
    pub const CREATED_AT: &str = "created_at";
    /// Last update timestamp column
    pub const UPDATED_AT: &str = "updated_at";
}

/// Contact history table schema
pub mod contact_history {
    /// Table name
    pub const TABLE: &str = "contact_history";
    /// Primary key column (uuid text)
    pub const ID: &str = "id";
    /// Foreign key to companies
    pub const COMPANY_ID: &str = "company_id";
    /// Free text content column
    pub const CONTENT: &str = "content";
    /// Status column
    pub const STATUS: &str = "status";
    /// Calendar date of the contact
    pub const CONTACT_DATE: &str = "contact_date";
    /// Creation timestamp column
    pub const CREATED_AT: &str = "created_at";
}

/// Projects table schema
pub mod projects {
    /// Table name
    pub const TABLE: &str = "projects";
    /// Primary key column (uuid text)
    pub const ID: &str = "id";
    /// Foreign key to companies
    pub const COMPANY_ID: &str = "company_id";
    /// Price in yen
    pub const PRICE: &str = "price";
    /// Billing date column
    pub const BILLING_DATE: &str = "billing_date";
    /// Payment date column, NULL while unpaid
    pub const PAYMENT_DATE: &str = "payment_date";
    /// Status label column
    pub const STATUS: &str = "status";
    /// Creation timestamp column
    pub const CREATED_AT: &str = "created_at";
}

/// Columns shared by the four reference list tables
pub mod reference {
    /// Primary key column
    pub const ID: &str = "id";
    /// Display name column
    pub const NAME: &str = "name";
    /// Creation timestamp column
    pub const CREATED_AT: &str = "created_at";
}

/// Sent mails table schema
pub mod sent_mails {
    /// Table name
    pub const TABLE: &str = "sent_mails";
    /// Primary key column
    pub const ID: &str = "id";
    /// CMS mail identifier
    pub const MAIL_ID: &str = "mail_id";
    /// Broadcast kind tag (newsletter, slack)
    pub const KIND: &str = "kind";
    /// Send timestamp column
    pub const SENT_AT: &str = "sent_at";
}

/// Sent mail to company link table schema
pub mod sent_mail_companies {
    /// Table name
    pub const TABLE: &str = "sent_mail_companies";
    /// CMS mail identifier the link belongs to
    pub const SENT_MAIL_ID: &str = "sent_mail_id";
    /// Foreign key to companies
    pub const COMPANY_ID: &str = "company_id";
}
