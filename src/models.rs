//! Data models for companies, contact history, projects and broadcasts
//!
//! This module contains all record types read from and written to the store,
//! plus the reference-list lookup used by every screen.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::error::TrackerError;

/// Communication channel name that makes a company reachable by newsletter.
pub const MAIL_CHANNEL: &str = "mail";

/// Status given to a new contact entry when none is chosen.
pub const DEFAULT_CONTACT_STATUS: &str = "initial";

/// A lead or client organization
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Company {
    /// Primary key (uuid)
    pub id: String,
    /// Display name
    pub name: String,
    /// Contact address; an email address when the channel is `mail`
    pub contact: String,
    /// Communication channel name
    pub communication_channel: String,
    /// Reach method name
    pub reach_method: String,
    /// Business type reference
    pub business_type_id: Option<i64>,
    /// Lead status reference
    pub lead_status_id: Option<i64>,
    /// Person in charge on our side
    pub person_in_charge: Option<String>,
    /// Creation timestamp
    pub created_at: NaiveDateTime,
    /// Last update timestamp
    pub updated_at: NaiveDateTime,
}

impl Company {
    /// True when newsletters go to this company by email.
    #[must_use]
    pub fn is_reachable_by_mail(&self) -> bool {
        self.communication_channel == MAIL_CHANNEL
    }
}

/// Data for creating a new company
#[derive(Debug, Clone, Default)]
pub struct NewCompany {
    /// Display name
    pub name: String,
    /// Contact address
    pub contact: String,
    /// Communication channel name
    pub communication_channel: String,
    /// Reach method name
    pub reach_method: String,
    /// Business type reference
    pub business_type_id: Option<i64>,
    /// Lead status reference
    pub lead_status_id: Option<i64>,
    /// Person in charge
    pub person_in_charge: Option<String>,
}

/// Partial update of a company; `None` leaves a field unchanged
#[derive(Debug, Clone, Default)]
pub struct CompanyUpdate {
    /// New display name
    pub name: Option<String>,
    /// New contact address
    pub contact: Option<String>,
    /// New communication channel
    pub communication_channel: Option<String>,
    /// New reach method
    pub reach_method: Option<String>,
    /// New business type reference
    pub business_type_id: Option<i64>,
    /// New lead status reference
    pub lead_status_id: Option<i64>,
    /// New person in charge
    pub person_in_charge: Option<String>,
}

impl CompanyUpdate {
    /// True when the update would not change anything.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.contact.is_none()
            && self.communication_channel.is_none()
            && self.reach_method.is_none()
            && self.business_type_id.is_none()
            && self.lead_status_id.is_none()
            && self.person_in_charge.is_none()
    }
}

/// Company id and name, as joined onto other rows
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompanyRef {
    /// Company primary key
    pub id: String,
    /// Company name
    pub name: String,
}

/// A dated log entry of communication with a company
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactEntry {
    /// Primary key (uuid)
    pub id: String,
    /// Company the contact belongs to
    pub company_id: Option<String>,
    /// Company name when the row was read with a join
    pub company_name: Option<String>,
    /// Free text
    pub content: String,
    /// Status label
    pub status: String,
    /// Calendar date of the contact
    pub contact_date: NaiveDate,
    /// Creation timestamp
    pub created_at: NaiveDateTime,
}

/// Data for logging a new contact
#[derive(Debug, Clone)]
pub struct NewContactEntry {
    /// Company the contact belongs to
    pub company_id: String,
    /// Free text
    pub content: String,
    /// Status label
    pub status: String,
    /// Calendar date of the contact
    pub contact_date: NaiveDate,
}

/// Fixed project status labels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProjectStatus {
    /// 調整中
    Arranging,
    /// 見積済
    Quoted,
    /// 請求済
    Invoiced,
    /// 納品済
    Delivered,
    /// 入金済
    Paid,
    /// キャンセル
    Cancelled,
}

impl ProjectStatus {
    /// Every status, in workflow order.
    pub const ALL: [Self; 6] = [
        Self::Arranging,
        Self::Quoted,
        Self::Invoiced,
        Self::Delivered,
        Self::Paid,
        Self::Cancelled,
    ];

    /// Stored label
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Arranging => "調整中",
            Self::Quoted => "見積済",
            Self::Invoiced => "請求済",
            Self::Delivered => "納品済",
            Self::Paid => "入金済",
            Self::Cancelled => "キャンセル",
        }
    }
}

impl fmt::Display for ProjectStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for ProjectStatus {
    type Err = TrackerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        Self::ALL
            .into_iter()
            .find(|status| status.label() == trimmed)
            .ok_or_else(|| TrackerError::Validation(format!("Unknown project status: {s}")))
    }
}

/// A billable engagement tied to a company
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    /// Primary key (uuid)
    pub id: String,
    /// Company the project belongs to
    pub company_id: Option<String>,
    /// Company name when the row was read with a join
    pub company_name: Option<String>,
    /// Price in yen
    pub price: i64,
    /// Billing date
    pub billing_date: NaiveDate,
    /// Payment date; `None` means unpaid
    pub payment_date: Option<NaiveDate>,
    /// Status label as stored; older rows may carry labels outside `ProjectStatus`
    pub status: Option<String>,
    /// Creation timestamp
    pub created_at: NaiveDateTime,
}

impl Project {
    /// True once a payment date has been recorded.
    #[must_use]
    pub const fn is_paid(&self) -> bool {
        self.payment_date.is_some()
    }
}

/// Data for creating a new project
#[derive(Debug, Clone)]
pub struct NewProject {
    /// Company the project belongs to
    pub company_id: String,
    /// Price in yen
    pub price: i64,
    /// Billing date
    pub billing_date: NaiveDate,
    /// Payment date
    pub payment_date: Option<NaiveDate>,
    /// Status
    pub status: Option<ProjectStatus>,
}

/// The four append-only category lists attached to companies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReferenceKind {
    /// Business type (業種)
    BusinessType,
    /// Communication channel (連絡媒体)
    CommunicationChannel,
    /// Reach method (リーチ手段)
    ReachMethod,
    /// Lead status
    LeadStatus,
}

impl ReferenceKind {
    /// Backing table name
    #[must_use]
    pub const fn table(&self) -> &'static str {
        match self {
            Self::BusinessType => "business_types",
            Self::CommunicationChannel => "communication_channels",
            Self::ReachMethod => "reach_methods",
            Self::LeadStatus => "lead_statuses",
        }
    }
}

impl fmt::Display for ReferenceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::BusinessType => "business type",
            Self::CommunicationChannel => "communication channel",
            Self::ReachMethod => "reach method",
            Self::LeadStatus => "lead status",
        };
        f.write_str(name)
    }
}

/// One entry of a reference list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferenceItem {
    /// Primary key
    pub id: i64,
    /// Display name
    pub name: String,
}

/// Id to name lookup for one reference list
#[derive(Debug, Clone, Default)]
pub struct ReferenceMap {
    names: HashMap<i64, String>,
}

impl ReferenceMap {
    /// Name for `id`, if the list has it.
    #[must_use]
    pub fn name_of(&self, id: i64) -> Option<&str> {
        self.names.get(&id).map(String::as_str)
    }

    /// Name for an optional reference, `"未設定"` when unset or dangling.
    #[must_use]
    pub fn label(&self, id: Option<i64>) -> &str {
        id.and_then(|id| self.name_of(id)).unwrap_or(UNSET_LABEL)
    }
}

impl FromIterator<ReferenceItem> for ReferenceMap {
    fn from_iter<I: IntoIterator<Item = ReferenceItem>>(iter: I) -> Self {
        Self {
            names: iter.into_iter().map(|item| (item.id, item.name)).collect(),
        }
    }
}

/// Label shown for a missing reference.
pub const UNSET_LABEL: &str = "未設定";

/// Kind tag stored on a sent record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BroadcastKind {
    /// Segmented email newsletter
    Newsletter,
    /// Slack channel announcement
    Slack,
}

impl BroadcastKind {
    /// Stored tag
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Newsletter => "newsletter",
            Self::Slack => "slack",
        }
    }
}

impl FromStr for BroadcastKind {
    type Err = TrackerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "newsletter" => Ok(Self::Newsletter),
            "slack" => Ok(Self::Slack),
            other => Err(TrackerError::Validation(format!("Unknown broadcast kind: {other}"))),
        }
    }
}

/// Persisted marker that a broadcast went out
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SentMail {
    /// Database primary key
    pub id: i64,
    /// CMS mail identifier
    pub mail_id: String,
    /// Broadcast kind
    pub kind: BroadcastKind,
    /// When the bookkeeping row was written
    pub sent_at: NaiveDateTime,
}

/// Kind of a CMS content block
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContentKind {
    /// HTML produced by the CMS rich editor
    #[serde(rename = "rich-editor")]
    RichEditor,
    /// Markdown source
    #[serde(rename = "markdown")]
    Markdown,
    /// Raw HTML
    #[serde(rename = "html")]
    Html,
    /// Anything else; rendered as escaped text
    #[serde(untagged)]
    Other(String),
}

/// One typed block of a mail body
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MailContent {
    /// Block kind
    #[serde(rename = "fieldId")]
    pub field_id: ContentKind,
    /// Block source
    pub contents: String,
}

/// A mail item from the headless CMS
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Mail {
    /// CMS identifier
    pub id: String,
    /// Subject line
    pub title: String,
    /// Short summary
    #[serde(default)]
    pub description: String,
    /// Publication timestamp as reported by the CMS
    pub published_at: Option<String>,
    /// Ordered content blocks
    #[serde(default)]
    pub contents: Vec<MailContent>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_project_status_round_trips_labels() {
        for status in ProjectStatus::ALL {
            assert_eq!(status.label().parse::<ProjectStatus>().ok(), Some(status));
        }
        assert!("done".parse::<ProjectStatus>().is_err());
    }

    #[test]
    fn test_reference_map_labels_missing_entries() {
        let map: ReferenceMap = vec![
            ReferenceItem { id: 1, name: "Enterprise".to_string() },
            ReferenceItem { id: 2, name: "Startup".to_string() },
        ]
        .into_iter()
        .collect();

        assert_eq!(map.name_of(2), Some("Startup"));
        assert_eq!(map.label(Some(1)), "Enterprise");
        assert_eq!(map.label(Some(9)), UNSET_LABEL);
        assert_eq!(map.label(None), UNSET_LABEL);
    }

    #[test]
    fn test_mail_deserializes_cms_shape() {
        let json = r##"{
            "id": "abc123",
            "title": "October news",
            "description": "Monthly update",
            "publishedAt": "2024-10-01T00:00:00.000Z",
            "contents": [
                {"fieldId": "rich-editor", "contents": "<p>hi</p>"},
                {"fieldId": "markdown", "contents": "# Title"},
                {"fieldId": "image", "contents": "plain"}
            ]
        }"##;
        let mail: Mail = serde_json::from_str(json).expect("valid mail json");
        assert_eq!(mail.id, "abc123");
        assert_eq!(mail.contents[0].field_id, ContentKind::RichEditor);
        assert_eq!(mail.contents[1].field_id, ContentKind::Markdown);
        assert_eq!(mail.contents[2].field_id, ContentKind::Other("image".to_string()));
    }

    #[test]
    fn test_broadcast_kind_parse() {
        assert_eq!("slack".parse::<BroadcastKind>().ok(), Some(BroadcastKind::Slack));
        assert!("fax".parse::<BroadcastKind>().is_err());
    }
}
