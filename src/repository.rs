use std::collections::HashSet;

use async_trait::async_trait;
use chrono::NaiveDateTime;

use crate::db::Database;
use crate::error::Result;
use crate::models::{BroadcastKind, Company, CompanyRef, ReferenceItem, ReferenceKind, SentMail};

/// The slice of the record store that broadcasts read and write.
///
/// `Database` is the production implementation; tests substitute mocks to
/// inject store failures at specific steps.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LeadRepository: Send + Sync {
    /// Companies whose business type is in `business_type_ids`
    async fn companies_in_business_types(&self, business_type_ids: &[i64]) -> Result<Vec<Company>>;

    /// Write the sent marker of a broadcast
    async fn record_sent_mail(&self, mail_id: &str, kind: BroadcastKind, sent_at: NaiveDateTime) -> Result<SentMail>;

    /// Link the companies a newsletter was addressed to
    async fn link_sent_companies(&self, mail_id: &str, company_ids: &[String]) -> Result<usize>;

    /// Earliest sent marker of any kind for a mail
    async fn first_sent_mail(&self, mail_id: &str) -> Result<Option<SentMail>>;

    /// Ids of every mail with a sent marker of any kind
    async fn sent_mail_ids(&self) -> Result<HashSet<String>>;

    /// Companies linked to a sent newsletter
    async fn companies_for_sent_mail(&self, mail_id: &str) -> Result<Vec<CompanyRef>>;

    /// One reference list ordered by name
    async fn list_references(&self, kind: ReferenceKind) -> Result<Vec<ReferenceItem>>;
}

#[async_trait]
impl LeadRepository for Database {
    async fn companies_in_business_types(&self, business_type_ids: &[i64]) -> Result<Vec<Company>> {
        Database::companies_in_business_types(self, business_type_ids)
    }

    async fn record_sent_mail(&self, mail_id: &str, kind: BroadcastKind, sent_at: NaiveDateTime) -> Result<SentMail> {
        Database::record_sent_mail(self, mail_id, kind, sent_at)
    }

    async fn link_sent_companies(&self, mail_id: &str, company_ids: &[String]) -> Result<usize> {
        Database::link_sent_companies(self, mail_id, company_ids)
    }

    async fn first_sent_mail(&self, mail_id: &str) -> Result<Option<SentMail>> {
        Database::first_sent_mail(self, mail_id)
    }

    async fn sent_mail_ids(&self) -> Result<HashSet<String>> {
        Database::sent_mail_ids(self)
    }

    async fn companies_for_sent_mail(&self, mail_id: &str) -> Result<Vec<CompanyRef>> {
        Database::companies_for_sent_mail(self, mail_id)
    }

    async fn list_references(&self, kind: ReferenceKind) -> Result<Vec<ReferenceItem>> {
        Database::list_references(self, kind)
    }
}
