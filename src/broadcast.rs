//! Segmented newsletter and chat broadcasts.
//!
//! A newsletter runs in three steps: resolve the target companies, send one
//! message per company, then record what was sent. Deliveries are never
//! rolled back; the returned report says who actually received the mail.

use std::sync::{Arc, Mutex};
use std::time::Instant;

use chrono::Utc;
use serde::Serialize;
use tracing::{error, info, instrument, warn};

use crate::cache::{mail_detail_path, Invalidate, ViewCache, MAIL_LIST_PATH};
use crate::error::{Result, TrackerError};
use crate::logging::OperationTimer;
use crate::mailer::{MailSender, OutgoingMail};
use crate::metrics::MetricsCollector;
use crate::models::{BroadcastKind, Company, MailContent, SentMail, MAIL_CHANNEL};
use crate::repository::LeadRepository;
use crate::slack::ChatSender;
use crate::template::render_email;

/// Result of one per-company delivery
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum DeliveryStatus {
    /// Accepted by the mail transport
    Sent,
    /// Rejected; carries the transport's error text
    Failed(String),
}

/// Delivery result for one target company
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeliveryOutcome {
    /// Target company id
    pub company_id: String,
    /// Target company name, used in the greeting
    pub company_name: String,
    /// Address the message was sent to
    pub recipient: String,
    /// What the transport reported
    pub status: DeliveryStatus,
}

impl DeliveryOutcome {
    /// True when the message was accepted
    pub fn is_sent(&self) -> bool {
        self.status == DeliveryStatus::Sent
    }
}

/// Everything a newsletter send did
#[derive(Debug, Clone, Serialize)]
pub struct BroadcastReport {
    /// Bookkeeping row written after the loop
    pub sent_mail: SentMail,
    /// One entry per target, in target order
    pub outcomes: Vec<DeliveryOutcome>,
    /// Number of companies linked to the sent record
    pub linked: usize,
}

impl BroadcastReport {
    /// Number of accepted deliveries
    pub fn delivered(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_sent()).count()
    }

    /// Targets whose delivery was rejected, in target order
    pub fn failed(&self) -> impl Iterator<Item = &DeliveryOutcome> {
        self.outcomes.iter().filter(|o| !o.is_sent())
    }
}

/// Result of a chat announcement
#[derive(Debug, Clone, Serialize)]
pub struct ChatReport {
    /// Bookkeeping row of kind `slack`
    pub sent_mail: SentMail,
    /// Channel the message went to
    pub channel: String,
    /// Message timestamp returned by the chat service
    pub message_ts: String,
}

/// Companies a newsletter would go to.
///
/// Keeps companies in one of `business_type_ids` whose channel is `mail`,
/// minus any id in `exclude`.
pub async fn resolve_targets(
    repo: &dyn LeadRepository,
    business_type_ids: &[i64],
    exclude: &[String],
) -> Result<Vec<Company>> {
    let companies = repo.companies_in_business_types(business_type_ids).await?;
    Ok(companies
        .into_iter()
        .filter(Company::is_reachable_by_mail)
        .filter(|company| !exclude.contains(&company.id))
        .collect())
}

/// Sends newsletters and chat announcements and records them.
///
/// Delivery goes through the `MailSender` and `ChatSender` seams; the
/// bookkeeping goes through `LeadRepository`.
pub struct Broadcaster {
    repo: Arc<dyn LeadRepository>,
    mailer: Arc<dyn MailSender>,
    chat: Arc<dyn ChatSender>,
    cache: Option<Arc<ViewCache>>,
    metrics: Mutex<MetricsCollector>,
}

impl Broadcaster {
    /// Broadcaster without a view cache
    pub fn new(repo: Arc<dyn LeadRepository>, mailer: Arc<dyn MailSender>, chat: Arc<dyn ChatSender>) -> Self {
        Self {
            repo,
            mailer,
            chat,
            cache: None,
            metrics: Mutex::new(MetricsCollector::default()),
        }
    }

    /// Invalidate rendered mail views in `cache` after every broadcast
    #[must_use]
    pub fn with_cache(mut self, cache: Arc<ViewCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Snapshot of the delivery counters
    pub fn metrics(&self) -> MetricsCollector {
        self.metrics.lock().map(|m| m.clone()).unwrap_or_default()
    }

    fn with_metrics(&self, record: impl FnOnce(&mut MetricsCollector)) {
        if let Ok(mut metrics) = self.metrics.lock() {
            record(&mut metrics);
        }
    }

    /// Targets for a newsletter, see [`resolve_targets`]
    pub async fn resolve_targets(&self, business_type_ids: &[i64], exclude: &[String]) -> Result<Vec<Company>> {
        resolve_targets(self.repo.as_ref(), business_type_ids, exclude).await
    }

    /// Send `title` to every company in `targets`, one message each.
    ///
    /// Every target is linked to the sent record, including those whose
    /// delivery failed.
    #[instrument(skip(self, contents, targets), fields(targets = targets.len()))]
    pub async fn send_newsletter(
        &self,
        mail_id: &str,
        title: &str,
        contents: &[MailContent],
        targets: &[Company],
    ) -> Result<BroadcastReport> {
        if targets.is_empty() {
            return Err(TrackerError::NoRecipients(mail_id.to_string()));
        }

        let started = Instant::now();
        let timer = OperationTimer::new("send_newsletter");
        let mut outcomes = Vec::with_capacity(targets.len());

        for company in targets {
            let mail = OutgoingMail {
                to: company.contact.clone(),
                subject: title.to_string(),
                html_body: render_email(contents, Some(&company.name)),
            };

            let status = match self.mailer.send(&mail).await {
                Ok(()) => {
                    info!(company_id = %company.id, recipient = %mail.to, "Newsletter delivered");
                    DeliveryStatus::Sent
                },
                Err(e) => {
                    warn!(company_id = %company.id, recipient = %mail.to, error = %e, "Newsletter delivery failed");
                    DeliveryStatus::Failed(e.to_string())
                },
            };
            self.with_metrics(|m| m.record_delivery(MAIL_CHANNEL, status == DeliveryStatus::Sent));

            outcomes.push(DeliveryOutcome {
                company_id: company.id.clone(),
                company_name: company.name.clone(),
                recipient: mail.to,
                status,
            });
        }

        let delivered = outcomes.iter().filter(|o| o.is_sent()).count();
        let company_ids: Vec<String> = targets.iter().map(|c| c.id.clone()).collect();

        let bookkeeping_started = Instant::now();
        let recorded = self.record_newsletter(mail_id, &company_ids).await;
        self.with_metrics(|m| m.record_db_operation("record_newsletter", bookkeeping_started.elapsed(), recorded.is_ok()));

        // The sent marker may exist even when linking failed
        self.invalidate_views(mail_id);

        let (sent_mail, linked) = match recorded {
            Ok(recorded) => recorded,
            Err(source) => {
                error!(mail_id, delivered, error = %source, "Newsletter sent but bookkeeping failed");
                self.with_metrics(|m| m.record_error("bookkeeping"));
                return Err(TrackerError::BookkeepingFailed {
                    mail_id: mail_id.to_string(),
                    delivered,
                    source: Box::new(source),
                });
            },
        };

        self.with_metrics(|m| m.record_broadcast(BroadcastKind::Newsletter.as_str(), started.elapsed()));
        timer.finish();
        info!(mail_id, delivered, failed = outcomes.len() - delivered, linked, "Newsletter broadcast finished");

        Ok(BroadcastReport {
            sent_mail,
            outcomes,
            linked,
        })
    }

    async fn record_newsletter(&self, mail_id: &str, company_ids: &[String]) -> Result<(SentMail, usize)> {
        let sent_mail = self
            .repo
            .record_sent_mail(mail_id, BroadcastKind::Newsletter, Utc::now().naive_utc())
            .await?;
        let linked = self.repo.link_sent_companies(mail_id, company_ids).await?;
        Ok((sent_mail, linked))
    }

    /// Post `text` to `channel` and record the announcement
    #[instrument(skip(self, text))]
    pub async fn send_slack(&self, mail_id: &str, channel: &str, text: &str) -> Result<ChatReport> {
        let started = Instant::now();

        let message_ts = match self.chat.post_message(channel, text).await {
            Ok(ts) => ts,
            Err(e) => {
                self.with_metrics(|m| m.record_delivery("slack", false));
                return Err(e);
            },
        };
        self.with_metrics(|m| m.record_delivery("slack", true));

        let sent_mail = self
            .repo
            .record_sent_mail(mail_id, BroadcastKind::Slack, Utc::now().naive_utc())
            .await
            .map_err(|source| TrackerError::BookkeepingFailed {
                mail_id: mail_id.to_string(),
                delivered: 1,
                source: Box::new(source),
            })?;

        self.invalidate_views(mail_id);
        self.with_metrics(|m| m.record_broadcast(BroadcastKind::Slack.as_str(), started.elapsed()));
        info!(mail_id, channel, "Slack announcement posted");

        Ok(ChatReport {
            sent_mail,
            channel: channel.to_string(),
            message_ts,
        })
    }

    fn invalidate_views(&self, mail_id: &str) {
        let Some(cache) = &self.cache else {
            return;
        };
        let results = [
            cache.invalidate(MAIL_LIST_PATH, Invalidate::Layout),
            cache.invalidate(&mail_detail_path(mail_id), Invalidate::Page),
        ];
        for result in results {
            if let Err(e) = result {
                warn!(mail_id, error = %e, "Failed to invalidate mail views");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mailer::MockMailSender;
    use crate::models::{ContentKind, SentMail};
    use crate::repository::MockLeadRepository;
    use crate::slack::MockChatSender;
    use chrono::NaiveDateTime;

    fn company(id: &str, channel: &str) -> Company {
        let now = Utc::now().naive_utc();
        Company {
            id: id.to_string(),
            name: format!("{id} Inc."),
            contact: format!("{id}@example.com"),
            communication_channel: channel.to_string(),
            reach_method: "web".to_string(),
            business_type_id: Some(1),
            lead_status_id: None,
            person_in_charge: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn body() -> Vec<MailContent> {
        vec![MailContent {
            field_id: ContentKind::RichEditor,
            contents: "<p>News</p>".to_string(),
        }]
    }

    fn sent(mail_id: &str, kind: BroadcastKind, sent_at: NaiveDateTime) -> Result<SentMail> {
        Ok(SentMail {
            id: 1,
            mail_id: mail_id.to_string(),
            kind,
            sent_at,
        })
    }

    fn broadcaster(repo: MockLeadRepository, mailer: MockMailSender) -> Broadcaster {
        Broadcaster::new(Arc::new(repo), Arc::new(mailer), Arc::new(MockChatSender::new()))
    }

    #[tokio::test]
    async fn test_resolution_filters_channel_and_exclusions() {
        let mut repo = MockLeadRepository::new();
        repo.expect_companies_in_business_types()
            .withf(|ids| ids == [1, 2])
            .returning(|_| Ok(vec![company("x", "mail"), company("y", "phone"), company("z", "mail")]));

        let targets = resolve_targets(&repo, &[1, 2], &["z".to_string()]).await.expect("targets");
        let ids: Vec<_> = targets.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["x"]);
    }

    #[tokio::test]
    async fn test_failed_delivery_does_not_stop_loop_and_is_still_linked() {
        let mut repo = MockLeadRepository::new();
        repo.expect_record_sent_mail()
            .withf(|id, kind, _| id == "m1" && *kind == BroadcastKind::Newsletter)
            .times(1)
            .returning(|id, kind, at| sent(id, kind, at));
        repo.expect_link_sent_companies()
            .withf(|id, ids| id == "m1" && ids == ["x".to_string(), "z".to_string()])
            .times(1)
            .returning(|_, ids| Ok(ids.len()));

        let mut mailer = MockMailSender::new();
        mailer
            .expect_send()
            .withf(|mail| mail.to == "x@example.com")
            .times(1)
            .returning(|_| Err(TrackerError::Mail("mailbox unavailable".to_string())));
        mailer
            .expect_send()
            .withf(|mail| mail.to == "z@example.com" && mail.html_body.contains("z Inc.様"))
            .times(1)
            .returning(|_| Ok(()));

        let b = broadcaster(repo, mailer);
        let report = b
            .send_newsletter("m1", "Hello", &body(), &[company("x", "mail"), company("z", "mail")])
            .await
            .expect("report");

        assert_eq!(report.delivered(), 1);
        assert_eq!(report.linked, 2);
        assert!(matches!(report.outcomes[0].status, DeliveryStatus::Failed(_)));
        assert_eq!(report.outcomes[1].status, DeliveryStatus::Sent);
        assert_eq!(b.metrics().deliveries_failed, 1);
        assert_eq!(b.metrics().broadcasts_total, 1);
    }

    #[tokio::test]
    async fn test_empty_targets_rejected_before_send() {
        let mut repo = MockLeadRepository::new();
        repo.expect_record_sent_mail().never();
        let mut mailer = MockMailSender::new();
        mailer.expect_send().never();

        let err = broadcaster(repo, mailer)
            .send_newsletter("m1", "Hello", &body(), &[])
            .await
            .expect_err("no recipients");
        assert!(matches!(err, TrackerError::NoRecipients(ref id) if id == "m1"));
    }

    #[tokio::test]
    async fn test_resolution_failure_sends_nothing() {
        let mut repo = MockLeadRepository::new();
        repo.expect_companies_in_business_types()
            .returning(|_| Err(TrackerError::Validation("store down".to_string())));
        let mut mailer = MockMailSender::new();
        mailer.expect_send().never();

        let b = broadcaster(repo, mailer);
        assert!(b.resolve_targets(&[1], &[]).await.is_err());
    }

    #[tokio::test]
    async fn test_bookkeeping_failure_reports_delivered_count() {
        let cache = Arc::new(ViewCache::temporary().expect("cache"));
        cache.put(MAIL_LIST_PATH, "list").expect("put");
        cache.put(&mail_detail_path("m1"), "Not sent yet").expect("put");

        let mut repo = MockLeadRepository::new();
        repo.expect_record_sent_mail()
            .returning(|id, kind, at| sent(id, kind, at));
        repo.expect_link_sent_companies()
            .returning(|_, _| Err(TrackerError::Database(rusqlite::Error::InvalidQuery)));
        let mut mailer = MockMailSender::new();
        mailer.expect_send().times(2).returning(|_| Ok(()));

        let err = broadcaster(repo, mailer)
            .with_cache(Arc::clone(&cache))
            .send_newsletter("m1", "Hello", &body(), &[company("x", "mail"), company("z", "mail")])
            .await
            .expect_err("bookkeeping");
        assert!(cache.get(MAIL_LIST_PATH).expect("get").is_none());
        assert!(cache.get(&mail_detail_path("m1")).expect("get").is_none());
        match err {
            TrackerError::BookkeepingFailed { mail_id, delivered, .. } => {
                assert_eq!(mail_id, "m1");
                assert_eq!(delivered, 2);
            },
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_newsletter_invalidates_mail_views() {
        let cache = Arc::new(ViewCache::temporary().expect("cache"));
        cache.put(MAIL_LIST_PATH, "list").expect("put");
        cache.put(&mail_detail_path("m1"), "detail").expect("put");
        cache.put(&mail_detail_path("other"), "other").expect("put");

        let mut repo = MockLeadRepository::new();
        repo.expect_record_sent_mail()
            .returning(|id, kind, at| sent(id, kind, at));
        repo.expect_link_sent_companies().returning(|_, ids| Ok(ids.len()));
        let mut mailer = MockMailSender::new();
        mailer.expect_send().returning(|_| Ok(()));

        broadcaster(repo, mailer)
            .with_cache(Arc::clone(&cache))
            .send_newsletter("m1", "Hello", &body(), &[company("x", "mail")])
            .await
            .expect("report");

        assert!(cache.get(MAIL_LIST_PATH).expect("get").is_none());
        assert!(cache.get(&mail_detail_path("m1")).expect("get").is_none());
        assert!(cache.get(&mail_detail_path("other")).expect("get").is_none());
    }

    #[tokio::test]
    async fn test_slack_failure_skips_bookkeeping() {
        let mut repo = MockLeadRepository::new();
        repo.expect_record_sent_mail().never();
        let mut chat = MockChatSender::new();
        chat.expect_post_message()
            .withf(|channel, text| channel == "C1" && text == "hello")
            .returning(|_, _| Err(TrackerError::Chat("channel_not_found".to_string())));

        let b = Broadcaster::new(Arc::new(repo), Arc::new(MockMailSender::new()), Arc::new(chat));
        let err = b.send_slack("m1", "C1", "hello").await.expect_err("chat error");
        assert!(matches!(err, TrackerError::Chat(_)));
    }

    #[tokio::test]
    async fn test_slack_success_records_slack_kind() {
        let mut repo = MockLeadRepository::new();
        repo.expect_record_sent_mail()
            .withf(|id, kind, _| id == "m1" && *kind == BroadcastKind::Slack)
            .times(1)
            .returning(|id, kind, at| sent(id, kind, at));
        let mut chat = MockChatSender::new();
        chat.expect_post_message().returning(|_, _| Ok("123.456".to_string()));

        let b = Broadcaster::new(Arc::new(repo), Arc::new(MockMailSender::new()), Arc::new(chat));
        let report = b.send_slack("m1", "C1", "hello").await.expect("report");
        assert_eq!(report.message_ts, "123.456");
        assert_eq!(report.sent_mail.kind, BroadcastKind::Slack);
    }
}
