//! Mail screens: list, detail and the two send actions.

use std::sync::Arc;

use chrono::NaiveDateTime;
use serde::Serialize;
use tracing::{debug, info, instrument};

use crate::broadcast::{BroadcastReport, Broadcaster, ChatReport};
use crate::cache::{mail_detail_path, ViewCache, MAIL_LIST_PATH};
use crate::cms::ContentStore;
use crate::error::{Result, TrackerError};
use crate::models::{BroadcastKind, Company, CompanyRef, Mail, ReferenceItem, ReferenceKind};
use crate::render;
use crate::repository::LeadRepository;

/// A CMS mail with its sent flag
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MailSummary {
    /// The CMS entry
    pub mail: Mail,
    /// Any broadcast (newsletter or Slack) has been recorded
    pub sent: bool,
}

/// What the detail screen shows for one mail
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum MailDetail {
    /// A broadcast of any kind was recorded; lists the companies a
    /// newsletter was addressed to, empty after a chat-only announcement
    Sent {
        /// The CMS entry
        mail: Mail,
        /// Kind of the earliest recorded broadcast
        kind: BroadcastKind,
        /// When that broadcast was recorded
        sent_at: NaiveDateTime,
        /// Companies linked to the newsletter, ordered by name
        companies: Vec<CompanyRef>,
    },
    /// Not sent yet; offers the business types to segment by
    Unsent {
        /// The CMS entry
        mail: Mail,
        /// Business types offered for segmentation
        business_types: Vec<ReferenceItem>,
    },
}

impl MailDetail {
    /// The CMS entry behind either variant
    pub const fn mail(&self) -> &Mail {
        match self {
            Self::Sent { mail, .. } | Self::Unsent { mail, .. } => mail,
        }
    }

    /// True when a broadcast was recorded
    pub const fn is_sent(&self) -> bool {
        matches!(self, Self::Sent { .. })
    }
}

/// Mail screens over the CMS, the lead store and a [`Broadcaster`]
pub struct MailService {
    cms: Arc<dyn ContentStore>,
    repo: Arc<dyn LeadRepository>,
    broadcaster: Broadcaster,
    cache: Option<Arc<ViewCache>>,
    default_slack_channel: Option<String>,
}

impl MailService {
    /// Service without cache or default Slack channel
    pub fn new(cms: Arc<dyn ContentStore>, repo: Arc<dyn LeadRepository>, broadcaster: Broadcaster) -> Self {
        Self {
            cms,
            repo,
            broadcaster,
            cache: None,
            default_slack_channel: None,
        }
    }

    /// Serve rendered views from `cache`
    #[must_use]
    pub fn with_cache(mut self, cache: Arc<ViewCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Channel used when a Slack send names none
    #[must_use]
    pub fn with_default_slack_channel(mut self, channel: Option<String>) -> Self {
        self.default_slack_channel = channel;
        self
    }

    /// Every CMS mail, flagged as sent when any broadcast was recorded for it
    pub async fn mail_list(&self) -> Result<Vec<MailSummary>> {
        let mails = self.cms.list_mails().await?;
        let sent_ids = self.repo.sent_mail_ids().await?;
        Ok(mails
            .into_iter()
            .map(|mail| {
                let sent = sent_ids.contains(&mail.id);
                MailSummary { mail, sent }
            })
            .collect())
    }

    /// One mail with either its send record or the segmentation options
    pub async fn mail_detail(&self, mail_id: &str) -> Result<MailDetail> {
        let mail = self.fetch_mail(mail_id).await?;

        match self.repo.first_sent_mail(mail_id).await? {
            Some(sent) => {
                let companies = self.repo.companies_for_sent_mail(mail_id).await?;
                Ok(MailDetail::Sent {
                    mail,
                    kind: sent.kind,
                    sent_at: sent.sent_at,
                    companies,
                })
            },
            None => {
                let business_types = self.repo.list_references(ReferenceKind::BusinessType).await?;
                Ok(MailDetail::Unsent { mail, business_types })
            },
        }
    }

    /// Rendered mail list, from the cache when present
    pub async fn render_mail_list(&self) -> Result<String> {
        if let Some(body) = self.cached(MAIL_LIST_PATH)? {
            return Ok(body);
        }
        let body = render::mail_list(&self.mail_list().await?);
        self.store(MAIL_LIST_PATH, &body)?;
        Ok(body)
    }

    /// Rendered mail detail, from the cache when present
    pub async fn render_mail_detail(&self, mail_id: &str) -> Result<String> {
        let path = mail_detail_path(mail_id);
        if let Some(body) = self.cached(&path)? {
            return Ok(body);
        }
        let body = render::mail_detail(&self.mail_detail(mail_id).await?);
        self.store(&path, &body)?;
        Ok(body)
    }

    /// Companies a newsletter would reach with this segmentation
    pub async fn preview_targets(&self, business_type_ids: &[i64], exclude: &[String]) -> Result<Vec<Company>> {
        self.broadcaster.resolve_targets(business_type_ids, exclude).await
    }

    /// Send a newsletter once per mail id.
    ///
    /// Any recorded broadcast, including a chat announcement, blocks it.
    #[instrument(skip(self))]
    pub async fn send_newsletter(
        &self,
        mail_id: &str,
        business_type_ids: &[i64],
        exclude: &[String],
    ) -> Result<BroadcastReport> {
        if self.repo.first_sent_mail(mail_id).await?.is_some() {
            return Err(TrackerError::AlreadySent(mail_id.to_string()));
        }

        let mail = self.fetch_mail(mail_id).await?;
        let targets = self.broadcaster.resolve_targets(business_type_ids, exclude).await?;
        info!(mail_id, targets = targets.len(), "Resolved newsletter targets");

        self.broadcaster
            .send_newsletter(&mail.id, &mail.title, &mail.contents, &targets)
            .await
    }

    /// Announce a mail in Slack.
    ///
    /// Without `text` the mail title and description are posted; without
    /// `channel` the configured default channel is used.
    #[instrument(skip(self, text))]
    pub async fn send_slack(&self, mail_id: &str, channel: Option<&str>, text: Option<&str>) -> Result<ChatReport> {
        let channel = channel
            .or(self.default_slack_channel.as_deref())
            .ok_or_else(|| TrackerError::Validation("no Slack channel given and slack.default_channel is not set".to_string()))?;

        let text = match text {
            Some(text) => text.to_string(),
            None => announcement_text(&self.fetch_mail(mail_id).await?),
        };

        self.broadcaster.send_slack(mail_id, channel, &text).await
    }

    async fn fetch_mail(&self, mail_id: &str) -> Result<Mail> {
        self.cms
            .get_mail(mail_id)
            .await?
            .ok_or_else(|| TrackerError::not_found("mail", mail_id))
    }

    fn cached(&self, path: &str) -> Result<Option<String>> {
        match &self.cache {
            Some(cache) => cache.get(path),
            None => Ok(None),
        }
    }

    fn store(&self, path: &str, body: &str) -> Result<()> {
        if let Some(cache) = &self.cache {
            cache.put(path, body)?;
            debug!(path, "Cached rendered view");
        }
        Ok(())
    }
}

fn announcement_text(mail: &Mail) -> String {
    if mail.description.trim().is_empty() {
        mail.title.clone()
    } else {
        format!("{}\n{}", mail.title, mail.description)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cms::MockContentStore;
    use crate::mailer::MockMailSender;
    use crate::models::SentMail;
    use crate::repository::MockLeadRepository;
    use crate::slack::MockChatSender;
    use chrono::Utc;
    use std::collections::HashSet;

    fn mail(id: &str) -> Mail {
        Mail {
            id: id.to_string(),
            title: format!("Title {id}"),
            description: "Monthly update".to_string(),
            published_at: None,
            contents: Vec::new(),
        }
    }

    fn service(cms: MockContentStore, repo: MockLeadRepository, chat: MockChatSender) -> MailService {
        let repo: Arc<dyn LeadRepository> = Arc::new(repo);
        let broadcaster = Broadcaster::new(Arc::clone(&repo), Arc::new(MockMailSender::new()), Arc::new(chat));
        MailService::new(Arc::new(cms), repo, broadcaster)
    }

    #[tokio::test]
    async fn test_mail_list_flags_any_sent_kind() {
        let mut cms = MockContentStore::new();
        cms.expect_list_mails().returning(|| Ok(vec![mail("a"), mail("b")]));
        let mut repo = MockLeadRepository::new();
        repo.expect_sent_mail_ids()
            .returning(|| Ok(HashSet::from(["b".to_string()])));

        let list = service(cms, repo, MockChatSender::new()).mail_list().await.expect("list");
        assert!(!list[0].sent);
        assert!(list[1].sent);
    }

    #[tokio::test]
    async fn test_unknown_mail_is_not_found() {
        let mut cms = MockContentStore::new();
        cms.expect_get_mail().returning(|_| Ok(None));

        let err = service(cms, MockLeadRepository::new(), MockChatSender::new())
            .mail_detail("missing")
            .await
            .expect_err("not found");
        assert!(matches!(err, TrackerError::NotFound { entity: "mail", .. }));
    }

    #[tokio::test]
    async fn test_unsent_detail_offers_business_types() {
        let mut cms = MockContentStore::new();
        cms.expect_get_mail().returning(|id| Ok(Some(mail(id))));
        let mut repo = MockLeadRepository::new();
        repo.expect_first_sent_mail().returning(|_| Ok(None));
        repo.expect_list_references()
            .withf(|kind| *kind == ReferenceKind::BusinessType)
            .returning(|_| Ok(vec![ReferenceItem { id: 1, name: "IT".to_string() }]));

        let detail = service(cms, repo, MockChatSender::new())
            .mail_detail("m1")
            .await
            .expect("detail");
        assert!(matches!(detail, MailDetail::Unsent { ref business_types, .. } if business_types.len() == 1));
    }

    #[tokio::test]
    async fn test_newsletter_after_any_broadcast_is_refused() {
        let mut repo = MockLeadRepository::new();
        repo.expect_first_sent_mail().returning(|id| {
            Ok(Some(SentMail {
                id: 1,
                mail_id: id.to_string(),
                kind: BroadcastKind::Slack,
                sent_at: Utc::now().naive_utc(),
            }))
        });
        repo.expect_companies_in_business_types().never();

        let err = service(MockContentStore::new(), repo, MockChatSender::new())
            .send_newsletter("m1", &[1], &[])
            .await
            .expect_err("already sent");
        assert!(matches!(err, TrackerError::AlreadySent(ref id) if id == "m1"));
    }

    #[tokio::test]
    async fn test_slack_defaults_to_title_and_channel() {
        let mut cms = MockContentStore::new();
        cms.expect_get_mail().returning(|id| Ok(Some(mail(id))));
        let mut repo = MockLeadRepository::new();
        repo.expect_record_sent_mail().returning(|id, kind, sent_at| {
            Ok(SentMail {
                id: 7,
                mail_id: id.to_string(),
                kind,
                sent_at,
            })
        });
        let mut chat = MockChatSender::new();
        chat.expect_post_message()
            .withf(|channel, text| channel == "#news" && text == "Title m1\nMonthly update")
            .times(1)
            .returning(|_, _| Ok("1.0".to_string()));

        let report = service(cms, repo, chat)
            .with_default_slack_channel(Some("#news".to_string()))
            .send_slack("m1", None, None)
            .await
            .expect("posted");
        assert_eq!(report.channel, "#news");
    }

    #[tokio::test]
    async fn test_slack_without_channel_is_rejected() {
        let err = service(MockContentStore::new(), MockLeadRepository::new(), MockChatSender::new())
            .send_slack("m1", None, Some("hi"))
            .await
            .expect_err("no channel");
        assert!(matches!(err, TrackerError::Validation(_)));
    }

    #[tokio::test]
    async fn test_rendered_list_is_served_from_cache() {
        let mut cms = MockContentStore::new();
        cms.expect_list_mails().times(1).returning(|| Ok(vec![mail("a")]));
        let mut repo = MockLeadRepository::new();
        repo.expect_sent_mail_ids().times(1).returning(|| Ok(HashSet::new()));

        let cache = Arc::new(
            ViewCache::temporary()
                .expect("cache")
                .with_ttl(std::time::Duration::from_secs(3600)),
        );
        let service = service(cms, repo, MockChatSender::new()).with_cache(cache);

        let first = service.render_mail_list().await.expect("render");
        let second = service.render_mail_list().await.expect("render");
        assert_eq!(first, second);
        assert!(first.contains("Title a"));
    }

    #[tokio::test]
    async fn test_expired_list_is_fetched_again() {
        let mut cms = MockContentStore::new();
        let mut seq = mockall::Sequence::new();
        cms.expect_list_mails()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|| Ok(vec![mail("a")]));
        cms.expect_list_mails()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|| Ok(vec![mail("a"), mail("b")]));
        let mut repo = MockLeadRepository::new();
        repo.expect_sent_mail_ids().returning(|| Ok(HashSet::new()));

        let cache = Arc::new(ViewCache::temporary().expect("cache").with_ttl(std::time::Duration::ZERO));
        let service = service(cms, repo, MockChatSender::new()).with_cache(cache);

        assert!(!service.render_mail_list().await.expect("render").contains("Title b"));
        assert!(service.render_mail_list().await.expect("render").contains("Title b"));
    }

    #[tokio::test]
    async fn test_chat_only_broadcast_shows_sent_detail() {
        let mut cms = MockContentStore::new();
        cms.expect_get_mail().returning(|id| Ok(Some(mail(id))));
        let mut repo = MockLeadRepository::new();
        repo.expect_first_sent_mail().returning(|id| {
            Ok(Some(SentMail {
                id: 3,
                mail_id: id.to_string(),
                kind: BroadcastKind::Slack,
                sent_at: Utc::now().naive_utc(),
            }))
        });
        repo.expect_companies_for_sent_mail().returning(|_| Ok(Vec::new()));
        repo.expect_list_references().never();

        let detail = service(cms, repo, MockChatSender::new())
            .mail_detail("m1")
            .await
            .expect("detail");
        match detail {
            MailDetail::Sent { kind, companies, .. } => {
                assert_eq!(kind, BroadcastKind::Slack);
                assert!(companies.is_empty());
            },
            other => panic!("expected sent detail, got {other:?}"),
        }
    }
}
