//! Headless CMS client for newsletter content.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tracing::debug;

use crate::config::CmsConfig;
use crate::error::{Result, TrackerError};
use crate::models::Mail;

const API_KEY_HEADER: &str = "X-MICROCMS-API-KEY";

/// Content store collaborator
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ContentStore: Send + Sync {
    /// Published mails, newest first as the CMS orders them
    async fn list_mails(&self) -> Result<Vec<Mail>>;
    /// One mail by id; `None` when the CMS has no such item
    async fn get_mail(&self, id: &str) -> Result<Option<Mail>>;
}

#[derive(Deserialize)]
struct ListResponse {
    contents: Vec<Mail>,
}

/// Read-only client for the headless CMS that holds the mails
pub struct CmsClient {
    http: Client,
    base_url: String,
    endpoint: String,
    api_key: String,
    list_limit: u32,
}

impl CmsClient {
    /// Client for `config`; fails when the base URL or API key is missing
    pub fn new(config: &CmsConfig) -> Result<Self> {
        if config.base_url.trim().is_empty() {
            return Err(TrackerError::InvalidConfig("cms.base_url is not set".to_string()));
        }
        let api_key = config
            .api_key
            .clone()
            .ok_or_else(|| TrackerError::InvalidConfig("cms.api_key is not set".to_string()))?;

        Ok(Self {
            http: Client::new(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            endpoint: config.endpoint.clone(),
            api_key,
            list_limit: config.list_limit,
        })
    }

    fn url(&self, suffix: Option<&str>) -> String {
        match suffix {
            Some(id) => format!("{}/{}/{}", self.base_url, self.endpoint, id),
            None => format!("{}/{}", self.base_url, self.endpoint),
        }
    }
}

#[async_trait]
impl ContentStore for CmsClient {
    async fn list_mails(&self) -> Result<Vec<Mail>> {
        let response = self
            .http
            .get(self.url(None))
            .header(API_KEY_HEADER, &self.api_key)
            .query(&[("limit", self.list_limit)])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(TrackerError::Cms(format!("list {} returned {}", self.endpoint, response.status())));
        }

        let list: ListResponse = response.json().await?;
        debug!(count = list.contents.len(), "Fetched mails from CMS");
        Ok(list.contents)
    }

    async fn get_mail(&self, id: &str) -> Result<Option<Mail>> {
        let response = self
            .http
            .get(self.url(Some(id)))
            .header(API_KEY_HEADER, &self.api_key)
            .send()
            .await?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => Ok(Some(response.json().await?)),
            status => Err(TrackerError::Cms(format!("get {}/{id} returned {status}", self.endpoint))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;

    fn client(base_url: &str) -> CmsClient {
        CmsClient::new(&CmsConfig {
            base_url: base_url.to_string(),
            api_key: Some("secret".to_string()),
            endpoint: "mails".to_string(),
            list_limit: 100,
        })
        .expect("client")
    }

    #[tokio::test]
    async fn test_list_mails_sends_key_and_limit() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/mails")
            .match_header("x-microcms-api-key", "secret")
            .match_query(Matcher::UrlEncoded("limit".into(), "100".into()))
            .with_status(200)
            .with_body(
                r#"{"contents":[{"id":"m1","title":"Hello","description":"d","publishedAt":"2024-10-01T00:00:00Z","contents":[]}],"totalCount":1}"#,
            )
            .create_async()
            .await;

        let mails = client(&server.url()).list_mails().await.expect("mails");
        assert_eq!(mails.len(), 1);
        assert_eq!(mails[0].title, "Hello");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_get_mail_maps_404_to_none() {
        let mut server = mockito::Server::new_async().await;
        server.mock("GET", "/mails/missing").with_status(404).create_async().await;

        let mail = client(&server.url()).get_mail("missing").await.expect("lookup");
        assert!(mail.is_none());
    }

    #[tokio::test]
    async fn test_server_error_is_cms_error() {
        let mut server = mockito::Server::new_async().await;
        server.mock("GET", "/mails").with_status(500).create_async().await;

        let err = client(&server.url()).list_mails().await.expect_err("500");
        assert!(matches!(err, TrackerError::Cms(_)));
    }
}
