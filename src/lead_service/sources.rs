use async_trait::async_trait;
use log::debug;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LeadSourceError {
    #[error("Request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("{platform} returned {status}")]
    Status { platform: String, status: u16 },

    #[error("Unsupported platform: {0}")]
    UnsupportedPlatform(String),
}

/// A public post that might come from a prospective customer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeadPost {
    pub platform: String,
    pub title: String,
    pub content: String,
    pub author: Option<String>,
    pub url: String,
}

#[async_trait]
pub trait LeadSource: Send + Sync {
    fn supports(&self, platform: &str) -> bool;
    async fn search(&self, platform: &str, keywords: &str, limit: usize) -> Result<Vec<LeadPost>, LeadSourceError>;
}

#[derive(Deserialize)]
struct RedditListing {
    data: RedditListingData,
}

#[derive(Deserialize)]
struct RedditListingData {
    children: Vec<RedditChild>,
}

#[derive(Deserialize)]
struct RedditChild {
    data: RedditPost,
}

#[derive(Deserialize)]
struct RedditPost {
    title: String,
    #[serde(default)]
    selftext: String,
    author: Option<String>,
    permalink: String,
}

impl From<RedditPost> for LeadPost {
    fn from(post: RedditPost) -> Self {
        LeadPost {
            platform: "reddit".to_string(),
            title: post.title,
            content: post.selftext,
            author: post.author,
            url: format!("https://www.reddit.com{}", post.permalink),
        }
    }
}

/// Public search endpoints of the supported communities.
pub struct WebLeadSource {
    http: reqwest::Client,
}

impl WebLeadSource {
    pub fn new() -> Result<Self, LeadSourceError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(20))
            .user_agent(concat!("minato-leads/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { http })
    }

    async fn reddit(&self, keywords: &str, limit: usize) -> Result<Vec<LeadPost>, LeadSourceError> {
        let limit = limit.to_string();
        let response = self
            .http
            .get("https://www.reddit.com/search.json")
            .query(&[("q", keywords), ("sort", "new"), ("limit", limit.as_str()), ("t", "month")])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(LeadSourceError::Status {
                platform: "reddit".to_string(),
                status: response.status().as_u16(),
            });
        }

        let listing: RedditListing = response.json().await?;
        debug!("Reddit returned {} posts for '{}'", listing.data.children.len(), keywords);
        Ok(listing.data.children.into_iter().map(|c| c.data.into()).collect())
    }
}

#[async_trait]
impl LeadSource for WebLeadSource {
    fn supports(&self, platform: &str) -> bool {
        platform == "reddit"
    }

    async fn search(&self, platform: &str, keywords: &str, limit: usize) -> Result<Vec<LeadPost>, LeadSourceError> {
        match platform {
            "reddit" => self.reddit(keywords, limit).await,
            other => Err(LeadSourceError::UnsupportedPlatform(other.to_string())),
        }
    }
}
