//! Bluesky AppView client for reading author feeds and profiles

use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use skyrelay_domain::{FeedClient, FeedError, FeedItem, Profile};
use std::time::Duration;
use time::OffsetDateTime;

use super::schema::{AuthorFeedResponse, ProfileViewDetailed, ProfilesResponse, XrpcError};

/// Public AppView, no authentication required
pub const DEFAULT_SERVICE_URL: &str = "https://public.api.bsky.app/xrpc";

/// Feed filter that keeps replies and reposts in the author feed
pub const DEFAULT_FEED_FILTER: &str = "posts_with_replies";

/// Most actors `getProfiles` accepts per request
const PROFILES_BATCH: usize = 25;

/// XRPC error names that mean the actor does not exist
const NOT_FOUND_ERRORS: &[&str] = &[
    "ActorNotFound",
    "NotFound",
    "AccountTakedown",
    "AccountDeactivated",
    "BlockedActor",
];

/// Feed client over the public `app.bsky` XRPC API
pub struct BskyFeedClient {
    client: Client,
    service_url: String,
    feed_filter: String,
}

impl BskyFeedClient {
    pub fn new() -> Result<Self, FeedError> {
        Self::with_service_url(DEFAULT_SERVICE_URL, DEFAULT_FEED_FILTER)
    }

    pub fn with_service_url(
        service_url: impl Into<String>,
        feed_filter: impl Into<String>,
    ) -> Result<Self, FeedError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent(concat!("skyrelay/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| FeedError::Network(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            service_url: service_url.into().trim_end_matches('/').to_string(),
            feed_filter: feed_filter.into(),
        })
    }

    pub fn service_url(&self) -> &str {
        &self.service_url
    }

    async fn get<T: DeserializeOwned>(
        &self,
        method: &str,
        query: &[(&str, &str)],
        actor: &str,
    ) -> Result<T, FeedError> {
        let url = format!("{}/{}", self.service_url, method);

        let response = self
            .client
            .get(&url)
            .query(query)
            .send()
            .await
            .map_err(|e| FeedError::Network(e.to_string()))?;

        let response = check_status(response, method, actor).await?;

        response
            .json()
            .await
            .map_err(|e| FeedError::Decode(format!("{}: {}", method, e)))
    }
}

/// Map non-success statuses onto `FeedError`
async fn check_status(response: Response, method: &str, actor: &str) -> Result<Response, FeedError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    if status == StatusCode::TOO_MANY_REQUESTS {
        return Err(FeedError::RateLimited(retry_after(&response)));
    }

    let body = response.text().await.unwrap_or_default();
    let xrpc: XrpcError = serde_json::from_str(&body).unwrap_or_default();

    if status == StatusCode::NOT_FOUND
        || (status == StatusCode::BAD_REQUEST
            && (NOT_FOUND_ERRORS.contains(&xrpc.error.as_str())
                || xrpc.message.contains("not found")))
    {
        return Err(FeedError::NotFound(actor.to_string()));
    }

    Err(FeedError::Api(format!(
        "{} returned {}: {}",
        method,
        status,
        if xrpc.message.is_empty() { body } else { xrpc.message }
    )))
}

/// Wait hinted by `retry-after` (seconds) or `ratelimit-reset` (epoch seconds)
fn retry_after(response: &Response) -> Option<Duration> {
    let header = |name: &str| {
        response
            .headers()
            .get(name)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.trim().parse::<u64>().ok())
    };

    if let Some(secs) = header("retry-after") {
        return Some(Duration::from_secs(secs));
    }

    header("ratelimit-reset").map(|reset| {
        let now = OffsetDateTime::now_utc().unix_timestamp().max(0) as u64;
        Duration::from_secs(reset.saturating_sub(now))
    })
}

#[async_trait]
impl FeedClient for BskyFeedClient {
    async fn recent_items(&self, did: &str, limit: usize) -> Result<Vec<FeedItem>, FeedError> {
        let limit = limit.to_string();
        let response: AuthorFeedResponse = self
            .get(
                "app.bsky.feed.getAuthorFeed",
                &[
                    ("actor", did),
                    ("limit", limit.as_str()),
                    ("filter", self.feed_filter.as_str()),
                ],
                did,
            )
            .await?;

        let mut items = Vec::with_capacity(response.feed.len());
        for entry in response.feed {
            match entry.into_feed_item() {
                Ok(item) => items.push(item),
                Err(reason) => {
                    tracing::warn!(account = %did, reason = %reason, "Dropping unreadable feed entry");
                }
            }
        }

        tracing::debug!(account = %did, count = items.len(), "Fetched author feed");

        Ok(items)
    }

    async fn resolve_profile(&self, actor: &str) -> Result<Profile, FeedError> {
        let profile: ProfileViewDetailed = self
            .get("app.bsky.actor.getProfile", &[("actor", actor)], actor)
            .await?;

        Ok(profile.into())
    }

    async fn resolve_profiles(&self, dids: &[String]) -> Result<Vec<Profile>, FeedError> {
        let mut profiles = Vec::with_capacity(dids.len());

        for batch in dids.chunks(PROFILES_BATCH) {
            let query: Vec<(&str, &str)> = batch.iter().map(|did| ("actors", did.as_str())).collect();
            let response: ProfilesResponse = self
                .get("app.bsky.actor.getProfiles", &query, &batch.join(","))
                .await?;
            profiles.extend(response.profiles.into_iter().map(Profile::from));
        }

        Ok(profiles)
    }
}
