//! Discord REST dispatcher - posts one embed per notification

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use skyrelay_domain::{DispatchError, Dispatcher, Notification};
use std::time::Duration;
use time::format_description::well_known::Rfc3339;

pub const DEFAULT_API_BASE: &str = "https://discord.com/api/v10";

/// Dispatcher that posts embeds through a bot account
pub struct DiscordDispatcher {
    client: Client,
    token: SecretString,
    api_base: String,
}

impl DiscordDispatcher {
    pub fn new(token: SecretString) -> Result<Self, DispatchError> {
        Self::with_api_base(token, DEFAULT_API_BASE)
    }

    pub fn with_api_base(
        token: SecretString,
        api_base: impl Into<String>,
    ) -> Result<Self, DispatchError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent(concat!(
                "DiscordBot (https://github.com/example/skyrelay, ",
                env!("CARGO_PKG_VERSION"),
                ")"
            ))
            .build()
            .map_err(|e| DispatchError::Io(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            token,
            api_base: api_base.into().trim_end_matches('/').to_string(),
        })
    }

    /// Check the token by fetching the bot's own user (used by `doctor`)
    pub async fn verify_token(&self) -> Result<String, DispatchError> {
        let response = self
            .client
            .get(format!("{}/users/@me", self.api_base))
            .header("Authorization", self.authorization())
            .send()
            .await
            .map_err(|e| DispatchError::Io(e.to_string()))?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(DispatchError::Auth("Bot token rejected".to_string()));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(DispatchError::Api(format!("{}: {}", status, body)));
        }

        let user: BotUser = response
            .json()
            .await
            .map_err(|e| DispatchError::Api(e.to_string()))?;
        Ok(user.username)
    }

    fn authorization(&self) -> String {
        format!("Bot {}", self.token.expose_secret())
    }
}

#[derive(serde::Deserialize)]
struct BotUser {
    username: String,
}

#[derive(Serialize)]
struct CreateMessage<'a> {
    embeds: [Embed<'a>; 1],
    allowed_mentions: AllowedMentions,
}

/// Markdown in post text must never ping anyone
#[derive(Serialize)]
struct AllowedMentions {
    parse: [&'static str; 0],
}

#[derive(Serialize)]
struct Embed<'a> {
    color: u32,
    author: EmbedAuthor<'a>,
    description: &'a str,
    url: &'a str,
    timestamp: String,
    footer: EmbedFooter<'a>,
    #[serde(skip_serializing_if = "Option::is_none")]
    image: Option<EmbedImage<'a>>,
}

#[derive(Serialize)]
struct EmbedAuthor<'a> {
    name: &'a str,
    url: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    icon_url: Option<&'a str>,
}

#[derive(Serialize)]
struct EmbedFooter<'a> {
    text: &'a str,
}

#[derive(Serialize)]
struct EmbedImage<'a> {
    url: &'a str,
}

fn build_message(notification: &Notification) -> Result<CreateMessage<'_>, DispatchError> {
    let timestamp = notification
        .timestamp
        .format(&Rfc3339)
        .map_err(|e| DispatchError::Api(format!("Invalid timestamp: {}", e)))?;

    Ok(CreateMessage {
        embeds: [Embed {
            color: notification.color,
            author: EmbedAuthor {
                name: &notification.author_name,
                url: &notification.author_url,
                icon_url: notification.author_avatar.as_deref(),
            },
            description: &notification.description,
            url: &notification.post_url,
            timestamp,
            footer: EmbedFooter {
                text: &notification.footer,
            },
            image: notification
                .image_url
                .as_deref()
                .map(|url| EmbedImage { url }),
        }],
        allowed_mentions: AllowedMentions { parse: [] },
    })
}

#[async_trait]
impl Dispatcher for DiscordDispatcher {
    async fn deliver(
        &self,
        channel_id: &str,
        notification: &Notification,
    ) -> Result<(), DispatchError> {
        let message = build_message(notification)?;
        let url = format!("{}/channels/{}/messages", self.api_base, channel_id);

        let response = self
            .client
            .post(&url)
            .header("Authorization", self.authorization())
            .json(&message)
            .send()
            .await
            .map_err(|e| DispatchError::Io(e.to_string()))?;

        match response.status() {
            status if status.is_success() => Ok(()),
            StatusCode::TOO_MANY_REQUESTS => Err(DispatchError::RateLimited),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                let body = response.text().await.unwrap_or_default();
                Err(DispatchError::Auth(body))
            }
            StatusCode::NOT_FOUND => Err(DispatchError::UnknownChannel(channel_id.to_string())),
            status => {
                let body = response.text().await.unwrap_or_default();
                Err(DispatchError::Api(format!("{}: {}", status, body)))
            }
        }
    }

    fn platform(&self) -> &'static str {
        "discord"
    }
}
