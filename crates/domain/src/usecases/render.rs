//! Rendering use case - turns a classified feed item into a notification

use crate::model::{Classification, Facet, FacetFeature, FeedItem, Notification, PostKind};

/// Configuration for the renderer
#[derive(Debug, Clone)]
pub struct RenderConfig {
    /// Base URL of the public web client
    pub web_base: String,
    /// Accent colour of the notification
    pub color: u32,
    /// Maximum characters in the description (including the link line)
    pub max_description_chars: usize,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            web_base: "https://bsky.app".to_string(),
            color: 0x1da1f2,
            max_description_chars: 4096,
        }
    }
}

/// Renderer for notifications
pub struct Renderer {
    config: RenderConfig,
}

impl Renderer {
    pub fn new(config: RenderConfig) -> Self {
        Self { config }
    }

    /// Render one feed item
    pub fn render(&self, item: &FeedItem, classification: &Classification) -> Notification {
        let post_url = self.post_url(item);
        let link_line = format!("\n\n[Open on bsky.app]({})", post_url);

        let mut body = String::new();
        if let Some(reason) = &item.reason {
            body.push_str(&format!(
                "🔁 Reposted by [{}]({})\n\n",
                reason.by.name(),
                self.profile_url(&reason.by.handle)
            ));
        }
        body.push_str(&self.render_text(&item.text, &item.facets));

        let budget = self
            .config
            .max_description_chars
            .saturating_sub(link_line.chars().count());
        let description = format!("{}{}", truncate_chars(&body, budget), link_line);

        Notification {
            post_uri: item.uri.clone(),
            kind: classification.kind,
            author_name: item.author.name().to_string(),
            author_avatar: item.author.avatar.clone(),
            author_url: self.profile_url(&item.author.handle),
            description,
            post_url,
            footer: footer_for(classification.kind).to_string(),
            timestamp: item.observed_at(),
            image_url: item.images.first().map(|image| image.url.clone()),
            color: self.config.color,
        }
    }

    /// Post text with rich-text spans turned into Markdown links.
    ///
    /// Spans that are empty, out of range, overlapping or not on a char
    /// boundary are rendered as plain text.
    pub fn render_text(&self, text: &str, facets: &[Facet]) -> String {
        let mut spans: Vec<&Facet> = facets
            .iter()
            .filter(|facet| {
                facet.byte_start < facet.byte_end
                    && facet.byte_end <= text.len()
                    && text.is_char_boundary(facet.byte_start)
                    && text.is_char_boundary(facet.byte_end)
            })
            .collect();
        spans.sort_by_key(|facet| facet.byte_start);

        let mut rendered = String::with_capacity(text.len());
        let mut cursor = 0;
        for facet in spans {
            if facet.byte_start < cursor {
                continue;
            }
            rendered.push_str(&text[cursor..facet.byte_start]);
            let label = &text[facet.byte_start..facet.byte_end];
            rendered.push_str(&format!("[{}]({})", label, self.facet_target(&facet.feature)));
            cursor = facet.byte_end;
        }
        rendered.push_str(&text[cursor..]);
        rendered
    }

    fn facet_target(&self, feature: &FacetFeature) -> String {
        match feature {
            FacetFeature::Link { uri } => uri.clone(),
            FacetFeature::Mention { did } => self.profile_url(did),
            FacetFeature::Tag { tag } => format!("{}/hashtag/{}", self.config.web_base, tag),
        }
    }

    fn profile_url(&self, actor: &str) -> String {
        format!("{}/profile/{}", self.config.web_base, actor)
    }

    fn post_url(&self, item: &FeedItem) -> String {
        match item.rkey() {
            Some(rkey) => format!(
                "{}/post/{}",
                self.profile_url(&item.author.handle),
                rkey
            ),
            None => self.profile_url(&item.author.handle),
        }
    }
}

fn footer_for(kind: PostKind) -> &'static str {
    match kind {
        PostKind::TopLevel => "New Bluesky Post",
        PostKind::Reply => "New Bluesky Reply",
        PostKind::Repost => "New Bluesky Repost",
    }
}

/// Truncate to `max` chars, ending with an ellipsis when shortened
fn truncate_chars(content: &str, max: usize) -> String {
    if content.chars().count() <= max {
        return content.to_string();
    }
    let kept: String = content.chars().take(max.saturating_sub(1)).collect();
    format!("{}…", kept)
}
