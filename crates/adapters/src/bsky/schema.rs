//! Wire types for the `app.bsky` XRPC responses we read

use serde::Deserialize;
use skyrelay_domain::{
    Author, Facet, FacetFeature, FeedItem, ImageRef, Profile, ReplyRef, RepostReason,
};
use time::{OffsetDateTime, format_description::well_known::Rfc3339};

#[derive(Debug, Deserialize)]
pub(crate) struct AuthorFeedResponse {
    #[serde(default)]
    pub feed: Vec<FeedViewPost>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct FeedViewPost {
    pub post: PostView,
    pub reason: Option<ReasonView>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct PostView {
    #[serde(default)]
    pub uri: String,
    pub author: Option<ProfileView>,
    #[serde(default)]
    pub record: PostRecord,
    pub embed: Option<EmbedView>,
    pub indexed_at: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ProfileView {
    #[serde(default)]
    pub did: String,
    #[serde(default)]
    pub handle: String,
    pub display_name: Option<String>,
    pub avatar: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct PostRecord {
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub facets: Vec<FacetView>,
    pub reply: Option<ReplyView>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ReplyView {
    pub parent: StrongRef,
    pub root: StrongRef,
}

#[derive(Debug, Deserialize)]
pub(crate) struct StrongRef {
    pub uri: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct FacetView {
    pub index: ByteSlice,
    #[serde(default)]
    pub features: Vec<FeatureView>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ByteSlice {
    pub byte_start: usize,
    pub byte_end: usize,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "$type")]
pub(crate) enum FeatureView {
    #[serde(rename = "app.bsky.richtext.facet#link")]
    Link { uri: String },
    #[serde(rename = "app.bsky.richtext.facet#mention")]
    Mention { did: String },
    #[serde(rename = "app.bsky.richtext.facet#tag")]
    Tag { tag: String },
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "$type")]
pub(crate) enum EmbedView {
    #[serde(rename = "app.bsky.embed.images#view")]
    Images { images: Vec<ImageView> },
    #[serde(rename = "app.bsky.embed.recordWithMedia#view")]
    RecordWithMedia { media: Box<EmbedView> },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ImageView {
    #[serde(default)]
    pub fullsize: String,
    #[serde(default)]
    pub thumb: String,
    #[serde(default)]
    pub alt: String,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "$type")]
pub(crate) enum ReasonView {
    #[serde(rename = "app.bsky.feed.defs#reasonRepost", rename_all = "camelCase")]
    Repost {
        by: ProfileView,
        indexed_at: String,
        #[serde(default)]
        uri: Option<String>,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ProfileViewDetailed {
    pub did: String,
    pub handle: String,
    pub display_name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ProfilesResponse {
    #[serde(default)]
    pub profiles: Vec<ProfileViewDetailed>,
}

/// XRPC error body
#[derive(Debug, Default, Deserialize)]
pub(crate) struct XrpcError {
    #[serde(default)]
    pub error: String,
    #[serde(default)]
    pub message: String,
}

impl From<ProfileViewDetailed> for Profile {
    fn from(view: ProfileViewDetailed) -> Self {
        Profile {
            did: view.did,
            handle: view.handle,
            display_name: view.display_name.filter(|name| !name.is_empty()),
        }
    }
}

impl From<ProfileView> for Author {
    fn from(view: ProfileView) -> Self {
        Author {
            did: view.did,
            handle: view.handle,
            display_name: view.display_name.filter(|name| !name.is_empty()),
            avatar: view.avatar,
        }
    }
}

fn parse_time(value: &str) -> Option<OffsetDateTime> {
    OffsetDateTime::parse(value, &Rfc3339).ok()
}

impl FeedViewPost {
    /// Convert to a domain item.
    ///
    /// Items without a usable timestamp are rejected here. Missing identity
    /// fields are left empty so the classifier reports them.
    pub fn into_feed_item(self) -> Result<FeedItem, String> {
        let Self { post, reason } = self;

        let indexed_at = post
            .indexed_at
            .as_deref()
            .and_then(parse_time)
            .ok_or_else(|| format!("missing or invalid indexedAt on {}", post.uri))?;

        let reason = match reason {
            Some(ReasonView::Repost {
                by,
                indexed_at,
                uri,
            }) => Some(RepostReason {
                indexed_at: parse_time(&indexed_at)
                    .ok_or_else(|| format!("invalid repost indexedAt on {}", post.uri))?,
                by: by.into(),
                uri: uri.filter(|uri| !uri.is_empty()),
            }),
            Some(ReasonView::Other) | None => None,
        };

        let facets = post
            .record
            .facets
            .into_iter()
            .flat_map(|facet| {
                let ByteSlice {
                    byte_start,
                    byte_end,
                } = facet.index;
                facet.features.into_iter().filter_map(move |feature| {
                    let feature = match feature {
                        FeatureView::Link { uri } => FacetFeature::Link { uri },
                        FeatureView::Mention { did } => FacetFeature::Mention { did },
                        FeatureView::Tag { tag } => FacetFeature::Tag { tag },
                        FeatureView::Unknown => return None,
                    };
                    Some(Facet {
                        byte_start,
                        byte_end,
                        feature,
                    })
                })
            })
            .collect();

        let images = match post.embed {
            Some(embed) => embed.into_images(),
            None => Vec::new(),
        };

        let author = post.author.map(Author::from).unwrap_or_else(|| Author {
            did: String::new(),
            handle: String::new(),
            display_name: None,
            avatar: None,
        });

        Ok(FeedItem {
            uri: post.uri,
            author,
            indexed_at,
            text: post.record.text,
            facets,
            reply: post.record.reply.map(|reply| ReplyRef {
                parent_uri: reply.parent.uri,
                root_uri: reply.root.uri,
            }),
            reason,
            images,
        })
    }
}

impl EmbedView {
    fn into_images(self) -> Vec<ImageRef> {
        match self {
            Self::Images { images } => images
                .into_iter()
                .filter_map(|image| {
                    let url = if image.fullsize.is_empty() {
                        image.thumb
                    } else {
                        image.fullsize
                    };
                    (!url.is_empty()).then_some(ImageRef {
                        url,
                        alt: image.alt,
                    })
                })
                .collect(),
            Self::RecordWithMedia { media } => media.into_images(),
            Self::Other => Vec::new(),
        }
    }
}
