//! Post kind classification

use thiserror::Error;

use crate::model::{Classification, FeedItem, PostKind};

/// Error for feed items missing required fields
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ClassifyError {
    #[error("Malformed feed item {uri:?}: missing {field}")]
    MalformedItem { uri: String, field: &'static str },
}

/// Map a feed item to its post kind and the account credited for it.
///
/// Reposts are credited to the reposting account, everything else to the author.
pub fn classify(item: &FeedItem) -> Result<Classification, ClassifyError> {
    let malformed = |field| ClassifyError::MalformedItem {
        uri: item.uri.clone(),
        field,
    };

    if item.uri.trim().is_empty() {
        return Err(malformed("uri"));
    }
    if item.author.did.trim().is_empty() {
        return Err(malformed("author.did"));
    }

    if let Some(reason) = &item.reason {
        if reason.by.did.trim().is_empty() {
            return Err(malformed("reason.by.did"));
        }
        return Ok(Classification {
            kind: PostKind::Repost,
            attributed_actor: reason.by.did.clone(),
        });
    }

    let kind = if item.reply.is_some() {
        PostKind::Reply
    } else {
        PostKind::TopLevel
    };

    Ok(Classification {
        kind,
        attributed_actor: item.author.did.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Author, ReplyRef, RepostReason};
    use time::OffsetDateTime;

    fn author(did: &str, handle: &str) -> Author {
        Author {
            did: did.to_string(),
            handle: handle.to_string(),
            display_name: None,
            avatar: None,
        }
    }

    fn sample_item() -> FeedItem {
        FeedItem {
            uri: "at://did:plc:author/app.bsky.feed.post/1".to_string(),
            author: author("did:plc:author", "author.bsky.social"),
            indexed_at: OffsetDateTime::now_utc(),
            text: "hello".to_string(),
            facets: vec![],
            reply: None,
            reason: None,
            images: vec![],
        }
    }

    #[test]
    fn test_top_level_post() {
        let result = classify(&sample_item()).unwrap();
        assert_eq!(result.kind, PostKind::TopLevel);
        assert_eq!(result.attributed_actor, "did:plc:author");
    }

    #[test]
    fn test_reply_is_attributed_to_author() {
        let mut item = sample_item();
        item.reply = Some(ReplyRef {
            parent_uri: "at://did:plc:other/app.bsky.feed.post/0".to_string(),
            root_uri: "at://did:plc:other/app.bsky.feed.post/0".to_string(),
        });

        let result = classify(&item).unwrap();
        assert_eq!(result.kind, PostKind::Reply);
        assert_eq!(result.attributed_actor, "did:plc:author");
    }

    #[test]
    fn test_repost_is_attributed_to_reposter() {
        let mut item = sample_item();
        // A repost of a reply still counts as a repost
        item.reply = Some(ReplyRef {
            parent_uri: "at://did:plc:x/app.bsky.feed.post/0".to_string(),
            root_uri: "at://did:plc:x/app.bsky.feed.post/0".to_string(),
        });
        item.reason = Some(RepostReason {
            by: author("did:plc:reposter", "reposter.bsky.social"),
            indexed_at: OffsetDateTime::now_utc(),
            uri: None,
        });

        let result = classify(&item).unwrap();
        assert_eq!(result.kind, PostKind::Repost);
        assert_eq!(result.attributed_actor, "did:plc:reposter");
    }

    #[test]
    fn test_missing_fields_are_malformed() {
        let mut item = sample_item();
        item.author.did = String::new();
        assert!(matches!(
            classify(&item),
            Err(ClassifyError::MalformedItem {
                field: "author.did",
                ..
            })
        ));

        let mut item = sample_item();
        item.uri = " ".to_string();
        assert!(matches!(
            classify(&item),
            Err(ClassifyError::MalformedItem { field: "uri", .. })
        ));

        let mut item = sample_item();
        item.reason = Some(RepostReason {
            by: author("", "ghost"),
            indexed_at: OffsetDateTime::now_utc(),
            uri: None,
        });
        assert!(matches!(
            classify(&item),
            Err(ClassifyError::MalformedItem {
                field: "reason.by.did",
                ..
            })
        ));
    }
}
