//! Behaviour every `LedgerStore` implementation must share

use skyrelay_domain::{
    ChannelSubscription, ClaimOutcome, LedgerStore, PostKind, ProcessedPost, SubscriptionFilter,
    UpsertOutcome,
};
use time::OffsetDateTime;
use time::macros::datetime;

pub(crate) fn processed(uri: &str, did: &str) -> ProcessedPost {
    ProcessedPost {
        post_uri: uri.to_string(),
        did: did.to_string(),
        kind: PostKind::TopLevel,
        processed_at: OffsetDateTime::now_utc(),
    }
}

fn subscription(did: &str, channel_id: &str, filter: SubscriptionFilter) -> ChannelSubscription {
    ChannelSubscription {
        did: did.to_string(),
        channel_id: channel_id.to_string(),
        filter,
    }
}

pub(crate) async fn run_all(ledger: &dyn LedgerStore) {
    claims_are_once_only(ledger).await;
    subscriptions_upsert_and_cascade(ledger).await;
    subscribers_follow_flags(ledger).await;
    watermark_is_monotonic(ledger).await;
    prune_keeps_newest(ledger).await;
}

async fn claims_are_once_only(ledger: &dyn LedgerStore) {
    let post = processed("at://did:plc:c/app.bsky.feed.post/1", "did:plc:c");

    assert!(!ledger.is_processed(&post.post_uri).await.unwrap());
    assert_eq!(ledger.try_claim(&post).await.unwrap(), ClaimOutcome::Novel);
    assert_eq!(ledger.try_claim(&post).await.unwrap(), ClaimOutcome::Duplicate);
    assert!(ledger.is_processed(&post.post_uri).await.unwrap());
}

async fn subscriptions_upsert_and_cascade(ledger: &dyn LedgerStore) {
    let did = "did:plc:sub";
    let created = ledger
        .upsert_subscription(&subscription(did, "c2", SubscriptionFilter::default()))
        .await
        .unwrap();
    assert_eq!(created, UpsertOutcome::Created);

    let everything = SubscriptionFilter {
        top_level: true,
        replies: true,
        reposts: true,
    };
    let updated = ledger
        .upsert_subscription(&subscription(did, "c2", everything))
        .await
        .unwrap();
    assert_eq!(updated, UpsertOutcome::Updated);
    ledger
        .upsert_subscription(&subscription(did, "c1", SubscriptionFilter::default()))
        .await
        .unwrap();

    let in_c2 = ledger.channel_subscriptions("c2").await.unwrap();
    assert_eq!(in_c2, vec![subscription(did, "c2", everything)]);

    let missing = ledger.remove_subscription(did, "nope").await.unwrap();
    assert!(!missing.removed);
    assert_eq!(missing.remaining, 2);

    let first = ledger.remove_subscription(did, "c1").await.unwrap();
    assert!(first.removed);
    assert_eq!(first.remaining, 1);
    assert!(!first.account_untracked);
    assert!(ledger.tracked_account(did).await.unwrap().is_some());

    let last = ledger.remove_subscription(did, "c2").await.unwrap();
    assert!(last.account_untracked);
    assert!(ledger.tracked_account(did).await.unwrap().is_none());
}

async fn subscribers_follow_flags(ledger: &dyn LedgerStore) {
    let did = "did:plc:flags";
    let replies_only = SubscriptionFilter {
        top_level: false,
        replies: true,
        reposts: false,
    };
    ledger
        .upsert_subscription(&subscription(did, "b", SubscriptionFilter::default()))
        .await
        .unwrap();
    ledger
        .upsert_subscription(&subscription(did, "a", SubscriptionFilter::default()))
        .await
        .unwrap();
    ledger
        .upsert_subscription(&subscription(did, "r", replies_only))
        .await
        .unwrap();

    assert_eq!(
        ledger.subscribers(did, PostKind::TopLevel).await.unwrap(),
        vec!["a".to_string(), "b".to_string()]
    );
    assert_eq!(
        ledger.subscribers(did, PostKind::Reply).await.unwrap(),
        vec!["r".to_string()]
    );
    assert!(ledger.subscribers(did, PostKind::Repost).await.unwrap().is_empty());
}

async fn watermark_is_monotonic(ledger: &dyn LedgerStore) {
    let did = "did:plc:wm";
    assert!(
        !ledger
            .advance_watermark(did, datetime!(2024-01-15 10:00 UTC))
            .await
            .unwrap()
    );

    ledger
        .upsert_subscription(&subscription(did, "c", SubscriptionFilter::default()))
        .await
        .unwrap();
    assert_eq!(
        ledger.tracked_account(did).await.unwrap().unwrap().last_checked_at,
        None
    );

    assert!(
        ledger
            .advance_watermark(did, datetime!(2024-01-15 10:00 UTC))
            .await
            .unwrap()
    );
    assert!(
        ledger
            .advance_watermark(did, datetime!(2024-01-15 09:00 UTC))
            .await
            .unwrap()
    );

    let account = ledger.tracked_account(did).await.unwrap().unwrap();
    assert_eq!(account.last_checked_at, Some(datetime!(2024-01-15 10:00 UTC)));

    let listed = ledger.tracked_accounts().await.unwrap();
    assert!(listed.iter().any(|a| a.did == did));
    assert!(listed.windows(2).all(|w| w[0].did <= w[1].did));
}

async fn prune_keeps_newest(ledger: &dyn LedgerStore) {
    let did = "did:plc:prune";
    for n in 1..=5 {
        ledger
            .try_claim(&processed(&format!("at://{did}/app.bsky.feed.post/{n}"), did))
            .await
            .unwrap();
    }
    ledger
        .try_claim(&processed("at://did:plc:other/app.bsky.feed.post/1", "did:plc:other"))
        .await
        .unwrap();

    assert_eq!(ledger.prune_processed(did, 2).await.unwrap(), 3);
    assert_eq!(ledger.prune_processed(did, 2).await.unwrap(), 0);

    for n in 1..=3 {
        let uri = format!("at://{did}/app.bsky.feed.post/{n}");
        assert!(!ledger.is_processed(&uri).await.unwrap(), "{uri} should be pruned");
    }
    for n in 4..=5 {
        let uri = format!("at://{did}/app.bsky.feed.post/{n}");
        assert!(ledger.is_processed(&uri).await.unwrap(), "{uri} should be kept");
    }
    assert!(
        ledger
            .is_processed("at://did:plc:other/app.bsky.feed.post/1")
            .await
            .unwrap()
    );
}
