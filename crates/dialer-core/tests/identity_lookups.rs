//! Lookup cancellation and stale-result handling of the identity resolver

use std::sync::Arc;
use std::time::Duration;

use dialer_core::call::AccountId;
use dialer_core::config::IdentityConfig;
use dialer_core::identity::directory::{ContactInfo, StaticDirectory};
use dialer_core::identity::CallerIdentityResolver;

fn directory(latency: Duration) -> StaticDirectory {
    StaticDirectory::new()
        .with_contact("5550001", ContactInfo::new("First Caller"))
        .with_contact("5550002", ContactInfo::new("Second Caller"))
        .with_contact("5550003", ContactInfo::new("Third Caller").with_avatar("avatars/third.png"))
        .with_latency(latency)
}

#[tokio::test]
async fn test_rapid_subject_changes_deliver_only_the_last() {
    let directory = Arc::new(directory(Duration::from_millis(50)));
    let mut resolver = CallerIdentityResolver::new(directory.clone(), IdentityConfig::default());
    let (id, rx) = resolver.subscribe();
    let account = AccountId::new("sim1");

    resolver.resolve(id, "5550001", &account);
    resolver.resolve(id, "5550002", &account);
    let immediate = resolver.resolve(id, "5550003", &account);
    assert_eq!(immediate.initials, "#");

    let completion = resolver.next_completion().await.expect("lookup completion");
    assert_eq!(completion.subject().address, "5550003");
    resolver.apply_completion(completion);

    let stats = resolver.stats();
    assert_eq!(stats.started, 3);
    assert_eq!(stats.cancelled, 2);
    assert_eq!(stats.delivered, 1);
    assert_eq!(stats.stale_dropped, 0);

    let shown = rx.borrow().clone().expect("identity published");
    assert_eq!(shown.display_name, "Third Caller");
    assert_eq!(shown.avatar_ref.as_deref(), Some("avatars/third.png"));
    assert_eq!(resolver.lookups_in_flight(), 0);

    // Cancelled lookups never report back
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(tokio::time::timeout(Duration::from_millis(10), resolver.next_completion())
        .await
        .is_err());
}

#[tokio::test]
async fn test_late_result_does_not_overwrite_newer_subject() {
    let directory = Arc::new(directory(Duration::ZERO));
    let mut resolver = CallerIdentityResolver::new(directory, IdentityConfig::default());
    let (id, rx) = resolver.subscribe();
    let account = AccountId::new("sim1");

    resolver.resolve(id, "5550001", &account);
    // The first lookup finishes before the subscriber moves on
    let late = resolver.next_completion().await.expect("first completion");

    resolver.resolve(id, "5550002", &account);
    resolver.apply_completion(late);

    assert_eq!(resolver.stats().stale_dropped, 1);
    assert_eq!(rx.borrow().as_ref().unwrap().display_name, "5550002");

    let current = resolver.next_completion().await.expect("second completion");
    resolver.apply_completion(current);
    assert_eq!(rx.borrow().as_ref().unwrap().display_name, "Second Caller");
    assert_eq!(resolver.stats().delivered, 1);
}

#[tokio::test]
async fn test_subjects_differ_by_account() {
    let directory = Arc::new(directory(Duration::ZERO));
    let mut resolver = CallerIdentityResolver::new(directory.clone(), IdentityConfig::default());
    let (id, _rx) = resolver.subscribe();

    resolver.resolve(id, "5550001", &AccountId::new("sim1"));
    let completion = resolver.next_completion().await.unwrap();
    resolver.apply_completion(completion);

    // Same address on another account is a new subject and a new lookup
    resolver.resolve(id, "5550001", &AccountId::new("voip"));
    assert_eq!(resolver.stats().started, 2);
    assert_eq!(resolver.lookups_in_flight(), 1);

    let completion = resolver.next_completion().await.unwrap();
    resolver.apply_completion(completion);
    assert_eq!(directory.lookup_count(), 2);
}

#[tokio::test]
async fn test_unknown_number_keeps_fallback() {
    let directory = Arc::new(directory(Duration::ZERO));
    let mut resolver = CallerIdentityResolver::new(directory, IdentityConfig::default());
    let (id, rx) = resolver.subscribe();

    resolver.resolve(id, "+16505550199", &AccountId::new("sim1"));
    let completion = resolver.next_completion().await.unwrap();
    resolver.apply_completion(completion);

    let shown = rx.borrow().clone().unwrap();
    assert_eq!(shown.display_name, "+1 (650) 555-0199");
    assert_eq!(shown.initials, "#");
    assert_eq!(resolver.stats().delivered, 1);

    resolver.clear_cache();
}
