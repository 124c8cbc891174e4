//! 已读回执测试

use domain::MessageFilter;

use super::test_support::{text, user, Harness};
use crate::{dto::ServerEvent, repository::MessageStore};

#[tokio::test]
async fn mark_seen_is_idempotent_and_notifies_sender_once() {
    let harness = Harness::new();
    let alice = harness.login("alice").await;
    let alice_tab = harness.login("alice").await;
    let bob = harness.login("bob").await;

    for body in ["one", "two"] {
        harness
            .service
            .send_private(alice, user("bob"), text(body))
            .await
            .unwrap();
    }
    harness.dispatcher.clear();

    assert_eq!(harness.service.mark_seen(bob, user("alice")).await.unwrap(), 2);
    assert_eq!(harness.service.mark_seen(bob, user("alice")).await.unwrap(), 0);

    let confirmation = ServerEvent::SeenConfirmed { by: user("bob") };
    assert_eq!(
        harness.dispatcher.named(alice, "seenConfirmed"),
        vec![confirmation.clone()]
    );
    assert_eq!(
        harness.dispatcher.named(alice_tab, "seenConfirmed"),
        vec![confirmation]
    );
    assert!(harness.dispatcher.events_for(bob).is_empty());

    let history = harness
        .store
        .find(MessageFilter::conversation(user("alice"), user("bob")))
        .await
        .unwrap();
    assert!(history.iter().all(|message| message.seen() == Some(true)));
}

#[tokio::test]
async fn mark_seen_only_touches_messages_addressed_to_reader() {
    let harness = Harness::new();
    let alice = harness.login("alice").await;
    let bob = harness.login("bob").await;

    harness
        .service
        .send_private(alice, user("bob"), text("to bob"))
        .await
        .unwrap();
    harness
        .service
        .send_private(bob, user("alice"), text("to alice"))
        .await
        .unwrap();

    // alice 确认的是 bob 发给她的消息，alice 发给 bob 的仍然未读
    assert_eq!(harness.service.mark_seen(alice, user("bob")).await.unwrap(), 1);
    let unseen = harness
        .store
        .find(MessageFilter::unseen_from(user("alice"), user("bob")))
        .await
        .unwrap();
    assert_eq!(unseen.len(), 1);
}

#[tokio::test]
async fn unauthenticated_mark_seen_is_dropped() {
    let harness = Harness::new();
    let alice = harness.login("alice").await;
    harness
        .service
        .send_private(alice, user("bob"), text("hi"))
        .await
        .unwrap();
    let stranger = harness.dispatcher.connect();
    harness.dispatcher.clear();

    assert_eq!(
        harness.service.mark_seen(stranger, user("alice")).await.unwrap(),
        0
    );
    assert_eq!(harness.dispatcher.total(), 0);
}
