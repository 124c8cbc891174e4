//! 通话信令中继测试

use std::time::Duration;

use domain::CallPhase;
use serde_json::json;

use super::test_support::{user, Harness};
use crate::dto::ServerEvent;

#[tokio::test]
async fn full_call_lifecycle() {
    let harness = Harness::new();
    let alice = harness.login("alice").await;
    let bob = harness.login("bob").await;
    harness.dispatcher.clear();

    let offer = json!({"sdp": "offer"});
    harness
        .service
        .call_user(alice, user("bob"), offer.clone())
        .await;
    assert_eq!(
        harness.dispatcher.named(bob, "incomingCall"),
        vec![ServerEvent::IncomingCall {
            from: user("alice"),
            signal: offer
        }]
    );
    assert_eq!(
        harness.service.calls().phase(&user("alice"), &user("bob")).await,
        Some(CallPhase::Ringing)
    );

    let answer = json!({"sdp": "answer"});
    harness
        .service
        .answer_call(bob, user("alice"), answer.clone())
        .await;
    assert_eq!(
        harness.dispatcher.named(alice, "callAccepted"),
        vec![ServerEvent::CallAccepted {
            from: user("bob"),
            signal: answer
        }]
    );
    assert_eq!(
        harness.service.calls().phase(&user("bob"), &user("alice")).await,
        Some(CallPhase::Active)
    );

    harness
        .service
        .ice_candidate(alice, user("bob"), json!({"candidate": "a"}))
        .await;
    harness
        .service
        .ice_candidate(bob, user("alice"), json!({"candidate": "b"}))
        .await;
    assert_eq!(harness.dispatcher.named(bob, "iceCandidate").len(), 1);
    assert_eq!(harness.dispatcher.named(alice, "iceCandidate").len(), 1);

    harness.service.end_call(alice, user("bob")).await;
    assert_eq!(
        harness.dispatcher.named(bob, "callEnded"),
        vec![ServerEvent::CallEnded { from: user("alice") }]
    );
    assert!(harness.dispatcher.named(alice, "callEnded").is_empty());
    assert_eq!(
        harness.service.calls().phase(&user("alice"), &user("bob")).await,
        None
    );

    // 回到 Idle 后可以再次呼叫
    harness
        .service
        .call_user(alice, user("bob"), json!({"sdp": "again"}))
        .await;
    assert_eq!(harness.dispatcher.named(bob, "incomingCall").len(), 2);
}

#[tokio::test]
async fn calling_an_offline_user_does_nothing() {
    let harness = Harness::new();
    let alice = harness.login("alice").await;
    harness.dispatcher.clear();

    harness
        .service
        .call_user(alice, user("bob"), json!({}))
        .await;

    assert_eq!(harness.dispatcher.total(), 0);
    assert_eq!(
        harness.service.calls().phase(&user("alice"), &user("bob")).await,
        None
    );
}

#[tokio::test]
async fn invalid_transitions_are_dropped() {
    let harness = Harness::new();
    let alice = harness.login("alice").await;
    let bob = harness.login("bob").await;
    harness.dispatcher.clear();

    // Idle 状态下的应答、ICE、挂断都被忽略
    harness
        .service
        .answer_call(bob, user("alice"), json!({}))
        .await;
    harness
        .service
        .ice_candidate(alice, user("bob"), json!({}))
        .await;
    harness.service.end_call(alice, user("bob")).await;
    assert_eq!(harness.dispatcher.total(), 0);

    // 主叫方不能替被叫方接听
    harness
        .service
        .call_user(alice, user("bob"), json!({}))
        .await;
    harness
        .service
        .answer_call(alice, user("bob"), json!({}))
        .await;
    assert!(harness.dispatcher.named(bob, "callAccepted").is_empty());
    assert_eq!(
        harness.service.calls().phase(&user("alice"), &user("bob")).await,
        Some(CallPhase::Ringing)
    );
}

#[tokio::test]
async fn recalling_replaces_the_existing_session() {
    let harness = Harness::new();
    let alice = harness.login("alice").await;
    let bob = harness.login("bob").await;

    harness
        .service
        .call_user(alice, user("bob"), json!({"n": 1}))
        .await;
    harness
        .service
        .answer_call(bob, user("alice"), json!({}))
        .await;
    harness
        .service
        .call_user(bob, user("alice"), json!({"n": 2}))
        .await;

    assert_eq!(
        harness.service.calls().phase(&user("alice"), &user("bob")).await,
        Some(CallPhase::Ringing)
    );
    assert_eq!(harness.dispatcher.named(alice, "incomingCall").len(), 1);
}

#[tokio::test]
async fn disconnect_ends_active_call() {
    let harness = Harness::new();
    let alice = harness.login("alice").await;
    let bob = harness.login("bob").await;
    harness
        .service
        .call_user(alice, user("bob"), json!({}))
        .await;
    harness
        .service
        .answer_call(bob, user("alice"), json!({}))
        .await;
    harness.dispatcher.clear();

    harness.dispatcher.close(bob);
    harness.service.disconnect(bob).await;

    assert_eq!(
        harness.dispatcher.named(alice, "callEnded"),
        vec![ServerEvent::CallEnded { from: user("bob") }]
    );
    assert_eq!(
        harness.dispatcher.named(alice, "presenceChanged"),
        vec![ServerEvent::PresenceChanged {
            users: vec![user("alice")]
        }]
    );
    assert_eq!(
        harness.service.calls().phase(&user("alice"), &user("bob")).await,
        None
    );
}

#[tokio::test]
async fn ringing_session_ends_when_callee_goes_offline() {
    let harness = Harness::new();
    let alice = harness.login("alice").await;
    let bob = harness.login("bob").await;
    harness
        .service
        .call_user(alice, user("bob"), json!({}))
        .await;
    harness.dispatcher.clear();

    harness.dispatcher.close(bob);
    harness.service.disconnect(bob).await;

    assert_eq!(harness.dispatcher.named(alice, "callEnded").len(), 1);
    assert_eq!(
        harness.service.calls().phase(&user("alice"), &user("bob")).await,
        None
    );
}

#[tokio::test]
async fn ringing_survives_when_callee_has_another_session() {
    let harness = Harness::new();
    let alice = harness.login("alice").await;
    let bob_phone = harness.login("bob").await;
    let bob_laptop = harness.login("bob").await;
    harness
        .service
        .call_user(alice, user("bob"), json!({}))
        .await;

    harness.dispatcher.close(bob_phone);
    harness.service.disconnect(bob_phone).await;
    assert_eq!(
        harness.service.calls().phase(&user("alice"), &user("bob")).await,
        Some(CallPhase::Ringing)
    );

    harness
        .service
        .answer_call(bob_laptop, user("alice"), json!({}))
        .await;
    assert_eq!(harness.dispatcher.named(alice, "callAccepted").len(), 1);
}

#[tokio::test]
async fn unanswered_call_times_out_when_configured() {
    let harness = Harness::with_ring_timeout(Some(Duration::from_millis(50)));
    let alice = harness.login("alice").await;
    let bob = harness.login("bob").await;

    harness
        .service
        .call_user(alice, user("bob"), json!({}))
        .await;
    tokio::time::sleep(Duration::from_millis(200)).await;

    assert_eq!(
        harness.dispatcher.named(alice, "callEnded"),
        vec![ServerEvent::CallEnded { from: user("bob") }]
    );
    assert_eq!(
        harness.dispatcher.named(bob, "callEnded"),
        vec![ServerEvent::CallEnded { from: user("alice") }]
    );
    assert_eq!(
        harness.service.calls().phase(&user("alice"), &user("bob")).await,
        None
    );
}

#[tokio::test]
async fn answered_call_is_not_timed_out() {
    let harness = Harness::with_ring_timeout(Some(Duration::from_millis(50)));
    let alice = harness.login("alice").await;
    let bob = harness.login("bob").await;

    harness
        .service
        .call_user(alice, user("bob"), json!({}))
        .await;
    harness
        .service
        .answer_call(bob, user("alice"), json!({}))
        .await;
    tokio::time::sleep(Duration::from_millis(200)).await;

    assert!(harness.dispatcher.named(alice, "callEnded").is_empty());
    assert_eq!(
        harness.service.calls().phase(&user("alice"), &user("bob")).await,
        Some(CallPhase::Active)
    );
}
