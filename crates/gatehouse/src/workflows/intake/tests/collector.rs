use std::time::Duration;

use super::common::{channel, user, MemoryGateway};
use crate::workflows::intake::collector::{CollectOutcome, ReplyCollector};
use crate::workflows::intake::gateway::ConversationGateway;

#[tokio::test]
async fn resolves_with_the_first_qualifying_reply() {
    let gateway = MemoryGateway::new();
    let feed = channel("general");
    let subscription = gateway.subscribe(&feed).await.expect("subscribe");
    let collector = ReplyCollector::new(subscription, Duration::from_secs(30));

    gateway.say(&feed, "someone-else", "not for you");
    gateway.say(&feed, "u-1", "first");
    gateway.say(&feed, "u-1", "second");

    match collector.collect_from(&user("u-1")).await {
        CollectOutcome::Reply(message) => {
            assert_eq!(message.text, "first");
            assert_eq!(message.author, user("u-1"));
        }
        other => panic!("expected a reply, got {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn times_out_when_no_qualifying_reply_arrives() {
    let gateway = MemoryGateway::new();
    let feed = channel("general");
    let subscription = gateway.subscribe(&feed).await.expect("subscribe");
    let collector = ReplyCollector::new(subscription, Duration::from_secs(300));

    gateway.say(&feed, "someone-else", "chatter");

    match collector.collect_from(&user("u-1")).await {
        CollectOutcome::TimedOut => {}
        other => panic!("expected a timeout, got {other:?}"),
    }
}

#[tokio::test]
async fn cancel_handle_stops_the_wait() {
    let gateway = MemoryGateway::new();
    let feed = channel("general");
    let subscription = gateway.subscribe(&feed).await.expect("subscribe");
    let collector = ReplyCollector::new(subscription, Duration::from_secs(300));
    let cancel = collector.cancel_handle();

    let wait = tokio::spawn(async move { collector.collect_from(&user("u-1")).await });
    cancel.cancel();

    match wait.await.expect("collector task") {
        CollectOutcome::Cancelled => {}
        other => panic!("expected cancellation, got {other:?}"),
    }
}

#[tokio::test]
async fn surfaces_channel_removal() {
    let gateway = MemoryGateway::new();
    let feed = channel("general");
    let subscription = gateway.subscribe(&feed).await.expect("subscribe");
    let collector = ReplyCollector::new(subscription, Duration::from_secs(300));

    gateway.delete_channel(&feed).await.expect("delete");

    match collector.collect_from(&user("u-1")).await {
        CollectOutcome::Closed => {}
        other => panic!("expected a closed feed, got {other:?}"),
    }
}
