mod support;

use std::sync::atomic::Ordering;
use std::time::Duration;

use chrono::Utc;
use tokio::time::sleep;

use squad_messaging::conversation;
use squad_messaging::event::{AppEvent, ChangeEvent, EventBus};
use squad_messaging::message::{Kind, MessageStore};
use squad_messaging::unread::UnreadService;
use squad_messaging::user::Sub;

use support::{FakeApi, FakeFeed, base_time, conversation_with_unread, message_at};

#[tokio::test(start_paused = true)]
async fn starts_lazily_and_shares_one_loop() {
    let api = FakeApi::new("me");
    api.set_lists(
        vec![
            conversation_with_unread(conversation::Id::random(), 2),
            conversation_with_unread(conversation::Id::random(), 3),
        ],
        vec![conversation_with_unread(conversation::Id::random(), 7)],
    );
    let service = UnreadService::new(api.clone(), FakeFeed::new(), EventBus::new());
    assert_eq!(api.calls.find_conversations.load(Ordering::SeqCst), 0);

    let navbar = service.subscribe();
    let sidebar = service.subscribe();
    sleep(Duration::from_millis(1)).await;

    // void conversations do not count towards the total
    assert_eq!(navbar.count(), 5);
    assert_eq!(sidebar.count(), 5);
    assert_eq!(api.calls.find_conversations.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn late_subscriber_sees_last_known_value_immediately() {
    let api = FakeApi::new("me");
    api.set_lists(
        vec![conversation_with_unread(conversation::Id::random(), 4)],
        vec![],
    );
    let service = UnreadService::new(api.clone(), FakeFeed::new(), EventBus::new());

    let _first = service.subscribe();
    sleep(Duration::from_millis(1)).await;

    let late = service.subscribe();
    assert_eq!(late.count(), 4);
    assert_eq!(api.calls.find_conversations.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn message_inserts_debounce_into_one_recompute() {
    let x = conversation::Id::random();
    let api = FakeApi::new("me");
    api.set_lists(vec![conversation_with_unread(x, 1)], vec![]);
    let feed = FakeFeed::new();
    let service = UnreadService::new(api.clone(), feed.clone(), EventBus::new());

    let handle = service.subscribe();
    sleep(Duration::from_millis(1)).await;
    assert_eq!(handle.count(), 1);

    api.set_lists(vec![conversation_with_unread(x, 6)], vec![]);
    for _ in 0..5 {
        feed.push_list(ChangeEvent::MessageInserted {
            message: message_at(x, "user-b", "ping", base_time()),
        });
        sleep(Duration::from_millis(10)).await;
    }
    sleep(Duration::from_millis(600)).await;

    assert_eq!(handle.count(), 6);
    assert_eq!(api.calls.find_conversations.load(Ordering::SeqCst), 2);
}

#[tokio::test(start_paused = true)]
async fn messages_read_decrements_optimistically_and_clamps() {
    let x = conversation::Id::random();
    let y = conversation::Id::random();
    let api = FakeApi::new("me");
    api.set_lists(
        vec![
            conversation_with_unread(x, 3),
            conversation_with_unread(y, 2),
        ],
        vec![],
    );
    let bus = EventBus::new();
    let service = UnreadService::new(api.clone(), FakeFeed::new(), bus.clone());

    let handle = service.subscribe();
    sleep(Duration::from_millis(1)).await;
    assert_eq!(handle.count(), 5);

    bus.publish(AppEvent::MessagesRead {
        conversation_id: x,
        read_at: Utc::now(),
    });
    sleep(Duration::from_millis(1)).await;
    assert_eq!(handle.count(), 2); // dropped by the full prior value of x

    bus.publish(AppEvent::MessagesRead {
        conversation_id: y,
        read_at: Utc::now(),
    });
    sleep(Duration::from_millis(1)).await;
    assert_eq!(handle.count(), 0);

    // unknown conversation: clamped at zero, never underflows
    bus.publish(AppEvent::MessagesRead {
        conversation_id: conversation::Id::random(),
        read_at: Utc::now(),
    });
    sleep(Duration::from_millis(1)).await;
    assert_eq!(handle.count(), 0);

    // no refetch was needed for any of the above
    assert_eq!(api.calls.find_conversations.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn disabled_consumer_reports_zero_and_registers_nothing() {
    let api = FakeApi::new("me");
    api.set_lists(
        vec![conversation_with_unread(conversation::Id::random(), 9)],
        vec![],
    );
    let service = UnreadService::new(api.clone(), FakeFeed::new(), EventBus::new());

    let disabled = service.subscribe_if(false);
    sleep(Duration::from_millis(1)).await;

    assert_eq!(disabled.count(), 0);
    assert_eq!(api.calls.find_conversations.load(Ordering::SeqCst), 0);
}

/// End to end across surfaces: marking a conversation read in its message
/// store clears the badge everywhere before any network response.
#[tokio::test(start_paused = true)]
async fn mark_as_read_clears_all_surfaces() {
    let x = conversation::Id::random();
    let api = FakeApi::new("me");
    api.set_lists(vec![conversation_with_unread(x, 3)], vec![]);
    let feed = FakeFeed::new();
    let bus = EventBus::new();

    let unread = UnreadService::new(api.clone(), feed.clone(), bus.clone());
    let badge = unread.subscribe();

    let list = squad_messaging::ConversationService::new(api.clone(), feed.clone(), bus.clone());
    list.init().await;

    let store = MessageStore::open(api.clone(), feed.clone(), bus.clone(), Sub::from("me"), x).await;
    let _ = store.send("read below", Kind::Text).await;
    sleep(Duration::from_millis(1)).await;
    assert_eq!(badge.count(), 3);

    store.mark_as_read();
    sleep(Duration::from_millis(1)).await;

    assert_eq!(list.snapshot().unread_for(&x), Some(0));
    assert_eq!(badge.count(), 0);
}
