//! Mailbox delivery through the router: queue while no listener is
//! attached, drain in order on readiness, prune on tab close.

mod common;

use common::Harness;
use meanai::host::{BackgroundMessage, ContentMessage, Dispatch, RouterEvent};
use meanai::model::scripted::ScriptedModel;
use meanai::TabId;

const TAB: TabId = TabId(4);

async fn queue(harness: &mut Harness, text: &str, expected_pending: usize) {
    harness
        .client
        .send(TAB, ContentMessage::ExplainText { text: text.into() })
        .await
        .expect("explain");
    let event = harness
        .wait_event(|e| matches!(e, RouterEvent::Queued { .. }))
        .await;
    assert_eq!(
        event,
        RouterEvent::Queued {
            tab: TAB,
            pending: expected_pending
        }
    );
}

#[tokio::test]
async fn ready_drains_queued_results_in_order() {
    let mut harness = Harness::start(ScriptedModel::new());
    queue(&mut harness, "first", 1).await;
    queue(&mut harness, "second", 2).await;

    let mut inbox = harness.transport.attach(TAB);
    let dispatch = harness
        .client
        .send(TAB, ContentMessage::ContentReady)
        .await
        .expect("ready");
    assert_eq!(dispatch, Dispatch::Ready { delivered: 2 });

    let mut delivered = Vec::new();
    while let Ok(BackgroundMessage::Show { data }) = inbox.try_recv() {
        delivered.push(data.origin_text);
    }
    assert_eq!(delivered, vec!["first", "second"]);
    assert_eq!(harness.background.mailbox().pending(TAB), 0);

    harness.shutdown().await;
}

#[tokio::test]
async fn second_readiness_delivers_nothing_twice() {
    let mut harness = Harness::start(ScriptedModel::new());
    queue(&mut harness, "only", 1).await;

    let mut inbox = harness.transport.attach(TAB);
    let first = harness.client.send(TAB, ContentMessage::ContentReady);
    let second = harness.client.send(TAB, ContentMessage::ContentReady);
    let (first, second) = tokio::join!(first, second);

    let mut delivered = [first.expect("ready"), second.expect("ready")]
        .iter()
        .map(|d| match d {
            Dispatch::Ready { delivered } => *delivered,
            other => panic!("unexpected dispatch {other:?}"),
        })
        .collect::<Vec<_>>();
    delivered.sort_unstable();
    assert_eq!(delivered, vec![0, 1]);

    assert!(inbox.try_recv().is_ok());
    assert!(inbox.try_recv().is_err());

    harness.shutdown().await;
}

#[tokio::test]
async fn results_stay_queued_while_listener_is_gone() {
    let mut harness = Harness::start(ScriptedModel::new());
    let inbox = harness.transport.attach(TAB);
    drop(inbox);

    queue(&mut harness, "late", 1).await;
    assert_eq!(
        harness.background.mailbox().peek(TAB)[0].origin_text,
        "late"
    );

    harness.shutdown().await;
}

#[tokio::test]
async fn tab_close_discards_queue_and_prefetch() {
    let mut harness = Harness::start(ScriptedModel::new());
    queue(&mut harness, "orphan", 1).await;
    assert_eq!(
        harness
            .client
            .send(TAB, ContentMessage::PrefetchSession)
            .await
            .expect("prefetch"),
        Dispatch::PrefetchStarted
    );

    let dispatch = harness
        .client
        .send(TAB, ContentMessage::TabClosed)
        .await
        .expect("close");
    assert_eq!(dispatch, Dispatch::TabClosed { dropped: 1 });
    assert_eq!(harness.background.mailbox().pending(TAB), 0);

    let model = harness.shutdown().await;
    assert_eq!(model.live(), 0);
}

#[tokio::test]
async fn tabs_have_independent_mailboxes() {
    let mut harness = Harness::start(ScriptedModel::new());
    queue(&mut harness, "for four", 1).await;

    let mut other = harness.transport.attach(TabId(5));
    let dispatch = harness
        .client
        .send(TabId(5), ContentMessage::ContentReady)
        .await
        .expect("ready");
    assert_eq!(dispatch, Dispatch::Ready { delivered: 0 });
    assert!(other.try_recv().is_err());
    assert_eq!(harness.background.mailbox().pending(TAB), 1);

    harness.shutdown().await;
}
