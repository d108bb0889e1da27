//! Explain cycle through the router: capability gate, session pool and
//! response normalization end to end.

mod common;

use common::Harness;
use meanai::host::{BackgroundMessage, ContentMessage, Dispatch, RouterEvent};
use meanai::model::scripted::ScriptedModel;
use meanai::model::{ModelAvailability, RuntimeError};
use meanai::{ExplanationRecord, TabId};
use std::time::Duration;
use tokio::sync::mpsc;

const TAB: TabId = TabId(1);

async fn next_show(inbox: &mut mpsc::UnboundedReceiver<BackgroundMessage>) -> ExplanationRecord {
    let message = tokio::time::timeout(Duration::from_secs(5), inbox.recv())
        .await
        .expect("timed out waiting for SHOW")
        .expect("inbox closed");
    let BackgroundMessage::Show { data } = message;
    data
}

async fn explain(harness: &Harness, text: &str) {
    let dispatch = harness
        .client
        .send(TAB, ContentMessage::ExplainText { text: text.into() })
        .await
        .expect("explain");
    assert_eq!(dispatch, Dispatch::ExplainScheduled { text: text.into() });
}

#[tokio::test]
async fn selecting_ubiquitous_yields_structured_record() {
    let model = ScriptedModel::new().with_reply(
        r#"{"originText":"ubiquitous","partOfSpeech":"adjective","description":"present everywhere","similar1":"omnipresent","similar2":"","similar3":""}"#,
    );
    let harness = Harness::start(model);
    let mut inbox = harness.transport.attach(TAB);

    let prefetch = harness
        .client
        .send(TAB, ContentMessage::PrefetchSession)
        .await
        .expect("prefetch");
    assert_eq!(prefetch, Dispatch::PrefetchStarted);
    explain(&harness, "ubiquitous").await;

    let record = next_show(&mut inbox).await;
    assert_eq!(record.origin_text, "ubiquitous");
    assert_eq!(record.part_of_speech, "adjective");
    assert_eq!(record.description, "present everywhere");
    assert_eq!(record.similar[0], "omnipresent");
    assert_eq!(record.similar[1], "");
    assert_eq!(record.similar[2], "");
    assert!(!record.is_error());

    let model = harness.shutdown().await;
    assert_eq!(model.created(), 1, "the prefetched session is consumed");
    assert_eq!(model.live(), 0);
    assert!(model.prompts()[0].contains("\"ubiquitous\""));
}

#[tokio::test]
async fn unavailable_model_yields_error_record_without_sessions() {
    let model = ScriptedModel::new().with_availability(ModelAvailability::Unavailable);
    let harness = Harness::start(model);
    let mut inbox = harness.transport.attach(TAB);

    explain(&harness, "ubiquitous").await;
    let record = next_show(&mut inbox).await;
    assert_eq!(record.origin_text, "ubiquitous");
    assert_eq!(record.error_code.as_deref(), Some("MODEL_UNAVAILABLE"));
    assert!(record.description.starts_with("Error: "));

    let model = harness.shutdown().await;
    assert_eq!(model.created(), 0);
}

#[tokio::test]
async fn downloading_model_yields_retryable_error() {
    let model = ScriptedModel::new().with_availability(ModelAvailability::Downloading);
    let harness = Harness::start(model);
    let mut inbox = harness.transport.attach(TAB);

    explain(&harness, "word").await;
    let record = next_show(&mut inbox).await;
    assert_eq!(record.error_code.as_deref(), Some("MODEL_DOWNLOADING"));

    let model = harness.shutdown().await;
    assert_eq!(model.created(), 0);
}

#[tokio::test]
async fn plain_prose_reply_becomes_description() {
    let prose = "It means being everywhere at once.";
    let harness = Harness::start(ScriptedModel::new().with_reply(prose));
    let mut inbox = harness.transport.attach(TAB);

    explain(&harness, "ubiquitous").await;
    let record = next_show(&mut inbox).await;
    assert_eq!(record.description, prose);
    assert_eq!(record.part_of_speech, "Unknown");
    assert_eq!(record.origin_text, "ubiquitous");
    assert!(!record.is_error());

    harness.shutdown().await;
}

#[tokio::test]
async fn model_echo_never_replaces_submitted_text() {
    let harness = Harness::start(ScriptedModel::new().with_reply(
        r#"Sure! {"originText":"something else","partOfSpeech":"noun","description":"d"} Hope that helps."#,
    ));
    let mut inbox = harness.transport.attach(TAB);

    explain(&harness, "ubiquitous").await;
    let record = next_show(&mut inbox).await;
    assert_eq!(record.origin_text, "ubiquitous");
    assert_eq!(record.part_of_speech, "noun");

    harness.shutdown().await;
}

#[tokio::test]
async fn repeated_prefetch_creates_one_session() {
    let harness = Harness::start(ScriptedModel::new());

    let mut dispatches = Vec::new();
    for _ in 0..5 {
        dispatches.push(
            harness
                .client
                .send(TAB, ContentMessage::PrefetchSession)
                .await
                .expect("prefetch"),
        );
    }
    assert_eq!(dispatches[0], Dispatch::PrefetchStarted);
    assert!(dispatches[1..].iter().all(|d| *d == Dispatch::PrefetchIgnored));

    let other = harness
        .client
        .send(TabId(2), ContentMessage::PrefetchSession)
        .await
        .expect("prefetch");
    assert_eq!(other, Dispatch::PrefetchStarted, "tabs prefetch independently");

    let model = harness.shutdown().await;
    assert_eq!(model.created(), 2);
    assert_eq!(model.live(), 0);
}

#[tokio::test]
async fn sessions_created_equal_sessions_destroyed() {
    let model = ScriptedModel::new()
        .with_reply(r#"{"partOfSpeech":"noun","description":"ok"}"#)
        .with_prompt_failure(RuntimeError::Http {
            status: 500,
            message: "boom".into(),
        })
        .with_reply("no json at all")
        .with_reply("");
    let mut harness = Harness::start(model);
    let mut inbox = harness.transport.attach(TAB);

    for text in ["one", "two", "three", "four"] {
        explain(&harness, text).await;
        harness
            .wait_event(|e| matches!(e, RouterEvent::ExplainFinished { .. }))
            .await;
    }
    harness.model.fail_next_creates(1);
    explain(&harness, "five").await;

    let mut codes = Vec::new();
    for _ in 0..5 {
        codes.push(next_show(&mut inbox).await.error_code);
    }
    assert_eq!(
        codes,
        vec![
            None,
            Some("PROMPT_FAILED".to_owned()),
            None,
            Some("PROMPT_FAILED".to_owned()),
            Some("SESSION_CREATE_FAILED".to_owned()),
        ]
    );

    let model = harness.shutdown().await;
    assert_eq!(model.created(), 4);
    assert_eq!(model.created(), model.destroyed());
}

#[tokio::test]
async fn context_menu_click_runs_explain_cycle() {
    let harness = Harness::start(ScriptedModel::new());
    let mut inbox = harness.transport.attach(TAB);

    let dispatch = harness
        .client
        .send(
            TAB,
            ContentMessage::ContextMenuClicked {
                menu_item_id: "explain".into(),
                selection_text: "  serendipity ".into(),
            },
        )
        .await
        .expect("menu");
    assert_eq!(
        dispatch,
        Dispatch::ExplainScheduled {
            text: "serendipity".into()
        }
    );
    assert_eq!(next_show(&mut inbox).await.origin_text, "serendipity");

    harness.shutdown().await;
}
