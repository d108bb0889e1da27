//! Shared harness for router-level integration tests.
#![allow(dead_code)]

use meanai::config::MeanAiConfig;
use meanai::host::{Background, ChannelTransport, Router, RouterClient, RouterEvent, router_channel};
use meanai::model::scripted::ScriptedModel;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

pub struct Harness {
    pub model: ScriptedModel,
    pub transport: Arc<ChannelTransport>,
    pub client: RouterClient,
    pub events: broadcast::Receiver<RouterEvent>,
    pub background: Arc<Background>,
    server: JoinHandle<()>,
}

impl Harness {
    pub fn start(model: ScriptedModel) -> Self {
        Self::start_with(model, test_config())
    }

    pub fn start_with(model: ScriptedModel, config: MeanAiConfig) -> Self {
        let transport = Arc::new(ChannelTransport::new());
        let background =
            Background::from_config(&config, Arc::new(model.clone()), transport.clone());
        let (client, router): (RouterClient, Router) = router_channel(32, 64, background);
        let events = client.subscribe_events();
        let background = router.background();
        let server = tokio::spawn(router.run());
        Self {
            model,
            transport,
            client,
            events,
            background,
            server,
        }
    }

    /// Wait for the first event matching `pred`.
    pub async fn wait_event(&mut self, pred: impl Fn(&RouterEvent) -> bool) -> RouterEvent {
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                match self.events.recv().await {
                    Ok(event) if pred(&event) => return event,
                    Ok(_) => continue,
                    Err(e) => panic!("event stream ended: {e}"),
                }
            }
        })
        .await
        .expect("timed out waiting for router event")
    }

    /// Drop the client and wait for the router to drain and shut down.
    pub async fn shutdown(self) -> ScriptedModel {
        drop(self.client);
        self.server.await.expect("router task");
        self.model
    }
}

pub fn test_config() -> MeanAiConfig {
    let mut config = MeanAiConfig::default();
    config.model.warm_download_on_ready = false;
    config
}
