//! Scripted channel adapter for testing

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use crate::domain::value_objects::Channel;

use super::adapter::{ChannelAdapter, DeliveryResult, RenderedMessage};

/// Replays queued results, then delivers successfully
pub struct ScriptedChannelAdapter {
    channel: Channel,
    script: Mutex<VecDeque<DeliveryResult>>,
    sent: Mutex<Vec<(String, RenderedMessage)>>,
    calls: AtomicU32,
    delay: Option<Duration>,
}

impl ScriptedChannelAdapter {
    pub fn new(channel: Channel) -> Self {
        Self {
            channel,
            script: Mutex::new(VecDeque::new()),
            sent: Mutex::new(Vec::new()),
            calls: AtomicU32::new(0),
            delay: None,
        }
    }

    pub fn with_script(channel: Channel, results: Vec<DeliveryResult>) -> Self {
        let adapter = Self::new(channel);
        adapter.script.lock().unwrap().extend(results);
        adapter
    }

    /// Sleep before answering, to exercise timeouts
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    /// Messages that were answered with `Delivered`
    pub fn delivered(&self) -> Vec<(String, RenderedMessage)> {
        self.sent.lock().unwrap().clone()
    }

    /// Code carried by the last delivered message
    pub fn last_code(&self) -> Option<String> {
        self.sent.lock().unwrap().last().and_then(|(_, message)| {
            message
                .body
                .split(|c: char| !c.is_ascii_alphanumeric())
                .find(|word| word.len() >= 4 && word.chars().all(|c| c.is_ascii_digit()))
                .map(str::to_string)
        })
    }
}

#[async_trait]
impl ChannelAdapter for ScriptedChannelAdapter {
    fn channel(&self) -> Channel {
        self.channel
    }

    async fn send(&self, destination: &str, message: &RenderedMessage) -> DeliveryResult {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let result = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| DeliveryResult::Delivered {
                provider_message_id: format!("mock-msg-{}", call),
            });

        if matches!(result, DeliveryResult::Delivered { .. }) {
            self.sent
                .lock()
                .unwrap()
                .push((destination.to_string(), message.clone()));
        }
        result
    }
}
