//! Single forward-worker task: dequeue, POST with retry/backoff, drop
//! on exhaustion.
//!
//! Port of `original_source/app/services/forwarder.py`'s
//! `_forward_with_retries`/`forward_worker`, kept single-in-flight to
//! preserve the original's delivery ordering guarantee.

use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;
use tokio::sync::Notify;
use tracing::{error, info, warn};

use crate::config::AppConfig;
use crate::mapper::Mapper;
use crate::queue::ForwardQueueReceiver;
use sia_common::ForwardItem;

pub struct ForwardWorker {
    client: Client,
    config: Arc<AppConfig>,
    mapper: Mapper,
}

impl ForwardWorker {
    pub fn new(config: Arc<AppConfig>) -> anyhow::Result<Self> {
        let client = Client::builder().timeout(config.forward_timeout).build()?;
        // `AppConfig::load` already rejected an unparseable APP_TIMEZONE
        // at startup, so this can't fail here.
        let timezone = config
            .app_timezone
            .parse()
            .expect("APP_TIMEZONE validated by AppConfig::load");
        let mapper = Mapper::new(timezone, &config.heartbeat_codes);
        Ok(Self { client, config, mapper })
    }

    /// Deliver one item, retrying with doubling backoff up to
    /// `forward_max_retries` total attempts. Never returns an error —
    /// exhaustion is a logged drop, not a propagated failure.
    async fn deliver(&self, item: &ForwardItem) {
        let payload = self.mapper.to_payload(&item.event);
        let mut delay = self.config.forward_retry_base_delay;
        let mut attempt = 0u32;

        loop {
            let mut request = self
                .client
                .post(&self.config.forward_url)
                .json(&payload);

            for (key, value) in &self.config.forward_extra_headers {
                request = request.header(key, value);
            }
            if !self.config.forward_cookie.is_empty() {
                request = request.header("Cookie", &self.config.forward_cookie);
            }
            if !self.config.forward_auth_header.is_empty() {
                request = request.header("Authorization", &self.config.forward_auth_header);
            }

            match request.send().await {
                Ok(resp) if resp.status().is_success() => {
                    info!(url = %self.config.forward_url, status = %resp.status(), "forwarded event");
                    return;
                }
                Ok(resp) => {
                    warn!(status = %resp.status(), "forward rejected by downstream");
                }
                Err(err) => {
                    error!(error = %err, "forward transport error");
                }
            }

            attempt += 1;
            if attempt >= self.config.forward_max_retries {
                error!(attempts = attempt, payload = %payload, "dropping event after exhausting retries");
                return;
            }
            tokio::time::sleep(delay).await;
            delay *= 2;
        }
    }

    /// Run until `shutdown` fires and the queue has drained, or the
    /// drain timeout elapses.
    pub async fn run(&self, mut queue: ForwardQueueReceiver, shutdown: Arc<Notify>) {
        info!("forward worker started");
        let mut shutting_down = false;

        loop {
            tokio::select! {
                biased;
                item = queue.recv() => {
                    match item {
                        Some(item) => self.deliver(&item).await,
                        None => break,
                    }
                }
                _ = shutdown.notified(), if !shutting_down => {
                    shutting_down = true;
                }
                _ = tokio::time::sleep(Duration::from_millis(200)), if shutting_down => {
                    if queue.is_empty() {
                        break;
                    }
                }
            }
        }
        info!("forward worker stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::bounded;
    use chrono::{DateTime, Utc};
    use std::collections::{BTreeMap, HashMap};

    fn sample_event() -> sia_common::ParsedEvent {
        sia_common::ParsedEvent {
            account: "AAA".to_string(),
            sequence: 1,
            receiver: Some("1".to_string()),
            line: "1".to_string(),
            message_type: 'N',
            code: "BA".to_string(),
            zone: Some("001".to_string()),
            partition: None,
            extras: BTreeMap::new(),
            timestamp: DateTime::parse_from_rfc3339("2025-10-20T07:52:50+00:00")
                .unwrap()
                .with_timezone(&Utc),
            timestamp_from_panel: true,
            remote_addr: "127.0.0.1:4000".to_string(),
            raw: String::new(),
        }
    }

    fn test_config(url: String) -> Arc<AppConfig> {
        Arc::new(AppConfig {
            log_level: "info".to_string(),
            sia_host: String::new(),
            sia_port: 65100,
            sia_accounts: vec!["AAA".to_string()],
            sia_keys: vec![],
            sia_allowed_timeband: Duration::from_secs(600),
            sia_idle_timeout: Duration::from_secs(30),
            forward_url: url,
            forward_auth_header: String::new(),
            forward_cookie: String::new(),
            forward_timeout: Duration::from_secs(1),
            forward_max_retries: 2,
            forward_retry_base_delay: Duration::from_millis(1),
            forward_extra_headers: HashMap::new(),
            app_timezone: "UTC".to_string(),
            heartbeat_codes: vec![],
            queue_capacity: 16,
            shutdown_drain_timeout: Duration::from_secs(1),
            admin_bind: "127.0.0.1:0".to_string(),
        })
    }

    #[tokio::test]
    async fn drops_after_exhausting_retries_against_unreachable_url() {
        let config = test_config("http://127.0.0.1:1/unreachable".to_string());
        let worker = ForwardWorker::new(config).unwrap();
        let (queue, mut rx) = bounded(4);
        queue.try_enqueue(ForwardItem::new(sample_event()));
        let item = rx.recv().await.unwrap();

        // Should return promptly having exhausted 2 retries, not hang.
        tokio::time::timeout(Duration::from_secs(5), worker.deliver(&item))
            .await
            .expect("deliver should not hang");
    }
}
