use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use tether_core::domain::thread::Platform;
use tether_core::domain::update::ReplicationAck;
use tether_db::repositories::{
    IntegrationRepository, MessageRepository, OutboundMessage, OutboundUpdate,
    RelayCursorRepository, UpdateRepository,
};
use tether_slack::markup::render_rich_text;
use tether_slack::outbound::{ChatClient, PostMessageRequest};

use crate::format::describe_update;

const MESSAGE_CONSUMER: &str = "relay.slack.messages";
const UPDATE_CONSUMER: &str = "relay.slack.updates";

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PassSummary {
    pub messages_posted: usize,
    pub updates_posted: usize,
    pub skipped: usize,
    pub failures: usize,
}

/// Polls for unrelayed messages and unreplicated updates on Slack-linked
/// threads and posts them out. Every pass is idempotent: the snapshot
/// queries filter on the write-once markers, so a crashed or repeated pass
/// converges instead of double-posting.
///
/// The in-flight set guards one worker's own overlapping work; it is owned
/// by this instance, so running several workers against one database is not
/// supported.
pub struct RelayWorker {
    messages: Arc<dyn MessageRepository>,
    updates: Arc<dyn UpdateRepository>,
    integrations: Arc<dyn IntegrationRepository>,
    cursors: Arc<dyn RelayCursorRepository>,
    chat: Arc<dyn ChatClient>,
    bot_username: String,
    batch_limit: i64,
    in_flight: Mutex<HashSet<String>>,
}

impl RelayWorker {
    pub fn new(
        messages: Arc<dyn MessageRepository>,
        updates: Arc<dyn UpdateRepository>,
        integrations: Arc<dyn IntegrationRepository>,
        cursors: Arc<dyn RelayCursorRepository>,
        chat: Arc<dyn ChatClient>,
        bot_username: impl Into<String>,
    ) -> Self {
        Self {
            messages,
            updates,
            integrations,
            cursors,
            chat,
            bot_username: bot_username.into(),
            batch_limit: 100,
            in_flight: Mutex::new(HashSet::new()),
        }
    }

    /// Run passes forever on the configured interval. Failures inside a pass
    /// are logged and retried next tick; this loop itself never exits.
    pub async fn run(&self, poll_interval: Duration) {
        info!(
            event_name = "relay.worker.started",
            poll_interval_secs = poll_interval.as_secs(),
            "outbound relay started"
        );

        loop {
            let summary = self.run_once().await;
            if summary != PassSummary::default() {
                info!(
                    event_name = "relay.pass.completed",
                    messages_posted = summary.messages_posted,
                    updates_posted = summary.updates_posted,
                    skipped = summary.skipped,
                    failures = summary.failures,
                    "relay pass completed"
                );
            }
            tokio::time::sleep(poll_interval).await;
        }
    }

    /// One catch-up pass over both consumers.
    pub async fn run_once(&self) -> PassSummary {
        let mut summary = PassSummary::default();
        self.relay_messages(&mut summary).await;
        self.relay_updates(&mut summary).await;
        summary
    }

    async fn relay_messages(&self, summary: &mut PassSummary) {
        let outbound = match self.messages.list_unrelayed(Platform::Slack, self.batch_limit).await
        {
            Ok(outbound) => outbound,
            Err(error) => {
                warn!(
                    event_name = "relay.messages.snapshot_failed",
                    error = %error,
                    "could not load unrelayed messages; retrying next pass"
                );
                summary.failures += 1;
                return;
            }
        };

        for item in outbound {
            self.relay_one_message(item, summary).await;
        }

        if let Err(error) = self.cursors.record_pass(MESSAGE_CONSUMER, Utc::now()).await {
            warn!(
                event_name = "relay.cursor.write_failed",
                consumer = MESSAGE_CONSUMER,
                error = %error,
                "could not persist relay cursor"
            );
        }
    }

    async fn relay_one_message(&self, item: OutboundMessage, summary: &mut PassSummary) {
        let Some(channel) = item.channel_id.clone() else {
            debug!(
                event_name = "relay.messages.no_channel",
                message_id = %item.message.id.0,
                "thread metadata has no channel; skipping"
            );
            summary.skipped += 1;
            return;
        };

        if !self.integration_is_live(&item.organization_id).await {
            summary.skipped += 1;
            return;
        }

        let request = PostMessageRequest {
            channel,
            text: render_rich_text(&item.message.content),
            thread_ts: Some(item.thread_external_id.clone()),
            username: Some(self.bot_username.clone()),
        };

        match self.chat.post_message(request).await {
            Ok(posted) => {
                match self.messages.mark_relayed(&item.message.id, &posted.ts).await {
                    Ok(true) => {
                        info!(
                            event_name = "relay.messages.posted",
                            message_id = %item.message.id.0,
                            external_message_id = %posted.ts,
                            "relayed message to slack"
                        );
                        summary.messages_posted += 1;
                    }
                    Ok(false) => {
                        // Lost the write-once race against another pass.
                        warn!(
                            event_name = "relay.messages.mark_lost",
                            message_id = %item.message.id.0,
                            "message was already marked relayed"
                        );
                        summary.skipped += 1;
                    }
                    Err(error) => {
                        warn!(
                            event_name = "relay.messages.mark_failed",
                            message_id = %item.message.id.0,
                            error = %error,
                            "posted but could not record external id"
                        );
                        summary.failures += 1;
                    }
                }
            }
            Err(error) => {
                warn!(
                    event_name = "relay.messages.post_failed",
                    message_id = %item.message.id.0,
                    error = %error,
                    "post failed; message stays queued for the next pass"
                );
                summary.failures += 1;
            }
        }
    }

    async fn relay_updates(&self, summary: &mut PassSummary) {
        let outbound = match self.updates.list_unreplicated(Platform::Slack, self.batch_limit).await
        {
            Ok(outbound) => outbound,
            Err(error) => {
                warn!(
                    event_name = "relay.updates.snapshot_failed",
                    error = %error,
                    "could not load unreplicated updates; retrying next pass"
                );
                summary.failures += 1;
                return;
            }
        };

        for item in outbound {
            let update_id = item.update.id.0.clone();

            {
                let mut in_flight = self.in_flight.lock().await;
                if !in_flight.insert(update_id.clone()) {
                    summary.skipped += 1;
                    continue;
                }
            }

            // The guard entry must come out on every path, success or not.
            self.relay_one_update(item, summary).await;
            self.in_flight.lock().await.remove(&update_id);
        }

        if let Err(error) = self.cursors.record_pass(UPDATE_CONSUMER, Utc::now()).await {
            warn!(
                event_name = "relay.cursor.write_failed",
                consumer = UPDATE_CONSUMER,
                error = %error,
                "could not persist relay cursor"
            );
        }
    }

    async fn relay_one_update(&self, item: OutboundUpdate, summary: &mut PassSummary) {
        let Some(channel) = item.channel_id.clone() else {
            debug!(
                event_name = "relay.updates.no_channel",
                update_id = %item.update.id.0,
                "thread metadata has no channel; skipping"
            );
            summary.skipped += 1;
            return;
        };

        if !self.integration_is_live(&item.organization_id).await {
            summary.skipped += 1;
            return;
        }

        let request = PostMessageRequest {
            channel,
            text: describe_update(&item.update),
            thread_ts: Some(item.thread_external_id.clone()),
            username: Some(self.bot_username.clone()),
        };

        match self.chat.post_message(request).await {
            Ok(posted) => {
                let ack = ReplicationAck::Delivered(posted.ts.clone());
                match self.updates.mark_replicated(&item.update.id, Platform::Slack, &ack).await {
                    Ok(true) => {
                        info!(
                            event_name = "relay.updates.posted",
                            update_id = %item.update.id.0,
                            external_message_id = %posted.ts,
                            "relayed update to slack"
                        );
                        summary.updates_posted += 1;
                    }
                    Ok(false) => {
                        warn!(
                            event_name = "relay.updates.mark_lost",
                            update_id = %item.update.id.0,
                            "update was already marked replicated"
                        );
                        summary.skipped += 1;
                    }
                    Err(error) => {
                        warn!(
                            event_name = "relay.updates.mark_failed",
                            update_id = %item.update.id.0,
                            error = %error,
                            "posted but could not record replication marker"
                        );
                        summary.failures += 1;
                    }
                }
            }
            Err(error) => {
                warn!(
                    event_name = "relay.updates.post_failed",
                    update_id = %item.update.id.0,
                    error = %error,
                    "post failed; update stays queued for the next pass"
                );
                summary.failures += 1;
            }
        }
    }

    async fn integration_is_live(&self, organization_id: &str) -> bool {
        match self.integrations.find_enabled(organization_id, Platform::Slack).await {
            Ok(Some(_)) => true,
            Ok(None) => {
                debug!(
                    event_name = "relay.integration_gone",
                    organization_id = %organization_id,
                    "slack integration disabled or removed; skipping"
                );
                false
            }
            Err(error) => {
                warn!(
                    event_name = "relay.integration_check_failed",
                    organization_id = %organization_id,
                    error = %error,
                    "could not confirm integration; skipping this pass"
                );
                false
            }
        }
    }
}
