//! Inbound Slack message ingest: channel messages become threads, replies
//! become messages, everything tolerant of platform redelivery.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tracing::{debug, info, warn};

use tether_core::domain::message::{Message, MessageId, RichText};
use tether_core::domain::thread::{
    ExternalMetadata, ExternalRef, Platform, Thread, ThreadId, ThreadStatus,
};
use tether_db::repositories::{
    AuthorRepository, IntegrationRepository, MessageRepository, NewPlatformAuthor,
    RepositoryError, ThreadRepository,
};

use crate::events::{
    EventContext, EventHandlerError, IngestOutcome, MessageEvent, MessageIngestService, SkipReason,
};
use crate::markup::tracked_notice;
use crate::outbound::{ChatClient, PostMessageRequest};

const THREAD_NAME_MAX_CHARS: usize = 80;

pub struct SlackIngestor {
    threads: Arc<dyn ThreadRepository>,
    messages: Arc<dyn MessageRepository>,
    authors: Arc<dyn AuthorRepository>,
    integrations: Arc<dyn IntegrationRepository>,
    chat: Arc<dyn ChatClient>,
}

impl SlackIngestor {
    pub fn new(
        threads: Arc<dyn ThreadRepository>,
        messages: Arc<dyn MessageRepository>,
        authors: Arc<dyn AuthorRepository>,
        integrations: Arc<dyn IntegrationRepository>,
        chat: Arc<dyn ChatClient>,
    ) -> Self {
        Self { threads, messages, authors, integrations, chat }
    }

    async fn import_thread(
        &self,
        event: &MessageEvent,
        organization_id: &str,
        author_id: tether_core::domain::author::AuthorId,
        ctx: &EventContext,
    ) -> Result<IngestOutcome, EventHandlerError> {
        // Redelivery of the thread-root message must not import twice.
        if let Some(existing) =
            self.threads.find_by_external_ref(Platform::Slack, &event.ts).await.map_err(ingest)?
        {
            debug!(
                event_name = "ingress.slack.duplicate_thread_root",
                correlation_id = %ctx.correlation_id,
                thread_id = %existing.id.0,
                "thread root already imported"
            );
            return Ok(IngestOutcome::Skipped(SkipReason::DuplicateDelivery));
        }

        let now = Utc::now();
        let thread = Thread {
            id: ThreadId::generate(),
            organization_id: organization_id.to_string(),
            name: thread_name_from_text(&event.text),
            status: ThreadStatus::Open,
            priority: None,
            author_id: Some(author_id.clone()),
            assigned_user_id: None,
            external: Some(ExternalRef { id: event.ts.clone(), origin: Platform::Slack }),
            external_metadata: Some(ExternalMetadata {
                channel_id: Some(event.channel_id.clone()),
            }),
            external_issue_id: None,
            external_pr_id: None,
            deleted_at: None,
            created_at: now,
            updated_at: now,
        };
        self.threads.insert(thread.clone()).await.map_err(ingest)?;

        let message = self.record_message(event, &thread.id, author_id).await?;

        info!(
            event_name = "ingress.slack.thread_imported",
            correlation_id = %ctx.correlation_id,
            thread_id = %thread.id.0,
            channel_id = %event.channel_id,
            "imported new thread from slack"
        );

        // Best-effort courtesy reply; failure leaves the import intact.
        let notice = PostMessageRequest {
            channel: event.channel_id.clone(),
            text: tracked_notice(),
            thread_ts: Some(event.ts.clone()),
            username: None,
        };
        if let Err(error) = self.chat.post_message(notice).await {
            warn!(
                event_name = "ingress.slack.tracked_notice_failed",
                correlation_id = %ctx.correlation_id,
                thread_id = %thread.id.0,
                error = %error,
                "tracked notice could not be posted"
            );
        }

        Ok(IngestOutcome::ThreadImported { thread_id: thread.id, message_id: message.id })
    }

    async fn record_reply(
        &self,
        event: &MessageEvent,
        parent_ts: &str,
        author_id: tether_core::domain::author::AuthorId,
        ctx: &EventContext,
    ) -> Result<IngestOutcome, EventHandlerError> {
        let Some(thread) =
            self.threads.find_by_external_ref(Platform::Slack, parent_ts).await.map_err(ingest)?
        else {
            debug!(
                event_name = "ingress.slack.unknown_thread",
                correlation_id = %ctx.correlation_id,
                parent_ts,
                "reply to an untracked thread; ignoring"
            );
            return Ok(IngestOutcome::Skipped(SkipReason::UnknownThread));
        };

        let message = self.record_message(event, &thread.id, author_id).await?;

        info!(
            event_name = "ingress.slack.reply_recorded",
            correlation_id = %ctx.correlation_id,
            thread_id = %thread.id.0,
            "recorded slack reply"
        );

        Ok(IngestOutcome::ReplyRecorded { thread_id: thread.id, message_id: message.id })
    }

    async fn record_message(
        &self,
        event: &MessageEvent,
        thread_id: &ThreadId,
        author_id: tether_core::domain::author::AuthorId,
    ) -> Result<Message, EventHandlerError> {
        // Platform message ids are stable across redeliveries.
        if let Some(existing) = self
            .messages
            .find_by_external_id(Platform::Slack, &event.ts)
            .await
            .map_err(ingest)?
        {
            return Ok(existing);
        }

        let message = Message {
            id: MessageId::generate(),
            thread_id: thread_id.clone(),
            author_id: Some(author_id),
            content: RichText::plain(event.text.clone()),
            origin: Some(Platform::Slack),
            external_message_id: Some(event.ts.clone()),
            created_at: Utc::now(),
        };
        self.messages.insert(message.clone()).await.map_err(ingest)?;
        Ok(message)
    }
}

#[async_trait]
impl MessageIngestService for SlackIngestor {
    async fn ingest_message(
        &self,
        event: &MessageEvent,
        ctx: &EventContext,
    ) -> Result<IngestOutcome, EventHandlerError> {
        if event.is_bot_authored() {
            return Ok(IngestOutcome::Skipped(SkipReason::BotAuthored));
        }

        let Some(integration) = self
            .integrations
            .find_by_team_id(Platform::Slack, &event.team_id)
            .await
            .map_err(ingest)?
            .filter(|integration| integration.enabled)
        else {
            debug!(
                event_name = "ingress.slack.no_integration",
                correlation_id = %ctx.correlation_id,
                team_id = %event.team_id,
                "no enabled slack integration for team"
            );
            return Ok(IngestOutcome::Skipped(SkipReason::NoIntegrationForTeam));
        };

        if !integration.config.channel_selected(&event.channel_id) {
            return Ok(IngestOutcome::Skipped(SkipReason::ChannelNotSelected));
        }

        let author = self
            .authors
            .get_or_insert_platform_author(NewPlatformAuthor {
                organization_id: integration.organization_id.clone(),
                meta_id: event.user_id.clone(),
                name: event
                    .user_name
                    .clone()
                    .unwrap_or_else(|| event.user_id.clone()),
            })
            .await
            .map_err(ingest)?;

        match event.thread_ts.as_deref() {
            None => {
                self.import_thread(event, &integration.organization_id, author.id, ctx).await
            }
            Some(parent_ts) if parent_ts == event.ts => {
                // Some clients echo the root message with thread_ts set to
                // itself; treat it as the root.
                self.import_thread(event, &integration.organization_id, author.id, ctx).await
            }
            Some(parent_ts) => self.record_reply(event, parent_ts, author.id, ctx).await,
        }
    }
}

fn ingest(error: RepositoryError) -> EventHandlerError {
    EventHandlerError::Ingest(error.to_string())
}

fn thread_name_from_text(text: &str) -> String {
    let first_line = text.lines().next().unwrap_or("").trim();
    if first_line.is_empty() {
        return "Slack conversation".to_string();
    }

    match first_line.char_indices().nth(THREAD_NAME_MAX_CHARS) {
        Some((boundary, _)) => format!("{}…", &first_line[..boundary]),
        None => first_line.to_string(),
    }
}
