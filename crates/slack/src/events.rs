use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;

use tether_core::domain::message::MessageId;
use tether_core::domain::thread::ThreadId;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SlackEnvelope {
    pub envelope_id: String,
    pub event: SlackEvent,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SlackEvent {
    Message(MessageEvent),
    Unsupported { event_type: String },
}

impl SlackEvent {
    pub fn event_type(&self) -> SlackEventType {
        match self {
            Self::Message(_) => SlackEventType::Message,
            Self::Unsupported { .. } => SlackEventType::Unsupported,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum SlackEventType {
    Message,
    Unsupported,
}

/// A `message` event as delivered over Socket Mode. `thread_ts` is absent on
/// channel-level messages and carries the parent timestamp on replies;
/// `bot_id` is set on bot-authored messages (including our own echoes).
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct MessageEvent {
    pub team_id: String,
    pub channel_id: String,
    pub user_id: String,
    #[serde(default)]
    pub user_name: Option<String>,
    pub text: String,
    pub ts: String,
    #[serde(default)]
    pub thread_ts: Option<String>,
    #[serde(default)]
    pub bot_id: Option<String>,
}

impl MessageEvent {
    pub fn is_bot_authored(&self) -> bool {
        self.bot_id.is_some()
    }

    pub fn starts_new_thread(&self) -> bool {
        self.thread_ts.is_none()
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EventContext {
    pub correlation_id: String,
}

impl Default for EventContext {
    fn default() -> Self {
        Self { correlation_id: "unknown-correlation-id".to_owned() }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HandlerResult {
    Processed(IngestOutcome),
    Ignored,
}

/// What the ingest service did with a message event. Skips are successes:
/// the platform already got its ack, and replaying the event converges on
/// the same outcome.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum IngestOutcome {
    ThreadImported { thread_id: ThreadId, message_id: MessageId },
    ReplyRecorded { thread_id: ThreadId, message_id: MessageId },
    Skipped(SkipReason),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SkipReason {
    BotAuthored,
    NoIntegrationForTeam,
    ChannelNotSelected,
    UnknownThread,
    DuplicateDelivery,
}

#[derive(Debug, Error)]
pub enum EventHandlerError {
    #[error("message ingest failure: {0}")]
    Ingest(String),
}

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error(transparent)]
    Handler(#[from] EventHandlerError),
}

#[async_trait]
pub trait EventHandler: Send + Sync {
    fn event_type(&self) -> SlackEventType;
    async fn handle(
        &self,
        envelope: &SlackEnvelope,
        ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError>;
}

#[derive(Default)]
pub struct EventDispatcher {
    handlers: HashMap<SlackEventType, Arc<dyn EventHandler>>,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<H>(&mut self, handler: H)
    where
        H: EventHandler + 'static,
    {
        self.handlers.insert(handler.event_type(), Arc::new(handler));
    }

    pub async fn dispatch(
        &self,
        envelope: &SlackEnvelope,
        ctx: &EventContext,
    ) -> Result<HandlerResult, DispatchError> {
        let Some(handler) = self.handlers.get(&envelope.event.event_type()) else {
            return Ok(HandlerResult::Ignored);
        };

        handler.handle(envelope, ctx).await.map_err(DispatchError::from)
    }

    pub fn handler_count(&self) -> usize {
        self.handlers.len()
    }
}

#[async_trait]
pub trait MessageIngestService: Send + Sync {
    async fn ingest_message(
        &self,
        event: &MessageEvent,
        ctx: &EventContext,
    ) -> Result<IngestOutcome, EventHandlerError>;
}

pub struct MessageEventHandler<S> {
    service: S,
}

impl<S> MessageEventHandler<S>
where
    S: MessageIngestService,
{
    pub fn new(service: S) -> Self {
        Self { service }
    }
}

#[async_trait]
impl<S> EventHandler for MessageEventHandler<S>
where
    S: MessageIngestService + 'static,
{
    fn event_type(&self) -> SlackEventType {
        SlackEventType::Message
    }

    async fn handle(
        &self,
        envelope: &SlackEnvelope,
        ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError> {
        let SlackEvent::Message(event) = &envelope.event else {
            return Ok(HandlerResult::Ignored);
        };

        let outcome = self.service.ingest_message(event, ctx).await?;
        Ok(HandlerResult::Processed(outcome))
    }
}

/// Service used before the database is wired up; every event is a skip.
#[derive(Default)]
pub struct NoopMessageIngestService;

#[async_trait]
impl MessageIngestService for NoopMessageIngestService {
    async fn ingest_message(
        &self,
        _event: &MessageEvent,
        _ctx: &EventContext,
    ) -> Result<IngestOutcome, EventHandlerError> {
        Ok(IngestOutcome::Skipped(SkipReason::NoIntegrationForTeam))
    }
}

pub fn default_dispatcher() -> EventDispatcher {
    let mut dispatcher = EventDispatcher::new();
    dispatcher.register(MessageEventHandler::new(NoopMessageIngestService));
    dispatcher
}
