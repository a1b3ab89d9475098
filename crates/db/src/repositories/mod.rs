use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use tether_core::domain::author::{Author, AuthorId};
use tether_core::domain::integration::{Integration, IntegrationId};
use tether_core::domain::message::{Message, MessageId};
use tether_core::domain::thread::{Platform, Thread, ThreadId, ThreadStatus};
use tether_core::domain::update::{ReplicationAck, Update, UpdateId};

pub mod author;
pub mod cursor;
pub mod integration;
pub mod memory;
pub mod message;
pub mod thread;
pub mod update;

pub use author::SqlAuthorRepository;
pub use cursor::SqlRelayCursorRepository;
pub use integration::SqlIntegrationRepository;
pub use memory::{
    InMemoryAuthorRepository, InMemoryIntegrationRepository, InMemoryMessageRepository,
    InMemoryRelayCursorRepository, InMemoryThreadRepository, InMemoryUpdateRepository,
};
pub use message::SqlMessageRepository;
pub use thread::SqlThreadRepository;
pub use update::SqlUpdateRepository;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
}

pub(crate) fn parse_timestamp(
    column: &str,
    value: String,
) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(&value).map(|timestamp| timestamp.with_timezone(&Utc)).map_err(
        |error| {
            RepositoryError::Decode(format!("invalid timestamp in `{column}`: `{value}` ({error})"))
        },
    )
}

pub(crate) fn parse_optional_timestamp(
    column: &str,
    value: Option<String>,
) -> Result<Option<DateTime<Utc>>, RepositoryError> {
    value.map(|timestamp| parse_timestamp(column, timestamp)).transpose()
}

pub(crate) fn parse_platform(column: &str, value: &str) -> Result<Platform, RepositoryError> {
    Platform::parse(value)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown platform in `{column}`: `{value}`")))
}

#[async_trait]
pub trait ThreadRepository: Send + Sync {
    async fn insert(&self, thread: Thread) -> Result<(), RepositoryError>;
    async fn find_by_id(&self, id: &ThreadId) -> Result<Option<Thread>, RepositoryError>;

    /// Resolve an imported thread by its platform-native id, e.g.
    /// `(slack, <thread timestamp>)`.
    async fn find_by_external_ref(
        &self,
        origin: Platform,
        external_id: &str,
    ) -> Result<Option<Thread>, RepositoryError>;

    async fn list_by_external_issue_id(
        &self,
        issue_id: &str,
    ) -> Result<Vec<Thread>, RepositoryError>;

    async fn list_by_external_pr_id(&self, pr_id: &str) -> Result<Vec<Thread>, RepositoryError>;

    async fn set_status(&self, id: &ThreadId, status: ThreadStatus)
        -> Result<(), RepositoryError>;
}

/// A message joined with the outbound-routing fields of its thread, as
/// produced by the relay's snapshot query.
#[derive(Clone, Debug, PartialEq)]
pub struct OutboundMessage {
    pub message: Message,
    pub organization_id: String,
    pub thread_external_id: String,
    pub channel_id: Option<String>,
}

#[async_trait]
pub trait MessageRepository: Send + Sync {
    async fn insert(&self, message: Message) -> Result<(), RepositoryError>;
    async fn find_by_id(&self, id: &MessageId) -> Result<Option<Message>, RepositoryError>;

    /// Dedup lookup for platform redelivery: the platform-native message id
    /// together with its origin identifies one logical message.
    async fn find_by_external_id(
        &self,
        origin: Platform,
        external_message_id: &str,
    ) -> Result<Option<Message>, RepositoryError>;

    /// Messages not yet posted externally, owned by a live thread linked to
    /// `origin` with both external id and metadata present. Platform-imported
    /// messages never appear here: their external id is set on insert.
    async fn list_unrelayed(
        &self,
        origin: Platform,
        limit: i64,
    ) -> Result<Vec<OutboundMessage>, RepositoryError>;

    /// Write-once: returns false when another pass already claimed the row.
    async fn mark_relayed(
        &self,
        id: &MessageId,
        external_message_id: &str,
    ) -> Result<bool, RepositoryError>;
}

/// An update joined with the outbound-routing fields of its thread.
#[derive(Clone, Debug, PartialEq)]
pub struct OutboundUpdate {
    pub update: Update,
    pub organization_id: String,
    pub thread_external_id: String,
    pub channel_id: Option<String>,
}

#[async_trait]
pub trait UpdateRepository: Send + Sync {
    async fn append(&self, update: Update) -> Result<(), RepositoryError>;
    async fn find_by_id(&self, id: &UpdateId) -> Result<Option<Update>, RepositoryError>;
    async fn list_for_thread(&self, thread_id: &ThreadId) -> Result<Vec<Update>, RepositoryError>;

    /// Updates with no replication marker for `platform`, on live threads
    /// linked to that platform.
    async fn list_unreplicated(
        &self,
        platform: Platform,
        limit: i64,
    ) -> Result<Vec<OutboundUpdate>, RepositoryError>;

    /// Sets `replicated.<platform>`; returns false when the marker was
    /// already present (another pass won the race).
    async fn mark_replicated(
        &self,
        id: &UpdateId,
        platform: Platform,
        ack: &ReplicationAck,
    ) -> Result<bool, RepositoryError>;
}

#[async_trait]
pub trait IntegrationRepository: Send + Sync {
    async fn insert(&self, integration: Integration) -> Result<(), RepositoryError>;

    /// Full-row upsert by primary id.
    async fn save(&self, integration: Integration) -> Result<(), RepositoryError>;

    async fn find_by_id(&self, id: &IntegrationId)
        -> Result<Option<Integration>, RepositoryError>;

    /// The single enabled integration addressing a platform's events for an
    /// organization.
    async fn find_enabled(
        &self,
        organization_id: &str,
        kind: Platform,
    ) -> Result<Option<Integration>, RepositoryError>;

    /// Lookup by the team id embedded in the config JSON. Keyed off config
    /// rather than the row id because rows can pre-date the platform OAuth
    /// round-trip.
    async fn find_by_team_id(
        &self,
        kind: Platform,
        team_id: &str,
    ) -> Result<Option<Integration>, RepositoryError>;

    /// Most recently touched row for (organization, kind) regardless of
    /// enabled state; the install callback resolves its pending row here.
    async fn find_latest(
        &self,
        organization_id: &str,
        kind: Platform,
    ) -> Result<Option<Integration>, RepositoryError>;
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewPlatformAuthor {
    pub organization_id: String,
    pub meta_id: String,
    pub name: String,
}

#[async_trait]
pub trait AuthorRepository: Send + Sync {
    /// Get-or-insert keyed by (organization_id, meta_id) in a single upsert
    /// statement, so concurrent ingest of the same platform user converges on
    /// one row with read-your-write semantics.
    async fn get_or_insert_platform_author(
        &self,
        author: NewPlatformAuthor,
    ) -> Result<Author, RepositoryError>;

    async fn find_by_id(&self, id: &AuthorId) -> Result<Option<Author>, RepositoryError>;
}

#[async_trait]
pub trait RelayCursorRepository: Send + Sync {
    async fn record_pass(
        &self,
        consumer: &str,
        completed_at: DateTime<Utc>,
    ) -> Result<(), RepositoryError>;

    async fn last_completed(
        &self,
        consumer: &str,
    ) -> Result<Option<DateTime<Utc>>, RepositoryError>;
}
