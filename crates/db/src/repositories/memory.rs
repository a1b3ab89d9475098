use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use tether_core::domain::author::{Author, AuthorId};
use tether_core::domain::integration::{Integration, IntegrationId};
use tether_core::domain::message::{Message, MessageId};
use tether_core::domain::thread::{Platform, Thread, ThreadId, ThreadStatus};
use tether_core::domain::update::{ReplicationAck, Update, UpdateId};

use super::{
    AuthorRepository, IntegrationRepository, MessageRepository, NewPlatformAuthor,
    OutboundMessage, OutboundUpdate, RelayCursorRepository, RepositoryError, ThreadRepository,
    UpdateRepository,
};

#[derive(Default)]
pub struct InMemoryThreadRepository {
    threads: RwLock<HashMap<String, Thread>>,
}

impl InMemoryThreadRepository {
    fn outbound_target(thread: &Thread, origin: Platform) -> bool {
        thread.deleted_at.is_none()
            && thread.origin() == Some(origin)
            && thread.external_metadata.is_some()
    }
}

#[async_trait::async_trait]
impl ThreadRepository for InMemoryThreadRepository {
    async fn insert(&self, thread: Thread) -> Result<(), RepositoryError> {
        let mut threads = self.threads.write().await;
        threads.insert(thread.id.0.clone(), thread);
        Ok(())
    }

    async fn find_by_id(&self, id: &ThreadId) -> Result<Option<Thread>, RepositoryError> {
        let threads = self.threads.read().await;
        Ok(threads.get(&id.0).filter(|thread| thread.deleted_at.is_none()).cloned())
    }

    async fn find_by_external_ref(
        &self,
        origin: Platform,
        external_id: &str,
    ) -> Result<Option<Thread>, RepositoryError> {
        let threads = self.threads.read().await;
        Ok(threads
            .values()
            .find(|thread| {
                thread.deleted_at.is_none()
                    && thread
                        .external
                        .as_ref()
                        .is_some_and(|external| {
                            external.origin == origin && external.id == external_id
                        })
            })
            .cloned())
    }

    async fn list_by_external_issue_id(
        &self,
        issue_id: &str,
    ) -> Result<Vec<Thread>, RepositoryError> {
        let threads = self.threads.read().await;
        let mut matches: Vec<Thread> = threads
            .values()
            .filter(|thread| {
                thread.deleted_at.is_none()
                    && thread.external_issue_id.as_deref() == Some(issue_id)
            })
            .cloned()
            .collect();
        matches.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(matches)
    }

    async fn list_by_external_pr_id(&self, pr_id: &str) -> Result<Vec<Thread>, RepositoryError> {
        let threads = self.threads.read().await;
        let mut matches: Vec<Thread> = threads
            .values()
            .filter(|thread| {
                thread.deleted_at.is_none() && thread.external_pr_id.as_deref() == Some(pr_id)
            })
            .cloned()
            .collect();
        matches.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(matches)
    }

    async fn set_status(
        &self,
        id: &ThreadId,
        status: ThreadStatus,
    ) -> Result<(), RepositoryError> {
        let mut threads = self.threads.write().await;
        if let Some(thread) = threads.get_mut(&id.0) {
            if thread.deleted_at.is_none() {
                thread.status = status;
                thread.updated_at = Utc::now();
            }
        }
        Ok(())
    }
}

pub struct InMemoryMessageRepository {
    threads: Arc<InMemoryThreadRepository>,
    messages: RwLock<HashMap<String, Message>>,
}

impl InMemoryMessageRepository {
    pub fn new(threads: Arc<InMemoryThreadRepository>) -> Self {
        Self { threads, messages: RwLock::new(HashMap::new()) }
    }
}

#[async_trait::async_trait]
impl MessageRepository for InMemoryMessageRepository {
    async fn insert(&self, message: Message) -> Result<(), RepositoryError> {
        let mut messages = self.messages.write().await;
        messages.insert(message.id.0.clone(), message);
        Ok(())
    }

    async fn find_by_id(&self, id: &MessageId) -> Result<Option<Message>, RepositoryError> {
        let messages = self.messages.read().await;
        Ok(messages.get(&id.0).cloned())
    }

    async fn find_by_external_id(
        &self,
        origin: Platform,
        external_message_id: &str,
    ) -> Result<Option<Message>, RepositoryError> {
        let messages = self.messages.read().await;
        Ok(messages
            .values()
            .find(|message| {
                message.origin == Some(origin)
                    && message.external_message_id.as_deref() == Some(external_message_id)
            })
            .cloned())
    }

    async fn list_unrelayed(
        &self,
        origin: Platform,
        limit: i64,
    ) -> Result<Vec<OutboundMessage>, RepositoryError> {
        let threads = self.threads.threads.read().await;
        let messages = self.messages.read().await;

        let mut outbound: Vec<OutboundMessage> = messages
            .values()
            .filter(|message| message.external_message_id.is_none())
            .filter_map(|message| {
                let thread = threads.get(&message.thread_id.0)?;
                if !InMemoryThreadRepository::outbound_target(thread, origin) {
                    return None;
                }
                Some(OutboundMessage {
                    message: message.clone(),
                    organization_id: thread.organization_id.clone(),
                    thread_external_id: thread
                        .external
                        .as_ref()
                        .map(|external| external.id.clone())
                        .unwrap_or_default(),
                    channel_id: thread
                        .external_metadata
                        .as_ref()
                        .and_then(|metadata| metadata.channel_id.clone()),
                })
            })
            .collect();
        outbound.sort_by(|a, b| a.message.created_at.cmp(&b.message.created_at));
        outbound.truncate(limit.max(0) as usize);
        Ok(outbound)
    }

    async fn mark_relayed(
        &self,
        id: &MessageId,
        external_message_id: &str,
    ) -> Result<bool, RepositoryError> {
        let mut messages = self.messages.write().await;
        match messages.get_mut(&id.0) {
            Some(message) if message.external_message_id.is_none() => {
                message.external_message_id = Some(external_message_id.to_string());
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

pub struct InMemoryUpdateRepository {
    threads: Arc<InMemoryThreadRepository>,
    updates: RwLock<HashMap<String, Update>>,
}

impl InMemoryUpdateRepository {
    pub fn new(threads: Arc<InMemoryThreadRepository>) -> Self {
        Self { threads, updates: RwLock::new(HashMap::new()) }
    }
}

#[async_trait::async_trait]
impl UpdateRepository for InMemoryUpdateRepository {
    async fn append(&self, update: Update) -> Result<(), RepositoryError> {
        let mut updates = self.updates.write().await;
        updates.insert(update.id.0.clone(), update);
        Ok(())
    }

    async fn find_by_id(&self, id: &UpdateId) -> Result<Option<Update>, RepositoryError> {
        let updates = self.updates.read().await;
        Ok(updates.get(&id.0).cloned())
    }

    async fn list_for_thread(&self, thread_id: &ThreadId) -> Result<Vec<Update>, RepositoryError> {
        let updates = self.updates.read().await;
        let mut matches: Vec<Update> =
            updates.values().filter(|update| update.thread_id == *thread_id).cloned().collect();
        matches.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(matches)
    }

    async fn list_unreplicated(
        &self,
        platform: Platform,
        limit: i64,
    ) -> Result<Vec<OutboundUpdate>, RepositoryError> {
        let threads = self.threads.threads.read().await;
        let updates = self.updates.read().await;

        let mut outbound: Vec<OutboundUpdate> = updates
            .values()
            .filter(|update| !update.replicated.is_marked(platform))
            .filter_map(|update| {
                let thread = threads.get(&update.thread_id.0)?;
                if !InMemoryThreadRepository::outbound_target(thread, platform) {
                    return None;
                }
                Some(OutboundUpdate {
                    update: update.clone(),
                    organization_id: thread.organization_id.clone(),
                    thread_external_id: thread
                        .external
                        .as_ref()
                        .map(|external| external.id.clone())
                        .unwrap_or_default(),
                    channel_id: thread
                        .external_metadata
                        .as_ref()
                        .and_then(|metadata| metadata.channel_id.clone()),
                })
            })
            .collect();
        outbound.sort_by(|a, b| a.update.created_at.cmp(&b.update.created_at));
        outbound.truncate(limit.max(0) as usize);
        Ok(outbound)
    }

    async fn mark_replicated(
        &self,
        id: &UpdateId,
        platform: Platform,
        ack: &ReplicationAck,
    ) -> Result<bool, RepositoryError> {
        let mut updates = self.updates.write().await;
        match updates.get_mut(&id.0) {
            Some(update) if !update.replicated.is_marked(platform) => {
                update.replicated.0.insert(platform, ack.clone());
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

#[derive(Default)]
pub struct InMemoryIntegrationRepository {
    integrations: RwLock<HashMap<String, Integration>>,
}

#[async_trait::async_trait]
impl IntegrationRepository for InMemoryIntegrationRepository {
    async fn insert(&self, integration: Integration) -> Result<(), RepositoryError> {
        self.save(integration).await
    }

    async fn save(&self, integration: Integration) -> Result<(), RepositoryError> {
        let mut integrations = self.integrations.write().await;
        integrations.insert(integration.id.0.clone(), integration);
        Ok(())
    }

    async fn find_by_id(
        &self,
        id: &IntegrationId,
    ) -> Result<Option<Integration>, RepositoryError> {
        let integrations = self.integrations.read().await;
        Ok(integrations.get(&id.0).cloned())
    }

    async fn find_enabled(
        &self,
        organization_id: &str,
        kind: Platform,
    ) -> Result<Option<Integration>, RepositoryError> {
        let integrations = self.integrations.read().await;
        Ok(integrations
            .values()
            .find(|integration| {
                integration.enabled
                    && integration.organization_id == organization_id
                    && integration.kind == kind
            })
            .cloned())
    }

    async fn find_by_team_id(
        &self,
        kind: Platform,
        team_id: &str,
    ) -> Result<Option<Integration>, RepositoryError> {
        let integrations = self.integrations.read().await;
        let mut matches: Vec<&Integration> = integrations
            .values()
            .filter(|integration| {
                integration.kind == kind
                    && integration.config.team_id.as_deref() == Some(team_id)
            })
            .collect();
        matches.sort_by_key(|integration| !integration.enabled);
        Ok(matches.first().map(|integration| (*integration).clone()))
    }

    async fn find_latest(
        &self,
        organization_id: &str,
        kind: Platform,
    ) -> Result<Option<Integration>, RepositoryError> {
        let integrations = self.integrations.read().await;
        Ok(integrations
            .values()
            .filter(|integration| {
                integration.organization_id == organization_id && integration.kind == kind
            })
            .max_by_key(|integration| integration.updated_at)
            .cloned())
    }
}

#[derive(Default)]
pub struct InMemoryAuthorRepository {
    authors: RwLock<HashMap<String, Author>>,
}

#[async_trait::async_trait]
impl AuthorRepository for InMemoryAuthorRepository {
    async fn get_or_insert_platform_author(
        &self,
        author: NewPlatformAuthor,
    ) -> Result<Author, RepositoryError> {
        let mut authors = self.authors.write().await;
        if let Some(existing) = authors.values_mut().find(|existing| {
            existing.organization_id == author.organization_id
                && existing.meta_id.as_deref() == Some(author.meta_id.as_str())
        }) {
            existing.name = author.name;
            return Ok(existing.clone());
        }

        let created = Author {
            id: AuthorId::generate(),
            organization_id: author.organization_id,
            user_id: None,
            meta_id: Some(author.meta_id),
            name: author.name,
            created_at: Utc::now(),
        };
        authors.insert(created.id.0.clone(), created.clone());
        Ok(created)
    }

    async fn find_by_id(&self, id: &AuthorId) -> Result<Option<Author>, RepositoryError> {
        let authors = self.authors.read().await;
        Ok(authors.get(&id.0).cloned())
    }
}

#[derive(Default)]
pub struct InMemoryRelayCursorRepository {
    cursors: RwLock<HashMap<String, DateTime<Utc>>>,
}

#[async_trait::async_trait]
impl RelayCursorRepository for InMemoryRelayCursorRepository {
    async fn record_pass(
        &self,
        consumer: &str,
        completed_at: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        let mut cursors = self.cursors.write().await;
        cursors.insert(consumer.to_string(), completed_at);
        Ok(())
    }

    async fn last_completed(
        &self,
        consumer: &str,
    ) -> Result<Option<DateTime<Utc>>, RepositoryError> {
        let cursors = self.cursors.read().await;
        Ok(cursors.get(consumer).copied())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::Utc;

    use tether_core::domain::message::{Message, MessageId, RichText};
    use tether_core::domain::thread::{
        ExternalMetadata, ExternalRef, Platform, Thread, ThreadId, ThreadStatus,
    };

    use crate::repositories::{
        InMemoryMessageRepository, InMemoryThreadRepository, MessageRepository, ThreadRepository,
    };

    #[tokio::test]
    async fn in_memory_snapshot_mirrors_the_sql_filter() {
        let threads = Arc::new(InMemoryThreadRepository::default());
        let messages = InMemoryMessageRepository::new(threads.clone());

        let thread = Thread {
            id: ThreadId("T-mem-1".to_string()),
            organization_id: "org-1".to_string(),
            name: "memory thread".to_string(),
            status: ThreadStatus::Open,
            priority: None,
            author_id: None,
            assigned_user_id: None,
            external: Some(ExternalRef {
                id: "1730000000.0001".to_string(),
                origin: Platform::Slack,
            }),
            external_metadata: Some(ExternalMetadata { channel_id: Some("C0X".to_string()) }),
            external_issue_id: None,
            external_pr_id: None,
            deleted_at: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        threads.insert(thread.clone()).await.expect("insert thread");

        let message = Message {
            id: MessageId("M-mem-1".to_string()),
            thread_id: thread.id.clone(),
            author_id: None,
            content: RichText::plain("hello"),
            origin: None,
            external_message_id: None,
            created_at: Utc::now(),
        };
        messages.insert(message.clone()).await.expect("insert message");

        let outbound = messages.list_unrelayed(Platform::Slack, 10).await.expect("snapshot");
        assert_eq!(outbound.len(), 1);
        assert_eq!(outbound[0].channel_id.as_deref(), Some("C0X"));

        assert!(messages.mark_relayed(&message.id, "ts-1").await.expect("mark"));
        assert!(!messages.mark_relayed(&message.id, "ts-2").await.expect("second mark"));

        let drained = messages.list_unrelayed(Platform::Slack, 10).await.expect("snapshot");
        assert!(drained.is_empty());
    }
}
