use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AuthorId(pub String);

impl AuthorId {
    pub fn generate() -> Self {
        Self(format!("A-{}", uuid::Uuid::new_v4().simple()))
    }
}

/// A person who has written into a thread. Internal users carry `user_id`;
/// platform participants are deduplicated by `(organization_id, meta_id)`
/// where `meta_id` is the platform-native user id.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Author {
    pub id: AuthorId,
    pub organization_id: String,
    pub user_id: Option<String>,
    pub meta_id: Option<String>,
    pub name: String,
    pub created_at: DateTime<Utc>,
}
