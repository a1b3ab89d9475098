pub mod audit;
pub mod config;
pub mod domain;
pub mod errors;
pub mod translate;

pub use chrono;

pub use domain::author::{Author, AuthorId};
pub use domain::integration::{
    generate_csrf_token, BackfillProgress, InstallState, Installation, Integration,
    IntegrationConfig, IntegrationId,
};
pub use domain::message::{Message, MessageId, RichText, RichTextBlock, RichTextSpan};
pub use domain::thread::{
    ExternalMetadata, ExternalRef, Platform, Thread, ThreadId, ThreadStatus,
};
pub use domain::update::{
    ReplicationAck, ReplicationMarkers, Update, UpdateDetail, UpdateId, UpdateKind,
};
pub use errors::{ApplicationError, DomainError, InterfaceError};
pub use translate::{LifecycleEvent, StatusTransition};
