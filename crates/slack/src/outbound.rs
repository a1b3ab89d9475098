use async_trait::async_trait;
use thiserror::Error;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PostMessageRequest {
    pub channel: String,
    pub text: String,
    pub thread_ts: Option<String>,
    pub username: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PostedMessage {
    pub ts: String,
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ChatClientError {
    #[error("chat client rejected the request: {0}")]
    Rejected(String),
    #[error("chat client transport failed: {0}")]
    Transport(String),
}

/// `chat.postMessage` seam. The real SDK client lives outside this crate;
/// everything here programs against the trait.
#[async_trait]
pub trait ChatClient: Send + Sync {
    async fn post_message(
        &self,
        request: PostMessageRequest,
    ) -> Result<PostedMessage, ChatClientError>;
}

#[derive(Default)]
pub struct NoopChatClient;

#[async_trait]
impl ChatClient for NoopChatClient {
    async fn post_message(
        &self,
        _request: PostMessageRequest,
    ) -> Result<PostedMessage, ChatClientError> {
        Ok(PostedMessage { ts: "0.0".to_string() })
    }
}

/// Records every post and answers with scripted results; shared by the
/// ingest and relay test suites.
#[derive(Default)]
pub struct RecordingChatClient {
    state: tokio::sync::Mutex<RecordingState>,
}

#[derive(Default)]
struct RecordingState {
    posted: Vec<PostMessageRequest>,
    scripted: std::collections::VecDeque<Result<PostedMessage, ChatClientError>>,
    next_ts: u64,
}

impl RecordingChatClient {
    pub async fn posted(&self) -> Vec<PostMessageRequest> {
        self.state.lock().await.posted.clone()
    }

    pub async fn script(&self, result: Result<PostedMessage, ChatClientError>) {
        self.state.lock().await.scripted.push_back(result);
    }
}

#[async_trait]
impl ChatClient for RecordingChatClient {
    async fn post_message(
        &self,
        request: PostMessageRequest,
    ) -> Result<PostedMessage, ChatClientError> {
        let mut state = self.state.lock().await;
        state.posted.push(request);
        if let Some(result) = state.scripted.pop_front() {
            return result;
        }
        state.next_ts += 1;
        Ok(PostedMessage { ts: format!("1730000100.{:04}", state.next_ts) })
    }
}
