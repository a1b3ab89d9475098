//! App-authenticated GitHub REST seam. The real client (octocrab or a raw
//! reqwest wrapper) lives outside this crate; everything here programs
//! against the trait, authenticated per installation.

use async_trait::async_trait;
use thiserror::Error;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IssueSummary {
    pub id: i64,
    pub number: i64,
    pub title: String,
    pub state: String,
    pub body: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PullRequestSummary {
    pub id: i64,
    pub number: i64,
    pub title: String,
    pub merged: bool,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewIssue {
    pub title: String,
    pub body: Option<String>,
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum GitHubClientError {
    #[error("github api rejected the request: {0}")]
    Rejected(String),
    #[error("github api transport failed: {0}")]
    Transport(String),
}

#[async_trait]
pub trait GitHubClient: Send + Sync {
    async fn list_installation_repos(
        &self,
        installation_id: i64,
    ) -> Result<Vec<String>, GitHubClientError>;

    async fn list_open_issues(
        &self,
        installation_id: i64,
        repo: &str,
    ) -> Result<Vec<IssueSummary>, GitHubClientError>;

    async fn get_issue(
        &self,
        installation_id: i64,
        repo: &str,
        number: i64,
    ) -> Result<IssueSummary, GitHubClientError>;

    async fn create_issue(
        &self,
        installation_id: i64,
        repo: &str,
        issue: NewIssue,
    ) -> Result<IssueSummary, GitHubClientError>;

    async fn get_pull_request(
        &self,
        installation_id: i64,
        repo: &str,
        number: i64,
    ) -> Result<PullRequestSummary, GitHubClientError>;
}

#[derive(Default)]
pub struct NoopGitHubClient;

#[async_trait]
impl GitHubClient for NoopGitHubClient {
    async fn list_installation_repos(
        &self,
        _installation_id: i64,
    ) -> Result<Vec<String>, GitHubClientError> {
        Ok(Vec::new())
    }

    async fn list_open_issues(
        &self,
        _installation_id: i64,
        _repo: &str,
    ) -> Result<Vec<IssueSummary>, GitHubClientError> {
        Ok(Vec::new())
    }

    async fn get_issue(
        &self,
        _installation_id: i64,
        _repo: &str,
        number: i64,
    ) -> Result<IssueSummary, GitHubClientError> {
        Err(GitHubClientError::Rejected(format!("issue #{number} is not available")))
    }

    async fn create_issue(
        &self,
        _installation_id: i64,
        _repo: &str,
        issue: NewIssue,
    ) -> Result<IssueSummary, GitHubClientError> {
        Err(GitHubClientError::Rejected(format!("cannot create issue `{}`", issue.title)))
    }

    async fn get_pull_request(
        &self,
        _installation_id: i64,
        _repo: &str,
        number: i64,
    ) -> Result<PullRequestSummary, GitHubClientError> {
        Err(GitHubClientError::Rejected(format!("pull request #{number} is not available")))
    }
}

/// Test double serving a fixed repo → open-issues map.
#[derive(Default)]
pub struct FixtureGitHubClient {
    repos: Vec<String>,
    issues: std::collections::HashMap<String, Vec<IssueSummary>>,
}

impl FixtureGitHubClient {
    pub fn with_repo(mut self, repo: &str, issues: Vec<IssueSummary>) -> Self {
        self.repos.push(repo.to_string());
        self.issues.insert(repo.to_string(), issues);
        self
    }
}

#[async_trait]
impl GitHubClient for FixtureGitHubClient {
    async fn list_installation_repos(
        &self,
        _installation_id: i64,
    ) -> Result<Vec<String>, GitHubClientError> {
        Ok(self.repos.clone())
    }

    async fn list_open_issues(
        &self,
        _installation_id: i64,
        repo: &str,
    ) -> Result<Vec<IssueSummary>, GitHubClientError> {
        self.issues
            .get(repo)
            .cloned()
            .ok_or_else(|| GitHubClientError::Rejected(format!("unknown repo `{repo}`")))
    }

    async fn get_issue(
        &self,
        installation_id: i64,
        repo: &str,
        number: i64,
    ) -> Result<IssueSummary, GitHubClientError> {
        self.list_open_issues(installation_id, repo)
            .await?
            .into_iter()
            .find(|issue| issue.number == number)
            .ok_or_else(|| GitHubClientError::Rejected(format!("issue #{number} not found")))
    }

    async fn create_issue(
        &self,
        _installation_id: i64,
        _repo: &str,
        issue: NewIssue,
    ) -> Result<IssueSummary, GitHubClientError> {
        Ok(IssueSummary {
            id: 0,
            number: 0,
            title: issue.title,
            state: "open".to_string(),
            body: issue.body,
        })
    }

    async fn get_pull_request(
        &self,
        _installation_id: i64,
        _repo: &str,
        number: i64,
    ) -> Result<PullRequestSummary, GitHubClientError> {
        Err(GitHubClientError::Rejected(format!("pull request #{number} not found")))
    }
}
