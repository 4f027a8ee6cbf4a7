// GitHub API client used to discover repositories worth saving
pub mod github;
pub mod retry;

pub use github::{GitHubClient, GitHubError, SearchResponse, SearchSort};
pub use retry::RetryConfig;
