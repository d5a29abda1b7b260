//! Minimal GitHub REST client: just enough to open a pull request for a
//! finalized branch. The API base is injectable so tests run against a
//! local mock server.

use crate::error::{Result, XwgitError};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::warn;

const USER_AGENT: &str = concat!("xwgit/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Clone, Serialize)]
struct PrRequest<'a> {
    title: &'a str,
    body: String,
    head: &'a str,
    base: &'a str,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PrCreated {
    pub number: u64,
    pub html_url: String,
}

#[derive(Debug, Clone, Deserialize)]
struct ApiError {
    message: String,
}

pub struct GithubClient {
    api_base: String,
    token: String,
    client: reqwest::blocking::Client,
}

impl GithubClient {
    pub fn new(api_base: impl Into<String>, token: impl Into<String>) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| XwgitError::GitPr(e.to_string()))?;
        Ok(Self {
            api_base: api_base.into().trim_end_matches('/').to_string(),
            token: token.into(),
            client,
        })
    }

    /// `POST /repos/{owner}/{repo}/pulls`. Retried once before surfacing,
    /// like every other remote verb.
    pub fn create_pr(
        &self,
        owner: &str,
        repo: &str,
        title: &str,
        head: &str,
        base: &str,
        issue: Option<u64>,
    ) -> Result<PrCreated> {
        match self.create_pr_once(owner, repo, title, head, base, issue) {
            Ok(pr) => Ok(pr),
            Err(first) => {
                warn!(error = %first, "pull request creation failed, retrying once");
                std::thread::sleep(Duration::from_millis(500));
                self.create_pr_once(owner, repo, title, head, base, issue)
            }
        }
    }

    fn create_pr_once(
        &self,
        owner: &str,
        repo: &str,
        title: &str,
        head: &str,
        base: &str,
        issue: Option<u64>,
    ) -> Result<PrCreated> {
        let url = format!("{}/repos/{owner}/{repo}/pulls", self.api_base);
        let request = PrRequest {
            title,
            body: pr_body(title, issue),
            head,
            base,
        };

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("token {}", self.token))
            .header("Accept", "application/vnd.github.v3+json")
            .header("User-Agent", USER_AGENT)
            .json(&request)
            .send()
            .map_err(|e| XwgitError::GitPr(e.to_string()))?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            let detail = api_message(response);
            return Err(XwgitError::GitAuth(detail));
        }
        if !status.is_success() {
            let detail = api_message(response);
            return Err(XwgitError::GitPr(format!("{status}: {detail}")));
        }

        response
            .json::<PrCreated>()
            .map_err(|e| XwgitError::GitPr(e.to_string()))
    }
}

fn api_message(response: reqwest::blocking::Response) -> String {
    response
        .json::<ApiError>()
        .map(|e| e.message)
        .unwrap_or_else(|_| "no error detail".to_string())
}

fn pr_body(title: &str, issue: Option<u64>) -> String {
    match issue {
        Some(n) => format!(
            "## Changes\n{title}\n\n## Related Issue\nCloses #{n}\n"
        ),
        None => format!("## Changes\n{title}\n"),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_pr_posts_and_parses() {
        let mut server = mockito::Server::new();
        let mock = server
            .mock("POST", "/repos/xwander-dev/XwDevTools/pulls")
            .match_header("authorization", "token tok123")
            .with_status(201)
            .with_body(r#"{"number": 7, "html_url": "https://github.com/x/pull/7"}"#)
            .create();

        let client = GithubClient::new(server.url(), "tok123").unwrap();
        let pr = client
            .create_pr(
                "xwander-dev",
                "XwDevTools",
                "Add perplexity tool",
                "feature/perplexity",
                "main",
                None,
            )
            .unwrap();

        assert_eq!(pr.number, 7);
        assert!(pr.html_url.contains("/pull/7"));
        mock.assert();
    }

    #[test]
    fn auth_errors_are_classified() {
        let mut server = mockito::Server::new();
        // Both attempts (initial + single retry) hit the mock.
        let _mock = server
            .mock("POST", "/repos/o/r/pulls")
            .with_status(401)
            .with_body(r#"{"message": "Bad credentials"}"#)
            .expect(2)
            .create();

        let client = GithubClient::new(server.url(), "bad").unwrap();
        let err = client
            .create_pr("o", "r", "t", "feature/x", "main", None)
            .unwrap_err();
        assert!(matches!(err, XwgitError::GitAuth(msg) if msg.contains("Bad credentials")));
    }

    #[test]
    fn non_success_is_pr_error() {
        let mut server = mockito::Server::new();
        let _mock = server
            .mock("POST", "/repos/o/r/pulls")
            .with_status(422)
            .with_body(r#"{"message": "Validation Failed"}"#)
            .expect(2)
            .create();

        let client = GithubClient::new(server.url(), "tok").unwrap();
        let err = client
            .create_pr("o", "r", "t", "feature/x", "main", None)
            .unwrap_err();
        assert!(matches!(err, XwgitError::GitPr(msg) if msg.contains("Validation Failed")));
    }

    #[test]
    fn pr_body_references_issue() {
        let body = pr_body("Add tool", Some(12));
        assert!(body.contains("Closes #12"));
        assert!(pr_body("Add tool", None).contains("## Changes"));
    }
}
