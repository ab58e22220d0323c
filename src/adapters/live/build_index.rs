//! Live adapter for the `BuildIndex` port over the service's GraphQL API.

use std::time::Duration;

use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::ports::build_index::{BranchHistory, BuildIndex, BuildRef, BuildStatus, IndexFuture};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

const BUILD_FIELDS: &str = "id number commit status committedAt isLocalBuild uncommittedHash";

/// Delay added per failed attempt before retrying.
const RETRY_STEP: Duration = Duration::from_millis(500);

/// Live build index that posts GraphQL queries with bounded retries.
pub struct LiveBuildIndex {
    client: Client,
    url: String,
    token: Option<String>,
    attempts: u32,
}

impl LiveBuildIndex {
    /// Creates a client for the endpoint at `url`.
    #[must_use]
    pub fn new(url: impl Into<String>, token: Option<String>, attempts: u32) -> Self {
        Self { client: Client::new(), url: url.into(), token, attempts: attempts.max(1) }
    }

    async fn query<T: DeserializeOwned>(&self, document: &str, variables: Value) -> Result<T, BoxError> {
        let body = GraphQlRequest { query: document, variables };
        let mut last_error = String::new();

        for attempt in 1..=self.attempts {
            if attempt > 1 {
                tokio::time::sleep(RETRY_STEP * (attempt - 1)).await;
            }
            let mut request = self.client.post(&self.url).json(&body);
            if let Some(token) = &self.token {
                request = request.bearer_auth(token);
            }

            let response = match request.send().await {
                Ok(response) => response,
                Err(e) => {
                    last_error = format!("build index request failed: {e}");
                    tracing::warn!(attempt, error = %e, "build index request failed");
                    continue;
                }
            };
            let status = response.status();
            let text = response.text().await.map_err(|e| -> BoxError {
                format!("Failed to read build index response: {e}").into()
            })?;
            if status.is_server_error() {
                last_error = format!("build index error ({}): {text}", status.as_u16());
                tracing::warn!(attempt, status = status.as_u16(), "build index server error");
                continue;
            }
            if !status.is_success() {
                return Err(format!("build index error ({}): {text}", status.as_u16()).into());
            }

            let parsed: GraphQlResponse<T> = serde_json::from_str(&text).map_err(|e| -> BoxError {
                format!("Failed to parse build index response: {e}").into()
            })?;
            if let Some(error) = parsed.errors.into_iter().next() {
                return Err(format!("build index query failed: {}", error.message).into());
            }
            return parsed.data.ok_or_else(|| "build index returned no data".into());
        }
        Err(format!("{last_error} (after {} attempts)", self.attempts).into())
    }
}

#[derive(Serialize)]
struct GraphQlRequest<'a> {
    query: &'a str,
    variables: Value,
}

#[derive(Deserialize)]
struct GraphQlResponse<T> {
    data: Option<T>,
    #[serde(default)]
    errors: Vec<GraphQlError>,
}

#[derive(Deserialize)]
struct GraphQlError {
    message: String,
}

/// A build as the service serializes it. Timestamps are milliseconds.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireBuild {
    id: String,
    number: u64,
    commit: String,
    status: BuildStatus,
    committed_at: i64,
    #[serde(default)]
    is_local_build: bool,
    #[serde(default)]
    uncommitted_hash: Option<String>,
}

impl From<WireBuild> for BuildRef {
    fn from(build: WireBuild) -> Self {
        Self {
            id: build.id,
            number: build.number,
            commit: build.commit,
            status: build.status,
            committed_at: build.committed_at / 1000,
            is_local: build.is_local_build,
            uncommitted_hash: build.uncommitted_hash.filter(|h| !h.is_empty()),
        }
    }
}

#[derive(Deserialize)]
struct AppData<T> {
    app: T,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct BranchHistoryData {
    first_build: Option<FirstBuild>,
    last_build: Option<WireBuild>,
    last_head_build: Option<WireBuild>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct FirstBuild {
    committed_at: i64,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CommitsData {
    has_builds_with_commits: Vec<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AncestorData {
    build: Option<AncestorBuilds>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AncestorBuilds {
    ancestor_builds: Vec<WireBuild>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct BaselineData {
    baseline_builds: Vec<WireBuild>,
}

impl BuildIndex for LiveBuildIndex {
    fn branch_history(&self, branch: &str) -> IndexFuture<'_, BranchHistory> {
        let branch = branch.to_string();
        Box::pin(async move {
            let document = format!(
                "query BranchHistory($branch: String!) {{ app {{ \
                 firstBuild(sortByCommittedAt: true) {{ committedAt }} \
                 lastBuild(branch: $branch, sortByCommittedAt: true) {{ {BUILD_FIELDS} }} \
                 lastHeadBuild: pullRequestHeadBuild(branch: $branch) {{ {BUILD_FIELDS} }} }} }}"
            );
            let data: AppData<BranchHistoryData> =
                self.query(&document, json!({ "branch": branch })).await?;
            Ok(BranchHistory {
                first_build_committed_at: data.app.first_build.map(|b| b.committed_at / 1000),
                last_build: data.app.last_build.map(BuildRef::from),
                last_head_build: data.app.last_head_build.map(BuildRef::from),
            })
        })
    }

    fn commits_with_builds(&self, commits: &[String]) -> IndexFuture<'_, Vec<String>> {
        let commits = commits.to_vec();
        Box::pin(async move {
            let document = "query CommitsWithBuilds($commits: [String!]!) { app { \
                            hasBuildsWithCommits(commits: $commits) } }";
            let data: AppData<CommitsData> = self.query(document, json!({ "commits": commits })).await?;
            Ok(data.app.has_builds_with_commits)
        })
    }

    fn ancestor_builds(
        &self,
        number: u64,
        skip: usize,
        limit: usize,
    ) -> IndexFuture<'_, Vec<BuildRef>> {
        Box::pin(async move {
            let document = format!(
                "query AncestorBuilds($number: Int!, $skip: Int!, $limit: Int!) {{ app {{ \
                 build(number: $number) {{ ancestorBuilds(skip: $skip, limit: $limit) {{ {BUILD_FIELDS} }} }} }} }}"
            );
            let variables = json!({ "number": number, "skip": skip, "limit": limit });
            let data: AppData<AncestorData> = self.query(&document, variables).await?;
            Ok(data
                .app
                .build
                .map(|b| b.ancestor_builds.into_iter().map(BuildRef::from).collect())
                .unwrap_or_default())
        })
    }

    fn baseline_builds(
        &self,
        branch: &str,
        parent_commits: &[String],
    ) -> IndexFuture<'_, Vec<BuildRef>> {
        let branch = branch.to_string();
        let parents = parent_commits.to_vec();
        Box::pin(async move {
            let document = format!(
                "query BaselineBuilds($branch: String!, $parentCommits: [String!]!) {{ app {{ \
                 baselineBuilds(branch: $branch, parentCommits: $parentCommits) {{ {BUILD_FIELDS} }} }} }}"
            );
            let variables = json!({ "branch": branch, "parentCommits": parents });
            let data: AppData<BaselineData> = self.query(&document, variables).await?;
            Ok(data.app.baseline_builds.into_iter().map(BuildRef::from).collect())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_builds_convert_milliseconds() {
        let wire: WireBuild = serde_json::from_value(json!({
            "id": "b1",
            "number": 7,
            "commit": "abc",
            "status": "PASSED",
            "committedAt": 1_700_000_000_123_i64,
            "isLocalBuild": true,
            "uncommittedHash": ""
        }))
        .unwrap();
        let build = BuildRef::from(wire);
        assert_eq!(build.committed_at, 1_700_000_000);
        assert!(build.is_local);
        assert_eq!(build.uncommitted_hash, None);
        assert_eq!(build.status, BuildStatus::Passed);
    }

    #[test]
    fn unknown_status_is_tolerated() {
        let wire: WireBuild = serde_json::from_value(json!({
            "id": "b1", "number": 1, "commit": "abc", "status": "PREPARED", "committedAt": 0
        }))
        .unwrap();
        assert_eq!(BuildRef::from(wire).status, BuildStatus::Unknown);
    }

    #[test]
    fn graphql_errors_are_surfaced() {
        let parsed: GraphQlResponse<Value> =
            serde_json::from_str(r#"{ "data": null, "errors": [{ "message": "forbidden" }] }"#).unwrap();
        assert_eq!(parsed.errors[0].message, "forbidden");
        assert!(parsed.data.is_none());
    }

    #[tokio::test]
    async fn unreachable_endpoint_fails_after_retries() {
        let index = LiveBuildIndex::new("http://127.0.0.1:9/graphql", None, 2);
        let err = index.commits_with_builds(&["abc".to_string()]).await.unwrap_err();
        assert!(err.to_string().contains("after 2 attempts"));
    }
}
