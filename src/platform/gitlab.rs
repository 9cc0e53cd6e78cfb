//! GitLab REST v4 implementation of [`Platform`].

use async_trait::async_trait;
use reqwest::{Method, StatusCode, Url};
use serde_json::json;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::{ChangeRequest, DiffPosition, NewChangeRequest, NoteTarget, Outcome, Platform};
use crate::errors::PlatformError;

const USER_AGENT: &str = "mrpilot";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// How a creation response should be treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CreationStatus {
    Created,
    Exists,
    Unauthorized,
    /// Non-2xx without a clear duplicate signal; verify with a lookup.
    Unclear,
}

/// Classify the response to a branch or merge-request creation call.
pub(crate) fn classify_creation(status: StatusCode, body: &str) -> CreationStatus {
    if status.is_success() {
        return CreationStatus::Created;
    }
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => CreationStatus::Unauthorized,
        StatusCode::CONFLICT => CreationStatus::Exists,
        StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY
            if body.to_lowercase().contains("already exists") =>
        {
            CreationStatus::Exists
        }
        _ => CreationStatus::Unclear,
    }
}

pub struct GitLab {
    client: reqwest::Client,
    api_base: String,
    project: String,
    token: String,
}

impl GitLab {
    /// `api_base` is the instance root (`https://gitlab.com`); `project` is a
    /// numeric id or a `group/project` path.
    pub fn new(api_base: &str, project: &str, token: &str) -> Result<Self, PlatformError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|source| PlatformError::Http {
                url: api_base.to_string(),
                source,
            })?;
        Ok(Self {
            client,
            api_base: api_base.trim_end_matches('/').to_string(),
            project: project.to_string(),
            token: token.to_string(),
        })
    }

    /// Build a project-scoped endpoint. Each element of `tail` is one path
    /// segment and is escaped on its own, so `group/project` and branch names
    /// with slashes stay intact.
    fn endpoint(&self, tail: &[&str]) -> Result<Url, PlatformError> {
        let mut url = Url::parse(&self.api_base).map_err(|e| PlatformError::Decode {
            url: self.api_base.clone(),
            message: format!("invalid API base: {}", e),
        })?;
        url.path_segments_mut()
            .map_err(|_| PlatformError::Decode {
                url: self.api_base.clone(),
                message: "API base cannot carry a path".to_string(),
            })?
            .pop_if_empty()
            .extend(["api", "v4", "projects", self.project.as_str()])
            .extend(tail);
        Ok(url)
    }

    async fn send(
        &self,
        method: Method,
        url: Url,
        query: &[(&str, &str)],
        body: Option<serde_json::Value>,
    ) -> Result<(StatusCode, String), PlatformError> {
        debug!(method = %method, url = %url, "GitLab request");
        let mut request = self
            .client
            .request(method, url.clone())
            .bearer_auth(&self.token)
            .header("Accept", "application/json");
        if !query.is_empty() {
            request = request.query(query);
        }
        if let Some(body) = body {
            request = request.json(&body);
        }
        let response = request.send().await.map_err(|source| PlatformError::Http {
            url: url.to_string(),
            source,
        })?;
        let status = response.status();
        let text = response.text().await.map_err(|source| PlatformError::Http {
            url: url.to_string(),
            source,
        })?;
        debug!(status = status.as_u16(), "GitLab response");
        Ok((status, text))
    }

    /// Send and require a 2xx response.
    async fn send_checked(
        &self,
        method: Method,
        url: Url,
        query: &[(&str, &str)],
        body: Option<serde_json::Value>,
    ) -> Result<String, PlatformError> {
        let (status, text) = self.send(method, url.clone(), query, body).await?;
        if status.is_success() {
            return Ok(text);
        }
        Err(status_error(url, status, text))
    }

    /// Whether `name` exists on the remote.
    pub async fn branch_exists(&self, name: &str) -> Result<bool, PlatformError> {
        let url = self.endpoint(&["repository", "branches", name])?;
        let (status, text) = self.send(Method::GET, url.clone(), &[], None).await?;
        match status {
            s if s.is_success() => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            s => Err(status_error(url, s, text)),
        }
    }

    /// The open merge request from `source` into `target`, if any.
    pub async fn find_open_change_request(
        &self,
        source: &str,
        target: &str,
    ) -> Result<Option<ChangeRequest>, PlatformError> {
        let url = self.endpoint(&["merge_requests"])?;
        let text = self
            .send_checked(
                Method::GET,
                url.clone(),
                &[
                    ("state", "opened"),
                    ("source_branch", source),
                    ("target_branch", target),
                ],
                None,
            )
            .await?;
        let found: Vec<ChangeRequest> = decode(&url, &text)?;
        Ok(found.into_iter().next())
    }
}

fn status_error(url: Url, status: StatusCode, body: String) -> PlatformError {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => PlatformError::Unauthorized {
            url: url.to_string(),
            status: status.as_u16(),
            body,
        },
        _ => PlatformError::Status {
            url: url.to_string(),
            status: status.as_u16(),
            body,
        },
    }
}

fn decode<T: serde::de::DeserializeOwned>(url: &Url, text: &str) -> Result<T, PlatformError> {
    serde_json::from_str(text).map_err(|e| PlatformError::Decode {
        url: url.to_string(),
        message: e.to_string(),
    })
}

#[async_trait]
impl Platform for GitLab {
    async fn ensure_branch(&self, name: &str, from_ref: &str) -> Result<Outcome, PlatformError> {
        let url = self.endpoint(&["repository", "branches"])?;
        let (status, text) = self
            .send(
                Method::POST,
                url.clone(),
                &[("branch", name), ("ref", from_ref)],
                None,
            )
            .await?;
        match classify_creation(status, &text) {
            CreationStatus::Created => {
                info!(branch = name, from = from_ref, "Branch created");
                Ok(Outcome::Created)
            }
            CreationStatus::Exists => {
                info!(branch = name, "Branch already exists");
                Ok(Outcome::Exists)
            }
            CreationStatus::Unauthorized => Err(status_error(url, status, text)),
            CreationStatus::Unclear => {
                warn!(
                    branch = name,
                    status = status.as_u16(),
                    "Branch creation rejected, branch may already exist; verifying"
                );
                if self.branch_exists(name).await? {
                    Ok(Outcome::Exists)
                } else {
                    Err(status_error(url, status, text))
                }
            }
        }
    }

    async fn create_change_request(
        &self,
        request: &NewChangeRequest<'_>,
    ) -> Result<(Outcome, ChangeRequest), PlatformError> {
        let url = self.endpoint(&["merge_requests"])?;
        let body = json!({
            "source_branch": request.source_branch,
            "target_branch": request.target_branch,
            "title": request.title,
            "description": request.description,
            "remove_source_branch": true,
        });
        let (status, text) = self.send(Method::POST, url.clone(), &[], Some(body)).await?;
        let classified = classify_creation(status, &text);
        match classified {
            CreationStatus::Created => {
                let created: ChangeRequest = decode(&url, &text)?;
                info!(iid = created.iid, url = %created.web_url, "Merge request created");
                return Ok((Outcome::Created, created));
            }
            CreationStatus::Unauthorized => return Err(status_error(url, status, text)),
            CreationStatus::Exists => {}
            CreationStatus::Unclear => warn!(
                status = status.as_u16(),
                "Merge request creation rejected, it may already exist; looking it up"
            ),
        }
        match self
            .find_open_change_request(request.source_branch, request.target_branch)
            .await?
        {
            Some(existing) => {
                info!(iid = existing.iid, "Reusing existing merge request");
                Ok((Outcome::Exists, existing))
            }
            None => Err(status_error(url, status, text)),
        }
    }

    async fn update_change_request(
        &self,
        iid: u64,
        description: &str,
        reviewer_ids: Option<&[u64]>,
    ) -> Result<(), PlatformError> {
        let iid = iid.to_string();
        let url = self.endpoint(&["merge_requests", iid.as_str()])?;
        let mut body = json!({ "description": description });
        if let Some(ids) = reviewer_ids {
            body["reviewer_ids"] = json!(ids);
        }
        self.send_checked(Method::PUT, url, &[], Some(body)).await?;
        Ok(())
    }

    async fn post_note(&self, target: NoteTarget, body: &str) -> Result<(), PlatformError> {
        let (kind, iid) = target.parts();
        let iid = iid.to_string();
        let url = self.endpoint(&[kind, iid.as_str(), "notes"])?;
        self.send_checked(Method::POST, url, &[], Some(json!({ "body": body })))
            .await?;
        Ok(())
    }

    async fn post_inline_discussion(
        &self,
        mr_iid: u64,
        position: &DiffPosition,
        body: &str,
    ) -> Result<(), PlatformError> {
        let iid = mr_iid.to_string();
        let url = self.endpoint(&["merge_requests", iid.as_str(), "discussions"])?;
        self.send_checked(
            Method::POST,
            url,
            &[],
            Some(json!({ "body": body, "position": position })),
        )
        .await?;
        Ok(())
    }
}
