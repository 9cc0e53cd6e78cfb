//! GitLab REST client tests against an in-process mock of the API.

use axum::Router;
use axum::extract::State;
use axum::http::{HeaderMap, Method, StatusCode, Uri};
use serde_json::{Value, json};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use tokio::net::TcpListener;

use mrpilot::errors::PlatformError;
use mrpilot::platform::{DiffRefs, GitLab, NewChangeRequest, NoteTarget, Outcome, Platform};

const TOKEN: &str = "glpat-test-token";
const PROJECT_ROOT: &str = "/api/v4/projects/group%2Fapp";

#[derive(Debug, Clone)]
struct Seen {
    method: Method,
    path: String,
    query: String,
    authorization: Option<String>,
    user_agent: Option<String>,
    body: String,
}

impl Seen {
    fn json(&self) -> Value {
        serde_json::from_str(&self.body).unwrap()
    }
}

/// Scripted responses keyed by method and raw path; anything unscripted is a
/// GitLab-style 404.
#[derive(Default)]
struct MockGitLab {
    seen: Mutex<Vec<Seen>>,
    scripted: Mutex<HashMap<(Method, String), VecDeque<(StatusCode, String)>>>,
}

impl MockGitLab {
    fn respond(&self, method: Method, path: &str, status: StatusCode, body: Value) {
        self.scripted
            .lock()
            .unwrap()
            .entry((method, format!("{}{}", PROJECT_ROOT, path)))
            .or_default()
            .push_back((status, body.to_string()));
    }

    fn seen(&self) -> Vec<Seen> {
        self.seen.lock().unwrap().clone()
    }
}

async fn handle(
    State(mock): State<Arc<MockGitLab>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: String,
) -> (StatusCode, String) {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    };
    mock.seen.lock().unwrap().push(Seen {
        method: method.clone(),
        path: uri.path().to_string(),
        query: uri.query().unwrap_or_default().to_string(),
        authorization: header("authorization"),
        user_agent: header("user-agent"),
        body,
    });
    mock.scripted
        .lock()
        .unwrap()
        .get_mut(&(method, uri.path().to_string()))
        .and_then(VecDeque::pop_front)
        .unwrap_or((
            StatusCode::NOT_FOUND,
            r#"{"message":"404 Not found"}"#.to_string(),
        ))
}

async fn start(mock: Arc<MockGitLab>) -> GitLab {
    let app = Router::new().fallback(handle).with_state(mock);
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    GitLab::new(&format!("http://{}", addr), "group/app", TOKEN).unwrap()
}

fn merge_request_json(iid: u64) -> Value {
    json!({
        "iid": iid,
        "web_url": format!("https://gitlab.example.com/group/app/-/merge_requests/{}", iid),
        "source_branch": "issue-42-add-health-endpoint",
        "target_branch": "main",
        "title": "Add health endpoint",
        "state": "opened"
    })
}

fn new_request() -> NewChangeRequest<'static> {
    NewChangeRequest {
        source_branch: "issue-42-add-health-endpoint",
        target_branch: "main",
        title: "Add health endpoint",
        description: "- [ ] add route",
    }
}

mod change_requests {
    use super::*;

    #[tokio::test]
    async fn test_created_sends_auth_and_payload() {
        let mock = Arc::new(MockGitLab::default());
        mock.respond(
            Method::POST,
            "/merge_requests",
            StatusCode::CREATED,
            merge_request_json(12),
        );
        let gitlab = start(mock.clone()).await;

        let (outcome, cr) = gitlab.create_change_request(&new_request()).await.unwrap();

        assert_eq!(outcome, Outcome::Created);
        assert_eq!(cr.iid, 12);
        assert!(cr.web_url.ends_with("/merge_requests/12"));

        let seen = mock.seen();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].path, format!("{}/merge_requests", PROJECT_ROOT));
        assert_eq!(
            seen[0].authorization.as_deref(),
            Some("Bearer glpat-test-token")
        );
        assert_eq!(seen[0].user_agent.as_deref(), Some("mrpilot"));
        let body = seen[0].json();
        assert_eq!(body["source_branch"], "issue-42-add-health-endpoint");
        assert_eq!(body["target_branch"], "main");
        assert_eq!(body["remove_source_branch"], true);
    }

    #[tokio::test]
    async fn test_conflict_returns_existing_open_request() {
        let mock = Arc::new(MockGitLab::default());
        mock.respond(
            Method::POST,
            "/merge_requests",
            StatusCode::CONFLICT,
            json!({"message": ["Another open merge request already exists for this source branch: !7"]}),
        );
        mock.respond(
            Method::GET,
            "/merge_requests",
            StatusCode::OK,
            json!([merge_request_json(7)]),
        );
        let gitlab = start(mock.clone()).await;

        let (outcome, cr) = gitlab.create_change_request(&new_request()).await.unwrap();

        assert_eq!(outcome, Outcome::Exists);
        assert_eq!(cr.iid, 7);
        let lookup = &mock.seen()[1];
        assert_eq!(lookup.method, Method::GET);
        assert!(lookup.query.contains("state=opened"));
        assert!(lookup.query.contains("source_branch=issue-42-add-health-endpoint"));
        assert!(lookup.query.contains("target_branch=main"));
    }

    #[tokio::test]
    async fn test_unclear_rejection_without_match_is_fatal_with_body() {
        let mock = Arc::new(MockGitLab::default());
        mock.respond(
            Method::POST,
            "/merge_requests",
            StatusCode::INTERNAL_SERVER_ERROR,
            json!({"message": "boom"}),
        );
        mock.respond(Method::GET, "/merge_requests", StatusCode::OK, json!([]));
        let gitlab = start(mock.clone()).await;

        let err = gitlab.create_change_request(&new_request()).await.unwrap_err();

        match err {
            PlatformError::Status { status, body, .. } => {
                assert_eq!(status, 500);
                assert!(body.contains("boom"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
        assert_eq!(mock.seen().len(), 2);
    }

    #[tokio::test]
    async fn test_unauthorized_is_never_treated_as_duplicate() {
        let mock = Arc::new(MockGitLab::default());
        mock.respond(
            Method::POST,
            "/merge_requests",
            StatusCode::UNAUTHORIZED,
            json!({"message": "401 Unauthorized"}),
        );
        let gitlab = start(mock.clone()).await;

        let err = gitlab.create_change_request(&new_request()).await.unwrap_err();

        assert!(matches!(err, PlatformError::Unauthorized { status: 401, .. }));
        assert_eq!(mock.seen().len(), 1);
    }

    #[tokio::test]
    async fn test_update_sets_description_and_reviewers() {
        let mock = Arc::new(MockGitLab::default());
        mock.respond(Method::PUT, "/merge_requests/12", StatusCode::OK, merge_request_json(12));
        mock.respond(Method::PUT, "/merge_requests/12", StatusCode::OK, merge_request_json(12));
        let gitlab = start(mock.clone()).await;

        gitlab
            .update_change_request(12, "- [x] add route", Some(&[7]))
            .await
            .unwrap();
        gitlab
            .update_change_request(12, "- [x] add route", None)
            .await
            .unwrap();

        let seen = mock.seen();
        let with_reviewers = seen[0].json();
        assert_eq!(with_reviewers["description"], "- [x] add route");
        assert_eq!(with_reviewers["reviewer_ids"], json!([7]));
        assert!(seen[1].json().get("reviewer_ids").is_none());
    }
}

mod branches {
    use super::*;

    #[tokio::test]
    async fn test_created_branch_passes_name_and_ref_as_query() {
        let mock = Arc::new(MockGitLab::default());
        mock.respond(
            Method::POST,
            "/repository/branches",
            StatusCode::CREATED,
            json!({"name": "feature/x"}),
        );
        let gitlab = start(mock.clone()).await;

        let outcome = gitlab.ensure_branch("feature/x", "main").await.unwrap();

        assert_eq!(outcome, Outcome::Created);
        let seen = mock.seen();
        assert!(seen[0].query.contains("branch=feature%2Fx"));
        assert!(seen[0].query.contains("ref=main"));
    }

    #[tokio::test]
    async fn test_already_exists_message_is_success() {
        let mock = Arc::new(MockGitLab::default());
        mock.respond(
            Method::POST,
            "/repository/branches",
            StatusCode::BAD_REQUEST,
            json!({"message": "Branch already exists"}),
        );
        let gitlab = start(mock.clone()).await;

        assert_eq!(
            gitlab.ensure_branch("feature", "main").await.unwrap(),
            Outcome::Exists
        );
        assert_eq!(mock.seen().len(), 1);
    }

    #[tokio::test]
    async fn test_unclear_rejection_is_verified_by_lookup() {
        let mock = Arc::new(MockGitLab::default());
        mock.respond(
            Method::POST,
            "/repository/branches",
            StatusCode::BAD_REQUEST,
            json!({"message": "Invalid reference name"}),
        );
        mock.respond(
            Method::GET,
            "/repository/branches/feature%2Fx",
            StatusCode::OK,
            json!({"name": "feature/x"}),
        );
        let gitlab = start(mock.clone()).await;

        assert_eq!(
            gitlab.ensure_branch("feature/x", "main").await.unwrap(),
            Outcome::Exists
        );
        assert_eq!(
            mock.seen()[1].path,
            format!("{}/repository/branches/feature%2Fx", PROJECT_ROOT)
        );
    }

    #[tokio::test]
    async fn test_unclear_rejection_of_missing_branch_fails() {
        let mock = Arc::new(MockGitLab::default());
        mock.respond(
            Method::POST,
            "/repository/branches",
            StatusCode::BAD_REQUEST,
            json!({"message": "Invalid reference name"}),
        );
        let gitlab = start(mock.clone()).await;

        let err = gitlab.ensure_branch("feature", "nope").await.unwrap_err();

        assert!(matches!(err, PlatformError::Status { status: 400, .. }));
    }
}

mod notes {
    use super::*;

    #[tokio::test]
    async fn test_notes_go_to_issue_or_merge_request() {
        let mock = Arc::new(MockGitLab::default());
        mock.respond(Method::POST, "/issues/42/notes", StatusCode::CREATED, json!({"id": 1}));
        mock.respond(
            Method::POST,
            "/merge_requests/12/notes",
            StatusCode::CREATED,
            json!({"id": 2}),
        );
        let gitlab = start(mock.clone()).await;

        gitlab.post_note(NoteTarget::Issue(42), "on it").await.unwrap();
        gitlab
            .post_note(NoteTarget::MergeRequest(12), "done")
            .await
            .unwrap();

        let seen = mock.seen();
        assert_eq!(seen[0].json(), json!({"body": "on it"}));
        assert_eq!(seen[1].json(), json!({"body": "done"}));
    }

    #[tokio::test]
    async fn test_rejected_note_is_an_error() {
        let mock = Arc::new(MockGitLab::default());
        let gitlab = start(mock).await;

        let err = gitlab.post_note(NoteTarget::Issue(1), "hi").await.unwrap_err();

        assert!(matches!(err, PlatformError::Status { status: 404, .. }));
    }

    #[tokio::test]
    async fn test_inline_discussion_carries_position() {
        let mock = Arc::new(MockGitLab::default());
        mock.respond(
            Method::POST,
            "/merge_requests/12/discussions",
            StatusCode::CREATED,
            json!({"id": "abc"}),
        );
        let gitlab = start(mock.clone()).await;
        let refs = DiffRefs {
            base_sha: "aaa".into(),
            start_sha: "bbb".into(),
            head_sha: "ccc".into(),
        };

        gitlab
            .post_inline_discussion(12, &refs.at("src/lib.rs", 3), "🔴 **[critical]** leak")
            .await
            .unwrap();

        let body = mock.seen()[0].json();
        assert_eq!(body["body"], "🔴 **[critical]** leak");
        assert_eq!(
            body["position"],
            json!({
                "position_type": "text",
                "base_sha": "aaa",
                "start_sha": "bbb",
                "head_sha": "ccc",
                "old_path": "src/lib.rs",
                "new_path": "src/lib.rs",
                "new_line": 3
            })
        );
    }
}
