mod diff;
mod pushes;
mod repositories;

use std::sync::Arc;

use axum::routing::get;
use axum::Router;
use tower_http::cors::CorsLayer;

use pushlog_core::DiffService;
use pushlog_db::Database;

#[derive(Clone)]
pub struct AppState {
    pub db: Arc<Database>,
    pub diffs: DiffService,
}

pub fn create_router(db: Arc<Database>, diffs: DiffService) -> Router {
    let state = AppState { db, diffs };

    Router::new()
        .route("/diff", get(diff::get_diff))
        .route("/api/repositories", get(repositories::list_repositories))
        .route("/api/pushes/{*repo}", get(pushes::list_pushes))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::fs;
    use std::path::Path;

    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use chrono::{TimeZone, Utc};
    use git2::{Repository, Signature};
    use pushlog_core::{PushIngestor, PushPayload, RepoLocks, RepoSync};
    use pushlog_db::{NewPush, NewRepository};
    use pushlog_vcs::GitClient;
    use tempfile::TempDir;
    use tower::ServiceExt;

    struct Fixture {
        dir: TempDir,
        db: Arc<Database>,
        sync: Arc<RepoSync>,
        locks: RepoLocks,
    }

    impl Fixture {
        fn new() -> Self {
            let dir = TempDir::new().unwrap();
            let db = Arc::new(Database::open_in_memory().unwrap());
            let sync = Arc::new(RepoSync::new(
                Arc::new(GitClient::new()),
                dir.path().join("repos"),
            ));
            Self {
                dir,
                db,
                sync,
                locks: RepoLocks::new(),
            }
        }

        fn router(&self) -> Router {
            let diffs = DiffService::new(self.db.clone(), self.sync.clone(), self.locks.clone());
            create_router(self.db.clone(), diffs)
        }

        fn track(&self, name: &str, url: &str) -> i64 {
            self.db
                .repositories()
                .create(&NewRepository {
                    name: name.to_string(),
                    url: url.to_string(),
                    ..NewRepository::default()
                })
                .unwrap()
                .id
        }

        /// Helper: a tracked, cloned repository "de" with two revisions of
        /// one properties file.
        async fn with_history(&self) -> (String, String) {
            let origin_path = self.dir.path().join("origin");
            let origin = Repository::init(&origin_path).unwrap();
            let from = commit(&origin, "app.properties", "title = Hello\n", None);
            let to = commit(
                &origin,
                "app.properties",
                "title = Hello\nsubtitle = World\n",
                Some(&from),
            );

            let id = self.track("de", &origin_path.display().to_string());
            PushIngestor::new(self.db.clone(), self.sync.clone(), self.locks.clone())
                .ingest(
                    id,
                    vec![PushPayload {
                        id: 1,
                        date: 1_700_000_000,
                        user: "jane@example.com".to_string(),
                        changesets: vec![from.clone(), to.clone()],
                    }],
                )
                .await
                .unwrap();
            (from, to)
        }
    }

    fn commit(repo: &Repository, path: &str, content: &str, parent: Option<&str>) -> String {
        fs::write(repo.workdir().unwrap().join(path), content).unwrap();
        let mut index = repo.index().unwrap();
        index.add_path(Path::new(path)).unwrap();
        index.write().unwrap();
        let tree = repo.find_tree(index.write_tree().unwrap()).unwrap();
        let sig = Signature::now("Jane Doe", "jane@example.com").unwrap();
        let parent = parent.map(|rev| repo.find_commit(rev.parse().unwrap()).unwrap());
        let parents: Vec<&git2::Commit> = parent.iter().collect();
        repo.commit(Some("HEAD"), &sig, &sig, "change", &tree, &parents)
            .unwrap()
            .to_string()
    }

    async fn get(router: Router, uri: &str) -> (StatusCode, String) {
        let response = router
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, String::from_utf8(bytes.to_vec()).unwrap())
    }

    // ============================================================
    // Diff endpoint
    // ============================================================

    #[tokio::test]
    async fn test_diff_returns_tree() {
        let fx = Fixture::new();
        let (from, to) = fx.with_history().await;

        let (status, body) = get(fx.router(), &format!("/diff?repo=de&from={from}&to={to}")).await;

        assert_eq!(status, StatusCode::OK);
        let json: serde_json::Value = serde_json::from_str(&body).unwrap();
        let file = &json["children"][0];
        assert_eq!(file["path"], "app.properties");
        assert_eq!(file["value"]["status"], "changed");
        assert_eq!(file["value"]["rev"], to.as_str());
        assert_eq!(
            file["value"]["lines"],
            serde_json::json!([{
                "class": "added",
                "entity": "subtitle",
                "oldval": "",
                "newval": [{"value": "World"}]
            }])
        );
    }

    #[tokio::test]
    async fn test_diff_missing_parameters() {
        let fx = Fixture::new();
        fx.with_history().await;

        let (status, body) = get(fx.router(), "/diff?from=tip&to=tip").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body.contains("repo"));

        let (status, body) = get(fx.router(), "/diff?repo=de&to=tip").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body.contains("from"));

        let (status, body) = get(fx.router(), "/diff?repo=de&from=tip&to=").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body.contains("'to'"));
    }

    #[tokio::test]
    async fn test_diff_unknown_repository() {
        let fx = Fixture::new();

        let (status, body) = get(fx.router(), "/diff?repo=xx").await;

        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body, "Repository not found: xx");
    }

    #[tokio::test]
    async fn test_diff_bad_revision() {
        let fx = Fixture::new();
        let (from, _) = fx.with_history().await;

        let (status, body) = get(fx.router(), "/diff?repo=de&from=xxx&to=tip").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, "Bad revision for 'from': xxx");

        let (status, body) = get(fx.router(), &format!("/diff?repo=de&from={from}&to=xxx")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, "Bad revision for 'to': xxx");
    }

    #[tokio::test]
    async fn test_diff_without_working_copy_is_server_error() {
        let fx = Fixture::new();
        fx.track("fr", "https://hg.example.com/fr/");

        let (status, _) = get(fx.router(), "/diff?repo=fr&from=tip&to=tip").await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    }

    // ============================================================
    // Registry endpoints
    // ============================================================

    #[tokio::test]
    async fn test_list_repositories() {
        let fx = Fixture::new();
        fx.track("fr", "https://hg.example.com/fr/");
        fx.track("de", "https://hg.example.com/de/");
        fx.db.repositories().archive("fr").unwrap();

        let (status, body) = get(fx.router(), "/api/repositories").await;
        assert_eq!(status, StatusCode::OK);
        let json: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(json.as_array().unwrap().len(), 1);
        assert_eq!(json[0]["name"], "de");

        let (_, body) = get(fx.router(), "/api/repositories?archived=true").await;
        let json: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(json.as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_list_pushes() {
        let fx = Fixture::new();
        let id = fx.track("releases/de", "https://hg.example.com/releases/de/");
        for push_id in 1..=3 {
            fx.db
                .pushes()
                .create(
                    id,
                    &NewPush {
                        push_id,
                        user: "jane@example.com".to_string(),
                        date: Utc.timestamp_opt(1_700_000_000 + push_id, 0).unwrap(),
                    },
                    &[],
                )
                .unwrap();
        }

        let (status, body) = get(fx.router(), "/api/pushes/releases/de?after=1&limit=1").await;
        assert_eq!(status, StatusCode::OK);
        let json: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(json.as_array().unwrap().len(), 1);
        assert_eq!(json[0]["push_id"], 2);
        assert_eq!(json[0]["user"], "jane@example.com");

        let (status, _) = get(fx.router(), "/api/pushes/unknown").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_cors_allows_any_origin() {
        let fx = Fixture::new();

        let response = fx
            .router()
            .oneshot(
                Request::builder()
                    .uri("/api/repositories")
                    .header("origin", "https://l10n.example.com")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(
            response.headers()["access-control-allow-origin"],
            "*"
        );
    }
}
