//! HTTP surface served on an ephemeral port.

use reqwest::StatusCode;
use serde_json::{json, Value};
use strata::config::{AdminConfig, Config, DatabaseConfig, ServerConfig, SyncConfig};
use strata::server::{build_state, router};
use tempfile::TempDir;

struct Server {
    base: String,
    http: reqwest::Client,
    _dir: TempDir,
}

impl Server {
    async fn start() -> Self {
        let dir = TempDir::new().expect("tempdir");
        let config = Config {
            server: ServerConfig {
                host: "127.0.0.1".into(),
                port: 0,
            },
            database: DatabaseConfig {
                project_data_dir: dir.path().join("projects").to_string_lossy().into_owned(),
                backup_dir: dir.path().join("backups").to_string_lossy().into_owned(),
            },
            sync: SyncConfig {
                read_timeout_ms: 500,
                write_timeout_ms: 500,
            },
            bootstrap_admin: Some(AdminConfig {
                id: "root".into(),
                username: "root".into(),
            }),
        };

        let app = router(build_state(&config).await.expect("state"));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("address");
        tokio::spawn(async move {
            axum::serve(listener, app).await.expect("serve");
        });

        Self {
            base: format!("http://{addr}"),
            http: reqwest::Client::new(),
            _dir: dir,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }

    fn admin(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        builder.header("x-user-id", "root")
    }
}

#[tokio::test]
async fn health_check_answers() {
    let server = Server::start().await;
    let response = server.http.get(server.url("/healthz")).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.text().await.unwrap(), "ok");
}

#[tokio::test]
async fn project_lifecycle_over_http() {
    let server = Server::start().await;

    let response = server
        .http
        .post(server.url("/api/projects"))
        .json(&json!({"name": "Acme"}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN, "anonymous users are not admins");

    let response = server
        .admin(server.http.post(server.url("/api/projects")))
        .json(&json!({"name": "Acme"}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let project: Value = response.json().await.unwrap();
    assert_eq!(project["id"], "acme");
    assert_eq!(project["environments"], json!(["live"]));

    let response = server
        .admin(server.http.post(server.url("/api/projects")))
        .json(&json!({"name": "ACME"}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);

    let listed: Value = server
        .http
        .get(server.url("/api/projects"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(listed, json!({"projects": ["acme"]}));

    let response = server
        .admin(server.http.post(server.url("/api/projects/acme/environments/staging")))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let environments: Value = server
        .http
        .get(server.url("/api/projects/acme/environments"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(environments, json!(["staging"]));

    let response = server
        .admin(server.http.delete(server.url("/api/projects/acme/environments/staging")))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let deletion: Value = response.json().await.unwrap();
    assert_eq!(deletion["backup"]["project"], "acme");

    let response = server
        .admin(server.http.delete(server.url("/api/projects/acme?backup=false")))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let deletion: Value = response.json().await.unwrap();
    assert_eq!(deletion["backup"], Value::Null);

    let response = server.http.get(server.url("/api/projects/acme")).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn resources_over_http() {
    let server = Server::start().await;
    server
        .admin(server.http.post(server.url("/api/projects")))
        .json(&json!({"name": "Acme"}))
        .send()
        .await
        .unwrap();

    let response = server
        .http
        .post(server.url("/api/acme/live/content/home"))
        .json(&json!({"title": "Home"}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = server
        .http
        .post(server.url("/api/acme/live/content/new?type=page"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let created: Value = response.json().await.unwrap();
    assert_eq!(created["type"], "page");

    let listed: Value = server
        .http
        .get(server.url("/api/acme/live/content"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(listed.as_array().map(Vec::len), Some(2));

    let response = server
        .http
        .delete(server.url("/api/acme/live/content/home"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let response = server
        .http
        .get(server.url("/api/acme/live/widgets"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = server
        .http
        .post(server.url("/api/acme/live/content/push/home"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT, "sync is not configured");
}
