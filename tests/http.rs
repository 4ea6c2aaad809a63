use axum::{
    Router,
    http::header::CONTENT_TYPE,
    response::Html,
    routing::get,
};
use once_cell::sync::Lazy;
use reqwest::{Client, StatusCode, header::ACCEPT};
use serde::Deserialize;
use serde_json::{Value, json};
use std::net::TcpListener;
use std::process::{Child, Command, Stdio};
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, oneshot};
use tokio::task::JoinHandle;
use tokio::time::sleep;

const CACHE_VERSION: &str = "health-tracker-it";
const LOGIN_PAGE: &str = "<h1>เข้าสู่ระบบ</h1>";

#[derive(Debug, Deserialize)]
struct GatewayStatus {
    version: String,
    state: String,
    namespaces: Vec<String>,
    entries: usize,
}

struct TestServer {
    base_url: String,
    child: Child,
}

impl Drop for TestServer {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

struct Origin {
    base_url: String,
    shutdown: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

impl Origin {
    async fn stop(self) {
        let _ = self.shutdown.send(());
        let _ = tokio::time::timeout(Duration::from_secs(5), self.task).await;
    }
}

static TEST_LOCK: Lazy<Mutex<()>> = Lazy::new(|| Mutex::new(()));

#[cfg(unix)]
mod cleanup {
    use once_cell::sync::Lazy;
    use std::sync::{Mutex, Once};

    static REGISTER: Once = Once::new();
    static PIDS: Lazy<Mutex<Vec<i32>>> = Lazy::new(|| Mutex::new(Vec::new()));

    pub fn register(pid: u32) {
        if let Ok(mut pids) = PIDS.lock() {
            pids.push(pid as i32);
        }
        REGISTER.call_once(|| unsafe {
            libc::atexit(on_exit);
        });
    }

    extern "C" fn on_exit() {
        if let Ok(pids) = PIDS.lock() {
            for pid in pids.iter().copied().filter(|pid| *pid > 0) {
                unsafe {
                    libc::kill(pid, libc::SIGTERM);
                }
            }
        }
    }
}

fn pick_free_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind random port");
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    port
}

fn unique_data_path() -> String {
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    let mut path = std::env::temp_dir();
    path.push(format!("health_tracker_http_{}_{}.json", std::process::id(), nanos));
    path.to_string_lossy().to_string()
}

async fn spawn_origin() -> Origin {
    let app = Router::new()
        .route("/", get(|| async { Html("<h1>Health Tracker</h1>") }))
        .route("/login.html", get(|| async { Html(LOGIN_PAGE) }))
        .route("/dashboard.html", get(|| async { Html("<h1>dashboard</h1>") }))
        .route(
            "/css/style.css",
            get(|| async { ([(CONTENT_TYPE, "text/css")], "body { margin: 0; }") }),
        );

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (shutdown, signal) = oneshot::channel::<()>();
    let task = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let _ = signal.await;
            })
            .await
            .unwrap();
    });

    Origin {
        base_url: format!("http://{addr}/"),
        shutdown,
        task,
    }
}

async fn wait_until_ready(base_url: &str) {
    let client = Client::new();
    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        if let Ok(resp) = client.get(format!("{base_url}/api/gateway")).send().await {
            if resp.status().is_success() {
                return;
            }
        }
        if Instant::now() > deadline {
            panic!("server did not become ready");
        }
        sleep(Duration::from_millis(100)).await;
    }
}

async fn spawn_server(origin: &Origin, data_path: &str) -> TestServer {
    let port = pick_free_port();
    let child = Command::new(env!("CARGO_BIN_EXE_health_tracker"))
        .env("PORT", port.to_string())
        .env("APP_DATA_PATH", data_path)
        .env("UPSTREAM_ORIGIN", &origin.base_url)
        .env("SHELL_MANIFEST", "./,./login.html,./css/style.css")
        .env("CACHE_VERSION", CACHE_VERSION)
        .env("RUST_LOG", "info")
        .env_remove("BACKEND_URL")
        .env_remove("BACKEND_HOSTS")
        .env_remove("OFFLINE_PAGE")
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit())
        .spawn()
        .expect("failed to spawn server");

    #[cfg(unix)]
    cleanup::register(child.id());

    let base_url = format!("http://127.0.0.1:{port}");
    wait_until_ready(&base_url).await;

    TestServer { base_url, child }
}

async fn gateway_status(client: &Client, server: &TestServer) -> GatewayStatus {
    client
        .get(format!("{}/api/gateway", server.base_url))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap()
}

#[tokio::test]
async fn http_gateway_serves_shell_offline() {
    let _guard = TEST_LOCK.lock().await;
    let origin = spawn_origin().await;
    let data_path = unique_data_path();
    std::fs::write(
        &data_path,
        json!({ "namespaces": { "health-tracker-v0": {} } }).to_string(),
    )
    .unwrap();

    let server = spawn_server(&origin, &data_path).await;
    let client = Client::new();

    let status = gateway_status(&client, &server).await;
    assert_eq!(status.version, CACHE_VERSION);
    assert_eq!(status.state, "activated");
    assert_eq!(status.namespaces, vec![CACHE_VERSION.to_string()]);
    assert_eq!(status.entries, 3);

    let online = client
        .get(format!("{}/dashboard.html", server.base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(online.status(), StatusCode::OK);
    assert_eq!(online.headers()["x-cache-source"], "network");
    assert_eq!(online.text().await.unwrap(), "<h1>dashboard</h1>");

    let deadline = Instant::now() + Duration::from_secs(3);
    while gateway_status(&client, &server).await.entries < 4 {
        if Instant::now() > deadline {
            panic!("dashboard was never written to the cache");
        }
        sleep(Duration::from_millis(50)).await;
    }

    origin.stop().await;

    let cached = client
        .get(format!("{}/dashboard.html", server.base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(cached.status(), StatusCode::OK);
    assert_eq!(cached.headers()["x-cache-source"], "cache");
    assert_eq!(cached.text().await.unwrap(), "<h1>dashboard</h1>");

    let css = client
        .get(format!("{}/css/style.css", server.base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(css.headers()["x-cache-source"], "cache");
    assert_eq!(css.headers()["content-type"], "text/css");

    let page = client
        .get(format!("{}/admin.html", server.base_url))
        .header(ACCEPT, "text/html,application/xhtml+xml")
        .send()
        .await
        .unwrap();
    assert_eq!(page.status(), StatusCode::OK);
    assert_eq!(page.headers()["x-cache-source"], "offline-page");
    assert_eq!(page.text().await.unwrap(), LOGIN_PAGE);

    let data = client
        .get(format!("{}/data/latest.json", server.base_url))
        .header(ACCEPT, "application/json")
        .send()
        .await
        .unwrap();
    assert_eq!(data.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(data.headers()["x-cache-source"], "offline");
    assert_eq!(data.text().await.unwrap(), "Offline");

    drop(server);
    let _ = std::fs::remove_file(data_path);
}

#[tokio::test]
async fn http_summary_classifies_timeline() {
    let _guard = TEST_LOCK.lock().await;
    let origin = spawn_origin().await;
    let data_path = unique_data_path();
    let server = spawn_server(&origin, &data_path).await;
    let client = Client::new();

    let timeline = json!({
        "weightBmi": [
            { "date": "2024-03-01", "weight": 65, "height": 170, "bmi": 22.5 },
            { "date": "2024-03-02", "weight": "66", "height": 170, "bmi": 22.8 }
        ],
        "bloodPressure": [{ "date": "2024-03-01", "sys": 118, "dia": 76 }],
        "o2": [{ "date": "2024-03-01", "spo2": 98 }],
        "sugar": [{ "date": "2024-03-01", "sugar": 92 }]
    });

    let response: Value = client
        .post(format!("{}/api/summary", server.base_url))
        .json(&timeline)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    let summary = &response["summary"];
    assert_eq!(summary["averages"]["weight"], json!(65.5));
    assert_eq!(summary["display"]["bloodPressure"], "118/76");
    assert_eq!(summary["verdicts"]["bmi"]["status"], "good");
    assert_eq!(summary["verdicts"]["weight"]["status"], "neutral");

    let recommendations = summary["recommendations"].as_array().unwrap();
    assert_eq!(recommendations.len(), 1);
    assert_eq!(recommendations[0]["severity"], "good");

    let charts = response["charts"].as_array().unwrap();
    assert_eq!(charts.len(), 5);
    assert_eq!(charts[0]["kind"], "weight");
    assert_eq!(charts[0]["spec"]["labels"], json!(["1/3", "2/3"]));

    drop(server);
    origin.stop().await;
    let _ = std::fs::remove_file(data_path);
}

#[tokio::test]
async fn http_dashboard_requires_token_and_backend() {
    let _guard = TEST_LOCK.lock().await;
    let origin = spawn_origin().await;
    let data_path = unique_data_path();
    let server = spawn_server(&origin, &data_path).await;
    let client = Client::new();

    let anonymous = client
        .get(format!("{}/api/dashboard?view=monthly", server.base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(anonymous.status(), StatusCode::UNAUTHORIZED);

    let unconfigured = client
        .get(format!("{}/api/dashboard?view=monthly", server.base_url))
        .bearer_auth("token-1")
        .send()
        .await
        .unwrap();
    assert_eq!(unconfigured.status(), StatusCode::SERVICE_UNAVAILABLE);

    drop(server);
    origin.stop().await;
    let _ = std::fs::remove_file(data_path);
}
