//! In-memory doubles shared by the unit tests.

use crate::models::{AiConfig, Container, Record, SchemaVersion, Snapshot};
use crate::store::{ai_config_from_state, merge_ai_config_into, settings_updated_at_from_state, LocalStore, SettingsStore};
use crate::transport::{DavMethod, DavRequest, HostProxy, RawResponse};
use crate::utils::errors::{Result, SyncError};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use chrono::{DateTime, Utc};
use serde_json::{json, Map, Value};
use std::collections::{HashMap, HashSet};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

#[derive(Default)]
struct RemoteState {
    files: HashMap<String, String>,
    dirs: HashSet<String>,
    requests: Vec<DavRequest>,
    failing_puts: Vec<String>,
    offline: bool,
}

/// A WebDAV server living in a hash map. Any `scheme://host[:port]` URL is
/// treated as an existing root collection.
#[derive(Default)]
pub struct MemoryRemote {
    state: Mutex<RemoteState>,
    credentials: Option<String>,
}

fn normalize(url: &str) -> String {
    url.trim_end_matches('/').to_string()
}

fn is_root(url: &str) -> bool {
    let rest = url.split_once("://").map(|(_, r)| r).unwrap_or(url);
    !rest.trim_end_matches('/').contains('/')
}

fn parent_of(url: &str) -> Option<String> {
    normalize(url).rsplit_once('/').map(|(parent, _)| parent.to_string())
}

impl RemoteState {
    fn dir_exists(&self, url: &str) -> bool {
        is_root(url) || self.dirs.contains(&normalize(url))
    }

    fn parent_exists(&self, url: &str) -> bool {
        parent_of(url).is_some_and(|p| self.dir_exists(&p))
    }
}

impl MemoryRemote {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject requests whose Basic credentials differ with 401.
    pub fn with_credentials(username: &str, password: &str) -> Self {
        Self {
            credentials: Some(format!("Basic {}", BASE64.encode(format!("{username}:{password}")))),
            ..Self::default()
        }
    }

    pub fn requests(&self) -> Vec<DavRequest> {
        self.state.lock().unwrap().requests.clone()
    }

    pub fn clear_requests(&self) {
        self.state.lock().unwrap().requests.clear();
    }

    /// Requests with `method`, in order.
    pub fn requests_with(&self, method: DavMethod) -> Vec<DavRequest> {
        self.requests().into_iter().filter(|r| r.method == method).collect()
    }

    /// Total PUT body bytes seen so far.
    pub fn put_bytes(&self) -> usize {
        self.requests_with(DavMethod::Put)
            .iter()
            .map(|r| r.body.as_deref().map_or(0, str::len))
            .sum()
    }

    pub fn file(&self, url: &str) -> Option<String> {
        self.state.lock().unwrap().files.get(&normalize(url)).cloned()
    }

    /// Store a file, creating its parent collections.
    pub fn insert_file(&self, url: &str, body: &str) {
        let mut state = self.state.lock().unwrap();
        let mut parent = parent_of(url);
        while let Some(dir) = parent {
            if is_root(&dir) {
                break;
            }
            parent = parent_of(&dir);
            state.dirs.insert(dir);
        }
        state.files.insert(normalize(url), body.to_string());
    }

    pub fn remove_file(&self, url: &str) {
        self.state.lock().unwrap().files.remove(&normalize(url));
    }

    /// PUTs to URLs containing `fragment` answer 507.
    pub fn fail_puts_containing(&self, fragment: &str) {
        self.state.lock().unwrap().failing_puts.push(fragment.to_string());
    }

    pub fn clear_failures(&self) {
        self.state.lock().unwrap().failing_puts.clear();
    }

    /// While offline every request fails without a response.
    pub fn set_offline(&self, offline: bool) {
        self.state.lock().unwrap().offline = offline;
    }

    fn handle(&self, request: &DavRequest) -> Result<RawResponse> {
        let mut state = self.state.lock().unwrap();
        state.requests.push(request.clone());

        if state.offline {
            return Err(SyncError::Network("connection refused".to_string()));
        }
        if let Some(expected) = &self.credentials {
            if request.header("Authorization") != Some(expected.as_str()) {
                return Ok(RawResponse::new(401, "Unauthorized", ""));
            }
        }

        let key = normalize(&request.url);
        let resp = match request.method {
            DavMethod::Propfind => {
                if state.dir_exists(&key) || state.files.contains_key(&key) {
                    RawResponse::new(207, "Multi-Status", "<d:multistatus xmlns:d=\"DAV:\"/>")
                } else {
                    RawResponse::new(404, "Not Found", "")
                }
            }
            DavMethod::Mkcol => {
                if state.dir_exists(&key) {
                    RawResponse::new(405, "Method Not Allowed", "")
                } else if !state.parent_exists(&key) {
                    RawResponse::new(409, "Conflict", "")
                } else {
                    state.dirs.insert(key);
                    RawResponse::new(201, "Created", "")
                }
            }
            DavMethod::Put => {
                if state.failing_puts.iter().any(|f| key.contains(f.as_str())) {
                    RawResponse::new(507, "Insufficient Storage", "")
                } else if !state.parent_exists(&key) {
                    RawResponse::new(409, "Conflict", "")
                } else {
                    let body = request.body.clone().unwrap_or_default();
                    match state.files.insert(key, body) {
                        Some(_) => RawResponse::new(204, "No Content", ""),
                        None => RawResponse::new(201, "Created", ""),
                    }
                }
            }
            DavMethod::Get => match state.files.get(&key) {
                Some(body) => RawResponse::new(200, "OK", body.clone()),
                None => RawResponse::new(404, "Not Found", ""),
            },
            DavMethod::Delete => {
                if state.files.remove(&key).is_some() || state.dirs.remove(&key) {
                    RawResponse::new(204, "No Content", "")
                } else {
                    RawResponse::new(404, "Not Found", "")
                }
            }
        };
        Ok(resp)
    }
}

#[async_trait]
impl HostProxy for MemoryRemote {
    async fn forward(&self, request: DavRequest) -> Result<RawResponse> {
        self.handle(&request)
    }
}

#[derive(Default)]
struct StoreState {
    records: Vec<Record>,
    containers: Vec<Container>,
    history: Vec<Value>,
    assets: HashMap<String, String>,
    restores: usize,
    broken: bool,
    unreadable: Vec<String>,
}

/// Local persistence double.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<StoreState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_records(&self, records: Vec<Record>) {
        self.state.lock().unwrap().records = records;
    }

    pub fn records(&self) -> Vec<Record> {
        self.state.lock().unwrap().records.clone()
    }

    pub fn insert_asset(&self, name: &str, base64: &str) {
        self.state.lock().unwrap().assets.insert(name.to_string(), base64.to_string());
    }

    pub fn asset(&self, name: &str) -> Option<String> {
        self.state.lock().unwrap().assets.get(name).cloned()
    }

    pub fn restore_count(&self) -> usize {
        self.state.lock().unwrap().restores
    }

    /// Make every operation fail as a local storage error.
    pub fn break_storage(&self) {
        self.state.lock().unwrap().broken = true;
    }

    /// Reads of `name` fail as a per-asset error from now on.
    pub fn make_unreadable(&self, name: &str) {
        self.state.lock().unwrap().unreadable.push(name.to_string());
    }

    fn check(&self) -> Result<()> {
        if self.state.lock().unwrap().broken {
            return Err(SyncError::Store("storage unavailable".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl LocalStore for MemoryStore {
    async fn all_records(&self) -> Result<Vec<Record>> {
        self.check()?;
        Ok(self.records())
    }

    async fn all_containers(&self) -> Result<Vec<Container>> {
        self.check()?;
        Ok(self.state.lock().unwrap().containers.clone())
    }

    async fn export_snapshot(&self) -> Result<Snapshot> {
        self.check()?;
        let state = self.state.lock().unwrap();
        Ok(Snapshot {
            version: SchemaVersion::CURRENT.major(),
            exported_at: Utc::now(),
            records: state.records.clone(),
            containers: state.containers.clone(),
            version_history: state.history.clone(),
        })
    }

    async fn restore_snapshot(&self, snapshot: Snapshot) -> Result<()> {
        self.check()?;
        let mut state = self.state.lock().unwrap();
        state.records = snapshot.records;
        state.containers = snapshot.containers;
        state.history = snapshot.version_history;
        state.restores += 1;
        Ok(())
    }

    async fn read_asset(&self, name: &str) -> Result<Option<String>> {
        self.check()?;
        if self.state.lock().unwrap().unreadable.iter().any(|n| n == name) {
            return Err(SyncError::PartialAssetFailure {
                name: name.to_string(),
                reason: "permission denied".to_string(),
            });
        }
        Ok(self.asset(name))
    }

    async fn save_asset(&self, name: &str, base64: &str) -> Result<()> {
        self.check()?;
        self.insert_asset(name, base64);
        Ok(())
    }
}

/// Settings double holding the `state` object directly.
#[derive(Default)]
pub struct MemorySettings {
    state: Mutex<Option<Map<String, Value>>>,
}

impl MemorySettings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_state(state: Value) -> Self {
        Self {
            state: Mutex::new(state.as_object().cloned()),
        }
    }

    pub fn state(&self) -> Option<Map<String, Value>> {
        self.state.lock().unwrap().clone()
    }
}

#[async_trait]
impl SettingsStore for MemorySettings {
    async fn ai_config(&self) -> Result<Option<AiConfig>> {
        Ok(self.state().map(|s| ai_config_from_state(&s)))
    }

    async fn settings_snapshot(&self) -> Result<Option<Value>> {
        Ok(self.state().map(|s| json!({ "state": s })))
    }

    async fn settings_updated_at(&self) -> Result<Option<DateTime<Utc>>> {
        Ok(self.state().and_then(|s| settings_updated_at_from_state(&s)))
    }

    async fn merge_ai_config(&self, config: &AiConfig) -> Result<()> {
        let mut guard = self.state.lock().unwrap();
        merge_ai_config_into(guard.get_or_insert_with(Map::new), config);
        Ok(())
    }

    async fn restore_settings(&self, settings: &Value) -> Result<()> {
        if let Some(state) = settings.get("state").and_then(Value::as_object) {
            *self.state.lock().unwrap() = Some(state.clone());
        }
        Ok(())
    }
}

/// Record with a fixed modification time and attached asset names.
pub fn record(id: &str, updated_at: &str, images: &[&str]) -> Record {
    Record {
        id: id.to_string(),
        updated_at: Some(updated_at.parse().unwrap()),
        images: images.iter().map(|s| s.to_string()).collect(),
        extra: Map::new(),
    }
}

/// A [`MemoryRemote`] served over real HTTP.
pub struct DavServer {
    addr: SocketAddr,
}

impl DavServer {
    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }
}

pub async fn spawn_dav_server(username: &str, password: &str) -> DavServer {
    use axum::body::Bytes;
    use axum::extract::State;
    use axum::http::{HeaderMap, Method, StatusCode, Uri};
    use axum::response::IntoResponse;
    use axum::Router;

    async fn handle(
        State((remote, base)): State<(Arc<MemoryRemote>, String)>,
        method: Method,
        uri: Uri,
        headers: HeaderMap,
        body: Bytes,
    ) -> axum::response::Response {
        let method = match method.as_str() {
            "PROPFIND" => DavMethod::Propfind,
            "MKCOL" => DavMethod::Mkcol,
            "PUT" => DavMethod::Put,
            "GET" => DavMethod::Get,
            "DELETE" => DavMethod::Delete,
            _ => return StatusCode::METHOD_NOT_ALLOWED.into_response(),
        };
        let request = DavRequest {
            method,
            url: format!("{base}{}", uri.path()),
            headers: headers
                .iter()
                .map(|(k, v)| (k.as_str().to_string(), v.to_str().unwrap_or_default().to_string()))
                .collect(),
            body: (!body.is_empty()).then(|| String::from_utf8_lossy(&body).into_owned()),
        };
        match remote.forward(request).await {
            Ok(resp) => (StatusCode::from_u16(resp.status).unwrap(), resp.body).into_response(),
            Err(e) => (StatusCode::BAD_GATEWAY, e.to_string()).into_response(),
        }
    }

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let remote = Arc::new(MemoryRemote::with_credentials(username, password));
    let app = Router::new()
        .fallback(handle)
        .with_state((remote, format!("http://{addr}")));

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    DavServer { addr }
}
