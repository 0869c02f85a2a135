//! Shared integration test helpers for apish.
//!
//! This module provides canonical factory functions, test isolation
//! utilities, and a minimal scripted HTTP server used across the `tests/`
//! integration test suite.
//!
//! # Usage
//!
//! Include this module at the top of each test file that needs it:
//!
//! ```ignore
//! mod common;
//! use common::{registry_with_tmp_root, sample_record, StubServer};
//! ```
//!
//! Note: Rust integration tests use `mod common;` (not `use`) to bring in
//! helpers from `tests/common/mod.rs`. The `#[allow(dead_code)]` attribute
//! suppresses warnings when only a subset of helpers are used per file.

#![allow(dead_code)]

use apish::config::{AppRecord, AppRegistry, Profile};
use apish::spec::CacheMetadata;
use chrono::Utc;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::fs;
use std::io::{BufRead, BufReader, Write};
use std::net::{TcpListener, TcpStream};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::JoinHandle;
use tempfile::TempDir;

/// Creates a temporary directory serving as an isolated config root and a
/// registry bound to it.
///
/// The `TempDir` must be kept alive for the duration of the test; drop it
/// only after all registry I/O has completed.
pub fn registry_with_tmp_root() -> (AppRegistry, TempDir) {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    (AppRegistry::new(temp_dir.path()), temp_dir)
}

/// A record with one default profile named `default`, ready to save.
pub fn sample_record(name: &str, spec_source: &str) -> AppRecord {
    let mut record = AppRecord::new(name, spec_source);
    record.add_profile(Profile::new("default", "https://api.example.com"));
    record
}

/// Writes a minimal OpenAPI YAML stub and returns its path.
pub fn write_spec_stub(dir: &Path, file_name: &str) -> PathBuf {
    let path = dir.join(file_name);
    fs::write(
        &path,
        "openapi: 3.1.0\ninfo:\n  title: Stub API\n  version: 1.0.0\npaths: {}\n",
    )
    .expect("Failed to write spec stub");
    path
}

/// Path of the cache metadata sidecar for `app` under `config_root`.
pub fn cache_meta_path(config_root: &Path, app: &str) -> PathBuf {
    config_root
        .join("apps")
        .join(app)
        .join("cache")
        .join("meta.json")
}

/// Rewrites the cached metadata so the entry reads as expired, simulating
/// the clock advancing past `expires_at`.
pub fn expire_cache_entry(config_root: &Path, app: &str) {
    let meta_path = cache_meta_path(config_root, app);
    let mut meta = CacheMetadata::load(&meta_path).expect("cache metadata present");
    meta.expires_at = Utc::now() - chrono::Duration::minutes(5);
    meta.save(&meta_path)
        .expect("Failed to rewrite cache metadata");
}

/// One canned HTTP response served by [`StubServer`].
#[derive(Debug, Clone)]
pub struct StubResponse {
    pub status: u16,
    pub reason: &'static str,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl StubResponse {
    pub fn ok(body: &str) -> Self {
        Self {
            status: 200,
            reason: "OK",
            headers: Vec::new(),
            body: body.to_string(),
        }
    }

    pub fn not_modified() -> Self {
        Self {
            status: 304,
            reason: "Not Modified",
            headers: Vec::new(),
            body: String::new(),
        }
    }

    pub fn status(status: u16, reason: &'static str) -> Self {
        Self {
            status,
            reason,
            headers: Vec::new(),
            body: String::new(),
        }
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }
}

/// A request as observed by the stub server. Header names are lowercased.
#[derive(Debug, Clone)]
pub struct SeenRequest {
    pub method: String,
    pub path: String,
    pub headers: BTreeMap<String, String>,
}

impl SeenRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_lowercase()).map(String::as_str)
    }
}

/// Minimal scripted HTTP server for spec cache tests.
///
/// Serves each canned response to exactly one connection, in order,
/// recording what the client sent. Once the script is exhausted the
/// listener closes, so further fetches see a connection error; the
/// offline-fallback tests use this to simulate an unreachable server.
pub struct StubServer {
    url: String,
    requests: Arc<Mutex<Vec<SeenRequest>>>,
    handle: Option<JoinHandle<()>>,
}

impl StubServer {
    /// Binds an ephemeral port and serves `script` one connection at a time.
    /// The returned server's URL points at `path` on that port.
    pub fn serve(path: &str, script: Vec<StubResponse>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").expect("Failed to bind stub server");
        let addr = listener.local_addr().expect("stub server local addr");
        let requests: Arc<Mutex<Vec<SeenRequest>>> = Arc::new(Mutex::new(Vec::new()));
        let seen = Arc::clone(&requests);

        let handle = std::thread::spawn(move || {
            for response in script {
                let Ok((mut stream, _)) = listener.accept() else {
                    return;
                };
                let request = read_request(&mut stream);
                seen.lock().push(request);
                write_response(&mut stream, &response);
            }
            // Dropping the listener here refuses any later connection.
        });

        Self {
            url: format!("http://{addr}{path}"),
            requests,
            handle: Some(handle),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Requests observed so far, oldest first.
    pub fn requests(&self) -> Vec<SeenRequest> {
        self.requests.lock().clone()
    }

    /// Waits for the whole script to be consumed and returns the observed
    /// requests. Only call after issuing enough fetches to drain the script,
    /// otherwise this blocks on a connection that never comes.
    pub fn finish(mut self) -> Vec<SeenRequest> {
        if let Some(handle) = self.handle.take() {
            handle.join().expect("stub server thread panicked");
        }
        let requests = self.requests.lock().clone();
        requests
    }
}

fn read_request(stream: &mut TcpStream) -> SeenRequest {
    let mut reader = BufReader::new(&mut *stream);

    let mut request_line = String::new();
    reader
        .read_line(&mut request_line)
        .expect("Failed to read request line");
    let mut parts = request_line.split_whitespace();
    let method = parts.next().unwrap_or("").to_string();
    let path = parts.next().unwrap_or("").to_string();

    let mut headers = BTreeMap::new();
    loop {
        let mut line = String::new();
        let n = reader.read_line(&mut line).expect("Failed to read header");
        let line = line.trim_end();
        if n == 0 || line.is_empty() {
            break;
        }
        if let Some((name, value)) = line.split_once(':') {
            headers.insert(name.trim().to_lowercase(), value.trim().to_string());
        }
    }

    SeenRequest {
        method,
        path,
        headers,
    }
}

fn write_response(stream: &mut TcpStream, response: &StubResponse) {
    let mut head = format!("HTTP/1.1 {} {}\r\n", response.status, response.reason);
    for (name, value) in &response.headers {
        head.push_str(&format!("{name}: {value}\r\n"));
    }
    head.push_str(&format!("content-length: {}\r\n", response.body.len()));
    head.push_str("connection: close\r\n\r\n");

    stream
        .write_all(head.as_bytes())
        .expect("Failed to write response head");
    stream
        .write_all(response.body.as_bytes())
        .expect("Failed to write response body");
    let _ = stream.flush();
}
