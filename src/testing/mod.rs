//! Test doubles for identity sources, connection factories and sessions.

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use crate::credential::{AccessToken, Credential, CredentialSource, IssuedToken, SourceKind, SourceOutcome};
use crate::database::{ConnectionError, ConnectionFactory, QueryError, Record, Session};
use crate::filter::SqlResult;

enum Behavior {
    Issue(chrono::Duration),
    Decline,
    Fault(String),
}

/// Identity source with a fixed answer that counts how often it was asked.
pub struct StubSource {
    kind: SourceKind,
    behavior: Behavior,
    delay: Option<Duration>,
    calls: AtomicUsize,
}

impl StubSource {
    /// Issues tokens that expire `lifetime` after each call.
    pub fn issuing(kind: SourceKind, lifetime: chrono::Duration) -> Self {
        Self::with_behavior(kind, Behavior::Issue(lifetime))
    }

    pub fn declining(kind: SourceKind) -> Self {
        Self::with_behavior(kind, Behavior::Decline)
    }

    pub fn faulting(kind: SourceKind, cause: &str) -> Self {
        Self::with_behavior(kind, Behavior::Fault(cause.to_string()))
    }

    fn with_behavior(kind: SourceKind, behavior: Behavior) -> Self {
        Self {
            kind,
            behavior,
            delay: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CredentialSource for StubSource {
    fn kind(&self) -> SourceKind {
        self.kind
    }

    async fn fetch(&self, _scope: &str) -> SourceOutcome {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        match &self.behavior {
            Behavior::Issue(lifetime) => SourceOutcome::Token(IssuedToken {
                token: AccessToken::new(format!("{}-token-{}", self.kind, call)),
                expires_at: Utc::now() + *lifetime,
            }),
            Behavior::Decline => SourceOutcome::Declined(format!("{} not available", self.kind)),
            Behavior::Fault(cause) => SourceOutcome::Fault(cause.clone()),
        }
    }
}

/// Shared counters a test inspects after handing the factory away.
#[derive(Clone, Default)]
pub struct FactoryTally {
    opens: Arc<AtomicUsize>,
    closes: Arc<AtomicUsize>,
    serials: Arc<Mutex<Vec<u64>>>,
    executed: Arc<Mutex<Vec<SqlResult>>>,
    queries: Arc<Mutex<Vec<SqlResult>>>,
}

impl FactoryTally {
    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    /// Serial of the credential presented on each `open` call.
    pub fn serials(&self) -> Vec<u64> {
        self.serials.lock().map(|s| s.clone()).unwrap_or_default()
    }

    pub fn executed(&self) -> Vec<SqlResult> {
        self.executed.lock().map(|s| s.clone()).unwrap_or_default()
    }

    /// Read queries in the order sessions ran them.
    pub fn queries(&self) -> Vec<SqlResult> {
        self.queries.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

/// Connection factory that answers `open` from a script, then succeeds.
pub struct ScriptedFactory {
    script: Mutex<VecDeque<Result<(), ConnectionError>>>,
    rows: Arc<Vec<Record>>,
    query_failure: Option<QueryError>,
    tally: FactoryTally,
}

impl ScriptedFactory {
    pub fn new(rows: Vec<Record>) -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            rows: Arc::new(rows),
            query_failure: None,
            tally: FactoryTally::default(),
        }
    }

    /// Outcomes for the first `open` calls, in order.
    pub fn with_script(self, script: Vec<Result<(), ConnectionError>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            ..self
        }
    }

    /// Every query on every session fails with `err`.
    pub fn failing_queries(mut self, err: QueryError) -> Self {
        self.query_failure = Some(err);
        self
    }

    pub fn tally(&self) -> FactoryTally {
        self.tally.clone()
    }
}

#[async_trait]
impl ConnectionFactory for ScriptedFactory {
    type Session = MemorySession;

    async fn open(&self, credential: &Credential) -> Result<MemorySession, ConnectionError> {
        self.tally.opens.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut serials) = self.tally.serials.lock() {
            serials.push(credential.serial());
        }

        let scripted = self.script.lock().ok().and_then(|mut s| s.pop_front());
        if let Some(Err(err)) = scripted {
            return Err(err);
        }

        Ok(MemorySession {
            rows: self.rows.clone(),
            failure: self.query_failure.clone(),
            tally: self.tally.clone(),
        })
    }
}

/// Session over an in-memory row set. Page queries are sliced using their
/// trailing `[limit, offset]` parameters.
pub struct MemorySession {
    rows: Arc<Vec<Record>>,
    failure: Option<QueryError>,
    tally: FactoryTally,
}

impl MemorySession {
    fn check(&self, query: &SqlResult) -> Result<(), QueryError> {
        if let Ok(mut queries) = self.tally.queries.lock() {
            queries.push(query.clone());
        }
        match &self.failure {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl Session for MemorySession {
    async fn fetch_count(&mut self, query: &SqlResult) -> Result<i64, QueryError> {
        self.check(query)?;
        Ok(self.rows.len() as i64)
    }

    async fn fetch_records(&mut self, query: &SqlResult) -> Result<Vec<Record>, QueryError> {
        self.check(query)?;
        if !query.query.contains("LIMIT") {
            return Ok(self.rows.iter().cloned().collect());
        }

        let n = query.params.len();
        let limit = query.params.get(n.wrapping_sub(2)).and_then(Value::as_u64).unwrap_or(0) as usize;
        let offset = query.params.get(n.wrapping_sub(1)).and_then(Value::as_u64).unwrap_or(0) as usize;
        Ok(self.rows.iter().skip(offset).take(limit).cloned().collect())
    }

    async fn execute(&mut self, statement: &SqlResult) -> Result<u64, QueryError> {
        if let Some(err) = &self.failure {
            return Err(err.clone());
        }
        if let Ok(mut executed) = self.tally.executed.lock() {
            executed.push(statement.clone());
        }
        Ok(1)
    }

    async fn close(self) {
        self.tally.closes.fetch_add(1, Ordering::SeqCst);
    }
}

/// `count` rows shaped like the `sets` view, newest year first.
pub fn set_rows(count: usize) -> Vec<Record> {
    (0..count)
        .map(|i| {
            let row = json!({
                "set_num": format!("{}-1", 75000 + i),
                "name": format!("Star Set {}", i),
                "year": 2020 - (i / 10) as i64,
                "theme_name": "Star Wars",
            });
            match row {
                Value::Object(map) => map,
                _ => Record::new(),
            }
        })
        .collect()
}

/// Serve exactly one HTTP response on a local port.
///
/// Returns the base URL and a handle yielding the raw request text.
pub async fn serve_once(status: u16, body: &str) -> (String, JoinHandle<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let body = body.to_string();

    let handle = tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        let raw = read_request(&mut stream).await;

        let reason = match status {
            200 => "OK",
            400 => "Bad Request",
            401 => "Unauthorized",
            404 => "Not Found",
            _ => "Internal Server Error",
        };
        let response = format!(
            "HTTP/1.1 {} {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            status,
            reason,
            body.len(),
            body
        );
        stream.write_all(response.as_bytes()).await.unwrap();
        stream.shutdown().await.ok();
        raw
    });

    (format!("http://{}", addr), handle)
}

async fn read_request(stream: &mut tokio::net::TcpStream) -> String {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    loop {
        let n = stream.read(&mut chunk).await.unwrap_or(0);
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);

        let text = String::from_utf8_lossy(&buf);
        if let Some(header_end) = text.find("\r\n\r\n") {
            let content_length = text[..header_end]
                .lines()
                .filter_map(|l| l.split_once(':'))
                .find(|(k, _)| k.trim().eq_ignore_ascii_case("content-length"))
                .and_then(|(_, v)| v.trim().parse::<usize>().ok())
                .unwrap_or(0);
            if buf.len() >= header_end + 4 + content_length {
                break;
            }
        }
    }
    String::from_utf8_lossy(&buf).into_owned()
}

/// A local URL with nothing listening on it.
pub async fn unused_local_url() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{}/metadata/identity/oauth2/token", addr)
}
