use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::json;
use style_repo_search::catalog::StyleCatalog;
use style_repo_search::model::StyleRecord;
use style_repo_search::search::worker::{SearchRequest, SearchResponse};
use style_repo_search::search::{InlineBackend, SearchBackend, WorkerError};
use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

/// Captures tracing output for tests.
#[allow(dead_code)]
pub struct TestTracing {
    buffer: Arc<std::sync::Mutex<Vec<u8>>>,
}

#[allow(dead_code)]
impl TestTracing {
    pub fn new() -> Self {
        Self {
            buffer: Arc::new(std::sync::Mutex::new(Vec::new())),
        }
    }

    pub fn install(&self) -> tracing::subscriber::DefaultGuard {
        let writer = self.buffer.clone();
        let make_writer = move || TestWriter(writer.clone());
        let subscriber = tracing_subscriber::fmt()
            .with_ansi(false)
            .without_time()
            .with_max_level(tracing::Level::TRACE)
            .with_writer(make_writer)
            .finish();
        tracing::subscriber::set_default(subscriber)
    }

    pub fn output(&self) -> String {
        let buf = self.buffer.lock().unwrap();
        String::from_utf8_lossy(&buf).to_string()
    }

    /// Assert that the captured log output contains the provided substring.
    pub fn assert_contains(&self, needle: &str) {
        let out = self.output();
        assert!(
            out.contains(needle),
            "expected logs to contain `{needle}`, got:\n{out}"
        );
    }
}

struct TestWriter(Arc<std::sync::Mutex<Vec<u8>>>);

impl std::io::Write for TestWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let mut guard = self.0.lock().unwrap();
        guard.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

/// A small but varied listing: independent and dependent styles, a record
/// without a format, one name shared by an independent and a dependent style.
#[allow(dead_code)]
pub fn sample_records() -> Vec<StyleRecord> {
    vec![
        StyleRecord::new("apa", "American Psychological Association 7th edition")
            .with_title_short("APA")
            .with_format("author-date")
            .with_fields(["psychology", "generic-base"]),
        StyleRecord::new("apa-short", "APA Short")
            .dependent(true)
            .with_format("author-date")
            .with_fields(["psychology", "education"]),
        StyleRecord::new("nature", "Nature")
            .with_format("numeric")
            .with_fields(["science", "biology"]),
        StyleRecord::new("cell", "Cell")
            .dependent(true)
            .with_format("author-date")
            .with_fields(["biology"]),
        StyleRecord::new("jama", "Journal of the American Medical Association")
            .with_title_short("JAMA")
            .with_format("numeric")
            .with_fields(["medicine"]),
        StyleRecord::new("bluebook-law-review", "Bluebook Law Review")
            .with_format("note")
            .with_fields(["law"]),
        StyleRecord::new("modern-language-association", "Modern Language Association 9th edition")
            .with_title_short("MLA")
            .with_format("author")
            .with_fields(["generic-base"]),
        StyleRecord::new("din-1505-2", "DIN 1505-2 (alphanumeric)")
            .with_fields(["generic-base"]),
        StyleRecord::new("nature", "Nature (dependent alias)")
            .dependent(true)
            .with_format("numeric")
            .with_fields(["science"]),
    ]
}

#[allow(dead_code)]
pub fn sample_catalog() -> StyleCatalog {
    StyleCatalog::from_records(sample_records())
}

/// The listing as the endpoint serves it (`dependent` as 0/1).
#[allow(dead_code)]
pub fn sample_catalog_json() -> String {
    let records: Vec<_> = sample_records()
        .into_iter()
        .map(|r| {
            let href = format!("/styles/{}", r.name);
            json!({
                "name": r.name,
                "title": r.title,
                "titleShort": r.title_short.unwrap_or_default(),
                "updated": "2024-01-01 00:00:00",
                "dependent": if r.dependent { 1 } else { 0 },
                "categories": {
                    "format": r.categories.format,
                    "fields": r.categories.fields,
                },
                "href": href,
            })
        })
        .collect();
    serde_json::Value::Array(records).to_string()
}

#[allow(dead_code)]
pub struct TempFixtureDir {
    pub dir: TempDir,
}

#[allow(dead_code)]
impl TempFixtureDir {
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().expect("tempdir"),
        }
    }

    pub fn write(&self, name: &str, contents: &str) -> PathBuf {
        let path = self.dir.path().join(name);
        std::fs::write(&path, contents).expect("write fixture");
        path
    }

    pub fn catalog(&self) -> PathBuf {
        self.write("styles.json", &sample_catalog_json())
    }
}

/// Backend that delays or fails evaluations by search text.
#[allow(dead_code)]
#[derive(Default)]
pub struct ScriptedBackend {
    inner: InlineBackend,
    delays: Mutex<HashMap<String, Duration>>,
    failing: Mutex<Vec<String>>,
    seen: Mutex<Vec<(u64, String)>>,
}

#[allow(dead_code)]
impl ScriptedBackend {
    pub fn new(catalog: StyleCatalog) -> Self {
        Self {
            inner: InlineBackend::new(catalog),
            ..Self::default()
        }
    }

    pub fn delay(self, search: &str, delay: Duration) -> Self {
        self.delays.lock().insert(search.to_string(), delay);
        self
    }

    pub fn fail(self, search: &str) -> Self {
        self.failing.lock().push(search.to_string());
        self
    }

    /// Sequence numbers and search texts evaluated so far, in arrival order.
    pub fn seen(&self) -> Vec<(u64, String)> {
        self.seen.lock().clone()
    }
}

impl SearchBackend for ScriptedBackend {
    fn load(&self, catalog: StyleCatalog) -> Result<(), WorkerError> {
        self.inner.load(catalog)
    }

    async fn evaluate(&self, request: SearchRequest) -> Result<SearchResponse, WorkerError> {
        let search = request.payload.search.clone();
        self.seen.lock().push((request.seq, search.clone()));
        let delay = self.delays.lock().get(&search).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let fails = self.failing.lock().contains(&search);
        if fails {
            return Err(WorkerError::Dropped(request.seq));
        }
        self.inner.evaluate(request).await
    }
}

/// Minimal HTTP/1.1 responder serving fixed bodies by path.
#[allow(dead_code)]
pub struct StubServer {
    pub base_url: String,
    hits: Arc<Mutex<Vec<String>>>,
}

#[allow(dead_code)]
impl StubServer {
    /// Routes map a request path to `(status, body)`; anything else is a 404.
    pub async fn start(routes: Vec<(&str, u16, String)>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("local addr");
        let routes: Arc<HashMap<String, (u16, String)>> = Arc::new(
            routes
                .into_iter()
                .map(|(path, status, body)| (path.to_string(), (status, body)))
                .collect(),
        );
        let hits = Arc::new(Mutex::new(Vec::new()));

        let served = Arc::clone(&hits);
        tokio::spawn(async move {
            loop {
                let Ok((mut socket, _)) = listener.accept().await else {
                    return;
                };
                let routes = Arc::clone(&routes);
                let served = Arc::clone(&served);
                tokio::spawn(async move {
                    let mut request = Vec::new();
                    let mut buf = [0u8; 1024];
                    while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                        match socket.read(&mut buf).await {
                            Ok(0) | Err(_) => break,
                            Ok(n) => request.extend_from_slice(&buf[..n]),
                        }
                    }
                    let head = String::from_utf8_lossy(&request);
                    let path = head
                        .lines()
                        .next()
                        .and_then(|line| line.split_whitespace().nth(1))
                        .unwrap_or("/")
                        .to_string();
                    served.lock().push(path.clone());

                    let (status, body) = routes
                        .get(&path)
                        .cloned()
                        .unwrap_or((404, "not found".to_string()));
                    let reason = if status == 200 { "OK" } else { "Error" };
                    let response = format!(
                        "HTTP/1.1 {status} {reason}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                        body.len()
                    );
                    let _ = socket.write_all(response.as_bytes()).await;
                    let _ = socket.shutdown().await;
                });
            }
        });

        Self {
            base_url: format!("http://{addr}"),
            hits,
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    pub fn hits(&self, path: &str) -> usize {
        self.hits.lock().iter().filter(|p| *p == path).count()
    }
}
