use std::thread::sleep;

use once_cell::sync::Lazy;
use reqwest::blocking::Client;
use reqwest::header::ACCEPT;
use reqwest::Url;
use serde::Deserialize;
use thiserror::Error;
use tracing::{info, warn};

use crate::config::Settings;
use crate::models::{Setlist, SetlistPage};
use crate::report::Issue;

const ENDPOINT: &str = "attended";
const API_KEY_HEADER: &str = "x-api-key";

static CLIENT: Lazy<Client> = Lazy::new(|| {
    Client::builder()
        .user_agent(concat!("setlist-export/", env!("CARGO_PKG_VERSION")))
        .build()
        .expect("failed to build setlist.fm client")
});

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("invalid url: {0}")]
    Url(String),
    #[error("http error: {0}")]
    Http(String),
    #[error("status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("unable to read response body: {0}")]
    Body(String),
    #[error("parse error: {0}")]
    Parse(String),
}

/// Performs a single authenticated GET and hands back the raw body.
pub trait Transport {
    fn get(&self, url: &Url, api_key: &str) -> Result<String, FetchError>;
}

pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn new() -> Self {
        Self::with_client(CLIENT.clone())
    }

    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

impl Default for HttpTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for HttpTransport {
    fn get(&self, url: &Url, api_key: &str) -> Result<String, FetchError> {
        let response = self
            .client
            .get(url.clone())
            .header(ACCEPT, "application/json")
            .header(API_KEY_HEADER, api_key)
            .send()
            .map_err(|err| FetchError::Http(err.to_string()))?;
        let status = response.status();
        let text = response
            .text()
            .map_err(|err| FetchError::Body(err.to_string()))?;

        if !status.is_success() {
            return Err(FetchError::Status {
                status: status.as_u16(),
                body: text,
            });
        }

        Ok(text)
    }
}

/// How the number of pages is derived from the first page's envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PageMath {
    /// Historical behaviour: when `total` is not a multiple of the page
    /// size the trailing partial page is never requested, and when it is a
    /// multiple one extra (empty) page is requested.
    #[default]
    Inverted,
    /// Round up.
    Ceil,
}

impl PageMath {
    pub fn page_count(self, total: u32, items_per_page: u32) -> u32 {
        if items_per_page == 0 {
            return 1;
        }
        let whole = total / items_per_page;
        let exact = total == items_per_page * whole;
        match self {
            PageMath::Inverted if exact => whole.saturating_add(1),
            PageMath::Inverted => whole,
            PageMath::Ceil if exact => whole,
            PageMath::Ceil => whole.saturating_add(1),
        }
    }
}

/// Every attended setlist that could be retrieved, in page order.
#[derive(Debug, Default)]
pub struct Attended {
    pub setlists: Vec<Setlist>,
    pub total: u32,
    pub items_per_page: u32,
    pub pages: u32,
    /// Pages after the first that failed; their records are missing.
    pub issues: Vec<Issue>,
}

pub fn page_url(base: &str, user: &str, page: u32) -> Result<Url, FetchError> {
    let mut url = Url::parse(base).map_err(|err| FetchError::Url(err.to_string()))?;
    url.path_segments_mut()
        .map_err(|_| FetchError::Url(format!("{base} cannot be a base url")))?
        .pop_if_empty()
        .extend(["rest", "1.0", "user", user, ENDPOINT]);
    url.query_pairs_mut().append_pair("p", &page.to_string());
    Ok(url)
}

fn fetch_page<T>(settings: &Settings, transport: &T, page: u32) -> Result<SetlistPage, FetchError>
where
    T: Transport + ?Sized,
{
    let url = page_url(&settings.base_url, &settings.user, page)?;
    let body = transport.get(&url, &settings.api_key)?;
    serde_json::from_str(&body).map_err(|err| FetchError::Parse(err.to_string()))
}

/// Pages through `/user/{user}/attended`.
///
/// Only a failure on the first page is returned as an error; later pages
/// that fail are logged, recorded in [`Attended::issues`] and skipped.
pub fn fetch_attended<T>(settings: &Settings, transport: &T) -> Result<Attended, FetchError>
where
    T: Transport + ?Sized,
{
    let first = fetch_page(settings, transport, 1)?;
    // Page 1 has been fetched whatever the formula says.
    let pages = settings
        .page_math
        .page_count(first.total, first.items_per_page)
        .max(1);
    info!("{ENDPOINT} - page 1 of {pages}");

    let reachable = u64::from(pages) * u64::from(first.items_per_page);
    if first.items_per_page > 0 && reachable < u64::from(first.total) {
        warn!(
            "{:?} page math stops at page {pages}; {} of {} records will not be requested",
            settings.page_math,
            u64::from(first.total) - reachable,
            first.total
        );
    }

    let mut attended = Attended {
        setlists: first.setlist,
        total: first.total,
        items_per_page: first.items_per_page,
        pages,
        issues: Vec::new(),
    };

    for page in 2..=pages {
        sleep(settings.request_delay);
        info!("{ENDPOINT} - page {page} of {pages}");

        match fetch_page(settings, transport, page) {
            Ok(mut next) => attended.setlists.append(&mut next.setlist),
            Err(err) => {
                warn!("{ENDPOINT} page {page} failed: {err}");
                attended.issues.push(Issue::Fetch { page, source: err });
            }
        }
    }

    Ok(attended)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::config::Settings;
    use serde_json::json;
    use std::cell::RefCell;
    use std::collections::HashMap;
    use std::io::{Read, Write};
    use std::net::TcpListener;
    use std::path::PathBuf;
    use std::thread::{self, JoinHandle};
    use std::time::{Duration, Instant};

    /// Serves canned bodies keyed by page number and records every call.
    pub(crate) struct ScriptedTransport {
        pub pages: HashMap<u32, Result<String, u16>>,
        pub calls: RefCell<Vec<(Url, String, Instant)>>,
    }

    impl ScriptedTransport {
        pub fn new(pages: HashMap<u32, Result<String, u16>>) -> Self {
            Self {
                pages,
                calls: RefCell::new(Vec::new()),
            }
        }

        pub fn requested_pages(&self) -> Vec<String> {
            self.calls
                .borrow()
                .iter()
                .map(|(url, _, _)| url.query().unwrap_or_default().to_string())
                .collect()
        }
    }

    impl Transport for ScriptedTransport {
        fn get(&self, url: &Url, api_key: &str) -> Result<String, FetchError> {
            self.calls
                .borrow_mut()
                .push((url.clone(), api_key.to_string(), Instant::now()));
            let page = url
                .query_pairs()
                .find(|(key, _)| key == "p")
                .and_then(|(_, value)| value.parse::<u32>().ok())
                .unwrap_or(0);
            match self.pages.get(&page) {
                Some(Ok(body)) => Ok(body.clone()),
                Some(Err(status)) => Err(FetchError::Status {
                    status: *status,
                    body: String::new(),
                }),
                None => Err(FetchError::Http(format!("no page {page}"))),
            }
        }
    }

    pub(crate) fn setlist_json(index: u32) -> serde_json::Value {
        json!({
            "id": format!("set{index:04}"),
            "versionId": format!("v{index}"),
            "eventDate": format!("{:02}-06-2019", (index % 28) + 1),
            "artist": { "name": format!("Artist {index}") },
            "venue": {
                "name": "Moda Center",
                "city": { "name": "Portland", "state": "Oregon" }
            },
            "sets": { "set": [] },
            "url": format!("https://www.setlist.fm/setlist/{index}.html")
        })
    }

    pub(crate) fn page_body(
        page: u32,
        total: u32,
        items_per_page: u32,
        range: std::ops::Range<u32>,
    ) -> String {
        json!({
            "type": "setlists",
            "itemsPerPage": items_per_page,
            "page": page,
            "total": total,
            "setlist": range.map(setlist_json).collect::<Vec<_>>()
        })
        .to_string()
    }

    pub(crate) fn test_settings(page_math: PageMath, delay: Duration) -> Settings {
        Settings {
            user: "concertgoer".to_string(),
            api_key: "key-123".to_string(),
            output_path: PathBuf::from("unused"),
            base_url: "https://api.setlist.test".to_string(),
            request_delay: delay,
            page_math,
        }
    }

    fn two_page_transport() -> ScriptedTransport {
        let mut pages = HashMap::new();
        pages.insert(1, Ok(page_body(1, 21, 20, 0..20)));
        pages.insert(2, Ok(page_body(2, 21, 20, 20..21)));
        ScriptedTransport::new(pages)
    }

    #[test]
    fn inverted_page_math_matches_historical_formula() {
        // A remainder page is dropped: 25 records at 20 per page yields one
        // page, so records 21..25 are never requested.
        assert_eq!(PageMath::Inverted.page_count(25, 20), 1);
        assert_eq!(PageMath::Inverted.page_count(21, 20), 1);
        // An exact multiple requests one trailing empty page.
        assert_eq!(PageMath::Inverted.page_count(40, 20), 3);
        assert_eq!(PageMath::Inverted.page_count(0, 20), 1);
        assert_eq!(PageMath::Inverted.page_count(5, 20), 0);
    }

    #[test]
    fn ceil_page_math_rounds_up() {
        assert_eq!(PageMath::Ceil.page_count(25, 20), 2);
        assert_eq!(PageMath::Ceil.page_count(21, 20), 2);
        assert_eq!(PageMath::Ceil.page_count(40, 20), 2);
        assert_eq!(PageMath::Ceil.page_count(5, 20), 1);
        assert_eq!(PageMath::Ceil.page_count(0, 20), 0);
    }

    #[test]
    fn page_count_saturates_on_huge_totals() {
        assert_eq!(PageMath::Inverted.page_count(u32::MAX, 1), u32::MAX);
        assert_eq!(PageMath::Ceil.page_count(u32::MAX, 1), u32::MAX);
        assert_eq!(PageMath::Ceil.page_count(u32::MAX, 2), u32::MAX / 2 + 1);
    }

    #[test]
    fn zero_page_size_means_single_page() {
        assert_eq!(PageMath::Inverted.page_count(10, 0), 1);
        assert_eq!(PageMath::Ceil.page_count(10, 0), 1);
    }

    #[test]
    fn builds_attended_url() {
        let url = page_url("https://api.setlist.fm", "concertgoer", 3).expect("url");
        assert_eq!(
            url.as_str(),
            "https://api.setlist.fm/rest/1.0/user/concertgoer/attended?p=3"
        );

        let url = page_url("http://127.0.0.1:8080/", "a b/c", 1).expect("url");
        assert_eq!(
            url.as_str(),
            "http://127.0.0.1:8080/rest/1.0/user/a%20b%2Fc/attended?p=1"
        );
    }

    #[test]
    fn rejects_unusable_base_url() {
        assert!(matches!(
            page_url("not a url", "u", 1),
            Err(FetchError::Url(_))
        ));
        assert!(matches!(
            page_url("mailto:someone@example.com", "u", 1),
            Err(FetchError::Url(_))
        ));
    }

    #[test]
    fn fetches_every_page_with_delay_when_rounding_up() {
        let transport = two_page_transport();
        let settings = test_settings(PageMath::Ceil, Duration::from_millis(150));

        let attended = fetch_attended(&settings, &transport).expect("fetch");

        assert_eq!(attended.pages, 2);
        assert_eq!(attended.total, 21);
        assert_eq!(attended.setlists.len(), 21);
        assert!(attended.issues.is_empty());
        assert_eq!(attended.setlists[0].id, "set0000");
        assert_eq!(attended.setlists[20].id, "set0020");

        assert_eq!(transport.requested_pages(), vec!["p=1", "p=2"]);
        let calls = transport.calls.borrow();
        assert!(calls.iter().all(|(_, key, _)| key == "key-123"));
        let gap = calls[1].2.duration_since(calls[0].2);
        assert!(gap >= Duration::from_millis(150), "gap was {gap:?}");
    }

    #[test]
    fn historical_page_math_stops_after_first_page() {
        // 21 records at 20 per page: only page 1 is requested and the 21st
        // record is lost. Kept for parity; `PageMath::Ceil` fixes it.
        let transport = two_page_transport();
        let settings = test_settings(PageMath::Inverted, Duration::ZERO);

        let attended = fetch_attended(&settings, &transport).expect("fetch");

        assert_eq!(attended.pages, 1);
        assert_eq!(attended.setlists.len(), 20);
        assert_eq!(transport.requested_pages(), vec!["p=1"]);
    }

    #[test]
    fn short_listing_reports_the_page_already_fetched() {
        // Inverted math gives 0 pages for 5 records at 20 per page.
        let mut pages = HashMap::new();
        pages.insert(1, Ok(page_body(1, 5, 20, 0..5)));
        let transport = ScriptedTransport::new(pages);
        let settings = test_settings(PageMath::Inverted, Duration::ZERO);

        let attended = fetch_attended(&settings, &transport).expect("fetch");

        assert_eq!(attended.pages, 1);
        assert_eq!(attended.setlists.len(), 5);
        assert_eq!(transport.requested_pages(), vec!["p=1"]);
    }

    #[test]
    fn later_page_failure_is_recorded_and_skipped() {
        let mut pages = HashMap::new();
        pages.insert(1, Ok(page_body(1, 50, 20, 0..20)));
        pages.insert(2, Err(503));
        pages.insert(3, Ok(page_body(3, 50, 20, 40..50)));
        let transport = ScriptedTransport::new(pages);
        let settings = test_settings(PageMath::Ceil, Duration::ZERO);

        let attended = fetch_attended(&settings, &transport).expect("fetch");

        assert_eq!(transport.requested_pages(), vec!["p=1", "p=2", "p=3"]);
        assert_eq!(attended.setlists.len(), 30);
        assert_eq!(attended.issues.len(), 1);
        assert!(matches!(
            attended.issues[0],
            Issue::Fetch {
                page: 2,
                source: FetchError::Status { status: 503, .. }
            }
        ));
    }

    #[test]
    fn malformed_later_page_is_a_parse_issue() {
        let mut pages = HashMap::new();
        pages.insert(1, Ok(page_body(1, 40, 20, 0..20)));
        pages.insert(2, Ok("<html>oops</html>".to_string()));
        let transport = ScriptedTransport::new(pages);
        let settings = test_settings(PageMath::Ceil, Duration::ZERO);

        let attended = fetch_attended(&settings, &transport).expect("fetch");

        assert_eq!(attended.setlists.len(), 20);
        assert!(matches!(
            attended.issues[0],
            Issue::Fetch {
                page: 2,
                source: FetchError::Parse(_)
            }
        ));
    }

    #[test]
    fn first_page_failure_is_fatal() {
        let mut pages = HashMap::new();
        pages.insert(1, Err(401));
        let transport = ScriptedTransport::new(pages);
        let settings = test_settings(PageMath::Ceil, Duration::ZERO);

        let err = fetch_attended(&settings, &transport).expect_err("fatal");
        assert!(matches!(err, FetchError::Status { status: 401, .. }));
        assert_eq!(transport.requested_pages(), vec!["p=1"]);
    }

    /// Answers one request on a local port with `status` and `body`, and
    /// hands back the raw request head it received.
    fn serve_once(status: &'static str, body: &'static str) -> (Url, JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
        let url = Url::parse(&format!("http://{}/", listener.local_addr().expect("addr")))
            .expect("listener url");
        let handle = thread::spawn(move || {
            let (mut stream, _) = listener.accept().expect("accept");
            let mut head = Vec::new();
            let mut buf = [0u8; 1024];
            while !head.windows(4).any(|w| w == b"\r\n\r\n") {
                let read = stream.read(&mut buf).expect("read request");
                if read == 0 {
                    break;
                }
                head.extend_from_slice(&buf[..read]);
            }
            let response = format!(
                "HTTP/1.1 {status}\r\nContent-Type: application/json\r\n\
                 Content-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            );
            stream
                .write_all(response.as_bytes())
                .expect("write response");
            String::from_utf8_lossy(&head).to_lowercase()
        });
        (url, handle)
    }

    fn local_transport() -> HttpTransport {
        HttpTransport::with_client(Client::builder().no_proxy().build().expect("client"))
    }

    #[test]
    fn http_transport_sends_accept_and_api_key_headers() {
        let (base, server) = serve_once("200 OK", r#"{"total":0,"setlist":[]}"#);
        let url = page_url(base.as_str(), "concertgoer", 1).expect("url");

        let body = local_transport().get(&url, "key-123").expect("get");
        let head = server.join().expect("server thread");

        assert_eq!(body, r#"{"total":0,"setlist":[]}"#);
        assert!(head.starts_with("get /rest/1.0/user/concertgoer/attended?p=1 http/1.1"));
        assert!(head.contains("\r\naccept: application/json\r\n"), "{head}");
        assert!(head.contains("\r\nx-api-key: key-123\r\n"), "{head}");
    }

    #[test]
    fn http_transport_maps_error_status() {
        let (base, server) = serve_once("404 Not Found", r#"{"message":"not found"}"#);
        let url = page_url(base.as_str(), "nobody", 1).expect("url");

        let err = local_transport().get(&url, "key-123").expect_err("status error");
        server.join().expect("server thread");

        match err {
            FetchError::Status { status, body } => {
                assert_eq!(status, 404);
                assert!(body.contains("not found"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
