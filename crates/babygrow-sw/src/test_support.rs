//! Scripted network for unit tests.

use std::sync::Mutex;

use hashbrown::HashMap;
use http::StatusCode;
use url::Url;

use crate::error::SwError;
use crate::net::Fetcher;
use crate::request::{Request, Response};

/// Answers from a route table; unknown URLs fail like an unreachable host.
#[derive(Default)]
pub struct MockNetwork {
    /// Final URL, status and body; `None` fails like an unreachable host.
    routes: Mutex<HashMap<String, Option<(Url, StatusCode, String)>>>,
    calls: Mutex<Vec<String>>,
}

impl MockNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(&self, url: &str, status: StatusCode, body: &str) {
        self.redirect(url, url, status, body);
    }

    /// Answer `url` with a response that ended up at `target`, as a followed
    /// redirect does.
    pub fn redirect(&self, url: &str, target: &str, status: StatusCode, body: &str) {
        let target = Url::parse(target).unwrap();
        self.routes
            .lock()
            .unwrap()
            .insert(url.to_string(), Some((target, status, body.to_string())));
    }

    pub fn fail(&self, url: &str) {
        self.routes.lock().unwrap().insert(url.to_string(), None);
    }

    /// Answer every URL in `urls` with `200 OK` and the URL as body.
    pub fn serve_all<'a>(&self, urls: impl IntoIterator<Item = &'a Url>) {
        for url in urls {
            self.respond(url.as_str(), StatusCode::OK, url.as_str());
        }
    }

    pub fn calls_to(&self, url: &str) -> usize {
        self.calls.lock().unwrap().iter().filter(|u| *u == url).count()
    }

    pub fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait::async_trait]
impl Fetcher for MockNetwork {
    async fn fetch(&self, request: &Request) -> Result<Response, SwError> {
        let url = request.url.to_string();
        self.calls.lock().unwrap().push(url.clone());
        let route = self.routes.lock().unwrap().get(&url).cloned().flatten();
        match route {
            Some((target, status, body)) => Ok(Response::new(target, status, body)),
            None => Err(SwError::network(format!("unreachable: {url}"))),
        }
    }
}
