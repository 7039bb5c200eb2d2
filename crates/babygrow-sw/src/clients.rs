//! Clients API: the open page instances a controller can see.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use hashbrown::HashMap;
use tokio::sync::RwLock;
use url::Url;

use crate::error::SwError;

/// Clients shared between the runtime and every controller version.
pub type SharedClients = Arc<RwLock<Clients>>;

/// Client identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClientId(String);

impl ClientId {
    fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self(format!("client-{}", COUNTER.fetch_add(1, Ordering::Relaxed)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// A window client (open page).
#[derive(Debug, Clone)]
pub struct Client {
    pub id: ClientId,
    pub url: Url,
    pub focused: bool,
    /// Version name of the controller in charge of this client, if any.
    pub controller: Option<String>,
}

impl Client {
    /// A window client that no controller has claimed yet.
    pub fn window(url: Url) -> Self {
        Self {
            id: ClientId::new(),
            url,
            focused: false,
            controller: None,
        }
    }
}

/// Options for [`Clients::match_all`].
#[derive(Debug, Clone, Default)]
pub struct ClientMatchOptions {
    pub include_uncontrolled: bool,
}

/// All known clients.
#[derive(Debug, Default)]
pub struct Clients {
    clients: HashMap<ClientId, Client>,
}

impl Clients {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap in the shared handle.
    pub fn shared() -> SharedClients {
        Arc::new(RwLock::new(Self::new()))
    }

    pub fn get(&self, id: &ClientId) -> Option<&Client> {
        self.clients.get(id)
    }

    pub fn add(&mut self, client: Client) -> ClientId {
        let id = client.id.clone();
        self.clients.insert(id.clone(), client);
        id
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    /// Clients matching `options`, ordered by id.
    pub fn match_all(&self, options: &ClientMatchOptions) -> Vec<&Client> {
        let mut matched: Vec<&Client> = self
            .clients
            .values()
            .filter(|c| options.include_uncontrolled || c.controller.is_some())
            .collect();
        matched.sort_by(|a, b| a.id.cmp(&b.id));
        matched
    }

    /// Focus a client. Every other client loses focus.
    pub fn focus(&mut self, id: &ClientId) -> Result<Client, SwError> {
        if !self.clients.contains_key(id) {
            return Err(SwError::NotFound(format!("client {}", id.as_str())));
        }

        for other in self.clients.values_mut() {
            other.focused = &other.id == id;
        }
        self.clients
            .get(id)
            .cloned()
            .ok_or_else(|| SwError::NotFound(format!("client {}", id.as_str())))
    }

    /// Open a new focused window at `url`, controlled by `controller` when in scope.
    pub fn open_window(&mut self, url: Url, controller: Option<&str>) -> Client {
        for other in self.clients.values_mut() {
            other.focused = false;
        }
        let client = Client {
            focused: true,
            controller: controller.map(str::to_string),
            ..Client::window(url)
        };
        self.clients.insert(client.id.clone(), client.clone());
        client
    }

    /// Mark every client as controlled by `version`. Returns how many were claimed.
    pub fn claim(&mut self, version: &str) -> usize {
        for client in self.clients.values_mut() {
            client.controller = Some(version.to_string());
        }
        self.clients.len()
    }
}
