//! Runtime side of a registration: which controller version is installing,
//! waiting, or active, and where each event gets dispatched.

use std::sync::Arc;

use tracing::{info, warn};
use url::Url;

use crate::controller::{
    ActivateOutcome, ClickOutcome, FetchOutcome, InstallOutcome, OfflineCacheController,
    SyncOutcome,
};
use crate::error::SwError;
use crate::host::WorkerHost;
use crate::lifecycle::ExtendLifetime;
use crate::notification::{Notification, NotificationId};
use crate::request::{Request, Response};

/// Result of [`Registration::update`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateOutcome {
    pub install: InstallOutcome,
    /// Set when the new version was activated right away.
    pub activation: Option<ActivateOutcome>,
}

/// A fetch answered on behalf of a page.
#[derive(Debug)]
pub struct DispatchedFetch {
    pub response: Response,
    /// Work the fetch event must outlive.
    pub lifetime: ExtendLifetime,
}

/// A registration for one scope.
#[derive(Debug)]
pub struct Registration {
    scope: Url,
    host: WorkerHost,
    installing: Option<Arc<OfflineCacheController>>,
    waiting: Option<Arc<OfflineCacheController>>,
    active: Option<Arc<OfflineCacheController>>,
}

impl Registration {
    pub fn new(scope: Url, host: WorkerHost) -> Self {
        Self {
            scope,
            host,
            installing: None,
            waiting: None,
            active: None,
        }
    }

    pub fn scope(&self) -> &Url {
        &self.scope
    }

    pub fn host(&self) -> &WorkerHost {
        &self.host
    }

    pub fn installing(&self) -> Option<&Arc<OfflineCacheController>> {
        self.installing.as_ref()
    }

    pub fn waiting(&self) -> Option<&Arc<OfflineCacheController>> {
        self.waiting.as_ref()
    }

    pub fn active(&self) -> Option<&Arc<OfflineCacheController>> {
        self.active.as_ref()
    }

    /// Version name of the active controller.
    pub fn active_version(&self) -> Option<&str> {
        self.active.as_ref().map(|c| c.version())
    }

    /// Install a new controller version.
    ///
    /// On install failure the new version is discarded and the active one
    /// stays in control. On success it waits, or is activated right away if
    /// it asked to skip waiting.
    pub async fn update(&mut self, controller: OfflineCacheController) -> Result<UpdateOutcome, SwError> {
        let controller = Arc::new(controller);
        info!(scope = %self.scope, version = %controller.version(), "Installing new controller");
        self.installing = Some(Arc::clone(&controller));

        let result = controller.install().await;
        self.installing = None;

        let install = match result {
            Ok(install) => install,
            Err(e) => {
                warn!(
                    version = %controller.version(),
                    active = ?self.active_version(),
                    error = %e,
                    "Install failed, keeping current controller"
                );
                return Err(e);
            }
        };

        if let Some(previous) = self.waiting.replace(controller) {
            previous.mark_redundant().await;
        }

        let activation = if install.skip_waiting {
            Some(self.activate_waiting().await?)
        } else {
            None
        };

        Ok(UpdateOutcome {
            install,
            activation,
        })
    }

    /// Promote the waiting controller. The previous active one becomes redundant.
    pub async fn activate_waiting(&mut self) -> Result<ActivateOutcome, SwError> {
        let next = self
            .waiting
            .take()
            .ok_or_else(|| SwError::state("no waiting controller"))?;

        if let Some(old) = self.active.take() {
            info!(old = %old.version(), new = %next.version(), "Replacing active controller");
            old.mark_redundant().await;
        }

        let outcome = next.activate().await;
        self.active = Some(next);
        Ok(outcome)
    }

    /// Drop every controller version.
    pub async fn unregister(&mut self) {
        for controller in [self.installing.take(), self.waiting.take(), self.active.take()]
            .into_iter()
            .flatten()
        {
            controller.mark_redundant().await;
        }
        info!(scope = %self.scope, "Registration removed");
    }

    fn require_active(&self) -> Result<&Arc<OfflineCacheController>, SwError> {
        self.active
            .as_ref()
            .ok_or_else(|| SwError::state("no active controller"))
    }

    /// Answer a page request. Requests the controller does not handle, or
    /// any request while nothing is active, go straight to the network.
    pub async fn dispatch_fetch(&self, request: &Request) -> Result<DispatchedFetch, SwError> {
        let Some(active) = self.active.as_ref() else {
            let response = self.host.network.fetch(request).await?;
            return Ok(DispatchedFetch {
                response,
                lifetime: ExtendLifetime::new(),
            });
        };

        let handled = active.handle_fetch(request).await?;
        let response = match handled.outcome {
            FetchOutcome::Respond(response) => response,
            FetchOutcome::Passthrough(_) => self.host.network.fetch(request).await?,
        };
        Ok(DispatchedFetch {
            response,
            lifetime: handled.lifetime,
        })
    }

    pub async fn dispatch_sync(&self, tag: &str) -> Result<SyncOutcome, SwError> {
        self.require_active()?.handle_sync(tag).await
    }

    pub async fn dispatch_push(&self, data: Option<&[u8]>) -> Result<Notification, SwError> {
        Ok(self.require_active()?.handle_push(data).await)
    }

    pub async fn dispatch_notification_click(
        &self,
        id: NotificationId,
        action: Option<&str>,
    ) -> Result<ClickOutcome, SwError> {
        self.require_active()?
            .handle_notification_click(id, action)
            .await
    }
}
