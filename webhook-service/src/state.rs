use crate::auth::token_file::TokenFileAuthenticator;
use crate::auth::Authenticator;
use crate::authz::{Authorizer, DecisionStore, MemoryStore};
use crate::orgs::{auth_orgs, authz_orgs, OrgRegistry};
use metrics_exporter_prometheus::PrometheusHandle;
use std::collections::HashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Everything a request handler needs. Assembled once before serving and
/// never mutated afterwards.
#[derive(Clone)]
pub struct AppState {
    pub auth_orgs: Arc<OrgRegistry>,
    pub authz_orgs: Arc<OrgRegistry>,
    pub authenticators: Arc<HashMap<&'static str, Arc<dyn Authenticator>>>,
    pub token_file: Option<Arc<TokenFileAuthenticator>>,
    pub authorizers: Arc<HashMap<&'static str, Arc<dyn Authorizer>>>,
    pub decision_store: Arc<dyn DecisionStore>,
    pub shutdown: CancellationToken,
    pub metrics: Option<PrometheusHandle>,
}

impl AppState {
    pub fn builder() -> AppStateBuilder {
        AppStateBuilder::default()
    }

    pub fn authenticator(&self, org: &str) -> Option<Arc<dyn Authenticator>> {
        let tag = self.auth_orgs.resolve(org)?;
        self.authenticators.get(tag).cloned()
    }

    pub fn authorizer(&self, org: &str) -> Option<Arc<dyn Authorizer>> {
        let tag = self.authz_orgs.resolve(org)?;
        self.authorizers.get(tag).cloned()
    }
}

#[derive(Default)]
pub struct AppStateBuilder {
    authenticators: HashMap<&'static str, Arc<dyn Authenticator>>,
    token_file: Option<Arc<TokenFileAuthenticator>>,
    authorizers: HashMap<&'static str, Arc<dyn Authorizer>>,
    decision_store: Option<Arc<dyn DecisionStore>>,
    shutdown: Option<CancellationToken>,
    metrics: Option<PrometheusHandle>,
}

impl AppStateBuilder {
    pub fn authenticator(mut self, authenticator: Arc<dyn Authenticator>) -> Self {
        self.authenticators.insert(authenticator.uid(), authenticator);
        self
    }

    /// Enable the static token provider. Its table is also consulted ahead
    /// of every other provider.
    pub fn token_file(mut self, token_file: Arc<TokenFileAuthenticator>) -> Self {
        self.authenticators.insert(token_file.uid(), token_file.clone());
        self.token_file = Some(token_file);
        self
    }

    pub fn authorizer(mut self, authorizer: Arc<dyn Authorizer>) -> Self {
        self.authorizers.insert(authorizer.uid(), authorizer);
        self
    }

    pub fn decision_store(mut self, store: Arc<dyn DecisionStore>) -> Self {
        self.decision_store = Some(store);
        self
    }

    pub fn shutdown(mut self, token: CancellationToken) -> Self {
        self.shutdown = Some(token);
        self
    }

    pub fn metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }

    pub fn build(self) -> AppState {
        AppState {
            auth_orgs: Arc::new(auth_orgs()),
            authz_orgs: Arc::new(authz_orgs()),
            authenticators: Arc::new(self.authenticators),
            token_file: self.token_file,
            authorizers: Arc::new(self.authorizers),
            decision_store: self
                .decision_store
                .unwrap_or_else(|| Arc::new(MemoryStore::default())),
            shutdown: self.shutdown.unwrap_or_default(),
            metrics: self.metrics,
        }
    }
}
