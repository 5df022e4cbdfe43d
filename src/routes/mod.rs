// Route exports
pub mod auth;
pub mod discovery;
pub mod error;
pub mod health;
pub mod matches;
pub mod messages;
pub mod photos;
pub mod safety;
pub mod users;

use std::sync::Arc;

use actix_web::web;

use crate::core::{
    Clock, DiscoveryPolicy, EligibilityFilter, GatePolicy, MatchResolver, MessagingGate,
    PhotoService, SafetyPolicy, SafetyService,
};
use crate::services::{Store, SubscriptionService};

/// Application state shared across all handlers
pub struct AppState<S: Store> {
    pub store: Arc<S>,
    pub clock: Arc<dyn Clock>,
    pub eligibility: Arc<EligibilityFilter<S>>,
    pub resolver: Arc<MatchResolver<S>>,
    pub gate: Arc<MessagingGate<S>>,
    pub safety: Arc<SafetyService<S>>,
    pub photos: Arc<PhotoService<S>>,
}

impl<S: Store> Clone for AppState<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            clock: self.clock.clone(),
            eligibility: self.eligibility.clone(),
            resolver: self.resolver.clone(),
            gate: self.gate.clone(),
            safety: self.safety.clone(),
            photos: self.photos.clone(),
        }
    }
}

impl<S: Store> AppState<S> {
    /// Wire the engine components around one store, clock and billing source
    pub fn new(
        store: Arc<S>,
        billing: Arc<dyn SubscriptionService>,
        clock: Arc<dyn Clock>,
        discovery: DiscoveryPolicy,
        gate: GatePolicy,
        safety: SafetyPolicy,
    ) -> Self {
        let eligibility = Arc::new(EligibilityFilter::new(store.clone(), clock.clone(), discovery));
        let resolver = Arc::new(MatchResolver::new(store.clone(), billing, clock.clone()));
        let gate = Arc::new(MessagingGate::new(store.clone(), clock.clone(), gate));
        let safety = Arc::new(SafetyService::new(
            store.clone(),
            resolver.clone(),
            clock.clone(),
            safety,
        ));
        let photos = Arc::new(PhotoService::new(store.clone(), clock.clone()));

        Self {
            store,
            clock,
            eligibility,
            resolver,
            gate,
            safety,
            photos,
        }
    }
}

/// Register every route under `/api/v1`
pub fn configure_routes<S: Store>(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/v1")
            .configure(health::configure::<S>)
            .configure(discovery::configure::<S>)
            .configure(matches::configure::<S>)
            .configure(messages::configure::<S>)
            .configure(safety::configure::<S>)
            .configure(users::configure::<S>)
            .configure(photos::configure::<S>),
    );
}
