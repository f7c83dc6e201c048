pub mod cart;
pub mod checkout;
pub mod common;
pub mod orders;
pub mod products;
pub mod webhooks;

use crate::db::DbPool;
use crate::events::EventSender;
use crate::payments::PaymentProvider;
use std::sync::Arc;

// Re-export AppState so handler modules can import it as crate::handlers::AppState
pub use crate::AppState;

/// Services layer that encapsulates business logic used by HTTP handlers
#[derive(Clone)]
pub struct AppServices {
    pub catalog: Arc<crate::services::catalog::ProductCatalogService>,
    pub cart: Arc<crate::services::cart::CartService>,
    pub checkout: Arc<crate::services::checkout::CheckoutService>,
    pub finalizer: Arc<crate::services::finalizer::OrderFinalizer>,
    pub orders: Arc<crate::services::orders::OrderQueryService>,
}

impl AppServices {
    /// Wires the service graph. The payment provider arrives as a trait
    /// object so tests can substitute a scripted double.
    pub fn new(
        db_pool: Arc<DbPool>,
        event_sender: Arc<EventSender>,
        provider: Arc<dyn PaymentProvider>,
        client_url: String,
    ) -> Self {
        let catalog = Arc::new(crate::services::catalog::ProductCatalogService::new(
            db_pool.clone(),
            event_sender.clone(),
        ));
        let cart = Arc::new(crate::services::cart::CartService::new(
            db_pool.clone(),
            event_sender.clone(),
        ));
        let checkout = Arc::new(crate::services::checkout::CheckoutService::new(
            cart.clone(),
            provider.clone(),
            event_sender.clone(),
            client_url,
        ));
        let finalizer = Arc::new(crate::services::finalizer::OrderFinalizer::new(
            db_pool.clone(),
            provider,
            cart.clone(),
            event_sender,
        ));
        let orders = Arc::new(crate::services::orders::OrderQueryService::new(db_pool));

        Self {
            catalog,
            cart,
            checkout,
            finalizer,
            orders,
        }
    }
}
