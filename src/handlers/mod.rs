pub mod checkout;
pub mod orders;
pub mod webhooks;

use std::sync::Arc;

use crate::config::AppConfig;
use crate::db::DbPool;
use crate::events::EventSender;
use crate::payments::PaymentGateway;
use crate::services::{
    checkout::CheckoutService, orders::OrderService, reconciliation::ReconciliationService,
};

/// Services layer that encapsulates business logic used by HTTP handlers.
#[derive(Clone)]
pub struct AppServices {
    pub orders: Arc<OrderService>,
    pub checkout: Arc<CheckoutService>,
    pub reconciliation: Arc<ReconciliationService>,
}

impl AppServices {
    pub fn new(
        db: Arc<DbPool>,
        events: EventSender,
        gateway: Arc<dyn PaymentGateway>,
        config: &AppConfig,
    ) -> Self {
        let orders = Arc::new(OrderService::new(db.clone(), events.clone()));
        let checkout = Arc::new(CheckoutService::new(
            gateway,
            orders.clone(),
            config.stripe.clone(),
        ));
        let reconciliation = Arc::new(ReconciliationService::new(db, events));
        Self {
            orders,
            checkout,
            reconciliation,
        }
    }
}
