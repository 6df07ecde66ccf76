//! Application state shared across handlers.

use std::sync::Arc;

use techbazaar_core::ShippingPolicy;

use crate::config::StorefrontConfig;
use crate::db::Store;
use crate::services::cart::CartService;
use crate::services::orders::OrderService;
use crate::services::wishlist::WishlistService;
use crate::services::{Catalog, Notifier, PaymentGateway};

/// Application state shared across all handlers.
///
/// This struct is cheaply cloneable via `Arc` and provides access to
/// shared resources like the store, the gateway client and configuration.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: StorefrontConfig,
    store: Arc<dyn Store>,
    catalog: Catalog,
    gateway: Arc<dyn PaymentGateway>,
    notifier: Arc<dyn Notifier>,
}

impl AppState {
    /// Create a new application state.
    ///
    /// # Arguments
    ///
    /// * `config` - Storefront configuration
    /// * `store` - Persistence backend
    /// * `gateway` - Payment gateway client
    /// * `notifier` - Receipt delivery
    #[must_use]
    pub fn new(
        config: StorefrontConfig,
        store: Arc<dyn Store>,
        gateway: Arc<dyn PaymentGateway>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let catalog = Catalog::new(Arc::clone(&store));

        Self {
            inner: Arc::new(AppStateInner {
                config,
                store,
                catalog,
                gateway,
                notifier,
            }),
        }
    }

    /// Get a reference to the storefront configuration.
    #[must_use]
    pub fn config(&self) -> &StorefrontConfig {
        &self.inner.config
    }

    /// Get a reference to the store.
    #[must_use]
    pub fn store(&self) -> &dyn Store {
        self.inner.store.as_ref()
    }

    /// Get a reference to the catalog.
    #[must_use]
    pub fn catalog(&self) -> &Catalog {
        &self.inner.catalog
    }

    /// Get a reference to the payment gateway client.
    #[must_use]
    pub fn gateway(&self) -> &dyn PaymentGateway {
        self.inner.gateway.as_ref()
    }

    /// Get a reference to the configured shipping policy.
    #[must_use]
    pub fn shipping(&self) -> &ShippingPolicy {
        &self.inner.config.shipping
    }

    /// Cart operations for this request.
    #[must_use]
    pub fn cart(&self) -> CartService<'_> {
        CartService::new(self.store(), self.catalog(), self.shipping())
    }

    /// Wishlist operations for this request.
    #[must_use]
    pub fn wishlist(&self) -> WishlistService<'_> {
        WishlistService::new(self.store(), self.catalog())
    }

    /// Order operations for this request.
    #[must_use]
    pub fn orders(&self) -> OrderService<'_> {
        OrderService::new(
            self.store(),
            self.catalog(),
            self.shipping(),
            self.inner.notifier.as_ref(),
        )
    }
}
