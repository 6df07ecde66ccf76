//! Integration tests for the TechBazaar storefront.
//!
//! Each test spawns the full storefront router on an ephemeral port, backed
//! by the in-memory store and an in-memory session store, and drives it
//! over HTTP with `reqwest` like a browser would.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p techbazaar-integration-tests
//! ```
//!
//! No database or gateway account is needed. Sign-in goes through a
//! test-only `POST /test/login` route that calls the same sign-in hook as
//! the real login flow.

#![cfg_attr(not(test), forbid(unsafe_code))]
#![allow(clippy::missing_panics_doc, clippy::must_use_candidate)]

use std::net::{IpAddr, Ipv4Addr};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::{Form, Json, extract::State, routing::post};
use reqwest::{Client, Response, StatusCode, redirect::Policy};
use secrecy::SecretString;
use serde::Deserialize;
use tower_sessions::Session;
use url::Url;

use techbazaar_core::{AccountId, Email, Money, OrderNumber, ShippingPolicy};
use techbazaar_storefront::config::{SslCommerzConfig, StorefrontConfig};
use techbazaar_storefront::db::{MemoryStore, Store};
use techbazaar_storefront::error::AppError;
use techbazaar_storefront::middleware::create_session_layer;
use techbazaar_storefront::models::{CurrentUser, NewProduct, NewVariation, Order, Product};
use techbazaar_storefront::routes::routes;
use techbazaar_storefront::services::accounts;
use techbazaar_storefront::services::cart::MergeSummary;
use techbazaar_storefront::services::payment::{CallbackUrls, GatewayError, SSLCOMMERZ_METHOD};
use techbazaar_storefront::services::{LogNotifier, PaymentGateway, SslCommerzClient};
use techbazaar_storefront::state::AppState;

/// Base of the payment pages handed out by [`FakeGateway`].
pub const FAKE_GATEWAY_PAGE: &str = "https://pay.example.test/session/";

/// A gateway that opens sessions without leaving the process.
#[derive(Debug, Default)]
pub struct FakeGateway {
    opened: Mutex<Vec<OrderNumber>>,
    refuse: AtomicBool,
}

impl FakeGateway {
    /// Make every following session request fail.
    pub fn refuse_sessions(&self, refuse: bool) {
        self.refuse.store(refuse, Ordering::SeqCst);
    }

    /// Orders a session was opened for, in order.
    pub fn opened(&self) -> Vec<OrderNumber> {
        self.opened.lock().expect("gateway lock poisoned").clone()
    }
}

#[async_trait]
impl PaymentGateway for FakeGateway {
    fn method_name(&self) -> &str {
        SSLCOMMERZ_METHOD
    }

    async fn init_session(&self, order: &Order) -> Result<Url, GatewayError> {
        if self.refuse.load(Ordering::SeqCst) {
            return Err(GatewayError::Rejected("Store is De-active".to_string()));
        }
        self.opened
            .lock()
            .expect("gateway lock poisoned")
            .push(order.order_number.clone());
        Url::parse(&format!("{FAKE_GATEWAY_PAGE}{}", order.order_number))
            .map_err(|e| GatewayError::Rejected(e.to_string()))
    }
}

/// Configuration for a storefront served at `base_url`.
pub fn test_config(base_url: Url) -> StorefrontConfig {
    StorefrontConfig {
        database_url: SecretString::from("postgres://unused@localhost/techbazaar_test"),
        host: IpAddr::V4(Ipv4Addr::LOCALHOST),
        port: base_url.port().unwrap_or(80),
        base_url,
        session_secret: SecretString::from("integration-test-session-secret-4f9c2a7e1b"),
        sslcommerz: SslCommerzConfig {
            store_id: "techbazaar-test".to_string(),
            store_password: SecretString::from("store-password"),
            api_url: Url::parse("http://127.0.0.1:9/gwprocess/v4/api.php")
                .expect("valid sandbox url"),
            timeout_secs: 2,
        },
        shipping: ShippingPolicy::default(),
        sentry_dsn: None,
        sentry_environment: "test".to_string(),
    }
}

#[derive(Debug, Deserialize)]
struct LoginForm {
    account_id: i64,
    email: String,
}

/// Test-only sign-in: trusts the posted account and runs the sign-in hook.
async fn login(
    State(state): State<AppState>,
    session: Session,
    Form(form): Form<LoginForm>,
) -> Result<Json<MergeSummary>, AppError> {
    let email = Email::parse(&form.email).map_err(|e| AppError::BadRequest(e.to_string()))?;
    let user = CurrentUser {
        id: AccountId::new(form.account_id),
        email,
    };
    Ok(Json(accounts::sign_in(&session, &state.cart(), user).await?))
}

/// A running storefront.
pub struct TestApp {
    pub base_url: Url,
    pub store: MemoryStore,
    pub gateway: Arc<FakeGateway>,
}

impl TestApp {
    /// Serve the storefront with a [`FakeGateway`].
    pub async fn spawn() -> Self {
        let gateway = Arc::new(FakeGateway::default());
        let for_state: Arc<dyn PaymentGateway> = gateway.clone();
        Self::serve(gateway, move |_| for_state).await
    }

    /// Serve the storefront with the real SSLCommerz client pointed at
    /// `api_url`.
    pub async fn spawn_with_sslcommerz(api_url: Url) -> Self {
        Self::serve(Arc::new(FakeGateway::default()), move |config| {
            let mut sslcommerz = config.sslcommerz.clone();
            sslcommerz.api_url = api_url;
            let callbacks = CallbackUrls::from_base(&config.base_url).expect("callback urls");
            let client: Arc<dyn PaymentGateway> =
                Arc::new(SslCommerzClient::new(&sslcommerz, callbacks).expect("gateway client"));
            client
        })
        .await
    }

    async fn serve<F>(gateway: Arc<FakeGateway>, make_gateway: F) -> Self
    where
        F: FnOnce(&StorefrontConfig) -> Arc<dyn PaymentGateway>,
    {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind test listener");
        let addr = listener.local_addr().expect("listener address");
        let base_url = Url::parse(&format!("http://{addr}")).expect("valid base url");

        let config = test_config(base_url.clone());
        let store = MemoryStore::new();
        let sessions = create_session_layer(tower_sessions::MemoryStore::default(), &config);
        let payment_gateway = make_gateway(&config);
        let state = AppState::new(
            config,
            Arc::new(store.clone()),
            payment_gateway,
            Arc::new(LogNotifier),
        );

        let router = routes()
            .route("/test/login", post(login))
            .layer(sessions)
            .with_state(state);
        tokio::spawn(async move {
            axum::serve(listener, router)
                .await
                .expect("Test server failed");
        });

        Self {
            base_url,
            store,
            gateway,
        }
    }

    /// Absolute URL for `path`.
    pub fn url(&self, path: &str) -> Url {
        self.base_url.join(path).expect("valid path")
    }

    /// A new browser with its own cookie jar.
    pub fn shopper(&self) -> Shopper {
        Shopper {
            client: Client::builder()
                .cookie_store(true)
                .redirect(Policy::none())
                .build()
                .expect("Failed to create HTTP client"),
            base_url: self.base_url.clone(),
        }
    }

    /// The gateway's server-to-browser POST, which carries no cookies.
    pub async fn gateway_callback(&self, kind: &str, form: &[(&str, &str)]) -> Response {
        Client::builder()
            .redirect(Policy::none())
            .build()
            .expect("Failed to create HTTP client")
            .post(self.url(&format!("/orders/payment/{kind}")))
            .form(form)
            .send()
            .await
            .expect("Failed to post callback")
    }

    /// Insert a product straight into the store.
    pub async fn add_product(&self, product: NewProduct) -> Product {
        let mut tx = self.store.begin().await.expect("begin");
        let product = tx.insert_product(product).await.expect("insert product");
        tx.commit().await.expect("commit");
        product
    }

    /// Current state of a product.
    pub async fn product(&self, product: &Product) -> Product {
        self.store
            .product(product.id)
            .await
            .expect("read product")
            .expect("product exists")
    }

    /// Current state of an order.
    pub async fn order(&self, number: &OrderNumber) -> Order {
        self.store
            .order_by_number(number)
            .await
            .expect("read order")
            .expect("order exists")
    }
}

/// A product with whole-taka `price` and the given variations.
pub fn new_product(name: &str, price: i64, stock: u32, variations: &[(&str, &str)]) -> NewProduct {
    NewProduct {
        name: name.to_string(),
        slug: name.to_lowercase().replace(' ', "-"),
        price: Money::from_units(price),
        stock,
        is_available: true,
        variations: variations
            .iter()
            .map(|(category, value)| NewVariation {
                category: (*category).to_string(),
                value: (*value).to_string(),
            })
            .collect(),
    }
}

/// A filled-in checkout form.
pub fn contact_form(email: &str) -> Vec<(&'static str, String)> {
    vec![
        ("first_name", "Nusrat".to_string()),
        ("last_name", "Jahan".to_string()),
        ("phone", "01711000000".to_string()),
        ("email", email.to_string()),
        ("address_line_1", "House 12, Road 5, Dhanmondi".to_string()),
        ("city", "Dhaka".to_string()),
        ("state", "Dhaka".to_string()),
        ("country", "Bangladesh".to_string()),
    ]
}

/// One browser session against a [`TestApp`].
pub struct Shopper {
    client: Client,
    base_url: Url,
}

impl Shopper {
    fn url(&self, path: &str) -> Url {
        self.base_url.join(path).expect("valid path")
    }

    pub async fn get(&self, path: &str) -> Response {
        self.client
            .get(self.url(path))
            .send()
            .await
            .expect("Failed to send GET")
    }

    pub async fn post<T: serde::Serialize + ?Sized>(&self, path: &str, form: &T) -> Response {
        self.client
            .post(self.url(path))
            .form(form)
            .send()
            .await
            .expect("Failed to send POST")
    }

    /// Sign in as `account_id`, merging any guest cart.
    pub async fn sign_in(&self, account_id: i64, email: &str) -> serde_json::Value {
        let resp = self
            .post(
                "/test/login",
                &[("account_id", account_id.to_string()), ("email", email.to_string())],
            )
            .await;
        assert_eq!(resp.status(), StatusCode::OK, "sign-in failed");
        resp.json().await.expect("merge summary")
    }

    /// Add a selection to the cart; `quantity` of `None` adds one unit.
    pub async fn add_to_cart(
        &self,
        product: &Product,
        selection: &[(&str, &str)],
        quantity: Option<u32>,
    ) -> Response {
        let mut form: Vec<(String, String)> = selection
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        if let Some(quantity) = quantity {
            form.push(("quantity".to_string(), quantity.to_string()));
        }
        self.post(&format!("/cart/add/{}", product.id), &form).await
    }

    pub async fn cart(&self) -> serde_json::Value {
        let resp = self.get("/cart").await;
        assert_eq!(resp.status(), StatusCode::OK);
        resp.json().await.expect("cart json")
    }

    /// Place an order from the cart, expecting success.
    pub async fn place_order(&self, email: &str) -> Order {
        let resp = self.post("/orders/place", &contact_form(email)).await;
        assert_eq!(resp.status(), StatusCode::OK, "placing order failed");
        resp.json().await.expect("order json")
    }

    /// Ask to pay for `order`; returns the raw response.
    pub async fn pay(&self, order: &Order) -> Response {
        self.post("/orders/pay", &[("order_number", order.order_number.as_str())])
            .await
    }
}

/// The `Location` header of a redirect.
pub fn location(resp: &Response) -> String {
    assert!(
        resp.status().is_redirection(),
        "expected redirect, got {}",
        resp.status()
    );
    resp.headers()
        .get(reqwest::header::LOCATION)
        .and_then(|v| v.to_str().ok())
        .expect("Location header")
        .to_string()
}
