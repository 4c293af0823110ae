use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio::time::timeout;
use tracing::info;

pub mod config;
use config::LOCK_TIMEOUT;

/// A catalogue entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub id: u64,
    pub name: String,
    pub price: f64,
    pub stock: u32,
}

/// Body of POST /products and PUT /products/:id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewProduct {
    pub name: String,
    pub price: f64,
    pub stock: u32,
}

/// Body of PUT /products/update. Without an id, or with an unknown one, a new product is stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductUpsert {
    #[serde(default)]
    pub id: Option<u64>,
    pub name: String,
    pub price: f64,
    pub stock: u32,
}

/// JSON envelope for every error response.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// JSON envelope for informational responses.
#[derive(Debug, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

#[derive(Debug, Default)]
pub struct Catalog {
    pub products: BTreeMap<u64, Product>,
    pub next_id: u64,
}

impl Catalog {
    pub fn insert(&mut self, product: NewProduct) -> Product {
        self.next_id += 1;
        let product = Product {
            id: self.next_id,
            name: product.name,
            price: product.price,
            stock: product.stock,
        };
        self.products.insert(product.id, product.clone());
        product
    }

    /// A few products so GET /products answers 200 out of the box.
    pub fn seeded() -> Self {
        let mut catalog = Catalog::default();
        for (name, price, stock) in [("Keyboard", 49.9, 120), ("Mouse", 19.5, 300), ("Monitor", 189.0, 40)] {
            catalog.insert(NewProduct { name: name.to_string(), price, stock });
        }
        catalog
    }
}

#[derive(Clone)]
pub struct AppState {
    pub catalog: Arc<RwLock<Catalog>>,
}

impl AppState {
    pub fn new(catalog: Catalog) -> Self {
        Self { catalog: Arc::new(RwLock::new(catalog)) }
    }
}

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub address: SocketAddr,
    /// Start with the demo products instead of an empty catalogue.
    pub seed: bool,
}

/// Demo HTTP target serving an in-memory product catalogue.
pub struct Server {
    config: ServerConfig,
}

impl Server {
    pub fn new(config: ServerConfig) -> Self {
        Self { config }
    }

    pub fn address(&self) -> SocketAddr {
        self.config.address
    }

    /// Create the application router with the given state
    pub fn create_router(state: AppState) -> Router {
        Router::new()
            .route("/", get(handle_root))
            .route("/products", get(handle_list).post(handle_create))
            .route("/products/name", get(handle_search))
            .route("/products/crear", post(handle_create))
            .route("/products/update", put(handle_upsert))
            .route("/products/update/:id", put(handle_update))
            .route(
                "/products/:id",
                get(handle_get).put(handle_update).delete(handle_delete),
            )
            .with_state(state)
    }

    /// Run the server, signalling `ready_tx` with the bound address once accepting connections
    pub async fn run(self, ready_tx: tokio::sync::oneshot::Sender<SocketAddr>) -> Result<(), Box<dyn std::error::Error>> {
        let catalog = if self.config.seed { Catalog::seeded() } else { Catalog::default() };
        let app = Self::create_router(AppState::new(catalog));
        let listener = tokio::net::TcpListener::bind(self.config.address).await?;
        let local_addr = listener.local_addr()?;
        info!(addr = %local_addr, "target listening");
        ready_tx.send(local_addr).ok();
        axum::serve(listener, app).await?;
        Ok(())
    }
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(ErrorResponse { error: message.into() })).into_response()
}

fn lock_timeout() -> Response {
    error_response(StatusCode::SERVICE_UNAVAILABLE, "Server error: Lock acquisition timed out")
}

fn product_not_found(id: u64) -> Response {
    error_response(StatusCode::NOT_FOUND, format!("Product not found: {}", id))
}

/// Handler for GET /, which is not a resource.
pub async fn handle_root() -> Response {
    Json(MessageResponse { message: "Route not accessible".to_string() }).into_response()
}

/// Handler for GET /products: all products, 404 when the catalogue is empty.
pub async fn handle_list(State(state): State<AppState>) -> Response {
    let catalog = match timeout(LOCK_TIMEOUT, state.catalog.read()).await {
        Ok(guard) => guard,
        Err(_) => return lock_timeout(),
    };

    if catalog.products.is_empty() {
        return error_response(StatusCode::NOT_FOUND, "No products found");
    }
    Json(catalog.products.values().cloned().collect::<Vec<_>>()).into_response()
}

/// Handler for GET /products/:id
pub async fn handle_get(State(state): State<AppState>, Path(id): Path<u64>) -> Response {
    let catalog = match timeout(LOCK_TIMEOUT, state.catalog.read()).await {
        Ok(guard) => guard,
        Err(_) => return lock_timeout(),
    };

    match catalog.products.get(&id) {
        Some(product) => Json(product.clone()).into_response(),
        None => product_not_found(id),
    }
}

#[derive(Debug, Deserialize)]
pub struct NameQuery {
    pub name: String,
}

/// Handler for GET /products/name?name=: products whose name contains the query, case-insensitive.
pub async fn handle_search(State(state): State<AppState>, Query(query): Query<NameQuery>) -> Response {
    let catalog = match timeout(LOCK_TIMEOUT, state.catalog.read()).await {
        Ok(guard) => guard,
        Err(_) => return lock_timeout(),
    };

    let needle = query.name.to_lowercase();
    let matches: Vec<Product> = catalog
        .products
        .values()
        .filter(|p| p.name.to_lowercase().contains(&needle))
        .cloned()
        .collect();
    if matches.is_empty() {
        return error_response(StatusCode::NOT_FOUND, format!("No products named like: {}", query.name));
    }
    Json(matches).into_response()
}

/// Handler for POST /products and POST /products/crear. Returns the stored product with its new id.
pub async fn handle_create(State(state): State<AppState>, Json(product): Json<NewProduct>) -> Response {
    let mut catalog = match timeout(LOCK_TIMEOUT, state.catalog.write()).await {
        Ok(guard) => guard,
        Err(_) => return lock_timeout(),
    };

    let product = catalog.insert(product);
    (StatusCode::CREATED, Json(product)).into_response()
}

/// Handler for PUT /products/:id and PUT /products/update/:id. Overwrites an existing product.
pub async fn handle_update(
    State(state): State<AppState>,
    Path(id): Path<u64>,
    Json(update): Json<NewProduct>,
) -> Response {
    let mut catalog = match timeout(LOCK_TIMEOUT, state.catalog.write()).await {
        Ok(guard) => guard,
        Err(_) => return lock_timeout(),
    };

    match catalog.products.get_mut(&id) {
        Some(product) => {
            product.name = update.name;
            product.price = update.price;
            product.stock = update.stock;
            Json(product.clone()).into_response()
        }
        None => product_not_found(id),
    }
}

/// Handler for PUT /products/update. Overwrites the product named by the body's id or stores a new one.
pub async fn handle_upsert(State(state): State<AppState>, Json(upsert): Json<ProductUpsert>) -> Response {
    let mut catalog = match timeout(LOCK_TIMEOUT, state.catalog.write()).await {
        Ok(guard) => guard,
        Err(_) => return lock_timeout(),
    };

    let fields = NewProduct { name: upsert.name, price: upsert.price, stock: upsert.stock };
    if let Some(product) = upsert.id.and_then(|id| catalog.products.get_mut(&id)) {
        product.name = fields.name;
        product.price = fields.price;
        product.stock = fields.stock;
        return Json(product.clone()).into_response();
    }
    Json(catalog.insert(fields)).into_response()
}

/// Handler for DELETE /products/:id
pub async fn handle_delete(State(state): State<AppState>, Path(id): Path<u64>) -> Response {
    let mut catalog = match timeout(LOCK_TIMEOUT, state.catalog.write()).await {
        Ok(guard) => guard,
        Err(_) => return lock_timeout(),
    };

    match catalog.products.remove(&id) {
        Some(_) => Json(MessageResponse { message: format!("Product deleted: {}", id) }).into_response(),
        None => product_not_found(id),
    }
}
