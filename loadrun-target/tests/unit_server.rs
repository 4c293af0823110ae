use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::Response;
use axum::Json;
use loadrun_target::{
    handle_create, handle_delete, handle_get, handle_list, handle_root, handle_search, handle_update,
    handle_upsert, ProductUpsert,
    AppState, Catalog, ErrorResponse, MessageResponse, NameQuery, NewProduct, Product, Server,
    ServerConfig,
};
use std::time::Duration;

// --- Test helpers ---

fn empty_catalog() -> AppState {
    AppState::new(Catalog::default())
}

fn seeded_catalog() -> AppState {
    AppState::new(Catalog::seeded())
}

fn new_product(name: &str, price: f64, stock: u32) -> NewProduct {
    NewProduct { name: name.to_string(), price, stock }
}

/// Consume a response body and decode it as JSON.
async fn response_json<T: serde::de::DeserializeOwned>(response: Response) -> T {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

// --- Root ---

#[tokio::test]
async fn test_root_is_not_a_resource() {
    let response = handle_root().await;
    assert_eq!(response.status(), StatusCode::OK);
    let body: MessageResponse = response_json(response).await;
    assert_eq!(body.message, "Route not accessible");
}

// --- List ---

#[tokio::test]
async fn test_list_empty_catalog_returns_404() {
    let response = handle_list(State(empty_catalog())).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body: ErrorResponse = response_json(response).await;
    assert_eq!(body.error, "No products found");
}

#[tokio::test]
async fn test_list_returns_products_in_id_order() {
    let response = handle_list(State(seeded_catalog())).await;
    assert_eq!(response.status(), StatusCode::OK);
    let products: Vec<Product> = response_json(response).await;
    assert_eq!(products.len(), 3);
    assert_eq!(products.iter().map(|p| p.id).collect::<Vec<_>>(), vec![1, 2, 3]);
    assert_eq!(products[0].name, "Keyboard");
}

// --- Get ---

#[tokio::test]
async fn test_get_existing_product() {
    let response = handle_get(State(seeded_catalog()), Path(2)).await;
    assert_eq!(response.status(), StatusCode::OK);
    let product: Product = response_json(response).await;
    assert_eq!(product.name, "Mouse");
    assert_eq!(product.stock, 300);
}

#[tokio::test]
async fn test_get_missing_product_returns_404() {
    let response = handle_get(State(seeded_catalog()), Path(99)).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body: ErrorResponse = response_json(response).await;
    assert_eq!(body.error, "Product not found: 99");
}

// --- Search ---

#[tokio::test]
async fn test_search_matches_case_insensitive_substring() {
    let query = NameQuery { name: "MO".to_string() };
    let response = handle_search(State(seeded_catalog()), Query(query)).await;
    assert_eq!(response.status(), StatusCode::OK);
    let products: Vec<Product> = response_json(response).await;
    let names: Vec<_> = products.iter().map(|p| p.name.as_str()).collect();
    assert_eq!(names, vec!["Mouse", "Monitor"]);
}

#[tokio::test]
async fn test_search_without_match_returns_404() {
    let query = NameQuery { name: "laptop".to_string() };
    let response = handle_search(State(seeded_catalog()), Query(query)).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

// --- Create ---

#[tokio::test]
async fn test_create_assigns_increasing_ids() {
    let state = empty_catalog();

    let first = handle_create(State(state.clone()), Json(new_product("Desk", 250.0, 5))).await;
    assert_eq!(first.status(), StatusCode::CREATED);
    let first: Product = response_json(first).await;

    let second = handle_create(State(state.clone()), Json(new_product("Chair", 99.0, 12))).await;
    let second: Product = response_json(second).await;

    assert_eq!(first.id, 1);
    assert_eq!(second.id, 2);
    assert_eq!(state.catalog.read().await.products.len(), 2);
}

#[tokio::test]
async fn test_create_after_delete_does_not_reuse_id() {
    let state = seeded_catalog();
    handle_delete(State(state.clone()), Path(3)).await;

    let response = handle_create(State(state.clone()), Json(new_product("Webcam", 59.0, 20))).await;
    let product: Product = response_json(response).await;
    assert_eq!(product.id, 4);
}

// --- Update ---

#[tokio::test]
async fn test_update_replaces_fields() {
    let state = seeded_catalog();

    let response = handle_update(State(state.clone()), Path(1), Json(new_product("Keyboard TKL", 39.9, 80))).await;
    assert_eq!(response.status(), StatusCode::OK);

    let stored = state.catalog.read().await.products.get(&1).cloned().unwrap();
    assert_eq!(stored, Product { id: 1, name: "Keyboard TKL".to_string(), price: 39.9, stock: 80 });
}

#[tokio::test]
async fn test_update_missing_product_returns_404() {
    let response = handle_update(State(empty_catalog()), Path(7), Json(new_product("Ghost", 1.0, 1))).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_upsert_with_known_id_overwrites() {
    let state = seeded_catalog();
    let body = ProductUpsert { id: Some(2), name: "Trackball".to_string(), price: 45.0, stock: 10 };

    let response = handle_upsert(State(state.clone()), Json(body)).await;
    assert_eq!(response.status(), StatusCode::OK);
    let product: Product = response_json(response).await;

    assert_eq!(product, Product { id: 2, name: "Trackball".to_string(), price: 45.0, stock: 10 });
    assert_eq!(state.catalog.read().await.products.len(), 3);
}

#[tokio::test]
async fn test_upsert_without_known_id_stores_new_product() {
    let state = seeded_catalog();

    for id in [None, Some(77)] {
        let body = ProductUpsert { id, name: "Speaker".to_string(), price: 30.0, stock: 8 };
        let response = handle_upsert(State(state.clone()), Json(body)).await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    let catalog = state.catalog.read().await;
    assert_eq!(catalog.products.len(), 5);
    assert!(catalog.products.contains_key(&4));
    assert!(catalog.products.contains_key(&5));
    assert!(!catalog.products.contains_key(&77));
}

// --- Routing ---

async fn send(router: axum::Router, method: &str, uri: &str, body: Option<&str>) -> Response {
    use tower::ServiceExt;
    let mut request = axum::http::Request::builder().method(method).uri(uri);
    if body.is_some() {
        request = request.header("content-type", "application/json");
    }
    let request = request.body(axum::body::Body::from(body.unwrap_or("").to_string())).unwrap();
    router.oneshot(request).await.unwrap()
}

#[tokio::test]
async fn test_router_serves_legacy_paths() {
    let state = seeded_catalog();
    let router = Server::create_router(state.clone());
    let new = r#"{"name":"Lamp","price":12.5,"stock":3}"#;

    let created = send(router.clone(), "POST", "/products/crear", Some(new)).await;
    assert_eq!(created.status(), StatusCode::CREATED);
    let created: Product = response_json(created).await;
    assert_eq!(created.id, 4);

    let updated = send(router.clone(), "PUT", "/products/update/4", Some(r#"{"name":"Lamp XL","price":15.0,"stock":2}"#)).await;
    assert_eq!(updated.status(), StatusCode::OK);

    let saved = send(router.clone(), "PUT", "/products/update", Some(r#"{"id":1,"name":"Keys","price":9.0,"stock":1}"#)).await;
    assert_eq!(saved.status(), StatusCode::OK);

    let missing = send(router.clone(), "PUT", "/products/update/99", Some(new)).await;
    assert_eq!(missing.status(), StatusCode::NOT_FOUND);

    let by_id = send(router.clone(), "GET", "/products/4", None).await;
    let lamp: Product = response_json(by_id).await;
    assert_eq!(lamp.name, "Lamp XL");
    assert_eq!(state.catalog.read().await.products.get(&1).unwrap().name, "Keys");
}

#[tokio::test]
async fn test_router_serves_rest_paths() {
    let router = Server::create_router(seeded_catalog());

    let created = send(router.clone(), "POST", "/products", Some(r#"{"name":"Hub","price":20.0,"stock":7}"#)).await;
    assert_eq!(created.status(), StatusCode::CREATED);

    let search = send(router.clone(), "GET", "/products/name?name=hub", None).await;
    assert_eq!(search.status(), StatusCode::OK);

    let deleted = send(router.clone(), "DELETE", "/products/4", None).await;
    let body: MessageResponse = response_json(deleted).await;
    assert_eq!(body.message, "Product deleted: 4");
}

// --- Delete ---

#[tokio::test]
async fn test_delete_returns_message_and_removes_product() {
    let state = seeded_catalog();

    let response = handle_delete(State(state.clone()), Path(2)).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body: MessageResponse = response_json(response).await;
    assert_eq!(body.message, "Product deleted: 2");

    assert!(!state.catalog.read().await.products.contains_key(&2));
}

#[tokio::test]
async fn test_delete_missing_product_returns_404() {
    let response = handle_delete(State(seeded_catalog()), Path(42)).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

// --- Lock timeout ---

#[tokio::test]
async fn test_list_times_out_while_write_lock_held() {
    let state = seeded_catalog();
    let _guard = state.catalog.write().await;

    let response = tokio::time::timeout(Duration::from_secs(5), handle_list(State(state.clone())))
        .await
        .expect("handler should give up on the lock by itself");
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
}

// --- Server ---

#[tokio::test]
async fn test_server_signals_bound_address() {
    let server = Server::new(ServerConfig { address: "127.0.0.1:0".parse().unwrap(), seed: true });
    let (ready_tx, ready_rx) = tokio::sync::oneshot::channel();
    tokio::spawn(async move {
        let _ = server.run(ready_tx).await;
    });

    let addr = tokio::time::timeout(Duration::from_secs(10), ready_rx).await.unwrap().unwrap();
    assert_ne!(addr.port(), 0);
}
