//! In-memory product catalog served by the demo binary.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::RwLock;

use waypoint::http::{RequestContext, StatusCode};
use waypoint::routing::{PatternError, Router};

#[derive(Debug, Clone, Serialize)]
pub struct Product {
    pub id: u64,
    pub name: String,
    pub price_cents: u64,
}

#[derive(Debug, Deserialize)]
struct ProductInput {
    name: String,
    price_cents: u64,
}

#[derive(Default)]
pub struct Catalog {
    products: RwLock<BTreeMap<u64, Product>>,
    next_id: std::sync::atomic::AtomicU64,
}

impl Catalog {
    fn allocate_id(&self) -> u64 {
        self.next_id
            .fetch_add(1, std::sync::atomic::Ordering::Relaxed)
            + 1
    }
}

/// Registers the catalog routes on `router`.
pub fn register(router: &mut Router, catalog: Arc<Catalog>) -> Result<(), PatternError> {
    router.get("/", index)?;

    let c = Arc::clone(&catalog);
    router.get("/products", move |ctx| list(Arc::clone(&c), ctx))?;
    let c = Arc::clone(&catalog);
    router.get("/products/{id}", move |ctx| show(Arc::clone(&c), ctx))?;
    let c = Arc::clone(&catalog);
    router.post("/products", move |ctx| create(Arc::clone(&c), ctx))?;
    let c = Arc::clone(&catalog);
    router.put("/products/{id}", move |ctx| update(Arc::clone(&c), ctx))?;
    let c = catalog;
    router.delete("/products/{id}", move |ctx| remove(Arc::clone(&c), ctx))?;

    Ok(())
}

async fn index(ctx: RequestContext) -> anyhow::Result<()> {
    ctx.write_html(
        StatusCode::Ok,
        "<!DOCTYPE html><html><body><h1>Catalog</h1>\
         <p>See <a href=\"/products\">/products</a>.</p></body></html>",
    )
    .await?;
    Ok(())
}

async fn list(catalog: Arc<Catalog>, ctx: RequestContext) -> anyhow::Result<()> {
    let products: Vec<Product> = catalog.products.read().await.values().cloned().collect();
    ctx.write_json_value(StatusCode::Ok, &products).await?;
    Ok(())
}

async fn show(catalog: Arc<Catalog>, ctx: RequestContext) -> anyhow::Result<()> {
    let Some(id) = product_id(&ctx) else {
        return bad_id(&ctx).await;
    };

    let product = catalog.products.read().await.get(&id).cloned();
    match product {
        Some(product) => ctx.write_json_value(StatusCode::Ok, &product).await?,
        None => not_found(&ctx, id).await?,
    }
    Ok(())
}

async fn create(catalog: Arc<Catalog>, mut ctx: RequestContext) -> anyhow::Result<()> {
    let Some(input) = read_input(&mut ctx).await? else {
        return Ok(());
    };

    let product = Product {
        id: catalog.allocate_id(),
        name: input.name,
        price_cents: input.price_cents,
    };
    catalog
        .products
        .write()
        .await
        .insert(product.id, product.clone());

    tracing::info!(id = product.id, "Product created");
    ctx.write_json_value(StatusCode::Created, &product).await?;
    Ok(())
}

async fn update(catalog: Arc<Catalog>, mut ctx: RequestContext) -> anyhow::Result<()> {
    let Some(id) = product_id(&ctx) else {
        return bad_id(&ctx).await;
    };
    let Some(input) = read_input(&mut ctx).await? else {
        return Ok(());
    };

    let updated = catalog
        .products
        .write()
        .await
        .get_mut(&id)
        .map(|product| {
            product.name = input.name;
            product.price_cents = input.price_cents;
            product.clone()
        });

    match updated {
        Some(product) => ctx.write_json_value(StatusCode::Ok, &product).await?,
        None => not_found(&ctx, id).await?,
    }
    Ok(())
}

async fn remove(catalog: Arc<Catalog>, ctx: RequestContext) -> anyhow::Result<()> {
    let Some(id) = product_id(&ctx) else {
        return bad_id(&ctx).await;
    };

    let removed = catalog.products.write().await.remove(&id);
    match removed {
        Some(_) => ctx.write_json(StatusCode::Ok, r#"{"deleted":true}"#).await?,
        None => not_found(&ctx, id).await?,
    }
    Ok(())
}

/// Decodes the product body, answering 400 when it is not valid input.
async fn read_input(ctx: &mut RequestContext) -> anyhow::Result<Option<ProductInput>> {
    match ctx.read_json() {
        Ok(input) => Ok(Some(input)),
        Err(e) => {
            ctx.write_json_value(StatusCode::BadRequest, &json!({ "error": e.to_string() }))
                .await?;
            Ok(None)
        }
    }
}

fn product_id(ctx: &RequestContext) -> Option<u64> {
    ctx.route_param("id")?.parse().ok()
}

async fn bad_id(ctx: &RequestContext) -> anyhow::Result<()> {
    ctx.write_json_value(
        StatusCode::BadRequest,
        &json!({ "error": "product id must be a positive integer" }),
    )
    .await?;
    Ok(())
}

async fn not_found(ctx: &RequestContext, id: u64) -> anyhow::Result<()> {
    ctx.write_json_value(
        StatusCode::NotFound,
        &json!({ "error": format!("no product with id {}", id) }),
    )
    .await?;
    Ok(())
}
