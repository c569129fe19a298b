//! Northwind Example
//!
//! Runs a few requests against the public Northwind OData service.
//!
//! ```sh
//! RUST_LOG=odata_exec=debug cargo run -p northwind-demo
//! ```

// Example-specific lint allowances
#![allow(missing_docs)]
#![allow(clippy::print_stdout)]

use std::time::Duration;

use odata_exec::prelude::*;
use odata_exec::tower::ServiceExt;
use serde::Deserialize;
use tracing_subscriber::EnvFilter;

const SERVICE: &str = "https://services.odata.org/V4/Northwind/Northwind.svc/";
const JSON: &str = "application/json;odata.metadata=minimal";

// ============================================================================
// Data Types
// ============================================================================

/// An OData collection payload.
#[derive(Debug, Deserialize)]
pub struct Collection<T> {
    pub value: Vec<T>,
}

/// A Northwind product.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Product {
    #[serde(rename = "ProductID")]
    pub product_id: u32,
    pub product_name: String,
    pub unit_price: Option<f64>,
}

// ============================================================================
// Main
// ============================================================================

#[tokio::main]
async fn main() -> odata_exec::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let factory = HyperTransportFactory::new(
        TransportConfig::builder()
            .timeout(Duration::from_secs(20))
            .user_agent(concat!("northwind-demo/", env!("CARGO_PKG_VERSION")))
            .build(),
    );
    let session = Session::<HyperTransport>::new()
        .with_before_request(|message| {
            message
                .headers_mut()
                .insert("OData-MaxVersion", header::HeaderValue::from_static("4.0"));
        })
        .with_after_response(|response| {
            tracing::debug!(status = %response.status(), "northwind answered");
        });
    let runner = RequestRunner::new(factory, session);
    let service = Url::parse(SERVICE)?;

    // Query a collection
    let request = RequestDescriptor::builder(Method::Get, service.join("Products?$top=3")?)
        .accept(JSON)
        .build()?;
    let products: Collection<Product> = runner.execute(request).await?.json().await?;
    for product in &products.value {
        println!(
            "#{} {} ({:?})",
            product.product_id, product.product_name, product.unit_price
        );
    }

    // Missing entities surface as status errors with the body still readable
    let request = RequestDescriptor::builder(Method::Get, service.join("Products(99999)")?)
        .accept(JSON)
        .build()?;
    match runner.execute(request).await {
        Ok(_) => println!("unexpected product 99999"),
        Err(err) if err.is_not_found() => {
            println!("{err}");
            if let Some(response) = err.into_response() {
                println!("server said: {}", response.text().await?);
            }
        }
        Err(err) => return Err(err),
    }

    // Cancellation from another task
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(5)).await;
        trigger.cancel();
    });
    let request = RequestDescriptor::builder(Method::Get, service.join("Orders")?)
        .accept(JSON)
        .build()?;
    match runner.execute_with_cancellation(request, &cancel).await {
        Err(err) if err.is_cancelled() => println!("orders query cancelled"),
        Ok(response) => println!("orders answered first: {}", response.status()),
        Err(err) => println!("orders failed: {err}"),
    }

    // The runner is a tower Service
    let request = RequestDescriptor::builder(Method::Get, service.join("$metadata")?)
        .accept("application/xml")
        .build()?;
    let metadata = runner.clone().oneshot(request).await?.text().await?;
    println!("metadata document: {} bytes", metadata.len());

    Ok(())
}
