//! Example demonstrating the legacy store/retrieve surface and batch uploads

use gridstore_core::StoreConfig;
use gridstore_namespace::{BatchItem, BatchOptions, NamespaceStore, StoreRequest};
use std::time::Duration;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    gridstore_telemetry::init_telemetry();
    println!("=== gridstore Legacy Surface Example ===\n");

    let store = NamespaceStore::from_config(StoreConfig::test_defaults())?;

    // No session given: one is allocated
    let receipt = store
        .store(
            StoreRequest::new(b"report body".to_vec(), "text/plain")
                .with_filename("report.txt")
                .with_ttl(Duration::from_secs(600)),
        )
        .await?;
    println!("  Stored {} in session {}", receipt.namespace_id, receipt.session_id);

    let ctx = receipt.context();
    let data = store.retrieve(&receipt.namespace_id, &ctx).await?;
    let record = store.metadata(&receipt.namespace_id, &ctx).await?;
    println!(
        "  Retrieved {} bytes, mime {}, expires {:?}",
        data.len(),
        record.mime,
        record.expires_at
    );

    // Batch into the same session; the empty mime fails alone
    let batch = store
        .store_batch(
            vec![
                BatchItem::new(b"one".to_vec(), "text/plain"),
                BatchItem::new(b"two".to_vec(), ""),
                BatchItem::new(b"three".to_vec(), "text/plain"),
            ],
            BatchOptions {
                session_id: Some(receipt.session_id.clone()),
                ..BatchOptions::default()
            },
        )
        .await;
    println!(
        "  Batch stored {} of {} items",
        batch.succeeded().count(),
        batch.results.len()
    );

    let listed = store.list_by_session(&receipt.session_id, None, &ctx).await?;
    println!("  Session now holds {} namespaces", listed.len());

    let deleted = store.delete(&receipt.namespace_id, &ctx).await?;
    println!("  Deleted: {}", deleted);

    Ok(())
}
