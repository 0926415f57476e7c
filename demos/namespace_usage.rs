//! Example demonstrating blob and workspace namespaces

use gridstore_core::{AccessContext, ScopeOwner, StoreConfig};
use gridstore_namespace::{
    CheckpointRequest, CreateNamespaceRequest, NamespaceFilter, NamespaceStore, WriteRequest,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    gridstore_telemetry::init_telemetry();
    println!("=== gridstore Namespace Example ===\n");

    // Example 1: in-memory back-ends
    println!("1. Using the in-memory storage provider:");
    let store = NamespaceStore::from_config(StoreConfig::test_defaults())?;
    demonstrate_namespaces(&store).await?;

    // Example 2: objects as files on disk
    println!("\n2. Using the file system storage provider:");
    let temp_dir = tempfile::tempdir()?;
    let mut config = StoreConfig::test_defaults();
    config.storage.provider = "filesystem".to_string();
    config.storage.root = Some(temp_dir.path().display().to_string());
    let store = NamespaceStore::from_config(config)?;
    demonstrate_namespaces(&store).await?;

    Ok(())
}

async fn demonstrate_namespaces(store: &NamespaceStore) -> Result<(), Box<dyn std::error::Error>> {
    let owner = ScopeOwner::user("user123");
    let ctx = AccessContext::for_owner(&owner);

    // A blob holds a single payload
    let blob = store
        .create_namespace(
            CreateNamespaceRequest::blob(owner.clone(), "text/plain")
                .with_filename("greeting.txt")
                .with_data(b"Hello, gridstore!".to_vec()),
            &ctx,
        )
        .await?;
    println!("  Created blob {}", blob);

    let version = store
        .write_namespace(&blob, WriteRequest::blob(b"Hello again!".to_vec()), &ctx)
        .await?;
    let data = store.read_namespace(&blob, None, &ctx).await?;
    println!("  Blob at version {}: {}", version, String::from_utf8_lossy(&data));

    // A workspace holds a tree of files
    let workspace = store
        .create_namespace(CreateNamespaceRequest::workspace(owner.clone()), &ctx)
        .await?;
    store
        .write_namespace(&workspace, WriteRequest::file("src/main.rs", b"fn main() {}".to_vec()), &ctx)
        .await?;
    store
        .write_namespace(&workspace, WriteRequest::file("README.md", b"# demo".to_vec()), &ctx)
        .await?;
    for entry in store.list_entries(&workspace, None, &ctx).await? {
        println!(
            "  {}{}",
            entry.path,
            if entry.is_directory { "/" } else { "" }
        );
    }

    // Snapshot, change, roll back
    let checkpoint = store
        .checkpoint_namespace(&workspace, CheckpointRequest::new("before edit"), &ctx)
        .await?;
    store
        .write_namespace(&workspace, WriteRequest::file("README.md", b"# edited".to_vec()), &ctx)
        .await?;
    store
        .restore_namespace(&workspace, &checkpoint.checkpoint_id, &ctx)
        .await?;
    let readme = store
        .read_namespace(&workspace, Some("README.md"), &ctx)
        .await?;
    println!(
        "  Restored {}: README.md = {}",
        checkpoint.checkpoint_id,
        String::from_utf8_lossy(&readme)
    );

    let listed = store
        .list_namespaces(&owner, &NamespaceFilter::default(), &ctx)
        .await?;
    println!("  Namespaces owned by user123: {}", listed.len());

    // Other users are refused
    let stranger = AccessContext::user("someone-else");
    if let Err(err) = store.read_namespace(&blob, None, &stranger).await {
        println!("  Stranger read refused: {}", err);
    }

    Ok(())
}
