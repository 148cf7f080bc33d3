use std::sync::Arc;

use converge_store::{DatabaseClient, InMemoryClient, Object, SaveOptions, SqliteClient};
use serde_json::Value;

pub const RG: &str = "/planes/radius/local/resourceGroups/rg";

/// Resource id of a container in the shared test resource group
#[allow(dead_code)]
pub fn container_id(name: &str) -> String {
    format!("{}/providers/Applications.Core/containers/{}", RG, name)
}

/// Every client implementation, labelled for assertion messages
///
/// The SQLite client lives in a temp dir that must outlive the test.
#[allow(dead_code)]
pub fn all_clients() -> Vec<(&'static str, Arc<dyn DatabaseClient>, Option<tempfile::TempDir>)> {
    let dir = tempfile::tempdir().expect("temp dir");
    let sqlite = SqliteClient::open(dir.path().join("converge.db")).expect("open sqlite");
    vec![
        (
            "memory",
            Arc::new(InMemoryClient::new()) as Arc<dyn DatabaseClient>,
            None,
        ),
        ("sqlite", Arc::new(sqlite) as Arc<dyn DatabaseClient>, Some(dir)),
    ]
}

/// Save `data` unconditionally and return the stored object with its ETag
#[allow(dead_code)]
pub async fn seed(client: &dyn DatabaseClient, id: &str, data: Value) -> Object {
    let mut obj = Object::new(id, data);
    client
        .save(&mut obj, &SaveOptions::default())
        .await
        .expect("seed save");
    obj
}
