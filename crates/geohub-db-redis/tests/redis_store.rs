//! Connector store against a real Redis instance.

use geohub_core::{Connector, Marker};
use geohub_db_redis::{ConnectorStorage, RedisConfig, create_storage};
use serde_json::json;
use testcontainers::runners::AsyncRunner;
use testcontainers_modules::redis::Redis;

#[tokio::test]
#[ignore = "requires Docker"]
async fn hash_store_round_trip() {
    let container = Redis::default()
        .start()
        .await
        .expect("start redis container");
    let port = container.get_host_port_ipv4(6379).await.expect("get port");

    let storage = create_storage(
        &RedisConfig::new(format!("redis://127.0.0.1:{port}")),
        "connectors-test",
    )
    .unwrap();
    storage.init().await.expect("ping should succeed");

    let marker = Marker::new();
    let connector = Connector::new("kv").with_field("owner", json!("ANONYMOUS"));
    assert_eq!(
        storage.store_connector(&marker, &connector).await.unwrap(),
        connector
    );
    assert_eq!(storage.get_connector(&marker, "kv").await.unwrap(), connector);

    storage
        .store_connector(&marker, &Connector::new("another"))
        .await
        .unwrap();
    let ids: Vec<String> = storage
        .get_all_connectors(&marker)
        .await
        .unwrap()
        .into_iter()
        .filter_map(|c| c.id)
        .collect();
    assert_eq!(ids, ["another", "kv"]);

    let deleted = storage.delete_connector(&marker, "kv").await.unwrap();
    assert_eq!(deleted, connector);
    assert!(storage.get_connector(&marker, "kv").await.unwrap_err().is_not_found());
    assert!(storage.delete_connector(&marker, "kv").await.unwrap_err().is_not_found());
}
