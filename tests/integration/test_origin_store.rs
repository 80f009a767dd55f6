//! Integration tests for the SQLite CORS origin store.

use cors_management::api::config::{CorsSettings, LogFormat};
use cors_management::api::models::{
    ApplicationId, CorsOrigin, OriginExternalId, OriginId, TenantId, ValidatedOrigin,
};
use cors_management::api::storage::{
    self, CorsOriginStore, SqliteCorsOriginStore, SqliteIdentityDirectory, StorageError,
    StoreOperation,
};
use std::sync::Arc;
use tempfile::TempDir;

const TENANT_DOMAIN: &str = "abc.com";
const TENANT_ID: TenantId = TenantId(4);
const APP_1: ApplicationId = ApplicationId(11);
const APP_2: ApplicationId = ApplicationId(22);
const APP_1_RESOURCE_ID: &str = "c0881fad-fb6f-4d08-b4ad-2680364bd998";
const APP_2_RESOURCE_ID: &str = "4d34790b-8d16-4e03-b6c5-476c0bf31038";

const SAMPLE_ORIGIN_LIST_1: [&str; 3] = ["http://foo.com", "http://bar.com", "https://foobar.com"];
const SAMPLE_ORIGIN_LIST_2: [&str; 3] = ["http://abc.com", "https://pqr.com", "http://xyz.com"];

async fn setup_store() -> SqliteCorsOriginStore {
    let settings = CorsSettings {
        database_url: "sqlite::memory:".to_string(),
        max_connections: 1,
        log_format: LogFormat::Text,
    };
    open_store(&settings).await
}

fn file_settings(temp_dir: &TempDir, max_connections: u32) -> CorsSettings {
    CorsSettings {
        database_url: format!(
            "sqlite://{}?mode=rwc",
            temp_dir.path().join("cors.db").display()
        ),
        max_connections,
        log_format: LogFormat::Text,
    }
}

async fn open_store(settings: &CorsSettings) -> SqliteCorsOriginStore {
    let pool = storage::connect(settings).await.unwrap();

    let directory = SqliteIdentityDirectory::new(pool.clone());
    directory
        .register_tenant_with_id(TENANT_ID, TENANT_DOMAIN)
        .await
        .unwrap();
    directory
        .register_application_with_id(APP_1, TENANT_ID, APP_1_RESOURCE_ID, "App1")
        .await
        .unwrap();
    directory
        .register_application_with_id(APP_2, TENANT_ID, APP_2_RESOURCE_ID, "App2")
        .await
        .unwrap();

    SqliteCorsOriginStore::new(pool)
}

fn validated(origins: &[&str]) -> Vec<ValidatedOrigin> {
    origins
        .iter()
        .map(|o| ValidatedOrigin::parse(o).unwrap())
        .collect()
}

fn texts(origins: &[CorsOrigin]) -> Vec<&str> {
    origins.iter().map(|o| o.origin.as_str()).collect()
}

fn find<'a>(origins: &'a [CorsOrigin], text: &str) -> &'a CorsOrigin {
    origins.iter().find(|o| o.origin == text).unwrap()
}

#[tokio::test]
async fn test_set_tenant_origins_lists_in_insertion_order() {
    let store = setup_store().await;

    store
        .set_tenant_origins(TENANT_ID, &validated(&SAMPLE_ORIGIN_LIST_1))
        .await
        .unwrap();

    let origins = store.origins_by_tenant(TENANT_ID).await.unwrap();
    assert_eq!(texts(&origins), SAMPLE_ORIGIN_LIST_1.to_vec());
    assert!(origins.iter().all(|o| o.tenant_level));
    assert!(origins.iter().all(|o| o.associated_applications.is_empty()));
    assert!(origins.windows(2).all(|w| w[0].id < w[1].id));
}

#[tokio::test]
async fn test_set_tenant_origins_recreates_rows_held_only_by_the_tenant() {
    let store = setup_store().await;
    store
        .set_tenant_origins(TENANT_ID, &validated(&SAMPLE_ORIGIN_LIST_1))
        .await
        .unwrap();
    let before = store.origins_by_tenant(TENANT_ID).await.unwrap();
    let foo = find(&before, "http://foo.com").clone();
    let bar = find(&before, "http://bar.com").clone();

    store
        .set_tenant_origins(TENANT_ID, &validated(&["http://foo.com", "http://abc.com"]))
        .await
        .unwrap();

    let after = store.origins_by_tenant(TENANT_ID).await.unwrap();
    assert_eq!(texts(&after), vec!["http://foo.com", "http://abc.com"]);
    // Cleanup ran before re-flagging, so foo.com is a new row.
    let foo_after = find(&after, "http://foo.com");
    assert!(foo_after.id > foo.id);
    assert_ne!(foo_after.external_id, foo.external_id);
    assert!(store.origin_by_id(foo.id).await.unwrap().is_none());
    assert!(store.origin_by_id(bar.id).await.unwrap().is_none());
}

#[tokio::test]
async fn test_set_tenant_origins_keeps_rows_held_by_applications() {
    let store = setup_store().await;
    store
        .set_tenant_origins(TENANT_ID, &validated(&["http://foo.com"]))
        .await
        .unwrap();
    store
        .add_application_origins(TENANT_ID, APP_1, &validated(&["http://foo.com"]))
        .await
        .unwrap();
    let foo = store.origins_by_tenant(TENANT_ID).await.unwrap().remove(0);

    store
        .set_tenant_origins(TENANT_ID, &validated(&["http://foo.com"]))
        .await
        .unwrap();

    let after = store.origins_by_tenant(TENANT_ID).await.unwrap();
    assert_eq!(after, vec![foo]);
}

#[tokio::test]
async fn test_set_tenant_origins_to_empty_removes_everything_unreferenced() {
    let store = setup_store().await;
    store
        .set_tenant_origins(TENANT_ID, &validated(&SAMPLE_ORIGIN_LIST_1))
        .await
        .unwrap();

    store.set_tenant_origins(TENANT_ID, &[]).await.unwrap();

    assert!(store.origins_by_tenant(TENANT_ID).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_application_origins_are_scoped_but_visible_to_the_tenant() {
    let store = setup_store().await;

    store
        .set_application_origins(TENANT_ID, APP_1, &validated(&SAMPLE_ORIGIN_LIST_2))
        .await
        .unwrap();

    let app_origins = store
        .origins_by_application(TENANT_ID, APP_1)
        .await
        .unwrap();
    assert_eq!(texts(&app_origins), SAMPLE_ORIGIN_LIST_2.to_vec());
    assert!(app_origins.iter().all(|o| !o.tenant_level));
    assert!(app_origins.iter().all(|o| o.is_associated_with(APP_1)));

    assert!(
        store
            .origins_by_application(TENANT_ID, APP_2)
            .await
            .unwrap()
            .is_empty()
    );

    let tenant_origins = store.origins_by_tenant(TENANT_ID).await.unwrap();
    assert_eq!(texts(&tenant_origins), SAMPLE_ORIGIN_LIST_2.to_vec());
}

#[tokio::test]
async fn test_set_application_origins_associates_existing_rows() {
    let store = setup_store().await;
    store
        .set_tenant_origins(TENANT_ID, &validated(&["http://foo.com"]))
        .await
        .unwrap();
    let foo_id = store.origins_by_tenant(TENANT_ID).await.unwrap()[0].id;

    store
        .set_application_origins(
            TENANT_ID,
            APP_1,
            &validated(&["http://foo.com", "http://abc.com"]),
        )
        .await
        .unwrap();

    let tenant_origins = store.origins_by_tenant(TENANT_ID).await.unwrap();
    assert_eq!(
        texts(&tenant_origins),
        vec!["http://foo.com", "http://abc.com"]
    );
    let foo = find(&tenant_origins, "http://foo.com");
    assert_eq!(foo.id, foo_id);
    assert!(foo.tenant_level);
    assert!(foo.is_associated_with(APP_1));

    let app_origins = store
        .origins_by_application(TENANT_ID, APP_1)
        .await
        .unwrap();
    assert_eq!(
        texts(&app_origins),
        vec!["http://foo.com", "http://abc.com"]
    );
}

#[tokio::test]
async fn test_set_application_origins_replaces_only_that_application() {
    let store = setup_store().await;
    store
        .set_application_origins(
            TENANT_ID,
            APP_1,
            &validated(&["http://foo.com", "http://bar.com"]),
        )
        .await
        .unwrap();
    store
        .set_application_origins(TENANT_ID, APP_2, &validated(&["http://bar.com"]))
        .await
        .unwrap();

    store
        .set_application_origins(TENANT_ID, APP_1, &validated(&["http://xyz.com"]))
        .await
        .unwrap();

    let tenant_origins = store.origins_by_tenant(TENANT_ID).await.unwrap();
    // foo.com lost its only reference; bar.com is still used by the second app.
    assert_eq!(
        texts(&tenant_origins),
        vec!["http://bar.com", "http://xyz.com"]
    );
    let bar = find(&tenant_origins, "http://bar.com");
    assert!(bar.is_associated_with(APP_2));
    assert!(!bar.is_associated_with(APP_1));
}

#[tokio::test]
async fn test_add_tenant_origins_duplicate_rolls_back_the_whole_batch() {
    let store = setup_store().await;
    store
        .add_tenant_origins(TENANT_ID, &validated(&["http://foo.com"]))
        .await
        .unwrap();

    let err = store
        .add_tenant_origins(TENANT_ID, &validated(&["http://new.com", "http://foo.com"]))
        .await
        .unwrap_err();

    match err {
        StorageError::OperationFailed { operation, key, .. } => {
            assert_eq!(operation, StoreOperation::AddOrigins);
            assert_eq!(key, "tenant 4");
        }
        other => panic!("unexpected error: {other:?}"),
    }
    let origins = store.origins_by_tenant(TENANT_ID).await.unwrap();
    assert_eq!(texts(&origins), vec!["http://foo.com"]);
}

#[tokio::test]
async fn test_add_application_origins_creates_missing_rows_once() {
    let store = setup_store().await;
    store
        .add_application_origins(TENANT_ID, APP_1, &validated(&["http://foo.com"]))
        .await
        .unwrap();

    store
        .add_application_origins(
            TENANT_ID,
            APP_2,
            &validated(&["http://foo.com", "http://bar.com"]),
        )
        .await
        .unwrap();

    let tenant_origins = store.origins_by_tenant(TENANT_ID).await.unwrap();
    assert_eq!(
        texts(&tenant_origins),
        vec!["http://foo.com", "http://bar.com"]
    );
    let foo = find(&tenant_origins, "http://foo.com");
    let app_ids: Vec<ApplicationId> = foo.associated_applications.iter().map(|a| a.id).collect();
    assert_eq!(app_ids, vec![APP_1, APP_2]);
}

#[tokio::test]
async fn test_add_application_origins_duplicate_association_rolls_back() {
    let store = setup_store().await;
    store
        .add_application_origins(TENANT_ID, APP_1, &validated(&["http://foo.com"]))
        .await
        .unwrap();

    let result = store
        .add_application_origins(
            TENANT_ID,
            APP_1,
            &validated(&["http://bar.com", "http://foo.com"]),
        )
        .await;

    assert!(result.is_err());
    let origins = store.origins_by_tenant(TENANT_ID).await.unwrap();
    assert_eq!(texts(&origins), vec!["http://foo.com"]);
}

#[tokio::test]
async fn test_delete_tenant_association_keeps_rows_used_by_applications() {
    let store = setup_store().await;
    store
        .set_tenant_origins(TENANT_ID, &validated(&["http://foo.com", "http://bar.com"]))
        .await
        .unwrap();
    store
        .add_application_origins(TENANT_ID, APP_1, &validated(&["http://foo.com"]))
        .await
        .unwrap();
    let origins = store.origins_by_tenant(TENANT_ID).await.unwrap();
    let foo = find(&origins, "http://foo.com").clone();
    let bar = find(&origins, "http://bar.com").clone();

    store
        .delete_tenant_origin_associations(TENANT_ID, &[foo.id, bar.id])
        .await
        .unwrap();

    let foo_after = store.origin_by_id(foo.id).await.unwrap().unwrap();
    assert!(!foo_after.tenant_level);
    assert!(foo_after.is_associated_with(APP_1));
    assert!(store.origin_by_id(bar.id).await.unwrap().is_none());
}

#[tokio::test]
async fn test_delete_application_association_cleans_up_dangling_rows() {
    let store = setup_store().await;
    store
        .set_application_origins(
            TENANT_ID,
            APP_1,
            &validated(&["http://foo.com", "http://bar.com"]),
        )
        .await
        .unwrap();
    store
        .set_tenant_origins(TENANT_ID, &validated(&["http://bar.com"]))
        .await
        .unwrap();
    let origins = store
        .origins_by_application(TENANT_ID, APP_1)
        .await
        .unwrap();
    let ids: Vec<OriginId> = origins.iter().map(|o| o.id).collect();

    store
        .delete_application_origin_associations(TENANT_ID, APP_1, &ids)
        .await
        .unwrap();

    assert!(
        store
            .origins_by_application(TENANT_ID, APP_1)
            .await
            .unwrap()
            .is_empty()
    );
    let tenant_origins = store.origins_by_tenant(TENANT_ID).await.unwrap();
    assert_eq!(texts(&tenant_origins), vec!["http://bar.com"]);
    assert!(tenant_origins[0].tenant_level);
}

#[tokio::test]
async fn test_delete_unknown_ids_is_a_no_op() {
    let store = setup_store().await;
    store
        .set_tenant_origins(TENANT_ID, &validated(&["http://foo.com"]))
        .await
        .unwrap();

    store
        .delete_tenant_origin_associations(TENANT_ID, &[OriginId(9999)])
        .await
        .unwrap();
    store
        .delete_application_origin_associations(TENANT_ID, APP_1, &[OriginId(9999)])
        .await
        .unwrap();

    assert_eq!(store.origins_by_tenant(TENANT_ID).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_origin_lookups_and_applications() {
    let store = setup_store().await;
    store
        .set_application_origins(TENANT_ID, APP_2, &validated(&["http://foo.com"]))
        .await
        .unwrap();
    store
        .set_application_origins(TENANT_ID, APP_1, &validated(&["http://foo.com"]))
        .await
        .unwrap();
    let foo = store.origins_by_tenant(TENANT_ID).await.unwrap().remove(0);

    let by_external = store
        .origin_by_external_id(&foo.external_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(by_external, foo);
    assert!(
        store
            .origin_by_external_id(&OriginExternalId::from("missing"))
            .await
            .unwrap()
            .is_none()
    );

    let applications = store.origin_applications(foo.id).await.unwrap();
    let resource_ids: Vec<&str> = applications
        .iter()
        .map(|a| a.resource_id.as_str())
        .collect();
    assert_eq!(resource_ids, vec![APP_1_RESOURCE_ID, APP_2_RESOURCE_ID]);
    assert_eq!(applications[0].name, "App1");
}

#[tokio::test]
async fn test_listings_carry_every_associated_application() {
    let store = setup_store().await;
    store
        .set_tenant_origins(TENANT_ID, &validated(&["http://foo.com", "http://bar.com"]))
        .await
        .unwrap();
    store
        .add_application_origins(TENANT_ID, APP_2, &validated(&["http://foo.com"]))
        .await
        .unwrap();
    store
        .add_application_origins(TENANT_ID, APP_1, &validated(&["http://foo.com"]))
        .await
        .unwrap();

    let tenant_origins = store.origins_by_tenant(TENANT_ID).await.unwrap();
    assert_eq!(
        texts(&tenant_origins),
        vec!["http://foo.com", "http://bar.com"]
    );
    let app_ids: Vec<ApplicationId> = tenant_origins[0]
        .associated_applications
        .iter()
        .map(|a| a.id)
        .collect();
    assert_eq!(app_ids, vec![APP_1, APP_2]);
    assert!(tenant_origins[1].associated_applications.is_empty());

    // Filtering by one application still reports the other association.
    let app_2_origins = store
        .origins_by_application(TENANT_ID, APP_2)
        .await
        .unwrap();
    assert_eq!(app_2_origins, vec![tenant_origins[0].clone()]);
}

#[tokio::test]
async fn test_tenants_do_not_share_origin_rows() {
    let store = setup_store().await;
    let other_tenant = TenantId(5);
    store
        .set_tenant_origins(TENANT_ID, &validated(&["http://foo.com"]))
        .await
        .unwrap();
    store
        .set_tenant_origins(other_tenant, &validated(&["http://foo.com"]))
        .await
        .unwrap();

    store.set_tenant_origins(TENANT_ID, &[]).await.unwrap();

    assert!(store.origins_by_tenant(TENANT_ID).await.unwrap().is_empty());
    let other = store.origins_by_tenant(other_tenant).await.unwrap();
    assert_eq!(texts(&other), vec!["http://foo.com"]);
    assert!(other[0].tenant_level);
}

#[tokio::test]
async fn test_file_database_persists_across_connections() {
    let temp_dir = tempfile::tempdir().unwrap();
    let settings = file_settings(&temp_dir, 2);

    let pool = storage::connect(&settings).await.unwrap();
    SqliteCorsOriginStore::new(pool.clone())
        .set_tenant_origins(TENANT_ID, &validated(&SAMPLE_ORIGIN_LIST_2))
        .await
        .unwrap();
    pool.close().await;

    // Reconnecting re-runs the migrations against the existing schema.
    let pool = storage::connect(&settings).await.unwrap();
    let origins = SqliteCorsOriginStore::new(pool)
        .origins_by_tenant(TENANT_ID)
        .await
        .unwrap();
    assert_eq!(texts(&origins), SAMPLE_ORIGIN_LIST_2.to_vec());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_writers_on_a_file_database() {
    let temp_dir = tempfile::tempdir().unwrap();
    let store = Arc::new(open_store(&file_settings(&temp_dir, 8)).await);

    // Even tasks replace the first application's origins; odd tasks keep
    // adding fresh origins to the second one.
    let tasks: Vec<_> = (0..16)
        .map(|task| {
            let store = store.clone();
            tokio::spawn(async move {
                for round in 0..10 {
                    let own = format!("http://w{task}-{round}.com");
                    if task % 2 == 0 {
                        let origins = validated(&[own.as_str(), "http://shared.com"]);
                        store
                            .set_application_origins(TENANT_ID, APP_1, &origins)
                            .await?;
                    } else {
                        let origins = validated(&[own.as_str()]);
                        store
                            .add_application_origins(TENANT_ID, APP_2, &origins)
                            .await?;
                    }
                }
                Ok::<_, StorageError>(())
            })
        })
        .collect();

    for task in tasks {
        task.await.unwrap().unwrap();
    }

    let app_1 = store
        .origins_by_application(TENANT_ID, APP_1)
        .await
        .unwrap();
    assert_eq!(app_1.len(), 2);
    assert!(app_1.iter().any(|o| o.origin == "http://shared.com"));
    let app_2 = store
        .origins_by_application(TENANT_ID, APP_2)
        .await
        .unwrap();
    assert_eq!(app_2.len(), 80);
    let tenant_origins = store.origins_by_tenant(TENANT_ID).await.unwrap();
    assert_eq!(tenant_origins.len(), 82);
}
