use sqlx::mysql::MySqlPoolOptions;
use sqlx::Row;
use stubby_core::{Destination, ShortCode, UrlMapping};
use stubby_storage::{ConsistencyLevel, MySqlStore, StorageError, UrlStore};
use stubby_test_infra::mysql::{MySqlServer, MysqlConfig};

struct Fixture {
    _mysql: MySqlServer,
    url: String,
    store: MySqlStore,
}

impl Fixture {
    async fn start() -> Self {
        let mysql = MySqlServer::new(MysqlConfig::builder().build())
            .await
            .expect("start mysql");
        let url = mysql.database_url().to_string();
        let store = MySqlStore::from_url(&url).expect("valid url");
        store.open().await.expect("open mysql store");

        Self {
            _mysql: mysql,
            url,
            store,
        }
    }
}

fn code(value: &str) -> ShortCode {
    ShortCode::new_unchecked(value)
}

fn mapping(c: &str, d: &str) -> UrlMapping {
    UrlMapping::new(code(c), Destination::parse(d).unwrap())
}

#[tokio::test]
#[ignore = "requires docker"]
async fn put_and_get_both_directions() {
    let fixture = Fixture::start().await;
    let store = &fixture.store;

    store
        .put(&mapping("abc1234", "https://example.com").with_owner(Some("luke".into())))
        .await
        .unwrap();

    let got = store.get_destination(&code("abc1234")).await.unwrap();
    assert_eq!(got.as_str(), "https://example.com");
    let got = store
        .get_short_code(&Destination::parse("https://example.com").unwrap())
        .await
        .unwrap();
    assert_eq!(got.as_str(), "abc1234");
    assert_eq!(store.consistency(), ConsistencyLevel::SingleRow);
    assert!(store.health().await);
}

#[tokio::test]
#[ignore = "requires docker"]
async fn codes_are_case_sensitive() {
    let fixture = Fixture::start().await;
    let store = &fixture.store;

    store.put(&mapping("abcdefg", "https://lower.example")).await.unwrap();
    store.put(&mapping("ABCDEFG", "https://upper.example")).await.unwrap();

    let got = store.get_destination(&code("ABCDEFG")).await.unwrap();
    assert_eq!(got.as_str(), "https://upper.example");
}

#[tokio::test]
#[ignore = "requires docker"]
async fn put_conflicts_on_code_and_destination() {
    let fixture = Fixture::start().await;
    let store = &fixture.store;
    store.put(&mapping("abc1234", "https://one.example")).await.unwrap();

    let err = store
        .put(&mapping("abc1234", "https://two.example"))
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::Conflict(_)));

    let err = store
        .put(&mapping("xyz9876", "https://one.example"))
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::Conflict(_)));
}

#[tokio::test]
#[ignore = "requires docker"]
async fn delete_is_soft_and_codes_are_not_reissued() {
    let fixture = Fixture::start().await;
    let store = &fixture.store;
    store.put(&mapping("abc1234", "https://example.com")).await.unwrap();

    store.delete(&code("abc1234")).await.unwrap();

    assert!(store.get_destination(&code("abc1234")).await.unwrap_err().is_not_found());
    assert!(store.delete(&code("abc1234")).await.unwrap_err().is_not_found());

    // The destination can be bound again, the code cannot.
    store.put(&mapping("new1234", "https://example.com")).await.unwrap();
    let err = store
        .put(&mapping("abc1234", "https://other.example"))
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::Conflict(_)));

    let pool = MySqlPoolOptions::new()
        .max_connections(1)
        .connect(&fixture.url)
        .await
        .unwrap();
    let row = sqlx::query("SELECT deleted_at FROM url_mappings WHERE short_code = ?")
        .bind("abc1234")
        .fetch_one(&pool)
        .await
        .unwrap();
    let deleted_at: Option<i64> = row.try_get("deleted_at").unwrap();
    assert!(deleted_at.is_some());
}

#[tokio::test]
#[ignore = "requires docker"]
async fn open_is_idempotent_and_close_releases_the_pool() {
    let fixture = Fixture::start().await;
    let store = &fixture.store;

    store.open().await.unwrap();
    store.close().await.unwrap();

    assert!(!store.health().await);
    let err = store.get_destination(&code("abc1234")).await.unwrap_err();
    assert!(matches!(err, StorageError::Unavailable(_)));
}
