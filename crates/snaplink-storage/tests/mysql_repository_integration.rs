use std::sync::Arc;
use std::time::Duration;

use jiff::{SignedDuration, Timestamp};
use snaplink_core::{
    list_page, LinkFilter, NewLink, NewRole, NewUser, RecordId, RedirectType, RolePatch,
    ShortCode, UserFilter, UserPatch,
};
use snaplink_storage::{LinkRepository, MySqlStore, RoleRepository, StorageError, UserRepository};
use snaplink_test_infra::mysql::{MySqlConfig, MySqlServer};
use sqlx::mysql::MySqlPoolOptions;

struct Fixture {
    _mysql: MySqlServer,
    store: MySqlStore,
}

impl Fixture {
    async fn start() -> Self {
        let mysql = MySqlServer::start(MySqlConfig::default())
            .await
            .expect("start mysql");
        let url = mysql.database_url().await.expect("mysql url");
        let store = MySqlStore::new(connect_with_retry(&url).await);
        store.migrate().await.expect("apply migrations");

        Self {
            _mysql: mysql,
            store,
        }
    }
}

async fn connect_with_retry(url: &str) -> sqlx::MySqlPool {
    let mut last_error = None;

    for _ in 0..20 {
        match MySqlPoolOptions::new()
            .max_connections(16)
            .connect(url)
            .await
        {
            Ok(pool) => return pool,
            Err(err) => {
                last_error = Some(err);
                tokio::time::sleep(Duration::from_millis(500)).await;
            }
        }
    }

    panic!("failed to connect mysql: {last_error:?}");
}

fn code(value: &str) -> ShortCode {
    ShortCode::new_unchecked(value)
}

fn link(value: &str, created_at: Timestamp, expire_at: Option<Timestamp>) -> NewLink {
    NewLink {
        code: code(value),
        original_url: format!("https://example.com/{value}"),
        expire_at,
        redirect_type: RedirectType::Found,
        created_at,
    }
}

async fn role(store: &MySqlStore, name: &str) -> RecordId {
    let role = RoleRepository::insert(
        store,
        NewRole {
            name: name.to_string(),
            description: None,
            created_by: None,
            created_at: Timestamp::now(),
        },
    )
    .await
    .unwrap();
    role.id
}

fn user(role_id: RecordId, email: &str) -> NewUser {
    NewUser {
        fullname: "Grace Hopper".to_string(),
        role_id,
        email: email.to_string(),
        password_hash: "$argon2id$stub".to_string(),
        created_by: Some("admin".to_string()),
        created_at: Timestamp::now(),
    }
}

#[tokio::test]
async fn insert_then_get_round_trips_at_storage_precision() {
    let fixture = Fixture::start().await;
    let now = Timestamp::now();

    let inserted = LinkRepository::insert(&fixture.store, link("abc123", now, None))
        .await
        .unwrap();
    let got = LinkRepository::get(&fixture.store, &code("abc123"))
        .await
        .unwrap()
        .unwrap();

    assert_eq!(got, inserted);
    assert_eq!(got.clicks, 0);
    assert_eq!(got.redirect_type, RedirectType::Found);
}

#[tokio::test]
async fn duplicate_code_conflicts_even_after_deactivation() {
    let fixture = Fixture::start().await;
    let now = Timestamp::now();

    LinkRepository::insert(&fixture.store, link("taken", now, None))
        .await
        .unwrap();
    assert!(fixture.store.deactivate(&code("taken")).await.unwrap());
    assert!(!fixture.store.deactivate(&code("taken")).await.unwrap());

    let err = LinkRepository::insert(&fixture.store, link("taken", now, None))
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::Conflict(_)));
}

#[tokio::test]
async fn short_codes_are_case_sensitive() {
    let fixture = Fixture::start().await;
    let now = Timestamp::now();

    LinkRepository::insert(&fixture.store, link("AbcDef", now, None))
        .await
        .unwrap();
    LinkRepository::insert(&fixture.store, link("abcdef", now, None))
        .await
        .unwrap();
}

#[tokio::test]
async fn concurrent_redemptions_are_all_counted() {
    let fixture = Fixture::start().await;
    let store = Arc::new(fixture.store.clone());
    LinkRepository::insert(&*store, link("hot", Timestamp::now(), None))
        .await
        .unwrap();

    let tasks: Vec<_> = (0..32)
        .map(|_| {
            let store = Arc::clone(&store);
            tokio::spawn(async move { store.redeem(&code("hot"), Timestamp::now()).await })
        })
        .collect();

    for task in tasks {
        let redirection = task.await.unwrap().unwrap().unwrap();
        assert_eq!(redirection.original_url, "https://example.com/hot");
    }

    let got = LinkRepository::get(&*store, &code("hot"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(got.clicks, 32);
}

#[tokio::test]
async fn expired_link_is_not_redeemed() {
    let fixture = Fixture::start().await;
    let now = Timestamp::now();
    let expired = now - SignedDuration::from_secs(1);

    LinkRepository::insert(&fixture.store, link("gone", now, Some(expired)))
        .await
        .unwrap();

    assert!(fixture
        .store
        .redeem(&code("gone"), now)
        .await
        .unwrap()
        .is_none());
    let got = LinkRepository::get(&fixture.store, &code("gone"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(got.clicks, 0);
}

#[tokio::test]
async fn paging_splits_timestamp_ties_by_id() {
    let fixture = Fixture::start().await;
    let t5 = Timestamp::from_second(1_767_225_605).unwrap();
    let t4 = Timestamp::from_second(1_767_225_604).unwrap();
    let t3 = Timestamp::from_second(1_767_225_603).unwrap();

    // Insertion order fixes ids: a < b < z < y.
    for (value, at) in [("aaa", t5), ("bbb", t5), ("zzz", t4), ("yyy", t3)] {
        LinkRepository::insert(&fixture.store, link(value, at, None))
            .await
            .unwrap();
    }

    let first = list_page(&fixture.store, LinkFilter::default(), None, 2)
        .await
        .unwrap();
    let codes: Vec<&str> = first.items.iter().map(|l| l.code.as_str()).collect();
    assert_eq!(codes, ["bbb", "aaa"]);
    assert!(first.has_next_page());

    let cursor = first.next_cursor().unwrap().as_str().to_owned();
    let second = list_page(&fixture.store, LinkFilter::default(), Some(&cursor), 2)
        .await
        .unwrap();
    let codes: Vec<&str> = second.items.iter().map(|l| l.code.as_str()).collect();
    assert_eq!(codes, ["zzz", "yyy"]);
    assert!(!second.has_next_page());
}

#[tokio::test]
async fn deleted_user_frees_email() {
    let fixture = Fixture::start().await;
    let role_id = role(&fixture.store, "member").await;

    let first = UserRepository::insert(&fixture.store, user(role_id, "grace@example.com"))
        .await
        .unwrap();
    let err = UserRepository::insert(&fixture.store, user(role_id, "grace@example.com"))
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::Conflict(_)));

    assert!(
        UserRepository::soft_delete(&fixture.store, first.id, Some("admin".to_string()))
            .await
            .unwrap()
    );
    let second = UserRepository::insert(&fixture.store, user(role_id, "grace@example.com"))
        .await
        .unwrap();

    let live = fixture
        .store
        .find_by_email("grace@example.com", false)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(live.id, second.id);

    let listed = list_page(&fixture.store, UserFilter::default(), None, 10)
        .await
        .unwrap();
    assert_eq!(listed.items.len(), 1);
}

#[tokio::test]
async fn user_insert_requires_live_role() {
    let fixture = Fixture::start().await;
    let role_id = role(&fixture.store, "retired").await;
    assert!(RoleRepository::soft_delete(&fixture.store, role_id, None)
        .await
        .unwrap());

    for role_id in [role_id, RecordId::new(999)] {
        let err = UserRepository::insert(&fixture.store, user(role_id, "grace@example.com"))
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::MissingReference(_)));
    }
}

#[tokio::test]
async fn user_update_changes_email_and_reports_clashes() {
    let fixture = Fixture::start().await;
    let role_id = role(&fixture.store, "member").await;
    let grace = UserRepository::insert(&fixture.store, user(role_id, "grace@example.com"))
        .await
        .unwrap();
    UserRepository::insert(&fixture.store, user(role_id, "ada@example.com"))
        .await
        .unwrap();

    let moved = UserRepository::update(
        &fixture.store,
        grace.id,
        UserPatch {
            email: Some("admiral@example.com".to_string()),
            ..UserPatch::default()
        },
        Some("admin".to_string()),
    )
    .await
    .unwrap()
    .unwrap();
    assert_eq!(moved.email, "admiral@example.com");
    assert_eq!(moved.updated_by.as_deref(), Some("admin"));
    assert_eq!(moved.created_at, grace.created_at);

    let err = UserRepository::update(
        &fixture.store,
        grace.id,
        UserPatch {
            email: Some("ada@example.com".to_string()),
            ..UserPatch::default()
        },
        None,
    )
    .await
    .unwrap_err();
    assert!(matches!(err, StorageError::Conflict(_)));

    // The freed address can be taken by someone else.
    UserRepository::insert(&fixture.store, user(role_id, "grace@example.com"))
        .await
        .unwrap();
}

#[tokio::test]
async fn updates_skip_deleted_rows() {
    let fixture = Fixture::start().await;
    let role_id = role(&fixture.store, "member").await;
    let grace = UserRepository::insert(&fixture.store, user(role_id, "grace@example.com"))
        .await
        .unwrap();
    UserRepository::soft_delete(&fixture.store, grace.id, None)
        .await
        .unwrap();

    let renamed = UserRepository::update(
        &fixture.store,
        grace.id,
        UserPatch {
            fullname: Some("Ghost".to_string()),
            ..UserPatch::default()
        },
        None,
    )
    .await
    .unwrap();
    assert!(renamed.is_none());

    let updated_role = RoleRepository::update(
        &fixture.store,
        role_id,
        RolePatch {
            description: Some(Some("everyone".to_string())),
            ..RolePatch::default()
        },
        None,
    )
    .await
    .unwrap()
    .unwrap();
    assert_eq!(updated_role.description.as_deref(), Some("everyone"));

    RoleRepository::soft_delete(&fixture.store, role_id, None)
        .await
        .unwrap();
    let gone = RoleRepository::update(&fixture.store, role_id, RolePatch::default(), None)
        .await
        .unwrap();
    assert!(gone.is_none());
}
