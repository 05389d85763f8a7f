//! Create, load, update and delete through entity instances.

use crate::common::*;
use casio::StatementKind;

#[tokio::test]
async fn test_create_generates_primary_and_stamps() {
    let fx = Fixture::new();
    let user = fx.create_user("ann", "ann@example.com").await;

    assert!(user.is_created());
    let id = user.get("userId");
    assert!(id.as_str().is_some_and(|s| s.len() == 36));
    assert!(user.get("createdAt").as_int().is_some());
    assert_eq!(user.get("createdAt"), user.get("updatedAt"));
    assert_eq!(user.dirty().count(), 0);

    let insert = fx.gateway.last_statement().unwrap();
    assert_eq!(insert.kind(), StatementKind::Insert);
    assert_eq!(insert.assignments()[0].0, "KEY");
    assert_eq!(insert.assignments()[0].1, id);
}

#[tokio::test]
async fn test_create_rejects_invalid_instance() {
    let fx = Fixture::new();
    let mut user = fx.user.build([("name", "bob")]);
    let err = user.create().await.unwrap_err();
    let errors = err.validation_errors().unwrap();
    assert_eq!(errors.get("email").unwrap(), &["email is null.".to_string()]);
    assert!(!user.is_created());
    assert!(fx.gateway.statements().is_empty());

    user.set_one("email", "not-an-address");
    assert!(!user.validate());
    assert_eq!(
        user.errors().get("email").unwrap(),
        &["email is not an address".to_string()]
    );
}

#[tokio::test]
async fn test_load_is_clean_and_carries_timestamps() {
    let fx = Fixture::new();
    let created = fx.create_user("ann", "ann@example.com").await;
    let id = created.get("userId");

    let loaded = fx.user.get(id.clone()).await.unwrap().unwrap();
    assert!(loaded.is_loaded());
    assert_eq!(loaded.dirty().count(), 0);
    assert_eq!(loaded.get("userId"), id);
    assert_eq!(loaded.get("name"), Value::from("ann"));
    assert_eq!(loaded.key(), Some(&id));
    assert!(loaded.cftimestamp("email").is_some());
    assert_eq!(loaded.persisted("email"), Some(&Value::from("ann@example.com")));
}

#[tokio::test]
async fn test_update_writes_only_dirty_attributes() {
    let fx = Fixture::new();
    let created = fx.create_user("ann", "ann@example.com").await;
    let mut user = fx.user.get(created.get("userId")).await.unwrap().unwrap();

    user.set([("name", "anna")]);
    assert!(user.is_dirty("name"));
    user.update().await.unwrap();
    assert_eq!(user.dirty().count(), 0);

    let update = fx.gateway.last_statement().unwrap();
    assert_eq!(update.kind(), StatementKind::Update);
    let written: Vec<&str> = update.assignments().iter().map(|(n, _)| n.as_str()).collect();
    assert_eq!(written, vec!["name", "updatedAt"]);

    let reread = fx.user.get(created.get("userId")).await.unwrap().unwrap();
    assert_eq!(reread.get("name"), Value::from("anna"));
}

#[tokio::test]
async fn test_direct_assignment_is_invisible_to_update() {
    let fx = Fixture::new();
    let created = fx.create_user("ann", "ann@example.com").await;
    let mut user = fx.user.get(created.get("userId")).await.unwrap().unwrap();
    fx.gateway.clear_statements();

    user.assign("name", "sneaky");
    user.update().await.unwrap();
    assert!(fx.gateway.statements().is_empty());

    user.mark_dirty("name");
    user.save().await.unwrap();
    assert_eq!(fx.gateway.statements().len(), 1);
}

#[tokio::test]
async fn test_save_creates_then_updates() {
    let fx = Fixture::new();
    let mut user = fx.user.build([("email", "c@example.com")]);
    user.save().await.unwrap();
    assert!(user.is_created());
    assert_eq!(fx.gateway.last_statement().unwrap().kind(), StatementKind::Insert);

    user.set_one("age", 31);
    user.save().await.unwrap();
    assert_eq!(fx.gateway.last_statement().unwrap().kind(), StatementKind::Update);
}

#[tokio::test]
async fn test_delete_hides_row_from_reads() {
    let fx = Fixture::new();
    let mut user = fx.create_user("ann", "ann@example.com").await;
    let id = user.get("userId");

    user.delete().await.unwrap();
    assert!(user.is_deleted());
    assert!(fx.user.get(id.clone()).await.unwrap().is_none());
    assert!(fx.user.find(Query::new()).await.unwrap().is_empty());
    assert_eq!(fx.user.count(None).await.unwrap(), 0);
}

#[tokio::test]
async fn test_counter_columns() {
    let fx = Fixture::new();
    let user = fx.create_user("ann", "ann@example.com").await;
    user.incr("visits", None).await.unwrap();
    user.incr("visits", Some(10)).await.unwrap();
    user.decr("visits", None).await.unwrap();

    let loaded = fx.user.get(user.get("userId")).await.unwrap().unwrap();
    assert_eq!(loaded.get("visits"), Value::Int(10));
}

#[tokio::test]
async fn test_serialization_view() {
    let fx = Fixture::new();
    let mut user = fx.user.build([
        ("name", Value::from("ann")),
        ("email", Value::from("ann@example.com")),
        ("visits", Value::Int(9_007_199_254_740_993)),
        ("password", Value::from("hunter2")),
    ]);
    user.create().await.unwrap();
    user.assign("nickname", "a");
    user.add_external("nickname");

    let json = user.to_serializable(None);
    assert_eq!(json["name"], "ann");
    assert_eq!(json["visits"], "9007199254740993");
    assert_eq!(json["greeting"], "hello ann");
    assert_eq!(json["nickname"], "a");
    assert!(json.get("password").is_none());

    let subset = user.to_serializable(Some(&["name"][..]));
    assert_eq!(subset.as_object().unwrap().len(), 1);
}
