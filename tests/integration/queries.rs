//! Type-level reads: where resolution, projections, counts.

use crate::common::*;
use casio::{Args, MaterializedRow};

#[tokio::test]
async fn test_find_by_id_list() {
    let fx = Fixture::new();
    let a = fx.create_user("a", "a@example.com").await;
    let b = fx.create_user("b", "b@example.com").await;
    fx.create_user("c", "c@example.com").await;

    let found = fx
        .user
        .find(WhereSpec::ids([a.get("userId"), b.get("userId")]))
        .await
        .unwrap();
    let mut names: Vec<String> = found.iter().map(|u| u.get("name").to_key_string()).collect();
    names.sort();
    assert_eq!(names, vec!["a", "b"]);

    let rendered = fx.gateway.last_statement().unwrap().to_string();
    assert!(rendered.contains("KEY IN"));
}

#[tokio::test]
async fn test_clause_on_primary_targets_storage_key() {
    let fx = Fixture::new();
    let a = fx.create_user("a", "a@example.com").await;
    fx.create_user("b", "b@example.com").await;

    let found = fx
        .user
        .find(WhereSpec::clause_with("userId = :userId", "userId", a.get("userId")))
        .await
        .unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].get("name"), Value::from("a"));

    let stmt = fx.gateway.last_statement().unwrap();
    assert_eq!(stmt.predicate().unwrap().clause, "KEY = :KEY");
}

#[tokio::test]
async fn test_clause_on_secondary_column() {
    let fx = Fixture::new();
    let owner = fx.create_user("ann", "ann@example.com").await;
    fx.create_pet(&owner, "rex").await;
    fx.create_pet(&owner, "tom").await;

    let mut args = Args::new();
    args.insert("userId".into(), owner.get("userId"));
    let pets = fx
        .pet
        .find(Query::new().filter(WhereSpec::clause("userId = :userId", args)))
        .await
        .unwrap();
    assert_eq!(pets.len(), 2);
    assert!(pets.iter().all(|p| p.get("userId") == owner.get("userId")));
}

#[tokio::test]
async fn test_get_requires_a_filter() {
    let fx = Fixture::new();
    let err = fx.user.get(Query::new()).await.unwrap_err();
    assert!(matches!(err, Error::InvalidWhere { .. }));

    let err = fx.user.get(WhereSpec::ids(Vec::<Value>::new())).await.unwrap_err();
    assert!(matches!(err, Error::InvalidWhere { .. }));
}

#[tokio::test]
async fn test_get_missing_row_is_none() {
    let fx = Fixture::new();
    assert!(fx.user.get("no-such-user").await.unwrap().is_none());
}

#[tokio::test]
async fn test_single_column_projection() {
    let fx = Fixture::new();
    let user = fx.create_user("ann", "ann@example.com").await;

    let loaded = fx
        .user
        .get(Query::new().filter(user.get("userId")).columns(&["email"]))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(loaded.get("email"), Value::from("ann@example.com"));
    // Not selected, so the schema default shows through.
    assert_eq!(loaded.get("name"), Value::from("anonymous"));
}

#[tokio::test]
async fn test_projection_types() {
    let fx = Fixture::new();
    let user = fx.create_user("ann", "ann@example.com").await;
    let id = user.get("userId");

    let short: UserShort = fx.user.get_as(id.clone()).await.unwrap().unwrap();
    assert_eq!(
        short,
        UserShort {
            user_id: id.to_key_string(),
            name: "ann".into(),
        }
    );

    let rows: Vec<MaterializedRow> = fx.user.find_as(Query::new()).await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].get("email"), &Value::from("ann@example.com"));

    let json: Vec<serde_json::Value> = fx.user.find_as(Query::new()).await.unwrap();
    assert_eq!(json[0]["name"], "ann");
}

#[tokio::test]
async fn test_count_and_limit() {
    let fx = Fixture::new();
    for i in 0..4 {
        fx.create_user(&format!("u{i}"), &format!("u{i}@example.com")).await;
    }
    assert_eq!(fx.user.count(None).await.unwrap(), 4);

    let limited = fx.user.find(Query::new().limit(3)).await.unwrap();
    assert_eq!(limited.len(), 3);

    let mut args = Args::new();
    args.insert("name".into(), "u2".into());
    let filtered = fx
        .user
        .count(Some(WhereSpec::clause("name = :name", args)))
        .await
        .unwrap();
    assert_eq!(filtered, 1);
}
