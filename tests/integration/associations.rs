//! Eager association loading across entity types.

use crate::common::*;
use casio::{EagerSpec, Related};

#[tokio::test]
async fn test_has_many_and_has_one() {
    let fx = Fixture::new();
    let owner = fx.create_user("ann", "ann@example.com").await;
    fx.create_pet(&owner, "rex").await;
    fx.create_pet(&owner, "tom").await;
    let mut person = fx.person.build([("bio", "likes dogs")]);
    person.set_one("userId", owner.get("userId"));
    person.create().await.unwrap();

    let loaded = fx
        .user
        .get(Query::new().filter(owner.get("userId")).eager(["pets", "person"]))
        .await
        .unwrap()
        .unwrap();

    let mut pets: Vec<String> = loaded
        .related_many("pets")
        .iter()
        .map(|p| p.get("name").to_key_string())
        .collect();
    pets.sort();
    assert_eq!(pets, vec!["rex", "tom"]);

    let profile = loaded.related_one("person").unwrap();
    assert_eq!(profile.get("bio"), Value::from("likes dogs"));
    assert!(loaded.eager_graph().unwrap().get("pets").is_some());
}

#[tokio::test]
async fn test_belongs_to_and_nested_graph() {
    let fx = Fixture::new();
    let owner = fx.create_user("ann", "ann@example.com").await;
    let pet = fx.create_pet(&owner, "rex").await;
    fx.create_pet(&owner, "tom").await;

    let graph = EagerSpec::new().nested("owner", EagerSpec::from("pets"));
    let loaded = fx
        .pet
        .get(Query::new().filter(pet.get("petId")).eager(graph))
        .await
        .unwrap()
        .unwrap();

    let loaded_owner = loaded.related_one("owner").unwrap();
    assert_eq!(loaded_owner.get("userId"), owner.get("userId"));
    assert_eq!(loaded_owner.related_many("pets").len(), 2);
}

#[tokio::test]
async fn test_missing_reference_loads_empty() {
    let fx = Fixture::new();
    let lonely = fx.create_user("lonely", "lonely@example.com").await;
    let mut stray = fx.pet.build([("name", "stray")]);
    stray.create().await.unwrap();

    let users = fx
        .user
        .find(Query::new().filter(lonely.get("userId")).eager(["pets", "person"]))
        .await
        .unwrap();
    assert!(users[0].related_many("pets").is_empty());
    assert!(matches!(users[0].related("person"), Some(Related::One(None))));

    let pets = fx
        .pet
        .find(Query::new().filter(stray.get("petId")).eager("owner"))
        .await
        .unwrap();
    assert!(matches!(pets[0].related("owner"), Some(Related::One(None))));
}

#[tokio::test]
async fn test_unknown_association_is_skipped() {
    let fx = Fixture::new();
    let owner = fx.create_user("ann", "ann@example.com").await;
    let loaded = fx
        .user
        .find(Query::new().filter(owner.get("userId")).eager(["friends"]))
        .await
        .unwrap();
    assert_eq!(loaded.len(), 1);
    assert!(loaded[0].related("friends").is_none());
}

#[tokio::test]
async fn test_failed_fetch_fails_the_whole_load() {
    let fx = Fixture::new();
    let owner = fx.create_user("ann", "ann@example.com").await;
    fx.create_pet(&owner, "rex").await;

    fx.gateway.fail_next_on("Pet", Error::storage("pets unavailable"));
    let err = fx
        .user
        .find(Query::new().filter(owner.get("userId")).eager(["pets", "person"]))
        .await
        .unwrap_err();
    assert!(err.is_storage());

    let loaded = fx
        .user
        .find(Query::new().filter(owner.get("userId")).eager(["pets"]))
        .await
        .unwrap();
    assert_eq!(loaded[0].related_many("pets").len(), 1);
}

#[tokio::test]
async fn test_loaded_belongs_to_updates_foreign_key() {
    let fx = Fixture::new();
    let first = fx.create_user("first", "first@example.com").await;
    let second = fx.create_user("second", "second@example.com").await;
    let pet = fx.create_pet(&first, "rex").await;

    let mut loaded = fx.pet.get(pet.get("petId")).await.unwrap().unwrap();
    loaded.attach("owner", Related::One(Some(Box::new(second.clone()))));
    loaded.update().await.unwrap();

    let reread = fx.pet.get(pet.get("petId")).await.unwrap().unwrap();
    assert_eq!(reread.get("userId"), second.get("userId"));
}

#[tokio::test]
async fn test_serialization_includes_loaded_associations() {
    let fx = Fixture::new();
    let owner = fx.create_user("ann", "ann@example.com").await;
    fx.create_pet(&owner, "rex").await;

    let loaded = fx
        .user
        .get(Query::new().filter(owner.get("userId")).eager(["pets"]))
        .await
        .unwrap()
        .unwrap();
    let json = loaded.to_serializable(None);
    assert_eq!(json["pets"][0]["name"], "rex");
    assert!(json.get("person").is_none());
}

#[tokio::test]
async fn test_unloaded_has_many_serializes_as_empty_list() {
    let fx = Fixture::new();
    let owner = fx.create_user("ann", "ann@example.com").await;
    fx.create_pet(&owner, "rex").await;

    let loaded = fx.user.get(owner.get("userId")).await.unwrap().unwrap();
    let json = loaded.to_serializable(None);
    assert_eq!(json["pets"], serde_json::json!([]));
    assert!(json.get("person").is_none());
}
