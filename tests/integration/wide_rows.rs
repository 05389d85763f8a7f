//! Wide-row pagination through the facade.

use crate::common::*;
use casio::RangeArgs;

#[tokio::test]
async fn test_paging_matches_a_single_full_read() {
    let fx = Fixture::new();
    let mut ballot = fx.vote.generate();
    for i in 0..7 {
        ballot.push(&format!("voter-{i:02}"), i);
    }
    ballot.create().await.unwrap();

    let mut full = fx.vote.instance(ballot.key());
    let everything: Vec<String> = full
        .range(RangeArgs::new())
        .await
        .unwrap()
        .iter()
        .map(|c| c.name.clone())
        .collect();
    assert_eq!(everything.len(), 7);

    let mut paged = fx.vote.instance(ballot.key());
    paged.range(3usize).await.unwrap();
    while paged.has_next() {
        paged.next(3usize).await.unwrap();
    }
    let stitched: Vec<String> = paged.rows().iter().map(|c| c.name.clone()).collect();
    assert_eq!(stitched, everything);
}

#[tokio::test]
async fn test_paging_backwards_from_the_end() {
    let fx = Fixture::new();
    let mut ballot = fx.vote.instance("ballot-1");
    for name in ["a", "b", "c", "d", "e", "f"] {
        ballot.push(name, 1);
    }
    ballot.create().await.unwrap();

    let mut view = fx.vote.instance("ballot-1");
    view.range(RangeArgs::new().first(2).reversed()).await.unwrap();
    while view.has_prev() {
        view.prev(2usize).await.unwrap();
    }
    let names: Vec<&str> = view.rows().iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, vec!["a", "b", "c", "d", "e", "f"]);
}

#[tokio::test]
async fn test_array_type_lookup_by_name() {
    let fx = Fixture::new();
    let vote = fx.keyspace.array_named("Vote").unwrap();
    assert_eq!(vote.primary(), "key");
    assert!(matches!(
        fx.keyspace.array_named("User"),
        Err(Error::Precondition { .. })
    ));
}
