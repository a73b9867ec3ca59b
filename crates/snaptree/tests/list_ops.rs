use serde_json::{json, Value};
use snaptree::{Item, PathStep, Store, StoreError, View};

fn list_store(items: Value) -> (Store, View) {
    let store = Store::new(json!({ "l": items })).unwrap();
    let list = store.current().child("l").unwrap();
    (store, list)
}

fn ints(items: &[Item]) -> Vec<i64> {
    items.iter().filter_map(Item::as_i64).collect()
}

#[test]
fn push_append_unshift_prepend() {
    let (store, l) = list_store(json!([1, 2]));
    let l = l.push(3).unwrap();
    let l = l.append([4, 5]).unwrap();
    let l = l.unshift(0).unwrap();
    let l = l.prepend([-2, -1]).unwrap();
    assert_eq!(l.value(), json!([-2, -1, 0, 1, 2, 3, 4, 5]));
    assert_eq!(store.find_ptr("/l/7").unwrap().and_then(|i| i.as_i64()), Some(5));
}

#[test]
fn empty_append_and_prepend_are_noops() {
    let (store, l) = list_store(json!([1]));
    assert_eq!(l.append(Vec::<Value>::new()).unwrap(), l);
    assert_eq!(l.prepend(Vec::<Value>::new()).unwrap(), l);
    assert!(!store.has_pending());
}

#[test]
fn pop_and_shift_return_removed_items() {
    let (_store, l) = list_store(json!([1, {"k": 2}, 3]));
    let (l, last) = l.pop().unwrap();
    assert_eq!(last.and_then(|i| i.as_i64()), Some(3));
    let (l, first) = l.shift().unwrap();
    assert_eq!(first.and_then(|i| i.as_i64()), Some(1));
    let (l, obj) = l.pop().unwrap();
    assert_eq!(obj.map(|i| i.value()), Some(json!({"k": 2})));
    assert!(l.is_empty());
}

#[test]
fn pop_and_shift_on_empty_list_change_nothing() {
    let (store, l) = list_store(json!([]));
    let (same, item) = l.pop().unwrap();
    assert!(item.is_none());
    assert_eq!(same, l);
    let (same, item) = l.shift().unwrap();
    assert!(item.is_none());
    assert_eq!(same, l);
    assert!(!store.has_pending());
}

#[test]
fn splice_removes_and_inserts() {
    let (_store, l) = list_store(json!([0, 1, 2, 3, 4]));
    let (l, removed) = l.splice(1, 2, [json!("a"), json!({"b": true})]).unwrap();
    assert_eq!(ints(&removed), vec![1, 2]);
    assert_eq!(l.value(), json!([0, "a", {"b": true}, 3, 4]));

    let (l, removed) = l.splice(3, 0, [9]).unwrap();
    assert!(removed.is_empty());
    assert_eq!(l.value(), json!([0, "a", {"b": true}, 9, 3, 4]));
}

#[test]
fn splice_clamps_index_and_delete_count() {
    let (_store, l) = list_store(json!([0, 1, 2]));
    let (l, removed) = l.splice(100, 5, [3]).unwrap();
    assert!(removed.is_empty());
    assert_eq!(l.value(), json!([0, 1, 2, 3]));

    let (l, removed) = l.splice(2, 100, Vec::<Value>::new()).unwrap();
    assert_eq!(ints(&removed), vec![2, 3]);
    assert_eq!(l.value(), json!([0, 1]));
}

#[test]
fn set_by_index_overwrites_or_appends() {
    let (_store, l) = list_store(json!([0, 1]));
    let l = l.set([(0usize, 10)]).unwrap();
    let l = l.set([(2usize, 12)]).unwrap();
    assert_eq!(l.value(), json!([10, 1, 12]));

    // numeric keys address list positions too
    let l = l.set([("1", 11)]).unwrap();
    assert_eq!(l.value(), json!([10, 11, 12]));

    assert!(matches!(
        l.set([(5usize, 0)]),
        Err(StoreError::IndexOutOfBounds { index: 5, len: 3 })
    ));
    assert!(matches!(l.set([("x", 0)]), Err(StoreError::InvalidKey(key)) if key == "x"));
    assert_eq!(l.value(), json!([10, 11, 12]));
}

#[test]
fn set_appends_consecutive_indices_in_one_call() {
    let (_store, l) = list_store(json!([]));
    let l = l.set([(0usize, "a"), (1usize, "b")]).unwrap();
    assert_eq!(l.value(), json!(["a", "b"]));
}

#[test]
fn remove_indices_from_list() {
    let (store, l) = list_store(json!([0, 1, 2, 3]));
    let l = l.remove([0usize, 2, 9]).unwrap();
    assert_eq!(l.value(), json!([1, 3]));

    store.flush();
    let same = l.remove([7usize]).unwrap();
    assert_eq!(same, l);
    assert!(!store.has_pending());
}

#[test]
fn list_paths_follow_renumbering() {
    let (_store, l) = list_store(json!([{"id": 0}, {"id": 1}, {"id": 2}]));
    let third = l.child(2usize).unwrap();
    assert_eq!(third.pointers().unwrap(), vec!["/l/2"]);

    let (l, _) = l.shift().unwrap();
    assert_eq!(third.pointers().unwrap(), vec!["/l/1"]);
    assert_eq!(
        third.paths().unwrap(),
        vec![vec![PathStep::Key("l".into()), PathStep::Index(1)]]
    );

    let l = l.unshift(json!({"id": -1})).unwrap();
    let l = l.unshift(json!({"id": -2})).unwrap();
    assert_eq!(third.pointers().unwrap(), vec!["/l/3"]);
    assert_eq!(l.child(3usize).unwrap(), third);

    // removing an earlier item renumbers the later ones
    let first = l.child(0usize).unwrap();
    first.remove_self().unwrap();
    assert_eq!(third.pointers().unwrap(), vec!["/l/2"]);
}

#[test]
fn index_of_matches_views_by_identity() {
    let (_store, l) = list_store(json!([{"a": 1}, {"a": 1}, 7]));
    let second = l.child(1usize).unwrap();
    assert_eq!(l.index_of(&Item::View(second)), Some(1));
    assert_eq!(l.index_of(&Item::Scalar(7.into())), Some(2));
    assert_eq!(l.index_of(&Item::Scalar(8.into())), None);
}

#[test]
fn untouched_list_items_keep_identity() {
    let (store, l) = list_store(json!([{"a": 1}, {"b": 2}, {"c": 3}]));
    let before: Vec<View> = l.items().filter_map(|i| i.as_view().cloned()).collect();
    l.child(1usize).unwrap().set([("b", 20)]).unwrap();

    let after = store.current().child("l").unwrap();
    assert_ne!(after, l);
    assert_eq!(after.child(0usize).unwrap(), before[0]);
    assert_ne!(after.child(1usize).unwrap(), before[1]);
    assert_eq!(after.child(2usize).unwrap(), before[2]);
}

#[test]
fn unshift_keeps_identity_and_shifts_path() {
    let (_store, l) = list_store(json!([1, 2, {"w": 3}]));
    let w = l.child(2usize).unwrap();
    let l = l.unshift(0).unwrap();
    assert_eq!(l.value(), json!([0, 1, 2, {"w": 3}]));
    assert_eq!(l.child(3usize).unwrap(), w);
    assert_eq!(
        w.paths().unwrap(),
        vec![vec![PathStep::Key("l".into()), PathStep::Index(3)]]
    );
}

#[test]
fn list_keys_must_be_canonical_indices() {
    let (store, l) = list_store(json!([10, 11, 12]));
    assert_eq!(l.get("1").and_then(Item::as_i64), Some(11));
    assert!(l.get("+1").is_none());
    assert!(l.get("01").is_none());
    assert!(!l.contains_key(" 1"));

    let same = l.remove(["01", "+1"]).unwrap();
    assert_eq!(same, l);
    assert!(!store.has_pending());

    assert!(matches!(l.set([("01", 0)]), Err(StoreError::InvalidKey(key)) if key == "01"));
    assert_eq!(l.value(), json!([10, 11, 12]));
}
