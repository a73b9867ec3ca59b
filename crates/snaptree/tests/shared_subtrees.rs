use std::cell::{Cell, RefCell};
use std::rc::Rc;

use serde_json::json;
use snaptree::{PathStep, Store, StoreError, View};

#[test]
fn shared_subtree_is_one_node() {
    let store = Store::new(json!({"b": {"x": 1}})).unwrap();
    let b = store.current().child("b").unwrap();

    let root = store.current().set([("d", &b)]).unwrap();
    assert_eq!(root.child("d").unwrap(), b);
    assert_eq!(root.child("b").unwrap(), b);
    assert_eq!(store.node_count(), 2);

    let d = root.child("d").unwrap();
    let updated = d.set([("x", 2)]).unwrap();
    let root = store.current();
    assert_eq!(root.child("b").unwrap(), updated);
    assert_eq!(root.child("d").unwrap(), updated);
    assert_eq!(root.value(), json!({"b": {"x": 2}, "d": {"x": 2}}));
}

#[test]
fn paths_list_every_location() {
    let store = Store::new(json!({"b": {"x": 1}, "l": []})).unwrap();
    let b = store.current().child("b").unwrap();
    store.current().set([("d", &b)]).unwrap();
    store.current().child("l").unwrap().append([&b, &b]).unwrap();

    assert_eq!(
        b.paths().unwrap(),
        vec![
            vec![PathStep::Key("b".into())],
            vec![PathStep::Key("d".into())],
            vec![PathStep::Key("l".into()), PathStep::Index(0)],
            vec![PathStep::Key("l".into()), PathStep::Index(1)],
        ]
    );
    assert_eq!(b.pointers().unwrap(), vec!["/b", "/d", "/l/0", "/l/1"]);
    assert_eq!(store.current().pointers().unwrap(), vec![""]);
}

#[test]
fn node_is_evicted_with_its_last_reference() {
    let store = Store::new(json!({"b": {"inner": {"deep": [1]}}})).unwrap();
    let b = store.current().child("b").unwrap();
    let deep = b.child("inner").unwrap().child("deep").unwrap();
    store.current().set([("d", &b)]).unwrap();
    assert_eq!(store.node_count(), 4);

    store.current().remove(["b"]).unwrap();
    assert_eq!(store.node_count(), 4);
    assert!(store.contains(&b));

    store.current().remove(["d"]).unwrap();
    assert_eq!(store.node_count(), 1);
    assert!(!store.contains(&b));
    assert!(!store.contains(&deep));

    assert!(matches!(b.set([("x", 1)]), Err(StoreError::StaleReference(id)) if id == b.id()));
    assert!(matches!(deep.push(2), Err(StoreError::StaleReference(_))));
    assert!(matches!(b.paths(), Err(StoreError::StaleReference(_))));
    assert!(matches!(b.listener(), Err(StoreError::StaleReference(_))));
    // old snapshots stay readable
    assert_eq!(b.value(), json!({"inner": {"deep": [1]}}));
}

#[test]
fn moving_a_subtree_within_one_call_keeps_it_alive() {
    let store = Store::new(json!({"a": {"v": 1}})).unwrap();
    let a = store.current().child("a").unwrap();
    let root = store
        .current()
        .set([("a", snaptree::Fragment::null()), ("moved", a.clone().into())])
        .unwrap();
    assert_eq!(root.child("moved").unwrap(), a);
    assert!(store.contains(&a));
    assert_eq!(store.node_count(), 2);
}

#[test]
fn evicted_view_is_revived_when_inserted_again() {
    let store = Store::new(json!({"a": {"v": [1, 2]}})).unwrap();
    let a = store.current().child("a").unwrap();
    store.current().remove(["a"]).unwrap();
    assert!(!store.contains(&a));

    let root = store.current().set([("back", &a)]).unwrap();
    assert_eq!(root.child("back").unwrap(), a);
    assert!(store.contains(&a));
    assert!(a.is_current());
    let v = a.child("v").unwrap().push(3).unwrap();
    assert_eq!(store.current().value(), json!({"back": {"v": [1, 2, 3]}}));
    assert_eq!(store.current().at_ptr("/back/v").unwrap(), Some(snaptree::Item::View(v)));
}

#[test]
fn older_view_of_live_node_shares_its_current_state() {
    let store = Store::new(json!({"b": {"z": 1}})).unwrap();
    let old = store.current().child("b").unwrap();
    let current = old.set([("z", 2)]).unwrap();
    store.flush();

    let calls = Rc::new(Cell::new(0));
    let counter = Rc::clone(&calls);
    old.listener()
        .unwrap()
        .on("update", move |_: &View| counter.set(counter.get() + 1));

    let root = store.current().set([("c", &old)]).unwrap();
    assert_eq!(root.child("c").unwrap(), current);
    assert_eq!(root.child("b").unwrap(), current);
    assert_eq!(root.value(), json!({"b": {"z": 2}, "c": {"z": 2}}));
    assert_eq!(store.node_count(), 2);
    assert_eq!(old.value(), json!({"z": 1}));

    // b itself was not written, so its listener stays quiet
    store.flush();
    assert_eq!(calls.get(), 0);
}

#[test]
fn older_and_current_views_in_one_write_agree() {
    let store = Store::new(json!({"b": {"z": 1}})).unwrap();
    let old = store.current().child("b").unwrap();
    let current = old.set([("z", 2)]).unwrap();

    let root = store
        .current()
        .set([("c", &old), ("e", &current)])
        .unwrap();
    assert_eq!(root.child("c").unwrap(), current);
    assert_eq!(root.child("e").unwrap(), current);
    assert_eq!(
        root.value(),
        json!({"b": {"z": 2}, "c": {"z": 2}, "e": {"z": 2}})
    );
}

#[test]
fn revived_node_takes_its_first_generation_in_one_write() {
    let store = Store::new(json!({"x": {"n": 1}})).unwrap();
    let first = store.current().child("x").unwrap();
    let second = first.set([("n", 2)]).unwrap();
    store.current().remove(["x"]).unwrap();
    assert!(!store.contains(&first));

    let root = store
        .current()
        .set([("p", &first), ("q", &second)])
        .unwrap();
    assert_eq!(root.child("p").unwrap(), first);
    assert_eq!(root.child("q").unwrap(), first);
    assert_eq!(root.value(), json!({"p": {"n": 1}, "q": {"n": 1}}));
    assert_eq!(store.node_count(), 2);
}

#[test]
fn revived_parent_is_rebuilt_around_a_newer_child() {
    let store = Store::new(json!({"w": {"x": {"n": 1}}})).unwrap();
    let w1 = store.current().child("w").unwrap();
    let x1 = w1.child("x").unwrap();
    let x2 = x1.set([("n", 2)]).unwrap();
    store.current().remove(["w"]).unwrap();
    assert!(!store.contains(&w1));
    assert!(!store.contains(&x1));

    // x comes back as x2 first, so w1 no longer describes w's children
    let root = store.current().set([("x", &x2), ("w", &w1)]).unwrap();
    let w = root.child("w").unwrap();
    assert_ne!(w, w1);
    assert_eq!(w.id(), w1.id());
    assert_eq!(w.child("x").unwrap(), x2);
    assert_eq!(root.child("x").unwrap(), x2);
    assert_eq!(root.value(), json!({"x": {"n": 2}, "w": {"x": {"n": 2}}}));
    assert!(w.is_current());
    assert!(!w1.is_current());
}

#[test]
fn cycles_are_rejected_without_changes() {
    let store = Store::new(json!({"a": {"b": {}}})).unwrap();
    let before = store.current();
    let a = before.child("a").unwrap();
    let b = a.child("b").unwrap();

    assert!(matches!(
        b.set([("loop", &a)]),
        Err(StoreError::CycleDetected(id)) if id == a.id()
    ));
    assert!(matches!(
        a.set([("self", &a)]),
        Err(StoreError::CycleDetected(_))
    ));
    assert!(matches!(
        b.append([&before]),
        Err(StoreError::UnsupportedOperation { .. })
    ));
    assert!(matches!(
        b.set([("root", &before)]),
        Err(StoreError::CycleDetected(id)) if id == before.id()
    ));
    assert!(matches!(
        store.replace_all(json!({"inner": {}})).and_then(|_| {
            let root = store.current();
            root.child("inner").unwrap().set([("up", &root)])
        }),
        Err(StoreError::CycleDetected(_))
    ));
    assert!(matches!(
        store.replace_all(snaptree::Fragment::map([("me", store.current())])),
        Err(StoreError::CycleDetected(_))
    ));
    assert_eq!(store.current().value(), json!({"inner": {}}));
}

#[test]
fn cycle_check_covers_every_ancestor_of_a_shared_node() {
    let store = Store::new(json!({"p": {"s": {}}, "q": {}})).unwrap();
    let s = store
        .current()
        .at_ptr("/p/s")
        .unwrap()
        .and_then(|i| i.as_view().cloned())
        .unwrap();
    let q = store.current().child("q").unwrap();
    q.set([("s", &s)]).unwrap();

    let q = store.current().child("q").unwrap();
    assert!(matches!(
        s.set([("q", &q)]),
        Err(StoreError::CycleDetected(id)) if id == q.id()
    ));
    let p = store.current().child("p").unwrap();
    assert!(matches!(
        s.set([("p", &p)]),
        Err(StoreError::CycleDetected(_))
    ));
}

#[test]
fn remove_self_detaches_from_every_parent() {
    let store = Store::new(json!({"m": {"v": 1}, "l": [0]})).unwrap();
    let m = store.current().child("m").unwrap();
    let l = store.current().child("l").unwrap();
    l.append([&m, &m]).unwrap();
    l.append([7]).unwrap();

    let root = m.remove_self().unwrap();
    assert_eq!(root, store.current());
    assert_eq!(root.value(), json!({"l": [0, 7]}));
    assert!(!store.contains(&m));
    assert_eq!(store.node_count(), 2);
}

#[test]
fn listener_of_shared_node_sees_updates_from_any_path() {
    let store = Store::new(json!({"b": {"x": 1}, "other": {}})).unwrap();
    let b = store.current().child("b").unwrap();
    store.current().set([("d", &b)]).unwrap();
    store.flush();

    let seen = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&seen);
    b.listener()
        .unwrap()
        .on("update", move |view: &View| sink.borrow_mut().push(view.value()));

    store.current().child("d").unwrap().set([("x", 2)]).unwrap();
    store.current().child("b").unwrap().set([("y", 3)]).unwrap();
    store.current().child("other").unwrap().set([("z", 0)]).unwrap();
    store.flush();

    assert_eq!(*seen.borrow(), vec![json!({"x": 2, "y": 3})]);
}
