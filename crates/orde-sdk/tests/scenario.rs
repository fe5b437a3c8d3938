//! End-to-end scenario: two devices edit a shared record offline and
//! converge by exchanging binary changes.

use orde_sdk::prelude::*;
use serde_json::json;

fn seed() -> serde_json::Value {
    json!({
        "@context": "https://schema.org/",
        "@type": "WebSite",
        "name": "Foo",
        "description": "A website about foos",
        "url": "https://foo.example.com/"
    })
}

#[test]
fn test_patch_travels_as_bytes_and_merges() {
    let local = DocSession::from_json(&seed()).unwrap();
    let remote = local.fork().unwrap();

    let change = local
        .change("Applying user patch", |draft| {
            draft.put(&Path::root(), "name", &json!("Bar"))?;
            draft.put(
                &Path::root(),
                "image",
                &json!("https://bar.example.com/logo.png"),
            )?;
            draft.delete(&Path::root(), "url")
        })
        .unwrap();

    // The change is self-describing on the wire.
    let bytes = change.encode();
    let summary = decode_change(&bytes).unwrap();
    assert_eq!(summary.actor, local.actor().to_string());
    assert_eq!(summary.seq, 2);
    assert_eq!(summary.message, "Applying user patch");
    assert_eq!(summary.ops.len(), 3);

    remote.apply_encoded_changes([bytes.as_slice()]).unwrap();

    let expected = json!({
        "@context": "https://schema.org/",
        "@type": "WebSite",
        "name": "Bar",
        "description": "A website about foos",
        "image": "https://bar.example.com/logo.png"
    });
    assert_eq!(remote.to_json(), expected);
    assert_eq!(local.to_json(), expected);
}

#[test]
fn test_reapplying_changes_is_harmless() {
    let local = DocSession::from_json(&seed()).unwrap();
    let remote = local.fork().unwrap();

    let change = local
        .change("rename", |draft| {
            draft.put(&Path::root(), "name", &json!("Bar"))
        })
        .unwrap();

    assert_eq!(remote.apply_change(change.clone()).unwrap(), ApplyStatus::Applied);
    assert_eq!(
        remote.apply_change(change).unwrap(),
        ApplyStatus::Duplicate
    );
    assert_eq!(remote.to_json(), local.to_json());
}

#[test]
fn test_offline_edits_on_both_sides_converge() {
    let local = DocSession::from_json(&seed()).unwrap();
    let remote = local.fork().unwrap();

    local
        .change("rename", |draft| {
            draft.put(&Path::root(), "name", &json!("Bar"))
        })
        .unwrap();
    remote
        .change("redescribe", |draft| {
            draft.put(
                &Path::root(),
                "description",
                &json!("A website about bars"),
            )
        })
        .unwrap();

    local.sync_with(&remote).unwrap();

    assert_eq!(local.to_json(), remote.to_json());
    let merged = local.to_json();
    assert_eq!(merged["name"], json!("Bar"));
    assert_eq!(merged["description"], json!("A website about bars"));
}

#[test]
fn test_out_of_order_delivery_over_the_wire() {
    let local = DocSession::from_json(&seed()).unwrap();
    local
        .change("first", |draft| {
            draft.put(&Path::root(), "name", &json!("Bar"))
        })
        .unwrap();
    local
        .change("second", |draft| {
            draft.put(&Path::root(), "name", &json!("Baz"))
        })
        .unwrap();

    let mut payloads: Vec<Vec<u8>> = local
        .all_changes()
        .iter()
        .map(Change::encode)
        .collect();
    payloads.reverse();

    let remote = DocSession::new();
    remote
        .apply_encoded_changes(payloads.iter().map(Vec::as_slice))
        .unwrap();

    assert_eq!(remote.pending_len(), 0);
    assert_eq!(remote.to_json(), local.to_json());
}
