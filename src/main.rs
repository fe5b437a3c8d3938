//! Demo: two devices edit a shared record offline and converge by
//! exchanging binary changes.

use orde_sdk::prelude::*;
use serde_json::json;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    println!("=== Citrine: offline edits, binary changes, convergence ===\n");

    // Device A seeds a document.
    let local = DocSession::from_json(&json!({
        "@context": "https://schema.org/",
        "@type": "WebSite",
        "name": "Foo",
        "description": "A website about foos",
        "url": "https://foo.example.com/"
    }))
    .expect("seed document");

    println!("device A ({}) created:", local.actor().short());
    println!("{}\n", serde_json::to_string_pretty(&local.to_json()).expect("render json"));

    // Device B receives a full copy, then both go offline.
    let remote = local.fork().expect("fork session");
    println!("device B ({}) cloned the document\n", remote.actor().short());

    // Device A edits while offline.
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
        .expect("commit patch");

    // The change is a self-contained byte string.
    let bytes = change.encode();
    println!("device A committed {} ({} bytes on the wire)", change.hash.short(), bytes.len());

    let hex: String = bytes.iter().take(32).map(|b| format!("{b:02x}")).collect();
    println!("wire prefix: {hex}...\n");

    // Anyone holding the bytes can inspect them.
    let summary = decode_change(&bytes).expect("decode change");
    println!("decoded change:");
    println!("  actor:   {}", &summary.actor[..8]);
    println!("  seq:     {}", summary.seq);
    println!("  time:    {}", summary.time);
    println!("  message: {}", summary.message);
    for op in &summary.ops {
        println!("  op:      {op}");
    }
    println!();

    // Device B applies the bytes and converges.
    remote
        .apply_encoded_changes([bytes.as_slice()])
        .expect("apply patch");

    println!("device B after merge:");
    println!("{}\n", serde_json::to_string_pretty(&remote.to_json()).expect("render json"));

    assert_eq!(local.to_json(), remote.to_json());
    println!("devices agree ✓");
}
