//! End-to-end tests of the claim store over the filesystem backend.

use std::sync::Arc;

use capstan_core::bundle::{Bundle, OutputDefinition, TypeSchema};
use capstan_core::claim::{
    Claim, ClaimStore, Installation, Output, ACTION_INSTALL, ACTION_UNKNOWN, STATUS_SUCCEEDED,
};
use capstan_core::storage::{
    claim_store_extensions, BackingStore, CryptoError, EncryptionHandler, FileSystemStore,
};

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;

fn example_bundle() -> Bundle {
    let mut bundle = Bundle {
        name: "mybun".to_string(),
        version: "0.1.0".to_string(),
        ..Bundle::default()
    };
    bundle.definitions.insert(
        "password".to_string(),
        TypeSchema {
            schema_type: "string".to_string(),
            write_only: Some(true),
            ..TypeSchema::default()
        },
    );
    bundle.outputs.insert(
        "password".to_string(),
        OutputDefinition {
            definition: "password".to_string(),
            ..OutputDefinition::default()
        },
    );
    bundle
}

fn file_store(root: &std::path::Path) -> ClaimStore {
    ClaimStore::new(BackingStore::new(FileSystemStore::new(
        root,
        claim_store_extensions(),
    )))
}

#[test]
fn save_read_and_delete_roundtrip() {
    let tmp = tempfile::tempdir().expect("failed to create temp dir");
    let root = tmp.path().join("claimstore");
    let store = file_store(&root);

    let bundle = example_bundle();
    let installation = Installation::new("", "foo", &bundle, "", "").unwrap();
    store.save_installation(&installation).unwrap();

    let claim = Claim::new(
        "foo",
        ACTION_INSTALL,
        bundle,
        "example.com/mybun:v0.1.0",
        "sha256:abc123",
        None,
    );
    store.save_claim(&claim).unwrap();

    // The installation and claim files exist where the layout promises.
    assert!(root.join("installations/foo.json").is_file());
    assert!(root
        .join(format!("claims/foo/{}.json", claim.id))
        .is_file());

    let read_back = store.read_last_claim("foo").unwrap();
    assert_eq!(read_back.bundle, claim.bundle);
    assert_eq!(read_back.id, claim.id);

    let installations = store.list_installations("").unwrap();
    assert_eq!(installations, vec!["foo"]);

    store.delete_installation("foo").unwrap();

    assert!(
        store.read_claim(&claim.id).is_err(),
        "claims of the installation should have been deleted"
    );
    let installations = store.list_installations("").unwrap();
    assert!(installations.is_empty(), "the installation should be gone");
    assert!(!root.join("installations/foo.json").exists());
}

#[test]
fn claims_can_be_superseded() {
    let tmp = tempfile::tempdir().expect("failed to create temp dir");
    let store = file_store(&tmp.path().join("claimstore"));

    let bundle = Bundle {
        name: "foobundle".to_string(),
        version: "0.1.2".to_string(),
        ..Bundle::default()
    };
    let installation = Installation::new("", "foo", &bundle, "", "").unwrap();
    store.save_installation(&installation).unwrap();

    let first = Claim::new("foo", ACTION_UNKNOWN, bundle.clone(), "", "", None);
    store.save_claim(&first).unwrap();

    let second = first.next_claim(ACTION_INSTALL, bundle, "", "", None);
    store.save_claim(&second).unwrap();

    let last = store.read_last_claim("foo").unwrap();
    assert_eq!(last.action, ACTION_INSTALL, "wrong action");
    assert_ne!(first.revision, last.revision, "revision did not update");
}

#[test]
fn result_metadata_updates_survive_the_filesystem() {
    let tmp = tempfile::tempdir().expect("failed to create temp dir");
    let store = file_store(&tmp.path().join("claimstore"));

    let bundle = example_bundle();
    let installation = Installation::new("", "foo", &bundle, "", "").unwrap();
    store.save_installation(&installation).unwrap();
    let claim = Claim::new("foo", ACTION_INSTALL, bundle, "", "", None);
    store.save_claim(&claim).unwrap();

    let mut result = claim.new_result(STATUS_SUCCEEDED);
    result
        .output_metadata
        .insert("foo-output".to_string(), serde_json::json!(true));
    result
        .output_metadata
        .insert("bar-output".to_string(), serde_json::json!("bar"));
    store.save_result(&result).unwrap();

    let mut stored = store.read_result(&result.id).unwrap();
    assert_eq!(stored.output_metadata, result.output_metadata);

    stored
        .output_metadata
        .insert("bar-output".to_string(), serde_json::json!("baz"));
    store.save_result(&stored).unwrap();

    let updated = store.read_result(&result.id).unwrap();
    assert_eq!(
        updated.output_metadata.get("bar-output"),
        Some(&serde_json::json!("baz"))
    );
}

#[test]
fn sensitive_outputs_are_encrypted_on_disk() {
    let tmp = tempfile::tempdir().expect("failed to create temp dir");
    let root = tmp.path().join("claimstore");

    let encrypt: EncryptionHandler = Arc::new(|data: &[u8]| -> Result<Vec<u8>, CryptoError> {
        Ok(BASE64.encode(data).into_bytes())
    });
    let decrypt: EncryptionHandler = Arc::new(|data: &[u8]| -> Result<Vec<u8>, CryptoError> {
        let text = std::str::from_utf8(data)?;
        Ok(BASE64.decode(text)?)
    });
    let datastore = FileSystemStore::new(&root, claim_store_extensions());
    let store = ClaimStore::with_encryption(BackingStore::new(datastore), encrypt, decrypt);

    let bundle = example_bundle();
    let installation = Installation::new("", "wordpress", &bundle, "", "").unwrap();
    store.save_installation(&installation).unwrap();
    let claim = Claim::new("wordpress", ACTION_INSTALL, bundle, "", "", None);
    store.save_claim(&claim).unwrap();
    let result = claim.new_result(STATUS_SUCCEEDED);
    store.save_result(&result).unwrap();

    let password = Output::new(
        claim.clone(),
        result.clone(),
        "password",
        b"mypassword".to_vec(),
    );
    store.save_output(&password).unwrap();

    // On disk: an extensionless file whose contents base64-decode to the
    // original value.
    let path = root.join(format!("outputs/{rid}/{rid}-password", rid = result.id));
    let raw = std::fs::read(&path).unwrap();
    let decoded = BASE64.decode(std::str::from_utf8(&raw).unwrap()).unwrap();
    assert_eq!(decoded, b"mypassword");

    // The claim document is encrypted on disk too.
    let claim_path = root.join(format!("claims/wordpress/{}.json", claim.id));
    let raw_claim = std::fs::read(&claim_path).unwrap();
    assert!(
        serde_json::from_slice::<serde_json::Value>(&raw_claim).is_err(),
        "claim should not be plaintext JSON at rest"
    );

    let read_back = store.read_output(&claim, &result, "password").unwrap();
    assert_eq!(read_back.value, b"mypassword");
}

#[test]
fn the_backing_store_remains_reachable() {
    let tmp = tempfile::tempdir().expect("failed to create temp dir");
    let root = tmp.path().join("claimstore");
    let store = file_store(&root);

    let installation = Installation::new("", "foo", &example_bundle(), "", "").unwrap();
    store.save_installation(&installation).unwrap();

    // Raw reads through the backing contract see the same record.
    let raw = store
        .backing()
        .read("installations", "foo")
        .expect("raw read failed");
    let decoded: serde_json::Value = serde_json::from_slice(&raw).unwrap();
    assert_eq!(decoded["name"], serde_json::json!("foo"));

    // And a second store over the same root sees the data.
    let reopened = file_store(&root);
    let read_back = reopened.read_installation("", "foo").unwrap();
    assert_eq!(read_back.name, "foo");
}
