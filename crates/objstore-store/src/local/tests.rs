use super::*;
use crate::changelog::MemoryChangeLog;
use crate::encrypt::Encrypter;
use objstore_common::ChangeOperation;
use parking_lot::Mutex;
use std::io::Cursor;
use std::time::{Duration, SystemTime};
use tempfile::TempDir;

fn reader(bytes: &[u8]) -> ObjectReader {
    Box::new(Cursor::new(bytes.to_vec()))
}

async fn read_all(mut r: ObjectReader) -> Vec<u8> {
    let mut buf = Vec::new();
    r.read_to_end(&mut buf).await.unwrap();
    buf
}

async fn store(dir: &TempDir) -> LocalStore {
    let local = LocalStore::new();
    let settings =
        HashMap::from([("path".to_string(), dir.path().to_string_lossy().into_owned())]);
    local.configure(&settings).await.unwrap();
    local
}

fn backdate(path: &Path, age: Duration) {
    let file = std::fs::File::options().write(true).open(path).unwrap();
    file.set_modified(SystemTime::now() - age).unwrap();
}

/// Test encrypter that prefixes ciphertext with `ENCRYPTED:`
struct PrefixEncrypter;

const PREFIX: &[u8] = b"ENCRYPTED:";

#[async_trait]
impl Encrypter for PrefixEncrypter {
    fn algorithm(&self) -> &str {
        "mock-prefix"
    }

    fn key_id(&self) -> &str {
        "test-key-1"
    }

    async fn encrypt(&self, mut plaintext: ObjectReader) -> Result<ObjectReader> {
        let mut buf = PREFIX.to_vec();
        plaintext.read_to_end(&mut buf).await?;
        Ok(Box::new(Cursor::new(buf)))
    }

    async fn decrypt(&self, mut ciphertext: ObjectReader) -> Result<ObjectReader> {
        let mut buf = Vec::new();
        ciphertext.read_to_end(&mut buf).await?;
        let stripped = buf
            .strip_prefix(PREFIX)
            .ok_or_else(|| Error::DecryptionFailed("missing ciphertext prefix".into()))?;
        Ok(Box::new(Cursor::new(stripped.to_vec())))
    }
}

struct PrefixEncrypterFactory;

impl EncrypterFactory for PrefixEncrypterFactory {
    fn encrypter(&self) -> Result<Arc<dyn Encrypter>> {
        Ok(Arc::new(PrefixEncrypter))
    }
}

/// Archive destination that records every put
#[derive(Default)]
struct MockArchiver {
    puts: Mutex<Vec<(String, Vec<u8>)>>,
}

#[async_trait]
impl Archiver for MockArchiver {
    async fn archive(&self, key: &str, mut data: ObjectReader) -> Result<()> {
        let mut buf = Vec::new();
        data.read_to_end(&mut buf).await?;
        self.puts.lock().push((key.to_string(), buf));
        Ok(())
    }
}

#[tokio::test]
async fn test_put_get_delete_roundtrip() {
    let dir = tempfile::tempdir().unwrap();
    let local = store(&dir).await;

    local.put("test/file.txt", reader(b"Hello World")).await.unwrap();
    let data = read_all(local.get("test/file.txt").await.unwrap()).await;
    assert_eq!(data, b"Hello World");

    let meta = local.get_metadata("test/file.txt").await.unwrap();
    assert_eq!(meta.size, 11);
    assert!(!meta.etag.is_empty());

    local.delete("test/file.txt").await.unwrap();
    assert!(!local.exists("test/file.txt").await.unwrap());
    assert!(matches!(
        local.get("test/file.txt").await,
        Err(Error::KeyNotFound(_))
    ));
}

#[tokio::test]
async fn test_exists_after_put() {
    let dir = tempfile::tempdir().unwrap();
    let local = store(&dir).await;

    assert!(!local.exists("a/b").await.unwrap());
    local.put("a/b", reader(b"x")).await.unwrap();
    assert!(local.exists("a/b").await.unwrap());
}

#[tokio::test]
async fn test_delete_removes_sidecar() {
    let dir = tempfile::tempdir().unwrap();
    let local = store(&dir).await;

    local.put("k", reader(b"data")).await.unwrap();
    assert!(dir.path().join("k.metadata.json").exists());

    local.delete("k").await.unwrap();
    assert!(!dir.path().join("k").exists());
    assert!(!dir.path().join("k.metadata.json").exists());
    assert!(matches!(
        local.get_metadata("k").await,
        Err(Error::KeyNotFound(_))
    ));
}

#[tokio::test]
async fn test_delete_missing_key() {
    let dir = tempfile::tempdir().unwrap();
    let local = store(&dir).await;
    assert!(matches!(
        local.delete("missing").await,
        Err(Error::KeyNotFound(_))
    ));
}

#[tokio::test]
async fn test_invalid_keys_rejected_without_side_effects() {
    let dir = tempfile::tempdir().unwrap();
    let local = store(&dir).await;

    let invalid = [
        "../x", "/abs", "C:\\x", "x\0y", "", "a//b", "a\nb", "a\tb", "a\rb",
    ];
    for key in invalid {
        assert!(
            matches!(local.put(key, reader(b"x")).await, Err(Error::InvalidKey(_))),
            "put accepted {key:?}"
        );
        assert!(matches!(local.get(key).await, Err(Error::InvalidKey(_))));
        assert!(matches!(local.delete(key).await, Err(Error::InvalidKey(_))));
        assert!(matches!(local.exists(key).await, Err(Error::InvalidKey(_))));
        assert!(matches!(
            local.get_metadata(key).await,
            Err(Error::InvalidKey(_))
        ));
        assert!(matches!(
            local.update_metadata(key, Metadata::default()).await,
            Err(Error::InvalidKey(_))
        ));
        assert!(matches!(
            ObjectStore::archive(&local, key, Some(Arc::new(MockArchiver::default()))).await,
            Err(Error::InvalidKey(_))
        ));
    }

    // Nothing was written
    let keys = local.list("").await.unwrap();
    assert!(keys.is_empty(), "side effects observed: {keys:?}");
}

#[tokio::test]
async fn test_invalid_list_prefix_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let local = store(&dir).await;
    assert!(matches!(
        local.list("../escape").await,
        Err(Error::InvalidKey(_))
    ));
    // Empty prefix skips validation and lists everything
    assert!(local.list("").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_unconfigured_store_path_not_set() {
    let local = LocalStore::new();
    assert!(matches!(
        local.put("k", reader(b"x")).await,
        Err(Error::PathNotSet)
    ));
    assert!(matches!(
        local.configure(&HashMap::new()).await,
        Err(Error::PathNotSet)
    ));
}

#[tokio::test]
async fn test_metadata_roundtrip() {
    let dir = tempfile::tempdir().unwrap();
    let local = store(&dir).await;

    let mut meta = Metadata {
        content_type: "text/plain".into(),
        content_encoding: "gzip".into(),
        ..Metadata::default()
    };
    meta.custom.insert("owner".into(), "alice".into());
    meta.custom.insert("team".into(), "storage".into());

    local
        .put_with_metadata(&OpContext::background(), "doc.txt", reader(b"abcdef"), Some(meta))
        .await
        .unwrap();

    let got = local.get_metadata("doc.txt").await.unwrap();
    assert_eq!(got.content_type, "text/plain");
    assert_eq!(got.content_encoding, "gzip");
    assert_eq!(got.custom["owner"], "alice");
    assert_eq!(got.custom["team"], "storage");
    // Size and ETag are derived from the file, not the caller
    assert_eq!(got.size, 6);
    assert_eq!(got.etag, local_etag(got.last_modified.timestamp(), 6));
}

#[tokio::test]
async fn test_put_rejects_oversized_custom_map() {
    let dir = tempfile::tempdir().unwrap();
    let local = store(&dir).await;

    let mut meta = Metadata::default();
    for i in 0..=objstore_common::metadata::CUSTOM_ENTRY_LIMIT {
        meta.custom.insert(format!("k{i}"), "v".into());
    }
    assert!(matches!(
        local
            .put_with_metadata(&OpContext::background(), "k", reader(b"x"), Some(meta))
            .await,
        Err(Error::InvalidMetadata(_))
    ));
    assert!(!local.exists("k").await.unwrap());
}

#[tokio::test]
async fn test_update_metadata_rederives_file_attributes() {
    let dir = tempfile::tempdir().unwrap();
    let local = store(&dir).await;

    local.put("k", reader(b"0123456789")).await.unwrap();

    let mut update = Metadata {
        content_type: "application/json".into(),
        size: 999, // caller-supplied size is ignored
        ..Metadata::default()
    };
    update.custom.insert("rev".into(), "2".into());

    let updated = local.update_metadata("k", update).await.unwrap();
    assert_eq!(updated.size, 10);
    assert_eq!(updated.content_type, "application/json");
    assert_eq!(updated.custom["rev"], "2");

    let got = local.get_metadata("k").await.unwrap();
    assert_eq!(got, updated);
}

#[tokio::test]
async fn test_update_metadata_missing_key() {
    let dir = tempfile::tempdir().unwrap();
    let local = store(&dir).await;
    assert!(matches!(
        local.update_metadata("nope", Metadata::default()).await,
        Err(Error::KeyNotFound(_))
    ));
}

#[tokio::test]
async fn test_get_metadata_synthesized_without_sidecar() {
    let dir = tempfile::tempdir().unwrap();
    let local = store(&dir).await;

    // An object written out-of-band has no sidecar
    std::fs::write(dir.path().join("raw.bin"), b"12345").unwrap();
    let meta = local.get_metadata("raw.bin").await.unwrap();
    assert_eq!(meta.size, 5);
    assert_eq!(meta.etag, local_etag(meta.last_modified.timestamp(), 5));
}

#[tokio::test]
async fn test_get_metadata_corrupt_sidecar_synthesized() {
    let dir = tempfile::tempdir().unwrap();
    let local = store(&dir).await;

    local.put("k", reader(b"abc")).await.unwrap();
    std::fs::write(dir.path().join("k.metadata.json"), b"{not json").unwrap();

    let meta = local.get_metadata("k").await.unwrap();
    assert_eq!(meta.size, 3);
}

#[tokio::test]
async fn test_encryption_roundtrip() {
    let dir = tempfile::tempdir().unwrap();
    let local = store(&dir).await;
    local.set_encrypter_factory(Some(Arc::new(PrefixEncrypterFactory)));

    local.put("k", reader(b"sensitive data")).await.unwrap();

    // Bytes on disk are ciphertext
    let on_disk = std::fs::read(dir.path().join("k")).unwrap();
    assert!(on_disk.starts_with(b"ENCRYPTED:"));
    assert_ne!(on_disk, b"sensitive data");

    // Get returns the original plaintext
    let data = read_all(local.get("k").await.unwrap()).await;
    assert_eq!(data, b"sensitive data");

    // Bookkeeping lands in the reserved custom keys
    let meta = local.get_metadata("k").await.unwrap();
    assert_eq!(meta.custom[ENCRYPTION_ALGORITHM_KEY], "mock-prefix");
    assert_eq!(meta.custom[ENCRYPTION_KEY_ID_KEY], "test-key-1");
    // Size records bytes written to the backend (ciphertext)
    assert_eq!(meta.size, on_disk.len() as i64);
}

#[tokio::test]
async fn test_get_encrypted_without_factory_returns_stored_bytes() {
    let dir = tempfile::tempdir().unwrap();
    let local = store(&dir).await;
    local.set_encrypter_factory(Some(Arc::new(PrefixEncrypterFactory)));
    local.put("k", reader(b"secret")).await.unwrap();

    // Without a factory the reader yields the ciphertext as stored
    local.set_encrypter_factory(None);
    let data = read_all(local.get("k").await.unwrap()).await;
    assert_eq!(data, b"ENCRYPTED:secret");
}

#[tokio::test]
async fn test_update_metadata_preserves_encryption_bookkeeping() {
    let dir = tempfile::tempdir().unwrap();
    let local = store(&dir).await;
    local.set_encrypter_factory(Some(Arc::new(PrefixEncrypterFactory)));
    local.put("k", reader(b"secret")).await.unwrap();

    let updated = local
        .update_metadata("k", Metadata::default())
        .await
        .unwrap();
    assert_eq!(updated.custom[ENCRYPTION_ALGORITHM_KEY], "mock-prefix");

    // The object must still decrypt after the update
    let data = read_all(local.get("k").await.unwrap()).await;
    assert_eq!(data, b"secret");
}

#[tokio::test]
async fn test_changelog_records_mutations_in_order() {
    let dir = tempfile::tempdir().unwrap();
    let local = store(&dir).await;
    let changelog = Arc::new(MemoryChangeLog::new());
    local.set_change_log(Some(changelog.clone()));

    local.put("k", reader(b"one")).await.unwrap();
    local.delete("k").await.unwrap();
    local.put("k", reader(b"three")).await.unwrap();

    let events = changelog.events();
    assert_eq!(events.len(), 3);
    assert_eq!(events[0].operation, ChangeOperation::Put);
    assert_eq!(events[0].size, Some(3));
    assert!(events[0].etag.is_some());
    assert_eq!(events[1].operation, ChangeOperation::Delete);
    assert_eq!(events[1].etag, None);
    assert_eq!(events[2].operation, ChangeOperation::Put);
    assert_eq!(events[2].size, Some(5));
}

#[tokio::test]
async fn test_no_changelog_no_events() {
    let dir = tempfile::tempdir().unwrap();
    let local = store(&dir).await;
    // No changelog installed: puts succeed and nothing is recorded anywhere
    local.put("k", reader(b"x")).await.unwrap();
    local.delete("k").await.unwrap();
}

#[tokio::test]
async fn test_list_skips_sidecars_and_policy_file() {
    let dir = tempfile::tempdir().unwrap();
    let local = LocalStore::new();
    let settings = HashMap::from([
        ("path".to_string(), dir.path().to_string_lossy().into_owned()),
        ("lifecycleManagerType".to_string(), "persistent".to_string()),
    ]);
    local.configure(&settings).await.unwrap();

    local
        .add_policy(LifecyclePolicy::delete("p1", "x/", Duration::from_secs(1)))
        .unwrap();
    local.put("a.txt", reader(b"1")).await.unwrap();
    local.put("b/c.txt", reader(b"2")).await.unwrap();

    let keys = local.list("").await.unwrap();
    assert_eq!(keys, vec!["a.txt", "b/c.txt"]);
}

#[tokio::test]
async fn test_list_prefix_filter() {
    let dir = tempfile::tempdir().unwrap();
    let local = store(&dir).await;

    for key in ["logs/a", "logs/b", "data/c"] {
        local.put(key, reader(b"x")).await.unwrap();
    }
    let mut keys = local.list("logs/").await.unwrap();
    keys.sort();
    assert_eq!(keys, vec!["logs/a", "logs/b"]);
}

#[tokio::test]
async fn test_delimiter_listing_collapses_subdirectories() {
    let dir = tempfile::tempdir().unwrap();
    let local = store(&dir).await;

    for key in ["root/1.txt", "root/2.txt", "root/3.txt", "root/a/x.txt", "root/b/y.txt"] {
        local.put(key, reader(b"x")).await.unwrap();
    }

    let opts = ListOptions {
        prefix: "root/".into(),
        delimiter: "/".into(),
        ..ListOptions::default()
    };
    let result = local
        .list_with_options(&OpContext::background(), Some(opts))
        .await
        .unwrap();

    let keys: Vec<&str> = result.objects.iter().map(|o| o.key.as_str()).collect();
    assert_eq!(keys, vec!["root/1.txt", "root/2.txt", "root/3.txt"]);
    assert_eq!(result.common_prefixes, vec!["root/a/", "root/b/"]);
    assert!(!result.truncated);
}

#[tokio::test]
async fn test_pagination_walks_every_object_once() {
    let dir = tempfile::tempdir().unwrap();
    let local = store(&dir).await;

    for i in 0..10 {
        local
            .put(&format!("test/{i:02}"), reader(b"x"))
            .await
            .unwrap();
    }

    let mut seen = Vec::new();
    let mut token: Option<String> = None;
    let mut pages = 0;
    loop {
        let opts = ListOptions {
            prefix: "test/".into(),
            max_results: 3,
            continue_from: token.clone(),
            ..ListOptions::default()
        };
        let result = local
            .list_with_options(&OpContext::background(), Some(opts))
            .await
            .unwrap();
        pages += 1;
        seen.extend(result.objects.iter().map(|o| o.key.clone()));
        if !result.truncated {
            assert!(result.next_token.is_none());
            assert_eq!(result.objects.len(), 1);
            break;
        }
        token = result.next_token;
        assert!(token.is_some());
    }

    assert_eq!(pages, 4);
    let expected: Vec<String> = (0..10).map(|i| format!("test/{i:02}")).collect();
    assert_eq!(seen, expected);
}

#[tokio::test]
async fn test_pagination_unknown_token_restarts() {
    let dir = tempfile::tempdir().unwrap();
    let local = store(&dir).await;
    for i in 0..4 {
        local.put(&format!("k{i}"), reader(b"x")).await.unwrap();
    }

    let opts = ListOptions {
        max_results: 2,
        continue_from: Some("does-not-exist".into()),
        ..ListOptions::default()
    };
    let result = local
        .list_with_options(&OpContext::background(), Some(opts))
        .await
        .unwrap();
    let keys: Vec<&str> = result.objects.iter().map(|o| o.key.as_str()).collect();
    assert_eq!(keys, vec!["k0", "k1"]);
}

#[tokio::test]
async fn test_list_with_default_options() {
    let dir = tempfile::tempdir().unwrap();
    let local = store(&dir).await;
    local.put("k", reader(b"x")).await.unwrap();

    let result = local
        .list_with_options(&OpContext::background(), None)
        .await
        .unwrap();
    assert_eq!(result.objects.len(), 1);
    assert!(!result.truncated);
}

#[tokio::test]
async fn test_archive_to_destination() {
    let dir = tempfile::tempdir().unwrap();
    let local = store(&dir).await;
    local.put("docs/a.txt", reader(b"archive me")).await.unwrap();

    let destination = Arc::new(MockArchiver::default());
    ObjectStore::archive(&local, "docs/a.txt", Some(destination.clone()))
        .await
        .unwrap();

    let puts = destination.puts.lock();
    assert_eq!(puts.len(), 1);
    assert_eq!(puts[0].0, "docs/a.txt");
    assert_eq!(puts[0].1, b"archive me");
}

#[tokio::test]
async fn test_archive_nil_destination_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let local = store(&dir).await;
    local.put("k", reader(b"x")).await.unwrap();
    assert!(matches!(
        ObjectStore::archive(&local, "k", None).await,
        Err(Error::ArchiveDestinationNil)
    ));
}

#[tokio::test]
async fn test_archive_between_local_stores() {
    let src_dir = tempfile::tempdir().unwrap();
    let dst_dir = tempfile::tempdir().unwrap();
    let src = store(&src_dir).await;
    let dst = store(&dst_dir).await;

    src.put("a/b", reader(b"payload")).await.unwrap();
    ObjectStore::archive(&src, "a/b", Some(Arc::new(dst.clone())))
        .await
        .unwrap();

    let data = read_all(dst.get("a/b").await.unwrap()).await;
    assert_eq!(data, b"payload");
}

#[tokio::test]
async fn test_cancelled_context_aborts_before_side_effects() {
    let dir = tempfile::tempdir().unwrap();
    let local = store(&dir).await;

    let token = tokio_util::sync::CancellationToken::new();
    token.cancel();
    let ctx = OpContext::with_token(token);

    assert!(matches!(
        local.put_with_context(&ctx, "k", reader(b"x")).await,
        Err(Error::Cancelled)
    ));
    assert!(!local.exists("k").await.unwrap());
    assert!(matches!(
        local.get_with_context(&ctx, "k").await,
        Err(Error::Cancelled)
    ));
    assert!(matches!(
        local.list_with_context(&ctx, "").await,
        Err(Error::Cancelled)
    ));
}

#[tokio::test]
async fn test_lifecycle_delete_pass() {
    let dir = tempfile::tempdir().unwrap();
    let local = store(&dir).await;

    local.put("logs/old.txt", reader(b"old")).await.unwrap();
    local.put("logs/new.txt", reader(b"new")).await.unwrap();
    local.put("data/old.txt", reader(b"keep")).await.unwrap();
    backdate(&dir.path().join("logs/old.txt"), Duration::from_secs(48 * 3600));
    backdate(&dir.path().join("data/old.txt"), Duration::from_secs(48 * 3600));

    local
        .add_policy(LifecyclePolicy::delete(
            "p1",
            "logs/",
            Duration::from_secs(3600),
        ))
        .unwrap();

    let actions = local.apply_lifecycle_policies().await.unwrap();
    assert_eq!(actions, 1);
    assert!(!local.exists("logs/old.txt").await.unwrap());
    assert!(local.exists("logs/new.txt").await.unwrap());
    assert!(local.exists("data/old.txt").await.unwrap());
}

#[tokio::test]
async fn test_lifecycle_archive_pass() {
    let dir = tempfile::tempdir().unwrap();
    let local = store(&dir).await;

    local.put("logs/old.txt", reader(b"cold data")).await.unwrap();
    backdate(&dir.path().join("logs/old.txt"), Duration::from_secs(48 * 3600));

    let destination = Arc::new(MockArchiver::default());
    local
        .add_policy(LifecyclePolicy::archive(
            "p1",
            "logs/",
            Duration::from_secs(3600),
            destination.clone(),
        ))
        .unwrap();

    local.apply_lifecycle_policies().await.unwrap();

    let puts = destination.puts.lock();
    assert_eq!(puts.len(), 1);
    assert_eq!(puts[0].0, "logs/old.txt");
    assert_eq!(puts[0].1, b"cold data");
}

#[tokio::test]
async fn test_persistent_lifecycle_survives_reconfigure() {
    let dir = tempfile::tempdir().unwrap();
    let settings = HashMap::from([
        ("path".to_string(), dir.path().to_string_lossy().into_owned()),
        ("lifecycleManagerType".to_string(), "persistent".to_string()),
        ("lifecyclePolicyFile".to_string(), "policies.json".to_string()),
    ]);

    let local = LocalStore::new();
    local.configure(&settings).await.unwrap();
    local
        .add_policy(LifecyclePolicy::delete(
            "p1",
            "logs/",
            Duration::from_secs(24 * 3600),
        ))
        .unwrap();
    assert!(dir.path().join("policies.json").exists());

    // A fresh instance with identical settings rehydrates the store
    let fresh = LocalStore::new();
    fresh.configure(&settings).await.unwrap();
    let policies = fresh.policies().unwrap();
    assert_eq!(policies.len(), 1);
    assert_eq!(policies[0].id, "p1");
    assert_eq!(policies[0].retention, Duration::from_secs(24 * 3600));
}

#[tokio::test]
async fn test_configure_rejects_unknown_lifecycle_manager_type() {
    let dir = tempfile::tempdir().unwrap();
    let local = LocalStore::new();
    let settings = HashMap::from([
        ("path".to_string(), dir.path().to_string_lossy().into_owned()),
        ("lifecycleManagerType".to_string(), "bogus".to_string()),
    ]);
    assert!(matches!(
        local.configure(&settings).await,
        Err(Error::InvalidLifecycleManagerType(_))
    ));
}

#[tokio::test]
async fn test_duplicate_policy_id_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let local = store(&dir).await;
    local
        .add_policy(LifecyclePolicy::delete("p1", "a/", Duration::from_secs(1)))
        .unwrap();
    assert!(matches!(
        local.add_policy(LifecyclePolicy::delete("p1", "b/", Duration::from_secs(1))),
        Err(Error::PolicyExists(_))
    ));
}

#[tokio::test]
async fn test_replication_capability_probe() {
    let dir = tempfile::tempdir().unwrap();
    let local = store(&dir).await;
    assert!(local.replication_manager().is_none());
}
