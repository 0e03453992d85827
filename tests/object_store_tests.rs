use bytes::Bytes;
use futures::stream;
use minio_template::{
    AccessPolicy, MemoryClient, ObjectStore, ObjectStoreError, SharedPolicyCheck,
};
use std::{io, sync::Arc, time::Duration};
use tempfile::TempDir;

fn setup() -> (Arc<MemoryClient>, ObjectStore) {
    let client = Arc::new(MemoryClient::new());
    let store = ObjectStore::new(client.clone());
    (client, store)
}

async fn setup_with_files(bucket: &str, names: &[&str]) -> (Arc<MemoryClient>, ObjectStore) {
    let (client, store) = setup();
    store.create_bucket(bucket).await.unwrap();
    for name in names {
        store
            .upload(bucket, name, Bytes::from(name.to_string()), None)
            .await
            .unwrap();
    }
    client.clear_calls();
    (client, store)
}

fn names(files: &[minio_template::StoredFile]) -> Vec<&str> {
    files.iter().map(|f| f.filename.as_str()).collect()
}

// ----- buckets -----

#[tokio::test]
async fn create_bucket_applies_shared_policy_by_default() {
    let (_, store) = setup();
    store.create_bucket("media").await.unwrap();

    assert!(store.bucket_exists("media").await.unwrap());
    assert!(store.is_bucket_shared("media").await.unwrap());
    assert_eq!(
        store.get_bucket_policy("media").await.unwrap(),
        AccessPolicy::ReadAndWrite.render("media")
    );
}

#[tokio::test]
async fn create_existing_bucket_fails() {
    let (client, store) = setup();
    store.create_bucket("media").await.unwrap();

    let err = store.create_bucket("media").await.unwrap_err();
    assert!(matches!(err, ObjectStoreError::BucketAlreadyExists(name) if name == "media"));
    assert_eq!(client.call_count("make_bucket"), 1);
}

#[tokio::test]
async fn failed_policy_keeps_created_bucket() {
    let (client, store) = setup();
    client.fail_operation("set_bucket_policy");

    let err = store.create_bucket("media").await.unwrap_err();
    assert_eq!(err.operation(), Some("set_bucket_policy"));

    client.restore_operation("set_bucket_policy");
    assert!(store.bucket_exists("media").await.unwrap());
    assert_eq!(store.get_bucket_policy("media").await.unwrap(), "");
}

#[tokio::test]
async fn set_policy_on_absent_bucket_is_noop() {
    let (client, store) = setup();
    store
        .set_bucket_policy("ghost", AccessPolicy::ReadOnly)
        .await
        .unwrap();
    assert_eq!(client.calls(), vec!["bucket_exists"]);
}

#[tokio::test]
async fn set_policy_changes_shared_status() {
    let (_, store) = setup();
    store.create_bucket("media").await.unwrap();
    store
        .set_bucket_policy("media", AccessPolicy::ReadOnly)
        .await
        .unwrap();

    assert!(!store.is_bucket_shared("media").await.unwrap());
    assert_eq!(
        store.get_bucket_policy("media").await.unwrap(),
        AccessPolicy::ReadOnly.render("media")
    );
}

#[tokio::test]
async fn policy_of_absent_bucket_is_empty() {
    let (_, store) = setup();
    assert_eq!(store.get_bucket_policy("ghost").await.unwrap(), "");
    assert!(!store.is_bucket_shared("ghost").await.unwrap());
}

#[tokio::test]
async fn list_and_find_buckets() {
    let (_, store) = setup();
    for name in ["logs-2024", "logs-2025", "media"] {
        store.create_bucket(name).await.unwrap();
    }

    let all = store.list_buckets().await.unwrap();
    assert_eq!(all.len(), 3);

    let logs = store
        .list_buckets_matching(|b| b.name.starts_with("logs-"))
        .await
        .unwrap();
    assert_eq!(logs.len(), 2);

    assert_eq!(
        store.get_bucket("media").await.unwrap().map(|b| b.name),
        Some("media".to_string())
    );
    assert!(store.get_bucket("ghost").await.unwrap().is_none());
}

#[tokio::test]
async fn delete_absent_bucket_only_checks_existence() {
    let (client, store) = setup();
    store.delete_bucket("ghost").await.unwrap();
    assert_eq!(client.calls(), vec!["bucket_exists"]);
}

#[tokio::test]
async fn delete_bucket_removes_objects_one_by_one() {
    let (client, store) = setup_with_files("media", &["a.txt", "b/c.txt", "d.png"]).await;

    store.delete_bucket("media").await.unwrap();

    assert_eq!(client.call_count("remove_object"), 3);
    assert_eq!(client.call_count("remove_bucket"), 1);
    assert!(!store.bucket_exists("media").await.unwrap());
}

#[tokio::test]
async fn delete_bucket_removes_keys_with_leading_slash() {
    let (client, store) = setup_with_files("media", &["a.txt"]).await;
    store.upload("media", "//double.txt", "x", None).await.unwrap();
    let listed = store.list_files("media").await.unwrap();
    assert!(names(&listed).contains(&"/double.txt"));
    client.clear_calls();

    store.delete_bucket("media").await.unwrap();

    assert_eq!(client.call_count("remove_object"), 2);
    assert_eq!(client.call_count("remove_bucket"), 1);
    assert!(!store.bucket_exists("media").await.unwrap());
}

#[tokio::test]
async fn delete_bucket_stops_when_an_object_cannot_be_removed() {
    let (client, store) = setup_with_files("media", &["a.txt", "b.txt"]).await;
    client.fail_operation("remove_object");

    assert!(store.delete_bucket("media").await.is_err());
    assert_eq!(client.call_count("remove_object"), 1);
    assert_eq!(client.call_count("remove_bucket"), 0);

    client.restore_operation("remove_object");
    assert!(store.bucket_exists("media").await.unwrap());
    assert_eq!(store.list_files("media").await.unwrap().len(), 2);
}

// ----- listing and lookup -----

#[tokio::test]
async fn listing_absent_bucket_is_empty() {
    let (client, store) = setup();
    assert!(store.list_files("ghost").await.unwrap().is_empty());
    assert!(store.list_files_with_prefix("ghost", "a").await.unwrap().is_empty());
    assert!(store.list_files_batched("ghost", None).await.unwrap().is_empty());
    assert_eq!(client.call_count("list_objects"), 0);
}

#[tokio::test]
async fn list_files_by_prefix_and_predicate() {
    let (_, store) =
        setup_with_files("media", &["docs/a.txt", "docs/b.txt", "img/c.png", "top.md"]).await;

    let docs = store.list_files_with_prefix("media", "docs/").await.unwrap();
    assert_eq!(names(&docs), vec!["docs/a.txt", "docs/b.txt"]);

    let images = store
        .list_files_matching("media", |f| f.filename.ends_with(".png"))
        .await
        .unwrap();
    assert_eq!(names(&images), vec!["img/c.png"]);

    let all = store.list_files("media").await.unwrap();
    assert_eq!(all.len(), 4);
    assert!(all.iter().all(|f| f.bucket_name == "media"));
}

#[tokio::test]
async fn list_files_resolves_policy_per_entry() {
    let (client, store) = setup_with_files("media", &["a.txt", "b.txt", "c.txt"]).await;

    store.list_files("media").await.unwrap();
    assert_eq!(client.call_count("get_bucket_policy"), 3);
    assert_eq!(client.call_count("presigned_url"), 3);

    client.clear_calls();
    let batched = store.list_files_batched("media", None).await.unwrap();
    assert_eq!(batched.len(), 3);
    assert_eq!(client.call_count("get_bucket_policy"), 1);
    assert!(batched.iter().all(|f| f.url.query().is_none()));
}

#[tokio::test]
async fn listing_failure_is_surfaced() {
    let (client, store) = setup_with_files("media", &["a.txt"]).await;
    client.fail_operation("list_objects");

    let err = store.list_files("media").await.unwrap_err();
    assert_eq!(err.operation(), Some("list_objects"));
    assert!(store.get_file("media", "a.txt").await.is_err());
}

#[tokio::test]
async fn get_file_matches_exact_name_only() {
    let (_, store) = setup_with_files("media", &["a.txt", "a.txt.bak"]).await;

    let file = store.get_file("media", "a.txt").await.unwrap().unwrap();
    assert_eq!(file.filename, "a.txt");
    assert_eq!(file.size, 5);

    let bak = store.get_file("media", "/a.txt.bak").await.unwrap().unwrap();
    assert_eq!(bak.filename, "a.txt.bak");

    assert!(store.get_file("media", "a").await.unwrap().is_none());
    assert!(store.get_file("ghost", "a.txt").await.unwrap().is_none());
}

// ----- access urls -----

#[tokio::test]
async fn shared_bucket_url_has_no_query() {
    let (_, store) = setup_with_files("media", &["file.txt"]).await;

    let url = store.get_file_url("media", "file.txt").await.unwrap();
    assert!(url.query().is_none());
    assert_eq!(url.path(), "/media/file.txt");
}

#[tokio::test]
async fn private_bucket_url_is_presigned() {
    let (_, store) = setup();
    for (bucket, policy) in [
        ("readers", AccessPolicy::ReadOnly),
        ("writers", AccessPolicy::WriteOnly),
    ] {
        store.create_bucket_with_policy(bucket, policy).await.unwrap();
        store.upload(bucket, "file.txt", "hi", None).await.unwrap();

        let url = store.get_file_url(bucket, "file.txt").await.unwrap();
        let query = url.query().unwrap_or_default();
        assert!(query.contains("X-Amz-Expires=604800"), "{url}");
        assert!(query.contains("X-Amz-Signature="), "{url}");
    }
}

#[tokio::test]
async fn url_expiry_is_configurable() {
    let (_, store) = setup();
    store
        .create_bucket_with_policy("readers", AccessPolicy::ReadOnly)
        .await
        .unwrap();
    store.upload("readers", "file.txt", "hi", None).await.unwrap();

    let url = store
        .get_file_url_with_expiry("readers", "file.txt", Duration::from_secs(90))
        .await
        .unwrap();
    assert!(url.query().unwrap_or_default().contains("X-Amz-Expires=90"));
}

#[tokio::test]
async fn structural_check_agrees_on_canned_policies() {
    let client = Arc::new(MemoryClient::new());
    let store = ObjectStore::new(client).with_policy_check(SharedPolicyCheck::Structural);
    store.create_bucket("shared").await.unwrap();
    store
        .create_bucket_with_policy("private", AccessPolicy::ReadOnly)
        .await
        .unwrap();

    assert!(store.is_bucket_shared("shared").await.unwrap());
    assert!(!store.is_bucket_shared("private").await.unwrap());

    let url = store.upload("shared", "x.txt", "x", None).await.unwrap();
    assert!(url.query().is_none());
}

// ----- copy -----

#[tokio::test]
async fn copy_from_missing_source_writes_nothing() {
    let (client, store) = setup_with_files("src", &["other.txt"]).await;

    let err = store
        .copy_file("src", "missing.txt", "dst", "copy.txt")
        .await
        .unwrap_err();
    assert!(matches!(err, ObjectStoreError::NoSuchFile { .. }));
    assert_eq!(client.call_count("copy_object"), 0);
    assert_eq!(client.call_count("put_object"), 0);
    assert_eq!(client.call_count("make_bucket"), 0);
    assert!(!store.bucket_exists("dst").await.unwrap());
}

#[tokio::test]
async fn copy_creates_target_bucket() {
    let (_, store) = setup();
    store
        .upload("src", "report.pdf", "%PDF-1.7", Some("application/pdf"))
        .await
        .unwrap();

    let url = store
        .copy_file("src", "report.pdf", "archive", "2024/report.pdf")
        .await
        .unwrap();

    assert_eq!(url.path(), "/archive/2024/report.pdf");
    assert!(store.is_bucket_shared("archive").await.unwrap());
    assert_eq!(
        store.download_bytes("archive", "2024/report.pdf").await.unwrap(),
        Bytes::from_static(b"%PDF-1.7")
    );
    assert!(store.get_file("src", "report.pdf").await.unwrap().is_some());
}

// ----- delete -----

#[tokio::test]
async fn delete_in_absent_bucket_is_noop() {
    let (client, store) = setup();
    store.delete_file("ghost", "a.txt").await.unwrap();
    store.delete_files("ghost", &["a.txt", "b.txt"]).await.unwrap();
    assert_eq!(client.call_count("remove_object"), 0);
}

#[tokio::test]
async fn delete_files_stops_at_first_failure() {
    let (client, store) = setup_with_files("media", &["a.txt", "b.txt", "c.txt"]).await;
    client.fail_operation("remove_object");

    let err = store
        .delete_files("media", &["a.txt", "b.txt", "c.txt"])
        .await
        .unwrap_err();
    assert_eq!(err.operation(), Some("remove_object"));
    assert_eq!(client.call_count("remove_object"), 1);

    client.restore_operation("remove_object");
    assert_eq!(store.list_files("media").await.unwrap().len(), 3);
}

#[tokio::test]
async fn delete_files_removes_each_name() {
    let (_, store) = setup_with_files("media", &["a.txt", "b.txt", "c.txt"]).await;
    let doomed = vec!["a.txt".to_string(), "c.txt".to_string()];

    store.delete_files("media", &doomed).await.unwrap();

    let left = store.list_files("media").await.unwrap();
    assert_eq!(names(&left), vec!["b.txt"]);
}

#[tokio::test]
async fn delete_files_accepts_listed_names_verbatim() {
    let (_, store) = setup_with_files("media", &["a.txt"]).await;
    store.upload("media", "//double.txt", "x", None).await.unwrap();

    let listed: Vec<String> = store
        .list_files("media")
        .await
        .unwrap()
        .into_iter()
        .map(|f| f.filename)
        .collect();
    store.delete_files("media", &listed).await.unwrap();

    assert!(store.list_files("media").await.unwrap().is_empty());
}

#[tokio::test]
async fn delete_file_does_not_strip_leading_slash() {
    let (_, store) = setup_with_files("media", &["a.txt"]).await;

    store.delete_file("media", "/a.txt").await.unwrap();

    assert!(store.get_file("media", "a.txt").await.unwrap().is_some());
}

// ----- upload -----

#[tokio::test]
async fn upload_creates_bucket_and_normalizes_path() {
    let (_, store) = setup();
    let url = store
        .upload("fresh", "/dir/note.txt", "hello", None)
        .await
        .unwrap();

    assert!(store.is_bucket_shared("fresh").await.unwrap());
    assert_eq!(url.path(), "/fresh/dir/note.txt");
    assert!(store.get_file("fresh", "dir/note.txt").await.unwrap().is_some());
}

#[tokio::test]
async fn upload_rejects_paths_without_extension() {
    let (client, store) = setup();
    for path in ["", "noext", "/"] {
        let err = store.upload("media", path, "x", None).await.unwrap_err();
        assert!(matches!(err, ObjectStoreError::IllegalPath(_)), "{path:?}");
    }
    assert_eq!(client.call_count("put_object"), 0);
}

#[tokio::test]
async fn upload_infers_content_type() {
    let (client, store) = setup();
    let png = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0, 0];

    store.upload("media", "photo.png", "x", None).await.unwrap();
    store.upload("media", "table.csv", "a,b", Some("text/csv")).await.unwrap();
    store.upload("media", "image.bin1", png.to_vec(), None).await.unwrap();
    store.upload("media", "blob.unknown", "???", None).await.unwrap();

    assert_eq!(client.content_type("media", "photo.png").as_deref(), Some("image/png"));
    assert_eq!(client.content_type("media", "table.csv").as_deref(), Some("text/csv"));
    assert_eq!(client.content_type("media", "image.bin1").as_deref(), Some("image/png"));
    assert_eq!(
        client.content_type("media", "blob.unknown").as_deref(),
        Some("application/octet-stream")
    );
}

#[tokio::test]
async fn upload_stream_collects_chunks() {
    let (_, store) = setup();
    let chunks = stream::iter(vec![
        Ok::<_, io::Error>(Bytes::from_static(b"he")),
        Ok(Bytes::from_static(b"llo")),
    ]);

    store
        .upload_stream("media", "greeting.txt", chunks, None)
        .await
        .unwrap();
    assert_eq!(
        store.download_bytes("media", "greeting.txt").await.unwrap(),
        Bytes::from_static(b"hello")
    );
}

#[tokio::test]
async fn upload_stream_sends_body_from_disk() {
    let (client, store) = setup();
    let chunks = stream::iter(
        (0..64).map(|i| Ok::<_, io::Error>(Bytes::from(vec![i as u8; 1024]))),
    );

    store
        .upload_stream("media", "blob.dat", chunks, Some("application/x-test"))
        .await
        .unwrap();

    assert_eq!(client.call_count("put_object_file"), 1);
    assert_eq!(client.call_count("put_object"), 0);
    let stored = store.download_bytes("media", "blob.dat").await.unwrap();
    assert_eq!(stored.len(), 64 * 1024);
    assert_eq!(stored[1024 * 7], 7);
    assert_eq!(
        client.content_type("media", "blob.dat").as_deref(),
        Some("application/x-test")
    );
}

#[tokio::test]
async fn upload_stream_sniffs_head_split_across_chunks() {
    let (client, store) = setup();
    let chunks = stream::iter(vec![
        Ok::<_, io::Error>(Bytes::from_static(b"\x89PN")),
        Ok(Bytes::from_static(b"G\r\n\x1a\n")),
        Ok(Bytes::from_static(b"pixel data")),
    ]);

    store
        .upload_stream("media", "image.raw1", chunks, None)
        .await
        .unwrap();

    assert_eq!(client.content_type("media", "image.raw1").as_deref(), Some("image/png"));
}

#[tokio::test]
async fn upload_stream_fails_on_broken_source() {
    let (client, store) = setup();
    let chunks = stream::iter(vec![
        Ok(Bytes::from_static(b"he")),
        Err(io::Error::other("source closed")),
    ]);

    let err = store
        .upload_stream("media", "greeting.txt", chunks, None)
        .await
        .unwrap_err();
    assert!(matches!(err, ObjectStoreError::Io(_)));
    assert_eq!(client.call_count("put_object"), 0);
    assert_eq!(client.call_count("put_object_file"), 0);
}

#[tokio::test]
async fn upload_local_files() {
    let (client, store) = setup();
    let dir = TempDir::new().unwrap();
    let local = dir.path().join("notes.txt");
    std::fs::write(&local, "remember").unwrap();

    let url = store.upload_file("media", &local).await.unwrap();
    assert_eq!(url.path(), "/media/notes.txt");
    assert_eq!(client.content_type("media", "notes.txt").as_deref(), Some("text/plain"));

    store
        .upload_file_as("media", "archive/notes.bin", &local)
        .await
        .unwrap();
    assert_eq!(
        client.content_type("media", "archive/notes.bin").as_deref(),
        Some("text/plain")
    );
    assert_eq!(
        store.download_bytes("media", "archive/notes.bin").await.unwrap(),
        Bytes::from_static(b"remember")
    );
    assert_eq!(client.call_count("put_object_file"), 2);
    assert_eq!(client.call_count("put_object"), 0);
}

#[tokio::test]
async fn upload_local_file_with_explicit_content_type() {
    let (client, store) = setup();
    let dir = TempDir::new().unwrap();
    let local = dir.path().join("report.txt");
    std::fs::write(&local, "quarterly").unwrap();

    let url = store
        .upload_file_with("media", "reports/q3.txt", &local, Some("text/markdown"))
        .await
        .unwrap();

    assert_eq!(url.path(), "/media/reports/q3.txt");
    assert_eq!(
        client.content_type("media", "reports/q3.txt").as_deref(),
        Some("text/markdown")
    );
}

#[tokio::test]
async fn upload_missing_local_file_fails() {
    let (_, store) = setup();
    let dir = TempDir::new().unwrap();
    let err = store
        .upload_file("media", dir.path().join("absent.txt"))
        .await
        .unwrap_err();
    assert!(matches!(err, ObjectStoreError::Io(_)));
}

// ----- download -----

#[tokio::test]
async fn download_missing_file_fails_without_fetching() {
    let (client, store) = setup_with_files("media", &["a.txt"]).await;

    let err = store.download_file("media", "b.txt").await.err().unwrap();
    assert!(matches!(err, ObjectStoreError::NoSuchFile { .. }));
    assert!(matches!(
        store.download_file("ghost", "a.txt").await.err().unwrap(),
        ObjectStoreError::NoSuchFile { .. }
    ));
    assert_eq!(client.call_count("get_object"), 0);
}

#[tokio::test]
async fn download_to_nested_path() {
    let (_, store) = setup();
    store.upload("media", "report.txt", "contents", None).await.unwrap();
    let dir = TempDir::new().unwrap();
    let target = dir.path().join("a/b/report.txt");

    store
        .download_file_to("media", "report.txt", &target)
        .await
        .unwrap();

    assert_eq!(std::fs::read_to_string(&target).unwrap(), "contents");
    let siblings = std::fs::read_dir(target.parent().unwrap()).unwrap().count();
    assert_eq!(siblings, 1);
}

#[tokio::test]
async fn download_to_overwrites_existing_file() {
    let (_, store) = setup();
    store.upload("media", "report.txt", "new", None).await.unwrap();
    let dir = TempDir::new().unwrap();
    let target = dir.path().join("report.txt");
    std::fs::write(&target, "old and longer").unwrap();

    store
        .download_file_to("media", "report.txt", &target)
        .await
        .unwrap();
    assert_eq!(std::fs::read_to_string(&target).unwrap(), "new");
}

#[tokio::test]
async fn download_to_rejects_bad_paths() {
    let (_, store) = setup();
    store.upload("media", "report.txt", "contents", None).await.unwrap();
    let dir = TempDir::new().unwrap();

    let err = store
        .download_file_to("media", "report.txt", dir.path())
        .await
        .unwrap_err();
    assert!(matches!(err, ObjectStoreError::PathIsDirectory(_)));

    let err = store
        .download_file_to("media", "report.txt", "")
        .await
        .unwrap_err();
    assert!(matches!(err, ObjectStoreError::IllegalPath(_)));

    let err = store
        .download_file_to("media", "missing.txt", "")
        .await
        .unwrap_err();
    assert!(matches!(err, ObjectStoreError::NoSuchFile { .. }));
}

// ----- end to end -----

#[tokio::test]
async fn upload_list_download_delete_round() {
    let (_, store) = setup();
    store
        .create_bucket_with_policy("b", AccessPolicy::ReadAndWrite)
        .await
        .unwrap();

    store.upload("b", "file.txt", "hi", None).await.unwrap();

    let files = store.list_files("b").await.unwrap();
    assert_eq!(files.len(), 1);
    assert_eq!(files[0].filename, "file.txt");
    assert_eq!(files[0].size, 2);

    assert_eq!(
        store.download_bytes("b", "file.txt").await.unwrap(),
        Bytes::from_static(b"hi")
    );

    store.delete_file("b", "file.txt").await.unwrap();
    assert!(store.list_files("b").await.unwrap().is_empty());
}
