mod support;

use std::net::Ipv4Addr;
use std::time::Duration;

use meshnet::config::NodeConfig;

/// Direct-stream fallback (SPEC_FULL.md §4.7 step 2): a file sent between
/// two direct neighbors skips chunking entirely and arrives as one
/// marker-preceded raw stream.
#[tokio::test]
async fn direct_neighbors_use_the_direct_stream_path() {
    let ip_a = Ipv4Addr::new(127, 10, 3, 2);
    let ip_b = Ipv4Addr::new(127, 10, 3, 3);

    let (node_a, _dir_a) = support::spawn_node(ip_a, "aaaa1111", &[ip_b]).await;
    let (node_b, dir_b) = support::spawn_node(ip_b, "bbbb2222", &[ip_a]).await;

    // B's self-advertisement gives A a routing-table entry marked direct.
    node_b.request_routing_broadcast().await;
    tokio::time::sleep(Duration::from_millis(150)).await;

    let source_dir = tempfile::tempdir().expect("create temp dir");
    let src_path = source_dir.path().join("note.txt");
    let payload = b"a direct neighbor transfer should skip chunking".to_vec();
    std::fs::write(&src_path, &payload).expect("write source file");

    let sent = node_a.send_file("bbbb2222".into(), &src_path).await.expect("send_file should not error");
    assert!(sent);

    tokio::time::sleep(Duration::from_millis(500)).await;

    let download_dir = NodeConfig::download_dir(dir_b.path());
    let saved = std::fs::read_dir(&download_dir)
        .expect("read B's download dir")
        .filter_map(|e| e.ok())
        .find(|e| {
            let name = e.file_name().to_string_lossy().into_owned();
            name.starts_with("note_") && name.ends_with(".txt")
        })
        .expect("direct-stream transfer should have saved the file under a stamped name");

    let received = std::fs::read(saved.path()).expect("read saved file");
    assert_eq!(received, payload);

    // The chunked path never ran, so there's nothing in the file cache.
    assert!(node_b.pending_files().is_empty());
}
