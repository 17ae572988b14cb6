mod support;

use std::net::Ipv4Addr;
use std::time::Duration;

use meshnet::config::NodeConfig;

/// S5: a file too big to hand-wave travels from A to B through relay R in
/// chunks, since A and B are not direct neighbors of each other.
#[tokio::test]
async fn chunked_transfer_relays_a_multi_chunk_file_through_a_third_node() {
    let ip_a = Ipv4Addr::new(127, 10, 2, 2);
    let ip_r = Ipv4Addr::new(127, 10, 2, 3);
    let ip_b = Ipv4Addr::new(127, 10, 2, 4);

    let (node_a, _dir_a) = support::spawn_node(ip_a, "aaaa1111", &[ip_r]).await;
    let (node_r, _dir_r) = support::spawn_node(ip_r, "rrrr3333", &[ip_a, ip_b]).await;
    let (node_b, dir_b) = support::spawn_node(ip_b, "bbbb2222", &[ip_r]).await;

    node_b.request_routing_broadcast().await;
    tokio::time::sleep(Duration::from_millis(150)).await;
    node_r.request_routing_broadcast().await;
    tokio::time::sleep(Duration::from_millis(150)).await;

    let source_dir = tempfile::tempdir().expect("create temp dir");
    let src_path = source_dir.path().join("f.bin");
    // 20 KiB, 3 chunks at CHUNK_SIZE=8192 — matches the scenario's sizing.
    let payload: Vec<u8> = (0..20 * 1024).map(|i| (i % 251) as u8).collect();
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
            name.starts_with("f_") && name.ends_with(".bin")
        })
        .expect("file should have been saved under a stamped name");

    let received = std::fs::read(saved.path()).expect("read saved file");
    assert_eq!(received, payload);

    // Nothing should be left pending once reassembly completes.
    assert!(node_b.pending_files().is_empty());
}
