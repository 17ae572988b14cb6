mod support;

use std::net::Ipv4Addr;
use std::time::Duration;

use meshnet::NodeId;

/// S2: A and B are only reachable through relay R. After R and B each
/// advertise once, A should learn a route to B via R and deliver through it.
#[tokio::test]
async fn message_relays_through_the_middle_node() {
    let ip_a = Ipv4Addr::new(127, 10, 1, 2);
    let ip_r = Ipv4Addr::new(127, 10, 1, 3);
    let ip_b = Ipv4Addr::new(127, 10, 1, 4);

    let (node_a, _dir_a) = support::spawn_node(ip_a, "aaaa1111", &[ip_r]).await;
    let (node_r, _dir_r) = support::spawn_node(ip_r, "rrrr3333", &[ip_a, ip_b]).await;
    let (node_b, _dir_b) = support::spawn_node(ip_b, "bbbb2222", &[ip_r]).await;

    // B's self-advertisement gives R a direct route to B...
    node_b.request_routing_broadcast().await;
    tokio::time::sleep(Duration::from_millis(150)).await;
    // ...and R's re-advertisement, folding that route in, gives A a route to B via R.
    node_r.request_routing_broadcast().await;
    tokio::time::sleep(Duration::from_millis(150)).await;

    let routes = node_a.active_routes();
    let route_to_b = routes.get(&NodeId::from("bbbb2222")).expect("A should have learned a route to B via R");
    assert_eq!(route_to_b.next_hop, ip_r);

    let delivered = node_a.send_unicast("bbbb2222".into(), "hi".into(), "chat".into()).await;
    assert!(delivered);

    tokio::time::sleep(Duration::from_millis(250)).await;

    let history = node_b.message_history();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].content, "hi");
    assert_eq!(history[0].src, NodeId::from("aaaa1111"));
}
