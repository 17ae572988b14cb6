mod support;

use std::net::Ipv4Addr;

use meshnet::net::Dispatcher;
use meshnet::packet::broadcast_packet;

/// S4: the same broadcast, delivered twice from two different neighbors,
/// is only recorded once.
#[tokio::test]
async fn duplicate_broadcast_from_different_neighbors_is_recorded_once() {
    let ip_x = Ipv4Addr::new(127, 10, 4, 2);
    let (node_x, _dir_x) = support::spawn_node(ip_x, "xxxx9999", &[]).await;

    let packet = broadcast_packet("srcsrcsr".into(), Ipv4Addr::new(10, 0, 0, 1), "hello".into(), "chat".into());

    let neighbor_one = Ipv4Addr::new(10, 0, 0, 2);
    let neighbor_two = Ipv4Addr::new(10, 0, 0, 3);

    node_x.dispatch_packet(packet.clone(), neighbor_one).await;
    node_x.dispatch_packet(packet.clone(), neighbor_two).await;

    let history = node_x.message_history();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].content, "hello");
}
