use std::collections::{BTreeMap, BTreeSet};
use std::net::Ipv4Addr;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::constants::{
    ROUTING_TIMEOUT, SECONDARY_ROUTE_GRACE, SEEN_MESSAGE_IDS_EVICT_FRACTION, SEEN_MESSAGE_IDS_LIMIT,
};
use crate::packet::{LinkStateEntry, NodeId};

/// Resolution of a next-hop lookup. Replaces the Python router's
/// heterogeneous `None | str | list[str]` return (REDESIGN FLAG).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NextHop {
    /// Destination is this node; no forwarding needed.
    None,
    /// A specific neighbor to forward to.
    Direct(Ipv4Addr),
    /// No specific route: flood to these neighbors.
    Flood(Vec<Ipv4Addr>),
}

#[derive(Debug, Clone)]
struct RouteEntry {
    next_hop: Ipv4Addr,
    ttl: u8,
    seq: u64,
    timestamp: Instant,
    via_bridge: bool,
    is_gateway: bool,
    /// Whether this entry is the advertiser's own self-advertisement
    /// (`node == sender_id`) rather than a route relayed through them.
    /// `ttl` alone can't tell the two apart: every node in a single
    /// advertisement is decremented by the same one hop, so a two-hop
    /// neighbor's relayed entry gets the same `ttl` as the advertiser's own.
    is_direct: bool,
}

#[derive(Debug, Clone)]
pub struct RouteView {
    pub next_hop: Ipv4Addr,
    pub ttl: u8,
    pub age: Duration,
    pub via_bridge: bool,
    pub is_gateway: bool,
}

struct State {
    routing_table: BTreeMap<NodeId, RouteEntry>,
    secondary_routes: BTreeMap<NodeId, RouteEntry>,
    sequence_numbers: BTreeMap<NodeId, u64>,
    neighbors: BTreeSet<Ipv4Addr>,
    message_ids_seen: Vec<String>,
    bridge_nodes: BTreeSet<NodeId>,
    gateway_nodes: BTreeSet<NodeId>,
}

/// Link-state router: tracks direct neighbors, a primary routing table built
/// from neighbors' advertised link state, shadow "secondary" routes kept
/// around past primary expiry, and per-message loop suppression. Grounded
/// line-for-line on `offline_mesh_app/routing/router.py::Router`.
pub struct Router {
    my_id: NodeId,
    is_hotspot_host: bool,
    state: Mutex<State>,
}

impl Router {
    pub fn new(my_id: NodeId, is_hotspot_host: bool) -> Self {
        Router {
            my_id,
            is_hotspot_host,
            state: Mutex::new(State {
                routing_table: BTreeMap::new(),
                secondary_routes: BTreeMap::new(),
                sequence_numbers: BTreeMap::new(),
                neighbors: BTreeSet::new(),
                message_ids_seen: Vec::new(),
                bridge_nodes: BTreeSet::new(),
                gateway_nodes: BTreeSet::new(),
            }),
        }
    }

    /// Folds a neighbor's advertised link state into our routing table.
    /// Returns `true` if the sender's sequence number advanced our view.
    pub fn update_link_state(
        &self,
        sender_id: &NodeId,
        sender_ip: Ipv4Addr,
        link_state: &BTreeMap<NodeId, LinkStateEntry>,
        seq_num: u64,
        ttl: u8,
    ) -> bool {
        let mut state = self.state.lock().expect("router lock poisoned");

        if state.neighbors.insert(sender_ip) {
            log::info!("new neighbor {sender_id} at {sender_ip}");
        }

        let sender_claims_gateway = link_state
            .get(sender_id)
            .and_then(|e| e.is_gateway)
            .unwrap_or(false);
        if sender_claims_gateway || state.gateway_nodes.contains(sender_id) {
            state.gateway_nodes.insert(sender_id.clone());
            if let Some(route) = state.routing_table.get_mut(sender_id) {
                route.is_gateway = true;
            }
        }

        let is_newer = match state.sequence_numbers.get(sender_id) {
            Some(&known) => seq_num > known,
            None => true,
        };
        if !is_newer {
            return false;
        }
        state.sequence_numbers.insert(sender_id.clone(), seq_num);

        if link_state.get(sender_id).and_then(|e| e.bridges).unwrap_or(false) {
            state.bridge_nodes.insert(sender_id.clone());
        }

        for (node, entry) in link_state.iter() {
            if *node == self.my_id {
                continue;
            }

            let new_ttl = ttl.saturating_sub(1);
            let is_direct = node == sender_id;
            if new_ttl == 0 && !is_direct {
                continue;
            }

            let next_hop = sender_ip;
            let should_update = match state.routing_table.get(node) {
                Some(existing) => existing.seq < entry.seq,
                None => true,
            };
            if !should_update {
                continue;
            }

            if let Some(existing) = state.routing_table.get(node).cloned() {
                state.secondary_routes.insert(node.clone(), existing);
            }

            let via_bridge = state.bridge_nodes.contains(sender_id);
            let is_gateway = state.gateway_nodes.contains(sender_id);
            state.routing_table.insert(
                node.clone(),
                RouteEntry {
                    next_hop,
                    ttl: new_ttl,
                    seq: entry.seq,
                    timestamp: Instant::now(),
                    via_bridge,
                    is_gateway,
                    is_direct,
                },
            );
            log::debug!("route update: {node} via {next_hop}, ttl {new_ttl}");
        }

        true
    }

    /// Builds this node's link-state advertisement, bumping our own sequence
    /// number in the process.
    pub fn get_link_state(&self, my_ip: Ipv4Addr) -> (BTreeMap<NodeId, LinkStateEntry>, u64) {
        let mut state = self.state.lock().expect("router lock poisoned");

        let my_seq = state.sequence_numbers.get(&self.my_id).copied().unwrap_or(0) + 1;
        state.sequence_numbers.insert(self.my_id.clone(), my_seq);

        let is_bridge = Self::detect_bridge_status(&state.neighbors);

        let mut link_state = BTreeMap::new();
        link_state.insert(
            self.my_id.clone(),
            LinkStateEntry {
                ip: Some(my_ip),
                seq: my_seq,
                neighbors: Some(state.neighbors.iter().copied().collect()),
                bridges: Some(is_bridge),
                is_gateway: Some(self.is_hotspot_host),
                next_hop: None,
            },
        );

        let now = Instant::now();
        for (node_id, route) in state.routing_table.iter() {
            if now.duration_since(route.timestamp) <= ROUTING_TIMEOUT {
                link_state.insert(
                    node_id.clone(),
                    LinkStateEntry {
                        ip: None,
                        seq: route.seq,
                        neighbors: None,
                        bridges: None,
                        is_gateway: Some(route.is_gateway),
                        next_hop: Some(route.next_hop),
                    },
                );
            }
        }

        (link_state, my_seq)
    }

    fn detect_bridge_status(neighbors: &BTreeSet<Ipv4Addr>) -> bool {
        let prefixes: BTreeSet<[u8; 2]> = neighbors.iter().map(|ip| [ip.octets()[0], ip.octets()[1]]).collect();
        let is_bridge = prefixes.len() > 1;
        if is_bridge {
            log::info!("this node bridges {} distinct /16 prefixes", prefixes.len());
        }
        is_bridge
    }

    pub fn get_next_hop(&self, destination: &NodeId) -> NextHop {
        let state = self.state.lock().expect("router lock poisoned");

        if *destination == self.my_id {
            return NextHop::None;
        }

        let now = Instant::now();

        if let Some(route) = state.routing_table.get(destination) {
            if now.duration_since(route.timestamp) <= ROUTING_TIMEOUT {
                return NextHop::Direct(route.next_hop);
            }
        }

        if let Some(route) = state.secondary_routes.get(destination) {
            if now.duration_since(route.timestamp) <= SECONDARY_ROUTE_GRACE {
                log::info!("using secondary route to {destination} via {}", route.next_hop);
                return NextHop::Direct(route.next_hop);
            }
        }

        for gateway_id in &state.gateway_nodes {
            if let Some(route) = state.routing_table.get(gateway_id) {
                if now.duration_since(route.timestamp) <= ROUTING_TIMEOUT {
                    log::info!("routing {destination} via gateway {gateway_id}");
                    return NextHop::Direct(route.next_hop);
                }
            }
        }

        for bridge_id in &state.bridge_nodes {
            if let Some(route) = state.routing_table.get(bridge_id) {
                if now.duration_since(route.timestamp) <= ROUTING_TIMEOUT {
                    log::info!("routing {destination} via bridge {bridge_id}");
                    return NextHop::Direct(route.next_hop);
                }
            }
        }

        let all_neighbors: Vec<Ipv4Addr> = state.neighbors.iter().copied().collect();

        let gateway_neighbors: Vec<Ipv4Addr> = all_neighbors
            .iter()
            .copied()
            .filter(|ip| {
                state
                    .routing_table
                    .values()
                    .any(|r| r.next_hop == *ip && r.is_gateway)
            })
            .collect();
        if !gateway_neighbors.is_empty() {
            return NextHop::Flood(gateway_neighbors);
        }

        let bridge_neighbors: Vec<Ipv4Addr> = all_neighbors
            .iter()
            .copied()
            .filter(|ip| {
                state
                    .routing_table
                    .values()
                    .any(|r| r.next_hop == *ip && r.via_bridge)
            })
            .collect();
        if !bridge_neighbors.is_empty() {
            return NextHop::Flood(bridge_neighbors);
        }

        NextHop::Flood(all_neighbors)
    }

    /// Returns the next-hop IP if `destination` is reachable as a direct
    /// neighbor rather than via relay, standing in for the single-hop test
    /// a direct-stream file transfer uses before falling back to chunked.
    pub fn direct_neighbor_route(&self, destination: &NodeId) -> Option<Ipv4Addr> {
        let state = self.state.lock().expect("router lock poisoned");
        let now = Instant::now();
        state.routing_table.get(destination).and_then(|route| {
            let fresh = now.duration_since(route.timestamp) <= ROUTING_TIMEOUT;
            if fresh && route.is_direct {
                Some(route.next_hop)
            } else {
                None
            }
        })
    }

    pub fn get_all_routes(&self) -> BTreeMap<NodeId, RouteView> {
        let state = self.state.lock().expect("router lock poisoned");
        let now = Instant::now();
        state
            .routing_table
            .iter()
            .filter(|(_, route)| now.duration_since(route.timestamp) <= ROUTING_TIMEOUT)
            .map(|(id, route)| {
                (
                    id.clone(),
                    RouteView {
                        next_hop: route.next_hop,
                        ttl: route.ttl,
                        age: now.duration_since(route.timestamp),
                        via_bridge: route.via_bridge,
                        is_gateway: route.is_gateway,
                    },
                )
            })
            .collect()
    }

    pub fn neighbors(&self) -> Vec<Ipv4Addr> {
        self.state.lock().expect("router lock poisoned").neighbors.iter().copied().collect()
    }

    pub fn add_neighbor(&self, ip: Ipv4Addr) {
        self.state.lock().expect("router lock poisoned").neighbors.insert(ip);
    }

    pub fn set_gateway_peers(&self, gateway_id: &NodeId, peers: &[Ipv4Addr]) {
        let mut state = self.state.lock().expect("router lock poisoned");
        state.gateway_nodes.insert(gateway_id.clone());
        for ip in peers {
            state.neighbors.insert(*ip);
        }
    }

    /// Records a message id as seen and reports whether it should still be
    /// forwarded (not previously seen, and TTL has hops left).
    pub fn should_forward_message(&self, message_id: &str, ttl: u8) -> bool {
        let mut state = self.state.lock().expect("router lock poisoned");

        if state.message_ids_seen.iter().any(|id| id == message_id) {
            return false;
        }
        if ttl == 0 {
            return false;
        }

        state.message_ids_seen.push(message_id.to_string());

        if state.message_ids_seen.len() > SEEN_MESSAGE_IDS_LIMIT {
            let to_remove = (state.message_ids_seen.len() as f64 * SEEN_MESSAGE_IDS_EVICT_FRACTION) as usize;
            state.message_ids_seen.drain(0..to_remove);
        }

        true
    }

    /// Expires stale primary routes into secondary, expires ancient
    /// secondary routes outright, and prunes bridge/gateway membership that
    /// no longer has any backing route. Returns the number of primary
    /// routes expired.
    pub fn cleanup_stale_routes(&self) -> usize {
        let mut state = self.state.lock().expect("router lock poisoned");
        let now = Instant::now();

        let stale: Vec<NodeId> = state
            .routing_table
            .iter()
            .filter(|(_, r)| now.duration_since(r.timestamp) > ROUTING_TIMEOUT)
            .map(|(id, _)| id.clone())
            .collect();

        for node_id in &stale {
            if let Some(route) = state.routing_table.remove(node_id) {
                state.secondary_routes.insert(node_id.clone(), route);
            }
            log::debug!("route to {node_id} expired");
        }

        let secondary_ceiling = ROUTING_TIMEOUT * 3;
        let stale_secondary: Vec<NodeId> = state
            .secondary_routes
            .iter()
            .filter(|(_, r)| now.duration_since(r.timestamp) > secondary_ceiling)
            .map(|(id, _)| id.clone())
            .collect();
        for node_id in &stale_secondary {
            state.secondary_routes.remove(node_id);
        }

        let stale_bridges: Vec<NodeId> = state
            .bridge_nodes
            .iter()
            .filter(|id| !state.routing_table.contains_key(*id) && !state.secondary_routes.contains_key(*id))
            .cloned()
            .collect();
        for id in stale_bridges {
            state.bridge_nodes.remove(&id);
        }

        let stale_gateways: Vec<NodeId> = state
            .gateway_nodes
            .iter()
            .filter(|id| !state.routing_table.contains_key(*id) && !state.secondary_routes.contains_key(*id))
            .cloned()
            .collect();
        for id in stale_gateways {
            state.gateway_nodes.remove(&id);
        }

        stale.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(seq: u64) -> LinkStateEntry {
        LinkStateEntry {
            ip: None,
            seq,
            neighbors: None,
            bridges: None,
            is_gateway: None,
            next_hop: None,
        }
    }

    #[test]
    fn self_destination_needs_no_hop() {
        let router = Router::new("aaaaaaaa".into(), false);
        assert_eq!(router.get_next_hop(&"aaaaaaaa".into()), NextHop::None);
    }

    #[test]
    fn unknown_destination_floods_neighbors() {
        let router = Router::new("aaaaaaaa".into(), false);
        router.add_neighbor(Ipv4Addr::new(192, 168, 1, 2));
        match router.get_next_hop(&"zzzzzzzz".into()) {
            NextHop::Flood(neighbors) => assert_eq!(neighbors, vec![Ipv4Addr::new(192, 168, 1, 2)]),
            other => panic!("expected flood, got {other:?}"),
        }
    }

    #[test]
    fn direct_route_learned_from_link_state() {
        let router = Router::new("me______".into(), false);
        let sender_ip = Ipv4Addr::new(10, 0, 0, 5);

        let mut ls = BTreeMap::new();
        ls.insert("peer____".into(), entry(1));
        let updated = router.update_link_state(&"peer____".into(), sender_ip, &ls, 1, 3);

        assert!(updated);
        assert_eq!(router.get_next_hop(&"peer____".into()), NextHop::Direct(sender_ip));
    }

    #[test]
    fn stale_sequence_number_is_ignored() {
        let router = Router::new("me______".into(), false);
        let sender_ip = Ipv4Addr::new(10, 0, 0, 5);
        let mut ls = BTreeMap::new();
        ls.insert("peer____".into(), entry(1));

        assert!(router.update_link_state(&"peer____".into(), sender_ip, &ls, 5, 3));
        assert!(!router.update_link_state(&"peer____".into(), sender_ip, &ls, 5, 3));
        assert!(!router.update_link_state(&"peer____".into(), sender_ip, &ls, 3, 3));
    }

    #[test]
    fn own_id_is_never_written_into_routing_table() {
        let router = Router::new("me______".into(), false);
        let sender_ip = Ipv4Addr::new(10, 0, 0, 5);
        let mut ls = BTreeMap::new();
        ls.insert("me______".into(), entry(9));
        router.update_link_state(&"peer____".into(), sender_ip, &ls, 1, 3);

        assert_eq!(router.get_all_routes().get(&NodeId::from("me______")), None);
    }

    #[test]
    fn duplicate_message_id_is_not_forwarded_twice() {
        let router = Router::new("me______".into(), false);
        assert!(router.should_forward_message("m1", 3));
        assert!(!router.should_forward_message("m1", 3));
    }

    #[test]
    fn zero_ttl_is_never_forwarded() {
        let router = Router::new("me______".into(), false);
        assert!(!router.should_forward_message("m2", 0));
    }

    #[test]
    fn direct_neighbor_route_recognized_from_self_advertisement() {
        let router = Router::new("me______".into(), false);
        let sender_ip = Ipv4Addr::new(10, 0, 0, 5);
        let mut ls = BTreeMap::new();
        ls.insert("peer____".into(), entry(1));
        router.update_link_state(&"peer____".into(), sender_ip, &ls, 1, 3);

        assert_eq!(router.direct_neighbor_route(&"peer____".into()), Some(sender_ip));
    }

    #[test]
    fn relayed_route_in_same_advertisement_is_not_a_direct_neighbor() {
        let router = Router::new("me______".into(), false);
        let sender_ip = Ipv4Addr::new(10, 0, 0, 5);
        let mut ls = BTreeMap::new();
        ls.insert("peer____".into(), entry(1));
        ls.insert("far_away".into(), entry(1));
        router.update_link_state(&"peer____".into(), sender_ip, &ls, 1, 3);

        // Both entries share the advertisement's ttl decrement, so only
        // `is_direct` (node == sender_id) tells them apart.
        assert_eq!(router.direct_neighbor_route(&"peer____".into()), Some(sender_ip));
        assert_eq!(router.direct_neighbor_route(&"far_away".into()), None);
    }

    #[test]
    fn relayed_entry_dropped_once_ttl_is_exhausted() {
        let router = Router::new("me______".into(), false);
        let sender_ip = Ipv4Addr::new(10, 0, 0, 5);
        let mut ls = BTreeMap::new();
        ls.insert("far_away".into(), entry(1));

        // ttl=1 decrements to 0 for the relayed entry; only the sender's own
        // self-entry (is_direct) would survive a ttl of 1.
        router.update_link_state(&"peer____".into(), sender_ip, &ls, 1, 1);

        assert_eq!(router.get_all_routes().get(&NodeId::from("far_away")), None);
        assert_eq!(router.get_next_hop(&"far_away".into()), NextHop::Flood(vec![]));
    }

    #[test]
    fn seen_set_bulk_evicts_past_limit() {
        let router = Router::new("me______".into(), false);
        for i in 0..1001 {
            router.should_forward_message(&format!("m{i}"), 3);
        }
        assert!(router.should_forward_message("m0", 3));
    }
}
