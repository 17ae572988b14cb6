use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::packet::Packet;

struct Entry {
    data: Packet,
    inserted_at: Instant,
}

/// LRU-bounded cache of recently seen application messages, keyed by message
/// id. Mirrors `offline_mesh_app/routing/cache.py::MessageCache`'s
/// `OrderedDict` move-to-end eviction using a `VecDeque` for order plus a
/// `HashMap` for O(1) lookup.
pub struct MessageCache {
    inner: Mutex<Inner>,
    max_size: usize,
}

struct Inner {
    order: VecDeque<String>,
    entries: HashMap<String, Entry>,
}

impl MessageCache {
    pub fn new(max_size: usize) -> Self {
        MessageCache {
            inner: Mutex::new(Inner {
                order: VecDeque::new(),
                entries: HashMap::new(),
            }),
            max_size,
        }
    }

    fn touch(inner: &mut Inner, id: &str) {
        if let Some(pos) = inner.order.iter().position(|x| x == id) {
            inner.order.remove(pos);
            inner.order.push_back(id.to_string());
        }
    }

    /// Returns `true` if this is a newly added message, `false` if it was
    /// already present (and simply moved to most-recently-used).
    pub fn add_message(&self, message_id: &str, data: Packet) -> bool {
        let mut inner = self.inner.lock().expect("message cache lock poisoned");

        if inner.entries.contains_key(message_id) {
            Self::touch(&mut inner, message_id);
            return false;
        }

        inner.entries.insert(
            message_id.to_string(),
            Entry {
                data,
                inserted_at: Instant::now(),
            },
        );
        inner.order.push_back(message_id.to_string());

        if inner.order.len() > self.max_size {
            if let Some(oldest) = inner.order.pop_front() {
                inner.entries.remove(&oldest);
            }
        }

        true
    }

    pub fn get_message(&self, message_id: &str) -> Option<Packet> {
        let mut inner = self.inner.lock().expect("message cache lock poisoned");
        if inner.entries.contains_key(message_id) {
            Self::touch(&mut inner, message_id);
            inner.entries.get(message_id).map(|e| e.data.clone())
        } else {
            None
        }
    }

    pub fn has_message(&self, message_id: &str) -> bool {
        let inner = self.inner.lock().expect("message cache lock poisoned");
        inner.entries.contains_key(message_id)
    }

    /// Evicts entries older than `max_age`, returning the number removed.
    pub fn remove_old_messages(&self, max_age: Duration) -> usize {
        let mut inner = self.inner.lock().expect("message cache lock poisoned");
        let now = Instant::now();
        let stale: Vec<String> = inner
            .entries
            .iter()
            .filter(|(_, entry)| now.duration_since(entry.inserted_at) > max_age)
            .map(|(id, _)| id.clone())
            .collect();

        for id in &stale {
            inner.entries.remove(id);
            if let Some(pos) = inner.order.iter().position(|x| x == id) {
                inner.order.remove(pos);
            }
        }
        stale.len()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().expect("message cache lock poisoned").entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::broadcast_packet;
    use std::net::Ipv4Addr;

    fn sample(id: &str) -> Packet {
        let mut p = broadcast_packet("aaaaaaaa".into(), Ipv4Addr::new(10, 0, 0, 1), "hi".into(), "broadcast".into());
        if let Packet::Broadcast(b) = &mut p {
            b.id = id.to_string();
        }
        p
    }

    #[test]
    fn evicts_oldest_past_capacity() {
        let cache = MessageCache::new(2);
        assert!(cache.add_message("a", sample("a")));
        assert!(cache.add_message("b", sample("b")));
        assert!(cache.add_message("c", sample("c")));

        assert_eq!(cache.len(), 2);
        assert!(!cache.has_message("a"));
        assert!(cache.has_message("b"));
        assert!(cache.has_message("c"));
    }

    #[test]
    fn re_adding_marks_most_recently_used() {
        let cache = MessageCache::new(2);
        cache.add_message("a", sample("a"));
        cache.add_message("b", sample("b"));
        assert!(!cache.add_message("a", sample("a")));
        cache.add_message("c", sample("c"));

        assert!(cache.has_message("a"));
        assert!(!cache.has_message("b"));
    }

    #[test]
    fn removes_messages_older_than_max_age() {
        let cache = MessageCache::new(10);
        cache.add_message("a", sample("a"));
        let removed = cache.remove_old_messages(Duration::from_secs(0));
        assert_eq!(removed, 1);
        assert!(cache.is_empty());
    }
}
