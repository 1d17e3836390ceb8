use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
};

use mqtt_core::{
    topic::{TopicFilter, TopicSubscription},
    PublishPacket,
};
use tokio::sync::RwLock;

/// Per-session user scratch space populated by the connection validator and
/// otherwise treated as opaque by the coordination core.
pub type SessionItems = HashMap<String, String>;

/// Report handed back by `get_session_status`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionStatus {
    pub subscription_count: usize,
}

/// The persistent per-client state that outlives a single connection when
/// `clean_session = false`. Subscription matching and the enqueue counter are
/// the one concrete `SessionOps` implementation this repo ships; the
/// coordination core only ever calls through these methods.
#[derive(Debug)]
pub struct Session {
    client_id: String,
    session_items: RwLock<SessionItems>,
    filters: RwLock<Vec<TopicFilter>>,
    enqueued: AtomicUsize,
}

impl Session {
    pub fn new(client_id: String, session_items: SessionItems) -> Self {
        return Self {
            client_id,
            session_items: RwLock::new(session_items),
            filters: RwLock::new(Vec::new()),
            enqueued: AtomicUsize::new(0),
        };
    }

    pub fn client_id(&self) -> &str {
        return &self.client_id;
    }

    pub async fn session_items(&self) -> SessionItems {
        return self.session_items.read().await.clone();
    }

    pub async fn subscribe(&self, subs: Vec<TopicSubscription>) {
        let mut filters = self.filters.write().await;
        for sub in subs {
            if !filters.contains(sub.filter()) {
                filters.push(sub.filter().clone());
            }
        }
    }

    pub async fn unsubscribe(&self, filters_to_remove: &[TopicFilter]) {
        let mut filters = self.filters.write().await;
        filters.retain(|f| !filters_to_remove.contains(f));
    }

    /// Returns whether this session is subscribed to the message's topic. A
    /// matching message is counted against the session's enqueue counter,
    /// but the outbound queue itself is opaque to the coordination core.
    pub async fn enqueue(&self, message: &PublishPacket, _sender_id: Option<&str>, _is_retained: bool) -> bool {
        let filters = self.filters.read().await;
        let topic = message.topic();

        let subscribed = filters.iter().any(|filter| topic == filter);

        if subscribed {
            self.enqueued.fetch_add(1, Ordering::Relaxed);
        }

        return subscribed;
    }

    pub async fn status(&self) -> SessionStatus {
        return SessionStatus {
            subscription_count: self.filters.read().await.len(),
        };
    }
}

impl PartialEq for Session {
    fn eq(&self, other: &Self) -> bool {
        self.client_id == other.client_id
    }
}

/// Map `client_id -> Session`; owns every session object. Concurrent reads
/// for point lookups, short writes for install/remove/replace, following the
/// teacher's `Arc<RwLock<ServerTopics>>` convention.
pub struct SessionRegistry {
    sessions: RwLock<HashMap<String, Arc<Session>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        return Self {
            sessions: RwLock::new(HashMap::new()),
        };
    }

    /// Atomically returns the existing session, or installs and returns a
    /// freshly constructed one from `factory`.
    pub async fn get_or_install(
        &self,
        client_id: &str,
        factory: impl FnOnce() -> Session,
    ) -> Arc<Session> {
        let mut sessions = self.sessions.write().await;

        if let Some(session) = sessions.get(client_id) {
            return Arc::clone(session);
        }

        let session = Arc::new(factory());
        sessions.insert(client_id.to_string(), Arc::clone(&session));
        return session;
    }

    /// Used by takeover's clean-session branch. Returns the prior session, if
    /// any; the caller discards it.
    pub async fn replace(&self, client_id: &str, new_session: Session) -> Option<Arc<Session>> {
        let mut sessions = self.sessions.write().await;
        return sessions.insert(client_id.to_string(), Arc::new(new_session));
    }

    pub async fn try_remove(&self, client_id: &str) -> Option<Arc<Session>> {
        let mut sessions = self.sessions.write().await;
        return sessions.remove(client_id);
    }

    pub async fn get(&self, client_id: &str) -> Option<Arc<Session>> {
        let sessions = self.sessions.read().await;
        return sessions.get(client_id).cloned();
    }

    /// Point-in-time enumeration for dispatch fan-out. Cloning the `Arc`
    /// handles out under a read lock means iteration never blocks insertion
    /// for longer than the clone.
    pub async fn snapshot(&self) -> Vec<Arc<Session>> {
        let sessions = self.sessions.read().await;
        return sessions.values().cloned().collect();
    }

    pub async fn status(&self, client_id: &str) -> Option<SessionStatus> {
        let sessions = self.sessions.read().await;
        match sessions.get(client_id) {
            Some(session) => Some(session.status().await),
            None => None,
        }
    }

    pub async fn contains(&self, client_id: &str) -> bool {
        return self.sessions.read().await.contains_key(client_id);
    }
}

#[cfg(test)]
mod session {
    use bytes::Bytes;
    use mqtt_core::{qos::QosLevel, topic::TopicName};

    use super::*;

    fn publish(topic: &str) -> PublishPacket {
        return PublishPacket::new(&TopicName::from_str(topic).unwrap(), Bytes::new());
    }

    #[tokio::test]
    async fn subscribe_then_enqueue_matches() {
        let session = Session::new("alice".to_string(), HashMap::new());
        session
            .subscribe(vec![TopicSubscription::new(
                TopicFilter::from_str("news/#").unwrap(),
                QosLevel::AtMostOnce,
            )])
            .await;

        assert!(session.enqueue(&publish("news/weather"), None, false).await);
        assert!(!session.enqueue(&publish("sports/scores"), None, false).await);
        assert_eq!(session.status().await.subscription_count, 1);
    }

    #[tokio::test]
    async fn unsubscribe_removes_match() {
        let filter = TopicFilter::from_str("news/#").unwrap();
        let session = Session::new("alice".to_string(), HashMap::new());
        session
            .subscribe(vec![TopicSubscription::new(filter.clone(), QosLevel::AtMostOnce)])
            .await;
        session.unsubscribe(&[filter]).await;

        assert!(!session.enqueue(&publish("news/weather"), None, false).await);
    }

    #[tokio::test]
    async fn get_or_install_reuses_existing_entry() {
        let registry = SessionRegistry::new();

        let first = registry
            .get_or_install("bob", || Session::new("bob".to_string(), HashMap::new()))
            .await;
        let second = registry
            .get_or_install("bob", || panic!("factory should not run twice"))
            .await;

        assert!(Arc::ptr_eq(&first, &second));
    }

    #[tokio::test]
    async fn replace_discards_prior_session() {
        let registry = SessionRegistry::new();
        registry
            .get_or_install("carol", || Session::new("carol".to_string(), HashMap::new()))
            .await;

        let prior = registry
            .replace("carol", Session::new("carol".to_string(), HashMap::new()))
            .await;

        assert!(prior.is_some());
        assert_eq!(registry.status("carol").await.unwrap().subscription_count, 0);
    }
}
