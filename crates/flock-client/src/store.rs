use flock_types::Id;
use flock_types::models::Notification;

/// The current user's notifications, newest first.
///
/// Fed from two sources: the history fetched on mount and events pushed
/// over the gateway. Either may deliver a notification the other already
/// has, so every insert dedupes by id.
#[derive(Debug, Default)]
pub struct NotificationStore {
    entries: Vec<Notification>,
}

impl NotificationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge fetched history into whatever was pushed before it arrived.
    /// A notification already read locally stays read.
    pub fn seed(&mut self, history: Vec<Notification>) {
        for incoming in history {
            match self.entries.iter_mut().find(|n| n.id == incoming.id) {
                Some(existing) => existing.is_read |= incoming.is_read,
                None => self.entries.push(incoming),
            }
        }
        self.entries
            .sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
    }

    /// Prepend a pushed notification. Returns false for an id already present.
    pub fn push(&mut self, notification: Notification) -> bool {
        if self.contains(notification.id) {
            return false;
        }
        self.entries.insert(0, notification);
        true
    }

    /// Optimistically flip the local read flag. Returns false for an unknown id.
    pub fn mark_read(&mut self, id: Id) -> bool {
        match self.entries.iter_mut().find(|n| n.id == id) {
            Some(n) => {
                n.is_read = true;
                true
            }
            None => false,
        }
    }

    pub fn unread_count(&self) -> usize {
        self.entries.iter().filter(|n| !n.is_read).count()
    }

    pub fn contains(&self, id: Id) -> bool {
        self.entries.iter().any(|n| n.id == id)
    }

    pub fn notifications(&self) -> &[Notification] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use flock_types::models::NotificationKind;

    use super::*;

    fn notification(id: Id, minute: u32) -> Notification {
        Notification {
            id,
            user_id: 2,
            kind: NotificationKind::Follow,
            actor_id: 1,
            actor_username: "alice".into(),
            target_id: None,
            is_read: false,
            created_at: Utc.with_ymd_and_hms(2024, 5, 1, 12, minute, 0).unwrap(),
        }
    }

    fn ids(store: &NotificationStore) -> Vec<Id> {
        store.notifications().iter().map(|n| n.id).collect()
    }

    #[test]
    fn history_seeds_newest_first() {
        let mut store = NotificationStore::new();
        store.seed(vec![notification(1, 0), notification(3, 2), notification(2, 1)]);
        assert_eq!(ids(&store), vec![3, 2, 1]);
        assert_eq!(store.unread_count(), 3);
    }

    #[test]
    fn push_prepends_and_ignores_repeats() {
        let mut store = NotificationStore::new();
        store.seed(vec![notification(1, 0)]);

        assert!(store.push(notification(2, 1)));
        assert!(!store.push(notification(2, 1)));
        assert_eq!(ids(&store), vec![2, 1]);
    }

    #[test]
    fn event_pushed_before_history_arrives_is_not_duplicated() {
        let mut store = NotificationStore::new();
        // Subscription is live before the fetch returns; the same row shows up in both.
        store.push(notification(5, 5));
        store.seed(vec![notification(5, 5), notification(4, 4)]);

        assert_eq!(ids(&store), vec![5, 4]);
        assert_eq!(store.unread_count(), 2);
    }

    #[test]
    fn local_read_survives_a_stale_history_copy() {
        let mut store = NotificationStore::new();
        store.push(notification(7, 0));
        assert!(store.mark_read(7));

        store.seed(vec![notification(7, 0)]);
        assert_eq!(store.unread_count(), 0);
    }

    #[test]
    fn unread_count_tracks_the_list() {
        let mut store = NotificationStore::new();
        store.seed(vec![notification(1, 0), notification(2, 1)]);
        store.mark_read(1);
        store.mark_read(1);
        assert_eq!(store.unread_count(), 1);
        assert!(!store.mark_read(99));
        assert_eq!(store.len(), 2);
    }
}
