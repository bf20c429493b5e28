use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::NaiveDateTime;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use super::{
    banner_message, contact_message, notification_title, AlertSink, Clock, Permission,
    BANNER_TITLE, DEFAULT_ALERT_SOUND, FALLBACK_CONTACT, NOTIFICATION_BODY, TEST_BANNER_EVENT,
    TEST_CONTACT_EVENT, TEST_NOTIFICATION_BODY, TEST_NOTIFICATION_TITLE,
};
use crate::mirror::{Record, RemoteMirror, Subscription, SyncWriter};
use crate::models::{CollectionRecord, ScheduleEvent};

/// Alert sound and addressee.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlertSettings {
    pub sound_url: String,
    pub contact: String,
}

impl Default for AlertSettings {
    fn default() -> Self {
        Self {
            sound_url: DEFAULT_ALERT_SOUND.to_string(),
            contact: FALLBACK_CONTACT.to_string(),
        }
    }
}

impl AlertSettings {
    /// Settings for `contact`, falling back to the placeholder address when
    /// it is missing or blank.
    #[must_use]
    pub fn with_contact(mut self, contact: Option<&str>) -> Self {
        if let Some(contact) = contact.map(str::trim).filter(|c| !c.is_empty()) {
            self.contact = contact.to_string();
        }
        self
    }
}

/// Fires each due schedule event once and marks it `notified`.
///
/// The persisted flag is the dedup guard across sessions. Within a session
/// an event that has fired is also remembered locally, so a tick that runs
/// before the mirror echoes the flag back does not fire it twice.
pub struct AlertEngine<M, K, C> {
    scope: String,
    settings: AlertSettings,
    writer: SyncWriter<M>,
    sink: K,
    clock: C,
    fired: Mutex<HashSet<String>>,
}

impl<M, K, C> AlertEngine<M, K, C>
where
    M: RemoteMirror,
    K: AlertSink,
    C: Clock,
{
    pub fn new(
        scope: impl Into<String>,
        settings: AlertSettings,
        writer: SyncWriter<M>,
        sink: K,
        clock: C,
    ) -> Self {
        Self {
            scope: scope.into(),
            settings,
            writer,
            sink,
            clock,
            fired: Mutex::new(HashSet::new()),
        }
    }

    pub const fn sink(&self) -> &K {
        &self.sink
    }

    pub const fn settings(&self) -> &AlertSettings {
        &self.settings
    }

    /// Fire every event due at `now` and return the ids that fired.
    ///
    /// `events` must be the latest mirrored list.
    pub async fn tick(&self, events: &[Record<ScheduleEvent>], now: NaiveDateTime) -> Vec<String> {
        let due: Vec<&Record<ScheduleEvent>> = {
            let mut fired = self.lock_fired();
            // Forget events that were deleted or whose flag has been echoed back
            let pending: HashSet<&str> = events
                .iter()
                .filter(|record| !record.data.fired)
                .map(|record| record.id.as_str())
                .collect();
            fired.retain(|id| pending.contains(id.as_str()));

            events
                .iter()
                .filter(|record| record.data.is_due(now) && fired.insert(record.id.clone()))
                .collect()
        };

        let mut ids = Vec::with_capacity(due.len());
        for record in due {
            let title = &record.data.title;
            tracing::info!(id = %record.id, title = %title, "Schedule alert fired");

            self.sink.play_sound(&self.settings.sound_url);
            self.sink.banner(BANNER_TITLE, &banner_message(title));
            if self.notification_allowed() {
                self.sink
                    .system_notification(&notification_title(title), NOTIFICATION_BODY);
            }
            self.sink
                .contact_alert(&contact_message(&self.settings.contact, title));

            let path = ScheduleEvent::path(&self.scope, &record.id);
            if !self.writer.update(&path, ScheduleEvent::fired_fields()).await {
                tracing::warn!(id = %record.id, "Alert fired but its flag was not saved");
            }
            ids.push(record.id.clone());
        }
        ids
    }

    /// Run every alert surface once without touching any event.
    pub fn fire_test(&self) {
        self.sink.play_sound(&self.settings.sound_url);
        self.sink
            .banner(BANNER_TITLE, &banner_message(TEST_BANNER_EVENT));
        if self.notification_allowed() {
            self.sink
                .system_notification(TEST_NOTIFICATION_TITLE, TEST_NOTIFICATION_BODY);
        } else {
            let permission = self.sink.request_permission();
            tracing::debug!(?permission, "Requested notification permission");
        }
        self.sink
            .contact_alert(&contact_message(&self.settings.contact, TEST_CONTACT_EVENT));
    }

    fn notification_allowed(&self) -> bool {
        let permission = self.sink.permission();
        if permission != Permission::Granted {
            tracing::debug!(?permission, "System notifications not permitted; banner only");
        }
        permission == Permission::Granted
    }

    fn lock_fired(&self) -> MutexGuard<'_, HashSet<String>> {
        self.fired.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<M, K, C> AlertEngine<M, K, C>
where
    M: RemoteMirror + 'static,
    K: AlertSink,
    C: Clock,
{
    /// Check the latest snapshot of `subscription` every `interval` until
    /// the returned task is stopped.
    pub fn spawn(self: Arc<Self>, subscription: Subscription, interval: Duration) -> AlertTask {
        let cancel = CancellationToken::new();
        let token = cancel.clone();

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    () = token.cancelled() => break,
                    _ = ticker.tick() => {
                        let Some(snapshot) = subscription.latest() else {
                            continue;
                        };
                        let events = snapshot.decode::<ScheduleEvent>();
                        self.tick(&events, self.clock.now()).await;
                    }
                }
            }
            tracing::debug!(scope = %self.scope, "Alert loop stopped");
        });

        AlertTask {
            cancel,
            handle: Some(handle),
        }
    }
}

/// A running alert loop. Stopped on drop.
#[derive(Debug)]
pub struct AlertTask {
    cancel: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl AlertTask {
    /// Stop the timer. Safe to call more than once.
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    pub fn is_stopped(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Stop and wait for the loop to exit.
    pub async fn join(mut self) {
        self.stop();
        if let Some(handle) = self.handle.take() {
            if let Err(error) = handle.await {
                tracing::error!("Alert loop panicked: {error}");
            }
        }
    }
}

impl Drop for AlertTask {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicBool, Ordering};

    use chrono::NaiveDate;
    use pretty_assertions::assert_eq;
    use serde_json::Value;

    use super::*;
    use crate::error::{Error, ErrorKind, Result};
    use crate::mirror::{merge_fields, DocPath, Query, RawRecord, SetMode, SnapshotHub};
    use crate::notice::NoticeBoard;

    /// Schedule collection kept in memory, echoing writes to subscribers.
    #[derive(Default)]
    struct MemoryMirror {
        hub: Arc<SnapshotHub>,
        docs: Mutex<BTreeMap<String, Value>>,
        reject_writes: AtomicBool,
    }

    impl MemoryMirror {
        fn insert(&self, id: &str, event: &ScheduleEvent) {
            self.docs
                .lock()
                .unwrap()
                .insert(id.to_string(), serde_json::to_value(event).unwrap());
            self.republish();
        }

        fn event(&self, id: &str) -> ScheduleEvent {
            serde_json::from_value(self.docs.lock().unwrap()[id].clone()).unwrap()
        }

        fn records(&self) -> Vec<Record<ScheduleEvent>> {
            self.docs
                .lock()
                .unwrap()
                .iter()
                .map(|(id, payload)| Record {
                    id: id.clone(),
                    data: serde_json::from_value(payload.clone()).unwrap(),
                })
                .collect()
        }

        fn republish(&self) {
            let records: Vec<RawRecord> = self
                .docs
                .lock()
                .unwrap()
                .iter()
                .map(|(id, payload)| RawRecord {
                    id: id.clone(),
                    payload: payload.clone(),
                })
                .collect();
            for (listener, _) in self.hub.all() {
                self.hub.publish(listener, records.clone());
            }
        }
    }

    impl RemoteMirror for MemoryMirror {
        async fn subscribe(&self, query: Query) -> Result<Subscription> {
            let subscription = self.hub.register(query);
            self.republish();
            Ok(subscription)
        }

        async fn add(&self, _scope: &str, _collection: &str, _payload: Value) -> Result<String> {
            Err(Error::InvalidInput("not supported".to_string()))
        }

        async fn set(&self, _path: &DocPath, _payload: Value, _mode: SetMode) -> Result<()> {
            Err(Error::InvalidInput("not supported".to_string()))
        }

        async fn update(&self, path: &DocPath, fields: Value) -> Result<()> {
            if self.reject_writes.load(Ordering::SeqCst) {
                return Err(Error::SyncWriteFailed("offline".to_string()));
            }
            {
                let mut docs = self.docs.lock().unwrap();
                let doc = docs
                    .get_mut(&path.id)
                    .ok_or_else(|| Error::NotFound(path.id.clone()))?;
                merge_fields(doc, fields);
            }
            self.republish();
            Ok(())
        }

        async fn delete(&self, _path: &DocPath) -> Result<()> {
            Ok(())
        }
    }

    #[derive(Default)]
    struct RecordingSink {
        permission: Mutex<Permission>,
        calls: Mutex<Vec<String>>,
    }

    impl RecordingSink {
        fn granted() -> Self {
            Self {
                permission: Mutex::new(Permission::Granted),
                calls: Mutex::default(),
            }
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }

        fn push(&self, call: String) {
            self.calls.lock().unwrap().push(call);
        }
    }

    impl AlertSink for RecordingSink {
        fn play_sound(&self, url: &str) {
            self.push(format!("sound {url}"));
        }

        fn banner(&self, title: &str, message: &str) {
            self.push(format!("banner {title} / {message}"));
        }

        fn permission(&self) -> Permission {
            *self.permission.lock().unwrap()
        }

        fn request_permission(&self) -> Permission {
            self.push("request permission".to_string());
            self.permission()
        }

        fn system_notification(&self, title: &str, body: &str) {
            self.push(format!("notify {title} / {body}"));
        }

        fn contact_alert(&self, message: &str) {
            self.push(format!("contact {message}"));
        }
    }

    struct FixedClock(NaiveDateTime);

    impl Clock for FixedClock {
        fn now(&self) -> NaiveDateTime {
            self.0
        }
    }

    type Engine = AlertEngine<Arc<MemoryMirror>, RecordingSink, FixedClock>;

    fn at(h: u32, m: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 5, 1)
            .unwrap()
            .and_hms_opt(h, m, s)
            .unwrap()
    }

    fn engine(mirror: &Arc<MemoryMirror>, sink: RecordingSink, notices: NoticeBoard) -> Engine {
        AlertEngine::new(
            "u1",
            AlertSettings::default().with_contact(Some("me@example.com")),
            SyncWriter::new(Arc::clone(mirror), notices),
            sink,
            FixedClock(at(9, 0, 0)),
        )
    }

    fn standup() -> ScheduleEvent {
        ScheduleEvent::new("2024-05-01", "09:00", "Standup").unwrap()
    }

    #[tokio::test]
    async fn due_event_fires_every_surface_then_persists() {
        let mirror = Arc::new(MemoryMirror::default());
        mirror.insert("e1", &standup());
        let engine = engine(&mirror, RecordingSink::granted(), NoticeBoard::new());

        let fired = engine.tick(&mirror.records(), at(9, 0, 0)).await;

        assert_eq!(fired, vec!["e1".to_string()]);
        assert_eq!(
            engine.sink().calls(),
            vec![
                format!("sound {DEFAULT_ALERT_SOUND}"),
                "banner Scheduled Event Started / It's time for: Standup".to_string(),
                "notify VibeDesk Alert: Standup / Time is up!".to_string(),
                "contact ALERT SENT TO: me@example.com - \"Standup\"".to_string(),
            ]
        );
        assert!(mirror.event("e1").fired);
    }

    #[tokio::test]
    async fn second_tick_in_same_minute_does_nothing() {
        let mirror = Arc::new(MemoryMirror::default());
        mirror.insert("e1", &standup());
        let engine = engine(&mirror, RecordingSink::granted(), NoticeBoard::new());
        let stale = mirror.records();

        engine.tick(&stale, at(9, 0, 0)).await;
        let calls = engine.sink().calls().len();

        assert!(engine.tick(&stale, at(9, 0, 30)).await.is_empty());
        assert!(engine.tick(&mirror.records(), at(9, 0, 30)).await.is_empty());
        assert_eq!(engine.sink().calls().len(), calls);
    }

    #[tokio::test]
    async fn flag_persisted_elsewhere_prevents_firing() {
        let mirror = Arc::new(MemoryMirror::default());
        let mut event = standup();
        event.fired = true;
        mirror.insert("e1", &event);
        mirror.insert(
            "e2",
            &ScheduleEvent::new("2024-05-01", "09:01", "Later").unwrap(),
        );
        let engine = engine(&mirror, RecordingSink::granted(), NoticeBoard::new());

        assert!(engine.tick(&mirror.records(), at(9, 0, 10)).await.is_empty());
        assert!(engine.sink().calls().is_empty());
    }

    #[tokio::test]
    async fn without_permission_only_banner_sound_and_contact() {
        let mirror = Arc::new(MemoryMirror::default());
        mirror.insert("e1", &standup());
        let engine = engine(&mirror, RecordingSink::default(), NoticeBoard::new());

        engine.tick(&mirror.records(), at(9, 0, 0)).await;

        let calls = engine.sink().calls();
        assert_eq!(calls.len(), 3);
        assert!(calls.iter().all(|call| !call.starts_with("notify")));
    }

    #[tokio::test]
    async fn failed_flag_write_posts_notice_and_does_not_refire() {
        let mirror = Arc::new(MemoryMirror::default());
        mirror.insert("e1", &standup());
        mirror.reject_writes.store(true, Ordering::SeqCst);
        let notices = NoticeBoard::new();
        let mut rx = notices.subscribe();
        let engine = engine(&mirror, RecordingSink::granted(), notices);

        assert_eq!(engine.tick(&mirror.records(), at(9, 0, 0)).await.len(), 1);
        assert_eq!(rx.recv().await.unwrap().kind, ErrorKind::SyncWriteFailed);
        assert!(!mirror.event("e1").fired);

        assert!(engine.tick(&mirror.records(), at(9, 0, 5)).await.is_empty());
    }

    #[tokio::test]
    async fn session_memory_forgets_persisted_and_deleted_events() {
        let mirror = Arc::new(MemoryMirror::default());
        mirror.insert("e1", &standup());
        mirror.insert(
            "e2",
            &ScheduleEvent::new("2024-05-01", "09:00", "Coffee").unwrap(),
        );
        mirror.reject_writes.store(true, Ordering::SeqCst);
        let engine = engine(&mirror, RecordingSink::granted(), NoticeBoard::new());

        assert_eq!(engine.tick(&mirror.records(), at(9, 0, 0)).await.len(), 2);
        assert_eq!(engine.lock_fired().len(), 2);

        // e1's flag lands, e2 is deleted elsewhere
        mirror.reject_writes.store(false, Ordering::SeqCst);
        let mut persisted = mirror.records();
        persisted.retain(|record| record.id == "e1");
        persisted[0].data.fired = true;

        assert!(engine.tick(&persisted, at(9, 0, 20)).await.is_empty());
        assert!(engine.lock_fired().is_empty());
    }

    #[tokio::test]
    async fn test_alert_touches_no_event() {
        let mirror = Arc::new(MemoryMirror::default());
        mirror.insert("e1", &standup());
        let engine = engine(&mirror, RecordingSink::default(), NoticeBoard::new());

        engine.fire_test();

        assert_eq!(
            engine.sink().calls(),
            vec![
                format!("sound {DEFAULT_ALERT_SOUND}"),
                "banner Scheduled Event Started / It's time for: Test Alert Event".to_string(),
                "request permission".to_string(),
                "contact ALERT SENT TO: me@example.com - \"Test Event\"".to_string(),
            ]
        );
        assert!(!mirror.event("e1").fired);
    }

    #[test]
    fn blank_contact_falls_back() {
        let settings = AlertSettings::default().with_contact(Some("  "));
        assert_eq!(settings.contact, FALLBACK_CONTACT);
    }

    #[tokio::test(start_paused = true)]
    async fn spawned_loop_fires_once_and_stops() {
        let mirror = Arc::new(MemoryMirror::default());
        mirror.insert("e1", &standup());
        let engine = Arc::new(engine(&mirror, RecordingSink::granted(), NoticeBoard::new()));
        let subscription = mirror
            .subscribe(ScheduleEvent::query("u1"))
            .await
            .unwrap();

        let task = Arc::clone(&engine).spawn(subscription, Duration::from_secs(1));
        tokio::time::sleep(Duration::from_millis(3_500)).await;

        task.stop();
        task.stop();
        assert!(task.is_stopped());
        task.join().await;

        assert_eq!(
            engine
                .sink()
                .calls()
                .iter()
                .filter(|call| call.starts_with("banner"))
                .count(),
            1
        );
        assert!(mirror.event("e1").fired);
        assert_eq!(mirror.hub.listener_count(), 0);
    }
}
