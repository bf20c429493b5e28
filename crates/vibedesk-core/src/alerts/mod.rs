//! Schedule alerts: a once-per-event notification when an event's minute
//! arrives, deduplicated by the persisted `notified` flag.

mod engine;

use chrono::NaiveDateTime;

pub use engine::{AlertEngine, AlertSettings, AlertTask};

/// Sound played for every alert.
pub const DEFAULT_ALERT_SOUND: &str =
    "https://assets.mixkit.co/sfx/preview/mixkit-software-interface-start-2574.mp3";

/// Contact used when the signed-in user has none.
pub const FALLBACK_CONTACT: &str = "user@example.com";

pub const BANNER_TITLE: &str = "Scheduled Event Started";
pub const NOTIFICATION_BODY: &str = "Time is up!";
pub const TEST_NOTIFICATION_TITLE: &str = "VibeDesk Test";
pub const TEST_NOTIFICATION_BODY: &str = "This is how your alerts will look.";
pub const TEST_BANNER_EVENT: &str = "Test Alert Event";
pub const TEST_CONTACT_EVENT: &str = "Test Event";

/// Source of local wall-clock time.
pub trait Clock: Send + Sync + 'static {
    fn now(&self) -> NaiveDateTime;
}

/// Local time of the host.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        chrono::Local::now().naive_local()
    }
}

/// System notification permission state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Permission {
    Granted,
    Denied,
    /// Never asked.
    #[default]
    Default,
}

/// Where alerts surface.
pub trait AlertSink: Send + Sync + 'static {
    /// Play the alert sound. Failures (autoplay blocked, device busy) are
    /// the sink's to log.
    fn play_sound(&self, url: &str);

    /// In-app banner.
    fn banner(&self, title: &str, message: &str);

    fn permission(&self) -> Permission;

    /// Ask for notification permission. Hosts without a prompt just report
    /// the current state.
    fn request_permission(&self) -> Permission {
        self.permission()
    }

    /// System-level notification. Only called with permission granted.
    fn system_notification(&self, title: &str, body: &str);

    /// Simulated out-of-band alert to the user's contact.
    fn contact_alert(&self, message: &str);
}

/// Text of the in-app banner for an event.
pub fn banner_message(title: &str) -> String {
    format!("It's time for: {title}")
}

/// Title of the system notification for an event.
pub fn notification_title(title: &str) -> String {
    format!("VibeDesk Alert: {title}")
}

/// Text of the simulated contact alert.
pub fn contact_message(contact: &str, title: &str) -> String {
    format!("ALERT SENT TO: {contact} - \"{title}\"")
}
