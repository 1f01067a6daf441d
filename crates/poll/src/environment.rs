//! Environment monitor: user activity, page visibility and connection quality
//!
//! The monitor is fed by whatever platform layer hosts the engine (a browser
//! bridge, a desktop shell, a terminal UI). It never fails: missing platform
//! information simply leaves the defaults in place (visible, `Excellent`).

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, info};

/// Activity events closer together than this count as a burst.
const BURST_WINDOW: Duration = Duration::from_millis(1_000);

/// Connection quality as seen by the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionQuality {
    /// Fast, unmetered connection (also the default when unknown)
    #[default]
    Excellent,
    /// Usable but slower or metered
    Good,
    /// Slow connection; polling backs off
    Poor,
    /// No connection; polling stops
    Offline,
}

impl ConnectionQuality {
    /// Graceful degradation applies on poor or missing connectivity.
    #[must_use]
    pub const fn is_degraded(self) -> bool {
        matches!(self, Self::Poor | Self::Offline)
    }
}

impl fmt::Display for ConnectionQuality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Excellent => "excellent",
            Self::Good => "good",
            Self::Poor => "poor",
            Self::Offline => "offline",
        };
        f.write_str(name)
    }
}

/// Effective connection type reported by the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EffectiveType {
    /// `slow-2g`
    #[serde(rename = "slow-2g")]
    Slow2g,
    /// `2g`
    #[serde(rename = "2g")]
    TwoG,
    /// `3g`
    #[serde(rename = "3g")]
    ThreeG,
    /// `4g`
    #[serde(rename = "4g")]
    FourG,
}

impl FromStr for EffectiveType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "slow-2g" => Ok(Self::Slow2g),
            "2g" => Ok(Self::TwoG),
            "3g" => Ok(Self::ThreeG),
            "4g" => Ok(Self::FourG),
            other => Err(format!("unknown effective connection type `{other}`")),
        }
    }
}

/// Network information as exposed by the platform, if at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct NetworkInfo {
    /// Effective connection type
    pub effective_type: Option<EffectiveType>,
    /// The user asked for reduced data usage
    pub save_data: bool,
}

impl NetworkInfo {
    /// Map the reported network information to a quality level.
    #[must_use]
    pub const fn quality(&self) -> ConnectionQuality {
        let quality = match self.effective_type {
            Some(EffectiveType::Slow2g | EffectiveType::TwoG) => ConnectionQuality::Poor,
            Some(EffectiveType::ThreeG) => ConnectionQuality::Good,
            Some(EffectiveType::FourG) | None => ConnectionQuality::Excellent,
        };
        if self.save_data && matches!(quality, ConnectionQuality::Excellent) {
            ConnectionQuality::Good
        } else {
            quality
        }
    }
}

/// Kind of user input observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActivityKind {
    /// Mouse / pen movement or click
    Pointer,
    /// Key press
    Keyboard,
    /// Touch start
    Touch,
    /// Scrolling
    Scroll,
}

/// Process-wide environment state, owned by the [`EnvironmentMonitor`].
#[derive(Debug, Clone)]
pub struct EnvironmentState {
    /// Last observed user input
    pub last_activity: Instant,
    /// Page (or window) visibility
    pub visible: bool,
    /// Current connection quality
    pub quality: ConnectionQuality,
    /// Burst counter of user input
    pub interaction_intensity: u32,
}

impl EnvironmentState {
    fn new() -> Self {
        Self {
            last_activity: Instant::now(),
            visible: true,
            quality: ConnectionQuality::Excellent,
            interaction_intensity: 0,
        }
    }

    /// Derived degradation flag.
    #[must_use]
    pub const fn is_degraded(&self) -> bool {
        self.quality.is_degraded()
    }
}

/// Point-in-time view of the environment consumed by the interval calculator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnvironmentSnapshot {
    /// Connection quality
    pub quality: ConnectionQuality,
    /// Page visibility
    pub visible: bool,
    /// Time since the last user input
    pub idle: Duration,
    /// Burst counter of user input
    pub interaction_intensity: u32,
}

impl Default for EnvironmentSnapshot {
    fn default() -> Self {
        Self {
            quality: ConnectionQuality::Excellent,
            visible: true,
            idle: Duration::ZERO,
            interaction_intensity: 0,
        }
    }
}

/// Observes activity, visibility and network signals.
///
/// Cheap to clone; all clones share one state. Sessions subscribe to
/// [`refresh_signal`](Self::refresh_signal) to poll immediately when the page
/// becomes visible again or connectivity returns.
#[derive(Debug, Clone)]
pub struct EnvironmentMonitor {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    state: RwLock<EnvironmentState>,
    refresh: watch::Sender<u64>,
}

impl Default for EnvironmentMonitor {
    fn default() -> Self {
        Self::new()
    }
}

impl EnvironmentMonitor {
    /// Create a monitor with default state: visible, active now, `Excellent`.
    #[must_use]
    pub fn new() -> Self {
        let (refresh, _) = watch::channel(0);
        Self {
            inner: Arc::new(Inner {
                state: RwLock::new(EnvironmentState::new()),
                refresh,
            }),
        }
    }

    /// Record one input event.
    pub fn record_activity(&self, kind: ActivityKind) {
        let now = Instant::now();
        let mut state = self.inner.state.write();
        if now.saturating_duration_since(state.last_activity) < BURST_WINDOW {
            state.interaction_intensity = state.interaction_intensity.saturating_add(1);
        } else {
            state.interaction_intensity = state.interaction_intensity.saturating_sub(1);
        }
        state.last_activity = now;
        debug!(?kind, intensity = state.interaction_intensity, "user activity");
    }

    /// Record a visibility change. Becoming visible refreshes every session.
    pub fn set_visible(&self, visible: bool) {
        let regained = {
            let mut state = self.inner.state.write();
            let regained = visible && !state.visible;
            state.visible = visible;
            regained
        };
        debug!(visible, "visibility changed");
        if regained {
            self.request_refresh("visibility regained");
        }
    }

    /// Record platform network information.
    ///
    /// Ignored while offline: only an explicit online event ends that state.
    pub fn update_network(&self, info: NetworkInfo) {
        let mut state = self.inner.state.write();
        if state.quality == ConnectionQuality::Offline {
            return;
        }
        let quality = info.quality();
        if quality != state.quality {
            info!(from = %state.quality, to = %quality, "connection quality changed");
            state.quality = quality;
        }
    }

    /// Record an explicit online/offline event.
    pub fn set_online(&self, online: bool) {
        let reconnected = {
            let mut state = self.inner.state.write();
            let was_offline = state.quality == ConnectionQuality::Offline;
            state.quality = if online {
                ConnectionQuality::Excellent
            } else {
                ConnectionQuality::Offline
            };
            online && was_offline
        };
        info!(online, "connectivity changed");
        if reconnected {
            self.request_refresh("connectivity regained");
        }
    }

    /// Ask every subscribed session to poll now.
    pub fn request_refresh(&self, reason: &str) {
        debug!(reason, "refresh requested");
        self.inner.refresh.send_modify(|epoch| *epoch = epoch.wrapping_add(1));
    }

    /// Receiver that changes whenever a refresh is requested.
    #[must_use]
    pub fn refresh_signal(&self) -> watch::Receiver<u64> {
        self.inner.refresh.subscribe()
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> EnvironmentState {
        self.inner.state.read().clone()
    }

    /// Snapshot for the interval calculator.
    #[must_use]
    pub fn snapshot(&self) -> EnvironmentSnapshot {
        let state = self.inner.state.read();
        EnvironmentSnapshot {
            quality: state.quality,
            visible: state.visible,
            idle: Instant::now().saturating_duration_since(state.last_activity),
            interaction_intensity: state.interaction_intensity,
        }
    }

    /// Current connection quality.
    #[must_use]
    pub fn quality(&self) -> ConnectionQuality {
        self.inner.state.read().quality
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(None, false, ConnectionQuality::Excellent)]
    #[case(Some(EffectiveType::FourG), false, ConnectionQuality::Excellent)]
    #[case(Some(EffectiveType::FourG), true, ConnectionQuality::Good)]
    #[case(Some(EffectiveType::ThreeG), false, ConnectionQuality::Good)]
    #[case(Some(EffectiveType::TwoG), false, ConnectionQuality::Poor)]
    #[case(Some(EffectiveType::Slow2g), true, ConnectionQuality::Poor)]
    fn network_maps_to_quality(
        #[case] effective_type: Option<EffectiveType>,
        #[case] save_data: bool,
        #[case] expected: ConnectionQuality,
    ) {
        let info = NetworkInfo {
            effective_type,
            save_data,
        };
        assert_eq!(info.quality(), expected);
    }

    #[test]
    fn parses_effective_type() {
        assert_eq!("4G".parse::<EffectiveType>(), Ok(EffectiveType::FourG));
        assert_eq!("slow-2g".parse::<EffectiveType>(), Ok(EffectiveType::Slow2g));
        assert!("5g".parse::<EffectiveType>().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn defaults_without_platform_support() {
        let monitor = EnvironmentMonitor::new();
        let snapshot = monitor.snapshot();

        assert_eq!(snapshot.quality, ConnectionQuality::Excellent);
        assert!(snapshot.visible);
        assert!(!monitor.state().is_degraded());
    }

    #[tokio::test(start_paused = true)]
    async fn bursts_raise_intensity_and_pauses_decay_it() {
        let monitor = EnvironmentMonitor::new();

        for _ in 0..3 {
            tokio::time::advance(Duration::from_millis(200)).await;
            monitor.record_activity(ActivityKind::Keyboard);
        }
        assert_eq!(monitor.state().interaction_intensity, 3);

        tokio::time::advance(Duration::from_secs(2)).await;
        monitor.record_activity(ActivityKind::Pointer);
        assert_eq!(monitor.state().interaction_intensity, 2);
        assert_eq!(monitor.snapshot().idle, Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn visibility_regain_requests_refresh() {
        let monitor = EnvironmentMonitor::new();
        let mut signal = monitor.refresh_signal();

        monitor.set_visible(false);
        assert!(!signal.has_changed().unwrap());

        monitor.set_visible(true);
        assert!(signal.has_changed().unwrap());
        signal.mark_unchanged();

        // Already visible: no second refresh.
        monitor.set_visible(true);
        assert!(!signal.has_changed().unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn offline_sticks_until_online_event() {
        let monitor = EnvironmentMonitor::new();
        let mut signal = monitor.refresh_signal();

        monitor.set_online(false);
        assert_eq!(monitor.quality(), ConnectionQuality::Offline);

        monitor.update_network(NetworkInfo {
            effective_type: Some(EffectiveType::FourG),
            save_data: false,
        });
        assert_eq!(monitor.quality(), ConnectionQuality::Offline);

        monitor.set_online(true);
        assert_eq!(monitor.quality(), ConnectionQuality::Excellent);
        assert!(signal.has_changed().unwrap());
        signal.mark_unchanged();

        monitor.update_network(NetworkInfo {
            effective_type: Some(EffectiveType::TwoG),
            save_data: false,
        });
        assert_eq!(monitor.quality(), ConnectionQuality::Poor);
        assert!(monitor.state().is_degraded());
    }
}
