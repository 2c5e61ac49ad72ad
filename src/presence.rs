use std::time::Duration;

use serde::{Deserialize, Deserializer, Serialize};
use serenity::all::{ActivityData, Context, OnlineStatus};
use strum::{Display, EnumString};
use tokio::task::JoinHandle;

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Display, EnumString, Serialize)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
#[serde(rename_all = "lowercase")]
pub enum ActivityKind {
    #[default]
    Playing,
    Streaming,
    Listening,
    Watching,
    Competing,
}
impl ActivityKind {
    /// Case-insensitive; anything unrecognised is shown as playing.
    pub fn from_name(name: &str) -> Self {
        name.parse().unwrap_or_default()
    }
}
impl<'de> Deserialize<'de> for ActivityKind {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(Self::from_name(&String::deserialize(deserializer)?))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Display, EnumString, Serialize, Deserialize)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
#[serde(rename_all = "lowercase", try_from = "String")]
pub enum PresenceStatus {
    #[default]
    Online,
    Idle,
    Dnd,
    Invisible,
    Offline,
}
impl TryFrom<String> for PresenceStatus {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        value.parse().map_err(|_| Error::InvalidStatus(value))
    }
}
impl From<PresenceStatus> for OnlineStatus {
    fn from(status: PresenceStatus) -> Self {
        match status {
            PresenceStatus::Online => OnlineStatus::Online,
            PresenceStatus::Idle => OnlineStatus::Idle,
            PresenceStatus::Dnd => OnlineStatus::DoNotDisturb,
            PresenceStatus::Invisible => OnlineStatus::Invisible,
            PresenceStatus::Offline => OnlineStatus::Offline,
        }
    }
}

/// One entry of the presence rotation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Activity {
    pub content: String,
    #[serde(rename = "type", default)]
    pub kind: ActivityKind,
    /// Stream link, only used by [`ActivityKind::Streaming`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}
impl Activity {
    pub fn new(content: impl Into<String>, kind: ActivityKind) -> Self {
        Self {
            content: content.into(),
            kind,
            url: None,
        }
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    /// A streaming activity without a usable url is shown as playing.
    pub fn to_activity_data(&self) -> ActivityData {
        match self.kind {
            ActivityKind::Playing => ActivityData::playing(&self.content),
            ActivityKind::Streaming => self
                .url
                .as_deref()
                .and_then(|url| ActivityData::streaming(&self.content, url).ok())
                .unwrap_or_else(|| ActivityData::playing(&self.content)),
            ActivityKind::Listening => ActivityData::listening(&self.content),
            ActivityKind::Watching => ActivityData::watching(&self.content),
            ActivityKind::Competing => ActivityData::competing(&self.content),
        }
    }
}

/// Where rotated activities are applied.
pub trait PresenceSink: Send + Sync + 'static {
    fn apply(&self, activity: &Activity, status: PresenceStatus);
}
impl PresenceSink for Context {
    fn apply(&self, activity: &Activity, status: PresenceStatus) {
        self.set_presence(Some(activity.to_activity_data()), status.into());
    }
}

/// Cycles through a fixed list of activities on a fixed interval.
#[derive(Debug, Clone)]
pub struct PresenceRotator {
    interval: Duration,
    activities: Vec<Activity>,
    status: PresenceStatus,
}

impl PresenceRotator {
    pub fn new(
        interval: Duration,
        activities: Vec<Activity>,
        status: PresenceStatus,
    ) -> Result<Self> {
        if activities.is_empty() {
            return Err(Error::InvalidActivities);
        }
        if interval.is_zero() {
            return Err(Error::InvalidInterval);
        }
        Ok(Self {
            interval,
            activities,
            status,
        })
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn activities(&self) -> &[Activity] {
        &self.activities
    }

    pub fn status(&self) -> PresenceStatus {
        self.status
    }

    /// Applies the first activity right away, then the next one (wrapping
    /// around) every interval until the returned handle is stopped or
    /// dropped.
    pub fn spawn(self, sink: impl PresenceSink) -> PresenceHandle {
        let (stop_tx, stop_rx) = flume::bounded::<()>(1);
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            let mut activities = self.activities.iter().cycle();

            loop {
                tokio::select! {
                    biased;

                    // Fires on an explicit stop and when the handle is dropped
                    _ = stop_rx.recv_async() => break,

                    _ = ticker.tick() => {
                        if let Some(activity) = activities.next() {
                            tracing::debug!(activity = %activity.content, kind = %activity.kind, "updating presence");
                            sink.apply(activity, self.status);
                        }
                    }
                }
            }
            tracing::debug!("presence rotation stopped");
        });

        PresenceHandle { stop_tx, task }
    }
}

/// Owner of a running rotation. Dropping it stops the rotation.
pub struct PresenceHandle {
    stop_tx: flume::Sender<()>,
    task: JoinHandle<()>,
}
impl PresenceHandle {
    pub fn stop(&self) {
        self.stop_tx.try_send(()).ok();
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Recorder(flume::Sender<String>);
    impl PresenceSink for Recorder {
        fn apply(&self, activity: &Activity, _status: PresenceStatus) {
            self.0.send(activity.content.clone()).ok();
        }
    }

    fn activities(names: &[&str]) -> Vec<Activity> {
        names
            .iter()
            .map(|name| Activity::new(*name, ActivityKind::Playing))
            .collect()
    }

    #[tokio::test(start_paused = true)]
    async fn rotates_once_per_interval_and_wraps() {
        let (tx, rx) = flume::unbounded();
        let rotator = PresenceRotator::new(
            Duration::from_secs(30),
            activities(&["A", "B", "C"]),
            PresenceStatus::Online,
        )
        .unwrap();

        let start = tokio::time::Instant::now();
        let _handle = rotator.spawn(Recorder(tx));

        let mut seen = vec![];
        for _ in 0..5 {
            let name = rx.recv_async().await.unwrap();
            seen.push((name, start.elapsed().as_secs()));
        }
        let expected = [("A", 0), ("B", 30), ("C", 60), ("A", 90), ("B", 120)];
        assert_eq!(
            seen,
            expected
                .iter()
                .map(|(name, secs)| (name.to_string(), *secs))
                .collect::<Vec<_>>()
        );
    }

    #[tokio::test(start_paused = true)]
    async fn stopping_ends_the_rotation() {
        let (tx, rx) = flume::unbounded();
        let rotator = PresenceRotator::new(
            Duration::from_secs(5),
            activities(&["A", "B"]),
            PresenceStatus::Idle,
        )
        .unwrap();
        assert_eq!(rotator.interval(), Duration::from_secs(5));
        assert_eq!(rotator.activities().len(), 2);
        assert_eq!(rotator.status(), PresenceStatus::Idle);
        let handle = rotator.spawn(Recorder(tx));

        assert_eq!(rx.recv_async().await.unwrap(), "A");
        assert!(!handle.is_finished());
        handle.stop();
        // The sink is dropped with the task, closing the channel
        assert!(rx.recv_async().await.is_err());
        while !handle.is_finished() {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_the_handle_ends_the_rotation() {
        let (tx, rx) = flume::unbounded();
        let rotator = PresenceRotator::new(
            Duration::from_secs(5),
            activities(&["A"]),
            PresenceStatus::Online,
        )
        .unwrap();
        let handle = rotator.spawn(Recorder(tx));

        assert_eq!(rx.recv_async().await.unwrap(), "A");
        drop(handle);
        assert!(rx.recv_async().await.is_err());
    }

    #[test]
    fn empty_activities_are_rejected() {
        let err = PresenceRotator::new(Duration::from_secs(5), vec![], PresenceStatus::Online)
            .unwrap_err();
        assert!(matches!(err, Error::InvalidActivities));
        assert_eq!(err.kind(), crate::error::ErrorKind::Configuration);
    }

    #[test]
    fn zero_interval_is_rejected() {
        let err = PresenceRotator::new(Duration::ZERO, activities(&["A"]), PresenceStatus::Online)
            .unwrap_err();
        assert!(matches!(err, Error::InvalidInterval));
    }

    #[test]
    fn activity_kinds_parse_case_insensitively() {
        assert_eq!(ActivityKind::from_name("WATCHING"), ActivityKind::Watching);
        assert_eq!(ActivityKind::from_name("Competing"), ActivityKind::Competing);
        assert_eq!(ActivityKind::from_name("dancing"), ActivityKind::Playing);
    }

    #[test]
    fn statuses_parse_case_insensitively() {
        assert_eq!(
            PresenceStatus::try_from("DND".to_string()).unwrap(),
            PresenceStatus::Dnd
        );
        assert!(matches!(
            PresenceStatus::try_from("away".to_string()),
            Err(Error::InvalidStatus(_))
        ));
        assert_eq!(
            OnlineStatus::from(PresenceStatus::Dnd),
            OnlineStatus::DoNotDisturb
        );
    }

    #[test]
    fn activities_deserialize_with_lenient_kind() {
        #[derive(Deserialize)]
        struct Wrapper {
            activities: Vec<Activity>,
        }
        let wrapper: Wrapper = toml::from_str(
            r#"
activities = [
    { content = "the logs", type = "Watching" },
    { content = "something", type = "juggling" },
    { content = "nothing" },
]
"#,
        )
        .unwrap();
        let kinds: Vec<_> = wrapper.activities.iter().map(|a| a.kind).collect();
        assert_eq!(
            kinds,
            vec![
                ActivityKind::Watching,
                ActivityKind::Playing,
                ActivityKind::Playing
            ]
        );
    }
}
