//! Typing indicator state for both directions.
//!
//! Outbound, keystrokes are debounced into bursts: the first keystroke
//! opens a window and signals start, further keystrokes extend it, and
//! the window closing signals stop. At most one start signal goes out per
//! burst no matter how fast the user types.
//!
//! Inbound, remote typists are tracked per room with a TTL, so a peer
//! whose stop signal was lost on a flaky socket still disappears from the
//! indicator.

use std::collections::HashMap;
use std::ops::Sub;
use std::time::{Duration, Instant};

use roomwire_proto::{RoomId, UserId};

/// Idle time after the last keystroke before a burst ends.
pub const TYPING_DEBOUNCE: Duration = Duration::from_millis(2000);

/// How long a remote typist stays visible without a refreshed start
/// signal.
pub const REMOTE_TYPING_TTL: Duration = Duration::from_millis(6000);

/// Direction-neutral typing signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypingSignal {
    /// A typing burst began.
    Start,
    /// A typing burst ended.
    Stop,
}

/// A remote member currently typing in a room.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Typist {
    /// The member's user id.
    pub user_id: UserId,
    /// Display name carried on the start signal.
    pub user_name: String,
}

/// Maintenance results from [`TypingCoordinator::tick`].
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TypingTick {
    /// Room whose local burst just ended; publish a stop signal.
    pub stop: Option<RoomId>,
    /// Rooms whose typist set shrank through expiry; refresh indicators.
    pub expired: Vec<RoomId>,
}

#[derive(Debug, Clone)]
struct LocalWindow<I> {
    room_id: RoomId,
    last_input: I,
}

/// Debounces local keystrokes and tracks remote typists.
#[derive(Debug, Clone)]
pub struct TypingCoordinator<I = Instant>
where
    I: Copy + Ord + Send + Sync + Sub<Output = Duration>,
{
    local: Option<LocalWindow<I>>,
    remote: HashMap<RoomId, Vec<(Typist, I)>>,
}

impl<I> Default for TypingCoordinator<I>
where
    I: Copy + Ord + Send + Sync + Sub<Output = Duration>,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<I> TypingCoordinator<I>
where
    I: Copy + Ord + Send + Sync + Sub<Output = Duration>,
{
    /// Creates an idle coordinator.
    #[must_use]
    pub fn new() -> Self {
        Self { local: None, remote: HashMap::new() }
    }

    /// Room of the open local burst, if one is in progress.
    #[must_use]
    pub fn local_room(&self) -> Option<RoomId> {
        self.local.as_ref().map(|w| w.room_id)
    }

    /// Records a local keystroke in `room_id`.
    ///
    /// Returns the signals to publish, in order: a burst switching rooms
    /// stops the old room before starting the new one; a keystroke inside
    /// an open window publishes nothing.
    pub fn local_input(&mut self, room_id: RoomId, now: I) -> Vec<(RoomId, TypingSignal)> {
        match &mut self.local {
            Some(window) if window.room_id == room_id => {
                window.last_input = now;
                Vec::new()
            },
            Some(window) => {
                let old = window.room_id;
                *window = LocalWindow { room_id, last_input: now };
                vec![(old, TypingSignal::Stop), (room_id, TypingSignal::Start)]
            },
            None => {
                self.local = Some(LocalWindow { room_id, last_input: now });
                vec![(room_id, TypingSignal::Start)]
            },
        }
    }

    /// Closes the local burst explicitly (the message was sent, or the
    /// room was deactivated). Returns the room to stop-signal, if a burst
    /// was open.
    pub fn finish_local(&mut self) -> Option<RoomId> {
        self.local.take().map(|w| w.room_id)
    }

    /// Records a remote start signal. Returns `true` if the room's typist
    /// set changed; a refresh of an already-visible typist only extends
    /// their TTL.
    pub fn remote_started(
        &mut self,
        room_id: RoomId,
        user_id: UserId,
        user_name: &str,
        now: I,
    ) -> bool {
        let typists = self.remote.entry(room_id).or_default();
        match typists.iter_mut().find(|(t, _)| t.user_id == user_id) {
            Some((_, seen)) => {
                *seen = now;
                false
            },
            None => {
                typists.push((Typist { user_id, user_name: user_name.to_string() }, now));
                true
            },
        }
    }

    /// Records a remote stop signal. Returns `true` if the typist was
    /// visible and is now removed.
    pub fn remote_stopped(&mut self, room_id: RoomId, user_id: UserId) -> bool {
        let Some(typists) = self.remote.get_mut(&room_id) else {
            return false;
        };
        let before = typists.len();
        typists.retain(|(t, _)| t.user_id != user_id);
        let removed = typists.len() != before;
        if typists.is_empty() {
            self.remote.remove(&room_id);
        }
        removed
    }

    /// Remote members currently typing in `room_id`.
    pub fn typists(&self, room_id: RoomId) -> impl Iterator<Item = &Typist> {
        self.remote.get(&room_id).into_iter().flatten().map(|(t, _)| t)
    }

    /// Expires the local burst and stale remote typists.
    pub fn tick(&mut self, now: I) -> TypingTick {
        let mut result = TypingTick::default();

        if let Some(window) = &self.local {
            if now - window.last_input >= TYPING_DEBOUNCE {
                result.stop = Some(window.room_id);
                self.local = None;
            }
        }

        self.remote.retain(|room_id, typists| {
            let before = typists.len();
            typists.retain(|(_, seen)| now - *seen < REMOTE_TYPING_TTL);
            if typists.len() != before {
                result.expired.push(*room_id);
            }
            !typists.is_empty()
        });

        result
    }

    /// Drops all state without emitting signals. Used when the transport
    /// is lost and signals can no longer be delivered anyway.
    pub fn reset(&mut self) {
        self.local = None;
        self.remote.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(typing: &TypingCoordinator, room_id: RoomId) -> Vec<&str> {
        typing.typists(room_id).map(|t| t.user_name.as_str()).collect()
    }

    #[test]
    fn burst_emits_one_start_signal() {
        let t0 = Instant::now();
        let mut typing = TypingCoordinator::new();

        let signals = typing.local_input(7, t0);
        assert_eq!(signals, vec![(7, TypingSignal::Start)]);

        // Keystrokes inside the window publish nothing.
        for ms in [200, 900, 1800, 2500] {
            assert!(typing.local_input(7, t0 + Duration::from_millis(ms)).is_empty());
        }
    }

    #[test]
    fn idle_window_expires_with_a_stop() {
        let t0 = Instant::now();
        let mut typing = TypingCoordinator::new();
        let _ = typing.local_input(7, t0);

        assert_eq!(typing.tick(t0 + Duration::from_millis(1999)).stop, None);
        let tick = typing.tick(t0 + Duration::from_millis(2000));
        assert_eq!(tick.stop, Some(7));

        // The next keystroke opens a fresh burst.
        let signals = typing.local_input(7, t0 + Duration::from_secs(3));
        assert_eq!(signals, vec![(7, TypingSignal::Start)]);
    }

    #[test]
    fn keystrokes_extend_the_window() {
        let t0 = Instant::now();
        let mut typing = TypingCoordinator::new();
        let _ = typing.local_input(7, t0);
        let _ = typing.local_input(7, t0 + Duration::from_millis(1500));

        assert_eq!(typing.tick(t0 + Duration::from_millis(2100)).stop, None);
        assert_eq!(typing.tick(t0 + Duration::from_millis(3500)).stop, Some(7));
    }

    #[test]
    fn switching_rooms_stops_the_old_burst_first() {
        let t0 = Instant::now();
        let mut typing = TypingCoordinator::new();
        let _ = typing.local_input(7, t0);

        let signals = typing.local_input(9, t0 + Duration::from_millis(500));
        assert_eq!(signals, vec![(7, TypingSignal::Stop), (9, TypingSignal::Start)]);
        assert_eq!(typing.local_room(), Some(9));
    }

    #[test]
    fn finish_closes_the_burst_without_waiting() {
        let t0 = Instant::now();
        let mut typing: TypingCoordinator = TypingCoordinator::new();

        assert_eq!(typing.finish_local(), None);
        let _ = typing.local_input(7, t0);
        assert_eq!(typing.finish_local(), Some(7));
        assert_eq!(typing.local_room(), None);
    }

    #[test]
    fn remote_typists_form_a_set() {
        let t0 = Instant::now();
        let mut typing = TypingCoordinator::new();

        assert!(typing.remote_started(7, 1, "ana", t0));
        assert!(typing.remote_started(7, 2, "bo", t0));
        assert!(!typing.remote_started(7, 1, "ana", t0 + Duration::from_secs(1)));

        assert_eq!(names(&typing, 7), vec!["ana", "bo"]);
        assert!(names(&typing, 9).is_empty());
    }

    #[test]
    fn stop_signal_removes_the_typist() {
        let t0 = Instant::now();
        let mut typing = TypingCoordinator::new();
        let _ = typing.remote_started(7, 1, "ana", t0);

        assert!(typing.remote_stopped(7, 1));
        assert!(names(&typing, 7).is_empty());

        // Stops for absent typists change nothing.
        assert!(!typing.remote_stopped(7, 1));
        assert!(!typing.remote_stopped(9, 1));
    }

    #[test]
    fn stale_typists_expire() {
        let t0 = Instant::now();
        let mut typing = TypingCoordinator::new();
        let _ = typing.remote_started(7, 1, "ana", t0);
        let _ = typing.remote_started(7, 2, "bo", t0 + Duration::from_secs(3));

        let tick = typing.tick(t0 + Duration::from_secs(6));
        assert_eq!(tick.expired, vec![7]);
        assert_eq!(names(&typing, 7), vec!["bo"]);

        let tick = typing.tick(t0 + Duration::from_secs(9));
        assert_eq!(tick.expired, vec![7]);
        assert!(names(&typing, 7).is_empty());
    }

    #[test]
    fn refreshed_typist_outlives_the_original_ttl() {
        let t0 = Instant::now();
        let mut typing = TypingCoordinator::new();
        let _ = typing.remote_started(7, 1, "ana", t0);
        let _ = typing.remote_started(7, 1, "ana", t0 + Duration::from_secs(4));

        assert!(typing.tick(t0 + Duration::from_secs(7)).expired.is_empty());
        assert_eq!(names(&typing, 7), vec!["ana"]);
    }

    #[test]
    fn reset_clears_everything_silently() {
        let t0 = Instant::now();
        let mut typing = TypingCoordinator::new();
        let _ = typing.local_input(7, t0);
        let _ = typing.remote_started(7, 1, "ana", t0);

        typing.reset();
        assert_eq!(typing.local_room(), None);
        assert!(names(&typing, 7).is_empty());
        assert_eq!(typing.tick(t0 + Duration::from_secs(60)), TypingTick::default());
    }
}
