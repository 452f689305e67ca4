//! Per-side movement tracking: speed estimation, unrealistic-jump filtering
//! and resynchronisation handling.
//!
//! Location sources go quiet and then replay a stale fix, or jump across town
//! in one update. Both look like teleportation to the distance engine, so
//! each side of a pair keeps its previous fix and timestamp:
//!
//! - a fix arriving after more than `resync_silence_s` of silence opens a
//!   hold window of `resync_hold_s` during which updates are ignored;
//! - a fix implying a speed above `max_speed_kmh` is dropped (the fix still
//!   replaces the stored previous fix so speeds do not compound).

use chrono::{DateTime, Duration, Utc};

use crate::geo;

/// Movement-filter settings for one pair (shared by both sides).
#[derive(Debug, Clone, Copy)]
pub struct MotionConfig {
    /// Seconds of silence after which the next fix is treated as a resync.
    pub resync_silence_s: f64,
    /// Seconds to ignore updates after a resync is detected.
    pub resync_hold_s: f64,
    /// Speeds above this are considered invalid; `0` disables the filter.
    pub max_speed_kmh: f64,
    /// Window for counting recent updates (reliability input).
    pub update_window_s: f64,
}

/// Verdict for one side's fix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MotionVerdict {
    /// The fix is usable.
    Ok,
    /// The side is resynchronising; ignore this update.
    Resync,
    /// The implied speed was unrealistic; ignore this update.
    SpeedFiltered,
}

/// Movement state for one side of a pair.
#[derive(Debug, Clone, Default)]
pub struct MotionState {
    prev_coords: Option<(f64, f64)>,
    last_fix: Option<DateTime<Utc>>,
    speed_kmh: Option<f64>,
    resync_until: Option<DateTime<Utc>>,
    update_history: Vec<DateTime<Utc>>,
}

fn seconds(s: f64) -> Duration {
    #[allow(clippy::cast_possible_truncation)]
    Duration::milliseconds((s * 1000.0) as i64)
}

impl MotionState {
    /// Latest estimated speed in km/h, if two usable fixes exist.
    #[must_use]
    pub const fn speed_kmh(&self) -> Option<f64> {
        self.speed_kmh
    }

    /// Timestamp of the last accepted fix.
    #[must_use]
    pub const fn last_fix(&self) -> Option<DateTime<Utc>> {
        self.last_fix
    }

    /// End of the current resync hold window, if one is open.
    #[must_use]
    pub const fn resync_until(&self) -> Option<DateTime<Utc>> {
        self.resync_until
    }

    /// Whether a resync hold window is open at `now`.
    #[must_use]
    pub fn in_resync_hold(&self, now: DateTime<Utc>) -> bool {
        self.resync_until.is_some_and(|until| now < until)
    }

    fn store_fix(&mut self, coords: (f64, f64), now: DateTime<Utc>, speed: Option<f64>) {
        self.prev_coords = Some(coords);
        self.last_fix = Some(now);
        self.speed_kmh = speed;
    }

    /// Ingest one fix and decide whether it is usable.
    pub fn apply_fix(
        &mut self,
        coords: (f64, f64),
        now: DateTime<Utc>,
        cfg: &MotionConfig,
    ) -> MotionVerdict {
        // Silence detection: a fix after a long gap opens a hold window.
        if let Some(last) = self.last_fix {
            if cfg.resync_silence_s > 0.0 && now - last > seconds(cfg.resync_silence_s) {
                self.resync_until = Some(now + seconds(cfg.resync_hold_s));
                self.store_fix(coords, now, None);
                return MotionVerdict::Resync;
            }
        }

        if self.in_resync_hold(now) {
            // Refresh the previous fix so speed does not explode once the
            // hold window closes.
            self.store_fix(coords, now, None);
            return MotionVerdict::Resync;
        }

        let (Some(prev), Some(last)) = (self.prev_coords, self.last_fix) else {
            self.store_fix(coords, now, None);
            return MotionVerdict::Ok;
        };

        let dt_seconds = (now - last).num_milliseconds() as f64 / 1000.0;
        if dt_seconds <= 0.0 {
            self.store_fix(coords, now, None);
            return MotionVerdict::Ok;
        }

        let dist_m = geo::haversine_m(prev.0, prev.1, coords.0, coords.1);
        let speed_kmh = (dist_m / dt_seconds) * 3.6;
        self.store_fix(coords, now, Some(speed_kmh));

        if cfg.max_speed_kmh > 0.0 && speed_kmh > cfg.max_speed_kmh {
            return MotionVerdict::SpeedFiltered;
        }
        MotionVerdict::Ok
    }

    /// Record a valid update at `now` and prune entries older than twice the
    /// reliability window.
    pub fn record_update(&mut self, now: DateTime<Utc>, cfg: &MotionConfig) {
        self.update_history.push(now);
        let cutoff = now - seconds(cfg.update_window_s * 2.0);
        self.update_history.retain(|ts| *ts >= cutoff);
    }

    /// Number of recorded updates within the reliability window ending at `now`.
    #[must_use]
    pub fn updates_in_window(&self, now: DateTime<Utc>, cfg: &MotionConfig) -> u32 {
        let cutoff = now - seconds(cfg.update_window_s);
        #[allow(clippy::cast_possible_truncation)]
        let count = self.update_history.iter().filter(|ts| **ts >= cutoff).count() as u32;
        count
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn cfg() -> MotionConfig {
        MotionConfig {
            resync_silence_s: 600.0,
            resync_hold_s: 60.0,
            max_speed_kmh: 150.0,
            update_window_s: 300.0,
        }
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_first_fix_is_ok_with_no_speed() {
        let mut m = MotionState::default();
        assert_eq!(m.apply_fix((37.0, 127.0), t0(), &cfg()), MotionVerdict::Ok);
        assert!(m.speed_kmh().is_none());
    }

    #[test]
    fn test_plausible_speed_passes() {
        let mut m = MotionState::default();
        m.apply_fix((37.0, 127.0), t0(), &cfg());
        // ~1.1 km north in 60 s is ~66.7 km/h.
        let v = m.apply_fix((37.01, 127.0), t0() + Duration::seconds(60), &cfg());
        assert_eq!(v, MotionVerdict::Ok);
        let speed = m.speed_kmh().unwrap();
        assert!((speed - 66.7).abs() < 1.0, "got {speed}");
    }

    #[test]
    fn test_unrealistic_speed_is_filtered() {
        let mut m = MotionState::default();
        m.apply_fix((37.0, 127.0), t0(), &cfg());
        // One full degree of latitude in 60 s is ~6670 km/h.
        let v = m.apply_fix((38.0, 127.0), t0() + Duration::seconds(60), &cfg());
        assert_eq!(v, MotionVerdict::SpeedFiltered);
        // The fix still replaced the previous one, so a follow-up nearby fix
        // computes a sane speed.
        let v = m.apply_fix((38.001, 127.0), t0() + Duration::seconds(120), &cfg());
        assert_eq!(v, MotionVerdict::Ok);
    }

    #[test]
    fn test_zero_max_speed_disables_filter() {
        let mut c = cfg();
        c.max_speed_kmh = 0.0;
        let mut m = MotionState::default();
        m.apply_fix((37.0, 127.0), t0(), &c);
        let v = m.apply_fix((38.0, 127.0), t0() + Duration::seconds(60), &c);
        assert_eq!(v, MotionVerdict::Ok);
    }

    #[test]
    fn test_silence_triggers_resync_and_hold() {
        let mut m = MotionState::default();
        m.apply_fix((37.0, 127.0), t0(), &cfg());

        // 11 minutes of silence: the next fix opens a hold window.
        let after_silence = t0() + Duration::seconds(660);
        assert_eq!(m.apply_fix((37.1, 127.0), after_silence, &cfg()), MotionVerdict::Resync);
        assert!(m.in_resync_hold(after_silence));

        // Inside the hold window updates stay ignored.
        let inside = after_silence + Duration::seconds(30);
        assert_eq!(m.apply_fix((37.1, 127.0), inside, &cfg()), MotionVerdict::Resync);

        // After the hold closes the next fix is usable again.
        let after_hold = after_silence + Duration::seconds(90);
        assert_eq!(m.apply_fix((37.1001, 127.0), after_hold, &cfg()), MotionVerdict::Ok);
    }

    #[test]
    fn test_update_window_counting_and_pruning() {
        let c = cfg();
        let mut m = MotionState::default();
        m.record_update(t0(), &c);
        m.record_update(t0() + Duration::seconds(100), &c);
        m.record_update(t0() + Duration::seconds(200), &c);

        let now = t0() + Duration::seconds(250);
        assert_eq!(m.updates_in_window(now, &c), 3);

        // The first update falls out of the 300 s window.
        let later = t0() + Duration::seconds(350);
        assert_eq!(m.updates_in_window(later, &c), 2);
    }
}
