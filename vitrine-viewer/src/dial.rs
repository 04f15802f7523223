//! Bounded drag-to-timeline dial
//!
//! Dragging the dial moves a position inside a fixed frame range of an
//! animation group and reports the scrub the group should play. When the
//! pointer goes idle the dial springs back to the start of its range.

use std::time::Duration;
use web_time::Instant;

/// First frame of the dial range
pub const DIAL_START: f32 = 5.0;
/// Last frame of the dial range
pub const DIAL_END: f32 = 6.23;
/// Dose shown at [`DIAL_END`]
pub const DIAL_MAX_DOSE: f32 = 450.0;
/// Pointer distance to frame conversion used by the showcase
pub const ZOOM_FACTOR: f32 = 0.1;
/// Speed ratio of drag scrubs; the sign follows the drag direction
pub const DRAG_SPEED: f32 = 1000.0;
/// Speed ratio of the spring-back scrub
pub const REST_SPEED: f32 = -0.7;
/// Pointer idle time before the dial springs back
pub const IDLE_TIMEOUT: Duration = Duration::from_millis(1500);

/// Affine map from dial position to dose units
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DoseScale {
    k: f32,
    b: f32,
}

impl DoseScale {
    /// Scale reading zero at `domain_start` and `max_dose` at `domain_end`
    pub fn new(domain_start: f32, domain_end: f32, max_dose: f32) -> Self {
        let k = max_dose / (domain_end - domain_start);
        Self {
            k,
            b: -domain_start * k,
        }
    }

    /// Dose at `position`, rounded to a whole unit
    pub fn dose(&self, position: f32) -> u32 {
        (self.k * position + self.b).round().abs() as u32
    }
}

/// A scrub the owning animation group should play
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimelineScrub {
    /// Start frame
    pub from: f32,
    /// End frame
    pub to: f32,
    /// Speed ratio
    pub speed: f32,
}

/// One-shot deadline checked by the render loop
#[derive(Debug, Clone, Copy)]
pub struct IdleTimer {
    timeout: Duration,
    deadline: Option<Instant>,
}

impl IdleTimer {
    /// Disarmed timer firing `timeout` after each arming
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            deadline: None,
        }
    }

    /// Replace any pending deadline with `now + timeout`
    pub fn arm(&mut self, now: Instant) {
        self.deadline = Some(now + self.timeout);
    }

    /// Drop the pending deadline
    pub fn cancel(&mut self) {
        self.deadline = None;
    }

    /// Whether a deadline is pending
    pub fn is_armed(&self) -> bool {
        self.deadline.is_some()
    }

    /// True exactly once when `now` has reached the pending deadline
    pub fn poll(&mut self, now: Instant) -> bool {
        match self.deadline {
            Some(deadline) if now >= deadline => {
                self.deadline = None;
                true
            }
            _ => false,
        }
    }
}

/// Dial clamped to `[start, end]`
#[derive(Debug, Clone)]
pub struct BoundedDial {
    start: f32,
    end: f32,
    position: f32,
    scale: DoseScale,
    timer: IdleTimer,
}

impl Default for BoundedDial {
    fn default() -> Self {
        let scale = DoseScale::new(DIAL_START, DIAL_END, DIAL_MAX_DOSE);
        Self::new(DIAL_START, DIAL_END, scale)
    }
}

impl BoundedDial {
    /// Dial resting at `start`
    pub fn new(start: f32, end: f32, scale: DoseScale) -> Self {
        Self {
            start,
            end,
            position: start,
            scale,
            timer: IdleTimer::new(IDLE_TIMEOUT),
        }
    }

    /// Move by a pointer drag and re-arm the idle timer
    ///
    /// Dragging right (positive distance) moves toward `start`.
    pub fn apply_drag(
        &mut self,
        drag_distance: f32,
        zoom_factor: f32,
        now: Instant,
    ) -> TimelineScrub {
        let candidate = self.position - drag_distance * zoom_factor;
        let new_position = candidate.min(self.end).max(self.start);
        let sign = if self.position <= new_position { 1.0 } else { -1.0 };
        let scrub = TimelineScrub {
            from: self.position,
            to: new_position,
            speed: sign * DRAG_SPEED,
        };
        self.position = new_position;
        self.timer.arm(now);
        scrub
    }

    /// Spring back to `start`
    pub fn return_to_rest(&mut self) -> TimelineScrub {
        let scrub = TimelineScrub {
            from: self.position,
            to: self.start,
            speed: REST_SPEED,
        };
        self.position = self.start;
        scrub
    }

    /// Jump to `start` without a scrub and forget the pending spring-back
    pub fn snap_to_start(&mut self) {
        self.position = self.start;
        self.timer.cancel();
    }

    /// The spring-back scrub, once the idle deadline has passed
    pub fn poll_idle(&mut self, now: Instant) -> Option<TimelineScrub> {
        self.timer.poll(now).then(|| self.return_to_rest())
    }

    /// Whether a spring-back is pending
    pub fn is_idle_armed(&self) -> bool {
        self.timer.is_armed()
    }

    /// Current position
    pub fn position(&self) -> f32 {
        self.position
    }

    /// Range start
    pub fn start(&self) -> f32 {
        self.start
    }

    /// Range end
    pub fn end(&self) -> f32 {
        self.end
    }

    /// Dose at the current position
    pub fn dose(&self) -> u32 {
        self.scale.dose(self.position)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(base: Instant, millis: u64) -> Instant {
        base + Duration::from_millis(millis)
    }

    #[test]
    fn test_dose_calibration() {
        let scale = DoseScale::new(DIAL_START, DIAL_END, DIAL_MAX_DOSE);
        assert_eq!(scale.dose(5.0), 0);
        assert_eq!(scale.dose(6.23), 450);
        assert_eq!(scale.dose(5.615), 225);
    }

    #[test]
    fn test_dose_reads_zero_at_domain_start() {
        let scale = DoseScale::new(2.0, 4.0, 100.0);
        assert_eq!(scale.dose(2.0), 0);
        assert_eq!(scale.dose(3.0), 50);
        assert_eq!(scale.dose(4.0), 100);
        // Below the start the magnitude is reported
        assert_eq!(scale.dose(1.0), 50);
    }

    #[test]
    fn test_drag_stays_in_range() {
        let mut dial = BoundedDial::default();
        let now = Instant::now();
        for distance in [-100.0, 3.0, -0.5, 250.0, -7.7, 0.0, -12.3] {
            dial.apply_drag(distance, ZOOM_FACTOR, now);
            assert!(dial.position() >= DIAL_START && dial.position() <= DIAL_END);
        }
    }

    #[test]
    fn test_drag_reports_direction() {
        let mut dial = BoundedDial::default();
        let now = Instant::now();

        let forward = dial.apply_drag(-5.0, ZOOM_FACTOR, now);
        assert_eq!(forward.from, DIAL_START);
        assert!((forward.to - 5.5).abs() < 1e-5);
        assert_eq!(forward.speed, DRAG_SPEED);

        let back = dial.apply_drag(2.0, ZOOM_FACTOR, now);
        assert_eq!(back.speed, -DRAG_SPEED);
        assert!((dial.position() - 5.3).abs() < 1e-5);
    }

    #[test]
    fn test_candidate_on_bound_stays_on_bound() {
        let mut dial = BoundedDial::default();
        let now = Instant::now();
        dial.apply_drag(DIAL_START - DIAL_END, 1.0, now);
        assert_eq!(dial.position(), DIAL_END);
        assert_eq!(dial.dose(), 450);

        dial.apply_drag(DIAL_END - DIAL_START, 1.0, now);
        assert_eq!(dial.position(), DIAL_START);
    }

    #[test]
    fn test_return_to_rest_is_idempotent() {
        let mut dial = BoundedDial::default();
        dial.apply_drag(-6.0, ZOOM_FACTOR, Instant::now());

        let scrub = dial.return_to_rest();
        assert_eq!(scrub.to, DIAL_START);
        assert_eq!(scrub.speed, REST_SPEED);
        assert_eq!(dial.position(), DIAL_START);

        dial.return_to_rest();
        assert_eq!(dial.position(), DIAL_START);
    }

    #[test]
    fn test_two_drags_one_spring_back() {
        let mut dial = BoundedDial::default();
        let t0 = Instant::now();
        dial.apply_drag(-3.0, ZOOM_FACTOR, t0);
        dial.apply_drag(-3.0, ZOOM_FACTOR, ms(t0, 1000));

        assert!(dial.poll_idle(ms(t0, 1600)).is_none());
        assert!(dial.poll_idle(ms(t0, 2600)).is_some());
        assert!(dial.poll_idle(ms(t0, 5000)).is_none());
        assert_eq!(dial.position(), DIAL_START);
    }

    #[test]
    fn test_zero_drag_rearms_timer() {
        let mut dial = BoundedDial::default();
        let t0 = Instant::now();
        dial.apply_drag(-4.0, ZOOM_FACTOR, t0);
        let position = dial.position();

        let scrub = dial.apply_drag(0.0, ZOOM_FACTOR, ms(t0, 1400));
        assert_eq!(dial.position(), position);
        assert_eq!(scrub.from, scrub.to);
        assert!(dial.poll_idle(ms(t0, 1600)).is_none());
        assert!(dial.poll_idle(ms(t0, 2900)).is_some());
    }

    #[test]
    fn test_snap_to_start_cancels_spring_back() {
        let mut dial = BoundedDial::default();
        let t0 = Instant::now();
        dial.apply_drag(-4.0, ZOOM_FACTOR, t0);
        dial.snap_to_start();
        assert!(!dial.is_idle_armed());
        assert!(dial.poll_idle(ms(t0, 2000)).is_none());
        assert_eq!(dial.dose(), 0);
    }
}
