// Shared window definitions so judgement and rendering agree on membership.
use log::warn;

// All base windows are in seconds at 1.0x song speed.
pub const BASE_HIT_FRONT_S: f64 = 0.070;
pub const BASE_HIT_BACK_S: f64 = 0.070;

pub const BASE_VIEW_AHEAD_S: f64 = 2.0;
pub const BASE_VIEW_BEHIND_S: f64 = 0.25;

/// How early (`front_s`) and how late (`back_s`) a note can still be hit.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct HitWindow {
    pub front_s: f64,
    pub back_s: f64,
}

impl Default for HitWindow {
    fn default() -> Self {
        Self { front_s: BASE_HIT_FRONT_S, back_s: BASE_HIT_BACK_S }
    }
}

/// How far ahead a note becomes visible and how long after its last sustain
/// end it stays visible.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct ViewWindow {
    pub ahead_s: f64,
    pub behind_s: f64,
}

impl Default for ViewWindow {
    fn default() -> Self {
        Self { ahead_s: BASE_VIEW_AHEAD_S, behind_s: BASE_VIEW_BEHIND_S }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Default)]
pub struct TimingProfile {
    pub hit: HitWindow,
    pub view: ViewWindow,
}

impl TimingProfile {
    /// Windows in song seconds. Song time runs `rate` times faster than real
    /// time, so real-time windows stretch by the same factor.
    #[inline(always)]
    pub fn scaled(&self, rate: f64) -> Self {
        let rate = if rate.is_finite() && rate > 0.0 { rate } else { 1.0 };
        Self {
            hit: HitWindow { front_s: self.hit.front_s * rate, back_s: self.hit.back_s * rate },
            view: ViewWindow { ahead_s: self.view.ahead_s * rate, behind_s: self.view.behind_s * rate },
        }
    }

    /// Notes must be visible before they are hittable and stay visible while
    /// they can still be hit late.
    pub fn normalized(mut self) -> Self {
        if self.view.ahead_s < self.hit.front_s {
            warn!(
                "View ahead window {:.3}s is shorter than the hit window {:.3}s; clamping.",
                self.view.ahead_s, self.hit.front_s
            );
            self.view.ahead_s = self.hit.front_s;
        }
        if self.view.behind_s < self.hit.back_s {
            warn!(
                "View behind window {:.3}s is shorter than the hit window {:.3}s; clamping.",
                self.view.behind_s, self.hit.back_s
            );
            self.view.behind_s = self.hit.back_s;
        }
        self
    }

    #[inline(always)]
    pub fn hit_windows_ms(&self) -> [f64; 2] {
        [self.hit.front_s * 1000.0, self.hit.back_s * 1000.0]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scaling_stretches_all_windows() {
        let scaled = TimingProfile::default().scaled(1.5);
        assert!((scaled.hit.front_s - 0.105).abs() < 1e-12);
        assert!((scaled.view.ahead_s - 3.0).abs() < 1e-12);
        let [front_ms, _] = scaled.hit_windows_ms();
        assert!((front_ms - 105.0).abs() < 1e-9);
    }

    #[test]
    fn invalid_rate_falls_back_to_nominal() {
        assert_eq!(TimingProfile::default().scaled(f64::NAN), TimingProfile::default());
        assert_eq!(TimingProfile::default().scaled(0.0), TimingProfile::default());
    }

    #[test]
    fn view_window_is_clamped_to_cover_hit_window() {
        let profile = TimingProfile {
            hit: HitWindow { front_s: 0.1, back_s: 0.3 },
            view: ViewWindow { ahead_s: 0.05, behind_s: 0.1 },
        }
        .normalized();
        assert_eq!(profile.view.ahead_s, 0.1);
        assert_eq!(profile.view.behind_s, 0.3);
    }
}
