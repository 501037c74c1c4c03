//! Solar ephemeris.
//!
//! The low-cost algorithm: days since J2000, solar mean anomaly, equation of
//! center, ecliptic longitude, then declination and right ascension against
//! the local sidereal time. Azimuth is measured from south, positive
//! westward; altitude is positive above the horizon. Both are radians.
//! Accuracy is a small fraction of a degree, plenty for positioning a light.

use std::f64::consts::PI;
use std::time::{SystemTime, UNIX_EPOCH};

const DAY_MS: f64 = 86_400_000.0;
const J1970: f64 = 2_440_588.0;
const J2000: f64 = 2_451_545.0;

/// Obliquity of the ecliptic.
const EARTH_TILT_DEG: f64 = 23.4397;

/// Where the sun stands in the sky for an observer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SunPosition {
    /// Radians from south, positive toward the west.
    pub azimuth: f64,
    /// Radians above the horizon, negative below it.
    pub altitude: f64,
}

/// A directional light placed along the sun's direction.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SunLight {
    pub position: [f64; 3],
    pub intensity: f64,
    pub visible: bool,
}

/// Sun angles for an observer at `lat`/`long` degrees at `time`.
pub fn sun_angles(time: SystemTime, lat: f64, long: f64) -> SunPosition {
    let days = days_since_j2000(time);
    let lw = -long.to_radians();
    let phi = lat.to_radians();

    let mean_anomaly = (357.5291 + 0.985_600_28 * days).to_radians();
    let ecliptic_long = ecliptic_longitude(mean_anomaly);
    let declination = declination(ecliptic_long);
    let right_ascension = right_ascension(ecliptic_long);

    let sidereal = (280.16 + 360.985_623_5 * days).to_radians() - lw;
    let hour_angle = sidereal - right_ascension;

    SunPosition {
        azimuth: azimuth(hour_angle, phi, declination),
        altitude: altitude(hour_angle, phi, declination),
    }
}

/// Places a light `distance` out along the sun direction.
///
/// Below the horizon the light is switched off: not visible, residual
/// intensity only. Above it, intensity grows with solar altitude.
pub fn sun_light(angles: SunPosition, distance: f64) -> SunLight {
    let SunPosition { azimuth, altitude } = angles;
    let position = [
        -distance * altitude.cos() * azimuth.sin(),
        distance * altitude.sin(),
        distance * altitude.cos() * azimuth.cos(),
    ];
    let visible = altitude > 0.0;
    let intensity = if visible {
        0.5 + 2.5 * altitude.sin()
    } else {
        0.1
    };
    SunLight {
        position,
        intensity,
        visible,
    }
}

fn days_since_j2000(time: SystemTime) -> f64 {
    let millis = match time.duration_since(UNIX_EPOCH) {
        Ok(since) => since.as_secs_f64() * 1000.0,
        Err(before) => -before.duration().as_secs_f64() * 1000.0,
    };
    millis / DAY_MS - 0.5 + J1970 - J2000
}

fn ecliptic_longitude(mean_anomaly: f64) -> f64 {
    let center = (1.9148 * mean_anomaly.sin()
        + 0.02 * (2.0 * mean_anomaly).sin()
        + 0.0003 * (3.0 * mean_anomaly).sin())
    .to_radians();
    let perihelion = 102.9372_f64.to_radians();
    mean_anomaly + center + perihelion + PI
}

fn declination(ecliptic_long: f64) -> f64 {
    (EARTH_TILT_DEG.to_radians().sin() * ecliptic_long.sin()).asin()
}

fn right_ascension(ecliptic_long: f64) -> f64 {
    let tilt = EARTH_TILT_DEG.to_radians();
    (ecliptic_long.sin() * tilt.cos()).atan2(ecliptic_long.cos())
}

fn altitude(hour_angle: f64, phi: f64, declination: f64) -> f64 {
    (phi.sin() * declination.sin() + phi.cos() * declination.cos() * hour_angle.cos()).asin()
}

fn azimuth(hour_angle: f64, phi: f64, declination: f64) -> f64 {
    hour_angle
        .sin()
        .atan2(hour_angle.cos() * phi.sin() - declination.tan() * phi.cos())
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn at_unix(seconds: u64) -> SystemTime {
        UNIX_EPOCH + Duration::from_secs(seconds)
    }

    fn assert_close(actual: f64, expected: f64, tolerance: f64) {
        assert!(
            (actual - expected).abs() < tolerance,
            "{actual} is not within {tolerance} of {expected}"
        );
    }

    #[test]
    fn matches_the_reference_ephemeris() {
        // 2013-03-05T00:00:00Z over Kyiv, the value the widely used JS
        // implementation publishes for this instant.
        let position = sun_angles(at_unix(1_362_441_600), 50.5, 30.5);

        assert_close(position.azimuth, -2.500_317_590_716_838_5, 1e-9);
        assert_close(position.altitude, -0.700_040_683_878_161_1, 1e-9);
    }

    #[test]
    fn summer_noon_in_amsterdam_is_high_and_southerly() {
        // 2024-06-21T11:40:00Z, about solar noon at 4.9°E.
        let position = sun_angles(at_unix(1_718_970_000), 52.3676, 4.9041);

        assert!(position.azimuth.abs() < 0.2, "{}", position.azimuth);
        assert!(position.altitude > 0.9, "{}", position.altitude);
        assert!(position.altitude < 1.2, "{}", position.altitude);
    }

    #[test]
    fn angles_stay_in_their_ranges() {
        for day in 0..12 {
            let time = at_unix(1_700_000_000 + day * 86_400 * 30);
            let position = sun_angles(time, 52.0, 5.0);
            assert!(position.azimuth.abs() <= PI, "{}", position.azimuth);
            assert!(position.altitude.abs() <= PI / 2.0, "{}", position.altitude);
        }
    }

    #[test]
    fn accepts_times_before_the_unix_epoch() {
        let time = UNIX_EPOCH - Duration::from_secs(10 * 365 * 86_400);
        let position = sun_angles(time, 52.0, 5.0);

        assert!(position.azimuth.abs() <= PI, "{}", position.azimuth);
        assert!(position.altitude.abs() <= PI / 2.0, "{}", position.altitude);
    }

    #[test]
    fn light_points_along_the_sun_direction() {
        let south = sun_light(
            SunPosition {
                azimuth: 0.0,
                altitude: 0.0,
            },
            10.0,
        );
        assert_close(south.position[0], 0.0, 1e-12);
        assert_close(south.position[1], 0.0, 1e-12);
        assert_close(south.position[2], 10.0, 1e-12);

        let west = sun_light(
            SunPosition {
                azimuth: PI / 2.0,
                altitude: 0.0,
            },
            10.0,
        );
        assert_close(west.position[0], -10.0, 1e-9);
        assert_close(west.position[2], 0.0, 1e-9);
    }

    #[test]
    fn light_below_the_horizon_is_off() {
        let light = sun_light(
            SunPosition {
                azimuth: 1.0,
                altitude: -0.2,
            },
            100.0,
        );

        assert!(!light.visible);
        assert_close(light.intensity, 0.1, 1e-12);
    }

    #[test]
    fn intensity_grows_with_altitude() {
        let light = sun_light(
            SunPosition {
                azimuth: 0.0,
                altitude: PI / 6.0,
            },
            100.0,
        );

        assert!(light.visible);
        assert_close(light.intensity, 1.75, 1e-9);
    }
}
