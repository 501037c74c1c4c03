//! RD New planar coordinates and their WGS84 counterparts.
//!
//! The EPSG:28992 definition splits in two here: the oblique stereographic
//! projection on the Bessel ellipsoid runs through `proj4rs`, and the
//! Amersfoort to ETRS89 datum step runs through the RDNAPTRANS correction
//! grid. ETRS89 and WGS84 are treated as equal at this accuracy.

use proj4rs::proj::Proj;
use proj4rs::transform::transform;

use crate::grid::ShiftGrid;

// EPSG:28992 without its datum part; the shift grid applies that separately.
const RD_PLANAR: &str = "+proj=sterea +lat_0=52.15616055555555 +lon_0=5.38763888888889 \
     +k=0.9999079 +x_0=155000 +y_0=463000 +ellps=bessel +units=m +no_defs";
const BESSEL_GEOGRAPHIC: &str = "+proj=longlat +ellps=bessel +no_defs";

/// Refinement rounds for the inverse datum shift. The shift field is smooth
/// enough that this converges far below the grid's own accuracy.
const INVERSE_ROUNDS: usize = 4;

/// Why a conversion was refused.
#[derive(Debug, Clone, PartialEq)]
pub enum GeoError {
    /// A caller-supplied coordinate is outside the accepted domain.
    InvalidCoordinate { axis: &'static str, value: f64 },
    /// A conversion was requested before grid initialization completed.
    ConversionUnavailable,
    /// The datum grid could not be fetched, parsed, or applied.
    GridLoadFailed { reason: String },
}

impl std::fmt::Display for GeoError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GeoError::InvalidCoordinate { axis, value } => {
                write!(f, "invalid {axis} {value}")
            }
            GeoError::ConversionUnavailable => {
                write!(
                    f,
                    "coordinate conversion requested before the datum grid finished loading"
                )
            }
            GeoError::GridLoadFailed { reason } => {
                write!(f, "datum grid initialization failed: {reason}")
            }
        }
    }
}

impl std::error::Error for GeoError {}

pub(crate) fn check_latitude(value: f64) -> Result<(), GeoError> {
    if (-90.0..=90.0).contains(&value) {
        Ok(())
    } else {
        Err(GeoError::InvalidCoordinate {
            axis: "latitude",
            value,
        })
    }
}

pub(crate) fn check_longitude(value: f64) -> Result<(), GeoError> {
    if (-180.0..=180.0).contains(&value) {
        Ok(())
    } else {
        Err(GeoError::InvalidCoordinate {
            axis: "longitude",
            value,
        })
    }
}

pub(crate) fn check_planar(axis: &'static str, value: f64) -> Result<(), GeoError> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(GeoError::InvalidCoordinate { axis, value })
    }
}

/// The fully initialized conversion pipeline.
#[derive(Debug)]
pub struct RdnapProjection {
    planar: Proj,
    geographic: Proj,
    grid: ShiftGrid,
}

impl RdnapProjection {
    pub fn new(grid: ShiftGrid) -> Result<Self, GeoError> {
        let planar = Proj::from_proj_string(RD_PLANAR).map_err(|e| GeoError::GridLoadFailed {
            reason: format!("projection setup failed: {e}"),
        })?;
        let geographic =
            Proj::from_proj_string(BESSEL_GEOGRAPHIC).map_err(|e| GeoError::GridLoadFailed {
                reason: format!("projection setup failed: {e}"),
            })?;
        Ok(Self {
            planar,
            geographic,
            grid,
        })
    }

    /// WGS84 degrees to RD New meters.
    pub fn to_planar(&self, lat: f64, long: f64) -> Result<(f64, f64), GeoError> {
        check_latitude(lat)?;
        check_longitude(long)?;
        let (bessel_lat, bessel_long) = self.to_bessel(lat, long);
        let mut point = (bessel_long.to_radians(), bessel_lat.to_radians(), 0.0);
        transform(&self.geographic, &self.planar, &mut point).map_err(|_| {
            GeoError::InvalidCoordinate {
                axis: "latitude",
                value: lat,
            }
        })?;
        Ok((point.0, point.1))
    }

    /// RD New meters to WGS84 degrees.
    pub fn to_lat_long(&self, x: f64, y: f64) -> Result<(f64, f64), GeoError> {
        check_planar("x", x)?;
        check_planar("y", y)?;
        let mut point = (x, y, 0.0);
        transform(&self.planar, &self.geographic, &mut point).map_err(|_| {
            GeoError::InvalidCoordinate { axis: "x", value: x }
        })?;
        let bessel_long = point.0.to_degrees();
        let bessel_lat = point.1.to_degrees();
        Ok(self.to_etrs89(bessel_lat, bessel_long))
    }

    /// Applies the grid in its forward direction. Outside coverage the
    /// coordinate passes through unshifted.
    fn to_etrs89(&self, lat: f64, long: f64) -> (f64, f64) {
        match self.grid.shift_at(lat, long) {
            Some(shift) => (lat + shift.lat, long + shift.lon),
            None => (lat, long),
        }
    }

    /// Inverts the grid by fixed-point iteration: evaluate the forward shift
    /// at the current estimate and pull the target back by it.
    fn to_bessel(&self, lat: f64, long: f64) -> (f64, f64) {
        let (mut bessel_lat, mut bessel_long) = (lat, long);
        for _ in 0..INVERSE_ROUNDS {
            let shift = self.grid.shift_at(bessel_lat, bessel_long).unwrap_or_default();
            bessel_lat = lat - shift.lat;
            bessel_long = long - shift.lon;
        }
        (bessel_lat, bessel_long)
    }
}
