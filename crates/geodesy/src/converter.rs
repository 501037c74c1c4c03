//! Lazily initialized coordinate conversion service.

use tokio::sync::OnceCell;
use tracing::{error, info};

use crate::grid::ShiftGrid;
use crate::rdnap::{GeoError, RdnapProjection, check_latitude, check_longitude, check_planar};
use crate::sources::GridSource;

/// Public copy of the RDNAPTRANS2018 correction grid.
pub const DEFAULT_GRID_URL: &str =
    "https://github.com/OSGeo/proj-datumgrid/raw/refs/heads/master/europe/rdtrans2018.gsb";

/// Converts between WGS84 and RD New, loading the datum grid on first use.
///
/// The grid is fetched and parsed exactly once per converter: concurrent
/// first callers share the in-flight initialization, and an initialization
/// failure is cached and handed to every later caller.
pub struct GeoConverter {
    source: Box<dyn GridSource>,
    projection: OnceCell<Result<RdnapProjection, GeoError>>,
}

impl GeoConverter {
    pub fn new(source: Box<dyn GridSource>) -> Self {
        Self {
            source,
            projection: OnceCell::new(),
        }
    }

    /// WGS84 degrees to RD New meters.
    pub async fn lat_long_to_planar(&self, lat: f64, long: f64) -> Result<(f64, f64), GeoError> {
        // Bad input is refused before it can trigger a grid download.
        check_latitude(lat)?;
        check_longitude(long)?;
        self.ready().await?.to_planar(lat, long)
    }

    /// RD New meters to WGS84 degrees.
    pub async fn planar_to_lat_long(&self, x: f64, y: f64) -> Result<(f64, f64), GeoError> {
        check_planar("x", x)?;
        check_planar("y", y)?;
        self.ready().await?.to_lat_long(x, y)
    }

    /// The projection, if initialization already completed.
    ///
    /// Callers that cannot await use this; until the first conversion has
    /// loaded the grid it fails with `ConversionUnavailable`.
    pub fn try_projection(&self) -> Result<&RdnapProjection, GeoError> {
        match self.projection.get() {
            Some(Ok(projection)) => Ok(projection),
            Some(Err(err)) => Err(err.clone()),
            None => Err(GeoError::ConversionUnavailable),
        }
    }

    async fn ready(&self) -> Result<&RdnapProjection, GeoError> {
        let outcome = self
            .projection
            .get_or_init(|| async {
                info!(source = %self.source.describe(), "loading datum shift grid");
                let projection = self.load().await;
                if let Err(err) = &projection {
                    error!(%err, "datum shift grid unavailable");
                }
                projection
            })
            .await;
        match outcome {
            Ok(projection) => Ok(projection),
            Err(err) => Err(err.clone()),
        }
    }

    async fn load(&self) -> Result<RdnapProjection, GeoError> {
        let bytes = self.source.fetch_grid().await.map_err(|e| {
            let reason = match std::error::Error::source(&e) {
                Some(cause) => format!("{e}: {cause}"),
                None => e.to_string(),
            };
            GeoError::GridLoadFailed { reason }
        })?;
        let grid = ShiftGrid::parse(&bytes).map_err(|e| GeoError::GridLoadFailed {
            reason: e.to_string(),
        })?;
        info!(
            bytes = bytes.len(),
            subgrids = grid.subgrid_count(),
            "datum shift grid ready"
        );
        RdnapProjection::new(grid)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::grid::test_grid::netherlands_grid;
    use crate::sources::{BoxFuture, GridSourceError};

    struct ScriptedGridSource {
        bytes: Option<Vec<u8>>,
        fetches: Arc<AtomicUsize>,
    }

    impl GridSource for ScriptedGridSource {
        fn describe(&self) -> String {
            "scripted".to_string()
        }

        fn fetch_grid(&self) -> BoxFuture<'_, Result<Vec<u8>, GridSourceError>> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            let outcome = match &self.bytes {
                Some(bytes) => Ok(bytes.clone()),
                None => Err(GridSourceError::new("scripted failure")),
            };
            Box::pin(async move { outcome })
        }
    }

    fn working_converter(fetches: Arc<AtomicUsize>) -> GeoConverter {
        GeoConverter::new(Box::new(ScriptedGridSource {
            bytes: Some(netherlands_grid(false, 2.0, -1.5)),
            fetches,
        }))
    }

    #[tokio::test]
    async fn converts_after_lazy_initialization() {
        let fetches = Arc::new(AtomicUsize::new(0));
        let converter = working_converter(fetches.clone());

        let (x, y) = converter
            .lat_long_to_planar(52.3676, 4.9041)
            .await
            .expect("forward");
        let (lat, long) = converter.planar_to_lat_long(x, y).await.expect("inverse");

        assert!((lat - 52.3676).abs() < 1e-7, "{lat}");
        assert!((long - 4.9041).abs() < 1e-7, "{long}");
        assert_eq!(fetches.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn concurrent_first_callers_share_one_initialization() {
        let fetches = Arc::new(AtomicUsize::new(0));
        let converter = working_converter(fetches.clone());

        let (a, b) = tokio::join!(
            converter.lat_long_to_planar(52.3676, 4.9041),
            converter.lat_long_to_planar(52.0, 5.0),
        );

        assert!(a.is_ok());
        assert!(b.is_ok());
        assert_eq!(fetches.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failed_initialization_is_cached_for_every_caller() {
        let fetches = Arc::new(AtomicUsize::new(0));
        let converter = GeoConverter::new(Box::new(ScriptedGridSource {
            bytes: None,
            fetches: fetches.clone(),
        }));

        let first = converter
            .lat_long_to_planar(52.0, 5.0)
            .await
            .expect_err("must fail");
        let second = converter
            .planar_to_lat_long(121_000.0, 487_000.0)
            .await
            .expect_err("must fail");

        assert!(matches!(first, GeoError::GridLoadFailed { .. }), "{first:?}");
        assert!(
            matches!(second, GeoError::GridLoadFailed { .. }),
            "{second:?}"
        );
        assert_eq!(fetches.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn sync_access_before_initialization_is_unavailable() {
        let fetches = Arc::new(AtomicUsize::new(0));
        let converter = working_converter(fetches.clone());

        let err = converter.try_projection().expect_err("must fail");
        assert_eq!(err, GeoError::ConversionUnavailable);

        converter
            .lat_long_to_planar(52.3676, 4.9041)
            .await
            .expect("convert");
        assert!(converter.try_projection().is_ok());
    }

    #[tokio::test]
    async fn invalid_input_never_triggers_grid_loading() {
        let fetches = Arc::new(AtomicUsize::new(0));
        let converter = working_converter(fetches.clone());

        let err = converter
            .lat_long_to_planar(120.0, 5.0)
            .await
            .expect_err("must fail");

        assert!(
            matches!(
                err,
                GeoError::InvalidCoordinate {
                    axis: "latitude",
                    ..
                }
            ),
            "{err:?}"
        );
        assert_eq!(fetches.load(Ordering::SeqCst), 0);
    }
}
