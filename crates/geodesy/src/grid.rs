//! NTv2 datum shift grids.
//!
//! Parses the binary `.gsb` layout: an overview header of eleven 16-byte
//! records, one header per subgrid, then one 16-byte node per grid corner
//! holding the latitude and longitude shifts in arc-seconds (longitudes
//! positive west, per the format). Both byte orders occur in the wild; the
//! `NUM_OREC` value doubles as the detection probe.

const OVERVIEW_RECORDS: i32 = 11;
const SUBGRID_RECORDS: i32 = 11;

/// A parsed shift grid, ready for lookups.
#[derive(Debug, Clone)]
pub struct ShiftGrid {
    subgrids: Vec<SubGrid>,
}

/// Datum shift at a point, in degrees to add to the source coordinate.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Shift {
    pub lat: f64,
    pub lon: f64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GridParseError {
    Truncated { offset: usize },
    UnknownByteOrder,
    UnexpectedRecord { expected: &'static str, found: String },
    UnsupportedUnit { found: String },
    InvalidCount { record: &'static str, found: i64 },
    InvalidExtent { subgrid: String },
    NodeCountMismatch { subgrid: String, expected: usize, found: usize },
}

impl std::fmt::Display for GridParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GridParseError::Truncated { offset } => {
                write!(f, "grid file truncated at byte {offset}")
            }
            GridParseError::UnknownByteOrder => {
                write!(f, "grid file byte order could not be determined")
            }
            GridParseError::UnexpectedRecord { expected, found } => {
                write!(f, "expected record {expected}, found {found}")
            }
            GridParseError::UnsupportedUnit { found } => {
                write!(f, "unsupported grid unit {found}, only SECONDS is handled")
            }
            GridParseError::InvalidCount { record, found } => {
                write!(f, "record {record} holds invalid count {found}")
            }
            GridParseError::InvalidExtent { subgrid } => {
                write!(f, "subgrid {subgrid} has an invalid extent")
            }
            GridParseError::NodeCountMismatch {
                subgrid,
                expected,
                found,
            } => {
                write!(
                    f,
                    "subgrid {subgrid} declares {found} nodes, its extent implies {expected}"
                )
            }
        }
    }
}

impl std::error::Error for GridParseError {}

impl ShiftGrid {
    pub fn parse(bytes: &[u8]) -> Result<Self, GridParseError> {
        let mut reader = Reader::new(bytes);

        // NUM_OREC doubles as the byte order probe.
        let first = reader.take(16)?;
        let found = record_name(&first[..8]);
        if found != "NUM_OREC" {
            return Err(GridParseError::UnexpectedRecord {
                expected: "NUM_OREC",
                found,
            });
        }
        let mut raw = [0u8; 4];
        raw.copy_from_slice(&first[8..12]);
        reader.big_endian = if i32::from_le_bytes(raw) == OVERVIEW_RECORDS {
            false
        } else if i32::from_be_bytes(raw) == OVERVIEW_RECORDS {
            true
        } else {
            return Err(GridParseError::UnknownByteOrder);
        };

        let sub_records = reader.int_record("NUM_SREC")?;
        if sub_records != SUBGRID_RECORDS {
            return Err(GridParseError::InvalidCount {
                record: "NUM_SREC",
                found: i64::from(sub_records),
            });
        }
        let declared = reader.int_record("NUM_FILE")?;
        let subgrid_count = usize::try_from(declared).map_err(|_| GridParseError::InvalidCount {
            record: "NUM_FILE",
            found: i64::from(declared),
        })?;
        let unit = reader.text_record("GS_TYPE")?;
        if unit != "SECONDS" {
            return Err(GridParseError::UnsupportedUnit { found: unit });
        }
        for name in [
            "VERSION", "SYSTEM_F", "SYSTEM_T", "MAJOR_F", "MINOR_F", "MAJOR_T", "MINOR_T",
        ] {
            reader.record(name)?;
        }

        let mut subgrids = Vec::new();
        for _ in 0..subgrid_count {
            subgrids.push(SubGrid::parse(&mut reader)?);
        }
        Ok(Self { subgrids })
    }

    pub fn subgrid_count(&self) -> usize {
        self.subgrids.len()
    }

    /// Bilinear shift at a position, degrees in, degrees out.
    ///
    /// Returns `None` outside every subgrid. When several subgrids cover the
    /// point the densest one wins.
    pub fn shift_at(&self, lat_deg: f64, lon_deg: f64) -> Option<Shift> {
        let lat_sec = lat_deg * 3600.0;
        let lon_west_sec = -lon_deg * 3600.0;
        let subgrid = self
            .subgrids
            .iter()
            .filter(|subgrid| subgrid.contains(lat_sec, lon_west_sec))
            .min_by(|a, b| a.lat_inc.total_cmp(&b.lat_inc))?;
        Some(subgrid.interpolate(lat_sec, lon_west_sec))
    }
}

/// One rectangular grid of shift nodes. All bounds and increments are in
/// arc-seconds with longitude positive west; node rows run south to north,
/// columns east to west.
#[derive(Debug, Clone)]
struct SubGrid {
    s_lat: f64,
    n_lat: f64,
    e_long: f64,
    w_long: f64,
    lat_inc: f64,
    long_inc: f64,
    rows: usize,
    cols: usize,
    nodes: Vec<GridNode>,
}

#[derive(Debug, Clone, Copy)]
struct GridNode {
    lat_shift: f32,
    lon_shift: f32,
}

impl SubGrid {
    fn parse(reader: &mut Reader<'_>) -> Result<Self, GridParseError> {
        let name = reader.text_record("SUB_NAME")?;
        reader.record("PARENT")?;
        reader.record("CREATED")?;
        reader.record("UPDATED")?;
        let s_lat = reader.float_record("S_LAT")?;
        let n_lat = reader.float_record("N_LAT")?;
        let e_long = reader.float_record("E_LONG")?;
        let w_long = reader.float_record("W_LONG")?;
        let lat_inc = reader.float_record("LAT_INC")?;
        let long_inc = reader.float_record("LONG_INC")?;
        let declared = reader.int_record("GS_COUNT")?;
        let count = usize::try_from(declared).map_err(|_| GridParseError::InvalidCount {
            record: "GS_COUNT",
            found: i64::from(declared),
        })?;

        let increments_valid =
            lat_inc.is_finite() && lat_inc > 0.0 && long_inc.is_finite() && long_inc > 0.0;
        if !increments_valid || n_lat < s_lat || w_long < e_long {
            return Err(GridParseError::InvalidExtent { subgrid: name });
        }
        let rows = ((n_lat - s_lat) / lat_inc).round() as usize + 1;
        let cols = ((w_long - e_long) / long_inc).round() as usize + 1;
        if rows < 2 || cols < 2 {
            return Err(GridParseError::InvalidExtent { subgrid: name });
        }
        let expected = rows
            .checked_mul(cols)
            .ok_or_else(|| GridParseError::InvalidExtent {
                subgrid: name.clone(),
            })?;
        if expected != count {
            return Err(GridParseError::NodeCountMismatch {
                subgrid: name,
                expected,
                found: count,
            });
        }
        if count > reader.remaining() / 16 {
            return Err(GridParseError::Truncated {
                offset: reader.position(),
            });
        }

        let mut nodes = Vec::with_capacity(count);
        for _ in 0..count {
            nodes.push(reader.node()?);
        }
        Ok(Self {
            s_lat,
            n_lat,
            e_long,
            w_long,
            lat_inc,
            long_inc,
            rows,
            cols,
            nodes,
        })
    }

    fn contains(&self, lat_sec: f64, lon_west_sec: f64) -> bool {
        (self.s_lat..=self.n_lat).contains(&lat_sec)
            && (self.e_long..=self.w_long).contains(&lon_west_sec)
    }

    fn interpolate(&self, lat_sec: f64, lon_west_sec: f64) -> Shift {
        let row_pos = (lat_sec - self.s_lat) / self.lat_inc;
        let col_pos = (lon_west_sec - self.e_long) / self.long_inc;
        // Clamp so points on the north and west edges still get a full cell.
        let row = (row_pos as usize).min(self.rows - 2);
        let col = (col_pos as usize).min(self.cols - 2);
        let t_row = row_pos - row as f64;
        let t_col = col_pos - col as f64;

        let lower = lerp2(self.node(row, col), self.node(row, col + 1), t_col);
        let upper = lerp2(self.node(row + 1, col), self.node(row + 1, col + 1), t_col);
        let (lat_shift_sec, lon_west_shift_sec) = lerp2(lower, upper, t_row);

        Shift {
            lat: lat_shift_sec / 3600.0,
            lon: -lon_west_shift_sec / 3600.0,
        }
    }

    fn node(&self, row: usize, col: usize) -> (f64, f64) {
        let node = &self.nodes[row * self.cols + col];
        (f64::from(node.lat_shift), f64::from(node.lon_shift))
    }
}

fn lerp(a: f64, b: f64, t: f64) -> f64 {
    a + (b - a) * t
}

fn lerp2(a: (f64, f64), b: (f64, f64), t: f64) -> (f64, f64) {
    (lerp(a.0, b.0, t), lerp(a.1, b.1, t))
}

fn record_name(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes)
        .trim_end_matches([' ', '\0'])
        .to_string()
}

struct Reader<'a> {
    bytes: &'a [u8],
    position: usize,
    big_endian: bool,
}

impl<'a> Reader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self {
            bytes,
            position: 0,
            big_endian: false,
        }
    }

    fn position(&self) -> usize {
        self.position
    }

    fn remaining(&self) -> usize {
        self.bytes.len() - self.position
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8], GridParseError> {
        let end = self.position + len;
        if end > self.bytes.len() {
            return Err(GridParseError::Truncated {
                offset: self.position,
            });
        }
        let slice = &self.bytes[self.position..end];
        self.position = end;
        Ok(slice)
    }

    fn record(&mut self, expected: &'static str) -> Result<[u8; 8], GridParseError> {
        let raw = self.take(16)?;
        let found = record_name(&raw[..8]);
        if found != expected {
            return Err(GridParseError::UnexpectedRecord { expected, found });
        }
        let mut payload = [0u8; 8];
        payload.copy_from_slice(&raw[8..16]);
        Ok(payload)
    }

    fn int_record(&mut self, expected: &'static str) -> Result<i32, GridParseError> {
        let payload = self.record(expected)?;
        let mut raw = [0u8; 4];
        raw.copy_from_slice(&payload[..4]);
        Ok(if self.big_endian {
            i32::from_be_bytes(raw)
        } else {
            i32::from_le_bytes(raw)
        })
    }

    fn float_record(&mut self, expected: &'static str) -> Result<f64, GridParseError> {
        let payload = self.record(expected)?;
        Ok(if self.big_endian {
            f64::from_be_bytes(payload)
        } else {
            f64::from_le_bytes(payload)
        })
    }

    fn text_record(&mut self, expected: &'static str) -> Result<String, GridParseError> {
        let payload = self.record(expected)?;
        Ok(record_name(&payload))
    }

    fn node(&mut self) -> Result<GridNode, GridParseError> {
        let raw = self.take(16)?;
        Ok(GridNode {
            lat_shift: self.decode_f32(&raw[0..4]),
            lon_shift: self.decode_f32(&raw[4..8]),
        })
    }

    fn decode_f32(&self, raw: &[u8]) -> f32 {
        let mut bytes = [0u8; 4];
        bytes.copy_from_slice(raw);
        if self.big_endian {
            f32::from_be_bytes(bytes)
        } else {
            f32::from_le_bytes(bytes)
        }
    }
}


#[cfg(test)]
mod tests {
    use super::test_grid::{GridWriter, netherlands_grid, overview};
    use super::*;

    fn assert_close(actual: f64, expected: f64) {
        assert!(
            (actual - expected).abs() < 1e-12,
            "{actual} is not close to {expected}"
        );
    }

    #[test]
    fn parses_a_single_subgrid_file() {
        let grid = ShiftGrid::parse(&netherlands_grid(false, 2.0, -1.5)).expect("parse");
        assert_eq!(grid.subgrid_count(), 1);
    }

    #[test]
    fn constant_shift_applies_across_the_coverage() {
        let grid = ShiftGrid::parse(&netherlands_grid(false, 2.0, -1.5)).expect("parse");

        let shift = grid.shift_at(52.3676, 4.9041).expect("inside coverage");

        assert_close(shift.lat, 2.0 / 3600.0);
        assert_close(shift.lon, 1.5 / 3600.0);
    }

    #[test]
    fn big_endian_files_parse_identically() {
        let grid = ShiftGrid::parse(&netherlands_grid(true, 2.0, -1.5)).expect("parse");

        let shift = grid.shift_at(52.3676, 4.9041).expect("inside coverage");

        assert_close(shift.lat, 2.0 / 3600.0);
        assert_close(shift.lon, 1.5 / 3600.0);
    }

    #[test]
    fn blends_between_surrounding_nodes() {
        // Single cell from 0..1°N and 0..1°E. Latitude shifts grow northward
        // from 0 to 1 arc-second; longitude shifts grow from 2 at the east
        // column to 4 at the west column.
        let mut writer = GridWriter::new(false);
        overview(&mut writer, 1);
        writer.text("SUB_NAME", "CELL");
        writer.text("PARENT", "NONE");
        writer.text("CREATED", "20180101");
        writer.text("UPDATED", "20180101");
        writer.float("S_LAT", 0.0);
        writer.float("N_LAT", 3600.0);
        writer.float("E_LONG", -3600.0);
        writer.float("W_LONG", 0.0);
        writer.float("LAT_INC", 3600.0);
        writer.float("LONG_INC", 3600.0);
        writer.int("GS_COUNT", 4);
        writer.node(0.0, 2.0);
        writer.node(0.0, 4.0);
        writer.node(1.0, 2.0);
        writer.node(1.0, 4.0);
        let grid = ShiftGrid::parse(&writer.finish()).expect("parse");

        let shift = grid.shift_at(0.25, 0.75).expect("inside coverage");

        assert_close(shift.lat, 0.25 / 3600.0);
        assert_close(shift.lon, -2.5 / 3600.0);
    }

    #[test]
    fn north_and_west_edges_are_still_interpolable() {
        let grid = ShiftGrid::parse(&netherlands_grid(false, 2.0, -1.5)).expect("parse");

        let shift = grid.shift_at(54.0, 2.0).expect("on the corner");

        assert_close(shift.lat, 2.0 / 3600.0);
        assert_close(shift.lon, 1.5 / 3600.0);
    }

    #[test]
    fn points_outside_coverage_have_no_shift() {
        let grid = ShiftGrid::parse(&netherlands_grid(false, 2.0, -1.5)).expect("parse");
        assert_eq!(grid.shift_at(48.8566, 2.3522), None);
    }

    #[test]
    fn truncated_files_are_rejected() {
        let mut bytes = netherlands_grid(false, 2.0, -1.5);
        bytes.truncate(100);

        let err = ShiftGrid::parse(&bytes).expect_err("must fail");

        assert!(matches!(err, GridParseError::Truncated { .. }), "{err:?}");
    }

    #[test]
    fn unreadable_byte_order_is_rejected() {
        let mut writer = GridWriter::new(false);
        writer.int("NUM_OREC", 7);

        let err = ShiftGrid::parse(&writer.finish()).expect_err("must fail");

        assert_eq!(err, GridParseError::UnknownByteOrder);
    }

    #[test]
    fn non_arcsecond_units_are_rejected() {
        let mut writer = GridWriter::new(false);
        writer.int("NUM_OREC", 11);
        writer.int("NUM_SREC", 11);
        writer.int("NUM_FILE", 1);
        writer.text("GS_TYPE", "DEGREES");

        let err = ShiftGrid::parse(&writer.finish()).expect_err("must fail");

        assert_eq!(
            err,
            GridParseError::UnsupportedUnit {
                found: "DEGREES".to_string()
            }
        );
    }

    #[test]
    fn node_count_must_match_the_extent() {
        let mut writer = GridWriter::new(false);
        overview(&mut writer, 1);
        writer.text("SUB_NAME", "RDCORR");
        writer.text("PARENT", "NONE");
        writer.text("CREATED", "20180101");
        writer.text("UPDATED", "20180101");
        writer.float("S_LAT", 50.0 * 3600.0);
        writer.float("N_LAT", 54.0 * 3600.0);
        writer.float("E_LONG", -8.0 * 3600.0);
        writer.float("W_LONG", -2.0 * 3600.0);
        writer.float("LAT_INC", 3600.0);
        writer.float("LONG_INC", 3600.0);
        writer.int("GS_COUNT", 34);

        let err = ShiftGrid::parse(&writer.finish()).expect_err("must fail");

        assert_eq!(
            err,
            GridParseError::NodeCountMismatch {
                subgrid: "RDCORR".to_string(),
                expected: 35,
                found: 34,
            }
        );
    }
}
