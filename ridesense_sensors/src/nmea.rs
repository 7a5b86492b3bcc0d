//! Hand-rolled parser for the NMEA-like "RMC" record (§6).
//!
//! Deliberately not a full NMEA stack: the device only ever emits RMC
//! sentences, so the parser recognises exactly that record and its
//! comma-indexed fields.

/// A parsed RMC record.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RmcFix {
    /// `true` iff status field is `A` (data valid).
    pub valid: bool,
    pub lat: f64,
    pub lon: f64,
    /// Speed over ground, km/h, if the speed field was present and parsed.
    pub speed_kmh: Option<f64>,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum NmeaError {
    #[error("record has too few fields: {0}")]
    TooFewFields(usize),
    #[error("malformed coordinate field: {0}")]
    BadCoordinate(String),
    #[error("malformed speed field: {0}")]
    BadSpeed(String),
}

const KNOTS_TO_KMH: f64 = 1.852;

/// Field index of each item of interest within a comma-split RMC line.
mod field {
    pub const STATUS: usize = 2;
    pub const LAT: usize = 3;
    pub const LAT_HEMI: usize = 4;
    pub const LON: usize = 5;
    pub const LON_HEMI: usize = 6;
    pub const SPEED_KNOTS: usize = 7;
}

/// Parse `ddmm.mmmm` (or `dddmm.mmmm`) plus a hemisphere letter into signed
/// decimal degrees: `floor(raw/100) + (raw mod 100)/60`, negated for S/W.
fn parse_coordinate(raw: &str, hemisphere: &str) -> Result<f64, NmeaError> {
    if raw.is_empty() {
        return Err(NmeaError::BadCoordinate(raw.to_string()));
    }
    let value: f64 = raw
        .parse()
        .map_err(|_| NmeaError::BadCoordinate(raw.to_string()))?;
    let degrees = (value / 100.0).floor();
    let minutes = value - degrees * 100.0;
    let mut decimal = degrees + minutes / 60.0;
    match hemisphere {
        "S" | "W" => decimal = -decimal,
        "N" | "E" => {}
        other => return Err(NmeaError::BadCoordinate(other.to_string())),
    }
    Ok(decimal)
}

/// Parse one RMC line (with or without the leading `$GPRMC`/checksum, since
/// the parser only looks at comma-separated field indices).
pub fn parse_rmc(line: &str) -> Result<RmcFix, NmeaError> {
    let fields: Vec<&str> = line.trim().split(',').collect();
    if fields.len() <= field::SPEED_KNOTS {
        return Err(NmeaError::TooFewFields(fields.len()));
    }

    let valid = fields[field::STATUS] == "A";
    let lat = parse_coordinate(fields[field::LAT], fields[field::LAT_HEMI])?;
    let lon = parse_coordinate(fields[field::LON], fields[field::LON_HEMI])?;

    let speed_field = fields[field::SPEED_KNOTS];
    let speed_kmh = if speed_field.is_empty() {
        None
    } else {
        let knots: f64 = speed_field
            .parse()
            .map_err(|_| NmeaError::BadSpeed(speed_field.to_string()))?;
        Some(knots * KNOTS_TO_KMH)
    };

    Ok(RmcFix {
        valid,
        lat,
        lon,
        speed_kmh,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_coordinate_matches_spec_example() {
        let decimal = parse_coordinate("1723.100", "N").unwrap();
        assert!((decimal - 17.385_000).abs() < 1e-6);
    }

    #[test]
    fn full_rmc_line_parses() {
        let line = "$GPRMC,123519,A,4807.038,N,01131.000,E,21.5989,084.4,230394,003.1,W*6A";
        let fix = parse_rmc(line).unwrap();
        assert!(fix.valid);
        assert!((fix.lat - 48.1173).abs() < 1e-4);
        assert!((fix.lon - 11.516_667).abs() < 1e-4);
        let speed = fix.speed_kmh.unwrap();
        assert!((speed - 40.0).abs() < 0.1);
    }

    #[test]
    fn void_status_is_not_valid() {
        let line = "$GPRMC,123519,V,4807.038,N,01131.000,E,,,230394,,";
        let fix = parse_rmc(line).unwrap();
        assert!(!fix.valid);
        assert_eq!(fix.speed_kmh, None);
    }

    #[test]
    fn too_few_fields_errs() {
        assert!(parse_rmc("$GPRMC,123519,A").is_err());
    }

    #[test]
    fn southern_western_hemisphere_negates() {
        let decimal = parse_coordinate("1723.100", "S").unwrap();
        assert!((decimal + 17.385_000).abs() < 1e-6);
    }
}
