//! Core domain types for the spatial index.
//!
//! Graph identifiers, bounding envelopes, and the spatial reference
//! systems an index can be built against.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{IndexError, Result};

/// Row label used for the default (unnamed) graph in reports.
pub const DEFAULT_GRAPH_LABEL: &str = "DEFAULT";

/// The GeoSPARQL default SRS: WGS84 longitude/latitude.
pub const CRS84_URI: &str = "http://www.opengis.net/def/crs/OGC/1.3/CRS84";

// ── Graphs ────────────────────────────────────────────────────────

/// Identifier of a named graph in the dataset.
///
/// Ordering is plain string ordering, which is what reports sort by.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct GraphName(pub String);

impl GraphName {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for GraphName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for GraphName {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for GraphName {
    fn from(s: String) -> Self {
        Self(s)
    }
}

// ── Envelopes ─────────────────────────────────────────────────────

/// Axis-aligned bounding rectangle in SRS coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl Envelope {
    /// Create an envelope from two corners in any order.
    pub fn new(x1: f64, y1: f64, x2: f64, y2: f64) -> Self {
        Self {
            min_x: x1.min(x2),
            min_y: y1.min(y2),
            max_x: x1.max(x2),
            max_y: y1.max(y2),
        }
    }

    /// Degenerate envelope covering a single point.
    pub fn point(x: f64, y: f64) -> Self {
        Self::new(x, y, x, y)
    }

    /// Smallest envelope covering all given coordinates, or `None` if empty.
    pub fn from_coords<I>(coords: I) -> Option<Self>
    where
        I: IntoIterator<Item = (f64, f64)>,
    {
        coords.into_iter().fold(None, |acc, (x, y)| match acc {
            None => Some(Self::point(x, y)),
            Some(env) => Some(env.expand_to(x, y)),
        })
    }

    /// Grow the envelope to include the given coordinate.
    pub fn expand_to(self, x: f64, y: f64) -> Self {
        Self {
            min_x: self.min_x.min(x),
            min_y: self.min_y.min(y),
            max_x: self.max_x.max(x),
            max_y: self.max_y.max(y),
        }
    }

    /// True if every bound is a finite number.
    pub fn is_finite(&self) -> bool {
        [self.min_x, self.min_y, self.max_x, self.max_y]
            .iter()
            .all(|v| v.is_finite())
    }

    pub fn intersects(&self, other: &Envelope) -> bool {
        self.min_x <= other.max_x
            && other.min_x <= self.max_x
            && self.min_y <= other.max_y
            && other.min_y <= self.max_y
    }

    pub fn contains(&self, other: &Envelope) -> bool {
        self.min_x <= other.min_x
            && self.min_y <= other.min_y
            && self.max_x >= other.max_x
            && self.max_y >= other.max_y
    }
}

// ── Spatial reference systems ─────────────────────────────────────

/// An SRS URI together with the coordinate domain the index covers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SrsInfo {
    pub uri: String,
    pub domain: Envelope,
}

/// SRS URIs the indexer knows a domain envelope for.
///
/// EPSG:4326 uses its authority axis order (latitude first).
const WELL_KNOWN_SRS: &[(&str, [f64; 4])] = &[
    (CRS84_URI, [-180.0, -90.0, 180.0, 90.0]),
    (
        "http://www.opengis.net/def/crs/EPSG/0/4326",
        [-90.0, -180.0, 90.0, 180.0],
    ),
    (
        "http://www.opengis.net/def/crs/EPSG/0/3857",
        [
            -20_037_508.342_789_244,
            -20_048_966.104_014_6,
            20_037_508.342_789_244,
            20_048_966.104_014_6,
        ],
    ),
    (
        "http://www.opengis.net/def/crs/EPSG/0/27700",
        [0.0, 0.0, 700_000.0, 1_300_000.0],
    ),
    (
        "http://www.opengis.net/def/crs/EPSG/0/2056",
        [2_485_071.58, 1_075_346.31, 2_828_515.82, 1_299_941.79],
    ),
];

impl SrsInfo {
    /// Resolve an SRS URI to its domain envelope.
    pub fn lookup(uri: &str) -> Result<Self> {
        let uri = uri.trim();
        WELL_KNOWN_SRS
            .iter()
            .find(|(known, _)| *known == uri)
            .map(|(known, [x1, y1, x2, y2])| SrsInfo {
                uri: known.to_string(),
                domain: Envelope::new(*x1, *y1, *x2, *y2),
            })
            .ok_or_else(|| IndexError::UnsupportedSrs {
                uri: uri.to_string(),
            })
    }

    /// All SRS URIs accepted by [`SrsInfo::lookup`].
    pub fn supported_uris() -> impl Iterator<Item = &'static str> {
        WELL_KNOWN_SRS.iter().map(|(uri, _)| *uri)
    }
}
