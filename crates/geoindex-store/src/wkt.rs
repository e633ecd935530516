//! Bounding boxes for GeoSPARQL WKT literals.
//!
//! The geometry body is parsed with the `wkt` crate into `geo_types` and only
//! its bounding rectangle is kept.

use std::str::FromStr;

use geo::{BoundingRect, CoordsIter};
use geo_types::Geometry;
use geoindex_core::{Envelope, CRS84_URI};

/// Datatype IRI of GeoSPARQL WKT literals.
pub const WKT_LITERAL: &str = "http://www.opengis.net/ont/geosparql#wktLiteral";

/// A parsed WKT literal: its SRS and the envelope of its coordinates.
#[derive(Debug, Clone, PartialEq)]
pub struct WktEnvelope {
    pub srs: String,
    pub envelope: Envelope,
}

/// Parse the lexical form of a `geo:wktLiteral`.
///
/// An optional `<srs-uri>` prefix selects the SRS (CRS84 otherwise).
/// Returns `Ok(None)` for empty geometries. Z and M ordinates are ignored.
/// Non-finite ordinates are an error.
pub fn parse_wkt_literal(lexical: &str) -> Result<Option<WktEnvelope>, String> {
    let text = lexical.trim();
    let (srs, body) = match text.strip_prefix('<') {
        Some(rest) => {
            let end = rest
                .find('>')
                .ok_or_else(|| format!("unterminated SRS IRI in WKT literal: {text}"))?;
            (rest[..end].trim().to_string(), rest[end + 1..].trim())
        }
        None => (CRS84_URI.to_string(), text),
    };

    if body.is_empty() {
        return Err("WKT literal has no geometry".to_string());
    }
    if !body.contains('(') && body.to_ascii_uppercase().ends_with("EMPTY") {
        return Ok(None);
    }

    let geometry = parse_geometry(body)?;
    if !geometry
        .coords_iter()
        .all(|c| c.x.is_finite() && c.y.is_finite())
    {
        return Err(format!("WKT geometry has non-finite ordinates: {body}"));
    }

    Ok(geometry.bounding_rect().map(|rect| WktEnvelope {
        srs,
        envelope: Envelope::new(rect.min().x, rect.min().y, rect.max().x, rect.max().y),
    }))
}

fn parse_geometry(body: &str) -> Result<Geometry<f64>, String> {
    let parsed = wkt::Wkt::<f64>::from_str(body)
        .map_err(|e| format!("invalid WKT geometry {body}: {e}"))?;
    Geometry::try_from(parsed).map_err(|e: wkt::conversion::Error| {
        format!("unsupported WKT geometry {body}: {e}")
    })
}
