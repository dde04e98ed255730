// src/ingest/normalize.rs
//! Raw listing → query-ready listing.

use url::form_urlencoded;

use crate::error::NormalizeError;
use crate::ingest::render::Renderer;
use crate::ingest::types::{Listing, RawListing};

const MAP_BASE: &str = "https://maps.google.com/maps?saddr=Current+Location&daddr=";

/// Full day name for an upstream day code. Unknown codes map to `None`.
pub fn translate_day(code: &str) -> Option<&'static str> {
    let day = match code.trim().to_ascii_lowercase().as_str() {
        "mon" => "Monday",
        "tue" => "Tuesday",
        "wed" => "Wednesday",
        "thu" => "Thursday",
        "fri" => "Friday",
        "sat" => "Saturday",
        "sun" => "Sunday",
        _ => return None,
    };
    Some(day)
}

/// Directions link from the current location to the listing's address.
/// Locality is the borough, falling back to the city.
pub fn map_url(raw: &RawListing) -> String {
    let locality = if raw.borough.is_empty() {
        &raw.city
    } else {
        &raw.borough
    };
    let address = format!("{}, {} {}", raw.street_address, locality, raw.state);
    let encoded: String = form_urlencoded::byte_serialize(address.as_bytes()).collect();
    format!("{MAP_BASE}{encoded}")
}

fn parse_coordinate(
    event_id: i64,
    field: &'static str,
    value: &str,
) -> Result<f64, NormalizeError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(NormalizeError::MissingCoordinate { event_id, field });
    }
    match trimmed.parse::<f64>() {
        Ok(v) if v.is_finite() => Ok(v),
        _ => Err(NormalizeError::InvalidCoordinate {
            event_id,
            field,
            value: value.to_string(),
        }),
    }
}

/// Turn one raw listing into a queryable one, or say why it can't be.
///
/// Render failures do not drop the listing; the error text becomes its html.
pub fn normalize(mut raw: RawListing, renderer: &dyn Renderer) -> Result<Listing, NormalizeError> {
    let id = raw.event_id;
    let lat = parse_coordinate(id, "geocode_latitude", &raw.geocode_latitude)?;
    let lng = parse_coordinate(id, "geocode_longitude", &raw.geocode_longitude)?;

    for day in raw.recur_days.iter_mut() {
        if let Some(full) = translate_day(day) {
            *day = full.to_string();
        }
    }

    let map = map_url(&raw);
    let mut listing = Listing::new(raw, lat, lng);
    listing.map_url = map;
    listing.html = match renderer.render(&listing) {
        Ok(html) => html,
        Err(e) => e.to_string(),
    };

    listing
        .precompute_json()
        .map_err(|e| NormalizeError::Serialize {
            event_id: id,
            message: e.to_string(),
        })?;
    Ok(listing)
}

/// Normalize a whole fetch, preserving source order.
/// Returns (kept, dropped_count).
pub fn normalize_batch(raws: Vec<RawListing>, renderer: &dyn Renderer) -> (Vec<Listing>, usize) {
    let mut kept = Vec::with_capacity(raws.len());
    let mut dropped = 0usize;
    for raw in raws {
        match normalize(raw, renderer) {
            Ok(l) => kept.push(l),
            Err(e) => {
                tracing::debug!(target: "ingest", error = %e, "dropping listing");
                dropped += 1;
            }
        }
    }
    if dropped > 0 {
        tracing::info!(target: "ingest", kept = kept.len(), dropped, "normalized batch");
    }
    (kept, dropped)
}
