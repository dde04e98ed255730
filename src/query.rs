// src/query.rs
//! Bounding-box search over the cache.

use std::collections::HashMap;

use metrics::counter;

use crate::cache::{CacheStore, Matches};
use crate::error::QueryError;

/// Rectangle to search in. Containment is strict on all four sides.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub south: f64,
    pub west: f64,
    pub north: f64,
    pub east: f64,
}

fn parse_bound(name: &'static str, raw: Option<&str>) -> Result<f64, QueryError> {
    let s = raw.map(str::trim).filter(|s| !s.is_empty()).ok_or(QueryError::Missing(name))?;
    let v: f64 = s.parse().map_err(|_| QueryError::Invalid {
        name,
        value: s.to_string(),
    })?;
    if !v.is_finite() {
        return Err(QueryError::Invalid {
            name,
            value: s.to_string(),
        });
    }
    // a zero bound is what the map UI sends before it has a viewport
    if v == 0.0 {
        return Err(QueryError::Zero(name));
    }
    Ok(v)
}

impl BoundingBox {
    /// Validate the four raw bounds of a search request.
    pub fn from_params(
        swlat: Option<&str>,
        swlng: Option<&str>,
        nelat: Option<&str>,
        nelng: Option<&str>,
    ) -> Result<Self, QueryError> {
        Ok(Self {
            south: parse_bound("swlat", swlat)?,
            west: parse_bound("swlng", swlng)?,
            north: parse_bound("nelat", nelat)?,
            east: parse_bound("nelng", nelng)?,
        })
    }

    pub fn from_query(q: &HashMap<String, String>) -> Result<Self, QueryError> {
        Self::from_params(
            q.get("swlat").map(String::as_str),
            q.get("swlng").map(String::as_str),
            q.get("nelat").map(String::as_str),
            q.get("nelng").map(String::as_str),
        )
    }
}

/// `{"copyright": .., "results": [..]}` built from the precomputed JSON of
/// each match; listings are never re-serialized here.
pub fn render_response(matches: &Matches) -> String {
    let copyright =
        serde_json::to_string(matches.copyright()).unwrap_or_else(|_| "\"\"".to_string());
    let mut out = String::with_capacity(64 + copyright.len());
    out.push_str("{\"copyright\":");
    out.push_str(&copyright);
    out.push_str(",\"results\":[");
    for (i, json) in matches.iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        out.push_str(json);
    }
    out.push_str("]}");
    out
}

/// Validate, filter and serialize in one go.
pub fn search(store: &CacheStore, params: &HashMap<String, String>) -> Result<String, QueryError> {
    counter!("search_requests_total").increment(1);
    let bbox = BoundingBox::from_query(params).inspect_err(|_| {
        counter!("search_rejected_total").increment(1);
    })?;
    Ok(render_response(&store.query(bbox)))
}
