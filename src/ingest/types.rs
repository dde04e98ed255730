// src/ingest/types.rs
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use crate::error::FetchError;

/// Decode `null` the same way as an absent field.
fn nullable<'de, D, T>(de: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(de)?.unwrap_or_default())
}

/// One listing exactly as the upstream API delivers it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawListing {
    #[serde(default, deserialize_with = "nullable")]
    pub borough: String,
    #[serde(default, deserialize_with = "nullable")]
    pub category: String,
    #[serde(default, deserialize_with = "nullable")]
    pub city: String,
    #[serde(default, deserialize_with = "nullable")]
    pub critic_name: String,
    #[serde(default, deserialize_with = "nullable")]
    pub cross_street: String,
    #[serde(default, deserialize_with = "nullable")]
    pub date_time_description: String,
    #[serde(default, deserialize_with = "nullable")]
    pub event_detail_url: String,
    #[serde(default, deserialize_with = "nullable")]
    pub event_id: i64,
    #[serde(default, deserialize_with = "nullable")]
    pub event_name: String,
    #[serde(default, deserialize_with = "nullable")]
    pub event_schedule_id: i64,
    #[serde(default, deserialize_with = "nullable")]
    pub festival: bool,
    #[serde(default, deserialize_with = "nullable")]
    pub free: bool,
    #[serde(default, deserialize_with = "nullable")]
    pub geocode_latitude: String,
    #[serde(default, deserialize_with = "nullable")]
    pub geocode_longitude: String,
    #[serde(default, deserialize_with = "nullable")]
    pub kid_friendly: bool,
    #[serde(default, deserialize_with = "nullable")]
    pub last_chance: bool,
    #[serde(default)]
    pub last_modified: Option<DateTime<Utc>>, // 2014-07-08T06:04:45.188Z
    #[serde(default, deserialize_with = "nullable")]
    pub long_running_show: bool,
    #[serde(default, deserialize_with = "nullable")]
    pub neighborhood: String,
    #[serde(default, deserialize_with = "nullable")]
    pub previews_and_openings: bool,
    #[serde(default, deserialize_with = "nullable")]
    pub recur_days: Vec<String>,
    #[serde(default)]
    pub recurring_start_date: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "nullable")]
    pub state: String,
    #[serde(default, deserialize_with = "nullable")]
    pub street_address: String,
    #[serde(default, deserialize_with = "nullable")]
    pub subcategory: String,
    #[serde(default, deserialize_with = "nullable")]
    pub telephone: String,
    #[serde(default, deserialize_with = "nullable")]
    pub times_pick: bool,
    #[serde(default, deserialize_with = "nullable")]
    pub venue_detail_url: String,
    #[serde(default, deserialize_with = "nullable")]
    pub venue_name: String,
    #[serde(default, deserialize_with = "nullable")]
    pub venue_website: String,
    #[serde(default, deserialize_with = "nullable")]
    pub web_description: String,
}

/// A normalized, query-ready listing.
///
/// Only the normalizer (and snapshot loading) constructs these; once a
/// listing sits in a snapshot nothing mutates it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Listing {
    #[serde(flatten)]
    pub raw: RawListing,
    #[serde(default)]
    pub html: String,
    #[serde(default)]
    pub map_url: String,
    pub lat: f64,
    pub lng: f64,
    /// Precomputed JSON of everything above.
    #[serde(skip)]
    json: String,
}

impl Listing {
    pub(crate) fn new(raw: RawListing, lat: f64, lng: f64) -> Self {
        Self {
            raw,
            html: String::new(),
            map_url: String::new(),
            lat,
            lng,
            json: String::new(),
        }
    }

    /// The serialized form handed out by searches.
    pub fn as_json(&self) -> &str {
        &self.json
    }

    /// Recompute the serialized form from the current field values.
    pub(crate) fn precompute_json(&mut self) -> serde_json::Result<()> {
        self.json = serde_json::to_string(&*self)?;
        Ok(())
    }

    pub(crate) fn strictly_inside(&self, south: f64, west: f64, north: f64, east: f64) -> bool {
        self.lat > south && self.lat < north && self.lng > west && self.lng < east
    }
}

/// One page of the upstream envelope.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ListingsPage {
    #[serde(default, deserialize_with = "nullable")]
    pub status: String,
    #[serde(default, deserialize_with = "nullable")]
    pub errors: Vec<String>,
    #[serde(default, deserialize_with = "nullable")]
    pub num_results: usize,
    #[serde(default, deserialize_with = "nullable")]
    pub results: Vec<RawListing>,
    #[serde(default, deserialize_with = "nullable")]
    pub copyright: String,
}

#[async_trait]
pub trait ListingsSource: Send + Sync {
    /// Fetch the page starting at `offset`, `limit` records long.
    async fn fetch_page(&self, offset: usize, limit: usize) -> Result<ListingsPage, FetchError>;
    fn name(&self) -> &'static str;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nulls_and_missing_fields_decode_to_defaults() {
        let json = r#"{
            "event_id": 42,
            "event_name": null,
            "geocode_latitude": "40.7",
            "recur_days": null,
            "last_modified": "2014-07-08T06:04:45.188Z"
        }"#;
        let raw: RawListing = serde_json::from_str(json).unwrap();
        assert_eq!(raw.event_id, 42);
        assert_eq!(raw.event_name, "");
        assert_eq!(raw.geocode_latitude, "40.7");
        assert!(raw.geocode_longitude.is_empty());
        assert!(raw.recur_days.is_empty());
        assert!(raw.last_modified.is_some());
        assert!(raw.recurring_start_date.is_none());
    }

    #[test]
    fn listing_json_is_flat_and_skips_cached_form() {
        let mut l = Listing::new(
            RawListing {
                event_id: 7,
                ..Default::default()
            },
            40.5,
            -73.9,
        );
        l.map_url = "https://maps.example/x".into();
        l.precompute_json().unwrap();

        let v: serde_json::Value = serde_json::from_str(l.as_json()).unwrap();
        assert_eq!(v["event_id"], 7);
        assert_eq!(v["lat"], 40.5);
        assert_eq!(v["map_url"], "https://maps.example/x");
        assert!(v.get("raw").is_none());
        assert!(v.get("json").is_none());
    }

    #[test]
    fn envelope_decodes() {
        let json = r#"{"status":"OK","errors":[],"num_results":2,
            "results":[{"event_id":1},{"event_id":2}],"copyright":"(c) NYT"}"#;
        let page: ListingsPage = serde_json::from_str(json).unwrap();
        assert_eq!(page.num_results, 2);
        assert_eq!(page.results.len(), 2);
        assert_eq!(page.copyright, "(c) NYT");
    }
}
