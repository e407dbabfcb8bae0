//! Request/response shapes for the Places proxy.
//!
//! The upstream (`places.googleapis.com`) response is deserialized into
//! [`UpstreamPlace`] and friends, then [`PlaceSummary::from_upstream`]
//! normalizes it down to the small shape spec.md §4.4 step 5 describes.

use serde::{Deserialize, Serialize};

/// One normalized result returned to the REST caller.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct PlaceSummary {
    pub id: String,
    pub name: String,
    pub addr: String,
    pub loc: LatLng,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct LatLng {
    pub lat: f64,
    pub lng: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct PlacesSearchResponse {
    pub places: Vec<PlaceSummary>,
}

/// Body accepted by `POST /places/nearby`.
#[derive(Debug, Clone, Deserialize)]
pub struct NearbySearchRequest {
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default = "default_radius")]
    pub radius: f64,
}

/// Body accepted by `POST /places/search`.
#[derive(Debug, Clone, Deserialize)]
pub struct TextSearchRequest {
    pub query: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    #[serde(default = "default_radius")]
    pub radius: f64,
}

pub(crate) fn default_radius() -> f64 {
    1500.0
}

/// Raw upstream representation (the subset of fields we read). `#[serde(default)]`
/// everywhere because the upstream is only contractually obligated to return
/// what the field mask asked for — anything else is a bonus, not a guarantee.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpstreamPlace {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(rename = "displayName", default)]
    pub display_name: Option<UpstreamDisplayName>,
    #[serde(rename = "formattedAddress", default)]
    pub formatted_address: Option<String>,
    #[serde(default)]
    pub vicinity: Option<String>,
    #[serde(default)]
    pub location: Option<UpstreamLocation>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpstreamDisplayName {
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct UpstreamLocation {
    pub latitude: f64,
    pub longitude: f64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpstreamSearchResponse {
    #[serde(default)]
    pub places: Vec<UpstreamPlace>,
}

fn round6(v: f64) -> f64 {
    (v * 1_000_000.0).round() / 1_000_000.0
}

impl PlaceSummary {
    /// Returns `None` when the upstream place carries no usable location —
    /// such a result is dropped rather than surfaced with a bogus `0.0, 0.0`.
    pub fn from_upstream(raw: &UpstreamPlace) -> Option<Self> {
        let location = raw.location?;

        let id = raw
            .id
            .clone()
            .or_else(|| {
                raw.name
                    .as_ref()
                    .and_then(|n| n.rsplit("places/").next())
                    .map(str::to_string)
            })
            .unwrap_or_default();

        let name = raw
            .display_name
            .as_ref()
            .and_then(|d| d.text.clone())
            .unwrap_or_default();

        let addr = raw
            .formatted_address
            .clone()
            .or_else(|| raw.vicinity.clone())
            .unwrap_or_default();

        Some(PlaceSummary {
            id,
            name,
            addr,
            loc: LatLng {
                lat: round6(location.latitude),
                lng: round6(location.longitude),
            },
        })
    }

    /// Great-circle-ish squared distance in degrees, good enough for ranking
    /// the at-most-five results the spec allows — not for real navigation.
    fn distance_key(&self, center: LatLng) -> f64 {
        let dlat = self.loc.lat - center.lat;
        let dlng = self.loc.lng - center.lng;
        dlat * dlat + dlng * dlng
    }
}

/// Sorts by distance from `center` (when given) and caps at 5, per spec.
pub fn finalize_results(mut places: Vec<PlaceSummary>, center: Option<LatLng>) -> Vec<PlaceSummary> {
    if let Some(center) = center {
        places.sort_by(|a, b| {
            a.distance_key(center)
                .partial_cmp(&b.distance_key(center))
                .unwrap_or(std::cmp::Ordering::Equal)
        });
    }
    places.truncate(5);
    places
}

/// Heuristic: landmark-style queries search nationally rather than biased to
/// a point, because "seoul station" near some arbitrary center is wrong.
pub fn is_landmark_query(query: &str) -> bool {
    const TOKENS: &[&str] = &["station", "airport", "terminal", "university"];
    let lower = query.to_lowercase();
    TOKENS.iter().any(|t| lower.contains(t))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn place(id: &str, lat: f64, lng: f64) -> PlaceSummary {
        PlaceSummary {
            id: id.to_string(),
            name: id.to_string(),
            addr: String::new(),
            loc: LatLng { lat, lng },
        }
    }

    #[test]
    fn from_upstream_drops_places_without_a_location() {
        let raw = UpstreamPlace {
            id: Some("x".into()),
            location: None,
            ..Default::default()
        };
        assert!(PlaceSummary::from_upstream(&raw).is_none());
    }

    #[test]
    fn from_upstream_falls_back_to_trailing_name_segment_for_id() {
        let raw = UpstreamPlace {
            id: None,
            name: Some("places/abc123".into()),
            location: Some(UpstreamLocation { latitude: 1.0, longitude: 2.0 }),
            ..Default::default()
        };
        let summary = PlaceSummary::from_upstream(&raw).unwrap();
        assert_eq!(summary.id, "abc123");
    }

    #[test]
    fn from_upstream_rounds_coordinates_to_six_decimals() {
        let raw = UpstreamPlace {
            id: Some("x".into()),
            location: Some(UpstreamLocation {
                latitude: 37.4980951,
                longitude: 127.0276099,
            }),
            ..Default::default()
        };
        let summary = PlaceSummary::from_upstream(&raw).unwrap();
        assert_eq!(summary.loc.lat, 37.498095);
        assert_eq!(summary.loc.lng, 127.02761);
    }

    #[test]
    fn finalize_results_sorts_by_distance_and_caps_at_five() {
        let center = LatLng { lat: 0.0, lng: 0.0 };
        let places = vec![
            place("far", 10.0, 10.0),
            place("near", 0.1, 0.1),
            place("mid", 1.0, 1.0),
        ];
        let result = finalize_results(places, Some(center));
        assert_eq!(result.iter().map(|p| p.id.as_str()).collect::<Vec<_>>(), ["near", "mid", "far"]);

        let many: Vec<_> = (0..10).map(|i| place(&i.to_string(), i as f64, 0.0)).collect();
        assert_eq!(finalize_results(many, None).len(), 5);
    }

    #[test]
    fn landmark_tokens_are_case_insensitive() {
        assert!(is_landmark_query("Incheon Airport"));
        assert!(is_landmark_query("KAIST university"));
        assert!(!is_landmark_query("fried chicken"));
    }
}
