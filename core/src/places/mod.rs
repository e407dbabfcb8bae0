//! Outbound Places proxy: request/response shapes plus the HTTPS client.

pub mod client;
pub mod model;

pub use client::{PlacePhoto, PlacesClient, UpstreamOutcome};
pub use model::{
    LatLng, NearbySearchRequest, PlaceSummary, PlacesSearchResponse, TextSearchRequest,
};
