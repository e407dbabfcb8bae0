//! Outbound HTTPS client for the Places upstream.
//!
//! Generalizes the teacher's `ApiClient` (one generic `request<T, B>` method)
//! into four closed operations, each building its own body and field mask
//! rather than accepting an open-ended payload.

use std::time::Duration;

use bytes::Bytes;
use reqwest::Method;
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
use reqwest_retry::{policies::ExponentialBackoff, RetryTransientMiddleware};

use crate::error::PlacesError;

use super::model::{
    finalize_results, is_landmark_query, LatLng, NearbySearchRequest, PlaceSummary,
    PlacesSearchResponse, TextSearchRequest, UpstreamSearchResponse,
};

const PLACES_BASE_URL: &str = "https://places.googleapis.com";

const SEARCH_FIELD_MASK: &str = "places.id,places.displayName,places.formattedAddress,places.location";
const DETAILS_FIELD_MASK: &str =
    "id,displayName,formattedAddress,location,rating,userRatingCount,reviews,photos";

const MAX_CONNECT_ATTEMPTS: u32 = 3;

/// Whatever the router needs to forward verbatim on a non-2xx or unparseable
/// upstream response lives in `Forward`; `Success` carries the shaped result.
#[derive(Debug)]
pub enum UpstreamOutcome<T> {
    Success(T),
    Forward { status: u16, body: String },
}

/// Binary payload returned by `place_photo`.
#[derive(Debug, Clone)]
pub struct PlacePhoto {
    pub content_type: String,
    pub bytes: Bytes,
}

pub struct PlacesClient {
    http: ClientWithMiddleware,
    /// Redirects must be hand-walked one hop at a time for the photo
    /// endpoint, so it gets its own client with automatic redirects off.
    photo_http: ClientWithMiddleware,
    api_key: String,
    base_url: String,
}

impl PlacesClient {
    pub fn new(api_key: String) -> Self {
        Self::with_base_url(api_key, PLACES_BASE_URL.to_string())
    }

    /// Exposed so tests can point at a local fake instead of the real
    /// upstream; production code only ever calls [`PlacesClient::new`].
    pub fn with_base_url(api_key: String, base_url: String) -> Self {
        let retry_policy = ExponentialBackoff::builder().build_with_max_retries(3);

        let http = ClientBuilder::new(reqwest::Client::new())
            .with(RetryTransientMiddleware::new_with_policy(retry_policy.clone()))
            .build();

        let no_redirect = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .expect("building a reqwest client with a fixed redirect policy cannot fail");
        let photo_http = ClientBuilder::new(no_redirect)
            .with(RetryTransientMiddleware::new_with_policy(retry_policy))
            .build();

        Self {
            http,
            photo_http,
            api_key,
            base_url,
        }
    }

    pub async fn nearby_search(
        &self,
        req: NearbySearchRequest,
    ) -> Result<UpstreamOutcome<PlacesSearchResponse>, PlacesError> {
        let body = serde_json::json!({
            "maxResultCount": 5,
            "locationRestriction": {
                "circle": {
                    "center": { "latitude": req.latitude, "longitude": req.longitude },
                    "radius": req.radius,
                }
            }
        });
        let center = LatLng {
            lat: req.latitude,
            lng: req.longitude,
        };
        self.run_search("places:searchNearby", body, Some(center)).await
    }

    pub async fn text_search(
        &self,
        req: TextSearchRequest,
    ) -> Result<UpstreamOutcome<PlacesSearchResponse>, PlacesError> {
        let mut body = serde_json::json!({ "textQuery": req.query, "maxResultCount": 5 });
        let landmark = is_landmark_query(&req.query);

        let center = match (req.latitude, req.longitude) {
            (Some(lat), Some(lng)) if !landmark => {
                body["locationBias"] = serde_json::json!({
                    "circle": {
                        "center": { "latitude": lat, "longitude": lng },
                        "radius": req.radius,
                    }
                });
                Some(LatLng { lat, lng })
            }
            _ => None,
        };

        self.run_search("places:searchText", body, Some(center)).await
    }

    async fn run_search(
        &self,
        path: &str,
        body: serde_json::Value,
        center: Option<LatLng>,
    ) -> Result<UpstreamOutcome<PlacesSearchResponse>, PlacesError> {
        let url = format!("{}/v1/{path}", self.base_url);
        let response = self
            .send_with_retry(&self.http, Method::POST, &url, &[("X-Goog-FieldMask", SEARCH_FIELD_MASK)], Some(&body))
            .await?;

        let status = response.status();
        let bytes = response
            .bytes()
            .await
            .map_err(|e| PlacesError::Transport(reqwest_middleware::Error::Reqwest(e)))?;

        if !status.is_success() {
            return Ok(UpstreamOutcome::Forward {
                status: status.as_u16(),
                body: String::from_utf8_lossy(&bytes).into_owned(),
            });
        }

        let parsed: UpstreamSearchResponse = match serde_json::from_slice(&bytes) {
            Ok(v) => v,
            Err(_) => {
                return Ok(UpstreamOutcome::Forward {
                    status: status.as_u16(),
                    body: String::from_utf8_lossy(&bytes).into_owned(),
                })
            }
        };

        let places: Vec<PlaceSummary> = parsed.places.iter().filter_map(PlaceSummary::from_upstream).collect();
        let places = finalize_results(places, center);
        Ok(UpstreamOutcome::Success(PlacesSearchResponse { places }))
    }

    pub async fn place_details(&self, id: &str) -> Result<UpstreamOutcome<serde_json::Value>, PlacesError> {
        let url = format!(
            "{}/v1/places/{id}?fields={DETAILS_FIELD_MASK}",
            self.base_url
        );
        let response = self.send_with_retry(&self.http, Method::GET, &url, &[], None).await?;

        let status = response.status();
        let bytes = response
            .bytes()
            .await
            .map_err(|e| PlacesError::Transport(reqwest_middleware::Error::Reqwest(e)))?;

        if !status.is_success() {
            return Ok(UpstreamOutcome::Forward {
                status: status.as_u16(),
                body: String::from_utf8_lossy(&bytes).into_owned(),
            });
        }

        match serde_json::from_slice(&bytes) {
            Ok(v) => Ok(UpstreamOutcome::Success(v)),
            Err(_) => Ok(UpstreamOutcome::Forward {
                status: status.as_u16(),
                body: String::from_utf8_lossy(&bytes).into_owned(),
            }),
        }
    }

    /// Follows at most one redirect hop; a second redirect on the target is
    /// surfaced via `Forward` rather than chased further.
    pub async fn place_photo(&self, reference: &str) -> Result<UpstreamOutcome<PlacePhoto>, PlacesError> {
        let first_url = format!(
            "{}/v1/{reference}/media?key={}&maxHeightPx=1600",
            self.base_url, self.api_key
        );
        let first = self.send_with_retry(&self.photo_http, Method::GET, &first_url, &[], None).await?;

        let final_response = if first.status().is_redirection() {
            let location = first
                .headers()
                .get(reqwest::header::LOCATION)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
                .ok_or(PlacesError::MissingRedirectLocation)?;
            self.send_with_retry(&self.photo_http, Method::GET, &location, &[], None).await?
        } else {
            first
        };

        let status = final_response.status();
        let content_type = final_response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("application/octet-stream")
            .to_string();
        let bytes = final_response
            .bytes()
            .await
            .map_err(|e| PlacesError::Transport(reqwest_middleware::Error::Reqwest(e)))?;

        if !status.is_success() {
            return Ok(UpstreamOutcome::Forward {
                status: status.as_u16(),
                body: String::from_utf8_lossy(&bytes).into_owned(),
            });
        }

        Ok(UpstreamOutcome::Success(PlacePhoto { content_type, bytes }))
    }

    /// Every request goes through this: it adds the API key header, carries
    /// any extra headers (the field mask, typically), and owns the
    /// `EADDRNOTAVAIL`-specific retry the generic transient-retry middleware
    /// doesn't know about, since ephemeral-port exhaustion isn't a 5xx.
    async fn send_with_retry(
        &self,
        client: &ClientWithMiddleware,
        method: Method,
        url: &str,
        extra_headers: &[(&str, &str)],
        json_body: Option<&serde_json::Value>,
    ) -> Result<reqwest::Response, PlacesError> {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            let mut builder = client.request(method.clone(), url).header("X-Goog-Api-Key", &self.api_key);
            for (name, value) in extra_headers {
                builder = builder.header(*name, *value);
            }
            if let Some(body) = json_body {
                builder = builder.json(body);
            }

            match builder.send().await {
                Ok(resp) => return Ok(resp),
                Err(e) if is_eaddrnotavail(&e) && attempt < MAX_CONNECT_ATTEMPTS => {
                    tokio::time::sleep(Duration::from_millis(100 * attempt as u64)).await;
                    continue;
                }
                Err(e) if is_connect_error(&e) => return Err(PlacesError::Connect(e)),
                Err(e) => return Err(PlacesError::Transport(e)),
            }
        }
    }
}

fn is_connect_error(err: &reqwest_middleware::Error) -> bool {
    matches!(err, reqwest_middleware::Error::Reqwest(e) if e.is_connect())
}

fn is_eaddrnotavail(err: &reqwest_middleware::Error) -> bool {
    let reqwest_middleware::Error::Reqwest(e) = err else {
        return false;
    };
    if !e.is_connect() {
        return false;
    }
    let mut source: Option<&(dyn std::error::Error + 'static)> = std::error::Error::source(e);
    while let Some(cause) = source {
        if let Some(io_err) = cause.downcast_ref::<std::io::Error>() {
            if io_err.kind() == std::io::ErrorKind::AddrNotAvailable {
                return true;
            }
        }
        source = cause.source();
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::{BodyExt, Full};
    use hyper::body::Incoming;
    use hyper::server::conn::http1;
    use hyper::service::service_fn;
    use hyper::{Request as HyperRequest, Response as HyperResponse};
    use hyper_util::rt::TokioIo;
    use tokio::net::TcpListener;

    /// Spins up a local plaintext HTTP server that always returns `body`
    /// with `status`, the way `redis2ws.rs` spins up a throwaway server for
    /// its own demo. Stands in for a Places upstream in tests, since the
    /// workspace carries no wiremock-style dependency for HTTPS mocking.
    async fn spawn_fake_upstream(status: u16, body: &'static str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            loop {
                let Ok((stream, _)) = listener.accept().await else {
                    return;
                };
                let io = TokioIo::new(stream);
                tokio::spawn(async move {
                    let service = service_fn(move |_req: HyperRequest<Incoming>| async move {
                        Ok::<_, std::convert::Infallible>(
                            HyperResponse::builder()
                                .status(status)
                                .body(Full::new(bytes::Bytes::from(body)))
                                .unwrap(),
                        )
                    });
                    let _ = http1::Builder::new().serve_connection(io, service).await;
                });
            }
        });

        format!("http://{addr}")
    }

    #[tokio::test]
    async fn nearby_search_transforms_a_successful_response() {
        let body = r#"{"places":[{"id":"X","displayName":{"text":"Cafe"},"formattedAddress":"Addr","location":{"latitude":37.498095,"longitude":127.02761}}]}"#;
        let base = spawn_fake_upstream(200, body).await;
        let client = PlacesClient::with_base_url("key".into(), base);

        let outcome = client
            .nearby_search(NearbySearchRequest {
                latitude: 37.4979,
                longitude: 127.0276,
                radius: 500.0,
            })
            .await
            .unwrap();

        match outcome {
            UpstreamOutcome::Success(resp) => {
                assert_eq!(resp.places.len(), 1);
                assert_eq!(resp.places[0].id, "X");
                assert_eq!(resp.places[0].name, "Cafe");
                assert_eq!(resp.places[0].loc.lat, 37.498095);
                assert_eq!(resp.places[0].loc.lng, 127.02761);
            }
            UpstreamOutcome::Forward { .. } => panic!("expected success"),
        }
    }

    #[tokio::test]
    async fn non_2xx_upstream_is_forwarded_verbatim() {
        let base = spawn_fake_upstream(429, "rate limited").await;
        let client = PlacesClient::with_base_url("key".into(), base);

        let outcome = client
            .nearby_search(NearbySearchRequest {
                latitude: 0.0,
                longitude: 0.0,
                radius: 100.0,
            })
            .await
            .unwrap();

        match outcome {
            UpstreamOutcome::Forward { status, body } => {
                assert_eq!(status, 429);
                assert_eq!(body, "rate limited");
            }
            UpstreamOutcome::Success(_) => panic!("expected forward"),
        }
    }

    #[tokio::test]
    async fn unparseable_body_is_forwarded_as_sentinel() {
        let base = spawn_fake_upstream(200, "not json").await;
        let client = PlacesClient::with_base_url("key".into(), base);

        let outcome = client.place_details("abc").await.unwrap();
        match outcome {
            UpstreamOutcome::Forward { status, body } => {
                assert_eq!(status, 200);
                assert_eq!(body, "not json");
            }
            UpstreamOutcome::Success(_) => panic!("expected forward"),
        }
    }

    #[test]
    fn landmark_query_skips_location_bias() {
        assert!(is_landmark_query("Seoul Station"));
        assert!(!is_landmark_query("Cafe Bene"));
    }
}
