// src/core/scanner/geo_scanner.rs

use std::time::Duration;

use serde::Deserialize;
use tracing::{error, info, warn};

use crate::core::models::GeoInfo;
use crate::core::probe::ProbeResult;
use crate::core::target::ResolvedHost;

const GEO_ENDPOINT: &str = "http://ip-api.com/json";
const HTTP_TIMEOUT: Duration = Duration::from_secs(3);
const USER_AGENT: &str = concat!("netgaze/", env!("CARGO_PKG_VERSION"));

/// Body returned by the ip-api.com JSON endpoint.
///
/// `region` is the short code (`CA`) and `regionName` the full name.
#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct GeoResponse {
    pub status: String,
    pub message: String,
    pub query: String,
    pub country: String,
    pub country_code: String,
    pub region: String,
    pub region_name: String,
    pub city: String,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
    pub timezone: String,
    pub isp: String,
    pub org: String,
    #[serde(rename = "as")]
    pub as_field: String,
}

/// Geolocates the preferred address with a single HTTP request.
pub async fn run_geo_scan(host: &ResolvedHost) -> ProbeResult<GeoInfo> {
    let ip = host.preferred();
    info!(%ip, "Starting geolocation lookup.");

    let client = reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .timeout(HTTP_TIMEOUT)
        .build()
        .map_err(|e| {
            error!(error = %e, "Failed to build HTTP client for geolocation.");
            format!("Failed to build HTTP client: {e}")
        })?;

    let url = format!("{GEO_ENDPOINT}/{ip}");
    let response = client.get(&url).send().await.map_err(|e| {
        warn!(error = %e, "Geolocation request failed.");
        format!("Geolocation lookup failed: HTTP request failed: {e}")
    })?;

    let status = response.status();
    if !status.is_success() {
        warn!(%status, "Geolocation service returned an error status.");
        return Err(format!("Geolocation lookup failed: HTTP status: {}", status.as_u16()).into());
    }

    let body: GeoResponse = response
        .json()
        .await
        .map_err(|e| format!("Geolocation lookup failed: failed to decode JSON: {e}"))?;

    let geo = into_geo_info(body).map_err(|e| format!("Geolocation lookup failed: {e}"))?;
    info!(country = %geo.country_code, city = %geo.city, "Geolocation lookup finished.");
    Ok(geo)
}

/// Maps a provider answer onto [`GeoInfo`], rejecting non-`success` answers.
pub fn into_geo_info(response: GeoResponse) -> Result<GeoInfo, String> {
    if !response.status.eq_ignore_ascii_case("success") {
        return Err(format!("API error: {}", response.message));
    }
    Ok(GeoInfo {
        ip: response.query,
        city: response.city,
        region: response.region_name,
        region_code: response.region,
        country: response.country,
        country_code: response.country_code,
        org: response.org,
        isp: response.isp,
        as_field: response.as_field,
        latitude: response.lat,
        longitude: response.lon,
        timezone: response.timezone,
    })
}
