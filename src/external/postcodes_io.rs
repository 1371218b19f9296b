use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::{
    config::GeocoderConfig,
    entities::Coordinates,
    error::{Error, ErrorKind},
    geocoder::PostcodeResolver,
};

#[derive(Clone, Debug, Serialize, Deserialize)]
struct Response<T> {
    status: u16,
    result: Option<T>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
struct PostcodeResult {
    postcode: String,
    latitude: Option<f64>,
    longitude: Option<f64>,
}

/// Resolver backed by a postcodes.io compatible HTTP API.
pub struct PostcodesIo {
    client: reqwest::Client,
    api_base: String,
}

impl PostcodesIo {
    pub fn new(config: &GeocoderConfig) -> Result<Self, Error> {
        // the geocoder applies its own deadline; this one only stops leaked
        // connections from lingering
        let client = reqwest::Client::builder()
            .timeout(config.timeout + Duration::from_secs(1))
            .build()?;

        Ok(Self {
            client,
            api_base: config.api_base.clone(),
        })
    }
}

#[async_trait]
impl PostcodeResolver for PostcodesIo {
    #[tracing::instrument(skip(self))]
    async fn resolve(&self, postcode: &str) -> Result<Option<Coordinates>, Error> {
        let url = format!("https://{}/postcodes/{}", self.api_base, postcode);

        let res = self.client.get(url).send().await?;

        let status_code = res.status().as_u16();

        if status_code == 404 {
            return Ok(None);
        } else if status_code >= 400 && status_code < 500 {
            return Err(Error::new(
                ErrorKind::InvalidFormat,
                format!("postcode {} rejected by resolver", postcode),
            ));
        } else if status_code != 200 {
            return Err(Error::upstream_error());
        }

        let data: Response<PostcodeResult> = res.json().await?;

        if data.status != 200 {
            return Err(Error::upstream_error());
        }

        let result = data.result.ok_or_else(Error::upstream_error)?;

        match (result.latitude, result.longitude) {
            (Some(lat), Some(lng)) => Ok(Some(Coordinates::new(lat, lng))),
            // terminated or non-geographic postcodes carry no coordinates
            _ => {
                tracing::info!(postcode = %result.postcode, "postcode has no coordinates");
                Ok(None)
            }
        }
    }
}

#[test]
fn parses_postcodes_io_payload() {
    let payload = r#"{
        "status": 200,
        "result": { "postcode": "SK3 0AA", "latitude": 53.4, "longitude": -2.16, "country": "England" }
    }"#;

    let data: Response<PostcodeResult> = serde_json::from_str(payload).unwrap();
    let result = data.result.unwrap();
    assert_eq!(result.postcode, "SK3 0AA");
    assert_eq!(result.latitude, Some(53.4));
}
