use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::config::GeocoderConfig;
use crate::entities::{Coordinates, Location};
use crate::error::{Error, ErrorKind};

/// Resolves a normalized postcode to coordinates. `Ok(None)` means the
/// postcode is well-formed but unknown to the resolver.
#[async_trait]
pub trait PostcodeResolver: Send + Sync {
    async fn resolve(&self, postcode: &str) -> Result<Option<Coordinates>, Error>;
}

pub struct Geocoder {
    resolver: Arc<dyn PostcodeResolver>,
    timeout: Duration,
    retries: u32,
}

impl Geocoder {
    pub fn new(resolver: Arc<dyn PostcodeResolver>, config: &GeocoderConfig) -> Self {
        Self {
            resolver,
            timeout: config.timeout,
            retries: config.retries,
        }
    }

    /// Validates and normalizes `input`, then resolves it. Malformed input is
    /// rejected before the resolver is called.
    #[tracing::instrument(skip(self))]
    pub async fn geocode(&self, input: &str) -> Result<Location, Error> {
        let postcode = normalize_postcode(input)?;
        let mut attempt = 0;

        loop {
            let lookup = tokio::time::timeout(self.timeout, self.resolver.resolve(&postcode)).await;

            match lookup {
                Err(_) => {
                    tracing::warn!(%postcode, "postcode lookup timed out");
                    return Err(Error::timeout_error("postcode lookup"));
                }
                Ok(Ok(Some(coordinates))) if coordinates.is_valid() => {
                    return Ok(Location::new(postcode, coordinates));
                }
                Ok(Ok(Some(coordinates))) => {
                    tracing::warn!(%postcode, ?coordinates, "resolver returned invalid coordinates");
                    return Err(Error::upstream_error());
                }
                Ok(Ok(None)) => return Err(Error::not_found_error(&postcode)),
                Ok(Err(err)) if err.is(ErrorKind::Upstream) && attempt < self.retries => {
                    attempt += 1;
                    tracing::warn!(%postcode, attempt, "retrying postcode lookup");
                }
                Ok(Err(err)) => return Err(err),
            }
        }
    }
}

/// Checks UK postcode structure and returns the canonical form
/// (upper case, single space before the inward code).
pub fn normalize_postcode(input: &str) -> Result<String, Error> {
    let compact: String = input
        .chars()
        .filter(|c| !c.is_whitespace())
        .map(|c| c.to_ascii_uppercase())
        .collect();

    if !compact.is_ascii() || !(5..=7).contains(&compact.len()) {
        return Err(Error::invalid_format_error(format!(
            "{:?} is not a valid postcode",
            input
        )));
    }

    let (outward, inward) = compact.split_at(compact.len() - 3);

    let valid = (outward == "GIR" && inward == "0AA")
        || (is_valid_outward(outward) && is_valid_inward(inward));

    if !valid {
        return Err(Error::invalid_format_error(format!(
            "{:?} is not a valid postcode",
            input
        )));
    }

    Ok(format!("{} {}", outward, inward))
}

fn shape(code: &str) -> String {
    code.chars()
        .map(|c| match c {
            'A'..='Z' => 'A',
            '0'..='9' => '9',
            _ => '?',
        })
        .collect()
}

fn is_valid_outward(outward: &str) -> bool {
    let chars: Vec<char> = outward.chars().collect();

    let shape_ok = matches!(
        shape(outward).as_str(),
        "A9" | "A99" | "AA9" | "AA99" | "A9A" | "AA9A"
    );
    if !shape_ok {
        return false;
    }

    if matches!(chars[0], 'Q' | 'V' | 'X') {
        return false;
    }

    if chars[1].is_ascii_alphabetic() && matches!(chars[1], 'I' | 'J' | 'Z') {
        return false;
    }

    true
}

fn is_valid_inward(inward: &str) -> bool {
    shape(inward) == "9AA"
        && !inward
            .chars()
            .skip(1)
            .any(|c| matches!(c, 'C' | 'I' | 'K' | 'M' | 'O' | 'V'))
}
