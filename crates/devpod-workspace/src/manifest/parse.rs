//! Parsers for the string-valued provider options
//!
//! Labels, node selectors, PVC annotations and resource overrides all come
//! in as comma-separated `key=value` lists.

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::ResourceRequirements;
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;

use devpod_common::{Error, Result};

/// Parse `k1=v1,k2=v2` into a map
///
/// Whitespace around entries is ignored, as are empty entries. An entry
/// without `=` or with an empty key is rejected.
pub fn parse_key_values(option: &str, raw: &str) -> Result<BTreeMap<String, String>> {
    let mut out = BTreeMap::new();
    for entry in raw.split(',').map(str::trim).filter(|e| !e.is_empty()) {
        let Some((key, value)) = entry.split_once('=') else {
            return Err(Error::configuration(
                option,
                format!("entry '{entry}' is not in key=value form"),
            ));
        };
        let key = key.trim();
        if key.is_empty() {
            return Err(Error::configuration(
                option,
                format!("entry '{entry}' has an empty key"),
            ));
        }
        out.insert(key.to_string(), value.trim().to_string());
    }
    Ok(out)
}

const BINARY_SUFFIXES: [&str; 6] = ["Ki", "Mi", "Gi", "Ti", "Pi", "Ei"];
const DECIMAL_SUFFIXES: [&str; 8] = ["n", "u", "m", "k", "M", "G", "T", "P"];

/// Validate a Kubernetes quantity such as `10Gi`, `500m` or `1e3`
pub fn parse_quantity(option: &str, raw: &str) -> Result<Quantity> {
    let value = raw.trim();
    let invalid = || Error::configuration(option, format!("invalid quantity '{raw}'"));

    let unsigned = value.strip_prefix(['+', '-']).unwrap_or(value);
    let number_len = unsigned
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(unsigned.len());
    let (number, suffix) = unsigned.split_at(number_len);

    if number.is_empty() || number == "." || number.matches('.').count() > 1 {
        return Err(invalid());
    }

    let suffix_ok = suffix.is_empty()
        || suffix == "E"
        || BINARY_SUFFIXES.contains(&suffix)
        || DECIMAL_SUFFIXES.contains(&suffix)
        || is_exponent(suffix);
    if !suffix_ok {
        return Err(invalid());
    }

    Ok(Quantity(value.to_string()))
}

fn is_exponent(suffix: &str) -> bool {
    let Some(exp) = suffix.strip_prefix(['e', 'E']) else {
        return false;
    };
    let digits = exp.strip_prefix(['+', '-']).unwrap_or(exp);
    !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit())
}

/// Parse `requests.cpu=1,limits.memory=2Gi` into resource requirements
pub fn parse_resources(option: &str, raw: &str) -> Result<ResourceRequirements> {
    let mut requests = BTreeMap::new();
    let mut limits = BTreeMap::new();

    for (key, value) in parse_key_values(option, raw)? {
        let quantity = parse_quantity(option, &value)?;
        match key.split_once('.') {
            Some(("requests", resource)) if !resource.is_empty() => {
                requests.insert(resource.to_string(), quantity);
            }
            Some(("limits", resource)) if !resource.is_empty() => {
                limits.insert(resource.to_string(), quantity);
            }
            _ => {
                return Err(Error::configuration(
                    option,
                    format!("unknown resource key '{key}', expected requests.<name> or limits.<name>"),
                ))
            }
        }
    }

    Ok(ResourceRequirements {
        requests: (!requests.is_empty()).then_some(requests),
        limits: (!limits.is_empty()).then_some(limits),
        ..Default::default()
    })
}
