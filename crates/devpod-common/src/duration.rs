//! Duration strings as accepted by `POD_TIMEOUT` (e.g. "10m", "1h30m", "500ms")

use std::time::Duration;

/// Parse a duration made of one or more `<number><unit>` segments
///
/// Units: `ns`, `us` (or `µs`), `ms`, `s`, `m`, `h`. Fractions are allowed
/// in any segment ("1.5h"). A bare "0" is accepted; any other number
/// without a unit is rejected.
pub fn parse_duration(input: &str) -> Result<Duration, String> {
    let s = input.trim();
    if s.is_empty() {
        return Err("empty duration".to_string());
    }
    if s == "0" {
        return Ok(Duration::ZERO);
    }

    let mut total_nanos: f64 = 0.0;
    let mut rest = s;
    while !rest.is_empty() {
        let number_len = rest
            .char_indices()
            .find(|(_, c)| !(c.is_ascii_digit() || *c == '.'))
            .map(|(i, _)| i)
            .unwrap_or(rest.len());
        if number_len == 0 {
            return Err(format!("invalid duration '{s}'"));
        }
        let value: f64 = rest[..number_len]
            .parse()
            .map_err(|_| format!("invalid duration '{s}'"))?;
        rest = &rest[number_len..];

        let unit_len = rest
            .char_indices()
            .find(|(_, c)| c.is_ascii_digit() || *c == '.')
            .map(|(i, _)| i)
            .unwrap_or(rest.len());
        let nanos_per_unit = match &rest[..unit_len] {
            "ns" => 1.0,
            "us" | "µs" => 1e3,
            "ms" => 1e6,
            "s" => 1e9,
            "m" => 60.0 * 1e9,
            "h" => 3600.0 * 1e9,
            "" => return Err(format!("missing unit in duration '{s}'")),
            unit => return Err(format!("unknown unit '{unit}' in duration '{s}'")),
        };
        rest = &rest[unit_len..];
        total_nanos += value * nanos_per_unit;
    }

    Ok(Duration::from_nanos(total_nanos.round() as u64))
}
