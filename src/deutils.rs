/*
 *  deutils.rs
 *
 *  nowframe - now playing, on the glass
 *	(c) 2020-26 Stuart Hunter
 *
 *	Lenient deserializers for the push-state payload
 *
 *	This program is free software: you can redistribute it and/or modify
 *	it under the terms of the GNU General Public License as published by
 *	the Free Software Foundation, either version 3 of the License, or
 *	(at your option) any later version.
 *
 *	This program is distributed in the hope that it will be useful,
 *	but WITHOUT ANY WARRANTY; without even the implied warranty of
 *	MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 *	GNU General Public License for more details.
 *
 *	See <http://www.gnu.org/licenses/> to get a copy of the GNU General
 *	Public License.
 *
 */
use serde::{Deserialize, Deserializer};
use serde_json::Value;

/// Strings may arrive as strings, numbers, booleans or null.
/// Null and anything structured collapse to an empty string.
pub fn deserialize_lenient_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let v = Value::deserialize(deserializer)?;
    Ok(match v {
        Value::String(s) => s,
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        _ => String::new(),
    })
}

/// Non-negative integer from a number, a numeric string or null.
/// Floats are truncated, negatives clamp to zero, null/garbage is zero.
pub fn deserialize_lenient_u64<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    let v = Value::deserialize(deserializer)?;
    let n = match &v {
        Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().map(|f| if f.is_finite() && f > 0.0 { f as u64 } else { 0 })),
        Value::String(s) => {
            let s = s.trim();
            s.parse::<u64>()
                .ok()
                .or_else(|| s.parse::<f64>().ok().map(|f| if f.is_finite() && f > 0.0 { f as u64 } else { 0 }))
        }
        _ => None,
    };
    Ok(n.unwrap_or(0))
}

/// Converts total seconds into a "H:MM:SS" or "M:SS" duration string.
/// The hours segment is only surfaced when non-zero.
pub fn seconds_to_hms(total_seconds: u64) -> String {
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;

    if hours > 0 {
        format!("{}:{:02}:{:02}", hours, minutes, seconds)
    } else {
        format!("{}:{:02}", minutes, seconds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize)]
    struct Probe {
        #[serde(default, deserialize_with = "deserialize_lenient_u64")]
        n: u64,
        #[serde(default, deserialize_with = "deserialize_lenient_string")]
        s: String,
    }

    fn probe(json: &str) -> Probe {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_lenient_numbers() {
        assert_eq!(probe(r#"{"n": 1234}"#).n, 1234);
        assert_eq!(probe(r#"{"n": "987"}"#).n, 987);
        assert_eq!(probe(r#"{"n": 12.9}"#).n, 12);
        assert_eq!(probe(r#"{"n": -4}"#).n, 0);
        assert_eq!(probe(r#"{"n": null}"#).n, 0);
        assert_eq!(probe(r#"{"n": "soon"}"#).n, 0);
        assert_eq!(probe(r#"{}"#).n, 0);
    }

    #[test]
    fn test_lenient_strings() {
        assert_eq!(probe(r#"{"s": "flac"}"#).s, "flac");
        assert_eq!(probe(r#"{"s": 24}"#).s, "24");
        assert_eq!(probe(r#"{"s": null}"#).s, "");
        assert_eq!(probe(r#"{"s": [1, 2]}"#).s, "");
    }

    #[test]
    fn test_seconds_to_hms() {
        assert_eq!(seconds_to_hms(0), "0:00");
        assert_eq!(seconds_to_hms(59), "0:59");
        assert_eq!(seconds_to_hms(185), "3:05");
        assert_eq!(seconds_to_hms(3600), "1:00:00");
        assert_eq!(seconds_to_hms(3723), "1:02:03");
    }
}
