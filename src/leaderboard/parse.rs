//! Extraction of the streamed JSON payload embedded in the leaderboard
//! site's server-rendered HTML.
//!
//! The framing is `self.__next_f.push([1, "<escaped-json>"])`: a React
//! Server Components streaming chunk where the pushed string is itself a
//! JS string literal of the form `<index>:<json-array>`. JS string escaping
//! and JSON string escaping agree on the escapes this framing actually
//! uses (`\"`, `\\`, `\n`, `\uXXXX`), so re-parsing the captured text as a
//! quoted JSON string is enough to unescape it.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

static PUSH_FRAMING: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"self\.__next_f\.push\(\[1,\s*"((?:[^"\\]|\\.)*)"\]\)"#)
        .expect("static regex is valid")
});

/// Pull every `<index>:<json-array>` chunk out of a page's HTML.
fn streamed_chunks(html: &str) -> Vec<Value> {
    let mut chunks = Vec::new();
    for cap in PUSH_FRAMING.captures_iter(html) {
        let escaped = &cap[1];
        let unescaped = match serde_json::from_str::<String>(&format!("\"{escaped}\"")) {
            Ok(s) => s,
            Err(_) => continue,
        };
        let Some(colon) = unescaped.find(':') else {
            continue;
        };
        let (_, json_part) = unescaped.split_at(colon);
        let json_part = &json_part[1..]; // drop the leading ':'
        if let Ok(value) = serde_json::from_str::<Value>(json_part) {
            chunks.push(value);
        }
    }
    chunks
}

/// Find the chunk whose root is an array with the leaderboard payload as
/// its 4th element (index 3), matching the requested `game_id` either at
/// the payload root or inside its data rows.
pub fn extract_payload(html: &str, game_id: u64) -> Option<Value> {
    for chunk in streamed_chunks(html) {
        let Some(array) = chunk.as_array() else {
            continue;
        };
        let Some(candidate) = array.get(3) else {
            continue;
        };
        if !candidate.is_object() {
            continue;
        }
        if payload_matches(candidate, game_id) {
            return Some(candidate.clone());
        }
    }
    None
}

fn payload_matches(payload: &Value, game_id: u64) -> bool {
    if value_as_u64(&payload["gameId"]) == Some(game_id) {
        return true;
    }
    let rows_mention_game_id = |rows: &str| {
        payload[rows]
            .as_array()
            .map(|arr| {
                arr.iter()
                    .any(|row| value_as_u64(&row["gameId"]) == Some(game_id))
            })
            .unwrap_or(false)
    };
    rows_mention_game_id("scoreData") || rows_mention_game_id("transactionData")
}

fn value_as_u64(v: &Value) -> Option<u64> {
    match v {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_matching_payload_from_push_framing() {
        let inner = r#"0:[\"$\",\"div\",null,{\"gameId\":64,\"gameName\":\"Arena\",\"lastUpdated\":\"2026-01-01\",\"scorePagination\":{\"totalPages\":2},\"transactionPagination\":{\"totalPages\":1},\"scoreData\":[{\"userId\":1,\"walletAddress\":\"0xabc\",\"score\":10,\"rank\":1}],\"transactionData\":[]}]"#;
        let html = format!(r#"<script>self.__next_f.push([1, "{inner}"])</script>"#);

        let payload = extract_payload(&html, 64).expect("payload should be found");
        assert_eq!(payload["gameName"], "Arena");
        assert_eq!(payload["scoreData"][0]["score"], 10);
    }

    #[test]
    fn returns_none_when_game_id_does_not_match() {
        let inner = r#"0:[\"$\",\"div\",null,{\"gameId\":1,\"scoreData\":[],\"transactionData\":[]}]"#;
        let html = format!(r#"<script>self.__next_f.push([1, "{inner}"])</script>"#);
        assert!(extract_payload(&html, 64).is_none());
    }
}
