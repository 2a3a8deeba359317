//! Query-string decoding for handlers

use std::collections::HashMap;

/// Decode a raw query string into key/value pairs.
///
/// Pairs split on `&`, keys from values on the first `=`. Values get `+` to
/// space and `%XX` decoding; keys are taken verbatim. The last occurrence of
/// a repeated key wins.
pub fn parse_query(query: &str) -> HashMap<String, String> {
    let mut data = HashMap::new();
    if query.is_empty() {
        return data;
    }
    for pair in query.split('&') {
        let (key, value) = match pair.split_once('=') {
            Some((key, value)) => (key, value),
            None => (pair, ""),
        };
        data.insert(key.to_owned(), decode_value(value));
    }
    data
}

fn decode_value(value: &str) -> String {
    let bytes = value.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'+' => {
                out.push(b' ');
                i += 1;
            }
            b'%' if i + 2 < bytes.len() => match (hex_val(bytes[i + 1]), hex_val(bytes[i + 2])) {
                (Some(hi), Some(lo)) => {
                    out.push(hi << 4 | lo);
                    i += 3;
                }
                // a stray percent stays as-is
                _ => {
                    out.push(b'%');
                    i += 1;
                }
            },
            byte => {
                out.push(byte);
                i += 1;
            }
        }
    }
    String::from_utf8_lossy(&out).into_owned()
}

fn hex_val(byte: u8) -> Option<u8> {
    match byte {
        b'0'..=b'9' => Some(byte - b'0'),
        b'a'..=b'f' => Some(byte - b'a' + 10),
        b'A'..=b'F' => Some(byte - b'A' + 10),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_query() {
        assert!(parse_query("").is_empty());
    }

    #[test]
    fn plain_pairs() {
        let query = parse_query("a=1&b=2");
        assert_eq!(query.len(), 2);
        assert_eq!(query["a"], "1");
        assert_eq!(query["b"], "2");
    }

    #[test]
    fn missing_value_and_missing_equals() {
        let query = parse_query("a=&b&c=3");
        assert_eq!(query["a"], "");
        assert_eq!(query["b"], "");
        assert_eq!(query["c"], "3");
    }

    #[test]
    fn values_are_decoded_keys_are_not() {
        let query = parse_query("a+b=c+d&x=1%2B2&%20y=%20z");
        assert_eq!(query["a+b"], "c d");
        assert_eq!(query["x"], "1+2");
        assert_eq!(query["%20y"], " z");
    }

    #[test]
    fn stray_percent_is_literal() {
        let query = parse_query("a=100%&b=%zz");
        assert_eq!(query["a"], "100%");
        assert_eq!(query["b"], "%zz");
    }

    #[test]
    fn last_occurrence_wins() {
        let query = parse_query("a=1&a=2&a=3");
        assert_eq!(query.len(), 1);
        assert_eq!(query["a"], "3");
    }
}
