//! Parameter normalization, flattening and ordering
//!
//! Produces the exact parameter string the server rebuilds when it verifies a
//! signature. Every key and scalar value is treated as possibly already
//! percent-encoded: it is decoded once and re-encoded with the strict RFC 3986
//! unreserved set, so `a%20b` and `a b` normalize to the same bytes.
//!
//! Nested maps flatten to `parent[child]` keys (recursively, so depth three
//! gives `a[b][c]`). Pairs are sorted by key, ties broken by the whole
//! `key=value` pair, then each pair is percent-encoded again and joined with
//! `%26`. That second encoding is what the signature base string embeds.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;

use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, percent_decode_str};

use crate::error::{Error, Result};

/// Everything except `A-Z a-z 0-9 - . _ ~` is escaped.
const RFC3986: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

/// Strict RFC 3986 encoding. Space becomes `%20`, never `+`.
pub fn percent_encode(input: &str) -> String {
    encode_bytes(input.as_bytes())
}

fn encode_bytes(bytes: &[u8]) -> String {
    percent_encoding::percent_encode(bytes, RFC3986).to_string()
}

/// Decode `%XX` escapes. `+` is left alone; invalid UTF-8 is replaced.
///
/// Signing goes through `normalize`, which keeps the raw bytes instead.
pub fn percent_decode(input: &str) -> String {
    percent_decode_str(input).decode_utf8_lossy().into_owned()
}

/// Decode once, then re-encode the decoded bytes. Idempotent.
pub fn normalize(input: &str) -> String {
    let bytes: Vec<u8> = percent_decode_str(input).collect();
    encode_bytes(&bytes)
}

/// Normalize one key/value pair.
pub fn normalize_pair(key: &str, value: &str) -> (String, String) {
    (normalize(key), normalize(value))
}

/// A parameter value: a scalar string or a nested map.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParamValue {
    Scalar(String),
    Nested(Params),
}

impl ParamValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            ParamValue::Scalar(s) => Some(s),
            ParamValue::Nested(_) => None,
        }
    }
}

impl From<&str> for ParamValue {
    fn from(value: &str) -> Self {
        ParamValue::Scalar(value.to_owned())
    }
}

impl From<String> for ParamValue {
    fn from(value: String) -> Self {
        ParamValue::Scalar(value)
    }
}

impl From<&String> for ParamValue {
    fn from(value: &String) -> Self {
        ParamValue::Scalar(value.clone())
    }
}

impl From<Params> for ParamValue {
    fn from(value: Params) -> Self {
        ParamValue::Nested(value)
    }
}

/// Ordered parameter map, possibly nested.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Params(BTreeMap<String, ParamValue>);

impl Params {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<ParamValue>) -> Option<ParamValue> {
        self.0.insert(key.into(), value.into())
    }

    /// Insert only when the key is not already present.
    pub fn insert_if_absent(&mut self, key: impl Into<String>, value: impl Into<ParamValue>) {
        self.0.entry(key.into()).or_insert_with(|| value.into());
    }

    pub fn get(&self, key: &str) -> Option<&ParamValue> {
        self.0.get(key)
    }

    /// Scalar value for `key`, if present and not nested.
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(ParamValue::as_str)
    }

    pub fn remove(&mut self, key: &str) -> Option<ParamValue> {
        self.0.remove(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &ParamValue)> {
        self.0.iter()
    }

    /// Copy entries from `other` whose keys are not present yet.
    pub fn merge_missing(&mut self, other: Params) {
        for (key, value) in other.0 {
            self.0.entry(key).or_insert(value);
        }
    }

    /// Entries whose key satisfies `keep`.
    pub fn filtered(&self, keep: impl Fn(&str) -> bool) -> Params {
        Params(
            self.0
                .iter()
                .filter(|(key, _)| keep(key))
                .map(|(key, value)| (key.clone(), value.clone()))
                .collect(),
        )
    }

    /// Convert a JSON document into parameters.
    ///
    /// Objects and arrays become nested maps (arrays keyed `0`, `1`, ...),
    /// booleans become `1`/`0`, null becomes the empty string.
    pub fn from_json(value: &serde_json::Value) -> Params {
        let mut params = Params::new();
        match value {
            serde_json::Value::Object(map) => {
                for (key, child) in map {
                    params.insert(key.clone(), json_param(child));
                }
            }
            serde_json::Value::Array(items) => {
                for (index, child) in items.iter().enumerate() {
                    params.insert(index.to_string(), json_param(child));
                }
            }
            _ => {}
        }
        params
    }
}

fn json_param(value: &serde_json::Value) -> ParamValue {
    match value {
        serde_json::Value::Object(_) | serde_json::Value::Array(_) => {
            ParamValue::Nested(Params::from_json(value))
        }
        serde_json::Value::String(s) => ParamValue::Scalar(s.clone()),
        serde_json::Value::Bool(true) => ParamValue::Scalar("1".into()),
        serde_json::Value::Bool(false) => ParamValue::Scalar("0".into()),
        serde_json::Value::Null => ParamValue::Scalar(String::new()),
        serde_json::Value::Number(n) => ParamValue::Scalar(n.to_string()),
    }
}

impl<K: Into<String>, V: Into<ParamValue>> FromIterator<(K, V)> for Params {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Params(
            iter.into_iter()
                .map(|(key, value)| (key.into(), value.into()))
                .collect(),
        )
    }
}

/// Recursively normalize every key and scalar value.
///
/// Keys that collide after normalization keep the value that sorts last in
/// the source map; `flatten` keeps both and should be preferred for signing.
pub fn normalize_params(params: &Params) -> Params {
    params
        .iter()
        .map(|(key, value)| {
            let value = match value {
                ParamValue::Scalar(s) => ParamValue::Scalar(normalize(s)),
                ParamValue::Nested(children) => ParamValue::Nested(normalize_params(children)),
            };
            (normalize(key), value)
        })
        .collect()
}

/// One flattened, normalized `key=value` pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pair {
    pub key: String,
    pub value: String,
}

impl fmt::Display for Pair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.key, self.value)
    }
}

/// Flatten nested parameters into normalized pairs. Order is unspecified.
pub fn flatten(params: &Params) -> Vec<Pair> {
    let mut pairs = Vec::new();
    flatten_into(params, None, &mut pairs);
    pairs
}

fn flatten_into(params: &Params, prefix: Option<&str>, out: &mut Vec<Pair>) {
    for (key, value) in params.iter() {
        let key = match prefix {
            Some(prefix) => format!("{prefix}[{}]", normalize(key)),
            None => normalize(key),
        };
        match value {
            ParamValue::Scalar(v) => out.push(Pair {
                key,
                value: normalize(v),
            }),
            ParamValue::Nested(children) => flatten_into(children, Some(&key), out),
        }
    }
}

fn compare_pairs(a: &Pair, b: &Pair) -> Ordering {
    a.key
        .as_bytes()
        .cmp(b.key.as_bytes())
        .then_with(|| a.to_string().cmp(&b.to_string()))
}

/// Sort pairs by key, then by the full pair.
pub fn sort_pairs(mut pairs: Vec<Pair>) -> Result<Vec<Pair>> {
    pairs.sort_by(compare_pairs);
    if pairs
        .windows(2)
        .any(|w| compare_pairs(&w[0], &w[1]) == Ordering::Greater)
    {
        return Err(Error::SignatureSortFailure);
    }
    Ok(pairs)
}

/// Sort, encode each pair a second time and join with `%26`.
pub fn join(pairs: Vec<Pair>) -> Result<String> {
    let encoded: Vec<String> = sort_pairs(pairs)?
        .iter()
        .map(|pair| percent_encode(&pair.to_string()))
        .collect();
    Ok(encoded.join("%26"))
}

/// Canonical parameter string for the signature base string.
pub fn parameter_string(params: &Params) -> Result<String> {
    join(flatten(params))
}

/// `application/x-www-form-urlencoded` body.
///
/// Keys and values are already normalized; only the structural brackets
/// introduced by flattening still need escaping.
pub fn form_body(params: &Params) -> Result<String> {
    let rendered: Vec<String> = sort_pairs(flatten(params))?
        .iter()
        .map(|pair| {
            format!(
                "{}={}",
                pair.key.replace('[', "%5B").replace(']', "%5D"),
                pair.value
            )
        })
        .collect();
    Ok(rendered.join("&"))
}

/// Query string without the leading `?`. Same rendering as a form body.
pub fn query_string(params: &Params) -> Result<String> {
    form_body(params)
}

/// Decode a form body or query string into parameters.
///
/// Bracketed keys rebuild nested maps; an empty segment (`tags[]`) appends
/// under the next numeric index.
pub fn parse_form(input: &str) -> Params {
    let mut params = Params::new();
    let input = input.strip_prefix('?').unwrap_or(input);
    for (key, value) in url::form_urlencoded::parse(input.as_bytes()) {
        if key.is_empty() {
            continue;
        }
        insert_path(&mut params, &key_path(&key), value.into_owned());
    }
    params
}

fn key_path(key: &str) -> Vec<String> {
    match key.find('[') {
        Some(open) if open > 0 && key.ends_with(']') => {
            let mut segments = vec![key[..open].to_owned()];
            segments.extend(
                key[open + 1..key.len() - 1]
                    .split("][")
                    .map(str::to_owned),
            );
            segments
        }
        _ => vec![key.to_owned()],
    }
}

fn insert_path(params: &mut Params, path: &[String], value: String) {
    let Some((first, rest)) = path.split_first() else {
        return;
    };
    let key = if first.is_empty() {
        params.len().to_string()
    } else {
        first.clone()
    };
    if rest.is_empty() {
        params.insert(key, value);
        return;
    }
    let entry = params
        .0
        .entry(key)
        .or_insert_with(|| ParamValue::Nested(Params::new()));
    if let ParamValue::Scalar(_) = entry {
        *entry = ParamValue::Nested(Params::new());
    }
    if let ParamValue::Nested(children) = entry {
        insert_path(children, rest, value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn nested_fixture() -> Params {
        let mut meta = Params::new();
        meta.insert("color", "dark blue");
        meta.insert("size[x]", "10%");
        let mut data = Params::new();
        data.insert("title", "Hello JSON World!");
        data.insert("meta", meta);
        let mut params = Params::new();
        params.insert("data", data);
        params.insert("oauth_token", "abc");
        params.insert("a+b", "c%20d");
        params
    }

    #[test]
    fn encodes_with_rfc3986_unreserved_set() {
        assert_eq!(percent_encode("AZaz09-._~"), "AZaz09-._~");
        assert_eq!(percent_encode("a b"), "a%20b");
        assert_eq!(percent_encode("a+b"), "a%2Bb");
        assert_eq!(percent_encode("="), "%3D");
        assert_eq!(percent_encode("ü"), "%C3%BC");
        assert_eq!(percent_encode("*'()!"), "%2A%27%28%29%21");
    }

    #[test]
    fn normalize_decodes_before_encoding() {
        assert_eq!(normalize("a%20b"), "a%20b");
        assert_eq!(normalize("a b"), "a%20b");
        assert_eq!(normalize("%7E"), "~");
        assert_eq!(normalize("%3a"), "%3A");
        // `+` is a literal plus, not a form-encoded space.
        assert_eq!(normalize("a+b"), "a%2Bb");
        assert_eq!(
            normalize_pair("c@", "%3D"),
            ("c%40".to_string(), "%3D".to_string())
        );
    }

    #[test]
    fn normalize_keeps_non_utf8_escapes() {
        assert_eq!(normalize("%FF"), "%FF");
        assert_eq!(normalize("a%FFb%fe"), "a%FFb%FE");
        assert_eq!(normalize("%C3"), "%C3");
        assert_eq!(normalize("%C3%BC"), "%C3%BC");
        assert_eq!(normalize("ü"), "%C3%BC");
    }

    #[test]
    fn normalize_is_idempotent() {
        for input in ["a b", "a%20b", "100%", "%zz", "ü/?&=", "%C3", "+~"] {
            let once = normalize(input);
            assert_eq!(normalize(&once), once, "input: {input:?}");
        }

        let params = nested_fixture();
        let once = normalize_params(&params);
        let twice = normalize_params(&once);
        assert_eq!(once, twice);
        assert_eq!(
            parameter_string(&once).unwrap(),
            parameter_string(&params).unwrap()
        );
    }

    #[test]
    fn flatten_accumulates_key_prefixes() {
        let mut pairs: Vec<String> = flatten(&nested_fixture())
            .iter()
            .map(Pair::to_string)
            .collect();
        pairs.sort();
        assert_eq!(
            pairs,
            vec![
                "a%2Bb=c%20d",
                "data[meta][color]=dark%20blue",
                "data[meta][size%5Bx%5D]=10%25",
                "data[title]=Hello%20JSON%20World%21",
                "oauth_token=abc",
            ]
        );
    }

    #[test]
    fn empty_nested_map_contributes_nothing() {
        let mut params = Params::new();
        params.insert("empty", Params::new());
        params.insert("k", "v");
        assert_eq!(parameter_string(&params).unwrap(), "k%3Dv");
    }

    #[test]
    fn join_double_encodes_pairs() {
        let params: Params = [("b", "2"), ("a", "x y")].into_iter().collect();
        assert_eq!(parameter_string(&params).unwrap(), "a%3Dx%2520y%26b%3D2");
    }

    #[test]
    fn sorts_by_key_before_value() {
        let params: Params = [("a1", "0"), ("a", "9"), ("b", "1")].into_iter().collect();
        let sorted: Vec<String> = sort_pairs(flatten(&params))
            .unwrap()
            .iter()
            .map(Pair::to_string)
            .collect();
        assert_eq!(sorted, vec!["a=9", "a1=0", "b=1"]);
    }

    #[test]
    fn keys_colliding_after_normalization_sort_by_value() {
        let params: Params = [("a b", "2"), ("a%20b", "1")].into_iter().collect();
        let sorted: Vec<String> = sort_pairs(flatten(&params))
            .unwrap()
            .iter()
            .map(Pair::to_string)
            .collect();
        assert_eq!(sorted, vec!["a%20b=1", "a%20b=2"]);
    }

    #[test]
    fn form_body_escapes_structural_brackets() {
        let mut data = Params::new();
        data.insert("title", "Hi there");
        let mut params = Params::new();
        params.insert("data", data);
        params.insert("x", "1+1");
        assert_eq!(form_body(&params).unwrap(), "data%5Btitle%5D=Hi%20there&x=1%2B1");
    }

    #[test]
    fn parse_form_rebuilds_nested_maps() {
        let params = parse_form("data%5Btitle%5D=Hi+there&data[tags][]=a&data[tags][]=b&flag");
        let Some(ParamValue::Nested(data)) = params.get("data") else {
            panic!("data should be nested: {params:?}");
        };
        assert_eq!(data.get_str("title"), Some("Hi there"));
        let Some(ParamValue::Nested(tags)) = data.get("tags") else {
            panic!("tags should be nested: {data:?}");
        };
        assert_eq!(tags.get_str("0"), Some("a"));
        assert_eq!(tags.get_str("1"), Some("b"));
        assert_eq!(params.get_str("flag"), Some(""));
    }

    #[test]
    fn parse_form_then_encode_preserves_pairs() {
        let body = "data%5Btitle%5D=Hi%20there&x=1%2B1";
        assert_eq!(form_body(&parse_form(body)).unwrap(), body);
    }

    #[test]
    fn from_json_maps_scalars_and_nesting() {
        let value = serde_json::json!({
            "title": "Hello",
            "sticky": true,
            "menu_order": 3,
            "excerpt": null,
            "tags": [4, 7],
        });
        let params = Params::from_json(&value);
        assert_eq!(params.get_str("title"), Some("Hello"));
        assert_eq!(params.get_str("sticky"), Some("1"));
        assert_eq!(params.get_str("menu_order"), Some("3"));
        assert_eq!(params.get_str("excerpt"), Some(""));
        assert_eq!(
            parameter_string(&params.filtered(|k| k == "tags")).unwrap(),
            "tags%5B0%5D%3D4%26tags%5B1%5D%3D7"
        );
    }
}
