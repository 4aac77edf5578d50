//! Query-string handling.
//!
//! Parsing follows `application/x-www-form-urlencoded` rules: `+` is a space,
//! percent escapes are decoded as UTF-8, pairs without `=` have an empty
//! value, and a repeated key keeps its last value.

use std::collections::HashMap;

use url::form_urlencoded;

/// Parses a raw query string (without the leading `?`).
pub fn parse_query(query: &str) -> HashMap<String, String> {
    let query = query.strip_prefix('?').unwrap_or(query);
    form_urlencoded::parse(query.as_bytes())
        .filter(|(k, _)| !k.is_empty())
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect()
}

/// Encodes key/value pairs into a query string, keys in sorted order.
pub fn encode_query<'a, I>(pairs: I) -> String
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    let mut pairs: Vec<_> = pairs.into_iter().collect();
    pairs.sort();
    form_urlencoded::Serializer::new(String::new())
        .extend_pairs(pairs)
        .finish()
}
