use http::HeaderMap;
use indexmap::IndexMap;

/// The shapes a caller is allowed to hand the mediator as request headers.
/// `normalize_headers` collapses all three into the one persisted shape:
/// an order-preserving name→value map with names cased as given.
#[derive(Debug, Clone)]
pub enum HeaderInput {
    Pairs(Vec<(String, String)>),
    Map(IndexMap<String, String>),
    Platform(HeaderMap),
}

pub fn normalize_headers(input: HeaderInput) -> IndexMap<String, String> {
    match input {
        HeaderInput::Pairs(pairs) => pairs.into_iter().collect(),
        HeaderInput::Map(map) => map,
        HeaderInput::Platform(map) => map
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|value| (name.as_str().to_string(), value.to_string()))
            })
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pairs_preserve_insertion_order() {
        let headers = normalize_headers(HeaderInput::Pairs(vec![
            ("X-B".to_string(), "2".to_string()),
            ("X-A".to_string(), "1".to_string()),
        ]));
        assert_eq!(
            headers.keys().collect::<Vec<_>>(),
            vec!["X-B", "X-A"],
            "insertion order, not sorted"
        );
    }

    #[test]
    fn platform_headers_convert_to_map() {
        let mut platform = HeaderMap::new();
        platform.insert(
            http::header::CONTENT_TYPE,
            "application/json".parse().unwrap(),
        );
        let headers = normalize_headers(HeaderInput::Platform(platform));
        assert_eq!(
            headers.get("content-type").map(String::as_str),
            Some("application/json")
        );
    }
}
