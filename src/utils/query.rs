//! Query strings with bracketed keys for nested parameters:
//! `facets[tag_name][]=chill&page=1`.

use serde_json::Value;
use url::form_urlencoded::Serializer;

pub fn encode_query(params: &Value) -> String {
    let mut serializer = Serializer::new(String::new());

    match params {
        Value::Object(map) => {
            for (key, value) in map {
                append(&mut serializer, key, value);
            }
        }
        Value::Null => {}
        other => {
            // A bare scalar has no key to hang on; nothing sensible to emit.
            log::debug!("Ignoring non-object query parameters: {other}");
        }
    }

    serializer.finish()
}

fn append(serializer: &mut Serializer<'_, String>, key: &str, value: &Value) {
    match value {
        Value::Null => {}
        Value::Bool(b) => {
            serializer.append_pair(key, if *b { "true" } else { "false" });
        }
        Value::Number(n) => {
            serializer.append_pair(key, &n.to_string());
        }
        Value::String(s) => {
            serializer.append_pair(key, s);
        }
        Value::Array(items) => {
            let nested = format!("{key}[]");
            for item in items {
                append(serializer, &nested, item);
            }
        }
        Value::Object(map) => {
            for (sub, item) in map {
                append(serializer, &format!("{key}[{sub}]"), item);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn decoded(query: &str) -> Vec<(String, String)> {
        url::form_urlencoded::parse(query.as_bytes())
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect()
    }

    #[test]
    fn test_flat_parameters() {
        let query = encode_query(&json!({ "page": 2, "tune_in": true, "audio_token": "a b" }));
        let pairs = decoded(&query);
        assert!(pairs.contains(&("page".into(), "2".into())));
        assert!(pairs.contains(&("tune_in".into(), "true".into())));
        assert!(pairs.contains(&("audio_token".into(), "a b".into())));
    }

    #[test]
    fn test_nested_objects_and_arrays_use_brackets() {
        let query = encode_query(&json!({
            "facets": { "tag_name": ["chill", "deep house"] },
            "per_page": 10
        }));
        let pairs = decoded(&query);
        assert_eq!(
            pairs,
            vec![
                ("facets[tag_name][]".to_string(), "chill".to_string()),
                ("facets[tag_name][]".to_string(), "deep house".to_string()),
                ("per_page".to_string(), "10".to_string()),
            ]
        );
    }

    #[test]
    fn test_nulls_are_skipped() {
        assert_eq!(encode_query(&json!({ "a": null })), "");
        assert_eq!(encode_query(&Value::Null), "");
    }
}
