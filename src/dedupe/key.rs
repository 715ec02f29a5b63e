use std::sync::Arc;

use serde::Serialize;

/// Derives a coalescing key from call arguments, or explains why it cannot.
pub(super) type KeyFn<A> = Arc<dyn Fn(&A) -> Result<String, String> + Send + Sync>;

/// Default key: compact JSON of the arguments.
///
/// Struct fields serialize in declaration order, so equal arguments give equal keys.
pub(super) fn json_key<A: Serialize + 'static>() -> KeyFn<A> {
    Arc::new(|args: &A| serde_json::to_string(args).map_err(|e| e.to_string()))
}

/// Wraps an infallible caller-supplied key function.
pub(super) fn custom_key<A, F>(f: F) -> KeyFn<A>
where
    A: 'static,
    F: Fn(&A) -> String + Send + Sync + 'static,
{
    Arc::new(move |args: &A| Ok(f(args)))
}

pub(super) fn namespaced(prefix: Option<&str>, key: String) -> String {
    match prefix {
        Some(prefix) => format!("{prefix}:{key}"),
        None => key,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[derive(Serialize)]
    struct Lookup {
        user: u32,
        fields: Vec<&'static str>,
    }

    #[test]
    fn test_json_key_is_structural() {
        let key = json_key::<Lookup>();
        let a = key(&Lookup {
            user: 7,
            fields: vec!["name"],
        });
        assert_eq!(a.as_deref(), Ok(r#"{"user":7,"fields":["name"]}"#));
        assert_eq!(json_key::<(u8, &str)>()(&(1, "x")).as_deref(), Ok(r#"[1,"x"]"#));
    }

    #[test]
    fn test_unserializable_arguments_fail() {
        let mut bad = BTreeMap::new();
        bad.insert(vec![1u8], 1u8);
        assert!(json_key::<BTreeMap<Vec<u8>, u8>>()(&bad).is_err());
    }

    #[test]
    fn test_namespacing() {
        assert_eq!(namespaced(Some("users"), "7".into()), "users:7");
        assert_eq!(namespaced(None, "7".into()), "7");
        let key = custom_key(|id: &u32| format!("id-{id}"));
        assert_eq!(key(&3).as_deref(), Ok("id-3"));
    }
}
