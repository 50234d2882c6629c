//! Ambient location context read by `url()` in expressions.
use std::collections::BTreeMap;

use log::warn;
use serde::{Deserialize, Serialize};
use surfprop::value::Value;
use url::{ParseError, Url};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UrlContext {
    /// Query string parameters.
    pub query: BTreeMap<String, String>,
    /// Route parameters.
    pub params: BTreeMap<String, String>,
    /// Fixed fields such as `href`, `host`, `pathname` or `hash`.
    pub fields: BTreeMap<String, String>,
}

impl UrlContext {
    /// Build a context from a location string.
    ///
    /// ```rust
    /// # use surfcore::base::url::UrlContext;
    /// # use surfprop::value::Value;
    /// let url = UrlContext::from_url("http://desk.local:8080/show/a?scene=2&name=Main+Mix#top");
    /// assert_eq!(url.lookup("query.scene"), Some(Value::from("2")));
    /// assert_eq!(url.lookup("query.name"), Some(Value::from("Main Mix")));
    /// assert_eq!(url.lookup("host"), Some(Value::from("desk.local:8080")));
    /// assert_eq!(url.lookup("pathname"), Some(Value::from("/show/a")));
    /// ```
    pub fn from_url(url: &str) -> Self {
        let mut ctx = UrlContext::default();
        ctx.fields.insert("href".into(), url.to_string());

        // Relative locations are read against a placeholder origin that is
        // never recorded.
        let (parsed, absolute) = match Url::parse(url) {
            Ok(parsed) => (parsed, true),
            Err(ParseError::RelativeUrlWithoutBase) => {
                match Url::parse("http://localhost/").and_then(|base| base.join(url)) {
                    Ok(parsed) => (parsed, false),
                    Err(error) => {
                        warn!("Ignoring malformed location `{}`: {}", url, error);
                        return ctx;
                    }
                }
            }
            Err(error) => {
                warn!("Ignoring malformed location `{}`: {}", url, error);
                return ctx;
            }
        };

        if absolute {
            ctx.fields.insert("protocol".into(), format!("{}:", parsed.scheme()));
            if let Some(host) = parsed.host_str() {
                let host = match parsed.port() {
                    Some(port) => format!("{host}:{port}"),
                    None => host.to_string(),
                };
                ctx.fields.insert("host".into(), host);
            }
        }
        ctx.fields.insert("pathname".into(), parsed.path().to_string());
        if let Some(hash) = parsed.fragment() {
            ctx.fields.insert("hash".into(), format!("#{hash}"));
        }
        ctx.query = parsed.query_pairs().into_owned().collect();
        ctx
    }

    /// Look up a dotted key: `query.<name>`, `params.<name>` or a field name.
    pub fn lookup(&self, key: &str) -> Option<Value> {
        let value = match key.split_once('.') {
            Some(("query", name)) => self.query.get(name),
            Some(("params", name)) => self.params.get(name),
            _ => self.fields.get(key),
        };
        value.map(|v| Value::Str(v.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_keys_are_none() {
        let url = UrlContext::from_url("/local?x=1");
        assert_eq!(url.lookup("query.y"), None);
        assert_eq!(url.lookup("params.x"), None);
        assert_eq!(url.lookup("pathname"), Some(Value::from("/local")));
    }

    #[test]
    fn query_values_are_decoded() {
        let url = UrlContext::from_url("/?label=a%20b%2Fc&mix=Main+Mix&empty");
        assert_eq!(url.lookup("query.label"), Some(Value::from("a b/c")));
        assert_eq!(url.lookup("query.mix"), Some(Value::from("Main Mix")));
        assert_eq!(url.lookup("query.empty"), Some(Value::from("")));
    }

    #[test]
    fn relative_locations_have_no_origin() {
        let url = UrlContext::from_url("/show?bank=2#top");
        assert_eq!(url.lookup("host"), None);
        assert_eq!(url.lookup("protocol"), None);
        assert_eq!(url.lookup("hash"), Some(Value::from("#top")));
        assert_eq!(url.lookup("href"), Some(Value::from("/show?bank=2#top")));
    }
}
