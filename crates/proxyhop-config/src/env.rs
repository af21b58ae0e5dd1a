//! Snapshot of the proxy-related environment
//!
//! The process environment is read once, when an agent is built. Everything
//! after that works from this value, so request handling never touches
//! global state.

/// Names of the variables an agent cares about, compared case-insensitively
const TRACKED: [&str; 3] = ["http_proxy", "https_proxy", "no_proxy"];

/// Lookup order for the upstream proxy. The https variables win regardless of
/// the destination's own scheme.
const PROXY_VARS: [&str; 4] = ["https_proxy", "HTTPS_PROXY", "http_proxy", "HTTP_PROXY"];

/// Proxy-related environment variables captured at a single point in time
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProxyEnv {
    vars: Vec<(String, String)>,
}

impl ProxyEnv {
    /// An empty environment
    pub fn empty() -> Self {
        Self::default()
    }

    /// Capture the current process environment
    pub fn from_process() -> Self {
        Self::from_vars(std::env::vars())
    }

    /// Build a snapshot from explicit name/value pairs.
    /// Variables unrelated to proxying are dropped.
    pub fn from_vars<I, K, V>(vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let vars = vars
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .filter(|(k, _)| TRACKED.iter().any(|t| t.eq_ignore_ascii_case(k)))
            .collect();

        Self { vars }
    }

    /// Value of the variable with exactly this name, if set and non-empty
    pub fn get(&self, name: &str) -> Option<&str> {
        self.vars
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
            .filter(|v| !v.is_empty())
    }

    /// The proxy URL from `https_proxy`, `HTTPS_PROXY`, `http_proxy` or `HTTP_PROXY`
    pub fn proxy(&self) -> Option<&str> {
        PROXY_VARS.iter().find_map(|name| self.get(name))
    }

    /// The exception list from `NO_PROXY`, then `no_proxy`, then any other casing
    pub fn no_proxy(&self) -> Option<&str> {
        self.get("NO_PROXY").or_else(|| self.get("no_proxy")).or_else(|| {
            self.vars
                .iter()
                .find(|(k, v)| k.eq_ignore_ascii_case("no_proxy") && !v.is_empty())
                .map(|(_, v)| v.as_str())
        })
    }
}
