//! # Identity Matchers
//!
//! A matcher decides whether a registered candidate identity serves a
//! requested identity better than the best candidate found so far.
//! It is called once per candidate, in registration order, and must
//! only accept a candidate that is at least as specific as the current
//! best. Later candidates win ties.

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use super::identity::{ConsumerIdentity, ID_TYPE};

/// Specificity-ranking predicate for consumer identities
pub trait IdentityMatcher: Send + Sync {
    fn matches(
        &self,
        requested: &ConsumerIdentity,
        current: Option<&ConsumerIdentity>,
        candidate: &ConsumerIdentity,
    ) -> bool;
}

impl<F> IdentityMatcher for F
where
    F: Fn(&ConsumerIdentity, Option<&ConsumerIdentity>, &ConsumerIdentity) -> bool + Send + Sync,
{
    fn matches(
        &self,
        requested: &ConsumerIdentity,
        current: Option<&ConsumerIdentity>,
        candidate: &ConsumerIdentity,
    ) -> bool {
        self(requested, current, candidate)
    }
}

/// Accept only candidates equal to the requested identity
pub fn complete_match(
    requested: &ConsumerIdentity,
    _current: Option<&ConsumerIdentity>,
    candidate: &ConsumerIdentity,
) -> bool {
    requested == candidate
}

/// Never accept a candidate
pub fn no_match(
    _requested: &ConsumerIdentity,
    _current: Option<&ConsumerIdentity>,
    _candidate: &ConsumerIdentity,
) -> bool {
    false
}

/// Accept candidates whose attributes all equal those of the request,
/// preferring candidates with more attributes
pub fn partial_match(
    requested: &ConsumerIdentity,
    current: Option<&ConsumerIdentity>,
    candidate: &ConsumerIdentity,
) -> bool {
    SpecificityMatcher::new().matches(requested, current, candidate)
}

/// Comparison applied to a single identity attribute
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttributeRule {
    /// Values must be equal
    Exact,
    /// The candidate value must be a path prefix of the requested value
    PathPrefix,
}

/// Ranking of a matching candidate: matched attributes, then matched prefix length
type Score = (usize, usize);

/// Common primitive of the partial matchers.
///
/// A candidate matches if each of its attributes is satisfied by the
/// request according to the attribute's rule (default: exact). Matching
/// candidates are ranked by the number of attributes they constrain and
/// then by the length of matched path prefixes.
#[derive(Debug, Clone, Default)]
pub struct SpecificityMatcher {
    consumer_type: Option<String>,
    candidate_types: Vec<String>,
    rules: BTreeMap<String, AttributeRule>,
}

impl SpecificityMatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Restrict the matcher to requests of the given consumer type
    pub fn for_type(consumer_type: impl Into<String>) -> Self {
        Self {
            consumer_type: Some(consumer_type.into()),
            ..Self::default()
        }
    }

    /// Additionally accept candidates of another consumer type
    pub fn accepting(mut self, candidate_type: impl Into<String>) -> Self {
        self.candidate_types.push(candidate_type.into());
        self
    }

    pub fn with_rule(mut self, attribute: impl Into<String>, rule: AttributeRule) -> Self {
        self.rules.insert(attribute.into(), rule);
        self
    }

    fn score(&self, requested: &ConsumerIdentity, candidate: &ConsumerIdentity) -> Option<Score> {
        let mut attrs = 0;
        let mut prefix = 0;
        for (name, value) in candidate.iter() {
            if name == ID_TYPE && self.consumer_type.is_some() {
                attrs += 1;
                continue;
            }
            let rule = self.rules.get(name).copied().unwrap_or(AttributeRule::Exact);
            match rule {
                AttributeRule::Exact => {
                    if requested.get(name) != Some(value.as_str()) {
                        return None;
                    }
                }
                AttributeRule::PathPrefix => {
                    let req = requested.get(name).unwrap_or_default();
                    if !is_path_prefix(value, req) {
                        return None;
                    }
                    prefix += value.trim_matches('/').len();
                }
            }
            attrs += 1;
        }
        Some((attrs, prefix))
    }
}

impl IdentityMatcher for SpecificityMatcher {
    fn matches(
        &self,
        requested: &ConsumerIdentity,
        current: Option<&ConsumerIdentity>,
        candidate: &ConsumerIdentity,
    ) -> bool {
        if let Some(t) = &self.consumer_type {
            let candidate_type = candidate.get_type();
            if requested.get_type() != t
                || (candidate_type != t && !self.candidate_types.iter().any(|c| c == candidate_type))
            {
                return false;
            }
        }
        let candidate_score = match self.score(requested, candidate) {
            Some(s) => s,
            None => return false,
        };
        match current.and_then(|c| self.score(requested, c)) {
            Some(current_score) => candidate_score >= current_score,
            None => true,
        }
    }
}

/// Whether `prefix` selects `path` segment-wise
pub fn is_path_prefix(prefix: &str, path: &str) -> bool {
    let prefix = prefix.trim_matches('/');
    let path = path.trim_matches('/');
    if prefix.is_empty() || prefix == path {
        return true;
    }
    path.starts_with(prefix) && path[prefix.len()..].starts_with('/')
}

/// Identity attributes of the host/path family
pub mod hostpath {
    use super::{AttributeRule, SpecificityMatcher};

    /// Generic consumer type accepted by every host/path matcher
    pub const IDENTITY_TYPE: &str = "hostpath";

    pub const ID_HOSTNAME: &str = "hostname";
    pub const ID_PORT: &str = "port";
    pub const ID_SCHEME: &str = "scheme";
    pub const ID_PATHPREFIX: &str = "pathprefix";

    /// Matcher for host, port, scheme and path prefix based identities.
    ///
    /// Candidates of the generic `hostpath` type are accepted as well.
    pub fn matcher(consumer_type: &str) -> SpecificityMatcher {
        let m = SpecificityMatcher::for_type(consumer_type)
            .with_rule(ID_PATHPREFIX, AttributeRule::PathPrefix);
        if consumer_type == IDENTITY_TYPE {
            m
        } else {
            m.accepting(IDENTITY_TYPE)
        }
    }
}

/// Registry of matchers by consumer type, with base delegation
#[derive(Default)]
pub struct IdentityMatcherRegistry {
    base: Option<Arc<IdentityMatcherRegistry>>,
    matchers: RwLock<BTreeMap<String, MatcherEntry>>,
}

#[derive(Clone)]
struct MatcherEntry {
    matcher: Arc<dyn IdentityMatcher>,
    description: String,
}

impl IdentityMatcherRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A new empty registry delegating to this one
    pub fn derive(self: &Arc<Self>) -> Self {
        Self {
            base: Some(Arc::clone(self)),
            matchers: RwLock::new(BTreeMap::new()),
        }
    }

    /// A detached copy of all registered matchers
    pub fn snapshot(&self) -> Self {
        let mut all = BTreeMap::new();
        self.collect(&mut all);
        Self {
            base: None,
            matchers: RwLock::new(all),
        }
    }

    fn collect(&self, all: &mut BTreeMap<String, MatcherEntry>) {
        if let Some(b) = &self.base {
            b.collect(all);
        }
        if let Ok(m) = self.matchers.read() {
            for (k, v) in m.iter() {
                all.insert(k.clone(), v.clone());
            }
        }
    }

    pub fn register(
        &self,
        consumer_type: impl Into<String>,
        matcher: Arc<dyn IdentityMatcher>,
        description: impl Into<String>,
    ) {
        if let Ok(mut m) = self.matchers.write() {
            m.insert(
                consumer_type.into(),
                MatcherEntry {
                    matcher,
                    description: description.into(),
                },
            );
        }
    }

    pub fn get(&self, consumer_type: &str) -> Option<Arc<dyn IdentityMatcher>> {
        let local = self
            .matchers
            .read()
            .ok()
            .and_then(|m| m.get(consumer_type).map(|e| Arc::clone(&e.matcher)));
        local.or_else(|| self.base.as_ref().and_then(|b| b.get(consumer_type)))
    }

    /// Matcher for the type of the requested identity, partial match otherwise
    pub fn matcher_for(&self, requested: &ConsumerIdentity) -> Arc<dyn IdentityMatcher> {
        self.get(requested.get(ID_TYPE).unwrap_or_default())
            .unwrap_or_else(|| Arc::new(partial_match) as Arc<dyn IdentityMatcher>)
    }

    /// Registered consumer types with their descriptions
    pub fn list(&self) -> Vec<(String, String)> {
        let mut all = BTreeMap::new();
        self.collect(&mut all);
        all.into_iter().map(|(k, v)| (k, v.description)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::hostpath::*;
    use super::*;

    fn id(attrs: &[(&str, &str)]) -> ConsumerIdentity {
        attrs.iter().copied().collect()
    }

    /// Run a matcher over candidates the way providers do
    fn best<'a>(
        m: &dyn IdentityMatcher,
        req: &ConsumerIdentity,
        candidates: &'a [ConsumerIdentity],
    ) -> Option<&'a ConsumerIdentity> {
        let mut cur: Option<&ConsumerIdentity> = None;
        for c in candidates {
            if m.matches(req, cur, c) {
                cur = Some(c);
            }
        }
        cur
    }

    #[test]
    fn test_complete_match_prefers_exact() {
        let req = id(&[("type", "t"), ("host", "h")]);
        let exact = id(&[("type", "t"), ("host", "h")]);
        let superset = id(&[("type", "t"), ("host", "h"), ("path", "p")]);
        let candidates = [superset, exact.clone()];
        assert_eq!(best(&complete_match, &req, &candidates), Some(&exact));
    }

    #[test]
    fn test_partial_match_prefers_more_attributes() {
        let req = id(&[("type", "t"), ("host", "h"), ("path", "p")]);
        let narrow = id(&[("type", "t"), ("host", "h")]);
        let wide = id(&[("type", "t")]);
        let candidates = [narrow.clone(), wide];
        assert_eq!(best(&partial_match, &req, &candidates), Some(&narrow));
    }

    #[test]
    fn test_partial_match_later_wins_ties() {
        let req = id(&[("type", "t"), ("host", "h"), ("path", "p")]);
        let first = id(&[("type", "t"), ("host", "h")]);
        let second = id(&[("type", "t"), ("path", "p")]);
        let candidates = [first, second.clone()];
        assert_eq!(best(&partial_match, &req, &candidates), Some(&second));
    }

    #[test]
    fn test_partial_match_rejects_superset() {
        let req = id(&[("type", "t")]);
        let cand = id(&[("type", "t"), ("host", "h")]);
        assert!(!partial_match(&req, None, &cand));
    }

    #[test]
    fn test_no_match() {
        let req = id(&[("type", "t")]);
        assert!(!no_match(&req, None, &req));
    }

    #[test]
    fn test_path_prefix() {
        assert!(is_path_prefix("", "a/b"));
        assert!(is_path_prefix("a", "a/b"));
        assert!(is_path_prefix("/a/b/", "a/b"));
        assert!(!is_path_prefix("a/b", "a/bc"));
        assert!(!is_path_prefix("a/b/c", "a/b"));
    }

    #[test]
    fn test_hostpath_prefers_longer_prefix() {
        let m = matcher("OCIRegistry");
        let req = id(&[
            ("type", "OCIRegistry"),
            (ID_HOSTNAME, "ghcr.io"),
            (ID_PATHPREFIX, "acme/app/image"),
        ]);
        let host = id(&[("type", "OCIRegistry"), (ID_HOSTNAME, "ghcr.io")]);
        let long = id(&[
            ("type", "OCIRegistry"),
            (ID_HOSTNAME, "ghcr.io"),
            (ID_PATHPREFIX, "acme/app"),
        ]);
        let short = id(&[
            ("type", "OCIRegistry"),
            (ID_HOSTNAME, "ghcr.io"),
            (ID_PATHPREFIX, "acme"),
        ]);
        let other = id(&[
            ("type", "OCIRegistry"),
            (ID_HOSTNAME, "ghcr.io"),
            (ID_PATHPREFIX, "other"),
        ]);
        let candidates = [host, long.clone(), short, other];
        assert_eq!(best(&m, &req, &candidates), Some(&long));
    }

    #[test]
    fn test_hostpath_checks_type() {
        let m = matcher("OCIRegistry");
        let req = id(&[("type", "NPM"), (ID_HOSTNAME, "h")]);
        assert!(!m.matches(&req, None, &req));
    }

    #[test]
    fn test_hostpath_candidates_accepted() {
        let m = matcher("OCIRegistry");
        let req = id(&[("type", "OCIRegistry"), (ID_HOSTNAME, "ghcr.io")]);
        let generic = id(&[("type", IDENTITY_TYPE), (ID_HOSTNAME, "ghcr.io")]);
        assert!(m.matches(&req, None, &generic));

        let other = id(&[("type", "NPM"), (ID_HOSTNAME, "ghcr.io")]);
        assert!(!m.matches(&req, None, &other));
    }

    #[test]
    fn test_registry_falls_back_to_partial_match() {
        let base = Arc::new(IdentityMatcherRegistry::new());
        base.register("exact", Arc::new(complete_match), "exact matching");
        let reg = base.derive();

        let req = id(&[("type", "exact"), ("a", "1")]);
        let cand = id(&[("type", "exact")]);
        assert!(!reg.matcher_for(&req).matches(&req, None, &cand));

        let req = id(&[("type", "other"), ("a", "1")]);
        let cand = id(&[("type", "other")]);
        assert!(reg.matcher_for(&req).matches(&req, None, &cand));
        assert_eq!(reg.list().len(), 1);
    }
}
