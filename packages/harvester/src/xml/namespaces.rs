//! Prefix to URI mapping used to resolve `prefix:local` tag names.

use std::collections::BTreeMap;

use crate::config::{OAI_NAMESPACE, OAI_PREFIX};
use crate::error::{HarvesterError, Result};
use crate::xml::tree::ExpandedName;

/// Namespace mapping. Always contains the protocol's own `oai` prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Namespaces {
    prefixes: BTreeMap<String, String>,
}

impl Default for Namespaces {
    fn default() -> Self {
        let mut prefixes = BTreeMap::new();
        prefixes.insert(OAI_PREFIX.to_string(), OAI_NAMESPACE.to_string());
        Self { prefixes }
    }
}

impl Namespaces {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a prefix, replacing any previous binding.
    #[must_use]
    pub fn with(mut self, prefix: &str, uri: &str) -> Self {
        self.insert(prefix, uri);
        self
    }

    pub fn insert(&mut self, prefix: &str, uri: &str) {
        self.prefixes.insert(prefix.to_string(), uri.to_string());
    }

    pub fn get(&self, prefix: &str) -> Option<&str> {
        self.prefixes.get(prefix).map(String::as_str)
    }

    /// First registered prefix bound to `uri`, in prefix order.
    pub fn prefix_for(&self, uri: &str) -> Option<&str> {
        self.prefixes
            .iter()
            .find(|(_, u)| u.as_str() == uri)
            .map(|(p, _)| p.as_str())
    }

    pub fn contains_prefix(&self, prefix: &str) -> bool {
        self.prefixes.contains_key(prefix)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.prefixes.iter().map(|(p, u)| (p.as_str(), u.as_str()))
    }

    /// Resolve a tag query into a matcher.
    ///
    /// Accepts `prefix:local`, Clark notation (`{uri}local`, `{*}local`),
    /// a bare local name (no namespace) and `*`.
    ///
    /// # Examples
    /// ```
    /// use oai_harvester::xml::Namespaces;
    ///
    /// let namespaces = Namespaces::new();
    /// assert!(namespaces.expand("oai:record").is_ok());
    /// assert!(namespaces.expand("dc:title").is_err());
    /// ```
    pub fn expand(&self, tag: &str) -> Result<TagMatcher> {
        if !tag.starts_with('{') {
            if let Some((prefix, local)) = tag.split_once(':') {
                let uri = self.get(prefix).ok_or_else(|| HarvesterError::UnknownNamespace {
                    prefix: prefix.to_string(),
                    tag: tag.to_string(),
                })?;
                return Ok(TagMatcher::Name(ExpandedName::new(Some(uri), local)));
            }
        }
        parse_name_test(tag).map_err(|reason| HarvesterError::InvalidPath {
            path: tag.to_string(),
            reason,
        })
    }
}

impl<P: AsRef<str>, U: AsRef<str>> FromIterator<(P, U)> for Namespaces {
    fn from_iter<I: IntoIterator<Item = (P, U)>>(iter: I) -> Self {
        let mut namespaces = Self::default();
        for (prefix, uri) in iter {
            namespaces.insert(prefix.as_ref(), uri.as_ref());
        }
        namespaces
    }
}

/// Element name test.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TagMatcher {
    /// `*`: any element.
    Any,

    /// `{*}local`: local name in any (or no) namespace.
    Local(String),

    /// Exact expanded name.
    Name(ExpandedName),
}

impl TagMatcher {
    pub fn matches(&self, name: &ExpandedName) -> bool {
        match self {
            Self::Any => true,
            Self::Local(local) => name.local_name() == local,
            Self::Name(expected) => expected == name,
        }
    }
}

/// Parse `*`, `{uri}local`, `{*}local`, `{}local` or `local`. No prefixes.
pub(crate) fn parse_name_test(test: &str) -> std::result::Result<TagMatcher, String> {
    if test.is_empty() {
        return Err("empty name".to_string());
    }
    if test == "*" {
        return Ok(TagMatcher::Any);
    }

    let Some(rest) = test.strip_prefix('{') else {
        return Ok(TagMatcher::Name(ExpandedName::local(test)));
    };
    let (uri, local) = rest
        .split_once('}')
        .ok_or_else(|| "unterminated namespace".to_string())?;
    if local.is_empty() {
        return Err("missing local name".to_string());
    }

    Ok(match uri {
        "*" => TagMatcher::Local(local.to_string()),
        "" => TagMatcher::Name(ExpandedName::local(local)),
        uri => TagMatcher::Name(ExpandedName::new(Some(uri), local)),
    })
}
