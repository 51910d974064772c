//! Member selection for partial restores.
//!
//! A prefix selects a member when the member equals the prefix or lies
//! beneath it (`prefix/...`). Backslashes are treated as `/` and trailing
//! slashes on a prefix are ignored.

use std::collections::BTreeSet;

/// Normalized set of member-path prefixes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selection {
    prefixes: Vec<String>,
}

impl Selection {
    /// Build a selection, dropping prefixes that normalize to nothing.
    pub fn new<I, S>(prefixes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let prefixes = prefixes
            .into_iter()
            .map(|p| normalize_prefix(p.as_ref()))
            .filter(|p| !p.is_empty())
            .collect();
        Self { prefixes }
    }

    pub fn prefixes(&self) -> &[String] {
        &self.prefixes
    }

    pub fn is_empty(&self) -> bool {
        self.prefixes.is_empty()
    }

    pub fn matches(&self, member: &str) -> bool {
        let member = normalize_member(member);
        self.prefixes.iter().any(|prefix| matches_prefix(&member, prefix))
    }
}

pub fn normalize_member(name: &str) -> String {
    name.replace('\\', "/")
}

pub fn normalize_prefix(prefix: &str) -> String {
    prefix.trim().replace('\\', "/").trim_end_matches('/').to_string()
}

fn matches_prefix(member: &str, prefix: &str) -> bool {
    member == prefix
        || member
            .strip_prefix(prefix)
            .is_some_and(|rest| rest.starts_with('/'))
}

/// First path segment of a member.
pub fn root_of(member: &str) -> &str {
    member.split(['/', '\\']).next().unwrap_or(member)
}

/// Distinct, sorted roots of `members`.
pub fn root_groups<I, S>(members: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    members
        .into_iter()
        .map(|m| root_of(m.as_ref()).to_string())
        .filter(|r| !r.is_empty())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}
