//! Field-name matching.
//!
//! Extraction rewrites PDF field names (prefixes ids with `f_`/`field_`,
//! turns spaces into underscores) and authoring tools add their own
//! decorations (`"1020 Radio Button 1"`, `"page1_1020"`). The resolver
//! reconciles the two with an ordered list of predicates applied to each
//! candidate name. It knows nothing about PDF objects: callers hand it
//! `(name, handle)` pairs in search order.

use std::borrow::Cow;
use std::fmt;

const SYNTHETIC_PREFIXES: [&str; 2] = ["f_", "field_"];

/// Which predicate matched a candidate name, highest priority first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum MatchRule {
    ExactRaw,
    ExactStripped,
    ExactUnsanitized,
    WordPrefix,
    UnderscoreSuffix,
}

impl MatchRule {
    /// All rules in the order they are tried.
    pub const ORDERED: [MatchRule; 5] = [
        MatchRule::ExactRaw,
        MatchRule::ExactStripped,
        MatchRule::ExactUnsanitized,
        MatchRule::WordPrefix,
        MatchRule::UnderscoreSuffix,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MatchRule::ExactRaw => "exact",
            MatchRule::ExactStripped => "exact-stripped",
            MatchRule::ExactUnsanitized => "exact-unsanitized",
            MatchRule::WordPrefix => "word-prefix",
            MatchRule::UnderscoreSuffix => "underscore-suffix",
        }
    }

    fn matches(&self, key: &FieldKey, name: &str) -> bool {
        match self {
            MatchRule::ExactRaw => name == key.raw,
            MatchRule::ExactStripped => name == key.stripped,
            MatchRule::ExactUnsanitized => name == key.unsanitized,
            MatchRule::WordPrefix => [&key.raw, &key.stripped, &key.unsanitized]
                .into_iter()
                .any(|form| {
                    name.strip_prefix(form.as_str())
                        .is_some_and(|rest| rest.starts_with(' '))
                }),
            MatchRule::UnderscoreSuffix => [&key.raw, &key.stripped].into_iter().any(|form| {
                name.strip_suffix(form.as_str())
                    .is_some_and(|rest| rest.ends_with('_'))
            }),
        }
    }
}

impl fmt::Display for MatchRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The three spellings of a schema id that are compared against PDF names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldKey {
    pub raw: String,
    pub stripped: String,
    pub unsanitized: String,
}

impl FieldKey {
    pub fn new(id: &str) -> Self {
        let mut stripped = id;
        for prefix in SYNTHETIC_PREFIXES {
            stripped = stripped.strip_prefix(prefix).unwrap_or(stripped);
        }
        Self {
            raw: id.to_string(),
            stripped: stripped.to_string(),
            unsanitized: stripped.replace('_', " "),
        }
    }

    fn to_ascii_lowercase(&self) -> Self {
        Self {
            raw: self.raw.to_ascii_lowercase(),
            stripped: self.stripped.to_ascii_lowercase(),
            unsanitized: self.unsanitized.to_ascii_lowercase(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResolverOptions {
    /// Compare names ASCII case-insensitively.
    pub ignore_case: bool,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct FieldResolver {
    options: ResolverOptions,
}

impl FieldResolver {
    pub fn new(options: ResolverOptions) -> Self {
        Self { options }
    }

    pub fn key(&self, id: &str) -> FieldKey {
        let key = FieldKey::new(id);
        if self.options.ignore_case {
            key.to_ascii_lowercase()
        } else {
            key
        }
    }

    /// Highest-priority rule satisfied by `name`, if any.
    pub fn match_name(&self, key: &FieldKey, name: &str) -> Option<MatchRule> {
        let name: Cow<'_, str> = if self.options.ignore_case {
            Cow::Owned(name.to_ascii_lowercase())
        } else {
            Cow::Borrowed(name)
        };
        MatchRule::ORDERED
            .into_iter()
            .find(|rule| rule.matches(key, &name))
    }

    /// First candidate, in iteration order, that satisfies any rule.
    pub fn find<'n, T, I>(&self, id: &str, candidates: I) -> Option<(T, MatchRule)>
    where
        I: IntoIterator<Item = (&'n str, T)>,
    {
        let key = self.key(id);
        candidates
            .into_iter()
            .find_map(|(name, handle)| self.match_name(&key, name).map(|rule| (handle, rule)))
    }
}
