use std::fmt;

use serde::Serialize;
use thiserror::Error;

/// A metric path that does not follow `\Category(Instance)\Counter`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("malformed metric path {path:?}: {reason}")]
pub struct MalformedPath {
    pub path: String,
    pub reason: &'static str,
}

impl MalformedPath {
    fn new(path: &str, reason: &'static str) -> Self {
        Self {
            path: path.to_owned(),
            reason,
        }
    }
}

/// One fully-qualified counter: category, counter, and an optional instance
/// for multi-instance categories.
///
/// The fields are validated on construction so that [`MetricSpec::path`]
/// always parses back into an equal spec.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct MetricSpec {
    #[serde(rename = "categoryName")]
    category: String,
    #[serde(rename = "counterName")]
    counter: String,
    #[serde(rename = "instanceName", skip_serializing_if = "Option::is_none")]
    instance: Option<String>,
}

impl MetricSpec {
    pub fn new(
        category: &str,
        counter: &str,
        instance: Option<&str>,
    ) -> Result<Self, MalformedPath> {
        let reason = if category.is_empty() {
            Some("category is empty")
        } else if category.contains('\\') {
            Some("category may not contain '\\'")
        } else if category.contains('(') && !category_parens_survive(category, instance) {
            Some("a category with '(' must close it, not end in ')', and take no instance")
        } else if counter.is_empty() {
            Some("counter is empty")
        } else if counter.contains('\\') {
            Some("counter may not contain '\\'")
        } else {
            match instance {
                Some("") => Some("instance is empty"),
                Some(i) if i.contains(")\\") => {
                    Some("instance may not contain \")\\\"")
                }
                _ => None,
            }
        };

        if let Some(reason) = reason {
            let path = match instance {
                Some(i) => format!("\\{category}({i})\\{counter}"),
                None => format!("\\{category}\\{counter}"),
            };
            return Err(MalformedPath { path, reason });
        }

        Ok(Self {
            category: category.to_owned(),
            counter: counter.to_owned(),
            instance: instance.map(str::to_owned),
        })
    }

    /// Parses `\Category(Instance)\Counter` or `\Category\Counter`.
    ///
    /// An instance opens at the first `(` and runs up to the first `)` that
    /// is directly followed by `\`, so instance names that carry their own
    /// parentheses (`Intel(R) Ethernet`) are kept whole. When no such `)\`
    /// exists the `(` belongs to the category (`\A(b)c\D`), which then runs
    /// to the first `\` and must close every `(` it opens.
    pub fn parse(path: &str) -> Result<Self, MalformedPath> {
        let rest = path
            .strip_prefix('\\')
            .ok_or_else(|| MalformedPath::new(path, "must start with '\\'"))?;

        let open = rest.find(['(', '\\']).ok_or_else(|| {
            MalformedPath::new(path, "missing '\\' before the counter name")
        })?;

        let instance_close = rest[open..]
            .starts_with('(')
            .then(|| rest[open + 1..].find(")\\"))
            .flatten();

        let (category, instance, counter) = match instance_close {
            Some(close) => {
                let inner = &rest[open + 1..];
                (&rest[..open], Some(&inner[..close]), &inner[close + 2..])
            }
            None => {
                let sep = rest.find('\\').ok_or_else(|| {
                    MalformedPath::new(path, "missing '\\' before the counter name")
                })?;
                let category = &rest[..sep];
                if !parens_closed(category) {
                    return Err(MalformedPath::new(path, "unmatched '('"));
                }
                (category, None, &rest[sep + 1..])
            }
        };

        Self::new(category, counter, instance).map_err(|e| MalformedPath {
            path: path.to_owned(),
            reason: e.reason,
        })
    }

    pub fn category(&self) -> &str {
        &self.category
    }

    pub fn counter(&self) -> &str {
        &self.counter
    }

    pub fn instance(&self) -> Option<&str> {
        self.instance.as_deref()
    }

    /// The wire form of this spec.
    pub fn path(&self) -> String {
        self.to_string()
    }
}

/// Every `(` is closed by a later `)`. A stray `)` is harmless.
fn parens_closed(s: &str) -> bool {
    let mut depth = 0usize;
    for c in s.chars() {
        match c {
            '(' => depth += 1,
            ')' => depth = depth.saturating_sub(1),
            _ => {}
        }
    }
    depth == 0
}

/// Whether a category holding `(` still formats to a path that parses back
/// to the same category. An instance or a trailing `)` would be taken for
/// the instance group.
fn category_parens_survive(category: &str, instance: Option<&str>) -> bool {
    instance.is_none() && !category.ends_with(')') && parens_closed(category)
}

impl fmt::Display for MetricSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.instance {
            Some(instance) => {
                write!(f, "\\{}({})\\{}", self.category, instance, self.counter)
            }
            None => write!(f, "\\{}\\{}", self.category, self.counter),
        }
    }
}

impl std::str::FromStr for MetricSpec {
    type Err = MalformedPath;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn parses_instance_qualified_path() {
        let spec = MetricSpec::parse(r"\Processor(_Total)\% Processor Time").unwrap();
        assert_eq!(spec.category(), "Processor");
        assert_eq!(spec.instance(), Some("_Total"));
        assert_eq!(spec.counter(), "% Processor Time");
    }

    #[test]
    fn parses_single_instance_path() {
        let spec = MetricSpec::parse(r"\Memory\Available MBytes").unwrap();
        assert_eq!(spec.category(), "Memory");
        assert_eq!(spec.instance(), None);
        assert_eq!(spec.counter(), "Available MBytes");
        assert_eq!(spec.path(), r"\Memory\Available MBytes");
    }

    #[test]
    fn keeps_parentheses_inside_instance() {
        let path = r"\Network Interface(Intel(R) Ethernet)\Bytes Total/sec";
        let spec = MetricSpec::parse(path).unwrap();
        assert_eq!(spec.instance(), Some("Intel(R) Ethernet"));
        assert_eq!(spec.counter(), "Bytes Total/sec");
        assert_eq!(spec.path(), path);
    }

    #[test]
    fn rejects_malformed_paths() {
        for bad in [
            "CategoryOnly",
            r"\CategoryOnly",
            r"Memory\Available MBytes",
            r"\Process(w3wp\ID Process",
            r"\\Counter",
            r"\Memory\",
            r"\Process()\ID Process",
            r"\Memory\Sub\Counter",
            r"\A(b\D",
            r"\A)b(\D",
        ] {
            assert!(MetricSpec::parse(bad).is_err(), "{bad:?} should not parse");
        }
    }

    #[test]
    fn parentheses_without_instance_stay_in_category() {
        let spec = MetricSpec::parse(r"\A(b)c\D").unwrap();
        assert_eq!(spec.category(), "A(b)c");
        assert_eq!(spec.instance(), None);
        assert_eq!(spec.counter(), "D");
        assert_eq!(spec.path(), r"\A(b)c\D");

        let spec = MetricSpec::parse(r"\SMB Client (v2) Shares\Avg. sec/Read").unwrap();
        assert_eq!(spec.category(), "SMB Client (v2) Shares");

        // A `)\` anywhere later still opens an instance at the first `(`
        let spec = MetricSpec::parse(r"\A(b)\D").unwrap();
        assert_eq!(spec.category(), "A");
        assert_eq!(spec.instance(), Some("b"));
    }

    #[test]
    fn construction_accepts_only_round_trippable_parentheses() {
        assert!(MetricSpec::new("A(b)c", "D", None).is_ok());
        assert!(MetricSpec::new("A(b", "D", None).is_err());
        assert!(MetricSpec::new("A(b)", "D", None).is_err());
        assert!(MetricSpec::new("A(b)c", "D", Some("i")).is_err());
    }

    #[test]
    fn equality_is_case_sensitive() {
        let a = MetricSpec::parse(r"\Process(w3wp)\ID Process").unwrap();
        let b = MetricSpec::parse(r"\Process(W3WP)\ID Process").unwrap();
        assert_ne!(a, b);
        assert_eq!(a, MetricSpec::new("Process", "ID Process", Some("w3wp")).unwrap());
    }

    #[test]
    fn construction_rejects_unformattable_fields() {
        assert!(MetricSpec::new("", "x", None).is_err());
        assert!(MetricSpec::new("a\\b", "x", None).is_err());
        assert!(MetricSpec::new("a", "", None).is_err());
        assert!(MetricSpec::new("a", "x", Some("")).is_err());
        assert!(MetricSpec::new("a", "x", Some("i)\\j")).is_err());
    }

    #[test]
    fn serializes_field_names() {
        let spec = MetricSpec::parse(r"\Process(w3wp#1)\Working Set").unwrap();
        let json = serde_json::to_value(&spec).unwrap();
        assert_eq!(json["categoryName"], "Process");
        assert_eq!(json["instanceName"], "w3wp#1");
        assert_eq!(json["counterName"], "Working Set");
    }

    proptest! {
        #[test]
        fn format_is_left_inverse_of_parse(
            category in "[^\\\\(]{1,16}",
            counter in "[^\\\\]{1,16}",
            instance in proptest::option::of("[^)]{1,16}"),
        ) {
            let path = match &instance {
                Some(i) => format!("\\{category}({i})\\{counter}"),
                None => format!("\\{category}\\{counter}"),
            };
            let spec = MetricSpec::parse(&path).unwrap();
            prop_assert_eq!(spec.path(), path);
            prop_assert_eq!(spec.instance(), instance.as_deref());
        }

        #[test]
        fn categories_with_balanced_parentheses_round_trip(
            head in "[^\\\\()]{1,8}",
            inner in "[^\\\\()]{0,8}",
            tail in "[^\\\\()]{1,8}",
            counter in "[^\\\\]{1,16}",
        ) {
            let category = format!("{head}({inner}){tail}");
            let path = format!("\\{category}\\{counter}");
            let spec = MetricSpec::parse(&path).unwrap();
            prop_assert_eq!(spec.category(), category.as_str());
            prop_assert_eq!(spec.instance(), None);
            prop_assert_eq!(spec.path(), path);
            prop_assert!(MetricSpec::new(&category, &counter, None).is_ok());
        }
    }
}
