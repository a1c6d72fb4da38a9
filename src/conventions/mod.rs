//! Convention detectors and the registry that chooses between them.
//!
//! A detector knows the file-layout idioms of one family of datasets and turns a
//! dataset into a [`TableConfig`] tree.

mod cf;

pub use cf::CfPointConfigurer;

use crate::data::Dataset;
use crate::error::Result;
use crate::feature::FeatureType;
use crate::table::TableConfig;
use std::fmt;
use std::rc::Rc;

/// Builds table configurations for one convention.
pub trait TableConfigurer: fmt::Debug {
    /// Name shown in diagnostics.
    fn name(&self) -> &str;

    /// Check if this detector recognizes the dataset without a `Conventions` attribute.
    fn is_mine(&self, ds: &dyn Dataset, wanted: Option<FeatureType>) -> bool;

    /// Build the configuration tree. `Ok(None)` declines the dataset.
    fn config(
        &self,
        ds: &dyn Dataset,
        wanted: Option<FeatureType>,
        errlog: &mut String,
    ) -> Result<Option<TableConfig>>;
}

/// Fuzzy match of a convention name.
pub type ConventionMatcher = Box<dyn Fn(&str) -> bool>;

struct Entry {
    convention: String,
    matcher: Option<ConventionMatcher>,
    configurer: Rc<dyn TableConfigurer>,
}

impl Entry {
    fn matches(&self, convention: &str) -> bool {
        self.convention == convention || self.matcher.as_ref().map(|m| m(convention)).unwrap_or(false)
    }
}

impl fmt::Debug for Entry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Entry")
            .field("convention", &self.convention)
            .field("fuzzy", &self.matcher.is_some())
            .field("configurer", &self.configurer.name())
            .finish()
    }
}

/// Ordered set of convention detectors. User entries are tried before built-ins.
#[derive(Debug, Default)]
pub struct ConventionRegistry {
    user: Vec<Entry>,
    builtins: Vec<Entry>,
}

impl ConventionRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding the built-in detectors.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.builtins.push(Entry {
            convention: "CF-1.".to_string(),
            matcher: Some(Box::new(|c: &str| c.trim().starts_with("CF-1."))),
            configurer: Rc::new(CfPointConfigurer),
        });
        registry
    }

    /// Register a detector for an exact convention name.
    pub fn register(&mut self, convention: impl Into<String>, configurer: Rc<dyn TableConfigurer>) {
        self.user.push(Entry {
            convention: convention.into(),
            matcher: None,
            configurer,
        });
    }

    /// Register a detector with a fuzzy name match.
    pub fn register_with_matcher(
        &mut self,
        convention: impl Into<String>,
        matcher: impl Fn(&str) -> bool + 'static,
        configurer: Rc<dyn TableConfigurer>,
    ) {
        self.user.push(Entry {
            convention: convention.into(),
            matcher: Some(Box::new(matcher)),
            configurer,
        });
    }

    fn entries(&self) -> impl Iterator<Item = &Entry> {
        self.user.iter().chain(self.builtins.iter())
    }

    /// Detector for a convention name.
    pub fn find(&self, convention: &str) -> Option<Rc<dyn TableConfigurer>> {
        self.entries()
            .find(|e| e.matches(convention))
            .map(|e| Rc::clone(&e.configurer))
    }

    /// Choose the detector for a dataset.
    ///
    /// The `Conventions` (or `Convention`) attribute is matched whole, then token by
    /// token; failing that, every detector is asked whether the dataset is its own.
    pub fn resolve(&self, ds: &dyn Dataset, wanted: Option<FeatureType>) -> Option<Rc<dyn TableConfigurer>> {
        let convention = ds
            .attribute_str("Conventions")
            .or_else(|| ds.attribute_str("Convention"));

        if let Some(convention) = convention.as_deref() {
            if let Some(c) = self.find(convention.trim()) {
                return Some(c);
            }
            for token in split_conventions(convention) {
                if let Some(c) = self.find(token) {
                    tracing::debug!("Convention token '{}' matched {}", token, c.name());
                    return Some(c);
                }
            }
        }

        self.entries()
            .find(|e| e.configurer.is_mine(ds, wanted))
            .map(|e| Rc::clone(&e.configurer))
    }
}

/// Split a convention list such as `CF-1.6, ACDD-1.3` or `CF-1.0/Unidata`.
fn split_conventions(text: &str) -> Vec<&str> {
    text.split([',', ';', '/'])
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::MemoryDataset;
    use crate::table::Layout;

    #[derive(Debug)]
    struct Named(&'static str, bool);

    impl TableConfigurer for Named {
        fn name(&self) -> &str {
            self.0
        }

        fn is_mine(&self, _ds: &dyn Dataset, _wanted: Option<FeatureType>) -> bool {
            self.1
        }

        fn config(
            &self,
            _ds: &dyn Dataset,
            _wanted: Option<FeatureType>,
            _errlog: &mut String,
        ) -> Result<Option<TableConfig>> {
            Ok(Some(TableConfig::new(self.0, Layout::Top)))
        }
    }

    fn with_conventions(value: &str) -> MemoryDataset {
        let mut ds = MemoryDataset::new("mem");
        ds.add_attribute("Conventions", value);
        ds
    }

    #[test]
    fn delimited_token_selects_registered_convention() {
        let mut registry = ConventionRegistry::new();
        registry.register("B", Rc::new(Named("b", false)));
        let ds = with_conventions("A,B");
        assert_eq!(registry.resolve(&ds, None).unwrap().name(), "b");
        assert_eq!(split_conventions("CF-1.0/Unidata; X"), vec!["CF-1.0", "Unidata", "X"]);
    }

    #[test]
    fn user_entries_come_before_builtins() {
        let mut registry = ConventionRegistry::with_builtins();
        registry.register_with_matcher("mine", |c| c.starts_with("CF-1."), Rc::new(Named("user", false)));
        let ds = with_conventions("CF-1.6");
        assert_eq!(registry.resolve(&ds, None).unwrap().name(), "user");
    }

    #[test]
    fn is_mine_checked_in_registration_order() {
        let mut registry = ConventionRegistry::new();
        registry.register("x", Rc::new(Named("no", false)));
        registry.register("y", Rc::new(Named("first", true)));
        registry.register("z", Rc::new(Named("second", true)));
        let ds = MemoryDataset::new("mem");
        assert_eq!(registry.resolve(&ds, None).unwrap().name(), "first");

        let empty = ConventionRegistry::new();
        assert!(empty.resolve(&ds, None).is_none());
    }
}
