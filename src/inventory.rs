//! Database inventory: where names come from and which ones get reported.

use std::collections::BTreeSet;
use std::future::Future;

use crate::error::RosterResult;

/// What to list and how the inventory source should order it.
///
/// The always-ignored names are not part of the query: they are fixed for
/// the whole run and live in [`crate::config::ReportSettings::exclude`],
/// which [`crate::report::build_report`] passes to [`filter_names`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InventoryQuery {
    /// Literal, case-sensitive name prefix. Empty means no filter.
    pub prefix: String,
    /// Order by creation time descending instead of by name.
    pub sort_by_creation: bool,
    pub include_templates: bool,
}

impl InventoryQuery {
    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            ..Self::default()
        }
    }
}

/// Something that can enumerate the databases of a server.
pub trait InventorySource {
    /// All database names, already in the requested order.
    fn database_names(
        &self,
        include_templates: bool,
        sort_by_creation: bool,
    ) -> impl Future<Output = RosterResult<Vec<String>>> + Send;

    /// Name of the database the inventory session is bound to.
    fn current_database(&self) -> impl Future<Output = RosterResult<String>> + Send;
}

/// Drop excluded names and names not starting with `query.prefix`.
///
/// The output is always a subsequence of `names`: nothing is reordered,
/// duplicated, or invented.
pub fn filter_names(
    names: &[String],
    query: &InventoryQuery,
    exclude: &BTreeSet<String>,
) -> Vec<String> {
    names
        .iter()
        .filter(|name| !exclude.contains(name.as_str()))
        .filter(|name| query.prefix.is_empty() || name.starts_with(&query.prefix))
        .cloned()
        .collect()
}
