//! Report assembly and the end-to-end `build_report` pipeline.
//!
//! filter → annotate → assemble. Only an inventory failure can fail the
//! whole call; per-database problems end up as `Unavailable` rows.

use std::sync::Arc;

use futures::FutureExt;
use futures::future::BoxFuture;

use crate::annotate::{AnnotatedDatabase, ResolveFn, annotate};
use crate::config::ReportSettings;
use crate::error::RosterResult;
use crate::inventory::{InventoryQuery, InventorySource, filter_names};
use crate::migration::{
    ElevatedConnector, MigrationDir, MigrationQuery, MigrationStatus, UnavailableReason, resolve,
};

/// Ordered rows ready for presentation. At most one row is current.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Report {
    rows: Vec<AnnotatedDatabase>,
}

impl Report {
    pub fn rows(&self) -> &[AnnotatedDatabase] {
        &self.rows
    }

    pub fn into_rows(self) -> Vec<AnnotatedDatabase> {
        self.rows
    }

    pub fn iter(&self) -> std::slice::Iter<'_, AnnotatedDatabase> {
        self.rows.iter()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// The row for the session's own database, if it was listed.
    pub fn current(&self) -> Option<&AnnotatedDatabase> {
        self.rows.iter().find(|row| row.is_current)
    }

    /// Whether migration status was requested for this run.
    pub fn has_status(&self) -> bool {
        self.rows.iter().any(|row| row.status.is_some())
    }
}

impl<'a> IntoIterator for &'a Report {
    type Item = &'a AnnotatedDatabase;
    type IntoIter = std::slice::Iter<'a, AnnotatedDatabase>;

    fn into_iter(self) -> Self::IntoIter {
        self.rows.iter()
    }
}

/// Turn annotated rows into a [`Report`].
///
/// More than one current row is a bug in the caller. Debug builds panic;
/// release builds log it and keep only the first match.
pub fn assemble(annotated: Vec<AnnotatedDatabase>) -> Report {
    let current_count = annotated.iter().filter(|row| row.is_current).count();
    debug_assert!(
        current_count <= 1,
        "report has {} rows marked current",
        current_count
    );

    let mut rows = annotated;
    if current_count > 1 {
        tracing::warn!(current_count, "multiple databases marked current, keeping the first");
        let mut seen = false;
        for row in rows.iter_mut().filter(|row| row.is_current) {
            row.is_current = !seen;
            seen = true;
        }
    }

    Report { rows }
}

/// Build the per-database status resolver used when status reporting is on.
///
/// Each call opens its own elevated connection and closes it once the
/// status is read. A failed connect becomes an `Unavailable` status rather
/// than an error; a failed close is only logged.
pub fn status_resolver<C>(connector: Arc<C>, settings: &ReportSettings) -> ResolveFn
where
    C: ElevatedConnector + Send + Sync + 'static,
{
    let schema: Arc<str> = settings.migrations_schema.as_str().into();
    let table: Arc<str> = settings.migrations_table.as_str().into();
    let dir = Arc::new(MigrationDir::new(&settings.migrations_dir));

    Arc::new(move |name: String| -> BoxFuture<'static, RosterResult<MigrationStatus>> {
        let connector = connector.clone();
        let schema = schema.clone();
        let table = table.clone();
        let dir = dir.clone();

        async move {
            let mut conn = match connector.connect_elevated(&name).await {
                Ok(conn) => conn,
                Err(e) => {
                    tracing::debug!(database = %name, error = %e, "elevated connect failed");
                    return Ok(MigrationStatus::Unavailable(UnavailableReason::from(&e)));
                }
            };
            let status = resolve(&mut conn, &schema, &table, |file| dir.contains(file)).await;
            if let Err(e) = conn.close().await {
                tracing::debug!(database = %name, error = %e, "closing elevated connection failed");
            }
            Ok(status)
        }
        .boxed()
    })
}

/// List, filter, annotate and assemble.
///
/// Fails only when the inventory source itself fails; no partial report
/// is produced in that case.
pub async fn build_report<S, C>(
    source: &S,
    connector: Arc<C>,
    settings: &ReportSettings,
    query: &InventoryQuery,
    report_migrations: bool,
) -> RosterResult<Report>
where
    S: InventorySource,
    C: ElevatedConnector + Send + Sync + 'static,
{
    let names = source
        .database_names(query.include_templates, query.sort_by_creation)
        .await?;
    let current = source.current_database().await?;

    let candidates = filter_names(&names, query, &settings.exclude);
    tracing::debug!(
        listed = names.len(),
        reported = candidates.len(),
        prefix = %query.prefix,
        "filtered database inventory"
    );

    let resolver = report_migrations.then(|| status_resolver(connector, settings));
    let annotated = annotate(&candidates, &current, resolver, settings.concurrency).await;

    Ok(assemble(annotated))
}
