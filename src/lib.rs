//! pgroster: list the databases of a Postgres server and annotate each with
//! its most recent knex-style migration.
//!
//! The pipeline is `filter → annotate → assemble`:
//!
//! - [`inventory`]: which databases to report on
//! - [`annotate`]: bounded, order-preserving status fan-out
//! - [`report`]: final rows and [`build_report`]
//!
//! Database access sits behind the [`InventorySource`],
//! [`ElevatedConnector`] and [`MigrationQuery`] traits; [`postgres`] holds
//! the sqlx implementations. [`render`] turns a report into terminal lines.
//!
//! ```ignore
//! use std::sync::Arc;
//! use pgroster::prelude::*;
//!
//! let options = pgroster::postgres::connect_options(&url)?;
//! let inventory = PgInventory::connect(options.clone()).await?;
//! let connector = Arc::new(PgElevatedConnector::new(options, None)?);
//!
//! let report = build_report(
//!     &inventory,
//!     connector,
//!     &ReportSettings::default(),
//!     &InventoryQuery::with_prefix("app_"),
//!     true,
//! )
//! .await?;
//! ```

pub mod annotate;
pub mod config;
pub mod error;
pub mod inventory;
pub mod migration;
pub mod postgres;
pub mod render;
pub mod report;

pub use annotate::{AnnotatedDatabase, ResolveFn, annotate};
pub use config::{Config, ReportSettings, resolve_show_migrations};
pub use error::{RosterError, RosterResult};
pub use inventory::{InventoryQuery, InventorySource, filter_names};
pub use migration::{
    ElevatedConnector, MigrationDir, MigrationQuery, MigrationRecord, MigrationStatus,
    UnavailableReason, resolve,
};
pub use report::{Report, assemble, build_report};

pub mod prelude {
    pub use crate::annotate::{AnnotatedDatabase, annotate};
    pub use crate::config::{Config, ReportSettings};
    pub use crate::error::{RosterError, RosterResult};
    pub use crate::inventory::{InventoryQuery, InventorySource};
    pub use crate::migration::{MigrationRecord, MigrationStatus, UnavailableReason};
    pub use crate::postgres::{PgElevatedConnector, PgInventory};
    pub use crate::report::{Report, build_report};
}
