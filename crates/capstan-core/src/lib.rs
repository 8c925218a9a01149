//! # capstan-core
//!
//! Installation-history store for the capstan bundle runtime.
//!
//! Every operation performed against a deployed bundle (install, upgrade,
//! invoke, uninstall) is recorded as a hierarchy of four record kinds:
//!
//! - an [`Installation`](claim::Installation) is the root of a history,
//!   identified by `(namespace, name)`;
//! - a [`Claim`](claim::Claim) records one intended operation against an
//!   installation;
//! - an [`OperationResult`](claim::OperationResult) records an outcome of a
//!   claim (a claim may accumulate several, e.g. `running` then `succeeded`);
//! - an [`Output`](claim::Output) is a named value produced by a result,
//!   stored encrypted when the bundle marks it sensitive.
//!
//! The [`ClaimStore`](claim::ClaimStore) persists these records through any
//! backing datastore implementing the [`Store`](storage::Store) contract and
//! keeps the installation's summary status consistent with the log as
//! claims and results are written.
//!
//! ## Example
//!
//! ```rust
//! use capstan_core::bundle::Bundle;
//! use capstan_core::claim::{Claim, ClaimStore, Installation, ACTION_INSTALL, STATUS_SUCCEEDED};
//! use capstan_core::storage::{BackingStore, MemoryStore};
//!
//! # fn main() -> Result<(), capstan_core::claim::ClaimError> {
//! let store = ClaimStore::new(BackingStore::new(MemoryStore::new()));
//!
//! let bundle = Bundle {
//!     version: "0.1.0".to_string(),
//!     ..Bundle::default()
//! };
//! let installation = Installation::new("", "wordpress", &bundle, "", "")?;
//! store.save_installation(&installation)?;
//!
//! let claim = Claim::new("wordpress", ACTION_INSTALL, bundle, "", "", None);
//! store.save_claim(&claim)?;
//! let result = claim.new_result(STATUS_SUCCEEDED);
//! store.save_result(&result)?;
//!
//! let status = store.read_installation("", "wordpress")?.status().to_string();
//! assert_eq!(status, STATUS_SUCCEEDED);
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod bundle;
pub mod claim;
pub mod id;
pub mod labels;
pub mod reference;
pub mod schema;
pub mod storage;

pub use bundle::Bundle;
pub use claim::{Claim, ClaimError, ClaimStore, Installation, OperationResult, Output};
pub use storage::{BackingStore, FileSystemStore, MemoryStore};
