//! Claim data: the record of everything ever done to an installation.
//!
//! There are four kinds of claim data: [`Installation`], [`Claim`],
//! [`OperationResult`] and [`Output`]. How they are stored is not dictated
//! by a particular backend; the access patterns are built around the lowest
//! common denominator (a filesystem), and backends with richer metadata are
//! free to optimize.
//!
//! Claims are grouped by installation name and keyed by claim id. Results
//! are grouped by claim id and keyed by result id. Outputs are grouped by
//! result id and keyed by `RESULTID-OUTPUTNAME` to make them unique across
//! executions. The general layout, assuming a filesystem backend:
//!
//! ```text
//! installations/
//!   INSTALLATION
//! claims/
//!   INSTALLATION/
//!     CLAIM_ID
//! results/
//!   CLAIM_ID/
//!     RESULT_ID
//! outputs/
//!   RESULT_ID/
//!     RESULT_ID-OUTPUT_NAME
//! ```

mod error;
mod installation;
mod output;
mod record;
mod result;
mod store;


pub use error::ClaimError;
pub use installation::{
    installation_key, sort_by_modified, sort_by_name, Installation, InstallationStatus,
};
pub use output::{Output, Outputs};
pub use record::{
    sort_claims, Claim, ACTION_INSTALL, ACTION_UNINSTALL, ACTION_UNKNOWN, ACTION_UPGRADE,
};
pub use result::{
    sort_results, OperationResult, OutputMetadata, STATUS_CANCELED, STATUS_FAILED, STATUS_RUNNING,
    STATUS_SUCCEEDED, STATUS_UNKNOWN,
};
pub use store::{
    ClaimStore, KIND_CLAIMS, KIND_INSTALLATIONS, KIND_OUTPUTS, KIND_RESULTS,
};
