mod error;
mod layout;
mod ledger;
mod packages;
mod state;

pub use error::{LedgerError, LedgerResult};
pub use layout::LedgerLayout;
pub use ledger::{MetadataLedger, RollbackOutcome};
pub use packages::{extract_archive, remove_package_dir, stage_bundle};
pub use state::{BinaryHashRecord, LedgerState, LEDGER_FORMAT_VERSION};

#[cfg(test)]
mod tests;
