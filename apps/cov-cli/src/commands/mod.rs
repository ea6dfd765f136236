pub mod identity;
pub mod ledger;
pub mod manifest;
pub mod policy;
