pub mod approval;
pub mod asset;
pub mod calendar;
pub mod depreciation;
pub mod leave;
pub mod ledger;
pub mod material;
pub mod overtime;
