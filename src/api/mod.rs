pub mod approval;
pub mod asset;
pub mod business_unit;
pub mod department;
pub mod depreciation;
pub mod gl_account;
pub mod leave_request;
pub mod material_request;
pub mod me;
pub mod overtime_request;
pub mod user;
