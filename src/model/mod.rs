pub mod asset;
pub mod business_unit;
pub mod department;
pub mod gl_account;
pub mod leave_request;
pub mod material_request;
pub mod overtime_request;
pub mod permission;
pub mod role;
pub mod user;
