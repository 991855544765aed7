// TMarks shared type definitions
// Each submodule defines types used across the application.

pub mod ai;
pub mod bookmark;
pub mod capture;
pub mod errors;
pub mod page;
pub mod remote;
pub mod settings;
pub mod tab_group;
