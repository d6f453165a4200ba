pub mod args;
pub mod error;
pub mod event;
pub mod format;
pub mod mode;
pub mod project_info;
pub mod status;
