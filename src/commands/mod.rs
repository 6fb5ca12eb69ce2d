pub mod blame_cmd;
pub mod hook_cmd;
pub mod hook_installer;
pub mod reset_cmd;
pub mod traces_cmd;
