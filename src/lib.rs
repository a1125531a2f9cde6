pub mod cleanup;
pub mod compare;
pub mod config;
pub mod create;
pub mod delete;
pub mod directive;
pub mod git_utils;
pub mod hooks;
pub mod index;
pub mod list;
pub mod prompt;
pub mod spinner;
pub mod status;
pub mod user_config;
pub mod worktree;

#[cfg(test)]
mod test_support;
