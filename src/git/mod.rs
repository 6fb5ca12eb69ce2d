pub mod cli_parser;
pub mod refs;
pub mod repository;
pub mod snapshots;

#[cfg(any(test, feature = "test-support"))]
pub mod test_utils;
