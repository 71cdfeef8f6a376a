#![cfg(feature = "test-utils")]

mod file_pipeline_test;
mod importer_test;
mod parallel_test;
mod pipeline_test;
