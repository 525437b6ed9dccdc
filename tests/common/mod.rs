#![allow(dead_code)]

pub use scratchrun_test_utils::{fast_settings, init_tracing, leftover_workspaces, with_timeout};
