//! Unit test module
//!
//! Middleware unit tests live here, separate from source files.
//! Tests drive middleware through a built bot, the way updates reach them in production.

mod middleware_test;
