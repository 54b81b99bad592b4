//! Custom resource definitions owned by the controller

pub mod foo;

pub use foo::{Foo, FooSpec, FooStatus};

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[path = "foo_test.rs"]
mod tests;
