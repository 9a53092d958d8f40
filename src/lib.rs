//! Serves registered project directories over HTTP as a filtered tree.

pub mod app;
