//! Logtree: browse an unstructured log file as a navigable keyword tree.

mod cli;
mod model;
mod tokenize;
mod tree;
mod tui;
mod view;

pub use cli::{run, DynError};
