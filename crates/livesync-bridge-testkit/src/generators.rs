//! Proptest generators for property-based testing.

use proptest::prelude::*;

/// One path segment: no separators, never `.`/`..`, never reserved-prefixed.
pub fn path_segment() -> impl Strategy<Value = String> {
    "[a-z0-9][a-z0-9 .-]{0,11}".prop_map(String::from)
}

/// A relative global path of one to four segments.
pub fn global_path() -> impl Strategy<Value = String> {
    prop::collection::vec(path_segment(), 1..=4).prop_map(|segments| segments.join("/"))
}

/// A base directory: empty, or a `/`-terminated relative directory.
pub fn base_dir() -> impl Strategy<Value = String> {
    prop_oneof![
        Just(String::new()),
        "[a-z][a-z0-9]{0,7}/".prop_map(String::from),
        "[a-z][a-z0-9]{0,7}/[a-z][a-z0-9]{0,7}/".prop_map(String::from),
    ]
}
