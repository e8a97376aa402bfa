//! End-to-end tests driving a `ValidatedRouter` with in-process requests.
