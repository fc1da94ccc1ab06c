//! End-to-end tests driving real WASM contracts (assembled from WAT)
//! through the dispatcher.

mod util;

mod auth_test;
mod clock_test;
mod db_test;
mod dispatch_test;
