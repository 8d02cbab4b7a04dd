//! Integration test driver for `tests/integration/` submodule.
//!
//! Each `mod` below maps to a file that exercises one area of the engine
//! against mock or simulated adapters.  All tests run on the host with no
//! radio hardware required.

mod ble_dispatch_tests;
mod mock_ports;
mod provisioning_flow_tests;
mod scan_tests;
