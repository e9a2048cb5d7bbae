//! Fuzz target for the power event line parsers.
//!
//! Run with: cargo +nightly fuzz run fuzz_event_lines
//!
//! Both the stdin protocol and `dbus-monitor` output arrive as untrusted text
//! lines; neither parser may panic on any input.

#![no_main]

use libfuzzer_sys::fuzz_target;
use radiosleep_core::events::logind::parse_monitor_line;
use radiosleep_core::events::parse_command_line;

fuzz_target!(|data: &[u8]| {
    let line = String::from_utf8_lossy(data);
    let _ = parse_command_line(&line);
    let _ = parse_monitor_line(&line);
});
