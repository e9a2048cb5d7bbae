//! Fuzz target for the TOML configuration parser.
//!
//! Run with: cargo +nightly fuzz run fuzz_config_parser
//!
//! Feeds arbitrary UTF-8 to `AppConfig::parse()`. Parsing and validation may
//! reject the input but must never panic; accepted configs must validate.

#![no_main]

use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(s) = std::str::from_utf8(data)
        && let Ok(config) = radiosleep_config::AppConfig::parse(s)
    {
        assert!(config.validate().is_ok());
        assert!(config.debounce.grace_period_ms > 0);
    }
});
