#![no_main]
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(s) = std::str::from_utf8(data) {
        if let Ok(config) = convo_store::Config::from_toml_str(s) {
            let _ = config.validate();
        }
    }
});
