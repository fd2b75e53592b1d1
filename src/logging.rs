// Logging setup - env_logger behind the log facade
//
// RUST_LOG wins when set; otherwise the configured filter applies.

use env_logger::Env;

pub fn init(default_filter: &str) {
    let env = Env::default().default_filter_or(default_filter);
    // A second init (tests, embedded use) is harmless
    let _ = env_logger::Builder::from_env(env)
        .format_timestamp_secs()
        .try_init();
}
