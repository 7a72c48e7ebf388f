/// Version reported by `--version` and the startup log line.
///
/// Release builds may stamp `APP_VERSION`; otherwise the Cargo package version is used.
pub const AGENT_VERSION: &str = match option_env!("APP_VERSION") {
    Some(version) => version,
    None => env!("CARGO_PKG_VERSION"),
};
