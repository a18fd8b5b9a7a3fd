//! The User-Agent string attached to every outgoing request, so cluster
//! operators can tell client versions and platforms apart in their logs.

use std::sync::OnceLock;

static USER_AGENT: OnceLock<String> = OnceLock::new();

/// Returns `findex-transport/<version> (rust/<msrv>; <os>/<arch>)`, built
/// on first use and cached for the life of the process.
pub fn user_agent() -> &'static str {
    USER_AGENT.get_or_init(|| {
        let os = match std::env::consts::OS {
            // Conventional UA spelling.
            "macos" => "darwin",
            os => os,
        };
        format!(
            "{}/{} (rust/{}; {}/{})",
            env!("CARGO_PKG_NAME"),
            env!("CARGO_PKG_VERSION"),
            env!("CARGO_PKG_RUST_VERSION"),
            os,
            std::env::consts::ARCH,
        )
    })
}
