//! Version banner helpers shared by every binary in the workspace.

/// Canonical daemon program name.
pub const PROGRAM_NAME: &str = "oc-mirrord";

/// Workspace version string.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Renders the `-version` banner.
#[must_use]
pub fn version_banner() -> String {
    format!("{PROGRAM_NAME} {VERSION}\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn banner_contains_name_and_version() {
        let banner = version_banner();
        assert!(banner.starts_with(PROGRAM_NAME));
        assert!(banner.contains(VERSION));
        assert!(banner.ends_with('\n'));
    }
}
