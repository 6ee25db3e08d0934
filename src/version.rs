//! Helpers for reporting on the compiled version of the library, useful when applications want to
//! log what build of the VFS they're running against.

/// Reports the full version and various useful build settings as a well-formatted and
/// semi-structured string.
pub fn full_version() -> String {
    format!(
        "build-profile={} build-timestamp={} features={} repo-version={}",
        env!("BUILD_PROFILE"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_FEATURES"),
        env!("REPO_VERSION"),
    )
}

/// Only the absolute core version information from the build.
pub fn minimal_version() -> String {
    format!("repo-version={}", env!("REPO_VERSION"))
}
