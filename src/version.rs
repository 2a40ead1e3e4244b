//! Build version, stamped with git metadata when available.

/// Package version from Cargo.toml.
pub const PKG_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Git branch at build time, or "unknown" outside a checkout.
pub const GIT_BRANCH: &str = match option_env!("VERGEN_GIT_BRANCH") {
    Some(branch) => branch,
    None => "unknown",
};

/// Short commit SHA at build time, or "unknown" outside a checkout.
pub const GIT_SHA: &str = match option_env!("VERGEN_GIT_SHA") {
    Some(sha) => sha,
    None => "unknown",
};

pub fn git_dirty() -> bool {
    option_env!("VERGEN_GIT_DIRTY") == Some("true")
}

/// `{version}+{branch}.{sha}`, with a `.dirty` suffix for modified trees.
///
/// Without git metadata this is just the package version, e.g. `0.1.0`.
pub fn version_string() -> String {
    if GIT_SHA == "unknown" {
        return PKG_VERSION.to_string();
    }
    let dirty_suffix = if git_dirty() { ".dirty" } else { "" };
    format!(
        "{PKG_VERSION}+{GIT_BRANCH}.{}{dirty_suffix}",
        &GIT_SHA[..7.min(GIT_SHA.len())]
    )
}
