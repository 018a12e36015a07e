#![forbid(unsafe_code)]

// Value recorded when a piece of build metadata can't be determined, such as
// when building outside of a git checkout.
const UNKNOWN: &str = "unknown";

fn main() {
    set_env("GIT_BRANCH", build_data::get_git_branch());
    set_env("GIT_COMMIT_SHORT", build_data::get_git_commit_short());
    set_env("GIT_DIRTY", build_data::get_git_dirty().map(|d| d.to_string()));
    set_env("SOURCE_TIMESTAMP",   // Using BUILD_TIMESTAMP makes build unreproducible.
            build_data::get_source_time().map(build_data::format_timestamp));
    set_env("RUSTC_VERSION", build_data::get_rustc_version());

    // Tells cargo not to rebuild build.rs during debug builds when other files change.
    // This speeds up development builds.
    //build_data::no_debug_rebuilds();
}

fn set_env(key: &str, value: Result<String, String>) {
    let value = value.unwrap_or_else(|_| UNKNOWN.to_string());
    println!("cargo:rustc-env={}={}", key, value);
}
