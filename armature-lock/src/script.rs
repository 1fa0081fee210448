//! Atomic compare-and-delete release script
//!
//! The script is a wire contract shared by every client of a lock key: it deletes
//! `KEYS[1]` only when its value is byte-for-byte equal to `ARGV[1]`, and returns
//! the number of keys removed (`1` or `0`). Changing its semantics breaks
//! compatibility with clients running the previous version, so any change must
//! bump [`RELEASE_SCRIPT_VERSION`].

/// Version of [`RELEASE_SCRIPT`]
pub const RELEASE_SCRIPT_VERSION: u32 = 1;

/// Lua source executed server-side on release
pub const RELEASE_SCRIPT: &str = r#"
if redis.call("get", KEYS[1]) == ARGV[1] then
    return redis.call("del", KEYS[1])
else
    return 0
end
"#;

/// Build the release script, ready for `EVALSHA` with `EVAL` fallback
#[cfg(feature = "redis")]
pub fn release_script() -> redis::Script {
    redis::Script::new(RELEASE_SCRIPT)
}
