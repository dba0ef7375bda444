pub const APP_NAME: &str = "zbuild";

/// Build definition file used when none is given on the command line.
pub const DEFAULT_FILE: &str = "zbuild.yml";

/// Environment variable overriding the cache directory.
pub const CACHE_DIR_ENV: &str = "ZBUILD_CACHE_DIR";
