//! System-wide constants and fixed archive paths.

/// Separator placed between a module name and an entity name during merge.
pub const NAMESPACE_SEPARATOR: &str = "__";

/// Archive path of the merged compose document.
pub const ARCHIVE_COMPOSE_PATH: &str = "compose/docker-compose.yaml";
/// Archive path of the generated environment example.
pub const ARCHIVE_ENV_EXAMPLE_PATH: &str = "env/.env.example";
/// Archive path of the generated installer script.
pub const ARCHIVE_INSTALL_PATH: &str = "bin/install.sh";
/// Archive path of the generated verification script.
pub const ARCHIVE_VERIFY_PATH: &str = "bin/verify.sh";
/// Archive path of the package manifest.
pub const ARCHIVE_MANIFEST_PATH: &str = "manifest.json";

/// Archive prefix for rendered files and embedded assets.
pub const RESOURCES_PREFIX: &str = "resources";
/// Archive prefix scanned by `install.sh` for image tarballs.
pub const IMAGES_PREFIX: &str = "images";

/// File mode of generated shell scripts.
pub const SCRIPT_MODE: u32 = 0o755;
/// File mode of every other archive entry.
pub const FILE_MODE: u32 = 0o644;

/// SHA-256 digest length in hex characters.
pub const SHA256_HEX_LENGTH: usize = 64;

/// Default store prefix for uploaded bundles.
pub const DEFAULT_UPLOAD_PREFIX: &str = "packages";
/// Default base URL for generated deferred-download locations.
pub const DEFAULT_DOWNLOAD_BASE_URL: &str = "https://downloads.invalid/assets";
/// Default runtime directory on the installation host.
pub const DEFAULT_RUNTIME_DIR: &str = "/opt/stackpack";
/// Default grace period after `up -d`, in seconds.
pub const DEFAULT_STARTUP_GRACE_SECS: u64 = 10;
/// Default version stamped into package manifests.
pub const DEFAULT_PACKAGE_VERSION: &str = "1.0.0";

/// Environment variables the template `env` function may read by default.
pub const DEFAULT_ENV_ALLOW_LIST: &[&str] = &["HOSTNAME", "LANG", "TZ", "USER", "HOME"];

/// Application name used in CLI output and generated scripts.
pub const APP_NAME: &str = "stackpack";

/// Binary name for the CLI.
pub const BIN_NAME: &str = "spk";
