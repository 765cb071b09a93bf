//! Constants for the download module (tunable defaults, hosts, file naming).

use std::time::Duration;

/// Default per-request connect/read timeout (30 seconds).
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Default size of each write to the temp file (1 MiB).
pub const DEFAULT_CHUNK_SIZE_BYTES: usize = 1024 * 1024;

/// Default fixed delay between retry attempts (5 seconds).
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(5);

/// Suffix appended to the final path while a transfer is in flight.
pub const TEMP_SUFFIX: &str = ".tmp";

/// Name used when neither the response nor the URL yields a usable file name.
pub const FALLBACK_FILENAME: &str = "download.bin";

/// Model hub host rewritten when mirroring is enabled.
pub const DEFAULT_SOURCE_HOST: &str = "huggingface.co";

/// Mirror host substituted for [`DEFAULT_SOURCE_HOST`].
pub const DEFAULT_MIRROR_HOST: &str = "hf-mirror.com";
