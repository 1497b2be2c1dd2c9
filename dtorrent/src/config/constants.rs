//! Names of the settings recognised in a `Cfg` file, plus the minimum
//! number of settings a file must declare to be considered complete.

pub const TCP_PORT: &str = "TCP_PORT";
pub const LOG_DIRECTORY: &str = "LOG_DIRECTORY";
pub const DOWNLOAD_DIRECTORY: &str = "DOWNLOAD_DIRECTORY";
pub const PIPELINING_SIZE: &str = "PIPELINING_SIZE";
pub const READ_WRITE_SECONDS_TIMEOUT: &str = "READ_WRITE_SECONDS_TIMEOUT";
pub const MAX_PEERS_PER_TORRENT: &str = "MAX_PEERS_PER_TORRENT";
pub const MAX_LOG_FILE_KB_SIZE: &str = "MAX_LOG_FILE_KB_SIZE";

pub const UPLOAD_RATE_LIMIT: &str = "UPLOAD_RATE_LIMIT";
pub const DOWNLOAD_RATE_LIMIT: &str = "DOWNLOAD_RATE_LIMIT";
pub const MAX_UPLOADS: &str = "MAX_UPLOADS";
pub const MAX_CONNECTIONS: &str = "MAX_CONNECTIONS";
pub const HALF_OPEN_LIMIT: &str = "HALF_OPEN_LIMIT";
pub const LISTEN_PORT_LO: &str = "LISTEN_PORT_LO";
pub const LISTEN_PORT_HI: &str = "LISTEN_PORT_HI";
pub const EXTENSIONS_ENABLED: &str = "EXTENSIONS_ENABLED";

pub const MIN_SETTINGS: usize = 7;
