//! Name given to the dedicated thread the logger's receiver runs on.

pub const LOGGER_THREAD_NAME: &str = "logger-receiver";
