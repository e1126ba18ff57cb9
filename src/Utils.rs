/// saving solutions to txt and csv files
pub mod logger;
/// terminal and file logging setup
pub mod logging;
