//! 日志初始化

use log::LevelFilter;
use simplelog::{Config, SimpleLogger};

/// 初始化日志，verbose打开Debug级别
pub fn init_logger(verbose: bool) {
    let level = if verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    let _ = SimpleLogger::init(level, Config::default());
}
