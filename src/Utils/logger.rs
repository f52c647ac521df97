use chrono::Local;
use log::LevelFilter;
use simplelog::{
    ColorChoice, CombinedLogger, Config, SharedLogger, TermLogger, TerminalMode, WriteLogger,
};
use std::fs::File;

/// Maps the solver loglevel strings to a level filter. `None`, "none" and "off"
/// switch logging off; unknown strings fall back to Info.
pub fn level_filter(loglevel: Option<&str>) -> LevelFilter {
    match loglevel.map(|s| s.to_lowercase()) {
        None => LevelFilter::Off,
        Some(level) => match level.as_str() {
            "debug" => LevelFilter::Debug,
            "info" => LevelFilter::Info,
            "warn" => LevelFilter::Warn,
            "error" => LevelFilter::Error,
            "off" | "none" => LevelFilter::Off,
            _ => LevelFilter::Info,
        },
    }
}

/// Installs a terminal logger and, if `to_file` is set, a file logger named
/// after the current time. A logger that is already installed is kept.
pub fn init_logger(loglevel: Option<&str>, to_file: bool) {
    let level = level_filter(loglevel);
    if level == LevelFilter::Off {
        return;
    }
    let mut loggers: Vec<Box<dyn SharedLogger>> = vec![TermLogger::new(
        level,
        Config::default(),
        TerminalMode::Mixed,
        ColorChoice::Auto,
    )];
    if to_file {
        let name = format!("nonlinear_solver_{}.log", Local::now().format("%Y-%m-%d_%H-%M-%S"));
        match File::create(&name) {
            Ok(file) => loggers.push(WriteLogger::new(level, Config::default(), file)),
            Err(e) => eprintln!("cannot create log file {}: {}", name, e),
        }
    }
    // the only error is "logger already set"
    let _ = CombinedLogger::init(loggers);
}
