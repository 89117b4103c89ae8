//! Command line handling for the supervisor process.
//!
//! Worker processes never reach this module: `main` detects
//! `ROBOTD_WORKER` before any argument parsing happens and dispatches
//! straight to [`crate::worker::run`].

use std::path::PathBuf;

use tracing::Level;

fn def_root_dir() -> PathBuf {
    PathBuf::from("/var/robotd")
}

pub struct Config {
    pub root_dir: PathBuf,
    log_level: Level,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            root_dir: def_root_dir(),
            log_level: Level::WARN,
        }
    }
}

impl Config {
    pub fn get_log_level(&self) -> Level {
        self.log_level
    }
}

/// Parses the process's `argv` into a `Config`. This is the entire
/// CLI surface: a single `--root-dir` flag, plus the `-v` verbosity
/// counter every daemon in this shape exposes.
pub fn from_cmdline() -> Config {
    use clap::{crate_version, Arg, ArgAction, Command};

    let mut cfg = Config::default();

    let matches = Command::new("robotd")
        .version(crate_version!())
        .about("Supervisor daemon for robotics peripherals")
        .arg(
            Arg::new("root_dir")
                .long("root-dir")
                .action(ArgAction::Set)
                .value_name("PATH")
                .help("Directory under which per-device sockets are created"),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .action(ArgAction::Count)
                .help("Sets verbosity of log; can be used more than once"),
        )
        .get_matches();

    if let Some(root_dir) = matches.get_one::<String>("root_dir") {
        cfg.root_dir = PathBuf::from(root_dir);
    }

    cfg.log_level = match matches.get_count("verbose") {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };

    cfg
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_root_dir_is_var_robotd() {
        assert_eq!(Config::default().root_dir, PathBuf::from("/var/robotd"));
    }

    #[test]
    fn default_log_level_is_warn() {
        assert_eq!(Config::default().get_log_level(), Level::WARN);
    }
}
