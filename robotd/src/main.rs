//! `robotd`: supervisor daemon for robotics peripherals.
//!
//! The same binary plays two roles, distinguished by `$ROBOTD_WORKER`
//! before any CLI parsing happens: unset, it is the supervisor that
//! discovers devices and spawns workers; set, it is one re-exec'd
//! worker process, with its driver identity and device node handed
//! down over the environment rather than argv. Re-entering the same
//! binary in a worker mode stands in for `fork()`, which `#![deny(unsafe_code)]`
//! rules out.

#![deny(unsafe_code)]

mod config;
mod drivers;
mod notify;
mod supervisor;
mod worker;

use std::path::PathBuf;

use robotd_api::{DeviceNode, Error, Result};
use tracing::Level;

fn main() {
    let exit_code = match std::env::var_os("ROBOTD_WORKER") {
        Some(_) => run_worker(),
        None => run_supervisor(),
    };

    std::process::exit(exit_code);
}

fn run_supervisor() -> i32 {
    let cfg = config::from_cmdline();
    init_tracing(cfg.get_log_level());

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("failed to start async runtime: {}", e);
            return 1;
        }
    };

    match runtime.block_on(supervisor::run(cfg)) {
        Ok(()) => 0,
        Err(e) => {
            eprintln!("robotd: {}", e);
            1
        }
    }
}

fn run_worker() -> i32 {
    let env = match WorkerEnv::from_process_env() {
        Ok(env) => env,
        Err(e) => {
            eprintln!("robotd (worker): {}", e);
            return 1;
        }
    };

    init_tracing(env.log_level);

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("failed to start async runtime: {}", e);
            return 1;
        }
    };

    let span = tracing::info_span!("worker", type_id = %env.type_id, name = %env.instance_name);
    let _enter = span.enter();

    match runtime.block_on(worker::run(
        env.type_id,
        env.instance_name,
        env.node,
        env.root_dir,
        env.supervisor_pid,
    )) {
        Ok(()) => 0,
        Err(e) => {
            eprintln!("robotd (worker): {}", e);
            1
        }
    }
}

/// Everything a re-exec'd worker process needs, decoded from the
/// environment variables `supervisor::process::WorkerHandle::spawn`
/// sets on the child before it starts.
struct WorkerEnv {
    type_id: String,
    instance_name: String,
    node: DeviceNode,
    root_dir: PathBuf,
    log_level: Level,
    supervisor_pid: Option<u32>,
}

impl WorkerEnv {
    fn from_process_env() -> Result<Self> {
        let type_id = required_env("ROBOTD_TYPE_ID")?;
        let instance_name = required_env("ROBOTD_INSTANCE_NAME")?;
        let root_dir = PathBuf::from(required_env("ROBOTD_ROOT_DIR")?);
        let node_json = required_env("ROBOTD_NODE")?;
        let node: DeviceNode = serde_json::from_str(&node_json)?;

        let log_level = std::env::var("ROBOTD_LOG_LEVEL")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(Level::WARN);

        let supervisor_pid = std::env::var("ROBOTD_SUPERVISOR_PID")
            .ok()
            .and_then(|s| s.parse().ok());

        Ok(WorkerEnv {
            type_id,
            instance_name,
            node,
            root_dir,
            log_level,
            supervisor_pid,
        })
    }
}

fn required_env(key: &str) -> Result<String> {
    std::env::var(key).map_err(|_| Error::BadConfig(format!("missing {} in worker environment", key)))
}

fn init_tracing(level: Level) {
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .with_ansi(true)
        .init();
}
