//! Child process lifecycle management
//!
//! The engine drives long-running package-manager children. If lodestar
//! dies mid-batch those children must not keep mutating the system, so
//! every child spawns in its own process group with a parent-death signal,
//! and live PIDs sit in a global registry. Signal handlers SIGTERM the
//! surviving groups (SIGKILL after a grace period) before exiting.

use nix::libc;
use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use std::collections::HashSet;
use std::sync::{Arc, Mutex, OnceLock};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

static CHILD_REGISTRY: OnceLock<Arc<Mutex<ChildRegistry>>> = OnceLock::new();

/// Registry of child PIDs currently running.
#[derive(Debug, Default)]
pub struct ChildRegistry {
    pids: HashSet<u32>,
}

impl ChildRegistry {
    /// Get or create the global registry.
    pub fn global() -> Arc<Mutex<ChildRegistry>> {
        CHILD_REGISTRY
            .get_or_init(|| Arc::new(Mutex::new(ChildRegistry::default())))
            .clone()
    }

    pub fn register(&mut self, pid: u32) {
        self.pids.insert(pid);
        debug!("registered child PID {}", pid);
    }

    pub fn unregister(&mut self, pid: u32) {
        self.pids.remove(&pid);
        debug!("unregistered child PID {}", pid);
    }

    pub fn count(&self) -> usize {
        self.pids.len()
    }

    /// SIGTERM every tracked process group, wait up to `grace`, then
    /// SIGKILL whatever is still alive. Clears the registry.
    pub fn terminate_all(&mut self, grace: Duration) {
        if self.pids.is_empty() {
            return;
        }
        info!("terminating {} child process(es)", self.pids.len());
        let pids: Vec<u32> = self.pids.drain().collect();

        for &pid in &pids {
            // Group signal first so the tool's own children get it too
            if signal_group(pid, Signal::SIGTERM).is_err() {
                let _ = signal_pid(pid, Signal::SIGTERM);
            }
        }

        let start = Instant::now();
        while start.elapsed() < grace {
            if pids.iter().all(|&pid| !process_alive(pid)) {
                info!("all children exited after SIGTERM");
                return;
            }
            std::thread::sleep(Duration::from_millis(100));
        }

        for &pid in &pids {
            if process_alive(pid) {
                warn!("child {} survived SIGTERM, sending SIGKILL", pid);
                if signal_group(pid, Signal::SIGKILL).is_err() {
                    let _ = signal_pid(pid, Signal::SIGKILL);
                }
            }
        }
    }
}

fn signal_pid(pid: u32, sig: Signal) -> Result<(), nix::Error> {
    signal::kill(Pid::from_raw(pid as i32), sig)
}

/// Negative PID addresses the whole process group.
fn signal_group(pgid: u32, sig: Signal) -> Result<(), nix::Error> {
    signal::kill(Pid::from_raw(-(pgid as i32)), sig)
}

/// True when the PID exists and is not a zombie.
fn process_alive(pid: u32) -> bool {
    if signal::kill(Pid::from_raw(pid as i32), None).is_err() {
        return false;
    }
    // Field 3 of /proc/<pid>/stat is the state; Z and X are not alive
    if let Ok(stat) = std::fs::read_to_string(format!("/proc/{}/stat", pid)) {
        if let Some(state) = stat.split_whitespace().nth(2) {
            return !matches!(state, "Z" | "X");
        }
    }
    true
}

/// Install handlers for SIGINT, SIGTERM and SIGHUP that clean up children
/// before exiting. Call once at program start.
pub fn init_signal_handlers() -> Result<(), std::io::Error> {
    use signal_hook::consts::signal::{SIGHUP, SIGINT, SIGTERM};
    use signal_hook::iterator::Signals;

    let mut signals = Signals::new([SIGINT, SIGTERM, SIGHUP])?;

    std::thread::spawn(move || {
        for sig in signals.forever() {
            info!("received signal {}, cleaning up children", sig);
            if let Ok(mut registry) = ChildRegistry::global().lock() {
                registry.terminate_all(Duration::from_secs(3));
            }
            std::process::exit(128 + sig);
        }
    });

    Ok(())
}

/// Extension trait putting a spawned command in its own process group.
pub trait CommandProcessGroup {
    /// Run the child as the leader of a new process group and arrange for
    /// SIGTERM on parent death, so one group signal reaches the whole
    /// tool process tree.
    fn in_new_process_group(&mut self) -> &mut Self;
}

impl CommandProcessGroup for std::process::Command {
    fn in_new_process_group(&mut self) -> &mut Self {
        use std::os::unix::process::CommandExt;
        unsafe {
            self.pre_exec(|| {
                nix::unistd::setpgid(Pid::from_raw(0), Pid::from_raw(0))
                    .map_err(std::io::Error::other)?;
                if libc::prctl(libc::PR_SET_PDEATHSIG, libc::SIGTERM) == -1 {
                    return Err(std::io::Error::last_os_error());
                }
                Ok(())
            });
        }
        self
    }
}
