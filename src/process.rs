//! Cooperative shutdown of the render process tree.
//!
//! Blender forks helper workers for some render paths, so killing only the
//! spawned pid can leave orphans burning CPU. The controller enumerates the
//! whole tree, asks every member to terminate (children before the root),
//! waits out a grace period, and force-kills whatever is still around.

use std::time::{Duration, Instant};
use sysinfo::{Pid, ProcessRefreshKind, ProcessStatus, ProcessesToUpdate, Signal, System};
use tokio::time::sleep;

pub const DEFAULT_GRACE_PERIOD: Duration = Duration::from_secs(5);

const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// How a cancellation request resolved. Every variant is a success from the
/// session's point of view - the job is no longer running afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelOutcome {
    /// Everything exited voluntarily within the grace period.
    Terminated,
    /// At least one process had to be force-killed.
    ForceKilled,
    /// The job had already reached a terminal state before cancel was asked.
    AlreadyExited,
    /// The process was gone when enumeration began - it raced natural
    /// completion and lost.
    NotFound,
}

/// Terminate `pid` and every descendant it spawned, escalating to a forced
/// kill after `grace_period`. Resolves even when force-kill was required.
pub async fn terminate_tree(pid: u32, grace_period: Duration) -> CancelOutcome {
    let root = Pid::from_u32(pid);
    let mut system = System::new();
    refresh(&mut system);

    if !is_alive(&system, root) {
        log::info!("render process {pid} was already gone when cancellation began");
        return CancelOutcome::NotFound;
    }

    // children first, the root process last
    let targets = collect_tree(&system, root);
    log::info!(
        "terminating render process {pid} and {} descendant(s)",
        targets.len() - 1
    );
    for target in &targets {
        if let Some(process) = system.process(*target) {
            // platforms without signal support fall straight to kill
            if process.kill_with(Signal::Term).is_none() {
                process.kill();
            }
        }
    }

    let deadline = Instant::now() + grace_period;
    loop {
        sleep(POLL_INTERVAL).await;
        refresh(&mut system);
        let alive = targets
            .iter()
            .filter(|target| is_alive(&system, **target))
            .count();
        if alive == 0 {
            return CancelOutcome::Terminated;
        }
        if Instant::now() >= deadline {
            break;
        }
    }

    for target in &targets {
        if let Some(process) = system.process(*target) {
            log::warn!("force-killing render process {target} after grace period");
            process.kill();
        }
    }
    CancelOutcome::ForceKilled
}

fn refresh(system: &mut System) {
    system.refresh_processes_specifics(ProcessesToUpdate::All, ProcessRefreshKind::everything());
}

fn is_alive(system: &System, pid: Pid) -> bool {
    match system.process(pid) {
        None => false,
        // a killed child shows as a zombie until the drainer reaps it
        Some(process) => !matches!(process.status(), ProcessStatus::Zombie | ProcessStatus::Dead),
    }
}

/// Depth-first walk of the process table rooted at `root`, descendants
/// before the root itself.
fn collect_tree(system: &System, root: Pid) -> Vec<Pid> {
    let mut descendants = Vec::new();
    let mut stack = vec![root];
    while let Some(parent) = stack.pop() {
        for (pid, process) in system.processes() {
            if process.parent() == Some(parent) {
                descendants.push(*pid);
                stack.push(*pid);
            }
        }
    }
    descendants.push(root);
    descendants
}

#[cfg(test)]
#[cfg(unix)]
mod tests {
    use super::*;
    use std::process::Stdio;
    use tokio::process::Command;

    #[tokio::test]
    async fn terminates_a_live_process_within_grace() {
        let mut child = Command::new("sh")
            .args(["-c", "sleep 30"])
            .stdout(Stdio::null())
            .spawn()
            .unwrap();
        let pid = child.id().unwrap();

        let outcome = terminate_tree(pid, Duration::from_secs(5)).await;
        assert_eq!(outcome, CancelOutcome::Terminated);

        let status = child.wait().await.unwrap();
        assert!(!status.success());
    }

    #[tokio::test]
    async fn missing_process_reports_not_found() {
        let mut child = Command::new("true").spawn().unwrap();
        let pid = child.id().unwrap();
        child.wait().await.unwrap();

        let outcome = terminate_tree(pid, Duration::from_millis(200)).await;
        assert_eq!(outcome, CancelOutcome::NotFound);
    }
}
