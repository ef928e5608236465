//! Process-wide signal disposition shared by every loop.
//!
//! Signal dispositions belong to the process, so this is the one place with
//! global state. Each loop that watches a signal registers its wake pipe here;
//! the handler writes the signal number into every registered pipe and the
//! loops dispatch to their own `Signal` handles when they drain the pipe.
//!
//! The handler only touches the atomic target table. The mutex-guarded
//! registry is used exclusively by install/uninstall on loop threads.

use std::mem;
use std::os::unix::io::RawFd;
use std::sync::Mutex;
use std::sync::atomic::{AtomicI32, Ordering};

use crate::error::{EBUSY, EINVAL};

const MAX_SIGNAL: usize = 65;
const TARGETS_PER_SIGNAL: usize = 16;
const NO_TARGET: i32 = -1;

static TARGETS: [[AtomicI32; TARGETS_PER_SIGNAL]; MAX_SIGNAL] =
    [const { [const { AtomicI32::new(NO_TARGET) }; TARGETS_PER_SIGNAL] }; MAX_SIGNAL];

struct Registration {
    signum: i32,
    fd: RawFd,
    slot: usize,
    refs: usize,
}

struct Previous {
    signum: i32,
    action: libc::sigaction,
}

// SAFETY: `sigaction` only holds integers, a signal mask and function
// addresses; none of it is tied to the thread that produced it.
unsafe impl Send for Previous {}

struct Registry {
    registrations: Vec<Registration>,
    previous: Vec<Previous>,
}

static REGISTRY: Mutex<Registry> = Mutex::new(Registry {
    registrations: Vec::new(),
    previous: Vec::new(),
});

extern "C" fn on_signal(signum: libc::c_int) {
    let saved = unsafe { *errno_location() };

    if let Some(targets) = TARGETS.get(signum as usize) {
        let byte = signum as u8;
        for target in targets {
            let fd = target.load(Ordering::Acquire);
            if fd != NO_TARGET {
                unsafe {
                    libc::write(fd, &byte as *const u8 as *const _, 1);
                }
            }
        }
    }

    unsafe { *errno_location() = saved };
}

#[cfg(any(target_os = "linux", target_os = "android"))]
unsafe fn errno_location() -> *mut libc::c_int {
    unsafe { libc::__errno_location() }
}

#[cfg(any(target_os = "macos", target_os = "ios", target_os = "freebsd"))]
unsafe fn errno_location() -> *mut libc::c_int {
    unsafe { libc::__error() }
}

/// Whether `signum` can be watched at all.
pub(crate) fn is_watchable(signum: i32) -> bool {
    signum > 0
        && (signum as usize) < MAX_SIGNAL
        && signum != libc::SIGKILL
        && signum != libc::SIGSTOP
}

/// Routes deliveries of `signum` to `fd`, installing the process handler on
/// first use. Registrations are reference counted per `(signum, fd)` pair.
pub(crate) fn install(signum: i32, fd: RawFd) -> Result<(), i32> {
    if !is_watchable(signum) {
        return Err(EINVAL);
    }

    let mut registry = REGISTRY.lock().unwrap_or_else(|e| e.into_inner());

    if let Some(existing) = registry
        .registrations
        .iter_mut()
        .find(|r| r.signum == signum && r.fd == fd)
    {
        existing.refs += 1;
        return Ok(());
    }

    let targets = &TARGETS[signum as usize];
    let slot = targets
        .iter()
        .position(|t| t.load(Ordering::Acquire) == NO_TARGET)
        .ok_or(EBUSY)?;

    let first_for_signal = !registry.registrations.iter().any(|r| r.signum == signum);
    if first_for_signal {
        let handler = on_signal as extern "C" fn(libc::c_int) as libc::sighandler_t;
        let previous = set_handler(signum, handler)?;
        registry.previous.push(Previous {
            signum,
            action: previous,
        });
    }

    targets[slot].store(fd, Ordering::Release);
    registry.registrations.push(Registration {
        signum,
        fd,
        slot,
        refs: 1,
    });

    log::debug!("watching signal {signum} (fd {fd})");
    Ok(())
}

/// Drops one registration of `(signum, fd)`; restores the previous
/// disposition once no loop watches `signum` anymore.
pub(crate) fn uninstall(signum: i32, fd: RawFd) {
    let mut registry = REGISTRY.lock().unwrap_or_else(|e| e.into_inner());

    let Some(index) = registry
        .registrations
        .iter()
        .position(|r| r.signum == signum && r.fd == fd)
    else {
        return;
    };

    let registration = &mut registry.registrations[index];
    registration.refs -= 1;
    if registration.refs > 0 {
        return;
    }

    TARGETS[signum as usize][registration.slot].store(NO_TARGET, Ordering::Release);
    registry.registrations.swap_remove(index);

    if registry.registrations.iter().any(|r| r.signum == signum) {
        return;
    }

    if let Some(pos) = registry.previous.iter().position(|p| p.signum == signum) {
        let previous = registry.previous.swap_remove(pos);
        unsafe {
            libc::sigaction(signum, &previous.action, std::ptr::null_mut());
        }
    }

    log::debug!("stopped watching signal {signum}");
}

fn set_handler(signum: i32, handler: libc::sighandler_t) -> Result<libc::sigaction, i32> {
    unsafe {
        let mut action: libc::sigaction = mem::zeroed();
        action.sa_sigaction = handler;
        action.sa_flags = libc::SA_RESTART;
        libc::sigfillset(&mut action.sa_mask);

        let mut previous: libc::sigaction = mem::zeroed();
        if libc::sigaction(signum, &action, &mut previous) != 0 {
            return Err(crate::error::last_status());
        }

        Ok(previous)
    }
}
