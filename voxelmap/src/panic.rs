//! Panic reporting.
//!
//! [`init`] installs a hook that writes the panic location and message to
//! stderr, plus whatever the registered status callback reports (the CLI
//! registers the running export's progress), then chains to the previous
//! hook. [`panic_message`] extracts a readable message from a payload
//! caught with `catch_unwind`, which render workers and the simulation
//! thread use to turn panics into ordinary failures.

use std::any::Any;
use std::io::Write;
use std::panic::{self, PanicHookInfo};
use std::sync::{Mutex, OnceLock};

type StatusCallback = Box<dyn Fn() -> String + Send + Sync>;

static STATUS_CALLBACK: OnceLock<Mutex<Option<StatusCallback>>> = OnceLock::new();

/// Installs the panic hook. Later calls are ignored.
pub fn init() {
    if STATUS_CALLBACK.set(Mutex::new(None)).is_err() {
        return;
    }

    let original_hook = panic::take_hook();
    panic::set_hook(Box::new(move |info: &PanicHookInfo<'_>| {
        report(info);
        original_hook(info);
    }));
}

/// Registers a callback whose output is included in panic reports.
pub fn set_status_callback<F>(callback: F)
where
    F: Fn() -> String + Send + Sync + 'static,
{
    if let Some(slot) = STATUS_CALLBACK.get() {
        if let Ok(mut guard) = slot.lock() {
            *guard = Some(Box::new(callback));
        }
    }
}

/// Removes the status callback.
pub fn clear_status_callback() {
    if let Some(slot) = STATUS_CALLBACK.get() {
        if let Ok(mut guard) = slot.lock() {
            *guard = None;
        }
    }
}

/// Best-effort text of a caught panic payload.
pub fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

fn report(info: &PanicHookInfo<'_>) {
    // Logging may itself be broken, so go straight to stderr.
    let mut stderr = std::io::stderr().lock();

    let _ = writeln!(stderr);
    let _ = writeln!(stderr, "━━━ voxelmap panic ━━━");
    if let Some(location) = info.location() {
        let _ = writeln!(
            stderr,
            "Location: {}:{}:{}",
            location.file(),
            location.line(),
            location.column()
        );
    }
    if let Some(message) = info.payload().downcast_ref::<&str>() {
        let _ = writeln!(stderr, "Message:  {}", message);
    } else if let Some(message) = info.payload().downcast_ref::<String>() {
        let _ = writeln!(stderr, "Message:  {}", message);
    }

    if let Some(slot) = STATUS_CALLBACK.get() {
        // try_lock: the panic may have happened while the lock was held.
        if let Ok(guard) = slot.try_lock() {
            if let Some(callback) = guard.as_ref() {
                let _ = writeln!(stderr, "Status:   {}", callback());
            }
        }
    }
    let _ = writeln!(stderr);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_panic_message_str_and_string() {
        let caught = panic::catch_unwind(|| panic!("plain")).unwrap_err();
        assert_eq!(panic_message(caught), "plain");

        let caught = panic::catch_unwind(|| panic!("formatted {}", 7)).unwrap_err();
        assert_eq!(panic_message(caught), "formatted 7");

        let caught = panic::catch_unwind(|| std::panic::panic_any(42u8)).unwrap_err();
        assert_eq!(panic_message(caught), "unknown panic payload");
    }
}
