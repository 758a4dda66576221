//! Work that runs on its own thread and is only waited for at exit.
//!
//! Tasks are started with [`spawn`] and forgotten.  Before the process exits,
//! [`join_all`] waits for every task that is still running.

use std::sync::Mutex;
use std::thread::{self, JoinHandle};

use once_cell::sync::Lazy;

static TASKS: Lazy<Mutex<Vec<JoinHandle<()>>>> = Lazy::new(|| Mutex::new(Vec::new()));

/// Runs `f` on a new thread.
pub fn spawn<F>(f: F)
where
    F: FnOnce() + Send + 'static,
{
    let handle = thread::spawn(f);

    let mut tasks = TASKS.lock().unwrap_or_else(|e| e.into_inner());
    tasks.push(handle);
}

/// Waits for all spawned tasks, including those spawned while waiting.
///
/// Returns the number of tasks that panicked.
pub fn join_all() -> usize {
    let mut panicked = 0;

    loop {
        let handles: Vec<JoinHandle<()>> = {
            let mut tasks = TASKS.lock().unwrap_or_else(|e| e.into_inner());
            tasks.drain(..).collect()
        };

        if handles.is_empty() {
            break;
        }

        for handle in handles {
            if handle.join().is_err() {
                panicked += 1;
            }
        }
    }

    panicked
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    // The task list is global, so everything is checked in one test.
    #[test]
    fn joins_all_tasks() {
        let count = Arc::new(AtomicUsize::new(0));

        for _ in 0..4 {
            let count = count.clone();
            spawn(move || {
                count.fetch_add(1, Ordering::SeqCst);
            });
        }

        {
            let count = count.clone();
            spawn(move || {
                let count = count.clone();
                spawn(move || {
                    count.fetch_add(10, Ordering::SeqCst);
                });
            });
        }

        spawn(|| panic!("task failure"));

        assert_eq!(join_all(), 1);
        assert_eq!(count.load(Ordering::SeqCst), 14);
        assert_eq!(join_all(), 0);
    }
}
