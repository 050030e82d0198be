//! Alarm service: a dedicated host thread that raises the per-core ALARM
//! interrupt when a core's `next_alarm` deadline passes.
//!
//! Ported from decaf-emu's `cpu_alarm.cpp`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

use crate::scheduler::NUM_CORES;

struct AlarmData {
    next_alarm: [Option<Instant>; NUM_CORES],
}

pub struct AlarmService {
    data: Mutex<AlarmData>,
    cv: Condvar,
    running: AtomicBool,
}

impl Default for AlarmService {
    fn default() -> Self {
        Self::new()
    }
}

impl AlarmService {
    pub fn new() -> Self {
        Self {
            data: Mutex::new(AlarmData { next_alarm: [None; NUM_CORES] }),
            cv: Condvar::new(),
            running: AtomicBool::new(false),
        }
    }

    /// `set_next_alarm(core, t)`: updates the core's deadline and wakes
    /// the alarm thread so it can recompute its wait.
    pub fn set_next_alarm(&self, core: usize, time: Instant) {
        let mut data = self.data.lock().unwrap();
        data.next_alarm[core] = Some(time);
        self.cv.notify_all();
    }

    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        self.cv.notify_all();
    }

    /// Spawn the dedicated alarm thread. `raise_alarm(core)` must set the
    /// ALARM bit in that core's pending-interrupt mask with `Release`
    /// ordering and wake its execution loop.
    pub fn spawn(self: &Arc<Self>, mut raise_alarm: impl FnMut(usize) + Send + 'static) -> std::thread::JoinHandle<()> {
        self.running.store(true, Ordering::SeqCst);
        let this = Arc::clone(self);
        std::thread::Builder::new()
            .name("ppc-alarm".into())
            .spawn(move || {
                while this.running.load(Ordering::SeqCst) {
                    let mut guard = this.data.lock().unwrap();
                    let now = Instant::now();
                    let mut next_deadline: Option<Instant> = None;

                    for core in 0..NUM_CORES {
                        match guard.next_alarm[core] {
                            Some(t) if t <= now => {
                                guard.next_alarm[core] = None;
                                raise_alarm(core);
                            }
                            Some(t) => {
                                next_deadline = Some(match next_deadline {
                                    Some(d) if d <= t => d,
                                    _ => t,
                                });
                            }
                            None => {}
                        }
                    }

                    if let Some(deadline) = next_deadline {
                        let timeout = deadline.saturating_duration_since(Instant::now());
                        let _ = this.cv.wait_timeout(guard, timeout).unwrap();
                    } else {
                        let _ = this.cv.wait_timeout(guard, Duration::from_millis(50)).unwrap();
                    }
                }
            })
            .expect("failed to spawn alarm thread")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;

    #[test]
    fn raises_alarm_after_deadline() {
        let svc = Arc::new(AlarmService::new());
        let fired = Arc::new(AtomicU32::new(0));
        let fired2 = Arc::clone(&fired);
        let handle = svc.spawn(move |_core| {
            fired2.fetch_add(1, Ordering::SeqCst);
        });

        svc.set_next_alarm(0, Instant::now() + Duration::from_millis(10));
        std::thread::sleep(Duration::from_millis(100));
        assert!(fired.load(Ordering::SeqCst) >= 1);

        svc.stop();
        handle.join().unwrap();
    }
}
