//! Fiber-backed cooperative guest-thread scheduler.
//!
//! Ported from decaf-emu's `kernel_fibers.cpp`: a global scheduler mutex
//! guards a priority-ordered ready queue, per-core `current_thread` and
//! `dead_thread` slots, and the idle-fiber table. Priority 0 is highest,
//! 31 is lowest; the ready queue is kept sorted ascending by
//! `base_priority` with stable (FIFO) insertion via `upper_bound`.

use std::sync::{Arc, Mutex, MutexGuard};

use ppc_core::thread::{FiberHandle, ThreadState};
use ppc_core::OSThread;

use crate::fiber::Fiber;

pub const NUM_CORES: usize = 3;

struct QueuedFiber {
    fiber_idx: usize,
    thread: Arc<Mutex<OSThread>>,
}

/// Owns every live fiber; threads reference fibers by index
/// ([`FiberHandle`]) rather than by direct pointer, avoiding a reference
/// cycle between `ppc-core`'s thread model and this crate's fiber pool.
///
/// Each slot boxes its `Fiber` so a fiber's address stays stable across
/// the pool's backing `Vec` growing — load-bearing for [`Scheduler::swap`],
/// which keeps raw pointers to two fibers alive while the scheduler lock
/// is briefly released.
struct FiberPool {
    fibers: Vec<Option<Box<Fiber>>>,
}

impl FiberPool {
    fn new() -> Self {
        Self { fibers: Vec::new() }
    }

    fn alloc(&mut self, fiber: Fiber) -> FiberHandle {
        self.fibers.push(Some(Box::new(fiber)));
        FiberHandle((self.fibers.len() - 1) as u32)
    }

    fn get_mut(&mut self, handle: FiberHandle) -> &mut Fiber {
        self.fibers[handle.0 as usize].as_deref_mut().expect("fiber already destroyed")
    }

    fn destroy(&mut self, handle: FiberHandle) {
        self.fibers[handle.0 as usize] = None;
    }
}

struct SchedulerState {
    ready_queue: Vec<QueuedFiber>,
    current_thread: [Option<Arc<Mutex<OSThread>>>; NUM_CORES],
    dead_thread: [Option<Arc<Mutex<OSThread>>>; NUM_CORES],
    idle_fiber: [Option<FiberHandle>; NUM_CORES],
    pool: FiberPool,
}

/// The single global scheduler lock plus the state it protects.
///
/// Matches spec.md §5's "scheduler lock" invariant: the ready queue,
/// current-thread array, and dead-context slots are accessed only while
/// holding this mutex, and held times are bounded (no I/O, no allocation
/// beyond the one fiber creation in `queue_thread`).
pub struct Scheduler {
    state: Mutex<SchedulerState>,
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(SchedulerState {
                ready_queue: Vec::new(),
                current_thread: [None, None, None],
                dead_thread: [None, None, None],
                idle_fiber: [None, None, None],
                pool: FiberPool::new(),
            }),
        }
    }

    /// Record the calling host thread's own execution context as the
    /// core's idle fiber. Must be called once, from the host OS thread
    /// that owns `core`, before that thread enters its execution loop.
    pub fn init_core_fiber(&self, core: usize) {
        let mut st = self.state.lock().unwrap();
        let idle = Fiber::current_thread_context();
        let handle = st.pool.alloc(idle);
        st.idle_fiber[core] = Some(handle);
        st.current_thread[core] = None;
        st.dead_thread[core] = None;
    }

    pub fn current_thread(&self, core: usize) -> Option<Arc<Mutex<OSThread>>> {
        self.state.lock().unwrap().current_thread[core].clone()
    }

    /// `queue_thread` (scheduler lock held): lazily creates the thread's
    /// fiber, inserts it into the ready queue at its priority slot, then
    /// wakes any idle core that has a runnable, affinity-matching fiber.
    pub fn queue_thread<F>(&self, thread: Arc<Mutex<OSThread>>, make_entry: F, mut wake_core: impl FnMut(usize))
    where
        F: FnOnce() + Send + 'static,
    {
        let mut st = self.state.lock().unwrap();

        let fiber_idx = {
            let mut t = thread.lock().unwrap();
            match t.fiber {
                Some(h) => h.0 as usize,
                None => {
                    let fiber = Fiber::new(make_entry);
                    let handle = st.pool.alloc(fiber);
                    t.fiber = Some(handle);
                    handle.0 as usize
                }
            }
        };

        Self::insert_ready_locked(&mut st, fiber_idx, Arc::clone(&thread));

        for core in 0..NUM_CORES {
            if st.current_thread[core].is_none() && Self::peek_next_locked(&st, core).is_some() {
                wake_core(core);
            }
        }
    }

    /// `peek_next` (scheduler lock held): first queued fiber whose thread
    /// is Ready, not suspended, and whose affinity mask includes `core`.
    fn peek_next_locked(st: &SchedulerState, core: usize) -> Option<usize> {
        st.ready_queue.iter().position(|q| {
            let t = q.thread.lock().unwrap();
            t.is_runnable(core)
        })
    }

    /// Insert `thread` into the priority-sorted ready queue, after any
    /// already-queued thread of equal priority (stable FIFO ordering).
    /// Shared by `queue_thread` and `reschedule`'s reinsertion of a
    /// displaced-but-still-runnable current thread.
    fn insert_ready_locked(st: &mut SchedulerState, fiber_idx: usize, thread: Arc<Mutex<OSThread>>) {
        let priority = thread.lock().unwrap().base_priority;
        let pos = st
            .ready_queue
            .iter()
            .position(|q| q.thread.lock().unwrap().base_priority > priority)
            .unwrap_or(st.ready_queue.len());
        st.ready_queue.insert(pos, QueuedFiber { fiber_idx, thread });
    }

    /// `reschedule(yielding)`: the sole mechanism by which a fiber switch
    /// happens. Must be called from inside the fiber currently bound to
    /// `core`. Returns only after a different fiber has run and yielded
    /// control back (or immediately, if no switch was warranted).
    pub fn reschedule(&self, core: usize, yielding: bool) {
        let mut st = self.state.lock().unwrap();

        let next_pos = Self::peek_next_locked(&st, core);
        let current = st.current_thread[core].clone();

        if let (Some(cur), Some(pos)) = (&current, next_pos) {
            let cur_pri = cur.lock().unwrap().base_priority;
            let next_pri = st.ready_queue[pos].thread.lock().unwrap().base_priority;
            let runnable = {
                let c = cur.lock().unwrap();
                c.suspend_counter <= 0 && c.state == ThreadState::Running
            };
            if runnable {
                let transfer = if yielding { cur_pri <= next_pri } else { cur_pri > next_pri };
                if !transfer {
                    return;
                }
            }
        } else if next_pos.is_none() {
            return;
        }

        if let Some(cur) = &current {
            let mut c = cur.lock().unwrap();
            if c.state == ThreadState::Running {
                c.state = ThreadState::Ready;
            }
        }

        let next_pos = match next_pos {
            Some(p) => p,
            None => {
                self.swap_to_idle(st, core);
                return;
            }
        };

        let next = st.ready_queue.remove(next_pos);
        {
            let mut t = next.thread.lock().unwrap();
            t.state = ThreadState::Running;
        }
        st.current_thread[core] = Some(Arc::clone(&next.thread));

        // The displaced thread was just marked `Ready` above (unless this
        // core had no current thread at all) — reinsert it at its
        // priority slot, same as `queue_thread`, so it is observably
        // still queued rather than vanishing from the ready queue while
        // merely flagged `Ready`.
        if let Some(cur) = &current {
            let (still_ready, fiber) = {
                let c = cur.lock().unwrap();
                (c.state == ThreadState::Ready, c.fiber)
            };
            if still_ready {
                let fiber_idx = fiber.expect("running thread has no fiber").0 as usize;
                Self::insert_ready_locked(&mut st, fiber_idx, Arc::clone(cur));
            }
        }

        let from_handle = current
            .as_ref()
            .and_then(|c| c.lock().unwrap().fiber)
            .or(st.idle_fiber[core]);
        let to_handle = FiberHandle(next.fiber_idx as u32);

        let mut st = self.swap(st, from_handle, to_handle);
        self.check_dead_context(&mut st, core);
    }

    fn swap_to_idle<'a>(&'a self, mut st: MutexGuard<'a, SchedulerState>, core: usize) {
        let current = st.current_thread[core].take();
        let from_handle = current.as_ref().and_then(|c| c.lock().unwrap().fiber);
        let to_handle = st.idle_fiber[core];
        st = self.swap(st, from_handle, to_handle);
        self.check_dead_context(&mut st, core);
    }

    /// Perform the actual fiber switch, releasing the scheduler lock for
    /// its duration and re-acquiring it once some fiber has swapped back
    /// to the caller. The fiber being switched into routinely calls back
    /// into `reschedule`/`exit_thread_no_lock` itself — any guest `sc`
    /// dispatch does, see `ppc-syscall::handlers::exit_handler` — and
    /// `state` is not a reentrant lock, so it must already be unlocked by
    /// the time `swap_to` jumps onto that fiber's stack.
    fn swap<'a>(
        &'a self,
        mut st: MutexGuard<'a, SchedulerState>,
        from: Option<FiberHandle>,
        to: Option<FiberHandle>,
    ) -> MutexGuard<'a, SchedulerState> {
        let (Some(from), Some(to)) = (from, to) else { return st };
        if from.0 == to.0 {
            return st;
        }

        let from_ptr: *mut Fiber = st.pool.get_mut(from);
        let to_ptr: *mut Fiber = st.pool.get_mut(to);
        drop(st);

        // SAFETY: both pointers name live, heap-boxed fibers (`FiberPool`
        // boxes every slot precisely so these addresses survive the pool
        // growing while the lock above is released); the bookkeeping that
        // ran under the lock guarantees no other thread can be mid-swap
        // on either fiber right now.
        unsafe {
            (*to_ptr).swap_to(&mut *from_ptr);
        }

        self.state.lock().unwrap()
    }

    /// Must run right after the fiber switch that placed a thread on
    /// `dead_thread[core]`, under the same lock that performed the switch.
    fn check_dead_context(&self, st: &mut SchedulerState, core: usize) {
        if let Some(dead) = st.dead_thread[core].take() {
            let handle = dead.lock().unwrap().fiber.take().expect("dead thread has no fiber");
            st.ready_queue.retain(|q| q.fiber_idx != handle.0 as usize);
            st.pool.destroy(handle);
        }
    }

    /// `exit_thread_no_lock`: remove the calling fiber from the ready
    /// queue, mark it dead, and unconditionally swap away to the idle
    /// fiber. Never returns into the caller (the fiber that called this
    /// is destroyed by [`Self::check_dead_context`] once control has
    /// left its stack).
    ///
    /// This must swap unconditionally rather than going through
    /// [`Self::reschedule`]: `reschedule`'s "nothing else is ready, keep
    /// running the current fiber" shortcut is correct for a thread that
    /// is merely yielding, but an exiting thread cannot keep running on
    /// its own stack at all, ready queue or not.
    pub fn exit_thread_no_lock(&self, core: usize) {
        let mut st = self.state.lock().unwrap();
        if let Some(thread) = st.current_thread[core].clone() {
            let handle = thread.lock().unwrap().fiber;
            if let Some(handle) = handle {
                st.ready_queue.retain(|q| q.fiber_idx != handle.0 as usize);
            }
            st.dead_thread[core] = Some(thread);
        }
        self.swap_to_idle(st, core);
    }

    /// Whether `thread` currently sits in the ready queue — queued on
    /// some core's behalf but not the one actually running it.
    pub fn is_ready_queued(&self, thread: &Arc<Mutex<OSThread>>) -> bool {
        let st = self.state.lock().unwrap();
        st.ready_queue.iter().any(|q| Arc::ptr_eq(&q.thread, thread))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn priority_preemption_orders_ready_queue() {
        let sched = Scheduler::new();
        sched.init_core_fiber(0);

        let ran = Arc::new(AtomicU32::new(0));

        let mut a = OSThread::new(1, 0, 0, 0);
        a.base_priority = 16;
        a.state = ThreadState::Running;
        let a = Arc::new(Mutex::new(a));
        sched.queue_thread(Arc::clone(&a), || {}, |_| {});
        {
            // Simulate A already running by binding current_thread directly.
            sched.state.lock().unwrap().current_thread[0] = Some(Arc::clone(&a));
            sched.state.lock().unwrap().ready_queue.clear();
        }

        let ran_b = Arc::clone(&ran);
        let mut b = OSThread::new(2, 0, 0, 0);
        b.base_priority = 8;
        let b = Arc::new(Mutex::new(b));
        sched.queue_thread(
            Arc::clone(&b),
            move || {
                ran_b.fetch_add(1, Ordering::SeqCst);
            },
            |_| {},
        );

        // B has strictly higher priority (lower number) than running A.
        let st = sched.state.lock().unwrap();
        assert_eq!(st.ready_queue.len(), 1);
        assert_eq!(st.ready_queue[0].thread.lock().unwrap().id, 2);
    }
}
