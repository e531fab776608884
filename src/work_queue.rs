//! Ambient timer/task scheduling. Grounded on the teacher's
//! `application::work_queue`: a main-thread FIFO for immediate re-entrant
//! callbacks (e.g. re-emitting a statement to self) plus a deadline-ordered
//! event queue the ballot and nomination timers post into.

use std::cell::RefCell;
use std::collections::{BTreeMap, VecDeque};
use std::rc::Rc;
use std::time::{Duration, SystemTime};

use crate::clock::HVirtualClock;

pub type Callback = Box<dyn FnOnce()>;

pub struct ClockEvent {
    pub timestamp: SystemTime,
    pub callback: Callback,
}

impl ClockEvent {
    pub fn new(timestamp: SystemTime, callback: Callback) -> Self {
        ClockEvent { timestamp, callback }
    }
}

pub type HWorkScheduler = Rc<RefCell<WorkScheduler>>;

pub struct WorkScheduler {
    main_thread_queue: MainWorkQueue,
    event_queue: EventQueue,
}

impl WorkScheduler {
    pub fn new(clock: HVirtualClock) -> Self {
        WorkScheduler { main_thread_queue: MainWorkQueue::default(), event_queue: EventQueue::new(clock) }
    }

    pub fn new_handle(clock: HVirtualClock) -> HWorkScheduler {
        Rc::new(RefCell::new(WorkScheduler::new(clock)))
    }

    pub fn post_on_main_thread(&mut self, callback: Callback) {
        self.main_thread_queue.push(callback);
    }

    pub fn execute_one_main_thread_task(&mut self) -> bool {
        self.main_thread_queue.execute_one()
    }

    pub fn execute_main_thread_tasks(&mut self) -> u64 {
        let mut executed = 0;
        while self.main_thread_queue.execute_one() {
            executed += 1;
        }
        executed
    }

    pub fn post_clock_event(&mut self, event: ClockEvent) {
        self.event_queue.add_task(event);
    }

    /// Runs every event whose deadline has passed, per the clock's current
    /// notion of "now".
    pub fn execute_expired_events(&mut self) {
        self.event_queue.execute_expired();
    }

    /// Arms `callback` to fire once `delay` has elapsed from the clock's
    /// current time. This is the concrete timer sink `ScpDriver::setup_timer`
    /// implementations delegate to (see `scp::driver::SchedulerTimers`).
    pub fn schedule_after(&mut self, delay: Duration, callback: Callback) {
        let deadline = self.event_queue.clock.borrow().time_now() + delay;
        self.post_clock_event(ClockEvent::new(deadline, callback));
    }
}

#[derive(Default)]
struct MainWorkQueue {
    tasks: VecDeque<Callback>,
}

impl MainWorkQueue {
    fn push(&mut self, callback: Callback) {
        self.tasks.push_back(callback);
    }

    fn execute_one(&mut self) -> bool {
        match self.tasks.pop_front() {
            Some(task) => {
                task();
                true
            }
            None => false,
        }
    }
}

struct EventQueue {
    clock: HVirtualClock,
    tasks: BTreeMap<SystemTime, Vec<Callback>>,
}

impl EventQueue {
    fn new(clock: HVirtualClock) -> Self {
        EventQueue { clock, tasks: BTreeMap::new() }
    }

    fn add_task(&mut self, event: ClockEvent) {
        self.tasks.entry(event.timestamp).or_default().push(event.callback);
    }

    fn execute_expired(&mut self) {
        let now = self.clock.borrow().time_now();
        let expired: Vec<SystemTime> = self.tasks.range(..=now).map(|(ts, _)| *ts).collect();
        for ts in expired {
            if let Some(callbacks) = self.tasks.remove(&ts) {
                for cb in callbacks {
                    cb();
                }
            }
        }
    }
}
