//! Wall-clock abstraction. Grounded on the teacher's `application::clock`:
//! a thin wrapper the host can advance manually in tests (a "virtual" clock)
//! while production code drives it from `SystemTime::now()`.

use std::cell::RefCell;
use std::rc::Rc;
use std::time::SystemTime;

pub type HVirtualClock = Rc<RefCell<VirtualClock>>;

pub struct VirtualClock {
    time_now: SystemTime,
}

impl Default for VirtualClock {
    fn default() -> Self {
        VirtualClock { time_now: SystemTime::now() }
    }
}

impl VirtualClock {
    pub fn new(time_now: SystemTime) -> Self {
        VirtualClock { time_now }
    }

    pub fn new_handle() -> HVirtualClock {
        Rc::new(RefCell::new(VirtualClock::default()))
    }

    pub fn set_current_virtual_time(&mut self, time_now: SystemTime) {
        self.time_now = time_now;
    }

    pub fn time_now(&self) -> SystemTime {
        self.time_now
    }
}
