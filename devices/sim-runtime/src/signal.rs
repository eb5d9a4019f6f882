use std::sync::{Condvar, Mutex};

/// 值 + 条件变量。等待方睡眠而不是空转。
pub(crate) struct SimSignal {
    value: Mutex<i64>,
    cond: Condvar,
}

impl SimSignal {
    pub fn new(initial: i64) -> Self {
        Self {
            value: Mutex::new(initial),
            cond: Condvar::new(),
        }
    }

    pub fn load(&self) -> i64 {
        *self.value.lock().unwrap()
    }

    pub fn store(&self, val: i64) {
        *self.value.lock().unwrap() = val;
        self.cond.notify_all()
    }

    pub fn subtract(&self, val: i64) {
        *self.value.lock().unwrap() -= val;
        self.cond.notify_all()
    }

    pub fn wait_lt(&self, compare: i64) -> i64 {
        let guard = self.value.lock().unwrap();
        *self
            .cond
            .wait_while(guard, |value| *value >= compare)
            .unwrap()
    }
}

#[test]
fn test_wait_wakes_on_subtract() {
    use std::{sync::Arc, thread, time::Duration};

    let signal = Arc::new(SimSignal::new(1));
    let waiter = {
        let signal = signal.clone();
        thread::spawn(move || signal.wait_lt(1))
    };
    thread::sleep(Duration::from_millis(20));
    assert!(!waiter.is_finished());
    signal.subtract(1);
    assert_eq!(waiter.join().unwrap(), 0);
    assert_eq!(signal.load(), 0);
}
