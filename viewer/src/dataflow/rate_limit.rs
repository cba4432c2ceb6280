//! Rate limiting for high-frequency input (wheel, drag-move, scroll).
//!
//! Nothing here spawns timers. Pending values are released by `poll`, which the
//! viewer calls once per animation frame.

use crate::clock::SharedClock;
use std::time::Duration;

/// Leading-edge throttle that keeps the latest suppressed value as a trailing call.
pub struct Throttle<T> {
    clock: SharedClock,
    interval: Duration,
    last_fire: Option<Duration>,
    pending: Option<T>,
}

impl<T> Throttle<T> {
    pub fn new(clock: SharedClock, interval: Duration) -> Self {
        Self {
            clock,
            interval,
            last_fire: None,
            pending: None,
        }
    }

    /// Returns the value if it may pass now, otherwise parks it until `poll`.
    pub fn call(&mut self, value: T) -> Option<T> {
        let now = self.clock.now();
        if self.is_open(now) {
            self.last_fire = Some(now);
            self.pending = None;
            Some(value)
        } else {
            self.pending = Some(value);
            None
        }
    }

    pub fn poll(&mut self) -> Option<T> {
        let now = self.clock.now();
        if self.pending.is_some() && self.is_open(now) {
            self.last_fire = Some(now);
            self.pending.take()
        } else {
            None
        }
    }

    pub fn has_pending(&self) -> bool {
        self.pending.is_some()
    }

    pub fn cancel(&mut self) {
        self.pending = None;
    }

    fn is_open(&self, now: Duration) -> bool {
        self.last_fire
            .is_none_or(|last| now.saturating_sub(last) >= self.interval)
    }
}

/// Releases only the latest value, once input has been quiet for `delay`.
pub struct Debounce<T> {
    clock: SharedClock,
    delay: Duration,
    deadline: Option<Duration>,
    pending: Option<T>,
}

impl<T> Debounce<T> {
    pub fn new(clock: SharedClock, delay: Duration) -> Self {
        Self {
            clock,
            delay,
            deadline: None,
            pending: None,
        }
    }

    pub fn call(&mut self, value: T) {
        self.deadline = Some(self.clock.now() + self.delay);
        self.pending = Some(value);
    }

    pub fn poll(&mut self) -> Option<T> {
        let deadline = self.deadline?;
        if self.clock.now() >= deadline {
            self.deadline = None;
            self.pending.take()
        } else {
            None
        }
    }

    /// Releases the pending value immediately.
    pub fn flush(&mut self) -> Option<T> {
        self.deadline = None;
        self.pending.take()
    }

    pub fn has_pending(&self) -> bool {
        self.pending.is_some()
    }

    pub fn cancel(&mut self) {
        self.deadline = None;
        self.pending = None;
    }
}

/// A function wrapped by a [`Throttle`].
pub struct Throttled<T, F> {
    gate: Throttle<T>,
    f: F,
}

impl<T, F: FnMut(T)> Throttled<T, F> {
    pub fn call(&mut self, value: T) {
        if let Some(value) = self.gate.call(value) {
            (self.f)(value);
        }
    }

    /// Runs the trailing call if one is due. Returns whether it ran.
    pub fn poll(&mut self) -> bool {
        match self.gate.poll() {
            Some(value) => {
                (self.f)(value);
                true
            }
            None => false,
        }
    }
}

/// A function wrapped by a [`Debounce`].
pub struct Debounced<T, F> {
    gate: Debounce<T>,
    f: F,
}

impl<T, F: FnMut(T)> Debounced<T, F> {
    pub fn call(&mut self, value: T) {
        self.gate.call(value);
    }

    pub fn poll(&mut self) -> bool {
        match self.gate.poll() {
            Some(value) => {
                (self.f)(value);
                true
            }
            None => false,
        }
    }
}

pub fn throttle<T, F: FnMut(T)>(clock: SharedClock, interval: Duration, f: F) -> Throttled<T, F> {
    Throttled {
        gate: Throttle::new(clock, interval),
        f,
    }
}

pub fn debounce<T, F: FnMut(T)>(clock: SharedClock, delay: Duration, f: F) -> Debounced<T, F> {
    Debounced {
        gate: Debounce::new(clock, delay),
        f,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn throttle_passes_first_call_and_parks_the_rest() {
        let clock = ManualClock::new();
        let mut gate = Throttle::new(Rc::new(clock.clone()), Duration::from_millis(16));

        assert_eq!(gate.call(1), Some(1));
        assert_eq!(gate.call(2), None);
        assert_eq!(gate.call(3), None);
        assert_eq!(gate.poll(), None);

        clock.advance_ms(16);
        assert_eq!(gate.poll(), Some(3));
        assert_eq!(gate.poll(), None);
    }

    #[test]
    fn debounce_waits_for_quiet_period() {
        let clock = ManualClock::new();
        let mut gate = Debounce::new(Rc::new(clock.clone()), Duration::from_millis(50));

        gate.call("a");
        clock.advance_ms(30);
        gate.call("b");
        clock.advance_ms(30);
        assert_eq!(gate.poll(), None);

        clock.advance_ms(20);
        assert_eq!(gate.poll(), Some("b"));
        assert!(!gate.has_pending());
    }

    #[test]
    fn wrapped_functions_run_through_their_gate() {
        let clock = ManualClock::new();
        let calls = Rc::new(RefCell::new(Vec::new()));
        let sink = calls.clone();
        let mut throttled = throttle(Rc::new(clock.clone()), Duration::from_millis(10), move |value: u32| {
            sink.borrow_mut().push(value)
        });

        throttled.call(1);
        throttled.call(2);
        assert!(!throttled.poll());
        clock.advance_ms(10);
        assert!(throttled.poll());
        assert_eq!(*calls.borrow(), vec![1, 2]);

        let fired = Rc::new(RefCell::new(Vec::new()));
        let sink = fired.clone();
        let mut debounced = debounce(Rc::new(clock.clone()), Duration::from_millis(5), move |value: u32| {
            sink.borrow_mut().push(value)
        });
        debounced.call(7);
        clock.advance_ms(5);
        assert!(debounced.poll());
        assert_eq!(*fired.borrow(), vec![7]);
    }
}
