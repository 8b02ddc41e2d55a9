use std::rc::Rc;

use chrono::{Local, NaiveDateTime};

/// Source of the wall-clock time stamped onto score records.
pub trait Clock {
    fn now(&self) -> NaiveDateTime;
}

impl<C: Clock + ?Sized> Clock for Rc<C> {
    fn now(&self) -> NaiveDateTime {
        (**self).now()
    }
}

/// Local time of the machine running the page.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        Local::now().naive_local()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedClock(pub NaiveDateTime);

impl Clock for FixedClock {
    fn now(&self) -> NaiveDateTime {
        self.0
    }
}
