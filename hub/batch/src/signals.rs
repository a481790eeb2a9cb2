//! Queue-empty register and host interrupt line

use core::cell::Cell;

use critical_section::Mutex;
use sensorhub_queue::{QueueEvent, QueueListener};

use crate::state::{BatchState, BatchStateType};

/// Output line telling the host that packets are waiting
pub trait HostInterrupt {
    fn assert_interrupt(&self);
    fn deassert_interrupt(&self);
}

/// Host-visible queues, in the order they were created
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum QueueClass {
    Wakeup = 0,
    NonWakeup = 1,
    ControlResponse = 2,
}

impl QueueClass {
    /// Bit of this queue in the empty register
    pub const fn empty_bit(self) -> u8 {
        match self {
            QueueClass::Wakeup => QUEUE_WAKEUP_EMPTY_BIT,
            QueueClass::NonWakeup => QUEUE_NONWAKEUP_EMPTY_BIT,
            QueueClass::ControlResponse => QUEUE_CONTROL_RESPONSE_EMPTY_BIT,
        }
    }

    /// Listener tag used when registering with a queue
    pub const fn tag(self) -> u32 {
        self as u32
    }

    pub const fn from_tag(tag: u32) -> Option<Self> {
        match tag {
            0 => Some(QueueClass::Wakeup),
            1 => Some(QueueClass::NonWakeup),
            2 => Some(QueueClass::ControlResponse),
            _ => None,
        }
    }
}

pub const QUEUE_WAKEUP_EMPTY_BIT: u8 = 0x01;
pub const QUEUE_NONWAKEUP_EMPTY_BIT: u8 = 0x02;
pub const QUEUE_CONTROL_RESPONSE_EMPTY_BIT: u8 = 0x04;
pub const QUEUE_ALL_EMPTY_MASK: u8 = 0x07;

#[derive(Clone, Copy)]
struct Register {
    q_empty: u8,
    onchange_empty: bool,
}

/// Reacts to queue threshold and empty events
///
/// A high threshold clears the queue's empty bit and raises the host
/// interrupt; an empty queue sets its bit and the interrupt is dropped once
/// every bit is set. Non-wakeup data does not wake a suspended host.
pub struct HubSignals<'a> {
    state: &'a BatchState,
    host: &'a dyn HostInterrupt,
    register: Mutex<Cell<Register>>,
}

impl<'a> HubSignals<'a> {
    pub fn new(state: &'a BatchState, host: &'a dyn HostInterrupt) -> Self {
        Self {
            state,
            host,
            register: Mutex::new(Cell::new(Register {
                q_empty: QUEUE_ALL_EMPTY_MASK,
                onchange_empty: true,
            })),
        }
    }

    /// Snapshot of the queue-empty register
    pub fn q_empty(&self) -> u8 {
        critical_section::with(|cs| self.register.borrow(cs).get().q_empty)
    }

    /// Track whether the on-change cache still has samples to replay
    pub fn set_onchange_empty(&self, empty: bool) {
        critical_section::with(|cs| {
            let cell = self.register.borrow(cs);
            let mut r = cell.get();
            r.onchange_empty = empty;
            cell.set(r);
        });
    }

    /// Queue the next host read drains: control, then wakeup, then non-wakeup
    pub fn pending_class(&self) -> Option<QueueClass> {
        let q_empty = self.q_empty();
        [
            QueueClass::ControlResponse,
            QueueClass::Wakeup,
            QueueClass::NonWakeup,
        ]
        .into_iter()
        .find(|class| q_empty & class.empty_bit() == 0)
    }

    pub fn on_high_threshold(&self, class: QueueClass) {
        if class == QueueClass::NonWakeup
            && self.state.get() == Ok(BatchStateType::ActiveHostSuspend)
        {
            log::trace!("non-wakeup threshold held while host suspended");
            return;
        }
        critical_section::with(|cs| {
            let cell = self.register.borrow(cs);
            let mut r = cell.get();
            r.q_empty &= !class.empty_bit();
            cell.set(r);
        });
        self.host.assert_interrupt();
    }

    pub fn on_empty(&self, class: QueueClass) {
        let all_empty = critical_section::with(|cs| {
            let cell = self.register.borrow(cs);
            let mut r = cell.get();
            if class != QueueClass::NonWakeup || r.onchange_empty {
                r.q_empty |= class.empty_bit();
            }
            cell.set(r);
            r.q_empty == QUEUE_ALL_EMPTY_MASK
        });
        if all_empty {
            self.host.deassert_interrupt();
        }
    }
}

impl QueueListener for HubSignals<'_> {
    fn on_queue_event(&self, event: QueueEvent, tag: u32) {
        let Some(class) = QueueClass::from_tag(tag) else {
            return;
        };
        match event {
            QueueEvent::HighThreshold => self.on_high_threshold(class),
            QueueEvent::Empty => self.on_empty(class),
            QueueEvent::LowThreshold | QueueEvent::Full => {}
        }
    }
}
