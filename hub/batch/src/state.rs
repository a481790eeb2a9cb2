//! Batching state machine and per-state command permissions

use core::cell::Cell;

use critical_section::Mutex;
use sensorhub_core::{HubError, HubResult};
use sensorhub_packets::ParamId;

/// Protocol-level mode of the hub
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum BatchStateType {
    Standby = 0,
    Config = 1,
    Idle = 2,
    Active = 3,
    ActiveHostSuspend = 4,
}

impl BatchStateType {
    pub const COUNT: usize = 5;

    pub const ALL: [BatchStateType; Self::COUNT] = [
        BatchStateType::Standby,
        BatchStateType::Config,
        BatchStateType::Idle,
        BatchStateType::Active,
        BatchStateType::ActiveHostSuspend,
    ];
}

const fn allow_range(mut row: [bool; ParamId::COUNT], from: u8, to: u8) -> [bool; ParamId::COUNT] {
    let mut id = from as usize;
    while id <= to as usize {
        row[id] = true;
        id += 1;
    }
    row
}

const NONE: [bool; ParamId::COUNT] = [false; ParamId::COUNT];

/// Configuration phase: descriptor and time commands only
const CONFIG_ROW: [bool; ParamId::COUNT] = allow_range(NONE, 0x04, 0x24);

const IDLE_ROW: [bool; ParamId::COUNT] = {
    let row = allow_range(NONE, 0x01, 0x03);
    let row = allow_range(row, 0x0F, 0x0F);
    allow_range(row, 0x19, 0x24)
};

const ACTIVE_ROW: [bool; ParamId::COUNT] = {
    let row = allow_range(NONE, 0x01, 0x03);
    let row = allow_range(row, 0x1A, 0x1F);
    allow_range(row, 0x21, 0x24)
};

/// `[state][param]`: whether a command may run in a state
const STATE_COMMAND_TABLE: [[bool; ParamId::COUNT]; BatchStateType::COUNT] =
    [CONFIG_ROW, CONFIG_ROW, IDLE_ROW, ACTIVE_ROW, NONE];

/// Is `param` allowed while in `state`
pub const fn command_allowed(state: BatchStateType, param: ParamId) -> bool {
    if param.0 as usize >= ParamId::COUNT {
        return false;
    }
    STATE_COMMAND_TABLE[state as usize][param.0 as usize]
}

#[derive(Clone, Copy)]
struct Machine {
    current: BatchStateType,
    previous: BatchStateType,
    initialized: bool,
}

/// Current and previous batching state
///
/// Shared by reference between the batch manager, the queue signals and the
/// configuration manager.
pub struct BatchState {
    machine: Mutex<Cell<Machine>>,
}

impl BatchState {
    pub const fn new() -> Self {
        Self {
            machine: Mutex::new(Cell::new(Machine {
                current: BatchStateType::Standby,
                previous: BatchStateType::Standby,
                initialized: false,
            })),
        }
    }

    /// Enter STANDBY; later calls keep the current state
    pub fn initialize(&self) {
        critical_section::with(|cs| {
            let cell = self.machine.borrow(cs);
            if !cell.get().initialized {
                cell.set(Machine {
                    current: BatchStateType::Standby,
                    previous: BatchStateType::Standby,
                    initialized: true,
                });
            }
        });
    }

    pub fn is_initialized(&self) -> bool {
        critical_section::with(|cs| self.machine.borrow(cs).get().initialized)
    }

    /// Move to `state` without checking the edge, remembering the old state
    pub fn set(&self, state: BatchStateType) -> HubResult<()> {
        let previous = critical_section::with(|cs| {
            let cell = self.machine.borrow(cs);
            let mut m = cell.get();
            if !m.initialized {
                return Err(HubError::Uninitialized);
            }
            m.previous = m.current;
            m.current = state;
            cell.set(m);
            Ok(m.previous)
        })?;
        log::debug!("batch state {:?} -> {:?}", previous, state);
        Ok(())
    }

    /// Move to `state` if the state diagram has that edge
    pub fn transition(&self, state: BatchStateType) -> HubResult<()> {
        use BatchStateType::*;

        let current = self.get()?;
        let legal = matches!(
            (current, state),
            (Standby, Config)
                | (Standby, Idle)
                | (Config, Idle)
                | (Idle, Active)
                | (Active, Idle)
                | (Active, ActiveHostSuspend)
                | (ActiveHostSuspend, Active)
        ) || current == state;
        if !legal {
            return Err(HubError::InvalidParameter);
        }
        self.set(state)
    }

    pub fn get(&self) -> HubResult<BatchStateType> {
        critical_section::with(|cs| {
            let m = self.machine.borrow(cs).get();
            if m.initialized {
                Ok(m.current)
            } else {
                Err(HubError::Uninitialized)
            }
        })
    }

    pub fn previous(&self) -> HubResult<BatchStateType> {
        critical_section::with(|cs| {
            let m = self.machine.borrow(cs).get();
            if m.initialized {
                Ok(m.previous)
            } else {
                Err(HubError::Uninitialized)
            }
        })
    }

    /// Check that the command `param` may run in the current state
    pub fn command_validate(&self, param: ParamId) -> HubResult<()> {
        if !param.is_valid() {
            return Err(HubError::InvalidParameter);
        }
        if command_allowed(self.get()?, param) {
            Ok(())
        } else {
            Err(HubError::InvalidParameter)
        }
    }
}

impl Default for BatchState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for BatchStateType {
    fn format(&self, fmt: defmt::Formatter) {
        match self {
            BatchStateType::Standby => defmt::write!(fmt, "Standby"),
            BatchStateType::Config => defmt::write!(fmt, "Config"),
            BatchStateType::Idle => defmt::write!(fmt, "Idle"),
            BatchStateType::Active => defmt::write!(fmt, "Active"),
            BatchStateType::ActiveHostSuspend => defmt::write!(fmt, "ActiveHostSuspend"),
        }
    }
}
