use crate::{registers::*, standard::StandardMode, Dependencies, Error, MutexHandle, Result, TARGET};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

pub const MAX_UNITS: usize = 2;

// Only these bits of a unit id identify a tuner, the rest is routing
// information for the bus layer.
pub const UNIT_PATH_INDEX_MASK: u32 = 0x0000_001F;
pub const UNIT_PATH_TYPE_MASK: u32 = 0x0000_03C0;

fn key(unit: u32) -> u32 {
    unit & (UNIT_PATH_INDEX_MASK | UNIT_PATH_TYPE_MASK)
}

pub(crate) struct Instance {
    pub unit: u32,
    /// Id of the latest caller, routing bits included. Handed to the bus.
    pub unit_w: u32,
    pub deps: Dependencies,
    pub mutex: Option<Arc<dyn MutexHandle>>,
    pub power_state: PowerState,
    /// Last state a board asked for, before its standby limit was applied.
    pub requested_power_state: PowerState,
    pub irq_wait: bool,
    pub standard: StandardMode,
    /// Channel frequency of the last `set_rf`.
    pub rf_hz: u64,
}

impl Instance {
    fn new(unit: u32, deps: Dependencies, mutex: Option<Arc<dyn MutexHandle>>) -> Self {
        Self {
            unit,
            unit_w: unit,
            deps,
            mutex,
            power_state: PowerState::default(),
            requested_power_state: PowerState::default(),
            irq_wait: true,
            standard: StandardMode::default(),
            rf_hz: 0,
        }
    }
}

/// One arena entry. The shadow map outlives the instance using it.
#[derive(Default)]
pub(crate) struct Slot {
    map: RegisterMap,
    live: Option<Instance>,
}

impl Slot {
    pub fn parts(&mut self) -> Option<(&mut Instance, &mut RegisterMap)> {
        let Slot { map, live } = self;
        live.as_mut().map(|obj| (obj, map))
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
enum Header {
    #[default]
    Free,
    Reserved(u32),
    Live(u32),
}

impl Header {
    fn claims(&self, unit: u32) -> bool {
        match *self {
            Header::Free => false,
            Header::Reserved(u) | Header::Live(u) => key(u) == key(unit),
        }
    }
}

/// Fixed pool of tuner instances.
///
/// The headers answer "which slot holds this unit" without touching the
/// slots, so a long operation on one unit never stalls a lookup of another.
/// Each slot has its own lock that an operation holds from start to end.
pub(crate) struct Registry {
    headers: RwLock<[Header; MAX_UNITS]>,
    slots: [Mutex<Slot>; MAX_UNITS],
}

impl Default for Registry {
    fn default() -> Self {
        Self {
            headers: RwLock::new([Header::Free; MAX_UNITS]),
            slots: std::array::from_fn(|_| Mutex::new(Slot::default())),
        }
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Registry {
    fn set_header(&self, idx: usize, header: Header) {
        self.headers.write().unwrap_or_else(PoisonError::into_inner)[idx] = header;
    }

    fn find(&self, unit: u32) -> Option<usize> {
        let headers = self.headers.read().unwrap_or_else(PoisonError::into_inner);
        headers
            .iter()
            .position(|h| matches!(h, Header::Live(_)) && h.claims(unit))
    }

    /// First free slot, reserved for `unit` until committed or released.
    fn allocate(&self, unit: u32) -> Result<usize> {
        let mut headers = self.headers.write().unwrap_or_else(PoisonError::into_inner);
        if headers.iter().any(|h| h.claims(unit)) {
            return Err(Error::NotInitialized(unit));
        }
        let idx = headers
            .iter()
            .position(|h| *h == Header::Free)
            .ok_or(Error::BadUnitNumber(unit))?;
        headers[idx] = Header::Reserved(unit);
        Ok(idx)
    }

    pub fn init(&self, unit: u32, deps: Dependencies) -> Result<()> {
        let idx = self.allocate(unit).inspect_err(|e| {
            log::error!(target: TARGET, "unit {unit:#x}: init failed: {e}");
        })?;

        let mutex = match deps.mutex.as_ref().map(|m| m.init()).transpose() {
            Ok(m) => m,
            Err(e) => {
                log::error!(target: TARGET, "unit {unit:#x}: mutex init failed: {e}");
                self.set_header(idx, Header::Free);
                return Err(e);
            }
        };

        lock(&self.slots[idx]).live = Some(Instance::new(unit, deps, mutex));
        self.set_header(idx, Header::Live(unit));
        log::debug!(target: TARGET, "unit {unit:#x}: initialized in slot {idx}");
        Ok(())
    }

    pub fn deinit(&self, unit: u32) -> Result<()> {
        let idx = self.find(unit).ok_or(Error::NotInitialized(unit))?;
        // Waits for any operation in flight on this slot.
        let obj = {
            let mut slot = lock(&self.slots[idx]);
            match slot.live.take() {
                Some(obj) if key(obj.unit) == key(unit) => obj,
                other => {
                    slot.live = other;
                    return Err(Error::NotInitialized(unit));
                }
            }
        };

        let res = obj.mutex.as_ref().map_or(Ok(()), |m| m.deinit());
        self.set_header(idx, Header::Free);
        log::debug!(target: TARGET, "unit {unit:#x}: released slot {idx}");
        res
    }

    /// Locks the slot holding `unit` and records the caller's id on it.
    pub fn lookup(&self, unit: u32) -> Result<MutexGuard<'_, Slot>> {
        let idx = self.find(unit).ok_or(Error::NotInitialized(unit))?;
        let mut slot = lock(&self.slots[idx]);
        match slot.live.as_mut() {
            Some(obj) if key(obj.unit) == key(unit) => {
                obj.unit_w = unit;
                Ok(slot)
            }
            _ => Err(Error::NotInitialized(unit)),
        }
    }
}
