use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

use registers::*;

pub mod config;
pub mod emulator;
pub mod registers;
pub mod standard;

mod agc;
mod instance;
mod lock;
mod transport;
mod tuning;
mod wait;

pub use instance::{MAX_UNITS, UNIT_PATH_INDEX_MASK, UNIT_PATH_TYPE_MASK};
pub use lock::{StdMutex, MUTEX_TIMEOUT};
pub use wait::StdTime;

use instance::Registry;
use transport::Tuner;

/// `log` target for everything the driver reports.
pub const TARGET: &str = "tda182i2";

#[derive(Error, Debug)]
pub enum Error {
    #[error("Bus communication failed")]
    Io(#[from] std::io::Error),
    #[error("No free instance for unit {0:#x}")]
    BadUnitNumber(u32),
    #[error("Unit {0:#x} is not initialized")]
    NotInitialized(u32),
    #[error("Invalid parameter")]
    BadParameter,
    #[error("Not supported")]
    NotSupported,
    #[error("Timed out waiting for the tuner")]
    NotReady,
    #[error("Mutex operation failed")]
    Mutex,
    #[error("Unsupported chip {identity}, revision {major}")]
    BadVersion { identity: u16, major: u8 },
}

pub type Result<T> = std::result::Result<T, Error>;

/// Serial bus access. Every transfer is one sub-address byte followed by
/// the data bytes.
pub trait Io: Send + Sync {
    fn write(&self, unit: u32, addr: &[u8], data: &[u8]) -> std::io::Result<()>;
    fn read(&self, unit: u32, addr: &[u8], data: &mut [u8]) -> std::io::Result<()>;
}

pub trait Time: Send + Sync {
    fn wait(&self, unit: u32, ms: u32) -> Result<()>;
}

/// Receives the driver's diagnostics in addition to the `log` facade.
pub trait DebugSink: Send + Sync {
    fn print(&self, level: log::Level, msg: &str);
}

/// Builds the per-instance lock at `init`. Supplying one enables locking
/// for every operation on the instance.
pub trait MutexFactory: Send + Sync {
    fn init(&self) -> Result<Arc<dyn MutexHandle>>;
}

pub trait MutexHandle: Send + Sync {
    fn acquire(&self, timeout_ms: u32) -> Result<()>;
    fn release(&self) -> Result<()>;
    fn deinit(&self) -> Result<()>;
}

/// Capabilities injected into an instance at `init`.
#[derive(Clone)]
pub struct Dependencies {
    pub io: Arc<dyn Io>,
    pub time: Arc<dyn Time>,
    pub debug: Option<Arc<dyn DebugSink>>,
    pub mutex: Option<Arc<dyn MutexFactory>>,
}

impl Dependencies {
    pub fn new(io: Arc<dyn Io>, time: Arc<dyn Time>) -> Self {
        Self {
            io,
            time,
            debug: None,
            mutex: None,
        }
    }

    pub fn with_debug(mut self, debug: Arc<dyn DebugSink>) -> Self {
        self.debug = Some(debug);
        self
    }

    pub fn with_mutex(mut self, mutex: Arc<dyn MutexFactory>) -> Self {
        self.mutex = Some(mutex);
        self
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwVersion {
    pub compatibility: u32,
    pub major: u32,
    pub minor: u32,
}

pub const SW_VERSION: SwVersion = SwVersion {
    compatibility: 1,
    major: 0,
    minor: 1,
};

/// Driver for up to [`MAX_UNITS`] TDA182I2 tuners.
///
/// Units are addressed by the caller's id. Operations on different units run
/// concurrently, operations on the same unit are serialized.
#[derive(Default)]
pub struct Tda182i2 {
    registry: Registry,
}

impl Tda182i2 {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sw_version() -> SwVersion {
        SW_VERSION
    }

    pub fn init(&self, unit: u32, deps: Dependencies) -> Result<()> {
        self.registry.init(unit, deps)
    }

    pub fn deinit(&self, unit: u32) -> Result<()> {
        self.registry.deinit(unit)
    }

    /// Runs `op` on the unit's instance with its lock held.
    fn with<T>(&self, unit: u32, op: impl FnOnce(&mut Tuner) -> Result<T>) -> Result<T> {
        let mut slot = self.registry.lookup(unit)?;
        let (obj, map) = slot.parts().ok_or(Error::NotInitialized(unit))?;
        let _guard = lock::Guard::acquire(obj)?;
        op(&mut Tuner { obj, map })
    }

    /// Copy of the unit's shadow register map.
    pub fn shadow(&self, unit: u32) -> Result<RegisterMap> {
        self.with(unit, |t| Ok(t.map.clone()))
    }

    /// Stores `data` in the shadow map at `addr` and writes it to the chip.
    pub fn write(&self, unit: u32, addr: u8, data: &[u8]) -> Result<()> {
        self.with(unit, |t| {
            let span = RegisterMap::span(addr, data.len()).ok_or(Error::BadParameter)?;
            t.map.0[span].copy_from_slice(data);
            t.write(addr, data.len())
        })
    }

    /// Reads `data.len()` registers starting at `addr`.
    pub fn read(&self, unit: u32, addr: u8, data: &mut [u8]) -> Result<()> {
        self.with(unit, |t| {
            let span = RegisterMap::span(addr, data.len()).ok_or(Error::BadParameter)?;
            t.read(addr, data.len())?;
            data.copy_from_slice(&t.map.0[span]);
            Ok(())
        })
    }

    pub fn read_field(&self, unit: u32, field: Field) -> Result<u8> {
        self.with(unit, |t| t.read_field(field))
    }

    pub fn write_field(&self, unit: u32, field: Field, value: u8) -> Result<()> {
        self.with(unit, |t| t.write_field(field, value))
    }

    /// 15-bit chip identity, 18212 for a TDA18212.
    pub fn identity(&self, unit: u32) -> Result<u16> {
        self.with(unit, |t| {
            t.read(IDENT_1.addr, 2)?;
            Ok((u16::from(t.map.get(IDENT_1)) << 8) | u16::from(t.map.get(IDENT_2)))
        })
    }

    pub fn major_revision(&self, unit: u32) -> Result<u8> {
        self.read_field(unit, MAJOR_REV)
    }

    pub fn minor_revision(&self, unit: u32) -> Result<u8> {
        self.read_field(unit, MINOR_REV)
    }

    /// True when the chip is strapped as master.
    pub fn master(&self, unit: u32) -> Result<bool> {
        Ok(self.read_field(unit, MS)? == 1)
    }

    pub fn lo_lock(&self, unit: u32) -> Result<bool> {
        Ok(self.read_field(unit, LO_LOCK)? == 1)
    }

    /// Accepts TDA18212 and TDA18272, major revision 1 only.
    pub fn check_hw_version(&self, unit: u32) -> Result<()> {
        self.with(unit, |t| {
            t.read(IDENT_1.addr, 3)?;
            let identity = (u16::from(t.map.get(IDENT_1)) << 8) | u16::from(t.map.get(IDENT_2));
            if identity != 18212 && identity != 18272 {
                return Err(Error::BadVersion { identity, major: 0 });
            }
            match t.map.get(MAJOR_REV) {
                1 => Ok(()),
                major => Err(Error::BadVersion { identity, major }),
            }
        })
    }

    /// LO locked and the last MSM run signalled completion.
    pub fn lock_status(&self, unit: u32) -> Result<bool> {
        self.with(unit, |t| {
            let lo = t.read_field(LO_LOCK)?;
            let irq = t.read_field(IRQ_STATUS)?;
            Ok(lo & irq == 1)
        })
    }

    /// Power-on-reset flag, cleared by the chip once read.
    pub fn por(&self, unit: u32) -> Result<bool> {
        Ok(self.read_field(unit, POR)? == 1)
    }

    pub fn set_irq_wait(&self, unit: u32, enable: bool) -> Result<()> {
        self.with(unit, |t| {
            t.obj.irq_wait = enable;
            Ok(())
        })
    }

    pub fn irq_wait(&self, unit: u32) -> Result<bool> {
        self.with(unit, |t| Ok(t.obj.irq_wait))
    }
}
