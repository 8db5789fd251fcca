/* Register-level model of a TDA182I2
 *
 * Good enough to exercise the driver without hardware: MSM launches finish
 * after a configurable number of status polls, IRQ clear pulses and launch
 * bits self-clear, and the AGC1 detectors follow a simple model. Time is
 * virtual, waits are only counted.
 * */
use crate::{registers::*, Io, Result, Time};
use serde::{Deserialize, Serialize};
use std::io::{self, ErrorKind};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc::Receiver, Mutex, MutexGuard, PoisonError};

/// What the AGC1 Up/Do detector bits report.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Detector {
    #[default]
    Quiet,
    Up,
    Down,
    /// Asks for more gain below the target and less above it.
    Target(u8),
}

/// Persistent part of the model.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Image {
    pub registers: RegisterMap,
    pub detector: Detector,
    /// Status polls until an MSM launch completes, `None` never completes.
    pub completion_delay: Option<u32>,
}

impl Default for Image {
    fn default() -> Self {
        let mut registers = RegisterMap::default();
        registers.set(MS, 1);
        registers.set(IDENT_1, 0x47);
        registers.set(IDENT_2, 0x24);
        registers.set(MAJOR_REV, 1);
        registers.set(POR, 1);
        registers.set_byte(POWER_STATE_BYTE, 0b1110);
        registers.set(POWER_LEVEL, 80);
        registers.set(IRQ_ENABLE, 1);
        registers.set(IRQ_MASK, 0x3F);
        Self {
            registers,
            detector: Detector::Quiet,
            completion_delay: Some(1),
        }
    }
}

impl Image {
    pub fn load(reader: impl io::Read) -> anyhow::Result<Self> {
        Ok(ciborium::de::from_reader(reader)?)
    }

    pub fn save(&self, writer: impl io::Write) -> anyhow::Result<()> {
        ciborium::ser::into_writer(self, writer)?;
        Ok(())
    }
}

struct Pending {
    polls: u32,
    status: IrqStatus,
}

#[derive(Default)]
struct Log {
    writes: Vec<(u8, Vec<u8>)>,
    reads: Vec<(u8, usize)>,
    sleeps: usize,
    elapsed_ms: u64,
    last_unit: Option<u32>,
}

struct State {
    image: Image,
    pending: Vec<Pending>,
    log: Log,
    fail_write: Option<u8>,
    fail_read: Option<u8>,
}

pub struct Emulator {
    state: Mutex<State>,
    gate: Mutex<Option<Receiver<()>>>,
    blocked: AtomicBool,
}

impl Default for Emulator {
    fn default() -> Self {
        Self::with_image(Image::default())
    }
}

// Registers the chip owns; writes to them are dropped.
const READ_ONLY: &[u8] = &[0x00, 0x01, 0x02, 0x05, POWER_LEVEL_BYTE, IRQ_STATUS_BYTE, AGC_DETECTOR_BYTE, 0x32, 0x35];

fn causes(trigger: MsmTrigger) -> IrqStatus {
    let mut status = IrqStatus::empty();
    status.set(IrqStatus::RSSI_END, trigger.contains(MsmTrigger::RSSI_MEAS));
    status.set(IrqStatus::LO_CALC_END, trigger.contains(MsmTrigger::CALC_PLL));
    status.set(IrqStatus::RF_CAL_END, trigger.intersects(MsmTrigger::RF_CAL | MsmTrigger::RF_CAL_AV));
    status.set(IrqStatus::IR_CAL_END, trigger.intersects(MsmTrigger::IR_CAL));
    status.set(IrqStatus::RC_CAL_END, trigger.contains(MsmTrigger::RC_CAL));
    status
}

impl State {
    fn regs(&mut self) -> &mut RegisterMap {
        &mut self.image.registers
    }

    fn schedule(&mut self, status: IrqStatus) {
        match self.image.completion_delay {
            None => (),
            Some(0) => self.complete(status),
            Some(polls) => self.pending.push(Pending { polls, status }),
        }
    }

    fn complete(&mut self, status: IrqStatus) {
        let regs = self.regs();
        regs.set_byte(IRQ_STATUS_BYTE, regs.byte(IRQ_STATUS_BYTE) | status.bits());
        if status.contains(IrqStatus::LO_CALC_END) {
            regs.set(LO_LOCK, 1);
        }
        if regs.get(IRQ_ENABLE) == 1 && status.bits() & regs.get(IRQ_MASK) != 0 {
            regs.set(IRQ_STATUS, 1);
        }
    }

    fn poll(&mut self) {
        let mut done = IrqStatus::empty();
        self.pending.retain_mut(|p| {
            if p.polls <= 1 {
                done |= p.status;
                false
            } else {
                p.polls -= 1;
                true
            }
        });
        if !done.is_empty() {
            self.complete(done);
        }
    }

    fn store(&mut self, addr: u8, value: u8) {
        match addr {
            IRQ_CLEAR_BYTE => {
                let clear = value & (IRQ_CLEAR.mask() | IRQ_CLEAR_MASK.mask());
                let regs = self.regs();
                regs.set_byte(IRQ_STATUS_BYTE, regs.byte(IRQ_STATUS_BYTE) & !clear);
            }
            IRQ_SET_BYTE => self.complete(IrqStatus::from_bits_truncate(value & IRQ_SET_MASK.mask())),
            MSM_BYTE_2_ADDR => {
                let launch = MsmLaunch::from_bits_truncate(value);
                if launch.contains(MsmLaunch::MSM) {
                    let trigger = MsmTrigger::from_bits_retain(self.regs().byte(MSM_BYTE_1_ADDR));
                    self.schedule(causes(trigger));
                }
                if launch.contains(MsmLaunch::XTAL_CAL) {
                    self.schedule(IrqStatus::XTAL_CAL_END);
                }
            }
            a if READ_ONLY.contains(&a) => (),
            a => self.regs().set_byte(a, value),
        }
    }

    fn detector(&self) -> u8 {
        let gain = self.image.registers.get(AGC1_GAIN);
        let (up, down) = match self.image.detector {
            Detector::Quiet => (false, false),
            Detector::Up => (true, false),
            Detector::Down => (false, true),
            Detector::Target(t) => (gain < t, gain > t),
        };
        UP_AGC1.insert(DO_AGC1.insert(0, down.into()), up.into())
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

fn sub_address(addr: &[u8], len: usize) -> io::Result<u8> {
    match addr {
        [a] if RegisterMap::span(*a, len).is_some() => Ok(*a),
        _ => Err(io::Error::new(ErrorKind::InvalidInput, "bad sub-address")),
    }
}

impl Emulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_image(image: Image) -> Self {
        Self {
            state: Mutex::new(State {
                image,
                pending: Vec::new(),
                log: Log::default(),
                fail_write: None,
                fail_read: None,
            }),
            gate: Mutex::new(None),
            blocked: AtomicBool::new(false),
        }
    }

    /// Starts the crystal calibration the chip runs by itself at power on.
    pub fn power_on(&self) {
        lock(&self.state).schedule(IrqStatus::XTAL_CAL_END);
    }

    /// Current model state. Launches still in flight are dropped.
    pub fn image(&self) -> Image {
        lock(&self.state).image.clone()
    }

    pub fn registers(&self) -> RegisterMap {
        lock(&self.state).image.registers.clone()
    }

    pub fn set_detector(&self, detector: Detector) {
        lock(&self.state).image.detector = detector;
    }

    pub fn set_completion_delay(&self, polls: Option<u32>) {
        lock(&self.state).image.completion_delay = polls;
    }

    pub fn set_power_level(&self, level: u8) {
        lock(&self.state).regs().set(POWER_LEVEL, level);
    }

    /// Makes every write starting at `addr` fail.
    pub fn fail_writes(&self, addr: u8) {
        lock(&self.state).fail_write = Some(addr);
    }

    /// Makes every read starting at `addr` fail.
    pub fn fail_reads(&self, addr: u8) {
        lock(&self.state).fail_read = Some(addr);
    }

    pub fn clear_faults(&self) {
        let mut state = lock(&self.state);
        state.fail_write = None;
        state.fail_read = None;
    }

    /// Holds the next read until something arrives on `rx`.
    pub fn block_reads(&self, rx: Receiver<()>) {
        *lock(&self.gate) = Some(rx);
    }

    pub fn is_blocked(&self) -> bool {
        self.blocked.load(Ordering::SeqCst)
    }

    pub fn writes(&self) -> Vec<(u8, Vec<u8>)> {
        lock(&self.state).log.writes.clone()
    }

    /// Number of reads starting at `addr`.
    pub fn reads_at(&self, addr: u8) -> usize {
        lock(&self.state).log.reads.iter().filter(|(a, _)| *a == addr).count()
    }

    pub fn sleeps(&self) -> usize {
        lock(&self.state).log.sleeps
    }

    pub fn elapsed_ms(&self) -> u64 {
        lock(&self.state).log.elapsed_ms
    }

    pub fn last_unit(&self) -> Option<u32> {
        lock(&self.state).log.last_unit
    }

    pub fn clear_log(&self) {
        lock(&self.state).log = Log::default();
    }
}

impl Io for Emulator {
    fn write(&self, unit: u32, addr: &[u8], data: &[u8]) -> io::Result<()> {
        let addr = sub_address(addr, data.len())?;
        let mut state = lock(&self.state);
        state.log.last_unit = Some(unit);
        if state.fail_write == Some(addr) {
            return Err(io::Error::new(ErrorKind::Other, "injected write failure"));
        }
        state.log.writes.push((addr, data.to_vec()));
        for (a, value) in (addr..).zip(data) {
            state.store(a, *value);
        }
        Ok(())
    }

    fn read(&self, unit: u32, addr: &[u8], data: &mut [u8]) -> io::Result<()> {
        let addr = sub_address(addr, data.len())?;
        if let Some(rx) = lock(&self.gate).take() {
            self.blocked.store(true, Ordering::SeqCst);
            let _ = rx.recv();
            self.blocked.store(false, Ordering::SeqCst);
        }

        let mut state = lock(&self.state);
        state.log.last_unit = Some(unit);
        if state.fail_read == Some(addr) {
            return Err(io::Error::new(ErrorKind::Other, "injected read failure"));
        }
        state.log.reads.push((addr, data.len()));

        let span = usize::from(addr)..usize::from(addr) + data.len();
        if span.contains(&usize::from(IRQ_STATUS_BYTE)) {
            state.poll();
        }
        let detector = state.detector();
        state.regs().set_byte(AGC_DETECTOR_BYTE, detector);
        data.copy_from_slice(&state.image.registers.0[span.clone()]);
        // POR reads back once.
        if span.contains(&usize::from(POR.addr)) {
            state.regs().set(POR, 0);
        }
        Ok(())
    }
}

impl Time for Emulator {
    fn wait(&self, _unit: u32, ms: u32) -> Result<()> {
        let mut state = lock(&self.state);
        state.log.sleeps += 1;
        state.log.elapsed_ms += u64::from(ms);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn power_on_identity() {
        let regs = Image::default().registers;
        assert_eq!(0xC7, regs.byte(0x00));
        assert_eq!(0x24, regs.byte(0x01));
        assert_eq!(PowerState::StandbyXtalOn, PowerState::from_standby_bits(regs.byte(POWER_STATE_BYTE)));
    }

    #[test]
    fn launch_completes_after_polls() {
        let emu = Emulator::new();
        emu.set_completion_delay(Some(2));
        emu.write(0, &[MSM_BYTE_1_ADDR], &[MsmTrigger::POWER_UP.bits(), 0x01]).unwrap();

        let mut status = [0];
        emu.read(0, &[IRQ_STATUS_BYTE], &mut status).unwrap();
        assert_eq!(0, status[0]);
        emu.read(0, &[IRQ_STATUS_BYTE], &mut status).unwrap();
        assert_eq!(0x80 | 0x0F, status[0]);
        assert_eq!(1, emu.registers().get(LO_LOCK));
    }

    #[test]
    fn power_on_runs_xtal_cal() {
        let emu = Emulator::new();
        emu.power_on();
        let mut status = [0];
        emu.read(0, &[IRQ_STATUS_BYTE], &mut status).unwrap();
        assert!(IrqStatus::from_bits_retain(status[0]).contains(IrqStatus::XTAL_CAL_END));
    }

    #[test]
    fn irq_needs_enable() {
        let emu = Emulator::new();
        emu.set_completion_delay(Some(0));
        emu.write(0, &[IRQ_ENABLE_BYTE], &[0]).unwrap();
        emu.write(0, &[MSM_BYTE_1_ADDR], &[MsmTrigger::RSSI_MEAS.bits(), 0x01]).unwrap();
        assert_eq!(IrqStatus::RSSI_END.bits(), emu.registers().byte(IRQ_STATUS_BYTE));
    }

    #[test]
    fn irq_clear_and_set() {
        let emu = Emulator::new();
        emu.write(0, &[IRQ_SET_BYTE], &[0x80 | 0x0C]).unwrap();
        assert_eq!(0x8C, emu.registers().byte(IRQ_STATUS_BYTE));
        emu.write(0, &[IRQ_CLEAR_BYTE], &[0x80 | 0x04]).unwrap();
        assert_eq!(0x08, emu.registers().byte(IRQ_STATUS_BYTE));
        assert_eq!(0, emu.registers().byte(IRQ_CLEAR_BYTE));
    }

    #[test]
    fn read_only_and_bounds() {
        let emu = Emulator::new();
        emu.write(0, &[0x00], &[0x12]).unwrap();
        assert_eq!(0xC7, emu.registers().byte(0x00));
        assert!(emu.write(0, &[0x43], &[0, 0]).is_err());
        assert!(emu.read(0, &[0x10, 0x11], &mut [0]).is_err());
    }

    #[test]
    fn por_clears_on_read() {
        let emu = Emulator::new();
        let mut buf = [0];
        emu.read(0, &[POR.addr], &mut buf).unwrap();
        assert_eq!(1, POR.extract(buf[0]));
        emu.read(0, &[POR.addr], &mut buf).unwrap();
        assert_eq!(0, POR.extract(buf[0]));
    }

    #[test]
    fn image_cbor() {
        let mut image = Image::default();
        image.detector = Detector::Target(4);
        image.completion_delay = None;
        let mut buf = Vec::new();
        image.save(&mut buf).unwrap();
        assert_eq!(image, Image::load(&buf[..]).unwrap());
    }
}
