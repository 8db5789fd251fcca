use crate::{instance::Instance, registers::*, Error, Result, TARGET};
use std::fmt;

/// A looked-up instance together with its slot's shadow map, lock held.
pub(crate) struct Tuner<'a> {
    pub obj: &'a mut Instance,
    pub map: &'a mut RegisterMap,
}

impl Tuner<'_> {
    pub fn report(&self, level: log::Level, args: fmt::Arguments) {
        let msg = format!("unit {:#x}: {args}", self.obj.unit);
        log::log!(target: TARGET, level, "{msg}");
        if let Some(debug) = &self.obj.deps.debug {
            debug.print(level, &msg);
        }
    }

    /// Logs a failed step and hands the error back.
    pub fn fail(&self, e: Error, what: fmt::Arguments) -> Error {
        self.report(log::Level::Error, format_args!("{what} failed: {e}"));
        e
    }

    /// Sends `count` shadow bytes starting at `addr`.
    pub fn write(&mut self, addr: u8, count: usize) -> Result<()> {
        let span = RegisterMap::span(addr, count).ok_or(Error::BadParameter)?;
        let res = self.obj.deps.io.write(self.obj.unit_w, &[addr], &self.map.0[span]);
        res.map_err(|e| self.fail(e.into(), format_args!("write({addr:#04x}, {count})")))
    }

    /// Refreshes `count` shadow bytes starting at `addr`.
    pub fn read(&mut self, addr: u8, count: usize) -> Result<()> {
        let span = RegisterMap::span(addr, count).ok_or(Error::BadParameter)?;
        let res = self.obj.deps.io.read(self.obj.unit_w, &[addr], &mut self.map.0[span]);
        res.map_err(|e| self.fail(e.into(), format_args!("read({addr:#04x}, {count})")))
    }

    pub fn wait(&self, ms: u32) -> Result<()> {
        self.obj.deps.time.wait(self.obj.unit, ms)
    }

    pub fn read_field(&mut self, field: Field) -> Result<u8> {
        self.read(field.addr, 1)?;
        Ok(self.map.get(field))
    }

    pub fn write_field(&mut self, field: Field, value: u8) -> Result<()> {
        if value > field.max() {
            return Err(self.fail(Error::BadParameter, format_args!("set {} to {value}", field.name)));
        }
        self.map.set(field, value);
        self.write(field.addr, 1)
    }

    /// Pulses IRQ_Clear for the given causes. The chip clears the register
    /// itself, so only the shadow is reset afterwards.
    pub fn irq_clear(&mut self, causes: IrqStatus) -> Result<()> {
        let bits = IrqStatus::IRQ.bits() | causes.cause().bits();
        self.map.set_byte(IRQ_CLEAR_BYTE, self.map.byte(IRQ_CLEAR_BYTE) | bits);
        let res = self.write(IRQ_CLEAR_BYTE, 1);
        self.map.set_byte(IRQ_CLEAR_BYTE, self.map.byte(IRQ_CLEAR_BYTE) & !bits);
        res
    }

    /// Writes the MSM trigger pair with the launch bit set, then drops the
    /// launch bit from the shadow only.
    pub fn launch(&mut self, trigger: MsmTrigger) -> Result<()> {
        self.map.set_byte(MSM_BYTE_1_ADDR, trigger.bits());
        self.map.set_byte(MSM_BYTE_2_ADDR, MsmLaunch::MSM.bits());
        let res = self.write(MSM_BYTE_1_ADDR, 2);
        self.map.set(MSM_LAUNCH, 0);
        res
    }

    /// Launch bit only, with whatever trigger is already on the chip.
    pub fn launch_msm(&mut self) -> Result<()> {
        self.map.set(MSM_LAUNCH, 1);
        let res = self.write(MSM_BYTE_2_ADDR, 1);
        self.map.set(MSM_LAUNCH, 0);
        res
    }
}

#[cfg(test)]
mod tests {
    use crate::{emulator::Emulator, registers::*, tests::driver, Error};

    #[test]
    fn launch_clears_shadow_only() {
        let (drv, emu) = driver(0);
        emu.set_completion_delay(None);
        drv.set_irq_wait(0, false).unwrap();
        drv.launch_rf_calibration(0).unwrap();
        let writes = emu.writes();
        assert_eq!(Some(&(MSM_BYTE_1_ADDR, vec![0x21, 0x01])), writes.last());
        assert_eq!(0, drv.shadow(0).unwrap().byte(MSM_BYTE_2_ADDR));
    }

    #[test]
    fn irq_clear_pulse() {
        let (drv, emu) = driver(0);
        drv.set_irq_clear(0, IrqStatus::LO_CALC_END | IrqStatus::RF_CAL_END).unwrap();
        assert_eq!(Some(&(IRQ_CLEAR_BYTE, vec![0x8C])), emu.writes().last());
        assert_eq!(0, drv.shadow(0).unwrap().byte(IRQ_CLEAR_BYTE));
    }

    #[test]
    fn failed_launch_still_clears_shadow() {
        let (drv, emu) = driver(0);
        emu.fail_writes(MSM_BYTE_1_ADDR);
        assert!(matches!(drv.launch_rf_calibration(0), Err(Error::Io(_))));
        assert_eq!(0, drv.shadow(0).unwrap().get(MSM_LAUNCH));
    }

    #[test]
    fn write_failure_reported_to_sink() {
        use std::sync::{Arc, Mutex};

        #[derive(Default)]
        struct Sink(Mutex<Vec<String>>);
        impl crate::DebugSink for Sink {
            fn print(&self, _level: log::Level, msg: &str) {
                self.0.lock().unwrap().push(msg.to_string());
            }
        }

        let emu = Arc::new(Emulator::new());
        let sink = Arc::new(Sink::default());
        let drv = crate::Tda182i2::new();
        let deps = crate::Dependencies::new(emu.clone(), emu.clone()).with_debug(sink.clone());
        drv.init(3, deps).unwrap();
        emu.fail_writes(AGC1_BYTE);
        assert!(drv.write_field(3, AGC1_GAIN, 2).is_err());
        let msgs = sink.0.lock().unwrap();
        assert_eq!(1, msgs.len());
        assert!(msgs[0].starts_with("unit 0x3: write(0x24, 1) failed"));
    }
}
