use crate::{registers::*, transport::Tuner, Error, Result, Tda182i2, Time};
use std::{thread, time::Duration};

/// [`Time`] that sleeps the calling thread.
pub struct StdTime;

impl Time for StdTime {
    fn wait(&self, _unit: u32, ms: u32) -> Result<()> {
        thread::sleep(Duration::from_millis(ms.into()));
        Ok(())
    }
}

impl Tuner<'_> {
    /// Polls the IRQ status byte every `step_ms` until `done` holds.
    ///
    /// Makes `timeout_ms / step_ms - 1` attempts, so a step at or above the
    /// timeout fails without reading anything.
    fn poll(&mut self, timeout_ms: u32, step_ms: u32, done: impl Fn(IrqStatus) -> bool) -> Result<()> {
        if step_ms == 0 {
            return Err(Error::BadParameter);
        }
        let mut remaining = timeout_ms / step_ms;
        loop {
            remaining = remaining.saturating_sub(1);
            if remaining == 0 {
                return Err(Error::NotReady);
            }
            self.read(IRQ_STATUS_BYTE, 1)?;
            if done(IrqStatus::from_bits_retain(self.map.byte(IRQ_STATUS_BYTE))) {
                return Ok(());
            }
            self.wait(step_ms)?;
        }
    }

    /// Waits for the IRQ bit, or for the cause bits to equal `expected`
    /// when it is not empty.
    pub fn wait_irq(&mut self, timeout_ms: u32, step_ms: u32, expected: IrqStatus) -> Result<()> {
        let expected = expected.cause();
        self.poll(timeout_ms, step_ms, |status| {
            status.contains(IrqStatus::IRQ) || (!expected.is_empty() && status.cause() == expected)
        })
        .map_err(|e| self.fail(e, format_args!("wait_irq({timeout_ms}, {step_ms}, {:#04x})", expected.bits())))
    }

    pub fn wait_xtal_cal_end(&mut self, timeout_ms: u32, step_ms: u32) -> Result<()> {
        self.poll(timeout_ms, step_ms, |status| status.contains(IrqStatus::XTAL_CAL_END))
            .map_err(|e| self.fail(e, format_args!("wait_xtal_cal_end({timeout_ms}, {step_ms})")))
    }
}

impl Tda182i2 {
    pub fn wait_irq(&self, unit: u32, timeout_ms: u32, step_ms: u32, expected: IrqStatus) -> Result<()> {
        self.with(unit, |t| t.wait_irq(timeout_ms, step_ms, expected))
    }

    pub fn wait_xtal_cal_end(&self, unit: u32, timeout_ms: u32, step_ms: u32) -> Result<()> {
        self.with(unit, |t| t.wait_xtal_cal_end(timeout_ms, step_ms))
    }
}

#[cfg(test)]
mod tests {
    use crate::{registers::*, tests::driver, Error};
    use proptest::prelude::*;

    #[test]
    fn never_ready() {
        let (drv, emu) = driver(0);
        let r = drv.wait_irq(0, 100, 10, IrqStatus::CAUSE);
        assert!(matches!(r, Err(Error::NotReady)));
        assert_eq!(9, emu.reads_at(IRQ_STATUS_BYTE));
        assert_eq!(9, emu.sleeps());
    }

    #[test]
    fn cause_match_on_third_poll() {
        let (drv, emu) = driver(0);
        emu.set_completion_delay(Some(3));
        drv.write(0, IRQ_ENABLE_BYTE, &[0]).unwrap();
        drv.set_irq_wait(0, false).unwrap();
        drv.launch_rf_calibration(0).unwrap();
        drv.wait_irq(0, 100, 10, IrqStatus::LO_CALC_END | IrqStatus::RF_CAL_END).unwrap();
        assert_eq!(3, emu.reads_at(IRQ_STATUS_BYTE));
        assert_eq!(2, emu.sleeps());
        assert_eq!(20, emu.elapsed_ms());
    }

    #[test]
    fn irq_bit_ends_wait() {
        let (drv, emu) = driver(0);
        emu.set_completion_delay(Some(1));
        drv.write(0, IRQ_ENABLE_BYTE, &[0x80 | IrqStatus::LO_CALC_END.bits()]).unwrap();
        drv.set_irq_wait(0, false).unwrap();
        drv.launch_rf_calibration(0).unwrap();
        // RF_CAL_END alone would not match, the raised IRQ bit does.
        drv.wait_irq(0, 100, 10, IrqStatus::RF_CAL_END).unwrap();
        assert_eq!(1, emu.reads_at(IRQ_STATUS_BYTE));
    }

    #[test]
    fn wrong_cause_times_out() {
        let (drv, emu) = driver(0);
        emu.set_completion_delay(Some(1));
        drv.write(0, IRQ_ENABLE_BYTE, &[0]).unwrap();
        drv.set_irq_wait(0, false).unwrap();
        drv.launch_rf_calibration(0).unwrap();
        assert!(matches!(drv.wait_irq(0, 50, 10, IrqStatus::RSSI_END), Err(Error::NotReady)));
    }

    #[test]
    fn zero_step() {
        let (drv, _) = driver(0);
        assert!(matches!(drv.wait_irq(0, 100, 0, IrqStatus::CAUSE), Err(Error::BadParameter)));
    }

    #[test]
    fn xtal_cal_end() {
        let (drv, emu) = driver(0);
        emu.set_completion_delay(Some(2));
        drv.write(0, MSM_BYTE_2_ADDR, &[MsmLaunch::XTAL_CAL.bits()]).unwrap();
        drv.wait_xtal_cal_end(0, 100, 5).unwrap();
        assert_eq!(2, emu.reads_at(IRQ_STATUS_BYTE));
        assert_eq!(1, emu.sleeps());
    }

    proptest! {
        #[test]
        fn step_at_or_above_timeout_never_polls(timeout in 1..1000u32, extra in 0..1000u32) {
            let (drv, emu) = driver(0);
            let r = drv.wait_irq(0, timeout, timeout + extra, IrqStatus::CAUSE);
            assert!(matches!(r, Err(Error::NotReady)));
            assert_eq!(0, emu.reads_at(IRQ_STATUS_BYTE));
        }

        #[test]
        fn poll_count(timeout in 1..2000u32, step in 1..100u32) {
            let (drv, emu) = driver(0);
            let _ = drv.wait_irq(0, timeout, step, IrqStatus::CAUSE);
            let expected = (timeout / step).saturating_sub(1) as usize;
            assert_eq!(expected, emu.reads_at(IRQ_STATUS_BYTE));
        }
    }
}
