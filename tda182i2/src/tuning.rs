use crate::{registers::*, transport::Tuner, Error, Result, Tda182i2};
use log::Level;

/// One IF_Freq LSB.
pub const IF_STEP_HZ: u32 = 50_000;
/// Largest value RF_Freq_1..3 can hold, in kHz.
pub const RF_MAX_KHZ: u32 = 0x00FF_FFFF;

// Power_Level readings outside this window are clamped.
pub const POWER_LEVEL_MIN: u8 = 40;
pub const POWER_LEVEL_MAX: u8 = 110;

impl Tuner<'_> {
    pub fn reset(&mut self) -> Result<()> {
        self.read(0x00, REGISTER_COUNT)?;

        self.write_field(RSSI_CK_SPEED, 0)?;
        self.write_field(AGCS_UP_STEP_ASSYM, 3)?;
        self.write_field(AGCS_DO_STEP_ASSYM, 2)?;
        self.write_field(IR_MIXER_DO_STEP, 3)?;

        self.irq_clear(IrqStatus::CAUSE)?;
        self.set_power_state(PowerState::Normal)?;
        self.launch(MsmTrigger::POWER_UP)?;
        if self.obj.irq_wait {
            self.wait_irq(1500, 50, IrqStatus::CAUSE)?;
        }
        self.report(Level::Debug, format_args!("reset done"));
        Ok(())
    }

    pub fn set_power_state(&mut self, state: PowerState) -> Result<()> {
        self.read(POWER_STATE_BYTE, 15)?;
        let Some(bits) = state.standby_bits() else {
            return Err(self.fail(Error::NotSupported, format_args!("set_power_state({state:?})")));
        };

        // The 16 MHz crystal clock has to be selected before going to standby.
        if state.is_standby() {
            self.write_field(DIGITAL_CLOCK_MODE, 0)?;
        }
        let byte = self.map.byte(POWER_STATE_BYTE) & !STANDBY_BITS;
        self.map.set_byte(POWER_STATE_BYTE, byte | bits);
        self.write(POWER_STATE_BYTE, 1)?;
        if !state.is_standby() {
            self.write_field(DIGITAL_CLOCK_MODE, 1)?;
        }

        self.obj.power_state = state;
        Ok(())
    }

    pub fn power_state(&mut self) -> Result<PowerState> {
        self.read(POWER_STATE_BYTE, 1)?;
        Ok(PowerState::from_standby_bits(self.map.byte(POWER_STATE_BYTE)))
    }

    pub fn set_rf_frequency(&mut self, hz: u64) -> Result<()> {
        let Some(khz) = u32::try_from(hz / 1000).ok().filter(|k| *k <= RF_MAX_KHZ) else {
            return Err(self.fail(Error::BadParameter, format_args!("set_rf_frequency({hz})")));
        };

        self.irq_clear(IrqStatus::LO_CALC_END | IrqStatus::RF_CAL_END)?;
        self.set_power_state(PowerState::Normal)?;

        let [_, hi, mid, lo] = khz.to_be_bytes();
        self.map.set(RF_FREQ_1, hi);
        self.map.set(RF_FREQ_2, mid);
        self.map.set(RF_FREQ_3, lo);
        self.write(RF_FREQ_BYTE, 3)?;

        self.launch(MsmTrigger::TUNE)?;
        if self.obj.irq_wait {
            self.wait_irq(50, 5, IrqStatus::LO_CALC_END | IrqStatus::RF_CAL_END)?;
        }
        Ok(())
    }

    pub fn rf_frequency(&mut self) -> Result<u64> {
        self.read(RF_FREQ_BYTE, 3)?;
        let khz = u32::from_be_bytes([
            0,
            self.map.get(RF_FREQ_1),
            self.map.get(RF_FREQ_2),
            self.map.get(RF_FREQ_3),
        ]);
        Ok(u64::from(khz) * 1000)
    }

    pub fn set_if_frequency(&mut self, hz: u32) -> Result<()> {
        let steps = u8::try_from(hz / IF_STEP_HZ)
            .map_err(|_| self.fail(Error::BadParameter, format_args!("set_if_frequency({hz})")))?;
        self.write_field(IF_FREQ, steps)
    }

    pub fn if_frequency(&mut self) -> Result<u32> {
        Ok(u32::from(self.read_field(IF_FREQ)?) * IF_STEP_HZ)
    }

    pub fn launch_rf_calibration(&mut self) -> Result<()> {
        self.launch(MsmTrigger::RF_CALIBRATION)?;
        if self.obj.irq_wait {
            self.wait_irq(1700, 50, IrqStatus::LO_CALC_END | IrqStatus::RF_CAL_END)?;
        }
        Ok(())
    }

    /// Triggers an RSSI measurement and returns the clamped level.
    pub fn power_level(&mut self) -> Result<u8> {
        self.irq_clear(IrqStatus::RSSI_END)?;
        self.map.set_byte(MSM_BYTE_1_ADDR, MsmTrigger::RSSI_MEAS.bits());
        self.write(MSM_BYTE_1_ADDR, 1)?;
        self.launch_msm()?;
        if self.obj.irq_wait {
            self.wait_irq(700, 1, IrqStatus::RSSI_END)?;
        }

        #[rustfmt::skip]
        let level = match self.read_field(POWER_LEVEL)? {
            l if l < POWER_LEVEL_MIN => 0,
            l if l > POWER_LEVEL_MAX => 0xFF,
            l => l,
        };
        Ok(level)
    }

    pub fn set_lpf_gain_mode(&mut self, mode: LpfGainMode) -> Result<()> {
        match mode {
            LpfGainMode::Free => {
                self.write_field(AGC5_LOOP_OFF, 0)?;
                self.write_field(FORCE_AGC5_GAIN, 0)
            }
            LpfGainMode::Frozen => {
                self.write_field(AGC5_LOOP_OFF, 1)?;
                self.write_field(FORCE_AGC5_GAIN, 1)?;
                self.write_field(AGC5_GAIN, 0)
            }
            LpfGainMode::Unknown => {
                self.report(Level::Warn, format_args!("set_lpf_gain_mode(Unknown) ignored"));
                Ok(())
            }
        }
    }

    pub fn lpf_gain_mode(&mut self) -> Result<LpfGainMode> {
        self.read(AGC5_GAIN.addr, 1)?;
        #[rustfmt::skip]
        let mode = match (self.map.get(AGC5_LOOP_OFF), self.map.get(FORCE_AGC5_GAIN), self.map.get(AGC5_GAIN)) {
            (0, 0, _) => LpfGainMode::Free,
            (1, 1, 0) => LpfGainMode::Frozen,
            _         => LpfGainMode::Unknown,
        };
        Ok(mode)
    }
}

impl Tda182i2 {
    /// Brings the chip out of power-on reset: register defaults, power-up
    /// calibration, Normal power state.
    pub fn reset(&self, unit: u32) -> Result<()> {
        self.with(unit, |t| t.reset())
    }

    pub fn set_power_state(&self, unit: u32, state: PowerState) -> Result<()> {
        self.with(unit, |t| t.set_power_state(state))
    }

    /// Like [`Tda182i2::set_power_state`] for callers holding a raw state
    /// number.
    pub fn set_power_state_raw(&self, unit: u32, state: u8) -> Result<()> {
        let state = PowerState::try_from(state).map_err(|_| Error::NotSupported)?;
        self.set_power_state(unit, state)
    }

    /// Sets `state`, or `deepest` if `state` is a deeper standby. On success
    /// the unclamped request is kept for [`Tda182i2::requested_power_state`].
    pub fn request_power_state(&self, unit: u32, state: PowerState, deepest: PowerState) -> Result<()> {
        self.with(unit, |t| {
            t.set_power_state(state.limit(deepest))?;
            t.obj.requested_power_state = state;
            Ok(())
        })
    }

    pub fn requested_power_state(&self, unit: u32) -> Result<PowerState> {
        self.with(unit, |t| Ok(t.obj.requested_power_state))
    }

    /// Decodes the standby bits currently on the chip.
    pub fn power_state(&self, unit: u32) -> Result<PowerState> {
        self.with(unit, |t| t.power_state())
    }

    /// State stored by the last successful [`Tda182i2::set_power_state`].
    pub fn cached_power_state(&self, unit: u32) -> Result<PowerState> {
        self.with(unit, |t| Ok(t.obj.power_state))
    }

    pub fn set_rf_frequency(&self, unit: u32, hz: u64) -> Result<()> {
        self.with(unit, |t| t.set_rf_frequency(hz))
    }

    pub fn rf_frequency(&self, unit: u32) -> Result<u64> {
        self.with(unit, |t| t.rf_frequency())
    }

    pub fn set_if_frequency(&self, unit: u32, hz: u32) -> Result<()> {
        self.with(unit, |t| t.set_if_frequency(hz))
    }

    pub fn if_frequency(&self, unit: u32) -> Result<u32> {
        self.with(unit, |t| t.if_frequency())
    }

    pub fn launch_rf_calibration(&self, unit: u32) -> Result<()> {
        self.with(unit, |t| t.launch_rf_calibration())
    }

    pub fn power_level(&self, unit: u32) -> Result<u8> {
        self.with(unit, |t| t.power_level())
    }

    pub fn launch_msm(&self, unit: u32) -> Result<()> {
        self.with(unit, |t| t.launch_msm())
    }

    pub fn irq_status(&self, unit: u32) -> Result<IrqStatus> {
        self.with(unit, |t| {
            t.read(IRQ_STATUS_BYTE, 1)?;
            Ok(IrqStatus::from_bits_retain(t.map.byte(IRQ_STATUS_BYTE)))
        })
    }

    pub fn set_irq_clear(&self, unit: u32, causes: IrqStatus) -> Result<()> {
        self.with(unit, |t| t.irq_clear(causes))
    }

    pub fn xtal_cal_end(&self, unit: u32) -> Result<bool> {
        Ok(self.read_field(unit, MSM_XTALCAL_END)? == 1)
    }

    pub fn set_lpf_gain_mode(&self, unit: u32, mode: LpfGainMode) -> Result<()> {
        self.with(unit, |t| t.set_lpf_gain_mode(mode))
    }

    pub fn lpf_gain_mode(&self, unit: u32) -> Result<LpfGainMode> {
        self.with(unit, |t| t.lpf_gain_mode())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::driver;
    use proptest::prelude::*;

    #[test]
    fn reset_sequence() {
        let (drv, emu) = driver(0);
        drv.reset(0).unwrap();

        let map = drv.shadow(0).unwrap();
        assert_eq!(0, map.get(RSSI_CK_SPEED));
        assert_eq!(3, map.get(AGCS_UP_STEP_ASSYM));
        assert_eq!(2, map.get(AGCS_DO_STEP_ASSYM));
        assert_eq!(3, map.get(IR_MIXER_DO_STEP));
        assert_eq!(0, map.get(MSM_LAUNCH));
        assert_eq!(PowerState::Normal, drv.power_state(0).unwrap());
        assert_eq!(1, drv.read_field(0, DIGITAL_CLOCK_MODE).unwrap());
        assert!(emu.writes().contains(&(MSM_BYTE_1_ADDR, vec![0x3B, 0x01])));
        assert!(emu.writes().contains(&(IRQ_CLEAR_BYTE, vec![0x9F])));
    }

    #[test]
    fn reset_times_out() {
        let (drv, emu) = driver(0);
        emu.set_completion_delay(None);
        assert!(matches!(drv.reset(0), Err(Error::NotReady)));
        assert_eq!(29, emu.reads_at(IRQ_STATUS_BYTE));

        drv.set_irq_wait(0, false).unwrap();
        drv.reset(0).unwrap();
    }

    #[test]
    fn standby_switches_clock_first() {
        let (drv, emu) = driver(0);
        drv.set_power_state(0, PowerState::Normal).unwrap();
        emu.clear_log();
        drv.set_power_state(0, PowerState::Standby).unwrap();
        let writes = emu.writes();
        assert_eq!(DIGITAL_CLOCK_MODE.addr, writes[0].0);
        assert_eq!(0, DIGITAL_CLOCK_MODE.extract(writes[0].1[0]));
        assert_eq!((POWER_STATE_BYTE, vec![0b1111]), writes[1]);
        assert_eq!(2, writes.len());
    }

    #[test]
    fn normal_switches_clock_after() {
        let (drv, emu) = driver(0);
        drv.set_power_state(0, PowerState::Normal).unwrap();
        let writes = emu.writes();
        assert_eq!(POWER_STATE_BYTE, writes[0].0);
        assert_eq!(DIGITAL_CLOCK_MODE.addr, writes[1].0);
        assert_eq!(1, DIGITAL_CLOCK_MODE.extract(writes[1].1[0]));
    }

    #[test]
    fn power_state_max_not_supported() {
        let (drv, _) = driver(0);
        drv.set_power_state(0, PowerState::StandbyLnaXtalOn).unwrap();
        assert!(matches!(drv.set_power_state(0, PowerState::Max), Err(Error::NotSupported)));
        assert!(matches!(drv.set_power_state_raw(0, 9), Err(Error::NotSupported)));
        assert_eq!(PowerState::StandbyLnaXtalOn, drv.cached_power_state(0).unwrap());
        assert_eq!(PowerState::StandbyLnaXtalOn, drv.power_state(0).unwrap());
    }

    #[test]
    fn power_state_unknown_bits() {
        let (drv, _) = driver(0);
        drv.write(0, POWER_STATE_BYTE, &[0b0101]).unwrap();
        assert_eq!(PowerState::Max, drv.power_state(0).unwrap());
    }

    #[test]
    fn rf_frequency_bytes() {
        let (drv, emu) = driver(0);
        drv.set_rf_frequency(0, 474_000_000).unwrap();
        // 474000 kHz
        assert!(emu.writes().contains(&(RF_FREQ_BYTE, vec![0x07, 0x3B, 0x90])));
        assert!(emu.writes().contains(&(MSM_BYTE_1_ADDR, vec![0x41, 0x01])));
        assert!(drv.lo_lock(0).unwrap());
        assert_eq!(PowerState::Normal, drv.cached_power_state(0).unwrap());
    }

    #[test]
    fn rf_frequency_out_of_range() {
        let (drv, emu) = driver(0);
        let r = drv.set_rf_frequency(0, u64::from(RF_MAX_KHZ + 1) * 1000);
        assert!(matches!(r, Err(Error::BadParameter)));
        assert!(emu.writes().is_empty());
    }

    #[test]
    fn if_frequency_out_of_range() {
        let (drv, _) = driver(0);
        assert!(matches!(drv.set_if_frequency(0, 256 * IF_STEP_HZ), Err(Error::BadParameter)));
    }

    #[test]
    fn rf_calibration_times_out() {
        let (drv, emu) = driver(0);
        emu.set_completion_delay(None);
        assert!(matches!(drv.launch_rf_calibration(0), Err(Error::NotReady)));
        assert_eq!(33, emu.reads_at(IRQ_STATUS_BYTE));
    }

    #[test]
    fn power_level_clamps() {
        let (drv, emu) = driver(0);
        for (raw, level) in [(20, 0), (40, 40), (75, 75), (110, 110), (111, 0xFF)] {
            emu.set_power_level(raw);
            assert_eq!(level, drv.power_level(0).unwrap());
        }
        assert!(emu.writes().contains(&(MSM_BYTE_1_ADDR, vec![0x80])));
        assert!(emu.writes().contains(&(MSM_BYTE_2_ADDR, vec![0x01])));
    }

    #[test]
    fn lpf_gain_mode() {
        let (drv, _) = driver(0);
        drv.set_lpf_gain_mode(0, LpfGainMode::Frozen).unwrap();
        assert_eq!(LpfGainMode::Frozen, drv.lpf_gain_mode(0).unwrap());
        drv.set_lpf_gain_mode(0, LpfGainMode::Free).unwrap();
        assert_eq!(LpfGainMode::Free, drv.lpf_gain_mode(0).unwrap());
        drv.write_field(0, AGC5_LOOP_OFF, 1).unwrap();
        assert_eq!(LpfGainMode::Unknown, drv.lpf_gain_mode(0).unwrap());
        drv.set_lpf_gain_mode(0, LpfGainMode::Unknown).unwrap();
        assert_eq!(LpfGainMode::Unknown, drv.lpf_gain_mode(0).unwrap());
    }

    #[test]
    fn irq_status_after_tune() {
        let (drv, _) = driver(0);
        drv.set_rf_frequency(0, 100_000_000).unwrap();
        let status = drv.irq_status(0).unwrap();
        assert!(status.contains(IrqStatus::LO_CALC_END | IrqStatus::RF_CAL_END));
        drv.set_irq_clear(0, IrqStatus::CAUSE).unwrap();
        assert!(drv.irq_status(0).unwrap().is_empty());
    }

    proptest! {
        #[test]
        fn rf_round_trip(hz in 0..u64::from(RF_MAX_KHZ + 1) * 1000) {
            let (drv, _) = driver(0);
            drv.set_rf_frequency(0, hz).unwrap();
            assert_eq!(hz / 1000 * 1000, drv.rf_frequency(0).unwrap());
        }

        #[test]
        fn if_round_trip(hz in 0..=255 * IF_STEP_HZ) {
            let (drv, _) = driver(0);
            drv.set_if_frequency(0, hz).unwrap();
            assert_eq!(hz / IF_STEP_HZ * IF_STEP_HZ, drv.if_frequency(0).unwrap());
        }

        #[test]
        fn power_state_round_trip(state in any::<PowerState>()) {
            let (drv, _) = driver(0);
            match drv.set_power_state(0, state) {
                Ok(()) => assert_eq!(state, drv.power_state(0).unwrap()),
                Err(e) => {
                    assert_eq!(PowerState::Max, state);
                    assert!(matches!(e, Error::NotSupported));
                }
            }
        }
    }
}
