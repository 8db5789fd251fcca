use crate::config::*;

#[rustfmt::skip]
pub const MASTER: Board = Board {
    master: true,
    lt_enable: false, psm_agc1: true, agc1_6_15db: false,
    min_power_state: PowerState::StandbyXtalOn,
};

#[rustfmt::skip]
pub const MASTER_DIGITAL: Board = Board {
    master: true,
    lt_enable: true, psm_agc1: false, agc1_6_15db: true,
    min_power_state: PowerState::StandbyLnaXtalSynthOn,
};

#[rustfmt::skip]
pub const SLAVE: Board = Board {
    master: false,
    lt_enable: false, psm_agc1: true, agc1_6_15db: false,
    min_power_state: PowerState::StandbyXtalOn,
};

pub const SLAVE_DIGITAL: Board = SLAVE;

impl Board {
    /// Full start-up sequence: crystal output, crystal calibration (master)
    /// or LO defaults (slave), chip reset, then the board's settings.
    pub fn bring_up(&self, radio: &Tda182i2, unit: u32) -> Result<()> {
        radio.write_field(unit, XTOUT, 3)?;
        if self.master {
            radio.wait_xtal_cal_end(unit, 100, 5)?;
        } else {
            radio.write_field(unit, FMAX_LO, 0x00)?;
            radio.write_field(unit, N_CP_CURRENT, 0x68)?;
        }

        radio.reset(unit)?;
        radio.write_field(unit, FMAX_LO, 0x0A)?;
        radio.write_field(unit, LT_ENABLE, self.lt_enable.into())?;
        radio.write_field(unit, PSM_AGC1, self.psm_agc1.into())?;
        radio.write_field(unit, AGC1_6_15DB, self.agc1_6_15db.into())?;
        log::info!(target: TARGET, "unit {unit:#x}: up ({})", if self.master { "master" } else { "slave" });
        Ok(())
    }

    /// States deeper than the board allows are raised to its minimum.
    pub fn clamp(&self, state: PowerState) -> PowerState {
        state.limit(self.min_power_state)
    }

    pub fn set_power_state(&self, radio: &Tda182i2, unit: u32, state: PowerState) -> Result<()> {
        radio.request_power_state(unit, state, self.min_power_state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{tests::driver, Error};
    use proptest::prelude::*;

    #[test]
    fn master_bring_up() {
        let (drv, emu) = driver(0);
        emu.power_on();
        emu.clear_log();

        MASTER_DIGITAL.bring_up(&drv, 0).unwrap();
        let regs = emu.registers();
        assert_eq!(3, regs.get(XTOUT));
        assert_eq!(0x0A, regs.get(FMAX_LO));
        assert_eq!(1, regs.get(LT_ENABLE));
        assert_eq!(0, regs.get(PSM_AGC1));
        assert_eq!(1, regs.get(AGC1_6_15DB));
        assert_eq!(PowerState::Normal, drv.power_state(0).unwrap());
        assert!(!emu.writes().iter().any(|(a, _)| *a == N_CP_CURRENT.addr));
    }

    #[test]
    fn master_without_xtal_cal() {
        let (drv, _) = driver(0);
        assert!(matches!(MASTER.bring_up(&drv, 0), Err(Error::NotReady)));
    }

    #[test]
    fn slave_bring_up() {
        let (drv, emu) = driver(0);
        SLAVE.bring_up(&drv, 0).unwrap();
        let regs = emu.registers();
        assert_eq!(0x68, regs.get(N_CP_CURRENT));
        assert_eq!(0x0A, regs.get(FMAX_LO));
        assert_eq!(1, regs.get(PSM_AGC1));
        assert!(emu.writes().contains(&(FMAX_LO.addr, vec![0x00])));
    }

    #[test]
    fn digital_master_keeps_synth_on() {
        let (drv, _) = driver(0);
        MASTER_DIGITAL.set_power_state(&drv, 0, PowerState::Standby).unwrap();
        assert_eq!(PowerState::StandbyLnaXtalSynthOn, drv.power_state(0).unwrap());
        assert_eq!(PowerState::StandbyLnaXtalSynthOn, drv.cached_power_state(0).unwrap());
        assert_eq!(PowerState::Standby, drv.requested_power_state(0).unwrap());
    }

    #[test]
    fn failed_request_not_recorded() {
        let (drv, emu) = driver(0);
        MASTER.set_power_state(&drv, 0, PowerState::Normal).unwrap();
        emu.fail_writes(POWER_STATE_BYTE);
        assert!(matches!(MASTER.set_power_state(&drv, 0, PowerState::Standby), Err(Error::Io(_))));
        assert_eq!(PowerState::Normal, drv.requested_power_state(0).unwrap());

        emu.clear_faults();
        MASTER.set_power_state(&drv, 0, PowerState::Standby).unwrap();
        assert_eq!(PowerState::Standby, drv.requested_power_state(0).unwrap());
        assert_eq!(PowerState::StandbyXtalOn, drv.power_state(0).unwrap());
    }

    proptest! {
        #[test]
        fn clamp_never_deeper(state in any::<PowerState>()) {
            for board in [MASTER, MASTER_DIGITAL, SLAVE, SLAVE_DIGITAL] {
                let clamped = board.clamp(state);
                assert!(u8::from(clamped) <= u8::from(board.min_power_state));
                if u8::from(state) <= u8::from(board.min_power_state) {
                    assert_eq!(state, clamped);
                }
            }
        }
    }
}
