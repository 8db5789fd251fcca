/* Broadcast standards
 *
 * Each standard fixes the IF, the channel filter and the AGC thresholds the
 * chip runs with. `set_rf` applies the selected standard and then tunes,
 * so callers only pick a standard once and hand over channel frequencies.
 * */
use crate::{
    registers::*,
    transport::Tuner,
    tuning::{IF_STEP_HZ, RF_MAX_KHZ},
    Error, Result, Tda182i2,
};
use log::Level;
use num_enum::{IntoPrimitive, TryFromPrimitive};
use serde::{Deserialize, Serialize};
#[cfg(test)] use proptest_derive::Arbitrary;

/// Below this RF the low band RF AGC TOP applies, from here on the high band one.
pub const RFAGC_TOP_FREQ_LIM_HZ: u64 = 291_000_000;
const XTAL_HZ: u64 = 16_000_000;

#[derive(Clone, Copy, Debug, PartialEq, Eq, IntoPrimitive, TryFromPrimitive, Serialize, Deserialize)]
#[cfg_attr(test, derive(Arbitrary))]
#[repr(u8)]
#[rustfmt::skip]
pub enum StandardMode {
    DvbT6Mhz      = 0,
    DvbT7Mhz      = 1,
    DvbT8Mhz      = 2,
    Qam6Mhz       = 3,
    Qam8Mhz       = 4,
    Isdbt6Mhz     = 5,
    Atsc6Mhz      = 6,
    DmbT8Mhz      = 7,
    AnalogMn      = 8,
    AnalogB       = 9,
    AnalogGh      = 10,
    AnalogI       = 11,
    AnalogDk      = 12,
    AnalogL       = 13,
    /// L' (SECAM L, band I).
    AnalogLPrime  = 14,
    FmRadio       = 15,
    BlindScanning = 16,
    ScanXpress    = 17,
}

impl Default for StandardMode {
    fn default() -> Self {
        StandardMode::DvbT8Mhz
    }
}

/// LP_Fc: channel filter cut-off.
#[derive(Clone, Copy, Debug, PartialEq, Eq, IntoPrimitive, TryFromPrimitive, Serialize, Deserialize)]
#[repr(u8)]
#[rustfmt::skip]
pub enum Lpf {
    Mhz6   = 0,
    Mhz7   = 1,
    Mhz8   = 2,
    Mhz9   = 3,
    Mhz1_5 = 4,
}

/// LP_FC_Offset: cut-off correction, in percent below nominal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, IntoPrimitive, TryFromPrimitive, Serialize, Deserialize)]
#[repr(u8)]
#[rustfmt::skip]
pub enum LpfOffset {
    Zero     = 0,
    Minus4   = 1,
    Minus8   = 2,
    Minus12  = 3,
}

/// IF_Level: IF output swing and gain range.
#[derive(Clone, Copy, Debug, PartialEq, Eq, IntoPrimitive, TryFromPrimitive, Serialize, Deserialize)]
#[repr(u8)]
#[rustfmt::skip]
pub enum IfLevel {
    Vpp2_0To30Db        = 0,
    Vpp1_25Min4To26Db   = 1,
    Vpp1Min6To24Db      = 2,
    Vpp0_8Min8To22Db    = 3,
    Vpp0_85Min7_5To22_5 = 4,
    Vpp0_7Min9To21Db    = 5,
    Vpp0_6Min10_3To19_7 = 6,
    Vpp0_5Min12To18Db   = 7,
}

/// IF high pass corner. Anything but `Disabled` lands in IF_HP_Fc as value - 1.
#[derive(Clone, Copy, Debug, PartialEq, Eq, IntoPrimitive, TryFromPrimitive, Serialize, Deserialize)]
#[repr(u8)]
#[rustfmt::skip]
pub enum IfHpf {
    Disabled = 0,
    Mhz0_4   = 1,
    Mhz0_85  = 2,
    Mhz1     = 3,
    Mhz1_5   = 4,
}

/// RFAGC_Top, in dBuV.
#[derive(Clone, Copy, Debug, PartialEq, Eq, IntoPrimitive, TryFromPrimitive, Serialize, Deserialize)]
#[repr(u8)]
#[rustfmt::skip]
pub enum RfAgcTop {
    Dbuv94  = 0,
    Dbuv96  = 1,
    Dbuv98  = 2,
    Dbuv100 = 3,
    Dbuv102 = 4,
    Dbuv104 = 5,
    Dbuv106 = 6,
    Dbuv107 = 7,
}

// AGC1_Top, AGC2_Top, IR_Mixer_Top and AGC5_Top codes used by the table.
pub const AGC1_TOP_D95_U89: u8 = 0;
pub const AGC1_TOP_D100_U94: u8 = 1;
pub const AGC2_TOP_D90_U84: u8 = 0;
pub const AGC45_TOP_D105_U100: u8 = 1;
pub const AGC45_TOP_D110_U105: u8 = 11;
pub const AGC45_TOP_D112_U107: u8 = 15;

// AGC1/AGC2 down-step time constants.
pub const DO_STEP_2_047MS: u8 = 1;
pub const DO_STEP_4_094MS: u8 = 2;
pub const DO_STEP_8_188MS: u8 = 3;

/// Everything `set_rf` programs for one standard.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Standard {
    /// IF the demodulator expects before the carrier offset is applied.
    pub if_hz: u32,
    /// Distance from the channel frequency to the frequency actually tuned.
    pub cf_offset_hz: i32,
    pub lpf: Lpf,
    pub lpf_offset: LpfOffset,
    pub if_level: IfLevel,
    pub if_notch: bool,
    pub if_hpf: IfHpf,
    pub dc_notch: bool,
    pub agc1_top: u8,
    pub agc1_do_step: u8,
    pub agc2_top: u8,
    pub agc2_do_step: u8,
    pub rfagc_top_low: RfAgcTop,
    pub rfagc_top_high: RfAgcTop,
    /// From here up the LTE TOP settings replace the band ones.
    pub lte_start_hz: u64,
    pub rfagc_top_lte: RfAgcTop,
    pub ir_mixer_top: u8,
    pub agc5_top: u8,
    pub agc5_detector_hpf: bool,
    pub rfagc_adapt: bool,
    pub rfagc_adapt_top: u8,
    pub rfagc_adapt_top_lte: u8,
    pub rf_atten_3db: bool,
    /// AGCK mode in bits 0-1, AGCK step in bits 2-3.
    pub gsk: u8,
    pub h3h5_vhf_filter6: bool,
    pub lpf_gain: LpfGainMode,
    /// Freeze AGC1 on the first tune and adapt it by hand on every tune.
    pub agc1_freeze: bool,
    /// Ramp the RF filter gain down around the tune (masters only).
    pub lto_sto_immune: bool,
    pub pd_udld: bool,
}

#[rustfmt::skip]
pub const DVBT_6MHZ: Standard = Standard {
    if_hz: 3_600_000, cf_offset_hz: 0,
    lpf: Lpf::Mhz7, lpf_offset: LpfOffset::Minus8, if_level: IfLevel::Vpp1Min6To24Db,
    if_notch: true, if_hpf: IfHpf::Mhz0_4, dc_notch: true,
    agc1_top: AGC1_TOP_D95_U89, agc1_do_step: DO_STEP_4_094MS,
    agc2_top: AGC2_TOP_D90_U84, agc2_do_step: DO_STEP_2_047MS,
    rfagc_top_low: RfAgcTop::Dbuv100, rfagc_top_high: RfAgcTop::Dbuv102,
    lte_start_hz: 754_000_000, rfagc_top_lte: RfAgcTop::Dbuv94,
    ir_mixer_top: AGC45_TOP_D110_U105, agc5_top: AGC45_TOP_D110_U105, agc5_detector_hpf: false,
    rfagc_adapt: true, rfagc_adapt_top: 2, rfagc_adapt_top_lte: 0,
    rf_atten_3db: true, gsk: 0x02, h3h5_vhf_filter6: true,
    lpf_gain: LpfGainMode::Free, agc1_freeze: false, lto_sto_immune: false, pd_udld: true,
};

#[rustfmt::skip]
pub const DVBT_7MHZ: Standard = Standard {
    if_hz: 4_200_000, lpf: Lpf::Mhz8, if_hpf: IfHpf::Mhz0_85,
    ..DVBT_6MHZ
};

#[rustfmt::skip]
pub const DVBT_8MHZ: Standard = Standard {
    if_hz: 4_500_000, if_notch: false,
    ..DVBT_7MHZ
};

#[rustfmt::skip]
pub const QAM_6MHZ: Standard = Standard {
    if_hz: 3_600_000, cf_offset_hz: 0,
    lpf: Lpf::Mhz6, lpf_offset: LpfOffset::Minus8, if_level: IfLevel::Vpp1Min6To24Db,
    if_notch: false, if_hpf: IfHpf::Disabled, dc_notch: true,
    agc1_top: AGC1_TOP_D95_U89, agc1_do_step: DO_STEP_8_188MS,
    agc2_top: AGC2_TOP_D90_U84, agc2_do_step: DO_STEP_8_188MS,
    rfagc_top_low: RfAgcTop::Dbuv100, rfagc_top_high: RfAgcTop::Dbuv100,
    lte_start_hz: 754_000_000, rfagc_top_lte: RfAgcTop::Dbuv100,
    ir_mixer_top: AGC45_TOP_D110_U105, agc5_top: AGC45_TOP_D110_U105, agc5_detector_hpf: false,
    rfagc_adapt: false, rfagc_adapt_top: 0, rfagc_adapt_top_lte: 0,
    rf_atten_3db: false, gsk: 0x02, h3h5_vhf_filter6: false,
    lpf_gain: LpfGainMode::Free, agc1_freeze: true, lto_sto_immune: true, pd_udld: false,
};

#[rustfmt::skip]
pub const QAM_8MHZ: Standard = Standard {
    if_hz: 5_000_000, lpf: Lpf::Mhz9, if_hpf: IfHpf::Mhz0_85, lto_sto_immune: false,
    ..QAM_6MHZ
};

#[rustfmt::skip]
pub const ISDBT_6MHZ: Standard = Standard {
    if_hz: 3_250_000, cf_offset_hz: 0,
    lpf: Lpf::Mhz6, lpf_offset: LpfOffset::Zero, if_level: IfLevel::Vpp0_6Min10_3To19_7,
    if_notch: true, if_hpf: IfHpf::Mhz0_4, dc_notch: true,
    agc1_top: AGC1_TOP_D95_U89, agc1_do_step: DO_STEP_8_188MS,
    agc2_top: AGC2_TOP_D90_U84, agc2_do_step: DO_STEP_8_188MS,
    rfagc_top_low: RfAgcTop::Dbuv100, rfagc_top_high: RfAgcTop::Dbuv102,
    lte_start_hz: 754_000_000, rfagc_top_lte: RfAgcTop::Dbuv102,
    ir_mixer_top: AGC45_TOP_D110_U105, agc5_top: AGC45_TOP_D110_U105, agc5_detector_hpf: false,
    rfagc_adapt: true, rfagc_adapt_top: 2, rfagc_adapt_top_lte: 0,
    rf_atten_3db: true, gsk: 0x02, h3h5_vhf_filter6: true,
    lpf_gain: LpfGainMode::Free, agc1_freeze: false, lto_sto_immune: false, pd_udld: false,
};

#[rustfmt::skip]
pub const ATSC_6MHZ: Standard = Standard {
    agc1_top: AGC1_TOP_D100_U94,
    rfagc_top_low: RfAgcTop::Dbuv104, rfagc_top_high: RfAgcTop::Dbuv104, rfagc_top_lte: RfAgcTop::Dbuv104,
    ir_mixer_top: AGC45_TOP_D112_U107, agc5_top: AGC45_TOP_D112_U107,
    rfagc_adapt_top: 3, rfagc_adapt_top_lte: 3,
    ..ISDBT_6MHZ
};

#[rustfmt::skip]
pub const DMBT_8MHZ: Standard = Standard {
    if_hz: 4_000_000,
    lpf: Lpf::Mhz8, if_level: IfLevel::Vpp1Min6To24Db, if_hpf: IfHpf::Disabled,
    rfagc_adapt_top_lte: 2,
    ..ISDBT_6MHZ
};

#[rustfmt::skip]
pub const ANALOG_MN: Standard = Standard {
    if_hz: 5_400_000, cf_offset_hz: 1_750_000,
    lpf: Lpf::Mhz6, lpf_offset: LpfOffset::Zero, if_level: IfLevel::Vpp0_7Min9To21Db,
    if_notch: false, if_hpf: IfHpf::Disabled, dc_notch: false,
    agc1_top: AGC1_TOP_D95_U89, agc1_do_step: DO_STEP_8_188MS,
    agc2_top: AGC2_TOP_D90_U84, agc2_do_step: DO_STEP_8_188MS,
    rfagc_top_low: RfAgcTop::Dbuv96, rfagc_top_high: RfAgcTop::Dbuv96,
    lte_start_hz: 754_000_000, rfagc_top_lte: RfAgcTop::Dbuv96,
    ir_mixer_top: AGC45_TOP_D105_U100, agc5_top: AGC45_TOP_D105_U100, agc5_detector_hpf: true,
    rfagc_adapt: false, rfagc_adapt_top: 0, rfagc_adapt_top_lte: 0,
    rf_atten_3db: false, gsk: 0x01, h3h5_vhf_filter6: false,
    lpf_gain: LpfGainMode::Frozen, agc1_freeze: false, lto_sto_immune: false, pd_udld: false,
};

#[rustfmt::skip]
pub const ANALOG_B: Standard = Standard {
    if_hz: 6_400_000, cf_offset_hz: 2_250_000, lpf: Lpf::Mhz7,
    ..ANALOG_MN
};

#[rustfmt::skip]
pub const ANALOG_I: Standard = Standard {
    if_hz: 7_250_000, cf_offset_hz: 2_750_000, lpf: Lpf::Mhz8,
    ..ANALOG_MN
};

#[rustfmt::skip]
pub const ANALOG_GH: Standard = Standard { if_hz: 6_750_000, pd_udld: true, ..ANALOG_I };
#[rustfmt::skip]
pub const ANALOG_DK: Standard = Standard { if_hz: 6_850_000, if_notch: true, ..ANALOG_I };
#[rustfmt::skip]
pub const ANALOG_L: Standard = Standard { if_hz: 6_750_000, if_notch: true, ..ANALOG_I };

#[rustfmt::skip]
pub const ANALOG_L_PRIME: Standard = Standard {
    if_hz: 1_250_000, cf_offset_hz: -2_750_000, agc5_detector_hpf: false,
    ..ANALOG_I
};

#[rustfmt::skip]
pub const FM_RADIO: Standard = Standard {
    if_hz: 1_250_000, cf_offset_hz: 0,
    lpf: Lpf::Mhz1_5, if_hpf: IfHpf::Mhz0_85, dc_notch: true,
    agc5_detector_hpf: false, gsk: 0x02,
    ..ANALOG_MN
};

#[rustfmt::skip]
pub const SCAN_XPRESS: Standard = Standard {
    if_hz: 5_000_000,
    lpf: Lpf::Mhz9, if_level: IfLevel::Vpp1Min6To24Db, if_hpf: IfHpf::Disabled,
    rfagc_adapt_top_lte: 2, gsk: 0x0E,
    ..ISDBT_6MHZ
};

impl StandardMode {
    pub fn settings(self) -> &'static Standard {
        match self {
            StandardMode::DvbT6Mhz => &DVBT_6MHZ,
            StandardMode::DvbT7Mhz => &DVBT_7MHZ,
            StandardMode::DvbT8Mhz => &DVBT_8MHZ,
            StandardMode::Qam6Mhz => &QAM_6MHZ,
            StandardMode::Qam8Mhz => &QAM_8MHZ,
            StandardMode::Isdbt6Mhz => &ISDBT_6MHZ,
            StandardMode::Atsc6Mhz => &ATSC_6MHZ,
            StandardMode::DmbT8Mhz => &DMBT_8MHZ,
            StandardMode::AnalogMn => &ANALOG_MN,
            StandardMode::AnalogB => &ANALOG_B,
            StandardMode::AnalogGh => &ANALOG_GH,
            StandardMode::AnalogI | StandardMode::BlindScanning => &ANALOG_I,
            StandardMode::AnalogDk => &ANALOG_DK,
            StandardMode::AnalogL => &ANALOG_L,
            StandardMode::AnalogLPrime => &ANALOG_L_PRIME,
            StandardMode::FmRadio => &FM_RADIO,
            StandardMode::ScanXpress => &SCAN_XPRESS,
        }
    }
}

impl Standard {
    /// IF the chip is programmed with: the nominal IF moved by the carrier offset.
    pub fn output_if_hz(&self) -> Option<u32> {
        u32::try_from(i64::from(self.if_hz) - i64::from(self.cf_offset_hz)).ok()
    }

    /// RF the synthesizer is tuned to for a channel at `hz`.
    pub fn tuned_hz(&self, hz: u64) -> Option<u64> {
        hz.checked_add_signed(self.cf_offset_hz.into())
    }

    fn rfagc_top(&self, hz: u64) -> RfAgcTop {
        if hz >= self.lte_start_hz {
            self.rfagc_top_lte
        } else if hz < RFAGC_TOP_FREQ_LIM_HZ {
            self.rfagc_top_low
        } else {
            self.rfagc_top_high
        }
    }

    fn rfagc_adapt_top(&self, hz: u64) -> u8 {
        if hz >= self.lte_start_hz {
            self.rfagc_adapt_top_lte
        } else {
            self.rfagc_adapt_top
        }
    }
}

/// DIGITAL_CLOCK_MODE that keeps the clock harmonics off the channel:
/// 1 selects the sigma-delta clock, 0 the 16 MHz crystal.
pub fn spur_free_clock(hz: u64) -> u8 {
    match hz {
        0..=71_999_999 => 1,
        72_000_000..=103_999_999 => 0,
        104_000_000..=120_000_000 => 1,
        _ => {
            let ratio = hz / XTAL_HZ;
            let below = hz - ratio * XTAL_HZ;
            let above = (ratio + 1) * XTAL_HZ - hz;
            u8::from((below <= above) != (ratio % 2 == 1))
        }
    }
}

impl Tuner<'_> {
    fn apply_standard(&mut self, st: &Standard, hz: u64, if_hz: u32) -> Result<()> {
        self.write_field(LP_FC, st.lpf.into())?;
        self.write_field(LP_FC_OFFSET, st.lpf_offset.into())?;
        self.write_field(IF_LEVEL, st.if_level.into())?;
        self.write_field(IF_ATSC_NOTCH, st.if_notch.into())?;
        match st.if_hpf {
            IfHpf::Disabled => self.write_field(HI_PASS, 0)?,
            hpf => {
                self.write_field(HI_PASS, 1)?;
                self.write_field(IF_HP_FC, u8::from(hpf) - 1)?;
            }
        }
        self.write_field(IF_NOTCH, st.dc_notch.into())?;
        self.write_field(AGC1_TOP, st.agc1_top)?;
        self.write_field(AGC1_DO_STEP, st.agc1_do_step)?;
        self.write_field(AGC2_TOP, st.agc2_top)?;
        self.write_field(AGC2_DO_STEP, st.agc2_do_step)?;
        self.write_field(RFAGC_TOP, st.rfagc_top(hz).into())?;
        self.write_field(IR_MIXER_TOP, st.ir_mixer_top)?;
        self.write_field(AGC5_TOP, st.agc5_top)?;
        self.write_field(PD_RFAGC_ADAPT, (!st.rfagc_adapt).into())?;
        self.write_field(RFAGC_ADAPT_TOP, st.rfagc_adapt_top(hz))?;
        self.write_field(RF_ATTEN_3DB, st.rf_atten_3db.into())?;
        self.write_field(AGC5_ANA, st.agc5_detector_hpf.into())?;
        self.write_field(AGCK_MODE, st.gsk & 0x03)?;
        self.write_field(AGCK_STEP, (st.gsk & 0x0C) >> 2)?;
        self.write_field(PSM_STOB, st.h3h5_vhf_filter6.into())?;
        self.set_if_frequency(if_hz)?;
        self.write_field(PD_UDLD, st.pd_udld.into())
    }

    /// Walks the RF filter gain down to zero and holds it there with the 3 dB
    /// attenuator in, so the LO step does not disturb a neighbouring tuner.
    fn quiet_rf_filter(&mut self) -> Result<()> {
        let mut gv = self.read_field(AGC2_GAIN_READ)?;
        self.write_field(RF_FILTER_GV, gv)?;
        self.write_field(FORCE_AGC2_GAIN, 1)?;
        while gv > 0 {
            gv -= 1;
            self.write_field(RF_FILTER_GV, gv)?;
            self.wait(10)?;
        }
        self.write_field(RF_ATTEN_3DB, 1)
    }

    fn release_rf_filter(&mut self) -> Result<()> {
        self.write_field(RF_ATTEN_3DB, 0)?;
        self.wait(50)?;
        self.write_field(FORCE_AGC2_GAIN, 0)
    }

    /// Programs the current standard and tunes to the channel at `hz`.
    pub fn set_rf(&mut self, hz: u64) -> Result<()> {
        let st = self.obj.standard.settings();
        let tuned = st.tuned_hz(hz).filter(|t| t / 1000 <= u64::from(RF_MAX_KHZ));
        let if_hz = st.output_if_hz().filter(|f| f / IF_STEP_HZ <= u32::from(IF_FREQ.max()));
        let (Some(tuned), Some(if_hz)) = (tuned, if_hz) else {
            return Err(self.fail(Error::BadParameter, format_args!("set_rf({hz})")));
        };
        self.obj.rf_hz = hz;

        self.apply_standard(st, hz, if_hz)?;

        let ramp = st.lto_sto_immune && self.read_field(MS)? == 1;
        if ramp {
            self.quiet_rf_filter()?;
        }
        self.set_rf_frequency(tuned)?;
        if ramp {
            self.release_rf_filter()?;
        }

        self.write_field(DIGITAL_CLOCK_MODE, spur_free_clock(hz))?;

        if st.agc1_freeze {
            if self.read_field(AGC1_LOOP_OFF)? == 0 {
                self.write_field(AGC1_LOOP_OFF, 1)?;
                self.write_field(FORCE_AGC1_GAIN, 1)?;
            }
            self.adapt_agc1()?;
        } else {
            self.write_field(FORCE_AGC1_GAIN, 0)?;
            self.write_field(AGC1_LOOP_OFF, 0)?;
        }
        self.report(Level::Debug, format_args!("{:?} at {hz} Hz, LO {tuned} Hz", self.obj.standard));
        Ok(())
    }
}

impl Tda182i2 {
    /// Selects the standard later [`Tda182i2::set_rf`] calls program.
    pub fn set_standard_mode(&self, unit: u32, mode: StandardMode) -> Result<()> {
        self.with(unit, |t| {
            t.obj.standard = mode;
            Ok(())
        })
    }

    pub fn standard_mode(&self, unit: u32) -> Result<StandardMode> {
        self.with(unit, |t| Ok(t.obj.standard))
    }

    /// Tunes to a channel: standard settings, RF, clock selection, AGC1.
    pub fn set_rf(&self, unit: u32, hz: u64) -> Result<()> {
        self.with(unit, |t| t.set_rf(hz))
    }

    /// Channel frequency of the last [`Tda182i2::set_rf`], 0 before the first.
    pub fn rf(&self, unit: u32) -> Result<u64> {
        self.with(unit, |t| Ok(t.obj.rf_hz))
    }

    /// IF the current standard delivers to the demodulator.
    pub fn standard_if(&self, unit: u32) -> Result<u32> {
        self.with(unit, |t| t.obj.standard.settings().output_if_hz().ok_or(Error::BadParameter))
    }

    pub fn cf_offset(&self, unit: u32) -> Result<i32> {
        self.with(unit, |t| Ok(t.obj.standard.settings().cf_offset_hz))
    }
}
