/* Register map of the TDA182I2
 *
 * The chip exposes 68 byte-wide registers at 0x00..=0x43. The driver keeps a
 * shadow copy of all of them and describes every named bit-field as an
 * (address, shift, width) triple so accessors never depend on native
 * bit-field layout.
 * */
use bitflags::bitflags;
use num_enum::{IntoPrimitive, TryFromPrimitive};
use serde::{Deserialize, Serialize};
use std::{fmt, ops::Range};
#[cfg(test)] use proptest::prelude::*;
#[cfg(test)] use proptest_derive::Arbitrary;

pub const REGISTER_COUNT: usize = 0x44;

#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<u8>", into = "Vec<u8>")]
pub struct RegisterMap(pub [u8; REGISTER_COUNT]);

impl Default for RegisterMap {
    fn default() -> Self {
        Self([0; REGISTER_COUNT])
    }
}

impl fmt::Debug for RegisterMap {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for (row, chunk) in self.0.chunks(16).enumerate() {
            write!(f, "{:02X}:", row * 16)?;
            for b in chunk {
                write!(f, " {:02X}", b)?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

impl TryFrom<Vec<u8>> for RegisterMap {
    type Error = crate::Error;
    fn try_from(item: Vec<u8>) -> Result<Self, Self::Error> {
        Ok(Self(item.try_into().map_err(|_| crate::Error::BadParameter)?))
    }
}

impl From<RegisterMap> for Vec<u8> {
    fn from(item: RegisterMap) -> Self {
        item.0.to_vec()
    }
}

impl RegisterMap {
    /// Byte range covered by a transfer, if it fits inside the register space.
    pub fn span(addr: u8, count: usize) -> Option<Range<usize>> {
        let start = usize::from(addr);
        let end = start.checked_add(count)?;
        (end <= REGISTER_COUNT).then_some(start..end)
    }

    pub fn get(&self, field: Field) -> u8 {
        field.extract(self.0[usize::from(field.addr)])
    }

    pub fn set(&mut self, field: Field, value: u8) {
        let byte = &mut self.0[usize::from(field.addr)];
        *byte = field.insert(*byte, value);
    }

    pub fn byte(&self, addr: u8) -> u8 {
        self.0[usize::from(addr)]
    }

    pub fn set_byte(&mut self, addr: u8, value: u8) {
        self.0[usize::from(addr)] = value;
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Field {
    pub name: &'static str,
    pub addr: u8,
    pub shift: u8,
    pub width: u8,
}

impl Field {
    pub const fn max(&self) -> u8 {
        ((1u16 << self.width) - 1) as u8
    }

    pub const fn mask(&self) -> u8 {
        self.max() << self.shift
    }

    pub fn extract(&self, byte: u8) -> u8 {
        (byte & self.mask()) >> self.shift
    }

    pub fn insert(&self, byte: u8, value: u8) -> u8 {
        (byte & !self.mask()) | ((value << self.shift) & self.mask())
    }

    /// Case-insensitive lookup in the field table.
    pub fn by_name(name: &str) -> Option<Field> {
        FIELDS.iter().copied().find(|f| f.name.eq_ignore_ascii_case(name))
    }
}

// Name: [Addr, Shift, Width],
macro_rules! fields {
    ($($name:ident: [$addr:literal, $shift:literal, $width:literal],)*) => {
        $(
            pub const $name: Field = Field {
                name: stringify!($name),
                addr: $addr,
                shift: $shift,
                width: $width,
            };
        )*

        pub const FIELDS: &[Field] = &[$($name,)*];
    };
}

#[rustfmt::skip]
fields! {
    MS:                    [0x00, 7, 1],
    IDENT_1:               [0x00, 0, 7],
    IDENT_2:               [0x01, 0, 8],
    MAJOR_REV:             [0x02, 4, 4],
    MINOR_REV:             [0x02, 0, 4],
    TM_D:                  [0x03, 0, 7],
    TM_ON:                 [0x04, 0, 1],
    POR:                   [0x05, 1, 1],
    LO_LOCK:               [0x05, 0, 1],
    SM:                    [0x06, 3, 1],
    SM_SYNTHE:             [0x06, 2, 1],
    SM_LT:                 [0x06, 1, 1],
    SM_XT:                 [0x06, 0, 1],
    POWER_LEVEL:           [0x07, 0, 7],
    IRQ_STATUS:            [0x08, 7, 1],
    MSM_XTALCAL_END:       [0x08, 5, 1],
    MSM_RSSI_END:          [0x08, 4, 1],
    MSM_LOCALC_END:        [0x08, 3, 1],
    MSM_RFCAL_END:         [0x08, 2, 1],
    MSM_IRCAL_END:         [0x08, 1, 1],
    MSM_RCCAL_END:         [0x08, 0, 1],
    IRQ_ENABLE:            [0x09, 7, 1],
    IRQ_MASK:              [0x09, 0, 6],
    IRQ_CLEAR:             [0x0A, 7, 1],
    IRQ_CLEAR_MASK:        [0x0A, 0, 6],
    IRQ_SET:               [0x0B, 7, 1],
    IRQ_SET_MASK:          [0x0B, 0, 6],
    LT_ENABLE:             [0x0C, 7, 1],
    AGC1_6_15DB:           [0x0C, 6, 1],
    AGC1_TOP:              [0x0C, 0, 4],
    AGC2_TOP:              [0x0D, 0, 5],
    AGCS_UP_STEP_ASSYM:    [0x0E, 6, 2],
    AGCS_UP_STEP:          [0x0E, 5, 1],
    PULSE_SHAPER_DISABLE:  [0x0E, 4, 1],
    AGCK_STEP:             [0x0E, 2, 2],
    AGCK_MODE:             [0x0E, 0, 2],
    PD_RFAGC_ADAPT:        [0x0F, 7, 1],
    RFAGC_ADAPT_TOP:       [0x0F, 5, 2],
    RFAGC_LOW_BW:          [0x0F, 4, 1],
    RF_ATTEN_3DB:          [0x0F, 3, 1],
    RFAGC_TOP:             [0x0F, 0, 3],
    PD_UDLD:               [0x10, 7, 1],
    IR_MIXER_TOP:          [0x10, 0, 4],
    AGCS_DO_STEP_ASSYM:    [0x11, 5, 2],
    AGC5_ANA:              [0x11, 4, 1],
    AGC5_TOP:              [0x11, 0, 4],
    IF_LEVEL:              [0x12, 0, 3],
    IF_HP_FC:              [0x13, 6, 2],
    IF_ATSC_NOTCH:         [0x13, 5, 1],
    LP_FC_OFFSET:          [0x13, 3, 2],
    LP_FC:                 [0x13, 0, 3],
    DIGITAL_CLOCK_MODE:    [0x14, 6, 1],
    I2C_CLOCK_MODE:        [0x14, 5, 1],
    XTALOSC_ANAREG_EN:     [0x14, 4, 1],
    XTOUT:                 [0x14, 0, 2],
    IF_FREQ:               [0x15, 0, 8],
    RF_FREQ_1:             [0x16, 0, 8],
    RF_FREQ_2:             [0x17, 0, 8],
    RF_FREQ_3:             [0x18, 0, 8],
    MSM_BYTE_1:            [0x19, 0, 8],
    XTALCAL_LAUNCH:        [0x1A, 1, 1],
    MSM_LAUNCH:            [0x1A, 0, 1],
    PSM_AGC1:              [0x1B, 7, 1],
    PSM_STOB:              [0x1B, 6, 1],
    PSMRFPOLY:             [0x1B, 5, 1],
    PSM_MIXER:             [0x1B, 4, 1],
    PSM_IFPOLY:            [0x1B, 3, 1],
    PSM_LODRIVER:          [0x1B, 1, 2],
    DCC_BYPASS:            [0x1C, 7, 1],
    DCC_SLOW:              [0x1C, 6, 1],
    DCC_PSM:               [0x1C, 5, 1],
    FMAX_LO:               [0x1D, 0, 6],
    IR_LOOP:               [0x1E, 6, 2],
    IR_TARGET:             [0x1E, 0, 3],
    IR_MIXER_LOOP_OFF:     [0x23, 7, 1],
    IR_MIXER_DO_STEP:      [0x23, 5, 2],
    HI_PASS:               [0x23, 1, 1],
    IF_NOTCH:              [0x23, 0, 1],
    AGC1_LOOP_OFF:         [0x24, 7, 1],
    AGC1_DO_STEP:          [0x24, 5, 2],
    FORCE_AGC1_GAIN:       [0x24, 4, 1],
    AGC1_GAIN:             [0x24, 0, 4],
    AGC5_LOOP_OFF:         [0x25, 7, 1],
    AGC5_DO_STEP:          [0x25, 5, 2],
    FORCE_AGC5_GAIN:       [0x25, 4, 1],
    AGC5_GAIN:             [0x25, 0, 4],
    RF_FILTER_BYPASS:      [0x2C, 7, 1],
    AGC2_LOOP_OFF:         [0x2C, 5, 1],
    FORCE_AGC2_GAIN:       [0x2C, 4, 1],
    RF_FILTER_GV:          [0x2C, 2, 2],
    RF_FILTER_BAND:        [0x2C, 0, 2],
    RF_FILTER_CAP:         [0x2D, 0, 8],
    AGC2_DO_STEP:          [0x2E, 6, 2],
    GAIN_TAPER:            [0x2E, 0, 6],
    N_CP_CURRENT:          [0x30, 0, 7],
    UP_AGC5:               [0x31, 7, 1],
    DO_AGC5:               [0x31, 6, 1],
    UP_AGC4:               [0x31, 5, 1],
    DO_AGC4:               [0x31, 4, 1],
    UP_AGC2:               [0x31, 3, 1],
    DO_AGC2:               [0x31, 2, 1],
    UP_AGC1:               [0x31, 1, 1],
    DO_AGC1:               [0x31, 0, 1],
    AGC2_GAIN_READ:        [0x32, 4, 2],
    AGC1_GAIN_READ:        [0x32, 0, 4],
    RSSI:                  [0x35, 0, 8],
    RSSI_AV:               [0x36, 5, 1],
    RSSI_CAP_RESET_EN:     [0x36, 3, 1],
    RSSI_CAP_VAL:          [0x36, 2, 1],
    RSSI_CK_SPEED:         [0x36, 1, 1],
    RSSI_DICHO_NOT:        [0x36, 0, 1],
    RFCAL_PHI2:            [0x37, 6, 2],
    DDS_POLARITY:          [0x37, 5, 1],
    RFCAL_DELTAGAIN:       [0x37, 1, 4],
    IRQ_POLARITY:          [0x37, 0, 1],
    RFCAL_LOG_1:           [0x38, 0, 8],
    RFCAL_LOG_2:           [0x39, 0, 8],
    RFCAL_LOG_3:           [0x3A, 0, 8],
    RFCAL_LOG_4:           [0x3B, 0, 8],
    RFCAL_LOG_5:           [0x3C, 0, 8],
    RFCAL_LOG_6:           [0x3D, 0, 8],
    RFCAL_LOG_7:           [0x3E, 0, 8],
    RFCAL_LOG_8:           [0x3F, 0, 8],
    RFCAL_LOG_9:           [0x40, 0, 8],
    RFCAL_LOG_10:          [0x41, 0, 8],
    RFCAL_LOG_11:          [0x42, 0, 8],
    RFCAL_LOG_12:          [0x43, 0, 8],
}

// Registers the state machine addresses as a whole.
pub const POWER_STATE_BYTE: u8 = 0x06;
pub const POWER_LEVEL_BYTE: u8 = 0x07;
pub const IRQ_STATUS_BYTE: u8 = 0x08;
pub const IRQ_ENABLE_BYTE: u8 = 0x09;
pub const IRQ_CLEAR_BYTE: u8 = 0x0A;
pub const IRQ_SET_BYTE: u8 = 0x0B;
pub const RF_FREQ_BYTE: u8 = 0x16;
pub const MSM_BYTE_1_ADDR: u8 = 0x19;
pub const MSM_BYTE_2_ADDR: u8 = 0x1A;
pub const AGC1_BYTE: u8 = 0x24;
pub const AGC_DETECTOR_BYTE: u8 = 0x31;

bitflags! {
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
    pub struct IrqStatus: u8 {
        const IRQ          = 0x80;
        const XTAL_CAL_END = 0x20;
        const RSSI_END     = 0x10;
        const LO_CALC_END  = 0x08;
        const RF_CAL_END   = 0x04;
        const IR_CAL_END   = 0x02;
        const RC_CAL_END   = 0x01;
    }
}

impl IrqStatus {
    /// Status bits the IRQ clear register and the wait loop compare against.
    pub const CAUSE: Self = Self::from_bits_truncate(0x1F);

    pub fn cause(self) -> Self {
        self & Self::CAUSE
    }
}

bitflags! {
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
    pub struct MsmTrigger: u8 {
        const RSSI_MEAS     = 0x80;
        const RF_CAL_AV     = 0x40;
        const RF_CAL        = 0x20;
        const IR_CAL_LOOP   = 0x10;
        const IR_CAL_IMAGE  = 0x08;
        const IR_CAL_WANTED = 0x04;
        const RC_CAL        = 0x02;
        const CALC_PLL      = 0x01;
    }
}

impl MsmTrigger {
    /// Full power-up calibration run by reset.
    pub const POWER_UP: Self = Self::RF_CAL
        .union(Self::IR_CAL_LOOP)
        .union(Self::IR_CAL_IMAGE)
        .union(Self::RC_CAL)
        .union(Self::CALC_PLL);
    /// Channel change.
    pub const TUNE: Self = Self::RF_CAL_AV.union(Self::CALC_PLL);
    /// On-demand RF calibration.
    pub const RF_CALIBRATION: Self = Self::RF_CAL.union(Self::CALC_PLL);
    pub const IR_CAL: Self = Self::IR_CAL_LOOP
        .union(Self::IR_CAL_IMAGE)
        .union(Self::IR_CAL_WANTED);
}

bitflags! {
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
    pub struct MsmLaunch: u8 {
        const XTAL_CAL = 0x02;
        const MSM      = 0x01;
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, IntoPrimitive, TryFromPrimitive, Serialize, Deserialize)]
#[cfg_attr(test, derive(Arbitrary))]
#[repr(u8)]
#[rustfmt::skip]
pub enum PowerState {
    Normal                = 0,
    StandbyLnaXtalSynthOn = 1,
    StandbyLnaXtalOn      = 2,
    StandbyXtalOn         = 3,
    Standby               = 4,
    /// Not a state the chip can be put in; reported for unrecognized standby bits.
    Max                   = 5,
}

impl Default for PowerState {
    fn default() -> Self {
        PowerState::StandbyXtalOn
    }
}

/// SM, SM_Synthe, SM_LT and SM_XT as they sit in the power state byte.
pub const STANDBY_BITS: u8 = 0x0F;

impl PowerState {
    #[rustfmt::skip]
    pub fn standby_bits(self) -> Option<u8> {
        match self {
            PowerState::Normal                => Some(0b0000),
            PowerState::StandbyLnaXtalSynthOn => Some(0b1000),
            PowerState::StandbyLnaXtalOn      => Some(0b1100),
            PowerState::StandbyXtalOn         => Some(0b1110),
            PowerState::Standby               => Some(0b1111),
            PowerState::Max                   => None,
        }
    }

    #[rustfmt::skip]
    pub fn from_standby_bits(bits: u8) -> Self {
        match bits & STANDBY_BITS {
            0b0000 => PowerState::Normal,
            0b1000 => PowerState::StandbyLnaXtalSynthOn,
            0b1100 => PowerState::StandbyLnaXtalOn,
            0b1110 => PowerState::StandbyXtalOn,
            0b1111 => PowerState::Standby,
            _      => PowerState::Max,
        }
    }

    pub fn is_standby(self) -> bool {
        !matches!(self, PowerState::Normal)
    }

    /// `self`, raised to `deepest` when it is a deeper standby.
    pub fn limit(self, deepest: PowerState) -> PowerState {
        if u8::from(self) > u8::from(deepest) {
            deepest
        } else {
            self
        }
    }
}

/// State of the low pass filter gain loop (AGC5).
#[derive(Clone, Copy, Debug, PartialEq, Eq, IntoPrimitive, TryFromPrimitive, Serialize, Deserialize)]
#[cfg_attr(test, derive(Arbitrary))]
#[repr(u8)]
pub enum LpfGainMode {
    Unknown = 0,
    Frozen = 1,
    Free = 2,
}

#[cfg(test)]
proptest! {
    #[test]
    fn field_insert_extract(idx in 0..FIELDS.len(), value in any::<u8>(), byte in any::<u8>()) {
        let f = FIELDS[idx];
        let b = f.insert(byte, value);
        assert_eq!(value & f.max(), f.extract(b));
        assert_eq!(byte & !f.mask(), b & !f.mask());
    }

    #[test]
    fn power_state_bits_inverse(state: PowerState) {
        match state.standby_bits() {
            Some(bits) => assert_eq!(state, PowerState::from_standby_bits(bits)),
            None => assert_eq!(state, PowerState::Max),
        }
    }

    #[test]
    fn power_state_unknown_bits(bits in 0..16u8) {
        let state = PowerState::from_standby_bits(bits);
        if ![0b0000, 0b1000, 0b1100, 0b1110, 0b1111].contains(&bits) {
            assert_eq!(PowerState::Max, state);
        }
    }

    #[test]
    fn span_bounds(addr in any::<u8>(), count in 0..80usize) {
        let fits = usize::from(addr) + count <= REGISTER_COUNT;
        assert_eq!(fits, RegisterMap::span(addr, count).is_some());
    }
}

#[test]
fn fields_fit_register_space() {
    for f in FIELDS {
        assert!(usize::from(f.addr) < REGISTER_COUNT, "{}", f.name);
        assert!(f.shift + f.width <= 8, "{}", f.name);
        assert!(f.width > 0, "{}", f.name);
    }
}

#[test]
fn fields_do_not_overlap() {
    for (i, a) in FIELDS.iter().enumerate() {
        for b in &FIELDS[i + 1..] {
            if a.addr == b.addr {
                assert_eq!(0, a.mask() & b.mask(), "{} overlaps {}", a.name, b.name);
            }
        }
    }
}

#[test]
fn msm_trigger_values() {
    assert_eq!(0x3B, MsmTrigger::POWER_UP.bits());
    assert_eq!(0x41, MsmTrigger::TUNE.bits());
    assert_eq!(0x21, MsmTrigger::RF_CALIBRATION.bits());
}

#[test]
fn field_by_name() {
    assert_eq!(Some(AGC1_GAIN), Field::by_name("agc1_gain"));
    assert_eq!(None, Field::by_name("nope"));
}

#[test]
fn register_map_from_vec() {
    assert!(RegisterMap::try_from(vec![0; REGISTER_COUNT]).is_ok());
    assert!(RegisterMap::try_from(vec![0; 3]).is_err());
}
