use crate::{registers::*, transport::Tuner, Result, Tda182i2};
use log::Level;

/// Detector samples taken per adaptation step, 1 ms apart.
pub const AGC1_SAMPLES: usize = 40;
pub const AGC1_GAIN_MAX: u8 = 9;

// Vote weights: an Up sample counts +1 (-4 if absent), a Do sample +14 (-1).
const UP_THRESHOLD: i16 = 15;
const DO_THRESHOLD: i16 = 10;

impl Tuner<'_> {
    /// Nudges AGC1_Gain one step per round toward what the detectors ask for.
    /// Returns the number of gain changes made.
    pub fn adapt_agc1(&mut self) -> Result<usize> {
        let (min_gain, max_steps) = match self.map.get(AGC1_6_15DB) {
            0 => (0, 10),
            _ => (6, 4),
        };

        let mut changes = 0;
        for _ in 0..max_steps {
            let mut total_up: i16 = 0;
            let mut total_do: i16 = 0;
            for _ in 0..AGC1_SAMPLES {
                self.read(AGC_DETECTOR_BYTE, 1)?;
                total_up += if self.map.get(UP_AGC1) == 1 { 1 } else { -4 };
                total_do += if self.map.get(DO_AGC1) == 1 { 14 } else { -1 };
                self.wait(1)?;
            }

            let gain = self.map.get(AGC1_GAIN);
            if total_up >= UP_THRESHOLD && gain < AGC1_GAIN_MAX {
                self.write_field(AGC1_GAIN, gain + 1)?;
            } else if total_do >= DO_THRESHOLD && gain > min_gain {
                self.write_field(AGC1_GAIN, gain - 1)?;
            } else {
                break;
            }
            changes += 1;
        }

        self.report(Level::Debug, format_args!("agc1 gain {} after {changes} changes", self.map.get(AGC1_GAIN)));
        Ok(changes)
    }
}

impl Tda182i2 {
    pub fn adapt_agc1(&self, unit: u32) -> Result<usize> {
        self.with(unit, |t| t.adapt_agc1())
    }
}
