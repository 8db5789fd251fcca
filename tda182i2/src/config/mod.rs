use crate::{registers::*, standard::StandardMode, Dependencies, Result, StdMutex, Tda182i2, TARGET};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub mod board;

/// Per-board settings applied after reset.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Board {
    pub master: bool,
    pub lt_enable: bool,
    pub psm_agc1: bool,
    pub agc1_6_15db: bool,
    /// Deepest standby the board tolerates.
    pub min_power_state: PowerState,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BoardKind {
    #[default]
    Master,
    MasterDigital,
    Slave,
    SlaveDigital,
}

impl From<BoardKind> for Board {
    fn from(v: BoardKind) -> Board {
        match v {
            BoardKind::Master => board::MASTER,
            BoardKind::MasterDigital => board::MASTER_DIGITAL,
            BoardKind::Slave => board::SLAVE,
            BoardKind::SlaveDigital => board::SLAVE_DIGITAL,
        }
    }
}

/// A tuner as described in a TOML file.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub unit: u32,
    pub board: BoardKind,
    pub irq_wait: bool,
    pub use_mutex: bool,
    pub standard: Option<StandardMode>,
    pub if_hz: Option<u32>,
    pub rf_hz: Option<u64>,
    pub power_state: Option<PowerState>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            unit: 0,
            board: BoardKind::Master,
            irq_wait: true,
            use_mutex: false,
            standard: None,
            if_hz: None,
            rf_hz: None,
            power_state: None,
        }
    }
}

impl Config {
    /// Registers the unit with the driver.
    pub fn init(&self, radio: &Tda182i2, deps: Dependencies) -> Result<()> {
        let deps = match self.use_mutex {
            true => deps.with_mutex(Arc::new(StdMutex)),
            false => deps,
        };
        radio.init(self.unit, deps)?;
        radio.set_irq_wait(self.unit, self.irq_wait)?;
        if let Some(mode) = self.standard {
            radio.set_standard_mode(self.unit, mode)?;
        }
        Ok(())
    }

    /// Board bring-up, then IF, channel and power state when given. The
    /// channel is tuned with the standard's settings, which include its IF.
    pub fn apply(&self, radio: &Tda182i2) -> Result<()> {
        let board = Board::from(self.board);
        board.bring_up(radio, self.unit)?;
        if let Some(hz) = self.if_hz {
            radio.set_if_frequency(self.unit, hz)?;
        }
        if let Some(hz) = self.rf_hz {
            radio.set_rf(self.unit, hz)?;
        }
        if let Some(state) = self.power_state {
            board.set_power_state(radio, self.unit, state)?;
        }
        log::debug!(target: TARGET, "unit {:#x}: config applied", self.unit);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::emulator::Emulator;

    #[test]
    fn parse() {
        let config: Config = toml::from_str(
            r#"
            unit = 1
            board = "slave-digital"
            use_mutex = true
            standard = "AnalogI"
            if_hz = 4_000_000
            rf_hz = 474_000_000
            power_state = "StandbyXtalOn"
            "#,
        )
        .unwrap();
        assert_eq!(1, config.unit);
        assert_eq!(BoardKind::SlaveDigital, config.board);
        assert!(config.irq_wait);
        assert_eq!(Some(StandardMode::AnalogI), config.standard);
        assert_eq!(Some(PowerState::StandbyXtalOn), config.power_state);
    }

    #[test]
    fn empty_is_default() {
        assert_eq!(Config::default(), toml::from_str::<Config>("").unwrap());
    }

    #[test]
    fn unknown_key() {
        assert!(toml::from_str::<Config>("frequency = 3").is_err());
    }

    #[test]
    fn toml_round_trip() {
        let config = Config {
            board: BoardKind::MasterDigital,
            rf_hz: Some(650_000_000),
            ..Default::default()
        };
        let text = toml::to_string(&config).unwrap();
        assert_eq!(config, toml::from_str(&text).unwrap());
    }

    #[test]
    fn apply() {
        let emu = Arc::new(Emulator::new());
        let radio = Tda182i2::new();
        let config = Config {
            board: BoardKind::Slave,
            use_mutex: true,
            if_hz: Some(4_000_000),
            rf_hz: Some(474_000_000),
            power_state: Some(PowerState::Standby),
            ..Default::default()
        };
        config.init(&radio, Dependencies::new(emu.clone(), emu.clone())).unwrap();
        config.apply(&radio).unwrap();

        // DVB-T 8 MHz replaces the configured IF with its own.
        assert_eq!(4_500_000, radio.if_frequency(0).unwrap());
        assert_eq!(474_000_000, radio.rf_frequency(0).unwrap());
        assert_eq!(PowerState::StandbyXtalOn, radio.power_state(0).unwrap());
        assert_eq!(PowerState::StandbyXtalOn, radio.cached_power_state(0).unwrap());
        assert_eq!(PowerState::Standby, radio.requested_power_state(0).unwrap());
    }

    #[test]
    fn apply_standard() {
        let emu = Arc::new(Emulator::new());
        let radio = Tda182i2::new();
        let config = Config {
            board: BoardKind::Slave,
            standard: Some(StandardMode::AnalogB),
            rf_hz: Some(175_250_000),
            ..Default::default()
        };
        config.init(&radio, Dependencies::new(emu.clone(), emu.clone())).unwrap();
        assert_eq!(StandardMode::AnalogB, radio.standard_mode(0).unwrap());
        config.apply(&radio).unwrap();

        assert_eq!(177_500_000, radio.rf_frequency(0).unwrap());
        assert_eq!(175_250_000, radio.rf(0).unwrap());
        assert_eq!(4_150_000, radio.if_frequency(0).unwrap());
    }
}
