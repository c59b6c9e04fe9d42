//! Fixed slot layouts for the state and diagnostic vectors.
//!
//! Slot order is part of the evaluator contract and must never change.

use crate::error::{ModelError, ModelResult};

/// Number of state variables.
pub const STATE_LEN: usize = 23;

/// Number of diagnostic quantities produced per evaluation.
pub const DIAGNOSTIC_LEN: usize = 19;

/// Semantic slots of the state vector.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StateSlot {
    /// Membrane potential (V)
    Vm,
    /// Sarcoplasmic-reticulum calcium (mM)
    CaSr,
    /// Intracellular calcium (mM)
    Cai,
    G,
    D,
    F1,
    F2,
    FCa,
    Xr1,
    Xr2,
    Xs,
    H,
    J,
    M,
    Xf,
    Q,
    R,
    /// Intracellular sodium (mM)
    Nai,
    ML,
    HL,
    RyRa,
    RyRo,
    RyRc,
}

impl StateSlot {
    pub const ALL: [StateSlot; STATE_LEN] = [
        StateSlot::Vm,
        StateSlot::CaSr,
        StateSlot::Cai,
        StateSlot::G,
        StateSlot::D,
        StateSlot::F1,
        StateSlot::F2,
        StateSlot::FCa,
        StateSlot::Xr1,
        StateSlot::Xr2,
        StateSlot::Xs,
        StateSlot::H,
        StateSlot::J,
        StateSlot::M,
        StateSlot::Xf,
        StateSlot::Q,
        StateSlot::R,
        StateSlot::Nai,
        StateSlot::ML,
        StateSlot::HL,
        StateSlot::RyRa,
        StateSlot::RyRo,
        StateSlot::RyRc,
    ];

    pub const NAMES: [&'static str; STATE_LEN] = [
        "Vm", "Ca_SR", "Cai", "g", "d", "f1", "f2", "fCa", "Xr1", "Xr2", "Xs", "h", "j", "m",
        "Xf", "q", "r", "Nai", "m_L", "h_L", "RyRa", "RyRo", "RyRc",
    ];

    #[inline]
    pub const fn index(self) -> usize {
        self as usize
    }

    pub fn name(self) -> &'static str {
        Self::NAMES[self.index()]
    }

    pub fn from_name(name: &str) -> ModelResult<Self> {
        Self::NAMES
            .iter()
            .position(|n| *n == name)
            .map(|i| Self::ALL[i])
            .ok_or_else(|| ModelError::UnknownSlot {
                name: name.to_string(),
            })
    }
}

/// Semantic slots of the diagnostic vector.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DiagnosticSlot {
    INa,
    If,
    ICaL,
    Ito,
    IKs,
    IKr,
    IK1,
    INaCa,
    INaK,
    IpCa,
    IbNa,
    IbCa,
    /// SR calcium release flux
    Irel,
    /// SR calcium uptake flux
    Iup,
    /// SR calcium leak flux
    Ileak,
    Istim,
    /// Potassium reversal potential (V)
    EK,
    /// Sodium reversal potential (V)
    ENa,
    INaL,
}

impl DiagnosticSlot {
    pub const ALL: [DiagnosticSlot; DIAGNOSTIC_LEN] = [
        DiagnosticSlot::INa,
        DiagnosticSlot::If,
        DiagnosticSlot::ICaL,
        DiagnosticSlot::Ito,
        DiagnosticSlot::IKs,
        DiagnosticSlot::IKr,
        DiagnosticSlot::IK1,
        DiagnosticSlot::INaCa,
        DiagnosticSlot::INaK,
        DiagnosticSlot::IpCa,
        DiagnosticSlot::IbNa,
        DiagnosticSlot::IbCa,
        DiagnosticSlot::Irel,
        DiagnosticSlot::Iup,
        DiagnosticSlot::Ileak,
        DiagnosticSlot::Istim,
        DiagnosticSlot::EK,
        DiagnosticSlot::ENa,
        DiagnosticSlot::INaL,
    ];

    pub const NAMES: [&'static str; DIAGNOSTIC_LEN] = [
        "i_Na", "i_f", "i_CaL", "i_to", "i_Ks", "i_Kr", "i_K1", "i_NaCa", "i_NaK", "i_pCa",
        "i_bNa", "i_bCa", "i_rel", "i_up", "i_leak", "i_stim", "E_K", "E_Na", "i_NaL",
    ];

    #[inline]
    pub const fn index(self) -> usize {
        self as usize
    }

    pub fn name(self) -> &'static str {
        Self::NAMES[self.index()]
    }

    pub fn from_name(name: &str) -> ModelResult<Self> {
        Self::NAMES
            .iter()
            .position(|n| *n == name)
            .map(|i| Self::ALL[i])
            .ok_or_else(|| ModelError::UnknownSlot {
                name: name.to_string(),
            })
    }

    /// Reversal potentials are voltages, not currents.
    pub fn is_reversal_potential(self) -> bool {
        matches!(self, DiagnosticSlot::EK | DiagnosticSlot::ENa)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_slots_index_in_declaration_order() {
        for (i, slot) in StateSlot::ALL.iter().enumerate() {
            assert_eq!(slot.index(), i);
        }
        assert_eq!(StateSlot::Vm.index(), 0);
        assert_eq!(StateSlot::Nai.index(), 17);
        assert_eq!(StateSlot::RyRc.index(), 22);
    }

    #[test]
    fn diagnostic_slots_index_in_declaration_order() {
        for (i, slot) in DiagnosticSlot::ALL.iter().enumerate() {
            assert_eq!(slot.index(), i);
        }
        assert_eq!(DiagnosticSlot::EK.index(), 16);
        assert_eq!(DiagnosticSlot::ENa.index(), 17);
        assert_eq!(DiagnosticSlot::INaL.index(), 18);
    }

    #[test]
    fn names_round_trip() {
        for slot in DiagnosticSlot::ALL {
            assert_eq!(DiagnosticSlot::from_name(slot.name()).unwrap(), slot);
        }
        assert_eq!(StateSlot::from_name("Cai").unwrap(), StateSlot::Cai);
        assert!(StateSlot::from_name("Ca_i").is_err());
    }

    #[test]
    fn exactly_two_reversal_potentials() {
        let count = DiagnosticSlot::ALL
            .iter()
            .filter(|s| s.is_reversal_potential())
            .count();
        assert_eq!(count, 2);
    }
}
