//! Paci2018 model of a human induced-pluripotent-stem-cell-derived
//! ventricular-like cardiomyocyte.
//!
//! Units follow the published model: volts, seconds, millimolar, and currents
//! normalized to membrane capacitance (A/F).

use crate::drug::DrugBlock;
use crate::error::{ModelError, ModelResult};
use crate::layout::{DIAGNOSTIC_LEN, DiagnosticSlot, STATE_LEN, StateSlot};
use crate::stimulus::Stimulus;
use crate::traits::{CellModel, Evaluation};

// Physical constants
const F: f64 = 96485.3415; // C/mol
const R: f64 = 8.314472; // J/(mol K)
const T: f64 = 310.0; // K
const RT_F: f64 = R * T / F;
const F_RT: f64 = F / (R * T);

// Cell geometry
const V_SR: f64 = 583.73; // um^3
const V_C: f64 = 8800.0; // um^3
const CM: f64 = 9.87109e-11; // F

// Extracellular and fixed intracellular concentrations (mM)
const NAO: f64 = 151.0;
const KO: f64 = 5.4;
const CAO: f64 = 1.8;
const KI: f64 = 150.0;

// Calcium handling, fitted by the model authors
const VMAX_UP: f64 = 0.5113;
const G_IREL_MAX: f64 = 62.5434;
const RYR_A1: f64 = 0.05354;
const RYR_A2: f64 = 0.0488;
const RYR_A_HALF: f64 = 0.02427;
const RYR_O_HALF: f64 = 0.01042;
const RYR_C_HALF: f64 = 0.00144;
const K_NACA: f64 = 3917.0463;
const P_NAK: f64 = 2.6351;
const K_UP: f64 = 3.1928e-4;
const V_LEAK: f64 = 4.7279e-4;
const ALPHA_NACA: f64 = 2.5371;

const G_TO: f64 = 29.9038;
const E_F: f64 = -0.017;
const PK_NA: f64 = 0.03;

/// Named initial states.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StatePreset {
    /// Limit-cycle state of the spontaneously beating cell.
    Paci2018,
    /// Coarse resting state.
    Resting,
}

impl StatePreset {
    pub fn values(self) -> [f64; STATE_LEN] {
        match self {
            StatePreset::Paci2018 => [
                -0.0749228904740065,
                0.0936532528714175,
                3.79675694306440e-05,
                0.0,
                8.25220533963093e-05,
                0.741143500777858,
                0.999983958619179,
                0.997742015033076,
                0.266113517200784,
                0.434907203275640,
                0.0314334976383401,
                0.745356534740988,
                0.0760523580322096,
                0.0995891726023512,
                0.0249102482276486,
                0.841714924246004,
                0.00558005376429710,
                8.64821066193476,
                0.00225383437957339,
                0.0811507312565017,
                0.0387066722172937,
                0.0260449185736275,
                0.0785849084330126,
            ],
            StatePreset::Resting => [
                -0.070, 0.32, 0.0002, 0.0, 0.0, 1.0, 1.0, 1.0, 0.0, 1.0, 0.0, 0.75, 0.75, 0.0, 0.1,
                1.0, 0.0, 9.2, 0.0, 0.75, 0.3, 0.9, 0.1,
            ],
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "paci2018" => Some(StatePreset::Paci2018),
            "resting" => Some(StatePreset::Resting),
            _ => None,
        }
    }
}

/// Maximal conductances of the tunable currents.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Conductances {
    pub g_na: f64,
    pub g_ca_l: f64,
    pub g_f: f64,
    pub g_ks: f64,
    pub g_kr: f64,
    pub g_k1: f64,
    pub g_p_ca: f64,
    pub g_b_na: f64,
    pub g_b_ca: f64,
    pub g_na_l: f64,
}

impl Default for Conductances {
    fn default() -> Self {
        Self {
            g_na: 3671.2302,
            g_ca_l: 8.635702e-5,
            g_f: 30.10312,
            g_ks: 2.041,
            g_kr: 29.8667,
            g_k1: 28.1492,
            g_p_ca: 0.4125,
            g_b_na: 0.95,
            g_b_ca: 0.727272,
            g_na_l: 17.25,
        }
    }
}

impl Conductances {
    pub const NAMES: [&'static str; 10] = [
        "g_na", "g_ca_l", "g_f", "g_ks", "g_kr", "g_k1", "g_p_ca", "g_b_na", "g_b_ca", "g_na_l",
    ];

    fn slot_mut(&mut self, name: &str) -> Option<&mut f64> {
        match name {
            "g_na" => Some(&mut self.g_na),
            "g_ca_l" => Some(&mut self.g_ca_l),
            "g_f" => Some(&mut self.g_f),
            "g_ks" => Some(&mut self.g_ks),
            "g_kr" => Some(&mut self.g_kr),
            "g_k1" => Some(&mut self.g_k1),
            "g_p_ca" => Some(&mut self.g_p_ca),
            "g_b_na" => Some(&mut self.g_b_na),
            "g_b_ca" => Some(&mut self.g_b_ca),
            "g_na_l" => Some(&mut self.g_na_l),
            _ => None,
        }
    }

    /// Override one conductance by name.
    pub fn set(&mut self, name: &str, value: f64) -> ModelResult<()> {
        if !value.is_finite() || value < 0.0 {
            return Err(ModelError::InvalidParameter {
                name: name.to_string(),
                value,
                reason: "conductance must be finite and non-negative",
            });
        }
        let slot = self
            .slot_mut(name)
            .ok_or_else(|| ModelError::UnknownParameter {
                name: name.to_string(),
            })?;
        *slot = value;
        Ok(())
    }

    /// Defaults with the given overrides applied in order.
    pub fn with_overrides<'a, I>(overrides: I) -> ModelResult<Self>
    where
        I: IntoIterator<Item = (&'a str, f64)>,
    {
        let mut g = Self::default();
        for (name, value) in overrides {
            g.set(name, value)?;
        }
        Ok(g)
    }
}

/// The Paci2018 evaluator.
#[derive(Clone, Debug, Default)]
pub struct Paci2018 {
    pub conductances: Conductances,
    pub stimulus: Option<Stimulus>,
}

impl Paci2018 {
    pub fn new(conductances: Conductances, stimulus: Option<Stimulus>) -> Self {
        Self {
            conductances,
            stimulus,
        }
    }
}

#[inline]
fn exp(x: f64) -> f64 {
    x.exp()
}

impl CellModel for Paci2018 {
    fn name(&self) -> &str {
        "Paci2018"
    }

    fn state_len(&self) -> usize {
        STATE_LEN
    }

    fn diagnostic_len(&self) -> usize {
        DIAGNOSTIC_LEN
    }

    fn state_names(&self) -> &[&'static str] {
        &StateSlot::NAMES
    }

    fn diagnostic_names(&self) -> &[&'static str] {
        &DiagnosticSlot::NAMES
    }

    fn evaluate(&self, t: f64, y: &[f64], block: &DrugBlock) -> ModelResult<Evaluation> {
        if y.len() != STATE_LEN {
            return Err(ModelError::StateLength {
                expected: STATE_LEN,
                actual: y.len(),
            });
        }
        let g = &self.conductances;
        let scales = block.effective_scales(t);

        let v = y[StateSlot::Vm.index()];
        let v_mv = v * 1000.0;
        let ca_sr = y[StateSlot::CaSr.index()];
        let cai = y[StateSlot::Cai.index()];
        let nai = y[StateSlot::Nai.index()];

        let mut dydt = vec![0.0; STATE_LEN];

        // Reversal potentials
        let e_na = RT_F * (NAO / nai).ln();
        let e_ca = 0.5 * RT_F * (CAO / cai).ln();
        let e_k = RT_F * (KO / KI).ln();
        let e_ks = RT_F * ((KO + PK_NA * NAO) / (KI + PK_NA * nai)).ln();

        // I_Na
        let m = y[StateSlot::M.index()];
        let h = y[StateSlot::H.index()];
        let j = y[StateSlot::J.index()];
        let i_na = scales.i_na * (g.g_na * m.powi(3) * h * j * (v - e_na));

        let h_inf = 1.0 / (1.0 + exp((v_mv + 72.1) / 5.7)).sqrt();
        let alpha_h = 0.057 * exp(-(v_mv + 80.0) / 6.8);
        let beta_h = 2.7 * exp(0.079 * v_mv) + 3.1e5 * exp(0.3485 * v_mv);
        let tau_h = if v < -0.0385 {
            1.5 / ((alpha_h + beta_h) * 1000.0)
        } else {
            1.5 * 1.6947 / 1000.0
        };
        dydt[StateSlot::H.index()] = (h_inf - h) / tau_h;

        let j_inf = h_inf;
        let (alpha_j, beta_j) = if v < -0.04 {
            (
                (-25428.0 * exp(0.2444 * v_mv) - 6.948e-6 * exp(-0.04391 * v_mv))
                    * (v_mv + 37.78)
                    / (1.0 + exp(0.311 * (v_mv + 79.23))),
                0.02424 * exp(-0.01052 * v_mv) / (1.0 + exp(-0.1378 * (v_mv + 40.14))),
            )
        } else {
            (
                0.0,
                0.6 * exp(0.057 * v_mv) / (1.0 + exp(-0.1 * (v_mv + 32.0))),
            )
        };
        let tau_j = 7.0 / ((alpha_j + beta_j) * 1000.0);
        dydt[StateSlot::J.index()] = (j_inf - j) / tau_j;

        let m_inf = 1.0 / (1.0 + exp((-v_mv - 34.1) / 5.9)).cbrt();
        let alpha_m = 1.0 / (1.0 + exp((-v_mv - 60.0) / 5.0));
        let beta_m =
            0.1 / (1.0 + exp((v_mv + 35.0) / 5.0)) + 0.1 / (1.0 + exp((v_mv - 50.0) / 200.0));
        let tau_m = alpha_m * beta_m / 1000.0;
        dydt[StateSlot::M.index()] = (m_inf - m) / tau_m;

        // I_NaL
        let m_l = y[StateSlot::ML.index()];
        let h_l = y[StateSlot::HL.index()];
        let i_na_l = g.g_na_l * m_l.powi(3) * h_l * (v - e_na);

        let m_l_inf = 1.0 / (1.0 + exp(-(v_mv + 42.85) / 5.264));
        let tau_m_l = alpha_m * beta_m / 1000.0;
        dydt[StateSlot::ML.index()] = (m_l_inf - m_l) / tau_m_l;

        let h_l_inf = 1.0 / (1.0 + exp((v_mv + 87.61) / 7.488));
        let tau_h_l = 0.2;
        dydt[StateSlot::HL.index()] = (h_l_inf - h_l) / tau_h_l;

        // I_f
        let xf = y[StateSlot::Xf.index()];
        let i_f = g.g_f * xf * (v - E_F);
        let i_f_na = 0.42 * g.g_f * xf * (v - e_na);

        let xf_inf = 1.0 / (1.0 + exp((v_mv + 77.85) / 5.0));
        let tau_xf = 1900.0 / (1.0 + exp((v_mv + 15.0) / 10.0)) / 1000.0;
        dydt[StateSlot::Xf.index()] = (xf_inf - xf) / tau_xf;

        // I_CaL
        let d = y[StateSlot::D.index()];
        let f1 = y[StateSlot::F1.index()];
        let f2 = y[StateSlot::F2.index()];
        let f_ca = y[StateSlot::FCa.index()];
        let e2v = exp(2.0 * v * F_RT);
        let i_ca_l = scales.i_ca_l
            * (g.g_ca_l * 4.0 * v * F * F_RT * (cai * e2v - 0.341 * CAO) / (e2v - 1.0)
                * d
                * f1
                * f2
                * f_ca);

        let d_inf = 1.0 / (1.0 + exp(-(v_mv + 9.1) / 7.0));
        let alpha_d = 0.25 + 1.4 / (1.0 + exp((-v_mv - 35.0) / 13.0));
        let beta_d = 1.4 / (1.0 + exp((v_mv + 5.0) / 5.0));
        let gamma_d = 1.0 / (1.0 + exp((-v_mv + 50.0) / 20.0));
        let tau_d = (alpha_d * beta_d + gamma_d) / 1000.0;
        dydt[StateSlot::D.index()] = (d_inf - d) / tau_d;

        let f1_inf = 1.0 / (1.0 + exp((v_mv + 26.0) / 3.0));
        let const_f1 = if f1_inf - f1 > 0.0 {
            1.0 + 1433.0 * (cai - 50.0e-6)
        } else {
            1.0
        };
        let tau_f1 = (20.0
            + 1102.5 * exp(-((v_mv + 27.0).powi(2) / 15.0).powi(2))
            + 200.0 / (1.0 + exp((13.0 - v_mv) / 10.0))
            + 180.0 / (1.0 + exp((30.0 + v_mv) / 10.0)))
            * const_f1
            / 1000.0;
        dydt[StateSlot::F1.index()] = (f1_inf - f1) / tau_f1;

        let f2_inf = 0.33 + 0.67 / (1.0 + exp((v_mv + 32.0) / 4.0));
        let tau_f2 = (600.0 * exp(-(v_mv + 25.0).powi(2) / 170.0)
            + 31.0 / (1.0 + exp((25.0 - v_mv) / 10.0))
            + 16.0 / (1.0 + exp((30.0 + v_mv) / 10.0)))
            / 1000.0;
        dydt[StateSlot::F2.index()] = (f2_inf - f2) / tau_f2;

        let alpha_f_ca = 1.0 / (1.0 + (cai / 0.0006).powi(8));
        let beta_f_ca = 0.1 / (1.0 + exp((cai - 0.0009) / 0.0001));
        let gamma_f_ca = 0.3 / (1.0 + exp((cai - 0.00075) / 0.0008));
        let f_ca_inf = (alpha_f_ca + beta_f_ca + gamma_f_ca) / 1.3156;
        // fCa may only relax upward while the membrane is hyperpolarized.
        let const_f_ca = if v > -0.06 && f_ca_inf > f_ca { 0.0 } else { 1.0 };
        let tau_f_ca = 0.002;
        dydt[StateSlot::FCa.index()] = const_f_ca * (f_ca_inf - f_ca) / tau_f_ca;

        // I_to
        let q = y[StateSlot::Q.index()];
        let r = y[StateSlot::R.index()];
        let i_to = G_TO * (v - e_k) * q * r;

        let q_inf = 1.0 / (1.0 + exp((v_mv + 53.0) / 13.0));
        let tau_q = (6.06
            + 39.102
                / (0.57 * exp(-0.08 * (v_mv + 44.0)) + 0.065 * exp(0.1 * (v_mv + 45.93))))
            / 1000.0;
        dydt[StateSlot::Q.index()] = (q_inf - q) / tau_q;

        let r_inf = 1.0 / (1.0 + exp(-(v_mv - 22.3) / 18.75));
        let tau_r = (2.75352
            + 14.40516
                / (1.037 * exp(0.09 * (v_mv + 30.61)) + 0.369 * exp(-0.12 * (v_mv + 23.84))))
            / 1000.0;
        dydt[StateSlot::R.index()] = (r_inf - r) / tau_r;

        // I_Ks
        let xs = y[StateSlot::Xs.index()];
        let i_ks = scales.i_ks
            * (g.g_ks * (v - e_ks) * xs.powi(2) * (1.0 + 0.6 / (1.0 + (3.8e-5 / cai).powf(1.4))));

        let xs_inf = 1.0 / (1.0 + exp((-v_mv - 20.0) / 16.0));
        let alpha_xs = 1100.0 / (1.0 + exp((-10.0 - v_mv) / 6.0)).sqrt();
        let beta_xs = 1.0 / (1.0 + exp((-60.0 + v_mv) / 20.0));
        let tau_xs = alpha_xs * beta_xs / 1000.0;
        dydt[StateSlot::Xs.index()] = (xs_inf - xs) / tau_xs;

        // I_Kr
        let xr1 = y[StateSlot::Xr1.index()];
        let xr2 = y[StateSlot::Xr2.index()];
        let i_kr = scales.i_kr * (g.g_kr * (v - e_k) * xr1 * xr2 * (KO / 5.4).sqrt());

        let l0 = 0.025;
        let q_xr1 = 2.3;
        let v_half = 1000.0
            * (-RT_F / q_xr1
                * ((1.0 + CAO / 2.6).powi(4) / (l0 * (1.0 + CAO / 0.58).powi(4))).ln()
                - 0.019);
        let xr1_inf = 1.0 / (1.0 + exp((v_half - v_mv) / 4.9));
        let alpha_xr1 = 450.0 / (1.0 + exp((-45.0 - v_mv) / 10.0));
        let beta_xr1 = 6.0 / (1.0 + exp((30.0 + v_mv) / 11.5));
        let tau_xr1 = alpha_xr1 * beta_xr1 / 1000.0;
        dydt[StateSlot::Xr1.index()] = (xr1_inf - xr1) / tau_xr1;

        let xr2_inf = 1.0 / (1.0 + exp((v_mv + 88.0) / 50.0));
        let alpha_xr2 = 3.0 / (1.0 + exp((-60.0 - v_mv) / 20.0));
        let beta_xr2 = 1.12 / (1.0 + exp((-60.0 + v_mv) / 20.0));
        let tau_xr2 = alpha_xr2 * beta_xr2 / 1000.0;
        dydt[StateSlot::Xr2.index()] = (xr2_inf - xr2) / tau_xr2;

        // I_K1
        let dv_k = v_mv - e_k * 1000.0;
        let alpha_k1 = 3.91 / (1.0 + exp(0.5942 * (dv_k - 200.0)));
        let beta_k1 = (-1.509 * exp(0.0002 * (dv_k + 100.0)) + exp(0.5886 * (dv_k - 10.0)))
            / (1.0 + exp(0.4547 * dv_k));
        let xk1_inf = alpha_k1 / (alpha_k1 + beta_k1);
        let i_k1 = g.g_k1 * xk1_inf * (v - e_k) * (KO / 5.4).sqrt();

        // I_NaCa
        let km_ca = 1.38;
        let km_nai: f64 = 87.5;
        let ksat = 0.1;
        let gamma = 0.35;
        let e_fwd = exp(gamma * v * F_RT);
        let e_rev = exp((gamma - 1.0) * v * F_RT);
        let i_na_ca = K_NACA * (e_fwd * nai.powi(3) * CAO - e_rev * NAO.powi(3) * cai * ALPHA_NACA)
            / ((km_nai.powi(3) + NAO.powi(3)) * (km_ca + CAO) * (1.0 + ksat * e_rev));

        // I_NaK
        let km_k = 1.0;
        let km_na = 40.0;
        let i_na_k = P_NAK * KO / (KO + km_k) * nai / (nai + km_na)
            / (1.0 + 0.1245 * exp(-0.1 * v * F_RT) + 0.0353 * exp(-v * F_RT));

        // I_pCa
        let kp_ca = 0.0005;
        let i_p_ca = g.g_p_ca * cai / (cai + kp_ca);

        // Background currents
        let i_b_na = g.g_b_na * (v - e_na);
        let i_b_ca = g.g_b_ca * (v - e_ca);

        // Sarcoplasmic reticulum
        let i_up = VMAX_UP / (1.0 + K_UP.powi(2) / cai.powi(2));
        let i_leak = (ca_sr - cai) * V_LEAK;
        dydt[StateSlot::G.index()] = 0.0;

        // RyR
        let ryr_a = y[StateSlot::RyRa.index()];
        let ryr_o = y[StateSlot::RyRo.index()];
        let ryr_c = y[StateSlot::RyRc.index()];
        let ryr_sr_cass = 1.0 - 1.0 / (1.0 + exp((ca_sr - 0.3) / 0.1));
        let i_rel = G_IREL_MAX * ryr_sr_cass * ryr_o * ryr_c * (ca_sr - cai);

        let ryr_a_inf = RYR_A1 - RYR_A2 / (1.0 + exp((1000.0 * cai - RYR_A_HALF) / 0.0082));
        let tau_ryr_adapt = 1.0;
        dydt[StateSlot::RyRa.index()] = (ryr_a_inf - ryr_a) / tau_ryr_adapt;

        let ryr_o_inf =
            1.0 - 1.0 / (1.0 + exp((1000.0 * cai - (ryr_a + RYR_O_HALF)) / 0.003));
        let tau_ryr_act = if ryr_o_inf >= ryr_o {
            18.75e-3
        } else {
            0.1 * 18.75e-3
        };
        dydt[StateSlot::RyRo.index()] = (ryr_o_inf - ryr_o) / tau_ryr_act;

        let ryr_c_inf = 1.0 / (1.0 + exp((1000.0 * cai - (ryr_a + RYR_C_HALF)) / 0.001));
        let tau_ryr_inact = if ryr_c_inf >= ryr_c {
            2.0 * 87.5e-3
        } else {
            87.5e-3
        };
        dydt[StateSlot::RyRc.index()] = (ryr_c_inf - ryr_c) / tau_ryr_inact;

        // Ca2+ buffering
        let buf_c = 0.25;
        let buf_sr = 10.0;
        let kbuf_c = 0.001;
        let kbuf_sr = 0.3;
        let cai_bufc = 1.0 / (1.0 + buf_c * kbuf_c / (cai + kbuf_c).powi(2));
        let ca_sr_bufsr = 1.0 / (1.0 + buf_sr * kbuf_sr / (ca_sr + kbuf_sr).powi(2));

        // Ionic concentrations
        dydt[StateSlot::Nai.index()] = -CM
            * (i_na + i_na_l + i_b_na + 3.0 * i_na_k + 3.0 * i_na_ca + i_f_na)
            / (F * V_C * 1.0e-18);
        dydt[StateSlot::Cai.index()] = cai_bufc
            * (i_leak - i_up + i_rel
                - (i_ca_l + i_b_ca + i_p_ca - 2.0 * i_na_ca) * CM / (2.0 * V_C * F * 1.0e-18));
        dydt[StateSlot::CaSr.index()] = ca_sr_bufsr * V_C / V_SR * (i_up - (i_rel + i_leak));

        // Membrane potential
        let i_stim = self.stimulus.map_or(0.0, |s| s.current_at(t));
        dydt[StateSlot::Vm.index()] = -(i_k1
            + i_to
            + i_kr
            + i_ks
            + i_ca_l
            + i_na_k
            + i_na
            + i_na_l
            + i_na_ca
            + i_p_ca
            + i_f
            + i_b_na
            + i_b_ca)
            + i_stim;

        let mut diagnostics = vec![0.0; DIAGNOSTIC_LEN];
        for (slot, value) in [
            (DiagnosticSlot::INa, i_na),
            (DiagnosticSlot::If, i_f),
            (DiagnosticSlot::ICaL, i_ca_l),
            (DiagnosticSlot::Ito, i_to),
            (DiagnosticSlot::IKs, i_ks),
            (DiagnosticSlot::IKr, i_kr),
            (DiagnosticSlot::IK1, i_k1),
            (DiagnosticSlot::INaCa, i_na_ca),
            (DiagnosticSlot::INaK, i_na_k),
            (DiagnosticSlot::IpCa, i_p_ca),
            (DiagnosticSlot::IbNa, i_b_na),
            (DiagnosticSlot::IbCa, i_b_ca),
            (DiagnosticSlot::Irel, i_rel),
            (DiagnosticSlot::Iup, i_up),
            (DiagnosticSlot::Ileak, i_leak),
            (DiagnosticSlot::Istim, i_stim),
            (DiagnosticSlot::EK, e_k),
            (DiagnosticSlot::ENa, e_na),
            (DiagnosticSlot::INaL, i_na_l),
        ] {
            diagnostics[slot.index()] = value;
        }

        Ok(Evaluation { dydt, diagnostics })
    }
}
