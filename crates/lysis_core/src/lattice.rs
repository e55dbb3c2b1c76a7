//! Stochastic competition of two phage strains on a square lattice of bacteria.
//!
//! Bacteria occupy lattice sites and never move. Healthy cells and lysogens
//! divide into a free von Neumann neighbour on a jittered schedule and die of
//! old age. A lytic cell bursts after a fixed time, putting infection pressure
//! on its eight surrounding sites. A healthy cell under pressure is infected
//! with some probability per tick; once infected it spends a fixed decision
//! time before resolving into a lysogen or a lytic cell of the infecting
//! strain, depending on how many times it was hit meanwhile.
//!
//! One [`Census`] row is recorded per tick, before the tick is applied.

use crate::error::{Result, SimulationError};
use crate::random::seeded_rng;
use crate::recorder::{Record, RecordSink};
use log::{debug, info};
use rand::Rng;
use rand_chacha::ChaCha20Rng;
use serde::{Deserialize, Serialize};
use std::io::{self, Write};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Strain {
    A,
    B,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum CellKind {
    #[default]
    Empty,
    Healthy,
    Lysogen(Strain),
    Lytic(Strain),
}

/// Per-strain parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StrainParams {
    pub lysogen_division_period: u32,
    pub lysogen_lifespan: u32,
    /// Ticks between turning lytic and bursting.
    pub burst_time: u32,
    pub infection_probability: f64,
    /// Infection attempts a burst grants on each surrounding site.
    pub tries: u32,
    /// Smallest multiplicity of infection that resolves lysogenically.
    pub lysogeny_threshold: u32,
}

impl StrainParams {
    pub fn strain_a() -> Self {
        Self {
            lysogen_division_period: 30,
            lysogen_lifespan: 120,
            burst_time: 1000,
            infection_probability: 0.4,
            tries: 3,
            lysogeny_threshold: 2,
        }
    }

    pub fn strain_b() -> Self {
        Self {
            lysogeny_threshold: 3,
            ..Self::strain_a()
        }
    }

    pub fn lysogeny_probability(&self, multiplicity: u32) -> f64 {
        if multiplicity >= self.lysogeny_threshold {
            1.0
        } else {
            0.0
        }
    }

    fn validate(&self, name: &str) -> Result<()> {
        if !(0.0..=1.0).contains(&self.infection_probability) {
            return Err(SimulationError::InvalidSettings(format!(
                "strain {name}: infection_probability must lie in [0, 1]"
            )));
        }
        if self.lysogen_division_period == 0 || self.lysogen_lifespan == 0 || self.burst_time == 0 {
            return Err(SimulationError::InvalidSettings(format!(
                "strain {name}: periods and lifespans must be positive"
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LatticeSettings {
    pub size: usize,
    pub ticks: u64,
    pub seed: Option<u64>,
    pub healthy_division_period: u32,
    pub healthy_lifespan: u32,
    /// Divisions happen up to `2 * birth_jitter` ticks after the scheduling age.
    pub birth_jitter: u32,
    pub decision_time: u32,
    pub strain_a: StrainParams,
    pub strain_b: StrainParams,
}

impl Default for LatticeSettings {
    fn default() -> Self {
        Self {
            size: 40,
            ticks: 200_000,
            seed: None,
            healthy_division_period: 20,
            healthy_lifespan: 150,
            birth_jitter: 2,
            decision_time: 30,
            strain_a: StrainParams::strain_a(),
            strain_b: StrainParams::strain_b(),
        }
    }
}

impl LatticeSettings {
    pub fn validate(&self) -> Result<()> {
        if self.size < 8 {
            return Err(SimulationError::InvalidSettings(format!(
                "lattice size must be at least 8, got {}",
                self.size
            )));
        }
        if self.healthy_division_period <= self.birth_jitter {
            return Err(SimulationError::InvalidSettings(
                "healthy_division_period must exceed birth_jitter".to_string(),
            ));
        }
        if self.strain_a.lysogen_division_period <= self.birth_jitter
            || self.strain_b.lysogen_division_period <= self.birth_jitter
        {
            return Err(SimulationError::InvalidSettings(
                "lysogen_division_period must exceed birth_jitter".to_string(),
            ));
        }
        if self.healthy_lifespan == 0 || self.decision_time == 0 {
            return Err(SimulationError::InvalidSettings(
                "healthy_lifespan and decision_time must be positive".to_string(),
            ));
        }
        self.strain_a.validate("A")?;
        self.strain_b.validate("B")
    }

    fn strain(&self, strain: Strain) -> &StrainParams {
        match strain {
            Strain::A => &self.strain_a,
            Strain::B => &self.strain_b,
        }
    }
}

/// Population counts at one tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Census {
    pub t: u64,
    pub total: usize,
    pub lysogen_a: usize,
    pub lytic_a: usize,
    pub lysogen_b: usize,
    pub lytic_b: usize,
    pub healthy: usize,
}

impl Record for Census {
    const HEADER: Option<&'static str> = Some("t,total,lysogen_a,lytic_a,lysogen_b,lytic_b,healthy");

    fn write_fields<W: Write + ?Sized>(&self, out: &mut W) -> io::Result<()> {
        write!(
            out,
            "{},{},{},{},{},{},{}",
            self.t,
            self.total,
            self.lysogen_a,
            self.lytic_a,
            self.lysogen_b,
            self.lytic_b,
            self.healthy
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Pressure {
    strain: Strain,
    tries: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Decision {
    strain: Strain,
    remaining: u32,
}

#[derive(Debug, Clone, Copy, Default)]
struct Site {
    kind: CellKind,
    age: u32,
    lytic_timer: u32,
    /// Ticks left before a scheduled division.
    division: Option<u32>,
    /// Stays with the site, not the cell occupying it.
    pressure: Option<Pressure>,
    decision: Option<Decision>,
    multiplicity: u32,
}

impl Site {
    fn occupy(kind: CellKind) -> Self {
        Self {
            kind,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LatticeSummary {
    pub ticks: u64,
    pub seed: u64,
    pub last: Census,
    pub deaths: u64,
    pub births: u64,
}

const VON_NEUMANN: [(isize, isize); 4] = [(-1, 0), (0, 1), (1, 0), (0, -1)];
const MOORE: [(isize, isize); 8] = [
    (1, 1),
    (1, -1),
    (-1, 1),
    (-1, -1),
    (0, -1),
    (0, 1),
    (-1, 0),
    (1, 0),
];

pub struct LatticeSimulation {
    settings: LatticeSettings,
    sites: Vec<Site>,
    rng: ChaCha20Rng,
    seed: u64,
    t: u64,
    deaths: u64,
    births: u64,
}

impl LatticeSimulation {
    pub fn new(settings: LatticeSettings) -> Result<Self> {
        settings.validate()?;
        let (rng, seed) = seeded_rng(settings.seed);
        let size = settings.size;
        let mut simulation = Self {
            settings,
            sites: vec![Site::default(); size * size],
            rng,
            seed,
            t: 0,
            deaths: 0,
            births: 0,
        };
        simulation.place_island(size / 4, size / 4, Strain::B);
        simulation.place_island(3 * size / 4, 3 * size / 4, Strain::A);
        Ok(simulation)
    }

    /// A lytic cell of `strain` flanked diagonally by four healthy cells.
    fn place_island(&mut self, row: usize, col: usize, strain: Strain) {
        self.sites[row * self.settings.size + col] = Site::occupy(CellKind::Lytic(strain));
        for (dr, dc) in [(-1, -1), (-1, 1), (1, -1), (1, 1)] {
            if let Some(index) = self.neighbour(row, col, dr, dc) {
                self.sites[index] = Site::occupy(CellKind::Healthy);
            }
        }
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn size(&self) -> usize {
        self.settings.size
    }

    pub fn time(&self) -> u64 {
        self.t
    }

    pub fn cell(&self, row: usize, col: usize) -> Option<CellKind> {
        (row < self.size() && col < self.size()).then(|| self.sites[row * self.size() + col].kind)
    }

    pub fn census(&self) -> Census {
        let mut census = Census {
            t: self.t,
            ..Census::default()
        };
        for site in &self.sites {
            match site.kind {
                CellKind::Empty => continue,
                CellKind::Healthy => census.healthy += 1,
                CellKind::Lysogen(Strain::A) => census.lysogen_a += 1,
                CellKind::Lysogen(Strain::B) => census.lysogen_b += 1,
                CellKind::Lytic(Strain::A) => census.lytic_a += 1,
                CellKind::Lytic(Strain::B) => census.lytic_b += 1,
            }
            census.total += 1;
        }
        census
    }

    pub fn run<S: RecordSink<Census>>(&mut self, sink: &mut S) -> Result<LatticeSummary> {
        info!(
            "lattice: {0}x{0} sites, {1} ticks, seed {2}",
            self.size(),
            self.settings.ticks,
            self.seed
        );
        let mut last = self.census();
        for _ in 0..self.settings.ticks {
            last = self.census();
            sink.record(&last)?;
            if self.t % 10_000 == 0 {
                debug!("t = {}: {:?}", self.t, last);
            }
            self.tick();
        }
        info!(
            "lattice done: {} cells left, {} births, {} deaths",
            last.total, self.births, self.deaths
        );
        Ok(LatticeSummary {
            ticks: self.settings.ticks,
            seed: self.seed,
            last,
            deaths: self.deaths,
            births: self.births,
        })
    }

    /// Advances every clock by one tick, then sweeps the lattice row by row.
    pub fn tick(&mut self) {
        for site in &mut self.sites {
            if site.kind == CellKind::Empty {
                continue;
            }
            site.age += 1;
            if matches!(site.kind, CellKind::Lytic(_)) {
                site.lytic_timer += 1;
            }
            site.division = match site.division {
                Some(0) | None => None,
                Some(n) => Some(n - 1),
            };
        }

        let size = self.size();
        for row in 0..size {
            for col in 0..size {
                let index = row * size + col;
                if self.sites[index].kind == CellKind::Empty {
                    continue;
                }
                if self.dies(index) {
                    self.kill(row, col);
                    continue;
                }
                if self.sites[index].kind == CellKind::Healthy {
                    self.infect(index);
                }
                self.schedule_division(index);
                self.divide(row, col);
            }
        }
        self.t += 1;
    }

    fn dies(&self, index: usize) -> bool {
        let site = &self.sites[index];
        match site.kind {
            CellKind::Empty => false,
            CellKind::Healthy => site.age >= self.settings.healthy_lifespan,
            CellKind::Lysogen(strain) => site.age >= self.settings.strain(strain).lysogen_lifespan,
            CellKind::Lytic(strain) => site.lytic_timer >= self.settings.strain(strain).burst_time,
        }
    }

    fn kill(&mut self, row: usize, col: usize) {
        let index = row * self.size() + col;
        if let CellKind::Lytic(strain) = self.sites[index].kind {
            self.burst(row, col, strain);
        }
        self.sites[index] = Site::default();
        self.deaths += 1;
    }

    fn burst(&mut self, row: usize, col: usize, strain: Strain) {
        let tries = self.settings.strain(strain).tries;
        for (dr, dc) in MOORE {
            if let Some(index) = self.neighbour(row, col, dr, dc) {
                let site = &mut self.sites[index];
                if site.pressure.is_none() && tries > 0 {
                    site.pressure = Some(Pressure { strain, tries });
                }
            }
        }
    }

    fn infect(&mut self, index: usize) {
        let decision_time = self.settings.decision_time;
        if let Some(mut pressure) = self.sites[index].pressure {
            let p = self.settings.strain(pressure.strain).infection_probability;
            let site = &mut self.sites[index];
            if self.rng.gen_bool(p) {
                site.multiplicity += 1;
                if site.decision.is_none() {
                    site.decision = Some(Decision {
                        strain: pressure.strain,
                        remaining: decision_time,
                    });
                }
            }
            pressure.tries -= 1;
            site.pressure = (pressure.tries > 0).then_some(pressure);
        }

        if let Some(mut decision) = self.sites[index].decision {
            decision.remaining -= 1;
            if decision.remaining > 0 {
                self.sites[index].decision = Some(decision);
                return;
            }
            let params = self.settings.strain(decision.strain);
            let p = params.lysogeny_probability(self.sites[index].multiplicity);
            let lysogenic = self.rng.gen_bool(p);
            let site = &mut self.sites[index];
            site.decision = None;
            if lysogenic {
                site.kind = CellKind::Lysogen(decision.strain);
            } else {
                site.kind = CellKind::Lytic(decision.strain);
                site.lytic_timer = 0;
            }
        }
    }

    fn division_period(&self, kind: CellKind) -> Option<u32> {
        match kind {
            CellKind::Healthy => Some(self.settings.healthy_division_period),
            CellKind::Lysogen(strain) => Some(self.settings.strain(strain).lysogen_division_period),
            CellKind::Empty | CellKind::Lytic(_) => None,
        }
    }

    fn schedule_division(&mut self, index: usize) {
        let site = self.sites[index];
        let Some(period) = self.division_period(site.kind) else {
            return;
        };
        let jitter = self.settings.birth_jitter;
        if site.division.is_none() && site.age != 0 && site.age % period == period - jitter {
            let delay = self.rng.gen_range(0..=2 * jitter);
            self.sites[index].division = Some(delay);
        }
    }

    /// Healthy cells wait out pressure and decisions; lysogens divide on schedule regardless.
    fn divide(&mut self, row: usize, col: usize) {
        let index = row * self.size() + col;
        let site = self.sites[index];
        if site.division != Some(0) || site.age == 0 {
            return;
        }
        let blocked = match site.kind {
            CellKind::Healthy => site.pressure.is_some() || site.decision.is_some(),
            CellKind::Lysogen(_) => false,
            CellKind::Empty | CellKind::Lytic(_) => true,
        };
        if blocked {
            return;
        }

        let mut free = [0usize; 4];
        let mut count = 0;
        for (dr, dc) in VON_NEUMANN {
            if let Some(target) = self.neighbour(row, col, dr, dc) {
                if self.sites[target].kind == CellKind::Empty {
                    free[count] = target;
                    count += 1;
                }
            }
        }
        if count == 0 {
            return;
        }
        let target = free[self.rng.gen_range(0..count)];
        let daughter = &mut self.sites[target];
        daughter.kind = site.kind;
        daughter.age = 0;
        daughter.lytic_timer = 0;
        daughter.division = None;
        daughter.decision = None;
        daughter.multiplicity = 0;
        self.births += 1;
    }

    fn neighbour(&self, row: usize, col: usize, dr: isize, dc: isize) -> Option<usize> {
        let size = self.size();
        let r = row.checked_add_signed(dr)?;
        let c = col.checked_add_signed(dc)?;
        (r < size && c < size).then_some(r * size + c)
    }
}
