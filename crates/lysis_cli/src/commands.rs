use anyhow::{Context, Result};
use clap::{Args, Subcommand, ValueEnum};
use colored::Colorize;
use log::info;
use lysis_core::config::ExperimentConfig;
use lysis_core::contest::OdeContest;
use lysis_core::integrator::{IntegratorSettings, Method, TimeGrid};
use lysis_core::lattice::{Census, LatticeSimulation};
use lysis_core::model::{SingleStageModel, ThreeStageModel};
use lysis_core::random::seeded_rng;
use lysis_core::recorder::{PayoffRecord, Recorder, WinnerRecord};
use lysis_core::search::{CompetitiveSearch, DrawPolicy};
use lysis_core::sweep::{GridSweep, PercentRange};
use std::io;
use std::path::PathBuf;

use crate::prompt::read_iterations;

const PROMPT_ATTEMPTS: usize = 3;

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Integrate every (f1, f2) pair of single-stage strategies and record the payoff
    PayoffMatrix(PayoffMatrixArgs),
    /// Evolve three-stage strategies by repeated head-to-head competition
    MoiSearch(MoiSearchArgs),
    /// Run the stochastic two-strain lattice automaton
    Lattice(LatticeArgs),
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum MethodArg {
    /// Tsit5, switching to Rosenbrock23 when the problem turns stiff
    Auto,
    Tsit5,
    Rosenbrock23,
    /// Fixed-step RK4 along the sample grid
    Rk4,
}

impl From<MethodArg> for Method {
    fn from(arg: MethodArg) -> Self {
        match arg {
            MethodArg::Auto => Self::Auto,
            MethodArg::Tsit5 => Self::Tsit5,
            MethodArg::Rosenbrock23 => Self::Rosenbrock23,
            MethodArg::Rk4 => Self::Rk4,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum DrawPolicyArg {
    /// Record the second player and mutate it around the first
    CreditSecond,
    /// Record the first player and keep both strategies
    Hold,
    /// Record the first player and mutate both around it
    MutateBoth,
}

impl From<DrawPolicyArg> for DrawPolicy {
    fn from(arg: DrawPolicyArg) -> Self {
        match arg {
            DrawPolicyArg::CreditSecond => Self::CreditSecond,
            DrawPolicyArg::Hold => Self::Hold,
            DrawPolicyArg::MutateBoth => Self::MutateBoth,
        }
    }
}

/// Integration overrides shared by the ODE experiments.
#[derive(Debug, Args)]
pub struct IntegrationArgs {
    /// End of the integration interval
    #[arg(long)]
    t_end: Option<f64>,

    /// Number of sample times, both ends included
    #[arg(long)]
    samples: Option<usize>,

    #[arg(long, value_enum)]
    method: Option<MethodArg>,

    #[arg(long)]
    rtol: Option<f64>,

    #[arg(long)]
    atol: Option<f64>,
}

impl IntegrationArgs {
    fn apply(&self, time: &mut TimeGrid, integrator: &mut IntegratorSettings) {
        if let Some(end) = self.t_end {
            time.end = end;
        }
        if let Some(samples) = self.samples {
            time.samples = samples;
        }
        if let Some(method) = self.method {
            integrator.method = method.into();
        }
        if let Some(rtol) = self.rtol {
            integrator.rtol = rtol;
        }
        if let Some(atol) = self.atol {
            integrator.atol = atol;
        }
    }
}

#[derive(Debug, Args)]
pub struct PayoffMatrixArgs {
    #[arg(long, default_value = "pydel")]
    output: PathBuf,

    /// First player's lysogeny percentages as start:stop[:step]
    #[arg(long)]
    f1: Option<PercentRange>,

    /// Second player's lysogeny percentages as start:stop[:step]
    #[arg(long)]
    f2: Option<PercentRange>,

    #[command(flatten)]
    integration: IntegrationArgs,
}

#[derive(Debug, Args)]
pub struct MoiSearchArgs {
    /// Game iterations; asked for on standard input when omitted
    #[arg(long, allow_negative_numbers = true)]
    iterations: Option<i64>,

    #[arg(long)]
    seed: Option<u64>,

    #[arg(long, default_value = "moi_winners_v_time")]
    output: PathBuf,

    #[arg(long, value_enum)]
    draw_policy: Option<DrawPolicyArg>,

    /// Recent winners kept in memory (0 disables)
    #[arg(long)]
    history: Option<usize>,

    #[command(flatten)]
    integration: IntegrationArgs,
}

#[derive(Debug, Args)]
pub struct LatticeArgs {
    #[arg(long)]
    ticks: Option<u64>,

    /// Side length of the square lattice
    #[arg(long)]
    size: Option<usize>,

    #[arg(long)]
    seed: Option<u64>,

    #[arg(long, default_value = "infectedResults.csv")]
    output: PathBuf,
}

pub fn run(command: Command, config: ExperimentConfig, quiet: bool) -> Result<()> {
    match command {
        Command::PayoffMatrix(args) => payoff_matrix(args, config, quiet),
        Command::MoiSearch(args) => moi_search(args, config, quiet),
        Command::Lattice(args) => lattice(args, config, quiet),
    }
}

fn payoff_matrix(args: PayoffMatrixArgs, config: ExperimentConfig, quiet: bool) -> Result<()> {
    let mut settings = config.sweep;
    let mut integrator = config.integrator;
    args.integration.apply(&mut settings.time, &mut integrator);
    if let Some(f1) = args.f1 {
        settings.f1 = f1;
    }
    if let Some(f2) = args.f2 {
        settings.f2 = f2;
    }

    let contest = OdeContest::<SingleStageModel>::new(
        config.rates,
        config.initial,
        settings.time,
        integrator,
    )?;
    let mut sweep = GridSweep::new(contest, settings)?;
    let mut recorder = Recorder::<PayoffRecord>::create(&args.output)?;
    let summary = sweep
        .run(&mut recorder)
        .with_context(|| format!("payoff matrix aborted; partial output in {}", args.output.display()))?;
    let lines = recorder.finish()?;

    if !quiet {
        println!(
            "{} {} cells, {} lines written to {}",
            "payoff matrix:".green().bold(),
            summary.cells,
            lines,
            args.output.display()
        );
        if summary.flagged + summary.skipped > 0 {
            println!(
                "{} {} flagged, {} skipped",
                "warning:".yellow().bold(),
                summary.flagged,
                summary.skipped
            );
        }
    }
    Ok(())
}

fn moi_search(args: MoiSearchArgs, config: ExperimentConfig, quiet: bool) -> Result<()> {
    let mut settings = config.search;
    let mut integrator = config.integrator;
    args.integration.apply(&mut settings.time, &mut integrator);
    if let Some(policy) = args.draw_policy {
        settings.draw_policy = policy.into();
    }
    if let Some(capacity) = args.history {
        settings.history_capacity = capacity;
    }

    let contest = OdeContest::<ThreeStageModel>::new(
        config.rates,
        config.initial,
        settings.time,
        integrator,
    )?;
    let mut search = CompetitiveSearch::new(contest, settings)?;

    let iterations = match args.iterations {
        Some(iterations) => iterations,
        None => {
            let stdin = io::stdin();
            read_iterations(&mut stdin.lock(), &mut io::stdout(), PROMPT_ATTEMPTS)?
        }
    };

    let (mut rng, seed) = seeded_rng(args.seed.or(settings.seed));
    info!("moi search seed: {seed}");

    let mut recorder = Recorder::<WinnerRecord>::create(&args.output)?;
    let summary = search
        .run(iterations, &mut rng, &mut recorder)
        .with_context(|| format!("moi search aborted; partial output in {}", args.output.display()))?;
    let lines = recorder.finish()?;

    if !quiet {
        println!(
            "{} {} rounds ({} / {} wins, {} draws), {} lines written to {}",
            "moi search:".green().bold(),
            summary.rounds,
            summary.first_wins,
            summary.second_wins,
            summary.draws,
            lines,
            args.output.display()
        );
        println!("{} {seed}", "seed:".dimmed());
        if let Some(latest) = search.history().iter().last() {
            println!("{} {:?}", "latest winner:".dimmed(), latest);
        }
    }
    Ok(())
}

fn lattice(args: LatticeArgs, config: ExperimentConfig, quiet: bool) -> Result<()> {
    let mut settings = config.lattice;
    if let Some(ticks) = args.ticks {
        settings.ticks = ticks;
    }
    if let Some(size) = args.size {
        settings.size = size;
    }
    if args.seed.is_some() {
        settings.seed = args.seed;
    }

    let mut simulation = LatticeSimulation::new(settings)?;
    let mut recorder = Recorder::<Census>::create(&args.output)?;
    let summary = simulation.run(&mut recorder)?;
    let lines = recorder.finish()?;

    if !quiet {
        println!(
            "{} {} ticks, {} cells left ({} births, {} deaths), {} rows written to {}",
            "lattice:".green().bold(),
            summary.ticks,
            summary.last.total,
            summary.births,
            summary.deaths,
            lines,
            args.output.display()
        );
        println!("{} {}", "seed:".dimmed(), summary.seed);
    }
    Ok(())
}
