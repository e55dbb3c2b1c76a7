//! Competitive search over three-stage strategies (the MOI search).
//!
//! Two players start from the same random strategy. Every round their
//! lineages are integrated against each other; the winner's strategy is
//! recorded and the loser is replaced by a local mutation of it. Each stage
//! fraction mutates independently within [`MUTATION_RADIUS`] grid points of the
//! winner's value.
//!
//! [`MUTATION_RADIUS`]: crate::grid::MUTATION_RADIUS

use crate::contest::Contest;
use crate::error::{Result, SimulationError};
use crate::grid::StrategyGrid;
use crate::integrator::TimeGrid;
use crate::payoff::LysogenOutcome;
use crate::recorder::{RecordSink, WinnerRecord};
use log::{debug, info};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Grid indices of the three stage fractions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Strategy(pub [usize; 3]);

impl Strategy {
    pub fn random<R: Rng + ?Sized>(grid: &StrategyGrid, rng: &mut R) -> Self {
        Self([grid.sample(rng), grid.sample(rng), grid.sample(rng)])
    }

    /// A local mutation of `self`, component by component.
    pub fn mutate<R: Rng + ?Sized>(&self, grid: &StrategyGrid, rng: &mut R) -> Self {
        Self(self.0.map(|index| grid.sample_near(index, rng)))
    }

    pub fn fractions(&self, grid: &StrategyGrid) -> [f64; 3] {
        self.0.map(|index| grid.value(index))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Player {
    First,
    Second,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoundOutcome {
    Win(Player),
    Draw,
}

impl RoundOutcome {
    /// Compares final lysogen totals. A strict win takes precedence; only
    /// totals closer than `tolerance` fall through to a draw.
    pub fn classify(outcome: LysogenOutcome, tolerance: f64) -> Result<Self> {
        let LysogenOutcome { first, second } = outcome;
        let undefined = SimulationError::UndefinedPayoff {
            l1: first,
            l2: second,
        };
        if !(first.is_finite() && second.is_finite()) {
            return Err(undefined);
        }
        if first > second {
            Ok(Self::Win(Player::First))
        } else if first < second {
            Ok(Self::Win(Player::Second))
        } else if (first - second).abs() < tolerance {
            Ok(Self::Draw)
        } else {
            Err(undefined)
        }
    }
}

/// How a draw is recorded and who mutates afterwards.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DrawPolicy {
    /// Record the second player and mutate it around the first.
    #[default]
    CreditSecond,
    /// Record the first player; nobody mutates.
    Hold,
    /// Record the first player and mutate both around it.
    MutateBoth,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Contestants {
    pub first: Strategy,
    pub second: Strategy,
}

impl Contestants {
    /// Both players on the same random strategy.
    pub fn mirrored<R: Rng + ?Sized>(grid: &StrategyGrid, rng: &mut R) -> Self {
        let first = Strategy::random(grid, rng);
        Self {
            first,
            second: first,
        }
    }

    pub fn get(&self, player: Player) -> Strategy {
        match player {
            Player::First => self.first,
            Player::Second => self.second,
        }
    }
}

/// Result of one round: the strategy to record and the next pairing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resolution {
    pub recorded: Strategy,
    pub next: Contestants,
}

pub fn resolve_round<R: Rng + ?Sized>(
    outcome: RoundOutcome,
    players: Contestants,
    policy: DrawPolicy,
    grid: &StrategyGrid,
    rng: &mut R,
) -> Resolution {
    let Contestants { first, second } = players;
    match outcome {
        RoundOutcome::Win(Player::First) => Resolution {
            recorded: first,
            next: Contestants {
                first,
                second: first.mutate(grid, rng),
            },
        },
        RoundOutcome::Win(Player::Second) => Resolution {
            recorded: second,
            next: Contestants {
                first: second.mutate(grid, rng),
                second,
            },
        },
        RoundOutcome::Draw => match policy {
            DrawPolicy::CreditSecond => Resolution {
                recorded: second,
                next: Contestants {
                    first,
                    second: first.mutate(grid, rng),
                },
            },
            DrawPolicy::Hold => Resolution {
                recorded: first,
                next: players,
            },
            DrawPolicy::MutateBoth => {
                let mutated_first = first.mutate(grid, rng);
                Resolution {
                    recorded: first,
                    next: Contestants {
                        first: mutated_first,
                        second: first.mutate(grid, rng),
                    },
                }
            }
        },
    }
}

/// Reads an iteration count the way it is typed at the prompt.
pub fn parse_iteration_count(input: &str) -> Result<i64> {
    input
        .trim()
        .parse::<i64>()
        .map_err(|_| SimulationError::InvalidIterationCount {
            input: input.trim().to_string(),
        })
}

/// The most recent winning strategies, oldest first.
#[derive(Debug, Clone, Default)]
pub struct WinnerHistory {
    capacity: usize,
    entries: VecDeque<[f64; 3]>,
}

impl WinnerHistory {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity,
            entries: VecDeque::with_capacity(capacity.min(4096)),
        }
    }

    pub fn push(&mut self, strategy: [f64; 3]) {
        if self.capacity == 0 {
            return;
        }
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(strategy);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &[f64; 3]> {
        self.entries.iter()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchSettings {
    /// Lysogen totals closer than this count as a draw.
    pub draw_tolerance: f64,
    pub draw_policy: DrawPolicy,
    /// Winners kept in memory; 0 keeps none.
    pub history_capacity: usize,
    pub seed: Option<u64>,
    pub time: TimeGrid,
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self {
            draw_tolerance: 1e-10,
            draw_policy: DrawPolicy::default(),
            history_capacity: 1000,
            seed: None,
            time: TimeGrid::linspace(0.0, 100.0, 101000),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchSummary {
    pub rounds: usize,
    pub first_wins: usize,
    pub second_wins: usize,
    pub draws: usize,
    pub players: Contestants,
}

pub struct CompetitiveSearch<C> {
    contest: C,
    settings: SearchSettings,
    grid: StrategyGrid,
    history: WinnerHistory,
}

impl<C: Contest<[f64; 3]>> CompetitiveSearch<C> {
    pub fn new(contest: C, settings: SearchSettings) -> Result<Self> {
        if !(settings.draw_tolerance.is_finite() && settings.draw_tolerance > 0.0) {
            return Err(SimulationError::InvalidSettings(format!(
                "draw_tolerance must be finite and positive, got {}",
                settings.draw_tolerance
            )));
        }
        Ok(Self {
            contest,
            history: WinnerHistory::with_capacity(settings.history_capacity),
            settings,
            grid: StrategyGrid::default(),
        })
    }

    pub fn history(&self) -> &WinnerHistory {
        &self.history
    }

    /// Plays `iterations - 1` rounds, recording one winner per round.
    pub fn run<R, S>(&mut self, iterations: i64, rng: &mut R, sink: &mut S) -> Result<SearchSummary>
    where
        R: Rng + ?Sized,
        S: RecordSink<WinnerRecord>,
    {
        let mut players = Contestants::mirrored(&self.grid, rng);
        let mut summary = SearchSummary {
            rounds: 0,
            first_wins: 0,
            second_wins: 0,
            draws: 0,
            players,
        };
        info!(
            "moi search: {} rounds from {:?}",
            iterations.saturating_sub(1).max(0),
            players.first.fractions(&self.grid)
        );

        let mut iteration: i64 = 1;
        while iteration < iterations {
            let lysogens = self.contest.play(
                players.first.fractions(&self.grid),
                players.second.fractions(&self.grid),
            )?;
            let outcome = RoundOutcome::classify(lysogens, self.settings.draw_tolerance)?;
            match outcome {
                RoundOutcome::Win(Player::First) => summary.first_wins += 1,
                RoundOutcome::Win(Player::Second) => summary.second_wins += 1,
                RoundOutcome::Draw => summary.draws += 1,
            }

            let resolution =
                resolve_round(outcome, players, self.settings.draw_policy, &self.grid, rng);
            let winner = resolution.recorded.fractions(&self.grid);
            debug!(
                "round {iteration}: {outcome:?}, L1 = {:e}, L2 = {:e}, winner {winner:?}",
                lysogens.first, lysogens.second
            );
            sink.record(&WinnerRecord { strategy: winner })?;
            self.history.push(winner);

            players = resolution.next;
            summary.rounds += 1;
            iteration += 1;
            if summary.rounds % 100 == 0 {
                info!("{} rounds played", summary.rounds);
            }
        }

        summary.players = players;
        info!(
            "moi search done: {} rounds, {} / {} wins, {} draws",
            summary.rounds, summary.first_wins, summary.second_wins, summary.draws
        );
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha20Rng;

    /// Lysogen totals grow with the first stage fraction.
    fn favour_first_stage(a: [f64; 3], b: [f64; 3]) -> Result<LysogenOutcome> {
        Ok(LysogenOutcome::new(a[0], b[0]))
    }

    fn run_rounds(iterations: i64) -> (Vec<WinnerRecord>, SearchSummary) {
        let mut search =
            CompetitiveSearch::new(favour_first_stage, SearchSettings::default()).unwrap();
        let mut rng = ChaCha20Rng::seed_from_u64(5);
        let mut records = Vec::new();
        let summary = search.run(iterations, &mut rng, &mut records).unwrap();
        (records, summary)
    }

    #[test]
    fn runs_one_round_fewer_than_requested() {
        for iterations in [2, 3, 10, 57] {
            let (records, summary) = run_rounds(iterations);
            assert_eq!(records.len() as i64, iterations - 1);
            assert_eq!(summary.rounds as i64, iterations - 1);
        }
        for iterations in [1, 0, -4] {
            let (records, summary) = run_rounds(iterations);
            assert!(records.is_empty());
            assert_eq!(summary.rounds, 0);
        }
    }

    #[test]
    fn two_iterations_record_the_initial_strategy() {
        let grid = StrategyGrid::default();
        let mut replay = ChaCha20Rng::seed_from_u64(5);
        let initial = Contestants::mirrored(&grid, &mut replay);

        let (records, summary) = run_rounds(2);
        // Mirrored players always draw the opening round.
        assert_eq!(summary.draws, 1);
        assert_eq!(records[0].strategy, initial.first.fractions(&grid));
    }

    #[test]
    fn stronger_player_keeps_winning() {
        let mut search =
            CompetitiveSearch::new(favour_first_stage, SearchSettings::default()).unwrap();
        let mut rng = ChaCha20Rng::seed_from_u64(21);
        let mut records = Vec::new();
        search.run(400, &mut rng, &mut records).unwrap();
        let last = records.last().unwrap().strategy[0];
        let first = records.first().unwrap().strategy[0];
        assert!(last >= first);
        assert!(last > 0.9, "search climbed only to {last}");
    }

    #[test]
    fn history_is_bounded() {
        let settings = SearchSettings {
            history_capacity: 5,
            ..SearchSettings::default()
        };
        let mut search = CompetitiveSearch::new(favour_first_stage, settings).unwrap();
        let mut rng = ChaCha20Rng::seed_from_u64(1);
        let mut records = Vec::new();
        search.run(20, &mut rng, &mut records).unwrap();
        assert_eq!(search.history().len(), 5);
        let tail: Vec<_> = records[14..].iter().map(|r| r.strategy).collect();
        let kept: Vec<_> = search.history().iter().copied().collect();
        assert_eq!(kept, tail);

        let mut disabled = WinnerHistory::with_capacity(0);
        disabled.push([0.1; 3]);
        assert!(disabled.is_empty());
    }

    #[test]
    fn strict_wins_take_precedence_over_draws() {
        let near = LysogenOutcome::new(0.3, 0.3 + 5e-11);
        assert_eq!(
            RoundOutcome::classify(near, 1e-10).unwrap(),
            RoundOutcome::Win(Player::Second)
        );
        assert_eq!(
            RoundOutcome::classify(near.swapped(), 1e-10).unwrap(),
            RoundOutcome::Win(Player::First)
        );
        assert_eq!(
            RoundOutcome::classify(LysogenOutcome::new(0.3, 0.3), 1e-10).unwrap(),
            RoundOutcome::Draw
        );
        assert!(RoundOutcome::classify(LysogenOutcome::new(f64::NAN, 0.1), 1e-10).is_err());
    }

    #[test]
    fn rejects_non_positive_draw_tolerance() {
        let settings = SearchSettings {
            draw_tolerance: 0.0,
            ..SearchSettings::default()
        };
        let err = CompetitiveSearch::new(favour_first_stage, settings).err().unwrap();
        assert!(err.to_string().contains("draw_tolerance"));
    }

    fn within_window(candidate: Strategy, centre: Strategy) -> bool {
        candidate
            .0
            .iter()
            .zip(centre.0.iter())
            .all(|(&c, &w)| c + 3 >= w && c <= (w + 3).min(100))
    }

    #[test]
    fn winner_stays_and_loser_mutates_nearby() {
        let grid = StrategyGrid::default();
        let mut rng = ChaCha20Rng::seed_from_u64(3);
        let players = Contestants {
            first: Strategy([10, 50, 99]),
            second: Strategy([0, 100, 40]),
        };

        let first_wins = resolve_round(
            RoundOutcome::Win(Player::First),
            players,
            DrawPolicy::default(),
            &grid,
            &mut rng,
        );
        assert_eq!(first_wins.recorded, players.first);
        assert_eq!(first_wins.next.first, players.first);
        assert!(within_window(first_wins.next.second, players.first));

        let second_wins = resolve_round(
            RoundOutcome::Win(Player::Second),
            players,
            DrawPolicy::default(),
            &grid,
            &mut rng,
        );
        assert_eq!(second_wins.recorded, players.second);
        assert_eq!(second_wins.next.second, players.second);
        assert!(within_window(second_wins.next.first, players.second));
    }

    #[test]
    fn draw_policies() {
        let grid = StrategyGrid::default();
        let mut rng = ChaCha20Rng::seed_from_u64(8);
        let players = Contestants {
            first: Strategy([20, 30, 40]),
            second: Strategy([60, 70, 80]),
        };
        let draw = |policy, rng: &mut ChaCha20Rng| {
            resolve_round(RoundOutcome::Draw, players, policy, &grid, rng)
        };

        let credit = draw(DrawPolicy::CreditSecond, &mut rng);
        assert_eq!(credit.recorded, players.second);
        assert_eq!(credit.next.first, players.first);
        assert!(within_window(credit.next.second, players.first));

        let hold = draw(DrawPolicy::Hold, &mut rng);
        assert_eq!(hold.recorded, players.first);
        assert_eq!(hold.next, players);

        let both = draw(DrawPolicy::MutateBoth, &mut rng);
        assert_eq!(both.recorded, players.first);
        assert!(within_window(both.next.first, players.first));
        assert!(within_window(both.next.second, players.first));
    }

    #[test]
    fn iteration_counts_parse_like_integers() {
        assert_eq!(parse_iteration_count(" 42\n").unwrap(), 42);
        assert_eq!(parse_iteration_count("-3").unwrap(), -3);
        let err = parse_iteration_count("ten").unwrap_err();
        assert!(matches!(
            err,
            SimulationError::InvalidIterationCount { ref input } if input == "ten"
        ));
        assert!(parse_iteration_count("2.5").is_err());
    }
}
