//! Think-time allotment, the protocol lifecycle, and the cooperative budget
//! the scorer polls while it works.

use chess::Color;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::config::TimeConfig;
use crate::phase::GamePhase;

/// Parameters of a `go` command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GoParams {
    pub wtime: Option<u64>,
    pub btime: Option<u64>,
    pub winc: Option<u64>,
    pub binc: Option<u64>,
    pub movestogo: Option<u64>,
    pub movetime: Option<u64>,
    pub depth: Option<u32>,
    pub nodes: Option<u64>,
    pub infinite: bool,
}

impl GoParams {
    /// Parse the tokens of a `go` command (the first token is `go` itself).
    /// Unknown tokens and unparsable values are ignored.
    pub fn parse(parts: &[&str]) -> Self {
        let mut params = GoParams::default();
        let mut i = 1;
        while i < parts.len() {
            let value = parts.get(i + 1);
            let mut consumed = 2;
            match parts[i] {
                "wtime" => params.wtime = value.and_then(|v| v.parse().ok()),
                "btime" => params.btime = value.and_then(|v| v.parse().ok()),
                "winc" => params.winc = value.and_then(|v| v.parse().ok()),
                "binc" => params.binc = value.and_then(|v| v.parse().ok()),
                "movestogo" => params.movestogo = value.and_then(|v| v.parse().ok()),
                "movetime" => params.movetime = value.and_then(|v| v.parse().ok()),
                "depth" => params.depth = value.and_then(|v| v.parse().ok()),
                "nodes" => params.nodes = value.and_then(|v| v.parse().ok()),
                "infinite" => {
                    params.infinite = true;
                    consumed = 1;
                }
                _ => consumed = 1,
            }
            i += consumed;
        }
        params
    }

    fn clock_for(&self, side: Color) -> (Option<u64>, u64) {
        match side {
            Color::White => (self.wtime, self.winc.unwrap_or(0)),
            Color::Black => (self.btime, self.binc.unwrap_or(0)),
        }
    }
}

/// How long to think before answering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThinkBudget {
    Fixed(Duration),
    /// Until `stop`
    Infinite,
}

impl ThinkBudget {
    pub fn deadline_from(&self, start: Instant) -> Option<Instant> {
        match self {
            ThinkBudget::Fixed(duration) => Some(start + *duration),
            ThinkBudget::Infinite => None,
        }
    }
}

/// Estimated moves left in the game, by phase.
pub fn moves_remaining(phase: GamePhase) -> u64 {
    match phase {
        GamePhase::Opening => 40,
        GamePhase::Middlegame => 20,
        GamePhase::Endgame => 10,
    }
}

/// Compute the think-time for one `go`.
///
/// `movetime` is honoured exactly. With a clock, the per-move share is
/// remaining / moves-remaining plus a fraction of the increment (or that
/// fraction of the share when there is no increment), minus the move overhead,
/// floored at `min_think_ms` and never above a third of the remaining time.
pub fn allot(params: &GoParams, side: Color, phase: GamePhase, config: &TimeConfig) -> ThinkBudget {
    if params.infinite {
        return ThinkBudget::Infinite;
    }
    if let Some(movetime) = params.movetime {
        return ThinkBudget::Fixed(Duration::from_millis(movetime));
    }

    let (remaining, increment) = params.clock_for(side);
    let remaining = match remaining {
        Some(remaining) => remaining,
        None => return ThinkBudget::Fixed(Duration::from_millis(config.default_think_ms)),
    };

    let moves_left = params
        .movestogo
        .filter(|&n| n > 0)
        .unwrap_or_else(|| moves_remaining(phase));
    let share = remaining as f64 / moves_left as f64;
    let think = if increment > 0 {
        share + increment as f64 * config.increment_fraction
    } else {
        share * config.increment_fraction
    };

    let think_ms = (think as u64)
        .saturating_sub(config.move_overhead_ms)
        .max(config.min_think_ms)
        .min(remaining / 3)
        .max(1);
    ThinkBudget::Fixed(Duration::from_millis(think_ms))
}

/// Lifecycle of the host protocol as seen by the time controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolState {
    Idle,
    Ready,
    PositionSet,
    Searching,
    MoveReturned,
}

/// Tracks the protocol lifecycle and hands out budgets for searches.
#[derive(Debug, Clone)]
pub struct TimeController {
    config: TimeConfig,
    state: ProtocolState,
    search_started: Option<Instant>,
}

impl TimeController {
    pub fn new(config: TimeConfig) -> Self {
        Self {
            config,
            state: ProtocolState::Idle,
            search_started: None,
        }
    }

    pub fn state(&self) -> ProtocolState {
        self.state
    }

    fn transition(&mut self, next: ProtocolState) {
        if self.state != next {
            log::debug!("protocol state {:?} -> {:?}", self.state, next);
        }
        self.state = next;
    }

    pub fn on_ready(&mut self) {
        if matches!(self.state, ProtocolState::Idle | ProtocolState::MoveReturned) {
            self.transition(ProtocolState::Ready);
        }
    }

    pub fn on_new_game(&mut self) {
        self.transition(ProtocolState::Ready);
    }

    pub fn on_position(&mut self) {
        self.transition(ProtocolState::PositionSet);
    }

    /// Enter `Searching` and return the budget for this search.
    pub fn begin_search(&mut self, params: &GoParams, side: Color, phase: GamePhase) -> ThinkBudget {
        self.search_started = Some(Instant::now());
        self.transition(ProtocolState::Searching);
        allot(params, side, phase, &self.config)
    }

    /// Time until the budget is used up, measured from `begin_search`.
    pub fn remaining(&self, budget: ThinkBudget) -> Option<Duration> {
        match budget {
            ThinkBudget::Fixed(duration) => {
                let elapsed = self.search_started.map(|s| s.elapsed()).unwrap_or_default();
                Some(duration.saturating_sub(elapsed))
            }
            ThinkBudget::Infinite => None,
        }
    }

    pub fn search_started(&self) -> Option<Instant> {
        self.search_started
    }

    pub fn finish_search(&mut self) {
        self.search_started = None;
        self.transition(ProtocolState::MoveReturned);
    }
}

/// Deadline plus stop flag, polled by the scorer between moves.
#[derive(Debug, Clone)]
pub struct SearchBudget {
    deadline: Option<Instant>,
    stop: Arc<AtomicBool>,
}

impl SearchBudget {
    pub fn new(deadline: Option<Instant>, stop: Arc<AtomicBool>) -> Self {
        Self { deadline, stop }
    }

    /// No deadline and a private stop flag.
    pub fn unbounded() -> Self {
        Self::new(None, Arc::new(AtomicBool::new(false)))
    }

    /// Past the deadline: cheap scoring only.
    pub fn expired(&self) -> bool {
        self.deadline.map_or(false, |deadline| Instant::now() >= deadline)
    }

    /// Host asked to stop: return what has been ranked so far.
    pub fn stopped(&self) -> bool {
        self.stop.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(command: &str) -> GoParams {
        let parts: Vec<&str> = command.split_whitespace().collect();
        GoParams::parse(&parts)
    }

    #[test]
    fn test_parse_go() {
        let params = parse("go wtime 60000 btime 55000 winc 1000 binc 1000 movestogo 20");
        assert_eq!(params.wtime, Some(60000));
        assert_eq!(params.binc, Some(1000));
        assert_eq!(params.movestogo, Some(20));
        assert!(!params.infinite);

        let params = parse("go infinite");
        assert!(params.infinite);

        let params = parse("go movetime abc depth 5");
        assert_eq!(params.movetime, None);
        assert_eq!(params.depth, Some(5));
    }

    #[test]
    fn test_movetime_is_exact() {
        let config = TimeConfig::default();
        let budget = allot(&parse("go movetime 100"), Color::White, GamePhase::Opening, &config);
        assert_eq!(budget, ThinkBudget::Fixed(Duration::from_millis(100)));
    }

    #[test]
    fn test_clock_with_increment() {
        let config = TimeConfig::default();
        // 60000 / 40 = 1500, + 0.75 * 2000 = 3000, - 50 = 2950
        let budget = allot(
            &parse("go wtime 60000 btime 60000 winc 2000 binc 2000"),
            Color::White,
            GamePhase::Opening,
            &config,
        );
        assert_eq!(budget, ThinkBudget::Fixed(Duration::from_millis(2950)));
    }

    #[test]
    fn test_clock_without_increment() {
        let config = TimeConfig::default();
        // 40000 / 10 = 4000 * 0.75 = 3000 - 50 = 2950
        let budget = allot(
            &parse("go wtime 1000 btime 40000"),
            Color::Black,
            GamePhase::Endgame,
            &config,
        );
        assert_eq!(budget, ThinkBudget::Fixed(Duration::from_millis(2950)));
    }

    #[test]
    fn test_never_exceeds_third_of_remaining() {
        let config = TimeConfig::default();
        let budget = allot(
            &parse("go wtime 900 btime 900 winc 5000 movestogo 1"),
            Color::White,
            GamePhase::Middlegame,
            &config,
        );
        assert_eq!(budget, ThinkBudget::Fixed(Duration::from_millis(300)));
    }

    #[test]
    fn test_minimum_floor() {
        let config = TimeConfig::default();
        let budget = allot(
            &parse("go wtime 3000 btime 3000"),
            Color::White,
            GamePhase::Opening,
            &config,
        );
        // 3000 / 40 * 0.75 = 56 - 50 = 6, raised to the 10ms floor
        assert_eq!(budget, ThinkBudget::Fixed(Duration::from_millis(10)));
    }

    #[test]
    fn test_default_without_clock() {
        let config = TimeConfig::default();
        let budget = allot(&parse("go"), Color::White, GamePhase::Opening, &config);
        assert_eq!(budget, ThinkBudget::Fixed(Duration::from_millis(1000)));
        let infinite = allot(&parse("go infinite"), Color::White, GamePhase::Opening, &config);
        assert_eq!(infinite, ThinkBudget::Infinite);
    }

    #[test]
    fn test_state_machine() {
        let mut controller = TimeController::new(TimeConfig::default());
        assert_eq!(controller.state(), ProtocolState::Idle);
        controller.on_ready();
        assert_eq!(controller.state(), ProtocolState::Ready);
        controller.on_position();
        assert_eq!(controller.state(), ProtocolState::PositionSet);
        let budget = controller.begin_search(&parse("go movetime 50"), Color::White, GamePhase::Opening);
        assert_eq!(controller.state(), ProtocolState::Searching);
        assert!(controller.remaining(budget).unwrap() <= Duration::from_millis(50));
        controller.finish_search();
        assert_eq!(controller.state(), ProtocolState::MoveReturned);
        controller.on_ready();
        assert_eq!(controller.state(), ProtocolState::Ready);
    }

    #[test]
    fn test_search_budget() {
        let stop = Arc::new(AtomicBool::new(false));
        let budget = SearchBudget::new(Some(Instant::now()), stop.clone());
        assert!(budget.expired());
        assert!(!budget.stopped());
        stop.store(true, Ordering::Relaxed);
        assert!(budget.stopped());
        assert!(!SearchBudget::unbounded().expired());
    }
}
