use crossbeam::channel::{self, Receiver, RecvTimeoutError};
use std::collections::{HashMap, VecDeque};
use std::io::{self, BufRead, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Instant;

use crate::config::EngineConfig;
use crate::phase;
use crate::position::GameState;
use crate::selector::Selection;
use crate::time_control::{GoParams, ProtocolState, SearchBudget, ThinkBudget, TimeController};
use crate::StyleEngine;

/// UCI (Universal Chess Interface) protocol front end for the style engine
pub struct UCIEngine {
    engine: StyleEngine,
    state: GameState,
    debug: bool,
    engine_name: String,
    engine_author: String,
    options: HashMap<String, UCIOption>,
    time: TimeController,
    /// Raised by the input thread when `stop` arrives mid-search
    stop_flag: Arc<AtomicBool>,
}

/// UCI option types
#[derive(Debug, Clone, PartialEq)]
pub enum UCIOption {
    Check {
        default: bool,
        value: bool,
    },
    Spin {
        default: i32,
        min: i32,
        max: i32,
        value: i32,
    },
    String {
        default: String,
        value: String,
    },
}

impl Default for UCIEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl UCIEngine {
    pub fn new() -> Self {
        Self::with_config(EngineConfig::default())
    }

    pub fn with_config(config: EngineConfig) -> Self {
        let mut options = HashMap::new();

        options.insert(
            "Jitter".to_string(),
            UCIOption::Spin {
                default: (config.jitter * 100.0).round() as i32,
                min: 0,
                max: 20,
                value: (config.jitter * 100.0).round() as i32,
            },
        );

        options.insert(
            "SafetyFilter".to_string(),
            UCIOption::Check {
                default: config.safety_filter,
                value: config.safety_filter,
            },
        );

        let pattern_file = config.pattern_store_path.display().to_string();
        options.insert(
            "PatternFile".to_string(),
            UCIOption::String {
                default: pattern_file.clone(),
                value: pattern_file,
            },
        );

        // 0 means "seed from entropy"
        let seed = config
            .seed
            .map(|seed| seed.min(i32::MAX as u64) as i32)
            .unwrap_or(0);
        options.insert(
            "Seed".to_string(),
            UCIOption::Spin {
                default: seed,
                min: 0,
                max: i32::MAX,
                value: seed,
            },
        );

        Self {
            engine_name: config.engine_name.clone(),
            engine_author: config.engine_author.clone(),
            debug: config.enable_debug,
            time: TimeController::new(config.time),
            engine: StyleEngine::new(config),
            state: GameState::startpos(),
            options,
            stop_flag: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Swap in a different move-selection engine (tests, preloaded stores).
    pub fn with_engine(mut self, engine: StyleEngine) -> Self {
        self.engine = engine;
        self
    }

    /// Stop flag shared with the input thread.
    pub fn stop_flag(&self) -> Arc<AtomicBool> {
        self.stop_flag.clone()
    }

    pub fn state(&self) -> &GameState {
        &self.state
    }

    pub fn engine(&self) -> &StyleEngine {
        &self.engine
    }

    pub fn protocol_state(&self) -> ProtocolState {
        self.time.state()
    }

    /// Main UCI loop over stdin/stdout
    pub fn run(&mut self) {
        let commands = spawn_stdin_reader(self.stop_flag());
        let stdout = io::stdout();
        let mut out = stdout.lock();
        if let Err(e) = self.run_with(commands, &mut out) {
            log::error!("UCI output failed: {e}");
        }
    }

    /// Drive the protocol from a channel of command lines until `quit` or until
    /// the channel closes.
    pub fn run_with<W: Write>(&mut self, commands: Receiver<String>, out: &mut W) -> io::Result<()> {
        let mut deferred: VecDeque<String> = VecDeque::new();

        loop {
            let line = match deferred.pop_front() {
                Some(line) => line,
                None => match commands.recv() {
                    Ok(line) => line,
                    Err(_) => break,
                },
            };
            let command = line.trim();
            let parts: Vec<&str> = command.split_whitespace().collect();

            match parts.first() {
                None => continue,
                Some(&"quit") => break,
                Some(&"go") => {
                    if self.handle_go(&parts, &commands, &mut deferred, out)? {
                        break;
                    }
                }
                Some(_) => {
                    let response = self.process_command(command);
                    if !response.is_empty() {
                        writeln!(out, "{response}")?;
                        out.flush()?;
                    }
                }
            }
        }
        Ok(())
    }

    /// Process a non-search UCI command and return the response
    pub fn process_command(&mut self, command: &str) -> String {
        let parts: Vec<&str> = command.split_whitespace().collect();
        if parts.is_empty() {
            return String::new();
        }

        match parts[0] {
            "uci" => self.handle_uci(),
            "debug" => self.handle_debug(&parts),
            "isready" => self.handle_isready(),
            "setoption" => self.handle_setoption(&parts),
            "ucinewgame" => self.handle_ucinewgame(),
            "position" => self.handle_position(&parts),
            // Nothing is running outside of `go`
            "stop" => {
                self.stop_flag.store(false, Ordering::Relaxed);
                String::new()
            }
            _ => {
                log::debug!("Ignoring unknown command: {command}");
                if self.debug {
                    format!("info string Unknown command: {command}")
                } else {
                    String::new()
                }
            }
        }
    }

    fn handle_uci(&self) -> String {
        let mut response = String::new();
        response.push_str(&format!("id name {}\n", self.engine_name));
        response.push_str(&format!("id author {}\n", self.engine_author));

        let mut names: Vec<&String> = self.options.keys().collect();
        names.sort();
        for name in names {
            match &self.options[name] {
                UCIOption::Check { default, .. } => {
                    response.push_str(&format!(
                        "option name {name} type check default {default}\n"
                    ));
                }
                UCIOption::Spin {
                    default, min, max, ..
                } => {
                    response.push_str(&format!(
                        "option name {name} type spin default {default} min {min} max {max}\n"
                    ));
                }
                UCIOption::String { default, .. } => {
                    response.push_str(&format!(
                        "option name {name} type string default {default}\n"
                    ));
                }
            }
        }

        response.push_str("uciok");
        response
    }

    fn handle_debug(&mut self, parts: &[&str]) -> String {
        if parts.len() >= 2 {
            match parts[1] {
                "on" => self.debug = true,
                "off" => self.debug = false,
                _ => {}
            }
        }
        String::new()
    }

    fn handle_isready(&mut self) -> String {
        let store = self.engine.ensure_store_loaded();
        self.time.on_ready();
        if self.debug && store.is_neutral() {
            return "info string pattern store unavailable, using neutral defaults\nreadyok"
                .to_string();
        }
        "readyok".to_string()
    }

    fn handle_setoption(&mut self, parts: &[&str]) -> String {
        // Parse: setoption name <name> value <value>
        if parts.len() >= 3 && parts[1] == "name" {
            let mut name_parts = Vec::new();
            let mut value_parts = Vec::new();
            let mut in_value = false;

            for &part in &parts[2..] {
                if part == "value" {
                    in_value = true;
                } else if in_value {
                    value_parts.push(part);
                } else {
                    name_parts.push(part);
                }
            }

            let name = name_parts.join(" ");
            let value = value_parts.join(" ");

            self.set_option(&name, &value);
        }

        String::new()
    }

    fn set_option(&mut self, name: &str, value: &str) {
        // Option names are case-insensitive
        let key = match self.options.keys().find(|k| k.eq_ignore_ascii_case(name)) {
            Some(key) => key.clone(),
            None => {
                log::debug!("Ignoring unknown option '{name}'");
                return;
            }
        };

        let mut changed = false;
        if let Some(option) = self.options.get_mut(&key) {
            match option {
                UCIOption::Check {
                    value: ref mut val, ..
                } => {
                    let new_val = value.eq_ignore_ascii_case("true");
                    changed = *val != new_val;
                    *val = new_val;
                }
                UCIOption::Spin {
                    value: ref mut val,
                    min,
                    max,
                    ..
                } => match value.parse::<i32>() {
                    Ok(new_val) if new_val >= *min && new_val <= *max => {
                        changed = *val != new_val;
                        *val = new_val;
                    }
                    _ => log::info!("Rejected value '{value}' for option {key}"),
                },
                UCIOption::String {
                    value: ref mut val, ..
                } => {
                    changed = *val != value;
                    *val = value.to_string();
                }
            }
        }

        if changed {
            self.apply_option(&key);
        }
    }

    /// Push one option's current value into the engine.
    fn apply_option(&mut self, name: &str) {
        match (name, self.options.get(name)) {
            ("Jitter", Some(UCIOption::Spin { value, .. })) => {
                self.engine.set_jitter(*value as f32 / 100.0);
            }
            ("SafetyFilter", Some(UCIOption::Check { value, .. })) => {
                self.engine.set_safety_filter(*value);
            }
            ("PatternFile", Some(UCIOption::String { value, .. })) => {
                // Read at the next isready
                self.engine.set_pattern_store_path(value.clone());
            }
            ("Seed", Some(UCIOption::Spin { value, .. })) => {
                let seed = if *value == 0 { None } else { Some(*value as u64) };
                self.engine.set_seed(seed);
            }
            _ => {}
        }
    }

    fn handle_ucinewgame(&mut self) -> String {
        self.state = GameState::startpos();
        self.engine.new_game();
        self.time.on_new_game();
        String::new()
    }

    fn handle_position(&mut self, parts: &[&str]) -> String {
        let (state, error) = GameState::from_position_args(&parts[1..]);
        if let Some(state) = state {
            self.state = state;
        }
        self.time.on_position();

        match error {
            Some(e) => {
                // Keep whatever valid state was reached
                log::info!("Bad position command '{}': {e}", parts.join(" "));
                if self.debug {
                    format!("info string {e}")
                } else {
                    String::new()
                }
            }
            None => String::new(),
        }
    }

    /// Score, wait out the think-time, then answer with `bestmove`.
    /// Returns true when `quit` arrived during the wait.
    fn handle_go<W: Write>(
        &mut self,
        parts: &[&str],
        commands: &Receiver<String>,
        deferred: &mut VecDeque<String>,
        out: &mut W,
    ) -> io::Result<bool> {
        let params = GoParams::parse(parts);
        let phase = phase::classify_state(&self.state);
        let budget = self
            .time
            .begin_search(&params, self.state.side_to_move(), phase);
        let started = self.time.search_started().unwrap_or_else(Instant::now);

        self.stop_flag.store(false, Ordering::Relaxed);
        let search_budget = SearchBudget::new(budget.deadline_from(started), self.stop_flag());
        let selection = self.engine.choose_move(&self.state, &search_budget);

        if let Some(chess_move) = selection.chess_move() {
            writeln!(
                out,
                "info depth 1 time {} pv {}",
                started.elapsed().as_millis(),
                chess_move
            )?;
        }
        if self.debug {
            writeln!(out, "info string {}", describe(&selection, phase))?;
        }
        out.flush()?;

        let quit = self.wait_for_budget(budget, commands, deferred, out)?;

        writeln!(out, "bestmove {}", selection.to_uci())?;
        out.flush()?;
        self.time.finish_search();
        self.stop_flag.store(false, Ordering::Relaxed);
        Ok(quit)
    }

    /// Idle until the think-time is used up. `stop` and `quit` cut the wait
    /// short, `isready` is answered at once and anything else waits for the
    /// `bestmove` line.
    fn wait_for_budget<W: Write>(
        &mut self,
        budget: ThinkBudget,
        commands: &Receiver<String>,
        deferred: &mut VecDeque<String>,
        out: &mut W,
    ) -> io::Result<bool> {
        loop {
            let received = match self.time.remaining(budget) {
                Some(remaining) if remaining.is_zero() => return Ok(false),
                Some(remaining) => commands.recv_timeout(remaining),
                None => commands
                    .recv()
                    .map_err(|_| RecvTimeoutError::Disconnected),
            };

            match received {
                Ok(line) => match line.trim() {
                    "stop" => return Ok(false),
                    "quit" => return Ok(true),
                    "isready" => {
                        writeln!(out, "readyok")?;
                        out.flush()?;
                    }
                    _ => deferred.push_back(line),
                },
                Err(RecvTimeoutError::Timeout) => return Ok(false),
                Err(RecvTimeoutError::Disconnected) => {
                    // Input closed: sleep out a fixed budget, give up on an infinite one
                    if let Some(remaining) = self.time.remaining(budget) {
                        thread::sleep(remaining);
                    }
                    return Ok(false);
                }
            }
        }
    }
}

fn describe(selection: &Selection, phase: phase::GamePhase) -> String {
    match selection {
        Selection::NoLegalMove => format!("{phase}: no legal move"),
        Selection::Forced(chess_move) => format!("{phase}: forced {chess_move}"),
        Selection::Chosen(candidate) => format!(
            "{phase}: {} ({}) overall {:.3} tactical {:.2} positional {:.2}",
            candidate.san,
            candidate.flags(),
            candidate.overall,
            candidate.scores.tactical,
            candidate.scores.positional
        ),
        Selection::Fallback(chess_move) => format!("{phase}: fallback {chess_move}"),
    }
}

/// Forward stdin lines over a channel, raising `stop_flag` as soon as `stop`
/// is read so scoring in progress can see it.
pub fn spawn_stdin_reader(stop_flag: Arc<AtomicBool>) -> Receiver<String> {
    let (sender, receiver) = channel::unbounded();
    thread::spawn(move || {
        let stdin = io::stdin();
        for line in stdin.lock().lines() {
            let line = match line {
                Ok(line) => line,
                Err(e) => {
                    log::warn!("Error reading input: {e}");
                    break;
                }
            };
            if line.trim() == "stop" {
                stop_flag.store(true, Ordering::Relaxed);
            }
            let quit = line.trim() == "quit";
            if sender.send(line).is_err() || quit {
                break;
            }
        }
    });
    receiver
}

/// Run the UCI engine with the default configuration
pub fn run_uci_engine() {
    run_uci_engine_with_config(EngineConfig::default());
}

/// Run the UCI engine with a resolved configuration
pub fn run_uci_engine_with_config(config: EngineConfig) {
    let mut engine = UCIEngine::with_config(config);
    engine.run();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pattern_store::PatternStore;

    fn uci() -> UCIEngine {
        let config = EngineConfig::deterministic(5);
        UCIEngine::with_config(config.clone())
            .with_engine(StyleEngine::with_store(config, PatternStore::neutral()))
    }

    #[test]
    fn test_uci_initialization() {
        let engine = uci();
        assert_eq!(engine.state().ply_index(), 0);
        assert!(!engine.debug);
    }

    #[test]
    fn test_uci_command() {
        let mut engine = uci();
        let response = engine.process_command("uci");
        assert!(response.starts_with("id name Style Engine\n"));
        assert!(response.contains("option name Jitter type spin default 0 min 0 max 20"));
        assert!(response.contains("option name SafetyFilter type check default true"));
        assert!(response.contains("option name Seed type spin default 5"));
        assert!(response.ends_with("uciok"));
    }

    #[test]
    fn test_isready_command() {
        let mut engine = uci();
        assert_eq!(engine.process_command("isready"), "readyok");
    }

    #[test]
    fn test_position_startpos_with_moves() {
        let mut engine = uci();
        engine.process_command("position startpos moves e2e4 e7e5");
        assert_eq!(engine.state().ply_index(), 2);
        assert_eq!(engine.state().fullmove_number(), 2);
    }

    #[test]
    fn test_position_fen() {
        let mut engine = uci();
        engine.process_command("position fen 4k3/8/8/8/8/8/4P3/4K3 b - - 0 7 moves e8d7");
        assert_eq!(engine.state().fullmove_number(), 8);
    }

    #[test]
    fn test_invalid_move_keeps_last_valid_state() {
        let mut engine = uci();
        engine.process_command("debug on");
        let response = engine.process_command("position startpos moves e2e4 e2e4 d7d5");
        assert!(response.starts_with("info string"));
        assert_eq!(engine.state().ply_index(), 1);
    }

    #[test]
    fn test_invalid_fen_keeps_previous_state() {
        let mut engine = uci();
        engine.process_command("position startpos moves d2d4");
        assert_eq!(engine.process_command("position fen not/a/fen w - - 0 1"), "");
        assert_eq!(engine.state().ply_index(), 1);
    }

    #[test]
    fn test_setoption() {
        let mut engine = uci();
        engine.process_command("setoption name Jitter value 10");
        assert_eq!(engine.engine().config().jitter, 0.1);
        engine.process_command("setoption name Jitter value 50");
        assert_eq!(engine.engine().config().jitter, 0.1);
        engine.process_command("setoption name safetyfilter value false");
        assert!(!engine.engine().config().safety_filter);
        engine.process_command("setoption name PatternFile value /tmp/other patterns.json");
        assert!(!engine.engine().is_store_loaded());
        assert_eq!(
            engine.engine().config().pattern_store_path,
            std::path::PathBuf::from("/tmp/other patterns.json")
        );
    }

    #[test]
    fn test_ucinewgame_resets_position() {
        let mut engine = uci();
        engine.process_command("position startpos moves e2e4");
        engine.process_command("ucinewgame");
        assert_eq!(engine.state().ply_index(), 0);
    }

    #[test]
    fn test_unknown_command_ignored() {
        let mut engine = uci();
        assert_eq!(engine.process_command("xyzzy 42"), "");
    }

    #[test]
    fn test_go_writes_one_bestmove() {
        let mut engine = uci();
        let (sender, receiver) = channel::unbounded();
        for line in ["position startpos", "go movetime 20", "quit"] {
            sender.send(line.to_string()).unwrap();
        }
        let mut out = Vec::new();
        engine.run_with(receiver, &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert_eq!(text.lines().filter(|l| l.starts_with("bestmove")).count(), 1);
    }
}
