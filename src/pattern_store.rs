//! The compressed, versioned pattern database consumed at runtime.
//!
//! A store is built once by the extraction pipeline, written as JSON and then
//! loaded wholesale. Nothing mutates it after loading, so it is shared by
//! reference (or `Arc`) across scoring calls.

use chess::{Board, Color, Piece};
use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::fs;
use std::marker::PhantomData;
use std::path::Path;

use crate::errors::{ChessEngineError, Result};

/// Format version written into `metadata.version`.
pub const FORMAT_VERSION: &str = "3.0.0";

/// Maximum number of opening entries kept by compression.
pub const OPENING_TABLE_CAP: usize = 500;

/// Maximum number of endgame signatures kept by compression.
pub const ENDGAME_TABLE_CAP: usize = 50;

/// Round to the three decimals the store is written with.
pub fn round3(value: f64) -> f64 {
    (value * 1000.0).round() / 1000.0
}

/// A string-keyed table that remembers entry order.
///
/// Serialized as a JSON object whose key order is the table order; lookups go
/// through a side index.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderedTable<V> {
    entries: Vec<(String, V)>,
    index: HashMap<String, usize>,
}

impl<V> Default for OrderedTable<V> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
            index: HashMap::new(),
        }
    }
}

impl<V> OrderedTable<V> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace; a replaced key keeps its position.
    pub fn insert(&mut self, key: String, value: V) {
        match self.index.get(&key) {
            Some(&idx) => self.entries[idx].1 = value,
            None => {
                self.index.insert(key.clone(), self.entries.len());
                self.entries.push((key, value));
            }
        }
    }

    pub fn get(&self, key: &str) -> Option<&V> {
        self.index.get(key).map(|&idx| &self.entries[idx].1)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &V)> {
        self.entries.iter().map(|(key, value)| (key.as_str(), value))
    }

    /// Stable sort by `key_fn` descending, then truncate to `cap`.
    pub fn sort_desc_and_truncate<F>(&mut self, cap: usize, key_fn: F)
    where
        F: Fn(&V) -> f64,
    {
        self.entries.sort_by(|a, b| {
            key_fn(&b.1)
                .partial_cmp(&key_fn(&a.1))
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        self.entries.truncate(cap);
        self.reindex();
    }

    fn reindex(&mut self) {
        self.index = self
            .entries
            .iter()
            .enumerate()
            .map(|(idx, (key, _))| (key.clone(), idx))
            .collect();
    }
}

impl<V: Serialize> Serialize for OrderedTable<V> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (key, value) in &self.entries {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

struct OrderedTableVisitor<V>(PhantomData<V>);

impl<'de, V: Deserialize<'de>> Visitor<'de> for OrderedTableVisitor<V> {
    type Value = OrderedTable<V>;

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        formatter.write_str("a map of pattern entries")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> std::result::Result<Self::Value, A::Error> {
        let mut table = OrderedTable::new();
        while let Some((key, value)) = access.next_entry::<String, V>()? {
            table.insert(key, value);
        }
        Ok(table)
    }
}

impl<'de, V: Deserialize<'de>> Deserialize<'de> for OrderedTable<V> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        deserializer.deserialize_map(OrderedTableVisitor(PhantomData))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreMetadata {
    pub version: String,
    #[serde(default)]
    pub games_analyzed: u64,
    #[serde(default)]
    pub games_skipped: u64,
    #[serde(default)]
    pub positions_sampled: u64,
}

impl Default for StoreMetadata {
    fn default() -> Self {
        Self {
            version: FORMAT_VERSION.to_string(),
            games_analyzed: 0,
            games_skipped: 0,
            positions_sampled: 0,
        }
    }
}

/// Frequency and outcome of one move played at one ply.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OpeningStat {
    pub frequency: f64,
    pub success: f64,
    pub weight: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TacticalProfile {
    pub capture_frequency: f64,
    pub check_frequency: f64,
    pub development_frequency: f64,
    pub tactical_weight: f64,
}

impl Default for TacticalProfile {
    fn default() -> Self {
        Self {
            capture_frequency: 0.0,
            check_frequency: 0.0,
            development_frequency: 0.0,
            tactical_weight: 1.5,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PositionalProfile {
    pub center_importance: f64,
    pub castling_bonus: f64,
    pub development_bonus: f64,
}

impl Default for PositionalProfile {
    fn default() -> Self {
        Self {
            center_importance: 0.1,
            castling_bonus: 0.3,
            development_bonus: 0.2,
        }
    }
}

/// Per-piece move counts for one piece symbol.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PieceUsage {
    pub total_moves: u64,
    pub opening: u64,
    pub middlegame: u64,
    pub endgame: u64,
    pub attack_moves: u64,
    pub defense_moves: u64,
}

impl PieceUsage {
    pub fn in_phase(&self, phase: crate::phase::GamePhase) -> u64 {
        match phase {
            crate::phase::GamePhase::Opening => self.opening,
            crate::phase::GamePhase::Middlegame => self.middlegame,
            crate::phase::GamePhase::Endgame => self.endgame,
        }
    }

    pub fn merge(&mut self, other: &PieceUsage) {
        self.total_moves += other.total_moves;
        self.opening += other.opening;
        self.middlegame += other.middlegame;
        self.endgame += other.endgame;
        self.attack_moves += other.attack_moves;
        self.defense_moves += other.defense_moves;
    }
}

/// Piece-usage and destination-square counts, keyed by piece symbol
/// (`N` white knight, `n` black knight, ...).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StyleProfile {
    #[serde(default)]
    pub piece_usage: BTreeMap<String, PieceUsage>,
    #[serde(default)]
    pub square_heatmap: BTreeMap<String, BTreeMap<String, u64>>,
}

impl StyleProfile {
    pub fn is_empty(&self) -> bool {
        self.piece_usage.is_empty() && self.square_heatmap.is_empty()
    }

    pub fn merge(&mut self, other: &StyleProfile) {
        for (symbol, usage) in &other.piece_usage {
            self.piece_usage.entry(symbol.clone()).or_default().merge(usage);
        }
        for (symbol, squares) in &other.square_heatmap {
            let heatmap = self.square_heatmap.entry(symbol.clone()).or_default();
            for (square, count) in squares {
                *heatmap.entry(square.clone()).or_insert(0) += count;
            }
        }
    }
}

/// Piece symbol in FEN convention: uppercase for White.
pub fn piece_symbol(piece: Piece, color: Color) -> String {
    let letter = match piece {
        Piece::Pawn => "p",
        Piece::Knight => "n",
        Piece::Bishop => "b",
        Piece::Rook => "r",
        Piece::Queen => "q",
        Piece::King => "k",
    };
    match color {
        Color::White => letter.to_uppercase(),
        Color::Black => letter.to_string(),
    }
}

/// Canonical material signature: `<white>v<black>_<typeIndex>` per present piece type,
/// ordered Q(5) R(4) B(3) N(2) P(1), first three types only, joined by `_`.
///
/// Truncation means different endgames can share a signature (e.g. extra pawns
/// are invisible once three heavier types are present). Lengthening it would
/// change which signatures survive compression, so it stays as is.
pub fn material_signature(board: &Board) -> String {
    const ORDER: [(Piece, u8); 5] = [
        (Piece::Queen, 5),
        (Piece::Rook, 4),
        (Piece::Bishop, 3),
        (Piece::Knight, 2),
        (Piece::Pawn, 1),
    ];
    let white = *board.color_combined(Color::White);
    let black = *board.color_combined(Color::Black);

    ORDER
        .iter()
        .filter_map(|&(piece, idx)| {
            let pieces = *board.pieces(piece);
            let w = (pieces & white).popcnt();
            let b = (pieces & black).popcnt();
            if w == 0 && b == 0 {
                None
            } else {
                Some(format!("{w}v{b}_{idx}"))
            }
        })
        .take(3)
        .collect::<Vec<_>>()
        .join("_")
}

/// Key used by the opening table: `<ply>_<SAN>`, ply zero-based.
pub fn opening_key(ply: u32, san: &str) -> String {
    format!("{ply}_{san}")
}

/// Split an opening key back into ply and SAN.
pub fn parse_opening_key(key: &str) -> Option<(u32, &str)> {
    let (ply, san) = key.split_once('_')?;
    Some((ply.parse().ok()?, san))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternStore {
    pub metadata: StoreMetadata,
    #[serde(default)]
    pub opening: OrderedTable<OpeningStat>,
    #[serde(default)]
    pub tactical: TacticalProfile,
    #[serde(default)]
    pub positional: PositionalProfile,
    #[serde(default)]
    pub endgame: OrderedTable<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub style: Option<StyleProfile>,
}

impl Default for PatternStore {
    fn default() -> Self {
        Self::neutral()
    }
}

impl PatternStore {
    /// Store with empty tables and default profiles; every lookup falls back
    /// to its neutral value.
    pub fn neutral() -> Self {
        Self {
            metadata: StoreMetadata::default(),
            opening: OrderedTable::new(),
            tactical: TacticalProfile::default(),
            positional: PositionalProfile::default(),
            endgame: OrderedTable::new(),
            style: None,
        }
    }

    pub fn is_neutral(&self) -> bool {
        self.opening.is_empty() && self.endgame.is_empty() && self.style.is_none()
    }

    pub fn from_json_str(text: &str) -> Result<Self> {
        let mut store: PatternStore = serde_json::from_str(text)?;
        store.check_version()?;
        store.normalize();
        Ok(store)
    }

    pub fn to_json_string(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = fs::read_to_string(path.as_ref())?;
        let store = Self::from_json_str(&text)?;
        log::info!(
            "Loaded pattern store {} ({} openings, {} endgame signatures, {} games)",
            path.as_ref().display(),
            store.opening.len(),
            store.endgame.len(),
            store.metadata.games_analyzed
        );
        Ok(store)
    }

    /// Load, or fall back to the neutral store if the file is missing or unusable.
    pub fn load_or_neutral<P: AsRef<Path>>(path: P) -> Self {
        match Self::load(path.as_ref()) {
            Ok(store) => store,
            Err(e) => {
                log::warn!(
                    "Pattern store {} unavailable ({}), scoring with neutral defaults",
                    path.as_ref().display(),
                    e
                );
                Self::neutral()
            }
        }
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        if let Some(parent) = path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        fs::write(path.as_ref(), self.to_json_string()?)?;
        Ok(())
    }

    fn check_version(&self) -> Result<()> {
        let major = |version: &str| version.split('.').next().map(str::to_string);
        if major(&self.metadata.version) != major(FORMAT_VERSION) {
            return Err(ChessEngineError::IncompatibleStore {
                found: self.metadata.version.clone(),
                expected: FORMAT_VERSION.to_string(),
            });
        }
        Ok(())
    }

    /// Restore the build-time ordering and caps, whatever order the file used.
    fn normalize(&mut self) {
        self.opening
            .sort_desc_and_truncate(OPENING_TABLE_CAP, |stat| stat.weight);
        self.endgame.sort_desc_and_truncate(ENDGAME_TABLE_CAP, |rate| *rate);
    }

    pub fn opening_stat(&self, ply: u32, san: &str) -> Option<&OpeningStat> {
        self.opening.get(&opening_key(ply, san))
    }

    /// Entries recorded at `ply`, highest weight first.
    pub fn openings_at_ply(&self, ply: u32) -> impl Iterator<Item = (&str, &OpeningStat)> {
        self.opening.iter().filter_map(move |(key, stat)| match parse_opening_key(key) {
            Some((entry_ply, san)) if entry_ply == ply => Some((san, stat)),
            _ => None,
        })
    }

    pub fn endgame_rate(&self, signature: &str) -> Option<f64> {
        self.endgame.get(signature).copied()
    }

    pub fn style(&self) -> Option<&StyleProfile> {
        self.style.as_ref().filter(|style| !style.is_empty())
    }
}
