//! Pattern-matching kernels for pre-parsed symbolic music.
//!
//! A [`Song`](song::Song) holds one piece of music in a packed columnar layout
//! (chords, per-chord interval bitmaps, per-track pitch arrays). A [`Pattern`](pattern::Pattern)
//! is a short query. Each kernel module implements one matching semantics
//! (exact, transposition-invariant, geometric, edit-distance) as a pure
//! `(song, init_info) -> Vec<Match>` function pair; none of them mutate the song.

pub mod cartesian;
pub mod check;
pub mod dynprog;
pub mod geometric;
pub mod histogram;
pub mod lcts;
pub mod match_record;
pub mod monopoly;
pub mod pattern;
pub mod pq_onset;
pub mod pq_translation;
pub mod shiftorand;
pub mod song;
pub mod splitting;
pub mod tree;

pub use match_record::{Match, MatchExtras};
pub use pattern::{Note, Pattern};
pub use song::{PreprocessedItem, Song, TimeSignature, TurningPoint};

/// Number of pitch classes in a chromatic octave.
pub const VOCSIZE: usize = 12;
/// Byte size of one packed note record (`pitch: i8, duration: u16, track_id: u8`).
pub const NOTELEN: usize = 4;
/// Byte size of one chord header (`chord_len: u8, onset: u32`).
pub const CHORDHEADERLEN: usize = 5;
/// Byte size of one `preprocessed` item (`chord_offset: u32, interval_bitmap: u16`).
pub const PP_ITEM_SIZE: usize = 6;
/// Pattern onsets are expressed in this many units per quarter note before rescaling.
pub const PNOTERESOLUTION: u32 = 960;
/// Hard cap on notes in a query pattern.
pub const MAX_PATTERN_NOTES: usize = 40;
/// Bit-parallel kernels (ShiftOrAnd, MonoPoly, IntervalMatching) pack one pattern
/// position per bit of a machine word; this is the word width used.
pub const MAX_BITPARALLEL_PATTERN: usize = 32;
/// Range of transpositions considered by LCTS and Splitting, centered at zero.
pub const MAX_TRANSPOSITION: usize = 256;
/// Sentinel marking "no note on this track in this chord".
pub const GAP_UNSIGNED: u8 = 0xFF;
/// Gap marker used in LCTS alignment traces.
pub const LCTS_ALIGN_GAP: i16 = -2;

/// Errors from pattern/song construction. Kernels themselves never fail: an
/// oversized or empty input just yields an empty match list (see module docs).
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("pattern has {0} notes, exceeds MAX_PATTERN_NOTES ({MAX_PATTERN_NOTES})")]
    OversizedPattern(usize),
    #[error("pattern has {0} notes, exceeds the bit-parallel word width ({MAX_BITPARALLEL_PATTERN})")]
    OversizedBitParallelPattern(usize),
    #[error("song has no chords")]
    EmptySource,
    #[error("chord byte offset overflowed u32 at chord {0}")]
    PreprocessOverflow(u32),
    #[error("invalid chord index {0}")]
    InvalidChordIndex(u32),
}

pub type Result<T> = std::result::Result<T, Error>;
