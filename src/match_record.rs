//! The shared result type every kernel emits.

use serde::{Deserialize, Serialize};

/// Kernel-specific payload riding alongside a [`Match`]. Most kernels have
/// nothing extra to report; the geometric and edit-distance kernels attach
/// the data their callers need to render or replay the match.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum MatchExtras {
    None,
    /// Geometric P2/P3: the translation vector `(dx, dy)` applied to the
    /// pattern to align it with the song.
    Translation { dx: i64, dy: i8 },
    /// LCTS: the edit trace aligning pattern notes to song notes, one entry
    /// per alignment column (`Some(song_note_index)` or `None` for a gap).
    AlignmentTrace(Vec<Option<u32>>),
    /// Splitting: the per-pattern-note track assignment chosen for this match.
    TrackAssignment(Vec<u8>),
}

/// One occurrence of a pattern in a song, as reported by a kernel's scan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Match {
    pub first_chord: u32,
    pub last_chord: u32,
    /// Byte offsets into `chords` of each matched pattern note, one per
    /// pattern note in order, where the kernel can recover them. Kernels
    /// that only prove a filter window (e.g. P3's approximate chord range)
    /// leave this `None`.
    pub matched_notes: Option<Vec<u32>>,
    /// Semitone transposition applied to the pattern to produce this match
    /// (0 for kernels that are not transposition-invariant).
    pub transposition: i32,
    /// Edit distance / error count for approximate kernels (0 for exact ones).
    pub errors: u32,
    pub extras: MatchExtras,
}
