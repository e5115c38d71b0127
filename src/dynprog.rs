//! C12: naive transposition-invariant weighted edit distance, used as a
//! reference oracle against the bit-parallel and geometric kernels rather
//! than as a primary search path. Implements the edit-distance recurrence
//! of Lemstrom & Navarro's equation (2): substitution costs `|a - b - t|`
//! (the pitch difference under transposition `t`), insertion/deletion
//! cost a flat 1.
//!
//! Runs the full O(pattern_notes) column DP independently for every
//! `(track, transposition)` pair and keeps only the single
//! globally-cheapest alignment, exactly as the source does — this module
//! is a correctness cross-check, not a match-enumeration kernel.

use crate::pattern::Pattern;
use crate::song::Song;
use crate::{Match, MatchExtras, Result};

/// Indel cost. Mirrors the source's `ID` constant.
const ID: i32 = 1;
/// Size of the MIDI pitch vocabulary; transpositions range over `-sigma+1..sigma`.
const SIGMA: i32 = 128;

pub struct DynprogInit {
    pattern: Vec<i8>,
    errors: u32,
}

pub fn dynprog_init(pattern: &Pattern, errors: u32) -> Result<DynprogInit> {
    pattern.validate()?;
    let pattern = pattern.monophonic().iter().map(|n| n.pitch).collect();
    Ok(DynprogInit { pattern, errors })
}

/// Returns the single cheapest alignment across every track and
/// transposition, or an empty vec if it exceeds `errors`.
pub fn dynprog_scan(song: &Song, init: &DynprogInit) -> Vec<Match> {
    tracing::debug!(pattern_size = init.pattern.len(), "dynprog scan (reference oracle)");
    let pattern_size = init.pattern.len();
    if pattern_size == 0 || pattern_size as u32 > song.num_chords {
        return Vec::new();
    }
    let num_chords = song.num_chords as usize;

    let mut min_distance = i32::MAX;
    let mut min_chord_index = 0u32;
    let mut min_tp = 0i32;

    let mut old_column = vec![0i32; pattern_size + 1];
    let mut column = vec![0i32; pattern_size + 1];

    for track in &song.tracks {
        for tp in (-SIGMA + 1)..SIGMA {
            for (i, slot) in old_column.iter_mut().enumerate() {
                *slot = i as i32 * ID;
            }
            column[0] = 0;

            for (j, &text_pitch) in track.iter().enumerate().take(num_chords) {
                column[0] = j as i32 * ID;
                let text_pitch = text_pitch as i8 as i32; // GAP_UNSIGNED (0xFF) reads back as -1

                for i in 0..pattern_size {
                    let ip = i + 1;
                    let sub = (text_pitch - init.pattern[i] as i32 - tp).abs() + old_column[i];
                    let delete = ID + column[i];
                    let insert = ID + old_column[ip];
                    column[ip] = sub.min(delete).min(insert);
                }

                if column[pattern_size] <= min_distance {
                    min_distance = column[pattern_size];
                    min_chord_index = j as u32;
                    min_tp = tp;
                }

                std::mem::swap(&mut old_column, &mut column);
            }
        }
    }

    if min_distance > init.errors as i32 {
        return Vec::new();
    }

    let first_chord = min_chord_index.saturating_sub(pattern_size as u32 - 1);
    vec![Match {
        first_chord,
        last_chord: min_chord_index,
        matched_notes: None,
        transposition: min_tp,
        errors: min_distance as u32,
        extras: MatchExtras::None,
    }]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pattern::Note as PatNote;
    use crate::song::{ChordInput, Note as SongNote};

    fn chord(onset: u32, pitch: i8) -> ChordInput {
        ChordInput {
            onset,
            notes: vec![SongNote {
                pitch,
                duration: 480,
                track_id: 0,
            }],
        }
    }

    fn pat(onset: u32, pitch: i8) -> PatNote {
        PatNote {
            onset,
            pitch,
            duration: 480,
        }
    }

    #[test]
    fn finds_exact_occurrence_with_zero_distance() {
        let song = Song::build(
            vec![chord(0, 60), chord(480, 62), chord(960, 64)],
            480,
            vec![],
        )
        .unwrap();
        let pattern = Pattern::new(vec![pat(0, 60), pat(480, 62), pat(960, 64)]);
        let init = dynprog_init(&pattern, 0).unwrap();
        let matches = dynprog_scan(&song, &init);
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].errors, 0);
        assert_eq!(matches[0].first_chord, 0);
        assert_eq!(matches[0].last_chord, 2);
    }

    #[test]
    fn finds_transposed_occurrence() {
        let song = Song::build(
            vec![chord(0, 65), chord(480, 67), chord(960, 69)],
            480,
            vec![],
        )
        .unwrap();
        let pattern = Pattern::new(vec![pat(0, 60), pat(480, 62), pat(960, 64)]);
        let init = dynprog_init(&pattern, 0).unwrap();
        let matches = dynprog_scan(&song, &init);
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].errors, 0);
        assert_eq!(matches[0].transposition, 5);
    }

    #[test]
    fn too_many_edits_yields_no_match() {
        let song = Song::build(
            vec![chord(0, 10), chord(480, 90), chord(960, 30)],
            480,
            vec![],
        )
        .unwrap();
        let pattern = Pattern::new(vec![pat(0, 60), pat(480, 62), pat(960, 64)]);
        let init = dynprog_init(&pattern, 1).unwrap();
        let matches = dynprog_scan(&song, &init);
        assert!(matches.is_empty());
    }
}
