//! C10: LCTS, transposition-invariant edit distance restricted to insertions
//! and deletions (no substitutions), via Makinen & Ukkonen's O(mn log m)
//! sparse dynamic program. [`lcts_distance`] compares two pitch sequences
//! directly; [`lcts_scan`] searches a pattern against every track of a song
//! and reconstructs the alignment of each occurrence under its error bound.
//!
//! The DP buckets candidate note-pairs by the transposition they'd imply
//! (`b[j] - a[i] + 128`), then for each bucket runs a 1-D range-minimum
//! sweep over [`crate::tree::IndexedTree`] to get the bucket's transposed
//! edit distance in `O(|bucket| log m)`.

use crate::pattern::Pattern;
use crate::song::Song;
use crate::tree::IndexedTree;
use crate::{Match, MatchExtras, Result, GAP_UNSIGNED, MAX_TRANSPOSITION, NOTELEN};

/// `(chord_position, song_position)`, 1-indexed as in the source algorithm;
/// index 0 is reserved for the sentinel "nothing matched yet" leaf.
type MatchPair = (u32, u32);

fn tree_leaves(m: usize) -> usize {
    (m + 2).next_power_of_two().max(2)
}

/// Buckets every `(i, j)` pair with `a[i-1]` transposable to `b[j-1]` by the
/// implied transposition, scanning columns left to right and rows bottom to
/// top within a column (mirroring the source's list-construction order,
/// which the sparse sweep depends on). Every bucket gets a trailing
/// `(m+1, n+1)` sentinel used to read off the final distance / anchor the
/// last column.
fn build_match_lists(a: &[i8], b: &[i8]) -> Vec<Vec<MatchPair>> {
    let m = a.len();
    let n = b.len();
    let mut buckets: Vec<Vec<MatchPair>> = vec![Vec::new(); MAX_TRANSPOSITION];
    for j in 1..=n {
        for i in (1..=m).rev() {
            let t = b[j - 1] as i32 - a[i - 1] as i32 + MAX_TRANSPOSITION as i32 / 2;
            if (0..MAX_TRANSPOSITION as i32).contains(&t) {
                buckets[t as usize].push((i as u32, j as u32));
            }
        }
    }
    for bucket in &mut buckets {
        bucket.push((m as u32 + 1, n as u32 + 1));
    }
    buckets
}

/// `d_ID(A+t, B) = m + n - 2*LCS(A+t, B)` for one transposition bucket.
fn process_sparse_fast(m: usize, n: usize, matches: &[MatchPair]) -> i32 {
    let leaves = tree_leaves(m);
    let mut tree = IndexedTree::new(leaves);
    let mut values = vec![i32::MAX; m + 2];
    values[0] = 0;
    tree.insert(0);

    for &(mi, _mj) in matches {
        let i = tree.predecessor(mi as usize);
        tree.insert(mi as usize);
        if values[i] - 2 < values[mi as usize] {
            values[mi as usize] = values[i] - 2;
            tree.delete_greater_successors(mi as usize, &values);
        }
    }
    values[m + 1] + m as i32 + n as i32 + 2
}

/// Compares two pitch sequences directly, returning the minimum edit
/// distance over every transposition `-128..128`.
pub fn lcts_distance(a: &[i8], b: &[i8]) -> i32 {
    if a.is_empty() || b.is_empty() {
        return (a.len() + b.len()) as i32;
    }
    let buckets = build_match_lists(a, b);
    buckets
        .iter()
        .filter(|bucket| bucket.len() > 1)
        .map(|bucket| process_sparse_fast(a.len(), b.len(), bucket))
        .min()
        .unwrap_or((a.len() + b.len()) as i32)
}

#[derive(Debug, Clone, Copy)]
struct Occurrence {
    value: i32,
    t: i32,
}

/// Updates `occ[1..=n]` with the cheapest occurrence ending at each position
/// under transposition `t`, for occurrences scoring at most `k`.
fn search_occurrences(m: usize, k: i32, t: i32, matches: &[MatchPair], occ: &mut [Occurrence]) {
    let leaves = tree_leaves(m);
    let mut tree = IndexedTree::new(leaves);
    let mut values = vec![i32::MAX; m + 2];
    values[0] = 0;
    tree.insert(0);

    // the trailing (m+1, n+1) sentinel is only used for the distance read in
    // process_sparse_fast; the search variant never needs it.
    for &(mi, mj) in &matches[..matches.len().saturating_sub(1)] {
        let i = tree.predecessor(mi as usize);
        let d = (values[i] - 2).min(-(mj as i32) - 1);
        tree.insert(mi as usize);
        if d < values[mi as usize] {
            values[mi as usize] = d;
            tree.delete_greater_successors(mi as usize, &values);
        }
        let value = d + mj as i32 + m as i32;
        if value <= k && value < occ[mj as usize].value {
            occ[mj as usize] = Occurrence { value, t };
        }
    }
}

pub struct LctsInit {
    pattern: Vec<i8>,
    errors: u32,
}

/// `errors` is the maximum insert+delete cost (each costs 1) an occurrence
/// may have to be reported.
pub fn lcts_init(pattern: &Pattern, errors: u32) -> Result<LctsInit> {
    pattern.validate()?;
    let pattern = pattern.monophonic().iter().map(|n| n.pitch).collect();
    Ok(LctsInit { pattern, errors })
}

fn note_offset_for(song: &Song, chord_index: u32, track_id: u8, pitch: i8) -> u32 {
    let chord_offset = song.chord_offset(chord_index).expect("chord index from track array is in range");
    let chordlen = song.chord_len(chord_offset) as u32;
    for k in 0..chordlen {
        let note_offset = Song::first_note_offset(chord_offset) + k * NOTELEN as u32;
        let note = song.note_at(note_offset);
        if note.track_id == track_id && note.pitch == pitch {
            return note_offset;
        }
    }
    Song::first_note_offset(chord_offset)
}

/// Restricted Needleman-Wunsch (insertions/deletions only, mismatch cost 3)
/// between pattern pitches `a` and a windowed, gap-compacted run of one
/// track's notes `b` (paired with each note's byte offset), under
/// transposition `t`. Returns the error count, the alignment trace on the
/// `b` side (`Some(offset)` where a song note survives in the alignment,
/// `None` where the pattern note has no counterpart), and the column at
/// which the optimal alignment starts within `b`.
fn align(a: &[i8], b: &[(i8, u32)], t: i32) -> (i32, Vec<Option<u32>>, usize) {
    let m = a.len();
    let n = b.len();
    let mut cost = vec![vec![0i32; n + 1]; m + 1];
    let mut from_diag = vec![vec![0u8; n + 1]; m + 1]; // 0 = diag, 1 = left, 2 = up
    for i in 0..=m {
        cost[i][0] = i as i32;
        from_diag[i][0] = 2;
    }
    for j in 0..=n {
        cost[0][j] = 0;
    }

    for i in 1..=m {
        for j in 1..=n {
            let diag = if a[i - 1] as i32 + t == b[j - 1].0 as i32 {
                cost[i - 1][j - 1]
            } else {
                cost[i - 1][j - 1] + 3
            };
            if diag <= cost[i][j - 1] + 1 && diag <= cost[i - 1][j] + 1 {
                from_diag[i][j] = 0;
                cost[i][j] = diag;
            } else if cost[i][j - 1] + 1 <= cost[i - 1][j] + 1 {
                from_diag[i][j] = 1;
                cost[i][j] = cost[i][j - 1] + 1;
            } else {
                from_diag[i][j] = 2;
                cost[i][j] = cost[i - 1][j] + 1;
            }
        }
    }

    let mut trace = Vec::new();
    let (mut i, mut j) = (m, n);
    while i > 0 {
        match from_diag[i][j] {
            0 => {
                trace.push(Some(b[j - 1].1));
                i -= 1;
                j -= 1;
            }
            1 => {
                trace.push(Some(b[j - 1].1));
                j -= 1;
            }
            _ => {
                trace.push(None);
                i -= 1;
            }
        }
    }
    trace.reverse();
    (cost[m][n], trace, j)
}

/// Searches every track of `song` for approximate transposed occurrences of
/// the pattern, reporting one match per chord where the best occurrence
/// ending there strictly improves on the one ending at the previous chord
/// (the source's "minimal occurrence" rule: dominated occurrences, i.e.
/// ones a cheaper later occurrence already covers, are not reported).
pub fn lcts_scan(song: &Song, init: &LctsInit) -> Vec<Match> {
    tracing::debug!(pattern_size = init.pattern.len(), errors = init.errors, "lcts scan");
    let pattern_size = init.pattern.len();
    if pattern_size == 0 || pattern_size as u32 > song.num_chords {
        return Vec::new();
    }

    let mut matches = Vec::new();
    for (track_id, track_pitches) in song.tracks.iter().enumerate() {
        let mut compact: Vec<(i8, u32)> = Vec::new();
        for (chord_index, &p) in track_pitches.iter().enumerate() {
            if p != GAP_UNSIGNED {
                compact.push((p as i8, chord_index as u32));
            }
        }
        let tracklen = compact.len();
        if tracklen == 0 {
            continue;
        }

        let compact_pitches: Vec<i8> = compact.iter().map(|&(p, _)| p).collect();
        let buckets = build_match_lists(&init.pattern, &compact_pitches);
        let mut occ = vec![Occurrence { value: i32::MAX, t: 0 }; tracklen + 1];
        for (t_index, bucket) in buckets.iter().enumerate() {
            if bucket.len() <= 1 {
                continue;
            }
            let t = t_index as i32 - MAX_TRANSPOSITION as i32 / 2;
            search_occurrences(pattern_size, init.errors as i32, t, bucket, &mut occ);
        }

        let mut prev_value = i32::MAX;
        for chordind in 1..=tracklen {
            let cur = occ[chordind];
            if cur.value <= init.errors as i32 && cur.value < prev_value {
                let window_start = chordind.saturating_sub(pattern_size + init.errors as usize);
                let window: Vec<(i8, u32)> = compact[window_start..chordind]
                    .iter()
                    .map(|&(p, chord_index)| {
                        (p, note_offset_for(song, chord_index, track_id as u8, p))
                    })
                    .collect();
                let (errors, trace, start_in_window) = align(&init.pattern, &window, cur.t);
                let first_chord = compact[window_start + start_in_window].1;
                let last_chord = compact[chordind - 1].1;
                matches.push(Match {
                    first_chord,
                    last_chord,
                    matched_notes: None,
                    transposition: cur.t,
                    errors: errors as u32,
                    extras: MatchExtras::AlignmentTrace(trace),
                });
            }
            prev_value = cur.value;
        }
    }
    matches
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pattern::Note as PatNote;
    use crate::song::{ChordInput, Note as SongNote};

    fn song_chord(onset: u32, pitches: &[i8]) -> ChordInput {
        ChordInput {
            onset,
            notes: pitches
                .iter()
                .map(|&pitch| SongNote {
                    pitch,
                    duration: 480,
                    track_id: 0,
                })
                .collect(),
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
    fn distance_is_zero_for_identical_sequences() {
        assert_eq!(lcts_distance(&[60, 62, 64], &[60, 62, 64]), 0);
    }

    #[test]
    fn distance_counts_one_insertion_and_one_deletion() {
        // a=[60,62,64], b=[60,64] -> delete 62 from a (cost 1), or equivalently
        // b has one fewer note: d_ID = 1 (1 deletion).
        assert_eq!(lcts_distance(&[60, 62, 64], &[60, 64]), 1);
    }

    #[test]
    fn distance_is_transposition_invariant() {
        let a = [60, 62, 64];
        let b: Vec<i8> = a.iter().map(|&p| p + 5).collect();
        assert_eq!(lcts_distance(&a, &b), 0);
    }

    #[test]
    fn scan_finds_exact_occurrence_with_zero_errors() {
        let song = Song::build(
            vec![
                song_chord(0, &[60]),
                song_chord(480, &[62]),
                song_chord(960, &[64]),
            ],
            480,
            vec![],
        )
        .unwrap();
        let pattern = Pattern::new(vec![pat(0, 60), pat(480, 62), pat(960, 64)]);
        let init = lcts_init(&pattern, 0).unwrap();
        let matches = lcts_scan(&song, &init);
        assert!(matches.iter().any(|m| m.errors == 0 && m.transposition == 0));
    }

    #[test]
    fn scan_tolerates_one_error() {
        let song = Song::build(
            vec![song_chord(0, &[60]), song_chord(480, &[64])],
            480,
            vec![],
        )
        .unwrap();
        let pattern = Pattern::new(vec![pat(0, 60), pat(480, 62), pat(960, 64)]);
        let init = lcts_init(&pattern, 1).unwrap();
        let matches = lcts_scan(&song, &init);
        assert!(matches.iter().any(|m| m.errors <= 1));
    }
}
