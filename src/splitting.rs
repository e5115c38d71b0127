//! C11: minimum splitting of a pattern across multiple tracks (Lemstrom &
//! Makinen, CPM'03). The pattern may not occur whole on any single track,
//! but can be covered by `kappa` contiguous pieces, each found on some
//! track, consecutive pieces separated by at most an `alpha`-chord gap.
//! The goal is to minimize `kappa`.
//!
//! This only implements the transposition-invariant sweep
//! (`process_ti` in the source): bucket every `(pattern_index, chord,
//! track)` triple by the transposition it would imply, then run the
//! minimum-splitting DP independently within each bucket. A pure
//! same-track run of gap chords is free to cross (the "free gap-crossing"
//! rule below); anything else costs one extra piece, found via
//! [`crate::cartesian::SlidingWindowMin`] over the alpha-bounded window of
//! the previous row's cheapest pieces.
//!
//! Unlike the source wrapper (which only returns an accurate match count
//! when `songonce` is false — a documented bug there), [`splitting_scan`]
//! always returns every match; `songonce` just additionally restricts the
//! result to the single cheapest one.

use crate::cartesian::SlidingWindowMin;
use crate::pattern::Pattern;
use crate::song::Song;
use crate::{Match, MatchExtras, Result, GAP_UNSIGNED, MAX_TRANSPOSITION, NOTELEN};

pub struct SplittingInit {
    pattern: Vec<i8>,
    gap: u32,
    errors: u32,
    songonce: bool,
}

/// `gap` is the maximum number of chords a piece boundary may skip over;
/// `errors` is the maximum number of pieces (`kappa`) a reported match may
/// be split into.
pub fn splitting_init(pattern: &Pattern, gap: u32, errors: u32, songonce: bool) -> Result<SplittingInit> {
    pattern.validate()?;
    let pattern = pattern.monophonic().iter().map(|n| n.pitch).collect();
    Ok(SplittingInit {
        pattern,
        gap,
        errors,
        songonce,
    })
}

#[derive(Debug, Clone, Copy)]
struct Node {
    /// 1-indexed chord position.
    j: u32,
    /// 1-indexed track number.
    k: u8,
    kappa: u32,
    prev_trace: Option<(usize, usize)>,
}

/// `buckets[t][i]` holds every `(chord, track)` pair whose pitch would
/// align with pattern position `i` (1-indexed) under transposition
/// `t - 128`. Row 0 is unused (pattern rows are 1-indexed to match the
/// DP's row-to-row recurrence).
fn build_buckets(pattern: &[i8], tracks: &[Vec<u8>]) -> Vec<Vec<Vec<Node>>> {
    let m = pattern.len();
    let num_chords = tracks.first().map(Vec::len).unwrap_or(0);
    let mut buckets: Vec<Vec<Vec<Node>>> = vec![vec![Vec::new(); m + 1]; MAX_TRANSPOSITION];

    for (i, &pitch) in pattern.iter().enumerate() {
        let row = i + 1;
        let kappa0 = if row == 1 { 0 } else { u32::MAX };
        for j in 1..=num_chords {
            for (k, track) in tracks.iter().enumerate() {
                let text_pitch = track[j - 1];
                if text_pitch == GAP_UNSIGNED {
                    continue;
                }
                let t = text_pitch as i32 - pitch as i32 + MAX_TRANSPOSITION as i32 / 2;
                if !(0..MAX_TRANSPOSITION as i32).contains(&t) {
                    continue;
                }
                buckets[t as usize][row].push(Node {
                    j: j as u32,
                    k: (k + 1) as u8,
                    kappa: kappa0,
                    prev_trace: None,
                });
            }
        }
    }
    buckets
}

/// `gaps[k][j]` is the number of consecutive gap chords on track `k`
/// (1-indexed) ending at chord `j` (1-indexed), `0` if chord `j` itself
/// isn't a gap. Independent of pattern and transposition, computed once.
fn build_gap_counters(tracks: &[Vec<u8>]) -> Vec<Vec<u32>> {
    tracks
        .iter()
        .map(|track| {
            let mut gaps = vec![0u32; track.len() + 1];
            for j in 1..=track.len() {
                gaps[j] = if track[j - 1] == GAP_UNSIGNED {
                    gaps[j - 1] + 1
                } else {
                    0
                };
            }
            gaps
        })
        .collect()
}

fn note_offset_for(song: &Song, chord_index: u32, track_id: u8, pitch: i8) -> u32 {
    let chord_offset = song
        .chord_offset(chord_index)
        .expect("chord index from track array is in range");
    let chordlen = song.chord_len(chord_offset) as u32;
    for slot in 0..chordlen {
        let note_offset = Song::first_note_offset(chord_offset) + slot * NOTELEN as u32;
        let note = song.note_at(note_offset);
        if note.track_id == track_id && note.pitch == pitch {
            return note_offset;
        }
    }
    Song::first_note_offset(chord_offset)
}

/// Runs the per-transposition splitting DP over `tracks` and reports every
/// complete covering of the pattern (`row == m`) with at most `errors`
/// pieces.
pub fn splitting_scan(song: &Song, init: &SplittingInit) -> Vec<Match> {
    tracing::debug!(
        pattern_size = init.pattern.len(),
        gap = init.gap,
        errors = init.errors,
        songonce = init.songonce,
        "splitting scan"
    );
    let m = init.pattern.len();
    let num_tracks = song.tracks.len();
    if m == 0 || m as u32 > song.num_chords || num_tracks == 0 {
        return Vec::new();
    }

    let mut buckets = build_buckets(&init.pattern, &song.tracks);
    let gap_counters = build_gap_counters(&song.tracks);
    let mut matches = Vec::new();

    for rows in buckets.iter_mut() {
        if rows[1..=m].iter().all(Vec::is_empty) {
            continue;
        }

        for i in 2..=m {
            let mut track: Vec<Option<(usize, usize)>> = vec![None; num_tracks + 1];
            let mut window = SlidingWindowMin::new();
            let mut ptr = 0usize;
            let prev_len = rows[i - 1].len();

            for idx2 in 0..rows[i].len() {
                let j2 = rows[i][idx2].j;

                while ptr < prev_len && rows[i - 1][ptr].j < j2 {
                    let prev = rows[i - 1][ptr];
                    window.push(prev.kappa as i32, ptr as i64);
                    track[prev.k as usize] = Some((i - 1, ptr));
                    ptr += 1;
                }
                while let Some(first_key) = window.first_key() {
                    let evicted_j = rows[i - 1][first_key as usize].j;
                    if (evicted_j as i64) < j2 as i64 - init.gap as i64 - 1 {
                        window.eject();
                    } else {
                        break;
                    }
                }

                let (mut kappa, mut prev_trace) = match (window.find_min(), window.find_key_of_min()) {
                    (Some(min), Some(key)) => (min as u32 + 1, Some((i - 1, key as usize))),
                    _ => (m as u32 + 1, None),
                };

                let k2 = rows[i][idx2].k;
                if let Some((trow, tidx)) = track[k2 as usize] {
                    let tk = rows[trow][tidx];
                    let gap_run = gap_counters[(k2 - 1) as usize][(j2 - 1) as usize];
                    if tk.j as i64 >= j2 as i64 - gap_run as i64 - 1 && tk.kappa < kappa {
                        kappa = tk.kappa;
                        prev_trace = Some((trow, tidx));
                    }
                }

                rows[i][idx2].kappa = kappa;
                rows[i][idx2].prev_trace = prev_trace;
            }
        }

        for idx in 0..rows[m].len() {
            let node = rows[m][idx];
            if node.kappa > init.errors {
                continue;
            }

            let mut chain = vec![(m, idx)];
            let mut cur = node.prev_trace;
            while let Some((r, ci)) = cur {
                chain.push((r, ci));
                cur = rows[r][ci].prev_trace;
            }
            chain.reverse();

            let (first_row, first_idx) = chain[0];
            let first_chord = rows[first_row][first_idx].j - 1;
            let last_chord = node.j - 1;

            let mut matched_notes = Vec::with_capacity(chain.len());
            let mut track_assignment = Vec::with_capacity(chain.len());
            for &(r, ci) in &chain {
                let n = rows[r][ci];
                track_assignment.push(n.k);
                let chord_index = n.j - 1;
                let pitch_byte = song.tracks[(n.k - 1) as usize][chord_index as usize];
                matched_notes.push(note_offset_for(song, chord_index, n.k - 1, pitch_byte as i8));
            }

            matches.push(Match {
                first_chord,
                last_chord,
                matched_notes: Some(matched_notes),
                transposition: 0,
                errors: node.kappa,
                extras: MatchExtras::TrackAssignment(track_assignment),
            });
        }
    }

    if init.songonce {
        let best: Vec<Match> = matches.into_iter().min_by_key(|m| m.errors).into_iter().collect();
        tracing::debug!(found = best.len(), "splitting scan done (songonce)");
        return best;
    }
    tracing::debug!(found = matches.len(), "splitting scan done");
    matches
}
