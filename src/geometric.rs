//! C9: the three sweepline geometric kernels from Ukkonen, Lemstrom and
//! Makinen's "Sweepline the Music!". Each models a note as an (onset, pitch)
//! point and looks for a translation vector `f` under which some subset of
//! source points equals `pattern + f`.
//!
//! - **P1** requires the *entire* pattern to occur (exact transposed match).
//! - **P2** allows up to `errors` pattern points to be missing.
//! - **P3** reports the translation with the longest common sounding time,
//!   treating notes as (onset, onset+duration) segments rather than points.

use crate::pattern::Pattern;
use crate::pq_onset::TranslationPriorityQueue;
use crate::pq_translation::{TranslationVectorQueue, Vector as TVector};
use crate::song::{NoteCursor, Song};
use crate::{Match, MatchExtras, Result, MAX_PATTERN_NOTES};

fn cursor_key(song: &Song, c: NoteCursor) -> (i64, i32) {
    (
        song.chord_onset(c.chord_offset) as i64,
        song.note_at(c.note_offset).pitch as i32,
    )
}

// ---------------------------------------------------------------- P1 -----

pub struct P1Init {
    /// Polyphonic pattern points, still in canonical (960 ppq) resolution.
    points: Vec<(u32, i32)>,
}

pub fn p1_init(pattern: &Pattern) -> Result<P1Init> {
    pattern.validate()?;
    let points = pattern
        .polyphonic()
        .iter()
        .map(|n| (n.onset, n.pitch as i32))
        .collect();
    Ok(P1Init { points })
}

enum Advance {
    Found(NoteCursor),
    Overshot(NoteCursor),
    EndOfSource,
}

fn advance_to(song: &Song, from: Option<NoteCursor>, target: (i64, i32)) -> Advance {
    // `from` is re-evaluated inclusively: a cursor left overshot by a
    // previous anchor may itself equal this anchor's target, and must not
    // be skipped over by unconditionally stepping to the next note first.
    let mut c = match from {
        Some(prev) => prev,
        None => match song.first_cursor() {
            Some(n) => n,
            None => return Advance::EndOfSource,
        },
    };
    loop {
        let key = cursor_key(song, c);
        if key < target {
            match song.next_note(c) {
                Some(n) => c = n,
                None => return Advance::EndOfSource,
            }
        } else if key == target {
            return Advance::Found(c);
        } else {
            return Advance::Overshot(c);
        }
    }
}

/// Every source note is tried as an anchor for `p[0]`; the per-slot cursors
/// `q[1..m)` persist across anchors since a match can only ever be found
/// further forward in the source than where the previous anchor left off.
pub fn p1_scan(song: &Song, init: &P1Init) -> Vec<Match> {
    tracing::debug!(pattern_notes = init.points.len(), "p1 scan");
    let pattern_size = init.points.len();
    if pattern_size == 0 || pattern_size > MAX_PATTERN_NOTES || pattern_size as u32 > song.num_chords {
        return Vec::new();
    }
    let p: Vec<(i64, i32)> = init
        .points
        .iter()
        .map(|&(onset, pitch)| {
            (
                crate::pattern::Pattern::rescale_onset(onset, song.quarter_note_duration) as i64,
                pitch,
            )
        })
        .collect();

    let mut matches = Vec::new();
    let mut q: Vec<Option<NoteCursor>> = vec![None; pattern_size];

    let Some(mut anchor) = song.first_cursor() else {
        return matches;
    };

    loop {
        let anchor_key = cursor_key(song, anchor);
        let f_strt = anchor_key.0 - p[0].0;
        let f_ptch = anchor_key.1 - p[0].1;

        let mut matched = vec![0u32; pattern_size];
        matched[0] = anchor.note_offset;
        let mut ok = true;

        for pi in 1..pattern_size {
            let target = (p[pi].0 + f_strt, p[pi].1 + f_ptch);
            match advance_to(song, q[pi], target) {
                Advance::Found(c) => {
                    matched[pi] = c.note_offset;
                    q[pi] = Some(c);
                }
                Advance::Overshot(c) => {
                    q[pi] = Some(c);
                    ok = false;
                    break;
                }
                Advance::EndOfSource => {
                    ok = false;
                    break;
                }
            }
        }

        if ok {
            matches.push(Match {
                first_chord: anchor.chord_index,
                last_chord: anchor.chord_index + pattern_size as u32 - 1,
                matched_notes: Some(matched),
                transposition: f_ptch,
                errors: 0,
                extras: MatchExtras::Translation {
                    dx: f_strt,
                    dy: f_ptch as i8,
                },
            });
        }

        match song.next_note(anchor) {
            Some(next) => anchor = next,
            None => break,
        }
    }
    matches
}

// ---------------------------------------------------------------- P2 -----

pub struct P2Init {
    points: Vec<(u32, i32)>,
    pattern_chords: usize,
    errors: u32,
}

/// `errors` is the number of pattern points allowed to be unmatched.
pub fn p2_init(pattern: &Pattern, errors: u32) -> Result<P2Init> {
    pattern.validate()?;
    let points: Vec<(u32, i32)> = pattern
        .polyphonic()
        .iter()
        .map(|n| (n.onset, n.pitch as i32))
        .collect();
    let pattern_chords = pattern.monophonic().len();
    Ok(P2Init {
        points,
        pattern_chords,
        errors,
    })
}

/// Sweeps `pattern_notes` independent cursors forward through the source via
/// a tournament priority queue, grouping consecutive extractions that share
/// a translation vector. A group that reaches `pattern_notes - errors`
/// members is reported. Note: mirroring the source algorithm, the final
/// in-progress group at the end of the scan is not flushed — only a group
/// that is displaced by a differing translation gets reported.
pub fn p2_scan(song: &Song, init: &P2Init) -> Vec<Match> {
    tracing::debug!(pattern_notes = init.points.len(), errors = init.errors, "p2 scan");
    let pattern_notes = init.points.len();
    if pattern_notes == 0
        || pattern_notes > MAX_PATTERN_NOTES
        || init.pattern_chords as u32 > song.num_chords
        || song.num_notes == 0
    {
        return Vec::new();
    }
    let min_pattern_size = pattern_notes.saturating_sub(init.errors as usize);

    let p: Vec<(i64, i32)> = init
        .points
        .iter()
        .map(|&(onset, pitch)| {
            (
                crate::pattern::Pattern::rescale_onset(onset, song.quarter_note_duration) as i64,
                pitch,
            )
        })
        .collect();

    let first = song.first_cursor().unwrap();
    let mut q: Vec<NoteCursor> = vec![first; pattern_notes];
    let mut pq = TranslationPriorityQueue::new(pattern_notes);
    for i in 0..pattern_notes {
        let key = cursor_key(song, q[i]);
        pq.update(i as u32, key.0 - p[i].0, key.1 - p[i].1);
    }

    let num_loops = song.num_notes as u64 * pattern_notes as u64;
    let mut matches = Vec::new();
    let mut prev: Option<(i64, i32)> = None;
    let mut c = 0usize;
    let mut min_chord_ind = 0u32;
    let mut max_chord_ind = 0u32;
    let mut matched_notes = vec![0u32; pattern_notes];

    for _ in 0..num_loops {
        let (min_key, strt, ptch) = pq.min();
        let min_key = min_key as usize;

        if prev == Some((strt, ptch)) {
            max_chord_ind = q[min_key].chord_index;
            matched_notes[c] = q[min_key].note_offset;
            c += 1;
        } else {
            if c >= min_pattern_size {
                if let Some((pstrt, pptch)) = prev {
                    matches.push(Match {
                        first_chord: min_chord_ind,
                        last_chord: max_chord_ind,
                        matched_notes: Some(matched_notes[..c].to_vec()),
                        transposition: pptch,
                        errors: pattern_notes as u32 - c as u32,
                        extras: MatchExtras::Translation {
                            dx: pstrt,
                            dy: pptch as i8,
                        },
                    });
                }
            }
            prev = Some((strt, ptch));
            min_chord_ind = q[min_key].chord_index;
            max_chord_ind = min_chord_ind;
            matched_notes[0] = q[min_key].note_offset;
            c = 1;
        }

        match song.next_note(q[min_key]) {
            Some(next) => {
                q[min_key] = next;
                let key = cursor_key(song, next);
                pq.update(min_key as u32, key.0 - p[min_key].0, key.1 - p[min_key].1);
            }
            None => pq.update(min_key as u32, i64::MAX, i32::MAX),
        }
    }
    matches
}

// ---------------------------------------------------------------- P3 -----

pub struct P3Init {
    /// `(onset, pitch, duration)`, still canonical resolution.
    points: Vec<(u32, i32, u32)>,
}

pub fn p3_init(pattern: &Pattern) -> Result<P3Init> {
    pattern.validate()?;
    let points = pattern
        .polyphonic()
        .iter()
        .map(|n| (n.onset, n.pitch as i32, n.duration as u32))
        .collect();
    Ok(P3Init { points })
}

#[derive(Clone, Copy)]
struct VTableEntry {
    slope: i64,
    value: i64,
    prev_x: i64,
}

/// Reports the best-scoring translation by total overlap duration (sweeping
/// note-segment turning points rather than points). Reports at most one
/// match per call, as in the source: the single best translation found.
/// `first_chord`/`last_chord` are only an approximation, widened by
/// `pattern_notes` chords in either direction around the best segment's end
/// (see module docs and spec §4.C9 for why an exact range isn't recovered).
pub fn p3_scan(song: &Song, init: &P3Init) -> Vec<Match> {
    tracing::debug!(pattern_notes = init.points.len(), "p3 scan");
    let pattern_notes = init.points.len();
    let num_tpoints = song.p3_startpoints.len();
    if pattern_notes == 0
        || pattern_notes >= MAX_PATTERN_NOTES
        || num_tpoints == 0
        || num_tpoints != song.p3_endpoints.len()
    {
        return Vec::new();
    }

    let qnd = song.quarter_note_duration as i64;
    let rescale = |onset: u32| -> i64 { (onset as i64 * qnd) / crate::PNOTERESOLUTION as i64 };

    let pattern: Vec<(i64, i64, i64)> = init
        .points
        .iter()
        .map(|&(onset, pitch, dur)| (rescale(onset), pitch as i64, rescale(dur)))
        .collect();
    let dursum: i64 = pattern.iter().map(|p| p.2).sum();
    let halfdursum = (dursum as f64 * 0.75) as i64;

    let mut pq = TranslationVectorQueue::new(pattern_notes * 4);
    for (i, &(strt, ptch, dur)) in pattern.iter().enumerate() {
        let sp0 = song.p3_startpoints[0];
        let ep0 = song.p3_endpoints[0];
        let slots = [
            (true, false, sp0.x as i64 - (strt + dur), sp0.y as i64 - ptch),
            (true, true, sp0.x as i64 - strt, sp0.y as i64 - ptch),
            (false, false, ep0.x as i64 - (strt + dur), ep0.y as i64 - ptch),
            (false, true, ep0.x as i64 - strt, ep0.y as i64 - ptch),
        ];
        for (slot, &(text_is_start, pattern_is_start, x, y)) in slots.iter().enumerate() {
            pq.update(
                (i * 4 + slot) as u32,
                TVector {
                    pattern_index: i as u32,
                    turning_point_index: 0,
                    x,
                    y,
                    text_is_start,
                    pattern_is_start,
                },
            );
        }
    }

    let mut table = [VTableEntry {
        slope: 0,
        value: 0,
        prev_x: 0,
    }; 256];

    let mut best: i64 = 0;
    let mut transposition: i64 = i64::MAX;
    let mut endchordind: u32 = 0;
    let num_loops = pattern_notes as u64 * num_tpoints as u64 * 4;
    let num_tpoints_minus_one = (num_tpoints - 1) as u32;

    for _ in 0..num_loops {
        let min = pq.min();
        let slot = (127 + min.y).clamp(0, 255) as usize;
        let item = &mut table[slot];
        item.value += item.slope * (min.x - item.prev_x);
        item.prev_x = min.x;

        if min.text_is_start != min.pattern_is_start {
            item.slope += 1;
        } else {
            item.slope -= 1;
        }

        if item.value > best || (item.value == best && min.y.abs() < transposition.abs()) {
            transposition = min.y;
            best = item.value;
            endchordind = if min.text_is_start {
                song.p3_startpoints[min.turning_point_index as usize].chord_index
            } else {
                song.p3_endpoints[min.turning_point_index as usize].chord_index
            };
        }

        if min.turning_point_index < num_tpoints_minus_one {
            let next_index = min.turning_point_index + 1;
            let (strt, dur) = (pattern[min.pattern_index as usize].0, pattern[min.pattern_index as usize].2);
            let (x, y) = if min.text_is_start {
                let tp = song.p3_startpoints[next_index as usize];
                let y = tp.y as i64 - pattern[min.pattern_index as usize].1;
                let x = if min.pattern_is_start {
                    tp.x as i64 - strt
                } else {
                    tp.x as i64 - (strt + dur)
                };
                (x, y)
            } else {
                let tp = song.p3_endpoints[next_index as usize];
                let y = tp.y as i64 - pattern[min.pattern_index as usize].1;
                let x = if min.pattern_is_start {
                    tp.x as i64 - strt
                } else {
                    tp.x as i64 - (strt + dur)
                };
                (x, y)
            };
            pq.update(
                key_of(min),
                TVector {
                    pattern_index: min.pattern_index,
                    turning_point_index: next_index,
                    x,
                    y,
                    text_is_start: min.text_is_start,
                    pattern_is_start: min.pattern_is_start,
                },
            );
        } else {
            pq.remove(key_of(min));
        }
    }

    let mut matches = Vec::new();
    if best > halfdursum {
        let first_chord = endchordind.saturating_sub(pattern_notes as u32);
        let last_chord = (endchordind + pattern_notes as u32).min(song.num_chords);
        matches.push(Match {
            first_chord,
            last_chord,
            matched_notes: None,
            transposition: transposition as i32,
            errors: 0,
            extras: MatchExtras::Translation { dx: 0, dy: transposition as i8 },
        });
    }
    matches
}

/// The priority queue is indexed by an arbitrary slot key, not by pattern
/// index; P3 needs to re-enqueue the just-extracted vector's own slot, which
/// the tournament tree doesn't expose directly from a `min()` read. We track
/// it by re-deriving it from the initial 4-per-pattern-note layout, which is
/// stable across the scan (a slot's key never moves).
fn key_of(min: TVector) -> u32 {
    let base = min.pattern_index * 4;
    base + match (min.text_is_start, min.pattern_is_start) {
        (true, false) => 0,
        (true, true) => 1,
        (false, false) => 2,
        (false, true) => 3,
    }
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
    fn p1_finds_exact_geometric_occurrence() {
        let song = Song::build(
            vec![
                song_chord(0, &[60]),
                song_chord(480, &[64]),
                song_chord(960, &[67]),
                song_chord(1440, &[69]),
            ],
            480,
            vec![],
        )
        .unwrap();
        let pattern = Pattern::new(vec![pat(0, 60), pat(960, 64), pat(1920, 67)]);
        let init = p1_init(&pattern).unwrap();
        let matches = p1_scan(&song, &init);
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].transposition, 0);
        assert_eq!(matches[0].matched_notes.as_ref().unwrap().len(), 3);
    }

    #[test]
    fn p1_matches_a_cursor_left_overshot_by_an_earlier_anchor() {
        // chord0 = {60, 61}, chord1 = {65}. The anchor at pitch 60 overshoots
        // q[1] past its target (480,64) to (480,65); the very next anchor,
        // at pitch 61, needs that same overshot cursor re-checked inclusively
        // rather than skipped past, since (480,65) is exactly its target.
        let song = Song::build(
            vec![song_chord(0, &[60, 61]), song_chord(480, &[65])],
            480,
            vec![],
        )
        .unwrap();
        let pattern = Pattern::new(vec![pat(0, 60), pat(960, 64)]);
        let init = p1_init(&pattern).unwrap();
        let matches = p1_scan(&song, &init);
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].transposition, 1);
        assert_eq!(matches[0].first_chord, 0);
        assert_eq!(matches[0].last_chord, 1);
    }

    #[test]
    fn p1_empty_song_yields_no_matches() {
        let song = Song::build(vec![], 480, vec![]).unwrap();
        let pattern = Pattern::new(vec![pat(0, 60)]);
        let init = p1_init(&pattern).unwrap();
        assert!(p1_scan(&song, &init).is_empty());
    }

    #[test]
    fn p2_allows_one_missing_point() {
        // pattern [60,62,64]; source omits the middle note entirely.
        let song = Song::build(
            vec![song_chord(0, &[60]), song_chord(480, &[64])],
            480,
            vec![],
        )
        .unwrap();
        let pattern = Pattern::new(vec![pat(0, 60), pat(480, 62), pat(960, 64)]);
        let init = p2_init(&pattern, 1).unwrap();
        let matches = p2_scan(&song, &init);
        assert!(matches.iter().any(|m| m.errors <= 1));
    }

    #[test]
    fn p3_rewards_sustained_overlap() {
        let song = Song::build(
            vec![song_chord(0, &[60]), song_chord(480, &[62]), song_chord(960, &[64])],
            480,
            vec![],
        )
        .unwrap();
        let pattern = Pattern::new(vec![pat(0, 60), pat(480, 62), pat(960, 64)]);
        let init = p3_init(&pattern).unwrap();
        let matches = p3_scan(&song, &init);
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].transposition, 0);
    }
}
