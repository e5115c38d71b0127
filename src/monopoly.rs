//! C8: MonoPoly and IntervalMatching, two filters that should (and in the
//! tests below, do) agree on every match. Both run a Shift-Or automaton
//! over pitch-class intervals: MonoPoly consumes the precomputed per-chord
//! interval bitmap ([`crate::song::Song::interval_bitmap`]), IntervalMatching
//! recomputes the interval set for each chord pair on the fly. A filter hit
//! is only a candidate; [`crate::check::match_check`] (monophonic pattern)
//! or [`crate::check::poly_check`] (polyphonic pattern) verifies it.

use crate::check::{match_check, poly_check};
use crate::pattern::Pattern;
use crate::song::Song;
use crate::{Match, Result, NOTELEN, VOCSIZE};

/// Shared Shift-Or state: `width` intervals packed into the low `width` bits
/// of a machine word, matched once bit `width - 1` goes clear.
struct IntervalAutomaton {
    width: u32,
    mask: u32,
}

impl IntervalAutomaton {
    fn new(width: u32) -> Self {
        let mask = if width == 0 { 0 } else { (1u32 << width) - 1 };
        IntervalAutomaton { width, mask }
    }

    fn accept(&self, e: u32) -> bool {
        self.width > 0 && (e & (1 << (self.width - 1))) == 0
    }
}

pub struct MonoPolyInit {
    automaton: IntervalAutomaton,
    /// One entry per possible 12-bit interval-presence bitmap.
    t: Vec<u32>,
    pattern_size: usize,
    polyphonic: bool,
}

pub fn monopoly_init(pattern: &Pattern) -> Result<MonoPolyInit> {
    pattern.validate_bitparallel()?;
    let mono = pattern.monophonic();
    let pattern_size = mono.len();
    let polyphonic = pattern.notes.len() != pattern_size;
    let width = pattern_size.saturating_sub(1) as u32;
    let automaton = IntervalAutomaton::new(width);

    let mut itable = [0u16; VOCSIZE];
    let mut ltable = [automaton.mask; VOCSIZE];
    let ones: u16 = (1 << VOCSIZE) - 1;
    for (j, entry) in itable.iter_mut().enumerate() {
        *entry = ones - (1 << j);
    }
    for i in 0..width as usize {
        let ii = crate::song::pitch_class_interval(mono[i].pitch, mono[i + 1].pitch) as usize;
        ltable[ii] -= 1 << i;
    }

    let tlen = 1usize << VOCSIZE;
    let mut t = vec![automaton.mask; tlen];
    for (bitmap, slot) in t.iter_mut().enumerate() {
        for j in 0..VOCSIZE {
            if (itable[j] as usize | bitmap) == itable[j] as usize {
                *slot &= ltable[j];
            }
        }
    }

    Ok(MonoPolyInit {
        automaton,
        t,
        pattern_size,
        polyphonic,
    })
}

pub fn monopoly_scan(song: &Song, pattern: &Pattern, init: &MonoPolyInit) -> Vec<Match> {
    tracing::debug!(pattern_size = init.pattern_size, polyphonic = init.polyphonic, "monopoly scan");
    let mut matches = Vec::new();
    if init.pattern_size < 2 || song.num_chords < 2 {
        return matches;
    }

    let mono = pattern.monophonic();
    let poly = pattern.polyphonic();
    let mut e = init.automaton.mask;

    for ppidx in 0..song.num_chords - 1 {
        let bitmap = song.interval_bitmap(ppidx);
        e = ((e << 1) | init.t[bitmap as usize]) & init.automaton.mask;

        if init.automaton.accept(e) {
            let Some(first_chord) = (ppidx + 2).checked_sub(init.pattern_size as u32) else {
                continue;
            };
            let last_chord = first_chord + init.pattern_size as u32 - 1;
            if init.polyphonic {
                if let Some(m) = poly_check(song, first_chord, last_chord, &poly) {
                    matches.push(m);
                }
            } else {
                matches.extend(match_check(song, first_chord, &mono));
            }
        }
    }
    matches
}

pub struct IntervalMatchingInit {
    automaton: IntervalAutomaton,
    t: [u32; VOCSIZE],
    pattern_size: usize,
}

pub fn intervalmatching_init(pattern: &Pattern) -> Result<IntervalMatchingInit> {
    pattern.validate_bitparallel()?;
    let mono = pattern.monophonic();
    let pattern_size = mono.len();
    let width = pattern_size.saturating_sub(1) as u32;
    let automaton = IntervalAutomaton::new(width);

    let mut t = [automaton.mask; VOCSIZE];
    for i in 1..pattern_size {
        let ii = crate::song::pitch_class_interval(mono[i - 1].pitch, mono[i].pitch) as usize;
        t[ii] -= 1 << (i - 1);
    }

    Ok(IntervalMatchingInit {
        automaton,
        t,
        pattern_size,
    })
}

pub fn intervalmatching_scan(song: &Song, pattern: &Pattern, init: &IntervalMatchingInit) -> Vec<Match> {
    tracing::debug!(pattern_size = init.pattern_size, "intervalmatching scan");
    let mut matches = Vec::new();
    if init.pattern_size < 2 || song.num_chords < 2 {
        return matches;
    }
    let mono = pattern.monophonic();

    let mut e = init.automaton.mask;
    let mut prev: Option<(u32, u8)> = None; // (first_note_offset, chordlen)

    for (chordind, _onset, first_note, chordlen) in song.chord_iter() {
        let Some((prev_first_note, prev_len)) = prev else {
            prev = Some((first_note, chordlen));
            continue;
        };

        let mut tmp = init.automaton.mask;
        for i in 0..chordlen as u32 {
            let pitch_a = song.note_at(first_note + i * NOTELEN as u32).pitch;
            for k in 0..prev_len as u32 {
                let pitch_b = song.note_at(prev_first_note + k * NOTELEN as u32).pitch;
                let ii = crate::song::pitch_class_interval(pitch_b, pitch_a) as usize;
                tmp &= init.t[ii];
            }
        }
        prev = Some((first_note, chordlen));

        e = ((e << 1) | tmp) & init.automaton.mask;
        if init.automaton.accept(e) {
            if let Some(first_chord) = (chordind + 1).checked_sub(init.pattern_size as u32) {
                matches.extend(match_check(song, first_chord, &mono));
            }
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
    fn monopoly_finds_transposed_monophonic_occurrence() {
        let song = Song::build(
            vec![
                song_chord(0, &[50]),
                song_chord(480, &[62]),
                song_chord(960, &[64]),
                song_chord(1440, &[66]),
                song_chord(1920, &[70]),
            ],
            480,
            vec![],
        )
        .unwrap();
        let pattern = Pattern::new(vec![pat(0, 60), pat(480, 62), pat(960, 64)]);
        let init = monopoly_init(&pattern).unwrap();
        let matches = monopoly_scan(&song, &pattern, &init);
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].first_chord, 1);
        assert_eq!(matches[0].transposition, 2);
    }

    #[test]
    fn no_candidates_below_two_chord_pattern() {
        let song = Song::build(vec![song_chord(0, &[60])], 480, vec![]).unwrap();
        let pattern = Pattern::new(vec![pat(0, 60)]);
        let init = monopoly_init(&pattern).unwrap();
        assert!(monopoly_scan(&song, &pattern, &init).is_empty());
    }

    #[test]
    fn intervalmatching_agrees_with_monopoly() {
        let song = Song::build(
            vec![
                song_chord(0, &[50]),
                song_chord(480, &[62]),
                song_chord(960, &[64]),
                song_chord(1440, &[66]),
            ],
            480,
            vec![],
        )
        .unwrap();
        let pattern = Pattern::new(vec![pat(0, 60), pat(480, 62), pat(960, 64)]);
        let init = intervalmatching_init(&pattern).unwrap();
        let matches = intervalmatching_scan(&song, &pattern, &init);
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].first_chord, 1);
        assert_eq!(matches[0].transposition, 2);
    }
}
