//! C7: ShiftOrAnd, exact (non-transposed) multi-track matching via a
//! bit-parallel Shift-Or automaton with an AND step that folds a chord's
//! several simultaneous notes into one mask update.
//!
//! Bit `i` of a table entry is 0 iff pattern position `i` wants that pitch.
//! One step per song chord shifts the automaton state left by one, ANDs in
//! every note of the chord, and checks whether the high bit set (an accept
//! state) has been reached.

use crate::pattern::Pattern;
use crate::song::Song;
use crate::{Match, MatchExtras, Result, NOTELEN};

pub struct ShiftOrAndInit {
    /// One 32-bit mask per possible raw pitch byte.
    t: [u32; 256],
    e: u32,
    em: u32,
    mask: u32,
    pattern_size: usize,
}

/// Builds the automaton table from the pattern's monophonic view (one note
/// per onset; duplicate-pitch chords in the pattern would otherwise collide
/// in `t`).
pub fn init(pattern: &Pattern) -> Result<ShiftOrAndInit> {
    pattern.validate_bitparallel()?;
    let mono = pattern.monophonic();
    let pattern_size = mono.len();

    let mask: u32 = if pattern_size == 0 {
        0
    } else {
        (1u32 << pattern_size) - 1
    };
    let em = if pattern_size == 0 {
        mask
    } else {
        mask - (1u32 << (pattern_size - 1))
    };

    let mut t = [mask; 256];
    for (i, note) in mono.iter().enumerate() {
        t[note.pitch as u8 as usize] -= 1 << i;
    }

    Ok(ShiftOrAndInit {
        t,
        e: mask,
        em,
        mask,
        pattern_size,
    })
}

pub fn scan(song: &Song, init: &ShiftOrAndInit) -> Vec<Match> {
    tracing::debug!(pattern_size = init.pattern_size, num_chords = song.num_chords, "shiftorand scan");
    let mut matches = Vec::new();
    if init.pattern_size == 0 || init.pattern_size as u32 > song.num_chords {
        return matches;
    }

    let mut e = init.e;
    for (chord, _onset, first_note, chordlen) in song.chord_iter() {
        let mut tmp = init.mask;
        for i in 0..chordlen as u32 {
            let pitch = song.chords[(first_note + i * NOTELEN as u32) as usize];
            tmp &= init.t[pitch as usize];
        }
        e = ((e << 1) | tmp) & init.mask;

        if (e | init.em) == init.em {
            let first_chord = chord + 1 - init.pattern_size as u32;
            matches.push(Match {
                first_chord,
                last_chord: chord,
                matched_notes: None,
                transposition: 0,
                errors: 0,
                extras: MatchExtras::None,
            });
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

    fn pat_note(onset: u32, pitch: i8) -> PatNote {
        PatNote {
            onset,
            pitch,
            duration: 480,
        }
    }

    #[test]
    fn finds_exact_absolute_pitch_run() {
        let song = Song::build(
            vec![
                song_chord(0, &[50]),
                song_chord(480, &[60]),
                song_chord(960, &[62]),
                song_chord(1440, &[64]),
                song_chord(1920, &[70]),
            ],
            480,
            vec![],
        )
        .unwrap();
        let pattern = Pattern::new(vec![pat_note(0, 60), pat_note(480, 62), pat_note(960, 64)]);

        let init = init(&pattern).unwrap();
        let matches = scan(&song, &init);
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].first_chord, 1);
        assert_eq!(matches[0].last_chord, 3);
    }

    #[test]
    fn transposed_occurrence_is_not_matched() {
        let song = Song::build(
            vec![
                song_chord(0, &[61]),
                song_chord(480, &[63]),
                song_chord(960, &[65]),
            ],
            480,
            vec![],
        )
        .unwrap();
        let pattern = Pattern::new(vec![pat_note(0, 60), pat_note(480, 62), pat_note(960, 64)]);
        let init = init(&pattern).unwrap();
        assert!(scan(&song, &init).is_empty());
    }

    #[test]
    fn empty_song_yields_no_matches() {
        let song = Song::build(vec![], 480, vec![]).unwrap();
        let pattern = Pattern::new(vec![pat_note(0, 60)]);
        let init = init(&pattern).unwrap();
        assert!(scan(&song, &init).is_empty());
    }
}
