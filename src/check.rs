//! C6: candidate verification for the bit-parallel filters (ShiftOrAnd does
//! not need a checker; MonoPoly and IntervalMatching do, since their
//! interval automaton only proves a candidate *window*, not a specific note
//! alignment or transposition).
//!
//! [`match_check`] reconstructs an arbitrary-semitone transposition by
//! chasing raw pitch deltas chord to chord, trying every note of the first
//! chord as a possible anchor. [`poly_check`] verifies full polyphonic
//! structure but only at zero transposition, matching the exact-match
//! semantics of the algorithm it backs.

use crate::pattern::Note as PatternNote;
use crate::song::Song;
use crate::{Match, MatchExtras, MAX_PATTERN_NOTES, NOTELEN, VOCSIZE};

/// Chases every anchor note in the chord at `first_chord` through
/// `pattern.len()` chords, requiring the pattern's absolute semitone
/// intervals to hold exactly. Reports one match per anchor that survives
/// the whole chase, so overlapping candidates in a polyphonic first chord
/// can each produce a match.
pub fn match_check(song: &Song, first_chord: u32, pattern: &[PatternNote]) -> Vec<Match> {
    let pattern_size = pattern.len();
    if pattern_size == 0 || pattern_size > MAX_PATTERN_NOTES {
        return Vec::new();
    }
    let Some(first_offset) = song.chord_offset(first_chord) else {
        return Vec::new();
    };
    let first_len = song.chord_len(first_offset) as u32;

    let mut out = Vec::new();
    for note_index in 0..first_len {
        let mut matched_notes = [0u32; MAX_PATTERN_NOTES];
        let anchor_offset = Song::first_note_offset(first_offset) + note_index * NOTELEN as u32;
        matched_notes[0] = anchor_offset;
        let mut pitch = song.note_at(anchor_offset).pitch as i32;

        let mut current_offset = first_offset;
        let mut current_len = first_len;
        let mut ok = true;
        let mut pattern_index = 0usize;

        while ok && pattern_index + 1 < pattern_size {
            let target = pitch + pattern[pattern_index + 1].pitch as i32
                - pattern[pattern_index].pitch as i32;

            let next_offset = current_offset + crate::CHORDHEADERLEN as u32 + current_len * NOTELEN as u32;
            let next_len = song.chord_len(next_offset) as u32;

            let mut found = None;
            for k in 0..next_len {
                let note_offset = Song::first_note_offset(next_offset) + k * NOTELEN as u32;
                let mut y = song.note_at(note_offset).pitch as i32;
                while y < 0 {
                    y += VOCSIZE as i32;
                }
                if y == target {
                    found = Some(note_offset);
                    break;
                }
            }

            match found {
                Some(note_offset) => {
                    pitch = target;
                    matched_notes[pattern_index + 1] = note_offset;
                }
                None => ok = false,
            }

            current_offset = next_offset;
            current_len = next_len;
            pattern_index += 1;
        }

        if ok {
            let transposition = song.note_at(matched_notes[0]).pitch as i32 - pattern[0].pitch as i32;
            out.push(Match {
                first_chord,
                last_chord: first_chord + pattern_size as u32 - 1,
                matched_notes: Some(matched_notes[..pattern_size].to_vec()),
                transposition,
                errors: 0,
                extras: MatchExtras::None,
            });
        }
    }
    out
}

/// Verifies an exact (zero-transposition) polyphonic occurrence starting at
/// `first_chord`. Both `pattern` and each source chord are assumed sorted
/// ascending by pitch.
pub fn poly_check(
    song: &Song,
    first_chord: u32,
    last_chord: u32,
    pattern: &[PatternNote],
) -> Option<Match> {
    let pattern_notes = pattern.len();
    if pattern_notes == 0 {
        return None;
    }
    let mut chord_offset = song.chord_offset(first_chord)?;
    let mut chordlen = song.chord_len(chord_offset) as u32;

    let mut pi = 0usize;
    let mut ni = 0u32;
    let mut matched_notes = vec![0u32; pattern_notes];

    loop {
        let note_offset = Song::first_note_offset(chord_offset) + ni * NOTELEN as u32;
        let source_pitch = song.note_at(note_offset).pitch;
        let pattern_pitch = pattern[pi].pitch;

        if source_pitch > pattern_pitch {
            return None;
        } else if source_pitch < pattern_pitch {
            if ni + 1 == chordlen {
                return None;
            }
            ni += 1;
        } else {
            matched_notes[pi] = note_offset;
            if pi == pattern_notes - 1 {
                break;
            }
            if pattern[pi].onset != pattern[pi + 1].onset {
                pi += 1;
                ni = 0;
                chord_offset += crate::CHORDHEADERLEN as u32 + chordlen * NOTELEN as u32;
                chordlen = song.chord_len(chord_offset) as u32;
            } else {
                if ni + 1 == chordlen {
                    return None;
                }
                ni += 1;
                pi += 1;
            }
        }
    }

    Some(Match {
        first_chord,
        last_chord,
        matched_notes: Some(matched_notes),
        transposition: 0,
        errors: 0,
        extras: MatchExtras::None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
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

    fn pat(onset: u32, pitch: i8) -> PatternNote {
        PatternNote {
            onset,
            pitch,
            duration: 480,
        }
    }

    #[test]
    fn match_check_finds_transposed_chase() {
        let song = Song::build(
            vec![song_chord(0, &[62]), song_chord(480, &[64]), song_chord(960, &[66])],
            480,
            vec![],
        )
        .unwrap();
        let pattern = vec![pat(0, 60), pat(480, 62), pat(960, 64)];
        let matches = match_check(&song, 0, &pattern);
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].transposition, 2);
    }

    #[test]
    fn match_check_rejects_wrong_interval() {
        let song = Song::build(
            vec![song_chord(0, &[62]), song_chord(480, &[64]), song_chord(960, &[67])],
            480,
            vec![],
        )
        .unwrap();
        let pattern = vec![pat(0, 60), pat(480, 62), pat(960, 64)];
        assert!(match_check(&song, 0, &pattern).is_empty());
    }

    #[test]
    fn poly_check_requires_exact_pitch_no_transposition() {
        let song = Song::build(
            vec![song_chord(0, &[60, 64]), song_chord(480, &[67])],
            480,
            vec![],
        )
        .unwrap();
        let pattern = vec![pat(0, 60), pat(0, 64), pat(480, 67)];
        assert!(poly_check(&song, 0, 1, &pattern).is_some());

        let transposed_song = Song::build(
            vec![song_chord(0, &[62, 66]), song_chord(480, &[69])],
            480,
            vec![],
        )
        .unwrap();
        assert!(poly_check(&transposed_song, 0, 1, &pattern).is_none());
    }
}
