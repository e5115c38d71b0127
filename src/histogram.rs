//! C13: corpus-wide note statistics, independent of any pattern or kernel.
//! Used for query-independent analysis (pitch/duration distributions) and
//! as cheap pre-filters before running a full scan.

use crate::song::Song;
use crate::{NOTELEN, VOCSIZE};

/// Count of each absolute MIDI pitch (0-127) across every note in the song.
pub fn pitch_histogram(song: &Song) -> [u32; 128] {
    let mut hist = [0u32; 128];
    for (_, _, first_note_offset, chordlen) in song.chord_iter() {
        for slot in 0..chordlen as u32 {
            let note = song.note_at(first_note_offset + slot * NOTELEN as u32);
            hist[note.pitch as usize] += 1;
        }
    }
    hist
}

/// Pitches folded to pitch class, then remapped along the circle of fifths
/// (Tzanetakis, Ermolinskyi & Cook, ISMIR 2002).
pub fn pitch_class_histogram_folded(song: &Song) -> [u32; VOCSIZE] {
    let mut hist = [0u32; VOCSIZE];
    for (_, _, first_note_offset, chordlen) in song.chord_iter() {
        for slot in 0..chordlen as u32 {
            let note = song.note_at(first_note_offset + slot * NOTELEN as u32);
            let pitch_class = (note.pitch as i32).rem_euclid(VOCSIZE as i32) as usize;
            hist[(7 * pitch_class) % VOCSIZE] += 1;
        }
    }
    hist
}

/// Counts of signed intervals (`-127..=127`, offset by 127 into a 255-slot
/// array) between every note of each chord and every note of the
/// immediately preceding chord. Track identity is ignored.
pub fn pitch_interval_histogram(song: &Song) -> [u32; 255] {
    let mut hist = [0u32; 255];
    let chords: Vec<(u32, u8)> = song
        .chord_iter()
        .map(|(_, _, first_note_offset, chordlen)| (first_note_offset, chordlen))
        .collect();

    for pair in chords.windows(2) {
        let (prev_offset, prev_len) = pair[0];
        let (cur_offset, cur_len) = pair[1];
        for j in 0..cur_len as u32 {
            let cur = song.note_at(cur_offset + j * NOTELEN as u32);
            for k in 0..prev_len as u32 {
                let prev = song.note_at(prev_offset + k * NOTELEN as u32);
                let bucket = 127 + cur.pitch as i32 - prev.pitch as i32;
                hist[bucket as usize] += 1;
            }
        }
    }
    hist
}

/// Buckets every note's duration against halvings of a full note
/// (`4 * quarter_note_duration`): index 0 is "shorter than 1/512 of a full
/// note", 1 is "a full note or longer", 2..=10 are the successive halvings
/// in between.
pub fn duration_histogram(song: &Song) -> [u32; 11] {
    let mut hist = [0u32; 11];
    let fullnoteduration = 4.0 * song.quarter_note_duration as f64;

    for (_, _, first_note_offset, chordlen) in song.chord_iter() {
        for slot in 0..chordlen as u32 {
            let note = song.note_at(first_note_offset + slot * NOTELEN as u32);
            let dur = note.duration as f64;
            let mut temp = fullnoteduration;
            let mut bucket = 0usize;
            for k in 1..11 {
                if dur > temp {
                    bucket = k;
                    break;
                }
                temp /= 2.0;
            }
            hist[bucket] += 1;
        }
    }
    hist
}
