//! C1: the packed columnar note-data model.
//!
//! A [`Song`] owns one immutable byte buffer (`chords`) plus parallel index
//! arrays (`preprocessed`, `tracks`) addressing it by byte offset. All reads
//! are bounds-checked little-endian decodes of that buffer; there are no raw
//! pointers, only integer offsets and the [`NoteCursor`] type for sequential
//! scans that cross chord boundaries.

use serde::{Deserialize, Serialize};

use crate::pattern::Note as PatternNote;
use crate::{Error, Result, CHORDHEADERLEN, GAP_UNSIGNED, NOTELEN};

/// A decoded note from the `chords` buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Note {
    pub pitch: i8,
    pub duration: u16,
    pub track_id: u8,
}

/// One `preprocessed` entry: the byte offset of a chord plus the 12-bit
/// pitch-class-interval bitmap between it and the following chord (bit *i*
/// is 0 iff interval *i* is present). The final entry is a sentinel holding
/// only the end-of-buffer offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreprocessedItem {
    pub chord_offset: u32,
    pub interval_bitmap: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeSignature {
    pub onset: u32,
    pub numerator: u8,
    pub denom_log2: u8,
}

/// A P3 sweepline turning point: a note-segment start (onset, pitch) or end
/// (onset+duration, pitch), after merging overlapping same-pitch segments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TurningPoint {
    pub x: u32,
    pub y: u8,
    pub chord_index: u32,
}

/// A cursor into the note stream, valid for random access (by byte offset)
/// or sequential traversal via [`Song::next_note`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NoteCursor {
    pub chord_index: u32,
    pub chord_offset: u32,
    pub note_index: u32,
    pub note_offset: u32,
}

/// One song's immutable, parsed note data. Built once by the caller's parser
/// (out of scope here); every kernel treats it as read-only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Song {
    pub num_chords: u32,
    pub num_notes: u32,
    pub num_tracks: u32,
    pub quarter_note_duration: u32,
    pub chords: Vec<u8>,
    pub preprocessed: Vec<PreprocessedItem>,
    /// `tracks[k]` has one entry per chord: the highest pitch present on
    /// track `k + 1` in that chord, or [`GAP_UNSIGNED`].
    pub tracks: Vec<Vec<u8>>,
    pub time_signatures: Vec<TimeSignature>,
    pub p3_startpoints: Vec<TurningPoint>,
    pub p3_endpoints: Vec<TurningPoint>,
}

/// Input to [`Song::build`]: one chord, notes pre-sorted ascending by pitch.
#[derive(Debug, Clone)]
pub struct ChordInput {
    pub onset: u32,
    pub notes: Vec<Note>,
}

impl Song {
    /// Assembles the packed layout from a caller-supplied sequence of chords.
    /// Notes within each chord must already be pitch-ascending (the caller's
    /// parser invariant); this is not re-sorted here.
    pub fn build(
        chords_in: Vec<ChordInput>,
        quarter_note_duration: u32,
        time_signatures: Vec<TimeSignature>,
    ) -> Result<Song> {
        let num_chords = chords_in.len() as u32;
        let num_notes: u32 = chords_in.iter().map(|c| c.notes.len() as u32).sum();

        let mut chords = Vec::new();
        let mut chord_byte_offsets = Vec::with_capacity(chords_in.len());
        let mut num_tracks: u32 = 0;

        for chord in &chords_in {
            if chords.len() > u32::MAX as usize {
                return Err(Error::PreprocessOverflow(chord_byte_offsets.len() as u32));
            }
            chord_byte_offsets.push(chords.len() as u32);

            let chord_len: u8 = chord.notes.len().try_into().unwrap_or(u8::MAX);
            chords.push(chord_len);
            chords.extend_from_slice(&chord.onset.to_le_bytes());
            for note in &chord.notes {
                chords.push(note.pitch as u8);
                chords.extend_from_slice(&note.duration.to_le_bytes());
                chords.push(note.track_id);
                num_tracks = num_tracks.max(note.track_id as u32 + 1);
            }
        }
        let end_offset = chords.len() as u32;

        let preprocessed = build_preprocessed(&chords, &chord_byte_offsets);
        let tracks = build_tracks(&chords_in, num_tracks);
        let (p3_startpoints, p3_endpoints) = build_turning_points(&chords_in);

        Ok(Song {
            num_chords,
            num_notes,
            num_tracks,
            quarter_note_duration,
            chords,
            preprocessed,
            tracks,
            time_signatures,
            p3_startpoints,
            p3_endpoints,
        })
    }

    /// Byte offset of `chord_index`'s header, or `None` if out of range.
    pub fn chord_offset(&self, chord_index: u32) -> Option<u32> {
        self.preprocessed
            .get(chord_index as usize)
            .map(|item| item.chord_offset)
    }

    /// Number of notes in the chord at `byte_offset`.
    pub fn chord_len(&self, byte_offset: u32) -> u8 {
        self.chords[byte_offset as usize]
    }

    /// Onset of the chord at `byte_offset`.
    pub fn chord_onset(&self, byte_offset: u32) -> u32 {
        let o = byte_offset as usize + 1;
        u32::from_le_bytes(self.chords[o..o + 4].try_into().unwrap())
    }

    /// Decodes the note stored at `byte_offset` (the offset of the note
    /// itself, not the chord header).
    pub fn note_at(&self, byte_offset: u32) -> Note {
        let o = byte_offset as usize;
        Note {
            pitch: self.chords[o] as i8,
            duration: u16::from_le_bytes([self.chords[o + 1], self.chords[o + 2]]),
            track_id: self.chords[o + 3],
        }
    }

    /// Byte offset of the first note in the chord starting at `chord_offset`.
    pub fn first_note_offset(chord_offset: u32) -> u32 {
        chord_offset + CHORDHEADERLEN as u32
    }

    /// 12-bit pitch-class interval bitmap between chord `chord_index` and
    /// `chord_index + 1` (bit *i* clear iff interval *i* occurs).
    pub fn interval_bitmap(&self, chord_index: u32) -> u16 {
        self.preprocessed[chord_index as usize].interval_bitmap
    }

    /// A cursor at the first note of chord 0, or `None` for an empty song.
    pub fn first_cursor(&self) -> Option<NoteCursor> {
        if self.num_chords == 0 {
            return None;
        }
        Some(NoteCursor {
            chord_index: 0,
            chord_offset: 0,
            note_index: 0,
            note_offset: Self::first_note_offset(0),
        })
    }

    /// Advances a cursor to the next note, crossing chord boundaries
    /// transparently. Returns `None` at end of source.
    pub fn next_note(&self, cursor: NoteCursor) -> Option<NoteCursor> {
        let chordlen = self.chord_len(cursor.chord_offset) as u32;
        if cursor.note_index + 1 < chordlen {
            return Some(NoteCursor {
                note_index: cursor.note_index + 1,
                note_offset: cursor.note_offset + NOTELEN as u32,
                ..cursor
            });
        }
        let next_chord_index = cursor.chord_index + 1;
        if next_chord_index >= self.num_chords {
            return None;
        }
        let next_chord_offset = cursor.note_offset + NOTELEN as u32;
        Some(NoteCursor {
            chord_index: next_chord_index,
            chord_offset: next_chord_offset,
            note_index: 0,
            note_offset: Self::first_note_offset(next_chord_offset),
        })
    }

    /// Lazily iterates `(chord_index, onset, byte_offset_of_first_note, chord_len)`.
    pub fn chord_iter(&self) -> ChordIter<'_> {
        ChordIter {
            song: self,
            chord_index: 0,
            byte_offset: 0,
        }
    }

    /// Note data between `first_chord` and `last_chord` inclusive, as
    /// `(onset_relative_to_first_chord, pitch, duration)` triples grouped by
    /// chord. Mirrors the external collaborator's "get matched chords" call
    /// used to render/play back a match.
    pub fn matched_chords(
        &self,
        first_chord: u32,
        last_chord: u32,
    ) -> Result<Vec<Vec<PatternNote>>> {
        if first_chord >= self.num_chords || last_chord >= self.num_chords {
            return Err(Error::InvalidChordIndex(first_chord.max(last_chord)));
        }
        let offset_onset = self.chord_onset(self.chord_offset(first_chord).unwrap());
        let mut result = Vec::with_capacity((last_chord - first_chord + 1) as usize);
        for c in first_chord..=last_chord {
            let chord_offset = self.chord_offset(c).unwrap();
            let onset = self.chord_onset(chord_offset) - offset_onset;
            let len = self.chord_len(chord_offset) as u32;
            let mut notes = Vec::with_capacity(len as usize);
            for i in 0..len {
                let note = self.note_at(Self::first_note_offset(chord_offset) + i * NOTELEN as u32);
                notes.push(PatternNote {
                    onset,
                    pitch: note.pitch,
                    duration: note.duration,
                });
            }
            result.push(notes);
        }
        Ok(result)
    }
}

pub struct ChordIter<'a> {
    song: &'a Song,
    chord_index: u32,
    byte_offset: u32,
}

impl<'a> Iterator for ChordIter<'a> {
    /// `(chord_index, onset, first_note_byte_offset, chord_len)`
    type Item = (u32, u32, u32, u8);

    fn next(&mut self) -> Option<Self::Item> {
        if self.chord_index >= self.song.num_chords {
            return None;
        }
        let chordlen = self.song.chord_len(self.byte_offset);
        let onset = self.song.chord_onset(self.byte_offset);
        let item = (
            self.chord_index,
            onset,
            Song::first_note_offset(self.byte_offset),
            chordlen,
        );
        self.byte_offset += CHORDHEADERLEN as u32 + chordlen as u32 * NOTELEN as u32;
        self.chord_index += 1;
        Some(item)
    }
}

/// Right circular shift of the low `width` bits of `value` by `amount` bits.
/// Used by [`build_preprocessed`] to fold a non-base chord note's intervals
/// into the chord's combined bitmap without a second pass over the source.
fn right_circular_shift(value: u16, width: u32, amount: u32) -> u16 {
    if amount == 0 {
        return value;
    }
    let mask = (1u32 << width) - 1;
    let v = value as u32 & mask;
    (((v << (width - amount)) & mask) | (v >> amount)) as u16
}

fn build_preprocessed(chords: &[u8], chord_byte_offsets: &[u32]) -> Vec<PreprocessedItem> {
    let num_chords = chord_byte_offsets.len();
    let ones: u16 = (1u16 << crate::VOCSIZE) - 1;
    let mut preprocessed = Vec::with_capacity(num_chords + 1);

    for c in 0..num_chords {
        let spos = chord_byte_offsets[c];
        if c + 1 >= num_chords {
            preprocessed.push(PreprocessedItem {
                chord_offset: spos,
                interval_bitmap: ones,
            });
            continue;
        }
        let chordlen = chords[spos as usize] as u32;
        let next_spos = chord_byte_offsets[c + 1];
        let nextchordlen = chords[next_spos as usize] as u32;

        let first_notes = spos + CHORDHEADERLEN as u32;
        let next_first_notes = next_spos + CHORDHEADERLEN as u32;
        let base = chords[first_notes as usize] as i8;

        let mut bitmap = ones;
        for i in 0..nextchordlen {
            let pitch = chords[(next_first_notes + i * NOTELEN as u32) as usize] as i8;
            let b = pitch_class_interval(base, pitch);
            bitmap &= !(1u16 << b);
        }

        let mut shifts = ones;
        for i in 1..chordlen {
            let pitch = chords[(first_notes + i * NOTELEN as u32) as usize] as i8;
            let amount = pitch_class_interval(base, pitch);
            shifts &= right_circular_shift(bitmap, crate::VOCSIZE as u32, amount as u32);
        }
        bitmap &= shifts;

        preprocessed.push(PreprocessedItem {
            chord_offset: spos,
            interval_bitmap: bitmap,
        });
    }

    let end_offset = chord_byte_offsets
        .last()
        .map(|&last| {
            let chordlen = chords[last as usize] as u32;
            last + CHORDHEADERLEN as u32 + chordlen * NOTELEN as u32
        })
        .unwrap_or(0);
    preprocessed.push(PreprocessedItem {
        chord_offset: end_offset,
        interval_bitmap: 0,
    });
    preprocessed
}

/// Octave-equivalent pitch-class interval `base -> other`, wrapped into `0..VOCSIZE`.
pub fn pitch_class_interval(base: i8, other: i8) -> u8 {
    let raw = (other as i32 - base as i32).rem_euclid(crate::VOCSIZE as i32);
    raw as u8
}

fn build_tracks(chords_in: &[ChordInput], num_tracks: u32) -> Vec<Vec<u8>> {
    let num_chords = chords_in.len();
    let mut tracks = vec![vec![GAP_UNSIGNED; num_chords]; num_tracks as usize];
    for (c, chord) in chords_in.iter().enumerate() {
        for note in &chord.notes {
            let slot = &mut tracks[note.track_id as usize][c];
            if *slot == GAP_UNSIGNED || (note.pitch as u8) > *slot {
                *slot = note.pitch as u8;
            }
        }
    }
    tracks
}

/// Builds the P3 turning-point arrays: a start at `(onset, pitch)` and an end
/// at `(onset + duration, pitch)` per note, with overlapping same-pitch
/// segments merged so sustained repeats don't inflate the matched duration.
fn build_turning_points(chords_in: &[ChordInput]) -> (Vec<TurningPoint>, Vec<TurningPoint>) {
    // Collect raw (start, end, pitch, chord_index) segments, then merge
    // overlapping-or-touching segments that share a pitch.
    let mut segments: Vec<(u32, u32, u8, u32)> = Vec::new();
    for (c, chord) in chords_in.iter().enumerate() {
        for note in &chord.notes {
            segments.push((
                chord.onset,
                chord.onset + note.duration as u32,
                note.pitch as u8,
                c as u32,
            ));
        }
    }
    segments.sort_by(|a, b| a.2.cmp(&b.2).then(a.0.cmp(&b.0)));

    let mut merged: Vec<(u32, u32, u8, u32)> = Vec::new();
    for seg in segments {
        if let Some(last) = merged.last_mut() {
            if last.2 == seg.2 && seg.0 <= last.1 {
                last.1 = last.1.max(seg.1);
                continue;
            }
        }
        merged.push(seg);
    }

    let mut startpoints: Vec<TurningPoint> = merged
        .iter()
        .map(|&(start, _, pitch, chord_index)| TurningPoint {
            x: start,
            y: pitch,
            chord_index,
        })
        .collect();
    let mut endpoints: Vec<TurningPoint> = merged
        .iter()
        .map(|&(_, end, pitch, chord_index)| TurningPoint {
            x: end,
            y: pitch,
            chord_index,
        })
        .collect();
    startpoints.sort_by_key(|p| p.x);
    endpoints.sort_by_key(|p| p.x);
    (startpoints, endpoints)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chord(onset: u32, pitches: &[i8]) -> ChordInput {
        ChordInput {
            onset,
            notes: pitches
                .iter()
                .map(|&pitch| Note {
                    pitch,
                    duration: 480,
                    track_id: 0,
                })
                .collect(),
        }
    }

    #[test]
    fn build_roundtrips_chord_layout() {
        let song = Song::build(
            vec![chord(0, &[60]), chord(480, &[62, 65]), chord(960, &[64])],
            480,
            vec![],
        )
        .unwrap();

        assert_eq!(song.num_chords, 3);
        assert_eq!(song.num_notes, 4);

        let offset0 = song.chord_offset(0).unwrap();
        assert_eq!(song.chord_onset(offset0), 0);
        assert_eq!(song.chord_len(offset0), 1);

        let offset1 = song.chord_offset(1).unwrap();
        assert_eq!(song.chord_onset(offset1), 480);
        assert_eq!(song.chord_len(offset1), 2);
        let n0 = song.note_at(Song::first_note_offset(offset1));
        let n1 = song.note_at(Song::first_note_offset(offset1) + NOTELEN as u32);
        assert_eq!(n0.pitch, 62);
        assert_eq!(n1.pitch, 65);
    }

    #[test]
    fn next_note_crosses_chord_boundary_and_terminates() {
        let song = Song::build(
            vec![chord(0, &[60, 62]), chord(480, &[64])],
            480,
            vec![],
        )
        .unwrap();

        let mut cursor = song.first_cursor().unwrap();
        let mut pitches = vec![song.note_at(cursor.note_offset).pitch];
        while let Some(next) = song.next_note(cursor) {
            pitches.push(song.note_at(next.note_offset).pitch);
            cursor = next;
        }
        assert_eq!(pitches, vec![60, 62, 64]);
    }

    #[test]
    fn interval_bitmap_marks_present_intervals() {
        // chord 0 = {60}, chord 1 = {64}: interval 4 present, all others absent.
        let song = Song::build(vec![chord(0, &[60]), chord(480, &[64])], 480, vec![]).unwrap();
        let bitmap = song.interval_bitmap(0);
        assert_eq!(bitmap & (1 << 4), 0, "interval 4 should be marked present");
        assert_ne!(bitmap & (1 << 5), 0, "interval 5 should be absent");
    }

    #[test]
    fn tracks_record_highest_pitch_per_chord_with_gaps() {
        let mut c0 = chord(0, &[]);
        c0.notes.push(Note {
            pitch: 60,
            duration: 480,
            track_id: 0,
        });
        c0.notes.push(Note {
            pitch: 48,
            duration: 480,
            track_id: 1,
        });
        let c1 = chord(480, &[]); // nothing on either track
        let song = Song::build(vec![c0, c1], 480, vec![]).unwrap();

        assert_eq!(song.tracks[0], vec![60, GAP_UNSIGNED]);
        assert_eq!(song.tracks[1], vec![48, GAP_UNSIGNED]);
    }

    #[test]
    fn matched_chords_rebases_onsets_to_zero() {
        let song = Song::build(
            vec![chord(960, &[60]), chord(1440, &[64])],
            480,
            vec![],
        )
        .unwrap();
        let chords = song.matched_chords(0, 1).unwrap();
        assert_eq!(chords[0][0].onset, 0);
        assert_eq!(chords[1][0].onset, 480);
    }
}
